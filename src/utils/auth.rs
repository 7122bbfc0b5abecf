use sha2::{Digest, Sha256};

use crate::error::ApiError;

/// Decides whether a presented admin credential is acceptable.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credential: Option<&str>) -> Result<(), ApiError>;
}

/// A single shared secret taken from configuration.
pub struct SharedSecretAuthenticator {
    secret: String,
}

impl SharedSecretAuthenticator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl Authenticator for SharedSecretAuthenticator {
    fn authenticate(&self, credential: Option<&str>) -> Result<(), ApiError> {
        match credential {
            Some(presented)
                if !self.secret.is_empty() && constant_time_eq(presented, &self.secret) =>
            {
                Ok(())
            }
            _ => Err(ApiError::Unauthorized),
        }
    }
}

/// Compares digests so neither the contents nor the length of the secret
/// leak through timing.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = Sha256::digest(a.as_bytes());
    let b = Sha256::digest(b.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

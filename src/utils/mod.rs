mod auth;
pub use auth::{Authenticator, SharedSecretAuthenticator};

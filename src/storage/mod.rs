//! Version-controlled file storage.
//!
//! Every object lives at a logical path such as `snippets/<id>.json` and
//! carries a [`VersionToken`] (the content hash on GitHub). Updates and deletes
//! are compare-and-swap operations against that token; a stale token fails
//! with [`StoreError::Conflict`] and is never retried here.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::SnippetId;

pub mod github;
pub mod memory;
pub mod transaction;

#[cfg(test)]
pub mod testing;

pub use github::GitHubStore;
pub use memory::MemoryStore;
pub use transaction::Transaction;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedObject {
    pub content: String,
    pub version: VersionToken,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found")]
    NotFound,

    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("path is not a file")]
    NotAFile,

    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid store configuration: {0}")]
    Misconfigured(String),

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Writes a new object and returns its version.
    async fn create(&self, path: &str, content: &str, message: &str)
        -> Result<VersionToken, StoreError>;

    async fn read(&self, path: &str) -> Result<VersionedObject, StoreError>;

    /// Compare-and-swap: replaces the object only if it is still at `expected`.
    async fn update(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: &VersionToken,
    ) -> Result<VersionToken, StoreError>;

    async fn delete(
        &self,
        path: &str,
        message: &str,
        expected: &VersionToken,
    ) -> Result<(), StoreError>;

    /// Existence probe; `None` when nothing is stored at `path`.
    async fn read_version(&self, path: &str) -> Result<Option<VersionToken>, StoreError>;
}

/// The three parallel collections a snippet is spread over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Snippets,
    Codes,
    Stats,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Snippets, Collection::Codes, Collection::Stats];

    pub fn path(self, id: &SnippetId) -> String {
        match self {
            Collection::Snippets => format!("snippets/{id}.json"),
            Collection::Codes => format!("codes/{id}.txt"),
            Collection::Stats => format!("stats/{id}.json"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Collection::Snippets => "snippet",
            Collection::Codes => "code",
            Collection::Stats => "stats",
        }
    }
}

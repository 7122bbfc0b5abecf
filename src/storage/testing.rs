use std::sync::Mutex;

use async_trait::async_trait;

use super::{FileStore, MemoryStore, StoreError, VersionToken, VersionedObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Update,
    Delete,
    /// `read_version`, the existence check that precedes a delete.
    Probe,
}

/// MemoryStore that rejects chosen operations on chosen paths and records
/// every successful delete.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing: Vec<(Op, String)>,
    deleted: Mutex<Vec<String>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `path` matches exactly, or as a prefix when it ends with `/`.
    pub fn failing(mut self, op: Op, path: &str) -> Self {
        self.failing.push((op, path.to_string()));
        self
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn check(&self, op: Op, path: &str) -> Result<(), StoreError> {
        let hit = self.failing.iter().any(|(o, p)| {
            *o == op && (p == path || (p.ends_with('/') && path.starts_with(p.as_str())))
        });
        if hit {
            return Err(StoreError::Rejected {
                status: 500,
                message: format!("injected {op:?} failure for {path}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for FaultyStore {
    async fn create(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<VersionToken, StoreError> {
        self.check(Op::Create, path)?;
        self.inner.create(path, content, message).await
    }

    async fn read(&self, path: &str) -> Result<VersionedObject, StoreError> {
        self.inner.read(path).await
    }

    async fn update(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: &VersionToken,
    ) -> Result<VersionToken, StoreError> {
        self.check(Op::Update, path)?;
        self.inner.update(path, content, message, expected).await
    }

    async fn delete(
        &self,
        path: &str,
        message: &str,
        expected: &VersionToken,
    ) -> Result<(), StoreError> {
        self.check(Op::Delete, path)?;
        self.inner.delete(path, message, expected).await?;
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn read_version(&self, path: &str) -> Result<Option<VersionToken>, StoreError> {
        self.check(Op::Probe, path)?;
        self.inner.read_version(path).await
    }
}

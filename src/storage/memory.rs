use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{FileStore, StoreError, VersionToken, VersionedObject};

/// In-process store with the same compare-and-swap rules as the GitHub one.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, VersionedObject>,
    revision: u64,
}

impl Inner {
    fn next_version(&mut self, path: &str, content: &str) -> VersionToken {
        self.revision += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.revision.to_be_bytes());
        hasher.update(path.as_bytes());
        hasher.update(content.as_bytes());
        VersionToken::new(hex::encode(hasher.finalize()))
    }

    fn check(&self, path: &str, expected: &VersionToken) -> Result<(), StoreError> {
        match self.objects.get(path) {
            None => Err(StoreError::NotFound),
            Some(obj) if &obj.version != expected => Err(StoreError::Conflict(format!(
                "{path} is at {}, not {expected}",
                obj.version
            ))),
            Some(_) => Ok(()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
impl MemoryStore {
    pub fn contains(&self, path: &str) -> bool {
        self.lock().objects.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn create(
        &self,
        path: &str,
        content: &str,
        _message: &str,
    ) -> Result<VersionToken, StoreError> {
        let mut inner = self.lock();
        if inner.objects.contains_key(path) {
            return Err(StoreError::Conflict(format!("{path} already exists")));
        }
        let version = inner.next_version(path, content);
        inner.objects.insert(
            path.to_string(),
            VersionedObject {
                content: content.to_string(),
                version: version.clone(),
            },
        );
        Ok(version)
    }

    async fn read(&self, path: &str) -> Result<VersionedObject, StoreError> {
        self.lock()
            .objects
            .get(path)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(
        &self,
        path: &str,
        content: &str,
        _message: &str,
        expected: &VersionToken,
    ) -> Result<VersionToken, StoreError> {
        let mut inner = self.lock();
        inner.check(path, expected)?;
        let version = inner.next_version(path, content);
        inner.objects.insert(
            path.to_string(),
            VersionedObject {
                content: content.to_string(),
                version: version.clone(),
            },
        );
        Ok(version)
    }

    async fn delete(
        &self,
        path: &str,
        _message: &str,
        expected: &VersionToken,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check(path, expected)?;
        inner.objects.remove(path);
        Ok(())
    }

    async fn read_version(&self, path: &str) -> Result<Option<VersionToken>, StoreError> {
        Ok(self.lock().objects.get(path).map(|obj| obj.version.clone()))
    }
}

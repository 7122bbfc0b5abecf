//! Ordered multi-object writes with compensation.
//!
//! The store has no cross-file atomicity, so a [`Transaction`] applies its
//! steps one by one and, when a step fails, undoes the steps that already
//! went through in reverse order. Undo is best effort: a concurrent writer can
//! move an object on, in which case the compensation itself fails and is
//! reported alongside the original error.

use log::{info, warn};
use thiserror::Error;

use super::{FileStore, StoreError, VersionToken};

enum Step {
    Create {
        path: String,
        content: String,
        message: String,
    },
    Update {
        path: String,
        content: String,
        message: String,
        expected: VersionToken,
        previous: String,
    },
}

impl Step {
    fn path(&self) -> &str {
        match self {
            Step::Create { path, .. } | Step::Update { path, .. } => path,
        }
    }
}

enum Applied {
    Created {
        path: String,
        version: VersionToken,
    },
    Updated {
        path: String,
        previous: String,
        version: VersionToken,
    },
}

#[derive(Debug, Error)]
#[error(
    "write {step} to {path} failed: {source} ({} compensations failed)",
    .compensation_failures.len()
)]
pub struct TransactionError {
    /// Index of the step that failed.
    pub step: usize,
    pub path: String,
    pub source: StoreError,
    /// Compensations that could not be applied, by path.
    pub compensation_failures: Vec<(String, StoreError)>,
}

pub struct Transaction<'s> {
    store: &'s dyn FileStore,
    steps: Vec<Step>,
}

impl<'s> Transaction<'s> {
    pub fn new(store: &'s dyn FileStore) -> Self {
        Self {
            store,
            steps: Vec::new(),
        }
    }

    pub fn create(
        mut self,
        path: impl Into<String>,
        content: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.steps.push(Step::Create {
            path: path.into(),
            content: content.into(),
            message: message.into(),
        });
        self
    }

    /// Conditional overwrite. `previous` is what gets written back if a later
    /// step fails.
    pub fn update(
        mut self,
        path: impl Into<String>,
        content: impl Into<String>,
        message: impl Into<String>,
        expected: VersionToken,
        previous: impl Into<String>,
    ) -> Self {
        self.steps.push(Step::Update {
            path: path.into(),
            content: content.into(),
            message: message.into(),
            expected,
            previous: previous.into(),
        });
        self
    }

    /// Applies every step in order and returns the new versions, one per step.
    pub async fn commit(self) -> Result<Vec<VersionToken>, TransactionError> {
        let mut applied = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.into_iter().enumerate() {
            let result = match &step {
                Step::Create {
                    path,
                    content,
                    message,
                } => self.store.create(path, content, message).await,
                Step::Update {
                    path,
                    content,
                    message,
                    expected,
                    ..
                } => self.store.update(path, content, message, expected).await,
            };

            match result {
                Ok(version) => applied.push(match step {
                    Step::Create { path, .. } => Applied::Created { path, version },
                    Step::Update { path, previous, .. } => Applied::Updated {
                        path,
                        previous,
                        version,
                    },
                }),
                Err(source) => {
                    let path = step.path().to_string();
                    let compensation_failures = compensate(self.store, applied).await;
                    return Err(TransactionError {
                        step: index,
                        path,
                        source,
                        compensation_failures,
                    });
                }
            }
        }

        Ok(applied
            .into_iter()
            .map(|a| match a {
                Applied::Created { version, .. } | Applied::Updated { version, .. } => version,
            })
            .collect())
    }
}

async fn compensate(store: &dyn FileStore, applied: Vec<Applied>) -> Vec<(String, StoreError)> {
    let mut failures = Vec::new();

    for step in applied.into_iter().rev() {
        let (path, result) = match step {
            Applied::Created { path, version } => {
                let message = format!("Rollback failed write: {path}");
                let result = store.delete(&path, &message, &version).await;
                (path, result)
            }
            Applied::Updated {
                path,
                previous,
                version,
            } => {
                let message = format!("Rollback failed write: {path}");
                let result = store
                    .update(&path, &previous, &message, &version)
                    .await
                    .map(|_| ());
                (path, result)
            }
        };

        match result {
            Ok(()) => info!("rolled back {path}"),
            Err(err) => {
                warn!("rollback of {path} failed: {err}");
                failures.push((path, err));
            }
        }
    }

    failures
}

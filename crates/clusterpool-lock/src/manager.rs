//! LockManager: the entry point for lock, unlock, and label operations.

use std::future::Future;
use std::time::Duration;

use clusterpool_core::{Cluster, Labels, LockKeys, labels};
use tracing::{debug, info, warn};

use crate::error::{LockError, LockResult};
use crate::registry::{ClusterRegistry, RegistryError};

/// Attempts made by read-modify-write operations before giving up on
/// conflicts: the first try plus one blind retry.
pub(crate) const REWRITE_ATTEMPTS: u32 = 2;

/// Tuning for registry calls made by the protocols.
#[derive(Debug, Clone)]
pub struct ClaimOptions {
    /// Deadline for each individual registry call.
    pub op_timeout: Duration,
    /// Upper bound of the random pause after losing a race, before trying
    /// the next candidate. Zero disables the pause.
    pub conflict_backoff: Duration,
}

impl Default for ClaimOptions {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(30),
            conflict_backoff: Duration::from_millis(250),
        }
    }
}

/// Runs the pool protocols against one registry.
///
/// Holds no pool state of its own; every decision is re-validated by the
/// registry's conditional write.
pub struct LockManager<R> {
    pub(crate) registry: R,
    pub(crate) keys: LockKeys,
    pub(crate) options: ClaimOptions,
}

impl<R: ClusterRegistry> LockManager<R> {
    /// Create a manager with the default `locked` / `test` label keys.
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            keys: LockKeys::default(),
            options: ClaimOptions::default(),
        }
    }

    pub fn with_keys(mut self, keys: LockKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_options(mut self, options: ClaimOptions) -> Self {
        self.options = options;
        self
    }

    pub fn keys(&self) -> &LockKeys {
        &self.keys
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Every cluster in the pool, sorted by name.
    pub async fn list(&self) -> LockResult<Vec<Cluster>> {
        let mut clusters = self.call("list", "pool", self.registry.list()).await?;
        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clusters)
    }

    /// Fetch one cluster by name.
    pub async fn get(&self, name: &str) -> LockResult<Cluster> {
        self.call("get", name, self.registry.get(name)).await
    }

    /// Merge `new_labels` over a cluster's labels, new values winning.
    /// Returns the labels as written.
    pub async fn label(&self, name: &str, new_labels: &Labels) -> LockResult<Labels> {
        if new_labels.is_empty() {
            return Err(LockError::MissingOption("--label".to_string()));
        }
        let written = self
            .rewrite_labels("label", name, |cluster| {
                Ok(labels::merge(&cluster.labels, new_labels))
            })
            .await?;
        info!(cluster = name, labels = %labels::format(new_labels), "cluster labelled");
        Ok(written)
    }

    /// Read a cluster, compute its new labels with `edit`, and write them
    /// back conditionally. A conflict re-reads and retries once.
    ///
    /// When `edit` leaves the labels unchanged nothing is written.
    pub(crate) async fn rewrite_labels<F>(
        &self,
        op: &'static str,
        name: &str,
        mut edit: F,
    ) -> LockResult<Labels>
    where
        F: FnMut(&Cluster) -> LockResult<Labels>,
    {
        let mut attempt = 1;
        loop {
            // Always start from a fresh read; a cached copy carries a stale version.
            let cluster = self.get(name).await?;
            let desired = edit(&cluster)?;
            if desired == cluster.labels {
                debug!(cluster = name, op, "labels already as requested");
                return Ok(desired);
            }

            let result = self
                .call_raw(op, name, self.registry.update_labels(&cluster, desired))
                .await?;
            match result {
                Ok(updated) => return Ok(updated.labels),
                Err(RegistryError::Conflict(_)) if attempt < REWRITE_ATTEMPTS => {
                    warn!(cluster = name, op, attempt, "concurrent update, retrying");
                    attempt += 1;
                }
                Err(RegistryError::Conflict(_)) => {
                    return Err(LockError::Conflict {
                        op,
                        name: name.to_string(),
                        registry: self.registry.identity(),
                    });
                }
                Err(e) => return Err(self.registry_error(op, name, e)),
            }
        }
    }

    /// Await a registry call under the per-call deadline and map every
    /// failure into a [`LockError`].
    pub(crate) async fn call<T, F>(&self, op: &'static str, target: &str, fut: F) -> LockResult<T>
    where
        F: Future<Output = Result<T, RegistryError>>,
    {
        self.call_raw(op, target, fut)
            .await?
            .map_err(|e| self.registry_error(op, target, e))
    }

    /// Like [`Self::call`] but hands registry errors back untouched so the
    /// caller can react to conflicts. Only a timeout is mapped.
    pub(crate) async fn call_raw<T, F>(
        &self,
        op: &'static str,
        target: &str,
        fut: F,
    ) -> LockResult<Result<T, RegistryError>>
    where
        F: Future<Output = Result<T, RegistryError>>,
    {
        tokio::time::timeout(self.options.op_timeout, fut)
            .await
            .map_err(|_| LockError::Timeout {
                op,
                target: target.to_string(),
                registry: self.registry.identity(),
                timeout: self.options.op_timeout,
            })
    }

    pub(crate) fn registry_error(
        &self,
        op: &'static str,
        target: &str,
        err: RegistryError,
    ) -> LockError {
        let registry = self.registry.identity();
        match err {
            RegistryError::NotFound(name) => LockError::NotFound { name, registry },
            RegistryError::Conflict(name) => LockError::Conflict { op, name, registry },
            RegistryError::Unavailable(message) => LockError::Registry {
                op,
                target: target.to_string(),
                registry,
                message,
            },
        }
    }
}

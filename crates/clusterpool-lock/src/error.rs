//! Lock manager error types.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the lock, unlock, and label operations.
///
/// "No cluster available" is not an error; [`LockManager::lock`] returns
/// `Ok(None)` for it.
///
/// [`LockManager::lock`]: crate::LockManager::lock
#[derive(Debug, Error)]
pub enum LockError {
    #[error("cluster {name} not found in {registry}")]
    NotFound { name: String, registry: String },

    #[error("cluster {name} in {registry} kept changing during {op}; gave up after retrying")]
    Conflict {
        op: &'static str,
        name: String,
        registry: String,
    },

    #[error("registry {registry} failed during {op} on {target}: {message}")]
    Registry {
        op: &'static str,
        target: String,
        registry: String,
        message: String,
    },

    #[error("{op} on {target} against {registry} timed out after {timeout:?}; its outcome is unknown")]
    Timeout {
        op: &'static str,
        target: String,
        registry: String,
        timeout: Duration,
    },

    #[error("connected to cluster {cluster} but the current context is still {context:?}")]
    ConnectVerificationFailed { cluster: String, context: String },

    #[error("context error: {0}")]
    Context(String),

    #[error("cluster {name} is locked by {actual}, not by {expected}")]
    NotOwner {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("missing required option: {0}")]
    MissingOption(String),
}

impl LockError {
    /// True for failures of the registry itself (network, auth, timeouts)
    /// as opposed to problems with the request or the local machine.
    pub fn is_registry_failure(&self) -> bool {
        matches!(self, LockError::Registry { .. } | LockError::Timeout { .. })
    }
}

pub type LockResult<T> = Result<T, LockError>;

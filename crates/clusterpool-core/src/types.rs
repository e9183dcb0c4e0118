//! Shared types used across clusterpool crates.

use serde::{Deserialize, Serialize};

use crate::labels::Labels;

/// Default key of the label whose presence marks a cluster as claimed.
pub const DEFAULT_LOCK_LABEL: &str = "locked";

/// Default key of the label recording which test run holds a cluster.
pub const DEFAULT_TEST_LABEL: &str = "test";

/// One provisioned test cluster in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    /// Opaque registry token that changes on every mutation. Only ever
    /// compared for equality when writing back.
    #[serde(default)]
    pub version: String,
    pub connection: ConnectionInfo,
    /// Provisioning status as reported by the registry (display only).
    #[serde(default)]
    pub status: Option<String>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, connection: ConnectionInfo) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            version: String::new(),
            connection,
            status: None,
        }
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    /// Value of `key` if present and non-empty.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// A cluster is held while its lock label carries any non-empty value.
    pub fn is_locked(&self, lock_label: &str) -> bool {
        self.label(lock_label).is_some()
    }

    /// Name of the local context the cloud tooling creates for this cluster.
    pub fn context_name(&self) -> String {
        format!(
            "gke_{}_{}_{}",
            self.connection.project, self.connection.location, self.name
        )
    }
}

/// Where a cluster lives, enough to fetch credentials for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConnectionInfo {
    pub project: String,
    /// Zone (`us-central1-a`) or region (`us-central1`).
    pub location: String,
}

impl ConnectionInfo {
    pub fn new(project: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            location: location.into(),
        }
    }

    /// Zones have three dash-separated parts, regions two.
    pub fn is_zonal(&self) -> bool {
        self.location.split('-').count() >= 3
    }
}

/// The label keys the lock flow owns. Everything else on a cluster is
/// caller metadata and is never removed by lock/unlock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockKeys {
    pub lock_label: String,
    pub test_label: String,
}

impl Default for LockKeys {
    fn default() -> Self {
        Self {
            lock_label: DEFAULT_LOCK_LABEL.to_string(),
            test_label: DEFAULT_TEST_LABEL.to_string(),
        }
    }
}

impl LockKeys {
    pub fn new(lock_label: impl Into<String>, test_label: impl Into<String>) -> Self {
        Self {
            lock_label: lock_label.into(),
            test_label: test_label.into(),
        }
    }

    /// Keys removed on release.
    pub fn release_keys(&self) -> [&str; 2] {
        [self.lock_label.as_str(), self.test_label.as_str()]
    }
}

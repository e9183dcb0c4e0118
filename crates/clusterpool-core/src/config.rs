//! clusterpool.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{DEFAULT_LOCK_LABEL, DEFAULT_TEST_LABEL, LockKeys};

/// File name looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "clusterpool.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub registry: RegistryConfig,
    pub labels: LabelsConfig,
    pub connect: ConnectConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryBackend {
    /// Local redb file shared by every caller.
    #[default]
    Store,
    /// Google Kubernetes Engine clusters, labels via the REST API.
    Gke,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub backend: RegistryBackend,
    /// Store backend database file.
    pub path: PathBuf,
    /// GKE project holding the pool.
    pub project: Option<String>,
    /// GKE location, `-` for every location in the project.
    pub location: String,
    /// Deadline for each individual registry call.
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::Store,
            path: PathBuf::from("clusterpool.redb"),
            project: None,
            location: "-".to_string(),
            timeout_secs: 30,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelsConfig {
    pub lock: String,
    pub test: String,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            lock: DEFAULT_LOCK_LABEL.to_string(),
            test: DEFAULT_TEST_LABEL.to_string(),
        }
    }
}

impl From<&LabelsConfig> for LockKeys {
    fn from(labels: &LabelsConfig) -> Self {
        LockKeys::new(&labels.lock, &labels.test)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectMethod {
    /// `gcloud container clusters get-credentials`, verified via kubectl.
    #[default]
    Gcloud,
    /// Write the context name into a local TOML file.
    ContextFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    pub method: ConnectMethod,
    pub context_file: PathBuf,
    /// Kubeconfig used by the gcloud method instead of kubectl's default.
    pub kubeconfig: Option<PathBuf>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            method: ConnectMethod::Gcloud,
            context_file: PathBuf::from("clusterpool-context.toml"),
            kubeconfig: None,
        }
    }
}

impl PoolConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PoolConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `explicit` if given, else `clusterpool.toml` in the working
    /// directory if it exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn lock_keys(&self) -> LockKeys {
        LockKeys::from(&self.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config: PoolConfig = toml::from_str("").unwrap();
        assert_eq!(config, PoolConfig::default());
        assert_eq!(config.lock_keys(), LockKeys::default());
        assert_eq!(config.registry.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
[registry]
backend = "gke"
project = "ci-pool"
location = "europe-west1"
timeout_secs = 5

[labels]
lock = "owner"

[connect]
method = "context-file"
context_file = "/tmp/ctx.toml"
kubeconfig = "/tmp/kube/config"
"#;
        let config: PoolConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.registry.backend, RegistryBackend::Gke);
        assert_eq!(config.registry.project.as_deref(), Some("ci-pool"));
        assert_eq!(config.registry.timeout_secs, 5);
        assert_eq!(config.labels.lock, "owner");
        assert_eq!(config.labels.test, "test");
        assert_eq!(config.connect.method, ConnectMethod::ContextFile);
        assert_eq!(config.connect.kubeconfig, Some(PathBuf::from("/tmp/kube/config")));
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusterpool.toml");
        let mut config = PoolConfig::default();
        config.registry.path = dir.path().join("pool.redb");
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(PoolConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(PoolConfig::load(Some(Path::new("/nonexistent/clusterpool.toml"))).is_err());
    }
}

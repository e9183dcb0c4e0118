pub mod label;
pub mod list;
pub mod lock;
pub mod picker;
pub mod register;
pub mod unlock;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clusterpool_core::config::{ConnectMethod, RegistryBackend};
use clusterpool_core::{LockKeys, PoolConfig};
use clusterpool_lock::{
    ClaimOptions, ClusterRegistry, ConnectOnly, Connector, ContextFile, ContextReader, GcloudConnector,
    GkeRegistry, KubectlContext, LockManager, StoreRegistry,
};
use clusterpool_state::{StateError, StateStore};
use tracing::{debug, info};

/// How a successful command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// `lock` found no cluster to claim.
    NoCluster,
}

pub type Manager = LockManager<Box<dyn ClusterRegistry>>;

/// Configuration shared by every command of one invocation.
pub struct Session {
    pub config: PoolConfig,
    pub config_path: Option<PathBuf>,
}

impl Session {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = PoolConfig::load(config_path.as_deref()).with_context(|| match &config_path {
            Some(path) => format!("failed to load config {}", path.display()),
            None => "failed to load clusterpool.toml".to_string(),
        })?;
        debug!(backend = ?config.registry.backend, "configuration loaded");
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Label keys from the command line, falling back to the config file.
    pub fn keys(&self, lock: Option<String>, test: Option<String>) -> LockKeys {
        let defaults = self.config.lock_keys();
        LockKeys::new(
            lock.unwrap_or(defaults.lock_label),
            test.unwrap_or(defaults.test_label),
        )
    }

    pub fn options(&self) -> ClaimOptions {
        ClaimOptions {
            op_timeout: self.config.registry.timeout(),
            ..ClaimOptions::default()
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        match self.config.connect.method {
            ConnectMethod::Gcloud => Arc::new(self.gcloud_connector()),
            ConnectMethod::ContextFile => {
                Arc::new(ContextFile::new(&self.config.connect.context_file))
            }
        }
    }

    pub fn context_reader(&self) -> Box<dyn ContextReader> {
        match self.config.connect.method {
            ConnectMethod::Gcloud => Box::new(self.kubectl_context()),
            ConnectMethod::ContextFile => {
                Box::new(ContextFile::new(&self.config.connect.context_file))
            }
        }
    }

    fn gcloud_connector(&self) -> GcloudConnector {
        match &self.config.connect.kubeconfig {
            Some(path) => GcloudConnector::new().with_kubeconfig(path),
            None => GcloudConnector::new(),
        }
    }

    fn kubectl_context(&self) -> KubectlContext {
        match &self.config.connect.kubeconfig {
            Some(path) => KubectlContext::new().with_kubeconfig(path),
            None => KubectlContext::new(),
        }
    }

    /// Open the store backend's database, waiting while another
    /// clusterpool process holds the file.
    pub async fn open_store(&self) -> Result<StateStore> {
        let path = &self.config.registry.path;
        let deadline = Instant::now() + self.config.registry.timeout();
        let mut backoff = Duration::from_millis(50);
        loop {
            match StateStore::open(path) {
                Ok(store) => return Ok(store),
                Err(StateError::Locked(_)) if Instant::now() < deadline => {
                    debug!(path = %path.display(), ?backoff, "pool database busy, waiting");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(1));
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to open pool database {}", path.display()));
                }
            }
        }
    }

    pub async fn open_registry(&self) -> Result<Box<dyn ClusterRegistry>> {
        let registry = &self.config.registry;
        let connector = self.connector();
        let boxed: Box<dyn ClusterRegistry> = match registry.backend {
            RegistryBackend::Store => {
                Box::new(StoreRegistry::new(self.open_store().await?, connector))
            }
            RegistryBackend::Gke => {
                let Some(project) = &registry.project else {
                    bail!("[registry].project is required for the gke backend");
                };
                Box::new(GkeRegistry::new(project, &registry.location, connector))
            }
        };
        info!(registry = %boxed.identity(), "using cluster registry");
        Ok(boxed)
    }

    pub async fn manager(&self, keys: LockKeys) -> Result<Manager> {
        Ok(LockManager::new(self.open_registry().await?)
            .with_keys(keys)
            .with_options(self.options()))
    }

    /// A manager that can only connect, for verifying a claim once the
    /// registry named `identity` has been closed again.
    pub fn verifier(&self, keys: LockKeys, identity: String) -> LockManager<ConnectOnly> {
        LockManager::new(ConnectOnly::new(self.connector(), identity))
            .with_keys(keys)
            .with_options(self.options())
    }

    /// The config flag to repeat in printed follow-up commands.
    fn config_arg(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// Quote a value for display in a shell command line if it needs it.
fn shell_word(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

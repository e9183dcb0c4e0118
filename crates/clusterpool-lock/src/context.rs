//! Local "active context" collaborators.
//!
//! A [`Connector`] rewrites the local context so tooling talks to a given
//! cluster; a [`ContextReader`] reports which context is active. The
//! connection verifier uses both to prove a connect actually took effect.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use clusterpool_core::{Cluster, Labels};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LockError, LockResult};
use crate::registry::{ClusterRegistry, RegistryError, RegistryFuture};

/// Reports the name of the currently active context.
pub trait ContextReader: Send + Sync {
    /// Current context name; the empty string when none is set.
    fn current_context(&self) -> LockResult<String>;
}

/// Points the local active context at a cluster.
pub trait Connector: Send + Sync {
    fn connect(&self, cluster: &Cluster) -> LockResult<()>;
}

/// Run a blocking connector off the async executor.
pub(crate) fn connect_blocking(
    connector: Arc<dyn Connector>,
    cluster: &Cluster,
) -> RegistryFuture<'static, ()> {
    let cluster = cluster.clone();
    Box::pin(async move {
        tokio::task::spawn_blocking(move || connector.connect(&cluster))
            .await
            .map_err(|e| RegistryError::Unavailable(format!("connect task failed: {e}")))?
            .map_err(|e| RegistryError::Unavailable(e.to_string()))
    })
}

// ── connect-only registry ──────────────────────────────────────────

/// A registry that can only connect, for verifying a claim after the
/// pool's own registry has been closed.
///
/// Reads and writes fail as [`RegistryError::Unavailable`]. `identity`
/// repeats the closed registry's so errors still name the pool.
#[derive(Clone)]
pub struct ConnectOnly {
    connector: Arc<dyn Connector>,
    identity: String,
}

impl ConnectOnly {
    pub fn new(connector: Arc<dyn Connector>, identity: impl Into<String>) -> Self {
        Self {
            connector,
            identity: identity.into(),
        }
    }

    fn closed<T: Send + 'static>(&self) -> RegistryFuture<'static, T> {
        let message = format!("{} is closed for reads and writes", self.identity);
        Box::pin(async move { Err(RegistryError::Unavailable(message)) })
    }
}

impl ClusterRegistry for ConnectOnly {
    fn get<'a>(&'a self, _name: &'a str) -> RegistryFuture<'a, Cluster> {
        self.closed()
    }

    fn list(&self) -> RegistryFuture<'_, Vec<Cluster>> {
        self.closed()
    }

    fn update_labels<'a>(
        &'a self,
        _cluster: &'a Cluster,
        _labels: Labels,
    ) -> RegistryFuture<'a, Cluster> {
        self.closed()
    }

    fn connect<'a>(&'a self, cluster: &'a Cluster) -> RegistryFuture<'a, ()> {
        connect_blocking(self.connector.clone(), cluster)
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }
}

// ── kubectl ────────────────────────────────────────────────────────

/// Reads the current context through `kubectl config current-context`.
#[derive(Debug, Clone, Default)]
pub struct KubectlContext {
    kubeconfig: Option<PathBuf>,
}

impl KubectlContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a specific kubeconfig instead of kubectl's default lookup.
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }
}

impl ContextReader for KubectlContext {
    fn current_context(&self) -> LockResult<String> {
        let mut cmd = Command::new("kubectl");
        cmd.args(["config", "current-context"]);
        if let Some(path) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(path);
        }
        debug!("Running: {:?}", cmd);

        let output = cmd
            .output()
            .map_err(|e| LockError::Context(format!("failed to execute kubectl: {e}")))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("current-context is not set") {
            return Ok(String::new());
        }
        Err(LockError::Context(format!(
            "kubectl config current-context failed (exit code: {}): {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )))
    }
}

// ── gcloud ─────────────────────────────────────────────────────────

/// Fetches cluster credentials with `gcloud container clusters get-credentials`,
/// which also switches kubectl's current context.
#[derive(Debug, Clone)]
pub struct GcloudConnector {
    gcloud: PathBuf,
    kubeconfig: Option<PathBuf>,
}

impl Default for GcloudConnector {
    fn default() -> Self {
        Self {
            gcloud: PathBuf::from("gcloud"),
            kubeconfig: None,
        }
    }
}

impl GcloudConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.gcloud = path.into();
        self
    }

    /// Write credentials into this kubeconfig (via `KUBECONFIG`).
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Arguments passed to gcloud for `cluster`.
    pub fn args(cluster: &Cluster) -> Vec<String> {
        let location_flag = if cluster.connection.is_zonal() {
            "--zone"
        } else {
            "--region"
        };
        vec![
            "container".to_string(),
            "clusters".to_string(),
            "get-credentials".to_string(),
            cluster.name.clone(),
            location_flag.to_string(),
            cluster.connection.location.clone(),
            "--project".to_string(),
            cluster.connection.project.clone(),
        ]
    }

    fn command(&self, cluster: &Cluster) -> Command {
        let mut cmd = Command::new(&self.gcloud);
        cmd.args(Self::args(cluster));
        if let Some(path) = &self.kubeconfig {
            cmd.env("KUBECONFIG", path);
        }
        cmd
    }
}

impl Connector for GcloudConnector {
    fn connect(&self, cluster: &Cluster) -> LockResult<()> {
        let mut cmd = self.command(cluster);
        debug!("Running: {:?}", cmd);

        let output = cmd.output().map_err(|e| {
            LockError::Context(format!(
                "failed to execute gcloud at {}: {e}",
                self.gcloud.display()
            ))
        })?;

        if !output.status.success() {
            return Err(LockError::Context(format!(
                "failed to connect to cluster {} (exit code: {}): {}",
                cluster.name,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

// ── context file ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ContextState {
    #[serde(default)]
    current_context: String,
    #[serde(default)]
    cluster: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

/// A TOML file holding the active context. Serves as both reader and
/// connector for pools whose clusters need no credential fetch.
#[derive(Debug, Clone)]
pub struct ContextFile {
    path: PathBuf,
}

impl ContextFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_state(&self) -> LockResult<ContextState> {
        if !self.path.exists() {
            return Ok(ContextState::default());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            LockError::Context(format!("failed to read {}: {e}", self.path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            LockError::Context(format!("failed to parse {}: {e}", self.path.display()))
        })
    }
}

impl ContextReader for ContextFile {
    fn current_context(&self) -> LockResult<String> {
        Ok(self.read_state()?.current_context)
    }
}

impl Connector for ContextFile {
    fn connect(&self, cluster: &Cluster) -> LockResult<()> {
        let state = ContextState {
            current_context: cluster.context_name(),
            cluster: Some(cluster.name.clone()),
            project: Some(cluster.connection.project.clone()),
            location: Some(cluster.connection.location.clone()),
        };
        let content = toml::to_string_pretty(&state)
            .map_err(|e| LockError::Context(format!("failed to encode context: {e}")))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                LockError::Context(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        fs::write(&self.path, content).map_err(|e| {
            LockError::Context(format!("failed to write {}: {e}", self.path.display()))
        })?;
        debug!(context = %state.current_context, path = %self.path.display(), "context switched");
        Ok(())
    }
}

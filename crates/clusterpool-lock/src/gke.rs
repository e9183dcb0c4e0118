//! [`ClusterRegistry`] over the Google Kubernetes Engine API.
//!
//! Pool clusters are real GKE clusters and pool metadata lives in their
//! resource labels. `setResourceLabels` takes the cluster's
//! `labelFingerprint`, and GKE rejects the call when the fingerprint is
//! stale, which is the conditional write the protocols rely on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clusterpool_core::{Cluster, ConnectionInfo, Labels};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::context::{Connector, connect_blocking};
use crate::registry::{ClusterRegistry, RegistryError, RegistryFuture};

pub const DEFAULT_ENDPOINT: &str = "https://container.googleapis.com/v1";

/// Wildcard location: every zone and region in the project.
pub const ALL_LOCATIONS: &str = "-";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GkeCluster {
    name: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    resource_labels: Labels,
    #[serde(default)]
    label_fingerprint: String,
    #[serde(default)]
    status: Option<String>,
}

impl GkeCluster {
    fn into_cluster(self, project: &str) -> Cluster {
        Cluster {
            name: self.name,
            labels: self.resource_labels,
            version: self.label_fingerprint,
            connection: ConnectionInfo::new(project, self.location),
            status: self.status,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListClustersResponse {
    #[serde(default)]
    clusters: Vec<GkeCluster>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetLabelsRequest<'a> {
    resource_labels: &'a Labels,
    label_fingerprint: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Where bearer tokens come from.
#[derive(Debug, Clone)]
enum TokenSource {
    Static(String),
    /// `gcloud auth print-access-token`, fetched once per registry.
    Gcloud(PathBuf),
}

/// GKE-backed pool.
pub struct GkeRegistry {
    http: reqwest::Client,
    endpoint: String,
    project: String,
    location: String,
    token_source: TokenSource,
    token: OnceCell<String>,
    connector: Arc<dyn Connector>,
}

impl GkeRegistry {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project: project.into(),
            location: location.into(),
            token_source: TokenSource::Gcloud(PathBuf::from("gcloud")),
            token: OnceCell::new(),
            connector,
        }
    }

    /// Override the API base URL (e.g. a regional endpoint or a test server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a fixed access token instead of asking gcloud.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.token_source = TokenSource::Static(token.into());
        self
    }

    fn clusters_url(&self, location: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/clusters",
            self.endpoint, self.project, location
        )
    }

    async fn bearer(&self) -> Result<&str, RegistryError> {
        let source = &self.token_source;
        self.token
            .get_or_try_init(|| async move {
                match source {
                    TokenSource::Static(token) => Ok(token.clone()),
                    TokenSource::Gcloud(gcloud) => fetch_gcloud_token(gcloud).await,
                }
            })
            .await
            .map(String::as_str)
    }

    async fn fetch_list(&self) -> Result<Vec<Cluster>, RegistryError> {
        let url = self.clusters_url(&self.location);
        debug!(%url, "listing GKE clusters");
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(transport_error)?;
        let body: ListClustersResponse = decode(response, "pool").await?;
        Ok(body
            .clusters
            .into_iter()
            .map(|c| c.into_cluster(&self.project))
            .collect())
    }

    async fn fetch_one(&self, name: &str) -> Result<Cluster, RegistryError> {
        if self.location == ALL_LOCATIONS {
            // The single-cluster endpoint needs a concrete location.
            return self
                .fetch_list()
                .await?
                .into_iter()
                .find(|c| c.name == name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()));
        }
        let url = format!("{}/{}", self.clusters_url(&self.location), name);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(transport_error)?;
        let cluster: GkeCluster = decode(response, name).await?;
        Ok(cluster.into_cluster(&self.project))
    }

    async fn set_labels(&self, cluster: &Cluster, labels: Labels) -> Result<Cluster, RegistryError> {
        let url = format!(
            "{}/{}:setResourceLabels",
            self.clusters_url(&cluster.connection.location),
            cluster.name
        );
        let request = SetLabelsRequest {
            resource_labels: &labels,
            label_fingerprint: &cluster.version,
        };
        debug!(%url, cluster = %cluster.name, "setting GKE resource labels");
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        // The body is a long-running operation we do not need.
        let _: serde_json::Value = decode(response, &cluster.name).await?;

        // The new fingerprint is only visible on a later read, so the
        // returned copy carries no version and cannot be written back as is.
        Ok(Cluster {
            labels,
            version: String::new(),
            ..cluster.clone()
        })
    }
}

impl ClusterRegistry for GkeRegistry {
    fn get<'a>(&'a self, name: &'a str) -> RegistryFuture<'a, Cluster> {
        Box::pin(self.fetch_one(name))
    }

    fn list(&self) -> RegistryFuture<'_, Vec<Cluster>> {
        Box::pin(self.fetch_list())
    }

    fn update_labels<'a>(
        &'a self,
        cluster: &'a Cluster,
        labels: Labels,
    ) -> RegistryFuture<'a, Cluster> {
        Box::pin(self.set_labels(cluster, labels))
    }

    fn connect<'a>(&'a self, cluster: &'a Cluster) -> RegistryFuture<'a, ()> {
        connect_blocking(self.connector.clone(), cluster)
    }

    fn identity(&self) -> String {
        format!("gke:projects/{}/locations/{}", self.project, self.location)
    }
}

async fn fetch_gcloud_token(gcloud: &Path) -> Result<String, RegistryError> {
    let output = tokio::process::Command::new(gcloud)
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| {
            RegistryError::Unavailable(format!(
                "failed to execute {} for an access token: {e}",
                gcloud.display()
            ))
        })?;
    if !output.status.success() {
        return Err(RegistryError::Unavailable(format!(
            "gcloud auth print-access-token failed (exit code: {}): {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn transport_error(err: reqwest::Error) -> RegistryError {
    RegistryError::Unavailable(format!("GKE API request failed: {err}"))
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    target: &str,
) -> Result<T, RegistryError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(classify_error(status, &body, target));
    }
    serde_json::from_str(&body)
        .map_err(|e| RegistryError::Unavailable(format!("unexpected GKE API response: {e}")))
}

/// Map a failed API response onto the registry error kinds.
fn classify_error(status: StatusCode, body: &str, target: &str) -> RegistryError {
    let api = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);
    let (message, api_status) = match &api {
        Some(e) => (e.message.as_str(), e.status.as_str()),
        None => (body.trim(), ""),
    };

    match status {
        StatusCode::NOT_FOUND => RegistryError::NotFound(target.to_string()),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
            RegistryError::Conflict(target.to_string())
        }
        _ if api_status == "FAILED_PRECONDITION"
            || message.to_ascii_lowercase().contains("fingerprint") =>
        {
            RegistryError::Conflict(target.to_string())
        }
        _ => RegistryError::Unavailable(format!("HTTP {status}: {message}")),
    }
}

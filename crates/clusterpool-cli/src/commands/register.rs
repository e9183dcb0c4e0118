use anyhow::{Result, bail};
use clusterpool_core::config::RegistryBackend;
use clusterpool_core::{Cluster, ConnectionInfo, labels};
use tracing::info;

use super::{Outcome, Session};

pub struct RegisterRequest {
    pub name: String,
    pub project: String,
    pub location: String,
    pub labels: Vec<String>,
}

/// Record an existing cluster in the store backend's pool.
pub async fn register(session: &Session, request: RegisterRequest) -> Result<Outcome> {
    if session.config.registry.backend != RegistryBackend::Store {
        bail!("register only applies to the store backend; GKE pools list live clusters");
    }

    let cluster = Cluster::new(
        request.name,
        ConnectionInfo::new(request.project, request.location),
    )
    .with_labels(labels::parse(&request.labels));

    let store = session.open_store().await?;
    let stored = store.insert_cluster(&cluster)?;
    info!(cluster = %stored.name, "cluster registered");

    println!("✓ Registered cluster {}", stored.name);
    if !stored.labels.is_empty() {
        println!("  Labels: {}", labels::format(&stored.labels));
    }
    Ok(Outcome::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::{session, stored};

    fn request(name: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            project: "ci-project".to_string(),
            location: "us-central1".to_string(),
            labels: vec!["region=us".to_string()],
        }
    }

    #[tokio::test]
    async fn register_adds_a_free_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());

        register(&s, request("a")).await.unwrap();

        let a = stored(&s, "a");
        assert_eq!(a.labels, labels::parse(["region=us"]));
        assert!(!a.connection.is_zonal());
    }

    #[tokio::test]
    async fn register_twice_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());

        register(&s, request("a")).await.unwrap();
        let err = register(&s, request("a")).await.unwrap_err();

        assert!(err.to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn register_rejects_gke_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.config.registry.backend = RegistryBackend::Gke;

        assert!(register(&s, request("a")).await.is_err());
    }
}

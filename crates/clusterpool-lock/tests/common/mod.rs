//! Shared fixtures: an in-memory pool plus a registry wrapper that injects
//! races, systemic failures, and slowness into an otherwise real store.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clusterpool_core::{Cluster, ConnectionInfo, Labels, labels};
use clusterpool_lock::{
    ClaimOptions, ClusterRegistry, ContextFile, LockManager, RegistryError, RegistryFuture,
    StoreRegistry,
};
use clusterpool_state::StateStore;

/// What the wrapper does to calls passing through it.
#[derive(Debug, Clone)]
pub enum Fault {
    None,
    /// A rival claims the target right before each of the first `times`
    /// label writes, so those writes lose the race.
    RivalClaims { times: usize },
    /// A rival touches an unrelated label right before each of the first
    /// `times` label writes.
    RivalTouches { times: usize },
    /// Label writes fail with a systemic error.
    FailUpdate,
    /// Listing the pool fails with a systemic error.
    FailList,
    /// Label writes hang for this long.
    SlowUpdate(Duration),
    /// `connect` reports success without doing anything.
    SilentConnect,
}

pub struct FaultyRegistry {
    pub inner: StoreRegistry,
    pub fault: Fault,
    pub updates: AtomicUsize,
}

impl FaultyRegistry {
    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn rival_write(&self, name: &str, edit: impl FnOnce(&mut Labels)) {
        let store = self.inner.store();
        let current = store.get_cluster(name).unwrap().unwrap();
        let mut next = current.labels.clone();
        edit(&mut next);
        store.update_labels(name, &current.version, &next).unwrap();
    }
}

impl ClusterRegistry for FaultyRegistry {
    fn get<'a>(&'a self, name: &'a str) -> RegistryFuture<'a, Cluster> {
        self.inner.get(name)
    }

    fn list(&self) -> RegistryFuture<'_, Vec<Cluster>> {
        if matches!(self.fault, Fault::FailList) {
            return Box::pin(async { Err(RegistryError::Unavailable("permission denied".into())) });
        }
        self.inner.list()
    }

    fn update_labels<'a>(
        &'a self,
        cluster: &'a Cluster,
        labels: Labels,
    ) -> RegistryFuture<'a, Cluster> {
        let call = self.updates.fetch_add(1, Ordering::SeqCst);
        match &self.fault {
            Fault::RivalClaims { times } if call < *times => {
                self.rival_write(&cluster.name, |l| {
                    l.insert("locked".into(), "rival".into());
                });
            }
            Fault::RivalTouches { times } if call < *times => {
                self.rival_write(&cluster.name, |l| {
                    l.insert("touched".into(), call.to_string());
                });
            }
            Fault::FailUpdate => {
                return Box::pin(async { Err(RegistryError::Unavailable("connection reset".into())) });
            }
            Fault::SlowUpdate(delay) => {
                let delay = *delay;
                return Box::pin(async move {
                    tokio::time::sleep(delay).await;
                    Err(RegistryError::Unavailable("too slow".into()))
                });
            }
            _ => {}
        }
        self.inner.update_labels(cluster, labels)
    }

    fn connect<'a>(&'a self, cluster: &'a Cluster) -> RegistryFuture<'a, ()> {
        if matches!(self.fault, Fault::SilentConnect) {
            return Box::pin(async { Ok(()) });
        }
        self.inner.connect(cluster)
    }

    fn identity(&self) -> String {
        self.inner.identity()
    }
}

/// Options that keep tests fast: no conflict pause, short deadline.
pub fn fast_options() -> ClaimOptions {
    ClaimOptions {
        op_timeout: Duration::from_secs(5),
        conflict_backoff: Duration::ZERO,
    }
}

pub fn store_registry(context_dir: &Path) -> StoreRegistry {
    let store = StateStore::open_in_memory().unwrap();
    StoreRegistry::new(store, Arc::new(context_file(context_dir)))
}

pub fn context_file(dir: &Path) -> ContextFile {
    ContextFile::new(dir.join("context.toml"))
}

pub fn manager(context_dir: &Path) -> LockManager<StoreRegistry> {
    LockManager::new(store_registry(context_dir)).with_options(fast_options())
}

pub fn faulty_manager(context_dir: &Path, fault: Fault) -> LockManager<FaultyRegistry> {
    let registry = FaultyRegistry {
        inner: store_registry(context_dir),
        fault,
        updates: AtomicUsize::new(0),
    };
    LockManager::new(registry).with_options(fast_options())
}

pub fn cluster(name: &str, pairs: &[&str]) -> Cluster {
    Cluster::new(name, ConnectionInfo::new("ci-project", "us-central1-a"))
        .with_labels(labels::parse(pairs))
}

/// Register clusters directly in the store behind `registry`.
pub fn seed(registry: &StoreRegistry, clusters: &[Cluster]) {
    for c in clusters {
        registry.store().put_cluster(c).unwrap();
    }
}

pub fn stored_labels(registry: &StoreRegistry, name: &str) -> Labels {
    registry.store().get_cluster(name).unwrap().unwrap().labels
}

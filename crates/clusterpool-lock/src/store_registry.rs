//! [`ClusterRegistry`] over the redb-backed [`StateStore`].

use std::sync::Arc;

use clusterpool_core::{Cluster, Labels};
use clusterpool_state::{StateError, StateStore};

use crate::context::{Connector, connect_blocking};
use crate::registry::{ClusterRegistry, RegistryError, RegistryFuture};

/// Registry adapter for a shared redb pool file.
///
/// Store calls block on file I/O, so each runs on tokio's blocking pool.
#[derive(Clone)]
pub struct StoreRegistry {
    store: StateStore,
    connector: Arc<dyn Connector>,
}

impl StoreRegistry {
    pub fn new(store: StateStore, connector: Arc<dyn Connector>) -> Self {
        Self { store, connector }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn blocking<T, F>(&self, f: F) -> RegistryFuture<'static, T>
    where
        T: Send + 'static,
        F: FnOnce(&StateStore) -> Result<T, StateError> + Send + 'static,
    {
        let store = self.store.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || f(&store))
                .await
                .map_err(|e| RegistryError::Unavailable(format!("store task failed: {e}")))?
                .map_err(RegistryError::from)
        })
    }
}

impl From<StateError> for RegistryError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(name) => RegistryError::NotFound(name),
            StateError::Conflict { name, .. } => RegistryError::Conflict(name),
            other => RegistryError::Unavailable(other.to_string()),
        }
    }
}

impl ClusterRegistry for StoreRegistry {
    fn get<'a>(&'a self, name: &'a str) -> RegistryFuture<'a, Cluster> {
        let name = name.to_string();
        self.blocking(move |store| {
            store
                .get_cluster(&name)?
                .ok_or(StateError::NotFound(name))
        })
    }

    fn list(&self) -> RegistryFuture<'_, Vec<Cluster>> {
        self.blocking(|store| store.list_clusters())
    }

    fn update_labels<'a>(
        &'a self,
        cluster: &'a Cluster,
        labels: Labels,
    ) -> RegistryFuture<'a, Cluster> {
        let name = cluster.name.clone();
        let version = cluster.version.clone();
        self.blocking(move |store| store.update_labels(&name, &version, &labels))
    }

    fn connect<'a>(&'a self, cluster: &'a Cluster) -> RegistryFuture<'a, ()> {
        connect_blocking(self.connector.clone(), cluster)
    }

    fn identity(&self) -> String {
        match self.store.path() {
            Some(path) => format!("redb:{}", path.display()),
            None => "redb:in-memory".to_string(),
        }
    }
}

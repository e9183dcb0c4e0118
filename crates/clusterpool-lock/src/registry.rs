//! The cluster registry capability set.
//!
//! Every protocol in this crate talks to the pool only through
//! [`ClusterRegistry`]. Implementations must make `update_labels` conditional
//! on the version the caller read and report a lost race as
//! [`RegistryError::Conflict`], distinct from every other failure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use clusterpool_core::{Cluster, Labels};
use thiserror::Error;

/// Boxed future returned by registry operations.
pub type RegistryFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RegistryError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("cluster not found: {0}")]
    NotFound(String),

    /// The record changed since it was read.
    #[error("cluster {0} was modified concurrently")]
    Conflict(String),

    /// Network, auth, or any other systemic failure.
    #[error("{0}")]
    Unavailable(String),
}

/// Remote store of cluster records.
pub trait ClusterRegistry: Send + Sync {
    /// Fetch one cluster by name.
    fn get<'a>(&'a self, name: &'a str) -> RegistryFuture<'a, Cluster>;

    /// Snapshot of the whole pool. May be stale by the time anything is
    /// written back.
    fn list(&self) -> RegistryFuture<'_, Vec<Cluster>>;

    /// Replace the labels of `cluster`, provided its record still has
    /// `cluster.version`. Returns the cluster as written.
    fn update_labels<'a>(&'a self, cluster: &'a Cluster, labels: Labels)
    -> RegistryFuture<'a, Cluster>;

    /// Point the local active context at `cluster`.
    fn connect<'a>(&'a self, cluster: &'a Cluster) -> RegistryFuture<'a, ()>;

    /// Human-readable description of the backing store, for error messages.
    fn identity(&self) -> String;
}

impl<T: ClusterRegistry + ?Sized> ClusterRegistry for Box<T> {
    fn get<'a>(&'a self, name: &'a str) -> RegistryFuture<'a, Cluster> {
        (**self).get(name)
    }

    fn list(&self) -> RegistryFuture<'_, Vec<Cluster>> {
        (**self).list()
    }

    fn update_labels<'a>(
        &'a self,
        cluster: &'a Cluster,
        labels: Labels,
    ) -> RegistryFuture<'a, Cluster> {
        (**self).update_labels(cluster, labels)
    }

    fn connect<'a>(&'a self, cluster: &'a Cluster) -> RegistryFuture<'a, ()> {
        (**self).connect(cluster)
    }

    fn identity(&self) -> String {
        (**self).identity()
    }
}

impl<T: ClusterRegistry + ?Sized> ClusterRegistry for Arc<T> {
    fn get<'a>(&'a self, name: &'a str) -> RegistryFuture<'a, Cluster> {
        (**self).get(name)
    }

    fn list(&self) -> RegistryFuture<'_, Vec<Cluster>> {
        (**self).list()
    }

    fn update_labels<'a>(
        &'a self,
        cluster: &'a Cluster,
        labels: Labels,
    ) -> RegistryFuture<'a, Cluster> {
        (**self).update_labels(cluster, labels)
    }

    fn connect<'a>(&'a self, cluster: &'a Cluster) -> RegistryFuture<'a, ()> {
        (**self).connect(cluster)
    }

    fn identity(&self) -> String {
        (**self).identity()
    }
}

//! Persisted form of a pool cluster.

use serde::{Deserialize, Serialize};

use clusterpool_core::Cluster;

/// A cluster as stored in the `clusters` table.
///
/// `generation` is the store's version counter. Records built with
/// [`ClusterRecord::new`] store the embedded [`Cluster`] with an empty
/// `version`; reads fill it from `generation`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterRecord {
    pub cluster: Cluster,
    pub generation: u64,
    /// Unix timestamp (seconds) of the last write.
    pub updated_at: u64,
}

impl ClusterRecord {
    pub fn new(cluster: &Cluster, generation: u64, updated_at: u64) -> Self {
        Self {
            cluster: Cluster {
                version: String::new(),
                ..cluster.clone()
            },
            generation,
            updated_at,
        }
    }

    pub fn version(&self) -> String {
        self.generation.to_string()
    }

    /// The cluster with its `version` set to the current generation.
    pub fn into_cluster(self) -> Cluster {
        let version = self.version();
        Cluster {
            version,
            ..self.cluster
        }
    }
}

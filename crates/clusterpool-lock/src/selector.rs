//! Candidate selection.

use clusterpool_core::{Cluster, Labels};
use rand::seq::SliceRandom;
use tracing::debug;

/// Clusters eligible for a claim attempt, in random order.
///
/// Drops clusters whose `lock_label` carries a non-empty value and clusters
/// missing any `filter` pair. The shuffle keeps concurrent callers from all
/// starting on the same cluster and serializing through conflicts.
pub fn select_candidates(all: Vec<Cluster>, lock_label: &str, filter: &Labels) -> Vec<Cluster> {
    let total = all.len();
    let mut candidates: Vec<Cluster> = all
        .into_iter()
        .filter(|c| !c.is_locked(lock_label))
        .filter(|c| matches_filter(c, filter))
        .collect();
    candidates.shuffle(&mut rand::thread_rng());

    debug!(total, eligible = candidates.len(), "selected lock candidates");
    candidates
}

/// Every filter pair is present on the cluster with the same value.
pub fn matches_filter(cluster: &Cluster, filter: &Labels) -> bool {
    filter
        .iter()
        .all(|(k, v)| cluster.labels.get(k).is_some_and(|cv| cv == v))
}

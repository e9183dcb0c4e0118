//! Claim protocol: take exclusive custody of one eligible cluster.
//!
//! ```text
//! Selecting ──▶ Attempting(1..n) ──▶ Claimed
//!                    │  conflict: next candidate
//!                    ├──────────────▶ Exhausted   (no candidate left)
//!                    └──────────────▶ Failed      (any non-conflict error)
//! ```
//!
//! The pool listing is only a hint. Each attempt is a conditional write
//! against the version read in that listing, so a cluster claimed by
//! someone else in the meantime shows up as a conflict, never as a second
//! owner. The loop is bounded by the candidate count; waiting for a
//! cluster to free up is left to the caller.

use std::time::Duration;

use clusterpool_core::{Cluster, Labels, labels};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::LockResult;
use crate::manager::LockManager;
use crate::registry::{ClusterRegistry, RegistryError};
use crate::selector::select_candidates;
use crate::token::new_lock_token;

/// Where a claim currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimState {
    Selecting,
    Attempting {
        cluster: String,
        attempt: usize,
        candidates: usize,
    },
    Claimed { cluster: String },
    Exhausted,
    Failed,
}

/// A successfully claimed cluster and the token written into its lock label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub cluster: Cluster,
    pub token: String,
}

impl<R: ClusterRegistry> LockManager<R> {
    /// Claim one unlocked cluster matching every `filter` pair.
    ///
    /// Returns `Ok(None)` when no cluster is available. `test_name`, if
    /// given, is recorded in the test label (sanitized into a valid label
    /// value).
    pub async fn lock(&self, test_name: Option<&str>, filter: &Labels) -> LockResult<Option<Claim>> {
        let token = new_lock_token();
        let desired = self.claim_labels(&token, test_name);

        let mut state = ClaimState::Selecting;
        trace_state(&state, &token);

        let pool = match self.call("list", "pool", self.registry.list()).await {
            Ok(pool) => pool,
            Err(e) => {
                trace_state(&ClaimState::Failed, &token);
                return Err(e);
            }
        };
        let candidates = select_candidates(pool, &self.keys.lock_label, filter);
        let total = candidates.len();

        for (index, candidate) in candidates.iter().enumerate() {
            state = ClaimState::Attempting {
                cluster: candidate.name.clone(),
                attempt: index + 1,
                candidates: total,
            };
            trace_state(&state, &token);

            let merged = labels::merge(&candidate.labels, &desired);
            let result = self
                .call_raw(
                    "update_labels",
                    &candidate.name,
                    self.registry.update_labels(candidate, merged),
                )
                .await
                .inspect_err(|_| trace_state(&ClaimState::Failed, &token))?;

            match result {
                Ok(cluster) => {
                    trace_state(
                        &ClaimState::Claimed {
                            cluster: cluster.name.clone(),
                        },
                        &token,
                    );
                    info!(cluster = %cluster.name, %token, "cluster locked");
                    return Ok(Some(Claim { cluster, token }));
                }
                Err(RegistryError::Conflict(_)) => {
                    warn!(cluster = %candidate.name, "lost the race for cluster");
                    if index + 1 < total {
                        self.pause_after_conflict().await;
                    }
                }
                Err(e) => {
                    trace_state(&ClaimState::Failed, &token);
                    return Err(self.registry_error("update_labels", &candidate.name, e));
                }
            }
        }

        trace_state(&ClaimState::Exhausted, &token);
        info!(filter = %labels::format(filter), candidates = total, "no cluster available");
        Ok(None)
    }

    /// Labels a claim writes: the lock token, plus the test name if any.
    fn claim_labels(&self, token: &str, test_name: Option<&str>) -> Labels {
        let mut desired = Labels::new();
        desired.insert(self.keys.lock_label.clone(), token.to_string());
        if let Some(test) = test_name.map(labels::sanitize_value).filter(|t| !t.is_empty()) {
            desired.insert(self.keys.test_label.clone(), test);
        }
        desired
    }

    async fn pause_after_conflict(&self) {
        let max = self.options.conflict_backoff;
        if max.is_zero() {
            return;
        }
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=max.as_millis() as u64));
        tokio::time::sleep(jitter).await;
    }
}

fn trace_state(state: &ClaimState, token: &str) {
    debug!(?state, token, "claim state");
}

//! Release protocol: return a cluster to the pool.

use clusterpool_core::{Cluster, Labels, labels};
use tracing::info;

use crate::error::{LockError, LockResult};
use crate::manager::LockManager;
use crate::registry::ClusterRegistry;

impl<R: ClusterRegistry> LockManager<R> {
    /// Remove the lock and test labels from `name`.
    ///
    /// With `expected_token`, refuses to release a cluster whose lock label
    /// currently holds a different token. Without it any holder's lock is
    /// removed.
    pub async fn unlock(&self, name: &str, expected_token: Option<&str>) -> LockResult<Labels> {
        let keys = self.keys.clone();
        let remaining = self
            .release(name, &keys.release_keys(), expected_token)
            .await?;
        info!(cluster = name, labels = %labels::format(&remaining), "cluster unlocked");
        Ok(remaining)
    }

    /// Remove `keys` from the cluster's labels and return what remains.
    ///
    /// Keys that are not present are ignored, so releasing twice is a no-op.
    /// The cluster is always re-read first, and a conflicting write is
    /// retried once from a fresh read.
    pub async fn release(
        &self,
        name: &str,
        keys: &[&str],
        expected_token: Option<&str>,
    ) -> LockResult<Labels> {
        self.rewrite_labels("unlock", name, |cluster| {
            if let Some(expected) = expected_token {
                self.check_owner(cluster, expected)?;
            }
            Ok(strip_keys(&cluster.labels, keys))
        })
        .await
    }

    fn check_owner(&self, cluster: &Cluster, expected: &str) -> LockResult<()> {
        match cluster.label(&self.keys.lock_label) {
            Some(actual) if actual != expected => Err(LockError::NotOwner {
                name: cluster.name.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// `labels` without any of `keys`.
pub fn strip_keys(labels: &Labels, keys: &[&str]) -> Labels {
    labels
        .iter()
        .filter(|(k, _)| !keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_keys_removes_only_named_keys() {
        let l = labels::parse(["locked=tok1", "test=t1", "region=us"]);
        assert_eq!(strip_keys(&l, &["locked", "test"]), labels::parse(["region=us"]));
    }

    #[test]
    fn strip_keys_absent_keys_are_ignored() {
        let l = labels::parse(["region=us"]);
        assert_eq!(strip_keys(&l, &["locked", "test"]), l);
        assert!(strip_keys(&Labels::new(), &["locked"]).is_empty());
    }
}

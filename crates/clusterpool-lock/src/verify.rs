//! Connection verifier.

use clusterpool_core::Cluster;
use tracing::info;

use crate::context::ContextReader;
use crate::error::{LockError, LockResult};
use crate::manager::LockManager;
use crate::registry::ClusterRegistry;

impl<R: ClusterRegistry> LockManager<R> {
    /// Connect to `cluster` and confirm the active context moved.
    ///
    /// A connect that reports success but leaves the context where it was
    /// is an error: anything run afterwards would hit the wrong cluster.
    pub async fn verify_connect(
        &self,
        cluster: &Cluster,
        reader: &dyn ContextReader,
    ) -> LockResult<String> {
        let before = reader.current_context()?;
        self.call("connect", &cluster.name, self.registry.connect(cluster))
            .await?;
        let after = reader.current_context()?;

        if after == before {
            return Err(LockError::ConnectVerificationFailed {
                cluster: cluster.name.clone(),
                context: after,
            });
        }
        info!(cluster = %cluster.name, from = %before, to = %after, "context switched");
        Ok(after)
    }
}

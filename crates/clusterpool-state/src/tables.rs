//! redb table definitions for the cluster registry.

use redb::TableDefinition;

/// Cluster records keyed by cluster name, JSON-serialized [`ClusterRecord`].
///
/// [`ClusterRecord`]: crate::types::ClusterRecord
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

//! StateStore: redb-backed cluster registry.
//!
//! Provides get/list over the pool plus a conditional label write. Every
//! write bumps the record's generation; [`StateStore::update_labels`] reads,
//! compares, and writes inside a single redb write transaction, so two
//! writers holding the same generation can never both succeed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clusterpool_core::{Cluster, Labels};
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::CLUSTERS;
use crate::types::ClusterRecord;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe cluster registry backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    path: Option<PathBuf>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    ///
    /// Returns [`StateError::Locked`] when another process has the file open.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = match Database::create(path) {
            Ok(db) => db,
            Err(redb::DatabaseError::DatabaseAlreadyOpen) => {
                return Err(StateError::Locked(path.to_path_buf()));
            }
            Err(e) => return Err(StateError::Open(e.to_string())),
        };
        let store = Self {
            db: Arc::new(db),
            path: Some(path.to_path_buf()),
        };
        store.ensure_tables()?;
        debug!(?path, "cluster store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            path: None,
        };
        store.ensure_tables()?;
        debug!("in-memory cluster store opened");
        Ok(store)
    }

    /// On-disk location, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Register a cluster or replace its record wholesale.
    ///
    /// This is the provisioning side's entry point and is unconditional.
    /// Returns the cluster as stored, with its new version.
    pub fn put_cluster(&self, cluster: &Cluster) -> StateResult<Cluster> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            let previous = read_record(&table, &cluster.name)?;
            record = ClusterRecord::new(
                cluster,
                previous.map_or(1, |r| r.generation + 1),
                epoch_secs(),
            );
            write_record(&mut table, &record)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cluster = %cluster.name, generation = record.generation, "cluster stored");
        Ok(record.into_cluster())
    }

    /// Register a cluster that is not in the pool yet.
    ///
    /// Fails with [`StateError::AlreadyExists`] instead of touching an
    /// existing record, so a held lock can't be clobbered by registration.
    pub fn insert_cluster(&self, cluster: &Cluster) -> StateResult<Cluster> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record = ClusterRecord::new(cluster, 1, epoch_secs());
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            if read_record(&table, &cluster.name)?.is_some() {
                return Err(StateError::AlreadyExists(cluster.name.clone()));
            }
            write_record(&mut table, &record)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cluster = %cluster.name, "cluster registered");
        Ok(record.into_cluster())
    }

    /// Get a cluster by name.
    pub fn get_cluster(&self, name: &str) -> StateResult<Option<Cluster>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        Ok(read_record(&table, name)?.map(ClusterRecord::into_cluster))
    }

    /// List every cluster in the pool, ordered by name.
    pub fn list_clusters(&self) -> StateResult<Vec<Cluster>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: ClusterRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record.into_cluster());
        }
        Ok(results)
    }

    /// Replace a cluster's labels if its version is still `expected_version`.
    ///
    /// Fails with [`StateError::Conflict`] when another write landed since
    /// the caller read the cluster, and [`StateError::NotFound`] when the
    /// cluster is gone.
    pub fn update_labels(
        &self,
        name: &str,
        expected_version: &str,
        labels: &Labels,
    ) -> StateResult<Cluster> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            let current = read_record(&table, name)?
                .ok_or_else(|| StateError::NotFound(name.to_string()))?;

            let actual = current.version();
            if actual != expected_version {
                // Dropping the transaction without commit aborts it.
                return Err(StateError::Conflict {
                    name: name.to_string(),
                    expected: expected_version.to_string(),
                    actual,
                });
            }

            let cluster = Cluster {
                labels: labels.clone(),
                ..current.cluster
            };
            record = ClusterRecord::new(&cluster, current.generation + 1, epoch_secs());
            write_record(&mut table, &record)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cluster = name, generation = record.generation, "cluster labels updated");
        Ok(record.into_cluster())
    }
}

fn read_record(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    name: &str,
) -> StateResult<Option<ClusterRecord>> {
    match table.get(name).map_err(map_err!(Read))? {
        Some(guard) => {
            let record: ClusterRecord =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

fn write_record(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    record: &ClusterRecord,
) -> StateResult<()> {
    let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
    table
        .insert(record.cluster.name.as_str(), value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

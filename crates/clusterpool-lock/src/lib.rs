//! clusterpool-lock: exclusive custody of pool clusters for CI runs.
//!
//! There is no lock server. A cluster is held while its lock label carries
//! a value, and the only thing that keeps two callers from claiming the same
//! cluster is the registry's version-conditioned label write: the loser of a
//! race gets [`RegistryError::Conflict`] and moves on to its next candidate.
//!
//! # Components
//!
//! - **`registry`**: the [`ClusterRegistry`] capability set the protocols run against
//! - **`store_registry`** / **`gke`**: registry adapters (redb pool, GKE API)
//! - **`token`**: lock token generation
//! - **`selector`**: eligible candidate selection
//! - **`claim`** / **`release`**: the lock and unlock protocols
//! - **`verify`** / **`context`**: post-claim connection checks

pub mod claim;
pub mod context;
pub mod error;
pub mod gke;
pub mod manager;
pub mod registry;
pub mod release;
pub mod selector;
pub mod store_registry;
pub mod token;
pub mod verify;

pub use claim::{Claim, ClaimState};
pub use context::{ConnectOnly, Connector, ContextFile, ContextReader, GcloudConnector, KubectlContext};
pub use error::{LockError, LockResult};
pub use gke::GkeRegistry;
pub use manager::{ClaimOptions, LockManager};
pub use registry::{ClusterRegistry, RegistryError, RegistryFuture};
pub use selector::select_candidates;
pub use store_registry::StoreRegistry;
pub use token::new_lock_token;

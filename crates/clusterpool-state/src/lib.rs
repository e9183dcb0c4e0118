//! clusterpool-state: embedded cluster registry for clusterpool.
//!
//! Backed by [redb](https://docs.rs/redb). Each cluster record is stored as
//! JSON under its name, together with a generation counter that is bumped on
//! every write. Label updates are conditional on the generation the caller
//! last read, which is what lets independent callers share one pool without
//! any other locking.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::ClusterRecord;

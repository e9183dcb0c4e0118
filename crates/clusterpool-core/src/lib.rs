pub mod config;
pub mod labels;
pub mod types;

pub use config::PoolConfig;
pub use labels::Labels;
pub use types::*;

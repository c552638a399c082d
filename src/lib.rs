//! Batch Proof-of-Work Miner
//!
//! Searches the 32-bit nonce space of an 80-byte block header for a double
//! SHA-256 digest below the target encoded in the header's compact bits:
//! - Batched dispatch to interchangeable hashing devices
//! - Multi-threaded CPU device
//! - External device integration (GPU hashers)
//! - Shared statistics and periodic progress reporting
//! - Benchmark mode with throughput and efficiency estimates

pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod miner;
pub mod reporter;
pub mod stats;
pub mod types;
pub mod utils;

pub use config::Config;
pub use device::{BatchDevice, BatchOutcome, DeviceFactory};
pub use error::{Error, Result};
pub use miner::{BenchmarkSummary, Miner, MinerConfig, MinerState, MiningOutcome};
pub use stats::{MiningStats, StatsSnapshot};
pub use types::*;

/// Application information
pub const APP_NAME: &str = "batch-pow-miner";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

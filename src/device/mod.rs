//! Batch hashing devices
//!
//! A device scans a contiguous range of nonces for one serialized header and
//! reports whether any of them produces a digest below the target. The miner
//! owns all nonce bookkeeping; devices keep no state between calls.

use crate::types::HEADER_SIZE;
use crate::{Result, Target};
use std::sync::Arc;

pub mod cpu;
pub mod external;

pub use cpu::CpuDevice;
pub use external::ExternalDevice;

/// Result of scanning one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    /// Nonce that solves the header, if the batch contained one
    pub solution: Option<u32>,
    /// Abbreviated value of the lowest digest seen, for devices that track it
    pub best_hash: Option<u32>,
}

impl BatchOutcome {
    /// Batch scanned without a solution
    pub fn none() -> Self {
        Self::default()
    }

    /// Batch contained a solving nonce
    pub fn solved(nonce: u32) -> Self {
        Self {
            solution: Some(nonce),
            best_hash: None,
        }
    }

    /// Decode a raw device result where zero means "no solution"
    pub fn from_raw(result: u32) -> Self {
        if result == 0 {
            Self::none()
        } else {
            Self::solved(result)
        }
    }

    pub fn with_best_hash(mut self, best_hash: Option<u32>) -> Self {
        self.best_hash = best_hash;
        self
    }
}

/// Batch hashing device trait
///
/// `scan` is a blocking call and may take a long time; the miner runs it on
/// the blocking thread pool. The header is borrowed immutably.
pub trait BatchDevice: Send + Sync {
    /// Get the device name for logging
    fn name(&self) -> &'static str;

    /// Scan `batch_width` nonces starting at `nonce_start`.
    ///
    /// Nonces past `u32::MAX` are not scanned. A returned error is fatal to
    /// the mining session.
    fn scan(
        &self,
        header: &[u8; HEADER_SIZE],
        nonce_start: u32,
        target: &Target,
        batch_width: u32,
    ) -> Result<BatchOutcome>;
}

/// Device factory for creating the supported device kinds
pub struct DeviceFactory;

impl DeviceFactory {
    /// Create a multi-threaded CPU device
    pub fn create_cpu_device(thread_count: usize) -> Arc<dyn BatchDevice> {
        Arc::new(CpuDevice::new(thread_count))
    }

    /// Create a device that runs an external command per batch
    pub fn create_external_device(command: String) -> Arc<dyn BatchDevice> {
        Arc::new(ExternalDevice::new(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_raw() {
        assert_eq!(BatchOutcome::from_raw(0), BatchOutcome::none());
        assert_eq!(BatchOutcome::from_raw(42).solution, Some(42));
    }

    #[test]
    fn test_outcome_with_best_hash() {
        let outcome = BatchOutcome::none().with_best_hash(Some(7));
        assert_eq!(outcome.solution, None);
        assert_eq!(outcome.best_hash, Some(7));
    }

    #[test]
    fn test_device_factory() {
        let cpu = DeviceFactory::create_cpu_device(2);
        let external = DeviceFactory::create_external_device("gpu-miner".to_string());

        assert_eq!(cpu.name(), "cpu");
        assert_eq!(external.name(), "external");
    }
}

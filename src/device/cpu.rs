//! CPU batch device
//!
//! Scans a batch with double SHA-256 on scoped worker threads. Each thread
//! takes a contiguous slice of the batch.

use super::{BatchDevice, BatchOutcome};
use crate::crypto::{abbreviate_hash, hash_below_target, DoubleSha256};
use crate::types::HEADER_SIZE;
use crate::{Error, Result, Target};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, info};

/// Byte offset of the nonce in a serialized header
const NONCE_OFFSET: usize = 76;

/// Result of one worker thread's slice
#[derive(Debug, Default)]
struct SliceResult {
    solution: Option<u32>,
    best_hash: Option<u32>,
}

/// CPU device using multiple threads per batch
pub struct CpuDevice {
    thread_count: usize,
}

impl CpuDevice {
    /// Create a new CPU device, 0 threads means one per logical CPU
    pub fn new(thread_count: usize) -> Self {
        let thread_count = if thread_count == 0 {
            num_cpus::get()
        } else {
            thread_count
        };

        info!("Creating CPU device with {} threads", thread_count);

        Self { thread_count }
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    fn scan_slice(
        header: &[u8; HEADER_SIZE],
        start: u64,
        end: u64,
        target_le: Option<&[u8; 32]>,
        found: &AtomicBool,
    ) -> SliceResult {
        let mut work = *header;
        let mut hasher = DoubleSha256::new();
        let mut result = SliceResult::default();

        for nonce in start..end {
            // Another slice already won; check cheaply every 4096 nonces
            if nonce & 0xfff == 0 && found.load(Ordering::Relaxed) {
                break;
            }

            let nonce = nonce as u32;
            work[NONCE_OFFSET..].copy_from_slice(&nonce.to_le_bytes());
            let hash = hasher.hash(&work);

            let abbreviated = abbreviate_hash(&hash);
            if result.best_hash.map_or(true, |best| abbreviated < best) {
                result.best_hash = Some(abbreviated);
            }

            let solved = match target_le {
                Some(target_le) => hash_below_target(&hash, target_le),
                None => true,
            };
            if solved {
                result.solution = Some(nonce);
                found.store(true, Ordering::Relaxed);
                break;
            }
        }

        result
    }
}

impl BatchDevice for CpuDevice {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn scan(
        &self,
        header: &[u8; HEADER_SIZE],
        nonce_start: u32,
        target: &Target,
        batch_width: u32,
    ) -> Result<BatchOutcome> {
        let start = u64::from(nonce_start);
        let end = (start + u64::from(batch_width)).min(u64::from(u32::MAX) + 1);
        if start >= end {
            return Ok(BatchOutcome::none());
        }

        let target_le = target.to_le_bytes32();
        let found = AtomicBool::new(false);
        let span = end - start;
        let threads = (self.thread_count as u64).clamp(1, span);
        let chunk = span.div_ceil(threads);

        let results = thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|i| {
                    let slice_start = start + i * chunk;
                    let slice_end = (slice_start + chunk).min(end);
                    let target_le = target_le.as_ref();
                    let found = &found;
                    scope.spawn(move || {
                        Self::scan_slice(header, slice_start, slice_end, target_le, found)
                    })
                })
                .collect();

            // Join every handle before inspecting results
            let joined: Vec<_> = handles.into_iter().map(|handle| handle.join()).collect();
            joined.into_iter().collect::<std::result::Result<Vec<_>, _>>()
        })
        .map_err(|_| Error::device(self.name(), -1, "CPU hashing thread panicked"))?;

        let solution = results.iter().filter_map(|r| r.solution).min();
        let best_hash = results.iter().filter_map(|r| r.best_hash).min();

        if let Some(nonce) = solution {
            debug!("CPU device found nonce {} in batch at {}", nonce, nonce_start);
        }

        Ok(BatchOutcome {
            solution,
            best_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockHeader;

    fn header_bytes() -> [u8; HEADER_SIZE] {
        BlockHeader {
            version: 1,
            prev_block_hash: [0u8; 32],
            merkle_root: [3u8; 32],
            timestamp: 1_600_000_000,
            bits: 0x2000_ffff,
            nonce: 0,
        }
        .serialize()
    }

    #[test]
    fn test_cpu_device_creation() {
        let device = CpuDevice::new(2);
        assert_eq!(device.thread_count(), 2);
        assert_eq!(device.name(), "cpu");
        assert!(CpuDevice::new(0).thread_count() >= 1);
    }

    #[test]
    fn test_easy_target_solves_first_nonce() {
        let device = CpuDevice::new(1);
        let target = Target::from_bits(0xff00_ffff);

        let outcome = device.scan(&header_bytes(), 10, &target, 100).unwrap();
        assert_eq!(outcome.solution, Some(10));
    }

    #[test]
    fn test_solution_actually_meets_target() {
        let device = CpuDevice::new(4);
        // Roughly one in 256 digests qualify
        let target = Target::from_bits(0x2000_ffff);
        let header = header_bytes();

        let outcome = device.scan(&header, 0, &target, 20_000).unwrap();
        let nonce = outcome.solution.expect("a solution within 20k nonces");

        let mut solved = BlockHeader::deserialize(&header).unwrap();
        solved.nonce = nonce;
        assert!(target.is_met_by(&solved.hash()));
    }

    #[test]
    fn test_zero_target_never_solves() {
        let device = CpuDevice::new(2);
        let target = Target::from_bits(0);

        let outcome = device.scan(&header_bytes(), 0, &target, 1000).unwrap();
        assert_eq!(outcome.solution, None);
        assert!(outcome.best_hash.is_some());
    }

    #[test]
    fn test_best_hash_is_batch_minimum() {
        let device = CpuDevice::new(3);
        let target = Target::from_bits(0);
        let header = header_bytes();

        let outcome = device.scan(&header, 500, &target, 300).unwrap();

        let expected = (500u32..800)
            .map(|nonce| {
                let mut h = BlockHeader::deserialize(&header).unwrap();
                h.nonce = nonce;
                abbreviate_hash(&h.hash())
            })
            .min();
        assert_eq!(outcome.best_hash, expected);
    }

    #[test]
    fn test_batch_is_clamped_at_nonce_space_end() {
        let device = CpuDevice::new(2);
        let target = Target::from_bits(0);

        let outcome = device
            .scan(&header_bytes(), u32::MAX - 4, &target, 1_000_000)
            .unwrap();
        assert_eq!(outcome.solution, None);
        assert!(outcome.best_hash.is_some());
    }
}

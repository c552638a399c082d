//! Utility functions and helpers
//!
//! Time, rate and formatting helpers shared by the miner and reporter.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Windows shorter than this produce a hash rate of zero
pub const MIN_RATE_WINDOW: Duration = Duration::from_millis(1);

/// Get current timestamp in seconds since Unix epoch
pub fn current_timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Hashes per second over a time period, zero for degenerate windows
pub fn compute_hash_rate(hashes: u64, elapsed: Duration) -> f64 {
    if elapsed >= MIN_RATE_WINDOW {
        hashes as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Format hash rate as a human-readable string
pub fn format_hash_rate(hashes_per_sec: f64) -> String {
    const UNITS: &[&str] = &["H/s", "KH/s", "MH/s", "GH/s", "TH/s", "PH/s"];
    let mut rate = hashes_per_sec;
    let mut unit_index = 0;

    while rate >= 1000.0 && unit_index < UNITS.len() - 1 {
        rate /= 1000.0;
        unit_index += 1;
    }

    format!("{:.2} {}", rate, UNITS[unit_index])
}

/// Format duration as a human-readable string
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        let secs = seconds % 60;
        format!("{}h {}m {}s", hours, minutes, secs)
    } else {
        let days = seconds / 86400;
        let hours = (seconds % 86400) / 3600;
        format!("{}d {}h", days, hours)
    }
}

/// Format an abbreviated best hash, or a dash when nothing was recorded
pub fn format_best_hash(best: Option<u32>) -> String {
    match best {
        Some(value) => format!("{:08x}", value),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hash_rate() {
        assert_eq!(format_hash_rate(100.0), "100.00 H/s");
        assert_eq!(format_hash_rate(1500.0), "1.50 KH/s");
        assert_eq!(format_hash_rate(1000000.0), "1.00 MH/s");
        assert_eq!(format_hash_rate(1500000000.0), "1.50 GH/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
        assert_eq!(format_duration(Duration::from_secs(90000)), "1d 1h");
    }

    #[test]
    fn test_compute_hash_rate() {
        assert_eq!(compute_hash_rate(1000, Duration::from_secs(10)), 100.0);
        assert_eq!(compute_hash_rate(0, Duration::from_secs(10)), 0.0);
        assert_eq!(compute_hash_rate(1000, Duration::ZERO), 0.0);
        assert_eq!(compute_hash_rate(1000, Duration::from_nanos(10)), 0.0);
    }

    #[test]
    fn test_format_best_hash() {
        assert_eq!(format_best_hash(None), "-");
        assert_eq!(format_best_hash(Some(0xabc)), "00000abc");
    }

    #[test]
    fn test_current_timestamp() {
        let ts_secs = current_timestamp_secs();
        assert!(ts_secs > 1_600_000_000);
    }
}

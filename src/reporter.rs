//! Periodic progress reporting
//!
//! Runs beside the mining loop, reads stats snapshots on a fixed interval and
//! logs a progress line. It never touches mining state and exits once the
//! session's cancellation token fires.

use crate::stats::{MiningStats, StatsSnapshot};
use crate::utils::{format_best_hash, format_duration, format_hash_rate};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Default time between progress lines
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(3);

/// Background progress reporter for one session
pub struct Reporter {
    stats: Arc<MiningStats>,
    cancellation: CancellationToken,
    interval: Duration,
    detail: Option<ReportDetail>,
}

/// Extra figures printed in debug mode
#[derive(Debug, Clone, Copy)]
pub struct ReportDetail {
    pub batch_width: u32,
    pub power_watts: f64,
}

impl Reporter {
    pub fn new(stats: Arc<MiningStats>, cancellation: CancellationToken, interval: Duration) -> Self {
        Self {
            stats,
            cancellation,
            interval,
            detail: None,
        }
    }

    /// Include batch width, blocks, best hash and efficiency in each report
    pub fn with_detail(mut self, detail: ReportDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Start reporting. The handle resolves to the number of reports emitted.
    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    async fn run(self) -> u64 {
        // First report one full interval after start
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reports = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.cancellation.is_cancelled() {
                        break;
                    }

                    let snapshot = self.stats.snapshot();
                    info!("{}", format_report(&snapshot));
                    if let Some(detail) = &self.detail {
                        info!("{}", format_detail(&snapshot, detail));
                    }
                    reports += 1;
                }
                _ = self.cancellation.cancelled() => break,
            }
        }

        reports
    }
}

/// One-line progress summary
pub fn format_report(snapshot: &StatsSnapshot) -> String {
    format!(
        "Hash rate: {}, hashes: {}, time: {}",
        format_hash_rate(snapshot.hash_rate),
        snapshot.hashes_tried,
        format_duration(snapshot.elapsed)
    )
}

/// Debug-mode detail line
pub fn format_detail(snapshot: &StatsSnapshot, detail: &ReportDetail) -> String {
    format!(
        "Batch width: {}, blocks: {}, best hash: {}, efficiency: {:.2} MH/W (at {:.0} W)",
        detail.batch_width,
        snapshot.blocks_found,
        format_best_hash(snapshot.best_hash),
        efficiency_mh_per_watt(snapshot.hash_rate, detail.power_watts),
        detail.power_watts
    )
}

/// Megahashes per second per watt, zero for a non-positive power draw
pub fn efficiency_mh_per_watt(hash_rate: f64, power_watts: f64) -> f64 {
    if power_watts > 0.0 {
        hash_rate / 1_000_000.0 / power_watts
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> StatsSnapshot {
        StatsSnapshot {
            hashes_tried: 5_000_000,
            blocks_found: 1,
            elapsed: Duration::from_secs(2),
            hash_rate: 2_500_000.0,
            best_hash: Some(0x0000_abcd),
            closest_attempts: vec![0x0000_abcd],
        }
    }

    #[test]
    fn test_format_report() {
        let line = format_report(&snapshot());
        assert_eq!(line, "Hash rate: 2.50 MH/s, hashes: 5000000, time: 2.0s");
    }

    #[test]
    fn test_format_detail() {
        let detail = ReportDetail {
            batch_width: 262_144,
            power_watts: 320.0,
        };
        let line = format_detail(&snapshot(), &detail);
        assert!(line.contains("Batch width: 262144"));
        assert!(line.contains("best hash: 0000abcd"));
        assert!(line.contains("blocks: 1"));
    }

    #[test]
    fn test_efficiency() {
        assert_eq!(efficiency_mh_per_watt(320_000_000.0, 320.0), 1.0);
        assert_eq!(efficiency_mh_per_watt(1000.0, 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_reporter_ticks_until_cancelled() {
        let stats = Arc::new(MiningStats::new());
        let cancellation = CancellationToken::new();
        let handle = Reporter::new(
            Arc::clone(&stats),
            cancellation.clone(),
            Duration::from_millis(20),
        )
        .with_detail(ReportDetail {
            batch_width: 1024,
            power_watts: 320.0,
        })
        .spawn();

        stats.increment_hashes(1024);
        tokio::time::sleep(Duration::from_millis(110)).await;
        cancellation.cancel();

        let reports = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reporter should stop after cancellation")
            .unwrap();
        assert!(reports >= 2, "expected at least two reports, got {}", reports);
    }

    #[tokio::test]
    async fn test_reporter_exits_immediately_when_already_cancelled() {
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let handle = Reporter::new(
            Arc::new(MiningStats::new()),
            cancellation,
            Duration::from_millis(10),
        )
        .spawn();

        let reports = handle.await.unwrap();
        assert_eq!(reports, 0);
    }
}

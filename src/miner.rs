//! Mining orchestrator
//!
//! Drives one mining session: dispatches consecutive nonce batches to a
//! [`BatchDevice`], feeds the shared [`MiningStats`], refreshes the header
//! timestamp when the nonce space is exhausted and stops on a solution, a
//! device failure or cooperative cancellation.
//!
//! Session states move `Idle -> Running -> {Solved, Stopped, Failed}`. A miner
//! runs a single session; its cancellation token is cancelled when the session
//! ends, whatever the outcome.

use crate::crypto::{abbreviate_hash, hash_to_hex};
use crate::device::{BatchDevice, BatchOutcome};
use crate::reporter::{efficiency_mh_per_watt, ReportDetail, Reporter, DEFAULT_REPORT_INTERVAL};
use crate::stats::{MiningStats, StatsSnapshot};
use crate::types::HEADER_SIZE;
use crate::utils::{current_timestamp_secs, format_best_hash, format_duration, format_hash_rate};
use crate::{BlockHeader, Error, Result, Target};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};
use uuid::Uuid;

/// Nonces per device call
pub const DEFAULT_BATCH_WIDTH: u32 = 1024 * 256;

/// Assumed device power draw for efficiency figures
pub const DEFAULT_POWER_WATTS: f64 = 320.0;

/// Lifecycle of a mining session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MinerState {
    Idle,
    Running,
    Solved,
    Stopped,
    Failed,
}

impl MinerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MinerState::Solved | MinerState::Stopped | MinerState::Failed)
    }
}

impl fmt::Display for MinerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinerState::Idle => write!(f, "idle"),
            MinerState::Running => write!(f, "running"),
            MinerState::Solved => write!(f, "solved"),
            MinerState::Stopped => write!(f, "stopped"),
            MinerState::Failed => write!(f, "failed"),
        }
    }
}

/// How a session ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningOutcome {
    /// Header with the winning nonce filled in
    Solved(BlockHeader),
    /// Cancellation was requested before a solution was found
    Stopped,
}

impl MiningOutcome {
    pub fn solved_header(&self) -> Option<&BlockHeader> {
        match self {
            MiningOutcome::Solved(header) => Some(header),
            MiningOutcome::Stopped => None,
        }
    }
}

/// Tunables for a mining session
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub batch_width: u32,
    pub report_interval: Duration,
    /// Log session details, every round and extended progress lines
    pub debug: bool,
    pub power_watts: f64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            batch_width: DEFAULT_BATCH_WIDTH,
            report_interval: DEFAULT_REPORT_INTERVAL,
            debug: false,
            power_watts: DEFAULT_POWER_WATTS,
        }
    }
}

/// Figures collected at the end of a benchmark run
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkSummary {
    pub duration: Duration,
    pub hashes_tried: u64,
    pub blocks_found: u64,
    pub hash_rate: f64,
    pub best_hash: Option<u32>,
    /// `hash_rate * 86400 / 1e18`
    pub theoretical_coins_per_day: f64,
    pub efficiency_mh_per_watt: f64,
    pub solved: Option<BlockHeader>,
}

impl BenchmarkSummary {
    fn new(duration: Duration, snapshot: &StatsSnapshot, power_watts: f64, solved: Option<BlockHeader>) -> Self {
        Self {
            duration,
            hashes_tried: snapshot.hashes_tried,
            blocks_found: snapshot.blocks_found,
            hash_rate: snapshot.hash_rate,
            best_hash: snapshot.best_hash,
            theoretical_coins_per_day: snapshot.hash_rate * 86_400.0 / 1e18,
            efficiency_mh_per_watt: efficiency_mh_per_watt(snapshot.hash_rate, power_watts),
            solved,
        }
    }
}

impl fmt::Display for BenchmarkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Benchmark results")?;
        writeln!(f, "  Duration:        {}", format_duration(self.duration))?;
        writeln!(f, "  Total hashes:    {}", self.hashes_tried)?;
        writeln!(f, "  Average rate:    {}", format_hash_rate(self.hash_rate))?;
        writeln!(f, "  Blocks found:    {}", self.blocks_found)?;
        writeln!(f, "  Best hash:       {}", format_best_hash(self.best_hash))?;
        writeln!(f, "  Coins/day (th.): {:.12}", self.theoretical_coins_per_day)?;
        write!(f, "  Efficiency:      {:.2} MH/W", self.efficiency_mh_per_watt)?;
        if let Some(header) = &self.solved {
            write!(f, "\n  Solved during benchmark: {}", header)?;
        }
        Ok(())
    }
}

/// Batch mining orchestrator for one session
pub struct Miner {
    device: Arc<dyn BatchDevice>,
    config: MinerConfig,
    stats: Arc<MiningStats>,
    state: Mutex<MinerState>,
    cancellation: CancellationToken,
}

impl Miner {
    pub fn new(device: Arc<dyn BatchDevice>, config: MinerConfig) -> Self {
        Self {
            device,
            config,
            stats: Arc::new(MiningStats::new()),
            state: Mutex::new(MinerState::Idle),
            cancellation: CancellationToken::new(),
        }
    }

    /// Token that stops the session when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Request a cooperative stop; takes effect after the in-flight batch
    pub fn stop(&self) {
        self.cancellation.cancel();
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock() == MinerState::Running && !self.cancellation.is_cancelled()
    }

    pub fn state(&self) -> MinerState {
        *self.state.lock()
    }

    /// Shared statistics, readable during and after the session
    pub fn stats(&self) -> Arc<MiningStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Search for a nonce that brings `header`'s digest below `target`.
    ///
    /// Starts at the header's current nonce. Returns the solved header, or
    /// `Stopped` once cancellation is observed between batches. Device
    /// failures end the session with an error; stats stay readable.
    pub async fn mine(&self, header: BlockHeader, target: Target) -> Result<MiningOutcome> {
        if self.config.batch_width == 0 {
            return Err(Error::config("Batch width must be greater than 0"));
        }

        {
            let mut state = self.state.lock();
            if *state != MinerState::Idle {
                return Err(Error::invalid_state(format!(
                    "Mining session already {}",
                    *state
                )));
            }
            *state = MinerState::Running;
        }

        let span = mining_span(self.device.name(), Uuid::new_v4());
        self.run_session(header, target).instrument(span).await
    }

    async fn run_session(&self, header: BlockHeader, target: Target) -> Result<MiningOutcome> {
        if self.config.debug {
            info!("Mining details: {}", header);
            info!("Target: {}", target.to_hex_be());
            info!("Nonces per batch: {}", self.config.batch_width);
        }
        info!(
            "Starting batch mining on {} device (difficulty {:.4})",
            self.device.name(),
            target.difficulty()
        );

        self.stats.mark_started();

        let mut reporter = Reporter::new(
            Arc::clone(&self.stats),
            self.cancellation.clone(),
            self.config.report_interval,
        );
        if self.config.debug {
            reporter = reporter.with_detail(ReportDetail {
                batch_width: self.config.batch_width,
                power_watts: self.config.power_watts,
            });
        }
        let reporter_handle = reporter.spawn();

        let result = self.mining_loop(header, target).await;

        let final_state = match &result {
            Ok(MiningOutcome::Solved(_)) => MinerState::Solved,
            Ok(MiningOutcome::Stopped) => MinerState::Stopped,
            Err(_) => MinerState::Failed,
        };
        *self.state.lock() = final_state;

        // Session over: release the reporter and any other token holders
        self.cancellation.cancel();
        if let Err(e) = reporter_handle.await {
            warn!("Progress reporter ended abnormally: {}", e);
        }

        let snapshot = self.stats.snapshot();
        match &result {
            Ok(MiningOutcome::Solved(solved)) => log_solution(solved, &snapshot),
            Ok(MiningOutcome::Stopped) => info!(
                "Mining stopped after {} hashes in {} ({})",
                snapshot.hashes_tried,
                format_duration(snapshot.elapsed),
                format_hash_rate(snapshot.hash_rate)
            ),
            Err(e) => error!(
                "Mining failed ({}): {}. {} hashes tried before failure",
                e.category(),
                e,
                snapshot.hashes_tried
            ),
        }

        result
    }

    async fn mining_loop(&self, mut header: BlockHeader, target: Target) -> Result<MiningOutcome> {
        let target = Arc::new(target);
        let batch_width = self.config.batch_width;
        let mut nonce = header.nonce;
        let mut round = 0u64;

        loop {
            if self.cancellation.is_cancelled() {
                debug!("Cancellation observed after {} rounds", round);
                return Ok(MiningOutcome::Stopped);
            }

            round += 1;
            if self.config.debug {
                info!("Mining round {}, nonce start: {}", round, nonce);
            }

            let outcome = self.dispatch(header.serialize(), nonce, &target).await?;

            // The device does not say how far it got; count the whole batch
            self.stats.increment_hashes(u64::from(batch_width));
            if let Some(best) = outcome.best_hash {
                if self.stats.update_best_hash(best) {
                    debug!("New best hash {:08x} in round {}", best, round);
                }
            }

            if let Some(winner) = outcome.solution {
                header.nonce = winner;
                self.stats.increment_blocks();
                self.stats.update_best_hash(abbreviate_hash(&header.hash()));
                return Ok(MiningOutcome::Solved(header));
            }

            nonce = match nonce.checked_add(batch_width) {
                Some(next) => next,
                None => {
                    header.timestamp = current_timestamp_secs() as u32;
                    if self.config.debug {
                        info!("Nonce overflow, timestamp updated to {}", header.timestamp);
                    } else {
                        debug!("Nonce overflow, timestamp updated to {}", header.timestamp);
                    }
                    0
                }
            };
        }
    }

    /// Run one batch on the blocking pool
    async fn dispatch(
        &self,
        header: [u8; HEADER_SIZE],
        nonce_start: u32,
        target: &Arc<Target>,
    ) -> Result<BatchOutcome> {
        let device = Arc::clone(&self.device);
        let target = Arc::clone(target);
        let batch_width = self.config.batch_width;

        task::spawn_blocking(move || device.scan(&header, nonce_start, &target, batch_width)).await?
    }

    /// Mine the test header until `duration` elapses or a block is found.
    ///
    /// The timer stops the session through the same token as any other
    /// cancellation source.
    pub async fn benchmark(&self, duration: Duration) -> Result<BenchmarkSummary> {
        let header = BlockHeader::test_header();
        let target = header.target();

        info!("Starting benchmark for {}", humantime::format_duration(duration));

        let timer_token = self.cancellation.clone();
        let timer = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => timer_token.cancel(),
                _ = timer_token.cancelled() => {}
            }
        });

        let start = Instant::now();
        let result = self.mine(header, target).await;
        let actual_duration = start.elapsed();

        timer.abort();

        let outcome = result?;
        let summary = BenchmarkSummary::new(
            actual_duration,
            &self.stats.snapshot(),
            self.config.power_watts,
            outcome.solved_header().copied(),
        );

        if summary.solved.is_some() {
            info!("Block found during benchmark");
        }

        Ok(summary)
    }

    /// Benchmark figures for whatever the session has done so far.
    ///
    /// Used to report a benchmark that ended with a device failure.
    pub fn partial_summary(&self) -> BenchmarkSummary {
        let snapshot = self.stats.snapshot();
        BenchmarkSummary::new(snapshot.elapsed, &snapshot, self.config.power_watts, None)
    }
}

fn log_solution(header: &BlockHeader, snapshot: &StatsSnapshot) {
    info!("Block found");
    info!("Winning nonce: {}", header.nonce);
    info!("Final hash: {}", hash_to_hex(&header.hash()));
    info!("Total attempts: {}", snapshot.hashes_tried);
    info!("Hash rate: {}", format_hash_rate(snapshot.hash_rate));
    info!("Total time: {}", format_duration(snapshot.elapsed));
    info!("Blocks found: {}", snapshot.blocks_found);
    info!("Best hash: {}", format_best_hash(snapshot.best_hash));
}

/// Create a tracing span for a mining session
pub fn mining_span(device: &str, session: Uuid) -> Span {
    tracing::info_span!("mining", device = device, session = %session)
}

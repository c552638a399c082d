//! Batch PoW Miner - Main Application
//!
//! Mines a test header in solo mode, measures throughput in benchmark mode, or
//! prints system information.

use anyhow::Context;
use batch_pow_miner::{
    config::{Config, Mode},
    crypto::hash_to_hex,
    utils::format_best_hash,
    BenchmarkSummary, BlockHeader, Miner, MinerState, MiningOutcome, StatsSnapshot, APP_DESCRIPTION, APP_NAME,
    APP_VERSION,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load and validate configuration
    let config = Config::load().await.context("Invalid configuration")?;

    // Initialize tracing
    let level: tracing::Level = config.effective_log_level().into();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    tracing_subscriber::registry()
        .with((!config.json).then(|| fmt::layer().with_target(false)))
        .with(config.json.then(|| fmt::layer().json().with_target(false)))
        .with(filter)
        .init();

    if config.print_config {
        print_configuration(&config)?;
        return Ok(());
    }

    match config.mode {
        Mode::Info => {
            print_info();
            Ok(())
        }
        Mode::Solo => run_solo(&config).await,
        Mode::Benchmark => run_benchmark(&config).await,
    }
}

/// Mine the configured header until solved, interrupted or out of time
async fn run_solo(config: &Config) -> anyhow::Result<()> {
    info!("Starting {} v{}", APP_NAME, APP_VERSION);
    info!(
        "Configuration: mode={}, device={}, batch width={}",
        config.mode, config.device, config.batch_width
    );

    let device = config.create_device()?;
    let miner = Arc::new(Miner::new(device, config.miner_config()));
    let header = config.header()?;
    let target = header.target();

    let signals = spawn_signal_handler(miner.cancellation_token());
    let timer = config
        .run_duration()?
        .map(|duration| spawn_stop_timer(miner.cancellation_token(), duration));

    let result = miner.mine(header, target).await;

    signals.abort();
    if let Some(timer) = timer {
        timer.abort();
    }

    let outcome = result.context("Mining session failed")?;

    if config.json {
        let report = SessionReport::new(&miner, &outcome);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match outcome {
        MiningOutcome::Solved(solved) => {
            println!("Block found");
            println!("  Nonce: {}", solved.nonce);
            println!("  Hash:  {}", hash_to_hex(&solved.hash()));
            println!("  {}", solved);
        }
        MiningOutcome::Stopped => {
            let snapshot = miner.stats().snapshot();
            println!(
                "Stopped after {} hashes, best hash {}",
                snapshot.hashes_tried,
                format_best_hash(snapshot.best_hash)
            );
        }
    }

    Ok(())
}

/// Machine-readable result of a solo session
#[derive(Debug, Serialize)]
struct SessionReport {
    state: MinerState,
    solved: Option<BlockHeader>,
    hash: Option<String>,
    stats: StatsSnapshot,
}

impl SessionReport {
    fn new(miner: &Miner, outcome: &MiningOutcome) -> Self {
        let solved = outcome.solved_header().copied();
        Self {
            state: miner.state(),
            hash: solved.map(|header| hash_to_hex(&header.hash())),
            solved,
            stats: miner.stats().snapshot(),
        }
    }
}

/// Mine the test header for a fixed duration and print the summary
async fn run_benchmark(config: &Config) -> anyhow::Result<()> {
    let duration = config.benchmark_duration()?;
    let device = config.create_device()?;
    let miner = Arc::new(Miner::new(device, config.miner_config()));

    let signals = spawn_signal_handler(miner.cancellation_token());
    let result = miner.benchmark(duration).await;
    signals.abort();

    match result {
        Ok(summary) => print_summary(config, &summary),
        Err(e) => {
            // Report what was measured before the device gave up
            print_summary(config, &miner.partial_summary())?;
            Err(e).context("Benchmark failed")
        }
    }
}

/// Print a benchmark summary as text or JSON
fn print_summary(config: &Config, summary: &BenchmarkSummary) -> anyhow::Result<()> {
    if config.json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{}", summary);
    }
    Ok(())
}

/// Cancel the session on Ctrl-C or SIGTERM
fn spawn_signal_handler(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("Shutdown signal received, stopping after the current batch");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Cancel the session once `duration` has elapsed
fn spawn_stop_timer(token: CancellationToken, duration: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                info!("Run duration of {} reached", humantime::format_duration(duration));
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

/// Print system information
fn print_info() {
    println!("{} v{}", APP_NAME, APP_VERSION);
    println!("{}", APP_DESCRIPTION);
    println!();
    println!("OS:           {}", std::env::consts::OS);
    println!("Architecture: {}", std::env::consts::ARCH);
    println!("CPU count:    {}", num_cpus::get());
}

/// Print current configuration
fn print_configuration(config: &Config) -> anyhow::Result<()> {
    let config_yaml = serde_yaml::to_string(config)?;
    println!("{}", config_yaml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_info_function() {
        // Should not panic
        print_info();
    }

    #[test]
    fn test_config_printing() {
        let config = Config::try_parse_from(vec![
            "batch-pow-miner",
            "--device",
            "cpu",
            "--device-threads",
            "2",
        ])
        .unwrap();

        assert!(print_configuration(&config).is_ok());
    }

    #[tokio::test]
    async fn test_session_report_json() {
        use batch_pow_miner::device::CpuDevice;
        use batch_pow_miner::MinerConfig;

        let config = MinerConfig {
            batch_width: 1024,
            ..MinerConfig::default()
        };
        let miner = Miner::new(Arc::new(CpuDevice::new(1)), config);
        // Every digest is below a target this wide
        let header = BlockHeader::with_difficulty(0xff00_ffff);

        let outcome = miner.mine(header, header.target()).await.unwrap();
        let report = SessionReport::new(&miner, &outcome);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["state"], "solved");
        assert_eq!(json["solved"]["nonce"], 0);
        assert_eq!(json["stats"]["blocks_found"], 1);
        assert_eq!(json["hash"].as_str().map(str::len), Some(64));
    }

    #[test]
    fn test_summary_printing() {
        let config = Config::try_parse_from(["batch-pow-miner", "--json"]).unwrap();
        let miner = Miner::new(
            Arc::new(batch_pow_miner::device::CpuDevice::new(1)),
            config.miner_config(),
        );

        assert!(print_summary(&config, &miner.partial_summary()).is_ok());
    }

    #[tokio::test]
    async fn test_stop_timer_cancels_token() {
        let token = CancellationToken::new();
        let timer = spawn_stop_timer(token.clone(), Duration::from_millis(10));

        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("timer should cancel the token");
        timer.await.unwrap();
    }

    #[tokio::test]
    async fn test_signal_handler_exits_when_session_ends() {
        let token = CancellationToken::new();
        let handler = spawn_signal_handler(token.clone());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handler)
            .await
            .expect("handler should exit after cancellation")
            .unwrap();
    }
}

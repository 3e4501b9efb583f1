//! # Drone Ingest
//!
//! Ingest simulated drone telemetry over an in-process pub/sub bus into
//! minute-bucketed CSV files, while collecting per-topic delivery-quality
//! statistics on a parallel subscription.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber;

mod config;
mod error;
mod bus;
mod codec;
mod ingest;
mod stats;
mod sim;

use bus::Bus;
use config::Config;
use ingest::rotator::FileRotator;
use ingest::Coordinator;
use sim::DroneSimulator;
use stats::{report, StatCollector};

/// Topic filters the ingestion path subscribes to
const INGEST_FILTERS: &[&str] = &["drone/+/+/telemetry/+", "drone/+/+/status/battery"];

/// Topic filter the statistics path subscribes to (everything, including
/// messages the validator would reject)
const STATS_FILTERS: &[&str] = &["drone/#"];

/// Main entry point for the Drone Ingest application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load configuration (first CLI argument names a TOML file, else
///      defaults)
///    - Create the bus, the statistics collector and the file rotator
///
/// 2. **Tasks**
///    - One simulator task per configured drone, publishing GPS, altitude
///      and battery payloads with injected drops and duplicates
///    - A statistics task recording every arrival per topic
///    - A Ctrl+C watcher flipping the shared shutdown token exactly once
///
/// 3. **Ingestion (foreground)**
///    - The coordinator decodes, validates and persists messages until the
///      shutdown token flips, the bucket budget is exhausted, or every
///      publisher is gone
///
/// 4. **Graceful Shutdown**
///    - Flip the token so simulators stop, drain the statistics
///      subscription, log the delivery table and write the statistics CSV
///
/// # Errors
///
/// Returns error if:
/// - Configuration cannot be loaded or is invalid
/// - The initial output bucket cannot be created (fail fast)
/// - The statistics report cannot be written
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .init();

    info!("Drone Ingest v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1);
    let config = Config::load_or_default(config_path.as_deref())?;
    info!(
        "Storage: dir={} prefix={} max_files={}",
        config.storage.data_dir, config.storage.file_prefix, config.storage.max_files
    );
    info!(
        "Simulator: fleet={} drones={} rate={}Hz duration={}s drop_p={} dup_p={}",
        config.simulator.fleet,
        config.simulator.drone_count,
        config.simulator.rate_hz,
        config.simulator.duration_secs,
        config.simulator.drop_probability,
        config.simulator.duplicate_probability
    );

    let bus = Bus::new();
    let collector = Arc::new(StatCollector::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // Ctrl+C watcher; the token absorbs repeated signals so shutdown runs
    // exactly once per run
    {
        let shutdown_tx = Arc::clone(&shutdown_tx);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down...");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    // Statistics subscription: runs until every publisher handle is gone,
    // so queued arrivals are still counted after the producers stop
    let stats_handle = {
        let collector = Arc::clone(&collector);
        let mut sub = bus.subscribe(STATS_FILTERS);
        tokio::spawn(async move {
            while let Some(msg) = sub.recv().await {
                collector.record(&msg.topic, codec::decode_sequence(&msg.payload));
            }
        })
    };

    // Fleet simulators
    let mut sim_handles = Vec::new();
    for n in 0..config.simulator.drone_count {
        let drone_id = format!("d{:02}", n + 1);
        let simulator = DroneSimulator::new(bus.clone(), &config.simulator, &drone_id);
        sim_handles.push(tokio::spawn(simulator.run(
            config.simulator.rate_hz,
            config.simulator.duration_secs,
            shutdown_rx.clone(),
        )));
    }

    // Ingestion pipeline (foreground). Ensure the bus closes once the
    // simulators finish by releasing our own publisher handle first.
    let ingest_sub = bus.subscribe(INGEST_FILTERS);
    drop(bus);

    let rotator = FileRotator::new(
        &config.storage.data_dir,
        &config.storage.file_prefix,
        config.storage.max_files,
    )?;
    let run_result = Coordinator::new(rotator)
        .run(ingest_sub, shutdown_rx.clone())
        .await;

    // Whatever stopped ingestion (signal, budget, natural completion, or a
    // fail-fast startup error) now stops the rest of the process
    let _ = shutdown_tx.send(true);
    for handle in sim_handles {
        let _ = handle.await;
    }
    let _ = stats_handle.await;

    let coordinator = run_result?;

    let snapshot = collector.snapshot();
    info!("Delivery statistics:\n{}", report::render_table(&snapshot));

    let report_path = config.report_path();
    report::write_csv(&report_path, &snapshot)?;
    info!("Statistics written to {}", report_path.display());

    info!(
        "Done: {} rows written, {} rejected",
        coordinator.rows_written(),
        coordinator.rows_rejected()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_filters_cover_the_simulator_topics() {
        let topics = sim::DroneTopics::new("lab", "d01");
        for topic in [&topics.gps, &topics.alt, &topics.battery] {
            assert!(
                INGEST_FILTERS.iter().any(|f| bus::topic_matches(topic, f)),
                "{} not covered by ingest filters",
                topic
            );
        }
    }

    #[test]
    fn test_stats_filter_covers_everything_under_drone() {
        let topics = sim::DroneTopics::new("lab", "d01");
        for topic in [&topics.gps, &topics.alt, &topics.battery] {
            assert!(STATS_FILTERS.iter().any(|f| bus::topic_matches(topic, f)));
        }
    }
}

//! city-sync-client binary
//!
//! Initialises the traffic simulation, mirrors its entities locally and keeps
//! them in sync until Ctrl-C. A headless frame reader stands in for the
//! renderer and samples the scene at the configured frame rate.
//!
//! ## Configuration (file / env via `config` crate, flags override)
//!
//! | Key                           | Default                  | Description                    |
//! |-------------------------------|--------------------------|--------------------------------|
//! | `CITY_SYNC_SERVER_URL`        | `http://localhost:8585/` | Simulation server root         |
//! | `CITY_SYNC_TICK_INTERVAL_MS`  | `500`                    | Time between poll cycles       |
//! | `CITY_SYNC_STEP_BEFORE_POLL`  | `true`                   | Call `/update` before polling  |
//! | `CITY_SYNC_POLL_AFTER_FAILED_STEP` | `true`          | Poll even if `/update` failed  |
//! | `CITY_SYNC_EVICTION`          | `retain`                 | `retain` or `sweep`            |
//! | `CITY_SYNC_KINDS`             | all                      | Comma-separated kinds per tick |
//! | `CITY_SYNC_AGENTS`            | `500`                    | Cars requested on `/init`      |

use anyhow::{Context, Result};
use city_sync::{
    config::ClientConfig,
    sync::{EntitySynchronizer, EvictionPolicy},
    HttpSimulationClient, Poller, SharedSynchronizer,
};
use clap::Parser;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "city-sync-client", about = "Traffic simulation entity synchronizer", version)]
struct Args {
    /// TOML configuration file
    #[arg(long, short, env = "CITY_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Simulation server root URL
    #[arg(long)]
    server_url: Option<String>,

    /// Milliseconds between poll cycles
    #[arg(long)]
    tick_interval_ms: Option<u64>,

    /// Do not call /update before each poll
    #[arg(long)]
    no_step: bool,

    /// Remove entities the server stops reporting
    #[arg(long)]
    sweep: bool,

    /// Fetch car counters every tick
    #[arg(long)]
    counters: bool,

    /// Cars requested on /init
    #[arg(long)]
    agents: Option<u32>,
}

impl Args {
    fn apply(&self, cfg: &mut ClientConfig) {
        if let Some(url) = &self.server_url {
            cfg.server_url = url.clone();
        }
        if let Some(ms) = self.tick_interval_ms {
            cfg.tick_interval_ms = ms;
        }
        if let Some(n) = self.agents {
            cfg.agents = n;
        }
        if self.no_step {
            cfg.step_before_poll = false;
        }
        if self.sweep {
            cfg.eviction = EvictionPolicy::Sweep;
        }
        if self.counters {
            cfg.track_counters = true;
        }
    }
}

// ---------------------------------------------------------------------------
// Headless frame reader
// ---------------------------------------------------------------------------

/// Read the scene once per frame, logging a summary about once a second.
async fn frame_loop(sync: SharedSynchronizer, interval: Duration) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let per_second = (1.0 / interval.as_secs_f32()).round().max(1.0) as u64;

    let mut frame: u64 = 0;
    loop {
        timer.tick().await;
        frame += 1;

        let scene = sync.lock().scene();
        if frame % per_second == 0 {
            log::debug!(
                "frame {}: cycle {} – {} cars, {} lights, {} buildings, {} streets, {} destinations",
                frame,
                scene.cycle,
                scene.cars.len(),
                scene.traffic_lights.len(),
                scene.buildings.len(),
                scene.streets.len(),
                scene.destinations.len(),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("city_sync=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut cfg =
        ClientConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut cfg);
    cfg.validate().context("Invalid configuration")?;

    log::info!(
        "Starting city-sync-client (server='{}', tick={}ms, eviction={:?}, agents={})",
        cfg.server_url,
        cfg.tick_interval_ms,
        cfg.eviction,
        cfg.agents,
    );

    let source = Arc::new(
        HttpSimulationClient::new(&cfg.server_url, cfg.request_timeout())
            .context("Failed to create HTTP client")?,
    );
    let sync: SharedSynchronizer = Arc::new(Mutex::new(EntitySynchronizer::new(cfg.sync_config())));
    let poller = Poller::new(cfg.poller_config(), source, sync.clone());

    let report = poller.bootstrap(&cfg.init_request(), cfg.settle()).await;
    log::info!(
        "Initial load: applied {:?}, failed {:?}",
        report.applied_kinds(),
        report.failed_kinds()
    );

    let frames = tokio::spawn(frame_loop(sync.clone(), cfg.frame_interval()));

    // Run until shutdown
    poller.run().await;
    frames.abort();

    let stats = sync.lock().stats();
    log::info!(
        "Stopped after {} ticks: {} entities, {} applied, {} stale, {} failed, {} evicted",
        stats.ticks,
        stats.total_entities(),
        stats.applied_responses,
        stats.stale_responses,
        stats.failed_fetches,
        stats.evicted,
    );
    Ok(())
}

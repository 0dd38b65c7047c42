//! Poll driver — one [`Poller::tick`] fetches every configured kind and folds
//! each response into the shared [`EntitySynchronizer`].
//!
//! ## Cycle anatomy
//!
//! ```text
//! tick()
//!   ├── [step_before_poll]  GET /update
//!   ├── begin_cycle(kind) for every kind   (lock held briefly, no await)
//!   ├── fetch(kind) for every kind         (concurrent, lock released)
//!   │     └── on each completion: apply(kind, cycle, records) | record_failure
//!   └── [track_counters]    GET /countCarsInGrid, /countCarsReachedDestination
//! ```
//!
//! [`Poller::run`] fires a tick on every interval and spawns it as its own
//! task, so a slow cycle never holds back the next one. Overlapping cycles are
//! safe because stale responses are dropped by cycle number.

use crate::client::SimulationSource;
use crate::error::FetchError;
use crate::protocol::{InitRequest, ServerCounters, ServerRecord};
use crate::store::ReconcileOutcome;
use crate::sync::{ApplyOutcome, EntitySynchronizer};
use crate::types::EntityKind;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Synchronizer handle shared by the poll tasks and the renderer.
pub type SharedSynchronizer = Arc<Mutex<EntitySynchronizer>>;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Time between poll cycles.
    pub tick_interval: Duration,
    /// Ask the server to advance one step before polling.
    pub step_before_poll: bool,
    /// Poll even when that step failed. When off, a failed step ends the tick.
    pub poll_after_failed_step: bool,
    /// Kinds polled every tick.
    pub kinds: Vec<EntityKind>,
    /// Also fetch the server's car counters each tick.
    pub track_counters: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            // 30 frames at 60 Hz
            tick_interval: Duration::from_millis(500),
            step_before_poll: true,
            poll_after_failed_step: true,
            kinds: EntityKind::ALL.to_vec(),
            track_counters: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tick report
// ---------------------------------------------------------------------------

/// What a single poll cycle did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    /// Server step reported by `/update`, if a step was requested and succeeded.
    pub step: Option<u64>,
    pub applied: Vec<(EntityKind, ReconcileOutcome)>,
    pub failed: Vec<(EntityKind, FetchError)>,
    pub stale: Vec<EntityKind>,
    pub counters: Option<ServerCounters>,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn applied_kinds(&self) -> Vec<EntityKind> {
        self.applied.iter().map(|(k, _)| *k).collect()
    }

    pub fn failed_kinds(&self) -> Vec<EntityKind> {
        self.failed.iter().map(|(k, _)| *k).collect()
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

pub struct Poller<S> {
    config: PollerConfig,
    source: Arc<S>,
    sync: SharedSynchronizer,
}

impl<S: SimulationSource> Poller<S> {
    pub fn new(config: PollerConfig, source: Arc<S>, sync: SharedSynchronizer) -> Self {
        Self {
            config,
            source,
            sync,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn synchronizer(&self) -> SharedSynchronizer {
        self.sync.clone()
    }

    /// One request for `kind`. Does not touch the synchronizer.
    pub async fn poll(&self, kind: EntityKind) -> Result<Vec<ServerRecord>, FetchError> {
        self.source.fetch(kind).await
    }

    /// Initialise the server model, wait for it to settle, then load every kind once.
    ///
    /// An init failure is logged; the initial poll still runs.
    pub async fn bootstrap(&self, request: &InitRequest, settle: Duration) -> TickReport {
        match self.source.init(request).await {
            Ok(reply) => info!("Simulation initialised: {}", reply.message),
            Err(e) => warn!("Simulation init failed, polling anyway: {}", e),
        }

        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        self.cycle(&EntityKind::ALL, false).await
    }

    /// One full poll pass over the configured kinds.
    pub async fn tick(&self) -> TickReport {
        self.cycle(&self.config.kinds, self.config.step_before_poll).await
    }

    async fn cycle(&self, kinds: &[EntityKind], step: bool) -> TickReport {
        let tick = self.sync.lock().begin_tick();
        let span = tracing::debug_span!("poll_cycle", tick);

        async move {
            let mut report = TickReport {
                tick,
                ..Default::default()
            };

            if step {
                match self.source.step().await {
                    Ok(reply) => report.step = reply.current_step,
                    Err(e) if self.config.poll_after_failed_step => {
                        warn!("Simulation step failed, polling current state: {}", e)
                    }
                    Err(e) => {
                        warn!("Simulation step failed, skipping tick {}: {}", tick, e);
                        return report;
                    }
                }
            }

            let mut pending = FuturesUnordered::new();
            for &kind in kinds {
                let cycle = self.sync.lock().begin_cycle(kind);
                pending.push(self.fetch_tagged(kind, cycle));
            }

            while let Some((kind, cycle, result)) = pending.next().await {
                match result {
                    Ok(records) => {
                        let outcome = self.sync.lock().apply(kind, cycle, &records);
                        match outcome {
                            ApplyOutcome::Applied { reconciled, .. } => {
                                report.applied.push((kind, reconciled))
                            }
                            ApplyOutcome::Stale { .. } => report.stale.push(kind),
                        }
                    }
                    Err(e) => {
                        self.sync.lock().record_failure(kind, &e);
                        report.failed.push((kind, e));
                    }
                }
            }

            if self.config.track_counters {
                report.counters = Some(self.counters().await);
            }

            debug!(
                "Tick {} done: {} applied, {} failed, {} stale",
                tick,
                report.applied.len(),
                report.failed.len(),
                report.stale.len()
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn fetch_tagged(
        &self,
        kind: EntityKind,
        cycle: u64,
    ) -> (EntityKind, u64, Result<Vec<ServerRecord>, FetchError>) {
        (kind, cycle, self.source.fetch(kind).await)
    }

    async fn counters(&self) -> ServerCounters {
        let (in_grid, reached) = tokio::join!(
            self.source.cars_in_grid(),
            self.source.cars_reached_destination()
        );

        ServerCounters {
            cars_in_grid: in_grid
                .map_err(|e| warn!("Car counter unavailable: {}", e))
                .ok(),
            cars_reached_destination: reached
                .map_err(|e| warn!("Arrival counter unavailable: {}", e))
                .ok(),
        }
    }

    /// Tick on every interval until `shutdown` resolves.
    ///
    /// Each tick runs in its own task; in-flight ticks are not cancelled at
    /// shutdown.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let poller = Arc::new(self);
        let period = poller.config.tick_interval.max(Duration::from_millis(1));
        let mut timer = tokio::time::interval(period);
        // The first interval tick fires immediately; bootstrap already polled.
        timer.tick().await;

        info!(
            "Poller active – every {:?}, kinds {:?}",
            poller.config.tick_interval, poller.config.kinds
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let p = poller.clone();
                    tokio::spawn(async move {
                        let report = p.tick().await;
                        if !report.is_clean() {
                            debug!("Tick {} had failures: {:?}", report.tick, report.failed_kinds());
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Poller shutting down");
                    break;
                }
            }
        }
    }

    /// Tick until Ctrl-C.
    pub async fn run(self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

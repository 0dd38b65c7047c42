//! `EntitySynchronizer` — the authoritative client-side mirror of simulation
//! state, one [`KindStore`] per [`EntityKind`].
//!
//! ## Sequencing
//!
//! Every request the poller issues is tagged with a per-kind cycle number from
//! [`EntitySynchronizer::begin_cycle`]. [`EntitySynchronizer::apply`] drops a
//! response whose cycle is not newer than the last one applied for that kind,
//! so a slow response from an earlier cycle can never overwrite fresher data.
//!
//! ## Eviction
//!
//! Under [`EvictionPolicy::Retain`] records live for the whole session even if
//! the server stops reporting them. Under [`EvictionPolicy::Sweep`] every
//! applied response is treated as the complete set for its kind and absent
//! ids are removed.

use crate::error::{FetchError, Result, SyncError};
use crate::protocol::ServerRecord;
use crate::registry;
use crate::store::{KindStore, ReconcileOutcome};
use crate::types::{EntityKind, EntityRecord, SyncStats};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Never remove a record once seen.
    #[default]
    Retain,
    /// Remove ids missing from the latest applied response.
    Sweep,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub eviction: EvictionPolicy,
}

// ---------------------------------------------------------------------------
// Apply result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied {
        reconciled: ReconcileOutcome,
        evicted: usize,
    },
    /// A newer response for this kind was already applied.
    Stale { cycle: u64, last_applied: u64 },
}

impl ApplyOutcome {
    pub fn is_stale(&self) -> bool {
        matches!(self, ApplyOutcome::Stale { .. })
    }
}

// ---------------------------------------------------------------------------
// Scene snapshot
// ---------------------------------------------------------------------------

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneSnapshot {
    /// Highest cycle applied to any kind when the snapshot was taken.
    pub cycle: u64,
    pub cars: Vec<EntityRecord>,
    pub traffic_lights: Vec<EntityRecord>,
    pub buildings: Vec<EntityRecord>,
    pub streets: Vec<EntityRecord>,
    pub destinations: Vec<EntityRecord>,
}

impl SceneSnapshot {
    pub fn records(&self, kind: EntityKind) -> &[EntityRecord] {
        match kind {
            EntityKind::Car => &self.cars,
            EntityKind::TrafficLight => &self.traffic_lights,
            EntityKind::Building => &self.buildings,
            EntityKind::Street => &self.streets,
            EntityKind::Destination => &self.destinations,
        }
    }

    pub fn total(&self) -> usize {
        EntityKind::ALL.iter().map(|k| self.records(*k).len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

pub struct EntitySynchronizer {
    config: SyncConfig,
    stores: BTreeMap<EntityKind, KindStore>,
    /// Last cycle number handed out per kind.
    issued: BTreeMap<EntityKind, u64>,
    stats: SyncStats,
}

impl Default for EntitySynchronizer {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

impl EntitySynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        let stores = EntityKind::ALL
            .iter()
            .map(|k| (*k, KindStore::new(registry::profile(*k))))
            .collect();

        Self {
            config,
            stores,
            issued: BTreeMap::new(),
            stats: SyncStats::default(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn store(&self, kind: EntityKind) -> &KindStore {
        &self.stores[&kind]
    }

    fn store_mut(&mut self, kind: EntityKind) -> &mut KindStore {
        self.stores
            .entry(kind)
            .or_insert_with(|| KindStore::new(registry::profile(kind)))
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Merge `incoming` into `kind`'s mapping, unconditionally.
    ///
    /// After this returns every id in `incoming` has an up-to-date record.
    /// No record is removed and no cycle check is made.
    pub fn reconcile(&mut self, kind: EntityKind, incoming: &[ServerRecord]) -> ReconcileOutcome {
        let store = self.store_mut(kind);
        let cycle = store.last_applied_cycle();
        store.reconcile(incoming, cycle)
    }

    /// Allocate the next cycle number for a request about to be issued for `kind`.
    pub fn begin_cycle(&mut self, kind: EntityKind) -> u64 {
        let n = self.issued.entry(kind).or_insert(0);
        *n += 1;
        *n
    }

    /// Count the start of a full poll pass.
    pub fn begin_tick(&mut self) -> u64 {
        self.stats.ticks += 1;
        self.stats.ticks
    }

    /// Apply a successful response for `kind` that was requested at `cycle`.
    pub fn apply(&mut self, kind: EntityKind, cycle: u64, incoming: &[ServerRecord]) -> ApplyOutcome {
        let eviction = self.config.eviction;
        let store = self.store_mut(kind);

        let last_applied = store.last_applied_cycle();
        if !store.mark_applied(cycle) {
            debug!(
                "Dropping stale {} response (cycle {} <= {})",
                kind, cycle, last_applied
            );
            self.stats.stale_responses += 1;
            return ApplyOutcome::Stale {
                cycle,
                last_applied,
            };
        }

        let reconciled = store.reconcile(incoming, cycle);
        let evicted = match eviction {
            EvictionPolicy::Retain => 0,
            EvictionPolicy::Sweep => {
                let present: HashSet<&str> = incoming.iter().map(|r| r.id.as_str()).collect();
                store.sweep(&present)
            }
        };

        self.stats.applied_responses += 1;
        self.stats.evicted += evicted as u64;

        debug!(
            "Applied {} cycle {}: +{} ~{} -{}",
            kind, cycle, reconciled.inserted, reconciled.updated, evicted
        );

        ApplyOutcome::Applied {
            reconciled,
            evicted,
        }
    }

    /// Note a failed fetch. The kind's records are left as they were.
    pub fn record_failure(&mut self, kind: EntityKind, error: &FetchError) {
        warn!("Skipping {} this cycle: {}", kind, error);
        self.stats.failed_fetches += 1;
    }

    /// Drop all records.
    ///
    /// Cycle numbers keep counting up; anything issued before the clear is
    /// treated as already applied, so a late response cannot repopulate the
    /// mapping.
    pub fn clear(&mut self) {
        for (kind, store) in self.stores.iter_mut() {
            store.clear();
            if let Some(&issued) = self.issued.get(kind) {
                store.mark_applied(issued);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reads (renderer side)
    // -----------------------------------------------------------------------

    /// Current records of `kind`, sorted by id.
    pub fn snapshot(&self, kind: EntityKind) -> Vec<EntityRecord> {
        self.store(kind).snapshot()
    }

    pub fn record(&self, kind: EntityKind, id: &str) -> Result<&EntityRecord> {
        self.store(kind).get(id).ok_or_else(|| SyncError::MissingEntity {
            kind,
            id: id.to_string(),
        })
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.store(kind).len()
    }

    pub fn last_applied_cycle(&self, kind: EntityKind) -> u64 {
        self.store(kind).last_applied_cycle()
    }

    /// Every kind's records in one go, for a single animation frame.
    pub fn scene(&self) -> SceneSnapshot {
        SceneSnapshot {
            cycle: self
                .stores
                .values()
                .map(KindStore::last_applied_cycle)
                .max()
                .unwrap_or(0),
            cars: self.snapshot(EntityKind::Car),
            traffic_lights: self.snapshot(EntityKind::TrafficLight),
            buildings: self.snapshot(EntityKind::Building),
            streets: self.snapshot(EntityKind::Street),
            destinations: self.snapshot(EntityKind::Destination),
        }
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            cars: self.len(EntityKind::Car),
            traffic_lights: self.len(EntityKind::TrafficLight),
            buildings: self.len(EntityKind::Building),
            streets: self.len(EntityKind::Street),
            destinations: self.len(EntityKind::Destination),
            ..self.stats.clone()
        }
    }
}

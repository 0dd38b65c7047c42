//! `KindStore` — the client-side mirror of one entity kind.
//!
//! Records are keyed by server id. [`KindStore::reconcile`] is the only way
//! records are created or changed; it never removes anything. Removal only
//! happens through [`KindStore::sweep`], which the synchronizer calls when the
//! sweep eviction policy is active.

use crate::protocol::ServerRecord;
use crate::registry::KindProfile;
use crate::types::{EntityKind, EntityRecord, Vec3};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

/// What one reconcile call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Incoming records skipped because their id was empty.
    pub rejected: usize,
}

#[derive(Debug)]
pub struct KindStore {
    profile: &'static KindProfile,
    records: HashMap<String, EntityRecord>,
    /// Highest poll cycle applied to this store.
    last_applied_cycle: u64,
}

impl KindStore {
    pub fn new(profile: &'static KindProfile) -> Self {
        Self {
            profile,
            records: HashMap::new(),
            last_applied_cycle: 0,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.profile.kind
    }

    pub fn profile(&self) -> &'static KindProfile {
        self.profile
    }

    // ------------------------------------------------------------------
    // Reconcile
    // ------------------------------------------------------------------

    /// Merge `incoming` into the store, tagging touched records with `cycle`.
    ///
    /// Unknown ids are inserted with profile defaults overlaid by the server
    /// fields; known ids are updated in place. Nothing is removed.
    pub fn reconcile(&mut self, incoming: &[ServerRecord], cycle: u64) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        for rec in incoming {
            if rec.id.is_empty() {
                warn!("Skipping {} record with empty id", self.profile.kind);
                outcome.rejected += 1;
                continue;
            }

            match self.records.get_mut(&rec.id) {
                Some(existing) => {
                    apply_fields(self.profile, existing, rec, cycle);
                    outcome.updated += 1;
                }
                None => {
                    let record = self.spawn(rec, cycle);
                    debug!("New {} '{}' at {}", record.kind, record.id, record.position);
                    self.records.insert(record.id.clone(), record);
                    outcome.inserted += 1;
                }
            }
        }

        outcome
    }

    fn spawn(&self, rec: &ServerRecord, cycle: u64) -> EntityRecord {
        let p = self.profile;
        let mut record = EntityRecord {
            id: rec.id.clone(),
            kind: p.kind,
            position: Vec3::zero(),
            rotation: p.default_rotation,
            scale: p.default_scale,
            color: p.default_color,
            direction: None,
            last_cycle: cycle,
        };
        apply_fields(p, &mut record, rec, cycle);
        record
    }

    // ------------------------------------------------------------------
    // Eviction
    // ------------------------------------------------------------------

    /// Drop every record whose id is not in `present`. Returns the number removed.
    pub fn sweep(&mut self, present: &HashSet<&str>) -> usize {
        let before = self.records.len();
        self.records.retain(|id, _| present.contains(id.as_str()));
        let removed = before - self.records.len();
        if removed > 0 {
            debug!("Evicted {} stale {} record(s)", removed, self.profile.kind);
        }
        removed
    }

    // ------------------------------------------------------------------
    // Cycle bookkeeping
    // ------------------------------------------------------------------

    pub fn last_applied_cycle(&self) -> u64 {
        self.last_applied_cycle
    }

    /// Record that a response for `cycle` was applied.
    ///
    /// Returns `false` (and changes nothing) if `cycle` is not newer than the
    /// last applied one.
    pub fn mark_applied(&mut self, cycle: u64) -> bool {
        if cycle <= self.last_applied_cycle {
            return false;
        }
        self.last_applied_cycle = cycle;
        true
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<&EntityRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, sorted by id so draw order is stable between frames.
    pub fn snapshot(&self) -> Vec<EntityRecord> {
        let mut out: Vec<_> = self.records.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.last_applied_cycle = 0;
    }
}

/// Overlay the server-driven fields of `rec` onto `record`.
fn apply_fields(p: &KindProfile, record: &mut EntityRecord, rec: &ServerRecord, cycle: u64) {
    record.position = Vec3::new(rec.x, rec.y, rec.z);
    record.last_cycle = cycle;

    if p.rotation_from_direction {
        if let Some(dir) = rec.heading() {
            record.rotation = dir.rotation();
            record.direction = Some(dir);
        } else if let Some(raw) = rec.direction.as_deref() {
            warn!("Unknown heading '{}' for {} '{}'", raw, p.kind, rec.id);
        }
    }

    if p.color_from_state {
        if let Some(color) = rec.light_color() {
            record.color = color;
        } else if rec.state.is_some() || rec.color.is_some() {
            warn!(
                "Unrecognised light state {:?} for {} '{}'",
                rec.state.as_ref().or(rec.color.as_ref()),
                p.kind,
                rec.id
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

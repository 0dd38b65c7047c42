//! City Sync
//!
//! Client-side mirror of an agent-based traffic simulation. The simulation
//! server owns cars, traffic lights, buildings, streets and destinations; this
//! crate polls it over HTTP and keeps a per-kind, id-keyed set of render
//! records that a renderer reads every frame.
//!
//! ## Architecture
//!
//! ```text
//! Poller  (poller.rs)                ← interval, step, concurrent fetch
//!   ├── SimulationSource (client.rs) ← HTTP transport
//!   └── EntitySynchronizer (sync.rs) ← cycle sequencing, eviction, snapshots
//!         └── KindStore × 5 (store.rs) ← reconcile, driven by registry.rs
//! ```
//!
//! The store, registry and protocol layers have no async or network
//! dependency and are always available; the transport and poll loop need the
//! `client` feature.

// Store and protocol types are always available (no client feature needed).
pub mod error;
pub mod protocol;
pub mod registry;
pub mod store;
pub mod sync;
pub mod types;

// Network-facing modules require the `client` feature.
#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod config;
#[cfg(feature = "client")]
pub mod poller;

// Convenience re-exports (client only)
#[cfg(feature = "client")]
pub use client::{HttpSimulationClient, SimulationSource};
#[cfg(feature = "client")]
pub use config::ClientConfig;
#[cfg(feature = "client")]
pub use poller::{Poller, PollerConfig, SharedSynchronizer, TickReport};

pub use error::{FetchError, SyncError};
pub use protocol::ServerRecord;
pub use store::{KindStore, ReconcileOutcome};
pub use sync::{ApplyOutcome, EntitySynchronizer, EvictionPolicy, SceneSnapshot, SyncConfig};
pub use types::{Direction, EntityKind, EntityRecord, Rgba, SyncStats, Vec3};

//! Layered client configuration.
//!
//! Sources, lowest precedence first:
//!
//! | Source                      | Example                                  |
//! |-----------------------------|------------------------------------------|
//! | built-in defaults           | [`ClientConfig::default`]                |
//! | TOML file (optional)        | `server_url = "http://sim:5175/"`        |
//! | `CITY_SYNC_*` environment   | `CITY_SYNC_TICK_INTERVAL_MS=250`         |
//!
//! Command-line flags are applied on top by the binary.

use crate::error::{Result, SyncError};
use crate::poller::PollerConfig;
use crate::protocol::InitRequest;
use crate::sync::{EvictionPolicy, SyncConfig};
use crate::types::EntityKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "CITY_SYNC";

/// Highest frame rate the reader accepts (1 ms per frame).
pub const MAX_FRAME_RATE_HZ: f32 = 1_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root URL of the simulation server.
    pub server_url: String,
    pub request_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub step_before_poll: bool,
    pub poll_after_failed_step: bool,
    pub track_counters: bool,
    /// Kinds polled every tick (bootstrap always loads all of them).
    pub kinds: Vec<EntityKind>,
    pub eviction: EvictionPolicy,
    /// Cars the server should spawn on `/init`.
    pub agents: u32,
    pub width: u32,
    pub height: u32,
    /// Pause between `/init` and the first poll.
    pub settle_ms: u64,
    /// Rate at which the frame reader samples the scene.
    pub frame_rate_hz: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let init = InitRequest::default();
        Self {
            server_url: "http://localhost:8585/".into(),
            request_timeout_ms: 5_000,
            tick_interval_ms: 500,
            step_before_poll: true,
            poll_after_failed_step: true,
            track_counters: false,
            kinds: EntityKind::ALL.to_vec(),
            eviction: EvictionPolicy::Retain,
            agents: init.agents,
            width: init.width,
            height: init.height,
            settle_ms: 1_000,
            frame_rate_hz: 60.0,
        }
    }
}

impl ClientConfig {
    /// Load defaults, then `path` (if given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(p) = path {
            builder = builder.add_source(config::File::from(p).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("kinds"),
        );

        let cfg: ClientConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SyncError::Config(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(SyncError::Config(format!(
                "server_url must be http(s), got '{}'",
                self.server_url
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(SyncError::Config("tick_interval_ms must be > 0".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(SyncError::Config("request_timeout_ms must be > 0".into()));
        }
        if !(self.frame_rate_hz.is_finite() && self.frame_rate_hz > 0.0) {
            return Err(SyncError::Config("frame_rate_hz must be a positive number".into()));
        }
        if self.frame_rate_hz > MAX_FRAME_RATE_HZ {
            return Err(SyncError::Config(format!(
                "frame_rate_hz must be <= {MAX_FRAME_RATE_HZ}, got {}",
                self.frame_rate_hz
            )));
        }
        if self.kinds.is_empty() {
            return Err(SyncError::Config("at least one entity kind must be polled".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Never shorter than 1 ms.
    pub fn frame_interval(&self) -> Duration {
        Duration::try_from_secs_f32(1.0 / self.frame_rate_hz)
            .unwrap_or(Duration::from_millis(1))
            .max(Duration::from_millis(1))
    }

    pub fn init_request(&self) -> InitRequest {
        InitRequest {
            agents: self.agents,
            width: self.width,
            height: self.height,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            eviction: self.eviction,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        let mut kinds = self.kinds.clone();
        kinds.sort();
        kinds.dedup();
        PollerConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            step_before_poll: self.step_before_poll,
            poll_after_failed_step: self.poll_after_failed_step,
            kinds,
            track_counters: self.track_counters,
        }
    }
}

//! HTTP wire protocol spoken by the traffic simulation server.
//!
//! This module owns **every payload that crosses the HTTP boundary** between
//! the simulation server and this client.
//!
//! ## Endpoints
//!
//! | Path                           | Method | Body / reply                        |
//! |--------------------------------|--------|-------------------------------------|
//! | `/init`                        | POST   | [`InitRequest`] → [`InitResponse`]  |
//! | `/getCars` … `/getTrafficLights` | GET  | `{<list key>: [ServerRecord]}`      |
//! | `/update`                      | GET    | [`StepResponse`]                    |
//! | `/countCarsInGrid`             | GET    | [`CarsInGrid`]                      |
//! | `/countCarsReachedDestination` | GET    | [`CarsReachedDestination`]          |
//!
//! ## Decoding rules
//!
//! 1. List endpoints wrap their records under one of several keys
//!    (`positions`, a kind-specific name, or `states`); the first key present wins.
//! 2. Ids may be JSON strings or numbers and are normalised to strings.
//! 3. A body that is not JSON, or has no recognised list key, is a
//!    [`FetchError::MalformedResponse`]; nothing partial is ever returned.

use crate::error::FetchError;
use crate::types::{Direction, Rgba};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Entity records
// ---------------------------------------------------------------------------

/// One entity as reported by a list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerRecord {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Car heading. Older servers call this `facing`.
    #[serde(default, alias = "facing", skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<LightSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<LightSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<f32>,
}

impl ServerRecord {
    /// Bare positional record, as buildings/streets/destinations send.
    pub fn at(id: impl Into<String>, x: f32, y: f32, z: f32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            z,
            direction: None,
            state: None,
            color: None,
            r: None,
            g: None,
            b: None,
            a: None,
        }
    }

    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = Some(direction.into());
        self
    }

    pub fn with_state(mut self, red: bool) -> Self {
        self.state = Some(LightSignal::Flag(red));
        self
    }

    /// Parsed car heading; unknown strings yield `None`.
    pub fn heading(&self) -> Option<Direction> {
        self.direction.as_deref().and_then(Direction::parse)
    }

    /// Display color implied by whichever light-state encoding the server used.
    ///
    /// `state` takes precedence over `color`, which takes precedence over
    /// loose `r/g/b/a` components.
    pub fn light_color(&self) -> Option<Rgba> {
        if let Some(c) = self.state.as_ref().and_then(LightSignal::to_rgba) {
            return Some(c);
        }
        if let Some(c) = self.color.as_ref().and_then(LightSignal::to_rgba) {
            return Some(c);
        }
        match (self.r, self.g, self.b) {
            (Some(r), Some(g), Some(b)) => Some(Rgba::new(r, g, b, self.a.unwrap_or(1.0))),
            _ => None,
        }
    }
}

/// The ways a traffic light's state shows up on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LightSignal {
    /// `true` = red, `false` = green.
    Flag(bool),
    /// `"red"` / `"green"`.
    Name(String),
    /// Explicit RGBA.
    Components([f32; 4]),
}

impl LightSignal {
    pub fn to_rgba(&self) -> Option<Rgba> {
        match self {
            LightSignal::Flag(red) => Some(light_color(*red)),
            LightSignal::Name(name) => match name.trim().to_ascii_lowercase().as_str() {
                "red" => Some(Rgba::RED),
                "green" => Some(Rgba::GREEN),
                _ => None,
            },
            LightSignal::Components([r, g, b, a]) => Some(Rgba::new(*r, *g, *b, *a)),
        }
    }
}

/// Traffic light display color as a pure function of its state.
pub fn light_color(red: bool) -> Rgba {
    if red {
        Rgba::RED
    } else {
        Rgba::GREEN
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "entity id must be a string or number, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Lifecycle payloads
// ---------------------------------------------------------------------------

/// Body of `POST /init`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitRequest {
    #[serde(rename = "NAgents")]
    pub agents: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for InitRequest {
    fn default() -> Self {
        Self {
            agents: 500,
            width: 100,
            height: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResponse {
    pub message: String,
}

/// Reply of `GET /update`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StepResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "currentStep")]
    pub current_step: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarsInGrid {
    pub cars_in_grid: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarsReachedDestination {
    pub cars_reached_destination: u64,
}

/// Server-side counters optionally attached to a tick report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerCounters {
    pub cars_in_grid: Option<u64>,
    pub cars_reached_destination: Option<u64>,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a list endpoint body, taking the records under the first of
/// `list_keys` present in the top-level object.
pub fn decode_records(
    endpoint: &str,
    list_keys: &[&str],
    body: &[u8],
) -> Result<Vec<ServerRecord>, FetchError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::malformed(endpoint, format!("invalid JSON: {e}")))?;

    let Value::Object(mut map) = value else {
        return Err(FetchError::malformed(endpoint, "top-level value is not an object"));
    };

    let Some(list) = list_keys.iter().find_map(|k| map.remove(*k)) else {
        return Err(FetchError::malformed(
            endpoint,
            format!("none of the list keys {list_keys:?} present"),
        ));
    };

    if !list.is_array() {
        return Err(FetchError::malformed(
            endpoint,
            "entity list is not an array",
        ));
    }

    serde_json::from_value(list).map_err(|e| FetchError::malformed(endpoint, e.to_string()))
}

/// Decode a fixed-shape JSON reply.
pub fn decode_json<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::malformed(endpoint, e.to_string()))
}

// ---------------------------------------------------------------------------
// Endpoint paths
// ---------------------------------------------------------------------------

/// Every path used by the simulation protocol, relative to the server root.
pub mod endpoints {
    pub const INIT: &str = "init";
    pub const UPDATE: &str = "update";

    pub const CARS: &str = "getCars";
    pub const BUILDINGS: &str = "getBuildings";
    pub const STREETS: &str = "getStreets";
    pub const DESTINATIONS: &str = "getDestinations";
    pub const TRAFFIC_LIGHTS: &str = "getTrafficLights";

    pub const COUNT_CARS_IN_GRID: &str = "countCarsInGrid";
    pub const COUNT_CARS_REACHED_DESTINATION: &str = "countCarsReachedDestination";
}

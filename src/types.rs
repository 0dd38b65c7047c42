//! Core synchronizer types shared across all modules.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Linear RGBA color, each channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const RED: Rgba = Rgba::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Rgba = Rgba::new(0.0, 1.0, 0.0, 1.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::WHITE
    }
}

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// The five categories of simulated object the server reports.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Car,
    TrafficLight,
    Building,
    Street,
    Destination,
}

impl EntityKind {
    /// Every kind, in the order a full tick polls them.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Car,
        EntityKind::Building,
        EntityKind::Street,
        EntityKind::Destination,
        EntityKind::TrafficLight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Car => "car",
            EntityKind::TrafficLight => "traffic_light",
            EntityKind::Building => "building",
            EntityKind::Street => "street",
            EntityKind::Destination => "destination",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "car" | "cars" => Ok(EntityKind::Car),
            "traffic_light" | "traffic_lights" | "light" | "lights" => {
                Ok(EntityKind::TrafficLight)
            }
            "building" | "buildings" => Ok(EntityKind::Building),
            "street" | "streets" | "road" | "roads" => Ok(EntityKind::Street),
            "destination" | "destinations" => Ok(EntityKind::Destination),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Car heading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Diagonal,
}

impl Direction {
    /// Euler rotation (radians, X/Y/Z) a car facing this way is drawn with.
    pub fn rotation(self) -> Vec3 {
        let yaw = match self {
            Direction::Up => 0.0,
            Direction::Down => PI,
            Direction::Left => FRAC_PI_2,
            Direction::Right => -FRAC_PI_2,
            Direction::Diagonal => FRAC_PI_4,
        };
        Vec3::new(0.0, yaw, 0.0)
    }

    /// Case-insensitive parse of the server's direction strings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            "diagonal" => Some(Direction::Diagonal),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Entity records
// ---------------------------------------------------------------------------

/// Client-held render state for one simulated entity.
///
/// `id`, `kind` and `scale` are fixed at creation; the rest is refreshed by
/// every reconcile that mentions this `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    pub id: String,
    pub kind: EntityKind,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub color: Rgba,
    /// Last heading reported for a car.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Poll cycle that last touched this record (0 for direct reconciles).
    pub last_cycle: u64,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncStats {
    pub cars: usize,
    pub traffic_lights: usize,
    pub buildings: usize,
    pub streets: usize,
    pub destinations: usize,
    /// Poll cycles started.
    pub ticks: u64,
    /// Responses applied to the store.
    pub applied_responses: u64,
    /// Responses dropped because a newer one was already applied.
    pub stale_responses: u64,
    /// Fetches that failed and left their kind untouched.
    pub failed_fetches: u64,
    /// Records removed by the sweep eviction policy.
    pub evicted: u64,
}

impl SyncStats {
    pub fn total_entities(&self) -> usize {
        self.cars + self.traffic_lights + self.buildings + self.streets + self.destinations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_maps_to_zero_rotation() {
        assert_eq!(Direction::Up.rotation(), Vec3::zero());
    }

    #[test]
    fn left_and_right_are_opposite_yaws() {
        let l = Direction::Left.rotation();
        let r = Direction::Right.rotation();
        assert!((l.y + r.y).abs() < f32::EPSILON);
        assert_eq!(l.x, 0.0);
        assert_eq!(l.z, 0.0);
    }

    #[test]
    fn direction_parse_is_case_insensitive() {
        assert_eq!(Direction::parse("LEFT"), Some(Direction::Left));
        assert_eq!(Direction::parse(" diagonal "), Some(Direction::Diagonal));
        assert_eq!(Direction::parse("sideways"), None);
    }

    #[test]
    fn entity_kind_parses_plural_and_aliases() {
        assert_eq!("cars".parse::<EntityKind>(), Ok(EntityKind::Car));
        assert_eq!("traffic-lights".parse::<EntityKind>(), Ok(EntityKind::TrafficLight));
        assert_eq!("roads".parse::<EntityKind>(), Ok(EntityKind::Street));
        assert!("trees".parse::<EntityKind>().is_err());
    }

    #[test]
    fn stats_total_sums_all_kinds() {
        let s = SyncStats {
            cars: 3,
            traffic_lights: 2,
            buildings: 10,
            streets: 40,
            destinations: 1,
            ..Default::default()
        };
        assert_eq!(s.total_entities(), 56);
    }
}

//! Per-kind configuration table.
//!
//! One [`KindProfile`] row per [`EntityKind`] says where that kind is polled,
//! what its records look like when first seen, and which fields the server is
//! allowed to drive afterwards. Reconciliation reads only this table, so the
//! five entity kinds share a single code path.

use crate::protocol::endpoints;
use crate::types::{EntityKind, Rgba, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct KindProfile {
    pub kind: EntityKind,
    /// Path of the list endpoint, relative to the server root.
    pub endpoint: &'static str,
    /// Keys the records may be wrapped under, in lookup order.
    pub list_keys: &'static [&'static str],
    pub default_scale: Vec3,
    pub default_rotation: Vec3,
    pub default_color: Rgba,
    /// Rotation follows the reported car heading.
    pub rotation_from_direction: bool,
    /// Color follows the reported light state.
    pub color_from_state: bool,
}

static CAR: KindProfile = KindProfile {
    kind: EntityKind::Car,
    endpoint: endpoints::CARS,
    list_keys: &["positions", "cars"],
    default_scale: Vec3 { x: 1.0, y: 1.0, z: 1.0 },
    default_rotation: Vec3 { x: 0.0, y: 0.0, z: 0.0 },
    default_color: Rgba::new(1.0, 0.0, 0.0, 1.0),
    rotation_from_direction: true,
    color_from_state: false,
};

static TRAFFIC_LIGHT: KindProfile = KindProfile {
    kind: EntityKind::TrafficLight,
    endpoint: endpoints::TRAFFIC_LIGHTS,
    list_keys: &["positions", "traffic_lights", "states"],
    default_scale: Vec3 { x: 1.0, y: 1.0, z: 1.0 },
    default_rotation: Vec3 { x: 0.0, y: 0.0, z: 0.0 },
    default_color: Rgba::new(0.0, 1.0, 0.0, 1.0),
    rotation_from_direction: false,
    color_from_state: true,
};

static BUILDING: KindProfile = KindProfile {
    kind: EntityKind::Building,
    endpoint: endpoints::BUILDINGS,
    list_keys: &["positions", "buildings"],
    default_scale: Vec3 { x: 1.0, y: 10.0, z: 1.0 },
    default_rotation: Vec3 { x: 0.0, y: 0.0, z: 0.0 },
    default_color: Rgba::new(0.3, 0.3, 0.3, 1.0),
    rotation_from_direction: false,
    color_from_state: false,
};

static STREET: KindProfile = KindProfile {
    kind: EntityKind::Street,
    endpoint: endpoints::STREETS,
    list_keys: &["positions", "streets"],
    default_scale: Vec3 { x: 1.0, y: 0.0, z: 1.0 },
    default_rotation: Vec3 { x: 0.0, y: 0.0, z: 0.0 },
    default_color: Rgba::new(0.5, 0.5, 0.5, 1.0),
    rotation_from_direction: false,
    color_from_state: false,
};

static DESTINATION: KindProfile = KindProfile {
    kind: EntityKind::Destination,
    endpoint: endpoints::DESTINATIONS,
    list_keys: &["positions", "destinations"],
    default_scale: Vec3 { x: 1.0, y: 5.0, z: 1.0 },
    default_rotation: Vec3 { x: 0.0, y: 0.0, z: 0.0 },
    default_color: Rgba::new(0.0, 1.0, 1.0, 1.0),
    rotation_from_direction: false,
    color_from_state: false,
};

/// Static profile for `kind`.
pub fn profile(kind: EntityKind) -> &'static KindProfile {
    match kind {
        EntityKind::Car => &CAR,
        EntityKind::TrafficLight => &TRAFFIC_LIGHT,
        EntityKind::Building => &BUILDING,
        EntityKind::Street => &STREET,
        EntityKind::Destination => &DESTINATION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_matching_profile() {
        for kind in EntityKind::ALL {
            assert_eq!(profile(kind).kind, kind);
        }
    }

    #[test]
    fn endpoints_are_distinct() {
        let mut eps: Vec<_> = EntityKind::ALL.iter().map(|k| profile(*k).endpoint).collect();
        eps.sort();
        eps.dedup();
        assert_eq!(eps.len(), EntityKind::ALL.len());
    }

    #[test]
    fn only_cars_and_lights_are_server_driven() {
        for kind in EntityKind::ALL {
            let p = profile(kind);
            assert_eq!(p.rotation_from_direction, kind == EntityKind::Car);
            assert_eq!(p.color_from_state, kind == EntityKind::TrafficLight);
        }
    }

    #[test]
    fn every_profile_accepts_positions_key() {
        for kind in EntityKind::ALL {
            assert_eq!(profile(kind).list_keys.first(), Some(&"positions"));
        }
    }
}

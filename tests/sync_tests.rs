//! EntitySynchronizer integration tests

#[cfg(test)]
mod tests {
    use city_sync::{
        ApplyOutcome, Direction, EntityKind, EntitySynchronizer, EvictionPolicy, FetchError,
        Rgba, ServerRecord, SyncConfig, SyncError,
    };
    use std::collections::BTreeSet;

    fn sweeping() -> EntitySynchronizer {
        EntitySynchronizer::new(SyncConfig {
            eviction: EvictionPolicy::Sweep,
        })
    }

    fn car(id: &str, x: f32, z: f32, dir: &str) -> ServerRecord {
        ServerRecord::at(id, x, 0.0, z).with_direction(dir)
    }

    // -----------------------------------------------------------------------
    // Reconcile properties
    // -----------------------------------------------------------------------

    #[test]
    fn insertion_on_empty_state() {
        let mut sync = EntitySynchronizer::default();
        sync.reconcile(EntityKind::Car, &[car("c1", 1.0, 2.0, "Up")]);

        assert_eq!(sync.len(EntityKind::Car), 1);
        let c1 = sync.record(EntityKind::Car, "c1").unwrap();
        assert_eq!(c1.position.to_array(), [1.0, 0.0, 2.0]);
        assert_eq!(c1.rotation.to_array(), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn update_in_place_creates_no_new_record() {
        let mut sync = EntitySynchronizer::default();
        sync.reconcile(EntityKind::Car, &[car("c1", 1.0, 2.0, "Up")]);
        let out = sync.reconcile(EntityKind::Car, &[car("c1", 5.0, 2.0, "Left")]);

        assert_eq!(out.inserted, 0);
        assert_eq!(out.updated, 1);
        assert_eq!(sync.len(EntityKind::Car), 1);
        let c1 = sync.record(EntityKind::Car, "c1").unwrap();
        assert_eq!(c1.position.to_array(), [5.0, 0.0, 2.0]);
        assert_eq!(c1.rotation, Direction::Left.rotation());
    }

    #[test]
    fn mapping_is_union_of_ids_with_latest_fields() {
        let mut sync = EntitySynchronizer::default();
        let batches = vec![
            vec![car("a", 0.0, 0.0, "Up"), car("b", 1.0, 1.0, "Down")],
            vec![car("b", 2.0, 2.0, "Right")],
            vec![car("c", 3.0, 3.0, "Left"), car("a", 4.0, 4.0, "Diagonal")],
        ];

        let mut seen = BTreeSet::new();
        for batch in &batches {
            sync.reconcile(EntityKind::Car, batch);
            seen.extend(batch.iter().map(|r| r.id.clone()));

            let ids: BTreeSet<_> = sync
                .snapshot(EntityKind::Car)
                .into_iter()
                .map(|r| r.id)
                .collect();
            assert_eq!(ids, seen);
        }

        let a = sync.record(EntityKind::Car, "a").unwrap();
        assert_eq!(a.position.to_array(), [4.0, 0.0, 4.0]);
        assert_eq!(a.direction, Some(Direction::Diagonal));
        let b = sync.record(EntityKind::Car, "b").unwrap();
        assert_eq!(b.position.to_array(), [2.0, 0.0, 2.0]);
    }

    #[test]
    fn reconcile_twice_equals_once() {
        let batch = vec![car("c1", 1.0, 2.0, "Up"), car("c2", 3.0, 4.0, "Down")];

        let mut once = EntitySynchronizer::default();
        once.reconcile(EntityKind::Car, &batch);
        let mut twice = EntitySynchronizer::default();
        twice.reconcile(EntityKind::Car, &batch);
        twice.reconcile(EntityKind::Car, &batch);

        assert_eq!(once.snapshot(EntityKind::Car), twice.snapshot(EntityKind::Car));
    }

    #[test]
    fn kinds_are_independent() {
        let mut sync = EntitySynchronizer::default();
        sync.reconcile(EntityKind::Car, &[car("x", 0.0, 0.0, "Up")]);
        sync.reconcile(EntityKind::Building, &[ServerRecord::at("x", 9.0, 1.0, 9.0)]);

        assert_eq!(sync.len(EntityKind::Car), 1);
        assert_eq!(sync.len(EntityKind::Building), 1);
        assert_eq!(
            sync.record(EntityKind::Building, "x").unwrap().position.x,
            9.0
        );
        assert_eq!(sync.record(EntityKind::Car, "x").unwrap().position.x, 0.0);
    }

    #[test]
    fn traffic_light_color_follows_state() {
        let mut sync = EntitySynchronizer::default();
        let light = |red| ServerRecord::at("l1", 0.0, 1.0, 0.0).with_state(red);

        sync.reconcile(EntityKind::TrafficLight, &[light(true)]);
        assert_eq!(
            sync.record(EntityKind::TrafficLight, "l1").unwrap().color.to_array(),
            [1.0, 0.0, 0.0, 1.0]
        );

        sync.reconcile(EntityKind::TrafficLight, &[light(false)]);
        assert_eq!(
            sync.record(EntityKind::TrafficLight, "l1").unwrap().color,
            Rgba::GREEN
        );
    }

    #[test]
    fn unknown_id_is_missing_entity() {
        let sync = EntitySynchronizer::default();
        match sync.record(EntityKind::Car, "ghost") {
            Err(SyncError::MissingEntity { kind, id }) => {
                assert_eq!(kind, EntityKind::Car);
                assert_eq!(id, "ghost");
            }
            other => panic!("expected MissingEntity, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Cycle sequencing
    // -----------------------------------------------------------------------

    #[test]
    fn cycles_are_allocated_per_kind() {
        let mut sync = EntitySynchronizer::default();
        assert_eq!(sync.begin_cycle(EntityKind::Car), 1);
        assert_eq!(sync.begin_cycle(EntityKind::Car), 2);
        assert_eq!(sync.begin_cycle(EntityKind::TrafficLight), 1);
    }

    #[test]
    fn stale_response_is_discarded() {
        let mut sync = EntitySynchronizer::default();
        let old = sync.begin_cycle(EntityKind::Car);
        let new = sync.begin_cycle(EntityKind::Car);

        let applied = sync.apply(EntityKind::Car, new, &[car("c1", 9.0, 9.0, "Right")]);
        assert!(!applied.is_stale());

        let late = sync.apply(EntityKind::Car, old, &[car("c1", 0.0, 0.0, "Up")]);
        assert_eq!(
            late,
            ApplyOutcome::Stale {
                cycle: old,
                last_applied: new
            }
        );

        let c1 = sync.record(EntityKind::Car, "c1").unwrap();
        assert_eq!(c1.position.to_array(), [9.0, 0.0, 9.0]);
        assert_eq!(c1.last_cycle, new);
        assert_eq!(sync.stats().stale_responses, 1);
    }

    #[test]
    fn stale_guard_is_per_kind() {
        let mut sync = EntitySynchronizer::default();
        sync.begin_cycle(EntityKind::Car);
        let car_cycle = sync.begin_cycle(EntityKind::Car);
        let light_cycle = sync.begin_cycle(EntityKind::TrafficLight);

        sync.apply(EntityKind::Car, car_cycle, &[car("c1", 0.0, 0.0, "Up")]);
        let out = sync.apply(
            EntityKind::TrafficLight,
            light_cycle,
            &[ServerRecord::at("l1", 0.0, 0.0, 0.0)],
        );
        assert!(!out.is_stale());
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    #[test]
    fn retain_keeps_departed_cars() {
        let mut sync = EntitySynchronizer::default();
        let c1 = sync.begin_cycle(EntityKind::Car);
        sync.apply(EntityKind::Car, c1, &[car("a", 0.0, 0.0, "Up"), car("b", 0.0, 0.0, "Up")]);
        let c2 = sync.begin_cycle(EntityKind::Car);
        sync.apply(EntityKind::Car, c2, &[car("b", 1.0, 0.0, "Up")]);

        assert_eq!(sync.len(EntityKind::Car), 2);
        assert_eq!(sync.stats().evicted, 0);
    }

    #[test]
    fn sweep_removes_departed_cars() {
        let mut sync = sweeping();
        let c1 = sync.begin_cycle(EntityKind::Car);
        sync.apply(EntityKind::Car, c1, &[car("a", 0.0, 0.0, "Up"), car("b", 0.0, 0.0, "Up")]);
        let c2 = sync.begin_cycle(EntityKind::Car);
        let out = sync.apply(EntityKind::Car, c2, &[car("b", 1.0, 0.0, "Up")]);

        assert!(matches!(out, ApplyOutcome::Applied { evicted: 1, .. }));
        assert_eq!(sync.len(EntityKind::Car), 1);
        assert!(sync.record(EntityKind::Car, "a").is_err());
        assert_eq!(sync.stats().evicted, 1);
    }

    #[test]
    fn sweep_ignores_stale_responses() {
        let mut sync = sweeping();
        let old = sync.begin_cycle(EntityKind::Car);
        let new = sync.begin_cycle(EntityKind::Car);
        sync.apply(EntityKind::Car, new, &[car("a", 0.0, 0.0, "Up"), car("b", 0.0, 0.0, "Up")]);
        sync.apply(EntityKind::Car, old, &[]);
        assert_eq!(sync.len(EntityKind::Car), 2);
    }

    #[test]
    fn bare_reconcile_never_sweeps() {
        let mut sync = sweeping();
        sync.reconcile(EntityKind::Car, &[car("a", 0.0, 0.0, "Up")]);
        sync.reconcile(EntityKind::Car, &[car("b", 0.0, 0.0, "Up")]);
        assert_eq!(sync.len(EntityKind::Car), 2);
    }

    // -----------------------------------------------------------------------
    // Failures, scene, stats
    // -----------------------------------------------------------------------

    #[test]
    fn failure_leaves_kind_untouched() {
        let mut sync = EntitySynchronizer::default();
        sync.reconcile(EntityKind::Car, &[car("c1", 1.0, 1.0, "Up")]);
        let before = sync.snapshot(EntityKind::Car);

        sync.begin_cycle(EntityKind::Car);
        sync.record_failure(
            EntityKind::Car,
            &FetchError::Transport {
                endpoint: "getCars".into(),
                message: "connection refused".into(),
            },
        );

        assert_eq!(sync.snapshot(EntityKind::Car), before);
        assert_eq!(sync.stats().failed_fetches, 1);
    }

    #[test]
    fn scene_contains_every_kind() {
        let mut sync = EntitySynchronizer::default();
        for (i, kind) in EntityKind::ALL.iter().enumerate() {
            let cycle = sync.begin_cycle(*kind);
            sync.apply(*kind, cycle, &[ServerRecord::at(format!("e{i}"), 0.0, 0.0, 0.0)]);
        }

        let scene = sync.scene();
        assert_eq!(scene.total(), 5);
        assert_eq!(scene.cycle, 1);
        for kind in EntityKind::ALL {
            assert_eq!(scene.records(kind).len(), 1);
            assert_eq!(scene.records(kind)[0].kind, kind);
        }

        let stats = sync.stats();
        assert_eq!(stats.total_entities(), 5);
        assert_eq!(stats.applied_responses, 5);
    }

    #[test]
    fn clear_drops_records_but_keeps_counting() {
        let mut sync = EntitySynchronizer::default();
        let c = sync.begin_cycle(EntityKind::Car);
        sync.apply(EntityKind::Car, c, &[car("c1", 0.0, 0.0, "Up")]);

        sync.clear();

        assert_eq!(sync.len(EntityKind::Car), 0);
        assert_eq!(sync.last_applied_cycle(EntityKind::Car), c);
        assert_eq!(sync.begin_cycle(EntityKind::Car), c + 1);
    }

    #[test]
    fn response_issued_before_clear_is_stale() {
        let mut sync = EntitySynchronizer::default();
        sync.begin_cycle(EntityKind::Car);
        let in_flight = sync.begin_cycle(EntityKind::Car);

        sync.clear();
        let fresh = sync.begin_cycle(EntityKind::Car);

        let late = sync.apply(EntityKind::Car, in_flight, &[car("ghost", 0.0, 0.0, "Up")]);
        assert!(late.is_stale());

        let out = sync.apply(EntityKind::Car, fresh, &[car("c1", 1.0, 0.0, "Up")]);
        assert!(!out.is_stale());

        let ids: Vec<_> = sync
            .snapshot(EntityKind::Car)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["c1"]);
    }
}

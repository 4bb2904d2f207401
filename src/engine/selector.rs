//! Selects the next actionable target from the shared registry.
//!
//! Priority encodes operator/policy urgency and always wins; distance is a
//! greedy nearest-first tie-break within a priority band to minimize total
//! travel.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{GeoPoint, TargetId};

use super::registry::TargetRegistry;

/// Sweep, recompute feasibility, and return the best live candidate.
///
/// Priority 0 bypasses feasibility entirely; everything else must fit the
/// policy's distance and travel caps and still be unexpired at the estimated
/// arrival time. Arriving exactly at expiry is infeasible.
pub fn select_next(
    registry: &mut TargetRegistry,
    position: GeoPoint,
    base_speed_kmh: f64,
    now: DateTime<Utc>,
) -> Option<TargetId> {
    registry.sweep(now);
    registry.refresh_feasibility(position, base_speed_kmh);
    registry.reorder();

    registry
        .iter()
        .find(|target| {
            if !target.is_live() {
                return false;
            }
            let policy = &target.policy;
            if policy.is_forced() {
                return true;
            }
            let arrival = now + Duration::milliseconds((target.travel_secs * 1000.0).round() as i64);
            target.distance_m <= policy.max_distance_m
                && target.travel_secs <= policy.max_travel_secs
                && target.expires_at() > arrival
        })
        .map(|target| target.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PolicyTable, PursuitPolicy, Sighting, SpeciesId};
    use crate::engine::feasibility::SAFETY_MARGIN_SECS;
    use std::collections::{HashMap, HashSet};

    const BASE: GeoPoint = GeoPoint {
        latitude: 40.0,
        longitude: -74.0,
    };
    const BASE_SPEED_KMH: f64 = 7.2; // 2 m/s

    fn north_of(meters: f64) -> GeoPoint {
        GeoPoint::new(BASE.latitude + meters / 111_195.0, BASE.longitude)
    }

    fn lenient(priority: u8) -> PursuitPolicy {
        PursuitPolicy {
            priority,
            max_distance_m: 100_000.0,
            max_travel_secs: 100_000.0,
            dwell_secs: 0,
            ..PursuitPolicy::default()
        }
    }

    fn registry_with(entries: &[(u16, f64, u8)]) -> TargetRegistry {
        let mut overrides = HashMap::new();
        let mut watched = HashSet::new();
        let mut sightings = Vec::new();
        for (species, meters, priority) in entries {
            overrides.insert(SpeciesId(*species), lenient(*priority));
            watched.insert(SpeciesId(*species));
            sightings.push(Sighting {
                species: SpeciesId(*species),
                position: north_of(*meters),
                reported_at: Utc::now(),
            });
        }
        let table = PolicyTable::new(lenient(3), overrides);
        let mut registry = TargetRegistry::new(Duration::minutes(15), 10.0, 512);
        registry.merge(&sightings, &watched, &table, BASE, BASE_SPEED_KMH);
        registry
    }

    #[test]
    fn forced_priority_wins_regardless_of_distance() {
        // priorities [0,1,1,2] at distances [500,50,10,1]
        let mut registry = registry_with(&[(1, 500.0, 0), (2, 50.0, 1), (3, 10.0, 1), (4, 1.0, 2)]);

        let picked = select_next(&mut registry, BASE, BASE_SPEED_KMH, Utc::now()).unwrap();
        assert_eq!(picked.species(), SpeciesId(1));
    }

    #[test]
    fn nearest_within_best_priority_band_wins() {
        let mut registry = registry_with(&[(2, 50.0, 1), (3, 10.0, 1), (4, 1.0, 2)]);

        let picked = select_next(&mut registry, BASE, BASE_SPEED_KMH, Utc::now()).unwrap();
        assert_eq!(picked.species(), SpeciesId(3));
    }

    #[test]
    fn arrival_exactly_at_expiry_is_infeasible() {
        let now = Utc::now();
        // Zero distance: travel_secs is exactly the safety margin.
        let travel = SAFETY_MARGIN_SECS as i64;
        let table = PolicyTable::new(lenient(3), HashMap::new());
        let watched: HashSet<_> = [SpeciesId(1)].into_iter().collect();

        let boundary = Sighting {
            species: SpeciesId(1),
            position: BASE,
            reported_at: now - Duration::minutes(15) + Duration::seconds(travel),
        };
        let mut registry = TargetRegistry::new(Duration::minutes(15), 10.0, 512);
        registry.merge(&[boundary], &watched, &table, BASE, BASE_SPEED_KMH);

        // expires_at == now + travel_secs: excluded by the strict inequality.
        assert_eq!(select_next(&mut registry, BASE, BASE_SPEED_KMH, now), None);

        // One second more headroom makes it feasible.
        let feasible = Sighting {
            species: SpeciesId(1),
            position: north_of(30.0),
            reported_at: now - Duration::minutes(15) + Duration::seconds(travel + 60),
        };
        let mut registry = TargetRegistry::new(Duration::minutes(15), 10.0, 512);
        registry.merge(&[feasible], &watched, &table, BASE, BASE_SPEED_KMH);
        assert!(select_next(&mut registry, BASE, BASE_SPEED_KMH, now).is_some());
    }

    #[test]
    fn distance_and_travel_caps_filter_candidates() {
        let strict = PursuitPolicy {
            priority: 1,
            max_distance_m: 100.0,
            max_travel_secs: 100_000.0,
            dwell_secs: 0,
            ..PursuitPolicy::default()
        };
        let mut overrides = HashMap::new();
        overrides.insert(SpeciesId(1), strict);
        let table = PolicyTable::new(lenient(3), overrides);
        let watched: HashSet<_> = [SpeciesId(1)].into_iter().collect();

        let far = Sighting {
            species: SpeciesId(1),
            position: north_of(500.0),
            reported_at: Utc::now(),
        };
        let mut registry = TargetRegistry::new(Duration::minutes(15), 10.0, 512);
        registry.merge(&[far], &watched, &table, BASE, BASE_SPEED_KMH);

        assert_eq!(select_next(&mut registry, BASE, BASE_SPEED_KMH, Utc::now()), None);
    }

    #[test]
    fn soft_deleted_target_is_never_selected_again() {
        let mut registry = registry_with(&[(1, 100.0, 1), (2, 200.0, 2)]);
        let size = registry.len();

        let first = select_next(&mut registry, BASE, BASE_SPEED_KMH, Utc::now()).unwrap();
        registry.mark_visited(&first);

        for _ in 0..5 {
            let picked = select_next(&mut registry, BASE, BASE_SPEED_KMH, Utc::now());
            assert_ne!(picked, Some(first));
        }
        assert_eq!(registry.len(), size);
    }

    #[test]
    fn forced_priority_ignores_feasibility_caps() {
        let impossible = PursuitPolicy {
            priority: 0,
            max_distance_m: 1.0,
            max_travel_secs: 1.0,
            dwell_secs: 0,
            ..PursuitPolicy::default()
        };
        let mut overrides = HashMap::new();
        overrides.insert(SpeciesId(1), impossible);
        let table = PolicyTable::new(lenient(3), overrides);
        let watched: HashSet<_> = [SpeciesId(1)].into_iter().collect();

        let target = Sighting {
            species: SpeciesId(1),
            position: north_of(5_000.0),
            reported_at: Utc::now(),
        };
        let mut registry = TargetRegistry::new(Duration::minutes(15), 10.0, 512);
        registry.merge(&[target], &watched, &table, BASE, BASE_SPEED_KMH);

        assert!(select_next(&mut registry, BASE, BASE_SPEED_KMH, Utc::now()).is_some());
    }
}

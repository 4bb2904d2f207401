//! The shared target set.
//!
//! One logical owner mutates this registry; everything else goes through the
//! engine handle, so every read-modify-write sequence runs under a single
//! lock acquisition. Entries are never physically removed when visited or
//! suppressed; the marker blocks re-insertion of the same physical sighting
//! until its validity window lapses and the sweep drops it.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::domain::{
    GeoPoint, PolicyTable, PursuitPolicy, Sighting, SpeciesId, Target, TargetId,
};

use super::feasibility;

/// Counters for one merge pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeOutcome {
    pub merged: usize,
    pub skipped_known: usize,
    pub skipped_unwatched: usize,
    pub evicted: usize,
}

pub struct TargetRegistry {
    entries: Vec<Target>,
    validity: Duration,
    proximity_tolerance_m: f64,
    max_tracked: usize,
}

impl TargetRegistry {
    pub fn new(validity: Duration, proximity_tolerance_m: f64, max_tracked: usize) -> Self {
        Self {
            entries: Vec::new(),
            validity,
            proximity_tolerance_m,
            max_tracked,
        }
    }

    /// An existing entry (any state) blocks a fetched sighting when it shares
    /// the identity key, or is the same species within the proximity
    /// tolerance; the latter absorbs provider position jitter for one
    /// physical sighting.
    fn blocks(&self, sighting: &Sighting) -> bool {
        let id = TargetId::new(sighting.species, sighting.position);
        self.entries.iter().any(|entry| {
            entry.id() == id
                || (entry.species == sighting.species
                    && entry.position.distance_m(&sighting.position)
                        <= self.proximity_tolerance_m)
        })
    }

    /// Merge fetched sightings: dedupe against the tracked set, drop species
    /// outside the watch-list, attach a policy clone, compute feasibility,
    /// then re-sort.
    pub fn merge(
        &mut self,
        sightings: &[Sighting],
        watchlist: &HashSet<SpeciesId>,
        policies: &PolicyTable,
        position: GeoPoint,
        base_speed_kmh: f64,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for sighting in sightings {
            if !watchlist.contains(&sighting.species) {
                outcome.skipped_unwatched += 1;
                continue;
            }
            if self.blocks(sighting) {
                outcome.skipped_known += 1;
                continue;
            }

            let policy = policies.policy_for(sighting.species);
            let mut target = Target::from_sighting(sighting, self.validity, policy);
            feasibility::apply(&mut target, position, base_speed_kmh);
            self.entries.push(target);
            outcome.merged += 1;
        }

        outcome.evicted = self.evict_over_cap();
        self.reorder();
        outcome
    }

    /// Physically drop entries whose fixed expiry has passed. Returns the
    /// number dropped.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| !entry.is_expired(now));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, "swept expired targets");
        }
        dropped
    }

    /// Recompute distance/ETA for every entry against the given position.
    pub fn refresh_feasibility(&mut self, position: GeoPoint, base_speed_kmh: f64) {
        for entry in &mut self.entries {
            feasibility::apply(entry, position, base_speed_kmh);
        }
    }

    /// Sort by (priority ascending, distance ascending).
    pub fn reorder(&mut self) {
        self.entries.sort_by(|a, b| {
            a.policy
                .priority
                .cmp(&b.policy.priority)
                .then(
                    a.distance_m
                        .partial_cmp(&b.distance_m)
                        .unwrap_or(Ordering::Equal),
                )
        });
    }

    pub fn set_priority(&mut self, id: &TargetId, priority: u8) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id() == *id) {
            Some(entry) => {
                entry.policy.priority = priority;
                true
            }
            None => false,
        }
    }

    pub fn mark_visited(&mut self, id: &TargetId) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id() == *id) {
            Some(entry) => {
                entry.mark_visited();
                true
            }
            None => false,
        }
    }

    /// Mark the nearest live entry of `species` within `tolerance_m` of
    /// `position` as visited. Returns false when nothing matched.
    pub fn reconcile_visited(
        &mut self,
        species: SpeciesId,
        position: GeoPoint,
        tolerance_m: f64,
    ) -> bool {
        let nearest = self
            .entries
            .iter_mut()
            .filter(|entry| entry.is_live() && entry.species == species)
            .map(|entry| {
                let distance = entry.position.distance_m(&position);
                (entry, distance)
            })
            .filter(|(_, distance)| *distance <= tolerance_m)
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        match nearest {
            Some((entry, _)) => {
                entry.mark_visited();
                true
            }
            None => false,
        }
    }

    /// Insert a suppressed placeholder blocking the given sighting position
    /// from resurfacing as a live target.
    pub fn insert_suppressed(
        &mut self,
        species: SpeciesId,
        position: GeoPoint,
        now: DateTime<Utc>,
        policy: PursuitPolicy,
    ) {
        self.entries.push(Target::suppressed_marker(
            species,
            position,
            now,
            self.validity,
            policy,
        ));
    }

    pub fn get(&self, id: &TargetId) -> Option<&Target> {
        self.entries.iter().find(|entry| entry.id() == *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.entries.iter()
    }

    /// Filtered live view: not visited, not suppressed, not expired.
    pub fn live_view(&self, now: DateTime<Utc>) -> Vec<&Target> {
        self.entries
            .iter()
            .filter(|entry| entry.is_live() && !entry.is_expired(now))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop worst-ranked live entries until the cap holds. Visited and
    /// suppressed markers are kept; they carry the anti-recurrence state.
    fn evict_over_cap(&mut self) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.max_tracked {
            let worst = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.is_live())
                .max_by(|(_, a), (_, b)| {
                    a.policy
                        .priority
                        .cmp(&b.policy.priority)
                        .then(
                            a.distance_m
                                .partial_cmp(&b.distance_m)
                                .unwrap_or(Ordering::Equal),
                        )
                })
                .map(|(index, _)| index);

            match worst {
                Some(index) => {
                    let dropped = self.entries.swap_remove(index);
                    debug!(target = %dropped.id(), "evicted over cap");
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: GeoPoint = GeoPoint {
        latitude: 40.0,
        longitude: -74.0,
    };

    /// Offset `meters` north of BASE (1e-5 deg of latitude ~ 1.11m).
    fn north_of(meters: f64) -> GeoPoint {
        GeoPoint::new(BASE.latitude + meters / 111_195.0, BASE.longitude)
    }

    fn sighting(species: u16, position: GeoPoint) -> Sighting {
        Sighting {
            species: SpeciesId(species),
            position,
            reported_at: Utc::now(),
        }
    }

    fn watchlist(species: &[u16]) -> HashSet<SpeciesId> {
        species.iter().copied().map(SpeciesId).collect()
    }

    fn registry() -> TargetRegistry {
        TargetRegistry::new(Duration::minutes(15), 10.0, 512)
    }

    #[test]
    fn merge_is_idempotent_for_identical_payload() {
        let mut registry = registry();
        let payload = vec![sighting(1, north_of(100.0)), sighting(2, north_of(300.0))];
        let table = PolicyTable::default();
        let watched = watchlist(&[1, 2]);

        let first = registry.merge(&payload, &watched, &table, BASE, 7.2);
        assert_eq!(first.merged, 2);

        let second = registry.merge(&payload, &watched, &table, BASE, 7.2);
        assert_eq!(second.merged, 0);
        assert_eq!(second.skipped_known, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn proximity_jitter_is_absorbed() {
        let mut registry = registry();
        let table = PolicyTable::default();
        let watched = watchlist(&[1]);

        // Same species ~6m apart: one physical sighting seen by two feeds.
        let payload = vec![sighting(1, north_of(0.0)), sighting(1, north_of(6.0))];
        let outcome = registry.merge(&payload, &watched, &table, BASE, 7.2);
        assert_eq!(outcome.merged, 1);
        assert_eq!(outcome.skipped_known, 1);

        // A different species at the same spot is a distinct target.
        let other = vec![sighting(2, north_of(3.0))];
        let outcome = registry.merge(&other, &watchlist(&[1, 2]), &table, BASE, 7.2);
        assert_eq!(outcome.merged, 1);
    }

    #[test]
    fn unwatched_species_are_skipped() {
        let mut registry = registry();
        let outcome = registry.merge(
            &[sighting(99, north_of(50.0))],
            &watchlist(&[1]),
            &PolicyTable::default(),
            BASE,
            7.2,
        );
        assert_eq!(outcome.merged, 0);
        assert_eq!(outcome.skipped_unwatched, 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let mut registry = registry();
        let now = Utc::now();
        let fresh = sighting(1, north_of(100.0));
        let stale = Sighting {
            reported_at: now - Duration::minutes(20),
            ..sighting(2, north_of(200.0))
        };
        registry.merge(
            &[fresh, stale],
            &watchlist(&[1, 2]),
            &PolicyTable::default(),
            BASE,
            7.2,
        );
        assert_eq!(registry.len(), 2);

        let dropped = registry.sweep(now);
        assert_eq!(dropped, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next().unwrap().species, SpeciesId(1));
    }

    #[test]
    fn visited_marker_blocks_reinsertion() {
        let mut registry = registry();
        let table = PolicyTable::default();
        let watched = watchlist(&[1]);
        let payload = vec![sighting(1, north_of(100.0))];

        registry.merge(&payload, &watched, &table, BASE, 7.2);
        let id = registry.iter().next().unwrap().id();
        assert!(registry.mark_visited(&id));

        let again = registry.merge(&payload, &watched, &table, BASE, 7.2);
        assert_eq!(again.merged, 0);
        assert_eq!(registry.len(), 1);
        assert!(registry.live_view(Utc::now()).is_empty());
    }

    #[test]
    fn suppressed_placeholder_blocks_nearby_sighting() {
        let mut registry = registry();
        let now = Utc::now();
        registry.insert_suppressed(SpeciesId(1), north_of(0.0), now, PursuitPolicy::default());

        // A refetch of the same physical sighting within tolerance must not
        // produce a live entry.
        let outcome = registry.merge(
            &[sighting(1, north_of(5.0))],
            &watchlist(&[1]),
            &PolicyTable::default(),
            BASE,
            7.2,
        );
        assert_eq!(outcome.merged, 0);
        assert!(registry.live_view(now).is_empty());
    }

    #[test]
    fn reconcile_marks_nearest_live_match() {
        let mut registry = registry();
        let table = PolicyTable::default();
        registry.merge(
            &[sighting(1, north_of(50.0)), sighting(1, north_of(150.0))],
            &watchlist(&[1]),
            &table,
            BASE,
            7.2,
        );

        assert!(registry.reconcile_visited(SpeciesId(1), north_of(140.0), 200.0));

        let live: Vec<_> = registry.live_view(Utc::now());
        assert_eq!(live.len(), 1);
        // The nearer entry to the reconcile position (150m) was marked.
        assert_eq!(live[0].id(), TargetId::new(SpeciesId(1), north_of(50.0)));
    }

    #[test]
    fn reconcile_misses_outside_tolerance() {
        let mut registry = registry();
        registry.merge(
            &[sighting(1, north_of(500.0))],
            &watchlist(&[1]),
            &PolicyTable::default(),
            BASE,
            7.2,
        );
        assert!(!registry.reconcile_visited(SpeciesId(1), BASE, 200.0));
    }

    #[test]
    fn eviction_drops_worst_ranked_live_entries() {
        let mut registry = TargetRegistry::new(Duration::minutes(15), 10.0, 2);
        let mut table_overrides = std::collections::HashMap::new();
        table_overrides.insert(
            SpeciesId(2),
            PursuitPolicy {
                priority: 5,
                ..PursuitPolicy::default()
            },
        );
        let table = PolicyTable::new(PursuitPolicy::default(), table_overrides);

        let outcome = registry.merge(
            &[
                sighting(1, north_of(100.0)),
                sighting(2, north_of(200.0)), // worst: priority 5
                sighting(3, north_of(300.0)),
            ],
            &watchlist(&[1, 2, 3]),
            &table,
            BASE,
            7.2,
        );

        assert_eq!(outcome.evicted, 1);
        assert_eq!(registry.len(), 2);
        assert!(registry.iter().all(|t| t.species != SpeciesId(2)));
    }

    #[test]
    fn reorder_ranks_priority_then_distance() {
        let mut registry = registry();
        let mut overrides = std::collections::HashMap::new();
        overrides.insert(
            SpeciesId(2),
            PursuitPolicy {
                priority: 1,
                ..PursuitPolicy::default()
            },
        );
        let table = PolicyTable::new(PursuitPolicy::default(), overrides);

        registry.merge(
            &[
                sighting(1, north_of(10.0)),  // priority 3, nearest
                sighting(2, north_of(900.0)), // priority 1, far
                sighting(2, north_of(400.0)), // priority 1, nearer
            ],
            &watchlist(&[1, 2]),
            &table,
            BASE,
            7.2,
        );

        let order: Vec<f64> = registry.iter().map(|t| t.distance_m.round()).collect();
        assert_eq!(order.len(), 3);
        assert!((order[0] - 400.0).abs() <= 1.0);
        assert!((order[1] - 900.0).abs() <= 1.0);
        assert!((order[2] - 10.0).abs() <= 1.0);
    }
}

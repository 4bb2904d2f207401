//! Out-of-band commands against the shared registry.
//!
//! Commands are fire-and-forget from the caller's point of view: each one is
//! a single short write-lock mutation, so a reconciliation or removal lands
//! even while a travel leg is in flight.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::{GeoPoint, PolicyTable, SpeciesId, TargetId, FORCED_PRIORITY};
use crate::events::{EventEnvelope, EventSink, PursuitEvent, TargetSnapshot};

use super::live_snapshots;
use super::registry::TargetRegistry;

#[derive(Clone)]
pub struct CommandHandler {
    registry: Arc<RwLock<TargetRegistry>>,
    events: Arc<dyn EventSink>,
    force_signal: Arc<AtomicBool>,
    policies: PolicyTable,
    watchlist: HashSet<SpeciesId>,
    reconcile_tolerance_m: f64,
}

impl CommandHandler {
    pub fn new(
        registry: Arc<RwLock<TargetRegistry>>,
        events: Arc<dyn EventSink>,
        force_signal: Arc<AtomicBool>,
        policies: PolicyTable,
        watchlist: HashSet<SpeciesId>,
        reconcile_tolerance_m: f64,
    ) -> Self {
        Self {
            registry,
            events,
            force_signal,
            policies,
            watchlist,
            reconcile_tolerance_m,
        }
    }

    fn publish(&self, event: PursuitEvent) {
        self.events.publish(EventEnvelope::new(event));
    }

    /// Move the entry to the forced priority. Returns false when the id is
    /// not tracked.
    pub async fn prioritize(&self, id: &TargetId) -> bool {
        let mut registry = self.registry.write().await;
        if !registry.set_priority(id, FORCED_PRIORITY) {
            return false;
        }
        registry.reorder();
        info!(target = %id, "target prioritized");
        true
    }

    /// Prioritize and arm the one-shot signal that makes the next pursuit
    /// invocation bypass its throttle and gates.
    pub async fn force_next(&self, id: &TargetId) -> bool {
        let snapshot = {
            let mut registry = self.registry.write().await;
            if registry.set_priority(id, FORCED_PRIORITY) {
                registry.reorder();
                registry.get(id).map(TargetSnapshot::of)
            } else {
                None
            }
        };
        self.force_signal.store(true, Ordering::SeqCst);

        match snapshot {
            Some(target) => {
                info!(id = %id, "target forced for next pursuit");
                self.publish(PursuitEvent::Targeted { target });
                true
            }
            None => false,
        }
    }

    /// Soft delete: mark the entry visited so it is never selected again,
    /// while the retained marker keeps blocking re-insertion.
    pub async fn remove(&self, id: &TargetId) -> bool {
        let targets = {
            let mut registry = self.registry.write().await;
            if !registry.mark_visited(id) {
                return false;
            }
            registry.reorder();
            live_snapshots(&registry, Utc::now())
        };
        info!(target = %id, "target removed from queue");
        self.publish(PursuitEvent::QueueUpdated { targets });
        true
    }

    /// Reconcile a catch made outside this engine's pipeline: mark the
    /// nearest live match visited, or plant a suppressed placeholder so a
    /// later refresh cannot resurrect the same physical sighting.
    pub async fn reconcile_external_catch(&self, species: SpeciesId, position: GeoPoint) -> bool {
        let now = Utc::now();
        let matched = {
            let mut registry = self.registry.write().await;
            let matched =
                registry.reconcile_visited(species, position, self.reconcile_tolerance_m);
            if !matched && self.watchlist.contains(&species) {
                registry.insert_suppressed(
                    species,
                    position,
                    now,
                    self.policies.policy_for(species),
                );
                debug!(%species, %position, "planted suppressed placeholder");
            }
            matched
        };

        self.publish(PursuitEvent::ExternalCatchReconciled {
            species,
            latitude: position.latitude,
            longitude: position.longitude,
            matched,
        });
        matched
    }
}

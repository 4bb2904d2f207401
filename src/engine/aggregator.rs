//! Rate-limited refresh cycle: concurrent fan-out to every sighting feed,
//! merge into the shared registry, event republish.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::PursuitConfig;
use crate::domain::{GeoPoint, PolicyTable, SpeciesId};
use crate::events::{EventEnvelope, EventSink, PursuitEvent};
use crate::sources::{fetch_soft, SightingSource};

use super::live_snapshots;
use super::registry::TargetRegistry;

pub struct Aggregator {
    sources: Vec<Arc<dyn SightingSource>>,
    registry: Arc<RwLock<TargetRegistry>>,
    events: Arc<dyn EventSink>,
    watchlist: HashSet<SpeciesId>,
    policies: PolicyTable,
    base_speed_kmh: f64,
    min_interval: Duration,
    fallback: Option<GeoPoint>,
    fallback_distance_m: f64,
    last_refresh: Option<DateTime<Utc>>,
}

impl Aggregator {
    pub fn new(
        sources: Vec<Arc<dyn SightingSource>>,
        registry: Arc<RwLock<TargetRegistry>>,
        events: Arc<dyn EventSink>,
        watchlist: HashSet<SpeciesId>,
        policies: PolicyTable,
        config: &PursuitConfig,
    ) -> Self {
        Self {
            sources,
            registry,
            events,
            watchlist,
            policies,
            base_speed_kmh: config.base_speed_kmh,
            min_interval: Duration::seconds(config.min_refresh_interval_secs as i64),
            fallback: config.fallback_location.map(Into::into),
            fallback_distance_m: config.fallback_distance_m,
            last_refresh: None,
        }
    }

    /// One refresh cycle. Returns the number of newly merged targets.
    ///
    /// When the previous cycle completed inside the minimum interval and the
    /// call is not forced, no fetch happens, but feasibility is recomputed
    /// against the current position and the queue republished, so
    /// distance/ETA stay current while the position moves.
    pub async fn refresh(&mut self, position: GeoPoint, forced: bool, now: DateTime<Utc>) -> usize {
        if !forced && self.is_recent(now) {
            self.silent_refresh(position, now).await;
            return 0;
        }

        let mut centers = vec![position];
        if let Some(fallback) = self.fallback {
            // Keep baseline coverage at the fallback location while roaming
            // far away from it.
            if position.distance_m(&fallback) > self.fallback_distance_m {
                centers.push(fallback);
            }
        }

        let mut fetches = Vec::with_capacity(centers.len() * self.sources.len());
        for center in &centers {
            for source in &self.sources {
                fetches.push(fetch_soft(source.as_ref(), *center));
            }
        }
        let batches = join_all(fetches).await;
        self.last_refresh = Some(now);

        let sightings: Vec<_> = batches.into_iter().flatten().collect();
        let fetched = sightings.len();

        let (outcome, targets) = {
            let mut registry = self.registry.write().await;
            registry.sweep(now);
            let outcome = registry.merge(
                &sightings,
                &self.watchlist,
                &self.policies,
                position,
                self.base_speed_kmh,
            );
            let targets = (outcome.merged > 0).then(|| live_snapshots(&registry, now));
            (outcome, targets)
        };

        info!(
            fetched,
            merged = outcome.merged,
            skipped_known = outcome.skipped_known,
            skipped_unwatched = outcome.skipped_unwatched,
            evicted = outcome.evicted,
            "refresh cycle complete"
        );

        if let Some(targets) = targets {
            self.events
                .publish(EventEnvelope::new(PursuitEvent::ScanCompleted { targets }));
        }
        outcome.merged
    }

    fn is_recent(&self, now: DateTime<Utc>) -> bool {
        self.last_refresh
            .map(|at| now - at < self.min_interval)
            .unwrap_or(false)
    }

    async fn silent_refresh(&self, position: GeoPoint, now: DateTime<Utc>) {
        let targets = {
            let mut registry = self.registry.write().await;
            if registry.is_empty() {
                return;
            }
            registry.refresh_feasibility(position, self.base_speed_kmh);
            registry.reorder();
            live_snapshots(&registry, now)
        };
        debug!("silent refresh republished the queue");
        self.events
            .publish(EventEnvelope::new(PursuitEvent::QueueUpdated { targets }));
    }
}

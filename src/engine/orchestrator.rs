//! Pursuit state machine: select → travel → act → visited.
//!
//! One orchestrator invocation runs at most one pursuit cycle. Cancellation
//! is observed at loop-iteration boundaries and before each relocate; a leg
//! already in flight runs to completion together with its opportunistic
//! actions.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::actions::{ActionRunner, ResourceGauge};
use crate::config::PursuitConfig;
use crate::domain::{GeoPoint, TargetId};
use crate::error::{QuarryError, Result};
use crate::events::{EventEnvelope, EventSink, PursuitEvent, TargetSnapshot};
use crate::nav::{Navigator, StepCallback};

use super::aggregator::Aggregator;
use super::feasibility;
use super::live_snapshots;
use super::registry::TargetRegistry;
use super::selector;

/// Phases of the pursuit loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PursuitState {
    Idle,
    Selecting,
    Traveling,
    ArrivedPrimaryAction,
    DwellSecondaryAction,
    Visited,
}

impl fmt::Display for PursuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Selecting => write!(f, "selecting"),
            Self::Traveling => write!(f, "traveling"),
            Self::ArrivedPrimaryAction => write!(f, "arrived_primary_action"),
            Self::DwellSecondaryAction => write!(f, "dwell_secondary_action"),
            Self::Visited => write!(f, "visited"),
        }
    }
}

impl PursuitState {
    /// Legal transitions of the pursuit loop.
    pub fn allows(self, next: PursuitState) -> bool {
        use PursuitState::*;
        matches!(
            (self, next),
            (Idle, Selecting)
                | (Selecting, Traveling)
                | (Selecting, Idle)
                | (Traveling, ArrivedPrimaryAction)
                | (Traveling, Idle)
                | (ArrivedPrimaryAction, DwellSecondaryAction)
                | (DwellSecondaryAction, Visited)
                | (Visited, Selecting)
                | (Visited, Idle)
        )
    }
}

/// En-route actions must fit inside this share of the remaining time on the
/// target's clock.
const EN_ROUTE_BUDGET_FACTOR: f64 = 0.95;
/// Estimated overhead charged per 100m of leg for en-route primary actions.
const PRIMARY_OVERHEAD_SECS_PER_100M: f64 = 10.0;
/// Estimated overhead charged per 100m of leg for en-route secondary actions.
const SECONDARY_OVERHEAD_SECS_PER_100M: f64 = 5.0;

pub struct PursuitOrchestrator {
    registry: Arc<RwLock<TargetRegistry>>,
    navigator: Arc<dyn Navigator>,
    actions: Arc<dyn ActionRunner>,
    resources: Arc<dyn ResourceGauge>,
    events: Arc<dyn EventSink>,
    position: Arc<RwLock<GeoPoint>>,
    force_signal: Arc<AtomicBool>,
    config: PursuitConfig,
    invocations: u32,
    state: PursuitState,
}

impl PursuitOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<RwLock<TargetRegistry>>,
        navigator: Arc<dyn Navigator>,
        actions: Arc<dyn ActionRunner>,
        resources: Arc<dyn ResourceGauge>,
        events: Arc<dyn EventSink>,
        position: Arc<RwLock<GeoPoint>>,
        force_signal: Arc<AtomicBool>,
        config: PursuitConfig,
    ) -> Self {
        Self {
            registry,
            navigator,
            actions,
            resources,
            events,
            position,
            force_signal,
            config,
            invocations: 0,
            state: PursuitState::Idle,
        }
    }

    pub fn state(&self) -> PursuitState {
        self.state
    }

    fn advance(&mut self, next: PursuitState) -> Result<()> {
        if !self.state.allows(next) {
            return Err(QuarryError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %self.state, to = %next, "pursuit state transition");
        self.state = next;
        Ok(())
    }

    fn publish(&self, event: PursuitEvent) {
        self.events.publish(EventEnvelope::new(event));
    }

    /// One orchestrator invocation. Returns the number of targets visited.
    pub async fn run_cycle(
        &mut self,
        aggregator: &mut Aggregator,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<u32> {
        self.invocations = self.invocations.wrapping_add(1);
        let forced = self.force_signal.swap(false, Ordering::SeqCst);

        // Engage only every N-th invocation so pursuit does not crowd out
        // normal behavior; a pending force signal bypasses the stride.
        if !forced && self.invocations % self.config.engage_stride != 0 {
            debug!(invocation = self.invocations, "pursuit invocation throttled");
            return Ok(0);
        }
        if !forced && !self.config.enabled {
            return Ok(0);
        }
        if !forced && self.config.continue_until_exhausted {
            let available = self.resources.count(&self.config.resource_kind).await;
            if available < self.config.min_resources {
                info!(
                    available,
                    required = self.config.min_resources,
                    "resource gate blocked pursuit"
                );
                self.publish(PursuitEvent::ResourceShortage {
                    kind: self.config.resource_kind.clone(),
                    available,
                    required: self.config.min_resources,
                });
                return Ok(0);
            }
        }

        let origin = *self.position.read().await;
        let mut visited = 0u32;

        loop {
            if *shutdown.borrow() {
                self.state = PursuitState::Idle;
                return Err(QuarryError::Cancelled);
            }

            self.advance(PursuitState::Selecting)?;

            let now = Utc::now();
            let position = *self.position.read().await;
            if visited == 0 {
                // Demand-triggered refresh on the first leg; later legs reuse
                // the set this scan filled.
                aggregator.refresh(position, false, now).await;
            }

            let picked = {
                let mut registry = self.registry.write().await;
                selector::select_next(&mut registry, position, self.config.base_speed_kmh, now)
            };

            let Some(id) = picked else {
                self.advance(PursuitState::Idle)?;
                break;
            };

            if !self.pursue(id, shutdown).await? {
                self.advance(PursuitState::Idle)?;
                break;
            }
            visited += 1;

            if !self.config.continue_until_exhausted {
                self.advance(PursuitState::Idle)?;
                break;
            }
        }

        if visited > 0 && !self.config.remain_at_destination {
            self.return_to(origin, shutdown).await;
        }

        Ok(visited)
    }

    /// Travel to one target and run the action sequence. Returns `false`
    /// when the pursuit did not complete (entry vanished or relocate
    /// failed). The target, if still tracked, stays live for a later cycle.
    async fn pursue(&mut self, id: TargetId, shutdown: &watch::Receiver<bool>) -> Result<bool> {
        let (destination, policy, expires_at, snapshot) = {
            let registry = self.registry.read().await;
            match registry.get(&id) {
                Some(target) => (
                    target.position,
                    target.policy.clone(),
                    target.expires_at(),
                    TargetSnapshot::of(target),
                ),
                None => return Ok(false),
            }
        };

        let position = *self.position.read().await;
        let now = Utc::now();
        let estimate = feasibility::evaluate(
            destination,
            position,
            &policy,
            self.config.base_speed_kmh,
        );

        // En-route actions must fit inside 95% of the time left on the
        // target's clock, charging their estimated per-distance overhead.
        let budget =
            (expires_at - now).num_milliseconds().max(0) as f64 / 1000.0 * EN_ROUTE_BUDGET_FACTOR;
        let primary_overhead = estimate.distance_m / 100.0 * PRIMARY_OVERHEAD_SECS_PER_100M;
        let secondary_overhead = estimate.distance_m / 100.0 * SECONDARY_OVERHEAD_SECS_PER_100M;
        let primary_en_route =
            policy.primary_en_route && estimate.travel_secs + primary_overhead < budget;
        let secondary_en_route = policy.secondary_action
            && estimate.travel_secs + primary_overhead + secondary_overhead < budget;

        self.publish(PursuitEvent::StartRelocation {
            target: snapshot.clone(),
            eta_secs: estimate.travel_secs,
            speed_kmh: policy.speed_kmh(self.config.base_speed_kmh),
            primary_en_route,
            secondary_en_route,
        });
        self.advance(PursuitState::Traveling)?;

        if *shutdown.borrow() {
            self.state = PursuitState::Idle;
            return Err(QuarryError::Cancelled);
        }

        let engage_threshold_m = self.config.engage_threshold_m;
        let on_step: StepCallback<'_> = {
            let actions = Arc::clone(&self.actions);
            Box::new(move |step_position: GeoPoint| {
                let actions = Arc::clone(&actions);
                async move {
                    let remaining_m = step_position.distance_m(&destination);
                    if primary_en_route && remaining_m > engage_threshold_m {
                        if let Err(e) = actions.perform_primary(None).await {
                            warn!(error = %e, "en-route primary action failed");
                        }
                    }
                    if secondary_en_route {
                        if let Err(e) = actions.perform_secondary(step_position).await {
                            warn!(error = %e, "en-route secondary action failed");
                        }
                    }
                    true
                }
                .boxed()
            })
        };

        let speed_override = policy.allow_speed_boost.then_some(policy.boost_speed_kmh);
        if let Err(e) = self
            .navigator
            .move_to(destination, speed_override, on_step, shutdown)
            .await
        {
            // No relocate retry here: retry policy belongs to the navigator.
            warn!(target = %id, error = %e, "relocation failed");
            return Ok(false);
        }

        self.advance(PursuitState::ArrivedPrimaryAction)?;
        self.publish(PursuitEvent::DestinationReached {
            target: snapshot,
            dwell_secs: policy.dwell_secs,
        });
        // Unconditional attempt at the destination covers misses en route.
        if let Err(e) = self.actions.perform_primary(Some(id)).await {
            warn!(target = %id, error = %e, "primary action failed on arrival");
        }

        self.advance(PursuitState::DwellSecondaryAction)?;
        tokio::time::sleep(std::time::Duration::from_secs(policy.dwell_secs)).await;

        let still_live = {
            let registry = self.registry.read().await;
            registry.get(&id).map(|t| t.is_live()).unwrap_or(false)
        };
        if still_live {
            // Re-attempt only when no earlier attempt already resolved the
            // target through reconciliation.
            if let Err(e) = self.actions.perform_primary(Some(id)).await {
                warn!(target = %id, error = %e, "primary action failed after dwell");
            }
        }

        self.advance(PursuitState::Visited)?;
        let targets = {
            let mut registry = self.registry.write().await;
            registry.mark_visited(&id);
            registry.reorder();
            live_snapshots(&registry, Utc::now())
        };
        self.publish(PursuitEvent::QueueUpdated { targets });
        info!(target = %id, "target visited");
        Ok(true)
    }

    async fn return_to(&self, origin: GeoPoint, shutdown: &watch::Receiver<bool>) {
        debug!(%origin, "returning to cycle origin");
        let on_step: StepCallback<'_> = Box::new(|_| async { true }.boxed());
        if let Err(e) = self
            .navigator
            .move_to(origin, None, on_step, shutdown)
            .await
        {
            warn!(error = %e, "return relocation failed");
        }
    }
}

//! Engine assembly: single-owner registry, refresh/pursuit loop and the
//! clone-friendly command handle given to the host.

pub mod aggregator;
pub mod command;
pub mod feasibility;
pub mod orchestrator;
pub mod registry;
pub mod selector;

pub use aggregator::Aggregator;
pub use command::CommandHandler;
pub use orchestrator::{PursuitOrchestrator, PursuitState};
pub use registry::{MergeOutcome, TargetRegistry};

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{error, info};

use crate::actions::{ActionRunner, ResourceGauge};
use crate::config::AppConfig;
use crate::domain::{GeoPoint, SpeciesId, TargetId};
use crate::error::{QuarryError, Result};
use crate::events::{EventSink, TargetSnapshot};
use crate::nav::Navigator;
use crate::sources::SightingSource;

/// Snapshot the filtered live view of a registry.
pub(crate) fn live_snapshots(registry: &TargetRegistry, now: DateTime<Utc>) -> Vec<TargetSnapshot> {
    registry
        .live_view(now)
        .into_iter()
        .map(TargetSnapshot::of)
        .collect()
}

/// The engine owns the registry and runs the refresh + pursuit loop; hosts
/// interact through [`EngineHandle`].
pub struct PursuitEngine {
    aggregator: Aggregator,
    orchestrator: PursuitOrchestrator,
    commands: CommandHandler,
    registry: Arc<RwLock<TargetRegistry>>,
    position: Arc<RwLock<GeoPoint>>,
    scan_interval: Duration,
    pursuit_interval: Duration,
    refresh_tx: mpsc::Sender<()>,
    refresh_rx: mpsc::Receiver<()>,
}

/// Clonable handle for out-of-band commands and reads.
#[derive(Clone)]
pub struct EngineHandle {
    commands: CommandHandler,
    registry: Arc<RwLock<TargetRegistry>>,
    position: Arc<RwLock<GeoPoint>>,
    refresh_tx: mpsc::Sender<()>,
}

impl EngineHandle {
    /// Set the entry's priority to the forced override.
    pub async fn prioritize(&self, id: &TargetId) -> bool {
        self.commands.prioritize(id).await
    }

    /// Prioritize and make the next pursuit invocation bypass its throttle.
    pub async fn force_next(&self, id: &TargetId) -> bool {
        self.commands.force_next(id).await
    }

    /// Soft-delete the entry from the queue.
    pub async fn remove(&self, id: &TargetId) -> bool {
        self.commands.remove(id).await
    }

    /// Reconcile a catch performed outside the pursuit pipeline.
    pub async fn reconcile_external_catch(&self, species: SpeciesId, position: GeoPoint) -> bool {
        self.commands
            .reconcile_external_catch(species, position)
            .await
    }

    /// Ask the engine for a forced refresh; fire-and-forget.
    pub fn request_refresh(&self) {
        let _ = self.refresh_tx.try_send(());
    }

    /// Filtered live view of the queue.
    pub async fn queue_snapshot(&self) -> Vec<TargetSnapshot> {
        let registry = self.registry.read().await;
        live_snapshots(&registry, Utc::now())
    }

    pub async fn current_position(&self) -> GeoPoint {
        *self.position.read().await
    }
}

impl PursuitEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &AppConfig,
        position: Arc<RwLock<GeoPoint>>,
        sources: Vec<Arc<dyn SightingSource>>,
        navigator: Arc<dyn Navigator>,
        actions: Arc<dyn ActionRunner>,
        resources: Arc<dyn ResourceGauge>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let policies = config.policy_table()?;
        let watchlist: HashSet<SpeciesId> =
            config.watchlist.iter().copied().map(SpeciesId).collect();
        let registry = Arc::new(RwLock::new(TargetRegistry::new(
            chrono::Duration::seconds(config.pursuit.validity_window_secs as i64),
            config.pursuit.proximity_tolerance_m,
            config.pursuit.max_tracked,
        )));
        let force_signal = Arc::new(AtomicBool::new(false));
        let (refresh_tx, refresh_rx) = mpsc::channel(8);

        let aggregator = Aggregator::new(
            sources,
            Arc::clone(&registry),
            Arc::clone(&events),
            watchlist.clone(),
            policies.clone(),
            &config.pursuit,
        );
        let orchestrator = PursuitOrchestrator::new(
            Arc::clone(&registry),
            navigator,
            actions,
            resources,
            Arc::clone(&events),
            Arc::clone(&position),
            Arc::clone(&force_signal),
            config.pursuit.clone(),
        );
        let commands = CommandHandler::new(
            Arc::clone(&registry),
            events,
            force_signal,
            policies,
            watchlist,
            config.pursuit.reconcile_tolerance_m,
        );

        Ok(Self {
            aggregator,
            orchestrator,
            commands,
            registry,
            position,
            scan_interval: Duration::from_secs(config.pursuit.scan_interval_secs),
            pursuit_interval: Duration::from_secs(config.pursuit.pursuit_interval_secs),
            refresh_tx,
            refresh_rx,
        })
    }

    /// Run one forced refresh cycle immediately. Used by one-shot scans.
    pub async fn refresh_now(&mut self) -> usize {
        let position = *self.position.read().await;
        self.aggregator.refresh(position, true, Utc::now()).await
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            commands: self.commands.clone(),
            registry: Arc::clone(&self.registry),
            position: Arc::clone(&self.position),
            refresh_tx: self.refresh_tx.clone(),
        }
    }

    /// Main engine loop; runs until the shutdown flag flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("pursuit engine starting main loop");

        let mut scan_tick = tokio::time::interval(self.scan_interval);
        let mut pursuit_tick = tokio::time::interval(self.pursuit_interval);

        // Don't burst-fire missed ticks
        scan_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        pursuit_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // --- Demand refresh requests (always forced) ---
                Some(()) = self.refresh_rx.recv() => {
                    let position = *self.position.read().await;
                    self.aggregator.refresh(position, true, Utc::now()).await;
                }

                // --- Periodic scan ---
                _ = scan_tick.tick() => {
                    let position = *self.position.read().await;
                    self.aggregator.refresh(position, false, Utc::now()).await;
                }

                // --- Periodic pursuit invocation ---
                _ = pursuit_tick.tick() => {
                    match self.orchestrator.run_cycle(&mut self.aggregator, &shutdown).await {
                        Ok(0) => {}
                        Ok(visited) => info!(visited, "pursuit cycle complete"),
                        Err(QuarryError::Cancelled) => {
                            info!("pursuit cancelled");
                            break;
                        }
                        Err(e) => error!(error = %e, "pursuit cycle failed"),
                    }
                }

                // --- Shutdown signal ---
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("engine: shutdown signal received");
                        break;
                    }
                }
            }
        }

        info!("engine: main loop exited");
        Ok(())
    }
}

//! Phase-transition events published to the display/stats collaborator.
//!
//! Events are flat records wrapped in an envelope and delivered fire-and-
//! forget: the engine never waits for an acknowledgement, and a sink that
//! drops events only degrades the display, never the pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{SpeciesId, Target};

/// Flat per-target record carried by queue and scan events.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSnapshot {
    pub id: String,
    pub species: SpeciesId,
    pub latitude: f64,
    pub longitude: f64,
    pub priority: u8,
    pub distance_m: f64,
    pub eta_secs: f64,
    pub expires_at: DateTime<Utc>,
    pub state: String,
}

impl TargetSnapshot {
    pub fn of(target: &Target) -> Self {
        Self {
            id: target.id().to_string(),
            species: target.species,
            latitude: target.position.latitude,
            longitude: target.position.longitude,
            priority: target.policy.priority,
            distance_m: target.distance_m,
            eta_secs: target.travel_secs,
            expires_at: target.expires_at(),
            state: target.state().to_string(),
        }
    }
}

/// Engine phase events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PursuitEvent {
    /// A refresh cycle merged at least one new target; carries the live view.
    ScanCompleted { targets: Vec<TargetSnapshot> },
    /// The queue was re-ranked or an entry changed state outside a scan.
    QueueUpdated { targets: Vec<TargetSnapshot> },
    /// A travel leg toward a target is starting.
    StartRelocation {
        target: TargetSnapshot,
        eta_secs: f64,
        speed_kmh: f64,
        primary_en_route: bool,
        secondary_en_route: bool,
    },
    /// The travel leg arrived at the target position.
    DestinationReached {
        target: TargetSnapshot,
        dwell_secs: u64,
    },
    /// An operator forced a target to the front of the queue.
    Targeted { target: TargetSnapshot },
    /// The resource gate blocked pursuit entry.
    ResourceShortage {
        kind: String,
        available: u32,
        required: u32,
    },
    /// An out-of-band catch was reconciled against the queue.
    ExternalCatchReconciled {
        species: SpeciesId,
        latitude: f64,
        longitude: f64,
        matched: bool,
    },
}

impl PursuitEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScanCompleted { .. } => "scan_completed",
            Self::QueueUpdated { .. } => "queue_updated",
            Self::StartRelocation { .. } => "start_relocation",
            Self::DestinationReached { .. } => "destination_reached",
            Self::Targeted { .. } => "targeted",
            Self::ResourceShortage { .. } => "resource_shortage",
            Self::ExternalCatchReconciled { .. } => "external_catch_reconciled",
        }
    }
}

/// Envelope stamped onto every published event.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: PursuitEvent,
}

impl EventEnvelope {
    pub fn new(event: PursuitEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            event,
        }
    }
}

/// Event-dispatch collaborator. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: EventEnvelope);
}

/// Sink that writes events to the tracing log.
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, envelope: EventEnvelope) {
        info!(
            event = envelope.event.name(),
            event_id = %envelope.id,
            "pursuit event"
        );
    }
}

/// Sink that forwards envelopes over an unbounded channel to the host.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, envelope: EventEnvelope) {
        // Receiver gone means the host stopped listening; nothing to do.
        let _ = self.tx.send(envelope);
    }
}

#[cfg(test)]
pub mod testing {
    //! Event sink double shared by the engine unit tests.

    use super::{EventEnvelope, EventSink};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<EventEnvelope>>,
    }

    impl RecordingSink {
        /// Event names in publish order.
        pub fn names(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|envelope| envelope.event.name().to_string())
                .collect()
        }

        pub fn take(&self) -> Vec<EventEnvelope> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl EventSink for RecordingSink {
        fn publish(&self, envelope: EventEnvelope) {
            self.events.lock().unwrap().push(envelope);
        }
    }
}

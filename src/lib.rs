pub mod actions;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod nav;
pub mod sources;

pub use actions::{ActionRunner, FixedResources, NoopActions, ResourceGauge};
pub use config::AppConfig;
pub use domain::{
    GeoPoint, PolicyTable, PursuitPolicy, Sighting, SpeciesId, Target, TargetId, TargetState,
};
pub use engine::{EngineHandle, PursuitEngine, PursuitState};
pub use error::{QuarryError, Result};
pub use events::{ChannelSink, EventEnvelope, EventSink, LogSink, PursuitEvent, TargetSnapshot};
pub use nav::{Navigator, SimulatedNavigator, StepCallback};
pub use sources::SightingSource;

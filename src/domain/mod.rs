//! Domain model: geographic primitives, pursuit policies and targets.

pub mod geo;
pub mod policy;
pub mod target;

pub use geo::GeoPoint;
pub use policy::{PolicyTable, PursuitPolicy, FORCED_PRIORITY};
pub use target::{Sighting, SpeciesId, SuppressReason, Target, TargetId, TargetState};

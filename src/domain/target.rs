//! Targets: perishable, located sightings eligible for pursuit.
//!
//! Identity is (species, coordinates rounded to 1e-4 degrees), which is
//! stable across refetches of the same physical sighting. The expiry is
//! derived once from the source-reported creation time plus the validity
//! window and never recomputed; distance and travel estimates are the only
//! mutable feasibility fields.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QuarryError;

use super::geo::GeoPoint;
use super::policy::PursuitPolicy;

/// Numeric species identifier, shared by all sighting feeds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SpeciesId(pub u16);

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scale used to round coordinates into the identity key (1e-4 deg ~ 11m).
const KEY_SCALE: f64 = 1e4;

/// Stable identity of a target: species plus rounded coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId {
    species: SpeciesId,
    lat_e4: i32,
    lon_e4: i32,
}

impl TargetId {
    pub fn new(species: SpeciesId, position: GeoPoint) -> Self {
        Self {
            species,
            lat_e4: (position.latitude * KEY_SCALE).round() as i32,
            lon_e4: (position.longitude * KEY_SCALE).round() as i32,
        }
    }

    pub fn species(&self) -> SpeciesId {
        self.species
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.species, self.lat_e4, self.lon_e4)
    }
}

impl FromStr for TargetId {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        fn parse<'a>(part: Option<&'a str>, s: &str) -> Result<&'a str, QuarryError> {
            part.ok_or_else(|| QuarryError::InvalidTargetId(s.to_string()))
        }
        let species: u16 = parse(parts.next(), s)?
            .parse()
            .map_err(|_| QuarryError::InvalidTargetId(s.to_string()))?;
        let lat_e4: i32 = parse(parts.next(), s)?
            .parse()
            .map_err(|_| QuarryError::InvalidTargetId(s.to_string()))?;
        let lon_e4: i32 = parse(parts.next(), s)?
            .parse()
            .map_err(|_| QuarryError::InvalidTargetId(s.to_string()))?;
        if parts.next().is_some() {
            return Err(QuarryError::InvalidTargetId(s.to_string()));
        }
        Ok(Self {
            species: SpeciesId(species),
            lat_e4,
            lon_e4,
        })
    }
}

/// Why a target is suppressed rather than live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// Resolved by an action outside the pursuit pipeline; the placeholder
    /// blocks the same physical sighting from resurfacing on refresh.
    ExternallyHandled,
}

/// Lifecycle state of a tracked target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Live,
    Visited,
    Suppressed(SuppressReason),
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Visited => write!(f, "visited"),
            Self::Suppressed(_) => write!(f, "suppressed"),
        }
    }
}

/// Canonical sighting as produced by a source adapter, before policy
/// attachment.
#[derive(Debug, Clone, Copy)]
pub struct Sighting {
    pub species: SpeciesId,
    pub position: GeoPoint,
    /// Source-reported creation time, already converted to UTC by the adapter.
    pub reported_at: DateTime<Utc>,
}

/// A tracked sighting with its owned policy clone and feasibility state.
#[derive(Debug, Clone)]
pub struct Target {
    id: TargetId,
    pub species: SpeciesId,
    pub position: GeoPoint,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    /// Distance from the current position, meters. Stale until the next
    /// feasibility pass.
    pub distance_m: f64,
    /// Estimated travel time, seconds. Stale until the next feasibility pass.
    pub travel_secs: f64,
    state: TargetState,
    pub policy: PursuitPolicy,
}

impl Target {
    /// Build a live target from a canonical sighting. The expiry is fixed
    /// here and never recomputed.
    pub fn from_sighting(sighting: &Sighting, validity: Duration, policy: PursuitPolicy) -> Self {
        Self {
            id: TargetId::new(sighting.species, sighting.position),
            species: sighting.species,
            position: sighting.position,
            created_at: sighting.reported_at,
            expires_at: sighting.reported_at + validity,
            distance_m: 0.0,
            travel_secs: 0.0,
            state: TargetState::Live,
            policy,
        }
    }

    /// Build a suppressed placeholder for a sighting handled outside the
    /// pipeline, so a later refresh cannot resurrect it.
    pub fn suppressed_marker(
        species: SpeciesId,
        position: GeoPoint,
        now: DateTime<Utc>,
        validity: Duration,
        policy: PursuitPolicy,
    ) -> Self {
        Self {
            id: TargetId::new(species, position),
            species,
            position,
            created_at: now,
            expires_at: now + validity,
            distance_m: 0.0,
            travel_secs: 0.0,
            state: TargetState::Suppressed(SuppressReason::ExternallyHandled),
            policy,
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == TargetState::Live
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn mark_visited(&mut self) {
        self.state = TargetState::Visited;
    }

    pub fn suppress(&mut self, reason: SuppressReason) {
        self.state = TargetState::Suppressed(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(species: u16, lat: f64, lon: f64) -> Sighting {
        Sighting {
            species: SpeciesId(species),
            position: GeoPoint::new(lat, lon),
            reported_at: Utc::now(),
        }
    }

    #[test]
    fn identity_key_is_stable_under_rounding_jitter() {
        let a = TargetId::new(SpeciesId(12), GeoPoint::new(40.712801, -74.006002));
        let b = TargetId::new(SpeciesId(12), GeoPoint::new(40.712803, -74.005998));
        assert_eq!(a, b);
    }

    #[test]
    fn identity_key_separates_species() {
        let p = GeoPoint::new(40.7128, -74.0060);
        assert_ne!(
            TargetId::new(SpeciesId(1), p),
            TargetId::new(SpeciesId(2), p)
        );
    }

    #[test]
    fn target_id_display_round_trips() {
        let id = TargetId::new(SpeciesId(42), GeoPoint::new(-33.8688, 151.2093));
        let parsed: TargetId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn target_id_rejects_garbage() {
        assert!("".parse::<TargetId>().is_err());
        assert!("12".parse::<TargetId>().is_err());
        assert!("a:b:c".parse::<TargetId>().is_err());
        assert!("1:2:3:4".parse::<TargetId>().is_err());
    }

    #[test]
    fn expiry_fixed_at_creation() {
        let s = sighting(5, 10.0, 10.0);
        let target = Target::from_sighting(&s, Duration::minutes(15), PursuitPolicy::default());
        assert_eq!(target.expires_at(), s.reported_at + Duration::minutes(15));
        assert!(!target.is_expired(s.reported_at + Duration::minutes(14)));
        assert!(target.is_expired(s.reported_at + Duration::minutes(15)));
    }

    #[test]
    fn state_transitions_are_tagged() {
        let s = sighting(5, 10.0, 10.0);
        let mut target = Target::from_sighting(&s, Duration::minutes(15), PursuitPolicy::default());
        assert!(target.is_live());

        target.mark_visited();
        assert_eq!(target.state(), TargetState::Visited);

        target.suppress(SuppressReason::ExternallyHandled);
        assert!(!target.is_live());
        assert_eq!(target.state().to_string(), "suppressed");
    }
}

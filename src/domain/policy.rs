//! Pursuit policies: per-species rule sets governing priority, caps and
//! travel behavior.
//!
//! A policy is cloned onto a target when the target is first merged. Later
//! edits to the default/override table never retroactively change an
//! in-flight target.

use serde::Deserialize;
use std::collections::HashMap;

use super::target::SpeciesId;

/// Priority value that forces a target past feasibility checks and throttles.
pub const FORCED_PRIORITY: u8 = 0;

/// Rule set attached to a target at merge time.
///
/// `priority` 0 is a forced override; lower values are more urgent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PursuitPolicy {
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Maximum distance (meters) a candidate may be from the current position
    #[serde(default = "default_max_distance")]
    pub max_distance_m: f64,
    /// Maximum estimated travel time (seconds) for a candidate
    #[serde(default = "default_max_travel")]
    pub max_travel_secs: f64,
    /// Allow travelling faster than the base speed toward this species
    #[serde(default)]
    pub allow_speed_boost: bool,
    /// Speed (km/h) used when the boost is allowed
    #[serde(default = "default_boost_speed")]
    pub boost_speed_kmh: f64,
    /// Fire the primary action opportunistically while travelling
    #[serde(default = "default_true")]
    pub primary_en_route: bool,
    /// Fire the secondary action through the travel callback
    #[serde(default = "default_true")]
    pub secondary_action: bool,
    /// Time (seconds) to linger at the destination before moving on
    #[serde(default = "default_dwell")]
    pub dwell_secs: u64,
}

fn default_priority() -> u8 {
    3
}

fn default_max_distance() -> f64 {
    2_000.0
}

fn default_max_travel() -> f64 {
    900.0
}

fn default_boost_speed() -> f64 {
    25.0
}

fn default_dwell() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for PursuitPolicy {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            max_distance_m: default_max_distance(),
            max_travel_secs: default_max_travel(),
            allow_speed_boost: false,
            boost_speed_kmh: default_boost_speed(),
            primary_en_route: true,
            secondary_action: true,
            dwell_secs: default_dwell(),
        }
    }
}

impl PursuitPolicy {
    /// Effective travel speed under this policy, km/h.
    pub fn speed_kmh(&self, base_speed_kmh: f64) -> f64 {
        if self.allow_speed_boost && self.boost_speed_kmh > 0.0 {
            self.boost_speed_kmh
        } else {
            base_speed_kmh
        }
    }

    pub fn is_forced(&self) -> bool {
        self.priority == FORCED_PRIORITY
    }
}

/// Default policy plus per-species overrides.
///
/// Lookups clone: the returned policy is owned by the caller and detached
/// from this table.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    default: PursuitPolicy,
    overrides: HashMap<SpeciesId, PursuitPolicy>,
}

impl PolicyTable {
    pub fn new(default: PursuitPolicy, overrides: HashMap<SpeciesId, PursuitPolicy>) -> Self {
        Self { default, overrides }
    }

    /// Policy for a species: the override if one exists, else the default.
    pub fn policy_for(&self, species: SpeciesId) -> PursuitPolicy {
        self.overrides
            .get(&species)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

//! Pure distance/ETA evaluation for a target under a movement budget.
//!
//! Results are only valid for the position and policy they were computed
//! from; callers re-invoke on every position or policy change.

use crate::domain::{GeoPoint, PursuitPolicy, Target};

/// Fixed slack added to every travel estimate, seconds.
pub const SAFETY_MARGIN_SECS: f64 = 15.0;

#[derive(Debug, Clone, Copy)]
pub struct Feasibility {
    pub distance_m: f64,
    pub travel_secs: f64,
}

/// Distance and estimated travel time from `from` to `destination` under
/// `policy`.
pub fn evaluate(
    destination: GeoPoint,
    from: GeoPoint,
    policy: &PursuitPolicy,
    base_speed_kmh: f64,
) -> Feasibility {
    let distance_m = from.distance_m(&destination);
    let speed_ms = (policy.speed_kmh(base_speed_kmh) / 3.6).max(f64::EPSILON);
    let travel_secs = distance_m / speed_ms + policy.dwell_secs as f64 + SAFETY_MARGIN_SECS;
    Feasibility {
        distance_m,
        travel_secs,
    }
}

/// Recompute and store a target's mutable feasibility fields.
pub fn apply(target: &mut Target, from: GeoPoint, base_speed_kmh: f64) {
    let feasibility = evaluate(target.position, from, &target.policy, base_speed_kmh);
    target.distance_m = feasibility.distance_m;
    target.travel_secs = feasibility.travel_secs;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Sighting, SpeciesId};
    use chrono::{Duration, Utc};

    fn policy(dwell_secs: u64) -> PursuitPolicy {
        PursuitPolicy {
            dwell_secs,
            ..PursuitPolicy::default()
        }
    }

    #[test]
    fn zero_distance_still_charges_dwell_and_margin() {
        let p = GeoPoint::new(10.0, 10.0);
        let feasibility = evaluate(p, p, &policy(60), 7.2);
        assert!(feasibility.distance_m < 1e-9);
        assert!((feasibility.travel_secs - 75.0).abs() < 1e-6);
    }

    #[test]
    fn travel_time_scales_with_distance_and_speed() {
        let from = GeoPoint::new(0.0, 0.0);
        let to = GeoPoint::new(0.01, 0.0); // ~1112m

        // 7.2 km/h = 2 m/s
        let slow = evaluate(to, from, &policy(0), 7.2);
        assert!((slow.travel_secs - (slow.distance_m / 2.0 + 15.0)).abs() < 1e-6);

        let boosted_policy = PursuitPolicy {
            allow_speed_boost: true,
            boost_speed_kmh: 36.0, // 10 m/s
            dwell_secs: 0,
            ..PursuitPolicy::default()
        };
        let fast = evaluate(to, from, &boosted_policy, 7.2);
        assert!(fast.travel_secs < slow.travel_secs);
        assert!((fast.travel_secs - (fast.distance_m / 10.0 + 15.0)).abs() < 1e-6);
    }

    #[test]
    fn recomputation_never_touches_expiry() {
        let sighting = Sighting {
            species: SpeciesId(4),
            position: GeoPoint::new(0.01, 0.0),
            reported_at: Utc::now(),
        };
        let mut target =
            Target::from_sighting(&sighting, Duration::minutes(15), PursuitPolicy::default());
        let expires_at = target.expires_at();

        apply(&mut target, GeoPoint::new(0.0, 0.0), 7.2);
        let first_distance = target.distance_m;
        apply(&mut target, GeoPoint::new(0.02, 0.0), 7.2);

        assert_ne!(target.distance_m, first_distance);
        assert_eq!(target.expires_at(), expires_at);
    }
}

//! Navigation capability: relocate-with-callback, consumed as an opaque
//! collaborator.
//!
//! The navigator is the movement authority: it owns updating the shared
//! position tracker while a leg is in flight. The engine only reads the
//! tracker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::domain::GeoPoint;
use crate::error::{QuarryError, Result};

/// Per-step callback invoked with the current position. Returning `false`
/// asks the navigator to stop the leg early.
pub type StepCallback<'a> = Box<dyn FnMut(GeoPoint) -> BoxFuture<'static, bool> + Send + 'a>;

/// Relocate-with-callback capability.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Travel to `destination`, invoking `on_step` periodically along the
    /// way. `speed_kmh` overrides the navigator's own default speed when set.
    /// Returns the final position.
    async fn move_to(
        &self,
        destination: GeoPoint,
        speed_kmh: Option<f64>,
        on_step: StepCallback<'_>,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<GeoPoint>;
}

/// Simulated navigator: linear interpolation toward the destination at the
/// commanded speed, with a little per-step jitter so traces look organic.
pub struct SimulatedNavigator {
    position: Arc<RwLock<GeoPoint>>,
    base_speed_kmh: f64,
    step_interval: Duration,
    jitter_m: f64,
}

impl SimulatedNavigator {
    pub fn new(position: Arc<RwLock<GeoPoint>>, base_speed_kmh: f64) -> Self {
        Self {
            position,
            base_speed_kmh,
            step_interval: Duration::from_secs(1),
            jitter_m: 2.0,
        }
    }

    pub fn with_step_interval(mut self, step_interval: Duration) -> Self {
        self.step_interval = step_interval;
        self
    }

    pub fn with_jitter(mut self, jitter_m: f64) -> Self {
        self.jitter_m = jitter_m;
        self
    }

    fn jitter(&self) -> f64 {
        if self.jitter_m > 0.0 {
            use rand::Rng;
            rand::thread_rng().gen_range(-self.jitter_m..=self.jitter_m)
        } else {
            0.0
        }
    }
}

/// Considered arrived within this range of the destination.
const ARRIVAL_TOLERANCE_M: f64 = 1.0;

#[async_trait]
impl Navigator for SimulatedNavigator {
    async fn move_to(
        &self,
        destination: GeoPoint,
        speed_kmh: Option<f64>,
        mut on_step: StepCallback<'_>,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<GeoPoint> {
        let speed_kmh = speed_kmh.unwrap_or(self.base_speed_kmh);
        if speed_kmh <= 0.0 {
            return Err(QuarryError::Navigation(format!(
                "speed must be positive, got {speed_kmh}"
            )));
        }
        let speed_ms = speed_kmh / 3.6;
        let step_m = speed_ms * self.step_interval.as_secs_f64();

        debug!(%destination, speed_kmh, "simulated travel starting");
        loop {
            if *shutdown.borrow() {
                return Err(QuarryError::Cancelled);
            }

            let current = *self.position.read().await;
            if current.distance_m(&destination) <= ARRIVAL_TOLERANCE_M {
                break;
            }

            let jittered_step = (step_m + self.jitter()).max(0.1);
            let next = current.step_toward(&destination, jittered_step);
            tokio::time::sleep(self.step_interval).await;
            *self.position.write().await = next;

            if !on_step(next).await {
                debug!("travel leg stopped early by step callback");
                return Ok(next);
            }
        }

        *self.position.write().await = destination;
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use futures::FutureExt;
    use tokio_test::assert_ok;

    fn noop_step() -> StepCallback<'static> {
        Box::new(|_| async { true }.boxed())
    }

    #[tokio::test(start_paused = true)]
    async fn travels_to_destination_and_updates_tracker() {
        let start = GeoPoint::new(0.0, 0.0);
        let destination = GeoPoint::new(0.001, 0.0); // ~111m
        let tracker = Arc::new(RwLock::new(start));
        let navigator =
            SimulatedNavigator::new(Arc::clone(&tracker), 36.0).with_jitter(0.0); // 10 m/s

        let (_tx, rx) = watch::channel(false);
        let steps = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&steps);
        let on_step: StepCallback<'_> = Box::new(move |_| {
            let counted = Arc::clone(&counted);
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                true
            }
            .boxed()
        });

        let arrived = assert_ok!(navigator.move_to(destination, None, on_step, &rx).await);

        assert_eq!(arrived, destination);
        assert_eq!(*tracker.read().await, destination);
        // ~111m at 10m/s and one step per second.
        assert!(steps.load(Ordering::SeqCst) >= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn speed_override_shortens_the_leg() {
        let start = GeoPoint::new(0.0, 0.0);
        let destination = GeoPoint::new(0.001, 0.0);
        let tracker = Arc::new(RwLock::new(start));
        let navigator =
            SimulatedNavigator::new(Arc::clone(&tracker), 3.6).with_jitter(0.0);

        let (_tx, rx) = watch::channel(false);
        let begun = tokio::time::Instant::now();
        assert_ok!(
            navigator
                .move_to(destination, Some(360.0), noop_step(), &rx)
                .await
        );

        // 100 m/s: the ~111m leg takes a couple of virtual seconds, far less
        // than the ~111s the 3.6km/h default would need.
        assert!(begun.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_before_the_next_step() {
        let tracker = Arc::new(RwLock::new(GeoPoint::new(0.0, 0.0)));
        let navigator = SimulatedNavigator::new(Arc::clone(&tracker), 7.2);

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let result = navigator
            .move_to(GeoPoint::new(1.0, 1.0), None, noop_step(), &rx)
            .await;
        assert!(matches!(result, Err(QuarryError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_non_positive_speed() {
        let tracker = Arc::new(RwLock::new(GeoPoint::new(0.0, 0.0)));
        let navigator = SimulatedNavigator::new(tracker, 7.2);
        let (_tx, rx) = watch::channel(false);

        let result = navigator
            .move_to(GeoPoint::new(1.0, 1.0), Some(0.0), noop_step(), &rx)
            .await;
        assert!(matches!(result, Err(QuarryError::Navigation(_))));
    }
}

//! Remote camera history and local camera throttling.
//!
//! ```text
//! local viewport moves ──▸ CameraThrottle (≥ 250 ms AND ≥ 10 units) ──▸ Change
//!                                                                          │
//! remote Change ──▸ Cameras::push(owner) ── bounded stack per user ◂───────┘
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crash_core::{user_key, CPoint, Camera};

use crate::config::CameraThrottleConfig;

/// Most recent cameras per user, newest last.
#[derive(Debug)]
pub struct Cameras {
    capacity: usize,
    stacks: HashMap<String, VecDeque<Camera>>,
}

impl Cameras {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            stacks: HashMap::new(),
        }
    }

    pub fn push(&mut self, user: &str, camera: Camera) {
        let stack = self.stacks.entry(user_key(user)).or_default();
        if stack.len() == self.capacity {
            stack.pop_front();
        }
        stack.push_back(camera);
    }

    pub fn latest(&self, user: &str) -> Option<&Camera> {
        self.stacks.get(&user_key(user))?.back()
    }

    /// Cameras for `user`, oldest first.
    pub fn history(&self, user: &str) -> Vec<Camera> {
        self.stacks
            .get(&user_key(user))
            .map(|stack| stack.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, user: &str) -> usize {
        self.stacks.get(&user_key(user)).map_or(0, VecDeque::len)
    }

    pub fn remove_user(&mut self, user: &str) {
        self.stacks.remove(&user_key(user));
    }
}

/// Rate limiter for outgoing camera changes.
///
/// An event is rejected if it arrives sooner than `min_interval` after the
/// last accepted one, or if neither location nor target moved at least
/// `min_distance`. Accepting an event remembers it as the new baseline.
#[derive(Debug)]
pub struct CameraThrottle {
    min_interval: Duration,
    min_distance: f64,
    last: Option<(Instant, CPoint, CPoint)>,
}

impl CameraThrottle {
    pub fn new(config: &CameraThrottleConfig) -> Self {
        Self {
            min_interval: config.min_interval(),
            min_distance: config.min_distance,
            last: None,
        }
    }

    pub fn accept(&mut self, camera: &Camera) -> bool {
        self.accept_at(camera, Instant::now())
    }

    pub fn accept_at(&mut self, camera: &Camera, now: Instant) -> bool {
        if let Some((at, location, target)) = &self.last {
            if now.saturating_duration_since(*at) < self.min_interval {
                return false;
            }
            let moved = camera.location.distance_to(location) >= self.min_distance
                || camera.target.distance_to(target) >= self.min_distance;
            if !moved {
                return false;
            }
        }
        self.last = Some((now, camera.location, camera.target));
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(x: f64) -> Camera {
        Camera::new(CPoint::new(x, 0.0, 0.0), CPoint::ORIGIN)
    }

    #[test]
    fn test_stack_is_bounded() {
        let mut cameras = Cameras::new(3);
        for i in 0..5 {
            cameras.push("Anna", camera(i as f64));
        }
        assert_eq!(cameras.count("anna"), 3);
        assert_eq!(cameras.history("Anna")[0].location.x, 2.0);
        assert_eq!(cameras.latest("ANNA").unwrap().location.x, 4.0);
        assert_eq!(cameras.count("Jack"), 0);
    }

    #[test]
    fn test_throttle_rejects_fast_repeats() {
        let mut throttle = CameraThrottle::new(&CameraThrottleConfig::default());
        let t0 = Instant::now();

        assert!(throttle.accept_at(&camera(0.0), t0));
        // Same camera, too soon.
        assert!(!throttle.accept_at(&camera(0.0), t0 + Duration::from_millis(100)));
        // Far enough, but still too soon.
        assert!(!throttle.accept_at(&camera(50.0), t0 + Duration::from_millis(249)));
    }

    #[test]
    fn test_throttle_accepts_after_interval_and_distance() {
        let mut throttle = CameraThrottle::new(&CameraThrottleConfig::default());
        let t0 = Instant::now();
        assert!(throttle.accept_at(&camera(0.0), t0));

        // Late enough, but did not move.
        assert!(!throttle.accept_at(&camera(9.0), t0 + Duration::from_millis(300)));
        // Late enough and moved ≥ 10.
        assert!(throttle.accept_at(&camera(10.0), t0 + Duration::from_millis(300)));
        // Baseline moved with the accepted event.
        assert!(!throttle.accept_at(&camera(15.0), t0 + Duration::from_millis(600)));
    }

    #[test]
    fn test_target_movement_counts() {
        let mut throttle = CameraThrottle::new(&CameraThrottleConfig::default());
        let t0 = Instant::now();
        assert!(throttle.accept_at(&camera(0.0), t0));

        let turned = Camera::new(CPoint::ORIGIN, CPoint::new(0.0, 12.0, 0.0));
        assert!(throttle.accept_at(&turned, t0 + Duration::from_secs(1)));
    }
}

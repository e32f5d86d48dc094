//! Session configuration.
//!
//! Every field has a default so a TOML file only needs the values it wants
//! to change:
//!
//! ```toml
//! camera_stack_size = 5
//!
//! [camera_throttle]
//! min_interval_ms = 100
//! min_distance = 2.5
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::CollabError;

/// Camera create-action rate limiting.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraThrottleConfig {
    /// Minimum time between two accepted camera events.
    pub min_interval_ms: u64,
    /// Minimum movement of location or target for an event to be accepted.
    pub min_distance: f64,
}

impl Default for CameraThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 250,
            min_distance: 10.0,
        }
    }
}

impl CameraThrottleConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Per-document session settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub camera_throttle: CameraThrottleConfig,
    /// Cameras remembered per user.
    pub camera_stack_size: usize,
    /// Entries retained by the session log.
    pub log_capacity: usize,
    /// Broadcast buffer per room for in-process relays.
    pub broadcast_capacity: usize,
    /// Changes held while a relay client is offline.
    pub offline_queue_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera_throttle: CameraThrottleConfig::default(),
            camera_stack_size: 3,
            log_capacity: 512,
            broadcast_capacity: 256,
            offline_queue_size: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, CollabError> {
        let config: SessionConfig =
            toml::from_str(raw).map_err(|e| CollabError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CollabError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CollabError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), CollabError> {
        if self.camera_stack_size == 0 {
            return Err(CollabError::Config("camera_stack_size must be at least 1".into()));
        }
        if self.broadcast_capacity == 0 {
            return Err(CollabError::Config("broadcast_capacity must be at least 1".into()));
        }
        if !self.camera_throttle.min_distance.is_finite() || self.camera_throttle.min_distance < 0.0 {
            return Err(CollabError::Config("camera_throttle.min_distance must be >= 0".into()));
        }
        Ok(())
    }
}

//! Camera payload and 3-D point helpers.
//!
//! Wire format is a compact positional array, order-sensitive, exactly
//! seven fields:
//! ```text
//! [targetX, targetY, targetZ, locationX, locationY, locationZ, stampTicks]
//! ```
//! `stampTicks` counts 100 ns intervals since 0001-01-01T00:00:00Z.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks between 0001-01-01 and the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Convert a timestamp into ticks, truncating below 100 ns.
pub fn to_ticks(stamp: DateTime<Utc>) -> i64 {
    let sub_second = i64::from(stamp.timestamp_subsec_nanos()) / 100;
    UNIX_EPOCH_TICKS
        .saturating_add(stamp.timestamp().saturating_mul(TICKS_PER_SECOND))
        .saturating_add(sub_second)
}

/// Convert ticks back into a timestamp.
pub fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    if ticks < 0 {
        return None;
    }
    let relative = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let seconds = relative.div_euclid(TICKS_PER_SECOND);
    let nanos = (relative.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(seconds, nanos)
}

/// A point in document space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl CPoint {
    pub const ORIGIN: CPoint = CPoint { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &CPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A user's viewpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub location: CPoint,
    pub target: CPoint,
    pub stamp: DateTime<Utc>,
}

impl Camera {
    /// Camera stamped now, truncated to tick precision.
    pub fn new(location: CPoint, target: CPoint) -> Self {
        Self::with_stamp(location, target, Utc::now())
    }

    pub fn with_stamp(location: CPoint, target: CPoint, stamp: DateTime<Utc>) -> Self {
        let stamp = from_ticks(to_ticks(stamp)).unwrap_or(stamp);
        Self {
            location,
            target,
            stamp,
        }
    }

    #[inline]
    pub fn ticks(&self) -> i64 {
        to_ticks(self.stamp)
    }

    /// A usable camera has finite coordinates and looks somewhere.
    pub fn is_valid(&self) -> bool {
        self.location.is_finite() && self.target.is_finite() && self.location != self.target
    }

    pub fn encode(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(CoreError::Serialization)
    }

    pub fn decode(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw).map_err(CoreError::Deserialization)
    }
}

impl Serialize for Camera {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (
            self.target.x,
            self.target.y,
            self.target.z,
            self.location.x,
            self.location.y,
            self.location.z,
            self.ticks(),
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Camera {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tx, ty, tz, lx, ly, lz, ticks): (f64, f64, f64, f64, f64, f64, i64) =
            Deserialize::deserialize(deserializer)?;
        let stamp = from_ticks(ticks)
            .ok_or_else(|| D::Error::custom(CoreError::TicksOutOfRange(ticks)))?;
        Ok(Camera {
            location: CPoint::new(lx, ly, lz),
            target: CPoint::new(tx, ty, tz),
            stamp,
        })
    }
}

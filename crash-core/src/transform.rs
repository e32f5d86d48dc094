//! 4×4 affine transform carried by `TRANSFORM` changes.
//!
//! Row-major, 16 numbers on the wire:
//! ```text
//! [m00, m01, m02, m03, m10, ..., m33]
//! ```

use serde::{Deserialize, Serialize};

use crate::camera::CPoint;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CTransform {
    m: [f64; 16],
}

impl Default for CTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl CTransform {
    pub const IDENTITY: CTransform = CTransform {
        m: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    pub fn from_rows(m: [f64; 16]) -> Self {
        Self { m }
    }

    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        let mut t = Self::IDENTITY;
        t.m[3] = dx;
        t.m[7] = dy;
        t.m[11] = dz;
        t
    }

    pub fn scale(factor: f64) -> Self {
        let mut t = Self::IDENTITY;
        t.m[0] = factor;
        t.m[5] = factor;
        t.m[10] = factor;
        t
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.m[row * 4 + col]
    }

    pub fn as_rows(&self) -> &[f64; 16] {
        &self.m
    }

    /// `self * other`: apply `other` first, then `self`.
    pub fn then_after(&self, other: &CTransform) -> CTransform {
        let mut out = [0.0; 16];
        for row in 0..4 {
            for col in 0..4 {
                out[row * 4 + col] = (0..4).map(|k| self.get(row, k) * other.get(k, col)).sum();
            }
        }
        CTransform { m: out }
    }

    pub fn apply_to(&self, p: &CPoint) -> CPoint {
        let w = self.get(3, 0) * p.x + self.get(3, 1) * p.y + self.get(3, 2) * p.z + self.get(3, 3);
        let w = if w == 0.0 { 1.0 } else { w };
        CPoint::new(
            (self.get(0, 0) * p.x + self.get(0, 1) * p.y + self.get(0, 2) * p.z + self.get(0, 3)) / w,
            (self.get(1, 0) * p.x + self.get(1, 1) * p.y + self.get(1, 2) * p.z + self.get(1, 3)) / w,
            (self.get(2, 0) * p.x + self.get(2, 1) * p.y + self.get(2, 2) * p.z + self.get(2, 3)) / w,
        )
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn is_valid(&self) -> bool {
        self.m.iter().all(|v| v.is_finite())
    }

    pub fn encode(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(CoreError::Serialization)
    }

    pub fn decode(raw: &str) -> Result<Self, CoreError> {
        let transform: CTransform =
            serde_json::from_str(raw).map_err(CoreError::Deserialization)?;
        if !transform.is_valid() {
            return Err(CoreError::InvalidTransform(raw.to_string()));
        }
        Ok(transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_moves_point() {
        let t = CTransform::translation(10.0, -5.0, 2.0);
        let p = t.apply_to(&CPoint::new(1.0, 1.0, 1.0));
        assert_eq!(p, CPoint::new(11.0, -4.0, 3.0));
    }

    #[test]
    fn test_composition_order() {
        let scale = CTransform::scale(2.0);
        let shift = CTransform::translation(1.0, 0.0, 0.0);
        // shift first, then scale
        let p = scale.then_after(&shift).apply_to(&CPoint::new(1.0, 0.0, 0.0));
        assert_eq!(p, CPoint::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn test_identity_neutral() {
        let t = CTransform::translation(3.0, 4.0, 5.0);
        assert_eq!(CTransform::IDENTITY.then_after(&t), t);
        assert!(CTransform::default().is_identity());
    }

    #[test]
    fn test_encode_is_flat_array() {
        let encoded = CTransform::translation(1.0, 2.0, 3.0).encode().unwrap();
        let values: Vec<f64> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(values.len(), 16);
        assert_eq!(values[3], 1.0);
        assert_eq!(values[7], 2.0);
        assert_eq!(values[11], 3.0);
    }

    #[test]
    fn test_decode_rejects_short_arrays() {
        assert!(CTransform::decode("[1,0,0,0]").is_err());
    }
}

use std::collections::HashMap;

use crate::error::CoreError;
use crate::packet::PayloadPacket;
use crate::transform::CTransform;

/// Update key carrying a pending transform on a geometry packet.
pub const TRANSFORM_KEY: &str = "Transform";

/// Geometry payload: host-serialized geometry plus user attributes.
///
/// The geometry string is produced and consumed by the host; this crate
/// never looks inside it. Travels as a [`PayloadPacket`] with the geometry
/// in `Data`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeometryPayload {
    pub geometry: String,
    pub attributes: HashMap<String, String>,
    pub transform: Option<CTransform>,
}

impl GeometryPayload {
    pub fn new(geometry: impl Into<String>) -> Self {
        Self {
            geometry: geometry.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Fold another transform into the pending one.
    pub fn push_transform(&mut self, transform: &CTransform) {
        let current = self.transform.unwrap_or_default();
        self.transform = Some(transform.then_after(&current));
    }

    pub fn to_packet(&self) -> Result<PayloadPacket, CoreError> {
        let mut packet = PayloadPacket::new(self.geometry.clone());
        packet.updates = self.attributes.clone();
        if let Some(transform) = &self.transform {
            packet
                .updates
                .insert(TRANSFORM_KEY.to_string(), transform.encode()?);
        }
        Ok(packet)
    }

    pub fn from_packet(mut packet: PayloadPacket) -> Result<Self, CoreError> {
        let transform = packet
            .updates
            .remove(TRANSFORM_KEY)
            .map(|raw| CTransform::decode(&raw))
            .transpose()?;
        Ok(Self {
            geometry: packet.data,
            attributes: packet.updates,
            transform,
        })
    }

    pub fn encode(&self) -> Result<String, CoreError> {
        self.to_packet()?.encode()
    }

    /// Decode a change payload. A bare string becomes the geometry.
    pub fn decode(raw: &str) -> Result<Self, CoreError> {
        Self::from_packet(PayloadPacket::parse(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_roundtrip_with_transform() {
        let mut payload = GeometryPayload::new("{\"type\":\"Line\"}").with_attribute("Name", "Beam");
        payload.push_transform(&CTransform::translation(5.0, 0.0, 0.0));

        let decoded = GeometryPayload::decode(&payload.encode().unwrap()).unwrap();
        assert_eq!(decoded, payload);
        assert!(!decoded.attributes.contains_key(TRANSFORM_KEY));
    }

    #[test]
    fn test_bare_string_is_geometry() {
        let decoded = GeometryPayload::decode("opaque-host-blob").unwrap();
        assert_eq!(decoded.geometry, "opaque-host-blob");
        assert!(decoded.transform.is_none());
    }

    #[test]
    fn test_push_transform_accumulates() {
        let mut payload = GeometryPayload::new("g");
        payload.push_transform(&CTransform::translation(1.0, 0.0, 0.0));
        payload.push_transform(&CTransform::translation(0.0, 2.0, 0.0));
        assert_eq!(payload.transform, Some(CTransform::translation(1.0, 2.0, 0.0)));
    }

    #[test]
    fn test_bad_transform_entry_is_an_error() {
        let packet = PayloadPacket::new("g").with_update(TRANSFORM_KEY, "[1,2]");
        assert!(GeometryPayload::from_packet(packet).is_err());
    }
}

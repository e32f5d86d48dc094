use crate::packet::{PacketError, PayloadPacket};

/// Update key holding the name a requester asks to be revealed.
pub const REQUESTED_NAME: &str = "RequestedName";

/// Payload of a request change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub requested_name: String,
}

impl Request {
    pub fn new(requested_name: impl Into<String>) -> Self {
        Self {
            requested_name: requested_name.into(),
        }
    }

    pub fn to_packet(&self) -> PayloadPacket {
        PayloadPacket::default().with_update(REQUESTED_NAME, self.requested_name.clone())
    }

    pub fn from_packet(packet: &PayloadPacket) -> Result<Self, PacketError> {
        Ok(Self::new(packet.get_as::<String>(REQUESTED_NAME)?))
    }

    /// Decode from a raw change payload.
    pub fn decode(raw: &str) -> Result<Self, PacketError> {
        Self::from_packet(&PayloadPacket::parse(raw))
    }
}

//! Frames and packets moving through a session.

use {crate::capability::ProtocolCode, bytes::Bytes};

/// A frame as it appears on the multiplexed wire: adaptive id plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub adaptive_id: u32,
    pub payload: Bytes,
}

impl RawFrame {
    pub fn new(adaptive_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            adaptive_id,
            payload: payload.into(),
        }
    }
}

/// An inbound message handed to a buffered handler, with the adaptive id
/// already translated to the protocol's own message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub protocol: ProtocolCode,
    pub packet_type: u32,
    pub data: Bytes,
}

/// An inbound message handed to a zero-copy handler.
///
/// `data` borrows the transport's receive buffer and is only valid for the
/// duration of the dispatch call.
#[derive(Debug, Clone, Copy)]
pub struct ZeroPacket<'a> {
    pub protocol: &'a ProtocolCode,
    pub packet_type: u32,
    pub data: &'a [u8],
}

/// A typed outbound message addressed by `(protocol, local id)`.
///
/// Delivery consumes the message, so its payload is released whether the
/// send succeeds or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub protocol: ProtocolCode,
    pub local_id: u32,
    pub payload: Bytes,
}

impl OutboundMessage {
    pub fn new(protocol: impl Into<ProtocolCode>, local_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            protocol: protocol.into(),
            local_id,
            payload: payload.into(),
        }
    }
}

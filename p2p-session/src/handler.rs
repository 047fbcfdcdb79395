//! Sub-protocol handlers registered on a session.
//!
//! Every handler implements [`ProtocolHandler`] plus exactly one delivery
//! style. The style is fixed when the handler is wrapped in a
//! [`SessionHandler`] variant at registration, so inbound dispatch is a plain
//! `match` rather than a runtime type probe.

use {
    crate::{
        capability::{Capability, ProtocolCode},
        disconnect::DisconnectReason,
        error::HandlerError,
        packet::{Packet, ZeroPacket},
    },
    bytes::Bytes,
    std::{fmt, sync::Arc},
};

/// Behaviour shared by every protocol handler.
pub trait ProtocolHandler: Send + Sync {
    fn protocol_code(&self) -> &ProtocolCode;

    /// Negotiated version of the protocol.
    fn protocol_version(&self) -> u8;

    /// Number of message ids the protocol reserves in the adaptive id space.
    fn message_id_space_size(&self) -> u32;

    /// Notify the protocol that the session is going down. The p2p handler
    /// uses this to send its `Disconnect` message.
    fn disconnect_protocol(
        &self,
        reason: DisconnectReason,
        details: Option<&str>,
    ) -> Result<(), HandlerError>;

    /// Release resources. Called once, after the session is disconnected.
    fn dispose(&self);
}

/// A handler that takes ownership of each inbound packet.
pub trait BufferedProtocolHandler: ProtocolHandler {
    fn handle_message(&self, packet: Packet);
}

/// A handler that reads inbound packets straight out of the transport's
/// buffer.
pub trait ZeroCopyProtocolHandler: ProtocolHandler {
    fn handle_message(&self, packet: &ZeroPacket<'_>);
}

/// The base protocol handler. Besides its own messages it answers capability
/// queries for the rest of the node.
pub trait P2PProtocolHandler: BufferedProtocolHandler {
    /// Whether we advertise `capability` to the peer.
    fn has_available_capability(&self, capability: &Capability) -> bool;

    /// Whether both sides agreed on `capability`.
    fn has_agreed_capability(&self, capability: &Capability) -> bool;

    fn agreed_capabilities(&self) -> Vec<Capability>;

    /// Advertise an additional capability in future negotiations.
    fn add_supported_capability(&self, capability: Capability);
}

/// A registered handler, tagged with its delivery style.
#[derive(Clone)]
pub enum SessionHandler {
    P2P(Arc<dyn P2PProtocolHandler>),
    Buffered(Arc<dyn BufferedProtocolHandler>),
    ZeroCopy(Arc<dyn ZeroCopyProtocolHandler>),
}

impl SessionHandler {
    pub fn protocol_code(&self) -> &ProtocolCode {
        match self {
            Self::P2P(h) => h.protocol_code(),
            Self::Buffered(h) => h.protocol_code(),
            Self::ZeroCopy(h) => h.protocol_code(),
        }
    }

    pub fn protocol_version(&self) -> u8 {
        match self {
            Self::P2P(h) => h.protocol_version(),
            Self::Buffered(h) => h.protocol_version(),
            Self::ZeroCopy(h) => h.protocol_version(),
        }
    }

    pub fn message_id_space_size(&self) -> u32 {
        match self {
            Self::P2P(h) => h.message_id_space_size(),
            Self::Buffered(h) => h.message_id_space_size(),
            Self::ZeroCopy(h) => h.message_id_space_size(),
        }
    }

    pub fn is_zero_copy(&self) -> bool {
        matches!(self, Self::ZeroCopy(_))
    }

    pub fn as_p2p(&self) -> Option<&Arc<dyn P2PProtocolHandler>> {
        match self {
            Self::P2P(h) => Some(h),
            _ => None,
        }
    }

    pub(crate) fn disconnect_protocol(
        &self,
        reason: DisconnectReason,
        details: Option<&str>,
    ) -> Result<(), HandlerError> {
        match self {
            Self::P2P(h) => h.disconnect_protocol(reason, details),
            Self::Buffered(h) => h.disconnect_protocol(reason, details),
            Self::ZeroCopy(h) => h.disconnect_protocol(reason, details),
        }
    }

    pub(crate) fn dispose(&self) {
        match self {
            Self::P2P(h) => h.dispose(),
            Self::Buffered(h) => h.dispose(),
            Self::ZeroCopy(h) => h.dispose(),
        }
    }

    /// Hand an inbound payload to the handler in its delivery style.
    pub(crate) fn dispatch(&self, packet_type: u32, payload: &Bytes) {
        match self {
            Self::P2P(h) => h.handle_message(Packet {
                protocol: h.protocol_code().clone(),
                packet_type,
                data: payload.clone(),
            }),
            Self::Buffered(h) => h.handle_message(Packet {
                protocol: h.protocol_code().clone(),
                packet_type,
                data: payload.clone(),
            }),
            Self::ZeroCopy(h) => h.handle_message(&ZeroPacket {
                protocol: h.protocol_code(),
                packet_type,
                data: payload,
            }),
        }
    }
}

impl fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let style = match self {
            Self::P2P(_) => "P2P",
            Self::Buffered(_) => "Buffered",
            Self::ZeroCopy(_) => "ZeroCopy",
        };
        f.debug_struct(style)
            .field("protocol", &self.protocol_code().as_str())
            .field("version", &self.protocol_version())
            .field("space", &self.message_id_space_size())
            .finish()
    }
}

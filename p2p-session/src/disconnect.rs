//! Disconnect reasons, origins and the analytics seam.

use std::fmt;

/// Why a session is being torn down.
///
/// Each reason maps onto the one-byte code carried by the p2p `Disconnect`
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DisconnectReason {
    /// The remote asked to disconnect.
    DisconnectRequested,
    /// The transport failed underneath the session.
    TcpSubsystemError,
    /// The peer violated a sub-protocol.
    BreachOfProtocol,
    /// The peer offers nothing we need.
    UselessPeer,
    TooManyPeers,
    /// Another session to the same node already exists.
    AlreadyConnected,
    IncompatibleP2PVersion,
    NullNodeIdentityReceived,
    /// The local node is shutting down.
    ClientQuitting,
    UnexpectedIdentity,
    IdentitySameAsSelf,
    ReceiveMessageTimeout,
    Other,
}

impl DisconnectReason {
    /// Every reason, in wire-code order.
    pub const ALL: [DisconnectReason; 13] = [
        Self::DisconnectRequested,
        Self::TcpSubsystemError,
        Self::BreachOfProtocol,
        Self::UselessPeer,
        Self::TooManyPeers,
        Self::AlreadyConnected,
        Self::IncompatibleP2PVersion,
        Self::NullNodeIdentityReceived,
        Self::ClientQuitting,
        Self::UnexpectedIdentity,
        Self::IdentitySameAsSelf,
        Self::ReceiveMessageTimeout,
        Self::Other,
    ];

    /// Reasons a static peer is shielded from unless configured otherwise.
    pub const DEFAULT_STATIC_PEER_PROTECTED: [DisconnectReason; 5] = [
        Self::DisconnectRequested,
        Self::TcpSubsystemError,
        Self::UselessPeer,
        Self::TooManyPeers,
        Self::Other,
    ];

    /// Code carried by the p2p `Disconnect` message.
    pub const fn wire_code(self) -> u8 {
        match self {
            Self::DisconnectRequested => 0x00,
            Self::TcpSubsystemError => 0x01,
            Self::BreachOfProtocol => 0x02,
            Self::UselessPeer => 0x03,
            Self::TooManyPeers => 0x04,
            Self::AlreadyConnected => 0x05,
            Self::IncompatibleP2PVersion => 0x06,
            Self::NullNodeIdentityReceived => 0x07,
            Self::ClientQuitting => 0x08,
            Self::UnexpectedIdentity => 0x09,
            Self::IdentitySameAsSelf => 0x0a,
            Self::ReceiveMessageTimeout => 0x0b,
            Self::Other => 0x10,
        }
    }

    /// Decode a peer-supplied code. Unknown codes become [`Self::Other`].
    pub fn from_wire_code(code: u8) -> Self {
        Self::ALL
            .into_iter()
            .find(|reason| reason.wire_code() == code)
            .unwrap_or(Self::Other)
    }

    /// Low-severity reasons do not justify dropping a static peer.
    pub fn is_low_severity(self) -> bool {
        Self::DEFAULT_STATIC_PEER_PROTECTED.contains(&self)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DisconnectRequested => "disconnect_requested",
            Self::TcpSubsystemError => "tcp_subsystem_error",
            Self::BreachOfProtocol => "breach_of_protocol",
            Self::UselessPeer => "useless_peer",
            Self::TooManyPeers => "too_many_peers",
            Self::AlreadyConnected => "already_connected",
            Self::IncompatibleP2PVersion => "incompatible_p2p_version",
            Self::NullNodeIdentityReceived => "null_node_identity_received",
            Self::ClientQuitting => "client_quitting",
            Self::UnexpectedIdentity => "unexpected_identity",
            Self::IdentitySameAsSelf => "identity_same_as_self",
            Self::ReceiveMessageTimeout => "receive_message_timeout",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side initiated the teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectType {
    Local,
    Remote,
}

impl fmt::Display for DisconnectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// Receives a report for every session that starts tearing down.
///
/// Implementations must not block: they run on the disconnecting caller's
/// thread.
pub trait DisconnectsAnalyzer: Send + Sync {
    fn report_disconnect(
        &self,
        reason: DisconnectReason,
        disconnect_type: DisconnectType,
        details: Option<&str>,
    );
}

/// Analytics sink that discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDisconnectsAnalyzer;

impl DisconnectsAnalyzer for NoopDisconnectsAnalyzer {
    fn report_disconnect(&self, _: DisconnectReason, _: DisconnectType, _: Option<&str>) {}
}

//! Error types for the session layer.

use {
    crate::{capability::ProtocolCode, session::SessionState},
    thiserror::Error,
};

/// Error returned by a protocol handler's disconnect callback.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while driving a peer session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// An operation was invoked in a state its precondition forbids while the
    /// session is not closing. Indicates a defect in the calling layer.
    #[error("cannot {operation} a session in state {state}")]
    LifecycleMisuse {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the session was in at the time.
        state: SessionState,
    },

    /// An outbound message addressed a local id outside the space negotiated
    /// for its protocol.
    #[error(
        "local message id {local_id} is outside the {space_size}-id space negotiated for {protocol}"
    )]
    UnsupportedOutboundAddress {
        /// Protocol the message was tagged with.
        protocol: ProtocolCode,
        /// Protocol-local message id.
        local_id: u32,
        /// Negotiated message-id space for the protocol.
        space_size: u32,
    },

    /// The protocol is not part of the current registry.
    #[error("protocol {0} is not registered on this session")]
    UnknownProtocol(ProtocolCode),

    /// A non-p2p handler was added before the p2p handler.
    #[error("p2p handler must be registered before {0}")]
    P2PNotRegistered(ProtocolCode),

    /// A handler for the protocol is already registered.
    #[error("a handler for {0} is already registered")]
    DuplicateProtocol(ProtocolCode),

    /// A handler's disconnect callback failed.
    #[error("{protocol} handler failed to disconnect: {source}")]
    HandlerTeardown {
        /// Protocol whose handler failed.
        protocol: ProtocolCode,
        /// Underlying failure.
        source: HandlerError,
    },

    /// The transport failed to close cleanly.
    #[error("transport teardown error: {0}")]
    TeardownIo(#[from] std::io::Error),
}

impl SessionError {
    pub(crate) fn misuse(operation: &'static str, state: SessionState) -> Self {
        Self::LifecycleMisuse { operation, state }
    }
}

/// Convenience result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

//! Seams to the connection underneath a session.
//!
//! The session never touches sockets, ciphers or frame codecs. It sees the
//! encrypted, framed connection through three narrow interfaces:
//!
//! - [`Transport`]: owned from construction; closed asynchronously when the
//!   session tears down.
//! - [`TransportContext`]: per-connection pipeline settings, bound when the
//!   p2p handshake completes.
//! - [`PacketSender`]: writes one encoded frame, bound alongside the
//!   context.

use {crate::packet::RawFrame, async_trait::async_trait};

/// The authenticated, framed connection a session runs on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Close the underlying connection. Called once per session, from a
    /// background task.
    async fn close(&self) -> std::io::Result<()>;
}

/// Pipeline settings of an established connection.
pub trait TransportContext: Send + Sync {
    /// Switch the frame pipeline to compressed payloads.
    fn enable_compression(&self);
}

/// Writes encoded frames to the connection.
pub trait PacketSender: Send + Sync {
    /// Queue `frame` for sending and return its encoded size in bytes.
    fn send(&self, frame: RawFrame) -> usize;
}

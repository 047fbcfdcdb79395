//! TRv1 P2P Session Layer
//!
//! This crate owns a single established peer connection once the encrypted
//! transport is up. It handles:
//!
//! - **Sub-protocol multiplexing**: every negotiated protocol (`p2p`,
//!   `eth`, `snap`, ...) shares one flat message-id space on the wire; the
//!   [`resolver`] maps ids to `(protocol, local id)` and back.
//! - **Lifecycle**: a strict `New → HandshakeComplete → Initialized →
//!   DisconnectingProtocols → Disconnecting → Disconnected` state machine
//!   that tolerates racing disconnect triggers.
//! - **Teardown**: graceful per-protocol disconnect, static-peer protection,
//!   disconnect analytics and a delayed transport close.
//!
//! Wire codecs, the crypto handshake and the sub-protocols themselves live
//! elsewhere and plug in through the traits in [`handler`] and
//! [`transport`].
//!
//! ## Architecture
//!
//! ```text
//!   transport reader                       disconnect triggers
//!   (handshake, frames)                    (timeouts, peer pool, shutdown)
//!          │                                        │
//!  ┌───────▼────────────────────────────────────────▼───────┐
//!  │  Session                                               │
//!  │  • lifecycle state + pending disconnect (one lock)     │
//!  │  • handler registry ──▶ AdaptiveCodeResolver (cached)  │
//!  │  • event subscribers, stats, peer identity             │
//!  └───────┬──────────────────────────────┬─────────────────┘
//!          │ dispatch                     │ send / close
//!  ┌───────▼────────┐             ┌───────▼────────┐
//!  │ protocol       │             │ PacketSender / │
//!  │ handlers       │             │ Transport      │
//!  └────────────────┘             └────────────────┘
//! ```
//!
//! ## Crate modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`session`]    | `Session` state machine, dispatch, teardown |
//! | [`resolver`]   | Adaptive id mapping and the process-wide cache |
//! | [`handler`]    | Protocol handler traits and registered variants |
//! | [`transport`]  | Transport, context and packet-sender seams |
//! | [`disconnect`] | Disconnect reasons, origins, analytics sink |
//! | [`metrics`]    | Counting analytics sink |
//! | [`events`]     | Lifecycle and traffic notifications |
//! | [`node`]       | Remote node key, endpoint and direction |
//! | [`capability`] | Protocol codes and capabilities |
//! | [`packet`]     | Raw frames, inbound packets, outbound messages |
//! | [`stats`]      | Per-session traffic counters and latency |
//! | [`config`]     | `SessionConfig` defaults and dev overrides |
//! | [`error`]      | Crate-wide error enum |

pub mod capability;
pub mod config;
pub mod disconnect;
pub mod error;
pub mod events;
pub mod handler;
pub mod metrics;
pub mod node;
pub mod packet;
pub mod resolver;
pub mod session;
pub mod stats;
pub mod transport;

#[cfg(any(test, feature = "dev-context-only-utils"))]
pub mod test_utils;

pub use {
    capability::{Capability, ProtocolCode},
    config::SessionConfig,
    disconnect::{DisconnectReason, DisconnectType, DisconnectsAnalyzer},
    error::{Result, SessionError},
    events::SessionEvent,
    handler::SessionHandler,
    node::{Direction, Node, NodeKey},
    packet::{OutboundMessage, RawFrame},
    resolver::{AdaptiveCodeResolver, ResolverCache},
    session::{Session, SessionState},
};

//! Lifecycle notifications.
//!
//! Listeners run synchronously, in subscription order, on the thread that
//! triggered the event. Nothing is queued: when `initialize` returns, every
//! listener has already seen [`SessionEvent::Initialized`].

use {
    crate::{
        capability::ProtocolCode,
        disconnect::{DisconnectReason, DisconnectType},
    },
    parking_lot::RwLock,
    std::sync::Arc,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    HandshakeComplete,
    Initialized,
    MessageReceived {
        protocol: ProtocolCode,
        packet_type: u32,
        size: usize,
    },
    MessageDelivered {
        protocol: ProtocolCode,
        packet_type: u32,
        size: usize,
    },
    /// Emitted before the transport is torn down.
    Disconnecting {
        reason: DisconnectReason,
        disconnect_type: DisconnectType,
        details: Option<String>,
    },
    /// Terminal; emitted exactly once per session.
    Disconnected {
        reason: DisconnectReason,
        disconnect_type: DisconnectType,
        details: Option<String>,
    },
}

pub type SessionListener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Subscribers {
    listeners: RwLock<Vec<SessionListener>>,
}

impl Subscribers {
    pub(crate) fn subscribe(&self, listener: SessionListener) {
        self.listeners.write().push(listener);
    }

    /// Notify every listener and return how many there were.
    pub(crate) fn emit(&self, event: &SessionEvent) -> usize {
        // Listeners may subscribe from inside a callback.
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }
}

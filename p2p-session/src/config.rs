//! Configuration for peer sessions.

use {crate::disconnect::DisconnectReason, std::collections::HashSet, std::time::Duration};

/// Policy knobs shared by every session a node opens.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long to wait before closing the transport after a locally
    /// initiated disconnect of an initialized session (ms), so the p2p
    /// `Disconnect` message can reach the peer first.
    /// Default: 1000
    pub disconnect_grace_delay_ms: u64,

    /// Disconnect reasons ignored when the peer is static.
    /// Default: [`DisconnectReason::DEFAULT_STATIC_PEER_PROTECTED`]
    pub static_peer_protected_reasons: HashSet<DisconnectReason>,

    /// Inbound frames with a larger payload are dropped as malformed.
    /// Default: 16 MiB
    pub max_inbound_frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            disconnect_grace_delay_ms: 1_000,
            static_peer_protected_reasons: DisconnectReason::DEFAULT_STATIC_PEER_PROTECTED
                .into_iter()
                .collect(),
            max_inbound_frame_size: 16_777_216, // 16 MiB
        }
    }
}

impl SessionConfig {
    /// Create a config suitable for local testing with a short grace delay.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            disconnect_grace_delay_ms: 20,
            ..Self::default()
        }
    }

    pub fn disconnect_grace_delay(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_delay_ms)
    }

    /// Whether `reason` is too mild to drop a static peer for.
    pub fn protects_static_peer_from(&self, reason: DisconnectReason) -> bool {
        self.static_peer_protected_reasons.contains(&reason)
    }
}

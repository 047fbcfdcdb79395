//! Per-session traffic bookkeeping.

use std::time::Instant;

/// Traffic counters and liveness metadata of one session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Counter: frames dispatched to a handler.
    pub messages_received: u64,
    pub bytes_received: u64,
    /// Counter: frames handed to the packet sender.
    pub messages_delivered: u64,
    pub bytes_delivered: u64,
    /// Counter: inbound frames whose adaptive id matched no protocol.
    pub unresolved_frames: u64,
    /// Time of the last frame received from the peer.
    pub last_seen: Instant,
    pub last_ping_sent: Option<Instant>,
    pub last_pong_received: Option<Instant>,
    /// Exponentially-weighted moving average of ping round-trip time (ms).
    pub latency_ms: f64,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            messages_received: 0,
            bytes_received: 0,
            messages_delivered: 0,
            bytes_delivered: 0,
            unresolved_frames: 0,
            last_seen: Instant::now(),
            last_ping_sent: None,
            last_pong_received: None,
            latency_ms: 0.0,
        }
    }

    pub(crate) fn record_received(&mut self, size: usize) {
        self.messages_received = self.messages_received.saturating_add(1);
        self.bytes_received = self.bytes_received.saturating_add(size as u64);
        self.last_seen = Instant::now();
    }

    pub(crate) fn record_delivered(&mut self, size: usize) {
        self.messages_delivered = self.messages_delivered.saturating_add(1);
        self.bytes_delivered = self.bytes_delivered.saturating_add(size as u64);
    }

    pub(crate) fn record_unresolved(&mut self) {
        self.unresolved_frames = self.unresolved_frames.saturating_add(1);
        self.last_seen = Instant::now();
    }

    pub(crate) fn record_ping_sent(&mut self) {
        self.last_ping_sent = Some(Instant::now());
    }

    /// Record a pong; if a ping is outstanding its round trip feeds the
    /// latency average.
    pub(crate) fn record_pong_received(&mut self) {
        let now = Instant::now();
        if let Some(sent) = self.last_ping_sent.take() {
            self.update_latency(now.saturating_duration_since(sent).as_secs_f64() * 1_000.0);
        }
        self.last_pong_received = Some(now);
    }

    /// Update the EWMA latency with a new sample.
    pub fn update_latency(&mut self, sample_ms: f64) {
        const ALPHA: f64 = 0.3;
        if self.latency_ms == 0.0 {
            self.latency_ms = sample_ms;
        } else {
            self.latency_ms = ALPHA * sample_ms + (1.0 - ALPHA) * self.latency_ms;
        }
    }

    /// Returns how many seconds since we last heard from this peer.
    pub fn silence_secs(&self) -> u64 {
        self.last_seen.elapsed().as_secs()
    }
}

//! Disconnect counters.
//!
//! [`DisconnectMetrics`] is the stock [`DisconnectsAnalyzer`]: one relaxed
//! atomic counter per (reason, origin) pair, cheap enough to bump on the
//! disconnect path and read from an exporter thread.

use {
    crate::disconnect::{DisconnectReason, DisconnectType, DisconnectsAnalyzer},
    std::sync::atomic::{AtomicU64, Ordering},
};

const REASONS: usize = DisconnectReason::ALL.len();

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current counter value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// One row of a [`DisconnectMetrics::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectSample {
    pub reason: DisconnectReason,
    pub disconnect_type: DisconnectType,
    pub count: u64,
}

/// Counts session teardowns by reason and origin.
#[derive(Debug)]
pub struct DisconnectMetrics {
    local: [Counter; REASONS],
    remote: [Counter; REASONS],
}

impl Default for DisconnectMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DisconnectMetrics {
    pub fn new() -> Self {
        Self {
            local: std::array::from_fn(|_| Counter::new()),
            remote: std::array::from_fn(|_| Counter::new()),
        }
    }

    fn counter(&self, reason: DisconnectReason, disconnect_type: DisconnectType) -> &Counter {
        let index = DisconnectReason::ALL
            .iter()
            .position(|r| *r == reason)
            .unwrap_or(REASONS.saturating_sub(1));
        match disconnect_type {
            DisconnectType::Local => &self.local[index],
            DisconnectType::Remote => &self.remote[index],
        }
    }

    pub fn count(&self, reason: DisconnectReason, disconnect_type: DisconnectType) -> u64 {
        self.counter(reason, disconnect_type).get()
    }

    /// Total disconnects recorded, across every reason and origin.
    pub fn total(&self) -> u64 {
        self.local
            .iter()
            .chain(self.remote.iter())
            .fold(0u64, |acc, c| acc.saturating_add(c.get()))
    }

    /// Every non-zero counter, local before remote, in wire-code order.
    pub fn snapshot(&self) -> Vec<DisconnectSample> {
        [DisconnectType::Local, DisconnectType::Remote]
            .into_iter()
            .flat_map(|disconnect_type| {
                DisconnectReason::ALL
                    .into_iter()
                    .map(move |reason| (reason, disconnect_type))
            })
            .filter_map(|(reason, disconnect_type)| {
                let count = self.count(reason, disconnect_type);
                (count > 0).then_some(DisconnectSample {
                    reason,
                    disconnect_type,
                    count,
                })
            })
            .collect()
    }
}

impl DisconnectsAnalyzer for DisconnectMetrics {
    fn report_disconnect(
        &self,
        reason: DisconnectReason,
        disconnect_type: DisconnectType,
        _details: Option<&str>,
    ) {
        self.counter(reason, disconnect_type).inc();
    }
}

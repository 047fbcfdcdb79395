//! TRv1 Property-Based Invariant Tests
//!
//! Uses proptest to verify critical session-layer invariants across:
//! - Adaptive message-id mapping and the shared resolver cache
//! - Session lifecycle and disconnect idempotence

pub mod lifecycle_invariants;
pub mod resolver_invariants;

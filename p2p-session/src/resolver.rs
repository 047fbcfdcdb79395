//! Adaptive message-id remapping.
//!
//! Once sub-protocols are multiplexed onto one connection, every message on
//! the wire carries a single flat *adaptive id*. Each negotiated protocol owns
//! a contiguous range of that space, sized by the protocol's advertised
//! message-id space:
//!
//! ```text
//!   adaptive id  0 ............ 16 ............ 33 ....... 41
//!                │  p2p (16)    │  eth (17)     │ snap (8) │ unresolved →
//! ```
//!
//! `p2p` always occupies the first range; every other protocol follows in
//! ascending code order, so two peers that agreed on the same capabilities
//! derive the same table no matter in which order handlers were registered.
//!
//! Resolvers are pure and immutable, and a node sees only a handful of
//! distinct capability sets over its lifetime, so built resolvers are shared
//! process-wide through [`ResolverCache`]. Entries are never evicted.

use {
    crate::{
        capability::ProtocolCode,
        error::{Result, SessionError},
    },
    dashmap::DashMap,
    std::sync::{Arc, LazyLock},
};

/// The range of adaptive ids owned by one protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSpace {
    pub protocol: ProtocolCode,
    /// First adaptive id of the range.
    pub offset: u32,
    /// Number of ids in the range.
    pub size: u32,
}

/// Canonical, immutable description of a capability set: (protocol, space
/// size) pairs with p2p first and the rest in ascending code order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolverKey(Arc<[(ProtocolCode, u32)]>);

impl ResolverKey {
    pub fn new(entries: impl IntoIterator<Item = (ProtocolCode, u32)>) -> Self {
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| (!a.is_p2p(), a).cmp(&(!b.is_p2p(), b)));
        Self(entries.into())
    }

    pub fn entries(&self) -> &[(ProtocolCode, u32)] {
        &self.0
    }
}

/// Maps adaptive ids to `(protocol, local id)` and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptiveCodeResolver {
    spaces: Vec<ProtocolSpace>,
    total: u32,
}

impl AdaptiveCodeResolver {
    /// Build a resolver from (protocol, space size) pairs in any order.
    pub fn new(entries: impl IntoIterator<Item = (ProtocolCode, u32)>) -> Self {
        Self::from_key(&ResolverKey::new(entries))
    }

    fn from_key(key: &ResolverKey) -> Self {
        let mut offset = 0u32;
        let spaces = key
            .entries()
            .iter()
            .map(|(protocol, size)| {
                let space = ProtocolSpace {
                    protocol: protocol.clone(),
                    offset,
                    size: *size,
                };
                offset = offset.saturating_add(*size);
                space
            })
            .collect();
        Self {
            spaces,
            total: offset,
        }
    }

    /// The ranges in adaptive-id order.
    pub fn spaces(&self) -> &[ProtocolSpace] {
        &self.spaces
    }

    /// Size of the whole adaptive id space. Ids at or above it are unresolved.
    pub fn total_space(&self) -> u32 {
        self.total
    }

    /// Resolve an inbound adaptive id.
    ///
    /// Returns `None` when the id falls outside every negotiated range, which
    /// is expected on malformed or adversarial input.
    pub fn resolve(&self, adaptive_id: u32) -> Option<(&ProtocolCode, u32)> {
        self.spaces
            .iter()
            .find(|space| adaptive_id < space.offset.saturating_add(space.size))
            .map(|space| (&space.protocol, adaptive_id.saturating_sub(space.offset)))
    }

    /// Encode an outbound `(protocol, local id)` into its adaptive id.
    ///
    /// Asking for an id outside the negotiated space is a local defect and
    /// fails with [`SessionError::UnsupportedOutboundAddress`].
    pub fn encode(&self, protocol: &str, local_id: u32) -> Result<u32> {
        let space = self
            .spaces
            .iter()
            .find(|space| space.protocol.as_str() == protocol)
            .ok_or_else(|| SessionError::UnknownProtocol(ProtocolCode::new(protocol)))?;
        if local_id >= space.size {
            return Err(SessionError::UnsupportedOutboundAddress {
                protocol: space.protocol.clone(),
                local_id,
                space_size: space.size,
            });
        }
        Ok(space.offset.saturating_add(local_id))
    }
}

/// Append-only map from capability set to its shared resolver.
///
/// Backed by a sharded concurrent map: lookups never wait on an insert into
/// another shard, and two sessions racing to build the same resolver both end
/// up holding whichever construction won, which is value-equal to the other.
#[derive(Debug, Default)]
pub struct ResolverCache {
    resolvers: DashMap<ResolverKey, Arc<AdaptiveCodeResolver>>,
}

static GLOBAL_RESOLVER_CACHE: LazyLock<ResolverCache> = LazyLock::new(ResolverCache::new);

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache shared by every session.
    pub fn global() -> &'static ResolverCache {
        &GLOBAL_RESOLVER_CACHE
    }

    /// Fetch the resolver for a capability set, building it on first use.
    pub fn get_or_build(
        &self,
        entries: impl IntoIterator<Item = (ProtocolCode, u32)>,
    ) -> Arc<AdaptiveCodeResolver> {
        let key = ResolverKey::new(entries);
        if let Some(resolver) = self.resolvers.get(&key) {
            return Arc::clone(resolver.value());
        }
        let resolver = Arc::new(AdaptiveCodeResolver::from_key(&key));
        Arc::clone(self.resolvers.entry(key).or_insert(resolver).value())
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

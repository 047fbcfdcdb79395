//! Property-based tests for adaptive message-id mapping.
//!
//! Properties tested:
//! 1. Layout: p2p owns the lowest ids, the rest follow in code order, and
//!    ranges are contiguous.
//! 2. Determinism: the same capability set in any order yields the same
//!    resolver, and the cache hands out one shared instance.
//! 3. Mapping: every negotiated `(protocol, local id)` encodes to an id that
//!    resolves back to it; ids past the space never resolve.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        std::sync::Arc,
        trv1_p2p_session::{AdaptiveCodeResolver, ProtocolCode, ResolverCache},
    };

    // ── Helpers ──

    /// p2p plus up to five other protocols with arbitrary space sizes.
    fn capability_set() -> impl Strategy<Value = Vec<(ProtocolCode, u32)>> {
        (
            1u32..=32,
            prop::collection::btree_map("[a-o]{3,4}", 0u32..=64, 0..6),
        )
            .prop_map(|(p2p_size, others)| {
                let mut entries = vec![(ProtocolCode::p2p(), p2p_size)];
                entries.extend(
                    others
                        .into_iter()
                        .map(|(code, size)| (ProtocolCode::new(&code), size)),
                );
                entries
            })
    }

    /// A capability set together with a reordering of it.
    fn shuffled_pair(
    ) -> impl Strategy<Value = (Vec<(ProtocolCode, u32)>, Vec<(ProtocolCode, u32)>)> {
        capability_set().prop_flat_map(|entries| (Just(entries.clone()), Just(entries).prop_shuffle()))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 1. Layout
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn layout_p2p_first_then_sorted_contiguous((_, shuffled) in shuffled_pair()) {
            let resolver = AdaptiveCodeResolver::new(shuffled.clone());
            let spaces = resolver.spaces();

            prop_assert_eq!(spaces.len(), shuffled.len());
            prop_assert!(spaces[0].protocol.is_p2p(), "p2p must own the lowest ids");
            prop_assert_eq!(spaces[0].offset, 0);

            for pair in spaces.windows(2) {
                prop_assert!(
                    pair[0].protocol.is_p2p() || pair[0].protocol < pair[1].protocol,
                    "{} placed before {}", pair[0].protocol, pair[1].protocol
                );
                prop_assert_eq!(Some(pair[1].offset), pair[0].offset.checked_add(pair[0].size));
            }

            let total = shuffled
                .iter()
                .fold(0u32, |total, (_, size)| total.saturating_add(*size));
            prop_assert_eq!(resolver.total_space(), total);
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 2. Determinism
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn determinism_order_independent((entries, shuffled) in shuffled_pair()) {
            prop_assert_eq!(
                AdaptiveCodeResolver::new(entries),
                AdaptiveCodeResolver::new(shuffled)
            );
        }

        #[test]
        fn determinism_cache_shares_instance((entries, shuffled) in shuffled_pair()) {
            let cache = ResolverCache::new();
            let first = cache.get_or_build(entries);
            let second = cache.get_or_build(shuffled);
            prop_assert!(Arc::ptr_eq(&first, &second));
            prop_assert_eq!(cache.len(), 1);
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 3. Mapping
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn mapping_encode_resolves_back(entries in capability_set()) {
            let resolver = AdaptiveCodeResolver::new(entries);
            for space in resolver.spaces() {
                for local_id in 0..space.size {
                    let adaptive_id = resolver.encode(space.protocol.as_str(), local_id).unwrap();
                    let (protocol, resolved) = resolver.resolve(adaptive_id).unwrap();
                    prop_assert_eq!(protocol, &space.protocol);
                    prop_assert_eq!(resolved, local_id);
                }
                prop_assert!(resolver.encode(space.protocol.as_str(), space.size).is_err());
            }
        }

        #[test]
        fn mapping_outside_space_unresolved(
            entries in capability_set(),
            excess in 0u32..1_000_000,
        ) {
            let resolver = AdaptiveCodeResolver::new(entries);
            prop_assert!(resolver.resolve(resolver.total_space().saturating_add(excess)).is_none());
        }

        #[test]
        fn mapping_every_id_in_space_resolves(entries in capability_set()) {
            let resolver = AdaptiveCodeResolver::new(entries);
            for adaptive_id in 0..resolver.total_space() {
                let (protocol, local_id) = resolver.resolve(adaptive_id).unwrap();
                prop_assert_eq!(resolver.encode(protocol.as_str(), local_id).unwrap(), adaptive_id);
            }
        }
    }
}

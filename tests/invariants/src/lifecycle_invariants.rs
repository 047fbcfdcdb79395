//! Property-based tests for the session lifecycle.
//!
//! Properties tested:
//! 1. Idempotence: whatever mix of disconnect triggers hits a session, it
//!    ends `Disconnected` with exactly one report and one terminal event,
//!    carrying the first trigger's reason.
//! 2. Deferral: disconnects requested before initialization wait for it,
//!    and the first request wins.
//! 3. Static peers: only the configured low-severity reasons are ignored.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        trv1_p2p_session::{
            test_utils::TestSession, DisconnectReason, DisconnectType, SessionConfig,
            SessionEvent, SessionState,
        },
    };

    // ── Helpers ──

    #[derive(Debug, Clone, Copy)]
    enum Trigger {
        Initiate(DisconnectReason),
        MarkLocal(DisconnectReason),
        MarkRemote(DisconnectReason),
    }

    impl Trigger {
        fn fire(self, test: &TestSession) {
            match self {
                Self::Initiate(reason) => test.session.initiate_disconnect(reason, None),
                Self::MarkLocal(reason) => {
                    test.session
                        .mark_disconnected(reason, DisconnectType::Local, None)
                }
                Self::MarkRemote(reason) => {
                    test.session
                        .mark_disconnected(reason, DisconnectType::Remote, None)
                }
            }
        }

        fn expected(self) -> (DisconnectReason, DisconnectType) {
            match self {
                Self::Initiate(reason) | Self::MarkLocal(reason) => (reason, DisconnectType::Local),
                Self::MarkRemote(reason) => (reason, DisconnectType::Remote),
            }
        }
    }

    fn reason() -> impl Strategy<Value = DisconnectReason> {
        prop::sample::select(DisconnectReason::ALL.to_vec())
    }

    fn trigger() -> impl Strategy<Value = Trigger> {
        prop_oneof![
            reason().prop_map(Trigger::Initiate),
            reason().prop_map(Trigger::MarkLocal),
            reason().prop_map(Trigger::MarkRemote),
        ]
    }

    fn terminal_events(test: &TestSession) -> Vec<(DisconnectReason, DisconnectType)> {
        test.events
            .events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Disconnected {
                    reason,
                    disconnect_type,
                    ..
                } => Some((reason, disconnect_type)),
                _ => None,
            })
            .collect()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 1. Idempotence
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn idempotence_first_trigger_wins(
            triggers in prop::collection::vec(trigger(), 1..8),
        ) {
            let test = TestSession::initialized(SessionConfig::dev_default());
            for trigger in &triggers {
                trigger.fire(&test);
            }

            prop_assert_eq!(test.session.state(), SessionState::Disconnected);
            prop_assert_eq!(test.session.best_state_reached(), SessionState::Initialized);

            let (reason, disconnect_type) = triggers[0].expected();
            prop_assert_eq!(terminal_events(&test), vec![(reason, disconnect_type)]);
            prop_assert_eq!(
                test.analyzer.reports(),
                vec![(reason, disconnect_type, None)]
            );

            let graceful = matches!(triggers[0], Trigger::Initiate(_));
            prop_assert_eq!(test.p2p.disconnects().len(), usize::from(graceful));
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 2. Deferral
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn deferral_first_request_runs_after_initialized(
            reasons in prop::collection::vec(reason(), 1..6),
            before_handshake in any::<bool>(),
        ) {
            let test = TestSession::new(SessionConfig::dev_default());
            if !before_handshake {
                test.handshake();
            }
            for reason in &reasons {
                test.session.initiate_disconnect(*reason, None);
            }
            prop_assert!(!test.session.is_closing());
            prop_assert_eq!(test.session.pending_disconnect(), Some(reasons[0]));
            prop_assert!(terminal_events(&test).is_empty());

            if before_handshake {
                test.handshake();
            }
            test.initialize().unwrap();

            prop_assert_eq!(test.session.state(), SessionState::Disconnected);
            prop_assert_eq!(test.session.pending_disconnect(), None);
            prop_assert_eq!(terminal_events(&test), vec![(reasons[0], DisconnectType::Local)]);

            let initialized_at = test
                .events
                .lifecycle()
                .iter()
                .position(|event| matches!(event, SessionEvent::Initialized));
            let disconnecting_at = test
                .events
                .lifecycle()
                .iter()
                .position(|event| matches!(event, SessionEvent::Disconnecting { .. }));
            prop_assert!(initialized_at.is_some());
            prop_assert!(initialized_at < disconnecting_at);
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 3. Static peers
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn static_peer_suppression_matches_config(
            reason in reason(),
            is_static in any::<bool>(),
        ) {
            let config = SessionConfig::dev_default();
            let protected = is_static && config.protects_static_peer_from(reason);
            let test = TestSession::initialized(config);
            test.session.set_static(is_static);

            test.session.initiate_disconnect(reason, None);

            prop_assert_eq!(test.session.is_closed(), !protected);
            prop_assert_eq!(test.analyzer.reports().len(), usize::from(!protected));

            // Suppression only applies to local requests.
            test.session
                .mark_disconnected(reason, DisconnectType::Remote, None);
            prop_assert_eq!(test.session.state(), SessionState::Disconnected);
        }
    }
}

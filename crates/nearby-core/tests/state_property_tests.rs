//! Property-based tests for the identifier map and connection state machine
//!
//! Random callback/command sequences are applied to a session and the
//! registry/identifier-map invariants are checked after every step.

use std::collections::HashSet;

use nearby_core::{
    AuthStatus, EndpointId, EndpointStatus, EngineEvent, IdentifierMap, ManualTimeSource,
    PolicyConfig, SessionConfig, SessionState, TransportId,
};
use proptest::prelude::*;

/// Generate an endpoint id from a small pool so sequences revisit endpoints
fn arb_endpoint() -> impl Strategy<Value = EndpointId> {
    (0u8..5).prop_map(|n| EndpointId::new(format!("ep{n}")))
}

/// Generate an arbitrary engine-style endpoint id
fn arb_raw_endpoint() -> impl Strategy<Value = EndpointId> {
    "[A-Za-z0-9]{1,12}".prop_map(EndpointId::new)
}

fn arb_policy() -> impl Strategy<Value = PolicyConfig> {
    (any::<bool>(), any::<bool>()).prop_map(|(approve, send)| PolicyConfig {
        auto_approve_connection_request: approve,
        auto_send_connection_request: send,
        ..PolicyConfig::default()
    })
}

#[derive(Debug, Clone)]
enum Step {
    Event(EngineEvent),
    StartAdvertising,
    StopAdvertising,
    StartBrowsing,
    StopBrowsing,
    Request(EndpointId),
    Disconnect(EndpointId),
    Send(EndpointId),
}

fn arb_event() -> impl Strategy<Value = EngineEvent> {
    prop_oneof![
        arb_endpoint().prop_map(|endpoint| EngineEvent::PeerFound {
            name: format!("name-{endpoint}"),
            endpoint,
        }),
        arb_endpoint().prop_map(|endpoint| EngineEvent::PeerLost { endpoint }),
        (arb_endpoint(), 0i32..3).prop_map(|(endpoint, status)| {
            EngineEvent::ConnectionInitiated {
                name: format!("name-{endpoint}"),
                endpoint,
                auth_code: "4242".to_string(),
                auth_status: AuthStatus::from_raw(status),
            }
        }),
        arb_endpoint().prop_map(|endpoint| EngineEvent::ConnectionEstablished { endpoint }),
        arb_endpoint().prop_map(|endpoint| EngineEvent::ConnectionDisconnected { endpoint }),
        (arb_endpoint(), prop::collection::vec(any::<u8>(), 0..8))
            .prop_map(|(endpoint, payload)| EngineEvent::PayloadReceived { endpoint, payload }),
    ]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => arb_event().prop_map(Step::Event),
        1 => Just(Step::StartAdvertising),
        1 => Just(Step::StopAdvertising),
        1 => Just(Step::StartBrowsing),
        1 => Just(Step::StopBrowsing),
        1 => arb_endpoint().prop_map(Step::Request),
        1 => arb_endpoint().prop_map(Step::Disconnect),
        1 => arb_endpoint().prop_map(Step::Send),
    ]
}

fn new_session(policy: PolicyConfig) -> SessionState<ManualTimeSource> {
    let mut state = SessionState::new(policy, ManualTimeSource::new(0));
    state
        .initialize(&SessionConfig::default())
        .expect("default config is valid");
    state
}

fn apply(state: &mut SessionState<ManualTimeSource>, step: Step) {
    match step {
        Step::Event(event) => {
            state.handle_event(event);
        }
        Step::StartAdvertising => {
            state.start_advertising().expect("initialized");
        }
        Step::StopAdvertising => {
            state.stop_advertising().expect("initialized");
        }
        Step::StartBrowsing => {
            state.start_browsing().expect("initialized");
        }
        Step::StopBrowsing => {
            state.stop_browsing().expect("initialized");
        }
        Step::Request(endpoint) => {
            // Unknown endpoints are a caller error and leave state untouched
            let _ = state.send_connection_request(&endpoint);
        }
        Step::Disconnect(endpoint) => {
            if let Some(transport_id) = state.ids().transport_id(&endpoint) {
                state.disconnect(transport_id);
            }
        }
        Step::Send(endpoint) => {
            let transport_id = state
                .ids()
                .transport_id(&endpoint)
                .unwrap_or(TransportId::new(u64::MAX));
            state.send(transport_id, b"payload");
        }
    }
}

fn check_invariants(state: &SessionState<ManualTimeSource>) -> Result<(), TestCaseError> {
    let mut seen_ids = HashSet::new();
    let mut with_transport_id = 0;

    for endpoint in state.all_endpoints() {
        if endpoint.status == EndpointStatus::Connected {
            prop_assert!(endpoint.transport_id.is_some(), "connected endpoint without id");
        }
        if let Some(transport_id) = endpoint.transport_id {
            with_transport_id += 1;
            prop_assert!(seen_ids.insert(transport_id), "transport id shared");
            prop_assert_eq!(state.ids().lookup(transport_id), Some(&endpoint.id));
        }
    }
    // Every identifier-map entry belongs to a registered endpoint
    prop_assert_eq!(state.ids().len(), with_transport_id);

    let connected: HashSet<_> = state
        .connected_endpoints()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    for (id, _) in state.found_endpoints() {
        prop_assert!(!connected.contains(&id), "endpoint both found and connected");
    }
    Ok(())
}

proptest! {
    /// Property: hashing is a pure function of the identifier
    #[test]
    fn test_resolve_is_deterministic(endpoint in arb_raw_endpoint()) {
        let copy = EndpointId::new(endpoint.as_str().to_string());
        prop_assert_eq!(IdentifierMap::resolve(&endpoint), IdentifierMap::resolve(&copy));
    }

    /// Property: registration keeps forward and reverse maps a bijection
    #[test]
    fn test_identifier_map_stays_bijective(
        ops in prop::collection::vec((arb_raw_endpoint(), any::<bool>()), 1..64)
    ) {
        let mut map = IdentifierMap::new();
        for (endpoint, register) in ops {
            if register {
                let id = map.register(&endpoint);
                prop_assert!(!id.is_server());
                prop_assert_eq!(map.lookup(id), Some(&endpoint));
            } else {
                map.remove_endpoint(&endpoint);
                prop_assert!(!map.contains_endpoint(&endpoint));
            }
        }

        let mut ids = HashSet::new();
        for (endpoint, id) in map.iter() {
            prop_assert!(ids.insert(id));
            prop_assert_eq!(map.lookup(id), Some(endpoint));
        }
    }

    /// Property: a found-then-lost peer leaves no trace
    #[test]
    fn test_found_then_lost_leaves_no_trace(endpoint in arb_raw_endpoint(), policy in arb_policy()) {
        let mut state = new_session(policy);
        state.start_browsing().expect("initialized");

        state.handle_event(EngineEvent::PeerFound {
            endpoint: endpoint.clone(),
            name: "Peer".to_string(),
        });
        state.handle_event(EngineEvent::PeerLost { endpoint: endpoint.clone() });

        prop_assert!(state.endpoint(&endpoint).is_none());
        prop_assert!(!state.ids().contains_endpoint(&endpoint));
        prop_assert!(state.pending_request_endpoints().is_empty());
        prop_assert!(state.all_endpoints().is_empty());
    }

    /// Property: registry and identifier map stay consistent under any sequence
    #[test]
    fn test_random_sequences_preserve_invariants(
        policy in arb_policy(),
        steps in prop::collection::vec(arb_step(), 1..80),
    ) {
        let mut state = new_session(policy);
        for step in steps {
            apply(&mut state, step);
            check_invariants(&state)?;
        }

        state.shutdown();
        prop_assert!(state.all_endpoints().is_empty());
        prop_assert!(state.ids().is_empty());
    }
}

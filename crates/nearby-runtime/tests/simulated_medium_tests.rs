//! End-to-end tests: several sessions sharing a simulated medium

use nearby_runtime::{
    EndpointId, EndpointStatus, NearbySession, NetworkDelivery, NetworkTransport,
    PeerNotification, PolicyConfig, SessionBuilder, SimulatedMedium, TransportEvent, TransportId,
};
use nearby_core::{MonotonicTimeSource, NearbyConfig};

type Session = NearbySession<MonotonicTimeSource>;

fn session(medium: &SimulatedMedium, endpoint_id: &str, nickname: &str, policy: PolicyConfig) -> Session {
    let medium = medium.clone();
    let endpoint_id = endpoint_id.to_string();
    SessionBuilder::new()
        .with_config(NearbyConfig::testing())
        .with_policy(policy)
        .nickname(nickname)
        .service_id("arena")
        .build_and_initialize(move |callbacks| medium.attach_as(endpoint_id, callbacks))
        .expect("session")
}

fn host_policy() -> PolicyConfig {
    PolicyConfig {
        auto_advertise: true,
        auto_approve_connection_request: true,
        ..PolicyConfig::default()
    }
}

fn client_policy() -> PolicyConfig {
    PolicyConfig {
        auto_browse: true,
        auto_send_connection_request: true,
        ..PolicyConfig::default()
    }
}

/// Run host loop iterations on every session until nothing is queued
fn pump(sessions: &mut [&mut Session]) {
    for _ in 0..16 {
        let processed: usize = sessions.iter_mut().map(|s| s.process_pending()).sum();
        if processed == 0 {
            return;
        }
    }
    panic!("sessions did not settle");
}

fn connects(session: &mut Session) -> Vec<TransportId> {
    session
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            TransportEvent::Connect { transport_id, .. } => Some(transport_id),
            _ => None,
        })
        .collect()
}

#[test]
fn test_host_and_clients_connect_automatically() {
    let medium = SimulatedMedium::with_seed(7);
    let mut host = session(&medium, "HOST", "Host", host_policy());
    let mut alice = session(&medium, "ALCE", "Alice", client_policy());
    let mut bob = session(&medium, "BOB1", "Bob", client_policy());

    assert!(host.start_server());
    assert!(alice.start_client());
    assert!(bob.start_client());
    pump(&mut [&mut host, &mut alice, &mut bob]);

    assert_eq!(medium.connection_count(), 2);
    let host_ids = connects(&mut host);
    assert_eq!(host_ids.len(), 2);
    assert!(host_ids.iter().all(|id| *id != TransportId::SERVER));
    assert_eq!(connects(&mut alice), vec![TransportId::SERVER]);
    assert_eq!(connects(&mut bob), vec![TransportId::SERVER]);

    let connected = host.connected_endpoints();
    assert_eq!(
        connected,
        vec![
            (EndpointId::from("ALCE"), "Alice".to_string()),
            (EndpointId::from("BOB1"), "Bob".to_string()),
        ]
    );
    assert_eq!(
        alice.endpoint(&EndpointId::from("HOST")).map(|e| e.status),
        Some(EndpointStatus::Connected)
    );
}

#[test]
fn test_payloads_flow_both_ways() {
    let medium = SimulatedMedium::with_seed(8);
    let mut host = session(&medium, "HOST", "Host", host_policy());
    let mut client = session(&medium, "CLNT", "Client", client_policy());
    host.start_server();
    client.start_client();
    pump(&mut [&mut host, &mut client]);
    let client_on_host = connects(&mut host)[0];
    connects(&mut client);

    NetworkTransport::send(&mut client, TransportId::SERVER, b"ping", NetworkDelivery::Reliable);
    pump(&mut [&mut host, &mut client]);
    match host.poll_event() {
        Some(TransportEvent::Data { transport_id, payload, .. }) => {
            assert_eq!(transport_id, client_on_host);
            assert_eq!(payload, b"ping".to_vec());
        }
        other => panic!("expected data, got {other:?}"),
    }

    NetworkTransport::send(&mut host, client_on_host, b"pong", NetworkDelivery::Unreliable);
    pump(&mut [&mut host, &mut client]);
    assert!(matches!(
        client.poll_event(),
        Some(TransportEvent::Data { transport_id, .. }) if transport_id == TransportId::SERVER
    ));
}

#[test]
fn test_remote_disconnect_reaches_other_side_only() {
    let medium = SimulatedMedium::with_seed(9);
    let mut host = session(&medium, "HOST", "Host", host_policy());
    let mut client = session(&medium, "CLNT", "Client", client_policy());
    host.start_server();
    client.start_client();
    pump(&mut [&mut host, &mut client]);
    let client_on_host = connects(&mut host)[0];
    connects(&mut client);

    host.disconnect_remote_client(client_on_host);
    pump(&mut [&mut host, &mut client]);

    assert_eq!(host.poll_event(), None);
    assert!(matches!(
        client.poll_event(),
        Some(TransportEvent::Disconnect { transport_id, .. }) if transport_id == TransportId::SERVER
    ));
    assert_eq!(medium.connection_count(), 0);
    assert!(host.connected_endpoints().is_empty());
    assert!(client.connected_endpoints().is_empty());
}

#[test]
fn test_manual_negotiation_shows_matching_codes() {
    let medium = SimulatedMedium::with_seed(10);
    let mut host = session(&medium, "HOST", "Host", PolicyConfig::default());
    let mut client = session(&medium, "CLNT", "Client", PolicyConfig::default());
    let mut host_notes = host.take_notification_receiver().expect("receiver");
    let mut client_notes = client.take_notification_receiver().expect("receiver");

    host.start_advertising();
    client.start_browsing();
    pump(&mut [&mut host, &mut client]);
    assert_eq!(
        client_notes.try_recv().ok(),
        Some(PeerNotification::PeerFound {
            endpoint: EndpointId::from("HOST"),
            name: "Host".to_string()
        })
    );

    client.send_connection_request(&EndpointId::from("HOST"));
    pump(&mut [&mut host, &mut client]);

    let host_code = match host_notes.try_recv().ok() {
        Some(PeerNotification::ConnectionRequestReceived { auth_code, name, .. }) => {
            assert_eq!(name, "Client");
            auth_code
        }
        other => panic!("unexpected {other:?}"),
    };
    let client_code = match client_notes.try_recv().ok() {
        Some(PeerNotification::ConnectionRequestSent { auth_code, .. }) => auth_code,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(host_code, client_code);
    assert_eq!(host.pending_request_endpoints().len(), 1);
    assert_eq!(client.found_and_pending_endpoints().len(), 1);

    host.approve_connection_request(&EndpointId::from("CLNT"));
    pump(&mut [&mut host, &mut client]);
    assert_eq!(medium.connection_count(), 0);

    client.approve_connection_request(&EndpointId::from("HOST"));
    pump(&mut [&mut host, &mut client]);
    assert_eq!(medium.connection_count(), 1);
    assert_eq!(connects(&mut host).len(), 1);
    assert_eq!(connects(&mut client), vec![TransportId::SERVER]);
}

#[test]
fn test_rejection_removes_request_on_both_sides() {
    let medium = SimulatedMedium::with_seed(11);
    let mut host = session(&medium, "HOST", "Host", PolicyConfig::default());
    let mut client = session(&medium, "CLNT", "Client", PolicyConfig::default());
    host.start_advertising();
    client.start_browsing();
    pump(&mut [&mut host, &mut client]);
    client.send_connection_request(&EndpointId::from("HOST"));
    pump(&mut [&mut host, &mut client]);

    host.reject_connection_request(&EndpointId::from("CLNT"));
    pump(&mut [&mut host, &mut client]);

    assert!(host.endpoint(&EndpointId::from("CLNT")).is_none());
    assert!(client.endpoint(&EndpointId::from("HOST")).is_none());
    assert_eq!(host.poll_event(), None);
    assert_eq!(client.poll_event(), None);
}

#[test]
fn test_advertiser_stopping_is_reported_as_lost() {
    let medium = SimulatedMedium::with_seed(12);
    let mut host = session(&medium, "HOST", "Host", PolicyConfig::default());
    let mut client = session(&medium, "CLNT", "Client", PolicyConfig::default());
    host.start_advertising();
    client.start_browsing();
    pump(&mut [&mut host, &mut client]);
    assert_eq!(client.found_endpoints().len(), 1);

    host.stop_advertising();
    pump(&mut [&mut host, &mut client]);
    assert!(client.found_endpoints().is_empty());
    assert!(client.all_endpoints().is_empty());
}

#[test]
fn test_host_shutdown_disconnects_clients() {
    let medium = SimulatedMedium::with_seed(13);
    let mut host = session(&medium, "HOST", "Host", host_policy());
    let mut client = session(&medium, "CLNT", "Client", client_policy());
    host.start_server();
    client.start_client();
    pump(&mut [&mut host, &mut client]);
    connects(&mut host);
    connects(&mut client);

    NetworkTransport::shutdown(&mut host);
    pump(&mut [&mut host, &mut client]);

    assert!(!host.is_initialized());
    assert_eq!(host.poll_event(), None);
    assert!(matches!(
        client.poll_event(),
        Some(TransportEvent::Disconnect { transport_id, .. }) if transport_id == TransportId::SERVER
    ));
    assert!(client.all_endpoints().is_empty());
}

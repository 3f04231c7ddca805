//! Simulated host/client demo
//!
//! One host advertises and auto-approves; every client browses and
//! auto-requests. Once a client sees the host on the well-known server id it
//! plays ping/pong rounds, measuring the round trip on a shared clock. All
//! sessions are pumped from a single host loop driven by a tokio interval.

use std::time::Duration;

use nearby_core::{MonotonicTimeSource, NearbyConfig, TimeSource};
use nearby_runtime::{
    NearbySession, NetworkDelivery, NetworkTransport, NotificationReceiver, PeerNotification,
    PolicyConfig, SessionBuilder, SessionSnapshot, SimulatedMedium, TransportEvent, TransportId,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{CliError, Result};

type Session = NearbySession<MonotonicTimeSource>;

// ----------------------------------------------------------------------------
// Ping/Pong Payloads
// ----------------------------------------------------------------------------

const PING_TAG: u8 = 0x01;
const PONG_TAG: u8 = 0x02;
const PROBE_LEN: usize = 9;

/// Payloads exchanged between the host and its clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Ping { sent_at: u64 },
    Pong { sent_at: u64 },
}

impl Probe {
    /// Tag byte followed by the big-endian send time in milliseconds
    pub fn encode(self) -> Vec<u8> {
        let (tag, sent_at) = match self {
            Probe::Ping { sent_at } => (PING_TAG, sent_at),
            Probe::Pong { sent_at } => (PONG_TAG, sent_at),
        };
        let mut bytes = Vec::with_capacity(PROBE_LEN);
        bytes.push(tag);
        bytes.extend_from_slice(&sent_at.to_be_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != PROBE_LEN {
            return None;
        }
        let mut millis = [0u8; 8];
        millis.copy_from_slice(&bytes[1..]);
        let sent_at = u64::from_be_bytes(millis);
        match bytes[0] {
            PING_TAG => Some(Probe::Ping { sent_at }),
            PONG_TAG => Some(Probe::Pong { sent_at }),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Options and Report
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct DemoOptions {
    pub clients: usize,
    pub rounds: u32,
    pub tick: Duration,
    pub seed: Option<u64>,
}

impl DemoOptions {
    /// Loop iterations allowed before giving up
    fn max_ticks(&self) -> u32 {
        100 + self.rounds.saturating_mul(10) + self.clients as u32 * 10
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientReport {
    pub nickname: String,
    pub round_trips_ms: Vec<u64>,
}

impl ClientReport {
    pub fn average_rtt_ms(&self) -> Option<f64> {
        if self.round_trips_ms.is_empty() {
            return None;
        }
        let total: u64 = self.round_trips_ms.iter().sum();
        Some(total as f64 / self.round_trips_ms.len() as f64)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub ticks: u32,
    pub host: SessionSnapshot,
    pub clients: Vec<ClientReport>,
    pub client_snapshots: Vec<SessionSnapshot>,
}

// ----------------------------------------------------------------------------
// Demo Participants
// ----------------------------------------------------------------------------

struct Client {
    nickname: String,
    session: Session,
    connected: bool,
    outstanding: Option<u64>,
    round_trips_ms: Vec<u64>,
}

impl Client {
    fn is_done(&self, rounds: u32) -> bool {
        self.round_trips_ms.len() >= rounds as usize
    }

    fn handle_events(&mut self, clock: &MonotonicTimeSource) {
        for event in self.session.drain_events() {
            match event {
                TransportEvent::Connect { transport_id, .. } => {
                    info!("{} joined host on id {}", self.nickname, transport_id.as_u64());
                    self.connected = transport_id == TransportId::SERVER;
                }
                TransportEvent::Disconnect { .. } => {
                    warn!("{} lost the host", self.nickname);
                    self.connected = false;
                    self.outstanding = None;
                }
                TransportEvent::Data { payload, .. } => match Probe::decode(&payload) {
                    Some(Probe::Pong { sent_at }) if self.outstanding == Some(sent_at) => {
                        let rtt = clock.now().as_millis().saturating_sub(sent_at);
                        debug!("{} round trip {} ms", self.nickname, rtt);
                        self.round_trips_ms.push(rtt);
                        self.outstanding = None;
                    }
                    _ => debug!("{} ignored payload {}", self.nickname, hex::encode(&payload)),
                },
            }
        }
    }

    fn maybe_ping(&mut self, clock: &MonotonicTimeSource, rounds: u32) {
        if !self.connected || self.outstanding.is_some() || self.is_done(rounds) {
            return;
        }
        let sent_at = clock.now().as_millis();
        let ping = Probe::Ping { sent_at }.encode();
        NetworkTransport::send(&mut self.session, TransportId::SERVER, &ping, NetworkDelivery::Reliable);
        self.outstanding = Some(sent_at);
    }
}

/// Answer every ping with a pong carrying the same send time
fn serve_host(host: &mut Session) {
    for event in host.drain_events() {
        match event {
            TransportEvent::Connect { transport_id, .. } => {
                info!("Host accepted client on id {}", transport_id.as_u64());
            }
            TransportEvent::Disconnect { transport_id, .. } => {
                info!("Host lost client on id {}", transport_id.as_u64());
            }
            TransportEvent::Data {
                transport_id,
                payload,
                ..
            } => {
                if let Some(Probe::Ping { sent_at }) = Probe::decode(&payload) {
                    let pong = Probe::Pong { sent_at }.encode();
                    NetworkTransport::send(host, transport_id, &pong, NetworkDelivery::Reliable);
                }
            }
        }
    }
}

/// One line describing a notification for the console
pub fn describe(notification: &PeerNotification) -> String {
    match notification {
        PeerNotification::PeerFound { endpoint, name } => format!("found {name} ({endpoint})"),
        PeerNotification::PeerLost { endpoint, name } => format!("lost {name} ({endpoint})"),
        PeerNotification::ConnectionRequestReceived {
            endpoint,
            name,
            auth_code,
        } => format!("request from {name} ({endpoint}), code {auth_code}"),
        PeerNotification::ConnectionRequestSent {
            endpoint,
            name,
            auth_code,
        } => format!("request to {name} ({endpoint}), code {auth_code}"),
        PeerNotification::ConnectionApproved { endpoint } => format!("approved {endpoint}"),
        PeerNotification::ConnectingWithPeer { endpoint } => format!("connecting with {endpoint}"),
    }
}

fn spawn_notification_printer(label: String, mut notifications: NotificationReceiver) {
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            info!("[{}] {}", label, describe(&notification));
        }
    });
}

// ----------------------------------------------------------------------------
// Demo Loop
// ----------------------------------------------------------------------------

/// Run the demo until every client finished its rounds
pub async fn run(config: NearbyConfig, options: DemoOptions) -> Result<DemoReport> {
    if options.clients == 0 {
        return Err(CliError::Demo("at least one client is required".to_string()));
    }

    let medium = options
        .seed
        .map(SimulatedMedium::with_seed)
        .unwrap_or_default();
    let clock = MonotonicTimeSource::new();

    let host_policy = PolicyConfig {
        auto_advertise: true,
        auto_approve_connection_request: true,
        ..PolicyConfig::default()
    };
    let client_policy = PolicyConfig {
        auto_browse: true,
        auto_send_connection_request: true,
        ..PolicyConfig::default()
    };

    let mut host = SessionBuilder::new()
        .with_config(config.clone())
        .with_policy(host_policy)
        .nickname("Host")
        .build_and_initialize(|callbacks| medium.attach(callbacks))?;
    if let Some(notifications) = host.take_notification_receiver() {
        spawn_notification_printer("Host".to_string(), notifications);
    }

    let mut clients = Vec::with_capacity(options.clients);
    for n in 1..=options.clients {
        let nickname = format!("Client-{n}");
        let mut session = SessionBuilder::new()
            .with_config(config.clone())
            .with_policy(client_policy)
            .nickname(nickname.clone())
            .build_and_initialize(|callbacks| medium.attach(callbacks))?;
        if let Some(notifications) = session.take_notification_receiver() {
            spawn_notification_printer(nickname.clone(), notifications);
        }
        clients.push(Client {
            nickname,
            session,
            connected: false,
            outstanding: None,
            round_trips_ms: Vec::new(),
        });
    }

    if !host.start_server() {
        return Err(CliError::Demo("host failed to start".to_string()));
    }
    for client in &mut clients {
        if !client.session.start_client() {
            return Err(CliError::Demo(format!("{} failed to start", client.nickname)));
        }
    }

    let mut ticker = tokio::time::interval(options.tick);
    let mut ticks = 0;
    while !clients.iter().all(|c| c.is_done(options.rounds)) {
        if ticks >= options.max_ticks() {
            return Err(CliError::Demo(format!(
                "clients did not finish after {ticks} ticks"
            )));
        }
        ticker.tick().await;
        ticks += 1;

        host.process_pending();
        serve_host(&mut host);
        for client in &mut clients {
            client.session.process_pending();
            client.handle_events(&clock);
            client.maybe_ping(&clock, options.rounds);
        }
    }
    info!("All {} clients finished after {} ticks", clients.len(), ticks);

    let host_snapshot = host.snapshot();
    let client_snapshots = clients.iter().map(|c| c.session.snapshot()).collect();
    for client in &mut clients {
        NetworkTransport::shutdown(&mut client.session);
    }
    NetworkTransport::shutdown(&mut host);

    Ok(DemoReport {
        ticks,
        host: host_snapshot,
        clients: clients
            .into_iter()
            .map(|c| ClientReport {
                nickname: c.nickname,
                round_trips_ms: c.round_trips_ms,
            })
            .collect(),
        client_snapshots,
    })
}

/// Human-readable summary of a finished demo
pub fn summarize(report: &DemoReport) -> String {
    let mut lines = vec![format!(
        "Host connected to {} client(s) in {} ticks",
        report
            .host
            .endpoints
            .iter()
            .filter(|e| e.is_connected())
            .count(),
        report.ticks
    )];
    for client in &report.clients {
        let average = client
            .average_rtt_ms()
            .map(|avg| format!("{avg:.1} ms"))
            .unwrap_or_else(|| "n/a".to_string());
        lines.push(format!(
            "  {}: {} round trip(s), average {}",
            client.nickname,
            client.round_trips_ms.len(),
            average
        ));
    }
    lines.join("\n")
}

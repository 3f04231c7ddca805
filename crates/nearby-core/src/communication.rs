//! Communication types between the engine, the state machine and the host
//!
//! Four directions of traffic:
//! - [`EngineEvent`]: engine callbacks (Engine → State Machine)
//! - [`Effect`]: engine calls decided by the state machine (State Machine → Engine)
//! - [`TransportEvent`]: connection-level events (State Machine → Network Layer)
//! - [`PeerNotification`]: lifecycle notifications (State Machine → UI)

use serde::{Deserialize, Serialize};

use crate::types::{
    AuthStatus, ConnectionStrategy, ConnectionType, EndpointId, Timestamp, TransportId,
};

// ----------------------------------------------------------------------------
// Engine Events (Engine → State Machine)
// ----------------------------------------------------------------------------

/// The six asynchronous engine callbacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Discovery saw an advertiser with our service id
    PeerFound { endpoint: EndpointId, name: String },
    /// A previously found advertiser disappeared
    PeerLost { endpoint: EndpointId },
    /// Connection negotiation began; digits shown to both sides
    ConnectionInitiated {
        endpoint: EndpointId,
        name: String,
        auth_code: String,
        auth_status: AuthStatus,
    },
    /// Both sides accepted
    ConnectionEstablished { endpoint: EndpointId },
    /// Connection dropped, rejected or failed
    ConnectionDisconnected { endpoint: EndpointId },
    /// Bytes from a connected endpoint
    PayloadReceived { endpoint: EndpointId, payload: Vec<u8> },
}

impl EngineEvent {
    /// Endpoint the callback refers to
    pub fn endpoint(&self) -> &EndpointId {
        match self {
            EngineEvent::PeerFound { endpoint, .. }
            | EngineEvent::PeerLost { endpoint }
            | EngineEvent::ConnectionInitiated { endpoint, .. }
            | EngineEvent::ConnectionEstablished { endpoint }
            | EngineEvent::ConnectionDisconnected { endpoint }
            | EngineEvent::PayloadReceived { endpoint, .. } => endpoint,
        }
    }

    /// Short label for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::PeerFound { .. } => "peer_found",
            EngineEvent::PeerLost { .. } => "peer_lost",
            EngineEvent::ConnectionInitiated { .. } => "connection_initiated",
            EngineEvent::ConnectionEstablished { .. } => "connection_established",
            EngineEvent::ConnectionDisconnected { .. } => "connection_disconnected",
            EngineEvent::PayloadReceived { .. } => "payload_received",
        }
    }
}

// ----------------------------------------------------------------------------
// Effects (State Machine → Engine)
// ----------------------------------------------------------------------------

/// Engine call requested by a state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    StartAdvertising {
        name: String,
        service_id: String,
        connection_type: ConnectionType,
        low_power: bool,
        strategy: ConnectionStrategy,
    },
    StopAdvertising,
    StartDiscovery {
        service_id: String,
        low_power: bool,
        strategy: ConnectionStrategy,
    },
    StopDiscovery,
    RequestConnection { name: String, endpoint: EndpointId },
    AcceptConnection { endpoint: EndpointId },
    RejectConnection { endpoint: EndpointId },
    Disconnect { endpoint: EndpointId },
    SendBytes { endpoint: EndpointId, payload: Vec<u8> },
    Shutdown,
}

impl Effect {
    /// Engine operation name for log lines and errors
    pub fn operation(&self) -> &'static str {
        match self {
            Effect::StartAdvertising { .. } => "start_advertising",
            Effect::StopAdvertising => "stop_advertising",
            Effect::StartDiscovery { .. } => "start_discovery",
            Effect::StopDiscovery => "stop_discovery",
            Effect::RequestConnection { .. } => "request_connection",
            Effect::AcceptConnection { .. } => "accept_connection",
            Effect::RejectConnection { .. } => "reject_connection",
            Effect::Disconnect { .. } => "disconnect",
            Effect::SendBytes { .. } => "send_bytes",
            Effect::Shutdown => "shutdown",
        }
    }
}

// ----------------------------------------------------------------------------
// Transport Events (State Machine → Network Layer)
// ----------------------------------------------------------------------------

/// Connection-level event for the consuming network layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportEvent {
    Connect {
        transport_id: TransportId,
        timestamp: Timestamp,
    },
    Disconnect {
        transport_id: TransportId,
        timestamp: Timestamp,
    },
    Data {
        transport_id: TransportId,
        payload: Vec<u8>,
        timestamp: Timestamp,
    },
}

impl TransportEvent {
    pub fn transport_id(&self) -> TransportId {
        match self {
            TransportEvent::Connect { transport_id, .. }
            | TransportEvent::Disconnect { transport_id, .. }
            | TransportEvent::Data { transport_id, .. } => *transport_id,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            TransportEvent::Connect { timestamp, .. }
            | TransportEvent::Disconnect { timestamp, .. }
            | TransportEvent::Data { timestamp, .. } => *timestamp,
        }
    }
}

// ----------------------------------------------------------------------------
// Peer Notifications (State Machine → UI)
// ----------------------------------------------------------------------------

/// Lifecycle notification for UI observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerNotification {
    /// Browsing found an advertiser
    PeerFound { endpoint: EndpointId, name: String },
    /// A found advertiser went away
    PeerLost { endpoint: EndpointId, name: String },
    /// As advertiser, a browser asked to connect
    ConnectionRequestReceived {
        endpoint: EndpointId,
        name: String,
        auth_code: String,
    },
    /// As browser, our request reached the advertiser
    ConnectionRequestSent {
        endpoint: EndpointId,
        name: String,
        auth_code: String,
    },
    /// As advertiser, we approved a request
    ConnectionApproved { endpoint: EndpointId },
    /// Negotiation with the endpoint progressed
    ConnectingWithPeer { endpoint: EndpointId },
}

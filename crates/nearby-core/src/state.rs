//! Connection state machine
//!
//! [`SessionState`] owns the endpoint registry and identifier map and applies
//! every engine callback and host command to them. It never calls the engine
//! or the network layer directly: each step returns a [`Transition`] listing
//! the engine calls to issue, the transport events to emit and the UI
//! notifications to publish, in that order of commitment.
//!
//! Local roles (advertising, browsing) are independent axes. Per endpoint the
//! lifecycle is found -> requesting/requested -> connected -> removed, with
//! loss, rejection and disconnection all ending in removal.

use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::communication::{Effect, EngineEvent, PeerNotification, TransportEvent};
use crate::config::{PolicyConfig, SessionConfig};
use crate::errors::{NearbyError, NearbyResult};
use crate::ids::IdentifierMap;
use crate::registry::{Endpoint, EndpointRegistry, PendingRequest};
use crate::types::{
    AuthStatus, ConnectionStrategy, ConnectionType, EndpointId, EndpointStatus, TimeSource,
    TransportId,
};

/// Bytes of payload shown in trace previews
const PAYLOAD_PREVIEW_LEN: usize = 16;

// ----------------------------------------------------------------------------
// Local Session
// ----------------------------------------------------------------------------

/// Local instance parameters, immutable once initialized except for role flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSession {
    pub service_id: String,
    pub nickname: String,
    pub connection_type: ConnectionType,
    pub low_power: bool,
    pub strategy: ConnectionStrategy,
    pub is_advertising: bool,
    pub is_browsing: bool,
}

impl LocalSession {
    fn from_config(config: &SessionConfig) -> Self {
        Self {
            service_id: config.service_id.clone(),
            nickname: config.nickname.clone(),
            connection_type: config.connection_type,
            low_power: config.low_power,
            strategy: config.strategy,
            is_advertising: false,
            is_browsing: false,
        }
    }

    /// Status of the local instance
    pub fn status(&self) -> EndpointStatus {
        match (self.is_advertising, self.is_browsing) {
            (true, _) => EndpointStatus::Advertising,
            (false, true) => EndpointStatus::Discovering,
            (false, false) => EndpointStatus::Idle,
        }
    }
}

// ----------------------------------------------------------------------------
// Transition
// ----------------------------------------------------------------------------

/// Outcome of one state machine step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// Engine calls to issue, in order
    pub effects: SmallVec<[Effect; 2]>,
    /// Events for the consuming network layer
    pub transport_events: SmallVec<[TransportEvent; 2]>,
    /// Notifications for UI observers
    pub notifications: SmallVec<[PeerNotification; 2]>,
}

impl Transition {
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.transport_events.is_empty() && self.notifications.is_empty()
    }

    fn effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn absorb(&mut self, other: Transition) {
        self.effects.extend(other.effects);
        self.transport_events.extend(other.transport_events);
        self.notifications.extend(other.notifications);
    }
}

/// Which side of a negotiation the local instance plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Advertiser,
    Browser,
}

/// Counters over the life of the state machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub events_processed: u64,
    /// Callbacks absorbed because they referenced an unknown endpoint
    pub events_ignored: u64,
    pub connections_established: u64,
    pub payloads_received: u64,
    pub payloads_sent: u64,
    /// Sends and disconnects addressed to unknown transport ids
    pub commands_dropped: u64,
}

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Endpoint registry, identifier map and local roles of one session
#[derive(Debug)]
pub struct SessionState<T: TimeSource> {
    local: Option<LocalSession>,
    policy: PolicyConfig,
    registry: EndpointRegistry,
    ids: IdentifierMap,
    time_source: T,
    stats: SessionStats,
}

impl<T: TimeSource> SessionState<T> {
    pub fn new(policy: PolicyConfig, time_source: T) -> Self {
        Self {
            local: None,
            policy,
            registry: EndpointRegistry::new(),
            ids: IdentifierMap::new(),
            time_source,
            stats: SessionStats::default(),
        }
    }

    /// Snapshot the session parameters; fails if already initialized
    pub fn initialize(&mut self, config: &SessionConfig) -> NearbyResult<()> {
        config.validate()?;
        if self.local.is_some() {
            return Err(NearbyError::AlreadyInitialized);
        }
        info!(service_id = %config.service_id, nickname = %config.nickname, "Session initialized");
        self.local = Some(LocalSession::from_config(config));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.local.is_some()
    }

    pub fn local(&self) -> Option<&LocalSession> {
        self.local.as_ref()
    }

    pub fn is_advertising(&self) -> bool {
        self.local.as_ref().is_some_and(|local| local.is_advertising)
    }

    pub fn is_browsing(&self) -> bool {
        self.local.as_ref().is_some_and(|local| local.is_browsing)
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: PolicyConfig) {
        self.policy = policy;
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn ids(&self) -> &IdentifierMap {
        &self.ids
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    // ------------------------------------------------------------------------
    // Local Role Commands
    // ------------------------------------------------------------------------

    /// Begin advertising; no-op while already advertising
    ///
    /// Clears the previous advertise cycle's unconnected requests.
    pub fn start_advertising(&mut self) -> NearbyResult<Transition> {
        let local = self.local.as_ref().ok_or(NearbyError::NotInitialized)?;
        if local.is_advertising {
            return Ok(Transition::default());
        }

        let effect = Effect::StartAdvertising {
            name: local.nickname.clone(),
            service_id: local.service_id.clone(),
            connection_type: local.connection_type,
            low_power: local.low_power,
            strategy: local.strategy,
        };
        self.clear_unconnected(&[EndpointStatus::Requesting]);
        self.set_advertising(true);
        info!("Advertising started");
        Ok(Transition::default().effect(effect))
    }

    pub fn stop_advertising(&mut self) -> NearbyResult<Transition> {
        let local = self.local.as_ref().ok_or(NearbyError::NotInitialized)?;
        if !local.is_advertising {
            return Ok(Transition::default());
        }
        self.set_advertising(false);
        info!("Advertising stopped");
        Ok(Transition::default().effect(Effect::StopAdvertising))
    }

    /// Begin discovery; no-op while already browsing
    ///
    /// Clears the previous browse cycle's found peers and unconnected requests.
    pub fn start_browsing(&mut self) -> NearbyResult<Transition> {
        let local = self.local.as_ref().ok_or(NearbyError::NotInitialized)?;
        if local.is_browsing {
            return Ok(Transition::default());
        }

        let effect = Effect::StartDiscovery {
            service_id: local.service_id.clone(),
            low_power: local.low_power,
            strategy: local.strategy,
        };
        self.clear_unconnected(&[EndpointStatus::Advertising, EndpointStatus::Requested]);
        self.set_browsing(true);
        info!("Browsing started");
        Ok(Transition::default().effect(effect))
    }

    /// Stop discovery and forget found peers that never negotiated
    pub fn stop_browsing(&mut self) -> NearbyResult<Transition> {
        let local = self.local.as_ref().ok_or(NearbyError::NotInitialized)?;
        if !local.is_browsing {
            return Ok(Transition::default());
        }
        self.clear_unconnected(&[EndpointStatus::Advertising]);
        self.set_browsing(false);
        info!("Browsing stopped");
        Ok(Transition::default().effect(Effect::StopDiscovery))
    }

    // ------------------------------------------------------------------------
    // Negotiation Commands
    // ------------------------------------------------------------------------

    /// Ask a found peer for a connection
    pub fn send_connection_request(&mut self, endpoint: &EndpointId) -> NearbyResult<Transition> {
        let local = self.local.as_ref().ok_or(NearbyError::NotInitialized)?;
        if !self.registry.contains(endpoint) {
            return Err(NearbyError::UnknownEndpoint(endpoint.clone()));
        }

        let effect = Effect::RequestConnection {
            name: local.nickname.clone(),
            endpoint: endpoint.clone(),
        };
        self.registry.set_status(endpoint, EndpointStatus::Requested);
        debug!(%endpoint, "Connection request sent");
        Ok(Transition::default().effect(effect))
    }

    /// Accept a pending connection
    pub fn approve_connection_request(&mut self, endpoint: &EndpointId) -> NearbyResult<Transition> {
        if self.local.is_none() {
            return Err(NearbyError::NotInitialized);
        }
        if !self.registry.contains(endpoint) {
            return Err(NearbyError::UnknownEndpoint(endpoint.clone()));
        }

        debug!(%endpoint, "Connection request approved");
        let mut transition = Transition::default().effect(Effect::AcceptConnection {
            endpoint: endpoint.clone(),
        });
        transition
            .notifications
            .push(PeerNotification::ConnectionApproved {
                endpoint: endpoint.clone(),
            });
        Ok(transition)
    }

    /// Decline a pending connection; the engine reports the disconnect later
    pub fn reject_connection_request(&mut self, endpoint: &EndpointId) -> NearbyResult<Transition> {
        if self.local.is_none() {
            return Err(NearbyError::NotInitialized);
        }
        if !self.registry.contains(endpoint) {
            return Err(NearbyError::UnknownEndpoint(endpoint.clone()));
        }

        self.registry.take_pending_auth_code(endpoint);
        debug!(%endpoint, "Connection request rejected");
        Ok(Transition::default().effect(Effect::RejectConnection {
            endpoint: endpoint.clone(),
        }))
    }

    // ------------------------------------------------------------------------
    // Transport Commands
    // ------------------------------------------------------------------------

    /// Send bytes to a connected endpoint; unknown ids are dropped
    pub fn send(&mut self, transport_id: TransportId, payload: &[u8]) -> Transition {
        let Some(endpoint) = self.ids.lookup(transport_id).cloned() else {
            warn!(%transport_id, len = payload.len(), "Dropping send to unknown transport id");
            self.stats.commands_dropped += 1;
            return Transition::default();
        };

        self.stats.payloads_sent += 1;
        Transition::default().effect(Effect::SendBytes {
            endpoint,
            payload: payload.to_vec(),
        })
    }

    /// Disconnect one remote endpoint by transport id
    ///
    /// The endpoint is forgotten immediately; no Disconnect event is emitted
    /// for a locally initiated disconnect.
    pub fn disconnect(&mut self, transport_id: TransportId) -> Transition {
        let Some(endpoint) = self.ids.lookup(transport_id).cloned() else {
            warn!(%transport_id, "Ignoring disconnect of unknown transport id");
            self.stats.commands_dropped += 1;
            return Transition::default();
        };

        info!(%endpoint, %transport_id, "Disconnecting endpoint");
        self.forget(&endpoint);
        Transition::default().effect(Effect::Disconnect { endpoint })
    }

    /// Disconnect every connected endpoint
    pub fn disconnect_all(&mut self) -> Transition {
        let mut transition = Transition::default();
        let connected: Vec<TransportId> = self
            .registry
            .iter()
            .filter(|endpoint| endpoint.is_connected())
            .filter_map(|endpoint| endpoint.transport_id)
            .collect();
        for transport_id in connected {
            transition.absorb(self.disconnect(transport_id));
        }
        transition
    }

    /// Shut the engine down and drop all session state; idempotent
    pub fn shutdown(&mut self) -> Transition {
        if self.local.take().is_none() {
            debug!("Shutdown requested on uninitialized session");
            return Transition::default();
        }
        info!(endpoints = self.registry.len(), "Session shut down");
        self.registry.clear();
        self.ids.clear();
        Transition::default().effect(Effect::Shutdown)
    }

    // ------------------------------------------------------------------------
    // Engine Events
    // ------------------------------------------------------------------------

    /// Apply one engine callback
    pub fn handle_event(&mut self, event: EngineEvent) -> Transition {
        self.stats.events_processed += 1;
        if self.local.is_none() {
            debug!(kind = event.kind(), endpoint = %event.endpoint(), "Ignoring callback outside a session");
            self.stats.events_ignored += 1;
            return Transition::default();
        }

        match event {
            EngineEvent::PeerFound { endpoint, name } => self.on_peer_found(endpoint, name),
            EngineEvent::PeerLost { endpoint } => self.on_peer_lost(endpoint),
            EngineEvent::ConnectionInitiated {
                endpoint,
                name,
                auth_code,
                auth_status,
            } => self.on_connection_initiated(endpoint, name, auth_code, auth_status),
            EngineEvent::ConnectionEstablished { endpoint } => {
                self.on_connection_established(endpoint)
            }
            EngineEvent::ConnectionDisconnected { endpoint } => {
                self.on_connection_disconnected(endpoint)
            }
            EngineEvent::PayloadReceived { endpoint, payload } => {
                self.on_payload_received(endpoint, payload)
            }
        }
    }

    fn on_peer_found(&mut self, endpoint: EndpointId, name: String) -> Transition {
        if self.registry.contains(&endpoint) {
            debug!(%endpoint, %name, "Rediscovered known endpoint");
            self.registry.set_name(&endpoint, &name);
            return Transition::default();
        }

        self.registry
            .upsert(&endpoint, &name, EndpointStatus::Advertising);
        debug!(%endpoint, %name, "Peer found");

        let mut transition = Transition::default();
        transition.notifications.push(PeerNotification::PeerFound {
            endpoint: endpoint.clone(),
            name,
        });

        if self.policy.auto_send_connection_request {
            match self.send_connection_request(&endpoint) {
                Ok(request) => transition.absorb(request),
                Err(error) => warn!(%endpoint, %error, "Automatic connection request failed"),
            }
        }
        transition
    }

    fn on_peer_lost(&mut self, endpoint: EndpointId) -> Transition {
        let Some(name) = self.registry.name(&endpoint).map(str::to_string) else {
            warn!(%endpoint, "Lost unknown endpoint");
            self.stats.events_ignored += 1;
            return Transition::default();
        };

        debug!(%endpoint, %name, "Peer lost");
        let mut transition = Transition::default();
        transition.notifications.push(PeerNotification::PeerLost {
            endpoint: endpoint.clone(),
            name,
        });
        if let Some(transport_id) = self.forget(&endpoint) {
            transition
                .transport_events
                .push(self.disconnect_event(transport_id));
        }
        transition
    }

    fn on_connection_initiated(
        &mut self,
        endpoint: EndpointId,
        name: String,
        auth_code: String,
        auth_status: AuthStatus,
    ) -> Transition {
        let mut transition = Transition::default();

        if self.registry.status(&endpoint) == Some(EndpointStatus::Connected) {
            warn!(%endpoint, "Connection initiated for already connected endpoint");
            self.stats.events_ignored += 1;
            return transition;
        }

        if auth_status.is_pending() {
            let role = self.negotiation_role(&endpoint);
            let status = match role {
                Role::Advertiser => EndpointStatus::Requesting,
                Role::Browser => EndpointStatus::Requested,
            };

            self.registry.upsert(&endpoint, &name, status);
            self.registry.set_pending_auth_code(&endpoint, &auth_code);
            debug!(%endpoint, %name, %status, "Connection initiated");

            let notification = match role {
                Role::Advertiser => PeerNotification::ConnectionRequestReceived {
                    endpoint: endpoint.clone(),
                    name,
                    auth_code,
                },
                Role::Browser => PeerNotification::ConnectionRequestSent {
                    endpoint: endpoint.clone(),
                    name,
                    auth_code,
                },
            };
            transition.notifications.push(notification);

            let auto_accept = match role {
                Role::Advertiser => self.policy.auto_approve_connection_request,
                Role::Browser => self.policy.auto_send_connection_request,
            };
            if auto_accept {
                match self.approve_connection_request(&endpoint) {
                    Ok(approval) => transition.absorb(approval),
                    Err(error) => warn!(%endpoint, %error, "Automatic approval failed"),
                }
            }
        } else if self.registry.take_pending_auth_code(&endpoint).is_none() {
            warn!(%endpoint, status = auth_status.as_raw(), "No pending auth code for endpoint");
        }

        transition
            .notifications
            .push(PeerNotification::ConnectingWithPeer { endpoint });
        transition
    }

    fn on_connection_established(&mut self, endpoint: EndpointId) -> Transition {
        let Some(status) = self.registry.status(&endpoint) else {
            warn!(%endpoint, "Connection established with unknown endpoint");
            self.stats.events_ignored += 1;
            return Transition::default();
        };
        if status == EndpointStatus::Connected {
            debug!(%endpoint, "Duplicate connection established");
            return Transition::default();
        }

        // Peers we requested are hosts from the network layer's point of view
        let transport_id = match status {
            EndpointStatus::Requested => self.ids.register_server(&endpoint),
            _ => self.ids.register(&endpoint),
        };
        self.registry.set_transport_id(&endpoint, transport_id);
        self.registry.take_pending_auth_code(&endpoint);
        self.registry.set_status(&endpoint, EndpointStatus::Connected);
        self.stats.connections_established += 1;
        info!(%endpoint, %transport_id, "Connection established");

        let mut transition = Transition::default();
        transition.transport_events.push(TransportEvent::Connect {
            transport_id,
            timestamp: self.time_source.now(),
        });
        transition
    }

    fn on_connection_disconnected(&mut self, endpoint: EndpointId) -> Transition {
        let mut transition = Transition::default();
        match self.forget(&endpoint) {
            Some(transport_id) => {
                info!(%endpoint, %transport_id, "Connection disconnected");
                transition
                    .transport_events
                    .push(self.disconnect_event(transport_id));
            }
            None => debug!(%endpoint, "Disconnected endpoint had no transport id"),
        }
        transition
    }

    fn on_payload_received(&mut self, endpoint: EndpointId, payload: Vec<u8>) -> Transition {
        let Some(transport_id) = self.ids.transport_id(&endpoint) else {
            debug!(%endpoint, len = payload.len(), "Dropping payload from unmapped endpoint");
            self.stats.events_ignored += 1;
            return Transition::default();
        };

        debug!(
            %endpoint,
            %transport_id,
            len = payload.len(),
            preview = %hex::encode(&payload[..payload.len().min(PAYLOAD_PREVIEW_LEN)]),
            "Payload received"
        );
        self.stats.payloads_received += 1;
        let mut transition = Transition::default();
        transition.transport_events.push(TransportEvent::Data {
            transport_id,
            payload,
            timestamp: self.time_source.now(),
        });
        transition
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn endpoint(&self, endpoint: &EndpointId) -> Option<&Endpoint> {
        self.registry.get(endpoint)
    }

    /// Endpoint behind a transport id
    pub fn endpoint_for(&self, transport_id: TransportId) -> Option<&Endpoint> {
        self.ids
            .lookup(transport_id)
            .and_then(|endpoint| self.registry.get(endpoint))
    }

    pub fn connected_endpoints(&self) -> Vec<(EndpointId, String)> {
        self.registry.query_by_status(&[EndpointStatus::Connected])
    }

    pub fn found_endpoints(&self) -> Vec<(EndpointId, String)> {
        self.registry.query_by_status(EndpointStatus::FOUND)
    }

    pub fn found_and_pending_endpoints(&self) -> Vec<(EndpointId, String)> {
        self.registry
            .query_by_status(EndpointStatus::FOUND_AND_PENDING)
    }

    pub fn pending_request_endpoints(&self) -> Vec<PendingRequest> {
        self.registry.pending_requests()
    }

    pub fn all_endpoints(&self) -> Vec<Endpoint> {
        self.registry.snapshot()
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Only a request we sent pins the browser role; otherwise the local loops decide
    fn negotiation_role(&self, endpoint: &EndpointId) -> Role {
        match self.registry.status(endpoint) {
            Some(EndpointStatus::Requested) => Role::Browser,
            _ if self.is_advertising() => Role::Advertiser,
            _ if self.is_browsing() => Role::Browser,
            _ => Role::Advertiser,
        }
    }

    /// Remove an endpoint and its transport id, returning the id it held
    fn forget(&mut self, endpoint: &EndpointId) -> Option<TransportId> {
        self.registry.remove(endpoint);
        self.ids.remove_endpoint(endpoint)
    }

    fn clear_unconnected(&mut self, statuses: &[EndpointStatus]) {
        let stale: Vec<EndpointId> = self
            .registry
            .query_by_status(statuses)
            .into_iter()
            .map(|(endpoint, _)| endpoint)
            .collect();
        if !stale.is_empty() {
            debug!(count = stale.len(), "Clearing stale endpoints");
        }
        for endpoint in stale {
            self.forget(&endpoint);
        }
    }

    fn set_advertising(&mut self, value: bool) {
        if let Some(local) = self.local.as_mut() {
            local.is_advertising = value;
        }
    }

    fn set_browsing(&mut self, value: bool) {
        if let Some(local) = self.local.as_mut() {
            local.is_browsing = value;
        }
    }

    fn disconnect_event(&self, transport_id: TransportId) -> TransportEvent {
        TransportEvent::Disconnect {
            transport_id,
            timestamp: self.time_source.now(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

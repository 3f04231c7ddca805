//! Session facade
//!
//! [`NearbySession`] owns the connection state machine, the engine and both
//! channels. Host commands are applied immediately; engine callbacks wait in
//! the callback queue until the host calls [`NearbySession::process_pending`]
//! from its main loop. Each resulting [`Transition`] is executed in the same
//! order every time: engine calls, then transport events, then notifications.

use std::collections::VecDeque;

use nearby_core::{
    Endpoint, EndpointId, LocalSession, NearbyConfig, NearbyEngine, NearbyResult,
    PeerNotification, PendingRequest, PolicyConfig, SessionState, SessionStats, TimeSource,
    Transition, TransportEvent, TransportId,
};
use serde::Serialize;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, warn};

use crate::dispatcher::{
    create_callback_channel, create_notification_channel, CallbackReceiver, ChannelStats,
    EngineCallbacks, NonBlockingSend, NotificationReceiver, NotificationSender,
};

// ----------------------------------------------------------------------------
// Session Snapshot
// ----------------------------------------------------------------------------

/// Serializable view of a session for status output
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub nickname: Option<String>,
    pub service_id: Option<String>,
    pub is_advertising: bool,
    pub is_browsing: bool,
    pub endpoints: Vec<Endpoint>,
    pub callbacks_delivered: u64,
    pub callbacks_dropped: u64,
}

// ----------------------------------------------------------------------------
// Nearby Session
// ----------------------------------------------------------------------------

/// One running nearby transport instance
pub struct NearbySession<T: TimeSource> {
    config: NearbyConfig,
    state: SessionState<T>,
    engine: Box<dyn NearbyEngine>,
    callbacks: EngineCallbacks,
    callback_receiver: CallbackReceiver,
    transport_events: VecDeque<TransportEvent>,
    notification_sender: NotificationSender,
    notification_receiver: Option<NotificationReceiver>,
    notification_stats: ChannelStats,
}

impl<T: TimeSource> NearbySession<T> {
    /// Wire a session around an engine built from the callback handle
    pub(crate) fn new<E, F>(config: NearbyConfig, time_source: T, engine_factory: F) -> Self
    where
        E: NearbyEngine + 'static,
        F: FnOnce(EngineCallbacks) -> E,
    {
        let (callbacks, callback_receiver) = create_callback_channel(&config.channels);
        let (notification_sender, notification_receiver) =
            create_notification_channel(&config.channels);
        let engine = engine_factory(callbacks.clone());

        Self {
            state: SessionState::new(config.policy, time_source),
            notification_stats: ChannelStats::new(
                "peer_notifications",
                config.channels.notification_buffer_size,
            ),
            config,
            engine: Box::new(engine),
            callbacks,
            callback_receiver,
            transport_events: VecDeque::new(),
            notification_sender,
            notification_receiver: Some(notification_receiver),
        }
    }

    /// Initialize the engine and snapshot the session parameters
    pub fn initialize(&mut self) -> NearbyResult<()> {
        self.config.validate()?;
        self.engine.initialize()?;
        self.state.initialize(&self.config.session)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    pub fn config(&self) -> &NearbyConfig {
        &self.config
    }

    pub fn local(&self) -> Option<&LocalSession> {
        self.state.local()
    }

    pub fn is_advertising(&self) -> bool {
        self.state.is_advertising()
    }

    pub fn is_browsing(&self) -> bool {
        self.state.is_browsing()
    }

    /// Replace the automation policies; takes effect on the next event
    pub fn set_policy(&mut self, policy: PolicyConfig) {
        self.config.policy = policy;
        self.state.set_policy(policy);
    }

    /// A handle engines (or tests) can use to report events
    pub fn callbacks(&self) -> EngineCallbacks {
        self.callbacks.clone()
    }

    pub fn callback_stats(&self) -> &ChannelStats {
        self.callbacks.stats()
    }

    pub fn notification_stats(&self) -> &ChannelStats {
        &self.notification_stats
    }

    pub fn stats(&self) -> &SessionStats {
        self.state.stats()
    }

    /// Hand the UI its notification stream; available once
    pub fn take_notification_receiver(&mut self) -> Option<NotificationReceiver> {
        self.notification_receiver.take()
    }

    // ------------------------------------------------------------------------
    // Host Loop
    // ------------------------------------------------------------------------

    /// Drain queued engine callbacks in FIFO order
    ///
    /// Call once per host loop iteration. Returns the number of callbacks
    /// applied.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        loop {
            match self.callback_receiver.try_recv() {
                Ok(event) => {
                    let transition = self.state.handle_event(event);
                    self.execute(transition);
                    processed += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Callback queue disconnected");
                    break;
                }
            }
        }
        processed
    }

    /// Next transport event for the network layer
    pub fn poll_event(&mut self) -> Option<TransportEvent> {
        self.transport_events.pop_front()
    }

    /// All queued transport events
    pub fn drain_events(&mut self) -> Vec<TransportEvent> {
        self.transport_events.drain(..).collect()
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    pub fn start_advertising(&mut self) {
        let result = self.state.start_advertising();
        self.execute_result("start_advertising", result);
    }

    pub fn stop_advertising(&mut self) {
        let result = self.state.stop_advertising();
        self.execute_result("stop_advertising", result);
    }

    pub fn start_browsing(&mut self) {
        let result = self.state.start_browsing();
        self.execute_result("start_browsing", result);
    }

    pub fn stop_browsing(&mut self) {
        let result = self.state.stop_browsing();
        self.execute_result("stop_browsing", result);
    }

    pub fn send_connection_request(&mut self, endpoint: &EndpointId) {
        let result = self.state.send_connection_request(endpoint);
        self.execute_result("send_connection_request", result);
    }

    pub fn approve_connection_request(&mut self, endpoint: &EndpointId) {
        let result = self.state.approve_connection_request(endpoint);
        self.execute_result("approve_connection_request", result);
    }

    pub fn reject_connection_request(&mut self, endpoint: &EndpointId) {
        let result = self.state.reject_connection_request(endpoint);
        self.execute_result("reject_connection_request", result);
    }

    /// Send bytes to a connected endpoint; unknown ids are logged and dropped
    pub fn send(&mut self, transport_id: TransportId, payload: &[u8]) {
        let transition = self.state.send(transport_id, payload);
        self.execute(transition);
    }

    /// Disconnect one remote endpoint by transport id
    pub fn disconnect(&mut self, transport_id: TransportId) {
        let transition = self.state.disconnect(transport_id);
        self.execute(transition);
    }

    /// Disconnect every connected endpoint
    pub fn disconnect_all(&mut self) {
        let transition = self.state.disconnect_all();
        self.execute(transition);
    }

    /// Shut the engine down and forget everything; idempotent
    pub fn shutdown(&mut self) {
        let transition = self.state.shutdown();
        self.execute(transition);
        self.transport_events.clear();
        let discarded = self.callback_receiver.discard_pending();
        if discarded > 0 {
            debug!(discarded, "Discarded callbacks queued before shutdown");
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn endpoint(&self, endpoint: &EndpointId) -> Option<&Endpoint> {
        self.state.endpoint(endpoint)
    }

    pub fn endpoint_for(&self, transport_id: TransportId) -> Option<&Endpoint> {
        self.state.endpoint_for(transport_id)
    }

    pub fn transport_id_of(&self, endpoint: &EndpointId) -> Option<TransportId> {
        self.state.ids().transport_id(endpoint)
    }

    pub fn connected_endpoints(&self) -> Vec<(EndpointId, String)> {
        self.state.connected_endpoints()
    }

    pub fn found_endpoints(&self) -> Vec<(EndpointId, String)> {
        self.state.found_endpoints()
    }

    pub fn found_and_pending_endpoints(&self) -> Vec<(EndpointId, String)> {
        self.state.found_and_pending_endpoints()
    }

    pub fn pending_request_endpoints(&self) -> Vec<PendingRequest> {
        self.state.pending_request_endpoints()
    }

    pub fn all_endpoints(&self) -> Vec<Endpoint> {
        self.state.all_endpoints()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let local = self.state.local();
        SessionSnapshot {
            nickname: local.map(|l| l.nickname.clone()),
            service_id: local.map(|l| l.service_id.clone()),
            is_advertising: self.is_advertising(),
            is_browsing: self.is_browsing(),
            endpoints: self.all_endpoints(),
            callbacks_delivered: self.callback_stats().messages_sent(),
            callbacks_dropped: self.callback_stats().messages_dropped(),
        }
    }

    // ------------------------------------------------------------------------
    // Transition Execution
    // ------------------------------------------------------------------------

    fn execute_result(&mut self, command: &'static str, result: NearbyResult<Transition>) {
        match result {
            Ok(transition) => self.execute(transition),
            Err(error) => warn!(command, %error, "Command ignored"),
        }
    }

    fn execute(&mut self, transition: Transition) {
        for effect in &transition.effects {
            if let Err(error) = self.engine.apply(effect) {
                warn!(operation = effect.operation(), %error, "Engine call failed");
            }
        }

        self.transport_events.extend(transition.transport_events);

        for notification in transition.notifications {
            self.publish(notification);
        }
    }

    fn publish(&self, notification: PeerNotification) {
        // Nobody listening is normal for headless hosts
        if self.notification_receiver.is_some() {
            return;
        }
        match self.notification_sender.try_send_non_blocking(notification) {
            Ok(()) => self.notification_stats.record_send_success(),
            Err(error) => {
                self.notification_stats.record_send_dropped();
                debug!(%error, "Peer notification dropped");
            }
        }
    }
}

//! Generic network transport interface
//!
//! The shape a consuming network library expects from any transport:
//! start as server or client, send to a numeric client id, poll
//! connect/data/disconnect events, disconnect peers and shut down.
//! [`NearbySession`] implements it on top of the proximity engine.

use nearby_core::{NearbyResult, NetworkDelivery, TimeSource, TransportEvent, TransportId};
use tracing::{debug, info};

use crate::session::NearbySession;

// ----------------------------------------------------------------------------
// Network Transport Trait
// ----------------------------------------------------------------------------

/// Connection-oriented transport as seen by a network library
pub trait NetworkTransport {
    fn initialize(&mut self) -> NearbyResult<()>;

    /// Begin hosting; returns false when the transport is not initialized
    fn start_server(&mut self) -> bool;

    /// Begin joining; returns false when the transport is not initialized
    fn start_client(&mut self) -> bool;

    fn send(&mut self, client_id: TransportId, payload: &[u8], delivery: NetworkDelivery);

    /// Next connect/data/disconnect event, if any
    ///
    /// Applies engine callbacks still waiting in the queue before reporting
    /// that nothing is pending, so a network layer can drive the transport
    /// through this call alone.
    fn poll_event(&mut self) -> Option<TransportEvent>;

    fn disconnect_remote_client(&mut self, client_id: TransportId);

    /// Leave the session by dropping every connection
    fn disconnect_local_client(&mut self);

    /// Round-trip time estimate in milliseconds
    fn current_rtt(&self, client_id: TransportId) -> u64;

    /// Id under which clients see the host
    fn server_client_id(&self) -> TransportId;

    fn shutdown(&mut self);
}

impl<T: TimeSource> NetworkTransport for NearbySession<T> {
    fn initialize(&mut self) -> NearbyResult<()> {
        NearbySession::initialize(self)
    }

    fn start_server(&mut self) -> bool {
        if !self.is_initialized() {
            return false;
        }
        info!("Starting as server");
        if self.config().policy.auto_advertise {
            self.start_advertising();
        }
        true
    }

    fn start_client(&mut self) -> bool {
        if !self.is_initialized() {
            return false;
        }
        info!("Starting as client");
        if self.config().policy.auto_browse {
            self.start_browsing();
        }
        true
    }

    fn send(&mut self, client_id: TransportId, payload: &[u8], delivery: NetworkDelivery) {
        debug!(%client_id, ?delivery, len = payload.len(), "Transport send");
        NearbySession::send(self, client_id, payload);
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        if let Some(event) = NearbySession::poll_event(self) {
            return Some(event);
        }
        self.process_pending();
        NearbySession::poll_event(self)
    }

    fn disconnect_remote_client(&mut self, client_id: TransportId) {
        self.disconnect(client_id);
    }

    fn disconnect_local_client(&mut self) {
        self.disconnect_all();
    }

    fn current_rtt(&self, _client_id: TransportId) -> u64 {
        // The engine exposes no link timing
        0
    }

    fn server_client_id(&self) -> TransportId {
        TransportId::SERVER
    }

    fn shutdown(&mut self) {
        NearbySession::shutdown(self);
    }
}

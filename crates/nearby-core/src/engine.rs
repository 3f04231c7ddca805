//! Proximity engine abstraction
//!
//! The engine owns the radio: advertising, discovery, connection negotiation
//! and byte delivery. Calls into it are fire-and-forget; results arrive later
//! as [`EngineEvent`](crate::EngineEvent)s through the callback handle the
//! engine was initialized with.

use crate::communication::Effect;
use crate::errors::NearbyResult;
use crate::types::{ConnectionStrategy, ConnectionType, EndpointId};

// ----------------------------------------------------------------------------
// Engine Trait
// ----------------------------------------------------------------------------

/// Outbound interface of a proximity discovery/connection engine
///
/// No method may block waiting for a remote peer. An `Err` means the call
/// could not be issued at all; the session logs it and carries on.
pub trait NearbyEngine: Send {
    /// Bring up the engine
    fn initialize(&mut self) -> NearbyResult<()>;

    /// Stop all endpoints, advertising and discovery
    fn shutdown(&mut self) -> NearbyResult<()>;

    fn start_advertising(
        &mut self,
        name: &str,
        service_id: &str,
        connection_type: ConnectionType,
        low_power: bool,
        strategy: ConnectionStrategy,
    ) -> NearbyResult<()>;

    fn stop_advertising(&mut self) -> NearbyResult<()>;

    fn start_discovery(
        &mut self,
        service_id: &str,
        low_power: bool,
        strategy: ConnectionStrategy,
    ) -> NearbyResult<()>;

    fn stop_discovery(&mut self) -> NearbyResult<()>;

    /// Ask a discovered advertiser for a connection, announcing `name`
    fn request_connection(&mut self, name: &str, endpoint: &EndpointId) -> NearbyResult<()>;

    fn accept_connection(&mut self, endpoint: &EndpointId) -> NearbyResult<()>;

    fn reject_connection(&mut self, endpoint: &EndpointId) -> NearbyResult<()>;

    fn disconnect(&mut self, endpoint: &EndpointId) -> NearbyResult<()>;

    fn send_bytes(&mut self, endpoint: &EndpointId, payload: &[u8]) -> NearbyResult<()>;

    /// Issue the engine call described by an [`Effect`]
    fn apply(&mut self, effect: &Effect) -> NearbyResult<()> {
        match effect {
            Effect::StartAdvertising {
                name,
                service_id,
                connection_type,
                low_power,
                strategy,
            } => self.start_advertising(name, service_id, *connection_type, *low_power, *strategy),
            Effect::StopAdvertising => self.stop_advertising(),
            Effect::StartDiscovery {
                service_id,
                low_power,
                strategy,
            } => self.start_discovery(service_id, *low_power, *strategy),
            Effect::StopDiscovery => self.stop_discovery(),
            Effect::RequestConnection { name, endpoint } => {
                self.request_connection(name, endpoint)
            }
            Effect::AcceptConnection { endpoint } => self.accept_connection(endpoint),
            Effect::RejectConnection { endpoint } => self.reject_connection(endpoint),
            Effect::Disconnect { endpoint } => self.disconnect(endpoint),
            Effect::SendBytes { endpoint, payload } => self.send_bytes(endpoint, payload),
            Effect::Shutdown => self.shutdown(),
        }
    }
}

// ----------------------------------------------------------------------------
// Recording Engine (testing)
// ----------------------------------------------------------------------------

#[cfg(any(test, feature = "testing"))]
pub use recording::{EngineCall, RecordingEngine};

#[cfg(any(test, feature = "testing"))]
mod recording {
    use std::sync::{Arc, Mutex, PoisonError};

    use super::NearbyEngine;
    use crate::communication::Effect;
    use crate::errors::{NearbyError, NearbyResult};
    use crate::types::{ConnectionStrategy, ConnectionType, EndpointId};

    /// One recorded engine invocation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum EngineCall {
        Initialize,
        Effect(Effect),
    }

    /// Engine double that records every call; clones share the log
    #[derive(Debug, Clone, Default)]
    pub struct RecordingEngine {
        calls: Arc<Mutex<Vec<EngineCall>>>,
        fail_operations: Arc<Mutex<Vec<&'static str>>>,
    }

    impl RecordingEngine {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every call so far, in order
        pub fn calls(&self) -> Vec<EngineCall> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Recorded effects only
        pub fn effects(&self) -> Vec<Effect> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    EngineCall::Effect(effect) => Some(effect),
                    EngineCall::Initialize => None,
                })
                .collect()
        }

        pub fn clear(&self) {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }

        /// Make the named operation return an engine error
        pub fn fail_on(&self, operation: &'static str) {
            self.fail_operations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(operation);
        }

        fn record(&self, effect: Effect) -> NearbyResult<()> {
            let operation = effect.operation();
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(EngineCall::Effect(effect));
            let failing = self
                .fail_operations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&operation);
            if failing {
                return Err(NearbyError::engine(operation, "injected failure"));
            }
            Ok(())
        }
    }

    impl NearbyEngine for RecordingEngine {
        fn initialize(&mut self) -> NearbyResult<()> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(EngineCall::Initialize);
            Ok(())
        }

        fn shutdown(&mut self) -> NearbyResult<()> {
            self.record(Effect::Shutdown)
        }

        fn start_advertising(
            &mut self,
            name: &str,
            service_id: &str,
            connection_type: ConnectionType,
            low_power: bool,
            strategy: ConnectionStrategy,
        ) -> NearbyResult<()> {
            self.record(Effect::StartAdvertising {
                name: name.to_string(),
                service_id: service_id.to_string(),
                connection_type,
                low_power,
                strategy,
            })
        }

        fn stop_advertising(&mut self) -> NearbyResult<()> {
            self.record(Effect::StopAdvertising)
        }

        fn start_discovery(
            &mut self,
            service_id: &str,
            low_power: bool,
            strategy: ConnectionStrategy,
        ) -> NearbyResult<()> {
            self.record(Effect::StartDiscovery {
                service_id: service_id.to_string(),
                low_power,
                strategy,
            })
        }

        fn stop_discovery(&mut self) -> NearbyResult<()> {
            self.record(Effect::StopDiscovery)
        }

        fn request_connection(&mut self, name: &str, endpoint: &EndpointId) -> NearbyResult<()> {
            self.record(Effect::RequestConnection {
                name: name.to_string(),
                endpoint: endpoint.clone(),
            })
        }

        fn accept_connection(&mut self, endpoint: &EndpointId) -> NearbyResult<()> {
            self.record(Effect::AcceptConnection {
                endpoint: endpoint.clone(),
            })
        }

        fn reject_connection(&mut self, endpoint: &EndpointId) -> NearbyResult<()> {
            self.record(Effect::RejectConnection {
                endpoint: endpoint.clone(),
            })
        }

        fn disconnect(&mut self, endpoint: &EndpointId) -> NearbyResult<()> {
            self.record(Effect::Disconnect {
                endpoint: endpoint.clone(),
            })
        }

        fn send_bytes(&mut self, endpoint: &EndpointId, payload: &[u8]) -> NearbyResult<()> {
            self.record(Effect::SendBytes {
                endpoint: endpoint.clone(),
                payload: payload.to_vec(),
            })
        }
    }
}

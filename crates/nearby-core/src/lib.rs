//! Nearby Core: endpoint tracking for proximity session transports
//!
//! This crate holds the engine-independent heart of a nearby session
//! transport: the identifier map between engine endpoint ids and numeric
//! transport ids, the endpoint registry, and the connection state machine
//! that turns engine callbacks and host commands into engine calls, transport
//! events and UI notifications.
//!
//! Nothing here performs I/O. The runtime crate feeds events in and executes
//! the resulting [`Transition`]s.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod communication;
pub mod config;
pub mod engine;
pub mod errors;
pub mod ids;
pub mod registry;
pub mod state;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use communication::{Effect, EngineEvent, PeerNotification, TransportEvent};
pub use config::{ChannelConfig, NearbyConfig, PolicyConfig, SessionConfig};
pub use engine::NearbyEngine;
pub use errors::{ChannelError, NearbyError, NearbyResult};
pub use ids::{fnv1a_64, IdentifierMap};
pub use registry::{Endpoint, EndpointRegistry, PendingRequest};
pub use state::{LocalSession, SessionState, SessionStats, Transition};
pub use types::{
    AuthStatus, ConnectionStrategy, ConnectionType, EndpointId, EndpointStatus,
    ManualTimeSource, MonotonicTimeSource, NetworkDelivery, TimeSource, Timestamp, TransportId,
};

#[cfg(any(test, feature = "testing"))]
pub use engine::{EngineCall, RecordingEngine};

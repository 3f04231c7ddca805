//! Nearby Runtime
//!
//! This crate runs the nearby connection state machine for a host:
//! - `NearbySession`: the facade owning state, engine and channels
//! - `EngineCallbacks`: the thread-safe handle engines report through
//! - `NetworkTransport`: the generic transport interface network layers consume
//! - `SimulatedMedium`: an in-process radio for tests and demos
//!
//! `nearby-core` provides the pure state machine; this crate moves events
//! between it, the engine and the host loop.

pub mod builder;
pub mod dispatcher;
pub mod session;
pub mod simulated;
pub mod transport;

pub use builder::SessionBuilder;
pub use dispatcher::{
    create_callback_channel, create_notification_channel, CallbackReceiver, ChannelStats,
    EngineCallbacks, NonBlockingSend, NotificationReceiver,
};
pub use session::{NearbySession, SessionSnapshot};
pub use simulated::{SimulatedEngine, SimulatedMedium};
pub use transport::NetworkTransport;

// Re-export core types for convenience
pub use nearby_core::{
    EndpointId, EndpointStatus, NearbyConfig, NearbyError, NearbyResult, NetworkDelivery,
    PeerNotification, PolicyConfig, SessionConfig, TransportEvent, TransportId,
};

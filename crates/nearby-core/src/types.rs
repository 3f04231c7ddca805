//! Core types for the nearby session transport
//!
//! Identifiers, endpoint lifecycle states, engine configuration enums and the
//! timestamp/time-source pair used to stamp transport events.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Endpoint Identifier
// ----------------------------------------------------------------------------

/// Opaque endpoint identifier assigned by the proximity engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    /// Create a new endpoint identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes fed to the identifier hash
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EndpointId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ----------------------------------------------------------------------------
// Transport Identifier
// ----------------------------------------------------------------------------

/// Numeric connection identifier handed to the consuming network layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportId(u64);

impl TransportId {
    /// Well-known id of the hosting counterpart
    pub const SERVER: TransportId = TransportId(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_server(self) -> bool {
        self == Self::SERVER
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TransportId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ----------------------------------------------------------------------------
// Endpoint Status
// ----------------------------------------------------------------------------

/// Lifecycle status of a known endpoint, or of the local instance
///
/// `Advertising` on a remote endpoint labels the role the remote plays
/// (it was found while we were browsing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndpointStatus {
    Uninitialized,
    Idle,
    Advertising,
    Discovering,
    /// Remote asked us for a connection
    Requesting,
    /// We asked the remote for a connection
    Requested,
    Connected,
}

impl EndpointStatus {
    /// Statuses of peers seen but not yet negotiating
    pub const FOUND: &'static [EndpointStatus] =
        &[EndpointStatus::Discovering, EndpointStatus::Advertising];

    /// Statuses of peers with an outstanding connection request
    pub const PENDING: &'static [EndpointStatus] =
        &[EndpointStatus::Requesting, EndpointStatus::Requested];

    /// Found or negotiating peers
    pub const FOUND_AND_PENDING: &'static [EndpointStatus] = &[
        EndpointStatus::Discovering,
        EndpointStatus::Advertising,
        EndpointStatus::Requesting,
        EndpointStatus::Requested,
    ];

    pub fn is_pending(self) -> bool {
        matches!(self, EndpointStatus::Requesting | EndpointStatus::Requested)
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EndpointStatus::Uninitialized => "UNINITIALIZED",
            EndpointStatus::Idle => "IDLE",
            EndpointStatus::Advertising => "ADVERTISING",
            EndpointStatus::Discovering => "DISCOVERING",
            EndpointStatus::Requesting => "REQUESTING",
            EndpointStatus::Requested => "REQUESTED",
            EndpointStatus::Connected => "CONNECTED",
        };
        f.write_str(label)
    }
}

// ----------------------------------------------------------------------------
// Engine Configuration Enums
// ----------------------------------------------------------------------------

/// Radio upgrade behaviour requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionType {
    Balanced,
    #[default]
    Disruptive,
    NonDisruptive,
}

impl ConnectionType {
    /// Raw value understood by the engine
    pub fn as_raw(self) -> i32 {
        match self {
            ConnectionType::Balanced => 0,
            ConnectionType::Disruptive => 1,
            ConnectionType::NonDisruptive => 2,
        }
    }
}

/// Topology strategy requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionStrategy {
    #[serde(rename = "P2P_CLUSTER")]
    Cluster,
    #[serde(rename = "P2P_POINT_TO_POINT")]
    PointToPoint,
    #[default]
    #[serde(rename = "P2P_STAR")]
    Star,
}

impl ConnectionStrategy {
    /// Raw value understood by the engine
    pub fn as_raw(self) -> i32 {
        match self {
            ConnectionStrategy::Cluster => 0,
            ConnectionStrategy::PointToPoint => 1,
            ConnectionStrategy::Star => 2,
        }
    }
}

/// Authentication status reported with a connection-initiated callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthStatus {
    /// Digits still need confirmation
    Pending,
    /// Any other engine-reported status
    Resolved(i32),
}

impl AuthStatus {
    pub fn from_raw(raw: i32) -> Self {
        if raw == 0 {
            AuthStatus::Pending
        } else {
            AuthStatus::Resolved(raw)
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            AuthStatus::Pending => 0,
            AuthStatus::Resolved(raw) => raw,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, AuthStatus::Pending)
    }
}

/// Delivery class requested by the consuming network layer
///
/// The proximity engine offers a single reliable byte stream per endpoint,
/// so every class maps onto the same engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetworkDelivery {
    Unreliable,
    UnreliableSequenced,
    #[default]
    Reliable,
    ReliableSequenced,
    ReliableFragmentedSequenced,
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Monotonic millisecond timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

impl core::ops::Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

/// Abstract time source for stamping transport events
pub trait TimeSource {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Milliseconds elapsed since the source was created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimeSource {
    origin: Instant,
}

impl MonotonicTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed().as_millis() as u64)
    }
}

/// Hand-driven clock; clones share the same reading
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    millis: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start_millis)),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

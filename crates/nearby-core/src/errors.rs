//! Error types for the nearby session transport
//!
//! Every fallible operation in the core returns [`NearbyResult`]. The session
//! facade absorbs these at its public boundary and logs them, so errors never
//! travel back into engine callback threads.

use crate::types::{EndpointId, TransportId};

// ----------------------------------------------------------------------------
// Channel Errors
// ----------------------------------------------------------------------------

/// Failure to hand a value to a bounded channel without blocking
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel buffer is full")]
    ChannelFull,
    #[error("Channel is closed")]
    ChannelClosed,
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Unified error type for the nearby transport crates
#[derive(Debug, thiserror::Error)]
pub enum NearbyError {
    #[error("Engine call {operation} failed: {reason}")]
    Engine { operation: &'static str, reason: String },

    #[error("Session is not initialized")]
    NotInitialized,

    #[error("Session is already initialized")]
    AlreadyInitialized,

    #[error("Transport id {transport_id} is already bound to endpoint {endpoint}")]
    TransportIdInUse {
        transport_id: TransportId,
        endpoint: EndpointId,
    },

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(EndpointId),

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl NearbyError {
    /// Build an engine failure for the named operation
    pub fn engine(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Engine {
            operation,
            reason: reason.into(),
        }
    }

    /// Build a configuration error
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

/// Result type alias for nearby transport operations
pub type NearbyResult<T> = Result<T, NearbyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = NearbyError::engine("start_advertising", "radio off");
        assert_eq!(
            err.to_string(),
            "Engine call start_advertising failed: radio off"
        );

        let err = NearbyError::TransportIdInUse {
            transport_id: TransportId::SERVER,
            endpoint: EndpointId::from("e1"),
        };
        assert_eq!(
            err.to_string(),
            "Transport id 0 is already bound to endpoint e1"
        );
    }

    #[test]
    fn test_channel_error_conversion() {
        let err: NearbyError = ChannelError::ChannelFull.into();
        assert!(matches!(err, NearbyError::Channel(ChannelError::ChannelFull)));
    }
}

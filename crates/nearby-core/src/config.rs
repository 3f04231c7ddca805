//! Centralized Configuration Management
//!
//! Session parameters handed to the engine, automation policies, and channel
//! sizing. All structs are serde-friendly so hosts can load them from TOML.

use serde::{Deserialize, Serialize};

use crate::errors::{NearbyError, NearbyResult};
use crate::types::{ConnectionStrategy, ConnectionType};

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Parameters fixed for the lifetime of an initialized session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Service identifier peers must share to discover each other
    pub service_id: String,
    /// Display name advertised to peers
    pub nickname: String,
    pub connection_type: ConnectionType,
    pub low_power: bool,
    pub strategy: ConnectionStrategy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_id: "nearby-transport".to_string(),
            nickname: "NearbyPeer".to_string(),
            connection_type: ConnectionType::Disruptive,
            low_power: false,
            strategy: ConnectionStrategy::Star,
        }
    }
}

impl SessionConfig {
    pub fn with_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = service_id.into();
        self
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    pub fn validate(&self) -> NearbyResult<()> {
        if self.service_id.trim().is_empty() {
            return Err(NearbyError::invalid_configuration("service_id is empty"));
        }
        if self.nickname.trim().is_empty() {
            return Err(NearbyError::invalid_configuration("nickname is empty"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Policy Configuration
// ----------------------------------------------------------------------------

/// Automatic reactions to lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Start advertising when the host starts as server
    pub auto_advertise: bool,
    /// Approve incoming connection requests without user confirmation
    pub auto_approve_connection_request: bool,
    /// Start browsing when the host starts as client
    pub auto_browse: bool,
    /// Request a connection to every peer found while browsing
    pub auto_send_connection_request: bool,
}

impl PolicyConfig {
    /// Every automation enabled; unattended hosts and tests
    pub fn fully_automatic() -> Self {
        Self {
            auto_advertise: true,
            auto_approve_connection_request: true,
            auto_browse: true,
            auto_send_connection_request: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the callback queue and notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Received payloads awaiting the next drain; lifecycle callbacks are never capped
    pub callback_buffer_size: usize,
    /// Peer notifications awaiting the UI
    pub notification_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            callback_buffer_size: 256, // payload bursts
            notification_buffer_size: 64,
        }
    }
}

impl ChannelConfig {
    /// Create configuration for low-memory environments
    pub fn low_memory() -> Self {
        Self {
            callback_buffer_size: 32,
            notification_buffer_size: 16,
        }
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            callback_buffer_size: 1024,
            notification_buffer_size: 1024,
        }
    }

    pub fn validate(&self) -> NearbyResult<()> {
        if self.callback_buffer_size == 0 {
            return Err(NearbyError::invalid_configuration(
                "callback_buffer_size must be non-zero",
            ));
        }
        if self.notification_buffer_size == 0 {
            return Err(NearbyError::invalid_configuration(
                "notification_buffer_size must be non-zero",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Aggregate Configuration
// ----------------------------------------------------------------------------

/// Complete configuration of one nearby session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NearbyConfig {
    pub session: SessionConfig,
    pub policy: PolicyConfig,
    pub channels: ChannelConfig,
}

impl NearbyConfig {
    pub fn testing() -> Self {
        Self {
            session: SessionConfig::default(),
            policy: PolicyConfig::default(),
            channels: ChannelConfig::testing(),
        }
    }

    pub fn validate(&self) -> NearbyResult<()> {
        self.session.validate()?;
        self.channels.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NearbyConfig::default();
        assert_eq!(config.session.nickname, "NearbyPeer");
        assert_eq!(config.session.connection_type, ConnectionType::Disruptive);
        assert_eq!(config.session.strategy, ConnectionStrategy::Star);
        assert!(!config.session.low_power);
        assert_eq!(config.policy, PolicyConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let config = SessionConfig::default().with_service_id("  ");
        assert!(config.validate().is_err());

        let config = SessionConfig::default().with_nickname("");
        assert!(config.validate().is_err());

        let channels = ChannelConfig {
            callback_buffer_size: 0,
            ..ChannelConfig::default()
        };
        assert!(channels.validate().is_err());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let json = r#"{ "session": { "nickname": "Host" }, "policy": { "auto_advertise": true } }"#;
        let config: NearbyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.session.nickname, "Host");
        assert_eq!(config.session.service_id, "nearby-transport");
        assert!(config.policy.auto_advertise);
        assert!(!config.policy.auto_browse);
        assert_eq!(config.channels, ChannelConfig::default());
    }
}

//! Session Builder API
//!
//! Builder-style construction for hosts (CLI, tests): collect configuration,
//! then hand the builder a factory that creates the engine around the
//! session's callback handle.

use nearby_core::{
    ChannelConfig, MonotonicTimeSource, NearbyConfig, NearbyEngine, NearbyResult, PolicyConfig,
    SessionConfig, TimeSource,
};
use tracing::info;

use crate::dispatcher::EngineCallbacks;
use crate::session::NearbySession;

// ----------------------------------------------------------------------------
// Session Builder
// ----------------------------------------------------------------------------

/// Builder for [`NearbySession`]
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: NearbyConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: NearbyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn with_channels(mut self, channels: ChannelConfig) -> Self {
        self.config.channels = channels;
        self
    }

    pub fn nickname(mut self, nickname: impl Into<String>) -> Self {
        self.config.session.nickname = nickname.into();
        self
    }

    pub fn service_id(mut self, service_id: impl Into<String>) -> Self {
        self.config.session.service_id = service_id.into();
        self
    }

    /// Set the callback queue capacity
    pub fn callback_buffer_size(mut self, size: usize) -> Self {
        self.config.channels.callback_buffer_size = size;
        self
    }

    /// Build an uninitialized session with a monotonic clock
    pub fn build<E, F>(self, engine_factory: F) -> NearbyResult<NearbySession<MonotonicTimeSource>>
    where
        E: NearbyEngine + 'static,
        F: FnOnce(EngineCallbacks) -> E,
    {
        self.build_with_time_source(MonotonicTimeSource::new(), engine_factory)
    }

    /// Build an uninitialized session stamping events from `time_source`
    pub fn build_with_time_source<T, E, F>(
        self,
        time_source: T,
        engine_factory: F,
    ) -> NearbyResult<NearbySession<T>>
    where
        T: TimeSource,
        E: NearbyEngine + 'static,
        F: FnOnce(EngineCallbacks) -> E,
    {
        self.config.validate()?;
        info!(nickname = %self.config.session.nickname, "Building nearby session");
        Ok(NearbySession::new(self.config, time_source, engine_factory))
    }

    /// Build and initialize in one step
    pub fn build_and_initialize<E, F>(
        self,
        engine_factory: F,
    ) -> NearbyResult<NearbySession<MonotonicTimeSource>>
    where
        E: NearbyEngine + 'static,
        F: FnOnce(EngineCallbacks) -> E,
    {
        let mut session = self.build(engine_factory)?;
        session.initialize()?;
        Ok(session)
    }
}

//! In-process simulated proximity medium
//!
//! [`SimulatedMedium`] stands in for the radio: every [`SimulatedEngine`]
//! attached to it is a device. Advertisers and discoverers with the same
//! service id see each other, connection requests produce matching auth
//! codes on both sides, and a connection is established once both sides
//! accept. Callbacks are delivered synchronously through each device's
//! [`EngineCallbacks`], so they land in the owning session's queue exactly
//! as a real engine's background-thread callbacks would.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::{HashMap, HashSet};
use nearby_core::{
    ConnectionStrategy, ConnectionType, EndpointId, NearbyEngine, NearbyError, NearbyResult,
};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::dispatcher::EngineCallbacks;

const ENDPOINT_ID_LEN: usize = 4;

// ----------------------------------------------------------------------------
// Medium State
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct Advertisement {
    name: String,
    service_id: String,
}

#[derive(Debug)]
struct Device {
    callbacks: EngineCallbacks,
    active: bool,
    advertising: Option<Advertisement>,
    discovering: Option<String>,
}

/// Connection negotiation between two devices
#[derive(Debug)]
struct Negotiation {
    accepted: HashSet<EndpointId>,
}

#[derive(Debug)]
struct MediumState {
    devices: HashMap<EndpointId, Device>,
    negotiations: HashMap<(EndpointId, EndpointId), Negotiation>,
    connections: HashSet<(EndpointId, EndpointId)>,
    rng: StdRng,
}

/// Order-independent key for a device pair
fn pair(a: &EndpointId, b: &EndpointId) -> (EndpointId, EndpointId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl MediumState {
    fn device(&self, id: &EndpointId) -> NearbyResult<&Device> {
        self.devices
            .get(id)
            .ok_or_else(|| NearbyError::UnknownEndpoint(id.clone()))
    }

    fn device_mut(&mut self, id: &EndpointId) -> NearbyResult<&mut Device> {
        self.devices
            .get_mut(id)
            .ok_or_else(|| NearbyError::UnknownEndpoint(id.clone()))
    }

    fn fresh_endpoint_id(&mut self) -> EndpointId {
        loop {
            let raw: String = (&mut self.rng)
                .sample_iter(&Alphanumeric)
                .take(ENDPOINT_ID_LEN)
                .map(|b| char::from(b).to_ascii_uppercase())
                .collect();
            let id = EndpointId::new(raw);
            if !self.devices.contains_key(&id) {
                return id;
            }
        }
    }

    fn auth_code(&mut self) -> String {
        format!("{:04}", self.rng.gen_range(0..10_000))
    }

    /// Tear down a negotiation or connection, telling both sides
    fn drop_link(&mut self, key: &(EndpointId, EndpointId)) {
        let was_linked =
            self.negotiations.remove(key).is_some() | self.connections.remove(key);
        if !was_linked {
            return;
        }
        let (a, b) = key;
        if let Some(device) = self.devices.get(a) {
            device.callbacks.connection_disconnected(b.clone());
        }
        if let Some(device) = self.devices.get(b) {
            device.callbacks.connection_disconnected(a.clone());
        }
    }

    fn links_of(&self, id: &EndpointId) -> Vec<(EndpointId, EndpointId)> {
        self.negotiations
            .keys()
            .chain(self.connections.iter())
            .filter(|(a, b)| a == id || b == id)
            .cloned()
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Simulated Medium
// ----------------------------------------------------------------------------

/// Shared radio environment; clones refer to the same medium
#[derive(Debug, Clone)]
pub struct SimulatedMedium {
    inner: Arc<Mutex<MediumState>>,
}

impl Default for SimulatedMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMedium {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic endpoint ids and auth codes
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MediumState {
                devices: HashMap::new(),
                negotiations: HashMap::new(),
                connections: HashSet::new(),
                rng,
            })),
        }
    }

    /// Attach a device with a random endpoint id
    pub fn attach(&self, callbacks: EngineCallbacks) -> SimulatedEngine {
        let mut state = self.lock();
        let endpoint_id = state.fresh_endpoint_id();
        Self::insert_device(&mut state, endpoint_id.clone(), callbacks);
        drop(state);
        self.engine(endpoint_id)
    }

    /// Attach a device under a chosen endpoint id, replacing any previous one
    pub fn attach_as(
        &self,
        endpoint_id: impl Into<EndpointId>,
        callbacks: EngineCallbacks,
    ) -> SimulatedEngine {
        let endpoint_id = endpoint_id.into();
        Self::insert_device(&mut self.lock(), endpoint_id.clone(), callbacks);
        self.engine(endpoint_id)
    }

    /// Number of established connections across the medium
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn is_connected(&self, a: &EndpointId, b: &EndpointId) -> bool {
        self.lock().connections.contains(&pair(a, b))
    }

    fn insert_device(state: &mut MediumState, endpoint_id: EndpointId, callbacks: EngineCallbacks) {
        debug!(%endpoint_id, "Device attached to simulated medium");
        state.devices.insert(
            endpoint_id,
            Device {
                callbacks,
                active: false,
                advertising: None,
                discovering: None,
            },
        );
    }

    fn engine(&self, endpoint_id: EndpointId) -> SimulatedEngine {
        SimulatedEngine {
            medium: self.clone(),
            endpoint_id,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MediumState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ----------------------------------------------------------------------------
// Simulated Engine
// ----------------------------------------------------------------------------

/// One device on a [`SimulatedMedium`]
#[derive(Debug, Clone)]
pub struct SimulatedEngine {
    medium: SimulatedMedium,
    endpoint_id: EndpointId,
}

impl SimulatedEngine {
    /// Id under which other devices see this one
    pub fn endpoint_id(&self) -> &EndpointId {
        &self.endpoint_id
    }

    fn active_device<'a>(&self, state: &'a mut MediumState) -> NearbyResult<&'a mut Device> {
        let device = state.device_mut(&self.endpoint_id)?;
        if !device.active {
            return Err(NearbyError::engine("simulated", "engine not initialized"));
        }
        Ok(device)
    }
}

impl NearbyEngine for SimulatedEngine {
    fn initialize(&mut self) -> NearbyResult<()> {
        let mut state = self.medium.lock();
        state.device_mut(&self.endpoint_id)?.active = true;
        Ok(())
    }

    fn shutdown(&mut self) -> NearbyResult<()> {
        self.stop_advertising()?;
        self.stop_discovery()?;

        let mut state = self.medium.lock();
        for key in state.links_of(&self.endpoint_id) {
            state.drop_link(&key);
        }
        state.device_mut(&self.endpoint_id)?.active = false;
        debug!(endpoint_id = %self.endpoint_id, "Simulated engine shut down");
        Ok(())
    }

    fn start_advertising(
        &mut self,
        name: &str,
        service_id: &str,
        _connection_type: ConnectionType,
        _low_power: bool,
        _strategy: ConnectionStrategy,
    ) -> NearbyResult<()> {
        let mut state = self.medium.lock();
        self.active_device(&mut state)?.advertising = Some(Advertisement {
            name: name.to_string(),
            service_id: service_id.to_string(),
        });

        for (id, device) in state.devices.iter() {
            if *id != self.endpoint_id && device.discovering.as_deref() == Some(service_id) {
                device.callbacks.peer_found(self.endpoint_id.clone(), name);
            }
        }
        Ok(())
    }

    fn stop_advertising(&mut self) -> NearbyResult<()> {
        let mut state = self.medium.lock();
        let Some(advertisement) = self.active_device(&mut state)?.advertising.take() else {
            return Ok(());
        };

        for (id, device) in state.devices.iter() {
            if *id != self.endpoint_id
                && device.discovering.as_deref() == Some(advertisement.service_id.as_str())
            {
                device.callbacks.peer_lost(self.endpoint_id.clone());
            }
        }
        Ok(())
    }

    fn start_discovery(
        &mut self,
        service_id: &str,
        _low_power: bool,
        _strategy: ConnectionStrategy,
    ) -> NearbyResult<()> {
        let mut state = self.medium.lock();
        self.active_device(&mut state)?.discovering = Some(service_id.to_string());

        let device = state.device(&self.endpoint_id)?;
        for (id, other) in state.devices.iter() {
            if *id == self.endpoint_id {
                continue;
            }
            if let Some(advertisement) = &other.advertising {
                if advertisement.service_id == service_id {
                    device.callbacks.peer_found(id.clone(), advertisement.name.clone());
                }
            }
        }
        Ok(())
    }

    fn stop_discovery(&mut self) -> NearbyResult<()> {
        let mut state = self.medium.lock();
        self.active_device(&mut state)?.discovering = None;
        Ok(())
    }

    fn request_connection(&mut self, name: &str, endpoint: &EndpointId) -> NearbyResult<()> {
        let mut state = self.medium.lock();
        self.active_device(&mut state)?;

        let advertised_name = state
            .device(endpoint)?
            .advertising
            .as_ref()
            .map(|advertisement| advertisement.name.clone())
            .ok_or_else(|| NearbyError::engine("request_connection", "endpoint is not advertising"))?;

        let key = pair(&self.endpoint_id, endpoint);
        if state.negotiations.contains_key(&key) || state.connections.contains(&key) {
            return Err(NearbyError::engine(
                "request_connection",
                "already connecting to endpoint",
            ));
        }

        let auth_code = state.auth_code();
        state.negotiations.insert(
            key,
            Negotiation {
                accepted: HashSet::new(),
            },
        );
        trace!(from = %self.endpoint_id, to = %endpoint, %auth_code, "Simulated connection request");

        state.device(&self.endpoint_id)?.callbacks.connection_initiated(
            endpoint.clone(),
            advertised_name,
            auth_code.clone(),
            0,
        );
        state.device(endpoint)?.callbacks.connection_initiated(
            self.endpoint_id.clone(),
            name,
            auth_code,
            0,
        );
        Ok(())
    }

    fn accept_connection(&mut self, endpoint: &EndpointId) -> NearbyResult<()> {
        let mut state = self.medium.lock();
        self.active_device(&mut state)?;

        let key = pair(&self.endpoint_id, endpoint);
        let negotiation = state
            .negotiations
            .get_mut(&key)
            .ok_or_else(|| NearbyError::engine("accept_connection", "no pending connection"))?;
        negotiation.accepted.insert(self.endpoint_id.clone());
        if negotiation.accepted.len() < 2 {
            return Ok(());
        }

        state.negotiations.remove(&key);
        state.connections.insert(key);
        state
            .device(&self.endpoint_id)?
            .callbacks
            .connection_established(endpoint.clone());
        state
            .device(endpoint)?
            .callbacks
            .connection_established(self.endpoint_id.clone());
        Ok(())
    }

    fn reject_connection(&mut self, endpoint: &EndpointId) -> NearbyResult<()> {
        let mut state = self.medium.lock();
        self.active_device(&mut state)?;

        let key = pair(&self.endpoint_id, endpoint);
        if !state.negotiations.contains_key(&key) {
            return Err(NearbyError::engine("reject_connection", "no pending connection"));
        }
        state.drop_link(&key);
        Ok(())
    }

    fn disconnect(&mut self, endpoint: &EndpointId) -> NearbyResult<()> {
        let mut state = self.medium.lock();
        self.active_device(&mut state)?;

        let key = pair(&self.endpoint_id, endpoint);
        let removed = state.negotiations.remove(&key).is_some() | state.connections.remove(&key);
        if removed {
            // Only the remote side hears about a local disconnect
            if let Some(device) = state.devices.get(endpoint) {
                device
                    .callbacks
                    .connection_disconnected(self.endpoint_id.clone());
            }
        }
        Ok(())
    }

    fn send_bytes(&mut self, endpoint: &EndpointId, payload: &[u8]) -> NearbyResult<()> {
        let mut state = self.medium.lock();
        self.active_device(&mut state)?;

        if !state.connections.contains(&pair(&self.endpoint_id, endpoint)) {
            return Err(NearbyError::engine("send_bytes", "endpoint not connected"));
        }
        state
            .device(endpoint)?
            .callbacks
            .payload_received(self.endpoint_id.clone(), payload.to_vec());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

//! Identifier mapping between engine endpoint ids and numeric transport ids
//!
//! The consuming network layer addresses connections by `u64`. The engine
//! addresses them by opaque strings. [`IdentifierMap`] keeps a bijection
//! between the two for every endpoint that is connection-eligible.
//!
//! Forward resolution is a 64-bit FNV-1a hash of the endpoint id. Registration
//! starts from that hash and probes linearly past occupied ids, so two live
//! endpoints never share a numeric id even when their hashes collide.

use hashbrown::HashMap;
use tracing::debug;

use crate::errors::{NearbyError, NearbyResult};
use crate::types::{EndpointId, TransportId};

/// FNV-1a offset basis in use by deployed peers
const FNV_OFFSET_BASIS: u64 = 1_469_598_103_934_665_603;
/// FNV-1a 64-bit prime
const FNV_PRIME: u64 = 1_099_511_628_211;

/// Deterministic 64-bit FNV-1a hash over raw bytes
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

// ----------------------------------------------------------------------------
// Identifier Map
// ----------------------------------------------------------------------------

/// Bidirectional endpoint id <-> transport id map
#[derive(Debug, Default, Clone)]
pub struct IdentifierMap {
    forward: HashMap<EndpointId, TransportId>,
    reverse: HashMap<TransportId, EndpointId>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash an endpoint id without registering it
    pub fn resolve(endpoint: &EndpointId) -> TransportId {
        TransportId::new(fnv1a_64(endpoint.as_bytes()))
    }

    /// Register an endpoint under its hashed id, probing past taken ids
    ///
    /// Idempotent: a registered endpoint keeps the id it already has. The
    /// server id is never handed out here.
    pub fn register(&mut self, endpoint: &EndpointId) -> TransportId {
        if let Some(existing) = self.forward.get(endpoint) {
            return *existing;
        }

        let hashed = Self::resolve(endpoint);
        let mut candidate = hashed;
        while candidate.is_server() || self.reverse.contains_key(&candidate) {
            candidate = TransportId::new(candidate.as_u64().wrapping_add(1));
        }
        if candidate != hashed {
            debug!(%endpoint, %hashed, assigned = %candidate, "Transport id collision probed");
        }

        self.insert(endpoint.clone(), candidate);
        candidate
    }

    /// Register an endpoint under a caller-chosen id
    ///
    /// Returns the endpoint's existing id if it is already registered.
    pub fn register_as(
        &mut self,
        endpoint: &EndpointId,
        transport_id: TransportId,
    ) -> NearbyResult<TransportId> {
        if let Some(existing) = self.forward.get(endpoint) {
            return Ok(*existing);
        }
        if let Some(owner) = self.reverse.get(&transport_id) {
            return Err(NearbyError::TransportIdInUse {
                transport_id,
                endpoint: owner.clone(),
            });
        }

        self.insert(endpoint.clone(), transport_id);
        Ok(transport_id)
    }

    /// Register the hosting counterpart under [`TransportId::SERVER`] when free
    pub fn register_server(&mut self, endpoint: &EndpointId) -> TransportId {
        match self.register_as(endpoint, TransportId::SERVER) {
            Ok(id) => id,
            Err(_) => self.register(endpoint),
        }
    }

    /// Reverse lookup of a registered transport id
    pub fn lookup(&self, transport_id: TransportId) -> Option<&EndpointId> {
        self.reverse.get(&transport_id)
    }

    /// Forward lookup of a registered endpoint
    pub fn transport_id(&self, endpoint: &EndpointId) -> Option<TransportId> {
        self.forward.get(endpoint).copied()
    }

    pub fn contains_endpoint(&self, endpoint: &EndpointId) -> bool {
        self.forward.contains_key(endpoint)
    }

    pub fn contains_transport_id(&self, transport_id: TransportId) -> bool {
        self.reverse.contains_key(&transport_id)
    }

    /// Remove by endpoint id; no-op when absent
    pub fn remove_endpoint(&mut self, endpoint: &EndpointId) -> Option<TransportId> {
        let transport_id = self.forward.remove(endpoint)?;
        self.reverse.remove(&transport_id);
        Some(transport_id)
    }

    /// Remove by transport id; no-op when absent
    pub fn remove_transport_id(&mut self, transport_id: TransportId) -> Option<EndpointId> {
        let endpoint = self.reverse.remove(&transport_id)?;
        self.forward.remove(&endpoint);
        Some(endpoint)
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EndpointId, TransportId)> {
        self.forward.iter().map(|(endpoint, id)| (endpoint, *id))
    }

    fn insert(&mut self, endpoint: EndpointId, transport_id: TransportId) {
        self.reverse.insert(transport_id, endpoint.clone());
        self.forward.insert(endpoint, transport_id);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

//! Endpoint registry
//!
//! Authoritative record of every remote endpoint the engine has reported and
//! not yet reported gone: display name, lifecycle status, pending auth code
//! and assigned transport id.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::types::{EndpointId, EndpointStatus, TransportId};

// ----------------------------------------------------------------------------
// Endpoint Record
// ----------------------------------------------------------------------------

/// One known remote peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    pub status: EndpointStatus,
    /// Present only while an unconfirmed connection request exists
    pub pending_auth_code: Option<String>,
    /// Present once the endpoint is connection-eligible
    pub transport_id: Option<TransportId>,
}

impl Endpoint {
    pub fn new(id: EndpointId, name: impl Into<String>, status: EndpointStatus) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            pending_auth_code: None,
            transport_id: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == EndpointStatus::Connected
    }
}

/// Endpoint with an outstanding connection request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: EndpointId,
    pub name: String,
    pub status: EndpointStatus,
    pub auth_code: Option<String>,
}

// ----------------------------------------------------------------------------
// Endpoint Registry
// ----------------------------------------------------------------------------

/// Map of endpoint id to [`Endpoint`]
#[derive(Debug, Default, Clone)]
pub struct EndpointRegistry {
    endpoints: HashMap<EndpointId, Endpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an endpoint or overwrite its name and status
    ///
    /// Returns `true` when the endpoint was not previously known. Pending
    /// auth code and transport id survive an overwrite.
    pub fn upsert(&mut self, id: &EndpointId, name: &str, status: EndpointStatus) -> bool {
        match self.endpoints.get_mut(id) {
            Some(endpoint) => {
                endpoint.name = name.to_string();
                endpoint.status = status;
                false
            }
            None => {
                self.endpoints
                    .insert(id.clone(), Endpoint::new(id.clone(), name, status));
                true
            }
        }
    }

    /// Change status; silent no-op when the endpoint is unknown
    pub fn set_status(&mut self, id: &EndpointId, status: EndpointStatus) -> bool {
        match self.endpoints.get_mut(id) {
            Some(endpoint) => {
                endpoint.status = status;
                true
            }
            None => false,
        }
    }

    /// Change display name; silent no-op when the endpoint is unknown
    pub fn set_name(&mut self, id: &EndpointId, name: &str) -> bool {
        match self.endpoints.get_mut(id) {
            Some(endpoint) => {
                endpoint.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Store the auth code of an unconfirmed request
    pub fn set_pending_auth_code(&mut self, id: &EndpointId, code: &str) -> bool {
        match self.endpoints.get_mut(id) {
            Some(endpoint) => {
                endpoint.pending_auth_code = Some(code.to_string());
                true
            }
            None => false,
        }
    }

    /// Drop and return the pending auth code
    pub fn take_pending_auth_code(&mut self, id: &EndpointId) -> Option<String> {
        self.endpoints
            .get_mut(id)
            .and_then(|endpoint| endpoint.pending_auth_code.take())
    }

    pub fn set_transport_id(&mut self, id: &EndpointId, transport_id: TransportId) -> bool {
        match self.endpoints.get_mut(id) {
            Some(endpoint) => {
                endpoint.transport_id = Some(transport_id);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    pub fn contains(&self, id: &EndpointId) -> bool {
        self.endpoints.contains_key(id)
    }

    pub fn status(&self, id: &EndpointId) -> Option<EndpointStatus> {
        self.endpoints.get(id).map(|endpoint| endpoint.status)
    }

    pub fn name(&self, id: &EndpointId) -> Option<&str> {
        self.endpoints.get(id).map(|endpoint| endpoint.name.as_str())
    }

    /// `(id, name)` pairs whose status is in `statuses`, ordered by id
    pub fn query_by_status(&self, statuses: &[EndpointStatus]) -> Vec<(EndpointId, String)> {
        let mut matches: Vec<_> = self
            .endpoints
            .values()
            .filter(|endpoint| statuses.contains(&endpoint.status))
            .map(|endpoint| (endpoint.id.clone(), endpoint.name.clone()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        matches
    }

    /// Endpoints in REQUESTING or REQUESTED with their auth codes
    pub fn pending_requests(&self) -> Vec<PendingRequest> {
        let mut pending: Vec<_> = self
            .endpoints
            .values()
            .filter(|endpoint| endpoint.status.is_pending())
            .map(|endpoint| PendingRequest {
                id: endpoint.id.clone(),
                name: endpoint.name.clone(),
                status: endpoint.status,
                auth_code: endpoint.pending_auth_code.clone(),
            })
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        pending
    }

    /// Snapshot of every endpoint, ordered by id
    pub fn snapshot(&self) -> Vec<Endpoint> {
        let mut all: Vec<_> = self.endpoints.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Remove an endpoint together with its code and transport id
    pub fn remove(&mut self, id: &EndpointId) -> Option<Endpoint> {
        self.endpoints.remove(id)
    }

    pub fn clear(&mut self) {
        self.endpoints.clear();
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> EndpointId {
        EndpointId::from(raw)
    }

    #[test]
    fn test_upsert_inserts_then_overwrites() {
        let mut registry = EndpointRegistry::new();
        assert!(registry.upsert(&id("e1"), "Alice", EndpointStatus::Advertising));
        registry.set_pending_auth_code(&id("e1"), "1234");

        assert!(!registry.upsert(&id("e1"), "Alicia", EndpointStatus::Requested));
        let endpoint = registry.get(&id("e1")).unwrap();
        assert_eq!(endpoint.name, "Alicia");
        assert_eq!(endpoint.status, EndpointStatus::Requested);
        assert_eq!(endpoint.pending_auth_code.as_deref(), Some("1234"));
    }

    #[test]
    fn test_set_status_unknown_is_silent() {
        let mut registry = EndpointRegistry::new();
        assert!(!registry.set_status(&id("ghost"), EndpointStatus::Connected));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_query_by_status() {
        let mut registry = EndpointRegistry::new();
        registry.upsert(&id("b"), "Bob", EndpointStatus::Advertising);
        registry.upsert(&id("a"), "Alice", EndpointStatus::Connected);
        registry.upsert(&id("c"), "Carol", EndpointStatus::Requesting);

        assert_eq!(
            registry.query_by_status(&[EndpointStatus::Connected]),
            vec![(id("a"), "Alice".to_string())]
        );
        assert_eq!(
            registry.query_by_status(EndpointStatus::FOUND_AND_PENDING),
            vec![(id("b"), "Bob".to_string()), (id("c"), "Carol".to_string())]
        );
        assert!(registry.query_by_status(&[]).is_empty());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_pending_requests_carry_auth_code() {
        let mut registry = EndpointRegistry::new();
        registry.upsert(&id("e1"), "Alice", EndpointStatus::Requesting);
        registry.set_pending_auth_code(&id("e1"), "4821");
        registry.upsert(&id("e2"), "Bob", EndpointStatus::Advertising);

        let pending = registry.pending_requests();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id("e1"));
        assert_eq!(pending[0].auth_code.as_deref(), Some("4821"));
    }

    #[test]
    fn test_take_pending_auth_code() {
        let mut registry = EndpointRegistry::new();
        registry.upsert(&id("e1"), "Alice", EndpointStatus::Requesting);
        registry.set_pending_auth_code(&id("e1"), "0001");

        assert_eq!(registry.take_pending_auth_code(&id("e1")).as_deref(), Some("0001"));
        assert_eq!(registry.take_pending_auth_code(&id("e1")), None);
        assert_eq!(registry.take_pending_auth_code(&id("ghost")), None);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut registry = EndpointRegistry::new();
        registry.upsert(&id("e1"), "Alice", EndpointStatus::Connected);
        registry.set_transport_id(&id("e1"), TransportId::new(7));
        registry.upsert(&id("e2"), "Bob", EndpointStatus::Advertising);

        let removed = registry.remove(&id("e1")).unwrap();
        assert_eq!(removed.transport_id, Some(TransportId::new(7)));
        assert!(registry.remove(&id("e1")).is_none());

        registry.clear();
        assert!(registry.is_empty());
    }
}

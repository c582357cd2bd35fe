//! Roaming network root
//!
//! The top of the hierarchy: a federation of charging station operators plus
//! the registry of e-mobility providers allowed to reserve and charge across
//! them. The network itself never dispatches; callers resolve an operator
//! and talk to its Dispatcher directly.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::domain::identifiers::OperatorKind;
use crate::domain::{NetworkId, OperatorId, ProviderId};

use super::index::{EntityIndex, MutationOutcome};
use super::operator::ChargingStationOperator;

/// An e-mobility provider known to the network. Identity only; contracts
/// and billing live outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EMobilityProvider {
    pub id: ProviderId,
    pub name: String,
}

pub struct RoamingNetwork {
    id: NetworkId,
    operators: EntityIndex<NetworkId, OperatorKind, Arc<ChargingStationOperator>>,
    providers: DashMap<ProviderId, EMobilityProvider>,
}

impl RoamingNetwork {
    pub fn new(id: NetworkId) -> Self {
        let operators = EntityIndex::new(id.clone());
        Self {
            id,
            operators,
            providers: DashMap::new(),
        }
    }

    pub fn id(&self) -> &NetworkId {
        &self.id
    }

    pub fn operators(&self) -> &EntityIndex<NetworkId, OperatorKind, Arc<ChargingStationOperator>> {
        &self.operators
    }

    /// Create and add an operator through the vote/notify guard.
    pub fn create_operator(&self, id: OperatorId) -> MutationOutcome<Arc<ChargingStationOperator>> {
        let operator = Arc::new(ChargingStationOperator::new(id.clone(), self.id.clone()));
        self.operators.add(Utc::now(), id, operator)
    }

    pub fn operator(&self, id: &OperatorId) -> Option<Arc<ChargingStationOperator>> {
        self.operators.get(id)
    }

    pub fn remove_operator(&self, id: &OperatorId) -> MutationOutcome<Arc<ChargingStationOperator>> {
        self.operators.remove(Utc::now(), id)
    }

    // ─── Provider registry ─────────────────────────────────────────────

    /// Register a provider. Returns false when the id is already taken.
    pub fn register_provider(&self, provider: EMobilityProvider) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.providers.entry(provider.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(provider);
                true
            }
        }
    }

    pub fn unregister_provider(&self, id: &ProviderId) -> Option<EMobilityProvider> {
        self.providers.remove(id).map(|(_, provider)| provider)
    }

    pub fn provider(&self, id: &ProviderId) -> Option<EMobilityProvider> {
        self.providers.get(id).map(|entry| entry.clone())
    }

    pub fn is_registered(&self, id: &ProviderId) -> bool {
        self.providers.contains_key(id)
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

/// Shared network handle
pub type SharedNetwork = Arc<RoamingNetwork>;

pub fn create_network(id: NetworkId) -> SharedNetwork {
    Arc::new(RoamingNetwork::new(id))
}

// ── Tests ──────────────────────────────────────────────────────────────

//! EVSE status diffing
//!
//! Reconciles an externally observed status snapshot against an operator's
//! current tree. `compute_diff` classifies every observed EVSE as new,
//! changed or unchanged and lists ids the observation no longer contains;
//! `apply_diff` writes the new and changed statuses back through the
//! operator so bubbling and events fire, stamped with the observation's
//! timestamp. Removed ids are advisory only, structural removal stays a
//! deliberate operator action.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::domain::{EvseId, EvseStatus, OperatorId};
use crate::hierarchy::ChargingStationOperator;

/// Outcome of comparing an observed snapshot against the current tree,
/// bound to the operator and observation time it was computed for. Ordered
/// maps keep application and serialization deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvseStatusDiff {
    /// Operator whose tree the observation describes
    pub operator_id: OperatorId,
    /// When the snapshot was observed
    pub timestamp: DateTime<Utc>,
    /// Observed EVSEs the current tree does not know
    pub new_status: BTreeMap<EvseId, EvseStatus>,
    /// Known EVSEs whose observed status differs
    pub changed_status: BTreeMap<EvseId, EvseStatus>,
    /// Known EVSEs absent from the observation
    pub removed_ids: BTreeSet<EvseId>,
}

impl EvseStatusDiff {
    pub fn empty(operator_id: OperatorId, timestamp: DateTime<Utc>) -> Self {
        Self {
            operator_id,
            timestamp,
            new_status: BTreeMap::new(),
            changed_status: BTreeMap::new(),
            removed_ids: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new_status.is_empty() && self.changed_status.is_empty() && self.removed_ids.is_empty()
    }
}

/// Compare an observed snapshot against the current one.
pub fn compute_diff(
    operator_id: &OperatorId,
    timestamp: DateTime<Utc>,
    observed: &BTreeMap<EvseId, EvseStatus>,
    current: &BTreeMap<EvseId, EvseStatus>,
) -> EvseStatusDiff {
    let mut diff = EvseStatusDiff::empty(operator_id.clone(), timestamp);
    for (id, status) in observed {
        match current.get(id) {
            None => {
                diff.new_status.insert(id.clone(), *status);
            }
            Some(existing) if existing != status => {
                diff.changed_status.insert(id.clone(), *status);
            }
            Some(_) => {}
        }
    }
    for id in current.keys() {
        if !observed.contains_key(id) {
            diff.removed_ids.insert(id.clone());
        }
    }
    diff
}

/// Apply a diff to an operator's tree. New and changed statuses are written
/// through `update_evse_status` with the diff's observation timestamp;
/// removed ids are reported, never acted on.
///
/// Fail-safe: an EVSE id the tree does not know aborts the remaining work
/// and returns an empty diff, so a stale observation cannot half-apply.
pub fn apply_diff(diff: EvseStatusDiff, operator: &ChargingStationOperator) -> EvseStatusDiff {
    for (id, status) in diff.new_status.iter().chain(diff.changed_status.iter()) {
        if operator.update_evse_status(id, *status, diff.timestamp).is_err() {
            warn!(
                "Status diff references unknown EVSE {}, aborting application",
                id
            );
            return EvseStatusDiff::empty(diff.operator_id, diff.timestamp);
        }
    }
    diff
}

// ── Tests ──────────────────────────────────────────────────────────────

//! Status enums for the charging hierarchy

use serde::{Deserialize, Serialize};

/// Administrative status, shared by every hierarchy level.
///
/// Anything other than `Operational` disables local dispatch at that node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminStatus {
    /// Planned but not yet deployed
    Planned,
    /// Physically present, being commissioned
    InDeployment,
    /// In service and dispatchable
    Operational,
    /// Taken out of service by the operator
    OutOfService,
}

impl AdminStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "Planned",
            Self::InDeployment => "InDeployment",
            Self::Operational => "Operational",
            Self::OutOfService => "OutOfService",
        }
    }

    /// Scalar value used for deterministic cross-schedule ordering.
    pub fn scalar(&self) -> u8 {
        match self {
            Self::Planned => 0,
            Self::InDeployment => 1,
            Self::Operational => 2,
            Self::OutOfService => 3,
        }
    }

    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Operational)
    }
}

impl std::fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operational status of a single EVSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvseStatus {
    /// Ready for a new reservation or session
    Available,
    /// Held by an active reservation
    Reserved,
    /// A charging session is in progress
    Charging,
    /// Faulted or administratively disabled
    OutOfService,
    /// No recent data from the charge point
    Offline,
    /// Never observed
    Unknown,
}

impl EvseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Reserved => "Reserved",
            Self::Charging => "Charging",
            Self::OutOfService => "OutOfService",
            Self::Offline => "Offline",
            Self::Unknown => "Unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "Available" => Self::Available,
            "Reserved" => Self::Reserved,
            "Charging" => Self::Charging,
            "OutOfService" => Self::OutOfService,
            "Offline" => Self::Offline,
            _ => Self::Unknown,
        }
    }

    /// Scalar value used for deterministic cross-schedule ordering.
    pub fn scalar(&self) -> u8 {
        match self {
            Self::Available => 0,
            Self::Reserved => 1,
            Self::Charging => 2,
            Self::OutOfService => 3,
            Self::Offline => 4,
            Self::Unknown => 5,
        }
    }
}

impl std::fmt::Display for EvseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregated operational status for stations, pools and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateStatus {
    /// All children available
    Available,
    /// Some children available
    PartiallyAvailable,
    /// No children available
    Unavailable,
    /// No children, or no data yet
    Unknown,
}

impl AggregateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::PartiallyAvailable => "PartiallyAvailable",
            Self::Unavailable => "Unavailable",
            Self::Unknown => "Unknown",
        }
    }

    pub fn scalar(&self) -> u8 {
        match self {
            Self::Available => 0,
            Self::PartiallyAvailable => 1,
            Self::Unavailable => 2,
            Self::Unknown => 3,
        }
    }
}

impl std::fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evse_status_string_roundtrip() {
        for status in &[
            EvseStatus::Available,
            EvseStatus::Reserved,
            EvseStatus::Charging,
            EvseStatus::OutOfService,
            EvseStatus::Offline,
            EvseStatus::Unknown,
        ] {
            assert_eq!(&EvseStatus::from_str(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_string_maps_to_unknown() {
        assert_eq!(EvseStatus::from_str("Bogus"), EvseStatus::Unknown);
    }

    #[test]
    fn only_operational_admin_status_dispatches() {
        assert!(AdminStatus::Operational.is_operational());
        assert!(!AdminStatus::OutOfService.is_operational());
        assert!(!AdminStatus::Planned.is_operational());
    }
}

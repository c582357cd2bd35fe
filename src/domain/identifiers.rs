//! Typed entity identifiers
//!
//! One generic, string-backed identifier covers every entity kind in the
//! hierarchy. Identifier grammar (eMI3 country/operator/suffix formats such
//! as `DE*ABC*E1`) is deliberately out of scope: values are opaque, compared
//! lexicographically, and stable for the life of the process.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::shared::{CoreError, CoreResult};

/// Marker trait tying an [`EntityId`] to the kind of entity it names.
pub trait IdKind {
    /// Human-readable kind name, used in errors and logs.
    const KIND: &'static str;
}

macro_rules! id_kinds {
    ($($(#[$meta:meta])* $marker:ident => $kind:literal as $alias:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug)]
            pub enum $marker {}

            impl IdKind for $marker {
                const KIND: &'static str = $kind;
            }

            pub type $alias = EntityId<$marker>;
        )+
    };
}

id_kinds! {
    /// A roaming network aggregating operators and providers.
    NetworkKind => "roaming network" as NetworkId;
    /// A charging station operator.
    OperatorKind => "charging station operator" as OperatorId;
    /// A charging pool.
    PoolKind => "charging pool" as PoolId;
    /// A charging station.
    StationKind => "charging station" as StationId;
    /// An EVSE, the leaf of the hierarchy.
    EvseKind => "EVSE" as EvseId;
    /// A charging reservation.
    ReservationKind => "charging reservation" as ReservationId;
    /// A charging session.
    SessionKind => "charging session" as SessionId;
    /// An e-mobility provider.
    ProviderKind => "e-mobility provider" as ProviderId;
}

/// Opaque, immutable identifier for one entity kind.
///
/// Cheap to clone (`Arc<str>` backed), hashable, and totally ordered by the
/// backing string so listings keyed by id are deterministic.
pub struct EntityId<K: IdKind> {
    value: Arc<str>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: IdKind> EntityId<K> {
    /// Wrap a caller-supplied identifier string.
    ///
    /// The only validation performed is the non-empty precondition; grammar
    /// belongs to the parsing layer outside this core.
    pub fn new(value: impl AsRef<str>) -> CoreResult<Self> {
        let value = value.as_ref();
        if value.trim().is_empty() {
            return Err(CoreError::EmptyIdentifier { kind: K::KIND });
        }
        Ok(Self {
            value: Arc::from(value),
            _kind: PhantomData,
        })
    }

    /// Generate a fresh identifier with a uuid suffix.
    ///
    /// Used for reservation and session ids minted by a local dispatch.
    pub fn random(prefix: &str) -> Self {
        Self {
            value: Arc::from(format!("{}{}", prefix, Uuid::new_v4()).as_str()),
            _kind: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<K: IdKind> Clone for EntityId<K> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            _kind: PhantomData,
        }
    }
}

impl<K: IdKind> PartialEq for EntityId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<K: IdKind> Eq for EntityId<K> {}

impl<K: IdKind> PartialOrd for EntityId<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: IdKind> Ord for EntityId<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<K: IdKind> Hash for EntityId<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<K: IdKind> fmt::Debug for EntityId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", K::KIND, self.value)
    }
}

impl<K: IdKind> fmt::Display for EntityId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<K: IdKind> Serialize for EntityId<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, K: IdKind> Deserialize<'de> for EntityId<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        EntityId::new(&value).map_err(serde::de::Error::custom)
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_empty() {
        assert!(EvseId::new("").is_err());
        assert!(EvseId::new("   ").is_err());
        assert!(EvseId::new("DE*ABC*E1").is_ok());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = PoolId::new("DE*ABC*P1").unwrap();
        let b = PoolId::new("DE*ABC*P2").unwrap();
        let c = PoolId::new("FR*XYZ*P1").unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn equality_and_hash_by_value() {
        use std::collections::HashSet;
        let a = ReservationId::new("R-1").unwrap();
        let b = ReservationId::new("R-1").unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn random_ids_are_unique() {
        let a = SessionId::random("S-");
        let b = SessionId::random("S-");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("S-"));
    }

    #[test]
    fn serde_as_plain_string() {
        let id = EvseId::new("DE*ABC*E1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"DE*ABC*E1\"");
        let back: EvseId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

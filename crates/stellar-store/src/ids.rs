//! Typed UUID identifiers for every table.
//!
//! Each table key gets its own newtype so a [`PlanetId`] can never be passed
//! where a [`PlayerId`] is expected. Ids are opaque v4 UUIDs; ordering is the
//! lexicographic UUID order, which the tick processor relies on for stable
//! scan order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Mint a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Key of a `games` row.
    GameId
);
define_id!(
    /// Key of a `players` row. Shared across games.
    PlayerId
);
define_id!(
    /// Key of a `systems` (planet) row.
    PlanetId
);
define_id!(
    /// Key of a `planet_attacks` row.
    AttackId
);
define_id!(
    /// Key of a `territory_sectors` row.
    SectorId
);
define_id!(
    /// Key of a `structures` row.
    StructureId
);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = GameId::new();
        let b = GameId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn id_serializes_as_bare_uuid() {
        let id = PlayerId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
        let back: PlayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn id_ordering_matches_uuid_ordering() {
        let mut ids: Vec<PlanetId> = (0..16).map(|_| PlanetId::new()).collect();
        ids.sort();
        for pair in ids.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
        }
    }
}

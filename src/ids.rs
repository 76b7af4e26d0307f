//! String-keyed content identifiers.
//!
//! Every cross-reference in a definition (terrain, furniture, item groups,
//! monster groups, ...) is an opaque string id. Ids are validated against
//! the catalog when a definition is compiled; at apply time they are
//! assumed resolvable.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Base terrain of a map cell.
    TerrainId
);
string_id!(
    /// Furniture placed on top of terrain.
    FurnId
);
string_id!(
    /// A trap occupying a cell.
    TrapId
);
string_id!(
    /// A field effect (smoke, acid, ...) on a cell.
    FieldId
);
string_id!(
    /// A single item type.
    ItemId
);
string_id!(
    /// A named, weighted collection of item types.
    ItemGroupId
);
string_id!(
    /// A single monster type.
    MonsterId
);
string_id!(
    /// A named, weighted collection of monster types.
    MonsterGroupId
);
string_id!(
    /// A vehicle type or named group of vehicle types.
    VehicleGroupId
);
string_id!(
    /// A faction that can own map regions.
    FactionId
);
string_id!(
    /// A zone category (loot sorting, no-spawn, ...).
    ZoneTypeId
);
string_id!(
    /// Overmap terrain key a primary definition is registered under.
    OmTerrainId
);
string_id!(
    /// A named symbol palette.
    PaletteId
);
string_id!(
    /// A reusable nested map fragment.
    NestedId
);
string_id!(
    /// An update definition applied to an already-generated tile.
    UpdateId
);
string_id!(
    /// A named terrain/furniture substitution rule set.
    TransformId
);
string_id!(
    /// A named pool of snippet texts for signs and graffiti.
    SnippetId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_as_str() {
        let id = TerrainId::new("t_floor");
        assert_eq!(id.as_str(), "t_floor");
        assert_eq!(id.to_string(), "t_floor");
    }

    #[test]
    fn test_ids_hash_by_content() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(OmTerrainId::new("house"));
        assert!(set.contains(&OmTerrainId::from("house")));
        assert!(!set.contains(&OmTerrainId::from("office")));
    }
}

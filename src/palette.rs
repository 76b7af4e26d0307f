//! Symbol palettes: the tables that give the characters of a `rows`
//! template their meaning.
//!
//! A palette maps one-character symbols to a base terrain, a base
//! furniture, and/or a list of placement pieces, and may pull in other
//! palettes by name. Composition is override: when two palettes define the
//! same symbol, the later one wins outright.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::catalog::Catalog;
use crate::ids::{FurnId, PaletteId, TerrainId};
use crate::loader::{DeferList, LoadError};
use crate::pieces::{parse_placement, Piece, PieceKind};

/// Placement categories a palette (or a `mapping` entry) recognizes,
/// keyed by their member name in the definition source.
pub const PALETTE_CATEGORIES: [(&str, PieceKind); 23] = [
    ("fields", PieceKind::Field),
    ("signs", PieceKind::Sign),
    ("vendingmachines", PieceKind::VendingMachine),
    ("toilets", PieceKind::Toilet),
    ("gaspumps", PieceKind::GasPump),
    ("items", PieceKind::ItemGroup),
    ("monsters", PieceKind::MonsterGroup),
    ("vehicles", PieceKind::Vehicle),
    ("item", PieceKind::Item),
    ("traps", PieceKind::Trap),
    ("monster", PieceKind::Monster),
    ("furniture", PieceKind::Furniture),
    ("terrain", PieceKind::Terrain),
    ("rubble", PieceKind::Rubble),
    ("computers", PieceKind::Computer),
    ("sealed_item", PieceKind::SealedItem),
    ("nested", PieceKind::Nested),
    ("liquids", PieceKind::Liquid),
    ("graffiti", PieceKind::Graffiti),
    ("translate", PieceKind::Translate),
    ("zones", PieceKind::Zone),
    ("ter_furn_transforms", PieceKind::Transform),
    ("faction_owner_character", PieceKind::Faction),
];

/// A symbol table, either named and registered or inline in a definition.
#[derive(Clone, Debug, Default)]
pub struct Palette {
    pub id: Option<PaletteId>,
    includes: Vec<PaletteId>,
    /// `None` marks a symbol whose terrain comes from a placement piece,
    /// which still counts as "defined" for template coverage.
    terrain: HashMap<char, Option<TerrainId>>,
    furniture: HashMap<char, FurnId>,
    placings: HashMap<char, Vec<Arc<Piece>>>,
}

impl Palette {
    /// Parse a palette from a definition object. Named palettes require an
    /// `id`; the inline palette of a mapgen object does not carry one.
    pub fn load(
        jo: &Map<String, Value>,
        require_id: bool,
        catalog: &Catalog,
        defer: &mut DeferList,
        context: &str,
    ) -> Result<Self, LoadError> {
        let mut palette = Palette::default();

        if require_id {
            let id = jo
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| LoadError::structure(context, "named palette needs an id"))?;
            palette.id = Some(PaletteId::new(id));
        }

        if let Some(arr) = jo.get("palettes").and_then(Value::as_array) {
            for entry in arr {
                let name = entry.as_str().ok_or_else(|| {
                    LoadError::structure(context, "palette references must be strings")
                })?;
                palette.includes.push(PaletteId::new(name));
            }
        }

        if let Some(table) = jo.get("terrain").and_then(Value::as_object) {
            for (key, value) in table {
                let key = symbol(key, context)?;
                match value {
                    Value::String(id) => {
                        let ter = TerrainId::new(id.as_str());
                        if !catalog.has_terrain(&ter) {
                            defer.record("terrain", format!("no such terrain \"{ter}\""));
                        }
                        palette.terrain.insert(key, Some(ter));
                    }
                    other => {
                        let pieces =
                            parse_placement(PieceKind::Terrain, other, catalog, defer, context)?;
                        if !pieces.is_empty() {
                            // Defined through a piece: coverage is satisfied
                            // even though there is no single base terrain.
                            palette.terrain.insert(key, None);
                        }
                        palette
                            .placings
                            .entry(key)
                            .or_default()
                            .extend(pieces.into_iter().map(Arc::new));
                    }
                }
            }
        }

        if let Some(table) = jo.get("furniture").and_then(Value::as_object) {
            for (key, value) in table {
                let key = symbol(key, context)?;
                match value {
                    Value::String(id) => {
                        let furn = FurnId::new(id.as_str());
                        if !catalog.has_furniture(&furn) {
                            defer.record("furniture", format!("no such furniture \"{furn}\""));
                        }
                        palette.furniture.insert(key, furn);
                    }
                    other => {
                        let pieces =
                            parse_placement(PieceKind::Furniture, other, catalog, defer, context)?;
                        palette
                            .placings
                            .entry(key)
                            .or_default()
                            .extend(pieces.into_iter().map(Arc::new));
                    }
                }
            }
        }

        for (member, kind) in PALETTE_CATEGORIES {
            // terrain and furniture were consumed above as base tables.
            if member == "terrain" || member == "furniture" {
                continue;
            }
            let Some(table) = jo.get(member).and_then(Value::as_object) else { continue };
            for (key, value) in table {
                let key = symbol(key, context)?;
                let context = format!("{member} {key} in {context}");
                let pieces = parse_placement(kind, value, catalog, defer, &context)?;
                palette
                    .placings
                    .entry(key)
                    .or_default()
                    .extend(pieces.into_iter().map(Arc::new));
            }
        }

        if let Some(mapping) = jo.get("mapping").and_then(Value::as_object) {
            for (key, sub) in mapping {
                let key = symbol(key, context)?;
                let sub = sub.as_object().ok_or_else(|| {
                    LoadError::structure(context, "mapping entries must be objects")
                })?;
                for (member, kind) in PALETTE_CATEGORIES {
                    let Some(value) = sub.get(member) else { continue };
                    let context = format!("{member} in mapping in {context}");
                    let pieces = parse_placement(kind, value, catalog, defer, &context)?;
                    palette
                        .placings
                        .entry(key)
                        .or_default()
                        .extend(pieces.into_iter().map(Arc::new));
                }
            }
        }

        Ok(palette)
    }

    /// Merge another palette's symbols over this one, later wins per key.
    pub fn add(&mut self, other: &Palette) {
        for (key, value) in &other.terrain {
            self.terrain.insert(*key, value.clone());
        }
        for (key, value) in &other.furniture {
            self.furniture.insert(*key, value.clone());
        }
        for (key, value) in &other.placings {
            self.placings.insert(*key, value.clone());
        }
    }

    /// Resolve includes through the registry and flatten into one table:
    /// includes first in order, this palette's own entries last.
    pub fn flattened(&self, registry: &PaletteRegistry, defer: &mut DeferList) -> Palette {
        let mut out = Palette::default();
        let mut stack = Vec::new();
        self.flatten_into(&mut out, registry, defer, &mut stack);
        out
    }

    fn flatten_into(
        &self,
        out: &mut Palette,
        registry: &PaletteRegistry,
        defer: &mut DeferList,
        stack: &mut Vec<PaletteId>,
    ) {
        for include in &self.includes {
            if stack.contains(include) {
                log::warn!("palette include cycle through {include}");
                continue;
            }
            match registry.get(include) {
                Some(included) => {
                    stack.push(include.clone());
                    included.flatten_into(out, registry, defer, stack);
                    stack.pop();
                }
                None => defer.record("palettes", format!("no such palette \"{include}\"")),
            }
        }
        out.add(self);
    }

    pub fn terrain_entry(&self, key: char) -> Option<&Option<TerrainId>> {
        self.terrain.get(&key)
    }

    pub fn furniture_entry(&self, key: char) -> Option<&FurnId> {
        self.furniture.get(&key)
    }

    pub fn placings_entry(&self, key: char) -> Option<&[Arc<Piece>]> {
        self.placings.get(&key).map(Vec::as_slice)
    }

    pub fn has_terrain_table(&self) -> bool {
        !self.terrain.is_empty()
    }
}

/// The global table of named palettes for one load batch.
#[derive(Debug, Default)]
pub struct PaletteRegistry {
    palettes: HashMap<PaletteId, Palette>,
}

impl PaletteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, palette: Palette) {
        if let Some(id) = palette.id.clone() {
            self.palettes.insert(id, palette);
        }
    }

    pub fn get(&self, id: &PaletteId) -> Option<&Palette> {
        self.palettes.get(id)
    }

    pub fn len(&self) -> usize {
        self.palettes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palettes.is_empty()
    }
}

/// Template symbols are exactly one character.
fn symbol(key: &str, context: &str) -> Result<char, LoadError> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(LoadError::structure(
            context,
            format!("map key \"{key}\" must be exactly one character"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        for def in [
            json!({ "id": "t_grass" }),
            json!({ "id": "t_floor" }),
            json!({ "id": "t_wall" }),
        ] {
            c.load_definition("terrain", &def).unwrap();
        }
        c.load_definition("furniture", &json!({ "id": "f_table" })).unwrap();
        c.load_definition(
            "item_group",
            &json!({ "id": "tools", "items": [["hammer", 100]] }),
        )
        .unwrap();
        c.load_definition("item", &json!({ "id": "hammer" })).unwrap();
        c
    }

    fn load_named(v: &Value, catalog: &Catalog) -> Palette {
        let mut defer = DeferList::default();
        let palette =
            Palette::load(v.as_object().unwrap(), true, catalog, &mut defer, "palette test")
                .unwrap();
        assert!(defer.is_empty(), "unexpected deferral: {:?}", defer.first());
        palette
    }

    #[test]
    fn test_terrain_and_furniture_tables() {
        let catalog = catalog();
        let palette = load_named(
            &json!({
                "id": "base",
                "terrain": { ".": "t_grass", "w": "t_wall" },
                "furniture": { "T": "f_table" }
            }),
            &catalog,
        );
        assert_eq!(
            palette.terrain_entry('.').unwrap().as_ref().unwrap().as_str(),
            "t_grass"
        );
        assert_eq!(palette.furniture_entry('T').unwrap().as_str(), "f_table");
        assert!(palette.terrain_entry('x').is_none());
    }

    #[test]
    fn test_later_palette_overrides_earlier_symbol() {
        let catalog = catalog();
        let mut registry = PaletteRegistry::new();
        registry.insert(load_named(
            &json!({ "id": "a", "terrain": { "x": "t_grass" } }),
            &catalog,
        ));
        registry.insert(load_named(
            &json!({ "id": "b", "terrain": { "x": "t_floor" } }),
            &catalog,
        ));

        let user = load_named(&json!({ "id": "user", "palettes": ["a", "b"] }), &catalog);
        let mut defer = DeferList::default();
        let flat = user.flattened(&registry, &mut defer);
        assert!(defer.is_empty());
        assert_eq!(
            flat.terrain_entry('x').unwrap().as_ref().unwrap().as_str(),
            "t_floor"
        );
    }

    #[test]
    fn test_unknown_include_is_deferred() {
        let catalog = catalog();
        let registry = PaletteRegistry::new();
        let user = load_named(&json!({ "id": "user", "palettes": ["missing"] }), &catalog);
        let mut defer = DeferList::default();
        user.flattened(&registry, &mut defer);
        let (member, message) = defer.first().unwrap();
        assert_eq!(member, "palettes");
        assert!(message.contains("missing"));
    }

    #[test]
    fn test_symbol_categories_collect_pieces() {
        let catalog = catalog();
        let palette = load_named(
            &json!({
                "id": "stocked",
                "terrain": { "=": "t_floor" },
                "items": { "=": { "item": "tools", "chance": 70 } }
            }),
            &catalog,
        );
        assert_eq!(palette.placings_entry('=').unwrap().len(), 1);
    }

    #[test]
    fn test_mapping_entries_collect_pieces() {
        let catalog = catalog();
        let palette = load_named(
            &json!({
                "id": "mapped",
                "terrain": { "&": "t_floor" },
                "mapping": {
                    "&": {
                        "items": { "item": "tools" },
                        "furniture": "f_table"
                    }
                }
            }),
            &catalog,
        );
        // one item group piece plus one furniture piece
        assert_eq!(palette.placings_entry('&').unwrap().len(), 2);
    }

    #[test]
    fn test_multichar_symbol_is_rejected() {
        let catalog = catalog();
        let mut defer = DeferList::default();
        let v = json!({ "id": "bad", "terrain": { "ab": "t_grass" } });
        let err = Palette::load(v.as_object().unwrap(), true, &catalog, &mut defer, "palette bad");
        assert!(err.is_err());
    }
}

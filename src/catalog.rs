//! The content catalog: every non-mapgen definition type identifiers can
//! reference.
//!
//! Terrain, furniture, traps, items, item groups, monsters, monster
//! groups, vehicle groups, snippet pools and terrain transforms are loaded
//! in the same batch as the mapgen definitions; compiled plans validate
//! all of their references against this catalog, which is what makes
//! forward references within one batch order-independent.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

use crate::grid::TileGrid;
use crate::ids::{
    FieldId, FurnId, ItemGroupId, ItemId, MonsterGroupId, MonsterId, SnippetId, TerrainId,
    TransformId, TrapId, VehicleGroupId,
};
use crate::loader::LoadError;
use crate::weighted::WeightedList;

/// A terrain type: flags, display glyph, optional bash degradation.
#[derive(Clone, Debug, Deserialize)]
pub struct TerrainDef {
    pub id: TerrainId,
    #[serde(default)]
    pub flags: HashSet<String>,
    #[serde(default)]
    pub bash_to: Option<TerrainId>,
    #[serde(default)]
    pub symbol: Option<char>,
}

/// A furniture type. The `PLANT` flag gates the sealed-item rules.
#[derive(Clone, Debug, Deserialize)]
pub struct FurnDef {
    pub id: FurnId,
    #[serde(default)]
    pub flags: HashSet<String>,
    #[serde(default)]
    pub bash_to: Option<FurnId>,
    #[serde(default)]
    pub symbol: Option<char>,
}

/// An item type; `seed` marks items plantable inside PLANT furniture.
#[derive(Clone, Debug, Deserialize)]
pub struct ItemDef {
    pub id: ItemId,
    #[serde(default)]
    pub seed: bool,
}

/// One terrain substitution rule of a named transform.
#[derive(Clone, Debug)]
pub struct TerRule {
    pub valid: Vec<TerrainId>,
    pub result: TerrainId,
}

/// One furniture substitution rule of a named transform.
#[derive(Clone, Debug)]
pub struct FurnRule {
    pub valid: Vec<FurnId>,
    pub result: FurnId,
}

/// A named terrain/furniture substitution applied to single cells.
#[derive(Clone, Debug, Default)]
pub struct TerFurnTransform {
    pub terrain: Vec<TerRule>,
    pub furniture: Vec<FurnRule>,
}

impl TerFurnTransform {
    /// Rewrite one cell according to the first matching rule of each kind.
    pub fn apply(&self, grid: &mut TileGrid, x: usize, y: usize) {
        let ter = grid.ter(x, y).clone();
        if let Some(rule) = self.terrain.iter().find(|r| r.valid.contains(&ter)) {
            grid.set_ter(x, y, rule.result.clone());
        }
        if let Some(furn) = grid.furn(x, y).cloned() {
            if let Some(rule) = self.furniture.iter().find(|r| r.valid.contains(&furn)) {
                grid.set_furn(x, y, Some(rule.result.clone()));
            }
        }
    }
}

/// All loaded content definitions, keyed by id.
#[derive(Debug, Default)]
pub struct Catalog {
    terrain: HashMap<TerrainId, TerrainDef>,
    furniture: HashMap<FurnId, FurnDef>,
    traps: HashSet<TrapId>,
    fields: HashSet<FieldId>,
    items: HashMap<ItemId, ItemDef>,
    item_groups: HashMap<ItemGroupId, WeightedList<ItemId>>,
    monsters: HashSet<MonsterId>,
    monster_groups: HashMap<MonsterGroupId, WeightedList<MonsterId>>,
    vehicle_groups: HashSet<VehicleGroupId>,
    snippets: HashMap<SnippetId, Vec<String>>,
    transforms: HashMap<TransformId, TerFurnTransform>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_terrain(&mut self, def: TerrainDef) {
        self.terrain.insert(def.id.clone(), def);
    }

    pub fn add_furniture(&mut self, def: FurnDef) {
        self.furniture.insert(def.id.clone(), def);
    }

    pub fn add_trap(&mut self, id: TrapId) {
        self.traps.insert(id);
    }

    pub fn add_field(&mut self, id: FieldId) {
        self.fields.insert(id);
    }

    pub fn add_item(&mut self, def: ItemDef) {
        self.items.insert(def.id.clone(), def);
    }

    pub fn add_item_group(&mut self, id: ItemGroupId, entries: WeightedList<ItemId>) {
        self.item_groups.insert(id, entries);
    }

    pub fn add_monster(&mut self, id: MonsterId) {
        self.monsters.insert(id);
    }

    pub fn add_monster_group(&mut self, id: MonsterGroupId, entries: WeightedList<MonsterId>) {
        self.monster_groups.insert(id, entries);
    }

    pub fn add_vehicle_group(&mut self, id: VehicleGroupId) {
        self.vehicle_groups.insert(id);
    }

    pub fn add_snippets(&mut self, id: SnippetId, texts: Vec<String>) {
        self.snippets.entry(id).or_default().extend(texts);
    }

    pub fn add_transform(&mut self, id: TransformId, transform: TerFurnTransform) {
        self.transforms.insert(id, transform);
    }

    pub fn has_terrain(&self, id: &TerrainId) -> bool {
        self.terrain.contains_key(id)
    }

    pub fn has_furniture(&self, id: &FurnId) -> bool {
        self.furniture.contains_key(id)
    }

    pub fn has_trap(&self, id: &TrapId) -> bool {
        self.traps.contains(id)
    }

    pub fn has_field(&self, id: &FieldId) -> bool {
        self.fields.contains(id)
    }

    pub fn has_item(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn has_item_group(&self, id: &ItemGroupId) -> bool {
        self.item_groups.contains_key(id)
    }

    pub fn has_monster(&self, id: &MonsterId) -> bool {
        self.monsters.contains(id)
    }

    pub fn has_monster_group(&self, id: &MonsterGroupId) -> bool {
        self.monster_groups.contains_key(id)
    }

    pub fn has_vehicle_group(&self, id: &VehicleGroupId) -> bool {
        self.vehicle_groups.contains(id)
    }

    pub fn has_snippets(&self, id: &SnippetId) -> bool {
        self.snippets.contains_key(id)
    }

    pub fn has_transform(&self, id: &TransformId) -> bool {
        self.transforms.contains_key(id)
    }

    pub fn transform(&self, id: &TransformId) -> Option<&TerFurnTransform> {
        self.transforms.get(id)
    }

    pub fn ter_has_flag(&self, id: &TerrainId, flag: &str) -> bool {
        self.terrain.get(id).is_some_and(|t| t.flags.contains(flag))
    }

    pub fn furn_has_flag(&self, id: &FurnId, flag: &str) -> bool {
        self.furniture.get(id).is_some_and(|f| f.flags.contains(flag))
    }

    pub fn item_is_seed(&self, id: &ItemId) -> bool {
        self.items.get(id).is_some_and(|i| i.seed)
    }

    pub fn ter_bash_result(&self, id: &TerrainId) -> Option<TerrainId> {
        self.terrain.get(id).and_then(|t| t.bash_to.clone())
    }

    pub fn furn_bash_result(&self, id: &FurnId) -> Option<FurnId> {
        self.furniture.get(id).and_then(|f| f.bash_to.clone())
    }

    pub fn ter_symbol(&self, id: &TerrainId) -> char {
        self.terrain.get(id).and_then(|t| t.symbol).unwrap_or('.')
    }

    pub fn furn_symbol(&self, id: &FurnId) -> Option<char> {
        self.furniture.get(id).and_then(|f| f.symbol)
    }

    pub fn pick_from_item_group(
        &self,
        rng: &mut impl Rng,
        id: &ItemGroupId,
    ) -> Option<ItemId> {
        self.item_groups.get(id).and_then(|g| g.pick(rng)).cloned()
    }

    /// Every item type an item group can produce, for sealed-item checks.
    pub fn item_group_members(&self, id: &ItemGroupId) -> Vec<&ItemId> {
        self.item_groups
            .get(id)
            .map(|g| g.iter().map(|(item, _)| item).collect())
            .unwrap_or_default()
    }

    pub fn pick_from_monster_group(
        &self,
        rng: &mut impl Rng,
        id: &MonsterGroupId,
    ) -> Option<MonsterId> {
        self.monster_groups.get(id).and_then(|g| g.pick(rng)).cloned()
    }

    pub fn pick_snippet(&self, rng: &mut impl Rng, id: &SnippetId) -> Option<&str> {
        let pool = self.snippets.get(id)?;
        if pool.is_empty() {
            return None;
        }
        Some(pool[rng.gen_range(0..pool.len())].as_str())
    }

    /// Load one non-mapgen definition object, dispatched on its `type`.
    /// Returns whether the type was recognized.
    pub fn load_definition(&mut self, kind: &str, jo: &Value) -> Result<bool, LoadError> {
        match kind {
            "terrain" => {
                let def: TerrainDef = parse(jo, "terrain")?;
                self.add_terrain(def);
            }
            "furniture" => {
                let def: FurnDef = parse(jo, "furniture")?;
                self.add_furniture(def);
            }
            "trap" => self.add_trap(TrapId::new(require_id(jo, "trap")?)),
            "field_type" => self.add_field(FieldId::new(require_id(jo, "field_type")?)),
            "item" => {
                let def: ItemDef = parse(jo, "item")?;
                self.add_item(def);
            }
            "item_group" => {
                let id = ItemGroupId::new(require_id(jo, "item_group")?);
                let context = format!("item_group {id}");
                let entries = weighted_ids(jo, "items", &context)?
                    .into_iter()
                    .map(|(name, w)| (ItemId::new(name), w))
                    .collect();
                self.add_item_group(id, entries);
            }
            "monster" => self.add_monster(MonsterId::new(require_id(jo, "monster")?)),
            "monster_group" => {
                let id = MonsterGroupId::new(require_id(jo, "monster_group")?);
                let context = format!("monster_group {id}");
                let entries = weighted_ids(jo, "monsters", &context)?
                    .into_iter()
                    .map(|(name, w)| (MonsterId::new(name), w))
                    .collect();
                self.add_monster_group(id, entries);
            }
            "vehicle_group" => {
                self.add_vehicle_group(VehicleGroupId::new(require_id(jo, "vehicle_group")?))
            }
            "snippet" => {
                let id = SnippetId::new(require_id(jo, "snippet")?);
                let texts = jo
                    .get("text")
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                self.add_snippets(id, texts);
            }
            "ter_furn_transform" => {
                let id = TransformId::new(require_id(jo, "ter_furn_transform")?);
                let transform = parse_transform(jo, &format!("ter_furn_transform {id}"))?;
                self.add_transform(id, transform);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse<'a, T: Deserialize<'a>>(jo: &'a Value, kind: &str) -> Result<T, LoadError> {
    T::deserialize(jo).map_err(|e| LoadError::structure(kind, e.to_string()))
}

fn require_id<'a>(jo: &'a Value, kind: &str) -> Result<&'a str, LoadError> {
    jo.get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| LoadError::structure(kind, "missing \"id\""))
}

/// Parse `[["id", weight], "bare_id", ...]` into (id, weight) pairs;
/// a bare string gets the default weight 100.
fn weighted_ids(jo: &Value, key: &str, context: &str) -> Result<Vec<(String, u32)>, LoadError> {
    let arr = jo
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| LoadError::structure(context, format!("missing \"{key}\" array")))?;
    let mut out = Vec::with_capacity(arr.len());
    for entry in arr {
        match entry {
            Value::String(s) => out.push((s.clone(), 100)),
            Value::Array(pair) if pair.len() == 2 => {
                let name = pair[0].as_str().ok_or_else(|| {
                    LoadError::structure(context, "entry id must be a string")
                })?;
                let weight = pair[1].as_u64().ok_or_else(|| {
                    LoadError::structure(context, "entry weight must be an integer")
                })? as u32;
                out.push((name.to_string(), weight));
            }
            _ => {
                return Err(LoadError::structure(
                    context,
                    "entries must be \"id\" or [\"id\", weight]",
                ))
            }
        }
    }
    Ok(out)
}

fn parse_transform(jo: &Value, context: &str) -> Result<TerFurnTransform, LoadError> {
    let mut transform = TerFurnTransform::default();
    if let Some(rules) = jo.get("terrain").and_then(Value::as_array) {
        for rule in rules {
            let result = rule.get("result").and_then(Value::as_str).ok_or_else(|| {
                LoadError::structure(context, "terrain rule missing \"result\"")
            })?;
            let valid = string_list(rule.get("valid_terrain"), context)?;
            transform.terrain.push(TerRule {
                valid: valid.into_iter().map(TerrainId::new).collect(),
                result: TerrainId::new(result),
            });
        }
    }
    if let Some(rules) = jo.get("furniture").and_then(Value::as_array) {
        for rule in rules {
            let result = rule.get("result").and_then(Value::as_str).ok_or_else(|| {
                LoadError::structure(context, "furniture rule missing \"result\"")
            })?;
            let valid = string_list(rule.get("valid_furniture"), context)?;
            transform.furniture.push(FurnRule {
                valid: valid.into_iter().map(FurnId::new).collect(),
                result: FurnId::new(result),
            });
        }
    }
    Ok(transform)
}

fn string_list(v: Option<&Value>, context: &str) -> Result<Vec<String>, LoadError> {
    match v {
        None => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(arr)) => arr
            .iter()
            .map(|e| {
                e.as_str().map(str::to_string).ok_or_else(|| {
                    LoadError::structure(context, "expected a string or array of strings")
                })
            })
            .collect(),
        Some(_) => Err(LoadError::structure(
            context,
            "expected a string or array of strings",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn catalog_with(defs: &[Value]) -> Catalog {
        let mut catalog = Catalog::new();
        for def in defs {
            let kind = def.get("type").and_then(Value::as_str).unwrap();
            assert!(catalog.load_definition(kind, def).unwrap());
        }
        catalog
    }

    #[test]
    fn test_terrain_and_furniture_lookups() {
        let catalog = catalog_with(&[
            json!({ "type": "terrain", "id": "t_wall", "symbol": "#", "bash_to": "t_rubble" }),
            json!({ "type": "furniture", "id": "f_planter", "flags": ["PLANT"] }),
        ]);
        assert!(catalog.has_terrain(&TerrainId::new("t_wall")));
        assert!(!catalog.has_terrain(&TerrainId::new("t_floor")));
        assert_eq!(catalog.ter_symbol(&TerrainId::new("t_wall")), '#');
        assert_eq!(
            catalog.ter_bash_result(&TerrainId::new("t_wall")),
            Some(TerrainId::new("t_rubble"))
        );
        assert!(catalog.furn_has_flag(&FurnId::new("f_planter"), "PLANT"));
        assert!(!catalog.furn_has_flag(&FurnId::new("f_planter"), "SEALED"));
    }

    #[test]
    fn test_item_group_weighted_pick() {
        let catalog = catalog_with(&[json!({
            "type": "item_group",
            "id": "tools",
            "items": [["hammer", 1], "screwdriver"]
        })]);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let id = ItemGroupId::new("tools");
        assert!(catalog.has_item_group(&id));
        for _ in 0..20 {
            let picked = catalog.pick_from_item_group(&mut rng, &id).unwrap();
            assert!(matches!(picked.as_str(), "hammer" | "screwdriver"));
        }
        assert_eq!(catalog.item_group_members(&id).len(), 2);
    }

    #[test]
    fn test_snippet_pool() {
        let catalog = catalog_with(&[json!({
            "type": "snippet",
            "id": "warnings",
            "text": ["KEEP OUT", "DANGER"]
        })]);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let text = catalog.pick_snippet(&mut rng, &SnippetId::new("warnings")).unwrap();
        assert!(text == "KEEP OUT" || text == "DANGER");
        assert!(catalog.pick_snippet(&mut rng, &SnippetId::new("missing")).is_none());
    }

    #[test]
    fn test_transform_applies_first_matching_rule() {
        let catalog = catalog_with(&[json!({
            "type": "ter_furn_transform",
            "id": "flood",
            "terrain": [
                { "result": "t_water", "valid_terrain": ["t_grass", "t_dirt"] }
            ]
        })]);
        let mut grid = TileGrid::new(2, 2, TerrainId::new("t_grass"));
        grid.set_ter(1, 1, TerrainId::new("t_rock"));
        let transform = catalog.transform(&TransformId::new("flood")).unwrap();
        transform.apply(&mut grid, 0, 0);
        transform.apply(&mut grid, 1, 1);
        assert_eq!(grid.ter(0, 0).as_str(), "t_water");
        assert_eq!(grid.ter(1, 1).as_str(), "t_rock");
    }

    #[test]
    fn test_unknown_type_is_not_consumed() {
        let mut catalog = Catalog::new();
        let jo = json!({ "type": "recipe", "id": "x" });
        assert!(!catalog.load_definition("recipe", &jo).unwrap());
    }
}

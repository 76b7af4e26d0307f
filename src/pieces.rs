//! The placement piece family: typed operations that mutate the grid at a
//! resolved position.
//!
//! A piece is constructed from a definition object at load time and
//! applied zero or more times at generation time. Pieces receive the
//! *ranged* coordinates of their region: point-like pieces resolve a
//! concrete cell per call, rectangle pieces (item groups, zones, faction
//! stamps, monster groups) operate on the whole extent.
//!
//! Unresolvable identifiers never fail piece construction outright; they
//! are recorded against the load in progress and surface as one error
//! after the whole definition has been scanned.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde_json::{Map, Value};

use crate::grid::{
    ComputerFailure, ComputerOption, ComputerSpawn, FieldSpawn, MonsterSpawn, OwnershipStamp,
    TileGrid, VehicleSpawn, ZoneSpawn,
};
use crate::ids::{
    FactionId, FieldId, FurnId, ItemGroupId, ItemId, MonsterGroupId, MonsterId, NestedId,
    OmTerrainId, SnippetId, TerrainId, TransformId, TrapId, VehicleGroupId, ZoneTypeId,
};
use crate::loader::{get_bool, get_str, get_u32, require_str, DeferList, LoadError};
use crate::plan::GenContext;
use crate::range::IntRange;
use crate::rng::{one_in, x_in_y};
use crate::weighted::WeightedList;

/// Placement categories recognized in palettes and `place_*` arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PieceKind {
    Terrain,
    Furniture,
    Field,
    Trap,
    Item,
    ItemGroup,
    Loot,
    Monster,
    MonsterGroup,
    Vehicle,
    Sign,
    Graffiti,
    VendingMachine,
    Toilet,
    GasPump,
    Liquid,
    Computer,
    SealedItem,
    Rubble,
    Transform,
    Faction,
    Zone,
    Translate,
    Nested,
}

/// A single item spawn, reused standalone and inside sealed-item pieces.
#[derive(Clone, Debug)]
pub struct ItemSpawnPiece {
    pub item: ItemId,
    pub amount: IntRange,
    pub chance: IntRange,
    pub repeat: IntRange,
}

impl ItemSpawnPiece {
    fn parse(
        jo: &Map<String, Value>,
        catalog: &crate::catalog::Catalog,
        defer: &mut DeferList,
        context: &str,
    ) -> Result<Self, LoadError> {
        let item = ItemId::new(require_str(jo, "item", context)?);
        if !catalog.has_item(&item) {
            defer.record("item", format!("no such item \"{item}\""));
        }
        Ok(Self {
            item,
            amount: IntRange::from_obj_or(jo, "amount", IntRange::ONE, context)?,
            chance: IntRange::from_obj_or(jo, "chance", IntRange::fixed(100), context)?,
            repeat: IntRange::from_obj_or(jo, "repeat", IntRange::ONE, context)?,
        })
    }

    fn apply(&self, grid: &mut TileGrid, rng: &mut ChaCha8Rng, x: &IntRange, y: &IntRange) {
        let c = self.chance.resolve(rng).clamp(0, 100);
        if c != 100 && !x_in_y(rng, c as u32, 100) {
            return;
        }
        let px = x.resolve(rng) as usize;
        let py = y.resolve(rng) as usize;
        let amount = self.amount.resolve(rng).max(1) as u32;
        grid.add_item(px, py, self.item.clone(), amount);
    }
}

/// A spawn of one pull from an item group somewhere in the region.
#[derive(Clone, Debug)]
pub struct ItemGroupPiece {
    pub group: ItemGroupId,
    pub chance: IntRange,
    pub repeat: IntRange,
}

impl ItemGroupPiece {
    fn parse(
        jo: &Map<String, Value>,
        catalog: &crate::catalog::Catalog,
        defer: &mut DeferList,
        context: &str,
    ) -> Result<Self, LoadError> {
        let group = ItemGroupId::new(require_str(jo, "item", context)?);
        if !catalog.has_item_group(&group) {
            defer.record("item", format!("no such item group \"{group}\""));
        }
        Ok(Self {
            group,
            chance: IntRange::from_obj_or(jo, "chance", IntRange::fixed(100), context)?,
            repeat: IntRange::from_obj_or(jo, "repeat", IntRange::ONE, context)?,
        })
    }

    fn apply(
        &self,
        grid: &mut TileGrid,
        ctx: &GenContext,
        rng: &mut ChaCha8Rng,
        x: &IntRange,
        y: &IntRange,
    ) {
        let c = self.chance.resolve(rng).clamp(0, 100);
        if c != 100 && !x_in_y(rng, c as u32, 100) {
            return;
        }
        let px = x.resolve(rng) as usize;
        let py = y.resolve(rng) as usize;
        if let Some(item) = ctx.catalog.pick_from_item_group(rng, &self.group) {
            grid.add_item(px, py, item, 1);
        }
    }
}

/// Allow-lists for the eight compass neighbors and the terrain above;
/// matching is by substring, an empty list means unconstrained.
#[derive(Clone, Debug, Default)]
pub struct NeighborhoodCheck {
    dirs: [Vec<String>; 8],
    above: Vec<String>,
}

/// Compass directions in the order neighbor constraints are stored.
pub const DIRECTION_KEYS: [&str; 8] = [
    "north",
    "north_east",
    "east",
    "south_east",
    "south",
    "south_west",
    "west",
    "north_west",
];

impl NeighborhoodCheck {
    fn parse(jo: Option<&Value>, context: &str) -> Result<Self, LoadError> {
        let mut check = NeighborhoodCheck::default();
        let Some(jo) = jo else { return Ok(check) };
        let jo = jo.as_object().ok_or_else(|| {
            LoadError::structure(context, "\"neighbors\" must be an object")
        })?;
        for (i, key) in DIRECTION_KEYS.iter().enumerate() {
            check.dirs[i] = tags(jo.get(*key), context)?;
        }
        check.above = tags(jo.get("above"), context)?;
        Ok(check)
    }

    fn is_empty(&self) -> bool {
        self.above.is_empty() && self.dirs.iter().all(Vec::is_empty)
    }

    /// Every constrained direction must match at least one allowed entry.
    pub fn test(&self, ctx: &GenContext) -> bool {
        if self.is_empty() {
            return true;
        }
        for (i, allowed) in self.dirs.iter().enumerate() {
            if allowed.is_empty() {
                continue;
            }
            let actual = ctx.neighborhood.dir(i);
            if !matches_any(actual, allowed) {
                return false;
            }
        }
        if !self.above.is_empty() && !matches_any(ctx.neighborhood.above.as_ref(), &self.above) {
            return false;
        }
        true
    }
}

fn matches_any(actual: Option<&OmTerrainId>, allowed: &[String]) -> bool {
    match actual {
        Some(id) => allowed.iter().any(|a| id.as_str().contains(a.as_str())),
        None => false,
    }
}

fn tags(v: Option<&Value>, context: &str) -> Result<Vec<String>, LoadError> {
    match v {
        None => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(arr)) => arr
            .iter()
            .map(|e| {
                e.as_str().map(str::to_string).ok_or_else(|| {
                    LoadError::structure(context, "neighbor entries must be strings")
                })
            })
            .collect(),
        Some(_) => Err(LoadError::structure(
            context,
            "neighbor constraint must be a string or array of strings",
        )),
    }
}

/// One typed placement operation.
#[derive(Clone, Debug)]
pub enum Piece {
    Terrain {
        ter: TerrainId,
    },
    Furniture {
        furn: FurnId,
    },
    Field {
        field: FieldId,
        intensity: u32,
        age: u32,
    },
    Trap {
        trap: TrapId,
    },
    Item(ItemSpawnPiece),
    ItemGroup(ItemGroupPiece),
    Loot {
        group: Option<ItemGroupId>,
        item: Option<ItemId>,
        chance: u32,
    },
    Monster {
        ids: WeightedList<MonsterId>,
        group: Option<MonsterGroupId>,
        chance: IntRange,
        pack_size: IntRange,
        friendly: bool,
        name: Option<String>,
    },
    MonsterGroup {
        group: MonsterGroupId,
        chance: IntRange,
    },
    Vehicle {
        group: VehicleGroupId,
        chance: IntRange,
        rotation: Vec<i32>,
        fuel: i32,
        status: i32,
    },
    Sign {
        signage: Option<String>,
        snippet: Option<SnippetId>,
    },
    Graffiti {
        text: Option<String>,
        snippet: Option<SnippetId>,
    },
    VendingMachine {
        group: ItemGroupId,
        reinforced: bool,
    },
    Toilet {
        amount: IntRange,
    },
    GasPump {
        amount: IntRange,
        fuel: ItemId,
    },
    Liquid {
        liquid: ItemId,
        amount: IntRange,
        chance: IntRange,
    },
    Computer {
        name: String,
        security: u32,
        access_denied: Option<String>,
        options: Vec<ComputerOption>,
        failures: Vec<ComputerFailure>,
    },
    SealedItem {
        furniture: FurnId,
        chance: IntRange,
        item: Option<ItemSpawnPiece>,
        items: Option<ItemGroupPiece>,
    },
    Rubble {
        rubble_type: FurnId,
        items: bool,
        floor_type: TerrainId,
        overwrite: bool,
    },
    Transform {
        id: TransformId,
    },
    Faction {
        id: FactionId,
    },
    Zone {
        zone_type: ZoneTypeId,
        faction: FactionId,
        name: Option<String>,
    },
    Translate {
        from: TerrainId,
        to: TerrainId,
    },
    Nested {
        chunks: WeightedList<NestedId>,
        else_chunks: WeightedList<NestedId>,
        neighbors: NeighborhoodCheck,
    },
    /// Uniform choice among same-kind alternatives.
    Alternatives(Vec<Piece>),
}

impl Piece {
    /// The piece's own repeat request; the executor takes the maximum of
    /// this and the region's repeat.
    pub fn repeat(&self) -> IntRange {
        match self {
            Piece::Item(p) => p.repeat,
            Piece::ItemGroup(p) => p.repeat,
            _ => IntRange::ONE,
        }
    }

    /// Execute at a position drawn from the region.
    pub fn apply(
        &self,
        grid: &mut TileGrid,
        ctx: &GenContext,
        rng: &mut ChaCha8Rng,
        x: &IntRange,
        y: &IntRange,
    ) {
        match self {
            Piece::Terrain { ter } => {
                let px = x.resolve(rng) as usize;
                let py = y.resolve(rng) as usize;
                grid.set_ter(px, py, ter.clone());
                // A wall placed over furniture crushes it, and any loose
                // items unless the terrain stores them.
                if ctx.catalog.ter_has_flag(ter, "WALL") {
                    grid.set_furn(px, py, None);
                    if !ctx.catalog.ter_has_flag(ter, "PLACE_ITEM") {
                        grid.clear_items_at(px, py);
                    }
                }
            }
            Piece::Furniture { furn } => {
                grid.set_furn(x.resolve(rng) as usize, y.resolve(rng) as usize, Some(furn.clone()));
            }
            Piece::Field { field, intensity, age } => {
                grid.add_field(FieldSpawn {
                    x: x.resolve(rng) as usize,
                    y: y.resolve(rng) as usize,
                    field: field.clone(),
                    intensity: *intensity,
                    age: *age,
                });
            }
            Piece::Trap { trap } => {
                grid.set_trap(x.resolve(rng) as usize, y.resolve(rng) as usize, Some(trap.clone()));
            }
            Piece::Item(spawn) => spawn.apply(grid, rng, x, y),
            Piece::ItemGroup(group) => group.apply(grid, ctx, rng, x, y),
            Piece::Loot { group, item, chance } => {
                if rng.gen_range(0..100) >= *chance {
                    return;
                }
                let px = x.resolve(rng) as usize;
                let py = y.resolve(rng) as usize;
                if let Some(item) = item {
                    grid.add_item(px, py, item.clone(), 1);
                } else if let Some(group) = group {
                    if let Some(item) = ctx.catalog.pick_from_item_group(rng, group) {
                        grid.add_item(px, py, item, 1);
                    }
                }
            }
            Piece::Monster { ids, group, chance, pack_size, friendly, name } => {
                let odds = chance.resolve(rng).clamp(0, 100);
                if odds != 100 && !x_in_y(rng, odds as u32, 100) {
                    return;
                }
                let monster = match group {
                    Some(group) => ctx.catalog.pick_from_monster_group(rng, group),
                    None => ids.pick(rng).cloned(),
                };
                let Some(monster) = monster else { return };
                grid.add_spawn(MonsterSpawn {
                    x: x.resolve(rng) as usize,
                    y: y.resolve(rng) as usize,
                    monster,
                    count: pack_size.resolve(rng).max(1) as u32,
                    friendly: *friendly,
                    name: name.clone(),
                });
            }
            Piece::MonsterGroup { group, chance } => {
                let chance = chance.resolve(rng).max(1) as u32;
                if !one_in(rng, chance) {
                    return;
                }
                let Some(monster) = ctx.catalog.pick_from_monster_group(rng, group) else {
                    return;
                };
                grid.add_spawn(MonsterSpawn {
                    x: x.resolve(rng) as usize,
                    y: y.resolve(rng) as usize,
                    monster,
                    count: 1,
                    friendly: false,
                    name: None,
                });
            }
            Piece::Vehicle { group, chance, rotation, fuel, status } => {
                let chance = chance.resolve(rng).clamp(0, 100) as u32;
                if !x_in_y(rng, chance, 100) {
                    return;
                }
                let dir = rotation[rng.gen_range(0..rotation.len())];
                grid.add_vehicle(VehicleSpawn {
                    x: x.resolve(rng) as usize,
                    y: y.resolve(rng) as usize,
                    vehicle: group.clone(),
                    dir,
                    fuel: *fuel,
                    status: *status,
                });
            }
            Piece::Sign { signage, snippet } => {
                let px = x.resolve(rng) as usize;
                let py = y.resolve(rng) as usize;
                grid.set_furn(px, py, Some(FurnId::new("f_sign")));
                let text = resolve_text(signage.as_deref(), snippet.as_ref(), ctx, rng);
                if let Some(text) = text {
                    grid.set_signage(px, py, text);
                }
            }
            Piece::Graffiti { text, snippet } => {
                let px = x.resolve(rng) as usize;
                let py = y.resolve(rng) as usize;
                let text = resolve_text(text.as_deref(), snippet.as_ref(), ctx, rng);
                if let Some(text) = text {
                    grid.set_graffiti(px, py, text);
                }
            }
            Piece::VendingMachine { group, reinforced } => {
                let px = x.resolve(rng) as usize;
                let py = y.resolve(rng) as usize;
                let furn = if *reinforced { "f_vending_reinforced" } else { "f_vending_c" };
                grid.set_furn(px, py, Some(FurnId::new(furn)));
                if let Some(item) = ctx.catalog.pick_from_item_group(rng, group) {
                    grid.add_item(px, py, item, 1);
                }
            }
            Piece::Toilet { amount } => {
                let px = x.resolve(rng) as usize;
                let py = y.resolve(rng) as usize;
                let charges = match amount.resolve(rng) {
                    0 => rng.gen_range(6..=24),
                    c => c.max(1),
                };
                grid.set_furn(px, py, Some(FurnId::new("f_toilet")));
                grid.add_item(px, py, ItemId::new("water"), charges as u32);
            }
            Piece::GasPump { amount, fuel } => {
                let px = x.resolve(rng) as usize;
                let py = y.resolve(rng) as usize;
                let charges = match amount.resolve(rng) {
                    0 => rng.gen_range(10_000..=50_000),
                    c => c.max(1),
                };
                grid.set_ter(px, py, TerrainId::new("t_gas_pump"));
                grid.add_item(px, py, fuel.clone(), charges as u32);
            }
            Piece::Liquid { liquid, amount, chance } => {
                let chance = chance.resolve(rng).max(1) as u32;
                if !one_in(rng, chance) {
                    return;
                }
                let charges = amount.resolve(rng).max(1) as u32;
                grid.add_item(x.resolve(rng) as usize, y.resolve(rng) as usize, liquid.clone(), charges);
            }
            Piece::Computer { name, security, access_denied, options, failures } => {
                let px = x.resolve(rng) as usize;
                let py = y.resolve(rng) as usize;
                grid.set_furn(px, py, Some(FurnId::new("f_console")));
                grid.add_computer(ComputerSpawn {
                    x: px,
                    y: py,
                    name: name.clone(),
                    security: *security,
                    access_denied: access_denied.clone(),
                    options: options.clone(),
                    failures: failures.clone(),
                });
            }
            Piece::SealedItem { furniture, chance, item, items } => {
                let c = chance.resolve(rng).clamp(0, 100);
                if c != 100 && !x_in_y(rng, c as u32, 100) {
                    return;
                }
                let px = x.resolve(rng) as usize;
                let py = y.resolve(rng) as usize;
                grid.set_furn(px, py, None);
                if let Some(item) = item {
                    item.apply(grid, rng, x, y);
                }
                if let Some(items) = items {
                    items.apply(grid, ctx, rng, x, y);
                }
                grid.set_furn(px, py, Some(furniture.clone()));
            }
            Piece::Rubble { rubble_type, items, floor_type, overwrite } => {
                let px = x.resolve(rng) as usize;
                let py = y.resolve(rng) as usize;
                if *overwrite || grid.furn(px, py).is_none() {
                    grid.set_ter(px, py, floor_type.clone());
                    grid.set_furn(px, py, Some(rubble_type.clone()));
                }
                if *items {
                    grid.add_item(px, py, ItemId::new("rock"), 1);
                }
            }
            Piece::Transform { id } => {
                if let Some(transform) = ctx.catalog.transform(id) {
                    transform.apply(grid, x.resolve(rng) as usize, y.resolve(rng) as usize);
                }
            }
            Piece::Faction { id } => {
                grid.stamp_ownership(OwnershipStamp {
                    faction: id.clone(),
                    x1: x.lo.max(0) as usize,
                    y1: y.lo.max(0) as usize,
                    x2: x.hi.max(0) as usize,
                    y2: y.hi.max(0) as usize,
                });
            }
            Piece::Zone { zone_type, faction, name } => {
                grid.add_zone(ZoneSpawn {
                    zone_type: zone_type.clone(),
                    faction: faction.clone(),
                    name: name.clone(),
                    x1: x.lo.max(0) as usize,
                    y1: y.lo.max(0) as usize,
                    x2: x.hi.max(0) as usize,
                    y2: y.hi.max(0) as usize,
                });
            }
            Piece::Translate { from, to } => {
                grid.translate_ter(from, to);
            }
            Piece::Nested { chunks, else_chunks, neighbors } => {
                let selected = if neighbors.test(ctx) { chunks } else { else_chunks };
                let Some(id) = selected.pick(rng) else { return };
                if id.as_str().is_empty() || id.as_str() == "null" {
                    return;
                }
                let Some(plans) = ctx.registry.nested_plans(id) else {
                    log::warn!("unknown nested mapgen id {id}");
                    return;
                };
                if let Some(plan) = plans.pick(rng).cloned() {
                    let offset = (x.resolve(rng), y.resolve(rng));
                    plan.nest(grid, ctx, rng, offset);
                }
            }
            Piece::Alternatives(alternatives) => {
                if alternatives.is_empty() {
                    return;
                }
                let chosen = &alternatives[rng.gen_range(0..alternatives.len())];
                chosen.apply(grid, ctx, rng, x, y);
            }
        }
    }

    /// Whether executing at the cell would clobber a vehicle. Only
    /// cell-content placements are collision-sensitive.
    pub fn has_vehicle_collision(
        &self,
        grid: &TileGrid,
        ctx: &GenContext,
        rng: &mut ChaCha8Rng,
        x: usize,
        y: usize,
    ) -> bool {
        match self {
            Piece::Terrain { .. }
            | Piece::Furniture { .. }
            | Piece::Trap { .. }
            | Piece::Sign { .. }
            | Piece::VendingMachine { .. }
            | Piece::Toilet { .. }
            | Piece::GasPump { .. }
            | Piece::Computer { .. }
            | Piece::SealedItem { .. }
            | Piece::Rubble { .. }
            | Piece::Vehicle { .. }
            | Piece::Alternatives(_) => grid.veh_at(x, y),
            Piece::Nested { chunks, else_chunks, neighbors } => {
                let selected = if neighbors.test(ctx) { chunks } else { else_chunks };
                for (id, _) in selected.iter() {
                    if id.as_str() == "null" {
                        continue;
                    }
                    let Some(plans) = ctx.registry.nested_plans(id) else {
                        return false;
                    };
                    for (plan, _) in plans.iter() {
                        if plan.has_vehicle_collision(grid, ctx, rng, (x as i32, y as i32)) {
                            return true;
                        }
                    }
                }
                false
            }
            _ => false,
        }
    }

    /// Post-load validation; sealed items enforce the plant/seed rules.
    pub fn check(&self, catalog: &crate::catalog::Catalog, context: &str) -> Result<(), LoadError> {
        match self {
            Piece::SealedItem { furniture, item, items, .. } => {
                let summary = format!("sealed_item in {context} using furniture {furniture}");
                if item.is_none() && items.is_none() {
                    return Err(LoadError::structure(
                        &summary,
                        "specifies neither an item nor an item group; it should specify at least one",
                    ));
                }
                if !catalog.furn_has_flag(furniture, "PLANT") {
                    return Ok(());
                }
                // Plant furniture must seal exactly one seed item.
                if item.is_some() && items.is_some() {
                    return Err(LoadError::structure(
                        &summary,
                        "with flag PLANT specifies both an item and an item group; it should specify exactly one",
                    ));
                }
                if let Some(spawn) = item {
                    if spawn.amount != IntRange::ONE {
                        return Err(LoadError::structure(
                            &summary,
                            "with flag PLANT must spawn exactly one item",
                        ));
                    }
                    if spawn.chance != IntRange::fixed(100) {
                        return Err(LoadError::structure(
                            &summary,
                            "with flag PLANT must spawn its item unconditionally; move \"chance\" up to the sealed_item",
                        ));
                    }
                    if !catalog.item_is_seed(&spawn.item) {
                        return Err(LoadError::structure(
                            &summary,
                            format!("with flag PLANT spawns item {} which is not a seed", spawn.item),
                        ));
                    }
                }
                if let Some(group) = items {
                    if group.chance != IntRange::fixed(100) {
                        return Err(LoadError::structure(
                            &summary,
                            "with flag PLANT must spawn its item group unconditionally; move \"chance\" up to the sealed_item",
                        ));
                    }
                    for member in catalog.item_group_members(&group.group) {
                        if !catalog.item_is_seed(member) {
                            return Err(LoadError::structure(
                                &summary,
                                format!(
                                    "with flag PLANT uses item group {} which can produce non-seed item {member}",
                                    group.group
                                ),
                            ));
                        }
                    }
                }
                Ok(())
            }
            Piece::Alternatives(alternatives) => {
                for piece in alternatives {
                    piece.check(catalog, context)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Parse one piece of the given kind from a definition object.
pub fn parse_piece(
    kind: PieceKind,
    jo: &Map<String, Value>,
    catalog: &crate::catalog::Catalog,
    defer: &mut DeferList,
    context: &str,
) -> Result<Piece, LoadError> {
    match kind {
        PieceKind::Terrain => {
            let ter = TerrainId::new(require_str(jo, "ter", context)?);
            if !catalog.has_terrain(&ter) {
                defer.record("ter", format!("no such terrain \"{ter}\""));
            }
            Ok(Piece::Terrain { ter })
        }
        PieceKind::Furniture => {
            let furn = FurnId::new(require_str(jo, "furn", context)?);
            if !catalog.has_furniture(&furn) {
                defer.record("furn", format!("no such furniture \"{furn}\""));
            }
            Ok(Piece::Furniture { furn })
        }
        PieceKind::Field => {
            let field = FieldId::new(require_str(jo, "field", context)?);
            if !catalog.has_field(&field) {
                defer.record("field", format!("invalid field type \"{field}\""));
            }
            Ok(Piece::Field {
                field,
                intensity: get_u32(jo, "intensity", 1),
                age: get_u32(jo, "age", 0),
            })
        }
        PieceKind::Trap => {
            let trap = TrapId::new(require_str(jo, "trap", context)?);
            if !catalog.has_trap(&trap) {
                defer.record("trap", format!("no such trap \"{trap}\""));
            }
            Ok(Piece::Trap { trap })
        }
        PieceKind::Item => Ok(Piece::Item(ItemSpawnPiece::parse(jo, catalog, defer, context)?)),
        PieceKind::ItemGroup => {
            Ok(Piece::ItemGroup(ItemGroupPiece::parse(jo, catalog, defer, context)?))
        }
        PieceKind::Loot => {
            let group = get_str(jo, "group").map(ItemGroupId::new);
            let item = get_str(jo, "item").map(ItemId::new);
            if group.is_some() == item.is_some() {
                return Err(LoadError::structure(
                    context,
                    "loot must provide either \"item\" or \"group\"",
                ));
            }
            if let Some(group) = &group {
                if !catalog.has_item_group(group) {
                    defer.record("group", format!("no such item group \"{group}\""));
                }
            }
            if let Some(item) = &item {
                if !catalog.has_item(item) {
                    defer.record("item", format!("no such item \"{item}\""));
                }
            }
            Ok(Piece::Loot { group, item, chance: get_u32(jo, "chance", 100).min(100) })
        }
        PieceKind::Monster => parse_monster(jo, catalog, defer, context),
        PieceKind::MonsterGroup => {
            let group = MonsterGroupId::new(require_str(jo, "monster", context)?);
            if !catalog.has_monster_group(&group) {
                defer.record("monster", format!("no such monster group \"{group}\""));
            }
            Ok(Piece::MonsterGroup {
                group,
                chance: IntRange::from_obj_or(jo, "chance", IntRange::ONE, context)?,
            })
        }
        PieceKind::Vehicle => {
            let group = VehicleGroupId::new(require_str(jo, "vehicle", context)?);
            if !catalog.has_vehicle_group(&group) {
                defer.record("vehicle", format!("no such vehicle type or group \"{group}\""));
            }
            let rotation = match jo.get("rotation") {
                Some(Value::Array(arr)) => arr
                    .iter()
                    .map(|v| {
                        v.as_i64().map(|r| r as i32).ok_or_else(|| {
                            LoadError::structure(context, "rotation entries must be integers")
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Some(v) => vec![v.as_i64().unwrap_or(0) as i32],
                None => vec![0],
            };
            Ok(Piece::Vehicle {
                group,
                chance: IntRange::from_obj_or(jo, "chance", IntRange::ONE, context)?,
                rotation,
                fuel: jo.get("fuel").and_then(Value::as_i64).unwrap_or(-1) as i32,
                status: jo.get("status").and_then(Value::as_i64).unwrap_or(-1) as i32,
            })
        }
        PieceKind::Sign => {
            let signage = get_str(jo, "signage").map(str::to_string);
            let snippet = parse_snippet(jo, catalog, defer)?;
            if signage.is_none() && snippet.is_none() {
                return Err(LoadError::structure(
                    context,
                    "sign needs either signage or snippet",
                ));
            }
            Ok(Piece::Sign { signage, snippet })
        }
        PieceKind::Graffiti => {
            let text = get_str(jo, "text").map(str::to_string);
            let snippet = parse_snippet(jo, catalog, defer)?;
            if text.is_none() && snippet.is_none() {
                return Err(LoadError::structure(
                    context,
                    "graffiti needs either text or snippet",
                ));
            }
            Ok(Piece::Graffiti { text, snippet })
        }
        PieceKind::VendingMachine => {
            let group =
                ItemGroupId::new(get_str(jo, "item_group").unwrap_or("default_vending_machine"));
            if !catalog.has_item_group(&group) {
                defer.record("item_group", format!("no such item group \"{group}\""));
            }
            Ok(Piece::VendingMachine { group, reinforced: get_bool(jo, "reinforced", false) })
        }
        PieceKind::Toilet => Ok(Piece::Toilet {
            amount: IntRange::from_obj_or(jo, "amount", IntRange::ZERO, context)?,
        }),
        PieceKind::GasPump => {
            let fuel = get_str(jo, "fuel").unwrap_or("gasoline");
            if !matches!(fuel, "gasoline" | "diesel" | "jp8") {
                return Err(LoadError::structure(context, format!("invalid fuel \"{fuel}\"")));
            }
            Ok(Piece::GasPump {
                amount: IntRange::from_obj_or(jo, "amount", IntRange::ZERO, context)?,
                fuel: ItemId::new(fuel),
            })
        }
        PieceKind::Liquid => {
            let liquid = ItemId::new(require_str(jo, "liquid", context)?);
            if !catalog.has_item(&liquid) {
                defer.record("liquid", format!("no such item type \"{liquid}\""));
            }
            Ok(Piece::Liquid {
                liquid,
                amount: IntRange::from_obj_or(jo, "amount", IntRange::ZERO, context)?,
                chance: IntRange::from_obj_or(jo, "chance", IntRange::ONE, context)?,
            })
        }
        PieceKind::Computer => {
            let mut options = Vec::new();
            if let Some(arr) = jo.get("options").and_then(Value::as_array) {
                for opt in arr {
                    let opt = opt.as_object().ok_or_else(|| {
                        LoadError::structure(context, "computer options must be objects")
                    })?;
                    options.push(ComputerOption {
                        name: require_str(opt, "name", context)?.to_string(),
                        action: require_str(opt, "action", context)?.to_string(),
                        security: get_u32(opt, "security", 0),
                    });
                }
            }
            let mut failures = Vec::new();
            if let Some(arr) = jo.get("failures").and_then(Value::as_array) {
                for fail in arr {
                    let fail = fail.as_object().ok_or_else(|| {
                        LoadError::structure(context, "computer failures must be objects")
                    })?;
                    failures.push(ComputerFailure {
                        action: require_str(fail, "action", context)?.to_string(),
                    });
                }
            }
            Ok(Piece::Computer {
                name: get_str(jo, "name").unwrap_or_default().to_string(),
                security: get_u32(jo, "security", 0),
                access_denied: get_str(jo, "access_denied").map(str::to_string),
                options,
                failures,
            })
        }
        PieceKind::SealedItem => {
            let furniture = FurnId::new(require_str(jo, "furniture", context)?);
            if !catalog.has_furniture(&furniture) {
                defer.record("furniture", format!("no such furniture \"{furniture}\""));
            }
            let item = match jo.get("item").and_then(Value::as_object) {
                Some(sub) => Some(ItemSpawnPiece::parse(sub, catalog, defer, context)?),
                None => None,
            };
            let items = match jo.get("items").and_then(Value::as_object) {
                Some(sub) => Some(ItemGroupPiece::parse(sub, catalog, defer, context)?),
                None => None,
            };
            Ok(Piece::SealedItem {
                furniture,
                chance: IntRange::from_obj_or(jo, "chance", IntRange::fixed(100), context)?,
                item,
                items,
            })
        }
        PieceKind::Rubble => {
            let rubble_type = FurnId::new(get_str(jo, "rubble_type").unwrap_or("f_rubble"));
            let floor_type = TerrainId::new(get_str(jo, "floor_type").unwrap_or("t_dirt"));
            Ok(Piece::Rubble {
                rubble_type,
                items: get_bool(jo, "items", false),
                floor_type,
                overwrite: get_bool(jo, "overwrite", false),
            })
        }
        PieceKind::Transform => {
            let id = TransformId::new(require_str(jo, "transform", context)?);
            if !catalog.has_transform(&id) {
                defer.record("transform", format!("no such ter_furn_transform \"{id}\""));
            }
            Ok(Piece::Transform { id })
        }
        PieceKind::Faction => Ok(Piece::Faction {
            id: FactionId::new(require_str(jo, "id", context)?),
        }),
        PieceKind::Zone => Ok(Piece::Zone {
            zone_type: ZoneTypeId::new(require_str(jo, "type", context)?),
            faction: FactionId::new(require_str(jo, "faction", context)?),
            name: get_str(jo, "name").map(str::to_string),
        }),
        PieceKind::Translate => {
            let from = TerrainId::new(require_str(jo, "from", context)?);
            let to = TerrainId::new(require_str(jo, "to", context)?);
            if !catalog.has_terrain(&from) {
                defer.record("from", format!("no such terrain \"{from}\""));
            }
            if !catalog.has_terrain(&to) {
                defer.record("to", format!("no such terrain \"{to}\""));
            }
            Ok(Piece::Translate { from, to })
        }
        PieceKind::Nested => Ok(Piece::Nested {
            chunks: weighted_names(jo.get("chunks"), context)?
                .into_iter()
                .map(|(name, w)| (NestedId::new(name), w))
                .collect(),
            else_chunks: weighted_names(jo.get("else_chunks"), context)?
                .into_iter()
                .map(|(name, w)| (NestedId::new(name), w))
                .collect(),
            neighbors: NeighborhoodCheck::parse(jo.get("neighbors"), context)?,
        }),
    }
}

/// Parse the kinds that also accept a bare id string in palettes.
pub fn parse_piece_string(
    kind: PieceKind,
    id: &str,
    catalog: &crate::catalog::Catalog,
    defer: &mut DeferList,
) -> Result<Piece, LoadError> {
    match kind {
        PieceKind::Terrain => {
            let ter = TerrainId::new(id);
            if !catalog.has_terrain(&ter) {
                defer.record("ter", format!("no such terrain \"{ter}\""));
            }
            Ok(Piece::Terrain { ter })
        }
        PieceKind::Furniture => {
            let furn = FurnId::new(id);
            if !catalog.has_furniture(&furn) {
                defer.record("furn", format!("no such furniture \"{furn}\""));
            }
            Ok(Piece::Furniture { furn })
        }
        PieceKind::Trap => {
            let trap = TrapId::new(id);
            if !catalog.has_trap(&trap) {
                defer.record("trap", format!("no such trap \"{trap}\""));
            }
            Ok(Piece::Trap { trap })
        }
        _ => Err(LoadError::structure(
            "placement",
            "this placement kind cannot be given as a bare string",
        )),
    }
}

/// Parse one placement value into pieces, handling the single-object,
/// array-of-objects, and alternatives forms.
///
/// Terrain, furniture and traps treat an array as *alternatives*: the
/// entries are same-kind candidates, one of which is drawn per apply. An
/// `[entry, count]` pair repeats the entry to weight the uniform draw.
/// Everything else treats an array as independent pieces applied in order.
pub fn parse_placement(
    kind: PieceKind,
    value: &Value,
    catalog: &crate::catalog::Catalog,
    defer: &mut DeferList,
    context: &str,
) -> Result<Vec<Piece>, LoadError> {
    let alternatives_kind =
        matches!(kind, PieceKind::Terrain | PieceKind::Furniture | PieceKind::Trap);

    match value {
        Value::String(s) if alternatives_kind => {
            Ok(vec![parse_piece_string(kind, s, catalog, defer)?])
        }
        Value::Object(jo) => Ok(vec![parse_piece(kind, jo, catalog, defer, context)?]),
        Value::Array(arr) if alternatives_kind => {
            let mut alternatives = Vec::new();
            for entry in arr {
                match entry {
                    Value::String(s) => {
                        alternatives.push(parse_piece_string(kind, s, catalog, defer)?)
                    }
                    Value::Object(jo) => {
                        alternatives.push(parse_piece(kind, jo, catalog, defer, context)?)
                    }
                    Value::Array(pair) => {
                        // [entry, count]: repeat the entry to bias the draw.
                        if pair.len() != 2 {
                            return Err(LoadError::structure(
                                context,
                                "array entry must be [value, count]",
                            ));
                        }
                        let piece = match &pair[0] {
                            Value::String(s) => parse_piece_string(kind, s, catalog, defer)?,
                            Value::Object(jo) => parse_piece(kind, jo, catalog, defer, context)?,
                            _ => {
                                return Err(LoadError::structure(
                                    context,
                                    "first entry must be a string or object",
                                ))
                            }
                        };
                        let count = pair[1].as_u64().ok_or_else(|| {
                            LoadError::structure(context, "second entry must be an integer")
                        })? as usize;
                        for _ in 0..count.max(1) {
                            alternatives.push(piece.clone());
                        }
                    }
                    _ => {
                        return Err(LoadError::structure(
                            context,
                            "unexpected placement entry",
                        ))
                    }
                }
            }
            Ok(vec![Piece::Alternatives(alternatives)])
        }
        Value::Array(arr) => {
            let mut pieces = Vec::new();
            for entry in arr {
                let jo = entry.as_object().ok_or_else(|| {
                    LoadError::structure(context, "placement entries must be objects")
                })?;
                pieces.push(parse_piece(kind, jo, catalog, defer, context)?);
            }
            Ok(pieces)
        }
        _ => Err(LoadError::structure(
            context,
            "placement must be an object or array",
        )),
    }
}

fn parse_monster(
    jo: &Map<String, Value>,
    catalog: &crate::catalog::Catalog,
    defer: &mut DeferList,
    context: &str,
) -> Result<Piece, LoadError> {
    let mut ids = WeightedList::new();
    let mut group = None;

    if let Some(g) = get_str(jo, "group") {
        let g = MonsterGroupId::new(g);
        if !catalog.has_monster_group(&g) {
            defer.record("group", format!("no such monster group \"{g}\""));
        }
        group = Some(g);
    } else {
        match jo.get("monster") {
            Some(Value::String(s)) => {
                let id = MonsterId::new(s.as_str());
                if !catalog.has_monster(&id) {
                    defer.record("monster", format!("no such monster \"{id}\""));
                }
                ids.add(id, 100);
            }
            Some(Value::Array(arr)) => {
                for entry in arr {
                    let (name, weight) = match entry {
                        Value::String(s) => (s.as_str(), 100),
                        Value::Array(pair) if pair.len() == 2 => {
                            let name = pair[0].as_str().ok_or_else(|| {
                                LoadError::structure(context, "monster id must be a string")
                            })?;
                            let weight = pair[1].as_u64().ok_or_else(|| {
                                LoadError::structure(context, "monster weight must be an integer")
                            })? as u32;
                            (name, weight)
                        }
                        _ => {
                            return Err(LoadError::structure(
                                context,
                                "monster entries must be \"id\" or [\"id\", weight]",
                            ))
                        }
                    };
                    let id = MonsterId::new(name);
                    if !catalog.has_monster(&id) {
                        defer.record("monster", format!("no such monster \"{id}\""));
                    }
                    ids.add(id, weight);
                }
            }
            _ => {
                return Err(LoadError::structure(
                    context,
                    "monster needs a \"monster\" id or list, or a \"group\"",
                ))
            }
        }
    }

    let name = match get_str(jo, "name") {
        None | Some("NONE") => None,
        Some(n) => Some(n.to_string()),
    };

    Ok(Piece::Monster {
        ids,
        group,
        chance: IntRange::from_obj_or(jo, "chance", IntRange::fixed(100), context)?,
        pack_size: IntRange::from_obj_or(jo, "pack_size", IntRange::ONE, context)?,
        friendly: get_bool(jo, "friendly", false),
        name,
    })
}

fn parse_snippet(
    jo: &Map<String, Value>,
    catalog: &crate::catalog::Catalog,
    defer: &mut DeferList,
) -> Result<Option<SnippetId>, LoadError> {
    match get_str(jo, "snippet") {
        None => Ok(None),
        Some(s) => {
            let id = SnippetId::new(s);
            if !catalog.has_snippets(&id) {
                defer.record("snippet", format!("no such snippet category \"{id}\""));
            }
            Ok(Some(id))
        }
    }
}

/// Parse `"id"` / `["id", weight]` weighted name entries.
fn weighted_names(v: Option<&Value>, context: &str) -> Result<Vec<(String, u32)>, LoadError> {
    let Some(arr) = v.and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(arr.len());
    for entry in arr {
        match entry {
            Value::String(s) => out.push((s.clone(), 100)),
            Value::Array(pair) if pair.len() == 2 => {
                let name = pair[0].as_str().ok_or_else(|| {
                    LoadError::structure(context, "chunk id must be a string")
                })?;
                let weight = pair[1].as_u64().ok_or_else(|| {
                    LoadError::structure(context, "chunk weight must be an integer")
                })? as u32;
                out.push((name.to_string(), weight));
            }
            _ => {
                return Err(LoadError::structure(
                    context,
                    "chunk entries must be \"id\" or [\"id\", weight]",
                ))
            }
        }
    }
    Ok(out)
}

/// Substitute city and person-name tokens in sign/graffiti text.
fn resolve_text(
    literal: Option<&str>,
    snippet: Option<&SnippetId>,
    ctx: &GenContext,
    rng: &mut ChaCha8Rng,
) -> Option<String> {
    let raw = match snippet {
        Some(id) => ctx.catalog.pick_snippet(rng, id)?.to_string(),
        None => literal?.to_string(),
    };
    Some(apply_text_tags(&raw, ctx, rng))
}

const GIVEN_NAMES: [&str; 8] =
    ["Alex", "Dana", "Elias", "June", "Marta", "Noah", "Priya", "Sam"];
const FAMILY_NAMES: [&str; 8] =
    ["Alvarez", "Brooks", "Chen", "Ferreira", "Kowalski", "Okafor", "Silva", "Ward"];

fn apply_text_tags(text: &str, ctx: &GenContext, rng: &mut ChaCha8Rng) -> String {
    let city = ctx.city_name.as_deref().unwrap_or("illegible city name");
    let given = GIVEN_NAMES[rng.gen_range(0..GIVEN_NAMES.len())];
    let family = FAMILY_NAMES[rng.gen_range(0..FAMILY_NAMES.len())];
    text.replace("<city>", city)
        .replace("<full_name>", &format!("{given} {family}"))
        .replace("<given_name>", given)
        .replace("<family_name>", family)
        .replace("<name>", given)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::plan::Neighborhood;
    use crate::registry::MapgenRegistry;
    use rand::SeedableRng;
    use serde_json::json;

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        for (kind, def) in [
            ("terrain", json!({ "id": "t_grass" })),
            ("terrain", json!({ "id": "t_floor" })),
            ("terrain", json!({ "id": "t_wall", "flags": ["WALL"] })),
            ("furniture", json!({ "id": "f_table" })),
            ("furniture", json!({ "id": "f_planter", "flags": ["PLANT"] })),
            ("trap", json!({ "id": "tr_pit" })),
            ("item", json!({ "id": "hammer" })),
            ("item", json!({ "id": "seed_wheat", "seed": true })),
            ("item_group", json!({ "id": "tools", "items": [["hammer", 100]] })),
            ("item_group", json!({ "id": "seeds", "items": [["seed_wheat", 100]] })),
            ("monster", json!({ "id": "mon_rat" })),
            ("monster_group", json!({ "id": "vermin", "monsters": [["mon_rat", 100]] })),
            ("vehicle_group", json!({ "id": "city_cars" })),
            ("snippet", json!({ "id": "warnings", "text": ["KEEP OUT <city>"] })),
        ] {
            c.load_definition(kind, &def).unwrap();
        }
        c
    }

    fn context<'a>(catalog: &'a Catalog, registry: &'a MapgenRegistry) -> GenContext<'a> {
        GenContext {
            catalog,
            registry,
            neighborhood: Neighborhood::default(),
            city_name: Some("Halvard".to_string()),
        }
    }

    fn parsed(kind: PieceKind, v: Value, catalog: &Catalog) -> Piece {
        let mut defer = DeferList::default();
        let piece =
            parse_piece(kind, v.as_object().unwrap(), catalog, &mut defer, "test").unwrap();
        assert!(defer.is_empty(), "unexpected deferral: {:?}", defer.first());
        piece
    }

    #[test]
    fn test_terrain_piece_crushes_furniture_under_walls() {
        let catalog = catalog();
        let registry = MapgenRegistry::new();
        let ctx = context(&catalog, &registry);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut grid = TileGrid::new(8, 8, TerrainId::new("t_grass"));
        grid.set_furn(2, 2, Some(FurnId::new("f_table")));
        grid.add_item(2, 2, ItemId::new("hammer"), 1);

        let piece = parsed(PieceKind::Terrain, json!({ "ter": "t_wall" }), &catalog);
        piece.apply(&mut grid, &ctx, &mut rng, &IntRange::fixed(2), &IntRange::fixed(2));
        assert_eq!(grid.ter(2, 2).as_str(), "t_wall");
        assert!(grid.furn(2, 2).is_none());
        assert!(grid.items.is_empty());
    }

    #[test]
    fn test_unknown_id_defers_instead_of_failing() {
        let catalog = catalog();
        let mut defer = DeferList::default();
        let v = json!({ "ter": "t_missing" });
        parse_piece(PieceKind::Terrain, v.as_object().unwrap(), &catalog, &mut defer, "test")
            .unwrap();
        let (member, message) = defer.first().unwrap();
        assert_eq!(member, "ter");
        assert!(message.contains("t_missing"));
    }

    #[test]
    fn test_item_group_places_one_pull_per_apply() {
        let catalog = catalog();
        let registry = MapgenRegistry::new();
        let ctx = context(&catalog, &registry);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut grid = TileGrid::new(8, 8, TerrainId::new("t_grass"));

        let piece = parsed(PieceKind::ItemGroup, json!({ "item": "tools", "chance": 100 }), &catalog);
        for _ in 0..2 {
            piece.apply(&mut grid, &ctx, &mut rng, &IntRange::new(0, 1), &IntRange::fixed(0));
        }
        assert_eq!(grid.items.len(), 2);
        for it in &grid.items {
            assert_eq!(it.item.as_str(), "hammer");
            assert!(it.x <= 1 && it.y == 0);
        }
    }

    #[test]
    fn test_alternatives_draws_only_configured_terrains() {
        let catalog = catalog();
        let registry = MapgenRegistry::new();
        let ctx = context(&catalog, &registry);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut defer = DeferList::default();
        let pieces = parse_placement(
            PieceKind::Terrain,
            &json!(["t_floor", "t_grass"]),
            &catalog,
            &mut defer,
            "test",
        )
        .unwrap();
        assert_eq!(pieces.len(), 1);
        assert!(matches!(&pieces[0], Piece::Alternatives(alts) if alts.len() == 2));

        let mut grid = TileGrid::new(4, 4, TerrainId::new("t_wall"));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..40 {
            pieces[0].apply(&mut grid, &ctx, &mut rng, &IntRange::fixed(1), &IntRange::fixed(1));
            seen.insert(grid.ter(1, 1).clone());
        }
        assert!(seen.contains(&TerrainId::new("t_floor")));
        assert!(seen.contains(&TerrainId::new("t_grass")));
        assert!(!seen.contains(&TerrainId::new("t_wall")));
    }

    #[test]
    fn test_sealed_item_restores_furniture_over_item() {
        let catalog = catalog();
        let registry = MapgenRegistry::new();
        let ctx = context(&catalog, &registry);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut grid = TileGrid::new(4, 4, TerrainId::new("t_grass"));

        let piece = parsed(
            PieceKind::SealedItem,
            json!({
                "furniture": "f_planter",
                "item": { "item": "seed_wheat" }
            }),
            &catalog,
        );
        piece.check(&catalog, "test").unwrap();
        piece.apply(&mut grid, &ctx, &mut rng, &IntRange::fixed(1), &IntRange::fixed(1));
        assert_eq!(grid.furn(1, 1).unwrap().as_str(), "f_planter");
        assert_eq!(grid.items.len(), 1);
        assert_eq!(grid.items[0].item.as_str(), "seed_wheat");
    }

    #[test]
    fn test_sealed_item_plant_check_rejects_non_seed() {
        let catalog = catalog();
        let piece = parsed(
            PieceKind::SealedItem,
            json!({
                "furniture": "f_planter",
                "item": { "item": "hammer" }
            }),
            &catalog,
        );
        let err = piece.check(&catalog, "test").unwrap_err();
        assert!(err.to_string().contains("not a seed"));
    }

    #[test]
    fn test_sign_substitutes_city_token() {
        let catalog = catalog();
        let registry = MapgenRegistry::new();
        let ctx = context(&catalog, &registry);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut grid = TileGrid::new(4, 4, TerrainId::new("t_grass"));

        let piece = parsed(PieceKind::Sign, json!({ "snippet": "warnings" }), &catalog);
        piece.apply(&mut grid, &ctx, &mut rng, &IntRange::fixed(0), &IntRange::fixed(0));
        assert_eq!(grid.furn(0, 0).unwrap().as_str(), "f_sign");
        assert_eq!(grid.signage[0].text, "KEEP OUT Halvard");
    }

    #[test]
    fn test_monster_weighted_list_spawns() {
        let catalog = catalog();
        let registry = MapgenRegistry::new();
        let ctx = context(&catalog, &registry);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut grid = TileGrid::new(4, 4, TerrainId::new("t_grass"));

        let piece = parsed(
            PieceKind::Monster,
            json!({ "monster": [["mon_rat", 100]], "pack_size": [2, 4] }),
            &catalog,
        );
        piece.apply(&mut grid, &ctx, &mut rng, &IntRange::fixed(3), &IntRange::fixed(3));
        assert_eq!(grid.spawns.len(), 1);
        let spawn = &grid.spawns[0];
        assert_eq!(spawn.monster.as_str(), "mon_rat");
        assert!((2..=4).contains(&spawn.count));
        assert_eq!((spawn.x, spawn.y), (3, 3));
    }

    #[test]
    fn test_vehicle_collision_sensitivity() {
        let catalog = catalog();
        let registry = MapgenRegistry::new();
        let ctx = context(&catalog, &registry);
        let mut grid = TileGrid::new(4, 4, TerrainId::new("t_grass"));
        grid.add_vehicle(VehicleSpawn {
            x: 1,
            y: 1,
            vehicle: VehicleGroupId::new("city_cars"),
            dir: 0,
            fuel: -1,
            status: -1,
        });

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let ter = parsed(PieceKind::Terrain, json!({ "ter": "t_floor" }), &catalog);
        assert!(ter.has_vehicle_collision(&grid, &ctx, &mut rng, 1, 1));
        assert!(!ter.has_vehicle_collision(&grid, &ctx, &mut rng, 2, 2));

        let mut field_catalog = Catalog::new();
        field_catalog.load_definition("field_type", &json!({ "id": "fd_smoke" })).unwrap();
        let field = parsed(PieceKind::Field, json!({ "field": "fd_smoke" }), &field_catalog);
        assert!(!field.has_vehicle_collision(&grid, &ctx, &mut rng, 1, 1));
    }

    #[test]
    fn test_neighborhood_check_matches_by_substring() {
        let catalog = catalog();
        let registry = MapgenRegistry::new();
        let mut ctx = context(&catalog, &registry);
        let check = NeighborhoodCheck::parse(
            Some(&json!({ "north": "sewer", "east": ["field", "forest"] })),
            "test",
        )
        .unwrap();

        assert!(!check.test(&ctx));

        ctx.neighborhood.set("north", OmTerrainId::new("sewer_straight"));
        ctx.neighborhood.set("east", OmTerrainId::new("forest_thick"));
        assert!(check.test(&ctx));

        ctx.neighborhood.set("east", OmTerrainId::new("road"));
        assert!(!check.test(&ctx));
    }
}

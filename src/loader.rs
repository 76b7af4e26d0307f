//! The load pass: parse definition sources, compile plans, register
//! everything.
//!
//! Loading is two-phase so references within one batch are
//! order-independent: the first phase collects catalog entries, palettes
//! and raw mapgen objects; the second compiles palettes and plans with the
//! full catalog in view. A definition that fails to compile is logged and
//! skipped; the rest of the batch proceeds.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::catalog::Catalog;
use crate::grid::TILE_SIZE;
use crate::ids::{NestedId, OmTerrainId, TerrainId, UpdateId};
use crate::palette::{Palette, PaletteRegistry};
use crate::pieces::{parse_piece, Piece, PieceKind};
use crate::plan::{CellTemplate, Plan, PlanKind};
use crate::range::{check_bounds, BoundsCheck, IntRange, PlaceRegion};
use crate::registry::MapgenRegistry;
use crate::setmap::SetMapOp;

/// Default weight of a mapgen definition that does not declare one.
pub const DEFAULT_MAPGEN_WEIGHT: u32 = 1000;

/// Why one definition failed to load. Fatal to that definition only.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Structurally invalid definition source.
    #[error("{context}: {message}")]
    Structure { context: String, message: String },
    /// A placement region crosses the grid boundary.
    #[error("{context}: coordinate range cannot cross grid boundaries")]
    Bounds { context: String },
    /// An identifier did not resolve after the whole definition was
    /// scanned; carries the offending member for a second-pass diagnosis.
    #[error("{context}: \"{member}\": {message}")]
    Deferred { context: String, member: String, message: String },
}

impl LoadError {
    pub fn structure(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structure { context: context.into(), message: message.into() }
    }

    pub fn bounds(context: impl Into<String>) -> Self {
        Self::Bounds { context: context.into() }
    }

    pub fn deferred(
        context: impl Into<String>,
        member: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Deferred {
            context: context.into(),
            member: member.into(),
            message: message.into(),
        }
    }
}

/// Accumulator for unresolved identifiers while one definition is being
/// scanned. The first recorded entry becomes the definition's error.
#[derive(Debug, Default)]
pub struct DeferList {
    entries: Vec<(String, String)>,
}

impl DeferList {
    pub fn record(&mut self, member: &str, message: impl Into<String>) {
        self.entries.push((member.to_string(), message.into()));
    }

    pub fn first(&self) -> Option<(&str, &str)> {
        self.entries.first().map(|(m, s)| (m.as_str(), s.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn get_str<'a>(jo: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    jo.get(key).and_then(Value::as_str)
}

pub(crate) fn require_str<'a>(
    jo: &'a Map<String, Value>,
    key: &str,
    context: &str,
) -> Result<&'a str, LoadError> {
    get_str(jo, key)
        .ok_or_else(|| LoadError::structure(context, format!("missing required member \"{key}\"")))
}

pub(crate) fn get_bool(jo: &Map<String, Value>, key: &str, default: bool) -> bool {
    jo.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub(crate) fn get_u32(jo: &Map<String, Value>, key: &str, default: u32) -> u32 {
    jo.get(key).and_then(Value::as_u64).map(|v| v as u32).unwrap_or(default)
}

/// Everything one load batch produces. Treated as read-only by generation.
pub struct LoadedContent {
    pub catalog: Catalog,
    pub palettes: PaletteRegistry,
    pub registry: MapgenRegistry,
    /// Definitions that failed; the batch itself never aborts.
    pub errors: Vec<LoadError>,
}

/// The `place_*` object families of a mapgen definition, in application
/// order. Faction ownership runs last because it covers prior placements.
const PLACE_CATEGORIES: [(&str, PieceKind); 24] = [
    ("add", PieceKind::Item),
    ("place_item", PieceKind::Item),
    ("place_fields", PieceKind::Field),
    ("place_signs", PieceKind::Sign),
    ("place_vendingmachines", PieceKind::VendingMachine),
    ("place_toilets", PieceKind::Toilet),
    ("place_liquids", PieceKind::Liquid),
    ("place_gaspumps", PieceKind::GasPump),
    ("place_items", PieceKind::ItemGroup),
    ("place_loot", PieceKind::Loot),
    ("place_monsters", PieceKind::MonsterGroup),
    ("place_vehicles", PieceKind::Vehicle),
    ("place_traps", PieceKind::Trap),
    ("place_furniture", PieceKind::Furniture),
    ("place_terrain", PieceKind::Terrain),
    ("place_monster", PieceKind::Monster),
    ("place_rubble", PieceKind::Rubble),
    ("place_computers", PieceKind::Computer),
    ("place_nested", PieceKind::Nested),
    ("place_graffiti", PieceKind::Graffiti),
    ("translate_ter", PieceKind::Translate),
    ("place_zones", PieceKind::Zone),
    ("place_ter_furn_transforms", PieceKind::Transform),
    ("faction_owner", PieceKind::Faction),
];

/// Load a batch of definition objects.
pub fn load_batch(values: Vec<Value>) -> LoadedContent {
    let mut catalog = Catalog::new();
    let mut palettes = PaletteRegistry::new();
    let mut registry = MapgenRegistry::new();
    let mut errors = Vec::new();

    let mut raw_palettes = Vec::new();
    let mut raw_mapgens = Vec::new();

    for value in values {
        let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_string) else {
            errors.push(LoadError::structure("definition", "missing \"type\" member"));
            continue;
        };
        match kind.as_str() {
            "palette" => raw_palettes.push(value),
            "mapgen" => raw_mapgens.push(value),
            other => match catalog.load_definition(other, &value) {
                Ok(true) => {}
                Ok(false) => log::debug!("ignoring unrecognized definition type \"{other}\""),
                Err(e) => errors.push(e),
            },
        }
    }

    // Palettes are parsed against the complete catalog so that a palette
    // may reference content declared later in the batch.
    for value in &raw_palettes {
        let context = match value.get("id").and_then(Value::as_str) {
            Some(id) => format!("palette {id}"),
            None => "palette".to_string(),
        };
        let Some(jo) = value.as_object() else {
            errors.push(LoadError::structure(&context, "palette must be an object"));
            continue;
        };
        let mut defer = DeferList::default();
        match Palette::load(jo, true, &catalog, &mut defer, &context) {
            Ok(palette) => {
                if let Some((member, message)) = defer.first() {
                    errors.push(LoadError::deferred(&context, member, message));
                } else {
                    palettes.insert(palette);
                }
            }
            Err(e) => errors.push(e),
        }
    }

    for value in &raw_mapgens {
        if let Err(e) = load_mapgen(value, &catalog, &palettes, &mut registry) {
            log::warn!("skipping mapgen definition: {e}");
            errors.push(e);
        }
    }

    registry.finalize();
    LoadedContent { catalog, palettes, registry, errors }
}

/// Load every `.json` file under a directory (sorted, non-recursive) as
/// one batch. Each file holds a definition object or an array of them.
pub fn load_batch_from_dir(dir: &Path) -> io::Result<LoadedContent> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut values = Vec::new();
    let mut parse_errors = Vec::new();
    for path in paths {
        let text = fs::read_to_string(&path)?;
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(arr)) => values.extend(arr),
            Ok(value) => values.push(value),
            Err(e) => parse_errors.push(LoadError::structure(
                path.display().to_string(),
                e.to_string(),
            )),
        }
    }

    let mut content = load_batch(values);
    content.errors.extend(parse_errors);
    Ok(content)
}

/// Register one `"type": "mapgen"` definition.
fn load_mapgen(
    value: &Value,
    catalog: &Catalog,
    palettes: &PaletteRegistry,
    registry: &mut MapgenRegistry,
) -> Result<(), LoadError> {
    let jo = value
        .as_object()
        .ok_or_else(|| LoadError::structure("mapgen", "definition must be an object"))?;

    if let Some(om_terrain) = jo.get("om_terrain") {
        return load_primary_mapgen(jo, om_terrain, catalog, palettes, registry);
    }
    if let Some(id) = get_str(jo, "nested_mapgen_id") {
        return load_nested_mapgen(jo, id, catalog, palettes, registry);
    }
    if let Some(id) = get_str(jo, "update_mapgen_id") {
        return load_update_mapgen(jo, id, catalog, palettes, registry);
    }
    Err(LoadError::structure(
        "mapgen",
        "requires \"om_terrain\", \"nested_mapgen_id\" or \"update_mapgen_id\"",
    ))
}

fn load_primary_mapgen(
    jo: &Map<String, Value>,
    om_terrain: &Value,
    catalog: &Catalog,
    palettes: &PaletteRegistry,
    registry: &mut MapgenRegistry,
) -> Result<(), LoadError> {
    let weight = get_u32(jo, "weight", DEFAULT_MAPGEN_WEIGHT);
    let disabled = weight == 0 || get_bool(jo, "disabled", false);
    let method = require_str(jo, "method", "mapgen")?;

    // Collect target ids: single key, a list sharing one plan, or a grid
    // of keys positioned on a shared offset canvas.
    let shared_grid: Vec<Vec<OmTerrainId>> = match om_terrain {
        Value::String(id) => vec![vec![OmTerrainId::new(id.as_str())]],
        Value::Array(rows) if rows.iter().all(Value::is_string) => {
            let ids = rows
                .iter()
                .filter_map(Value::as_str)
                .map(OmTerrainId::new)
                .collect::<Vec<_>>();
            if ids.is_empty() {
                return Err(LoadError::structure("mapgen", "\"om_terrain\" list is empty"));
            }
            // A flat list shares one plan under every id.
            let context = format!("mapgen {}", ids[0]);
            return register_targets(
                jo, method, disabled, weight, &ids, &context, (0, 0), catalog, palettes, registry,
            );
        }
        Value::Array(rows) => rows
            .iter()
            .map(|row| {
                row.as_array()
                    .map(|cols| {
                        cols.iter()
                            .filter_map(Value::as_str)
                            .map(OmTerrainId::new)
                            .collect::<Vec<_>>()
                    })
                    .ok_or_else(|| {
                        LoadError::structure("mapgen", "\"om_terrain\" grid rows must be arrays")
                    })
            })
            .collect::<Result<_, _>>()?,
        _ => {
            return Err(LoadError::structure(
                "mapgen",
                "\"om_terrain\" must be a string or array",
            ))
        }
    };

    for (row, ids) in shared_grid.iter().enumerate() {
        for (col, id) in ids.iter().enumerate() {
            let context = format!("mapgen {id}");
            let offset = (col as i32 * TILE_SIZE as i32, row as i32 * TILE_SIZE as i32);
            register_targets(
                jo,
                method,
                disabled,
                weight,
                std::slice::from_ref(id),
                &context,
                offset,
                catalog,
                palettes,
                registry,
            )?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn register_targets(
    jo: &Map<String, Value>,
    method: &str,
    disabled: bool,
    weight: u32,
    ids: &[OmTerrainId],
    context: &str,
    offset: (i32, i32),
    catalog: &Catalog,
    palettes: &PaletteRegistry,
    registry: &mut MapgenRegistry,
) -> Result<(), LoadError> {
    match method {
        "builtin" => {
            let name = require_str(jo, "name", context)?;
            for id in ids {
                if disabled {
                    // A zero-weight builtin entry suppresses the builtin
                    // registered earlier under the same name.
                    registry.disable_builtin(id, name);
                } else {
                    registry.register_builtin_mapgen(id.clone(), name, weight);
                }
            }
            Ok(())
        }
        "json" => {
            if disabled {
                return Ok(());
            }
            let object = jo
                .get("object")
                .and_then(Value::as_object)
                .ok_or_else(|| LoadError::structure(context, "missing \"object\" member"))?;
            let plan = Arc::new(compile_mapgen_object(
                object,
                PlanKind::Primary,
                TILE_SIZE,
                offset,
                catalog,
                palettes,
                context,
            )?);
            for id in ids {
                registry.register_plan(id.clone(), Arc::clone(&plan), weight);
            }
            Ok(())
        }
        other => Err(LoadError::structure(
            context,
            format!("invalid method \"{other}\": must be \"builtin\" or \"json\""),
        )),
    }
}

fn load_nested_mapgen(
    jo: &Map<String, Value>,
    id: &str,
    catalog: &Catalog,
    palettes: &PaletteRegistry,
    registry: &mut MapgenRegistry,
) -> Result<(), LoadError> {
    let context = format!("nested mapgen {id}");
    let method = require_str(jo, "method", &context)?;
    if method != "json" {
        return Err(LoadError::structure(
            &context,
            format!("nested mapgen only supports \"json\", not \"{method}\""),
        ));
    }
    let weight = get_u32(jo, "weight", DEFAULT_MAPGEN_WEIGHT);
    let object = jo
        .get("object")
        .and_then(Value::as_object)
        .ok_or_else(|| LoadError::structure(&context, "missing \"object\" member"))?;

    let size = nested_size(object, &context)?;
    let plan = Arc::new(compile_mapgen_object(
        object,
        PlanKind::Nested,
        size,
        (0, 0),
        catalog,
        palettes,
        &context,
    )?);
    registry.register_nested(NestedId::new(id), plan, weight);
    Ok(())
}

fn load_update_mapgen(
    jo: &Map<String, Value>,
    id: &str,
    catalog: &Catalog,
    palettes: &PaletteRegistry,
    registry: &mut MapgenRegistry,
) -> Result<(), LoadError> {
    let context = format!("update mapgen {id}");
    let method = require_str(jo, "method", &context)?;
    if method != "json" {
        return Err(LoadError::structure(
            &context,
            format!("update mapgen only supports \"json\", not \"{method}\""),
        ));
    }
    let object = jo
        .get("object")
        .and_then(Value::as_object)
        .ok_or_else(|| LoadError::structure(&context, "missing \"object\" member"))?;

    let plan = Arc::new(compile_mapgen_object(
        object,
        PlanKind::Update,
        TILE_SIZE,
        (0, 0),
        catalog,
        palettes,
        &context,
    )?);
    registry.register_update(UpdateId::new(id), plan);
    Ok(())
}

/// Nested fragments must declare an explicit square size.
fn nested_size(jo: &Map<String, Value>, context: &str) -> Result<usize, LoadError> {
    let arr = jo
        .get("mapgensize")
        .and_then(Value::as_array)
        .ok_or_else(|| LoadError::structure(context, "nested mapgen must have \"mapgensize\""))?;
    let dims: Vec<i64> = arr.iter().filter_map(Value::as_i64).collect();
    match dims.as_slice() {
        [w, h] if w == h && *w > 0 => Ok(*w as usize),
        _ => Err(LoadError::structure(
            context,
            "\"mapgensize\" must be an array of two identical, positive numbers",
        )),
    }
}

/// Compile one inner mapgen object into a plan. `offset` selects this
/// definition's window of a shared-offset canvas.
pub fn compile_mapgen_object(
    jo: &Map<String, Value>,
    kind: PlanKind,
    size: usize,
    offset: (i32, i32),
    catalog: &Catalog,
    palettes: &PaletteRegistry,
    context: &str,
) -> Result<Plan, LoadError> {
    let mut defer = DeferList::default();

    let fill_ter = match (kind, get_str(jo, "fill_ter")) {
        (PlanKind::Primary, Some(id)) => {
            let ter = TerrainId::new(id);
            if !catalog.has_terrain(&ter) {
                defer.record("fill_ter", format!("no such terrain \"{ter}\""));
            }
            Some(ter)
        }
        _ => None,
    };
    let predecessor = match (kind, get_str(jo, "predecessor_mapgen")) {
        (PlanKind::Primary, Some(id)) => Some(OmTerrainId::new(id)),
        _ => None,
    };
    let rotation = match kind {
        PlanKind::Update => IntRange::ZERO,
        _ => IntRange::from_obj_or(jo, "rotation", IntRange::ZERO, context)?,
    };
    if kind != PlanKind::Nested && jo.contains_key("mapgensize") {
        return Err(LoadError::structure(
            context,
            "\"mapgensize\" only allowed for nested mapgen",
        ));
    }

    // Fragments and updates write over an existing grid, so template
    // symbols without terrain are fine there.
    let mut fallback_terrain_exists =
        fill_ter.is_some() || predecessor.is_some() || kind != PlanKind::Primary;

    let mut format = vec![CellTemplate::default(); size * size];
    let mut has_format = false;
    let mut objects: Vec<(PlaceRegion, Arc<Piece>)> = Vec::new();

    if let Some(rows) = jo.get("rows") {
        let rows = rows
            .as_array()
            .ok_or_else(|| LoadError::structure(context, "\"rows\" must be an array"))?;

        let inline = Palette::load(jo, false, catalog, &mut defer, context)?;
        let flat = inline.flattened(palettes, &mut defer);
        if !flat.has_terrain_table() {
            return Err(LoadError::structure(context, "format: no terrain map"));
        }

        let expected_rows = offset.1 as usize + size;
        if rows.len() < expected_rows {
            return Err(LoadError::structure(
                context,
                format!("format: rows: must have at least {expected_rows} rows, not {}", rows.len()),
            ));
        }
        for c in offset.1 as usize..expected_rows {
            let row = rows[c].as_str().ok_or_else(|| {
                LoadError::structure(context, "format: rows entries must be strings")
            })?;
            let keys: Vec<char> = row.chars().collect();
            let expected_cols = offset.0 as usize + size;
            if keys.len() < expected_cols {
                return Err(LoadError::structure(
                    context,
                    format!(
                        "format: row {} must have at least {expected_cols} columns, not {}",
                        c + 1,
                        keys.len()
                    ),
                ));
            }
            for i in offset.0 as usize..expected_cols {
                let key = keys[i];
                let (px, py) = (i - offset.0 as usize, c - offset.1 as usize);

                let ter = flat.terrain_entry(key);
                let furn = flat.furniture_entry(key);
                let placings = flat.placings_entry(key);

                if ter.is_none() && !fallback_terrain_exists {
                    return Err(LoadError::structure(
                        context,
                        format!(
                            "format: rows: row {} column {}: '{key}' is not in 'terrain', and no 'fill_ter' is set",
                            c + 1,
                            i + 1
                        ),
                    ));
                }
                if ter.is_none() && furn.is_none() && placings.is_none() && key != ' ' && key != '.'
                {
                    return Err(LoadError::structure(
                        context,
                        format!(
                            "format: rows: row {} column {}: '{key}' has no terrain, furniture, or other definition",
                            c + 1,
                            i + 1
                        ),
                    ));
                }

                let cell = &mut format[py * size + px];
                if let Some(ter) = ter {
                    cell.ter = ter.clone();
                }
                if let Some(furn) = furn {
                    cell.furn = Some(furn.clone());
                }
                if let Some(placings) = placings {
                    let region = PlaceRegion {
                        x: IntRange::fixed(px as i32),
                        y: IntRange::fixed(py as i32),
                        repeat: IntRange::ONE,
                    };
                    for piece in placings {
                        objects.push((region, Arc::clone(piece)));
                    }
                }
            }
        }
        fallback_terrain_exists = true;
        has_format = true;
    }

    if !fallback_terrain_exists {
        return Err(LoadError::structure(
            context,
            "need one of \"fill_ter\", \"predecessor_mapgen\" or \"rows\" with \"terrain\"",
        ));
    }

    let mut setmaps = Vec::new();
    if let Some(set) = jo.get("set") {
        let set = set
            .as_array()
            .ok_or_else(|| LoadError::structure(context, "\"set\" must be an array"))?;
        for entry in set {
            let entry = entry.as_object().ok_or_else(|| {
                LoadError::structure(context, "set entries must be objects")
            })?;
            if let Some(op) = SetMapOp::parse(entry, size, offset, catalog, &mut defer, context)? {
                setmaps.push(op);
            }
        }
    }

    for (member, piece_kind) in PLACE_CATEGORIES {
        let Some(arr) = jo.get(member) else { continue };
        let arr = arr.as_array().ok_or_else(|| {
            LoadError::structure(context, format!("\"{member}\" must be an array"))
        })?;
        let context = format!("{member} in {context}");
        for entry in arr {
            let entry = entry.as_object().ok_or_else(|| {
                LoadError::structure(&context, "placement entries must be objects")
            })?;
            let region = PlaceRegion::from_obj(entry, &context)?.shifted(-offset.0, -offset.1);
            match check_bounds(&region.x, &region.y, size) {
                BoundsCheck::Skip => continue,
                BoundsCheck::Reject => return Err(LoadError::bounds(&context)),
                BoundsCheck::Ok => {}
            }
            let piece = parse_piece(piece_kind, entry, catalog, &mut defer, &context)?;
            objects.push((region, Arc::new(piece)));
        }
    }

    if let Some((member, message)) = defer.first() {
        return Err(LoadError::deferred(context, member, message));
    }

    let plan = Plan {
        context: context.to_string(),
        kind,
        size,
        fill_ter,
        predecessor,
        rotation,
        format,
        has_format,
        setmaps,
        objects,
    };
    plan.check(catalog)?;
    Ok(plan)
}

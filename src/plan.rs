//! The compiled plan for one definition and its executor.
//!
//! A plan is immutable after load. Execution runs three straight-line
//! phases: fill the background (or run the predecessor definition first),
//! stamp the resolved character grid and the setmap edits, then the
//! placement pairs in declaration order. Top-level runs finish with a
//! single rotation; nested fragments write into the parent grid at an
//! offset and never rotate.

use std::sync::Arc;

use rand_chacha::ChaCha8Rng;

use crate::catalog::Catalog;
use crate::grid::TileGrid;
use crate::ids::{FurnId, OmTerrainId, TerrainId};
use crate::loader::LoadError;
use crate::pieces::{Piece, DIRECTION_KEYS};
use crate::range::{IntRange, PlaceRegion};
use crate::registry::MapgenRegistry;
use crate::setmap::{SetMapKind, SetMapOp};

/// The terrain surrounding the tile being generated, for nested-chunk
/// neighbor predicates. Unset directions match nothing.
#[derive(Clone, Debug, Default)]
pub struct Neighborhood {
    dirs: [Option<OmTerrainId>; 8],
    pub above: Option<OmTerrainId>,
}

impl Neighborhood {
    pub fn dir(&self, index: usize) -> Option<&OmTerrainId> {
        self.dirs.get(index).and_then(Option::as_ref)
    }

    /// Set a direction by its key (`"north"`, `"south_west"`, ...) or
    /// `"above"`. Unknown keys are ignored.
    pub fn set(&mut self, key: &str, id: OmTerrainId) {
        if key == "above" {
            self.above = Some(id);
            return;
        }
        if let Some(index) = DIRECTION_KEYS.iter().position(|k| *k == key) {
            self.dirs[index] = Some(id);
        }
    }
}

/// Everything one generation run reads besides the grid: the catalog,
/// the registries, and tile surroundings supplied by the caller.
pub struct GenContext<'a> {
    pub catalog: &'a Catalog,
    pub registry: &'a MapgenRegistry,
    pub neighborhood: Neighborhood,
    pub city_name: Option<String>,
}

impl<'a> GenContext<'a> {
    pub fn new(catalog: &'a Catalog, registry: &'a MapgenRegistry) -> Self {
        Self { catalog, registry, neighborhood: Neighborhood::default(), city_name: None }
    }
}

/// What a compiled plan is for; this decides fill and rotation behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanKind {
    /// Bound to one or more overmap terrain keys, generates whole tiles.
    Primary,
    /// A fragment executed at an offset inside a parent grid.
    Nested,
    /// A patch applied to an already-materialized tile.
    Update,
}

/// Per-cell result of resolving the character grid through its palettes.
#[derive(Clone, Debug, Default)]
pub struct CellTemplate {
    pub ter: Option<TerrainId>,
    pub furn: Option<FurnId>,
}

/// The compiled, immutable representation of one definition.
#[derive(Debug)]
pub struct Plan {
    /// Label used in diagnostics, e.g. `mapgen house`.
    pub context: String,
    pub kind: PlanKind,
    /// Grid edge length this plan was validated against.
    pub size: usize,
    pub fill_ter: Option<TerrainId>,
    pub predecessor: Option<OmTerrainId>,
    pub rotation: IntRange,
    pub(crate) format: Vec<CellTemplate>,
    pub(crate) has_format: bool,
    pub(crate) setmaps: Vec<SetMapOp>,
    pub(crate) objects: Vec<(PlaceRegion, Arc<Piece>)>,
}

impl Plan {
    /// Run as a top-level tile generation.
    pub fn generate(&self, grid: &mut TileGrid, ctx: &GenContext, rng: &mut ChaCha8Rng) {
        let turns = self.rotation.resolve(rng).rem_euclid(4) as u32;

        if let Some(fill) = &self.fill_ter {
            grid.fill_terrain(fill);
        }
        if let Some(predecessor) = &self.predecessor {
            if !ctx.registry.generate(predecessor, grid, ctx, rng) {
                log::warn!("{}: predecessor mapgen {predecessor} has no definition", self.context);
            }
            // Counter-rotate so the final rotation leaves the predecessor
            // output in its original orientation.
            if turns != 0 {
                grid.rotate(4 - turns);
            }
        }

        self.stamp_format(grid, (0, 0));
        for op in &self.setmaps {
            op.apply(grid, ctx.catalog, rng, (0, 0));
        }
        self.apply_objects(grid, ctx, rng, (0, 0));

        grid.rotate(turns);
    }

    /// Run as a nested fragment at an offset inside the parent grid.
    pub fn nest(&self, grid: &mut TileGrid, ctx: &GenContext, rng: &mut ChaCha8Rng, offset: (i32, i32)) {
        if !self.fits(grid, offset) {
            log::warn!(
                "{}: fragment of size {} does not fit at offset ({}, {})",
                self.context,
                self.size,
                offset.0,
                offset.1
            );
            return;
        }
        self.stamp_format(grid, offset);
        for op in &self.setmaps {
            op.apply(grid, ctx.catalog, rng, offset);
        }
        self.apply_objects(grid, ctx, rng, offset);
    }

    /// Run as an update patch. With `verify`, abort before any mutation
    /// that would overwrite a vehicle.
    pub fn update(
        &self,
        grid: &mut TileGrid,
        ctx: &GenContext,
        rng: &mut ChaCha8Rng,
        offset: (i32, i32),
        verify: bool,
    ) -> bool {
        if !self.fits(grid, offset) {
            log::warn!(
                "{}: update of size {} does not fit at offset ({}, {})",
                self.context,
                self.size,
                offset.0,
                offset.1
            );
            return false;
        }
        for op in &self.setmaps {
            if verify && op.has_vehicle_collision(grid, rng, offset) {
                return false;
            }
            op.apply(grid, ctx.catalog, rng, offset);
        }
        if verify && self.objects_vehicle_collision(grid, ctx, rng, offset) {
            return false;
        }
        self.apply_objects(grid, ctx, rng, offset);
        true
    }

    /// Whether anything this plan writes could land on a vehicle.
    pub fn has_vehicle_collision(
        &self,
        grid: &TileGrid,
        ctx: &GenContext,
        rng: &mut ChaCha8Rng,
        offset: (i32, i32),
    ) -> bool {
        if self.has_format {
            for y in 0..self.size {
                for x in 0..self.size {
                    let cell = &self.format[y * self.size + x];
                    if cell.ter.is_none() && cell.furn.is_none() {
                        continue;
                    }
                    let px = x as i32 + offset.0;
                    let py = y as i32 + offset.1;
                    if in_grid(grid, px, py) && grid.veh_at(px as usize, py as usize) {
                        return true;
                    }
                }
            }
        }
        for op in &self.setmaps {
            if op.has_vehicle_collision(grid, rng, offset) {
                return true;
            }
        }
        self.objects_vehicle_collision(grid, ctx, rng, offset)
    }

    fn objects_vehicle_collision(
        &self,
        grid: &TileGrid,
        ctx: &GenContext,
        rng: &mut ChaCha8Rng,
        offset: (i32, i32),
    ) -> bool {
        for (region, piece) in &self.objects {
            let where_ = region.shifted(offset.0, offset.1);
            let px = where_.x.resolve(rng);
            let py = where_.y.resolve(rng);
            if in_grid(grid, px, py)
                && piece.has_vehicle_collision(grid, ctx, rng, px as usize, py as usize)
            {
                return true;
            }
        }
        false
    }

    fn stamp_format(&self, grid: &mut TileGrid, offset: (i32, i32)) {
        if !self.has_format {
            return;
        }
        for y in 0..self.size {
            for x in 0..self.size {
                let cell = &self.format[y * self.size + x];
                let px = (x as i32 + offset.0) as usize;
                let py = (y as i32 + offset.1) as usize;
                if let Some(ter) = &cell.ter {
                    grid.set_ter(px, py, ter.clone());
                }
                if let Some(furn) = &cell.furn {
                    grid.set_furn(px, py, Some(furn.clone()));
                }
            }
        }
    }

    fn apply_objects(
        &self,
        grid: &mut TileGrid,
        ctx: &GenContext,
        rng: &mut ChaCha8Rng,
        offset: (i32, i32),
    ) {
        for (region, piece) in &self.objects {
            let where_ = region.shifted(offset.0, offset.1);
            // Repeat may be declared on the region or on the piece itself;
            // the greater of the two wins.
            let repeat = where_
                .repeat
                .resolve(rng)
                .max(piece.repeat().resolve(rng))
                .max(0);
            for _ in 0..repeat {
                piece.apply(grid, ctx, rng, &where_.x, &where_.y);
            }
        }
    }

    /// Validate furniture and piece constraints that need the full catalog.
    pub fn check(&self, catalog: &Catalog) -> Result<(), LoadError> {
        for cell in &self.format {
            if let Some(furn) = &cell.furn {
                check_plant_furn(furn, catalog, &self.context)?;
            }
        }
        for op in &self.setmaps {
            if let SetMapKind::Furn(furn) = &op.kind {
                check_plant_furn(furn, catalog, &self.context)?;
            }
        }
        for (_, piece) in &self.objects {
            piece.check(catalog, &self.context)?;
        }
        Ok(())
    }

    fn fits(&self, grid: &TileGrid, offset: (i32, i32)) -> bool {
        offset.0 >= 0
            && offset.1 >= 0
            && offset.0 as usize + self.size <= grid.width()
            && offset.1 as usize + self.size <= grid.height()
    }
}

fn in_grid(grid: &TileGrid, x: i32, y: i32) -> bool {
    x >= 0 && y >= 0 && (x as usize) < grid.width() && (y as usize) < grid.height()
}

/// PLANT furniture may only be placed through sealed-item pieces, which
/// restore it over their contents.
fn check_plant_furn(furn: &FurnId, catalog: &Catalog, context: &str) -> Result<(), LoadError> {
    if catalog.furn_has_flag(furn, "PLANT") {
        return Err(LoadError::structure(
            context,
            format!(
                "specifies furniture {furn} with flag PLANT; such furniture must be placed with \"sealed_item\""
            ),
        ));
    }
    Ok(())
}

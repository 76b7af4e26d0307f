//! Scalar map edits: point/line/square writes of terrain, furniture,
//! traps, radiation, and forced destruction.
//!
//! These run after the character grid is stamped and before the placement
//! pairs, in declaration order. Every repeat iteration re-resolves all
//! ranged coordinates, so a repeated ranged edit can land differently each
//! time.

use rand_chacha::ChaCha8Rng;
use serde_json::{Map, Value};

use crate::catalog::Catalog;
use crate::grid::TileGrid;
use crate::ids::{FurnId, TerrainId, TrapId};
use crate::loader::{DeferList, LoadError};
use crate::range::{check_bounds, BoundsCheck, IntRange};
use crate::rng::one_in;

/// The footprint of one edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetMapShape {
    Point,
    Line,
    Square,
}

/// What the edit writes.
#[derive(Clone, Debug)]
pub enum SetMapKind {
    Ter(TerrainId),
    Furn(FurnId),
    Trap(TrapId),
    Radiation(IntRange),
    Bash,
}

/// One parsed `set` entry.
#[derive(Clone, Debug)]
pub struct SetMapOp {
    pub shape: SetMapShape,
    pub kind: SetMapKind,
    pub x: IntRange,
    pub y: IntRange,
    pub x2: IntRange,
    pub y2: IntRange,
    /// One-in-N gate for the whole operation; 1 means always.
    pub chance: u32,
    pub repeat: IntRange,
}

impl SetMapOp {
    /// Parse one entry of the `set` array. Returns `None` when the entry
    /// lies outside this definition's window of a shared grid.
    pub fn parse(
        jo: &Map<String, Value>,
        size: usize,
        offset: (i32, i32),
        catalog: &Catalog,
        defer: &mut DeferList,
        context: &str,
    ) -> Result<Option<SetMapOp>, LoadError> {
        let (shape, target) = if let Some(t) = jo.get("point").and_then(Value::as_str) {
            (SetMapShape::Point, t)
        } else if let Some(t) = jo.get("line").and_then(Value::as_str) {
            (SetMapShape::Line, t)
        } else if let Some(t) = jo.get("square").and_then(Value::as_str) {
            (SetMapShape::Square, t)
        } else {
            return Err(LoadError::structure(
                context,
                "set entry must contain a \"point\", \"line\" or \"square\" member",
            ));
        };

        let x = IntRange::require(jo, "x", context)?.shifted(-offset.0);
        let y = IntRange::require(jo, "y", context)?.shifted(-offset.1);
        match check_bounds(&x, &y, size) {
            BoundsCheck::Skip => return Ok(None),
            BoundsCheck::Reject => return Err(LoadError::bounds(context)),
            BoundsCheck::Ok => {}
        }

        let (x2, y2) = if shape == SetMapShape::Point {
            (IntRange::ZERO, IntRange::ZERO)
        } else {
            let x2 = IntRange::require(jo, "x2", context)?.shifted(-offset.0);
            let y2 = IntRange::require(jo, "y2", context)?.shifted(-offset.1);
            match check_bounds(&x2, &y2, size) {
                BoundsCheck::Skip => return Ok(None),
                BoundsCheck::Reject => return Err(LoadError::bounds(context)),
                BoundsCheck::Ok => {}
            }
            (x2, y2)
        };

        let kind = match target {
            "terrain" => {
                let id = require_id(jo, context)?;
                let ter = TerrainId::new(id);
                if !catalog.has_terrain(&ter) {
                    defer.record("id", format!("no such terrain \"{ter}\""));
                }
                SetMapKind::Ter(ter)
            }
            "furniture" => {
                let id = require_id(jo, context)?;
                let furn = FurnId::new(id);
                if !catalog.has_furniture(&furn) {
                    defer.record("id", format!("no such furniture \"{furn}\""));
                }
                SetMapKind::Furn(furn)
            }
            "trap" => {
                let id = require_id(jo, context)?;
                let trap = TrapId::new(id);
                if !catalog.has_trap(&trap) {
                    defer.record("id", format!("no such trap \"{trap}\""));
                }
                SetMapKind::Trap(trap)
            }
            "radiation" => {
                SetMapKind::Radiation(IntRange::from_obj_or(jo, "amount", IntRange::ZERO, context)?)
            }
            "bash" => SetMapKind::Bash,
            other => {
                return Err(LoadError::structure(
                    context,
                    format!("invalid set target \"{other}\""),
                ))
            }
        };

        let chance = jo.get("chance").and_then(Value::as_u64).unwrap_or(1) as u32;
        let repeat = IntRange::from_obj_or(jo, "repeat", IntRange::ONE, context)?;

        Ok(Some(SetMapOp { shape, kind, x, y, x2, y2, chance, repeat }))
    }

    /// Execute against a grid, optionally shifted for nested/update use.
    pub fn apply(
        &self,
        grid: &mut TileGrid,
        catalog: &Catalog,
        rng: &mut ChaCha8Rng,
        offset: (i32, i32),
    ) {
        if self.chance != 1 && !one_in(rng, self.chance) {
            return;
        }

        let repeat = self.repeat.resolve(rng).max(0);
        for _ in 0..repeat {
            let x = (self.x.resolve(rng) + offset.0) as usize;
            let y = (self.y.resolve(rng) + offset.1) as usize;
            match self.shape {
                SetMapShape::Point => self.write_point(grid, catalog, rng, x, y),
                SetMapShape::Line => {
                    let x2 = (self.x2.resolve(rng) + offset.0) as usize;
                    let y2 = (self.y2.resolve(rng) + offset.1) as usize;
                    self.write_line(grid, catalog, rng, x, y, x2, y2);
                }
                SetMapShape::Square => {
                    let x2 = (self.x2.resolve(rng) + offset.0) as usize;
                    let y2 = (self.y2.resolve(rng) + offset.1) as usize;
                    self.write_square(grid, catalog, rng, x, y, x2, y2);
                }
            }
        }
    }

    fn write_point(
        &self,
        grid: &mut TileGrid,
        catalog: &Catalog,
        rng: &mut ChaCha8Rng,
        x: usize,
        y: usize,
    ) {
        match &self.kind {
            SetMapKind::Ter(ter) => grid.set_ter(x, y, ter.clone()),
            SetMapKind::Furn(furn) => grid.set_furn(x, y, Some(furn.clone())),
            SetMapKind::Trap(trap) => grid.set_trap(x, y, Some(trap.clone())),
            SetMapKind::Radiation(amount) => {
                grid.set_radiation(x, y, amount.resolve(rng).max(0) as u32)
            }
            SetMapKind::Bash => grid.bash(x, y, catalog),
        }
    }

    fn write_line(
        &self,
        grid: &mut TileGrid,
        catalog: &Catalog,
        rng: &mut ChaCha8Rng,
        x: usize,
        y: usize,
        x2: usize,
        y2: usize,
    ) {
        match &self.kind {
            SetMapKind::Ter(ter) => grid.draw_line_ter(ter, x, y, x2, y2),
            SetMapKind::Furn(furn) => grid.draw_line_furn(furn, x, y, x2, y2),
            SetMapKind::Trap(trap) => {
                for (px, py) in line_cells(x, y, x2, y2) {
                    grid.set_trap(px, py, Some(trap.clone()));
                }
            }
            SetMapKind::Radiation(amount) => {
                for (px, py) in line_cells(x, y, x2, y2) {
                    grid.set_radiation(px, py, amount.resolve(rng).max(0) as u32);
                }
            }
            SetMapKind::Bash => {
                for (px, py) in line_cells(x, y, x2, y2) {
                    grid.bash(px, py, catalog);
                }
            }
        }
    }

    fn write_square(
        &self,
        grid: &mut TileGrid,
        catalog: &Catalog,
        rng: &mut ChaCha8Rng,
        x: usize,
        y: usize,
        x2: usize,
        y2: usize,
    ) {
        match &self.kind {
            SetMapKind::Ter(ter) => grid.draw_square_ter(ter, x, y, x2, y2),
            SetMapKind::Furn(furn) => grid.draw_square_furn(furn, x, y, x2, y2),
            _ => {
                for py in y.min(y2)..=y.max(y2) {
                    for px in x.min(x2)..=x.max(x2) {
                        self.write_point(grid, catalog, rng, px, py);
                    }
                }
            }
        }
    }

    /// Whether executing this op could overwrite a vehicle. Coordinate
    /// resolution mirrors `apply`; only cell-content edits collide.
    pub fn has_vehicle_collision(
        &self,
        grid: &TileGrid,
        rng: &mut ChaCha8Rng,
        offset: (i32, i32),
    ) -> bool {
        match self.kind {
            SetMapKind::Ter(_) | SetMapKind::Furn(_) | SetMapKind::Trap(_) => {}
            SetMapKind::Radiation(_) | SetMapKind::Bash => return false,
        }
        let x = (self.x.resolve(rng) + offset.0) as usize;
        let y = (self.y.resolve(rng) + offset.1) as usize;
        let (x2, y2) = if self.shape == SetMapShape::Point {
            (x, y)
        } else {
            (
                (self.x2.resolve(rng) + offset.0) as usize,
                (self.y2.resolve(rng) + offset.1) as usize,
            )
        };
        for py in y.min(y2)..=y.max(y2) {
            for px in x.min(x2)..=x.max(x2) {
                if grid.veh_at(px, py) {
                    return true;
                }
            }
        }
        false
    }
}

fn require_id<'a>(jo: &'a Map<String, Value>, context: &str) -> Result<&'a str, LoadError> {
    jo.get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| LoadError::structure(context, "set entry missing \"id\""))
}

/// Cells on the line between two points, endpoints included.
fn line_cells(x0: usize, y0: usize, x1: usize, y1: usize) -> Vec<(usize, usize)> {
    // Reuse the grid's line rule via a simple local Bresenham walk.
    let mut cells = Vec::new();
    let dx = (x1 as i32 - x0 as i32).abs();
    let dy = -(y1 as i32 - y0 as i32).abs();
    let sx = if x0 < x1 { 1i32 } else { -1 };
    let sy = if y0 < y1 { 1i32 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0 as i32, y0 as i32);
    loop {
        cells.push((x as usize, y as usize));
        if x == x1 as i32 && y == y1 as i32 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use serde_json::json;

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        for def in [
            json!({ "type": "terrain", "id": "t_floor" }),
            json!({ "type": "terrain", "id": "t_grass" }),
        ] {
            c.load_definition("terrain", &def).unwrap();
        }
        c.load_definition("trap", &json!({ "type": "trap", "id": "tr_pit" })).unwrap();
        c
    }

    fn parse_op(v: &Value, catalog: &Catalog) -> SetMapOp {
        let mut defer = DeferList::default();
        let op = SetMapOp::parse(v.as_object().unwrap(), 24, (0, 0), catalog, &mut defer, "test")
            .unwrap()
            .unwrap();
        assert!(defer.is_empty(), "unexpected deferral: {:?}", defer.first());
        op
    }

    #[test]
    fn test_square_stamps_all_cells() {
        let catalog = catalog();
        let op = parse_op(
            &json!({ "square": "terrain", "id": "t_floor", "x": 0, "y": 0, "x2": 1, "y2": 1 }),
            &catalog,
        );
        let mut grid = TileGrid::new(24, 24, TerrainId::new("t_grass"));
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        op.apply(&mut grid, &catalog, &mut rng, (0, 0));
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(grid.ter(x, y).as_str(), "t_floor");
            }
        }
        assert_eq!(grid.ter(2, 2).as_str(), "t_grass");
    }

    #[test]
    fn test_point_trap() {
        let catalog = catalog();
        let op = parse_op(
            &json!({ "point": "trap", "id": "tr_pit", "x": 3, "y": 4 }),
            &catalog,
        );
        let mut grid = TileGrid::new(24, 24, TerrainId::new("t_grass"));
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        op.apply(&mut grid, &catalog, &mut rng, (0, 0));
        assert_eq!(grid.trap(3, 4).unwrap().as_str(), "tr_pit");
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let catalog = catalog();
        let mut defer = DeferList::default();
        let v = json!({ "point": "terrain", "id": "t_floor", "x": [20, 30], "y": 0 });
        let err = SetMapOp::parse(
            v.as_object().unwrap(),
            24,
            (0, 0),
            &catalog,
            &mut defer,
            "test",
        );
        assert!(matches!(err, Err(LoadError::Bounds { .. })));
    }

    #[test]
    fn test_unknown_terrain_defers() {
        let catalog = catalog();
        let mut defer = DeferList::default();
        let v = json!({ "point": "terrain", "id": "t_missing", "x": 0, "y": 0 });
        SetMapOp::parse(v.as_object().unwrap(), 24, (0, 0), &catalog, &mut defer, "test")
            .unwrap();
        let (member, message) = defer.first().unwrap();
        assert_eq!(member, "id");
        assert!(message.contains("t_missing"));
    }

    #[test]
    fn test_collision_mirrors_footprint() {
        let catalog = catalog();
        let op = parse_op(
            &json!({ "square": "terrain", "id": "t_floor", "x": 0, "y": 0, "x2": 3, "y2": 3 }),
            &catalog,
        );
        let mut grid = TileGrid::new(24, 24, TerrainId::new("t_grass"));
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(!op.has_vehicle_collision(&grid, &mut rng, (0, 0)));
        grid.add_vehicle(crate::grid::VehicleSpawn {
            x: 2,
            y: 2,
            vehicle: crate::ids::VehicleGroupId::new("car"),
            dir: 0,
            fuel: -1,
            status: -1,
        });
        assert!(op.has_vehicle_collision(&grid, &mut rng, (0, 0)));
    }
}

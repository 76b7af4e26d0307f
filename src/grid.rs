//! The mutable 2D tile buffer one generation run writes into.
//!
//! A `TileGrid` holds the per-cell terrain/furniture/trap/radiation state
//! plus side tables for everything that is not a cell property: spawned
//! items, deferred monster spawns, vehicles, signage, computers, zones and
//! ownership stamps. The grid is exclusively owned by one generation run;
//! persistence and rendering happen elsewhere.

use crate::catalog::Catalog;
use crate::ids::{
    FactionId, FieldId, FurnId, ItemId, MonsterId, TerrainId, TrapId, VehicleGroupId, ZoneTypeId,
};

/// Edge length of one standard map tile.
pub const TILE_SIZE: usize = 24;

/// Per-cell state.
#[derive(Clone, Debug)]
pub struct Cell {
    pub ter: TerrainId,
    pub furn: Option<FurnId>,
    pub trap: Option<TrapId>,
    pub radiation: u32,
}

impl Cell {
    fn new(ter: TerrainId) -> Self {
        Self { ter, furn: None, trap: None, radiation: 0 }
    }
}

/// A stack of one item type dropped at a cell.
#[derive(Clone, Debug)]
pub struct ItemSpawn {
    pub x: usize,
    pub y: usize,
    pub item: ItemId,
    pub amount: u32,
}

/// A deferred monster spawn point; actual creature creation is the
/// host's concern.
#[derive(Clone, Debug)]
pub struct MonsterSpawn {
    pub x: usize,
    pub y: usize,
    pub monster: MonsterId,
    pub count: u32,
    pub friendly: bool,
    pub name: Option<String>,
}

/// A vehicle placed at a cell with heading and condition parameters.
#[derive(Clone, Debug)]
pub struct VehicleSpawn {
    pub x: usize,
    pub y: usize,
    pub vehicle: VehicleGroupId,
    /// Heading in degrees, counted clockwise from north.
    pub dir: i32,
    pub fuel: i32,
    pub status: i32,
}

/// A field effect on a cell.
#[derive(Clone, Debug)]
pub struct FieldSpawn {
    pub x: usize,
    pub y: usize,
    pub field: FieldId,
    pub intensity: u32,
    pub age: u32,
}

/// Sign or graffiti text attached to a cell.
#[derive(Clone, Debug)]
pub struct TextAt {
    pub x: usize,
    pub y: usize,
    pub text: String,
}

/// One selectable option on a computer terminal.
#[derive(Clone, Debug)]
pub struct ComputerOption {
    pub name: String,
    pub action: String,
    pub security: u32,
}

/// One failure effect triggered by a failed hack attempt.
#[derive(Clone, Debug)]
pub struct ComputerFailure {
    pub action: String,
}

/// A computer terminal constructed at a cell.
#[derive(Clone, Debug)]
pub struct ComputerSpawn {
    pub x: usize,
    pub y: usize,
    pub name: String,
    pub security: u32,
    pub access_denied: Option<String>,
    pub options: Vec<ComputerOption>,
    pub failures: Vec<ComputerFailure>,
}

/// A zone registered over a rectangle.
#[derive(Clone, Debug)]
pub struct ZoneSpawn {
    pub zone_type: ZoneTypeId,
    pub faction: FactionId,
    pub name: Option<String>,
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

/// Faction ownership stamped over a rectangle.
#[derive(Clone, Debug)]
pub struct OwnershipStamp {
    pub faction: FactionId,
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

/// A fixed-size square grid of cells plus side tables.
#[derive(Clone, Debug)]
pub struct TileGrid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    pub items: Vec<ItemSpawn>,
    pub spawns: Vec<MonsterSpawn>,
    pub vehicles: Vec<VehicleSpawn>,
    pub fields: Vec<FieldSpawn>,
    pub signage: Vec<TextAt>,
    pub graffiti: Vec<TextAt>,
    pub computers: Vec<ComputerSpawn>,
    pub zones: Vec<ZoneSpawn>,
    pub owners: Vec<OwnershipStamp>,
}

impl TileGrid {
    /// Allocate a grid filled with one terrain.
    pub fn new(width: usize, height: usize, fill: TerrainId) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::new(fill); width * height],
            items: Vec::new(),
            spawns: Vec::new(),
            vehicles: Vec::new(),
            fields: Vec::new(),
            signage: Vec::new(),
            graffiti: Vec::new(),
            computers: Vec::new(),
            zones: Vec::new(),
            owners: Vec::new(),
        }
    }

    /// Allocate a standard-size tile.
    pub fn tile(fill: TerrainId) -> Self {
        Self::new(TILE_SIZE, TILE_SIZE, fill)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    pub fn cell(&self, x: usize, y: usize) -> &Cell {
        &self.cells[self.index(x, y)]
    }

    pub fn ter(&self, x: usize, y: usize) -> &TerrainId {
        &self.cells[self.index(x, y)].ter
    }

    pub fn set_ter(&mut self, x: usize, y: usize, ter: TerrainId) {
        let idx = self.index(x, y);
        self.cells[idx].ter = ter;
    }

    pub fn furn(&self, x: usize, y: usize) -> Option<&FurnId> {
        self.cells[self.index(x, y)].furn.as_ref()
    }

    pub fn set_furn(&mut self, x: usize, y: usize, furn: Option<FurnId>) {
        let idx = self.index(x, y);
        self.cells[idx].furn = furn;
    }

    pub fn trap(&self, x: usize, y: usize) -> Option<&TrapId> {
        self.cells[self.index(x, y)].trap.as_ref()
    }

    pub fn set_trap(&mut self, x: usize, y: usize, trap: Option<TrapId>) {
        let idx = self.index(x, y);
        self.cells[idx].trap = trap;
    }

    pub fn radiation(&self, x: usize, y: usize) -> u32 {
        self.cells[self.index(x, y)].radiation
    }

    pub fn set_radiation(&mut self, x: usize, y: usize, amount: u32) {
        let idx = self.index(x, y);
        self.cells[idx].radiation = amount;
    }

    /// Stamp one terrain over every cell, leaving side tables alone.
    pub fn fill_terrain(&mut self, ter: &TerrainId) {
        for cell in &mut self.cells {
            cell.ter = ter.clone();
        }
    }

    /// Replace every occurrence of one terrain with another.
    pub fn translate_ter(&mut self, from: &TerrainId, to: &TerrainId) {
        for cell in &mut self.cells {
            if cell.ter == *from {
                cell.ter = to.clone();
            }
        }
    }

    /// Force-destroy a cell: furniture degrades to its bash result (or
    /// clears), bare terrain degrades to its bash result if it has one.
    pub fn bash(&mut self, x: usize, y: usize, catalog: &Catalog) {
        let idx = self.index(x, y);
        if let Some(furn) = self.cells[idx].furn.take() {
            self.cells[idx].furn = catalog.furn_bash_result(&furn);
            return;
        }
        let ter = self.cells[idx].ter.clone();
        if let Some(to) = catalog.ter_bash_result(&ter) {
            self.cells[idx].ter = to;
        }
    }

    pub fn draw_line_ter(&mut self, ter: &TerrainId, x1: usize, y1: usize, x2: usize, y2: usize) {
        for (x, y) in bresenham_line(x1, y1, x2, y2) {
            self.set_ter(x, y, ter.clone());
        }
    }

    pub fn draw_line_furn(&mut self, furn: &FurnId, x1: usize, y1: usize, x2: usize, y2: usize) {
        for (x, y) in bresenham_line(x1, y1, x2, y2) {
            self.set_furn(x, y, Some(furn.clone()));
        }
    }

    pub fn draw_square_ter(&mut self, ter: &TerrainId, x1: usize, y1: usize, x2: usize, y2: usize) {
        for y in y1.min(y2)..=y1.max(y2) {
            for x in x1.min(x2)..=x1.max(x2) {
                self.set_ter(x, y, ter.clone());
            }
        }
    }

    pub fn draw_square_furn(&mut self, furn: &FurnId, x1: usize, y1: usize, x2: usize, y2: usize) {
        for y in y1.min(y2)..=y1.max(y2) {
            for x in x1.min(x2)..=x1.max(x2) {
                self.set_furn(x, y, Some(furn.clone()));
            }
        }
    }

    pub fn add_item(&mut self, x: usize, y: usize, item: ItemId, amount: u32) {
        self.items.push(ItemSpawn { x, y, item, amount });
    }

    pub fn add_spawn(&mut self, spawn: MonsterSpawn) {
        self.spawns.push(spawn);
    }

    pub fn add_vehicle(&mut self, vehicle: VehicleSpawn) {
        self.vehicles.push(vehicle);
    }

    pub fn add_field(&mut self, field: FieldSpawn) {
        self.fields.push(field);
    }

    /// Attach sign text to a cell, replacing any previous signage there.
    pub fn set_signage(&mut self, x: usize, y: usize, text: String) {
        self.signage.retain(|s| s.x != x || s.y != y);
        self.signage.push(TextAt { x, y, text });
    }

    pub fn set_graffiti(&mut self, x: usize, y: usize, text: String) {
        self.graffiti.retain(|s| s.x != x || s.y != y);
        self.graffiti.push(TextAt { x, y, text });
    }

    pub fn add_computer(&mut self, computer: ComputerSpawn) {
        self.computers.push(computer);
    }

    pub fn add_zone(&mut self, zone: ZoneSpawn) {
        self.zones.push(zone);
    }

    pub fn stamp_ownership(&mut self, stamp: OwnershipStamp) {
        self.owners.push(stamp);
    }

    /// Drop all items lying at a cell.
    pub fn clear_items_at(&mut self, x: usize, y: usize) {
        self.items.retain(|it| it.x != x || it.y != y);
    }

    /// Whether a vehicle occupies the cell.
    pub fn veh_at(&self, x: usize, y: usize) -> bool {
        self.vehicles.iter().any(|v| v.x == x && v.y == y)
    }

    /// Rotate the grid by `turns` quarter turns clockwise, remapping every
    /// cell and every side-table occupant. Rotating four times is the
    /// identity.
    pub fn rotate(&mut self, turns: u32) {
        for _ in 0..turns % 4 {
            self.rotate_once();
        }
    }

    fn rotate_once(&mut self) {
        let (w, h) = (self.width, self.height);
        let mut rotated = self.cells.clone();
        for y in 0..h {
            for x in 0..w {
                // (x, y) moves to (h - 1 - y, x) under a clockwise quarter turn
                let (nx, ny) = (h - 1 - y, x);
                rotated[ny * h + nx] = self.cells[y * w + x].clone();
            }
        }
        self.cells = rotated;
        self.width = h;
        self.height = w;

        let map = |x: usize, y: usize| (h - 1 - y, x);
        for it in &mut self.items {
            (it.x, it.y) = map(it.x, it.y);
        }
        for sp in &mut self.spawns {
            (sp.x, sp.y) = map(sp.x, sp.y);
        }
        for v in &mut self.vehicles {
            (v.x, v.y) = map(v.x, v.y);
            v.dir = (v.dir + 90).rem_euclid(360);
        }
        for f in &mut self.fields {
            (f.x, f.y) = map(f.x, f.y);
        }
        for s in &mut self.signage {
            (s.x, s.y) = map(s.x, s.y);
        }
        for g in &mut self.graffiti {
            (g.x, g.y) = map(g.x, g.y);
        }
        for c in &mut self.computers {
            (c.x, c.y) = map(c.x, c.y);
        }
        for z in &mut self.zones {
            let (ax, ay) = map(z.x1, z.y2);
            let (bx, by) = map(z.x2, z.y1);
            (z.x1, z.y1, z.x2, z.y2) = (ax.min(bx), ay.min(by), ax.max(bx), ay.max(by));
        }
        for o in &mut self.owners {
            let (ax, ay) = map(o.x1, o.y2);
            let (bx, by) = map(o.x2, o.y1);
            (o.x1, o.y1, o.x2, o.y2) = (ax.min(bx), ay.min(by), ax.max(bx), ay.max(by));
        }
    }
}

/// All cells on the line between two points, endpoints included.
fn bresenham_line(x0: usize, y0: usize, x1: usize, y1: usize) -> Vec<(usize, usize)> {
    let mut path = Vec::new();

    let dx = (x1 as i32 - x0 as i32).abs();
    let dy = -(y1 as i32 - y0 as i32).abs();
    let sx = if x0 < x1 { 1i32 } else { -1 };
    let sy = if y0 < y1 { 1i32 } else { -1 };
    let mut err = dx + dy;

    let mut x = x0 as i32;
    let mut y = y0 as i32;

    loop {
        path.push((x as usize, y as usize));

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

    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grass() -> TerrainId {
        TerrainId::new("t_grass")
    }

    #[test]
    fn test_fill_and_cell_access() {
        let mut grid = TileGrid::new(4, 4, grass());
        assert_eq!(grid.ter(3, 3).as_str(), "t_grass");
        grid.set_ter(1, 2, TerrainId::new("t_dirt"));
        assert_eq!(grid.ter(1, 2).as_str(), "t_dirt");
        assert_eq!(grid.ter(2, 1).as_str(), "t_grass");
    }

    #[test]
    fn test_draw_square_covers_inclusive_rect() {
        let mut grid = TileGrid::new(4, 4, grass());
        grid.draw_square_ter(&TerrainId::new("t_floor"), 1, 1, 2, 2);
        let floored = (0..4)
            .flat_map(|y| (0..4).map(move |x| (x, y)))
            .filter(|&(x, y)| grid.ter(x, y).as_str() == "t_floor")
            .count();
        assert_eq!(floored, 4);
    }

    #[test]
    fn test_line_connects_endpoints() {
        let mut grid = TileGrid::new(8, 8, grass());
        grid.draw_line_ter(&TerrainId::new("t_wall"), 0, 0, 7, 3);
        assert_eq!(grid.ter(0, 0).as_str(), "t_wall");
        assert_eq!(grid.ter(7, 3).as_str(), "t_wall");
    }

    #[test]
    fn test_rotation_is_cyclic_of_order_four() {
        let mut grid = TileGrid::new(4, 4, grass());
        grid.set_ter(1, 0, TerrainId::new("t_wall"));
        grid.add_item(2, 3, ItemId::new("rock"), 1);
        let original = grid.clone();

        grid.rotate(1);
        grid.rotate(1);
        grid.rotate(1);
        grid.rotate(1);
        assert_eq!(grid.ter(1, 0), original.ter(1, 0));
        assert_eq!((grid.items[0].x, grid.items[0].y), (2, 3));

        let mut by_four = original.clone();
        by_four.rotate(4);
        assert_eq!(by_four.ter(1, 0), original.ter(1, 0));

        let mut by_zero = original.clone();
        by_zero.rotate(0);
        assert_eq!(by_zero.ter(1, 0), original.ter(1, 0));
    }

    #[test]
    fn test_rotation_moves_occupants_consistently() {
        let mut grid = TileGrid::new(4, 4, grass());
        grid.set_ter(1, 0, TerrainId::new("t_wall"));
        grid.add_item(1, 0, ItemId::new("rock"), 1);
        grid.rotate(1);
        // (1, 0) -> (3, 1) on a 4x4 grid
        assert_eq!(grid.ter(3, 1).as_str(), "t_wall");
        assert_eq!((grid.items[0].x, grid.items[0].y), (3, 1));
    }

    #[test]
    fn test_rotation_turns_vehicle_heading() {
        let mut grid = TileGrid::new(4, 4, grass());
        grid.add_vehicle(VehicleSpawn {
            x: 0,
            y: 0,
            vehicle: VehicleGroupId::new("car"),
            dir: 270,
            fuel: -1,
            status: -1,
        });
        grid.rotate(2);
        assert_eq!(grid.vehicles[0].dir, 90);
        assert_eq!((grid.vehicles[0].x, grid.vehicles[0].y), (3, 3));
    }

    #[test]
    fn test_translate_ter() {
        let mut grid = TileGrid::new(3, 3, grass());
        grid.set_ter(0, 0, TerrainId::new("t_dirt"));
        grid.translate_ter(&grass(), &TerrainId::new("t_floor"));
        assert_eq!(grid.ter(0, 0).as_str(), "t_dirt");
        assert_eq!(grid.ter(1, 1).as_str(), "t_floor");
    }

    #[test]
    fn test_veh_at() {
        let mut grid = TileGrid::new(4, 4, grass());
        assert!(!grid.veh_at(2, 2));
        grid.add_vehicle(VehicleSpawn {
            x: 2,
            y: 2,
            vehicle: VehicleGroupId::new("car"),
            dir: 0,
            fuel: -1,
            status: -1,
        });
        assert!(grid.veh_at(2, 2));
        assert!(!grid.veh_at(1, 2));
    }
}

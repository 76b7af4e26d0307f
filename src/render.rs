//! ASCII rendering of generated grids.
//!
//! One character per cell for quick inspection from the CLI: furniture
//! glyphs draw over terrain glyphs, then traps, items, spawns and
//! vehicles mark their cells.

use crate::catalog::Catalog;
use crate::grid::TileGrid;

/// What a marker layer draws when present on a cell.
const TRAP_CHAR: char = '^';
const ITEM_CHAR: char = '%';
const SPAWN_CHAR: char = 'M';
const VEHICLE_CHAR: char = 'V';

/// Render the grid as one text row per grid row.
pub fn render_grid(grid: &TileGrid, catalog: &Catalog) -> String {
    let mut out = String::with_capacity((grid.width() + 1) * grid.height());
    for y in 0..grid.height() {
        for x in 0..grid.width() {
            out.push(cell_char(grid, catalog, x, y));
        }
        out.push('\n');
    }
    out
}

fn cell_char(grid: &TileGrid, catalog: &Catalog, x: usize, y: usize) -> char {
    if grid.veh_at(x, y) {
        return VEHICLE_CHAR;
    }
    if grid.spawns.iter().any(|s| s.x == x && s.y == y) {
        return SPAWN_CHAR;
    }
    if grid.items.iter().any(|i| i.x == x && i.y == y) {
        return ITEM_CHAR;
    }
    if grid.trap(x, y).is_some() {
        return TRAP_CHAR;
    }
    if let Some(furn) = grid.furn(x, y) {
        if let Some(symbol) = catalog.furn_symbol(furn) {
            return symbol;
        }
        return '&';
    }
    catalog.ter_symbol(grid.ter(x, y))
}

/// A one-line summary of everything the run placed.
pub fn summarize_grid(grid: &TileGrid) -> String {
    format!(
        "{} items, {} spawns, {} vehicles, {} signs, {} computers, {} zones",
        grid.items.len(),
        grid.spawns.len(),
        grid.vehicles.len(),
        grid.signage.len(),
        grid.computers.len(),
        grid.zones.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FurnId, ItemId, TerrainId};
    use serde_json::json;

    #[test]
    fn test_render_layers() {
        let mut catalog = Catalog::new();
        catalog
            .load_definition("terrain", &json!({ "id": "t_grass", "symbol": "." }))
            .unwrap();
        catalog
            .load_definition("furniture", &json!({ "id": "f_table", "symbol": "T" }))
            .unwrap();

        let mut grid = TileGrid::new(3, 1, TerrainId::new("t_grass"));
        grid.set_furn(1, 0, Some(FurnId::new("f_table")));
        grid.add_item(2, 0, ItemId::new("hammer"), 1);

        assert_eq!(render_grid(&grid, &catalog), ".T%\n");
    }

    #[test]
    fn test_unknown_terrain_renders_default() {
        let catalog = Catalog::new();
        let grid = TileGrid::new(2, 1, TerrainId::new("t_mystery"));
        assert_eq!(render_grid(&grid, &catalog), "..\n");
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rayon::prelude::*;

use tilegen::grid::TileGrid;
use tilegen::ids::{OmTerrainId, TerrainId};
use tilegen::loader;
use tilegen::plan::GenContext;
use tilegen::render;
use tilegen::rng::tile_rng;

#[derive(Parser, Debug)]
#[command(name = "tilegen")]
#[command(about = "Generate map tiles from declarative JSON definitions")]
struct Args {
    /// Directory of definition .json files
    #[arg(short, long, default_value = "data")]
    data: PathBuf,

    /// Overmap terrain id to generate a tile for
    #[arg(short, long)]
    terrain: Option<String>,

    /// Random seed (uses a random seed if not specified)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of tiles to generate; independent seeds, run in parallel
    #[arg(short = 'n', long, default_value = "1")]
    count: usize,

    /// Terrain used for the flat fallback when no definition exists
    #[arg(long, default_value = "t_floor")]
    fallback_terrain: String,

    /// List every terrain id with a registered definition and exit
    #[arg(long)]
    list: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let content = match loader::load_batch_from_dir(&args.data) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("failed to read definitions from {}: {e}", args.data.display());
            return ExitCode::FAILURE;
        }
    };
    println!(
        "Loaded {} mapgen keys and {} palettes",
        content.registry.terrain_keys().count(),
        content.palettes.len()
    );
    for err in &content.errors {
        eprintln!("load error: {err}");
    }

    if args.list {
        let mut keys: Vec<_> = content.registry.terrain_keys().collect();
        keys.sort();
        for key in keys {
            println!("{key}");
        }
        return ExitCode::SUCCESS;
    }

    let Some(terrain) = args.terrain.as_deref() else {
        eprintln!("nothing to do; pass --terrain <id> or --list");
        return ExitCode::SUCCESS;
    };
    let id = OmTerrainId::new(terrain);
    let seed = args.seed.unwrap_or_else(rand::random);
    println!("Generating {} tile(s) of {id} with seed: {seed}", args.count);

    let fallback = TerrainId::new(args.fallback_terrain.as_str());
    let tiles: Vec<(TileGrid, bool)> = (0..args.count)
        .into_par_iter()
        .map(|i| {
            let mut rng = tile_rng(seed, i as u64, 0);
            let mut grid = TileGrid::tile(fallback.clone());
            let ctx = GenContext::new(&content.catalog, &content.registry);
            let generated = content.registry.generate(&id, &mut grid, &ctx, &mut rng);
            (grid, generated)
        })
        .collect();

    for (i, (grid, generated)) in tiles.iter().enumerate() {
        if !generated {
            eprintln!(
                "no definition found for {id}; tile {i} is flat {}",
                args.fallback_terrain
            );
        }
        println!("tile {i}: {}", render::summarize_grid(grid));
    }
    if let Some((grid, _)) = tiles.first() {
        print!("{}", render::render_grid(grid, &content.catalog));
    }
    ExitCode::SUCCESS
}

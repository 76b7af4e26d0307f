//! The weighted definition registry.
//!
//! Maps each overmap terrain key to its competing plans (and builtin
//! hooks), plus the side registries for nested fragments and update
//! patches. Built once per load batch; `finalize` rebuilds the cumulative
//! weight tables and is idempotent, so the registry can be shared
//! read-only across parallel generation runs afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use rand_chacha::ChaCha8Rng;

use crate::grid::TileGrid;
use crate::ids::{NestedId, OmTerrainId, UpdateId};
use crate::plan::{GenContext, Plan};
use crate::weighted::WeightedList;

/// A host-supplied hand-written generator, selectable by name through
/// `"method": "builtin"` definitions.
pub type BuiltinFn = fn(&mut TileGrid, &mut ChaCha8Rng);

#[derive(Clone, Debug)]
enum MapgenSource {
    Plan(Arc<Plan>),
    Builtin(String),
}

#[derive(Clone, Debug)]
struct MapgenEntry {
    source: MapgenSource,
    weight: u32,
}

/// Registry of every loaded mapgen definition.
#[derive(Default)]
pub struct MapgenRegistry {
    mapgens: HashMap<OmTerrainId, Vec<MapgenEntry>>,
    weights: HashMap<OmTerrainId, WeightedList<usize>>,
    nested: HashMap<NestedId, WeightedList<Arc<Plan>>>,
    updates: HashMap<UpdateId, Vec<Arc<Plan>>>,
    builtins: HashMap<String, BuiltinFn>,
}

impl std::fmt::Debug for MapgenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapgenRegistry")
            .field("mapgens", &self.mapgens.len())
            .field("nested", &self.nested.len())
            .field("updates", &self.updates.len())
            .field("builtins", &self.builtins.len())
            .finish()
    }
}

impl MapgenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled plan under an overmap terrain key.
    pub fn register_plan(&mut self, id: OmTerrainId, plan: Arc<Plan>, weight: u32) {
        self.mapgens
            .entry(id)
            .or_default()
            .push(MapgenEntry { source: MapgenSource::Plan(plan), weight });
    }

    /// Register a named builtin hook under an overmap terrain key.
    pub fn register_builtin_mapgen(&mut self, id: OmTerrainId, name: &str, weight: u32) {
        self.mapgens
            .entry(id)
            .or_default()
            .push(MapgenEntry { source: MapgenSource::Builtin(name.to_string()), weight });
    }

    /// A later definition with weight 0 suppresses a previously registered
    /// builtin of the same name. Order-dependent by design: last load wins.
    pub fn disable_builtin(&mut self, id: &OmTerrainId, name: &str) {
        if let Some(entries) = self.mapgens.get_mut(id) {
            for entry in entries {
                if matches!(&entry.source, MapgenSource::Builtin(n) if n == name) {
                    entry.weight = 0;
                }
            }
        }
    }

    pub fn register_nested(&mut self, id: NestedId, plan: Arc<Plan>, weight: u32) {
        self.nested.entry(id).or_default().add(plan, weight);
    }

    pub fn register_update(&mut self, id: UpdateId, plan: Arc<Plan>) {
        self.updates.entry(id).or_default().push(plan);
    }

    /// Make a hand-written generator selectable by builtin definitions.
    pub fn register_builtin_fn(&mut self, name: &str, f: BuiltinFn) {
        self.builtins.insert(name.to_string(), f);
    }

    /// Rebuild the cumulative weight tables. Entries with weight 0 stay
    /// registered (so `has` still reports them) but are never picked.
    pub fn finalize(&mut self) {
        self.weights.clear();
        for (id, entries) in &self.mapgens {
            let mut weights = WeightedList::new();
            for (index, entry) in entries.iter().enumerate() {
                weights.add(index, entry.weight);
            }
            self.weights.insert(id.clone(), weights);
        }
    }

    /// Whether any definition (even a disabled one) exists for the key.
    pub fn has(&self, id: &OmTerrainId) -> bool {
        self.mapgens.contains_key(id)
    }

    pub fn terrain_keys(&self) -> impl Iterator<Item = &OmTerrainId> {
        self.mapgens.keys()
    }

    pub fn nested_plans(&self, id: &NestedId) -> Option<&WeightedList<Arc<Plan>>> {
        self.nested.get(id)
    }

    /// Select a definition for the key and run it. Reports whether any
    /// definition was executed; fallback behavior belongs to the caller.
    pub fn generate(
        &self,
        id: &OmTerrainId,
        grid: &mut TileGrid,
        ctx: &GenContext,
        rng: &mut ChaCha8Rng,
    ) -> bool {
        let Some(weights) = self.weights.get(id) else { return false };
        let Some(&index) = weights.pick(rng) else { return false };
        match &self.mapgens[id][index].source {
            MapgenSource::Plan(plan) => {
                plan.generate(grid, ctx, rng);
                true
            }
            MapgenSource::Builtin(name) => match self.builtins.get(name) {
                Some(f) => {
                    f(grid, rng);
                    true
                }
                None => {
                    log::warn!("builtin mapgen function {name} is not registered");
                    false
                }
            },
        }
    }

    /// Apply every update plan registered under the key. With `verify`, a
    /// plan that would overwrite a vehicle aborts the whole update.
    pub fn apply_update(
        &self,
        id: &UpdateId,
        grid: &mut TileGrid,
        ctx: &GenContext,
        rng: &mut ChaCha8Rng,
        offset: (i32, i32),
        verify: bool,
    ) -> bool {
        let Some(plans) = self.updates.get(id) else { return false };
        for plan in plans {
            if !plan.update(grid, ctx, rng, offset, verify) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::ids::TerrainId;
    use crate::range::IntRange;
    use rand::SeedableRng;

    fn flat_plan(context: &str, fill: &str) -> Arc<Plan> {
        Arc::new(Plan {
            context: context.to_string(),
            kind: crate::plan::PlanKind::Primary,
            size: 4,
            fill_ter: Some(TerrainId::new(fill)),
            predecessor: None,
            rotation: IntRange::ZERO,
            format: Vec::new(),
            has_format: false,
            setmaps: Vec::new(),
            objects: Vec::new(),
        })
    }

    #[test]
    fn test_generate_reports_missing_definition() {
        let mut registry = MapgenRegistry::new();
        registry.finalize();
        let catalog = Catalog::new();
        let registry_ref = &registry;
        let ctx = GenContext::new(&catalog, registry_ref);
        let mut grid = TileGrid::new(4, 4, TerrainId::new("t_null"));
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(!registry_ref.generate(&OmTerrainId::new("house"), &mut grid, &ctx, &mut rng));
    }

    #[test]
    fn test_zero_weight_entries_register_but_never_run() {
        let mut registry = MapgenRegistry::new();
        let id = OmTerrainId::new("field");
        registry.register_plan(id.clone(), flat_plan("a", "t_grass"), 0);
        registry.finalize();
        assert!(registry.has(&id));

        let catalog = Catalog::new();
        let ctx = GenContext::new(&catalog, &registry);
        let mut grid = TileGrid::new(4, 4, TerrainId::new("t_null"));
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(!registry.generate(&id, &mut grid, &ctx, &mut rng));
        assert_eq!(grid.ter(0, 0).as_str(), "t_null");
    }

    #[test]
    fn test_weighted_selection_between_plans() {
        let mut registry = MapgenRegistry::new();
        let id = OmTerrainId::new("field");
        registry.register_plan(id.clone(), flat_plan("a", "t_grass"), 1);
        registry.register_plan(id.clone(), flat_plan("b", "t_dirt"), 1);
        registry.finalize();

        let catalog = Catalog::new();
        let ctx = GenContext::new(&catalog, &registry);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let mut grid = TileGrid::new(4, 4, TerrainId::new("t_null"));
            assert!(registry.generate(&id, &mut grid, &ctx, &mut rng));
            seen.insert(grid.ter(0, 0).clone());
        }
        assert!(seen.contains(&TerrainId::new("t_grass")));
        assert!(seen.contains(&TerrainId::new("t_dirt")));
    }

    #[test]
    fn test_disable_builtin_is_last_load_wins() {
        let mut registry = MapgenRegistry::new();
        let id = OmTerrainId::new("slime_pit");
        registry.register_builtin_mapgen(id.clone(), "slime_pit", 1000);
        registry.disable_builtin(&id, "slime_pit");
        registry.finalize();
        assert!(registry.has(&id));

        let catalog = Catalog::new();
        let ctx = GenContext::new(&catalog, &registry);
        let mut grid = TileGrid::new(4, 4, TerrainId::new("t_null"));
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(!registry.generate(&id, &mut grid, &ctx, &mut rng));
    }

    #[test]
    fn test_builtin_hook_runs_when_registered() {
        fn flatten(grid: &mut TileGrid, _rng: &mut ChaCha8Rng) {
            grid.fill_terrain(&TerrainId::new("t_floor"));
        }
        let mut registry = MapgenRegistry::new();
        let id = OmTerrainId::new("office");
        registry.register_builtin_mapgen(id.clone(), "office_tower", 1000);
        registry.register_builtin_fn("office_tower", flatten);
        registry.finalize();

        let catalog = Catalog::new();
        let ctx = GenContext::new(&catalog, &registry);
        let mut grid = TileGrid::new(4, 4, TerrainId::new("t_null"));
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(registry.generate(&id, &mut grid, &ctx, &mut rng));
        assert_eq!(grid.ter(2, 2).as_str(), "t_floor");
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut registry = MapgenRegistry::new();
        let id = OmTerrainId::new("field");
        registry.register_plan(id.clone(), flat_plan("a", "t_grass"), 3);
        registry.finalize();
        registry.finalize();

        let catalog = Catalog::new();
        let ctx = GenContext::new(&catalog, &registry);
        let mut grid = TileGrid::new(4, 4, TerrainId::new("t_null"));
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(registry.generate(&id, &mut grid, &ctx, &mut rng));
    }
}

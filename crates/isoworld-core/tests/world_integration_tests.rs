//! End-to-end tests driving a `World` through streaming, placement,
//! persistence and draw ordering

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::{IVec2, Vec2};
use isoworld_core::world::{
    Camera, ChunkState, ChunkStorage, DecorationStore, DrawKind, MaterialKind, MemoryChunkStorage,
    PlacementError, RoofStyle, StructureTemplate, TileType, World, WorldConfig,
};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

const CHUNK: i32 = 16;

fn world_with(config: WorldConfig) -> World {
    World::new("it", 42, config, Box::new(MemoryChunkStorage::new())).unwrap()
}

fn meadow() -> World {
    let mut world = world_with(WorldConfig::preset_meadow());
    world.update_chunks(IVec2::ZERO);
    world
}

/// Grid position at the top-left of a chunk
fn at_chunk(x: i32, y: i32) -> IVec2 {
    IVec2::new(x * CHUNK, y * CHUNK)
}

/// Memory storage whose reads and writes can be made to fail
struct FlakyStorage {
    inner: MemoryChunkStorage,
    fail_saves: Arc<AtomicBool>,
    fail_loads: Arc<AtomicBool>,
}

impl ChunkStorage for FlakyStorage {
    fn load_chunk(&self, world_id: &str, x: i32, y: i32) -> anyhow::Result<Option<Vec<u8>>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            anyhow::bail!("disk unplugged");
        }
        self.inner.load_chunk(world_id, x, y)
    }

    fn save_chunk(&mut self, world_id: &str, x: i32, y: i32, blob: &[u8]) -> anyhow::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.save_chunk(world_id, x, y, blob)
    }
}

// ============================================================================
// Streaming
// ============================================================================

#[test]
fn test_hysteresis_band() {
    let mut config = WorldConfig::default();
    config.streaming.load_distance = 2;
    config.streaming.unload_distance = 3;
    let mut world = world_with(config);

    let report = world.update_chunks(IVec2::new(3, 7));
    assert_eq!(report.tracked_chunk, IVec2::ZERO);
    assert_eq!(report.loaded.len(), 25);
    for cy in -2..=2 {
        for cx in -2..=2 {
            assert_eq!(world.chunk_state(IVec2::new(cx, cy)), Some(ChunkState::Loaded));
        }
    }

    let report = world.update_chunks(at_chunk(5, 0));
    assert_eq!(report.tracked_chunk, IVec2::new(5, 0));
    for cy in -2..=2 {
        // Distance exactly 3 stays loaded
        assert_eq!(world.chunk_state(IVec2::new(2, cy)), Some(ChunkState::Loaded));
        for cx in -2..=1 {
            assert_eq!(world.chunk_state(IVec2::new(cx, cy)), Some(ChunkState::Unloaded));
        }
    }
    assert_eq!(report.unloaded.len(), 20);

    // Oscillating across the boundary does not churn
    let back = world.update_chunks(at_chunk(4, 0));
    let forth = world.update_chunks(at_chunk(5, 0));
    assert!(back.unloaded.is_empty());
    assert!(forth.unloaded.is_empty() && forth.loaded.is_empty());
}

#[test]
fn test_world_limits() {
    let mut config = WorldConfig::default();
    config.streaming.limit_x = Some(isoworld_core::world::worldgen_config::AxisLimit { min: 0, max: 3 });
    let mut world = world_with(config);
    world.update_chunks(IVec2::ZERO);

    assert_eq!(world.chunk_state(IVec2::new(-1, 0)), None);
    assert_eq!(world.chunk_state(IVec2::new(2, 2)), Some(ChunkState::Loaded));
    assert!(world.tile_at(IVec2::new(-1, 0)).is_none());
    assert!(world.tile_at(IVec2::new(0, -500)).is_some());
}

#[test]
fn test_tile_queries_outside_chunks_match_generation() {
    let mut world = world_with(WorldConfig::default());
    let far = IVec2::new(4000, -2500);
    let tile = world.tile_at(far).unwrap();
    let expected = world
        .streamer()
        .generator()
        .generate_tile(far, &DecorationStore::new());
    assert_eq!(tile, expected);
    assert_eq!(world.loaded_chunk_count(), 0);

    // Non-finite world positions resolve to nothing
    assert!(world.tile_at_world(Vec2::new(f32::NAN, 1.0)).is_none());
}

#[test]
fn test_decorations_survive_eviction() {
    let mut config = WorldConfig::default();
    config.streaming.max_cached_chunks = 60;
    let mut world = world_with(config);
    world.update_chunks(IVec2::ZERO);

    let decorated: Vec<_> = (0..CHUNK)
        .flat_map(|y| (0..CHUNK).map(move |x| IVec2::new(x, y)))
        .filter_map(|pos| world.tile_at(pos).map(|t| (pos, t.decoration)))
        .collect();
    assert!(decorated.iter().any(|(_, d)| d.is_some()));

    world.update_chunks(at_chunk(20, 0));
    assert_eq!(world.chunk_state(IVec2::ZERO), None, "chunk should be evicted");

    world.update_chunks(IVec2::ZERO);
    for (pos, decoration) in decorated {
        assert_eq!(world.tile_at(pos).unwrap().decoration, decoration);
    }
}

#[test]
fn test_off_chunk_queries_keep_memory_bounded() {
    let mut config = WorldConfig::default();
    config.cache.tile_cache_capacity = 256;
    let mut world = world_with(config);

    for i in 0..20_000 {
        assert!(world.tile_at(IVec2::new(50_000 + i, 3 * i)).is_some());
    }
    assert_eq!(world.streamer().tile_cache().len(), 256);
    assert!(world.streamer().decorations().is_empty());
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_persistence_round_trip() {
    let mut world = meadow();
    let road = IVec2::new(9, 1);
    assert!(world.set_tile_type(road, TileType::Road));
    let house = world.place(IVec2::new(4, 4), "house").unwrap();
    assert!(world.toggle_door(house));
    assert!(world.save_all() >= 1);
    assert_eq!(world.save_all(), 0);

    let storage = world.into_storage();
    assert!(storage.load_chunk("it", 0, 0).unwrap().is_some());

    let mut reopened = World::new("it", 42, WorldConfig::preset_meadow(), storage).unwrap();
    reopened.update_chunks(IVec2::ZERO);
    assert_eq!(reopened.tile_at(road).unwrap().tile_type, TileType::Road);

    let restored = reopened.structure_at(IVec2::new(5, 5)).unwrap();
    assert_eq!(restored.template().id(), "house");
    assert_eq!(restored.origin(), IVec2::new(4, 4));
    assert!(restored.state.door_open);
    let id = restored.id();
    let occupant = reopened.tile_at(IVec2::new(6, 6)).unwrap().occupant.unwrap();
    assert_eq!(occupant.structure, id);
    assert_eq!(occupant.footprint_index, 8);
}

#[test]
fn test_failed_save_keeps_chunk_dirty() {
    let fail_saves = Arc::new(AtomicBool::new(true));
    let storage = FlakyStorage {
        inner: MemoryChunkStorage::new(),
        fail_saves: Arc::clone(&fail_saves),
        fail_loads: Arc::new(AtomicBool::new(false)),
    };
    let mut world = World::new("it", 42, WorldConfig::preset_meadow(), Box::new(storage)).unwrap();
    world.update_chunks(IVec2::ZERO);
    assert!(world.set_tile_type(IVec2::new(2, 2), TileType::Pavement));

    let report = world.update_chunks(at_chunk(10, 0));
    assert!(report.unloaded.contains(&IVec2::ZERO));
    assert!(report.save_failures >= 1);
    let chunk = world.streamer().chunk(IVec2::ZERO).unwrap();
    assert_eq!(chunk.state(), ChunkState::Unloaded);
    assert!(chunk.is_dirty());

    fail_saves.store(false, Ordering::SeqCst);
    assert_eq!(world.save_all(), 1);
    assert!(!world.streamer().chunk(IVec2::ZERO).unwrap().is_dirty());

    // Come back: the edit survived in memory
    world.update_chunks(IVec2::ZERO);
    assert_eq!(world.tile_at(IVec2::new(2, 2)).unwrap().tile_type, TileType::Pavement);
}

#[test]
fn test_failed_load_falls_back_to_generation() {
    let storage = FlakyStorage {
        inner: MemoryChunkStorage::new(),
        fail_saves: Arc::new(AtomicBool::new(false)),
        fail_loads: Arc::new(AtomicBool::new(true)),
    };
    let mut world = World::new("it", 42, WorldConfig::default(), Box::new(storage)).unwrap();
    let report = world.update_chunks(IVec2::ZERO);
    assert_eq!(report.loaded.len(), 25);

    let pos = IVec2::new(7, 3);
    let expected = world
        .streamer()
        .generator()
        .generate_tile(pos, &DecorationStore::new());
    assert_eq!(world.tile_at(pos).unwrap(), expected);
}

#[test]
fn test_file_storage_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let storage = isoworld_core::world::FileChunkStorage::new(dir.path());
    let mut world = World::new("disk", 9, WorldConfig::preset_meadow(), Box::new(storage)).unwrap();
    world.update_chunks(IVec2::ZERO);
    world.place(IVec2::new(3, 3), "watchtower").unwrap();
    assert_eq!(world.save_all(), 1);
    assert!(dir.path().join("disk/chunks/chunk_0_0.bin").exists());

    let storage = isoworld_core::world::FileChunkStorage::new(dir.path());
    let mut reopened = World::new("disk", 9, WorldConfig::preset_meadow(), Box::new(storage)).unwrap();
    reopened.update_chunks(IVec2::ZERO);
    assert_eq!(
        reopened.structure_at(IVec2::new(4, 4)).map(|s| s.template().id().to_string()),
        Some("watchtower".to_string())
    );
}

// ============================================================================
// Placement
// ============================================================================

#[test]
fn test_placement_scenario() {
    let mut world = meadow();

    let first = world.place(IVec2::new(5, 5), "cottage").unwrap();
    assert!(matches!(
        world.place(IVec2::new(5, 5), "cottage"),
        Err(PlacementError::Unsuitable { .. })
    ));

    let site = world.find_valid_placement(IVec2::new(5, 5), "cottage").unwrap();
    assert_eq!(site, IVec2::new(3, 3));
    let second = world.place(site, "cottage").unwrap();
    assert_ne!(first, second);
    assert_eq!(world.structure_at(IVec2::new(4, 4)).map(|s| s.id()), Some(second));
}

#[test]
fn test_clean_removal() {
    let mut world = meadow();
    let id = world.place(IVec2::new(8, 8), "house").unwrap();
    let footprint: Vec<IVec2> = world
        .structure(id)
        .unwrap()
        .footprint()
        .map(|c| c.position)
        .collect();
    assert_eq!(footprint.len(), 9);
    for &pos in &footprint {
        assert_eq!(world.tile_at(pos).unwrap().occupant.map(|o| o.structure), Some(id));
    }

    assert!(world.remove(id));
    for &pos in &footprint {
        assert!(world.tile_at(pos).unwrap().occupant.is_none());
        assert!(world.structure_at(pos).is_none());
    }
    assert!(!world.remove(id));

    // The site is free again
    assert!(world.place(IVec2::new(8, 8), "house").is_ok());
}

#[test]
fn test_no_overlap_invariant() {
    let mut world = world_with(WorldConfig::default());
    world.update_chunks(IVec2::ZERO);
    let mut rng = Xoshiro256StarStar::seed_from_u64(3);
    let templates = ["cottage", "house", "watchtower", "market_stall", "oak_tree", "pine_tree"];
    let mut placed = Vec::new();

    for step in 0..300 {
        if step % 7 == 6 && !placed.is_empty() {
            let index = rng.gen_range(0..placed.len());
            let id = placed.swap_remove(index);
            assert!(world.remove(id));
            continue;
        }
        let template = templates[rng.gen_range(0..templates.len())];
        let origin = IVec2::new(rng.gen_range(-30..30), rng.gen_range(-30..30));
        if let Some(site) = world.find_valid_placement(origin, template)
            && let Ok(id) = world.place(site, template)
        {
            placed.push(id);
        }
    }
    assert!(!placed.is_empty());

    let structures: Vec<_> = world.structures().collect();
    for (i, a) in structures.iter().enumerate() {
        let (a_min, a_max) = a.bounds();
        for b in &structures[i + 1..] {
            let (b_min, b_max) = b.bounds();
            let disjoint = a_max.x < b_min.x || b_max.x < a_min.x || a_max.y < b_min.y || b_max.y < a_min.y;
            assert!(disjoint, "{:?} overlaps {:?}", a.origin(), b.origin());
        }
    }

    let footprints: Vec<(isoworld_core::world::StructureId, Vec<IVec2>)> = structures
        .iter()
        .map(|s| (s.id(), s.footprint().map(|c| c.position).collect()))
        .collect();
    for (id, positions) in footprints {
        for pos in positions {
            let tile = world.tile_at(pos).unwrap();
            assert!(!tile.tile_type.forbids_structures());
            assert_eq!(tile.occupant.map(|o| o.structure), Some(id));
        }
    }
}

#[test]
fn test_structures_stream_with_their_chunk() {
    let mut world = meadow();
    let id = world.place(IVec2::new(4, 4), "cottage").unwrap();

    world.update_chunks(at_chunk(8, 0));
    assert!(world.structure(id).is_none());
    assert!(world.structure_at(IVec2::new(4, 4)).is_none());

    world.update_chunks(IVec2::ZERO);
    let restored = world.structure_at(IVec2::new(5, 5)).unwrap();
    assert_eq!(restored.origin(), IVec2::new(4, 4));
    let restored_id = restored.id();
    assert_eq!(
        world.tile_at(IVec2::new(4, 4)).unwrap().occupant.map(|o| o.structure),
        Some(restored_id)
    );
}

#[test]
fn test_neighbour_chunk_reload_reattaches_occupancy() {
    let mut world = meadow();
    // Origin in chunk (0,0); the right column reaches into chunk (1,0)
    let id = world.place(IVec2::new(14, 3), "house").unwrap();
    let reaching = IVec2::new(16, 3);
    assert!(world.tile_at(reaching).unwrap().is_occupied());

    // Chunk (1,0) is 4 away and unloads; chunk (0,0) is 3 away and stays
    world.update_chunks(at_chunk(-3, 0));
    assert_eq!(world.chunk_state(IVec2::new(1, 0)), Some(ChunkState::Unloaded));
    assert_eq!(world.chunk_state(IVec2::ZERO), Some(ChunkState::Loaded));
    assert!(!world.tile_at(reaching).unwrap().is_occupied());
    assert!(world.structure(id).is_some());

    world.update_chunks(IVec2::ZERO);
    let occupant = world.tile_at(reaching).unwrap().occupant.unwrap();
    assert_eq!(occupant.structure, id);
    assert_eq!(occupant.footprint_index, 2);
}

#[test]
fn test_dropped_restore_stays_dropped_after_eviction() {
    let mut config = WorldConfig::preset_meadow();
    config.streaming.max_cached_chunks = 60;
    let mut world = world_with(config);
    let wall = StructureTemplate::from_rows(
        "wall8",
        &["WWWWWWWW"],
        Vec::new(),
        MaterialKind::Stone,
        RoofStyle::None,
        true,
    )
    .unwrap();
    world.library_mut().register(wall);

    world.update_chunks(IVec2::ZERO);
    world.place(IVec2::new(4, 4), "cottage").unwrap();

    // Chunk (0,0) unloads with the cottage; chunk (-1,0) stays loaded
    world.update_chunks(at_chunk(-4, 0));
    assert_eq!(world.chunk_state(IVec2::ZERO), Some(ChunkState::Unloaded));
    assert_eq!(world.chunk_state(IVec2::new(-1, 0)), Some(ChunkState::Loaded));

    // A wall from the loaded neighbour now covers the cottage's old site
    let wall_id = world.place(IVec2::new(-3, 4), "wall8").unwrap();

    world.update_chunks(IVec2::ZERO);
    assert_eq!(
        world.structure_at(IVec2::new(4, 4)).map(|s| s.template().id().to_string()),
        Some("wall8".to_string())
    );
    assert!(world.streamer().chunk(IVec2::ZERO).unwrap().is_dirty());

    assert!(world.remove(wall_id));
    world.update_chunks(at_chunk(20, 0));
    assert_eq!(world.chunk_state(IVec2::ZERO), None, "chunk should be evicted");

    world.update_chunks(IVec2::ZERO);
    assert!(world.structure_at(IVec2::new(4, 5)).is_none());
    assert_eq!(world.structures().count(), 0);
}

// ============================================================================
// Depth ordering
// ============================================================================

#[test]
fn test_tree_drawn_before_building_at_equal_depth() {
    let mut world = meadow();
    let building = world.place(IVec2::new(4, 4), "cottage").unwrap();
    let tree = world.place(IVec2::new(6, 6), "oak_tree").unwrap();
    assert_eq!(
        world.structure(building).unwrap().depth_key(),
        world.structure(tree).unwrap().depth_key()
    );

    let camera = Camera::new(world.grid_to_world(IVec2::new(5, 5)), Vec2::new(640.0, 480.0));
    let sequence = world.visible_draw_sequence(&camera);
    let position = |kind| sequence.iter().position(|c| c.kind == kind).unwrap();
    assert!(position(DrawKind::Structure(tree)) < position(DrawKind::Structure(building)));

    for pair in sequence.windows(2) {
        assert!(pair[0].depth <= pair[1].depth);
    }
    let structure_draws = sequence
        .iter()
        .filter(|c| matches!(c.kind, DrawKind::Structure(_)))
        .count();
    assert_eq!(structure_draws, 2);
}

#[test]
fn test_draw_sequence_limited_to_view() {
    let mut world = meadow();
    let near = world.place(IVec2::new(2, 2), "house").unwrap();
    let far = world.place(IVec2::new(28, 28), "house").unwrap();

    let camera = Camera::new(world.grid_to_world(IVec2::new(3, 3)), Vec2::new(320.0, 200.0));
    let sequence = world.visible_draw_sequence(&camera);
    assert!(sequence.iter().any(|c| c.kind == DrawKind::Structure(near)));
    assert!(!sequence.iter().any(|c| c.kind == DrawKind::Structure(far)));

    for command in &sequence {
        if let DrawKind::Tile(grid) = command.kind {
            assert_eq!(command.depth, (grid.x + grid.y) as i64);
        }
    }
}

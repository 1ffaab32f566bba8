//! World - facade over streaming, placement and draw ordering

use glam::{IVec2, Vec2};
use thiserror::Error;

use super::camera::{Camera, VisibilityCuller};
use super::chunk::ChunkState;
use super::coords::CoordinateSystem;
use super::depth::{DepthOrderer, DrawCommand};
use super::persistence::{ChunkStorage, WorldMetadata};
use super::structure_placement::{PlacementError, StructurePlacer};
use super::structures::{Structure, StructureId, TemplateError, TemplateLibrary};
use super::tile::{Tile, TileType};
use super::world_streamer::{StreamReport, TileSource, WorldStreamer};
use super::worldgen_config::{ConfigError, WorldConfig};

#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// One isometric world instance: seed, config, chunks and structures
pub struct World {
    seed: u64,
    config: WorldConfig,
    coords: CoordinateSystem,
    streamer: WorldStreamer,
    placer: StructurePlacer,
    culler: VisibilityCuller,
    depth: DepthOrderer,
}

impl World {
    /// Create a world with the built-in structure templates
    pub fn new(
        world_id: impl Into<String>,
        seed: u64,
        config: WorldConfig,
        storage: Box<dyn ChunkStorage>,
    ) -> Result<Self, WorldError> {
        let library = TemplateLibrary::with_builtins()?;
        Self::with_library(world_id, seed, config, storage, library)
    }

    pub fn with_library(
        world_id: impl Into<String>,
        seed: u64,
        config: WorldConfig,
        storage: Box<dyn ChunkStorage>,
        library: TemplateLibrary,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        let world_id = world_id.into();
        let coords = CoordinateSystem::new(&config);
        let streamer = WorldStreamer::new(world_id.clone(), seed, &config, storage)?;
        log::info!(
            "Created world '{}' (seed {}, config '{}', chunk size {})",
            world_id,
            seed,
            config.name,
            config.chunk_size
        );

        Ok(Self {
            seed,
            coords,
            streamer,
            placer: StructurePlacer::new(coords, library),
            culler: VisibilityCuller::new(config.culling),
            depth: DepthOrderer::new(),
            config,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn world_id(&self) -> &str {
        self.streamer.world_id()
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn coords(&self) -> &CoordinateSystem {
        &self.coords
    }

    pub fn streamer(&self) -> &WorldStreamer {
        &self.streamer
    }

    pub fn placer(&self) -> &StructurePlacer {
        &self.placer
    }

    pub fn library(&self) -> &TemplateLibrary {
        self.placer.library()
    }

    pub fn library_mut(&mut self) -> &mut TemplateLibrary {
        self.placer.library_mut()
    }

    pub fn metadata(&self) -> WorldMetadata {
        WorldMetadata::new(self.world_id(), self.seed, self.config.name.clone())
    }

    /// Hand back the storage, e.g. to reopen the world later
    pub fn into_storage(self) -> Box<dyn ChunkStorage> {
        self.streamer.into_storage()
    }

    // ------------------------------------------------------------------
    // Coordinates
    // ------------------------------------------------------------------

    pub fn grid_to_world(&self, grid: IVec2) -> Vec2 {
        self.coords.grid_to_world(grid)
    }

    pub fn world_to_grid(&self, world: Vec2) -> Option<IVec2> {
        self.coords.world_to_grid(world)
    }

    pub fn grid_to_chunk(&self, grid: IVec2) -> IVec2 {
        self.coords.grid_to_chunk(grid)
    }

    pub fn chunk_to_grid(&self, chunk: IVec2) -> IVec2 {
        self.coords.chunk_to_grid(chunk)
    }

    // ------------------------------------------------------------------
    // Streaming and simulation
    // ------------------------------------------------------------------

    /// Stream chunks around a tracked grid position
    pub fn update_chunks(&mut self, tracked_grid: IVec2) -> StreamReport {
        self.streamer.update_chunks(tracked_grid, &mut self.placer)
    }

    /// Stream around the grid cell under the camera centre
    pub fn update(&mut self, camera: &Camera) -> Option<StreamReport> {
        let tracked = self.coords.world_to_grid(camera.position)?;
        Some(self.update_chunks(tracked))
    }

    /// Advance structure animations by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        for structure in self.placer.structures_mut() {
            structure.advance_animation(dt);
        }
    }

    pub fn chunk_state(&self, chunk: IVec2) -> Option<ChunkState> {
        self.streamer.chunk_state(chunk)
    }

    pub fn loaded_chunk_count(&self) -> usize {
        self.streamer.loaded_chunk_count()
    }

    /// Persist every dirty chunk; returns how many were saved
    pub fn save_all(&mut self) -> usize {
        self.streamer.save_all(&self.placer)
    }

    // ------------------------------------------------------------------
    // Tiles
    // ------------------------------------------------------------------

    /// Tile at a grid position, generated on demand outside chunk data
    pub fn tile_at(&mut self, grid: IVec2) -> Option<Tile> {
        self.streamer.resolve_tile(grid)
    }

    pub fn tile_at_world(&mut self, world: Vec2) -> Option<Tile> {
        let grid = self.coords.world_to_grid(world)?;
        self.tile_at(grid)
    }

    /// Hit-test a screen position through the camera and the grid inverse
    pub fn tile_at_screen(&mut self, camera: &Camera, screen: Vec2) -> Option<(IVec2, Tile)> {
        let world = camera.screen_to_world(screen)?;
        let grid = self.coords.world_to_grid(world)?;
        Some((grid, self.tile_at(grid)?))
    }

    /// Change a loaded tile's terrain; false if its chunk is not loaded
    pub fn set_tile_type(&mut self, grid: IVec2, tile_type: TileType) -> bool {
        self.streamer.set_tile_type(grid, tile_type)
    }

    // ------------------------------------------------------------------
    // Structures
    // ------------------------------------------------------------------

    pub fn is_area_suitable(&mut self, origin: IVec2, template_id: &str) -> bool {
        match self.placer.template(template_id) {
            Ok(template) => self
                .placer
                .is_area_suitable(&mut self.streamer, origin, &template),
            Err(_) => false,
        }
    }

    /// Ring search with the configured attempt budget
    pub fn find_valid_placement(&mut self, origin: IVec2, template_id: &str) -> Option<IVec2> {
        let attempts = self.config.placement.max_attempts;
        self.find_valid_placement_with(origin, template_id, attempts)
    }

    pub fn find_valid_placement_with(
        &mut self,
        origin: IVec2,
        template_id: &str,
        max_attempts: usize,
    ) -> Option<IVec2> {
        let template = self.placer.template(template_id).ok()?;
        self.placer
            .find_valid_placement(&mut self.streamer, origin, &template, max_attempts)
    }

    pub fn place(&mut self, origin: IVec2, template_id: &str) -> Result<StructureId, PlacementError> {
        let template = self.placer.template(template_id)?;
        self.placer.place(&mut self.streamer, origin, &template)
    }

    pub fn remove(&mut self, id: StructureId) -> bool {
        self.placer.remove(&mut self.streamer, id).is_some()
    }

    pub fn structure(&self, id: StructureId) -> Option<&Structure> {
        self.placer.get(id)
    }

    pub fn structure_at(&self, grid: IVec2) -> Option<&Structure> {
        self.placer.structure_at(grid)
    }

    pub fn structures(&self) -> impl Iterator<Item = &Structure> {
        self.placer.structures()
    }

    pub fn toggle_door(&mut self, id: StructureId) -> bool {
        self.interact(id, Structure::toggle_door)
    }

    pub fn toggle_light(&mut self, id: StructureId) -> bool {
        self.interact(id, Structure::toggle_light)
    }

    pub fn set_smoke(&mut self, id: StructureId, active: bool) -> bool {
        self.interact(id, |s| s.set_smoke(active))
    }

    /// Apply an interaction; a change marks the structure's chunk dirty
    fn interact(&mut self, id: StructureId, action: impl FnOnce(&mut Structure) -> bool) -> bool {
        let Some(structure) = self.placer.get_mut(id) else {
            return false;
        };
        if !action(structure) {
            return false;
        }
        self.streamer.mark_dirty(structure.origin());
        true
    }

    // ------------------------------------------------------------------
    // Rendering support
    // ------------------------------------------------------------------

    /// Depth-ordered draw sequence for everything visible through `camera`
    pub fn visible_draw_sequence(&mut self, camera: &Camera) -> Vec<DrawCommand> {
        let Some(rect) = self.culler.update(camera) else {
            return Vec::new();
        };
        let Some((grid_min, grid_max)) = self.coords.world_rect_grid_bounds(&rect) else {
            return Vec::new();
        };

        let coords = self.coords;
        let size = coords.chunk_size();
        let mut chunks = self.streamer.loaded_chunks_in_rect(
            coords.grid_to_chunk(grid_min),
            coords.grid_to_chunk(grid_max),
        );
        chunks.retain(|&chunk| {
            let origin = coords.chunk_to_grid(chunk);
            rect.intersects(&coords.grid_rect_world_bounds(origin, origin + IVec2::splat(size - 1)))
        });
        chunks.sort_by_key(|c| (c.y, c.x));

        self.depth.clear();
        for coord in chunks {
            let Some(chunk) = self.streamer.chunk(coord) else {
                continue;
            };
            for (grid, tile) in chunk.grid_positions().zip(chunk.tiles()) {
                if rect.intersects(&coords.grid_rect_world_bounds(grid, grid)) {
                    self.depth.add_tile(grid, tile, &self.placer);
                }
            }
        }

        // Structures reaching into view from an origin tile that was culled
        for structure in self.placer.structures_in_rect(grid_min, grid_max) {
            let (min, max) = structure.bounds();
            if rect.intersects(&coords.grid_rect_world_bounds(min, max)) {
                self.depth.add_structure(structure);
            }
        }

        self.depth.finish()
    }

    pub fn culler(&self) -> &VisibilityCuller {
        &self.culler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::depth::DrawKind;
    use crate::world::persistence::MemoryChunkStorage;

    fn meadow() -> World {
        let mut world = World::new(
            "unit",
            7,
            WorldConfig::preset_meadow(),
            Box::new(MemoryChunkStorage::new()),
        )
        .unwrap();
        world.update_chunks(IVec2::ZERO);
        world
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = WorldConfig::default();
        config.streaming.unload_distance = config.streaming.load_distance;
        let result = World::new("bad", 1, config, Box::new(MemoryChunkStorage::new()));
        assert!(matches!(
            result,
            Err(WorldError::Config(ConfigError::NoHysteresis { .. }))
        ));
    }

    #[test]
    fn test_unknown_template() {
        let mut world = meadow();
        assert_eq!(
            world.place(IVec2::ZERO, "castle"),
            Err(PlacementError::UnknownTemplate("castle".into()))
        );
        assert!(!world.is_area_suitable(IVec2::ZERO, "castle"));
        assert_eq!(world.find_valid_placement(IVec2::ZERO, "castle"), None);
    }

    #[test]
    fn test_place_requires_loaded_origin() {
        let mut world = meadow();
        assert_eq!(
            world.place(IVec2::new(10_000, 0), "cottage"),
            Err(PlacementError::OriginNotLoaded { x: 10_000, y: 0 })
        );
    }

    #[test]
    fn test_interaction_marks_chunk_dirty() {
        let mut world = meadow();
        let id = world.place(IVec2::new(4, 4), "house").unwrap();
        assert_eq!(world.save_all(), 1);

        assert!(world.toggle_door(id));
        assert!(world.streamer().chunk(IVec2::ZERO).unwrap().is_dirty());
        assert!(world.structure(id).unwrap().state.door_open);

        world.tick(1.0);
        assert_eq!(world.structure(id).unwrap().phases.door, 1.0);

        let tree = world.place(IVec2::new(10, 10), "oak_tree").unwrap();
        assert!(!world.toggle_door(tree));
    }

    #[test]
    fn test_tile_at_screen_hits_camera_centre() {
        let mut world = meadow();
        let grid = IVec2::new(3, 5);
        let camera = Camera::new(world.grid_to_world(grid), Vec2::new(640.0, 480.0));
        let (hit, tile) = world.tile_at_screen(&camera, Vec2::new(320.0, 240.0)).unwrap();
        assert_eq!(hit, grid);
        assert_eq!(tile.tile_type, TileType::Grass);
    }

    #[test]
    fn test_visible_draw_sequence() {
        let mut world = meadow();
        let id = world.place(IVec2::new(2, 2), "house").unwrap();
        let camera = Camera::new(world.grid_to_world(IVec2::new(3, 3)), Vec2::new(320.0, 240.0));

        let sequence = world.visible_draw_sequence(&camera);
        assert!(!sequence.is_empty());
        let structure_draws = sequence
            .iter()
            .filter(|c| c.kind == DrawKind::Structure(id))
            .count();
        assert_eq!(structure_draws, 1);
        for pair in sequence.windows(2) {
            assert!(pair[0].depth <= pair[1].depth);
        }

        // Unchanged camera reuses the cached bounds
        world.visible_draw_sequence(&camera);
        assert_eq!(world.culler().recompute_count(), 1);
    }

    #[test]
    fn test_degenerate_camera_draws_nothing() {
        let mut world = meadow();
        let camera = Camera::new(Vec2::ZERO, Vec2::new(320.0, 240.0)).with_zoom(0.0);
        assert!(world.visible_draw_sequence(&camera).is_empty());
        assert!(world.update(&Camera::new(Vec2::NAN, Vec2::ONE)).is_none());
    }

    #[test]
    fn test_degenerate_camera_after_valid_one_draws_nothing() {
        let mut world = meadow();
        let good = Camera::new(world.grid_to_world(IVec2::new(4, 4)), Vec2::new(320.0, 240.0));
        assert!(!world.visible_draw_sequence(&good).is_empty());

        let nan_position = Camera::new(Vec2::NAN, good.viewport);
        assert!(world.visible_draw_sequence(&nan_position).is_empty());
        assert!(world.visible_draw_sequence(&good.with_zoom(f32::NAN)).is_empty());

        // Recovers as soon as the camera is valid again
        assert!(!world.visible_draw_sequence(&good).is_empty());
    }

    #[test]
    fn test_camera_at_grid_extremes_draws_nothing() {
        let mut world = meadow();
        let far = Camera::new(Vec2::new(0.0, -(2.0f32).powi(36)), Vec2::new(320.0, 240.0));
        assert!(world.visible_draw_sequence(&far).is_empty());
        let far = Camera::new(Vec2::new(0.0, (2.0f32).powi(36)), Vec2::new(320.0, 240.0));
        assert!(world.visible_draw_sequence(&far).is_empty());
    }
}

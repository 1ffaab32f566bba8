//! Chunk streaming - generating, loading, unloading and evicting chunks around
//! a tracked position

use std::num::NonZeroUsize;

use ahash::AHashMap;
use glam::IVec2;
use rstar::RTree;

use super::chunk::{Chunk, ChunkState};
use super::coords::CoordinateSystem;
use super::decorations::DecorationStore;
use super::generation::WorldGenerator;
use super::persistence::{ChunkStorage, decode_chunk, encode_chunk};
use super::spatial::{ChunkPos, Intersecting};
use super::structures::StructureRecord;
use super::tile::{Occupancy, Tile, TileType};
use super::tile_cache::TileCache;
use super::worldgen_config::{ConfigError, StreamingParams, WorldConfig};

/// Tile access used by structure placement
pub trait TileSource {
    /// Tile at a grid position: chunk data first, else generated on demand.
    /// `None` outside the world limits.
    fn resolve_tile(&mut self, grid: IVec2) -> Option<Tile>;

    /// Write an occupancy back-reference; only tiles of loaded chunks carry one
    fn set_occupancy(&mut self, grid: IVec2, occupancy: Option<Occupancy>) -> bool;

    /// Mark the chunk holding `grid` as needing persistence
    fn mark_dirty(&mut self, grid: IVec2);

    fn is_loaded(&self, grid: IVec2) -> bool;
}

/// Hooks into the chunk lifecycle for state that lives outside the chunk
pub trait StreamObserver {
    /// Detach everything anchored in `chunk`; returns the records to persist with it
    fn before_unload(&mut self, chunk: IVec2, tiles: &mut dyn TileSource) -> Vec<StructureRecord>;

    /// Re-attach live state overlapping `chunk` and restore its stored records
    fn after_load(&mut self, chunk: IVec2, restored: Vec<StructureRecord>, tiles: &mut dyn TileSource);

    /// Records anchored in a loaded chunk, for saving without unloading
    fn anchored_records(&self, chunk: IVec2) -> Vec<StructureRecord>;
}

impl StreamObserver for () {
    fn before_unload(&mut self, _chunk: IVec2, _tiles: &mut dyn TileSource) -> Vec<StructureRecord> {
        Vec::new()
    }

    fn after_load(&mut self, _chunk: IVec2, _restored: Vec<StructureRecord>, _tiles: &mut dyn TileSource) {}

    fn anchored_records(&self, _chunk: IVec2) -> Vec<StructureRecord> {
        Vec::new()
    }
}

/// What one [`WorldStreamer::update_chunks`] call changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub tracked_chunk: IVec2,
    pub loaded: Vec<IVec2>,
    pub unloaded: Vec<IVec2>,
    pub pregenerated: usize,
    pub evicted: usize,
    pub save_failures: usize,
}

fn chebyshev(a: IVec2, b: IVec2) -> i32 {
    let d = (a - b).abs();
    d.x.max(d.y)
}

/// Sole owner of chunk, tile and decoration state
pub struct WorldStreamer {
    world_id: String,
    coords: CoordinateSystem,
    streaming: StreamingParams,
    generator: WorldGenerator,
    chunks: AHashMap<IVec2, Chunk>,
    /// Spatial index of loaded chunks
    loaded_index: RTree<ChunkPos>,
    decorations: DecorationStore,
    tile_cache: TileCache,
    storage: Box<dyn ChunkStorage>,
    last_tracked_chunk: Option<IVec2>,
}

impl WorldStreamer {
    pub fn new(
        world_id: impl Into<String>,
        seed: u64,
        config: &WorldConfig,
        storage: Box<dyn ChunkStorage>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache.tile_cache_capacity)
            .ok_or(ConfigError::ZeroCapacity("tile_cache_capacity"))?;
        Ok(Self {
            world_id: world_id.into(),
            coords: CoordinateSystem::new(config),
            streaming: config.streaming.clone(),
            generator: WorldGenerator::from_params(seed, config.generation.clone()),
            chunks: AHashMap::new(),
            loaded_index: RTree::new(),
            decorations: DecorationStore::new(),
            tile_cache: TileCache::new(capacity),
            storage,
            last_tracked_chunk: None,
        })
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    pub fn coords(&self) -> &CoordinateSystem {
        &self.coords
    }

    pub fn generator(&self) -> &WorldGenerator {
        &self.generator
    }

    pub fn decorations(&self) -> &DecorationStore {
        &self.decorations
    }

    pub fn tile_cache(&self) -> &TileCache {
        &self.tile_cache
    }

    pub fn storage(&self) -> &dyn ChunkStorage {
        self.storage.as_ref()
    }

    pub fn into_storage(self) -> Box<dyn ChunkStorage> {
        self.storage
    }

    pub fn chunk(&self, coord: IVec2) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    pub fn chunk_state(&self, coord: IVec2) -> Option<ChunkState> {
        self.chunks.get(&coord).map(Chunk::state)
    }

    /// Chunks held in memory, in any state
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn loaded_chunk_count(&self) -> usize {
        self.loaded_index.size()
    }

    pub fn loaded_chunks(&self) -> impl Iterator<Item = IVec2> + '_ {
        self.loaded_index.iter().map(|p| p.0)
    }

    /// Loaded chunks inside an inclusive chunk rectangle
    pub fn loaded_chunks_in_rect(&self, min: IVec2, max: IVec2) -> Vec<IVec2> {
        self.loaded_index
            .locate_with_selection_function(Intersecting::chunks(min, max))
            .map(|p| p.0)
            .collect()
    }

    pub fn last_tracked_chunk(&self) -> Option<IVec2> {
        self.last_tracked_chunk
    }

    fn within_limits(&self, chunk: IVec2) -> bool {
        self.streaming.within_limits(chunk.x, chunk.y)
    }

    /// Bring the chunk set in line with a tracked grid position
    pub fn update_chunks(
        &mut self,
        tracked_grid: IVec2,
        observer: &mut dyn StreamObserver,
    ) -> StreamReport {
        let center = self.coords.grid_to_chunk(tracked_grid);
        let mut report = StreamReport {
            tracked_chunk: center,
            ..StreamReport::default()
        };

        if self.last_tracked_chunk != Some(center) {
            log::debug!(
                "[LOAD] Tracked chunk moved to ({}, {})",
                center.x,
                center.y
            );
        }
        self.last_tracked_chunk = Some(center);

        // Unload first so structures leaving the window detach before new ones attach
        let unload_distance = self.streaming.unload_distance;
        let mut far: Vec<IVec2> = self
            .loaded_index
            .iter()
            .map(|p| p.0)
            .filter(|&coord| chebyshev(coord, center) > unload_distance)
            .collect();
        far.sort_by_key(|c| (c.y, c.x));
        for coord in far {
            if self.unload_chunk(coord, observer) {
                report.unloaded.push(coord);
                if self.chunks.get(&coord).is_some_and(Chunk::is_dirty) {
                    report.save_failures += 1;
                }
            }
        }

        let load = self.streaming.load_distance;
        for cy in (center.y - load)..=(center.y + load) {
            for cx in (center.x - load)..=(center.x + load) {
                let coord = IVec2::new(cx, cy);
                if !self.within_limits(coord) {
                    continue;
                }
                if self.load_chunk(coord, observer) {
                    report.loaded.push(coord);
                }
            }
        }

        let generate = self.streaming.generate_distance;
        for cy in (center.y - generate)..=(center.y + generate) {
            for cx in (center.x - generate)..=(center.x + generate) {
                let coord = IVec2::new(cx, cy);
                if chebyshev(coord, center) <= load || !self.within_limits(coord) {
                    continue;
                }
                if self.pregenerate_chunk(coord) {
                    report.pregenerated += 1;
                }
            }
        }

        let (evicted, failures) = self.evict_distant_chunks(center, observer);
        report.evicted = evicted;
        report.save_failures += failures;

        if !report.loaded.is_empty() || !report.unloaded.is_empty() {
            log::debug!(
                "[LOAD] Chunk update at ({}, {}): {} loaded, {} unloaded, {} pre-generated, {} resident",
                center.x,
                center.y,
                report.loaded.len(),
                report.unloaded.len(),
                report.pregenerated,
                self.loaded_index.size()
            );
        }
        report
    }

    /// Load one chunk, creating and filling it if needed; false when already loaded
    pub fn load_chunk(&mut self, coord: IVec2, observer: &mut dyn StreamObserver) -> bool {
        if self.chunk_state(coord) == Some(ChunkState::Loaded) {
            return false;
        }
        self.ensure_data(coord);

        let Some(chunk) = self.chunks.get_mut(&coord) else {
            return false;
        };
        if let Err(e) = chunk.load() {
            log::error!("[LOAD] {}", e);
            return false;
        }
        let restored = chunk.take_pending_structures();
        self.loaded_index.insert(ChunkPos(coord));
        log::trace!("[LOAD] Chunk ({}, {}) loaded", coord.x, coord.y);

        observer.after_load(coord, restored, self);
        true
    }

    /// Unload one chunk, persisting it when dirty; false when it was not loaded
    pub fn unload_chunk(&mut self, coord: IVec2, observer: &mut dyn StreamObserver) -> bool {
        if self.chunk_state(coord) != Some(ChunkState::Loaded) {
            return false;
        }
        let anchored = observer.before_unload(coord, self);

        let Some(chunk) = self.chunks.get_mut(&coord) else {
            return false;
        };
        chunk.unload(anchored);
        self.loaded_index.remove(&ChunkPos(coord));
        log::trace!("[UNLOAD] Chunk ({}, {}) unloaded", coord.x, coord.y);

        if chunk.is_dirty() {
            let structures = chunk.pending_structures().to_vec();
            self.persist_chunk(coord, structures);
        }
        true
    }

    fn pregenerate_chunk(&mut self, coord: IVec2) -> bool {
        if self.chunks.get(&coord).is_some_and(Chunk::has_data) {
            return false;
        }
        self.ensure_data(coord);
        true
    }

    /// Give a chunk tile data: from storage when a valid blob exists, else generated
    fn ensure_data(&mut self, coord: IVec2) {
        let size = self.coords.chunk_size();
        let chunk = self
            .chunks
            .entry(coord)
            .or_insert_with(|| Chunk::new(coord, size));
        if chunk.has_data() {
            return;
        }

        let record = match self.storage.load_chunk(&self.world_id, coord.x, coord.y) {
            Ok(Some(blob)) => match decode_chunk(&blob) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!(
                        "[LOAD] Chunk ({}, {}) blob unreadable: {}, regenerating",
                        coord.x,
                        coord.y,
                        e
                    );
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!(
                    "[LOAD] Failed to load chunk ({}, {}): {:#}, regenerating",
                    coord.x,
                    coord.y,
                    e
                );
                None
            }
        };

        let mut restored = false;
        if let Some(record) = record {
            match chunk.restore(record, &self.generator, &mut self.decorations) {
                Ok(()) => {
                    log::debug!("[LOAD] Chunk ({}, {}) restored from storage", coord.x, coord.y);
                    restored = true;
                }
                Err(e) => log::warn!("[LOAD] {}, regenerating", e),
            }
        }
        if !restored && let Err(e) = chunk.generate(&self.generator, &self.decorations) {
            log::error!("[GEN] {}", e);
            return;
        }

        // On-demand copies of these tiles are superseded by the chunk's own data
        let origin = chunk.origin();
        self.tile_cache
            .invalidate_area(origin, origin + IVec2::splat(size - 1));
    }

    /// Encode and save a chunk; clears dirty only on success
    fn persist_chunk(&mut self, coord: IVec2, structures: Vec<StructureRecord>) -> bool {
        let Some(chunk) = self.chunks.get_mut(&coord) else {
            return false;
        };
        let record = chunk.to_record(structures);
        let blob = match encode_chunk(&record) {
            Ok(blob) => blob,
            Err(e) => {
                log::error!("[SAVE] Chunk ({}, {}): {}", coord.x, coord.y, e);
                return false;
            }
        };

        match self
            .storage
            .save_chunk(&self.world_id, coord.x, coord.y, &blob)
        {
            Ok(()) => {
                chunk.clear_dirty();
                log::debug!(
                    "[SAVE] Chunk ({}, {}) saved ({} structures, {} bytes)",
                    coord.x,
                    coord.y,
                    record.structures.len(),
                    blob.len()
                );
                true
            }
            Err(e) => {
                log::warn!(
                    "[SAVE] Failed to save chunk ({}, {}): {:#}, keeping it dirty",
                    coord.x,
                    coord.y,
                    e
                );
                false
            }
        }
    }

    /// Drop cached chunks beyond `max_cached_chunks`, farthest first
    ///
    /// Loaded chunks and the pre-generation ring are never evicted. Dirty
    /// candidates get one more save attempt and are kept if it fails.
    fn evict_distant_chunks(
        &mut self,
        center: IVec2,
        observer: &dyn StreamObserver,
    ) -> (usize, usize) {
        let limit = self.streaming.max_cached_chunks;
        if self.chunks.len() <= limit {
            return (0, 0);
        }

        let generate = self.streaming.generate_distance;
        let mut candidates: Vec<IVec2> = self
            .chunks
            .values()
            .filter(|c| !c.is_loaded() && chebyshev(c.coord(), center) > generate)
            .map(Chunk::coord)
            .collect();
        candidates.sort_by_key(|&c| (std::cmp::Reverse(chebyshev(c, center)), c.y, c.x));

        let mut evicted = 0;
        let mut failures = 0;
        for coord in candidates {
            if self.chunks.len() <= limit {
                break;
            }
            if self.chunks.get(&coord).is_some_and(Chunk::is_dirty) {
                let structures = self.pending_records(coord, observer);
                if !self.persist_chunk(coord, structures) {
                    failures += 1;
                    continue;
                }
            }
            self.chunks.remove(&coord);
            evicted += 1;
        }

        if evicted > 0 {
            log::debug!(
                "[EVICT] Evicted {} chunks, {} remain cached",
                evicted,
                self.chunks.len()
            );
        }
        if self.chunks.len() > limit {
            log::warn!(
                "[EVICT] Chunk cache over limit ({} > {}), {} dirty chunks could not be saved",
                self.chunks.len(),
                limit,
                failures
            );
        }
        (evicted, failures)
    }

    fn pending_records(&self, coord: IVec2, observer: &dyn StreamObserver) -> Vec<StructureRecord> {
        match self.chunks.get(&coord) {
            Some(chunk) if chunk.is_loaded() => observer.anchored_records(coord),
            Some(chunk) => chunk.pending_structures().to_vec(),
            None => Vec::new(),
        }
    }

    /// Persist every dirty chunk; returns how many were saved
    pub fn save_all(&mut self, observer: &dyn StreamObserver) -> usize {
        let mut dirty: Vec<IVec2> = self
            .chunks
            .values()
            .filter(|c| c.is_dirty())
            .map(Chunk::coord)
            .collect();
        if dirty.is_empty() {
            return 0;
        }
        dirty.sort_by_key(|c| (c.y, c.x));
        log::debug!("[SAVE] Saving {} dirty chunks", dirty.len());

        let mut saved = 0;
        for coord in dirty {
            let structures = self.pending_records(coord, observer);
            if self.persist_chunk(coord, structures) {
                saved += 1;
            }
        }
        log::info!("[SAVE] Saved {} dirty chunks", saved);
        saved
    }

    /// Tile of a chunk that has data, without touching the cache
    pub fn chunk_tile(&self, grid: IVec2) -> Option<&Tile> {
        self.chunks
            .get(&self.coords.grid_to_chunk(grid))?
            .tile(grid)
    }

    /// Change the terrain of a loaded tile and mark its chunk dirty
    pub fn set_tile_type(&mut self, grid: IVec2, tile_type: TileType) -> bool {
        let coord = self.coords.grid_to_chunk(grid);
        let Some(chunk) = self.chunks.get_mut(&coord) else {
            return false;
        };
        if !chunk.is_loaded() {
            return false;
        }
        let Some(tile) = chunk.tile_mut(grid) else {
            return false;
        };
        if tile.tile_type != tile_type {
            tile.tile_type = tile_type;
            tile.variant = None;
            if !tile_type.is_natural() {
                tile.decoration = None;
                let rolled = self.generator.natural_decoration(grid);
                self.decorations.record_persisted(grid, None, rolled);
            }
            chunk.mark_dirty();
        }
        true
    }
}

impl TileSource for WorldStreamer {
    fn resolve_tile(&mut self, grid: IVec2) -> Option<Tile> {
        let coord = self.coords.grid_to_chunk(grid);
        if !self.within_limits(coord) {
            return None;
        }
        if let Some(tile) = self.chunks.get(&coord).and_then(|c| c.tile(grid)) {
            return Some(*tile);
        }
        let generator = &self.generator;
        let decorations = &self.decorations;
        Some(
            self.tile_cache
                .get_or_insert_with(grid, || generator.generate_tile(grid, decorations)),
        )
    }

    fn set_occupancy(&mut self, grid: IVec2, occupancy: Option<Occupancy>) -> bool {
        let coord = self.coords.grid_to_chunk(grid);
        match self.chunks.get_mut(&coord) {
            Some(chunk) if chunk.is_loaded() => match chunk.tile_mut(grid) {
                Some(tile) => {
                    tile.occupant = occupancy;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn mark_dirty(&mut self, grid: IVec2) {
        let coord = self.coords.grid_to_chunk(grid);
        if let Some(chunk) = self.chunks.get_mut(&coord)
            && chunk.has_data()
        {
            chunk.mark_dirty();
        }
    }

    fn is_loaded(&self, grid: IVec2) -> bool {
        self.chunks
            .get(&self.coords.grid_to_chunk(grid))
            .is_some_and(Chunk::is_loaded)
    }
}

//! Chunk - fixed-size square block of tiles with a lifecycle state machine
//!
//! ```text
//! Ungenerated --generate/restore--> Generated --load--> Loaded <--load/unload--> Unloaded
//! ```

use glam::IVec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::decorations::DecorationStore;
use super::generation::WorldGenerator;
use super::structures::StructureRecord;
use super::tile::{Tile, TileRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkState {
    /// No tile data yet
    Ungenerated,
    /// Tile data ready, not attached to the active world
    Generated,
    /// Attached and visible; the only state whose tiles carry occupancy
    Loaded,
    /// Detached, tile data still cached in memory
    Unloaded,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk ({x}, {y}) cannot {action} while {from:?}")]
    InvalidTransition {
        x: i32,
        y: i32,
        from: ChunkState,
        action: &'static str,
    },

    #[error("chunk record ({x}, {y}) holds {found} tiles, expected {expected}")]
    SizeMismatch {
        x: i32,
        y: i32,
        expected: usize,
        found: usize,
    },

    #[error("chunk record is for ({found_x}, {found_y}), expected ({x}, {y})")]
    CoordinateMismatch {
        x: i32,
        y: i32,
        found_x: i32,
        found_y: i32,
    },
}

/// Persisted form of a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_x: i32,
    pub chunk_y: i32,
    /// Row-major, exactly chunk_size² entries
    pub tiles: Vec<TileRecord>,
    /// Structures whose origin lies in this chunk
    pub structures: Vec<StructureRecord>,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    coord: IVec2,
    size: i32,
    /// Always exactly size² entries, whatever the state
    tiles: Vec<Tile>,
    state: ChunkState,
    dirty: bool,
    /// Structure records waiting to be re-instantiated on the next load
    pending_structures: Vec<StructureRecord>,
}

impl Chunk {
    pub fn new(coord: IVec2, size: i32) -> Self {
        let len = (size * size) as usize;
        Self {
            coord,
            size,
            tiles: vec![Tile::default(); len],
            state: ChunkState::Ungenerated,
            dirty: false,
            pending_structures: Vec::new(),
        }
    }

    pub fn coord(&self) -> IVec2 {
        self.coord
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    /// Top-left grid cell
    pub fn origin(&self) -> IVec2 {
        self.coord * self.size
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Called after the chunk was persisted successfully
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Whether tile data exists in memory
    pub fn has_data(&self) -> bool {
        self.state != ChunkState::Ungenerated
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ChunkState::Loaded
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    fn index_of(&self, grid: IVec2) -> Option<usize> {
        let local = grid - self.origin();
        if local.x < 0 || local.y < 0 || local.x >= self.size || local.y >= self.size {
            return None;
        }
        Some((local.y * self.size + local.x) as usize)
    }

    /// Tile at an absolute grid position, if it belongs to this chunk and has data
    pub fn tile(&self, grid: IVec2) -> Option<&Tile> {
        if !self.has_data() {
            return None;
        }
        self.tiles.get(self.index_of(grid)?)
    }

    pub fn tile_mut(&mut self, grid: IVec2) -> Option<&mut Tile> {
        if !self.has_data() {
            return None;
        }
        let index = self.index_of(grid)?;
        self.tiles.get_mut(index)
    }

    /// Absolute grid positions of every tile, row-major
    pub fn grid_positions(&self) -> impl Iterator<Item = IVec2> + '_ {
        let origin = self.origin();
        (0..self.size).flat_map(move |y| (0..self.size).map(move |x| origin + IVec2::new(x, y)))
    }

    /// Fill every tile procedurally
    pub fn generate(
        &mut self,
        generator: &WorldGenerator,
        decorations: &DecorationStore,
    ) -> Result<(), ChunkError> {
        self.require(ChunkState::Ungenerated, "generate")?;
        self.tiles = generator.generate_chunk_tiles(self.origin(), self.size, decorations);
        self.state = ChunkState::Generated;
        log::trace!("[GEN] Chunk ({}, {}) generated", self.coord.x, self.coord.y);
        Ok(())
    }

    /// Fill tiles from a persisted record
    ///
    /// Stored decorations that differ from what `generator` would roll are
    /// recorded in `decorations`, so later regeneration of the same tiles reuses
    /// them. The record is validated before anything changes.
    pub fn restore(
        &mut self,
        record: ChunkRecord,
        generator: &WorldGenerator,
        decorations: &mut DecorationStore,
    ) -> Result<(), ChunkError> {
        self.require(ChunkState::Ungenerated, "restore")?;
        if (record.chunk_x, record.chunk_y) != (self.coord.x, self.coord.y) {
            return Err(ChunkError::CoordinateMismatch {
                x: self.coord.x,
                y: self.coord.y,
                found_x: record.chunk_x,
                found_y: record.chunk_y,
            });
        }
        let expected = self.tiles.len();
        if record.tiles.len() != expected {
            return Err(ChunkError::SizeMismatch {
                x: self.coord.x,
                y: self.coord.y,
                expected,
                found: record.tiles.len(),
            });
        }

        let positions: Vec<IVec2> = self.grid_positions().collect();
        for ((slot, stored), grid) in self.tiles.iter_mut().zip(record.tiles).zip(positions) {
            decorations.record_persisted(grid, stored.decoration, generator.natural_decoration(grid));
            *slot = Tile::from(stored);
        }
        self.pending_structures = record.structures;
        self.state = ChunkState::Generated;
        Ok(())
    }

    /// Attach to the active world; a no-op when already loaded
    pub fn load(&mut self) -> Result<(), ChunkError> {
        match self.state {
            ChunkState::Generated | ChunkState::Unloaded => {
                self.state = ChunkState::Loaded;
                Ok(())
            }
            ChunkState::Loaded => Ok(()),
            ChunkState::Ungenerated => Err(self.invalid("load")),
        }
    }

    /// Detach from the active world, keeping tile data cached
    ///
    /// `anchored` are the records of structures whose origin lies in this chunk;
    /// they are held until the chunk loads again. Every occupancy reference is
    /// cleared. Returns false (and changes nothing) unless the chunk was loaded.
    pub fn unload(&mut self, anchored: Vec<StructureRecord>) -> bool {
        if self.state != ChunkState::Loaded {
            return false;
        }
        for tile in &mut self.tiles {
            tile.occupant = None;
        }
        self.pending_structures = anchored;
        self.state = ChunkState::Unloaded;
        true
    }

    pub fn pending_structures(&self) -> &[StructureRecord] {
        &self.pending_structures
    }

    pub fn take_pending_structures(&mut self) -> Vec<StructureRecord> {
        std::mem::take(&mut self.pending_structures)
    }

    pub fn to_record(&self, structures: Vec<StructureRecord>) -> ChunkRecord {
        ChunkRecord {
            chunk_x: self.coord.x,
            chunk_y: self.coord.y,
            tiles: self.tiles.iter().map(Tile::to_record).collect(),
            structures,
        }
    }

    fn require(&self, state: ChunkState, action: &'static str) -> Result<(), ChunkError> {
        if self.state == state {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> ChunkError {
        ChunkError::InvalidTransition {
            x: self.coord.x,
            y: self.coord.y,
            from: self.state,
            action,
        }
    }
}

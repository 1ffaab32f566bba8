//! Depth ordering for isometric occlusion (painter's algorithm)

use std::cmp::Ordering;

use ahash::AHashSet;
use glam::IVec2;

use super::structure_placement::StructurePlacer;
use super::structures::{Structure, StructureId};
use super::tile::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawKind {
    Tile(IVec2),
    Structure(StructureId),
}

/// One entry of the render sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    pub kind: DrawKind,
    pub depth: i64,
}

#[derive(Debug, Clone, Copy)]
struct DrawItem {
    kind: DrawKind,
    depth: i64,
    blocking: bool,
    origin: IVec2,
}

impl DrawItem {
    /// Ascending depth, then non-blocking before solid, then origin x.
    /// The remaining keys only make the order total.
    fn cmp_draw_order(&self, other: &Self) -> Ordering {
        self.depth
            .cmp(&other.depth)
            .then(self.blocking.cmp(&other.blocking))
            .then(self.origin.x.cmp(&other.origin.x))
            .then(self.origin.y.cmp(&other.origin.y))
            .then_with(|| kind_rank(self.kind).cmp(&kind_rank(other.kind)))
    }
}

fn kind_rank(kind: DrawKind) -> (u8, u32) {
    match kind {
        DrawKind::Tile(_) => (0, 0),
        DrawKind::Structure(id) => (1, id.0),
    }
}

pub fn tile_depth(grid: IVec2) -> i64 {
    grid.x as i64 + grid.y as i64
}

/// Collects visible items for one frame and sorts them into draw order
///
/// A structure is emitted once, when the tile pass reaches its origin tile
/// (footprint index 0) or when added explicitly; repeats are ignored.
#[derive(Debug, Default)]
pub struct DepthOrderer {
    items: Vec<DrawItem>,
    emitted: AHashSet<StructureId>,
}

impl DepthOrderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.emitted.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add a ground tile, plus its structure when this is that structure's origin tile
    pub fn add_tile(&mut self, grid: IVec2, tile: &Tile, structures: &StructurePlacer) {
        self.items.push(DrawItem {
            kind: DrawKind::Tile(grid),
            depth: tile_depth(grid),
            blocking: false,
            origin: grid,
        });

        if let Some(occupant) = tile.occupant
            && occupant.footprint_index == 0
            && let Some(structure) = structures.get(occupant.structure)
            && structure.origin() == grid
        {
            self.add_structure(structure);
        }
    }

    /// Add a structure whose origin tile is not part of the tile pass
    pub fn add_structure(&mut self, structure: &Structure) -> bool {
        if !self.emitted.insert(structure.id()) {
            return false;
        }
        self.items.push(DrawItem {
            kind: DrawKind::Structure(structure.id()),
            depth: structure.depth_key(),
            blocking: structure.is_blocking(),
            origin: structure.origin(),
        });
        true
    }

    /// Sorted draw sequence; the orderer is left empty for the next frame
    pub fn finish(&mut self) -> Vec<DrawCommand> {
        self.items.sort_unstable_by(DrawItem::cmp_draw_order);
        let sequence = self
            .items
            .iter()
            .map(|item| DrawCommand {
                kind: item.kind,
                depth: item.depth,
            })
            .collect();
        self.clear();
        sequence
    }
}

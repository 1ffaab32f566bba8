//! Structure placement - footprint validation, ring search and occupancy bookkeeping
//!
//! The placer owns every live [`Structure`]. Tiles only hold an index-based
//! back-reference ([`Occupancy`]) which is written from, and cleared by walking,
//! the structure's own component list.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::IVec2;
use rstar::RTree;
use thiserror::Error;

use super::coords::CoordinateSystem;
use super::spatial::{FootprintBox, Intersecting};
use super::structures::{Structure, StructureId, StructureRecord, StructureTemplate, TemplateLibrary};
use super::tile::Occupancy;
use super::world_streamer::{StreamObserver, TileSource};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("unknown structure template '{0}'")]
    UnknownTemplate(String),

    #[error("origin ({x}, {y}) is not in a loaded chunk")]
    OriginNotLoaded { x: i32, y: i32 },

    #[error("area at ({x}, {y}) is not suitable for '{template}'")]
    Unsuitable { x: i32, y: i32, template: String },
}

/// Candidate origins on the square ring of Chebyshev `radius` around `center`,
/// row-major: top row left to right, then both side cells per row, then bottom row
pub fn ring_perimeter(center: IVec2, radius: i32) -> Vec<IVec2> {
    if radius == 0 {
        return vec![center];
    }
    let mut ring = Vec::with_capacity((8 * radius) as usize);
    let (min, max) = (center - IVec2::splat(radius), center + IVec2::splat(radius));
    for x in min.x..=max.x {
        ring.push(IVec2::new(x, min.y));
    }
    for y in (min.y + 1)..max.y {
        ring.push(IVec2::new(min.x, y));
        ring.push(IVec2::new(max.x, y));
    }
    for x in min.x..=max.x {
        ring.push(IVec2::new(x, max.y));
    }
    ring
}

fn footprint_max(origin: IVec2, template: &StructureTemplate) -> IVec2 {
    origin + IVec2::new(template.width() - 1, template.height() - 1)
}

pub struct StructurePlacer {
    coords: CoordinateSystem,
    library: TemplateLibrary,
    structures: BTreeMap<StructureId, Structure>,
    /// Footprint rectangles of every live structure
    index: RTree<FootprintBox<StructureId>>,
    next_id: u32,
}

impl StructurePlacer {
    pub fn new(coords: CoordinateSystem, library: TemplateLibrary) -> Self {
        Self {
            coords,
            library,
            structures: BTreeMap::new(),
            index: RTree::new(),
            next_id: 1,
        }
    }

    pub fn library(&self) -> &TemplateLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut TemplateLibrary {
        &mut self.library
    }

    pub fn template(&self, id: &str) -> Result<Arc<StructureTemplate>, PlacementError> {
        self.library
            .get(id)
            .ok_or_else(|| PlacementError::UnknownTemplate(id.to_string()))
    }

    pub fn get(&self, id: StructureId) -> Option<&Structure> {
        self.structures.get(&id)
    }

    pub fn get_mut(&mut self, id: StructureId) -> Option<&mut Structure> {
        self.structures.get_mut(&id)
    }

    pub fn structures(&self) -> impl Iterator<Item = &Structure> {
        self.structures.values()
    }

    pub fn structures_mut(&mut self) -> impl Iterator<Item = &mut Structure> {
        self.structures.values_mut()
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    /// Live structures whose footprint rectangle intersects an inclusive grid rectangle
    pub fn structures_in_rect(&self, min: IVec2, max: IVec2) -> impl Iterator<Item = &Structure> {
        self.index
            .locate_with_selection_function(Intersecting::grid(min, max))
            .filter_map(|entry| self.structures.get(&entry.key))
    }

    fn overlaps_live(&self, min: IVec2, max: IVec2) -> bool {
        self.index
            .locate_with_selection_function(Intersecting::grid(min, max))
            .next()
            .is_some()
    }

    /// Structure whose footprint covers `grid`
    pub fn structure_at(&self, grid: IVec2) -> Option<&Structure> {
        self.structures_in_rect(grid, grid)
            .find(|structure| structure.contains(grid))
    }

    /// Footprint tiles must be buildable and free; the one-tile ring around it
    /// must not be water. Tiles outside the world never support a footprint.
    pub fn is_area_suitable(
        &self,
        tiles: &mut dyn TileSource,
        origin: IVec2,
        template: &StructureTemplate,
    ) -> bool {
        let max = footprint_max(origin, template);
        if self.overlaps_live(origin, max) {
            return false;
        }

        for y in origin.y..=max.y {
            for x in origin.x..=max.x {
                match tiles.resolve_tile(IVec2::new(x, y)) {
                    Some(tile) if !tile.tile_type.forbids_structures() && !tile.is_occupied() => {}
                    _ => return false,
                }
            }
        }

        for y in (origin.y - 1)..=(max.y + 1) {
            for x in (origin.x - 1)..=(max.x + 1) {
                let inside = (origin.x..=max.x).contains(&x) && (origin.y..=max.y).contains(&y);
                if inside {
                    continue;
                }
                if let Some(tile) = tiles.resolve_tile(IVec2::new(x, y))
                    && tile.tile_type.is_water()
                {
                    return false;
                }
            }
        }

        true
    }

    /// First suitable origin: `origin` itself, then rings of radius 1, 2, ...
    ///
    /// Gives up after `max_attempts` candidates; that is an ordinary miss.
    pub fn find_valid_placement(
        &self,
        tiles: &mut dyn TileSource,
        origin: IVec2,
        template: &StructureTemplate,
        max_attempts: usize,
    ) -> Option<IVec2> {
        let mut attempts = 0;
        let mut radius = 0;
        loop {
            for candidate in ring_perimeter(origin, radius) {
                if attempts >= max_attempts {
                    log::trace!(
                        "[PLACE] No site for '{}' near ({}, {}) after {} attempts",
                        template.id(),
                        origin.x,
                        origin.y,
                        attempts
                    );
                    return None;
                }
                attempts += 1;
                if self.is_area_suitable(tiles, candidate, template) {
                    return Some(candidate);
                }
            }
            radius += 1;
        }
    }

    /// Commit a structure with its top-left footprint cell at `origin`
    pub fn place(
        &mut self,
        tiles: &mut dyn TileSource,
        origin: IVec2,
        template: &Arc<StructureTemplate>,
    ) -> Result<StructureId, PlacementError> {
        if !tiles.is_loaded(origin) {
            return Err(PlacementError::OriginNotLoaded {
                x: origin.x,
                y: origin.y,
            });
        }
        if !self.is_area_suitable(tiles, origin, template) {
            return Err(PlacementError::Unsuitable {
                x: origin.x,
                y: origin.y,
                template: template.id().to_string(),
            });
        }

        let id = self.allocate_id();
        let structure = Structure::new(id, Arc::clone(template), origin);
        self.insert(structure, tiles);
        tiles.mark_dirty(origin);

        log::info!(
            "[PLACE] '{}' #{} at ({}, {})",
            template.id(),
            id.0,
            origin.x,
            origin.y
        );
        Ok(id)
    }

    /// Remove a structure, clearing every back-reference it wrote
    pub fn remove(&mut self, tiles: &mut dyn TileSource, id: StructureId) -> Option<Structure> {
        let structure = self.detach(tiles, id)?;
        tiles.mark_dirty(structure.origin());
        log::info!(
            "[PLACE] Removed '{}' #{} at ({}, {})",
            structure.template().id(),
            id.0,
            structure.origin().x,
            structure.origin().y
        );
        Some(structure)
    }

    /// Records of structures whose origin lies in `chunk`
    pub fn records_anchored_in(&self, chunk: IVec2) -> Vec<StructureRecord> {
        self.anchored_ids(chunk)
            .into_iter()
            .filter_map(|id| self.structures.get(&id))
            .map(Structure::to_record)
            .collect()
    }

    fn anchored_ids(&self, chunk: IVec2) -> Vec<StructureId> {
        let min = self.coords.chunk_to_grid(chunk);
        let max = min + IVec2::splat(self.coords.chunk_size() - 1);
        self.structures_in_rect(min, max)
            .filter(|s| self.coords.grid_to_chunk(s.origin()) == chunk)
            .map(Structure::id)
            .collect()
    }

    fn allocate_id(&mut self) -> StructureId {
        let id = StructureId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn insert(&mut self, structure: Structure, tiles: &mut dyn TileSource) {
        Self::write_occupancy(&structure, tiles, None);
        let (min, max) = structure.bounds();
        self.index.insert(FootprintBox {
            key: structure.id(),
            min,
            max,
        });
        self.structures.insert(structure.id(), structure);
    }

    /// Write back-references for footprint tiles, optionally only those inside
    /// an inclusive grid rectangle
    fn write_occupancy(structure: &Structure, tiles: &mut dyn TileSource, within: Option<(IVec2, IVec2)>) {
        for component in structure.footprint() {
            let pos = component.position;
            if let Some((min, max)) = within
                && !(pos.cmpge(min).all() && pos.cmple(max).all())
            {
                continue;
            }
            tiles.set_occupancy(
                pos,
                Some(Occupancy {
                    structure: structure.id(),
                    footprint_index: component.footprint_index,
                }),
            );
        }
    }

    /// Unregister a structure and clear the back-references pointing at it
    ///
    /// Walks the structure's stored components, never recomputed bounds, and
    /// leaves tiles referencing some other structure untouched.
    fn detach(&mut self, tiles: &mut dyn TileSource, id: StructureId) -> Option<Structure> {
        let structure = self.structures.remove(&id)?;
        let (min, max) = structure.bounds();
        self.index.remove(&FootprintBox { key: id, min, max });

        for component in structure.footprint() {
            let owned = tiles
                .resolve_tile(component.position)
                .and_then(|t| t.occupant)
                .is_some_and(|o| o.structure == id);
            if owned {
                tiles.set_occupancy(component.position, None);
            }
        }
        Some(structure)
    }

    /// Re-instantiate a persisted structure unless it collides with a live one
    fn restore(&mut self, record: StructureRecord, tiles: &mut dyn TileSource) -> Option<StructureId> {
        let Some(template) = self.library.get(&record.template_id) else {
            log::warn!(
                "[LOAD] Dropping stored structure with unknown template '{}' at ({}, {})",
                record.template_id,
                record.origin_x,
                record.origin_y
            );
            return None;
        };

        let origin = record.origin();
        if self.overlaps_live(origin, footprint_max(origin, &template)) {
            log::warn!(
                "[LOAD] Dropping stored '{}' at ({}, {}): footprint now overlaps a live structure",
                record.template_id,
                origin.x,
                origin.y
            );
            return None;
        }

        let id = self.allocate_id();
        let mut structure = Structure::new(id, template, origin);
        structure.state = record.state;
        self.insert(structure, tiles);
        Some(id)
    }
}

impl StreamObserver for StructurePlacer {
    fn before_unload(&mut self, chunk: IVec2, tiles: &mut dyn TileSource) -> Vec<StructureRecord> {
        let ids = self.anchored_ids(chunk);
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(structure) = self.detach(tiles, id) {
                records.push(structure.to_record());
            }
        }
        if !records.is_empty() {
            log::debug!(
                "[UNLOAD] Detached {} structures from chunk ({}, {})",
                records.len(),
                chunk.x,
                chunk.y
            );
        }
        records
    }

    fn after_load(&mut self, chunk: IVec2, restored: Vec<StructureRecord>, tiles: &mut dyn TileSource) {
        let min = self.coords.chunk_to_grid(chunk);
        let max = min + IVec2::splat(self.coords.chunk_size() - 1);

        // Live neighbours reaching into this chunk
        for structure in self.structures_in_rect(min, max) {
            Self::write_occupancy(structure, tiles, Some((min, max)));
        }

        let count = restored.len();
        let attached = restored
            .into_iter()
            .filter_map(|record| self.restore(record, tiles))
            .count();
        if count > 0 {
            log::debug!(
                "[LOAD] Restored {}/{} structures in chunk ({}, {})",
                attached,
                count,
                chunk.x,
                chunk.y
            );
        }
        // The stored record still lists the dropped structures; rewrite it on the next save
        if attached < count {
            tiles.mark_dirty(min);
        }
    }

    fn anchored_records(&self, chunk: IVec2) -> Vec<StructureRecord> {
        self.records_anchored_in(chunk)
    }
}

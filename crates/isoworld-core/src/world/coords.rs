//! Canonical conversions between grid, world and chunk space
//!
//! Grid space: integer tile coordinates. World space: isometric projection of
//! grid space, scaled and offset by the projection params. Chunk space:
//! integer chunk coordinates, `chunk = floor(grid / chunk_size)`.

use glam::{IVec2, Vec2};

use super::worldgen_config::WorldConfig;

/// Stateless transform set derived from a [`WorldConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateSystem {
    half_width: f32,
    half_height: f32,
    chunk_size: i32,
    offset: Vec2,
    scale: Vec2,
}

impl CoordinateSystem {
    pub fn new(config: &WorldConfig) -> Self {
        Self {
            half_width: config.tile.width / 2.0,
            half_height: config.tile.height / 2.0,
            chunk_size: config.chunk_size,
            offset: config.projection.offset,
            scale: config.projection.scale,
        }
    }

    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    /// Isometric projection of a grid cell to its world-space anchor
    pub fn grid_to_world(&self, grid: IVec2) -> Vec2 {
        let gx = grid.x as f32;
        let gy = grid.y as f32;
        let projected = Vec2::new(
            (gx - gy) * self.half_width,
            (gx + gy) * self.half_height,
        );
        projected * self.scale + self.offset
    }

    /// Exact inverse of [`grid_to_world`](Self::grid_to_world), rounding to the nearest cell
    ///
    /// Returns `None` for non-finite input or results outside the `i32` range.
    pub fn world_to_grid(&self, world: Vec2) -> Option<IVec2> {
        if !world.is_finite() {
            return None;
        }

        let projected = (world - self.offset) / self.scale;
        let u = projected.x / self.half_width; // gx - gy
        let v = projected.y / self.half_height; // gx + gy
        let gx = ((u + v) / 2.0).round();
        let gy = ((v - u) / 2.0).round();

        if !(gx.is_finite() && gy.is_finite()) {
            return None;
        }
        let range = i32::MIN as f32..=i32::MAX as f32;
        if !range.contains(&gx) || !range.contains(&gy) {
            return None;
        }
        Some(IVec2::new(gx as i32, gy as i32))
    }

    /// Chunk containing a grid cell (floor division, correct for negatives)
    pub fn grid_to_chunk(&self, grid: IVec2) -> IVec2 {
        IVec2::new(
            grid.x.div_euclid(self.chunk_size),
            grid.y.div_euclid(self.chunk_size),
        )
    }

    /// Top-left grid cell of a chunk
    pub fn chunk_to_grid(&self, chunk: IVec2) -> IVec2 {
        chunk * self.chunk_size
    }

    /// Row-major index of a grid cell inside its chunk
    pub fn local_index(&self, grid: IVec2) -> usize {
        let local_x = grid.x.rem_euclid(self.chunk_size);
        let local_y = grid.y.rem_euclid(self.chunk_size);
        (local_y * self.chunk_size + local_x) as usize
    }

    /// Axis-aligned world bounds of an inclusive grid rectangle, padded to cover whole tiles
    pub fn grid_rect_world_bounds(&self, min: IVec2, max: IVec2) -> WorldRect {
        let corners = [
            self.grid_to_world(min),
            self.grid_to_world(IVec2::new(max.x, min.y)),
            self.grid_to_world(IVec2::new(min.x, max.y)),
            self.grid_to_world(max),
        ];
        let mut rect = WorldRect::from_points(&corners);
        let pad = Vec2::new(self.half_width, self.half_height) * self.scale.abs();
        rect.min -= pad;
        rect.max += pad;
        rect
    }

    /// Inclusive grid rectangle covering every cell whose anchor may fall inside `rect`
    pub fn world_rect_grid_bounds(&self, rect: &WorldRect) -> Option<(IVec2, IVec2)> {
        let corners = [
            self.world_to_grid(rect.min)?,
            self.world_to_grid(Vec2::new(rect.max.x, rect.min.y))?,
            self.world_to_grid(Vec2::new(rect.min.x, rect.max.y))?,
            self.world_to_grid(rect.max)?,
        ];
        let min = corners.iter().copied().reduce(IVec2::min)?;
        let max = corners.iter().copied().reduce(IVec2::max)?;
        let pad_min = IVec2::new(min.x.saturating_sub(1), min.y.saturating_sub(1));
        let pad_max = IVec2::new(max.x.saturating_add(1), max.y.saturating_add(1));
        Some((pad_min, pad_max))
    }
}

/// Axis-aligned rectangle in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl WorldRect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center(center: Vec2, half_extent: Vec2) -> Self {
        Self::new(center - half_extent, center + half_extent)
    }

    fn from_points(points: &[Vec2]) -> Self {
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        for &p in points {
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }

    pub fn intersects(&self, other: &WorldRect) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn expand(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }
}

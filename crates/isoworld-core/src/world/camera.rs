//! Camera view space and visibility culling

use glam::Vec2;

use super::coords::WorldRect;
use super::worldgen_config::CullingParams;

/// A 2D camera centred on a world-space position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World-space point at the centre of the viewport
    pub position: Vec2,
    /// Viewport size in screen pixels
    pub viewport: Vec2,
    /// Screen pixels per world unit
    pub zoom: f32,
}

impl Camera {
    pub fn new(position: Vec2, viewport: Vec2) -> Self {
        Self {
            position,
            viewport,
            zoom: 1.0,
        }
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = zoom;
        self
    }

    fn has_valid_zoom(&self) -> bool {
        self.zoom.is_finite() && self.zoom > 0.0
    }

    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        (world - self.position) * self.zoom + self.viewport * 0.5
    }

    /// Inverse of [`world_to_screen`](Self::world_to_screen); `None` for a degenerate camera
    pub fn screen_to_world(&self, screen: Vec2) -> Option<Vec2> {
        if !self.has_valid_zoom() || !screen.is_finite() {
            return None;
        }
        Some((screen - self.viewport * 0.5) / self.zoom + self.position)
    }

    /// World rectangle covered by the viewport, expanded by `base_buffer / zoom`
    pub fn visible_rect(&self, base_buffer: f32) -> Option<WorldRect> {
        if !self.has_valid_zoom() || !self.position.is_finite() || !self.viewport.is_finite() {
            return None;
        }
        let half_extent = self.viewport * 0.5 / self.zoom;
        Some(WorldRect::from_center(self.position, half_extent).expand(base_buffer / self.zoom))
    }
}

/// Caches the visible rectangle until the camera moves or zooms past a threshold
#[derive(Debug, Clone)]
pub struct VisibilityCuller {
    params: CullingParams,
    last_camera: Option<Camera>,
    rect: Option<WorldRect>,
    recomputes: u64,
}

impl VisibilityCuller {
    pub fn new(params: CullingParams) -> Self {
        Self {
            params,
            last_camera: None,
            rect: None,
            recomputes: 0,
        }
    }

    /// Visible rectangle for `camera`, recomputed only when needed
    pub fn update(&mut self, camera: &Camera) -> Option<WorldRect> {
        // Written as "not within thresholds" so a NaN anywhere counts as stale
        let stale = match &self.last_camera {
            None => true,
            Some(_) if !camera.has_valid_zoom() => true,
            Some(last) => !(last.viewport == camera.viewport
                && last.position.distance(camera.position) <= self.params.move_threshold
                && (last.zoom - camera.zoom).abs() <= self.params.zoom_threshold),
        };
        if stale {
            self.rect = camera.visible_rect(self.params.base_buffer);
            self.last_camera = Some(*camera);
            self.recomputes += 1;
        }
        self.rect
    }

    /// Whether bounds intersect the last computed rectangle
    pub fn is_visible(&self, bounds: &WorldRect) -> bool {
        self.rect.is_some_and(|rect| rect.intersects(bounds))
    }

    pub fn current_rect(&self) -> Option<WorldRect> {
        self.rect
    }

    /// Number of times the rectangle was recomputed
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    pub fn invalidate(&mut self) {
        self.last_camera = None;
    }
}

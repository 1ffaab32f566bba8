//! World configuration - serializable parameters for one world instance
//!
//! This module provides data structures that capture every tunable of a world:
//! - Tile and chunk geometry, projection offset/scale
//! - Streaming distances and optional world limits
//! - Cache capacities and culling thresholds
//! - Terrain generation (noise layers, octaves, classification thresholds)
//!
//! The seed is NOT part of the config - same config + different seed = different world.
//! A `WorldConfig` is read-only once the world is constructed.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating or parsing a [`WorldConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("chunk size must be positive, got {0}")]
    InvalidChunkSize(i32),

    #[error("tile dimensions must be positive and finite, got {width}x{height}")]
    InvalidTileDimensions { width: f32, height: f32 },

    #[error("projection scale must be non-zero and finite, got {0:?}")]
    InvalidProjectionScale(Vec2),

    #[error("load distance ({load}) must be strictly less than unload distance ({unload})")]
    NoHysteresis { load: i32, unload: i32 },

    #[error("generate distance ({generate}) must not be less than load distance ({load})")]
    GenerateDistanceTooSmall { generate: i32, load: i32 },

    #[error("load distance must not be negative, got {0}")]
    NegativeLoadDistance(i32),

    #[error("axis limit min ({min}) is greater than max ({max})")]
    InvalidAxisLimit { min: i32, max: i32 },

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("height octaves need a positive total amplitude")]
    InvalidOctaves,

    #[error("failed to parse world config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("failed to serialize world config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Complete world configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Display name for this configuration
    pub name: String,
    /// Isometric tile footprint in world units
    pub tile: TileDimensions,
    /// Tiles per chunk edge (a chunk holds chunk_size² tiles)
    pub chunk_size: i32,
    /// Chunk streaming distances and limits
    pub streaming: StreamingParams,
    /// World-space offset and scale applied after projection
    pub projection: ProjectionParams,
    /// On-demand tile cache
    pub cache: CacheParams,
    /// Camera visibility culling
    pub culling: CullingParams,
    /// Structure placement search
    pub placement: PlacementParams,
    /// Terrain generation
    pub generation: GenerationParams,
}

/// Width and height of one isometric tile diamond
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileDimensions {
    pub width: f32,
    pub height: f32,
}

/// Distances are in chunks and measured with the Chebyshev metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingParams {
    /// Chunks within this distance of the tracked chunk are loaded (default: 2)
    pub load_distance: i32,
    /// Loaded chunks beyond this distance are unloaded (default: 3)
    pub unload_distance: i32,
    /// Chunks within this distance have their data prepared ahead of loading (default: 3)
    pub generate_distance: i32,
    /// Optional inclusive chunk range on the x axis (None = unbounded)
    pub limit_x: Option<AxisLimit>,
    /// Optional inclusive chunk range on the y axis (None = unbounded)
    pub limit_y: Option<AxisLimit>,
    /// Maximum chunks kept in memory, loaded or not (default: 256)
    pub max_cached_chunks: usize,
}

/// Inclusive chunk coordinate range along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisLimit {
    pub min: i32,
    pub max: i32,
}

impl AxisLimit {
    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionParams {
    /// Added to projected coordinates (after scaling)
    pub offset: Vec2,
    /// Multiplies projected coordinates
    pub scale: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    /// Generated tiles kept for queries outside any chunk (default: 4096)
    pub tile_cache_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingParams {
    /// Extra world units around the view at zoom 1.0; divided by zoom
    pub base_buffer: f32,
    /// Camera movement (world units) before visible bounds are recomputed
    pub move_threshold: f32,
    /// Zoom change before visible bounds are recomputed
    pub zoom_threshold: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementParams {
    /// Default candidate budget for `find_valid_placement` (default: 64)
    pub max_attempts: usize,
}

/// Terrain generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Noise source shared by height and moisture
    pub noise: NoiseLayerConfig,
    /// Height fractal sum, normally two octaves at different frequencies
    pub height_octaves: Vec<OctaveParams>,
    /// Exponent applied to normalized height (>1 widens valleys, <1 widens plateaus)
    pub height_exponent: f32,
    /// Coordinate offset of the moisture sample relative to the height sample
    pub moisture_offset: f32,
    /// Moisture sampling frequency
    pub moisture_frequency: f32,
    /// Number of discrete height levels
    pub height_levels: i32,
    /// Height/moisture classification table
    pub thresholds: TerrainThresholds,
    /// Roll per-tile decorations during generation
    pub decorations_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OctaveParams {
    pub frequency: f32,
    pub amplitude: f32,
}

/// Classification bands over normalized height and moisture (both in [0, 1])
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainThresholds {
    /// Height below this is water (default: 0.3)
    pub water: f32,
    /// Height below this (and above water) is sand (default: 0.36)
    pub sand: f32,
    /// Height at or above this is stone (default: 0.75)
    pub highland: f32,
    /// Mid-band moisture above this is wetland (default: 0.68)
    pub wetland_moisture: f32,
    /// Mid-band moisture below this is dirt (default: 0.3)
    pub dry_moisture: f32,
}

/// Reusable noise layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseLayerConfig {
    /// Offset added to world seed for this layer
    pub seed_offset: i32,
    /// Noise algorithm type
    pub noise_type: NoiseTypeConfig,
}

/// Noise algorithm types (maps to FastNoiseLite::NoiseType)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseTypeConfig {
    OpenSimplex2,
    OpenSimplex2S,
    Perlin,
    ValueCubic,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            tile: TileDimensions::default(),
            chunk_size: 16,
            streaming: StreamingParams::default(),
            projection: ProjectionParams::default(),
            cache: CacheParams::default(),
            culling: CullingParams::default(),
            placement: PlacementParams::default(),
            generation: GenerationParams::default(),
        }
    }
}

impl Default for TileDimensions {
    fn default() -> Self {
        Self {
            width: 64.0,
            height: 32.0,
        }
    }
}

impl Default for StreamingParams {
    fn default() -> Self {
        Self {
            load_distance: 2,
            unload_distance: 3,
            generate_distance: 3,
            limit_x: None,
            limit_y: None,
            max_cached_chunks: 256,
        }
    }
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: Vec2::ONE,
        }
    }
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            tile_cache_capacity: 4096,
        }
    }
}

impl Default for CullingParams {
    fn default() -> Self {
        Self {
            base_buffer: 128.0,
            move_threshold: 8.0,
            zoom_threshold: 0.01,
        }
    }
}

impl Default for PlacementParams {
    fn default() -> Self {
        Self { max_attempts: 64 }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            noise: NoiseLayerConfig::default(),
            height_octaves: vec![
                OctaveParams {
                    frequency: 0.04,
                    amplitude: 1.0,
                },
                OctaveParams {
                    frequency: 0.12,
                    amplitude: 0.5,
                },
            ],
            height_exponent: 1.2,
            moisture_offset: 1000.0,
            moisture_frequency: 0.03,
            height_levels: 8,
            thresholds: TerrainThresholds::default(),
            decorations_enabled: true,
        }
    }
}

impl Default for TerrainThresholds {
    fn default() -> Self {
        Self {
            water: 0.3,
            sand: 0.36,
            highland: 0.75,
            wetland_moisture: 0.68,
            dry_moisture: 0.3,
        }
    }
}

impl Default for NoiseLayerConfig {
    fn default() -> Self {
        Self {
            seed_offset: 0,
            noise_type: NoiseTypeConfig::OpenSimplex2,
        }
    }
}

// ============================================================================
// Conversion helpers
// ============================================================================

impl NoiseTypeConfig {
    /// Convert to fastnoise_lite::NoiseType
    pub fn to_fastnoise(&self) -> fastnoise_lite::NoiseType {
        match self {
            NoiseTypeConfig::OpenSimplex2 => fastnoise_lite::NoiseType::OpenSimplex2,
            NoiseTypeConfig::OpenSimplex2S => fastnoise_lite::NoiseType::OpenSimplex2S,
            NoiseTypeConfig::Perlin => fastnoise_lite::NoiseType::Perlin,
            NoiseTypeConfig::ValueCubic => fastnoise_lite::NoiseType::ValueCubic,
        }
    }
}

impl NoiseLayerConfig {
    /// Create a FastNoiseLite instance from this config
    ///
    /// Frequency is fixed at 1.0; callers scale coordinates per octave.
    pub fn to_fastnoise(&self, base_seed: u64) -> fastnoise_lite::FastNoiseLite {
        let seed = (base_seed as i32).wrapping_add(self.seed_offset);
        let mut noise = fastnoise_lite::FastNoiseLite::with_seed(seed);
        noise.set_noise_type(Some(self.noise_type.to_fastnoise()));
        noise.set_frequency(Some(1.0));
        noise.set_fractal_type(Some(fastnoise_lite::FractalType::None));
        noise
    }
}

impl StreamingParams {
    /// Whether a chunk coordinate lies inside the configured world limits
    pub fn within_limits(&self, chunk_x: i32, chunk_y: i32) -> bool {
        self.limit_x.is_none_or(|l| l.contains(chunk_x))
            && self.limit_y.is_none_or(|l| l.contains(chunk_y))
    }
}

// ============================================================================
// Validation, parsing and presets
// ============================================================================

impl WorldConfig {
    /// Check every invariant the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size <= 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        let TileDimensions { width, height } = self.tile;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(ConfigError::InvalidTileDimensions { width, height });
        }

        let scale = self.projection.scale;
        if !scale.is_finite() || scale.x == 0.0 || scale.y == 0.0 {
            return Err(ConfigError::InvalidProjectionScale(scale));
        }

        let streaming = &self.streaming;
        if streaming.load_distance < 0 {
            return Err(ConfigError::NegativeLoadDistance(streaming.load_distance));
        }
        if streaming.load_distance >= streaming.unload_distance {
            return Err(ConfigError::NoHysteresis {
                load: streaming.load_distance,
                unload: streaming.unload_distance,
            });
        }
        if streaming.generate_distance < streaming.load_distance {
            return Err(ConfigError::GenerateDistanceTooSmall {
                generate: streaming.generate_distance,
                load: streaming.load_distance,
            });
        }
        for limit in [streaming.limit_x, streaming.limit_y].into_iter().flatten() {
            if limit.min > limit.max {
                return Err(ConfigError::InvalidAxisLimit {
                    min: limit.min,
                    max: limit.max,
                });
            }
        }
        if streaming.max_cached_chunks == 0 {
            return Err(ConfigError::ZeroCapacity("max_cached_chunks"));
        }
        if self.cache.tile_cache_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("tile_cache_capacity"));
        }
        if self.placement.max_attempts == 0 {
            return Err(ConfigError::ZeroCapacity("placement.max_attempts"));
        }
        if self.generation.height_levels <= 0 {
            return Err(ConfigError::ZeroCapacity("generation.height_levels"));
        }

        let total_amplitude: f32 = self
            .generation
            .height_octaves
            .iter()
            .map(|o| o.amplitude)
            .sum();
        if !(total_amplitude.is_finite() && total_amplitude > 0.0) {
            return Err(ConfigError::InvalidOctaves);
        }

        Ok(())
    }

    /// Parse and validate a RON document
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: WorldConfig = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, Default::default())?)
    }

    /// Flat all-grass terrain (good for building)
    pub fn preset_meadow() -> Self {
        Self {
            name: "Meadow".to_string(),
            generation: GenerationParams {
                thresholds: TerrainThresholds {
                    water: -1.0,
                    sand: -1.0,
                    highland: 2.0,
                    wetland_moisture: 2.0,
                    dry_moisture: -1.0,
                },
                decorations_enabled: false,
                ..GenerationParams::default()
            },
            ..Self::default()
        }
    }

    /// Water-heavy world of small islands
    pub fn preset_archipelago() -> Self {
        Self {
            name: "Archipelago".to_string(),
            generation: GenerationParams {
                height_exponent: 1.8,
                thresholds: TerrainThresholds {
                    water: 0.45,
                    sand: 0.5,
                    ..TerrainThresholds::default()
                },
                ..GenerationParams::default()
            },
            ..Self::default()
        }
    }
}

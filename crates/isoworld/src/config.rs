//! Driver configuration with layered loading
//!
//! Configuration is loaded from multiple sources (lowest to highest priority):
//! 1. Compiled defaults
//! 2. `isoworld.ron` file (if exists)
//! 3. Environment variables prefixed with `ISOWORLD_`
//!
//! Example environment variable: `ISOWORLD_WALK__STEPS=500`

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use isoworld_core::world::WorldConfig;
use serde::{Deserialize, Serialize};

/// Main driver configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub world: WorldSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub walk: WalkSection,

    #[serde(default)]
    pub view: ViewSection,
}

/// Which world to open and how to generate it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSection {
    /// World directory name under the data dir
    pub id: String,
    /// Seed for a fresh world; an existing world keeps its stored seed
    pub seed: u64,
    /// Built-in generation preset: default, meadow, archipelago
    pub preset: String,
    /// RON file with a full `WorldConfig`, overrides `preset`
    pub config_file: Option<String>,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            seed: 42,
            preset: "default".to_string(),
            config_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Root directory for world folders
    pub data_dir: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: "worlds".to_string(),
        }
    }
}

/// Scripted walk through the world
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkSection {
    /// Number of ticks to simulate
    pub steps: usize,
    /// Tiles moved per tick along each axis
    pub step_x: i32,
    pub step_y: i32,
    /// Try to place a structure every N ticks (0 = never)
    pub place_every: usize,
    /// Templates cycled through when placing
    pub templates: Vec<String>,
    /// Simulated seconds per tick
    pub tick_seconds: f32,
}

impl Default for WalkSection {
    fn default() -> Self {
        Self {
            steps: 200,
            step_x: 2,
            step_y: 1,
            place_every: 10,
            templates: vec![
                "cottage".to_string(),
                "oak_tree".to_string(),
                "house".to_string(),
                "pine_tree".to_string(),
                "market_stall".to_string(),
            ],
            tick_seconds: 1.0 / 30.0,
        }
    }
}

/// Virtual viewport used for culling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSection {
    pub width: f32,
    pub height: f32,
    pub zoom: f32,
}

impl Default for ViewSection {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
            zoom: 1.0,
        }
    }
}

impl AppConfig {
    /// Load configuration with layered priority:
    /// 1. Compiled defaults (lowest priority)
    /// 2. `file` (without extension, defaults to `isoworld`) if it exists
    /// 3. Environment variables prefixed with `ISOWORLD_` (highest priority)
    pub fn load(file: Option<&str>) -> Result<Self> {
        let builder = Config::builder()
            // Layer 1: Compiled defaults
            .set_default("world.id", "default")?
            .set_default("world.seed", 42_i64)?
            .set_default("world.preset", "default")?
            .set_default("storage.data_dir", "worlds")?
            .set_default("walk.steps", 200_i64)?
            .set_default("walk.step_x", 2_i64)?
            .set_default("walk.step_y", 1_i64)?
            .set_default("walk.place_every", 10_i64)?
            .set_default("walk.tick_seconds", 1.0 / 30.0)?
            .set_default("view.width", 1280.0)?
            .set_default("view.height", 720.0)?
            .set_default("view.zoom", 1.0)?
            // Layer 2: Config file (optional, won't error if missing)
            .add_source(
                File::with_name(file.unwrap_or("isoworld"))
                    .format(config::FileFormat::Ron)
                    .required(false),
            )
            // Layer 3: Environment variables (ISOWORLD_WALK__STEPS, etc.)
            .add_source(Environment::with_prefix("ISOWORLD").separator("__"));

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Resolve the generation config from `config_file` or the named preset
    pub fn world_config(&self) -> Result<WorldConfig> {
        if let Some(path) = &self.world.config_file {
            let source = std::fs::read_to_string(Path::new(path))
                .with_context(|| format!("Failed to read world config {}", path))?;
            return WorldConfig::from_ron_str(&source)
                .with_context(|| format!("Invalid world config {}", path));
        }

        match self.world.preset.to_lowercase().as_str() {
            "default" => Ok(WorldConfig::default()),
            "meadow" => Ok(WorldConfig::preset_meadow()),
            "archipelago" => Ok(WorldConfig::preset_archipelago()),
            other => anyhow::bail!(
                "Unknown world preset '{}' (expected default, meadow or archipelago)",
                other
            ),
        }
    }
}

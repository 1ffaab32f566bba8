//! Tile - one isometric grid cell

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::structures::StructureId;

/// Types of terrain a tile can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileType {
    // Natural terrain (produced by generation)
    Water,
    Sand,
    Wetland,
    Grass,
    Dirt,
    Stone,
    // Urban/structural variants (placed by gameplay)
    Road,
    Pavement,
    Plaza,
    Foundation,
}

impl TileType {
    /// Structures can never stand on these tiles
    pub fn forbids_structures(self) -> bool {
        matches!(self, TileType::Water | TileType::Wetland)
    }

    pub fn is_water(self) -> bool {
        self == TileType::Water
    }

    /// Number of texture variants available for this type (0 = no variants)
    pub fn variant_count(self) -> u8 {
        match self {
            TileType::Grass => 4,
            TileType::Sand | TileType::Stone | TileType::Dirt => 3,
            TileType::Water | TileType::Wetland => 2,
            TileType::Road | TileType::Pavement | TileType::Plaza | TileType::Foundation => 0,
        }
    }

    pub fn is_natural(self) -> bool {
        matches!(
            self,
            TileType::Water
                | TileType::Sand
                | TileType::Wetland
                | TileType::Grass
                | TileType::Dirt
                | TileType::Stone
        )
    }
}

/// Small props drawn on top of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecorationKind {
    Flowers,
    TallGrass,
    Bush,
    Rock,
    Pebbles,
    Shell,
    Reeds,
    LilyPad,
    Mushroom,
}

/// A decoration chosen once per tile identity and persisted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decoration {
    pub kind: DecorationKind,
    /// Offset from the tile anchor, in tile units
    pub offset: Vec2,
    pub scale: f32,
}

/// Back-reference from a tile to the structure covering it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occupancy {
    pub structure: StructureId,
    /// Row-major index into the structure's blueprint (row * width + col)
    pub footprint_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub tile_type: TileType,
    /// Discrete height level
    pub height: i32,
    /// Normalized moisture in [0, 1]
    pub moisture: f32,
    pub variant: Option<u8>,
    pub decoration: Option<Decoration>,
    /// Structure occupying this tile (not persisted; rebuilt when chunks load)
    pub occupant: Option<Occupancy>,
}

impl Tile {
    pub fn new(tile_type: TileType, height: i32, moisture: f32) -> Self {
        Self {
            tile_type,
            height,
            moisture,
            variant: None,
            decoration: None,
            occupant: None,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    pub fn to_record(&self) -> TileRecord {
        TileRecord {
            tile_type: self.tile_type,
            height: self.height,
            moisture: self.moisture,
            variant: self.variant,
            decoration: self.decoration,
        }
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::new(TileType::Grass, 0, 0.5)
    }
}

/// Persisted form of a tile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub tile_type: TileType,
    pub height: i32,
    pub moisture: f32,
    pub variant: Option<u8>,
    pub decoration: Option<Decoration>,
}

impl From<TileRecord> for Tile {
    fn from(record: TileRecord) -> Self {
        Self {
            tile_type: record.tile_type,
            height: record.height,
            moisture: record.moisture,
            variant: record.variant,
            decoration: record.decoration,
            occupant: None,
        }
    }
}

//! World engine - coordinates, terrain, chunk streaming, structures, draw order

pub mod camera;
mod chunk;
pub mod coords;
mod decorations;
pub mod depth;
pub mod generation;
pub mod noise_field;
pub mod persistence;
mod spatial;
pub mod structure_placement;
pub mod structures;
pub mod terrain;
mod tile;
mod tile_cache;
#[allow(clippy::module_inception)]
mod world;
pub mod world_streamer;
pub mod worldgen_config;

pub use camera::{Camera, VisibilityCuller};
pub use chunk::{Chunk, ChunkError, ChunkRecord, ChunkState};
pub use coords::{CoordinateSystem, WorldRect};
pub use decorations::DecorationStore;
pub use depth::{DepthOrderer, DrawCommand, DrawKind};
pub use generation::WorldGenerator;
pub use noise_field::NoiseField;
pub use persistence::{
    ChunkStorage, CodecError, FileChunkStorage, MemoryChunkStorage, WorldMetadata, decode_chunk,
    encode_chunk,
};
pub use structure_placement::{PlacementError, StructurePlacer};
pub use structures::{
    ComponentTag, MaterialKind, RoofStyle, Structure, StructureComponent, StructureId,
    StructureRecord, StructureState, StructureTemplate, TemplateDef, TemplateError,
    TemplateLibrary,
};
pub use terrain::{DecorationTable, TerrainClassifier};
pub use tile::{Decoration, DecorationKind, Occupancy, Tile, TileRecord, TileType};
pub use tile_cache::TileCache;
pub use world::{World, WorldError};
pub use world_streamer::{StreamObserver, StreamReport, TileSource, WorldStreamer};
pub use worldgen_config::{ConfigError, GenerationParams, WorldConfig};

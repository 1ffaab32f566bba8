use glam::IVec2;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use super::decorations::DecorationStore;
use super::noise_field::NoiseField;
use super::terrain::{DecorationTable, TerrainClassifier};
use super::tile::{Decoration, Tile, TileType};
use super::worldgen_config::GenerationParams;

// Stream salts so decoration and variant rolls never share RNG output
const DECORATION_SALT: u64 = 0x6465_636f;
const VARIANT_SALT: u64 = 0x7661_7269;

/// World generator: noise → classification → decoration, one tile at a time
///
/// Every output depends only on (seed, params, grid position), never on call
/// order or on which other tiles were generated before.
pub struct WorldGenerator {
    pub seed: u64,
    params: GenerationParams,
    noise: NoiseField,
    classifier: TerrainClassifier,
    decoration_table: DecorationTable,
}

impl WorldGenerator {
    /// Create a WorldGenerator with default parameters
    pub fn new(seed: u64) -> Self {
        Self::from_params(seed, GenerationParams::default())
    }

    pub fn from_params(seed: u64, params: GenerationParams) -> Self {
        Self {
            seed,
            noise: NoiseField::new(seed, &params),
            classifier: TerrainClassifier::new(params.thresholds),
            decoration_table: DecorationTable::new(),
            params,
        }
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    pub fn classifier(&self) -> &TerrainClassifier {
        &self.classifier
    }

    /// Generate the tile at a grid position
    ///
    /// An override in `decorations` replaces the tile's own decoration roll.
    pub fn generate_tile(&self, grid: IVec2, decorations: &DecorationStore) -> Tile {
        let (height, moisture, tile_type) = self.sample(grid);

        let levels = self.params.height_levels;
        let height_level = ((height * levels as f32) as i32).clamp(0, levels - 1);

        let mut tile = Tile::new(tile_type, height_level, moisture);

        let variant_count = tile_type.variant_count();
        if variant_count > 0 {
            let mut rng = self.tile_rng(grid, VARIANT_SALT);
            tile.variant = Some(rng.gen_range(0..variant_count));
        }

        if self.params.decorations_enabled {
            tile.decoration =
                decorations.get_or_select(grid, || self.roll_decoration(grid, tile_type));
        }

        tile
    }

    /// The decoration generation gives a tile when nothing overrides it
    pub fn natural_decoration(&self, grid: IVec2) -> Option<Decoration> {
        if !self.params.decorations_enabled {
            return None;
        }
        let (_, _, tile_type) = self.sample(grid);
        self.roll_decoration(grid, tile_type)
    }

    fn sample(&self, grid: IVec2) -> (f32, f32, TileType) {
        let x = grid.x as f32;
        let y = grid.y as f32;
        let height = self.noise.height(x, y);
        let moisture = self.noise.moisture(x, y);
        (height, moisture, self.classifier.classify(height, moisture))
    }

    fn roll_decoration(&self, grid: IVec2, tile_type: TileType) -> Option<Decoration> {
        let mut rng = self.tile_rng(grid, DECORATION_SALT);
        self.decoration_table.select_decoration(tile_type, &mut rng)
    }

    /// Generate all tiles of a chunk in row-major order
    pub fn generate_chunk_tiles(
        &self,
        chunk_origin: IVec2,
        chunk_size: i32,
        decorations: &DecorationStore,
    ) -> Vec<Tile> {
        let mut tiles = Vec::with_capacity((chunk_size * chunk_size) as usize);
        for local_y in 0..chunk_size {
            for local_x in 0..chunk_size {
                let grid = chunk_origin + IVec2::new(local_x, local_y);
                tiles.push(self.generate_tile(grid, decorations));
            }
        }
        tiles
    }

    /// RNG seeded from (seed, position, salt) only
    fn tile_rng(&self, grid: IVec2, salt: u64) -> Xoshiro256StarStar {
        let packed = ((grid.x as u32 as u64) << 32) | grid.y as u32 as u64;
        Xoshiro256StarStar::seed_from_u64(splitmix64(self.seed ^ splitmix64(packed ^ salt)))
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

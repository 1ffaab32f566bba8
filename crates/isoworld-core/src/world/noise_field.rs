//! Seeded coherent noise feeding height and moisture

use fastnoise_lite::FastNoiseLite;

use super::worldgen_config::{GenerationParams, OctaveParams};

/// Deterministic 2D noise source
///
/// Holds no mutable state: the same seed and coordinate always produce the
/// same value, regardless of query order.
pub struct NoiseField {
    pub seed: u64,
    noise: FastNoiseLite,
    octaves: Vec<OctaveParams>,
    total_amplitude: f32,
    height_exponent: f32,
    moisture_offset: f32,
    moisture_frequency: f32,
}

impl NoiseField {
    pub fn new(seed: u64, params: &GenerationParams) -> Self {
        let total_amplitude = params.height_octaves.iter().map(|o| o.amplitude).sum();
        Self {
            seed,
            noise: params.noise.to_fastnoise(seed),
            octaves: params.height_octaves.clone(),
            total_amplitude,
            height_exponent: params.height_exponent,
            moisture_offset: params.moisture_offset,
            moisture_frequency: params.moisture_frequency,
        }
    }

    /// Raw noise in [-1, 1]
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        self.noise.get_noise_2d(x, y).clamp(-1.0, 1.0)
    }

    /// Fractal height sum remapped to [0, 1] and shaped by the exponent
    pub fn height(&self, x: f32, y: f32) -> f32 {
        let sum: f32 = self
            .octaves
            .iter()
            .map(|o| self.sample(x * o.frequency, y * o.frequency) * o.amplitude)
            .sum();
        let normalized = (sum / self.total_amplitude + 1.0) / 2.0;
        normalized.clamp(0.0, 1.0).powf(self.height_exponent)
    }

    /// Moisture in [0, 1], sampled at a fixed offset from the height sample point
    pub fn moisture(&self, x: f32, y: f32) -> f32 {
        let sx = x * self.moisture_frequency + self.moisture_offset;
        let sy = y * self.moisture_frequency + self.moisture_offset;
        ((self.sample(sx, sy) + 1.0) / 2.0).clamp(0.0, 1.0)
    }
}

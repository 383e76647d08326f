// Tunable parameters for every stage of the pipeline.
//
// All structs deserialize from partial JSON documents: any missing field
// falls back to its default.
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

// Building layer name and tile-local units used by the tile source
pub const DEFAULT_LAYER_NAME: &str = "bldg";
pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 30.0;
pub const DEFAULT_TILE_EXTENT: f64 = 4096.0;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
/// 0.1 s of audio at 44.1 kHz, one block per animation tick
pub const DEFAULT_BLOCK_SIZE: usize = 4_410;
/// Five seconds of blocks at the default block size
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;
/// Largest magnitude of a signed 16-bit sample
pub const MAX_AMPLITUDE_I16: f64 = 32_768.0;

// Vector tile input settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    pub layer_name: String,
    // Attribute keys tried in order for the building height
    pub height_keys: Vec<String>,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            layer_name: DEFAULT_LAYER_NAME.to_string(),
            height_keys: vec!["z".to_string(), "height".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    // Douglas-Peucker tolerance in tile-local units (larger removes more detail)
    pub simplify_tolerance: f64,
    // Smallest tolerance tried before falling back to the unsimplified ring
    pub min_simplify_tolerance: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            simplify_tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
            min_simplify_tolerance: 0.5,
        }
    }
}

// Tile-local extent mapped across the full raster image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    pub extent_min: f64,
    pub extent_max: f64,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            extent_min: 0.0,
            extent_max: DEFAULT_TILE_EXTENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub target_sample_rate: u32,
    // Samples per device callback and per amplitude measurement
    pub block_size: usize,
    // Maximum number of amplitude samples waiting for the animator
    pub queue_capacity: usize,
    // Output device name; None selects the host default
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            device: None,
        }
    }
}

/// How a building's position is turned into a wave phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PhasePolicy {
    /// `(x + y) / wavelength`, a diagonal wavefront
    CoordinateSum,
    /// Distance from a fixed point divided by the wavelength, a ring wavefront
    DistanceFrom { x: f64, y: f64 },
}

impl Default for PhasePolicy {
    fn default() -> Self {
        PhasePolicy::CoordinateSum
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    pub wavelength: f64,
    pub wave_speed: f64,
    pub height_scale: f64,
    pub base_offset: f64,
    pub min_height: f64,
    pub max_amplitude: f64,
    pub tick_period_secs: f64,
    pub phase: PhasePolicy,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            wavelength: 500.0,
            wave_speed: 2.0,
            height_scale: 300.0,
            base_offset: 100.0,
            min_height: 1.0,
            max_amplitude: MAX_AMPLITUDE_I16,
            tick_period_secs: 0.1,
            phase: PhasePolicy::CoordinateSum,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub tile: TileConfig,
    pub geometry: GeometryConfig,
    pub raster: RasterConfig,
    pub audio: AudioConfig,
    pub wave: WaveConfig,
}

impl CoreConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Rejects values that would make a stage divide by zero or loop forever.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile.layer_name.is_empty() {
            return Err(ConfigError::Invalid("tile.layer_name is empty".into()));
        }
        if !(self.geometry.simplify_tolerance >= 0.0) {
            return Err(ConfigError::Invalid(
                "geometry.simplify_tolerance must be >= 0".into(),
            ));
        }
        if !(self.geometry.min_simplify_tolerance > 0.0) {
            return Err(ConfigError::Invalid(
                "geometry.min_simplify_tolerance must be > 0".into(),
            ));
        }
        if !(self.raster.extent_max > self.raster.extent_min) {
            return Err(ConfigError::Invalid(
                "raster extent_max must exceed extent_min".into(),
            ));
        }
        if self.audio.target_sample_rate == 0 {
            return Err(ConfigError::Invalid("audio.target_sample_rate is 0".into()));
        }
        if self.audio.block_size == 0 {
            return Err(ConfigError::Invalid("audio.block_size is 0".into()));
        }
        if self.audio.queue_capacity == 0 {
            return Err(ConfigError::Invalid("audio.queue_capacity is 0".into()));
        }
        if !(self.wave.wavelength > 0.0) {
            return Err(ConfigError::Invalid("wave.wavelength must be > 0".into()));
        }
        if !(self.wave.max_amplitude > 0.0) {
            return Err(ConfigError::Invalid("wave.max_amplitude must be > 0".into()));
        }
        if !(self.wave.tick_period_secs > 0.0) {
            return Err(ConfigError::Invalid(
                "wave.tick_period_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

// Owned state for one running visualisation: configuration, the current
// catalog with its statistics, and the live heights.
use std::path::Path;
use std::sync::Arc;

use crate::amplitude_stream::{AmplitudeQueue, PlaybackState};
use crate::audio_decoder::{AudioDecoder, AudioStream};
use crate::catalog::BuildingCatalogBuilder;
use crate::color_sampler::ColorSampler;
use crate::config::CoreConfig;
use crate::error::{AudioError, ConfigError, RasterError};
use crate::models::{BuildingCatalog, Feature, LiveHeights, ProcessingStats};
use crate::mvt_parser::{decode_tile_lossy, load_tile_file};
use crate::output_device::AmplitudeStreamer;
use crate::tile_keys::TileKey;
use crate::wave_animator::{TickOutcome, WaveHeightAnimator};

pub struct BuildingSession {
    config: CoreConfig,
    sampler: Option<ColorSampler>,
    catalog: BuildingCatalog,
    stats: ProcessingStats,
    heights: LiveHeights,
}

impl BuildingSession {
    pub fn new(config: CoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            sampler: None,
            catalog: BuildingCatalog::default(),
            stats: ProcessingStats::default(),
            heights: LiveHeights::default(),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Colour raster used for subsequent loads.
    pub fn set_color_raster(&mut self, path: impl AsRef<Path>) -> Result<(), RasterError> {
        self.sampler = Some(ColorSampler::open(path, self.config.raster.clone())?);
        Ok(())
    }

    pub fn set_color_sampler(&mut self, sampler: ColorSampler) {
        self.sampler = Some(sampler);
    }

    /// Replace the catalog with one built from `features`. Returns the
    /// number of buildings.
    pub fn load_features(&mut self, features: &[Feature]) -> usize {
        let mut builder = BuildingCatalogBuilder::new(self.config.geometry.clone());
        if let Some(sampler) = &self.sampler {
            builder = builder.with_color_sampler(sampler);
        }
        let (catalog, stats) = builder.build(features);
        self.heights = LiveHeights::from_catalog(&catalog);
        self.catalog = catalog;
        self.stats = stats;
        self.catalog.len()
    }

    /// Load from an encoded tile. Undecodable data loads an empty catalog.
    pub fn load_tile_bytes(&mut self, data: &[u8]) -> usize {
        let features = decode_tile_lossy(data, &self.config.tile);
        self.load_features(&features)
    }

    /// Load from a tile file. A missing or unreadable file loads an empty
    /// catalog and is only logged.
    pub fn load_tile_file(&mut self, path: impl AsRef<Path>) -> usize {
        let features = match load_tile_file(path.as_ref(), &self.config.tile) {
            Ok(features) => features,
            Err(e) => {
                log::warn!("{}; no buildings loaded", e);
                Vec::new()
            }
        };
        self.load_features(&features)
    }

    pub fn load_tile(&mut self, root: impl AsRef<Path>, key: TileKey) -> usize {
        log::info!("Loading tile {}", key);
        self.load_tile_file(key.path_under(root))
    }

    pub fn catalog(&self) -> &BuildingCatalog {
        &self.catalog
    }

    pub fn stats(&self) -> &ProcessingStats {
        &self.stats
    }

    pub fn heights(&self) -> &LiveHeights {
        &self.heights
    }

    /// Put every live height back to the building's static height.
    pub fn reset_heights(&mut self) {
        self.heights.reset(&self.catalog);
    }

    pub fn decode_audio(&self, path: impl AsRef<Path>) -> Result<AudioStream, AudioError> {
        AudioDecoder::new(self.config.audio.clone()).decode_file(path)
    }

    pub fn streamer(&self) -> AmplitudeStreamer {
        AmplitudeStreamer::new(self.config.audio.clone())
    }

    pub fn animator(&self, queue: Arc<AmplitudeQueue>, state: Arc<PlaybackState>) -> WaveHeightAnimator {
        WaveHeightAnimator::new(self.config.wave.clone(), queue, state)
    }

    /// Advance the animation by one tick on the session's catalog.
    pub fn tick(&mut self, animator: &WaveHeightAnimator) -> TickOutcome {
        animator.tick(&self.catalog, &mut self.heights)
    }
}

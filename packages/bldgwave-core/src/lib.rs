//! Building footprints from vector tiles, animated by audio loudness.
//!
//! The geometry side decodes the building layer of a tile, simplifies each
//! footprint and derives its centroid, bounding circle, fitted rectangle and
//! colour. The audio side decodes a track, plays it block by block and
//! turns each block's RMS into a travelling wave of building heights.

// Error types for every subsystem
pub mod error;
// Tunable parameters and their defaults
pub mod config;
// Shared data structures
pub mod models;
// Box/circle/ring intersection tests
pub mod bbox_filter;
// z/x/y tile addressing
pub mod tile_keys;
// Vector tile decoding
pub mod mvt_parser;
// JSON feature documents
pub mod geojson_features;
// Simplification, centroid, rectangle fit
pub mod polygon_geometry;
// Raster colour lookup
pub mod color_sampler;
// Feature -> building catalog
pub mod catalog;
// Audio file decoding
pub mod audio_decoder;
// Lock-free amplitude hand-off
pub mod amplitude_stream;
// cpal playback
pub mod output_device;
// Height animation
pub mod wave_animator;
// Owned pipeline state
pub mod session;

pub use amplitude_stream::{AmplitudeQueue, AmplitudeSample, BlockFeeder, FeedStatus, PlaybackPhase, PlaybackState};
pub use audio_decoder::{AudioDecoder, AudioStream};
pub use bbox_filter::BBox;
pub use catalog::BuildingCatalogBuilder;
pub use color_sampler::ColorSampler;
pub use config::{AudioConfig, CoreConfig, GeometryConfig, PhasePolicy, RasterConfig, TileConfig, WaveConfig};
pub use error::{AudioError, ConfigError, CoreError, FeatureError, RasterError, Result, TileError};
pub use models::{Building, BuildingCatalog, Feature, FeatureGeometry, LiveHeights, OrientedRect, ProcessingStats, Rgba, Ring};
pub use mvt_parser::{decode_tile, decode_tile_lossy, load_tile, load_tile_file};
pub use output_device::{AmplitudeStreamer, PlaybackHandle};
pub use polygon_geometry::{GeometryProcessor, ShapeDescriptor};
pub use session::BuildingSession;
pub use tile_keys::TileKey;
pub use wave_animator::{TickOutcome, WaveHeightAnimator};

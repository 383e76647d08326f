// Error types shared across the tile, geometry, raster and audio subsystems.

use std::path::PathBuf;

use thiserror::Error;

/// Tile-level failures. Callers that only want "features or nothing" use
/// [`crate::mvt_parser::decode_tile_lossy`], which logs these and returns an
/// empty list.
#[derive(Error, Debug)]
pub enum TileError {
    /// Tile file does not exist on disk
    #[error("Tile file not found: {}", path.display())]
    InputMissing { path: PathBuf },

    /// Requested layer is not present in the tile
    #[error("Layer '{layer}' not found in tile")]
    LayerMissing { layer: String },

    /// Buffer is not a valid vector tile
    #[error("Failed to decode vector tile: {0}")]
    Decode(String),

    /// Reading the file or inflating gzip data failed
    #[error("Failed to read tile data: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-feature failures. A feature that fails is skipped; the batch goes on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("unexpected coordinates depth ({depth})")]
    UnexpectedDepth { depth: usize },

    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometry(String),

    #[error("feature has no coordinate data")]
    EmptyGeometry,

    /// Geometry command stream is truncated or out of order
    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("ring has only {distinct} distinct points")]
    TooFewPoints { distinct: usize },

    #[error("exterior ring is self-intersecting")]
    SelfIntersecting,

    #[error("exterior ring has zero area")]
    Degenerate,

    #[error("coordinate is not a finite number pair")]
    InvalidCoordinate,
}

/// Errors raised by the audio decoder and the output device.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open audio file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File could not be parsed as a supported audio format
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("No decodable audio track found")]
    NoTrack,

    #[error("Audio track has an unknown sample rate")]
    UnknownSampleRate,

    /// No output device is available on the default host
    #[error("No audio output device available")]
    NoDevice,

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device config: {0}")]
    Config(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlay(String),

    #[error("Playback has already been started")]
    AlreadyStarted,
}

impl AudioError {
    /// True for failures of the output device rather than of the input file.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            AudioError::NoDevice
                | AudioError::DeviceNotFound(_)
                | AudioError::Config(_)
                | AudioError::StreamBuild(_)
                | AudioError::StreamPlay(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("Failed to load raster image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Raster image has no pixels")]
    Empty,
}

/// Top-level error for callers that drive several subsystems at once.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Tile(#[from] TileError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Raster(#[from] RasterError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

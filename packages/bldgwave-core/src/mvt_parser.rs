// Decoding of the building layer of a Mapbox Vector Tile into Feature
// records in tile-local coordinates.
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use geo_types::{Coord, LineString};
use geozero::mvt::{tile, Message, Tile};

use crate::config::{TileConfig, DEFAULT_TILE_EXTENT};
use crate::error::{FeatureError, TileError};
use crate::models::{Feature, FeatureGeometry, Ring};
use crate::tile_keys::TileKey;

// MVT geometry command ids
const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

// Function to detect if data is gzipped (checking for gzip magic number)
fn is_gzipped(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B
}

// Inflates gzipped tiles, passes anything else through
fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, TileError> {
    if !is_gzipped(data) {
        return Ok(data.to_vec());
    }

    let mut decoder = GzDecoder::new(data);
    let mut decompressed_data = Vec::new();
    decoder.read_to_end(&mut decompressed_data)?;
    Ok(decompressed_data)
}

/// Decode the configured building layer of a tile.
///
/// Features that cannot be turned into polygons are logged and skipped.
/// A missing layer or an unparseable buffer is an error here; use
/// [`decode_tile_lossy`] to treat those as "no buildings".
pub fn decode_tile(data: &[u8], config: &TileConfig) -> Result<Vec<Feature>, TileError> {
    let data = decompress_gzip(data)?;
    let tile = Tile::decode(data.as_slice()).map_err(|e| TileError::Decode(e.to_string()))?;

    let layer = tile
        .layers
        .iter()
        .find(|layer| layer.name == config.layer_name)
        .ok_or_else(|| TileError::LayerMissing {
            layer: config.layer_name.clone(),
        })?;

    let mut features = Vec::with_capacity(layer.features.len());
    for feature in &layer.features {
        match decode_feature(layer, feature, config) {
            Ok(decoded) => features.push(decoded),
            Err(e) => log::warn!("Skipping feature {:?} in layer '{}': {}", feature.id, layer.name, e),
        }
    }

    log::debug!(
        "Decoded {} of {} features from layer '{}'",
        features.len(),
        layer.features.len(),
        layer.name
    );
    Ok(features)
}

/// Like [`decode_tile`], but logs tile-level failures and returns no features.
pub fn decode_tile_lossy(data: &[u8], config: &TileConfig) -> Vec<Feature> {
    match decode_tile(data, config) {
        Ok(features) => features,
        Err(e) => {
            log::warn!("{}; tile yields no buildings", e);
            Vec::new()
        }
    }
}

pub fn load_tile_file(path: impl AsRef<Path>, config: &TileConfig) -> Result<Vec<Feature>, TileError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(TileError::InputMissing {
            path: path.to_path_buf(),
        });
    }
    let data = std::fs::read(path)?;
    log::info!("Loaded tile {} ({} bytes)", path.display(), data.len());
    decode_tile(&data, config)
}

/// Read the tile `key` from a "z/x/y.pbf" tree rooted at `root`.
pub fn load_tile(root: impl AsRef<Path>, key: TileKey, config: &TileConfig) -> Result<Vec<Feature>, TileError> {
    load_tile_file(key.path_under(root), config)
}

/// Turn one encoded feature into a [`Feature`] with y pointing up.
pub fn decode_feature(
    layer: &tile::Layer,
    feature: &tile::Feature,
    config: &TileConfig,
) -> Result<Feature, FeatureError> {
    let geom_type = feature.r#type.unwrap_or(tile::GeomType::Unknown as i32);
    if geom_type != tile::GeomType::Polygon as i32 {
        let name = match geom_type {
            1 => "Point".to_string(),
            2 => "LineString".to_string(),
            0 => "Unknown".to_string(),
            other => format!("type {}", other),
        };
        return Err(FeatureError::UnsupportedGeometry(name));
    }

    let extent = layer.extent.map(f64::from).unwrap_or(DEFAULT_TILE_EXTENT);
    let rings = decode_polygon_rings(&feature.geometry)?;
    let polygons = group_rings(rings, extent, feature.id);

    let geometry = match polygons.len() {
        0 => return Err(FeatureError::EmptyGeometry),
        1 => FeatureGeometry::Polygon(polygons.into_iter().flatten().collect()),
        _ => FeatureGeometry::MultiPolygon(polygons),
    };

    Ok(Feature {
        id: feature.id,
        height: feature_height(layer, feature, &config.height_keys),
        geometry,
    })
}

fn zigzag_decode(param: u32) -> i64 {
    ((param >> 1) as i64) ^ -((param & 1) as i64)
}

// Decode MVT geometry commands to rings of tile-space integer points.
// Rings are returned open; ClosePath only ends the current ring.
fn decode_polygon_rings(commands: &[u32]) -> Result<Vec<Vec<(i64, i64)>>, FeatureError> {
    let mut rings = Vec::new();
    let mut current: Vec<(i64, i64)> = Vec::new();
    let mut cursor_x: i64 = 0;
    let mut cursor_y: i64 = 0;
    let mut i = 0;

    while i < commands.len() {
        let cmd_id = commands[i] & 0x7;
        let cmd_count = (commands[i] >> 3) as usize;
        i += 1;

        match cmd_id {
            CMD_MOVE_TO | CMD_LINE_TO => {
                if cmd_id == CMD_LINE_TO && current.is_empty() {
                    return Err(FeatureError::MalformedGeometry("LineTo before MoveTo".into()));
                }
                if i + 2 * cmd_count > commands.len() {
                    return Err(FeatureError::MalformedGeometry(format!(
                        "command needs {} parameters, {} left",
                        2 * cmd_count,
                        commands.len() - i
                    )));
                }
                for _ in 0..cmd_count {
                    cursor_x += zigzag_decode(commands[i]);
                    cursor_y += zigzag_decode(commands[i + 1]);
                    i += 2;

                    if cmd_id == CMD_MOVE_TO {
                        // A MoveTo always starts a new ring
                        if !current.is_empty() {
                            rings.push(std::mem::take(&mut current));
                        }
                    }
                    current.push((cursor_x, cursor_y));
                }
            }
            CMD_CLOSE_PATH => {
                if !current.is_empty() {
                    rings.push(std::mem::take(&mut current));
                }
            }
            other => {
                return Err(FeatureError::MalformedGeometry(format!(
                    "unknown command id {}",
                    other
                )));
            }
        }
    }

    // Unterminated last ring
    if !current.is_empty() {
        rings.push(current);
    }
    Ok(rings)
}

// Surveyor's formula in the tile's y-down frame; exterior rings are positive
fn ring_area(points: &[(i64, i64)]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum: i128 = 0;
    for i in 0..n {
        let (x1, y1) = points[i];
        let (x2, y2) = points[(i + 1) % n];
        sum += (x1 as i128) * (y2 as i128) - (x2 as i128) * (y1 as i128);
    }
    sum as f64 / 2.0
}

fn to_ring(points: &[(i64, i64)], extent: f64) -> Ring {
    let mut coords: Vec<Coord<f64>> = points
        .iter()
        .map(|&(x, y)| Coord {
            x: x as f64,
            y: extent - y as f64,
        })
        .collect();
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    LineString::new(coords)
}

// Split rings into polygons: each exterior starts a polygon, the following
// interior rings are its holes
fn group_rings(rings: Vec<Vec<(i64, i64)>>, extent: f64, feature_id: Option<u64>) -> Vec<Vec<Ring>> {
    let mut polygons: Vec<Vec<Ring>> = Vec::new();

    for ring in rings {
        let area = ring_area(&ring);
        if area == 0.0 {
            log::debug!("Dropping zero-area ring in feature {:?}", feature_id);
        } else if area > 0.0 {
            polygons.push(vec![to_ring(&ring, extent)]);
        } else if let Some(polygon) = polygons.last_mut() {
            polygon.push(to_ring(&ring, extent));
        } else {
            log::warn!("Dropping interior ring without exterior in feature {:?}", feature_id);
        }
    }

    polygons
}

// A value counts as a height only when it is a non-zero number
fn value_as_height(value: &tile::Value) -> Option<f64> {
    let number = if let Some(s) = &value.string_value {
        s.trim().parse::<f64>().ok()
    } else if let Some(d) = value.double_value {
        Some(d)
    } else if let Some(f) = value.float_value {
        Some(f as f64)
    } else if let Some(i) = value.int_value {
        Some(i as f64)
    } else if let Some(u) = value.uint_value {
        Some(u as f64)
    } else {
        value.sint_value.map(|s| s as f64)
    };

    number.filter(|n| n.is_finite() && *n != 0.0)
}

/// First usable height among `keys`, clamped to be non-negative, else 0.
fn feature_height(layer: &tile::Layer, feature: &tile::Feature, keys: &[String]) -> f64 {
    for key in keys {
        let found = feature
            .tags
            .chunks_exact(2)
            .find(|pair| layer.keys.get(pair[0] as usize) == Some(key))
            .and_then(|pair| layer.values.get(pair[1] as usize))
            .and_then(value_as_height);
        if let Some(height) = found {
            return height.max(0.0);
        }
    }
    0.0
}

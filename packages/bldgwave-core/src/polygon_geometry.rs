// Per-footprint shape descriptors: simplified outline, centroid, bounding
// circle radius and, for four-cornered outlines, a fitted rectangle.
use geo::{Centroid, MinimumRotatedRect, Simplify};
use geo_types::{Coord, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::bbox_filter::segments_intersect;
use crate::config::GeometryConfig;
use crate::error::FeatureError;
use crate::models::{OrientedRect, Ring};

// Areas and lengths below this are treated as zero
const EPSILON: f64 = 1e-9;
// Relative tolerance used when comparing rectangle edge lengths
const EDGE_LENGTH_REL_EPS: f64 = 1e-9;

/// Everything derived from one ring-set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDescriptor {
    pub simplified: Ring,
    pub centroid: Point<f64>,
    pub bounding_radius: f64,
    pub rectangle: Option<OrientedRect>,
    // Closing coordinate included in both counts
    pub original_vertex_count: usize,
    pub simplified_vertex_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GeometryProcessor {
    config: GeometryConfig,
}

impl GeometryProcessor {
    pub fn new(config: GeometryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// Derive the shape descriptor of one ring-set (exterior first).
    ///
    /// Holes are carried in the raw data but do not take part in the
    /// derived shape. Malformed exteriors are reported as [`FeatureError`]
    /// so the caller can skip the feature.
    pub fn process(&self, rings: &[Ring]) -> Result<ShapeDescriptor, FeatureError> {
        let exterior = rings.first().ok_or(FeatureError::EmptyGeometry)?;
        if exterior.0.is_empty() {
            return Err(FeatureError::EmptyGeometry);
        }
        if exterior.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(FeatureError::InvalidCoordinate);
        }

        let closed = close_ring(exterior);
        let original_vertex_count = closed.0.len();

        let ring = dedup_consecutive(&closed);
        let distinct = distinct_point_count(&ring);
        if distinct < 3 {
            return Err(FeatureError::TooFewPoints { distinct });
        }
        if signed_area(&ring.0).abs() <= EPSILON {
            return Err(FeatureError::Degenerate);
        }
        if !is_simple_ring(&ring) {
            return Err(FeatureError::SelfIntersecting);
        }

        let simplified = simplify_ring(
            &ring,
            self.config.simplify_tolerance,
            self.config.min_simplify_tolerance,
        );
        let polygon = Polygon::new(simplified.clone(), vec![]);

        let centroid = polygon.centroid().ok_or(FeatureError::Degenerate)?;
        let bounding_radius = bounding_circle_radius(&simplified, centroid);

        let rectangle = if simplified.0.len() == 5 {
            fit_rectangle(&polygon)
        } else {
            None
        };

        Ok(ShapeDescriptor {
            simplified_vertex_count: simplified.0.len(),
            simplified,
            centroid,
            bounding_radius,
            rectangle,
            original_vertex_count,
        })
    }
}

/// Returns the ring with its first coordinate repeated at the end.
pub fn close_ring(ring: &Ring) -> Ring {
    let mut coords = ring.0.clone();
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    LineString::new(coords)
}

fn dedup_consecutive(ring: &Ring) -> Ring {
    let mut coords = ring.0.clone();
    coords.dedup();
    LineString::new(coords)
}

// Distinct points of a closed ring, closing repeat excluded
fn distinct_point_count(ring: &Ring) -> usize {
    let open = match ring.0.split_last() {
        Some((_, rest)) => rest,
        None => return 0,
    };
    let mut seen: Vec<Coord<f64>> = Vec::with_capacity(open.len());
    for c in open {
        if !seen.contains(c) {
            seen.push(*c);
        }
    }
    seen.len()
}

/// Shoelace area; positive for counter-clockwise rings in a y-up frame.
pub fn signed_area(coords: &[Coord<f64>]) -> f64 {
    if coords.len() < 3 {
        return 0.0;
    }
    let n = coords.len();
    let mut sum = 0.0;
    for i in 0..n {
        let a = coords[i];
        let b = coords[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

/// True when no two non-adjacent edges of a closed ring touch and no edge
/// doubles back over its neighbour.
pub fn is_simple_ring(ring: &Ring) -> bool {
    let pts = &ring.0;
    if pts.len() < 4 {
        return false;
    }
    let edges = pts.len() - 1;

    for i in 0..edges {
        // Spike: next edge runs back along this one
        let a = pts[i];
        let b = pts[i + 1];
        let c = if i + 2 < pts.len() { pts[i + 2] } else { pts[1] };
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        let dot = (a.x - b.x) * (c.x - b.x) + (a.y - b.y) * (c.y - b.y);
        if cross.abs() <= EPSILON && dot > 0.0 {
            return false;
        }

        for j in (i + 2)..edges {
            // First and last edges share the closing vertex
            if i == 0 && j == edges - 1 {
                continue;
            }
            if segments_intersect(pts[i], pts[i + 1], pts[j], pts[j + 1]) {
                return false;
            }
        }
    }
    true
}

fn is_valid_simplification(candidate: &Ring) -> bool {
    candidate.0.len() >= 4
        && distinct_point_count(candidate) >= 3
        && signed_area(&candidate.0).abs() > EPSILON
        && is_simple_ring(candidate)
}

/// Douglas-Peucker simplification that never returns an invalid ring.
///
/// The configured `tolerance` is always tried first. When the result
/// collapses or self-intersects, the tolerance is halved while it stays at
/// or above `min_tolerance`; after that the input ring is returned
/// unchanged. `ring` must already be a valid simple ring.
pub fn simplify_ring(ring: &Ring, tolerance: f64, min_tolerance: f64) -> Ring {
    let mut tol = tolerance;
    while tol > 0.0 {
        let candidate = ring.simplify(&tol);
        if is_valid_simplification(&candidate) {
            return candidate;
        }
        tol /= 2.0;
        if tol < min_tolerance {
            break;
        }
        log::debug!(
            "Simplification produced an invalid ring, retrying at tolerance {}",
            tol
        );
    }
    ring.clone()
}

/// Largest distance from `centroid` to any vertex of `ring`.
pub fn bounding_circle_radius(ring: &Ring, centroid: Point<f64>) -> f64 {
    ring.0
        .iter()
        .map(|c| (c.x - centroid.x()).hypot(c.y - centroid.y()))
        .fold(0.0, f64::max)
}

// Direction of (dx, dy) in degrees folded into (-90, 90]
fn normalize_axis_angle(dx: f64, dy: f64) -> f64 {
    let mut angle = dy.atan2(dx).to_degrees();
    if angle > 90.0 {
        angle -= 180.0;
    } else if angle <= -90.0 {
        angle += 180.0;
    }
    angle
}

/// Fit the minimum-area rotated rectangle around `polygon`.
///
/// Width is the shorter edge, height the longer. The angle is taken from a
/// width edge; when both edge lengths tie, the edge with the smallest
/// absolute angle wins and +90 is preferred over -90.
pub fn fit_rectangle(polygon: &Polygon<f64>) -> Option<OrientedRect> {
    let rect = polygon.minimum_rotated_rect()?;
    let ring = &rect.exterior().0;
    if ring.len() < 4 {
        return None;
    }
    let corners: Vec<Coord<f64>> = ring.iter().take(4).copied().collect();

    let edges: Vec<(f64, f64)> = (0..4)
        .map(|i| {
            let p1 = corners[i];
            let p2 = corners[(i + 1) % 4];
            let length = (p2.x - p1.x).hypot(p2.y - p1.y);
            (length, normalize_axis_angle(p2.x - p1.x, p2.y - p1.y))
        })
        .collect();

    let width = edges.iter().map(|e| e.0).fold(f64::INFINITY, f64::min);
    let height = edges.iter().map(|e| e.0).fold(0.0, f64::max);
    let tie_eps = EDGE_LENGTH_REL_EPS * height.max(1.0);

    let (start, angle_deg) = edges
        .iter()
        .enumerate()
        .filter(|(_, (length, _))| (length - width).abs() <= tie_eps)
        .map(|(i, (_, angle))| (i, *angle))
        .min_by(|a, b| {
            let key_a = (a.1.abs(), a.1 < 0.0);
            let key_b = (b.1.abs(), b.1 < 0.0);
            key_a
                .0
                .partial_cmp(&key_b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(key_a.1.cmp(&key_b.1))
        })?;

    let ordered = [
        corners[start],
        corners[(start + 1) % 4],
        corners[(start + 2) % 4],
        corners[(start + 3) % 4],
    ];

    Some(OrientedRect {
        width,
        height,
        angle_deg: snap_zero(angle_deg),
        corners: ordered,
    })
}

// Rotating calipers leaves tiny residues on axis-aligned input
fn snap_zero(angle: f64) -> f64 {
    if angle.abs() < 1e-9 {
        0.0
    } else {
        angle
    }
}

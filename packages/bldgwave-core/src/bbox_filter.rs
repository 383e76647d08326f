// Coarse spatial tests between footprints and axis-aligned boxes in
// tile-local coordinates.
use geo_types::{Coord, LineString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Coord<f64>,
    pub max: Coord<f64>,
}

impl BBox {
    fn corners(&self) -> [Coord<f64>; 4] {
        [
            self.min,
            Coord { x: self.max.x, y: self.min.y },
            self.max,
            Coord { x: self.min.x, y: self.max.y },
        ]
    }
}

// Function to check if a point is inside a bounding box
pub fn point_in_bbox(point: Coord<f64>, bbox: &BBox) -> bool {
    point.x >= bbox.min.x && point.x <= bbox.max.x && point.y >= bbox.min.y && point.y <= bbox.max.y
}

/// True when a circle overlaps the box (closest-point test).
pub fn circle_intersects_bbox(center: Coord<f64>, radius: f64, bbox: &BBox) -> bool {
    let nearest_x = center.x.clamp(bbox.min.x, bbox.max.x);
    let nearest_y = center.y.clamp(bbox.min.y, bbox.max.y);
    let dx = center.x - nearest_x;
    let dy = center.y - nearest_y;
    dx * dx + dy * dy <= radius * radius
}

// Function to check if a closed ring intersects with a bounding box
pub fn ring_intersects_bbox(ring: &LineString<f64>, bbox: &BBox) -> bool {
    let points = &ring.0;
    if points.is_empty() {
        return false;
    }

    // 1. Quick rejection on the ring's own bounds
    let mut ring_min = Coord { x: f64::INFINITY, y: f64::INFINITY };
    let mut ring_max = Coord { x: f64::NEG_INFINITY, y: f64::NEG_INFINITY };
    for p in points {
        ring_min.x = ring_min.x.min(p.x);
        ring_min.y = ring_min.y.min(p.y);
        ring_max.x = ring_max.x.max(p.x);
        ring_max.y = ring_max.y.max(p.y);
    }
    if ring_max.x < bbox.min.x || ring_min.x > bbox.max.x || ring_max.y < bbox.min.y || ring_min.y > bbox.max.y {
        return false;
    }

    // 2. Any vertex inside the box
    if points.iter().any(|p| point_in_bbox(*p, bbox)) {
        return true;
    }

    // 3. Any ring edge crossing any box edge
    let corners = bbox.corners();
    let n = points.len();
    for i in 0..n {
        let p1 = points[i];
        let p2 = points[(i + 1) % n];
        for j in 0..4 {
            if segments_intersect(p1, p2, corners[j], corners[(j + 1) % 4]) {
                return true;
            }
        }
    }

    // 4. Box entirely inside the ring
    corners.iter().any(|c| point_in_ring(*c, points))
}

/// Segment intersection including touching and collinear overlap.
pub fn segments_intersect(p1: Coord<f64>, p2: Coord<f64>, p3: Coord<f64>, p4: Coord<f64>) -> bool {
    let d1 = direction(p3, p4, p1);
    let d2 = direction(p3, p4, p2);
    let d3 = direction(p1, p2, p3);
    let d4 = direction(p1, p2, p4);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    // Colinear cases
    (d1 == 0.0 && on_segment(p3, p4, p1))
        || (d2 == 0.0 && on_segment(p3, p4, p2))
        || (d3 == 0.0 && on_segment(p1, p2, p3))
        || (d4 == 0.0 && on_segment(p1, p2, p4))
}

fn direction(p1: Coord<f64>, p2: Coord<f64>, p3: Coord<f64>) -> f64 {
    (p3.x - p1.x) * (p2.y - p1.y) - (p2.x - p1.x) * (p3.y - p1.y)
}

fn on_segment(p1: Coord<f64>, p2: Coord<f64>, p: Coord<f64>) -> bool {
    p.x >= p1.x.min(p2.x) && p.x <= p1.x.max(p2.x) && p.y >= p1.y.min(p2.y) && p.y <= p1.y.max(p2.y)
}

// Ray casting
fn point_in_ring(point: Coord<f64>, ring: &[Coord<f64>]) -> bool {
    let mut inside = false;
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let crosses = ((a.y > point.y) != (b.y > point.y))
            && (point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x);
        if crosses {
            inside = !inside;
        }
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, line_string};

    fn bbox(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BBox {
        BBox {
            min: coord! { x: min_x, y: min_y },
            max: coord! { x: max_x, y: max_y },
        }
    }

    #[test]
    fn circle_touching_box_edge_counts() {
        let b = bbox(0.0, 0.0, 10.0, 10.0);
        assert!(circle_intersects_bbox(coord! { x: 15.0, y: 5.0 }, 5.0, &b));
        assert!(!circle_intersects_bbox(coord! { x: 15.0, y: 5.0 }, 4.9, &b));
        assert!(circle_intersects_bbox(coord! { x: 5.0, y: 5.0 }, 0.0, &b));
    }

    #[test]
    fn ring_crossing_box_without_vertices_inside() {
        // A thin bar passing straight through the box
        let ring = line_string![
            (x: -10.0, y: 4.0),
            (x: 20.0, y: 4.0),
            (x: 20.0, y: 6.0),
            (x: -10.0, y: 6.0),
            (x: -10.0, y: 4.0),
        ];
        assert!(ring_intersects_bbox(&ring, &bbox(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn box_inside_ring_counts() {
        let ring = line_string![
            (x: -100.0, y: -100.0),
            (x: 100.0, y: -100.0),
            (x: 100.0, y: 100.0),
            (x: -100.0, y: 100.0),
            (x: -100.0, y: -100.0),
        ];
        assert!(ring_intersects_bbox(&ring, &bbox(0.0, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn disjoint_ring_is_rejected() {
        let ring = line_string![
            (x: 20.0, y: 20.0),
            (x: 30.0, y: 20.0),
            (x: 30.0, y: 30.0),
            (x: 20.0, y: 20.0),
        ];
        assert!(!ring_intersects_bbox(&ring, &bbox(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn crossing_segments_intersect() {
        assert!(segments_intersect(
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 10.0, y: 10.0 },
            coord! { x: 0.0, y: 10.0 },
            coord! { x: 10.0, y: 0.0 },
        ));
        assert!(!segments_intersect(
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 1.0, y: 0.0 },
            coord! { x: 0.0, y: 1.0 },
            coord! { x: 1.0, y: 1.0 },
        ));
    }
}

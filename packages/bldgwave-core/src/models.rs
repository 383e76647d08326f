// Shared data structures for decoded features, the building catalog and
// the per-run statistics.
use geo_types::{Coord, LineString, Point};
use serde::{Deserialize, Serialize};

use crate::bbox_filter::{circle_intersects_bbox, ring_intersects_bbox, BBox};

/// A closed point sequence in tile-local coordinates (y up).
pub type Ring = LineString<f64>;

/// Feature geometry, decided once at decode time.
///
/// The first ring of every ring-set is the exterior, further rings are holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureGeometry {
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

impl FeatureGeometry {
    /// Ring-sets in order: one for a polygon, one per member for a multi-polygon.
    pub fn ring_sets(&self) -> Vec<&[Ring]> {
        match self {
            FeatureGeometry::Polygon(rings) => vec![rings.as_slice()],
            FeatureGeometry::MultiPolygon(polygons) => {
                polygons.iter().map(|rings| rings.as_slice()).collect()
            }
        }
    }

    /// Nesting depth of the equivalent coordinate array (3 or 4).
    pub fn depth(&self) -> usize {
        match self {
            FeatureGeometry::Polygon(_) => 3,
            FeatureGeometry::MultiPolygon(_) => 4,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FeatureGeometry::Polygon(rings) => rings.iter().all(|r| r.0.is_empty()),
            FeatureGeometry::MultiPolygon(polygons) => polygons
                .iter()
                .all(|rings| rings.iter().all(|r| r.0.is_empty())),
        }
    }
}

/// One decoded record from the building layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: Option<u64>,
    pub height: f64,
    pub geometry: FeatureGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };

    pub fn from_u8(rgba: [u8; 4]) -> Self {
        Rgba {
            r: rgba[0] as f32 / 255.0,
            g: rgba[1] as f32 / 255.0,
            b: rgba[2] as f32 / 255.0,
            a: rgba[3] as f32 / 255.0,
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Minimum-area rectangle fitted to a four-cornered footprint.
///
/// `width <= height` always holds. `angle_deg` is the direction of a width
/// edge, counter-clockwise from +x, normalised into (-90, 90].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedRect {
    pub width: f64,
    pub height: f64,
    pub angle_deg: f64,
    pub corners: [Coord<f64>; 4],
}

/// The catalog's unit of record. Shape data never changes after creation;
/// the animated height lives in [`LiveHeights`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    // Not unique: multi-polygon members share their parent's id
    pub id: Option<u64>,
    pub height: f64,
    pub raw_coordinates: Vec<Ring>,
    pub simplified_coordinates: Ring,
    pub centroid: Point<f64>,
    pub bounding_radius: f64,
    pub rectangle: Option<OrientedRect>,
    pub color: Rgba,
}

/// Ordered collection of buildings for one loaded tile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingCatalog {
    buildings: Vec<Building>,
}

impl BuildingCatalog {
    pub fn new(buildings: Vec<Building>) -> Self {
        Self { buildings }
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Building> {
        self.buildings.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Building> {
        self.buildings.iter()
    }

    pub fn as_slice(&self) -> &[Building] {
        &self.buildings
    }

    /// Catalog indices of every building derived from the feature `id`.
    pub fn indices_for_id(&self, id: u64) -> Vec<usize> {
        self.buildings
            .iter()
            .enumerate()
            .filter(|(_, b)| b.id == Some(id))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn rect_count(&self) -> usize {
        self.buildings.iter().filter(|b| b.rectangle.is_some()).count()
    }

    /// Indices of buildings whose footprint touches `bbox`.
    ///
    /// The bounding circle rejects most buildings before the ring test runs.
    pub fn query_bbox(&self, bbox: &BBox) -> Vec<usize> {
        self.buildings
            .iter()
            .enumerate()
            .filter(|(_, b)| circle_intersects_bbox(b.centroid.0, b.bounding_radius, bbox))
            .filter(|(_, b)| ring_intersects_bbox(&b.simplified_coordinates, bbox))
            .map(|(i, _)| i)
            .collect()
    }
}

impl<'a> IntoIterator for &'a BuildingCatalog {
    type Item = &'a Building;
    type IntoIter = std::slice::Iter<'a, Building>;

    fn into_iter(self) -> Self::IntoIter {
        self.buildings.iter()
    }
}

/// Aggregate counters for one catalog build. Diagnostic only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub vertex_count: usize,
    pub simplified_vertex_count: usize,
    pub building_count: usize,
    pub rect_building_count: usize,
    pub not_rect_building_count: usize,
    pub skipped_features: usize,
}

impl ProcessingStats {
    pub fn merge(&mut self, other: &ProcessingStats) {
        self.vertex_count += other.vertex_count;
        self.simplified_vertex_count += other.simplified_vertex_count;
        self.building_count += other.building_count;
        self.rect_building_count += other.rect_building_count;
        self.not_rect_building_count += other.not_rect_building_count;
        self.skipped_features += other.skipped_features;
    }
}

/// Animated height per building, indexed like the catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveHeights {
    values: Vec<f64>,
}

impl LiveHeights {
    /// Seeds every entry with the building's static height.
    pub fn from_catalog(catalog: &BuildingCatalog) -> Self {
        Self {
            values: catalog.iter().map(|b| b.height).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn set(&mut self, index: usize, height: f64) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = height;
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    // Keeps the length in step with a reloaded catalog
    pub fn reset(&mut self, catalog: &BuildingCatalog) {
        self.values.clear();
        self.values.extend(catalog.iter().map(|b| b.height));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, line_string, point};

    fn square_building(id: u64, x: f64, y: f64, size: f64) -> Building {
        let ring: Ring = line_string![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ];
        Building {
            id: Some(id),
            height: 10.0 + id as f64,
            raw_coordinates: vec![ring.clone()],
            simplified_coordinates: ring,
            centroid: point!(x: x + size / 2.0, y: y + size / 2.0),
            bounding_radius: (size / 2.0) * std::f64::consts::SQRT_2,
            rectangle: None,
            color: Rgba::WHITE,
        }
    }

    #[test]
    fn ids_may_repeat_across_buildings() {
        let catalog = BuildingCatalog::new(vec![
            square_building(7, 0.0, 0.0, 10.0),
            square_building(7, 20.0, 0.0, 10.0),
            square_building(8, 40.0, 0.0, 10.0),
        ]);
        assert_eq!(catalog.indices_for_id(7), vec![0, 1]);
        assert_eq!(catalog.indices_for_id(8), vec![2]);
        assert!(catalog.indices_for_id(9).is_empty());
    }

    #[test]
    fn query_bbox_returns_touching_buildings_only() {
        let catalog = BuildingCatalog::new(vec![
            square_building(1, 0.0, 0.0, 10.0),
            square_building(2, 100.0, 100.0, 10.0),
        ]);
        let bbox = BBox {
            min: coord! { x: 5.0, y: 5.0 },
            max: coord! { x: 50.0, y: 50.0 },
        };
        assert_eq!(catalog.query_bbox(&bbox), vec![0]);
    }

    #[test]
    fn live_heights_start_from_static_heights() {
        let catalog = BuildingCatalog::new(vec![
            square_building(1, 0.0, 0.0, 10.0),
            square_building(2, 20.0, 0.0, 10.0),
        ]);
        let mut heights = LiveHeights::from_catalog(&catalog);
        assert_eq!(heights.as_slice(), &[11.0, 12.0]);
        heights.set(1, 42.0);
        heights.set(5, 1.0);
        assert_eq!(heights.get(1), Some(42.0));
        assert_eq!(heights.len(), 2);
    }

    #[test]
    fn stats_merge_adds_every_counter() {
        let mut total = ProcessingStats {
            vertex_count: 10,
            simplified_vertex_count: 5,
            building_count: 1,
            rect_building_count: 1,
            not_rect_building_count: 0,
            skipped_features: 0,
        };
        total.merge(&ProcessingStats {
            vertex_count: 7,
            simplified_vertex_count: 6,
            building_count: 1,
            rect_building_count: 0,
            not_rect_building_count: 1,
            skipped_features: 2,
        });
        assert_eq!(total.vertex_count, 17);
        assert_eq!(total.simplified_vertex_count, 11);
        assert_eq!(total.building_count, 2);
        assert_eq!(total.not_rect_building_count, 1);
        assert_eq!(total.skipped_features, 2);
    }

    #[test]
    fn color_channels_are_normalised() {
        let c = Rgba::from_u8([255, 0, 51, 255]);
        assert_eq!(c.to_array(), [1.0, 0.0, 0.2, 1.0]);
    }
}

// Turns decoded features into the building catalog.
use rayon::prelude::*;

use crate::color_sampler::ColorSampler;
use crate::config::GeometryConfig;
use crate::models::{Building, BuildingCatalog, Feature, ProcessingStats, Rgba};
use crate::polygon_geometry::GeometryProcessor;

/// Builds one [`BuildingCatalog`] per call; holds no state between runs.
pub struct BuildingCatalogBuilder<'a> {
    processor: GeometryProcessor,
    sampler: Option<&'a ColorSampler>,
}

impl<'a> BuildingCatalogBuilder<'a> {
    pub fn new(config: GeometryConfig) -> Self {
        Self {
            processor: GeometryProcessor::new(config),
            sampler: None,
        }
    }

    /// Colour buildings from `sampler`; without one every building is white.
    pub fn with_color_sampler(mut self, sampler: &'a ColorSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Process every feature, one building per polygon member.
    ///
    /// Catalog order follows feature order, with the members of a
    /// multi-polygon in their own order. Features are processed in parallel.
    pub fn build(&self, features: &[Feature]) -> (BuildingCatalog, ProcessingStats) {
        let per_feature: Vec<(Vec<Building>, ProcessingStats)> = features
            .par_iter()
            .map(|feature| self.build_feature(feature))
            .collect();

        let mut buildings = Vec::with_capacity(per_feature.len());
        let mut stats = ProcessingStats::default();
        for (feature_buildings, feature_stats) in per_feature {
            buildings.extend(feature_buildings);
            stats.merge(&feature_stats);
        }

        log::info!(
            "Built {} buildings ({} rectangles, {} other, {} skipped), vertices {} -> {}",
            stats.building_count,
            stats.rect_building_count,
            stats.not_rect_building_count,
            stats.skipped_features,
            stats.vertex_count,
            stats.simplified_vertex_count
        );

        (BuildingCatalog::new(buildings), stats)
    }

    fn build_feature(&self, feature: &Feature) -> (Vec<Building>, ProcessingStats) {
        let mut stats = ProcessingStats::default();
        if feature.geometry.is_empty() {
            log::debug!("Feature {:?} has no coordinate data", feature.id);
            return (Vec::new(), stats);
        }

        let ring_sets = feature.geometry.ring_sets();
        let mut buildings = Vec::with_capacity(ring_sets.len());

        for rings in ring_sets {
            let shape = match self.processor.process(rings) {
                Ok(shape) => shape,
                Err(e) => {
                    log::warn!("Skipping polygon of feature {:?}: {}", feature.id, e);
                    stats.skipped_features += 1;
                    continue;
                }
            };

            stats.vertex_count += shape.original_vertex_count;
            stats.simplified_vertex_count += shape.simplified_vertex_count;
            stats.building_count += 1;
            if shape.rectangle.is_some() {
                stats.rect_building_count += 1;
            } else {
                stats.not_rect_building_count += 1;
            }

            let color = self
                .sampler
                .map(|sampler| sampler.sample(shape.centroid))
                .unwrap_or(Rgba::WHITE);

            buildings.push(Building {
                id: feature.id,
                height: feature.height,
                raw_coordinates: rings.to_vec(),
                simplified_coordinates: shape.simplified,
                centroid: shape.centroid,
                bounding_radius: shape.bounding_radius,
                rectangle: shape.rectangle,
                color,
            });
        }

        (buildings, stats)
    }
}

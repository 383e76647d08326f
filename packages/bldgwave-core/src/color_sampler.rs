// Per-building colour lookup in a raster laid over the tile extent.
use std::path::Path;

use geo_types::Point;
use image::RgbaImage;

use crate::config::RasterConfig;
use crate::error::RasterError;
use crate::models::Rgba;

pub struct ColorSampler {
    image: RgbaImage,
    config: RasterConfig,
}

impl ColorSampler {
    /// Load any format the `image` crate understands. Images without an
    /// alpha channel sample as fully opaque.
    pub fn open(path: impl AsRef<Path>, config: RasterConfig) -> Result<Self, RasterError> {
        let image = image::open(path.as_ref())?.to_rgba8();
        log::info!(
            "Loaded colour raster {} ({}x{})",
            path.as_ref().display(),
            image.width(),
            image.height()
        );
        Self::from_image(image, config)
    }

    pub fn from_image(image: RgbaImage, config: RasterConfig) -> Result<Self, RasterError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(RasterError::Empty);
        }
        Ok(Self { image, config })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Pixel holding the colour for `point`, row 0 at the top.
    ///
    /// Out-of-extent points clamp to the nearest edge pixel.
    pub fn pixel_for(&self, point: Point<f64>) -> (u32, u32) {
        let (width, height) = self.image.dimensions();
        let px = self.axis_to_pixel(point.x(), width);
        let py = self.axis_to_pixel(point.y(), height);
        // Geometry y grows upward, image rows grow downward
        (px, height - py - 1)
    }

    pub fn sample(&self, point: Point<f64>) -> Rgba {
        let (x, y) = self.pixel_for(point);
        Rgba::from_u8(self.image.get_pixel(x, y).0)
    }

    fn axis_to_pixel(&self, value: f64, size: u32) -> u32 {
        let span = self.config.extent_max - self.config.extent_min;
        let scaled = ((value - self.config.extent_min) / span * size as f64).trunc();
        if !scaled.is_finite() {
            return 0;
        }
        scaled.clamp(0.0, (size - 1) as f64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;
    use image::{Rgb, RgbImage, Rgba as ImageRgba};

    // 4 x 2 image with a distinct red value per pixel
    fn gradient_sampler() -> ColorSampler {
        let image = RgbaImage::from_fn(4, 2, |x, y| ImageRgba([(y * 4 + x) as u8 * 10, 0, 0, 255]));
        ColorSampler::from_image(image, RasterConfig::default()).expect("non-empty image")
    }

    #[test]
    fn origin_maps_to_bottom_left_pixel() {
        let sampler = gradient_sampler();
        assert_eq!(sampler.pixel_for(point!(x: 0.0, y: 0.0)), (0, 1));
        assert_eq!(sampler.sample(point!(x: 0.0, y: 0.0)).r, 40.0 / 255.0);
    }

    #[test]
    fn far_corner_maps_to_top_right_pixel() {
        let sampler = gradient_sampler();
        assert_eq!(sampler.pixel_for(point!(x: 4096.0, y: 4096.0)), (3, 0));
        assert_eq!(sampler.sample(point!(x: 4096.0, y: 4096.0)).r, 30.0 / 255.0);
    }

    #[test]
    fn out_of_extent_points_clamp() {
        let sampler = gradient_sampler();
        assert_eq!(sampler.pixel_for(point!(x: -500.0, y: 99_999.0)), (0, 0));
        assert_eq!(sampler.pixel_for(point!(x: 2048.0, y: 1024.0)), (2, 1));
        assert_eq!(sampler.pixel_for(point!(x: f64::NAN, y: 0.0)), (0, 1));
    }

    #[test]
    fn rgb_images_sample_opaque() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("colors.png");
        RgbImage::from_pixel(3, 3, Rgb([255, 128, 0])).save(&path).expect("write png");

        let sampler = ColorSampler::open(&path, RasterConfig::default()).expect("png loads");
        let color = sampler.sample(point!(x: 100.0, y: 100.0));
        assert_eq!(color.r, 1.0);
        assert_eq!(color.g, 128.0 / 255.0);
        assert_eq!(color.a, 1.0);
    }

    #[test]
    fn empty_image_is_rejected() {
        let result = ColorSampler::from_image(RgbaImage::new(0, 0), RasterConfig::default());
        assert!(matches!(result, Err(RasterError::Empty)));
    }
}

//! Image preprocessing: resize, centre crop, grayscale and normalization.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage};
use mlabel_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for image preprocessing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Side length of the square output image
    pub image_size: u32,
    /// Normalization mean applied to `[0, 1]` pixels
    pub mean: f32,
    /// Normalization standard deviation
    pub std: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: 256,
            mean: 0.5,
            std: 0.5,
        }
    }
}

impl PreprocessConfig {
    pub fn with_image_size(mut self, image_size: u32) -> Self {
        self.image_size = image_size;
        self
    }
}

/// Turns decoded images into square single-channel model inputs
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn image_size(&self) -> usize {
        self.config.image_size as usize
    }

    /// Opens an image file and applies `resize_and_crop`
    pub fn load(&self, path: &Path) -> Result<GrayImage> {
        let image = image::open(path)
            .map_err(|e| Error::Image(format!("Failed to load image {}: {e}", path.display())))?;
        Ok(self.resize_and_crop(&image))
    }

    /// Scales the shorter side to `image_size`, centre crops the longer
    /// side and converts to 8-bit luma.
    pub fn resize_and_crop(&self, image: &DynamicImage) -> GrayImage {
        let size = self.config.image_size;
        let (width, height) = image.dimensions();

        let (new_w, new_h) = if width <= height {
            let h = ((height as u64 * size as u64) as f64 / width.max(1) as f64).round() as u32;
            (size, h.max(size))
        } else {
            let w = ((width as u64 * size as u64) as f64 / height.max(1) as f64).round() as u32;
            (w.max(size), size)
        };

        let resized = if (new_w, new_h) == (width, height) {
            image.clone()
        } else {
            image.resize_exact(new_w, new_h, FilterType::Triangle)
        };

        let x = (new_w - size) / 2;
        let y = (new_h - size) / 2;
        resized.crop_imm(x, y, size, size).to_luma8()
    }

    /// Converts a luma image to a `1 x H x W` buffer in `[0, 1]`
    pub fn to_unit_floats(image: &GrayImage) -> Vec<f32> {
        image.as_raw().iter().map(|&p| p as f32 / 255.0).collect()
    }

    /// Applies `(x - mean) / std` in place
    pub fn normalize(&self, data: &mut [f32]) {
        let PreprocessConfig { mean, std, .. } = self.config;
        for value in data.iter_mut() {
            *value = (*value - mean) / std;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn preprocessor(size: u32) -> ImagePreprocessor {
        ImagePreprocessor::new(PreprocessConfig::default().with_image_size(size))
    }

    #[test]
    fn test_output_is_square() {
        let p = preprocessor(32);
        for (w, h) in [(64, 48), (20, 90), (32, 32), (7, 7)] {
            let img = DynamicImage::ImageRgb8(RgbImage::new(w, h));
            let out = p.resize_and_crop(&img);
            assert_eq!(out.dimensions(), (32, 32), "input {w}x{h}");
        }
    }

    #[test]
    fn test_center_crop_keeps_middle() {
        // Left and right thirds black, middle third white
        let img = RgbImage::from_fn(48, 16, |x, _| {
            if (16..32).contains(&x) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let out = preprocessor(16).resize_and_crop(&DynamicImage::ImageRgb8(img));
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_normalization_range() {
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 255, 255])));
        let black = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let p = preprocessor(8);

        let pipeline = |image: &DynamicImage| {
            let mut data = ImagePreprocessor::to_unit_floats(&p.resize_and_crop(image));
            p.normalize(&mut data);
            data
        };
        let w = pipeline(&white);
        let b = pipeline(&black);
        assert_eq!(w.len(), 64);
        assert!(w.iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(b.iter().all(|&v| (v + 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_load_missing_file() {
        let err = preprocessor(8).load(Path::new("/nonexistent/img.png")).unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }
}

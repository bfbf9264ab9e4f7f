//! Image augmentation.
//!
//! Only random rotation is applied, on the resized luma image before it is
//! converted to floats. Test batches are rotated too unless
//! `DataConfig::augment_eval` is off.

use image::{GrayImage, Luma};
use rand::Rng;

/// Rotation by a uniform angle in `[-max_degrees, max_degrees]` about the
/// image centre, bilinear sampling, zero fill outside the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomRotation {
    pub max_degrees: f32,
}

impl RandomRotation {
    pub fn new(max_degrees: f32) -> Self {
        Self {
            max_degrees: max_degrees.abs(),
        }
    }

    pub fn sample_angle<R: Rng>(&self, rng: &mut R) -> f32 {
        if self.max_degrees == 0.0 {
            return 0.0;
        }
        rng.gen_range(-self.max_degrees..=self.max_degrees)
    }

    pub fn apply<R: Rng>(&self, image: &GrayImage, rng: &mut R) -> GrayImage {
        let angle = self.sample_angle(rng);
        rotate(image, angle)
    }
}

/// Rotates counter-clockwise by `angle_degrees`
pub fn rotate(image: &GrayImage, angle_degrees: f32) -> GrayImage {
    if angle_degrees.abs() < 1e-3 {
        return image.clone();
    }

    let (width, height) = image.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();

    GrayImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        // Inverse mapping from output pixel to source position
        let src_x = cx + dx * cos_a - dy * sin_a;
        let src_y = cy + dx * sin_a + dy * cos_a;
        Luma([bilinear_sample(image, src_x, src_y)])
    })
}

fn bilinear_sample(image: &GrayImage, x: f32, y: f32) -> u8 {
    let (width, height) = image.dimensions();
    if x < -0.5 || y < -0.5 || x > width as f32 - 0.5 || y > height as f32 - 0.5 {
        return 0;
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let pixel = |px: f32, py: f32| -> f32 {
        if px < 0.0 || py < 0.0 || px >= width as f32 || py >= height as f32 {
            0.0
        } else {
            image.get_pixel(px as u32, py as u32).0[0] as f32
        }
    };

    let top = pixel(x0, y0) * (1.0 - fx) + pixel(x0 + 1.0, y0) * fx;
    let bottom = pixel(x0, y0 + 1.0) * (1.0 - fx) + pixel(x0 + 1.0, y0 + 1.0) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

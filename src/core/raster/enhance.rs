//! Contrast enhancement.

use image::GrayImage;

/// Stretch contrast around the image's mean luma.
///
/// Each pixel becomes `mean + factor * (pixel - mean)`, clamped to 0..=255.
/// A factor of 1.0 leaves the image unchanged.
pub fn enhance_contrast(image: &GrayImage, factor: f32) -> GrayImage {
    let count = image.as_raw().len();
    if count == 0 {
        return image.clone();
    }

    let sum: u64 = image.as_raw().iter().map(|&luma| luma as u64).sum();
    let mean = (sum as f64 / count as f64 + 0.5).floor() as f32;

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let value = mean + factor * (pixel[0] as f32 - mean);
        pixel[0] = value.clamp(0.0, 255.0) as u8;
    }
    out
}

//! Denoise and threshold steps for the second decode stage.

use image::GrayImage;
use imageproc::contrast::{self, ThresholdType};
use imageproc::filter;

/// 3x3 median filter.
pub fn denoise(image: &GrayImage) -> GrayImage {
    filter::median_filter(image, 1, 1)
}

/// Threshold chosen by Otsu's method. Pixels `<= threshold` are the dark
/// class.
pub fn otsu_threshold(image: &GrayImage) -> u8 {
    contrast::otsu_level(image)
}

/// Binarize to pure black and white around `threshold`.
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    contrast::threshold(image, threshold, ThresholdType::Binary)
}

//! Test utilities for imageops-grabcut
//!
//! This module provides fixture images, colour samples and small pixel
//! grids shared by the unit tests. It is only compiled when running tests.

use crate::segmentation::graph::{Color, PixelGrid};
use crate::Image;
use image::{Rgb, Rgba};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Creates a test RGB image with predefined pixel values for testing.
///
/// This function creates a 2x2 test image with known pixel values:
/// - (0,0): [200, 150, 100]
/// - (1,0): [100, 200, 150]
/// - (0,1): [150, 100, 200]
/// - (1,1): [50, 75, 25]
pub fn create_test_rgb_image() -> Image<Rgb<u8>> {
    let mut image: Image<Rgb<u8>> = Image::new(2, 2);
    image.put_pixel(0, 0, Rgb([200, 150, 100]));
    image.put_pixel(1, 0, Rgb([100, 200, 150]));
    image.put_pixel(0, 1, Rgb([150, 100, 200]));
    image.put_pixel(1, 1, Rgb([50, 75, 25]));
    image
}

/// Creates a test RGBA image with the same colours as [`create_test_rgb_image`]
/// and alphas 255, 128, 64 and 0.
pub fn create_test_rgba_image() -> Image<Rgba<u8>> {
    let mut image: Image<Rgba<u8>> = Image::new(2, 2);
    image.put_pixel(0, 0, Rgba([200, 150, 100, 255]));
    image.put_pixel(1, 0, Rgba([100, 200, 150, 128]));
    image.put_pixel(0, 1, Rgba([150, 100, 200, 64]));
    image.put_pixel(1, 1, Rgba([50, 75, 25, 0]));
    image
}

/// Draws `per_center` noisy samples around each centre.
///
/// Samples are interleaved: sample `i` belongs to centre `i % centers.len()`.
/// Noise is uniform in `[-spread, spread]` per channel and reproducible for
/// a given `seed`.
pub fn gaussian_blobs(centers: &[Color], per_center: usize, spread: f64, seed: u64) -> Vec<Color> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(centers.len() * per_center);
    for _ in 0..per_center {
        for center in centers {
            samples.push(center.map(|c| c + rng.random_range(-spread..=spread)));
        }
    }
    samples
}

/// A reddish left half and a bluish right half with seeded noise.
///
/// Returns the grid together with the indices of its first column
/// (foreground seeds) and last column (background seeds).
pub fn two_tone_grid(width: u32, height: u32, seed: u64) -> (PixelGrid, Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let colors = (0..height)
        .flat_map(|_| 0..width)
        .map(|x| {
            let base = if x < width / 2 {
                [220.0, 40.0, 30.0]
            } else {
                [30.0, 60.0, 210.0]
            };
            base.map(|c: f64| c + rng.random_range(-6.0..=6.0))
        })
        .collect();
    let grid = PixelGrid::new(width, height, colors).expect("valid two-tone grid");

    let w = width as usize;
    let foreground = (0..height as usize).map(|y| y * w).collect();
    let background = (0..height as usize).map(|y| y * w + w - 1).collect();
    (grid, foreground, background)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_test_rgb_image_with_valid_input_creates_image() {
        let image = create_test_rgb_image();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(0, 0), &Rgb([200, 150, 100]));
        assert_eq!(image.get_pixel(1, 1), &Rgb([50, 75, 25]));
    }

    #[test]
    fn gaussian_blobs_interleave_centres() {
        let samples = gaussian_blobs(&[[0.0; 3], [100.0; 3]], 5, 1.0, 42);
        assert_eq!(samples.len(), 10);
        assert!(samples.iter().step_by(2).all(|s| s.iter().all(|c| c.abs() <= 1.0)));
        assert!(samples
            .iter()
            .skip(1)
            .step_by(2)
            .all(|s| s.iter().all(|c| (c - 100.0).abs() <= 1.0)));
        assert_eq!(samples, gaussian_blobs(&[[0.0; 3], [100.0; 3]], 5, 1.0, 42));
    }

    #[test]
    fn two_tone_grid_seeds_opposite_columns() {
        let (grid, foreground, background) = two_tone_grid(4, 3, 1);
        assert_eq!(grid.dimensions(), (4, 3));
        assert_eq!(foreground, vec![0, 4, 8]);
        assert_eq!(background, vec![3, 7, 11]);
        assert!(grid.color(0)[0] > 200.0);
        assert!(grid.color(3)[2] > 200.0);
    }
}

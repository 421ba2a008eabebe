//! Binary segmentation masks.
//!
//! A [`Mask`] stores one byte per pixel, row-major: [`FOREGROUND`] or
//! [`BACKGROUND`]. [`ApplyMask`] turns a mask into the alpha channel of an
//! RGBA cutout.

use crate::error::GrabCutError;
use crate::utils::validate_matching_dimensions;
use crate::Image;
use image::{GenericImageView, Luma, Rgb, Rgba};
use imageproc::map::map_colors2;

/// Mask value of a foreground pixel
pub const FOREGROUND: u8 = 1;

/// Mask value of a background pixel
pub const BACKGROUND: u8 = 0;

/// Binary foreground/background labelling of an image
///
/// One entry per pixel in row-major order, `1` for foreground and `0` for
/// background. A mask is replaced as a whole between refinement passes,
/// never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mask {
    width: u32,
    height: u32,
    labels: Vec<u8>,
}

impl Mask {
    /// All-background mask
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            labels: vec![BACKGROUND; width as usize * height as usize],
        }
    }

    /// Wraps existing labels; every non-zero value counts as foreground
    ///
    /// # Errors
    ///
    /// * `GrabCutError::MaskLengthMismatch` - If `labels.len() != width * height`
    pub fn from_labels(width: u32, height: u32, mut labels: Vec<u8>) -> Result<Self, GrabCutError> {
        let expected = width as usize * height as usize;
        if labels.len() != expected {
            return Err(GrabCutError::MaskLengthMismatch {
                expected,
                actual: labels.len(),
            });
        }
        labels
            .iter_mut()
            .filter(|label| **label != BACKGROUND)
            .for_each(|label| *label = FOREGROUND);
        Ok(Self {
            width,
            height,
            labels,
        })
    }

    /// Marks the given pixel indices as foreground
    pub(crate) fn from_foreground(
        width: u32,
        height: u32,
        foreground: impl IntoIterator<Item = usize>,
    ) -> Self {
        let mut mask = Self::new(width, height);
        for index in foreground {
            if let Some(label) = mask.labels.get_mut(index) {
                *label = FOREGROUND;
            }
        }
        mask
    }

    #[inline]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.labels
    }

    #[inline]
    pub fn into_vec(self) -> Vec<u8> {
        self.labels
    }

    #[inline]
    pub fn is_foreground(&self, index: usize) -> bool {
        self.labels[index] == FOREGROUND
    }

    pub fn foreground_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == FOREGROUND).count()
    }

    pub fn foreground_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == FOREGROUND)
            .map(|(index, _)| index)
    }

    /// Number of pixels labelled differently in `other`
    ///
    /// # Errors
    ///
    /// * `GrabCutError::MaskLengthMismatch` - If the masks differ in length
    pub fn changed_pixels(&self, other: &Self) -> Result<usize, GrabCutError> {
        if self.len() != other.len() {
            return Err(GrabCutError::MaskLengthMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }
        Ok(self
            .labels
            .iter()
            .zip(&other.labels)
            .filter(|(a, b)| a != b)
            .count())
    }

    /// Grayscale rendering: 255 for foreground, 0 for background
    pub fn to_luma(&self) -> Image<Luma<u8>> {
        Image::from_fn(self.width, self.height, |x, y| {
            let index = y as usize * self.width as usize + x as usize;
            Luma([if self.labels[index] == FOREGROUND { u8::MAX } else { 0 }])
        })
    }
}

/// Cuts the foreground out of an image using a segmentation mask
///
/// Foreground pixels become fully opaque and background pixels fully
/// transparent. Colour channels are preserved.
pub trait ApplyMask {
    /// Applies `mask` as the alpha channel
    ///
    /// This consumes the original image.
    ///
    /// # Errors
    ///
    /// * `GrabCutError::DimensionMismatch` - When image and mask dimensions don't match
    ///
    /// # Examples
    ///
    /// ```rust
    /// use imageops_grabcut::{ApplyMask, Image, Mask};
    /// use image::{Rgb, Rgba};
    ///
    /// let image: Image<Rgb<u8>> = Image::from_pixel(2, 1, Rgb([10, 20, 30]));
    /// let mask = Mask::from_labels(2, 1, vec![1, 0]).unwrap();
    ///
    /// let cutout = image.apply_mask(&mask).unwrap();
    /// assert_eq!(cutout.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    /// assert_eq!(cutout.get_pixel(1, 0), &Rgba([10, 20, 30, 0]));
    /// ```
    fn apply_mask(self, mask: &Mask) -> Result<Image<Rgba<u8>>, GrabCutError>;
}

impl ApplyMask for Image<Rgb<u8>> {
    fn apply_mask(self, mask: &Mask) -> Result<Image<Rgba<u8>>, GrabCutError> {
        validate_dimensions(&self, mask)?;

        let result = map_colors2(&self, &mask.to_luma(), |Rgb([red, green, blue]), Luma([alpha])| {
            Rgba([red, green, blue, alpha])
        });

        Ok(result)
    }
}

impl ApplyMask for Image<Rgba<u8>> {
    fn apply_mask(mut self, mask: &Mask) -> Result<Image<Rgba<u8>>, GrabCutError> {
        validate_dimensions(&self, mask)?;

        self.pixels_mut()
            .zip(mask.as_slice())
            .for_each(|(pixel, &label)| {
                pixel.0[3] = if label == FOREGROUND { u8::MAX } else { 0 };
            });

        Ok(self)
    }
}

#[inline]
fn validate_dimensions<I: GenericImageView>(image: &I, mask: &Mask) -> Result<(), GrabCutError> {
    validate_matching_dimensions(image.dimensions(), mask.dimensions())
}

//! Internal utility functions for imageops-grabcut.
//!
//! This module contains validation and conversion helpers shared by the
//! segmentation operations.

use crate::error::GrabCutError;
use image::Primitive;
use imageproc::definitions::Clamp;

/// Clamps a floating-point value to the range of a primitive type.
///
/// # Arguments
///
/// * `value` - The floating-point value to clamp
///
/// # Returns
///
/// The clamped value as the target primitive type
#[inline]
pub fn clamp_f32_to_primitive<T: Primitive + Clamp<f32>>(value: f32) -> T {
    T::clamp(value)
}

/// Validates that an image has non-zero dimensions.
///
/// # Errors
///
/// * `GrabCutError::EmptyImage` - If either dimension is zero
pub fn validate_non_empty_image(width: u32, height: u32) -> Result<(), GrabCutError> {
    if width == 0 || height == 0 {
        Err(GrabCutError::EmptyImage { width, height })
    } else {
        Ok(())
    }
}

/// Validates that an image or mask has the `expected` `(width, height)`.
///
/// # Errors
///
/// * `GrabCutError::DimensionMismatch` - If the dimensions differ
pub fn validate_matching_dimensions(
    expected: (u32, u32),
    actual: (u32, u32),
) -> Result<(), GrabCutError> {
    if expected == actual {
        Ok(())
    } else {
        Err(GrabCutError::DimensionMismatch { expected, actual })
    }
}

/// Validates that a flat buffer holds exactly `width * height * channels` entries.
///
/// # Errors
///
/// * `GrabCutError::BufferSizeMismatch` - If the length differs
pub fn validate_buffer_len(
    len: usize,
    width: u32,
    height: u32,
    channels: usize,
) -> Result<(), GrabCutError> {
    let expected = width as usize * height as usize * channels;
    if len == expected {
        Ok(())
    } else {
        Err(GrabCutError::BufferSizeMismatch {
            expected,
            actual: len,
        })
    }
}

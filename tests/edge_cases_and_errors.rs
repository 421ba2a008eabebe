//! Edge case and error condition tests
//!
//! This test suite focuses on rejected inputs, degenerate data and the
//! smallest images the segmentation pipeline accepts.

use image::{Rgb, Rgba};
use imageops_grabcut::{
    min_cut, ApplyMask, CapacityMatrix, ErrorCategory, GaussianMixture, GmmConfig, GmmError,
    GrabCut, GrabCutConfig, GrabCutError, GrabCutExt, Image, Mask, MinCutError, PixelGrid, Trimap,
};

/// Helper to create minimal 1x1 image
fn create_minimal_rgb_image() -> Image<Rgb<u8>> {
    let mut image: Image<Rgb<u8>> = Image::new(1, 1);
    image.put_pixel(0, 0, Rgb([128, 128, 128]));
    image
}

#[test]
fn test_minimum_image_size_segmentation() {
    let image = create_minimal_rgb_image();

    let forced_foreground = image.grabcut(&[0], &[]).unwrap();
    assert_eq!(forced_foreground.mask().as_slice(), &[1]);

    let forced_background = image.grabcut(&[], &[0]).unwrap();
    assert_eq!(forced_background.mask().as_slice(), &[0]);

    // An unconstrained pixel leaves the background class empty.
    let unconstrained = image.grabcut(&[], &[]).unwrap_err();
    assert!(matches!(unconstrained, GrabCutError::Model(_)));
}

#[test]
fn test_too_few_pixels_for_the_component_count() {
    let image: Image<Rgb<u8>> =
        Image::from_fn(3, 3, |x, y| Rgb([(x * 80) as u8, (y * 80) as u8, 120]));
    let grabcut = GrabCut::new(GrabCutConfig {
        gmm: GmmConfig {
            seed: Some(3),
            ..GrabCutConfig::default().gmm
        },
        ..GrabCutConfig::default()
    })
    .unwrap();

    let error = image.grabcut_with(&grabcut, &[0], &[8]).unwrap_err();
    assert!(matches!(error, GrabCutError::Model(_)));
    assert_eq!(error.category(), ErrorCategory::DegenerateModel);
}

#[test]
fn test_single_row_and_column_images() {
    let row: Image<Rgb<u8>> = Image::from_fn(5, 1, |x, _| {
        if x < 2 {
            Rgb([250, 10, 10])
        } else {
            Rgb([10, 10, 250])
        }
    });
    let segmentation = row.grabcut(&[0, 1], &[2, 3, 4]).unwrap();
    assert_eq!(segmentation.mask().as_slice(), &[1, 1, 0, 0, 0]);

    let column: Image<Rgb<u8>> = Image::from_fn(1, 4, |_, y| {
        if y == 0 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    });
    let segmentation = column.grabcut(&[0], &[1, 2, 3]).unwrap();
    assert_eq!(segmentation.mask().dimensions(), (1, 4));
    assert_eq!(segmentation.mask().as_slice(), &[1, 0, 0, 0]);
}

#[test]
fn test_empty_image_rejected() {
    let image: Image<Rgb<u8>> = Image::new(0, 0);
    assert_eq!(
        image.grabcut(&[], &[]).unwrap_err(),
        GrabCutError::EmptyImage {
            width: 0,
            height: 0
        }
    );

    let result = GrabCut::default().segment_rgba(3, 0, &[], &[], &[]);
    assert!(matches!(result, Err(GrabCutError::EmptyImage { .. })));
}

#[test]
fn test_rgba_buffer_length_mismatch() {
    let result = GrabCut::default().segment_rgba(2, 2, &[0; 12], &[0], &[3]);
    assert_eq!(
        result.unwrap_err(),
        GrabCutError::BufferSizeMismatch {
            expected: 16,
            actual: 12
        }
    );
}

#[test]
fn test_constraint_errors() {
    let image: Image<Rgba<u8>> = Image::from_pixel(2, 2, Rgba([1, 2, 3, 255]));

    let out_of_range = image.grabcut(&[0], &[4]).unwrap_err();
    assert_eq!(
        out_of_range,
        GrabCutError::IndexOutOfRange {
            index: 4,
            pixel_count: 4
        }
    );
    assert_eq!(out_of_range.category(), ErrorCategory::InvalidInput);

    let conflicting = image.grabcut(&[0, 1], &[1]).unwrap_err();
    assert_eq!(conflicting, GrabCutError::ConflictingConstraint { index: 1 });
}

#[test]
fn test_trimap_must_match_grid() {
    let grid = PixelGrid::new(2, 2, vec![[0.0; 3]; 4]).unwrap();
    let trimap = Trimap::new(5, &[0], &[4]).unwrap();
    assert_eq!(
        GrabCut::default().segment(&grid, &trimap).unwrap_err(),
        GrabCutError::MaskLengthMismatch {
            expected: 4,
            actual: 5
        }
    );
}

#[test]
fn test_invalid_configurations() {
    let zero_iterations = GrabCutConfig {
        max_iterations: 0,
        ..GrabCutConfig::default()
    };
    assert!(matches!(
        GrabCut::new(zero_iterations),
        Err(GrabCutError::InvalidParameter {
            name: "max_iterations",
            ..
        })
    ));

    let negative_regularization = GrabCutConfig {
        gmm: GmmConfig {
            regularization: -1.0,
            ..GmmConfig::default()
        },
        ..GrabCutConfig::default()
    };
    let error = GrabCut::new(negative_regularization).unwrap_err();
    assert_eq!(error.category(), ErrorCategory::InvalidInput);

    let nan_tolerance = GaussianMixture::new(2)
        .unwrap()
        .with_tolerance(f64::NAN)
        .fit(&[[0.0, 0.0], [1.0, 1.0]])
        .unwrap_err();
    assert!(matches!(
        nan_tolerance,
        GmmError::InvalidParameter {
            name: "tolerance",
            ..
        }
    ));
}

#[test]
fn test_degenerate_mixture_errors() {
    let one_sample = GaussianMixture::new(1)
        .unwrap()
        .fit(&[[4.0, 5.0, 6.0]])
        .unwrap_err();
    assert_eq!(
        one_sample,
        GmmError::InsufficientSamples {
            component: 0,
            samples: 1
        }
    );
    assert_eq!(one_sample.category(), ErrorCategory::DegenerateModel);

    let collinear = vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
    let singular = GaussianMixture::new(1).unwrap().fit(&collinear).unwrap_err();
    assert_eq!(singular, GmmError::SingularCovariance { component: 0 });
}

#[test]
fn test_flat_image_without_regularization_reports_degenerate_model() {
    let grid = PixelGrid::new(3, 3, vec![[90.0, 90.0, 90.0]; 9]).unwrap();
    let trimap = Trimap::new(9, &[0, 1, 2], &[6, 7, 8]).unwrap();
    let grabcut = GrabCut::new(GrabCutConfig {
        components: 1,
        gmm: GmmConfig {
            seed: Some(1),
            ..GmmConfig::default()
        },
        ..GrabCutConfig::default()
    })
    .unwrap();

    let error = grabcut.segment(&grid, &trimap).unwrap_err();
    assert!(matches!(
        error,
        GrabCutError::Model(GmmError::SingularCovariance { .. })
    ));
    assert_eq!(error.category(), ErrorCategory::DegenerateModel);
}

#[test]
fn test_flat_image_with_default_regularization_segments() {
    let grid = PixelGrid::new(3, 3, vec![[90.0, 90.0, 90.0]; 9]).unwrap();
    let trimap = Trimap::new(9, &[0, 1, 2], &[6, 7, 8]).unwrap();

    let grabcut = GrabCut::new(GrabCutConfig {
        components: 1,
        ..GrabCutConfig::default()
    })
    .unwrap();

    let segmentation = grabcut.segment(&grid, &trimap).unwrap();
    let mask = segmentation.mask();
    assert!((0..3).all(|i| mask.is_foreground(i)));
    assert!((6..9).all(|i| !mask.is_foreground(i)));
}

#[test]
fn test_min_cut_rejects_malformed_networks() {
    let ragged: Vec<Vec<i64>> = vec![vec![0, 1, 0], vec![0, 0, 1]];
    assert!(matches!(
        CapacityMatrix::from_dense(&ragged),
        Err(MinCutError::NotSquare { .. })
    ));

    let capacities = CapacityMatrix::from_dense(&[[0, 5], [0, 0]]).unwrap();
    assert_eq!(
        min_cut(&capacities, 0, 0).unwrap_err(),
        MinCutError::SourceIsSink { node: 0 }
    );
    assert_eq!(
        min_cut(&capacities, 3, 1).unwrap_err(),
        MinCutError::NodeOutOfRange {
            node: 3,
            node_count: 2
        }
    );
}

#[test]
fn test_min_cut_without_edges() {
    let capacities = CapacityMatrix::new(3);
    let cut = min_cut(&capacities, 0, 2).unwrap();
    assert_eq!(cut.max_flow, 0);
    assert_eq!(cut.source_side, vec![0]);
    assert_eq!(cut.sink_side, vec![1, 2]);
}

#[test]
fn test_apply_mask_dimension_mismatch() {
    let image: Image<Rgb<u8>> = Image::new(4, 4);
    let mask = Mask::new(4, 3);
    assert_eq!(
        image.apply_mask(&mask).unwrap_err(),
        GrabCutError::DimensionMismatch {
            expected: (4, 4),
            actual: (4, 3)
        }
    );
}

#[test]
fn test_refine_with_mask_of_other_size() {
    let grid = PixelGrid::new(3, 2, vec![[0.0; 3]; 6]).unwrap();
    let trimap = Trimap::new(6, &[0], &[5]).unwrap();
    let mask = Mask::new(2, 3);
    assert!(matches!(
        GrabCut::default().refine(&grid, &trimap, &mask),
        Err(GrabCutError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_extreme_colors_stay_finite() {
    let image: Image<Rgb<u8>> = Image::from_fn(4, 4, |x, y| {
        if (x + y) % 2 == 0 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    });
    let segmentation = image
        .grabcut_with(
            &GrabCut::new(GrabCutConfig {
                components: 1,
                gmm: GmmConfig {
                    seed: Some(9),
                    ..GrabCutConfig::default().gmm
                },
                ..GrabCutConfig::default()
            })
            .unwrap(),
            &[0, 1],
            &[14, 15],
        )
        .unwrap();
    let mask = segmentation.mask();
    assert!(mask.is_foreground(0) && mask.is_foreground(1));
    assert!(!mask.is_foreground(14) && !mask.is_foreground(15));
}

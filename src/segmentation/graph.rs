//! GrabCut graph construction.
//!
//! Node layout: node 0 is the source (foreground terminal), node 1 is the
//! sink (background terminal) and pixel `i` is node `i + 2`.
//!
//! * Data term: for an undetermined pixel, `source -> pixel` carries the
//!   pixel's cost under the background model and `pixel -> sink` its cost
//!   under the foreground model, each `-ln π_k + ½ ln det Σ_k + ½ (x-μ_k)ᵗ Σ_k⁻¹ (x-μ_k)`
//!   for the component `k` the model assigns to the pixel, scaled by
//!   [`DATA_TERM_SCALE`] and floored. Confirmed pixels get
//!   [`INFINITE_CAPACITY`] on their own terminal and nothing on the other.
//! * Smoothness term: every pixel links to each of its up to 8 grid
//!   neighbours with `floor(SMOOTHNESS_SCALE * |c_i - c_j|)`.

use crate::error::GrabCutError;
use crate::segmentation::gmm::MixtureModel;
use crate::segmentation::linalg;
use crate::segmentation::mincut::{Capacity, CapacityMatrix, INFINITE_CAPACITY};
use crate::utils::{validate_buffer_len, validate_non_empty_image};
use crate::Image;
use image::{Pixel, Rgb, Rgba};
use itertools::iproduct;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Source (foreground terminal) node index
pub const SOURCE: usize = 0;

/// Sink (background terminal) node index
pub const SINK: usize = 1;

/// Multiplier applied to data costs before flooring to integers
pub const DATA_TERM_SCALE: f64 = 10_000.0;

/// Multiplier applied to neighbour colour distances before flooring
pub const SMOOTHNESS_SCALE: f64 = 1_000.0;

/// Largest capacity a finite cost is allowed to reach
///
/// Keeps finite edges strictly below [`INFINITE_CAPACITY`].
pub const MAX_FINITE_CAPACITY: Capacity = INFINITE_CAPACITY / 4;

/// Flow network node of pixel `index`
#[inline]
pub const fn pixel_node(index: usize) -> usize {
    index + 2
}

/// RGB colour type used for every pixel sample
pub type Color = [f64; 3];

/// Row-major grid of pixel colours
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    colors: Vec<Color>,
}

impl PixelGrid {
    /// Creates a grid from colours listed row by row
    ///
    /// # Errors
    ///
    /// * `GrabCutError::EmptyImage` - If either dimension is zero
    /// * `GrabCutError::BufferSizeMismatch` - If `colors.len() != width * height`
    pub fn new(width: u32, height: u32, colors: Vec<Color>) -> Result<Self, GrabCutError> {
        validate_non_empty_image(width, height)?;
        validate_buffer_len(colors.len(), width, height, 1)?;
        Ok(Self {
            width,
            height,
            colors,
        })
    }

    /// Reads the RGB channels of a packed RGBA buffer, ignoring alpha
    ///
    /// # Errors
    ///
    /// * `GrabCutError::EmptyImage` - If either dimension is zero
    /// * `GrabCutError::BufferSizeMismatch` - If `rgba.len() != width * height * 4`
    pub fn from_raw_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self, GrabCutError> {
        validate_non_empty_image(width, height)?;
        validate_buffer_len(rgba.len(), width, height, 4)?;
        let colors = rgba
            .chunks_exact(4)
            .map(|px| [f64::from(px[0]), f64::from(px[1]), f64::from(px[2])])
            .collect();
        Self::new(width, height, colors)
    }

    pub fn from_rgba(image: &Image<Rgba<u8>>) -> Result<Self, GrabCutError> {
        Self::from_pixels(image.width(), image.height(), image.pixels().map(|pixel| pixel.to_rgb()))
    }

    pub fn from_rgb(image: &Image<Rgb<u8>>) -> Result<Self, GrabCutError> {
        Self::from_pixels(image.width(), image.height(), image.pixels().copied())
    }

    fn from_pixels(
        width: u32,
        height: u32,
        pixels: impl Iterator<Item = Rgb<u8>>,
    ) -> Result<Self, GrabCutError> {
        let colors = pixels
            .map(|Rgb([r, g, b])| [f64::from(r), f64::from(g), f64::from(b)])
            .collect();
        Self::new(width, height, colors)
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
        self.colors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[inline]
    pub fn color(&self, index: usize) -> &Color {
        &self.colors[index]
    }

    #[inline]
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    /// Indices of the up to 8 neighbours of pixel `index`, without wraparound
    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> {
        let width = self.width as i64;
        let height = self.height as i64;
        let x = index as i64 % width;
        let y = index as i64 / width;
        iproduct!(-1i64..=1, -1i64..=1)
            .filter(|&(dy, dx)| dy != 0 || dx != 0)
            .filter_map(move |(dy, dx)| {
                let (nx, ny) = (x + dx, y + dy);
                (0..width)
                    .contains(&nx)
                    .then_some(ny)
                    .filter(|ny| (0..height).contains(ny))
                    .map(|ny| (ny * width + nx) as usize)
            })
    }
}

/// Hard label of a pixel in the trimap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelLabel {
    /// Confirmed foreground
    Foreground,
    /// Confirmed background
    Background,
    /// Left to the models
    Unknown,
}

/// Per-pixel hard constraints built from two index lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trimap {
    labels: Vec<PixelLabel>,
}

impl Trimap {
    /// Builds the trimap for `pixel_count` pixels
    ///
    /// Duplicate indices within one list are accepted.
    ///
    /// # Errors
    ///
    /// * `GrabCutError::IndexOutOfRange` - If an index does not address a pixel
    /// * `GrabCutError::ConflictingConstraint` - If a pixel appears in both lists
    pub fn new(
        pixel_count: usize,
        foreground: &[usize],
        background: &[usize],
    ) -> Result<Self, GrabCutError> {
        let mut labels = vec![PixelLabel::Unknown; pixel_count];
        for (indices, label) in [
            (foreground, PixelLabel::Foreground),
            (background, PixelLabel::Background),
        ] {
            for &index in indices {
                let slot = labels.get_mut(index).ok_or(GrabCutError::IndexOutOfRange {
                    index,
                    pixel_count,
                })?;
                match *slot {
                    PixelLabel::Unknown => *slot = label,
                    existing if existing == label => {}
                    _ => return Err(GrabCutError::ConflictingConstraint { index }),
                }
            }
        }
        Ok(Self { labels })
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
    pub fn label(&self, index: usize) -> PixelLabel {
        self.labels[index]
    }

    #[inline]
    pub fn labels(&self) -> &[PixelLabel] {
        &self.labels
    }

    pub fn count(&self, label: PixelLabel) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    #[inline]
    pub fn unknown_count(&self) -> usize {
        self.count(PixelLabel::Unknown)
    }
}

/// Converts a non-negative cost into an integer capacity
///
/// Negative and NaN costs become zero; large costs clamp to
/// [`MAX_FINITE_CAPACITY`].
#[inline]
pub fn scaled_capacity(cost: f64, scale: f64) -> Capacity {
    let value = (cost * scale).floor();
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= MAX_FINITE_CAPACITY as f64 {
        MAX_FINITE_CAPACITY
    } else {
        value as Capacity
    }
}

/// Data cost of `color` under `model`, or zero without a model
fn data_capacity(model: Option<&MixtureModel>, color: &Color) -> Capacity {
    model.map_or(0, |model| {
        let component = &model.components()[model.assign(color)];
        scaled_capacity(component.negative_log_likelihood(color), DATA_TERM_SCALE)
    })
}

/// `(source -> pixel, pixel -> sink)` capacities of one pixel
fn terminal_capacities(
    label: PixelLabel,
    color: &Color,
    foreground: Option<&MixtureModel>,
    background: Option<&MixtureModel>,
) -> (Capacity, Capacity) {
    match label {
        PixelLabel::Foreground => (INFINITE_CAPACITY, 0),
        PixelLabel::Background => (0, INFINITE_CAPACITY),
        PixelLabel::Unknown => (
            data_capacity(background, color),
            data_capacity(foreground, color),
        ),
    }
}

fn smoothness_edges(grid: &PixelGrid, index: usize) -> Vec<(usize, Capacity)> {
    let color = grid.color(index);
    grid.neighbors(index)
        .map(|neighbor| {
            let distance = linalg::distance(color, grid.color(neighbor));
            (neighbor, scaled_capacity(distance, SMOOTHNESS_SCALE))
        })
        .collect()
}

/// Projects an image, two colour models and a trimap onto a flow network
///
/// A model may be `None` when no pixel is undetermined and it is never
/// consulted; the data edges that would use it then carry no capacity.
///
/// # Errors
///
/// * `GrabCutError::MaskLengthMismatch` - If the trimap does not cover the grid
pub fn build_graph(
    grid: &PixelGrid,
    foreground: Option<&MixtureModel>,
    background: Option<&MixtureModel>,
    trimap: &Trimap,
) -> Result<CapacityMatrix, GrabCutError> {
    if trimap.len() != grid.len() {
        return Err(GrabCutError::MaskLengthMismatch {
            expected: grid.len(),
            actual: trimap.len(),
        });
    }

    let pixel_terms = |index: usize| {
        let terminals = terminal_capacities(
            trimap.label(index),
            grid.color(index),
            foreground,
            background,
        );
        (terminals, smoothness_edges(grid, index))
    };

    #[cfg(feature = "rayon")]
    let terms: Vec<_> = (0..grid.len()).into_par_iter().map(pixel_terms).collect();
    #[cfg(not(feature = "rayon"))]
    let terms: Vec<_> = (0..grid.len()).map(pixel_terms).collect();

    let mut capacities = CapacityMatrix::new(grid.len() + 2);
    for (index, ((to_pixel, to_sink), neighbors)) in terms.into_iter().enumerate() {
        let node = pixel_node(index);
        capacities.set(SOURCE, node, to_pixel);
        capacities.set(node, SINK, to_sink);
        for (neighbor, capacity) in neighbors {
            capacities.set(node, pixel_node(neighbor), capacity);
        }
    }

    Ok(capacities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::gmm::GaussianComponent;
    use crate::segmentation::linalg::Matrix;

    fn grid(width: u32, height: u32) -> PixelGrid {
        let colors = (0..width * height)
            .map(|i| [f64::from(i), 0.0, 0.0])
            .collect();
        PixelGrid::new(width, height, colors).unwrap()
    }

    fn unit_model(mean: Color) -> MixtureModel {
        let component = GaussianComponent::new(mean.to_vec(), Matrix::identity(3), 1.0).unwrap();
        MixtureModel::new(vec![component]).unwrap()
    }

    #[test]
    fn neighbors_respect_borders() {
        let grid = grid(3, 3);
        let mut corner: Vec<_> = grid.neighbors(0).collect();
        corner.sort_unstable();
        assert_eq!(corner, vec![1, 3, 4]);

        let mut center: Vec<_> = grid.neighbors(4).collect();
        center.sort_unstable();
        assert_eq!(center, vec![0, 1, 2, 3, 5, 6, 7, 8]);

        let mut edge: Vec<_> = grid.neighbors(5).collect();
        edge.sort_unstable();
        assert_eq!(edge, vec![1, 2, 4, 7, 8]);
    }

    #[test]
    fn single_row_has_no_wraparound() {
        let grid = grid(4, 1);
        let mut last: Vec<_> = grid.neighbors(3).collect();
        last.sort_unstable();
        assert_eq!(last, vec![2]);
        assert_eq!(grid.neighbors(0).count(), 1);
    }

    #[test]
    fn pixel_grid_validates_dimensions() {
        assert_eq!(
            PixelGrid::new(0, 3, Vec::new()).unwrap_err(),
            GrabCutError::EmptyImage {
                width: 0,
                height: 3
            }
        );
        assert_eq!(
            PixelGrid::from_raw_rgba(2, 2, &[0; 15]).unwrap_err(),
            GrabCutError::BufferSizeMismatch {
                expected: 16,
                actual: 15
            }
        );
        let grid = PixelGrid::from_raw_rgba(1, 2, &[1, 2, 3, 255, 4, 5, 6, 0]).unwrap();
        assert_eq!(grid.colors(), &[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }

    #[test]
    fn trimap_validation() {
        assert_eq!(
            Trimap::new(4, &[0, 4], &[]).unwrap_err(),
            GrabCutError::IndexOutOfRange {
                index: 4,
                pixel_count: 4
            }
        );
        assert_eq!(
            Trimap::new(4, &[1, 2], &[2]).unwrap_err(),
            GrabCutError::ConflictingConstraint { index: 2 }
        );

        let trimap = Trimap::new(4, &[0, 0], &[3]).unwrap();
        assert_eq!(trimap.label(0), PixelLabel::Foreground);
        assert_eq!(trimap.label(3), PixelLabel::Background);
        assert_eq!(trimap.unknown_count(), 2);
    }

    #[test]
    fn scaled_capacity_floors_and_clamps() {
        assert_eq!(scaled_capacity(1.23456, DATA_TERM_SCALE), 12345);
        assert_eq!(scaled_capacity(-3.0, DATA_TERM_SCALE), 0);
        assert_eq!(scaled_capacity(f64::NAN, DATA_TERM_SCALE), 0);
        assert_eq!(scaled_capacity(f64::INFINITY, 1.0), MAX_FINITE_CAPACITY);
    }

    #[test]
    fn confirmed_pixels_get_infinite_terminal_edges() {
        let grid = grid(2, 1);
        let trimap = Trimap::new(2, &[0], &[1]).unwrap();
        let capacities = build_graph(&grid, None, None, &trimap).unwrap();

        assert_eq!(capacities.node_count(), 4);
        assert_eq!(capacities.get(SOURCE, pixel_node(0)), INFINITE_CAPACITY);
        assert_eq!(capacities.get(pixel_node(0), SINK), 0);
        assert_eq!(capacities.get(SOURCE, pixel_node(1)), 0);
        assert_eq!(capacities.get(pixel_node(1), SINK), INFINITE_CAPACITY);

        // Colours differ by 1 in red: floor(1000 * 1)
        assert_eq!(capacities.get(pixel_node(0), pixel_node(1)), 1000);
        assert_eq!(capacities.get(pixel_node(1), pixel_node(0)), 1000);
    }

    #[test]
    fn data_term_uses_the_opposite_model_per_terminal() {
        let grid = PixelGrid::new(1, 1, vec![[1.0, 0.0, 0.0]]).unwrap();
        let trimap = Trimap::new(1, &[], &[]).unwrap();
        let foreground = unit_model([1.0, 0.0, 0.0]);
        let background = unit_model([4.0, 0.0, 0.0]);
        let capacities = build_graph(&grid, Some(&foreground), Some(&background), &trimap).unwrap();

        // Under the background model: ½ * 3² = 4.5; under the foreground model: 0.
        assert_eq!(capacities.get(SOURCE, pixel_node(0)), 45_000);
        assert_eq!(capacities.get(pixel_node(0), SINK), 0);
        assert_eq!(capacities.edges().count(), 1);
    }

    #[test]
    fn large_grid_builds_with_one_terminal_edge_per_pixel() {
        let (width, height) = (400u32, 400u32);
        let colors = iproduct!(0..height, 0..width)
            .map(|(y, x)| [f64::from(x % 7), f64::from(y % 5), 0.0])
            .collect();
        let grid = PixelGrid::new(width, height, colors).unwrap();
        let index = |x: u32, y: u32| (y * width + x) as usize;
        let foreground: Vec<usize> = iproduct!(0..height, 0..width / 2)
            .map(|(y, x)| index(x, y))
            .collect();
        let background: Vec<usize> = iproduct!(0..height, width / 2..width)
            .map(|(y, x)| index(x, y))
            .collect();
        let trimap = Trimap::new(grid.len(), &foreground, &background).unwrap();

        let capacities = build_graph(&grid, None, None, &trimap).unwrap();
        assert_eq!(capacities.node_count(), grid.len() + 2);

        let from_source = capacities.edges().filter(|&(from, _, _)| from == SOURCE).count();
        let to_sink = capacities.edges().filter(|&(_, to, _)| to == SINK).count();
        assert_eq!(from_source, foreground.len());
        assert_eq!(to_sink, background.len());

        let last = pixel_node(grid.len() - 1);
        assert_eq!(capacities.get(SOURCE, pixel_node(0)), INFINITE_CAPACITY);
        assert_eq!(capacities.get(SOURCE, last), 0);
        assert_eq!(capacities.get(last, SINK), INFINITE_CAPACITY);
        // (0, 0) and (1, 0) differ by 1 in red.
        assert_eq!(capacities.get(pixel_node(0), pixel_node(1)), 1000);
    }

    #[test]
    fn trimap_must_cover_the_grid() {
        let grid = grid(2, 2);
        let trimap = Trimap::new(3, &[], &[]).unwrap();
        assert_eq!(
            build_graph(&grid, None, None, &trimap).unwrap_err(),
            GrabCutError::MaskLengthMismatch {
                expected: 4,
                actual: 3
            }
        );
    }
}

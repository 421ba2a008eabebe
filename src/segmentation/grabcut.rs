//! Iterative GrabCut refinement.
//!
//! Each pass fits one colour mixture to the current foreground pixels and one
//! to the current background pixels, builds the flow network, takes the
//! minimum cut and labels every pixel reachable from the source as
//! foreground. Passes repeat until the mask stops changing or the iteration
//! cap is hit.
//!
//! The first pass trains the foreground model on every pixel that is not
//! confirmed background and the background model on the confirmed
//! background. Later passes train on the previous mask.

use crate::error::GrabCutError;
use crate::segmentation::gmm::{GaussianMixture, GmmConfig, MixtureModel};
use crate::segmentation::graph::{build_graph, Color, PixelGrid, PixelLabel, Trimap, SINK, SOURCE};
use crate::segmentation::mask::{ApplyMask, Mask};
use crate::segmentation::mincut::min_cut;
use crate::utils::{clamp_f32_to_primitive, validate_matching_dimensions};
use crate::Image;
use image::{Rgb, Rgba};
use itertools::{Either, Itertools};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

/// Mixture components fitted per colour class
pub const DEFAULT_COMPONENTS: usize = 5;

/// Cap on refinement passes
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Covariance diagonal loading used by the driver's colour models
pub const DEFAULT_REGULARIZATION: f64 = 0.01;

/// Parameters of a segmentation run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrabCutConfig {
    /// Components per colour model
    pub components: usize,
    /// Maximum number of graph-cut passes
    pub max_iterations: usize,
    /// EM parameters shared by both colour models
    pub gmm: GmmConfig,
}

impl Default for GrabCutConfig {
    fn default() -> Self {
        Self {
            components: DEFAULT_COMPONENTS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            gmm: GmmConfig {
                regularization: DEFAULT_REGULARIZATION,
                ..GmmConfig::default()
            },
        }
    }
}

impl GrabCutConfig {
    /// Checks every field before any computation starts
    ///
    /// # Errors
    ///
    /// * `GrabCutError::InvalidParameter` - If `components` or `max_iterations` is zero
    /// * `GrabCutError::Model` - If the EM parameters are invalid
    pub fn validate(&self) -> Result<(), GrabCutError> {
        if self.components == 0 {
            return Err(GrabCutError::InvalidParameter {
                name: "components",
                message: "must be at least 1",
            });
        }
        if self.max_iterations == 0 {
            return Err(GrabCutError::InvalidParameter {
                name: "max_iterations",
                message: "must be at least 1",
            });
        }
        self.gmm.validate()?;
        Ok(())
    }
}

/// Outcome of a segmentation run
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    image: Image<Rgba<u8>>,
    mask: Mask,
    iterations: usize,
    converged: bool,
}

impl Segmentation {
    /// The input colours as an opaque RGBA image
    #[inline]
    pub const fn image(&self) -> &Image<Rgba<u8>> {
        &self.image
    }

    #[inline]
    pub const fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Number of graph-cut passes performed
    #[inline]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// `false` when the iteration cap stopped refinement
    #[inline]
    pub const fn converged(&self) -> bool {
        self.converged
    }

    /// The image with background pixels made transparent
    pub fn cutout(&self) -> Result<Image<Rgba<u8>>, GrabCutError> {
        self.image.clone().apply_mask(&self.mask)
    }

    pub fn into_parts(self) -> (Image<Rgba<u8>>, Mask) {
        (self.image, self.mask)
    }
}

/// GrabCut segmentation driver
///
/// # Examples
///
/// ```rust
/// use imageops_grabcut::{GrabCut, PixelGrid, Trimap};
///
/// let grid = PixelGrid::new(2, 2, vec![
///     [250.0, 10.0, 10.0], [245.0, 12.0, 9.0],
///     [10.0, 10.0, 240.0], [12.0, 8.0, 250.0],
/// ]).unwrap();
/// let trimap = Trimap::new(grid.len(), &[0, 1], &[2, 3]).unwrap();
///
/// let segmentation = GrabCut::default().segment(&grid, &trimap).unwrap();
/// assert_eq!(segmentation.mask().as_slice(), &[1, 1, 0, 0]);
/// assert!(segmentation.converged());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrabCut {
    config: GrabCutConfig,
}

impl GrabCut {
    /// Creates a driver after validating `config`
    pub fn new(config: GrabCutConfig) -> Result<Self, GrabCutError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub const fn config(&self) -> &GrabCutConfig {
        &self.config
    }

    /// Segments a packed RGBA buffer (4 bytes per pixel, row-major)
    ///
    /// # Errors
    ///
    /// * `GrabCutError::EmptyImage` / `GrabCutError::BufferSizeMismatch` - On a malformed buffer
    /// * `GrabCutError::IndexOutOfRange` / `GrabCutError::ConflictingConstraint` - On bad constraints
    /// * Any error from [`GrabCut::segment`]
    pub fn segment_rgba(
        &self,
        width: u32,
        height: u32,
        rgba: &[u8],
        foreground: &[usize],
        background: &[usize],
    ) -> Result<Segmentation, GrabCutError> {
        let grid = PixelGrid::from_raw_rgba(width, height, rgba)?;
        let trimap = Trimap::new(grid.len(), foreground, background)?;
        self.segment(&grid, &trimap)
    }

    /// Runs GrabCut from the trimap alone
    ///
    /// Uses the configured seed, or the thread RNG when none is set.
    pub fn segment(&self, grid: &PixelGrid, trimap: &Trimap) -> Result<Segmentation, GrabCutError> {
        match self.config.gmm.seed {
            Some(seed) => self.segment_with_rng(grid, trimap, &mut StdRng::seed_from_u64(seed)),
            None => self.segment_with_rng(grid, trimap, &mut rand::rng()),
        }
    }

    /// Runs GrabCut from the trimap alone, drawing EM initialisations from `rng`
    ///
    /// # Errors
    ///
    /// * `GrabCutError::MaskLengthMismatch` - If the trimap does not cover the grid
    /// * `GrabCutError::Model` - If a colour model degenerates, including a
    ///   class too small to give every component two pixels
    /// * `GrabCutError::Flow` - If the min-cut solver fails
    pub fn segment_with_rng<R: Rng + ?Sized>(
        &self,
        grid: &PixelGrid,
        trimap: &Trimap,
        rng: &mut R,
    ) -> Result<Segmentation, GrabCutError> {
        self.config.validate()?;
        ensure_trimap_covers(grid, trimap)?;

        let initial = self.solve(
            grid,
            trimap,
            |index| trimap.label(index) != PixelLabel::Background,
            rng,
        )?;
        self.refine_from(grid, trimap, initial, 1, rng)
    }

    /// Continues refinement from an existing mask
    ///
    /// Feeding back the mask of a converged run reproduces it unchanged
    /// after one pass when every pixel is constrained or `components` is 1.
    /// With more components the mixtures are refitted from a fresh random
    /// initialisation, so the models and the resulting mask may differ.
    pub fn refine(
        &self,
        grid: &PixelGrid,
        trimap: &Trimap,
        mask: &Mask,
    ) -> Result<Segmentation, GrabCutError> {
        match self.config.gmm.seed {
            Some(seed) => self.refine_with_rng(grid, trimap, mask, &mut StdRng::seed_from_u64(seed)),
            None => self.refine_with_rng(grid, trimap, mask, &mut rand::rng()),
        }
    }

    /// Continues refinement from an existing mask, drawing from `rng`
    ///
    /// # Errors
    ///
    /// * `GrabCutError::DimensionMismatch` - If the mask does not match the grid
    /// * Any error from [`GrabCut::segment_with_rng`]
    pub fn refine_with_rng<R: Rng + ?Sized>(
        &self,
        grid: &PixelGrid,
        trimap: &Trimap,
        mask: &Mask,
        rng: &mut R,
    ) -> Result<Segmentation, GrabCutError> {
        self.config.validate()?;
        ensure_trimap_covers(grid, trimap)?;
        validate_matching_dimensions(grid.dimensions(), mask.dimensions())?;
        self.refine_from(grid, trimap, mask.clone(), 0, rng)
    }

    fn refine_from<R: Rng + ?Sized>(
        &self,
        grid: &PixelGrid,
        trimap: &Trimap,
        mut mask: Mask,
        mut iterations: usize,
        rng: &mut R,
    ) -> Result<Segmentation, GrabCutError> {
        loop {
            if iterations >= self.config.max_iterations {
                warn!(
                    max_iterations = self.config.max_iterations,
                    "segmentation stopped at the iteration cap before converging"
                );
                return Ok(Self::finish(grid, mask, iterations, false));
            }

            let next = {
                let current = &mask;
                self.solve(grid, trimap, |index| current.is_foreground(index), rng)?
            };
            iterations += 1;

            let changed = next.changed_pixels(&mask)?;
            debug!(iteration = iterations, changed, "graph-cut pass");

            if changed == 0 {
                info!(
                    iterations,
                    foreground = next.foreground_count(),
                    "segmentation converged"
                );
                return Ok(Self::finish(grid, next, iterations, true));
            }
            mask = next;
        }
    }

    /// One pass: fit both models on the given partition, cut, relabel
    fn solve<R: Rng + ?Sized>(
        &self,
        grid: &PixelGrid,
        trimap: &Trimap,
        is_foreground: impl Fn(usize) -> bool,
        rng: &mut R,
    ) -> Result<Mask, GrabCutError> {
        // Confirmed pixels never consult a model.
        let (foreground, background) = if trimap.unknown_count() == 0 {
            (None, None)
        } else {
            let (fg_colors, bg_colors): (Vec<Color>, Vec<Color>) = grid
                .colors()
                .iter()
                .enumerate()
                .partition_map(|(index, &color)| {
                    if is_foreground(index) {
                        Either::Left(color)
                    } else {
                        Either::Right(color)
                    }
                });
            (
                Some(self.fit_class(&fg_colors, rng)?),
                Some(self.fit_class(&bg_colors, rng)?),
            )
        };

        let capacities = build_graph(grid, foreground.as_ref(), background.as_ref(), trimap)?;
        let cut = min_cut(&capacities, SOURCE, SINK)?;

        let foreground_pixels = cut
            .source_side
            .iter()
            .filter(|&&node| node > SINK)
            .map(|&node| node - 2);
        Ok(Mask::from_foreground(
            grid.width(),
            grid.height(),
            foreground_pixels,
        ))
    }

    /// Fits one colour class with exactly `components` Gaussians
    ///
    /// Any fitter failure aborts the call; no other component count is tried.
    fn fit_class<R: Rng + ?Sized>(
        &self,
        colors: &[Color],
        rng: &mut R,
    ) -> Result<MixtureModel, GrabCutError> {
        let fit = GaussianMixture::new(self.config.components)?
            .with_config(self.config.gmm)
            .fit_with_rng(colors, rng)?;
        debug!(
            pixels = colors.len(),
            em_iterations = fit.iterations,
            converged = fit.converged,
            "colour model fitted"
        );
        Ok(fit.model)
    }

    fn finish(grid: &PixelGrid, mask: Mask, iterations: usize, converged: bool) -> Segmentation {
        let image = Image::from_fn(grid.width(), grid.height(), |x, y| {
            let index = y as usize * grid.width() as usize + x as usize;
            let [r, g, b] = (*grid.color(index)).map(|c| clamp_f32_to_primitive::<u8>(c as f32));
            Rgba([r, g, b, u8::MAX])
        });
        Segmentation {
            image,
            mask,
            iterations,
            converged,
        }
    }
}

fn ensure_trimap_covers(grid: &PixelGrid, trimap: &Trimap) -> Result<(), GrabCutError> {
    if trimap.len() == grid.len() {
        Ok(())
    } else {
        Err(GrabCutError::MaskLengthMismatch {
            expected: grid.len(),
            actual: trimap.len(),
        })
    }
}

/// GrabCut as an image operation
///
/// # Examples
///
/// ```rust
/// use imageops_grabcut::{GrabCutExt, Image};
/// use image::Rgb;
///
/// let image: Image<Rgb<u8>> = Image::from_fn(3, 1, |x, _| {
///     if x == 0 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) }
/// });
/// let segmentation = image.grabcut(&[0], &[1, 2]).unwrap();
/// assert_eq!(segmentation.mask().as_slice(), &[1, 0, 0]);
/// ```
pub trait GrabCutExt {
    /// Colour samples of the image
    fn to_pixel_grid(&self) -> Result<PixelGrid, GrabCutError>;

    /// Segments with the default configuration
    fn grabcut(&self, foreground: &[usize], background: &[usize]) -> Result<Segmentation, GrabCutError> {
        self.grabcut_with(&GrabCut::default(), foreground, background)
    }

    /// Segments with a configured driver
    fn grabcut_with(
        &self,
        grabcut: &GrabCut,
        foreground: &[usize],
        background: &[usize],
    ) -> Result<Segmentation, GrabCutError> {
        let grid = self.to_pixel_grid()?;
        let trimap = Trimap::new(grid.len(), foreground, background)?;
        grabcut.segment(&grid, &trimap)
    }
}

impl GrabCutExt for Image<Rgba<u8>> {
    fn to_pixel_grid(&self) -> Result<PixelGrid, GrabCutError> {
        PixelGrid::from_rgba(self)
    }
}

impl GrabCutExt for Image<Rgb<u8>> {
    fn to_pixel_grid(&self) -> Result<PixelGrid, GrabCutError> {
        PixelGrid::from_rgb(self)
    }
}

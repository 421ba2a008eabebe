//! Multivariate Gaussian mixture models fitted by Expectation-Maximization.
//!
//! Densities are evaluated in log space and combined with log-sum-exp, so
//! samples far from every component still produce finite responsibilities
//! and log-likelihoods instead of `0 / 0`.
//!
//! # Algorithm
//!
//! 1. Every sample is assigned to one of `k` clusters by an independent
//!    uniform draw. Each cluster yields a mean, an unbiased covariance
//!    (divided by `n - 1`) and a weight `n_k / n`.
//! 2. E-step: responsibilities `γ_nk = π_k N(x_n | μ_k, Σ_k) / Σ_j π_j N(x_n | μ_j, Σ_j)`.
//! 3. M-step: `N_k = Σ_n γ_nk`, `μ_k' = Σ_n γ_nk x_n / N_k`,
//!    `Σ_k' = Σ_n γ_nk (x_n - μ_k)(x_n - μ_k)ᵗ / N_k` using the mean from
//!    the previous iteration, `π_k' = N_k / n`.
//! 4. Stop once the total log-likelihood moves by less than the tolerance,
//!    or when the iteration cap is reached.
//! 5. Every sample is hard-assigned to the component maximising `π_k N(x | μ_k, Σ_k)`.

use crate::error::GmmError;
use crate::segmentation::linalg::{self, Matrix};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Default convergence threshold on the absolute log-likelihood change
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Default cap on EM iterations
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// One weighted multivariate normal distribution
///
/// The inverse covariance and its log-determinant are computed once at
/// construction; a component can only exist with a positive-definite
/// covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianComponent {
    mean: Vec<f64>,
    covariance: Matrix,
    weight: f64,
    precision: Matrix,
    log_det: f64,
}

impl GaussianComponent {
    /// Creates a component, validating its covariance
    ///
    /// # Errors
    ///
    /// * `GmmError::DimensionMismatch` - If the covariance is not `D x D`
    /// * `GmmError::SingularCovariance` - If the covariance cannot be inverted
    ///   or its determinant is not positive
    /// * `GmmError::InvalidParameter` - If the weight is outside `(0, 1]`
    pub fn new(mean: Vec<f64>, covariance: Matrix, weight: f64) -> Result<Self, GmmError> {
        Self::with_index(mean, covariance, weight, 0)
    }

    fn with_index(
        mean: Vec<f64>,
        covariance: Matrix,
        weight: f64,
        component: usize,
    ) -> Result<Self, GmmError> {
        let dimension = mean.len();
        if covariance.rows() != dimension || covariance.cols() != dimension {
            return Err(GmmError::DimensionMismatch {
                index: component,
                expected: dimension,
                found: covariance.rows(),
            });
        }
        if !(weight > 0.0 && weight <= 1.0 + 1e-9) {
            return Err(GmmError::InvalidParameter {
                name: "weight",
                message: "must lie in (0, 1]",
            });
        }

        let det = covariance.determinant();
        if !(det > 0.0 && det.is_finite()) {
            return Err(GmmError::SingularCovariance { component });
        }
        let precision = covariance
            .inverse()
            .ok_or(GmmError::SingularCovariance { component })?;

        Ok(Self {
            mean,
            covariance,
            weight,
            precision,
            log_det: det.ln(),
        })
    }

    #[inline]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    #[inline]
    pub const fn covariance(&self) -> &Matrix {
        &self.covariance
    }

    #[inline]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// `(x - μ)ᵗ Σ⁻¹ (x - μ)`
    pub fn mahalanobis_squared(&self, x: &[f64]) -> f64 {
        let delta = linalg::sub(x, &self.mean);
        self.precision.quadratic_form(&delta)
    }

    /// Natural log of the unweighted normal density at `x`
    pub fn log_density(&self, x: &[f64]) -> f64 {
        let d = self.dimension() as f64;
        -0.5 * (self.mahalanobis_squared(x) + d * (2.0 * PI).ln() + self.log_det)
    }

    /// Unweighted normal density `exp(-½ (x-μ)ᵗ Σ⁻¹ (x-μ)) / sqrt((2π)^D det Σ)`
    pub fn density(&self, x: &[f64]) -> f64 {
        self.log_density(x).exp()
    }

    /// Weighted negative log-likelihood without the `2π` constant
    ///
    /// `-ln π + ½ ln det Σ + ½ (x-μ)ᵗ Σ⁻¹ (x-μ)`, the GrabCut data cost.
    pub fn negative_log_likelihood(&self, x: &[f64]) -> f64 {
        -self.weight.ln() + 0.5 * self.log_det + 0.5 * self.mahalanobis_squared(x)
    }

    #[inline]
    fn log_weighted_density(&self, x: &[f64]) -> f64 {
        self.weight.ln() + self.log_density(x)
    }
}

/// An ordered set of weighted Gaussian components
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureModel {
    components: Vec<GaussianComponent>,
}

impl MixtureModel {
    /// Wraps already-validated components
    ///
    /// # Errors
    ///
    /// * `GmmError::InvalidComponentCount` - If `components` is empty
    /// * `GmmError::DimensionMismatch` - If components disagree in dimension
    pub fn new(components: Vec<GaussianComponent>) -> Result<Self, GmmError> {
        let first = components
            .first()
            .ok_or(GmmError::InvalidComponentCount { components: 0 })?;
        let expected = first.dimension();
        if let Some((index, component)) = components
            .iter()
            .enumerate()
            .find(|(_, c)| c.dimension() != expected)
        {
            return Err(GmmError::DimensionMismatch {
                index,
                expected,
                found: component.dimension(),
            });
        }
        Ok(Self { components })
    }

    #[inline]
    pub fn components(&self) -> &[GaussianComponent] {
        &self.components
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.components[0].dimension()
    }

    /// `ln Σ_k π_k N(x | μ_k, Σ_k)`
    pub fn log_density(&self, x: &[f64]) -> f64 {
        let terms: Vec<f64> = self
            .components
            .iter()
            .map(|c| c.log_weighted_density(x))
            .collect();
        log_sum_exp(&terms)
    }

    /// `Σ_k π_k N(x | μ_k, Σ_k)`
    pub fn density(&self, x: &[f64]) -> f64 {
        self.log_density(x).exp()
    }

    /// Total log-likelihood of a sample set
    pub fn log_likelihood<S: AsRef<[f64]>>(&self, samples: &[S]) -> f64 {
        samples.iter().map(|s| self.log_density(s.as_ref())).sum()
    }

    /// Posterior probability of each component for `x`
    pub fn responsibilities(&self, x: &[f64]) -> Vec<f64> {
        let terms: Vec<f64> = self
            .components
            .iter()
            .map(|c| c.log_weighted_density(x))
            .collect();
        let total = log_sum_exp(&terms);
        terms.iter().map(|t| (t - total).exp()).collect()
    }

    /// Index of the component with the highest weighted density
    ///
    /// Ties go to the lowest index.
    pub fn assign(&self, x: &[f64]) -> usize {
        let mut best = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (index, component) in self.components.iter().enumerate() {
            let value = component.log_weighted_density(x);
            if value > best_value {
                best = index;
                best_value = value;
            }
        }
        best
    }
}

fn log_sum_exp(terms: &[f64]) -> f64 {
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
}

/// Result of fitting a mixture
#[derive(Debug, Clone, PartialEq)]
pub struct GmmFit {
    /// Converged (or capped) mixture parameters
    pub model: MixtureModel,
    /// Hard component assignment per input sample
    pub cluster: Vec<usize>,
    /// Number of EM iterations performed
    pub iterations: usize,
    /// Whether the tolerance was met before the iteration cap
    pub converged: bool,
    /// Log-likelihood of the initial parameters followed by one entry per iteration
    pub log_likelihood_trace: Vec<f64>,
}

impl GmmFit {
    /// Log-likelihood of the returned parameters
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood_trace
            .last()
            .copied()
            .unwrap_or(f64::NEG_INFINITY)
    }
}

/// Fitting parameters shared by [`GaussianMixture`] and the segmentation driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GmmConfig {
    /// Stop when the log-likelihood changes by less than this
    pub tolerance: f64,
    /// Hard ceiling on EM iterations
    pub max_iterations: usize,
    /// Added to every covariance diagonal after estimation
    pub regularization: f64,
    /// Seed for the initial random assignment; `None` uses the thread RNG
    pub seed: Option<u64>,
}

impl Default for GmmConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            regularization: 0.0,
            seed: None,
        }
    }
}

impl GmmConfig {
    pub fn validate(&self) -> Result<(), GmmError> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(GmmError::InvalidParameter {
                name: "tolerance",
                message: "must be positive and finite",
            });
        }
        if self.max_iterations == 0 {
            return Err(GmmError::InvalidParameter {
                name: "max_iterations",
                message: "must be at least 1",
            });
        }
        if !(self.regularization >= 0.0 && self.regularization.is_finite()) {
            return Err(GmmError::InvalidParameter {
                name: "regularization",
                message: "must be non-negative and finite",
            });
        }
        Ok(())
    }
}

/// K-component Gaussian mixture fitter
///
/// # Examples
///
/// ```rust
/// use imageops_grabcut::GaussianMixture;
///
/// let samples: Vec<[f64; 2]> = (0..40)
///     .map(|i| {
///         let jitter = (i % 7) as f64 * 0.3;
///         if i % 2 == 0 { [jitter, 1.0 - jitter] } else { [10.0 + jitter, 10.0 - jitter] }
///     })
///     .collect();
///
/// let fit = GaussianMixture::new(1).unwrap().with_seed(7).fit(&samples).unwrap();
/// assert_eq!(fit.cluster.len(), samples.len());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    components: usize,
    config: GmmConfig,
}

impl GaussianMixture {
    /// Creates a fitter for `components` Gaussians with default parameters
    ///
    /// # Errors
    ///
    /// * `GmmError::InvalidComponentCount` - If `components` is zero
    pub fn new(components: usize) -> Result<Self, GmmError> {
        if components == 0 {
            return Err(GmmError::InvalidComponentCount { components });
        }
        Ok(Self {
            components,
            config: GmmConfig::default(),
        })
    }

    #[must_use]
    pub fn with_config(mut self, config: GmmConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.config.regularization = regularization;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    #[inline]
    pub const fn components(&self) -> usize {
        self.components
    }

    #[inline]
    pub const fn config(&self) -> &GmmConfig {
        &self.config
    }

    /// Fits the mixture using the configured seed, or the thread RNG
    ///
    /// # Errors
    ///
    /// See [`GaussianMixture::fit_with_rng`].
    pub fn fit<S: AsRef<[f64]>>(&self, samples: &[S]) -> Result<GmmFit, GmmError> {
        match self.config.seed {
            Some(seed) => self.fit_with_rng(samples, &mut StdRng::seed_from_u64(seed)),
            None => self.fit_with_rng(samples, &mut rand::rng()),
        }
    }

    /// Fits the mixture drawing the initial assignment from `rng`
    ///
    /// # Errors
    ///
    /// * `GmmError::EmptyInput` - If `samples` is empty
    /// * `GmmError::DimensionMismatch` - If samples differ in dimension
    /// * `GmmError::InvalidParameter` - If the configuration is invalid
    /// * `GmmError::EmptyComponent` / `GmmError::InsufficientSamples` - If a
    ///   cluster ends up with no samples or no responsibility mass
    /// * `GmmError::SingularCovariance` - If a covariance becomes singular
    pub fn fit_with_rng<S, R>(&self, samples: &[S], rng: &mut R) -> Result<GmmFit, GmmError>
    where
        S: AsRef<[f64]>,
        R: Rng + ?Sized,
    {
        self.config.validate()?;
        let dimension = validate_samples(samples)?;

        let assignment: Vec<usize> = samples
            .iter()
            .map(|_| rng.random_range(0..self.components))
            .collect();
        let mut model = self.initial_model(samples, &assignment, dimension)?;

        let mut previous = checked_likelihood(&model, samples)?;
        let mut trace = vec![previous];
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            model = self.expectation_maximization_step(samples, &model)?;
            iterations += 1;

            let current = checked_likelihood(&model, samples)?;
            trace.push(current);
            let delta = (current - previous).abs();
            debug!(iteration = iterations, log_likelihood = current, delta, "EM step");

            if delta < self.config.tolerance {
                converged = true;
                break;
            }
            previous = current;
        }

        if !converged {
            warn!(
                max_iterations = self.config.max_iterations,
                "EM stopped at the iteration cap before converging"
            );
        }

        let cluster = samples.iter().map(|s| model.assign(s.as_ref())).collect();

        Ok(GmmFit {
            model,
            cluster,
            iterations,
            converged,
            log_likelihood_trace: trace,
        })
    }

    fn initial_model<S: AsRef<[f64]>>(
        &self,
        samples: &[S],
        assignment: &[usize],
        dimension: usize,
    ) -> Result<MixtureModel, GmmError> {
        let total = samples.len() as f64;
        let components = (0..self.components)
            .map(|k| {
                let members: Vec<&[f64]> = samples
                    .iter()
                    .zip(assignment)
                    .filter(|(_, cluster)| **cluster == k)
                    .map(|(s, _)| s.as_ref())
                    .collect();

                match members.len() {
                    0 => return Err(GmmError::EmptyComponent { component: k }),
                    1 => {
                        return Err(GmmError::InsufficientSamples {
                            component: k,
                            samples: 1,
                        })
                    }
                    _ => {}
                }

                let mean = sample_mean(&members, dimension);
                let covariance = self.regularize(unbiased_covariance(&members, &mean));
                GaussianComponent::with_index(
                    mean,
                    covariance,
                    members.len() as f64 / total,
                    k,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        MixtureModel::new(components)
    }

    fn expectation_maximization_step<S: AsRef<[f64]>>(
        &self,
        samples: &[S],
        model: &MixtureModel,
    ) -> Result<MixtureModel, GmmError> {
        let responsibilities: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| model.responsibilities(s.as_ref()))
            .collect();

        let total = samples.len() as f64;
        let dimension = model.dimension();

        let components = model
            .components()
            .iter()
            .enumerate()
            .map(|(k, previous)| {
                let mass: f64 = responsibilities.iter().map(|gamma| gamma[k]).sum();
                if !(mass > 0.0 && mass.is_finite()) {
                    return Err(GmmError::EmptyComponent { component: k });
                }

                let mut mean = vec![0.0; dimension];
                let mut covariance = Matrix::zeros(dimension, dimension);
                for (sample, gamma) in samples.iter().zip(&responsibilities) {
                    let x = sample.as_ref();
                    let weight = gamma[k];
                    mean.iter_mut().zip(x).for_each(|(m, v)| *m += weight * v);

                    // Deviation from the previous iteration's mean.
                    let delta = linalg::sub(x, previous.mean());
                    covariance = covariance.add(&Matrix::outer(&delta, &delta).scale(weight));
                }

                let mean = linalg::scale(&mean, 1.0 / mass);
                let covariance = self.regularize(covariance.scale(1.0 / mass));
                GaussianComponent::with_index(mean, covariance, mass / total, k)
            })
            .collect::<Result<Vec<_>, _>>()?;

        MixtureModel::new(components)
    }

    fn regularize(&self, covariance: Matrix) -> Matrix {
        if self.config.regularization == 0.0 {
            return covariance;
        }
        let n = covariance.rows();
        covariance.add(&Matrix::identity(n).scale(self.config.regularization))
    }
}

fn validate_samples<S: AsRef<[f64]>>(samples: &[S]) -> Result<usize, GmmError> {
    let first = samples.first().ok_or(GmmError::EmptyInput)?;
    let expected = first.as_ref().len();
    if expected == 0 {
        return Err(GmmError::InvalidParameter {
            name: "samples",
            message: "must have at least one dimension",
        });
    }
    for (index, sample) in samples.iter().enumerate() {
        let found = sample.as_ref().len();
        if found != expected {
            return Err(GmmError::DimensionMismatch {
                index,
                expected,
                found,
            });
        }
    }
    Ok(expected)
}

fn checked_likelihood<S: AsRef<[f64]>>(
    model: &MixtureModel,
    samples: &[S],
) -> Result<f64, GmmError> {
    let value = model.log_likelihood(samples);
    if value.is_finite() {
        Ok(value)
    } else {
        Err(GmmError::NonFiniteLikelihood { value })
    }
}

fn sample_mean(members: &[&[f64]], dimension: usize) -> Vec<f64> {
    let mut mean = vec![0.0; dimension];
    for x in members {
        mean.iter_mut().zip(x.iter()).for_each(|(m, v)| *m += v);
    }
    linalg::scale(&mean, 1.0 / members.len() as f64)
}

/// Sample covariance divided by `n - 1`
fn unbiased_covariance(members: &[&[f64]], mean: &[f64]) -> Matrix {
    let dimension = mean.len();
    let mut covariance = Matrix::zeros(dimension, dimension);
    for x in members {
        let delta = linalg::sub(x, mean);
        covariance = covariance.add(&Matrix::outer(&delta, &delta));
    }
    covariance.scale(1.0 / (members.len() - 1) as f64)
}

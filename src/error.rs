use thiserror::Error;

/// Broad classification shared by every error in this crate
///
/// Callers that only need to decide between "fix the input", "the data
/// cannot be modelled" and "internal bug" can match on this instead of the
/// individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The request was rejected before any computation started
    InvalidInput,
    /// A colour model could not be estimated from the data
    DegenerateModel,
    /// The flow solver detected a broken residual invariant
    FlowInvariantViolation,
}

/// Error type for Gaussian mixture fitting
///
/// This error type covers parameter validation as well as the
/// degenerate states EM can reach on small or flat sample sets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GmmError {
    /// No samples were supplied
    #[error("Cannot fit a mixture to an empty sample set")]
    EmptyInput,

    /// The component count must be at least one
    #[error("Invalid component count: {components} (must be at least 1)")]
    InvalidComponentCount { components: usize },

    /// Samples do not share a single dimension
    ///
    /// The dimension is taken from the first sample.
    #[error("Sample {index} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// Invalid fitting parameter
    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter {
        name: &'static str,
        message: &'static str,
    },

    /// A component received no samples or no responsibility mass
    #[error("Component {component} is empty")]
    EmptyComponent { component: usize },

    /// A component holds too few samples for an unbiased covariance
    #[error("Component {component} has {samples} sample(s); at least 2 are required")]
    InsufficientSamples { component: usize, samples: usize },

    /// A covariance matrix is singular or not positive definite
    #[error("Covariance of component {component} is singular or not positive definite")]
    SingularCovariance { component: usize },

    /// The log-likelihood evaluated to NaN or infinity
    #[error("Log-likelihood is not finite: {value}")]
    NonFiniteLikelihood { value: f64 },
}

impl GmmError {
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyInput
            | Self::InvalidComponentCount { .. }
            | Self::DimensionMismatch { .. }
            | Self::InvalidParameter { .. } => ErrorCategory::InvalidInput,
            Self::EmptyComponent { .. }
            | Self::InsufficientSamples { .. }
            | Self::SingularCovariance { .. }
            | Self::NonFiniteLikelihood { .. } => ErrorCategory::DegenerateModel,
        }
    }
}

/// Error type for flow network construction and min-cut solving
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MinCutError {
    /// The capacity matrix has no nodes
    #[error("Flow network has no nodes")]
    EmptyNetwork,

    /// A dense capacity matrix row has the wrong length
    #[error("Capacity matrix is not square: row {row} has {len} entries, expected {expected}")]
    NotSquare {
        row: usize,
        len: usize,
        expected: usize,
    },

    /// Capacities must be non-negative integers
    #[error("Negative capacity {capacity} on edge ({from}, {to})")]
    NegativeCapacity {
        from: usize,
        to: usize,
        capacity: i64,
    },

    /// Source or sink index lies outside the network
    #[error("Node {node} is out of range for a network of {node_count} nodes")]
    NodeOutOfRange { node: usize, node_count: usize },

    /// Source and sink must be distinct nodes
    #[error("Source and sink are the same node ({node})")]
    SourceIsSink { node: usize },

    /// An augmentation would have driven a residual capacity below zero
    ///
    /// This indicates a construction bug, never an expected runtime state.
    #[error("Residual capacity of edge ({from}, {to}) would become {residual}")]
    NegativeResidual {
        from: usize,
        to: usize,
        residual: i64,
    },
}

impl MinCutError {
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NegativeResidual { .. } => ErrorCategory::FlowInvariantViolation,
            _ => ErrorCategory::InvalidInput,
        }
    }
}

/// Error type for the segmentation driver and its inputs
///
/// Model and solver failures are wrapped so that `?` carries them
/// through the driver unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GrabCutError {
    /// Image has a zero dimension
    #[error("Image dimensions must be non-zero, got {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    /// Raw pixel buffer length does not match the declared dimensions
    #[error("Pixel buffer has {actual} bytes, expected {expected} for the given dimensions")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// A constraint index does not address a pixel
    #[error("Constraint index {index} is out of range for {pixel_count} pixels")]
    IndexOutOfRange { index: usize, pixel_count: usize },

    /// A pixel was marked as both foreground and background
    #[error("Pixel {index} is constrained to both foreground and background")]
    ConflictingConstraint { index: usize },

    /// Two masks, or a mask and an image, disagree in size
    #[error("Mask has {actual} entries, expected {expected}")]
    MaskLengthMismatch { expected: usize, actual: usize },

    /// Mask and image dimensions do not match
    #[error("Image and mask dimensions do not match: expected {expected:?}, actual {actual:?}")]
    DimensionMismatch {
        /// Expected dimensions (width, height)
        expected: (u32, u32),
        /// Actual dimensions (width, height)
        actual: (u32, u32),
    },

    /// Invalid driver configuration
    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter {
        name: &'static str,
        message: &'static str,
    },

    /// Colour model fitting failed
    #[error(transparent)]
    Model(#[from] GmmError),

    /// Min-cut solving failed
    #[error(transparent)]
    Flow(#[from] MinCutError),
}

impl GrabCutError {
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Model(error) => error.category(),
            Self::Flow(error) => error.category(),
            _ => ErrorCategory::InvalidInput,
        }
    }
}

mod error;
pub mod segmentation;
#[cfg(test)]
mod test_utils;
mod utils;

pub use error::{ErrorCategory, GmmError, GrabCutError, MinCutError};
pub use imageproc::definitions::Image;
pub use segmentation::gmm::{GaussianComponent, GaussianMixture, GmmConfig, GmmFit, MixtureModel};
pub use segmentation::grabcut::{GrabCut, GrabCutConfig, GrabCutExt, Segmentation};
pub use segmentation::graph::{build_graph, Color, PixelGrid, PixelLabel, Trimap};
pub use segmentation::linalg::Matrix;
pub use segmentation::mask::{ApplyMask, Mask};
pub use segmentation::mincut::{min_cut, Capacity, CapacityMatrix, FlowNetwork, MinCut};

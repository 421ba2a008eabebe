//! GrabCut segmentation: colour models, flow network and the refinement loop.

pub mod gmm;
pub mod grabcut;
pub mod graph;
pub mod linalg;
pub mod mask;
pub mod mincut;

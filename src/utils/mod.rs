//! Voxel-level primitives shared by the reconciler
//!
//! - `threshold`: range threshold, binarize, scalar multiply, voxelwise add
//! - `morphology`: dilation, erosion and hole filling on binary masks

pub mod morphology;
pub mod threshold;

pub use morphology::{dilate, erode, fill_holes, Connectivity};
pub use threshold::{add, binarize, scale, threshold_range};

//! Chirality-Core: left/right label correction for infant brain segmentations
//!
//! An upstream segmenter occasionally swaps "Left-X" and "Right-X" labels.
//! This crate repairs them against a registered left/right/midline mask.
//!
//! # Modules
//! - `reconcile`: hole filling and conflict resolution of raw LR masks
//! - `correct`: per-voxel chirality correction of segmentation volumes
//! - `region_table`: id <-> region name lookup tables
//! - `chirality`: LR mask classes
//! - `volume`: flat 3D volumes with affine and header metadata
//! - `utils`: thresholding and binary morphology
//! - `pipeline`: file-level stages over explicit paths
//! - `nifti_io`: NIfTI-1 reading and writing

// Core types
pub mod error;
pub mod volume;
pub mod chirality;
pub mod region_table;

// Algorithm modules
pub mod utils;
pub mod reconcile;
pub mod correct;

// I/O modules
pub mod nifti_io;
pub mod pipeline;

pub use chirality::ChiralityCode;
pub use correct::{ChiralityCorrector, CorrectionParams, CorrectionReport};
pub use error::{ChiralityError, Result};
pub use reconcile::{MaskReconciler, ReconcileParams, ReconcileReport};
pub use region_table::{RegionTable, TableFormat};
pub use volume::{Dims, Volume, VolumeMeta};

//! Error types for mask reconciliation and chirality correction

use std::path::PathBuf;

use crate::volume::Dims;

/// Result type alias using ChiralityError
pub type Result<T> = std::result::Result<T, ChiralityError>;

/// Voxel coordinate (i, j, k) attached to label-space failures
pub type Voxel = (usize, usize, usize);

/// Errors raised by the reconciler, the corrector and their I/O boundary
#[derive(Debug, thiserror::Error)]
pub enum ChiralityError {
    /// Two volumes used together disagree on grid dimensions
    #[error("{what}: grid mismatch, expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Dims,
        found: Dims,
    },

    /// Voxel buffer length does not match the grid
    #[error("voxel buffer holds {found} values, grid needs {expected}")]
    DataLength { expected: usize, found: usize },

    /// Region table line that cannot be used
    #[error("malformed region table at line {line}: {reason}")]
    MalformedTable { line: usize, reason: String },

    /// Label id absent from the region table
    #[error("unknown region id {id}{}", at(.voxel))]
    UnknownId { id: i32, voxel: Option<Voxel> },

    /// Region name absent from the region table
    #[error("unknown region name '{name}'{}", at(.voxel))]
    UnknownName { name: String, voxel: Option<Voxel> },

    /// Mask voxel outside {0, 1, 2, 3}
    #[error("invalid chirality value {value} at voxel {voxel:?}")]
    InvalidChirality { voxel: Voxel, value: f64 },

    /// Segmentation voxel that is not an integer label
    #[error("invalid label value {value} at voxel {voxel:?}")]
    InvalidLabel { voxel: Voxel, value: f64 },

    /// Filesystem failure
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// NIfTI decode or encode failure
    #[error("NIfTI error: {0}")]
    Nifti(String),
}

fn at(voxel: &Option<Voxel>) -> String {
    match voxel {
        Some((i, j, k)) => format!(" at voxel ({}, {}, {})", i, j, k),
        None => String::new(),
    }
}

impl ChiralityError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ChiralityError::Io { path: path.into(), source }
    }

    /// Attach a voxel coordinate to a lookup failure raised without one
    pub(crate) fn at_voxel(self, voxel: Voxel) -> Self {
        match self {
            ChiralityError::UnknownId { id, voxel: None } => {
                ChiralityError::UnknownId { id, voxel: Some(voxel) }
            }
            ChiralityError::UnknownName { name, voxel: None } => {
                ChiralityError::UnknownName { name, voxel: Some(voxel) }
            }
            other => other,
        }
    }
}

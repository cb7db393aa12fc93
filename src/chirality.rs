//! Left/right/midline classes of an LR mask

use crate::error::{ChiralityError, Result};
use crate::volume::Volume;

/// Laterality class of one mask voxel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ChiralityCode {
    #[default]
    Unknown = 0,
    Left = 1,
    Right = 2,
    Bilateral = 3,
}

impl ChiralityCode {
    /// Classes that own a component in the reconciler, in re-tag order
    pub const CLASSES: [ChiralityCode; 3] =
        [ChiralityCode::Left, ChiralityCode::Right, ChiralityCode::Bilateral];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ChiralityCode::Unknown),
            1 => Some(ChiralityCode::Left),
            2 => Some(ChiralityCode::Right),
            3 => Some(ChiralityCode::Bilateral),
            _ => None,
        }
    }

    /// Exact conversion from a stored voxel value; fractional values are rejected
    pub fn from_value(value: f64) -> Option<Self> {
        if value.fract() != 0.0 || !(0.0..=3.0).contains(&value) {
            return None;
        }
        Self::from_u8(value as u8)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// True for LEFT and RIGHT, the only classes correction acts on
    pub fn is_lateral(self) -> bool {
        matches!(self, ChiralityCode::Left | ChiralityCode::Right)
    }
}

impl TryFrom<u8> for ChiralityCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        Self::from_u8(value).ok_or(value)
    }
}

impl From<ChiralityCode> for u8 {
    fn from(code: ChiralityCode) -> u8 {
        code.as_u8()
    }
}

/// Convert a raw intensity volume into a mask volume, failing on the first
/// voxel that is not one of the four classes
pub fn mask_from_values(raw: &Volume<f64>) -> Result<Volume<ChiralityCode>> {
    let dims = raw.dims();
    let codes = raw
        .data()
        .iter()
        .enumerate()
        .map(|(idx, &value)| {
            ChiralityCode::from_value(value).ok_or(ChiralityError::InvalidChirality {
                voxel: dims.coords(idx),
                value,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    raw.with_data(codes)
}

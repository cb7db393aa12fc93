//! Chirality correction of segmentation volumes
//!
//! Every voxel is decided on its own: a lateralized region ("Left-X" or
//! "Right-X") sitting in confidently LEFT or RIGHT mask territory is flipped to
//! its mirror region when its side disagrees with the mask. Everything else is
//! copied. A label missing from the table, or a flip target with no id, fails
//! the whole volume.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;

use crate::chirality::ChiralityCode;
use crate::error::{ChiralityError, Result};
use crate::region_table::RegionTable;
use crate::volume::Volume;

/// Region name prefixes that mark laterality
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrectionParams {
    pub left_prefix: String,
    pub right_prefix: String,
}

impl Default for CorrectionParams {
    fn default() -> Self {
        Self {
            left_prefix: "Left-".to_string(),
            right_prefix: "Right-".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// What correction changed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorrectionReport {
    pub flipped_voxels: usize,
    /// (original id, flipped id) -> voxel count
    pub flips: BTreeMap<(i32, i32), usize>,
}

/// Corrected segmentation plus its report
#[derive(Clone, Debug)]
pub struct Corrected {
    pub segmentation: Volume<i32>,
    pub report: CorrectionReport,
}

/// Convert stored voxel values into integer labels
pub fn labels_from_values(volume: &Volume<f64>) -> Result<Volume<i32>> {
    let dims = volume.dims();
    let labels = volume
        .data()
        .iter()
        .enumerate()
        .map(|(idx, &value)| {
            if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
                Ok(value as i32)
            } else {
                Err(ChiralityError::InvalidLabel { voxel: dims.coords(idx), value })
            }
        })
        .collect::<Result<Vec<_>>>()?;
    volume.with_data(labels)
}

/// Flips mislabeled lateral regions using a reconciled LR mask
pub struct ChiralityCorrector<'a> {
    table: &'a RegionTable,
    params: CorrectionParams,
}

impl<'a> ChiralityCorrector<'a> {
    pub fn new(table: &'a RegionTable, params: CorrectionParams) -> Self {
        Self { table, params }
    }

    fn side_of(&self, region: &str) -> Option<Side> {
        if region.starts_with(&self.params.left_prefix) {
            Some(Side::Left)
        } else if region.starts_with(&self.params.right_prefix) {
            Some(Side::Right)
        } else {
            None
        }
    }

    fn prefix(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.params.left_prefix,
            Side::Right => &self.params.right_prefix,
        }
    }

    /// Decide the output label of one voxel
    pub fn correct_voxel(&self, label: i32, chirality: ChiralityCode) -> Result<i32> {
        let region = self.table.name_of(label)?;

        let Some(side) = self.side_of(region) else {
            return Ok(label);
        };
        let expected = match chirality {
            ChiralityCode::Left => Side::Left,
            ChiralityCode::Right => Side::Right,
            ChiralityCode::Unknown | ChiralityCode::Bilateral => return Ok(label),
        };
        if side == expected {
            return Ok(label);
        }

        let stem = &region[self.prefix(side).len()..];
        let flipped = format!("{}{}", self.prefix(expected), stem);
        self.table.id_of(&flipped)
    }

    /// Correct a whole segmentation against a mask on the same grid
    ///
    /// The output keeps the segmentation's metadata. Nothing is returned
    /// unless every voxel resolves.
    pub fn correct(
        &self,
        segmentation: &Volume<i32>,
        mask: &Volume<ChiralityCode>,
    ) -> Result<Corrected> {
        segmentation.ensure_same_grid(mask, "segmentation vs LR mask")?;
        let start = Instant::now();
        let dims = segmentation.dims();
        let labels = segmentation.data();
        let codes = mask.data();

        let corrected: Vec<i32> = (0..dims.len())
            .into_par_iter()
            .map(|idx| {
                self.correct_voxel(labels[idx], codes[idx])
                    .map_err(|e| e.at_voxel(dims.coords(idx)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut report = CorrectionReport::default();
        for (&before, &after) in labels.iter().zip(corrected.iter()) {
            if before != after {
                report.flipped_voxels += 1;
                *report.flips.entry((before, after)).or_insert(0) += 1;
            }
        }

        for (&(from, to), &count) in &report.flips {
            log::debug!(
                "{} -> {}: {} voxels",
                self.table.name_of(from).unwrap_or("?"),
                self.table.name_of(to).unwrap_or("?"),
                count
            );
        }
        log::info!(
            "Corrected {} of {} voxels in {:.2?}",
            report.flipped_voxels,
            dims.len(),
            start.elapsed()
        );

        Ok(Corrected {
            segmentation: segmentation.with_data(corrected)?,
            report,
        })
    }
}

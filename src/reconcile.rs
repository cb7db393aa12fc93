//! LR mask reconciliation
//!
//! Turns a raw three-class left/right/midline mask into a hole-free mask:
//!
//! 1. Split the mask into one binary component per class (LEFT, RIGHT, BILATERAL)
//! 2. Close each component: dilate x3, fill enclosed holes, erode x1
//! 3. Re-tag each closed component with its class id and sum them
//! 4. Any voxel whose sum exceeds the conflict threshold (default 2) takes the
//!    value of the raw mask instead
//!
//! The closing is deliberately asymmetric, so components grow slightly. A sum
//! of 3 cannot tell a genuine BILATERAL voxel from a LEFT+RIGHT collision;
//! both defer to the raw mask.

use std::time::Instant;

use rayon::prelude::*;

use crate::chirality::ChiralityCode;
use crate::error::Result;
use crate::nifti_io::Datatype;
use crate::utils::{add, binarize, dilate, erode, fill_holes, scale, threshold_range, Connectivity};
use crate::volume::Volume;

/// Parameters for mask reconciliation
#[derive(Clone, Debug)]
pub struct ReconcileParams {
    /// Dilation passes before hole filling (default 3)
    pub dilate_passes: usize,
    /// Erosion passes after hole filling (default 1)
    pub erode_passes: usize,
    /// Structuring element for dilation and erosion (default 3x3x3 box)
    pub kernel: Connectivity,
    /// Connectivity of the exterior flood fill (default 6)
    pub fill_connectivity: Connectivity,
    /// Recombined sums above this value are conflicts (default 2, capped at 3)
    pub conflict_threshold: u8,
}

impl Default for ReconcileParams {
    fn default() -> Self {
        Self {
            dilate_passes: 3,
            erode_passes: 1,
            kernel: Connectivity::TwentySix,
            fill_connectivity: Connectivity::Six,
            conflict_threshold: 2,
        }
    }
}

/// Voxel counts gathered while reconciling
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Closed component size per class, in LEFT, RIGHT, BILATERAL order
    pub per_class_voxels: [usize; 3],
    /// Voxels that fell back to the raw mask
    pub conflicted_voxels: usize,
}

/// Reconciled mask plus its report
#[derive(Clone, Debug)]
pub struct Reconciled {
    pub mask: Volume<ChiralityCode>,
    pub report: ReconcileReport,
}

/// Hole-filling, conflict-resolving reconciler for raw LR masks
#[derive(Clone, Debug, Default)]
pub struct MaskReconciler {
    params: ReconcileParams,
}

impl MaskReconciler {
    pub fn new(params: ReconcileParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ReconcileParams {
        &self.params
    }

    /// Extract and close the binary component of `class`
    ///
    /// Every class is re-binarized after thresholding, so RIGHT (2) and
    /// BILATERAL (3) go through exactly the same closing as LEFT (1).
    pub fn closed_component(
        &self,
        raw: &[u8],
        nx: usize, ny: usize, nz: usize,
        class: ChiralityCode,
    ) -> Vec<u8> {
        let code = class.as_u8();
        let component = binarize(&threshold_range(raw, code, code));
        let dilated = dilate(&component, nx, ny, nz, self.params.kernel, self.params.dilate_passes);
        let filled = fill_holes(&dilated, nx, ny, nz, self.params.fill_connectivity);
        erode(&filled, nx, ny, nz, self.params.kernel, self.params.erode_passes)
    }

    /// Reconcile a raw mask into a new mask on the same grid
    ///
    /// The output keeps the raw mask's affine and voxel size; other header
    /// fields are reset and the datatype is UINT8.
    pub fn reconcile(&self, raw: &Volume<ChiralityCode>) -> Result<Reconciled> {
        let start = Instant::now();
        let (nx, ny, nz) = raw.dims().as_tuple();
        let raw_values: Vec<u8> = raw.data().iter().map(|c| c.as_u8()).collect();

        // Per-class pipelines are independent; collect() is the barrier
        let closed: Vec<Vec<u8>> = ChiralityCode::CLASSES
            .par_iter()
            .map(|&class| {
                let component = self.closed_component(&raw_values, nx, ny, nz, class);
                let tagged = scale(&component, class.as_u8());
                log::debug!(
                    "{:?} component: {} voxels after closing",
                    class,
                    component.iter().filter(|&&v| v != 0).count()
                );
                tagged
            })
            .collect();

        let mut report = ReconcileReport::default();
        for (slot, tagged) in report.per_class_voxels.iter_mut().zip(closed.iter()) {
            *slot = tagged.iter().filter(|&&v| v != 0).count();
        }

        let recombined = closed
            .iter()
            .skip(1)
            .fold(closed[0].clone(), |acc, tagged| add(&acc, tagged));

        let threshold = self.params.conflict_threshold.min(ChiralityCode::Bilateral.as_u8());
        let resolved: Vec<ChiralityCode> = recombined
            .iter()
            .zip(raw.data().iter())
            .map(|(&sum, &original)| {
                if sum > threshold {
                    original
                } else {
                    ChiralityCode::from_u8(sum).unwrap_or(original)
                }
            })
            .collect();
        report.conflicted_voxels = recombined.iter().filter(|&&sum| sum > threshold).count();

        let mask = raw
            .with_data(resolved)?
            .with_meta(raw.meta().spatial_only(Datatype::Uint8));

        log::info!(
            "Reconciled {}x{}x{} mask in {:.2?}: L/R/M components {:?}, {} conflicted voxels",
            nx, ny, nz,
            start.elapsed(),
            report.per_class_voxels,
            report.conflicted_voxels
        );

        Ok(Reconciled { mask, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Dims, VolumeMeta};

    fn mask_volume(
        n: usize,
        mut fill: impl FnMut(usize, usize, usize) -> ChiralityCode,
    ) -> Volume<ChiralityCode> {
        let dims = Dims::new(n, n, n);
        let data = (0..dims.len())
            .map(|idx| {
                let (i, j, k) = dims.coords(idx);
                fill(i, j, k)
            })
            .collect();
        Volume::new(data, dims, VolumeMeta::default()).unwrap()
    }

    fn in_cube(i: usize, j: usize, k: usize, lo: usize, hi: usize) -> bool {
        (lo..=hi).contains(&i) && (lo..=hi).contains(&j) && (lo..=hi).contains(&k)
    }

    fn count(mask: &Volume<ChiralityCode>, code: ChiralityCode) -> usize {
        mask.data().iter().filter(|&&c| c == code).count()
    }

    #[test]
    fn test_empty_mask_stays_empty() {
        let raw = mask_volume(6, |_, _, _| ChiralityCode::Unknown);
        let out = MaskReconciler::default().reconcile(&raw).unwrap();
        assert!(out.mask.data().iter().all(|&c| c == ChiralityCode::Unknown));
        assert_eq!(out.report, ReconcileReport::default());
    }

    #[test]
    fn test_enclosed_hole_is_filled() {
        // 3x3x3 LEFT cube with an UNKNOWN centre
        let raw = mask_volume(11, |i, j, k| {
            if (i, j, k) != (5, 5, 5) && in_cube(i, j, k, 4, 6) {
                ChiralityCode::Left
            } else {
                ChiralityCode::Unknown
            }
        });
        let out = MaskReconciler::default().reconcile(&raw).unwrap();

        assert_eq!(*out.mask.get(5, 5, 5), ChiralityCode::Left);
        // dilate x3 then erode x1 leaves a 7x7x7 cube
        assert_eq!(count(&out.mask, ChiralityCode::Left), 343);
        assert_eq!(out.report.per_class_voxels, [343, 0, 0]);
        assert_eq!(out.report.conflicted_voxels, 0);
    }

    #[test]
    fn test_interior_noise_closed_in_component() {
        // LEFT cube with one RIGHT voxel of noise at the centre
        let raw = mask_volume(11, |i, j, k| {
            if (i, j, k) == (5, 5, 5) {
                ChiralityCode::Right
            } else if in_cube(i, j, k, 4, 6) {
                ChiralityCode::Left
            } else {
                ChiralityCode::Unknown
            }
        });
        let reconciler = MaskReconciler::default();
        let raw_values: Vec<u8> = raw.data().iter().map(|c| c.as_u8()).collect();

        let left = reconciler.closed_component(&raw_values, 11, 11, 11, ChiralityCode::Left);
        assert_eq!(left[raw.dims().index(5, 5, 5)], 1, "closing should fill the LEFT hole");
    }

    #[test]
    fn test_conflict_falls_back_to_raw_value() {
        let raw = mask_volume(11, |i, j, k| {
            if (i, j, k) == (5, 5, 5) {
                ChiralityCode::Right
            } else if in_cube(i, j, k, 4, 6) {
                ChiralityCode::Left
            } else {
                ChiralityCode::Unknown
            }
        });
        let out = MaskReconciler::default().reconcile(&raw).unwrap();

        // LEFT and RIGHT both claim the centre (sum 3): raw value wins
        assert_eq!(*out.mask.get(5, 5, 5), ChiralityCode::Right);
        // Cube voxels claimed by both components keep their raw LEFT value
        assert_eq!(*out.mask.get(4, 4, 4), ChiralityCode::Left);
        // Overlap outside the raw cube falls back to raw UNKNOWN
        assert_eq!(*out.mask.get(3, 5, 5), ChiralityCode::Unknown);
        // Beyond the RIGHT component's reach only LEFT remains
        assert_eq!(*out.mask.get(2, 5, 5), ChiralityCode::Left);
        // RIGHT closes to 5x5x5, all of it overlapping LEFT
        assert_eq!(out.report.conflicted_voxels, 125);
    }

    #[test]
    fn test_bilateral_overlaps_fall_back_to_raw_value() {
        // LEFT, BILATERAL and RIGHT 3x3x3 cubes side by side along i.
        // Closed components: LEFT i 2..=8, BILATERAL 5..=11, RIGHT 8..=14,
        // all spanning j, k 4..=10.
        let raw = mask_volume(16, |i, j, k| {
            if (6..=8).contains(&j) && (6..=8).contains(&k) {
                match i {
                    4..=6 => ChiralityCode::Left,
                    7..=9 => ChiralityCode::Bilateral,
                    10..=12 => ChiralityCode::Right,
                    _ => ChiralityCode::Unknown,
                }
            } else {
                ChiralityCode::Unknown
            }
        });
        let out = MaskReconciler::default().reconcile(&raw).unwrap();

        // LEFT + BILATERAL = 4
        assert_eq!(*out.mask.get(5, 7, 7), ChiralityCode::Left);
        assert_eq!(*out.mask.get(7, 7, 7), ChiralityCode::Bilateral);
        assert_eq!(*out.mask.get(5, 4, 7), ChiralityCode::Unknown);
        // RIGHT + BILATERAL = 5
        assert_eq!(*out.mask.get(9, 7, 7), ChiralityCode::Bilateral);
        assert_eq!(*out.mask.get(10, 7, 7), ChiralityCode::Right);
        assert_eq!(*out.mask.get(11, 10, 7), ChiralityCode::Unknown);
        // All three = 6
        assert_eq!(*out.mask.get(8, 7, 7), ChiralityCode::Bilateral);
        assert_eq!(*out.mask.get(8, 4, 4), ChiralityCode::Unknown);
        // Single-class growth outside the overlap
        assert_eq!(*out.mask.get(3, 7, 7), ChiralityCode::Left);
        assert_eq!(*out.mask.get(13, 7, 7), ChiralityCode::Right);
        // Overlap slab i 5..=11 across the 7x7 closed cross-section
        assert_eq!(out.report.conflicted_voxels, 7 * 7 * 7);

        // Every voxel whose recombined sum exceeds 2 keeps its raw value
        let reconciler = MaskReconciler::default();
        let raw_values: Vec<u8> = raw.data().iter().map(|c| c.as_u8()).collect();
        let sums = ChiralityCode::CLASSES.iter().fold(vec![0u8; raw_values.len()], |acc, &class| {
            let closed = reconciler.closed_component(&raw_values, 16, 16, 16, class);
            add(&acc, &scale(&closed, class.as_u8()))
        });
        for (idx, &sum) in sums.iter().enumerate() {
            if sum > 2 {
                assert_eq!(out.mask.data()[idx], raw.data()[idx], "sum {} at {:?}", sum, raw.dims().coords(idx));
            }
        }
        assert!(sums.contains(&4) && sums.contains(&5) && sums.contains(&6));
    }

    #[test]
    fn test_bilateral_defers_to_raw_mask() {
        let raw = mask_volume(11, |i, j, k| {
            if (i, j, k) != (5, 5, 5) && in_cube(i, j, k, 4, 6) {
                ChiralityCode::Bilateral
            } else {
                ChiralityCode::Unknown
            }
        });
        let out = MaskReconciler::default().reconcile(&raw).unwrap();

        assert_eq!(count(&out.mask, ChiralityCode::Bilateral), 26);
        assert_eq!(*out.mask.get(5, 5, 5), ChiralityCode::Unknown);
        assert_eq!(*out.mask.get(2, 2, 2), ChiralityCode::Unknown);
    }

    #[test]
    fn test_adjacent_sides_keep_raw_boundary() {
        // LEFT for i < 5, RIGHT for i >= 5, inside a padded block
        let raw = mask_volume(12, |i, j, k| {
            if !in_cube(i, j, k, 2, 9) {
                ChiralityCode::Unknown
            } else if i < 5 {
                ChiralityCode::Left
            } else {
                ChiralityCode::Right
            }
        });
        let out = MaskReconciler::default().reconcile(&raw).unwrap();

        for k in 2..=9 {
            for j in 2..=9 {
                for i in 2..=9 {
                    assert_eq!(out.mask.get(i, j, k), raw.get(i, j, k), "voxel ({i}, {j}, {k})");
                }
            }
        }
        assert!(out.report.conflicted_voxels > 0);
    }

    #[test]
    fn test_values_closed_and_grid_kept() {
        // Scattered classes from a fixed LCG
        let mut state = 12345u32;
        let raw = mask_volume(10, |_, _, _| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            ChiralityCode::from_u8(((state >> 16) % 4) as u8).unwrap()
        });
        let out = MaskReconciler::default().reconcile(&raw).unwrap();

        assert_eq!(out.mask.dims(), raw.dims());
        assert!(out.mask.data().iter().all(|c| c.as_u8() <= 3));
        assert_eq!(out.mask.meta().datatype, Datatype::Uint8);
        assert_eq!(out.mask.meta().affine, raw.meta().affine);
    }
}

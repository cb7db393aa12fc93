//! File-level stages: raw mask -> reconciled mask -> corrected segmentation
//!
//! Every stage takes explicit input and output paths. Intermediate volumes
//! stay in memory, so no working directory is created or changed.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::chirality::{mask_from_values, ChiralityCode};
use crate::correct::{labels_from_values, ChiralityCorrector, CorrectionParams, CorrectionReport};
use crate::error::{ChiralityError, Result};
use crate::nifti_io::{read_volume, write_volume, Datatype};
use crate::reconcile::{MaskReconciler, ReconcileParams, ReconcileReport};
use crate::region_table::{RegionTable, TableFormat};
use crate::volume::{Volume, VolumeMeta};

/// File name of the reconciled mask inside an output directory
pub const RECONCILED_MASK_NAME: &str = "LRmask_dil.nii.gz";

/// Settings for every stage
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub reconcile: ReconcileParams,
    pub correction: CorrectionParams,
    pub table_format: TableFormat,
}

/// Inputs and outputs of one subject
#[derive(Clone, Debug)]
pub struct SubjectPaths {
    pub segmentation: PathBuf,
    pub raw_mask: PathBuf,
    pub region_table: PathBuf,
    pub output_dir: PathBuf,
    /// Defaults to `<output_dir>/LRmask_dil.nii.gz`
    pub mask_output: Option<PathBuf>,
    /// Defaults to `<output_dir>/<segmentation stem>_cc.nii.gz`
    pub segmentation_output: Option<PathBuf>,
}

impl SubjectPaths {
    pub fn mask_output(&self) -> PathBuf {
        self.mask_output
            .clone()
            .unwrap_or_else(|| self.output_dir.join(RECONCILED_MASK_NAME))
    }

    pub fn segmentation_output(&self) -> PathBuf {
        self.segmentation_output.clone().unwrap_or_else(|| {
            self.output_dir
                .join(format!("{}_cc.nii.gz", nifti_stem(&self.segmentation)))
        })
    }
}

/// Reports from both stages of a subject run
#[derive(Clone, Debug)]
pub struct SubjectReport {
    pub reconcile: ReconcileReport,
    pub correction: CorrectionReport,
    pub mask_output: PathBuf,
    pub segmentation_output: PathBuf,
}

/// File name without its `.nii` / `.nii.gz` extension
pub fn nifti_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(&name)
        .to_string()
}

/// Read a raw LR mask, validating every voxel as a chirality class
pub fn load_mask(path: &Path) -> Result<Volume<ChiralityCode>> {
    mask_from_values(&read_volume(path)?)
}

/// Read a segmentation as integer labels
pub fn load_segmentation(path: &Path) -> Result<Volume<i32>> {
    labels_from_values(&read_volume(path)?)
}

/// Write a mask as UINT8 with its own metadata
pub fn write_mask(path: &Path, mask: &Volume<ChiralityCode>) -> Result<()> {
    let meta = VolumeMeta { datatype: Datatype::Uint8, ..mask.meta().clone() };
    write_volume(path, &mask.map(|c| c.as_u8() as f64).with_meta(meta))
}

/// Write a segmentation in its source datatype, widening to INT32 when a
/// label does not fit
pub fn write_segmentation(path: &Path, segmentation: &Volume<i32>) -> Result<()> {
    let mut meta = segmentation.meta().clone();
    let fits = segmentation.data().iter().all(|&v| meta.datatype.fits(v as f64));
    if !fits {
        log::warn!(
            "Labels do not fit {:?}; writing {} as INT32",
            meta.datatype,
            path.display()
        );
        meta.datatype = Datatype::Int32;
    }
    let values = segmentation.map(|&v| v as f64).with_meta(meta);
    write_volume(path, &values)
}

/// Reconcile the raw mask at `raw_path` and write it to `out_path`
pub fn reconcile_mask_file(raw_path: &Path, out_path: &Path, params: &ReconcileParams) -> Result<ReconcileReport> {
    log::info!("Reconciling LR mask {}", raw_path.display());
    let raw = load_mask(raw_path)?;
    let reconciled = MaskReconciler::new(params.clone()).reconcile(&raw)?;
    write_mask(out_path, &reconciled.mask)?;
    log::info!("Saved {}", out_path.display());
    Ok(reconciled.report)
}

/// Correct the segmentation at `seg_path` against a reconciled mask
pub fn correct_segmentation_file(
    seg_path: &Path,
    mask_path: &Path,
    table: &RegionTable,
    out_path: &Path,
    params: &CorrectionParams,
) -> Result<CorrectionReport> {
    log::info!(
        "Correcting chirality of {} using {}",
        seg_path.display(),
        mask_path.display()
    );
    let segmentation = load_segmentation(seg_path)?;
    let mask = load_mask(mask_path)?;
    let corrected = ChiralityCorrector::new(table, params.clone()).correct(&segmentation, &mask)?;
    write_segmentation(out_path, &corrected.segmentation)?;
    log::info!("Saved {}", out_path.display());
    Ok(corrected.report)
}

/// Reconcile the subject's raw mask, then correct its segmentation with it
pub fn run_subject(paths: &SubjectPaths, config: &PipelineConfig) -> Result<SubjectReport> {
    let start = Instant::now();
    let table = RegionTable::load(&paths.region_table, &config.table_format)?;
    let segmentation = load_segmentation(&paths.segmentation)?;
    let raw = load_mask(&paths.raw_mask)?;
    segmentation.ensure_same_grid(&raw, "segmentation vs raw LR mask")?;

    std::fs::create_dir_all(&paths.output_dir)
        .map_err(|e| ChiralityError::io(&paths.output_dir, e))?;

    let reconciled = MaskReconciler::new(config.reconcile.clone()).reconcile(&raw)?;
    let corrected = ChiralityCorrector::new(&table, config.correction.clone())
        .correct(&segmentation, &reconciled.mask)?;

    let mask_output = paths.mask_output();
    let segmentation_output = paths.segmentation_output();
    write_mask(&mask_output, &reconciled.mask)?;
    write_segmentation(&segmentation_output, &corrected.segmentation)?;

    log::info!(
        "Subject {} done in {:.2?}: {} conflicted mask voxels, {} flipped labels",
        nifti_stem(&paths.segmentation),
        start.elapsed(),
        reconciled.report.conflicted_voxels,
        corrected.report.flipped_voxels
    );

    Ok(SubjectReport {
        reconcile: reconciled.report,
        correction: corrected.report,
        mask_output,
        segmentation_output,
    })
}

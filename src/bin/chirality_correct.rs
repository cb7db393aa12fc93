//! Command-line driver for LR mask reconciliation and chirality correction
//!
//! Usage:
//!   chirality-correct reconcile <raw-mask> <out-mask>
//!   chirality-correct correct <segmentation> <mask> <lut> <out>
//!   chirality-correct run <segmentation> <raw-mask> <lut> <out-dir>

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};

use chirality_core::pipeline::{
    correct_segmentation_file, reconcile_mask_file, run_subject, PipelineConfig, SubjectPaths,
};
use chirality_core::utils::Connectivity;
use chirality_core::{CorrectionParams, ReconcileParams, RegionTable, Result, TableFormat};

#[derive(Parser, Debug)]
#[command(name = "chirality-correct", version, about = "Fix left/right label swaps in brain segmentations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill holes in a raw LR mask and resolve class overlaps
    Reconcile {
        raw_mask: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        reconcile: ReconcileArgs,
    },
    /// Flip mislabeled lateral regions using a reconciled LR mask
    Correct {
        segmentation: PathBuf,
        mask: PathBuf,
        lut: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        correction: CorrectionArgs,
    },
    /// Reconcile a raw mask and correct a segmentation with it
    Run {
        segmentation: PathBuf,
        raw_mask: PathBuf,
        lut: PathBuf,
        output_dir: PathBuf,
        /// Reconciled mask path (default: <output-dir>/LRmask_dil.nii.gz)
        #[arg(long)]
        mask_output: Option<PathBuf>,
        /// Corrected segmentation path (default: <output-dir>/<stem>_cc.nii.gz)
        #[arg(long)]
        segmentation_output: Option<PathBuf>,
        #[command(flatten)]
        reconcile: ReconcileArgs,
        #[command(flatten)]
        correction: CorrectionArgs,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ConnectivityArg {
    /// Face neighbours
    Six,
    /// 3x3x3 box
    TwentySix,
}

impl From<ConnectivityArg> for Connectivity {
    fn from(arg: ConnectivityArg) -> Self {
        match arg {
            ConnectivityArg::Six => Connectivity::Six,
            ConnectivityArg::TwentySix => Connectivity::TwentySix,
        }
    }
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Dilation passes before hole filling
    #[arg(long, default_value_t = 3)]
    dilate_passes: usize,
    /// Erosion passes after hole filling
    #[arg(long, default_value_t = 1)]
    erode_passes: usize,
    /// Structuring element for dilation and erosion
    #[arg(long, value_enum, default_value_t = ConnectivityArg::TwentySix)]
    kernel: ConnectivityArg,
    /// Connectivity used to find enclosed holes
    #[arg(long, value_enum, default_value_t = ConnectivityArg::Six)]
    fill_connectivity: ConnectivityArg,
    /// Recombined values above this are resolved from the raw mask
    #[arg(long, default_value_t = 2)]
    conflict_threshold: u8,
}

impl From<&ReconcileArgs> for ReconcileParams {
    fn from(args: &ReconcileArgs) -> Self {
        ReconcileParams {
            dilate_passes: args.dilate_passes,
            erode_passes: args.erode_passes,
            kernel: args.kernel.into(),
            fill_connectivity: args.fill_connectivity.into(),
            conflict_threshold: args.conflict_threshold,
        }
    }
}

#[derive(Args, Debug)]
struct CorrectionArgs {
    /// Lookup table field separator (default: any whitespace)
    #[arg(long)]
    separator: Option<char>,
    #[arg(long, default_value = "Left-")]
    left_prefix: String,
    #[arg(long, default_value = "Right-")]
    right_prefix: String,
}

impl CorrectionArgs {
    fn table_format(&self) -> TableFormat {
        TableFormat { separator: self.separator }
    }

    fn params(&self) -> CorrectionParams {
        CorrectionParams {
            left_prefix: self.left_prefix.clone(),
            right_prefix: self.right_prefix.clone(),
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Reconcile { raw_mask, output, reconcile } => {
            let report = reconcile_mask_file(&raw_mask, &output, &ReconcileParams::from(&reconcile))?;
            println!(
                "{}: {} conflicted voxels resolved from raw mask",
                output.display(),
                report.conflicted_voxels
            );
        }
        Command::Correct { segmentation, mask, lut, output, correction } => {
            let table = RegionTable::load(&lut, &correction.table_format())?;
            let report = correct_segmentation_file(&segmentation, &mask, &table, &output, &correction.params())?;
            println!("{}: {} voxels flipped", output.display(), report.flipped_voxels);
        }
        Command::Run {
            segmentation,
            raw_mask,
            lut,
            output_dir,
            mask_output,
            segmentation_output,
            reconcile,
            correction,
        } => {
            let config = PipelineConfig {
                reconcile: ReconcileParams::from(&reconcile),
                correction: correction.params(),
                table_format: correction.table_format(),
            };
            let paths = SubjectPaths {
                segmentation,
                raw_mask,
                region_table: lut,
                output_dir,
                mask_output,
                segmentation_output,
            };
            let report = run_subject(&paths, &config)?;
            println!(
                "{}: {} voxels flipped ({} conflicted mask voxels)",
                report.segmentation_output.display(),
                report.correction.flipped_voxels,
                report.reconcile.conflicted_voxels
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

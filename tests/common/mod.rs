//! Common test utilities for chirality-core integration tests

#![allow(dead_code)]

use std::path::Path;

use chirality_core::nifti_io::{write_volume, Datatype};
use chirality_core::volume::Qform;
use chirality_core::{ChiralityCode, Dims, RegionTable, TableFormat, Volume, VolumeMeta};

/// Small FreeSurfer-style lookup table with colour columns
pub const LUT: &str = "\
#No. Label Name:                R   G   B   A

0   Unknown                     0   0   0   0
2   Left-Cerebral-White-Matter  245 245 245 0
4   Left-Lateral-Ventricle      120 18  134 0
16  Brain-Stem                  119 159 176 0
17  Left-Hippocampus            220 216 20  0
41  Right-Cerebral-White-Matter 0   225 0   0
43  Right-Lateral-Ventricle     120 18  134 0
53  Right-Hippocampus           220 216 20  0
";

pub const LABELS: [i32; 8] = [0, 2, 4, 16, 17, 41, 43, 53];

pub fn table() -> RegionTable {
    RegionTable::parse(LUT, &TableFormat::default()).expect("fixture LUT parses")
}

/// Oblique affine so header preservation is visible
pub fn subject_meta(datatype: Datatype) -> VolumeMeta {
    VolumeMeta {
        voxel_size: (1.0, 1.0, 1.0),
        affine: [
            -1.0, 0.0, 0.0, 90.0,
            0.0, 1.0, 0.0, -126.0,
            0.0, 0.0, 1.0, -72.0,
            0.0, 0.0, 0.0, 1.0,
        ],
        datatype,
        ..VolumeMeta::default()
    }
}

/// Header positioned by its qform alone: sform unset, srow zeroed
pub fn qform_only_meta(datatype: Datatype) -> VolumeMeta {
    VolumeMeta {
        voxel_size: (1.0, 1.0, 1.0),
        affine: [0.0; 16],
        datatype,
        sform_code: 0,
        qform: Some(Qform {
            code: 1,
            quatern: [0.0, 0.0, 1.0],
            offset: [-90.0, 126.0, -72.0],
            qfac: 1.0,
        }),
        xyzt_units: 10,
    }
}

/// Deterministic pseudo-random generator (LCG)
pub struct Lcg(pub u32);

impl Lcg {
    pub fn next(&mut self, modulo: u32) -> u32 {
        self.0 = self.0.wrapping_mul(1103515245).wrapping_add(12345);
        (self.0 >> 16) % modulo
    }
}

pub fn random_segmentation(dims: Dims, seed: u32) -> Volume<i32> {
    let mut rng = Lcg(seed);
    let data = (0..dims.len()).map(|_| LABELS[rng.next(LABELS.len() as u32) as usize]).collect();
    Volume::new(data, dims, subject_meta(Datatype::Int16)).expect("length matches")
}

pub fn random_mask(dims: Dims, seed: u32) -> Volume<ChiralityCode> {
    let mut rng = Lcg(seed);
    let data = (0..dims.len())
        .map(|_| ChiralityCode::from_u8(rng.next(4) as u8).expect("0..4"))
        .collect();
    Volume::new(data, dims, subject_meta(Datatype::Uint8)).expect("length matches")
}

pub fn save_labels(path: &Path, volume: &Volume<i32>) {
    write_volume(path, &volume.map(|&v| v as f64)).expect("write labels");
}

pub fn save_mask(path: &Path, volume: &Volume<ChiralityCode>) {
    write_volume(path, &volume.map(|c| c.as_u8() as f64)).expect("write mask");
}

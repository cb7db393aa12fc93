//! Binary morphology on flattened 3D masks
//!
//! Matches fslmaths semantics for `-dilM`, `-ero` and `-fillh` on binary
//! input: neighbours that fall outside the grid are ignored by dilation and
//! erosion, and fill-holes treats any background component touching the grid
//! boundary as exterior. Fortran order: index = x + y*nx + z*nx*ny.

use std::collections::VecDeque;

use rayon::prelude::*;

/// Neighbourhood used by a structuring element or a flood fill
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    /// Face neighbours only
    Six,
    /// Full 3x3x3 box (the fslmaths default kernel)
    TwentySix,
}

const FACE_OFFSETS: [(i32, i32, i32); 6] = [
    (-1, 0, 0), (1, 0, 0), (0, -1, 0), (0, 1, 0), (0, 0, -1), (0, 0, 1),
];

const BOX_OFFSETS: [(i32, i32, i32); 26] = [
    (-1, -1, -1), (0, -1, -1), (1, -1, -1),
    (-1, 0, -1), (0, 0, -1), (1, 0, -1),
    (-1, 1, -1), (0, 1, -1), (1, 1, -1),
    (-1, -1, 0), (0, -1, 0), (1, -1, 0),
    (-1, 0, 0), (1, 0, 0),
    (-1, 1, 0), (0, 1, 0), (1, 1, 0),
    (-1, -1, 1), (0, -1, 1), (1, -1, 1),
    (-1, 0, 1), (0, 0, 1), (1, 0, 1),
    (-1, 1, 1), (0, 1, 1), (1, 1, 1),
];

impl Connectivity {
    pub fn offsets(self) -> &'static [(i32, i32, i32)] {
        match self {
            Connectivity::Six => &FACE_OFFSETS,
            Connectivity::TwentySix => &BOX_OFFSETS,
        }
    }
}

/// In-grid neighbours of voxel `idx`
#[inline]
fn neighbours(
    idx: usize,
    nx: usize, ny: usize, nz: usize,
    connectivity: Connectivity,
) -> impl Iterator<Item = usize> {
    let plane = nx * ny;
    let k = (idx / plane) as i32;
    let j = ((idx % plane) / nx) as i32;
    let i = (idx % nx) as i32;

    connectivity.offsets().iter().filter_map(move |&(dx, dy, dz)| {
        let (ni, nj, nk) = (i + dx, j + dy, k + dz);
        if ni < 0 || nj < 0 || nk < 0 || ni >= nx as i32 || nj >= ny as i32 || nk >= nz as i32 {
            None
        } else {
            Some(ni as usize + nj as usize * nx + nk as usize * plane)
        }
    })
}

fn dilate_once(mask: &[u8], nx: usize, ny: usize, nz: usize, connectivity: Connectivity) -> Vec<u8> {
    (0..mask.len())
        .into_par_iter()
        .map(|idx| {
            let hit = mask[idx] != 0
                || neighbours(idx, nx, ny, nz, connectivity).any(|n| mask[n] != 0);
            hit as u8
        })
        .collect()
}

fn erode_once(mask: &[u8], nx: usize, ny: usize, nz: usize, connectivity: Connectivity) -> Vec<u8> {
    (0..mask.len())
        .into_par_iter()
        .map(|idx| {
            let keep = mask[idx] != 0
                && neighbours(idx, nx, ny, nz, connectivity).all(|n| mask[n] != 0);
            keep as u8
        })
        .collect()
}

/// Dilate a binary mask by `passes` applications of the structuring element
pub fn dilate(
    mask: &[u8],
    nx: usize, ny: usize, nz: usize,
    connectivity: Connectivity,
    passes: usize,
) -> Vec<u8> {
    let mut out: Vec<u8> = mask.iter().map(|&v| (v != 0) as u8).collect();
    for _ in 0..passes {
        out = dilate_once(&out, nx, ny, nz, connectivity);
    }
    out
}

/// Erode a binary mask by `passes` applications of the structuring element
pub fn erode(
    mask: &[u8],
    nx: usize, ny: usize, nz: usize,
    connectivity: Connectivity,
    passes: usize,
) -> Vec<u8> {
    let mut out: Vec<u8> = mask.iter().map(|&v| (v != 0) as u8).collect();
    for _ in 0..passes {
        out = erode_once(&out, nx, ny, nz, connectivity);
    }
    out
}

/// Fill every background region not connected to the grid boundary
pub fn fill_holes(
    mask: &[u8],
    nx: usize, ny: usize, nz: usize,
    connectivity: Connectivity,
) -> Vec<u8> {
    let n_total = nx * ny * nz;
    let idx = |i: usize, j: usize, k: usize| i + j * nx + k * nx * ny;

    // Flood fill from the boundary to find exterior
    let mut exterior = vec![false; n_total];
    let mut queue: VecDeque<usize> = VecDeque::new();

    let mut seed = |n: usize, exterior: &mut Vec<bool>| {
        if mask[n] == 0 && !exterior[n] {
            exterior[n] = true;
            queue.push_back(n);
        }
    };

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                if i == 0 || i == nx - 1 || j == 0 || j == ny - 1 || k == 0 || k == nz - 1 {
                    seed(idx(i, j, k), &mut exterior);
                }
            }
        }
    }

    while let Some(current) = queue.pop_front() {
        for n in neighbours(current, nx, ny, nz, connectivity) {
            if mask[n] == 0 && !exterior[n] {
                exterior[n] = true;
                queue.push_back(n);
            }
        }
    }

    // Any voxel that is 0 but not exterior is interior -> fill it
    mask.iter()
        .zip(exterior.iter())
        .map(|(&m, &ext)| (m != 0 || !ext) as u8)
        .collect()
}

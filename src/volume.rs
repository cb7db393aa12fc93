//! Flat 3D volumes with their spatial metadata
//!
//! Voxels are stored in Fortran (column-major) order to match the NIfTI
//! convention: index = i + j*nx + k*nx*ny.

use crate::error::{ChiralityError, Result, Voxel};
use crate::nifti_io::Datatype;

/// Grid dimensions (nx, ny, nz)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Dims {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    /// Number of voxels in the grid
    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Linear offset of (i, j, k)
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + j * self.nx + k * self.nx * self.ny
    }

    /// Inverse of [`Dims::index`]
    #[inline]
    pub fn coords(&self, idx: usize) -> Voxel {
        let plane = self.nx * self.ny;
        let k = idx / plane;
        let rem = idx % plane;
        (rem % self.nx, rem / self.nx, k)
    }

    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }
}

impl From<(usize, usize, usize)> for Dims {
    fn from((nx, ny, nz): (usize, usize, usize)) -> Self {
        Self::new(nx, ny, nz)
    }
}

/// Quaternion orientation carried from a NIfTI header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Qform {
    pub code: i16,
    /// quatern_b, quatern_c, quatern_d
    pub quatern: [f64; 3],
    /// qoffset_x, qoffset_y, qoffset_z
    pub offset: [f64; 3],
    /// pixdim[0], -1 or 1
    pub qfac: f64,
}

impl Qform {
    /// Row-major 4x4 affine for voxel sizes `(dx, dy, dz)`
    ///
    /// Follows the NIfTI-1 quaternion convention: `a` is recovered from
    /// (b, c, d) and `qfac` flips the third column.
    pub fn affine(&self, voxel_size: (f64, f64, f64)) -> [f64; 16] {
        let [b, c, d] = self.quatern;
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let (dx, dy) = (voxel_size.0, voxel_size.1);
        let dz = voxel_size.2 * if self.qfac < 0.0 { -1.0 } else { 1.0 };
        let [ox, oy, oz] = self.offset;

        [
            (a * a + b * b - c * c - d * d) * dx,
            2.0 * (b * c - a * d) * dy,
            2.0 * (b * d + a * c) * dz,
            ox,
            2.0 * (b * c + a * d) * dx,
            (a * a + c * c - b * b - d * d) * dy,
            2.0 * (c * d - a * b) * dz,
            oy,
            2.0 * (b * d - a * c) * dx,
            2.0 * (c * d + a * b) * dy,
            (a * a + d * d - b * b - c * c) * dz,
            oz,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

/// Spatial transform and header fields that travel with a volume
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeMeta {
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
    /// On-disk datatype the volume was read as (or should be written as)
    pub datatype: Datatype,
    pub sform_code: i16,
    pub qform: Option<Qform>,
    pub xyzt_units: u8,
}

impl Default for VolumeMeta {
    fn default() -> Self {
        Self {
            voxel_size: (1.0, 1.0, 1.0),
            affine: [
                1.0, 0.0, 0.0, 0.0,
                0.0, 1.0, 0.0, 0.0,
                0.0, 0.0, 1.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ],
            datatype: Datatype::Float32,
            sform_code: 1,
            qform: None,
            xyzt_units: 0,
        }
    }
}

impl VolumeMeta {
    /// Keep only the spatial transform (affine, sform code and qform); every
    /// other header field is reset
    pub fn spatial_only(&self, datatype: Datatype) -> Self {
        Self {
            voxel_size: self.voxel_size,
            affine: self.affine,
            datatype,
            sform_code: self.sform_code,
            qform: self.qform,
            ..Self::default()
        }
    }
}

/// A 3D grid of voxels plus the metadata needed to write it back out
#[derive(Clone, Debug, PartialEq)]
pub struct Volume<T> {
    data: Vec<T>,
    dims: Dims,
    meta: VolumeMeta,
}

impl<T> Volume<T> {
    pub fn new(data: Vec<T>, dims: Dims, meta: VolumeMeta) -> Result<Self> {
        if data.len() != dims.len() {
            return Err(ChiralityError::DataLength {
                expected: dims.len(),
                found: data.len(),
            });
        }
        Ok(Self { data, dims, meta })
    }

    pub fn filled(dims: Dims, value: T, meta: VolumeMeta) -> Self
    where
        T: Clone,
    {
        Self { data: vec![value; dims.len()], dims, meta }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn meta(&self) -> &VolumeMeta {
        &self.meta
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> &T {
        &self.data[self.dims.index(i, j, k)]
    }

    /// Build a volume on the same grid and metadata from new voxel data
    pub fn with_data<U>(&self, data: Vec<U>) -> Result<Volume<U>> {
        Volume::new(data, self.dims, self.meta.clone())
    }

    /// Voxelwise transform, keeping grid and metadata
    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Volume<U> {
        Volume {
            data: self.data.iter().map(f).collect(),
            dims: self.dims,
            meta: self.meta.clone(),
        }
    }

    /// Replace the metadata
    pub fn with_meta(mut self, meta: VolumeMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Fail unless `other` shares this volume's grid
    pub fn ensure_same_grid<U>(&self, other: &Volume<U>, what: &'static str) -> Result<()> {
        if self.dims != other.dims {
            return Err(ChiralityError::ShapeMismatch {
                what,
                expected: self.dims,
                found: other.dims,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_coords_inverse() {
        let dims = Dims::new(4, 3, 5);
        for idx in 0..dims.len() {
            let (i, j, k) = dims.coords(idx);
            assert_eq!(dims.index(i, j, k), idx);
        }
        assert_eq!(dims.index(1, 2, 3), 1 + 2 * 4 + 3 * 12);
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let result = Volume::new(vec![0u8; 7], Dims::new(2, 2, 2), VolumeMeta::default());
        assert!(matches!(
            result,
            Err(ChiralityError::DataLength { expected: 8, found: 7 })
        ));
    }

    #[test]
    fn test_map_keeps_meta() {
        let meta = VolumeMeta { voxel_size: (0.5, 0.5, 0.5), ..VolumeMeta::default() };
        let vol = Volume::filled(Dims::new(2, 2, 2), 3i32, meta.clone());
        let doubled = vol.map(|&v| v * 2);
        assert_eq!(doubled.meta(), &meta);
        assert!(doubled.data().iter().all(|&v| v == 6));
    }

    #[test]
    fn test_ensure_same_grid() {
        let a = Volume::filled(Dims::new(2, 2, 2), 0u8, VolumeMeta::default());
        let b = Volume::filled(Dims::new(2, 2, 3), 0u8, VolumeMeta::default());
        assert!(a.ensure_same_grid(&a, "self").is_ok());
        assert!(matches!(
            a.ensure_same_grid(&b, "a vs b"),
            Err(ChiralityError::ShapeMismatch { what: "a vs b", .. })
        ));
    }

    #[test]
    fn test_spatial_only_resets_header() {
        let meta = VolumeMeta {
            affine: [2.0, 0.0, 0.0, 1.0, 0.0, 2.0, 0.0, 1.0, 0.0, 0.0, 2.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            xyzt_units: 10,
            sform_code: 0,
            qform: Some(Qform { code: 1, quatern: [0.0; 3], offset: [1.0; 3], qfac: 1.0 }),
            ..VolumeMeta::default()
        };
        let fresh = meta.spatial_only(Datatype::Uint8);
        assert_eq!(fresh.affine, meta.affine);
        assert_eq!(fresh.datatype, Datatype::Uint8);
        assert_eq!(fresh.sform_code, 0);
        assert_eq!(fresh.qform, meta.qform);
        assert_eq!(fresh.xyzt_units, 0);
    }

    #[test]
    fn test_qform_affine_rotation_and_offset() {
        // 180 degrees about z: b = c = 0, d = 1
        let q = Qform { code: 1, quatern: [0.0, 0.0, 1.0], offset: [-90.0, 126.0, -72.0], qfac: 1.0 };
        let expected = [
            -1.0, 0.0, 0.0, -90.0,
            0.0, -2.0, 0.0, 126.0,
            0.0, 0.0, 3.0, -72.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let affine = q.affine((1.0, 2.0, 3.0));
        for i in 0..16 {
            assert!((affine[i] - expected[i]).abs() < 1e-12, "element {}", i);
        }

        let flipped = Qform { qfac: -1.0, ..q }.affine((1.0, 2.0, 3.0));
        assert_eq!(flipped[10], -3.0);
    }
}

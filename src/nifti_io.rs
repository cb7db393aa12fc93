//! NIfTI-1 file I/O
//!
//! Reads .nii and .nii.gz files (gzip is auto-detected) through the `nifti`
//! crate and writes single-file NIfTI-1 volumes with a hand-built header, so
//! label volumes keep an integer datatype and the affine of their source.

use std::io::{Cursor, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::{ChiralityError, Result};
use crate::volume::{Dims, Qform, Volume, VolumeMeta};

/// NIfTI header size plus the 4-byte empty extension block
const VOX_OFFSET: usize = 352;

/// On-disk voxel datatypes this crate writes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Datatype {
    Uint8,
    Int16,
    Int32,
    Float32,
}

impl Datatype {
    pub fn code(self) -> i16 {
        match self {
            Datatype::Uint8 => 2,
            Datatype::Int16 => 4,
            Datatype::Int32 => 8,
            Datatype::Float32 => 16,
        }
    }

    pub fn bitpix(self) -> i16 {
        match self {
            Datatype::Uint8 => 8,
            Datatype::Int16 => 16,
            Datatype::Int32 | Datatype::Float32 => 32,
        }
    }

    /// Map a header datatype code onto the closest writable type
    ///
    /// Integer types we do not write (INT8, UINT16, UINT32, 64-bit) become
    /// INT32; every other type becomes FLOAT32.
    pub fn from_header_code(code: i16) -> Self {
        match code {
            2 => Datatype::Uint8,
            4 => Datatype::Int16,
            8 | 256 | 512 | 768 | 1024 | 1280 => Datatype::Int32,
            _ => Datatype::Float32,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Datatype::Float32)
    }

    /// Whether `value` is representable without loss
    pub fn fits(self, value: f64) -> bool {
        let in_range = |lo: f64, hi: f64| value.fract() == 0.0 && value >= lo && value <= hi;
        match self {
            Datatype::Uint8 => in_range(0.0, u8::MAX as f64),
            Datatype::Int16 => in_range(i16::MIN as f64, i16::MAX as f64),
            Datatype::Int32 => in_range(i32::MIN as f64, i32::MAX as f64),
            Datatype::Float32 => value.is_finite(),
        }
    }

    fn encode(self, value: f64, out: &mut Vec<u8>) {
        match self {
            Datatype::Uint8 => out.push(value.round() as u8),
            Datatype::Int16 => out.extend_from_slice(&(value.round() as i16).to_le_bytes()),
            Datatype::Int32 => out.extend_from_slice(&(value.round() as i32).to_le_bytes()),
            Datatype::Float32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
        }
    }
}

/// NIfTI data loaded from bytes
pub struct NiftiData {
    /// Volume data as f64, Fortran order
    pub data: Vec<f64>,
    /// Dimensions (nx, ny, nz)
    pub dims: Dims,
    /// Affine, voxel size and the header fields carried to outputs
    pub meta: VolumeMeta,
}

impl NiftiData {
    pub fn into_volume(self) -> Result<Volume<f64>> {
        Volume::new(self.data, self.dims, self.meta)
    }
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Get header info for diagnostics
fn get_header_info(bytes: &[u8]) -> String {
    if bytes.len() < 348 {
        return format!("File too small ({} bytes, need at least 348)", bytes.len());
    }

    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);

    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

/// Load a NIfTI volume from bytes
///
/// 4D inputs keep only their first frame.
pub fn load_nifti(bytes: &[u8]) -> Result<NiftiData> {
    let obj: InMemNiftiObject = if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes))).map_err(|e| {
            let mut decompressed = Vec::new();
            let mut decoder = GzDecoder::new(Cursor::new(bytes));
            let info = if std::io::Read::read_to_end(&mut decoder, &mut decompressed).is_ok() {
                get_header_info(&decompressed)
            } else {
                "Could not decompress".to_string()
            };
            ChiralityError::Nifti(format!("failed to read gzipped NIfTI: {} ({})", e, info))
        })?
    } else {
        let info = get_header_info(bytes);
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| ChiralityError::Nifti(format!("failed to read NIfTI: {} ({})", e, info)))?
    };

    let header = obj.header();
    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(ChiralityError::Nifti(format!("expected at least 3D volume, got {}D", ndim)));
    }

    // into_ndarray applies scl_slope/scl_inter; outputs are written unscaled
    let meta = header_meta(header);

    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| ChiralityError::Nifti(format!("failed to convert to ndarray: {}", e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(ChiralityError::Nifti(format!(
            "expected at least 3D array, got {}D",
            shape.len()
        )));
    }

    // Use the actual array shape for dimensions (nifti-rs may reorder)
    let dims = Dims::new(shape[0], shape[1], shape[2]);
    let mut data = Vec::with_capacity(dims.len());

    // Fortran order: x varies fastest
    for k in 0..dims.nz {
        for j in 0..dims.ny {
            for i in 0..dims.nx {
                let value = if shape.len() == 3 {
                    array[[i, j, k]]
                } else {
                    let mut index = vec![0usize; shape.len()];
                    index[0] = i;
                    index[1] = j;
                    index[2] = k;
                    array[index.as_slice()]
                };
                data.push(value);
            }
        }
    }

    Ok(NiftiData { data, dims, meta })
}

/// Quaternion transform of a header, when `qform_code` is set
fn header_qform(header: &NiftiHeader) -> Option<Qform> {
    if header.qform_code <= 0 {
        return None;
    }
    Some(Qform {
        code: header.qform_code,
        quatern: [
            header.quatern_b as f64,
            header.quatern_c as f64,
            header.quatern_d as f64,
        ],
        offset: [
            header.quatern_x as f64,
            header.quatern_y as f64,
            header.quatern_z as f64,
        ],
        qfac: if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 },
    })
}

/// Metadata carried from a parsed header
fn header_meta(header: &NiftiHeader) -> VolumeMeta {
    VolumeMeta {
        voxel_size: (
            header.pixdim[1] as f64,
            header.pixdim[2] as f64,
            header.pixdim[3] as f64,
        ),
        affine: get_affine(header),
        datatype: Datatype::from_header_code(header.datatype),
        sform_code: header.sform_code,
        qform: header_qform(header),
        xyzt_units: header.xyzt_units,
    }
}

/// Get affine transformation matrix from header
///
/// sform first, then qform, then voxel scaling alone.
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        return [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ];
    }

    let vsx = header.pixdim[1] as f64;
    let vsy = header.pixdim[2] as f64;
    let vsz = header.pixdim[3] as f64;
    match header_qform(header) {
        Some(q) => q.affine((vsx, vsy, vsz)),
        None => [
            vsx, 0.0, 0.0, 0.0,
            0.0, vsy, 0.0, 0.0,
            0.0, 0.0, vsz, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ],
    }
}

fn put_i16(header: &mut [u8], offset: usize, value: i16) {
    header[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_f32(header: &mut [u8], offset: usize, value: f64) {
    header[offset..offset + 4].copy_from_slice(&(value as f32).to_le_bytes());
}

/// Build a 348-byte NIfTI-1 header for `dims` and `meta`
fn build_header(dims: Dims, meta: &VolumeMeta) -> Result<[u8; 348]> {
    let to_dim = |n: usize| {
        i16::try_from(n)
            .map_err(|_| ChiralityError::Nifti(format!("dimension {} exceeds NIfTI-1 limit", n)))
    };
    let dim: [i16; 8] = [3, to_dim(dims.nx)?, to_dim(dims.ny)?, to_dim(dims.nz)?, 1, 1, 1, 1];

    let mut header = [0u8; 348];
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    for (i, &d) in dim.iter().enumerate() {
        put_i16(&mut header, 40 + i * 2, d);
    }

    put_i16(&mut header, 70, meta.datatype.code());
    put_i16(&mut header, 72, meta.datatype.bitpix());

    let (vsx, vsy, vsz) = meta.voxel_size;
    let qfac = meta.qform.map(|q| q.qfac).unwrap_or(1.0);
    let pixdim = [qfac, vsx, vsy, vsz, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        put_f32(&mut header, 76 + i * 4, p);
    }

    put_f32(&mut header, 108, VOX_OFFSET as f64);
    put_f32(&mut header, 112, 1.0); // scl_slope
    put_f32(&mut header, 116, 0.0); // scl_inter
    header[123] = meta.xyzt_units;

    if let Some(q) = meta.qform {
        put_i16(&mut header, 252, q.code);
        for (i, &v) in q.quatern.iter().chain(q.offset.iter()).enumerate() {
            put_f32(&mut header, 256 + i * 4, v);
        }
    }
    // srow always carries the affine; sform_code says whether readers trust it
    put_i16(&mut header, 254, meta.sform_code);

    for (row, offset) in [280usize, 296, 312].into_iter().enumerate() {
        for col in 0..4 {
            put_f32(&mut header, offset + col * 4, meta.affine[row * 4 + col]);
        }
    }

    // magic = "n+1\0" for NIfTI-1 single file
    header[344..348].copy_from_slice(b"n+1\0");

    Ok(header)
}

/// Save data as NIfTI bytes in the datatype named by `meta`
///
/// Writes an uncompressed .nii image.
pub fn save_nifti(data: &[f64], dims: Dims, meta: &VolumeMeta) -> Result<Vec<u8>> {
    if data.len() != dims.len() {
        return Err(ChiralityError::DataLength { expected: dims.len(), found: data.len() });
    }
    let header = build_header(dims, meta)?;
    let bytes_per_voxel = (meta.datatype.bitpix() / 8) as usize;

    let mut buffer = Vec::with_capacity(VOX_OFFSET + data.len() * bytes_per_voxel);
    buffer.extend_from_slice(&header);
    // Extension (4 bytes, all zeros = no extension)
    buffer.extend_from_slice(&[0u8; 4]);

    for &val in data {
        meta.datatype.encode(val, &mut buffer);
    }

    Ok(buffer)
}

/// Save data as gzipped NIfTI bytes (.nii.gz)
pub fn save_nifti_gz(data: &[f64], dims: Dims, meta: &VolumeMeta) -> Result<Vec<u8>> {
    let uncompressed = save_nifti(data, dims, meta)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&uncompressed)
        .map_err(|e| ChiralityError::Nifti(format!("gzip compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| ChiralityError::Nifti(format!("gzip finish failed: {}", e)))
}

/// Read a NIfTI file from a filesystem path
pub fn read_nifti_file(path: &Path) -> Result<NiftiData> {
    let bytes = std::fs::read(path).map_err(|e| ChiralityError::io(path, e))?;
    load_nifti(&bytes).map_err(|e| match e {
        ChiralityError::Nifti(msg) => ChiralityError::Nifti(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Read a NIfTI file straight into a volume
pub fn read_volume(path: &Path) -> Result<Volume<f64>> {
    read_nifti_file(path)?.into_volume()
}

/// Write a volume using its own metadata
///
/// If the path ends with .nii.gz, the file is gzip compressed.
/// Otherwise it is saved as uncompressed .nii.
pub fn write_volume(path: &Path, volume: &Volume<f64>) -> Result<()> {
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
        save_nifti_gz(volume.data(), volume.dims(), volume.meta())?
    } else {
        save_nifti(volume.data(), volume.dims(), volume.meta())?
    };

    std::fs::write(path, &bytes).map_err(|e| ChiralityError::io(path, e))
}

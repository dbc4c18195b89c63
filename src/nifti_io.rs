//! NIfTI-1 file I/O for 4D volume series
//!
//! Loads `.nii` / `.nii.gz` files (gzip is auto-detected) into a
//! [`VolumeSeries`] plus the spatial metadata needed to write derived series
//! back out on the same grid. Derived series are written as float64 so
//! values pass through without narrowing.

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::{NordicError, Result};
use crate::volume::VolumeSeries;

/// Header size of a NIfTI-1 single-file image plus the 4-byte extension flag
const VOX_OFFSET: usize = 352;

/// A volume series together with its scanner geometry
#[derive(Clone, Debug)]
pub struct NiftiSeries {
    pub series: VolumeSeries,
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
    /// Volume spacing in seconds (pixdim[4]), 0 when unknown
    pub repetition_time: f64,
}

impl NiftiSeries {
    /// Same geometry, different volumes
    pub fn with_series(&self, series: VolumeSeries) -> NiftiSeries {
        NiftiSeries {
            series,
            voxel_size: self.voxel_size,
            affine: self.affine,
            repetition_time: self.repetition_time,
        }
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
    let ndim = i16::from_le_bytes([bytes[40], bytes[41]]);
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);

    format!("sizeof_hdr={}, magic='{}', ndim={}, datatype={}", sizeof_hdr, magic, ndim, datatype)
}

/// Load a 3D or 4D NIfTI image from bytes
///
/// A 3D image is returned as a single-volume series.
pub fn load_nifti_series(bytes: &[u8]) -> Result<NiftiSeries> {
    let obj: InMemNiftiObject = if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes))).map_err(|e| {
            let mut decompressed = Vec::new();
            let info = if GzDecoder::new(Cursor::new(bytes)).read_to_end(&mut decompressed).is_ok() {
                get_header_info(&decompressed)
            } else {
                "Could not decompress".to_string()
            };
            NordicError::Nifti(format!("Failed to read gzipped NIfTI: {} ({})", e, info))
        })?
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes)).map_err(|e| {
            NordicError::Nifti(format!("Failed to read NIfTI: {} ({})", e, get_header_info(bytes)))
        })?
    };

    let header = obj.header();
    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(NordicError::Nifti(format!("Expected 3D or 4D volume, got {}D", ndim)));
    }

    let pixdim = header.pixdim;
    let voxel_size = (pixdim[1] as f64, pixdim[2] as f64, pixdim[3] as f64);
    let repetition_time = if ndim >= 4 { pixdim[4] as f64 } else { 0.0 };
    let affine = get_affine(header);

    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| NordicError::Nifti(format!("Failed to convert to ndarray: {}", e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(NordicError::Nifti(format!("Expected at least 3D array, got {}D", shape.len())));
    }
    if shape.len() > 4 && shape[4..].iter().any(|&d| d > 1) {
        return Err(NordicError::Nifti(format!("Unsupported {}D image with shape {:?}", shape.len(), shape)));
    }

    // Use the actual array shape for dimensions (nifti-rs may reorder)
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let nt = if shape.len() >= 4 { shape[3] } else { 1 };

    // Fortran order, volume axis slowest: index = x + y*nx + z*nx*ny + t*nx*ny*nz
    let series = if shape.len() == 3 {
        VolumeSeries::from_fn((nx, ny, nz), 1, |i, j, k, _| array[[i, j, k]])
    } else if shape.len() == 4 {
        VolumeSeries::from_fn((nx, ny, nz), nt, |i, j, k, t| array[[i, j, k, t]])
    } else {
        let rank = shape.len();
        VolumeSeries::from_fn((nx, ny, nz), nt, |i, j, k, t| {
            let mut index = vec![0usize; rank];
            index[..4].copy_from_slice(&[i, j, k, t]);
            array[index.as_slice()]
        })
    };

    Ok(NiftiSeries {
        series,
        voxel_size,
        affine,
        repetition_time,
    })
}

/// Get affine transformation matrix from header
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    // Prefer sform if available (sform_code > 0)
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        // Fall back to identity with voxel scaling
        let vsx = header.pixdim[1] as f64;
        let vsy = header.pixdim[2] as f64;
        let vsz = header.pixdim[3] as f64;
        [
            vsx, 0.0, 0.0, 0.0,
            0.0, vsy, 0.0, 0.0,
            0.0, 0.0, vsz, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

fn dim_to_i16(value: usize, axis: &str) -> Result<i16> {
    i16::try_from(value)
        .map_err(|_| NordicError::Nifti(format!("{} dimension {} exceeds NIfTI-1 limit", axis, value)))
}

/// Encode a series as uncompressed NIfTI-1 bytes (float64, 4D header)
pub fn save_nifti_series(image: &NiftiSeries) -> Result<Vec<u8>> {
    let (nx, ny, nz) = image.series.dims();
    let nt = image.series.len();
    let (vsx, vsy, vsz) = image.voxel_size;
    let affine = &image.affine;

    let mut header = [0u8; 348];

    // sizeof_hdr = 348
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    // dim[0..7]
    let dim: [i16; 8] = [
        4,
        dim_to_i16(nx, "x")?,
        dim_to_i16(ny, "y")?,
        dim_to_i16(nz, "z")?,
        dim_to_i16(nt, "t")?,
        1, 1, 1,
    ];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype = 64 (FLOAT64), bitpix = 64
    header[70..72].copy_from_slice(&64i16.to_le_bytes());
    header[72..74].copy_from_slice(&64i16.to_le_bytes());

    let pixdim: [f32; 8] = [
        1.0, vsx as f32, vsy as f32, vsz as f32,
        image.repetition_time as f32, 1.0, 1.0, 1.0,
    ];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    header[108..112].copy_from_slice(&(VOX_OFFSET as f32).to_le_bytes());

    // scl_slope = 1.0, scl_inter = 0.0
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());

    // xyzt_units: mm + seconds
    header[123] = 2 | 8;

    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    // srow_x, srow_y, srow_z
    for row in 0..3 {
        for col in 0..4 {
            let offset = 280 + row * 16 + col * 4;
            header[offset..offset + 4].copy_from_slice(&(affine[row * 4 + col] as f32).to_le_bytes());
        }
    }

    // magic = "n+1\0" for NIfTI-1 single file
    header[344..348].copy_from_slice(b"n+1\0");

    let data = image.series.as_slice();
    let mut buffer = Vec::with_capacity(VOX_OFFSET + data.len() * 8);
    buffer.extend_from_slice(&header);
    // no extensions
    buffer.extend_from_slice(&[0u8; 4]);
    for &val in data {
        buffer.extend_from_slice(&val.to_le_bytes());
    }

    Ok(buffer)
}

/// Encode a series as gzipped NIfTI-1 bytes (.nii.gz)
pub fn save_nifti_series_gz(image: &NiftiSeries) -> Result<Vec<u8>> {
    let uncompressed = save_nifti_series(image)?;
    gzip_bytes(&uncompressed)
}

fn gzip_bytes(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| NordicError::Nifti(format!("Gzip compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| NordicError::Nifti(format!("Gzip finish failed: {}", e)))
}

/// Read a NIfTI file from a filesystem path
///
/// Supports both .nii and .nii.gz files.
pub fn read_nifti_file(path: &Path) -> Result<NiftiSeries> {
    let bytes = std::fs::read(path).map_err(|e| NordicError::io(path, e))?;
    load_nifti_series(&bytes).map_err(|e| match e {
        NordicError::Nifti(msg) => NordicError::Nifti(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Save a series to a file, creating parent directories as needed
///
/// If the path ends with .nii.gz, the file is gzip compressed.
/// Otherwise it is saved as uncompressed .nii.
pub fn save_nifti_to_file(path: &Path, image: &NiftiSeries) -> Result<()> {
    let bytes = if has_gz_suffix(path) {
        save_nifti_series_gz(image)?
    } else {
        save_nifti_series(image)?
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| NordicError::io(parent, e))?;
    }
    std::fs::write(path, &bytes).map_err(|e| NordicError::io(path, e))
}

fn has_gz_suffix(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// Compress a `.nii` file to `.nii.gz` and remove the original
///
/// Paths already ending in `.gz` are returned unchanged.
pub fn gzip_nii(path: &Path) -> Result<PathBuf> {
    if has_gz_suffix(path) {
        return Ok(path.to_path_buf());
    }
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));

    let bytes = std::fs::read(path).map_err(|e| NordicError::io(path, e))?;
    std::fs::write(&gz_path, gzip_bytes(&bytes)?).map_err(|e| NordicError::io(&gz_path, e))?;
    std::fs::remove_file(path).map_err(|e| NordicError::io(path, e))?;

    Ok(gz_path)
}

/// File name with a trailing `.nii.gz` or `.nii` removed
pub fn strip_nifti_extension(name: &str) -> &str {
    name.strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(name)
}

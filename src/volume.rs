//! 4D volume series container
//!
//! Volumes are stored back to back in a single flat buffer using Fortran
//! (column-major) ordering, matching the NIfTI convention:
//! index = x + y*nx + z*nx*ny + t*nx*ny*nz.
//! With the volume axis varying slowest, every 3D volume is a contiguous
//! slice of the buffer.

use std::ops::Range;

use crate::error::{NordicError, Result};

/// An ordered sequence of 3D scalar volumes.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeSeries {
    data: Vec<f64>,
    /// Spatial dimensions (nx, ny, nz)
    dims: (usize, usize, usize),
    n_volumes: usize,
}

impl VolumeSeries {
    /// Wrap a flat Fortran-ordered buffer.
    ///
    /// Fails if the buffer length is not `nx * ny * nz * n_volumes`.
    pub fn new(data: Vec<f64>, dims: (usize, usize, usize), n_volumes: usize) -> Result<Self> {
        let expected = dims.0 * dims.1 * dims.2 * n_volumes;
        if data.len() != expected {
            return Err(NordicError::InvalidInput(format!(
                "buffer of {} values does not match {}x{}x{}x{} series",
                data.len(), dims.0, dims.1, dims.2, n_volumes
            )));
        }
        Ok(VolumeSeries { data, dims, n_volumes })
    }

    /// Build a series by evaluating `f(x, y, z, t)` at every voxel.
    pub fn from_fn<F>(dims: (usize, usize, usize), n_volumes: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize, usize) -> f64,
    {
        let (nx, ny, nz) = dims;
        let mut data = Vec::with_capacity(nx * ny * nz * n_volumes);
        for t in 0..n_volumes {
            for k in 0..nz {
                for j in 0..ny {
                    for i in 0..nx {
                        data.push(f(i, j, k, t));
                    }
                }
            }
        }
        VolumeSeries { data, dims, n_volumes }
    }

    /// Stack equally shaped 3D volumes into a series.
    pub fn from_volumes(dims: (usize, usize, usize), volumes: &[Vec<f64>]) -> Result<Self> {
        let voxels = dims.0 * dims.1 * dims.2;
        let mut data = Vec::with_capacity(voxels * volumes.len());
        for (t, vol) in volumes.iter().enumerate() {
            if vol.len() != voxels {
                return Err(NordicError::InvalidInput(format!(
                    "volume {} has {} voxels, expected {}", t, vol.len(), voxels
                )));
            }
            data.extend_from_slice(vol);
        }
        Ok(VolumeSeries { data, dims, n_volumes: volumes.len() })
    }

    /// Number of volumes along the series axis
    pub fn len(&self) -> usize {
        self.n_volumes
    }

    pub fn is_empty(&self) -> bool {
        self.n_volumes == 0
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.dims
    }

    /// Voxels per volume
    pub fn voxels_per_volume(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    /// Flat Fortran-ordered buffer of the whole series
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Voxels of volume `t`. Panics if `t >= len()`.
    pub fn volume(&self, t: usize) -> &[f64] {
        let n = self.voxels_per_volume();
        &self.data[t * n..(t + 1) * n]
    }

    pub fn volumes(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_volumes).map(move |t| self.volume(t))
    }

    /// Copy of the volumes in `range` as a new series.
    pub fn slice_volumes(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.n_volumes {
            return Err(NordicError::IndexOutOfRange {
                index: range.end.max(range.start),
                len: self.n_volumes,
            });
        }
        let n = self.voxels_per_volume();
        Ok(VolumeSeries {
            data: self.data[range.start * n..range.end * n].to_vec(),
            dims: self.dims,
            n_volumes: range.end - range.start,
        })
    }

    /// Append `other` after `self` along the series axis.
    pub fn concat(&self, other: &VolumeSeries) -> Result<Self> {
        if self.dims != other.dims {
            return Err(NordicError::InvalidInput(format!(
                "cannot concatenate {:?} volumes with {:?} volumes", self.dims, other.dims
            )));
        }
        let mut data = Vec::with_capacity(self.data.len() + other.data.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&other.data);
        Ok(VolumeSeries {
            data,
            dims: self.dims,
            n_volumes: self.n_volumes + other.n_volumes,
        })
    }
}

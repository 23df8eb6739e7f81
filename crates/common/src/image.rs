//! Luma sample planes passed between the session, the estimators and the coder.
//!
//! Colour conversion is handled upstream; everything in the control plane works
//! on a single 8-bit luma plane with tightly packed rows.

use crate::error::ImageError;
use crate::types::Resolution;

/// An owned 8-bit sample plane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plane {
    resolution: Resolution,
    data: Vec<u8>,
}

impl Plane {
    /// Create a plane filled with zeros.
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            data: vec![0; resolution.pixel_count() as usize],
        }
    }

    /// Wrap existing sample data. The buffer length must equal `width * height`.
    pub fn from_vec(resolution: Resolution, data: Vec<u8>) -> Result<Self, ImageError> {
        let expected = resolution.pixel_count() as usize;
        if data.len() != expected {
            return Err(ImageError::SizeMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { resolution, data })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Borrow the plane as a [`PlaneRef`].
    pub fn view(&self) -> PlaneRef<'_> {
        PlaneRef {
            resolution: self.resolution,
            data: &self.data,
        }
    }

    /// Overwrite this plane with `src`, reusing the allocation when the geometry matches.
    pub fn copy_from(&mut self, src: PlaneRef<'_>) {
        self.resolution = src.resolution;
        self.data.clear();
        self.data.extend_from_slice(src.data);
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let idx = y as usize * self.resolution.width as usize + x as usize;
        self.data[idx] = value;
    }
}

/// A borrowed 8-bit sample plane.
#[derive(Copy, Clone, Debug)]
pub struct PlaneRef<'a> {
    resolution: Resolution,
    data: &'a [u8],
}

impl<'a> PlaneRef<'a> {
    /// Borrow sample data. The slice length must equal `width * height`.
    pub fn new(resolution: Resolution, data: &'a [u8]) -> Result<Self, ImageError> {
        let expected = resolution.pixel_count() as usize;
        if data.len() != expected {
            return Err(ImageError::SizeMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { resolution, data })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Sample at `(x, y)`. Panics when out of bounds.
    pub fn sample(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.resolution.width as usize + x as usize]
    }

    /// Sample at `(x, y)` with coordinates clamped to the picture edge.
    ///
    /// This behaves like a reference picture whose border has been extended
    /// infinitely, which lets motion vectors point past the picture boundary.
    pub fn sample_clamped(&self, x: i32, y: i32) -> u8 {
        let cx = x.clamp(0, self.resolution.width as i32 - 1) as usize;
        let cy = y.clamp(0, self.resolution.height as i32 - 1) as usize;
        self.data[cy * self.resolution.width as usize + cx]
    }

    pub fn to_plane(&self) -> Plane {
        Plane {
            resolution: self.resolution,
            data: self.data.to_vec(),
        }
    }
}

//! Detected sources and their quality flags
//!
//! Sources arrive from an upstream detection and measurement stage. The selector
//! only reads them, with one exception: the [`SourceFlags::STAR`] bit, which is
//! set on every source accepted as a PSF candidate.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-source detection flags (32 bits)
    ///
    /// Bit assignments follow the upstream measurement stage. Only `STAR` is
    /// written by this crate.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SourceFlags: u32 {
        /// Source footprint touches the image edge
        const EDGE = 1 << 0;
        /// Center pixel was interpolated over
        const INTERP_CENTER = 1 << 1;
        /// Center pixel is saturated
        const SATUR_CENTER = 1 << 2;
        /// Centroid fell back to the peak pixel
        const PEAKCENTER = 1 << 3;
        /// Selected as a PSF star
        const STAR = 1 << 4;

        /// Any of these disqualifies a source from PSF selection
        const BAD_SOURCE_MASK = Self::EDGE.bits()
            | Self::INTERP_CENTER.bits()
            | Self::SATUR_CENTER.bits()
            | Self::PEAKCENTER.bits();
    }
}

impl Default for SourceFlags {
    fn default() -> Self {
        SourceFlags::empty()
    }
}

/// Second-moment triple of a source shape (pixels²)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub ixx: f64,
    pub ixy: f64,
    pub iyy: f64,
}

impl Moments {
    pub fn new(ixx: f64, ixy: f64, iyy: f64) -> Self {
        Self { ixx, ixy, iyy }
    }

    /// Moments of a round source with the given Gaussian sigma
    pub fn round(sigma: f64) -> Self {
        Self::new(sigma * sigma, 0.0, sigma * sigma)
    }

    /// Determinant of the moment matrix
    pub fn determinant(&self) -> f64 {
        self.ixx * self.iyy - self.ixy * self.ixy
    }

    pub fn is_finite(&self) -> bool {
        self.ixx.is_finite() && self.ixy.is_finite() && self.iyy.is_finite()
    }
}

/// A detected source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Catalog identifier
    pub id: u64,
    /// Centroid column in image pixels
    pub x: f64,
    /// Centroid row in image pixels
    pub y: f64,
    /// Measured second moments
    #[serde(flatten)]
    pub moments: Moments,
    /// PSF flux estimate
    pub psf_flux: f64,
    /// Quality flags
    #[serde(default)]
    pub flags: SourceFlags,
}

impl Source {
    pub fn new(id: u64, x: f64, y: f64, moments: Moments, psf_flux: f64) -> Self {
        Self {
            id,
            x,
            y,
            moments,
            psf_flux,
            flags: SourceFlags::empty(),
        }
    }

    /// Builder-style helper for setting flags
    pub fn with_flags(mut self, flags: SourceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn is_star(&self) -> bool {
        self.flags.contains(SourceFlags::STAR)
    }

    /// Mark this source as a PSF star
    pub fn set_star(&mut self) {
        self.flags.insert(SourceFlags::STAR);
    }
}

//! Histogram of source shapes in (Ixx, Iyy) space
//!
//! Point sources share the PSF's second moments, so they pile up in one compact
//! peak of this histogram while galaxies and cosmic rays scatter. The maximum
//! seeing FWHM that can be tolerated is `max / 2.35` pixels; the resolution that
//! separates stars from galaxies is `size / max` bins per pixel².

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::clump::{Clump, ClumpFinder};
use crate::distortion::MomentCorrector;
use crate::error::SelectionError;
use crate::source::Source;

/// Grid resolution and moment range of a [`MomentHistogram`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramConfig {
    /// Number of Ixx bins
    pub x_size: usize,
    /// Number of Iyy bins
    pub y_size: usize,
    /// Ixx value at the far edge of the grid
    pub x_max: f64,
    /// Iyy value at the far edge of the grid
    pub y_max: f64,
}

impl HistogramConfig {
    /// Map moments to (fractional) histogram pixel coordinates
    pub fn moments_to_pixel(&self, ixx: f64, iyy: f64) -> (f64, f64) {
        let x = ixx * self.x_size as f64 / self.x_max;
        let y = iyy * self.y_size as f64 / self.y_max;
        (x, y)
    }

    /// Map histogram pixel coordinates back to moments
    pub fn pixel_to_moments(&self, x: f64, y: f64) -> (f64, f64) {
        let ixx = x * self.x_max / self.x_size as f64;
        let iyy = y * self.y_max / self.y_size as f64;
        (ixx, iyy)
    }
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            x_size: 40,
            y_size: 40,
            x_max: 30.0,
            y_max: 30.0,
        }
    }
}

/// 2-D count histogram of corrected (Ixx, Iyy)
#[derive(Debug, Clone)]
pub struct MomentHistogram {
    config: HistogramConfig,
    /// Counts with shape (y_size, x_size)
    counts: Array2<u32>,
    total: u64,
}

impl MomentHistogram {
    pub fn new(config: HistogramConfig) -> Self {
        Self {
            config,
            counts: Array2::zeros((config.y_size, config.x_size)),
            total: 0,
        }
    }

    pub fn config(&self) -> &HistogramConfig {
        &self.config
    }

    /// Bin counts, indexed `[iyy_bin, ixx_bin]`
    pub fn image(&self) -> &Array2<u32> {
        &self.counts
    }

    /// Number of sources accumulated
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Count in cell `(i, j)` where `i` is the Ixx bin and `j` the Iyy bin
    pub fn count(&self, i: usize, j: usize) -> u32 {
        self.counts.get((j, i)).copied().unwrap_or(0)
    }

    pub fn moments_to_pixel(&self, ixx: f64, iyy: f64) -> (f64, f64) {
        self.config.moments_to_pixel(ixx, iyy)
    }

    pub fn pixel_to_moments(&self, x: f64, y: f64) -> (f64, f64) {
        self.config.pixel_to_moments(x, y)
    }

    /// Add a source to the histogram.
    ///
    /// Moments are corrected for distortion at the source position first.
    /// Returns `false` when the source lands outside the grid, in the null cell
    /// `(0, 0)`, or cannot be mapped at all; such sources are dropped.
    pub fn insert(&mut self, source: &Source, corrector: &dyn MomentCorrector) -> bool {
        let m = corrector.correct(source.x, source.y, source.moments);
        let (x, y) = self.moments_to_pixel(m.ixx, m.iyy);
        if !x.is_finite() || !y.is_finite() {
            log::trace!("Source {} has unmappable moments {:?}", source.id, m);
            return false;
        }

        // Truncate toward zero, as an integer cast would
        let i = x.trunc();
        let j = y.trunc();
        if i < 0.0 || j < 0.0 || i >= self.config.x_size as f64 || j >= self.config.y_size as f64
        {
            log::trace!(
                "Source {} at ({:.2}, {:.2}) is outside the histogram",
                source.id,
                x,
                y
            );
            return false;
        }

        let (i, j) = (i as usize, j as usize);
        if i == 0 && j == 0 {
            return false;
        }

        self.counts[[j, i]] += 1;
        self.total += 1;
        true
    }

    /// Histogram embedded in a zero-padded buffer twice its size.
    ///
    /// The histogram occupies the block starting at `(y_size, x_size)`, so padded
    /// coordinates minus `(x_size, y_size)` are histogram coordinates.
    pub fn padded_image(&self) -> Array2<f64> {
        let (rows, cols) = self.counts.dim();
        let mut padded = Array2::zeros((2 * rows, 2 * cols));
        padded
            .slice_mut(s![rows.., cols..])
            .assign(&self.counts.mapv(f64::from));
        padded
    }

    /// Largest bin count
    pub fn max_count(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Find the clumps of this histogram with the default detector and measurer.
    ///
    /// See [`ClumpFinder::find_clumps`].
    pub fn get_clumps(&self, sigma: f64) -> Result<Vec<Clump>, SelectionError> {
        ClumpFinder::default().find_clumps(self, sigma)
    }
}

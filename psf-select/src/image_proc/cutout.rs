//! PSF candidate cutouts
//!
//! A PSF candidate is a small stamp of the exposure centered on an accepted
//! source, sized to the PSF kernel plus a border on every side.

use ndarray::{s, Array2, ArrayView2};
use thiserror::Error;

use crate::source::Source;

/// Errors from building a PSF candidate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CandidateError {
    #[error("Source {0} has a non-finite position")]
    NonFinitePosition(u64),
    #[error("Cutout of {width}x{height} around source {id} at ({x:.1}, {y:.1}) leaves the image")]
    OutsideImage {
        id: u64,
        x: f64,
        y: f64,
        width: usize,
        height: usize,
    },
    #[error("Cutout size must be positive, got {0}x{1}")]
    EmptyCutout(usize, usize),
}

/// A source nominated for PSF modelling together with its stamp
#[derive(Debug, Clone, PartialEq)]
pub struct PsfCandidate {
    /// Identifier of the originating source
    pub source_id: u64,
    /// Source column in image pixels
    pub x: f64,
    /// Source row in image pixels
    pub y: f64,
    /// Image column of the stamp's left edge
    pub x0: usize,
    /// Image row of the stamp's top edge
    pub y0: usize,
    /// Border width included on every side of the kernel
    pub border_width: usize,
    /// Stamp pixels, shape (height, width)
    pub image: Array2<f64>,
}

impl PsfCandidate {
    pub fn width(&self) -> usize {
        self.image.ncols()
    }

    pub fn height(&self) -> usize {
        self.image.nrows()
    }

    /// Maximum stamp value; NaN if any pixel is NaN
    pub fn peak(&self) -> f64 {
        self.image.iter().fold(f64::NEG_INFINITY, |acc, &v| {
            if acc.is_nan() || v.is_nan() {
                f64::NAN
            } else {
                acc.max(v)
            }
        })
    }
}

/// Builds PSF candidates from accepted sources.
pub trait CandidateBuilder {
    fn build(
        &self,
        source: &Source,
        image: ArrayView2<f64>,
        width: usize,
        height: usize,
        border_width: usize,
    ) -> Result<PsfCandidate, CandidateError>;
}

/// Copies a stamp centered on the pixel containing the source centroid
#[derive(Debug, Clone, Copy, Default)]
pub struct CutoutBuilder;

impl CandidateBuilder for CutoutBuilder {
    fn build(
        &self,
        source: &Source,
        image: ArrayView2<f64>,
        width: usize,
        height: usize,
        border_width: usize,
    ) -> Result<PsfCandidate, CandidateError> {
        if width == 0 || height == 0 {
            return Err(CandidateError::EmptyCutout(width, height));
        }
        if !source.x.is_finite() || !source.y.is_finite() {
            return Err(CandidateError::NonFinitePosition(source.id));
        }

        let outside = || CandidateError::OutsideImage {
            id: source.id,
            x: source.x,
            y: source.y,
            width,
            height,
        };

        // Bounds are checked in f64 so positions far outside the image never
        // reach an integer cast
        let x0 = source.x.round() - (width / 2) as f64;
        let y0 = source.y.round() - (height / 2) as f64;
        let (rows, cols) = image.dim();
        if x0 < 0.0
            || y0 < 0.0
            || x0 + width as f64 > cols as f64
            || y0 + height as f64 > rows as f64
        {
            return Err(outside());
        }
        let (x0, y0) = (x0 as usize, y0 as usize);

        let stamp = image
            .slice(s![y0..y0 + height, x0..x0 + width])
            .to_owned();

        Ok(PsfCandidate {
            source_id: source.id,
            x: source.x,
            y: source.y,
            x0,
            y0,
            border_width,
            image: stamp,
        })
    }
}

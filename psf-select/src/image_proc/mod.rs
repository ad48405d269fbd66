//! Pixel-level collaborators of the star selector
//!
//! These are the footprint detector and region measurer run over the moment
//! histogram, and the cutout builder that turns accepted sources into PSF
//! candidates. Each sits behind a trait so callers can substitute their own.
//! [`load_image`] reads exposures from disk.

pub mod cutout;
pub mod image;
pub mod moments;
pub mod thresholding;

pub use cutout::{CandidateBuilder, CandidateError, CutoutBuilder, PsfCandidate};
pub use self::image::{gray16_image_to_array2, load_image};
pub use moments::{MeasurementError, RegionMeasurement, RegionMeasurer, WeightedMomentMeasurer};
pub use thresholding::{BoundingBox, Footprint, FootprintDetector, ThresholdDetector};

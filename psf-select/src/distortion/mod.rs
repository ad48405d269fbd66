//! Optical distortion correction of source shapes.
//!
//! Field distortion stretches the images of point sources away from the optical
//! axis, so the same PSF produces different second moments across the focal
//! plane. Before sources are clustered in moment space their moments are mapped
//! back to the shape they would have at an undistorted reference location.
//!
//! The correction must be applied identically when building the moment
//! histogram and when classifying sources against its clumps, otherwise the two
//! passes disagree about where a source lies. Both passes therefore take the same
//! [`MomentCorrector`].
//!
//! # Supported models
//!
//! - [`NoDistortion`]: identity, for detectors without a distortion model
//! - [`RadialPolyDistortion`]: radial polynomial about an optical center

pub mod radial;

pub use radial::{DistortionError, RadialPolyDistortion};

use crate::source::Moments;

/// Maps observed second moments to their undistorted equivalent.
pub trait MomentCorrector {
    /// Correct `moments` observed at image position `(x, y)`.
    fn correct(&self, x: f64, y: f64, moments: Moments) -> Moments;

    /// Returns `true` if `correct` never changes its input.
    fn is_identity(&self) -> bool {
        false
    }
}

/// Identity correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDistortion;

impl MomentCorrector for NoDistortion {
    fn correct(&self, _x: f64, _y: f64, moments: Moments) -> Moments {
        moments
    }

    fn is_identity(&self) -> bool {
        true
    }
}

impl<T: MomentCorrector + ?Sized> MomentCorrector for Box<T> {
    fn correct(&self, x: f64, y: f64, moments: Moments) -> Moments {
        (**self).correct(x, y, moments)
    }

    fn is_identity(&self) -> bool {
        (**self).is_identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_passthrough() {
        let m = Moments::new(3.0, -0.25, 5.0);
        assert_eq!(NoDistortion.correct(100.0, -40.0, m), m);
        assert!(NoDistortion.is_identity());
    }

    #[test]
    fn test_boxed_corrector_delegates() {
        let boxed: Box<dyn MomentCorrector> = Box::new(NoDistortion);
        let m = Moments::round(1.2);
        assert_eq!(boxed.correct(0.0, 0.0, m), m);
        assert!(boxed.is_identity());
    }
}

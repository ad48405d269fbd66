//! Radial polynomial distortion: r_d = c0 + c1·r + c2·r² + c3·r³ + ...
//!
//! Coordinates are image pixels; the polynomial acts on the distance from the
//! optical center. Shapes are carried through the local Jacobian of the map, so
//! a moment tensor `M` at an undistorted position appears as `J·M·Jᵀ`.

use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

use super::MomentCorrector;
use crate::source::Moments;

const NEWTON_MAX_ITER: usize = 30;
const NEWTON_TOL: f64 = 1e-12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistortionError {
    #[error("Radial polynomial needs at least 2 coefficients, got {0}")]
    TooFewCoefficients(usize),
    #[error("Constant term must be zero so the optical center maps to itself, got {0}")]
    NonZeroOffset(f64),
    #[error("Linear term must be positive, got {0}")]
    NonPositiveScale(f64),
}

/// Radial polynomial distortion about an optical center.
///
/// The forward model maps an ideal radius `r` to the observed radius
/// `r_d = Σ cᵢ·rⁱ`. Undistortion inverts it with Newton-Raphson.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialPolyDistortion {
    coefficients: Vec<f64>,
    center: (f64, f64),
}

impl RadialPolyDistortion {
    /// Create a model from polynomial coefficients `[c0, c1, c2, ...]`.
    ///
    /// `c0` must be zero and `c1` positive. `[0.0, 1.0, 2.0e-4, 3.0e-8]` is a
    /// strong pincushion; `[0.0, 1.0]` is the identity.
    pub fn new(coefficients: Vec<f64>, center: (f64, f64)) -> Result<Self, DistortionError> {
        if coefficients.len() < 2 {
            return Err(DistortionError::TooFewCoefficients(coefficients.len()));
        }
        if coefficients[0] != 0.0 {
            return Err(DistortionError::NonZeroOffset(coefficients[0]));
        }
        if coefficients[1] <= 0.0 || !coefficients[1].is_finite() {
            return Err(DistortionError::NonPositiveScale(coefficients[1]));
        }
        Ok(Self {
            coefficients,
            center,
        })
    }

    /// Optical center of a `width` x `height` detector whose boresight is the
    /// central pixel.
    pub fn centered_on_detector(
        coefficients: Vec<f64>,
        width: usize,
        height: usize,
    ) -> Result<Self, DistortionError> {
        let center = (0.5 * (width as f64 - 1.0), 0.5 * (height as f64 - 1.0));
        Self::new(coefficients, center)
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    /// Observed radius for ideal radius `r`
    fn radius(&self, r: f64) -> f64 {
        // Horner from the highest order term
        self.coefficients.iter().rev().fold(0.0, |acc, &c| acc * r + c)
    }

    /// dR/dr at ideal radius `r`
    fn radius_derivative(&self, r: f64) -> f64 {
        self.coefficients
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (i, &c)| acc * r + i as f64 * c)
    }

    /// Ideal radius for observed radius `r_d`
    fn inverse_radius(&self, r_d: f64) -> f64 {
        let mut r = r_d / self.coefficients[1];
        for _ in 0..NEWTON_MAX_ITER {
            let f = self.radius(r) - r_d;
            let df = self.radius_derivative(r);
            if df == 0.0 || !df.is_finite() {
                break;
            }
            let delta = f / df;
            r -= delta;
            if delta.abs() < NEWTON_TOL * r_d.max(1.0) {
                break;
            }
        }
        r
    }

    /// Forward distortion of an ideal position to its observed position.
    pub fn distort_position(&self, x: f64, y: f64) -> (f64, f64) {
        let p = Vector2::new(x - self.center.0, y - self.center.1);
        let r = p.norm();
        let scale = if r < NEWTON_TOL {
            self.coefficients[1]
        } else {
            self.radius(r) / r
        };
        (self.center.0 + p.x * scale, self.center.1 + p.y * scale)
    }

    /// Inverse distortion of an observed position to its ideal position.
    pub fn undistort_position(&self, x: f64, y: f64) -> (f64, f64) {
        let d = Vector2::new(x - self.center.0, y - self.center.1);
        let r_d = d.norm();
        let scale = if r_d < NEWTON_TOL {
            1.0 / self.coefficients[1]
        } else {
            self.inverse_radius(r_d) / r_d
        };
        (self.center.0 + d.x * scale, self.center.1 + d.y * scale)
    }

    /// Jacobian of the forward map at an ideal position.
    ///
    /// With `s(r) = R(r)/r` the map is `p ↦ s(r)·p`, giving
    /// `J = s·I + (s'(r)/r)·p·pᵀ`.
    fn jacobian(&self, x: f64, y: f64) -> Matrix2<f64> {
        let p = Vector2::new(x - self.center.0, y - self.center.1);
        let r = p.norm();
        if r < NEWTON_TOL {
            return Matrix2::identity() * self.coefficients[1];
        }
        let big_r = self.radius(r);
        let s = big_r / r;
        let ds = (self.radius_derivative(r) * r - big_r) / (r * r);
        Matrix2::identity() * s + p * p.transpose() * (ds / r)
    }

    /// Moments observed at the distorted image of ideal position `(x, y)`.
    pub fn distort_moments(&self, x: f64, y: f64, moments: Moments) -> Moments {
        let j = self.jacobian(x, y);
        from_matrix(j * to_matrix(moments) * j.transpose())
    }

    /// Moments a source observed at `(x, y)` would have without distortion.
    ///
    /// A singular Jacobian leaves the moments unchanged.
    pub fn undistort_moments(&self, x: f64, y: f64, moments: Moments) -> Moments {
        let (ux, uy) = self.undistort_position(x, y);
        match self.jacobian(ux, uy).try_inverse() {
            Some(j_inv) => from_matrix(j_inv * to_matrix(moments) * j_inv.transpose()),
            None => {
                log::debug!(
                    "Singular distortion Jacobian at ({x:.1}, {y:.1}), moments left as observed"
                );
                moments
            }
        }
    }

    /// Largest fractional stretch of a round source over a `width` x `height` detector.
    ///
    /// Evaluated at the detector corners, where radial distortion peaks.
    pub fn max_shear(&self, width: usize, height: usize) -> f64 {
        let corners = [
            (0.0, 0.0),
            (width as f64 - 1.0, 0.0),
            (0.0, height as f64 - 1.0),
            (width as f64 - 1.0, height as f64 - 1.0),
        ];
        corners
            .iter()
            .map(|&(x, y)| {
                let (ux, uy) = self.undistort_position(x, y);
                let m = self.distort_moments(ux, uy, Moments::round(1.0));
                let eig = to_matrix(m).symmetric_eigenvalues();
                let major = eig.max().max(0.0).sqrt();
                let minor = eig.min().max(0.0).sqrt();
                if major > 0.0 {
                    1.0 - minor / major
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max)
    }
}

impl MomentCorrector for RadialPolyDistortion {
    fn correct(&self, x: f64, y: f64, moments: Moments) -> Moments {
        self.undistort_moments(x, y, moments)
    }

    fn is_identity(&self) -> bool {
        self.coefficients[1] == 1.0 && self.coefficients[2..].iter().all(|&c| c == 0.0)
    }
}

fn to_matrix(m: Moments) -> Matrix2<f64> {
    Matrix2::new(m.ixx, m.ixy, m.ixy, m.iyy)
}

fn from_matrix(m: Matrix2<f64>) -> Moments {
    // Average the off-diagonal terms to keep the result exactly symmetric
    Moments::new(m[(0, 0)], 0.5 * (m[(0, 1)] + m[(1, 0)]), m[(1, 1)])
}

//! Clump finding in the moment histogram
//!
//! A clump is a density peak of the (Ixx, Iyy) histogram, standing for the
//! dominant PSF shape. Each clump is summarized by its centroid and the inverse
//! of its covariance, which the classifier uses as an elliptical distance.
//!
//! # Algorithm
//!
//! 1. Embed the histogram in a zero-padded buffer twice its size
//! 2. Threshold at `max - 2·sigma·√max`, a Poisson floor under the highest bin
//! 3. Split the above-threshold pixels into connected footprints
//! 4. Measure each footprint's count-weighted centroid and second moments
//! 5. Clamp both variances to at least [`IZZ_MIN`] and invert the moment matrix

use log::{debug, warn};

use crate::error::SelectionError;
use crate::histogram::MomentHistogram;
use crate::image_proc::{
    FootprintDetector, MeasurementError, RegionMeasurer, ThresholdDetector, WeightedMomentMeasurer,
};
use crate::source::Moments;

/// Smallest clump variance, in histogram pixels²
pub const IZZ_MIN: f64 = 0.5;

/// Quadratic form used when the clump moment matrix is exactly singular
pub const DEGENERATE_FORM: (f64, f64, f64) = (1e4, 0.0, 1e4);

/// A peak of the moment histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clump {
    /// Histogram count at the centroid
    pub peak: f64,
    /// Centroid column in histogram pixels
    pub x: f64,
    /// Centroid row in histogram pixels
    pub y: f64,
    /// Clamped clump moments in histogram pixels²
    pub ixx: f64,
    pub ixy: f64,
    pub iyy: f64,
    /// Inverse-covariance coefficients: dist² = a·dx² + 2b·dx·dy + c·dy²
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Clump {
    /// Build a clump from a measured centroid and shape.
    ///
    /// Variances below [`IZZ_MIN`] are raised to it; the cross term is kept.
    pub fn from_measurement(peak: f64, x: f64, y: f64, moments: Moments) -> Self {
        let m = clamp_moments(moments);
        let (a, b, c) = quadratic_form(m);
        Self {
            peak,
            x,
            y,
            ixx: m.ixx,
            ixy: m.ixy,
            iyy: m.iyy,
            a,
            b,
            c,
        }
    }

    /// Squared elliptical distance of histogram pixel `(x, y)` from the centroid
    pub fn distance_squared(&self, x: f64, y: f64) -> f64 {
        let dx = x - self.x;
        let dy = y - self.y;
        self.a * dx * dx + 2.0 * self.b * dx * dy + self.c * dy * dy
    }

    pub fn moments(&self) -> Moments {
        Moments::new(self.ixx, self.ixy, self.iyy)
    }
}

/// Raise `ixx` and `iyy` to at least [`IZZ_MIN`], leaving `ixy` untouched
pub fn clamp_moments(m: Moments) -> Moments {
    if m.ixx < IZZ_MIN || m.iyy < IZZ_MIN {
        Moments::new(m.ixx.max(IZZ_MIN), m.ixy, m.iyy.max(IZZ_MIN))
    } else {
        m
    }
}

/// Inverse of the 2x2 moment matrix as `(a, b, c)`
///
/// An exactly zero determinant yields [`DEGENERATE_FORM`].
pub fn quadratic_form(m: Moments) -> (f64, f64, f64) {
    let det = m.determinant();
    if det == 0.0 {
        return DEGENERATE_FORM;
    }
    (m.iyy / det, -m.ixy / det, m.ixx / det)
}

/// Locates clumps with pluggable detection and measurement
pub struct ClumpFinder {
    detector: Box<dyn FootprintDetector>,
    measurer: Box<dyn RegionMeasurer>,
}

impl Default for ClumpFinder {
    fn default() -> Self {
        Self::new(Box::new(ThresholdDetector), Box::new(WeightedMomentMeasurer))
    }
}

impl ClumpFinder {
    pub fn new(detector: Box<dyn FootprintDetector>, measurer: Box<dyn RegionMeasurer>) -> Self {
        Self { detector, measurer }
    }

    /// Find the clumps of `histogram`.
    ///
    /// `sigma` scales the Poisson margin below the highest bin used as the
    /// detection threshold. Clumps are returned in detection order.
    ///
    /// # Errors
    /// * `SelectionError::NoCandidates` - the histogram is empty
    /// * `SelectionError::ClumpDetectionFailed` - no footprint could be measured
    pub fn find_clumps(
        &self,
        histogram: &MomentHistogram,
        sigma: f64,
    ) -> Result<Vec<Clump>, SelectionError> {
        if histogram.total() == 0 {
            return Err(SelectionError::NoCandidates);
        }

        let padded = histogram.padded_image();
        let (height, width) = histogram.image().dim();

        let max_val = f64::from(histogram.max_count());
        let threshold = max_val - 2.0 * sigma * max_val.sqrt();

        let footprints = self.detector.detect(padded.view(), threshold);
        debug!(
            "Histogram max {max_val}, threshold {threshold:.3}: {} footprints",
            footprints.len()
        );

        let mut clumps = Vec::with_capacity(footprints.len());
        let mut last_error: Option<MeasurementError> = None;

        for footprint in &footprints {
            let measurement = match self.measurer.measure(padded.view(), footprint) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping histogram footprint: {e}");
                    last_error = Some(e);
                    continue;
                }
            };

            let peak = padded
                .get((
                    measurement.y.trunc() as usize,
                    measurement.x.trunc() as usize,
                ))
                .copied()
                .unwrap_or(0.0);

            let clump = Clump::from_measurement(
                peak,
                measurement.x - width as f64,
                measurement.y - height as f64,
                measurement.moments,
            );
            debug!(
                "Clump at ({:.2}, {:.2}) peak {}: moments ({:.3}, {:.3}, {:.3})",
                clump.x, clump.y, clump.peak, clump.ixx, clump.ixy, clump.iyy
            );
            clumps.push(clump);
        }

        if clumps.is_empty() {
            return Err(SelectionError::ClumpDetectionFailed { last_error });
        }

        Ok(clumps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::NoDistortion;
    use crate::histogram::HistogramConfig;
    use crate::image_proc::{Footprint, RegionMeasurement};
    use crate::source::Source;
    use approx::assert_relative_eq;
    use ndarray::ArrayView2;

    fn histogram_with(points: &[(f64, f64, usize)]) -> MomentHistogram {
        let mut hist = MomentHistogram::new(HistogramConfig::default());
        let mut id = 0;
        for &(ixx, iyy, n) in points {
            for _ in 0..n {
                id += 1;
                let s = Source::new(id, 50.0, 50.0, Moments::new(ixx, 0.0, iyy), 1e4);
                assert!(hist.insert(&s, &NoDistortion));
            }
        }
        hist
    }

    #[test]
    fn test_degenerate_clump_is_clamped() {
        // Every source in one bin: the clump has zero measured width
        let hist = histogram_with(&[(4.0, 4.0, 12)]);
        let clumps = hist.get_clumps(1.0).unwrap();

        assert_eq!(clumps.len(), 1);
        let clump = clumps[0];
        assert_eq!(clump.ixx, IZZ_MIN);
        assert_eq!(clump.iyy, IZZ_MIN);
        assert_eq!(clump.ixy, 0.0);
        assert!(clump.a > 0.0);
        assert!(clump.c > 0.0);
        assert_relative_eq!(clump.a, 2.0, epsilon = 1e-12);
        assert_eq!((clump.x, clump.y), (5.0, 5.0));
        assert_eq!(clump.peak, 12.0);
    }

    #[test]
    fn test_clamp_keeps_cross_term() {
        let m = clamp_moments(Moments::new(0.1, 0.05, 3.0));
        assert_eq!(m, Moments::new(IZZ_MIN, 0.05, 3.0));
        let wide = Moments::new(2.0, 0.3, 1.0);
        assert_eq!(clamp_moments(wide), wide);
    }

    #[test]
    fn test_quadratic_form_inverts() {
        let m = Moments::new(2.0, 0.5, 1.0);
        let (a, b, c) = quadratic_form(m);
        // [[a, b], [b, c]] * [[ixx, ixy], [ixy, iyy]] == I
        assert_relative_eq!(a * m.ixx + b * m.ixy, 1.0, epsilon = 1e-12);
        assert_relative_eq!(a * m.ixy + b * m.iyy, 0.0, epsilon = 1e-12);
        assert_relative_eq!(b * m.ixy + c * m.iyy, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix_uses_fallback() {
        assert_eq!(quadratic_form(Moments::new(1.0, 1.0, 1.0)), DEGENERATE_FORM);
        let clump = Clump::from_measurement(3.0, 1.0, 1.0, Moments::new(2.0, 2.0, 2.0));
        assert_eq!((clump.a, clump.b, clump.c), DEGENERATE_FORM);
    }

    #[test]
    fn test_distance_squared() {
        let clump = Clump::from_measurement(1.0, 5.0, 5.0, Moments::new(1.0, 0.0, 4.0));
        assert_relative_eq!(clump.distance_squared(6.0, 5.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(clump.distance_squared(5.0, 7.0), 1.0, epsilon = 1e-12);
        assert_eq!(clump.distance_squared(5.0, 5.0), 0.0);
        assert!(clump.distance_squared(f64::NAN, 5.0).is_nan());
    }

    #[test]
    fn test_two_separated_clumps_in_raster_order() {
        // Iyy sets the row, so the (20, 6) clump is scanned before (4, 20)
        let hist = histogram_with(&[(4.0, 20.0, 9), (20.0, 6.0, 16), (12.0, 12.0, 1)]);
        let clumps = hist.get_clumps(1.0).unwrap();

        // max 16, threshold 8: the single outlier bin is not a clump
        assert_eq!(clumps.len(), 2);
        let (x0, y0) = hist.moments_to_pixel(20.0, 6.0);
        let (x1, y1) = hist.moments_to_pixel(4.0, 20.0);
        assert_eq!((clumps[0].x, clumps[0].y), (x0.trunc(), y0.trunc()));
        assert_eq!((clumps[1].x, clumps[1].y), (x1.trunc(), y1.trunc()));
        assert_eq!(clumps[0].peak, 16.0);
        assert_eq!(clumps[1].peak, 9.0);
    }

    struct FailingMeasurer;

    impl RegionMeasurer for FailingMeasurer {
        fn measure(
            &self,
            _image: ArrayView2<f64>,
            _footprint: &Footprint,
        ) -> Result<RegionMeasurement, MeasurementError> {
            Err(MeasurementError::NonFinite)
        }
    }

    #[test]
    fn test_all_measurements_failing() {
        let hist = histogram_with(&[(4.0, 4.0, 5)]);
        let finder = ClumpFinder::new(Box::new(ThresholdDetector), Box::new(FailingMeasurer));
        assert_eq!(
            finder.find_clumps(&hist, 1.0),
            Err(SelectionError::ClumpDetectionFailed {
                last_error: Some(MeasurementError::NonFinite)
            })
        );
    }

    struct NoFootprints;

    impl FootprintDetector for NoFootprints {
        fn detect(&self, _image: ArrayView2<f64>, _threshold: f64) -> Vec<Footprint> {
            Vec::new()
        }
    }

    #[test]
    fn test_no_footprints_has_no_cause() {
        let hist = histogram_with(&[(4.0, 4.0, 5)]);
        let finder = ClumpFinder::new(Box::new(NoFootprints), Box::new(WeightedMomentMeasurer));
        assert_eq!(
            finder.find_clumps(&hist, 1.0),
            Err(SelectionError::ClumpDetectionFailed { last_error: None })
        );
    }
}

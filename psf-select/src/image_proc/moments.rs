//! Weighted moment measurement of footprints
//!
//! Each footprint is reduced to a centroid and a second-moment triple using the
//! image values as weights. On the moment histogram the weights are source counts,
//! so the result describes the spread of a clump of sources in moment space.

use ndarray::ArrayView2;
use thiserror::Error;

use super::thresholding::Footprint;
use crate::source::Moments;

/// Errors from measuring a single footprint
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("Footprint has no pixels")]
    EmptyFootprint,
    #[error("Footprint pixel ({0}, {1}) lies outside the image")]
    OutOfBounds(usize, usize),
    #[error("Footprint has no positive weight (total {0})")]
    NoWeight(f64),
    #[error("Measured moments are not finite")]
    NonFinite,
}

/// Centroid, shape and peak of one footprint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionMeasurement {
    /// Weighted column centroid
    pub x: f64,
    /// Weighted row centroid
    pub y: f64,
    /// Weighted central second moments
    pub moments: Moments,
    /// Largest pixel value in the footprint
    pub peak: f64,
}

/// Measures footprints found by a [`FootprintDetector`](super::FootprintDetector).
pub trait RegionMeasurer {
    fn measure(
        &self,
        image: ArrayView2<f64>,
        footprint: &Footprint,
    ) -> Result<RegionMeasurement, MeasurementError>;
}

/// First and second weighted moments over the footprint pixels
///
/// Pixels with non-positive values carry no weight.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedMomentMeasurer;

impl RegionMeasurer for WeightedMomentMeasurer {
    fn measure(
        &self,
        image: ArrayView2<f64>,
        footprint: &Footprint,
    ) -> Result<RegionMeasurement, MeasurementError> {
        if footprint.is_empty() {
            return Err(MeasurementError::EmptyFootprint);
        }
        let (rows, cols) = image.dim();
        let bbox = &footprint.bbox;
        if bbox.x_max() > cols || bbox.y_max() > rows {
            return Err(MeasurementError::OutOfBounds(bbox.y_max() - 1, bbox.x_max() - 1));
        }

        let mut m00 = 0.0;
        let mut m10 = 0.0;
        let mut m01 = 0.0;
        let mut peak = f64::NEG_INFINITY;

        for &(row, col) in &footprint.pixels {
            let value = *image
                .get((row, col))
                .ok_or(MeasurementError::OutOfBounds(row, col))?;
            peak = peak.max(value);
            if value > 0.0 {
                m00 += value;
                m10 += col as f64 * value;
                m01 += row as f64 * value;
            }
        }

        if m00 <= 0.0 || !m00.is_finite() {
            return Err(MeasurementError::NoWeight(m00));
        }

        let x = m10 / m00;
        let y = m01 / m00;

        // Central moments about the centroid
        let mut mu20 = 0.0;
        let mut mu11 = 0.0;
        let mut mu02 = 0.0;
        for &(row, col) in &footprint.pixels {
            let value = image[[row, col]];
            if value > 0.0 {
                let dx = col as f64 - x;
                let dy = row as f64 - y;
                mu20 += dx * dx * value;
                mu11 += dx * dy * value;
                mu02 += dy * dy * value;
            }
        }

        let moments = Moments::new(mu20 / m00, mu11 / m00, mu02 / m00);
        if !moments.is_finite() || !x.is_finite() || !y.is_finite() {
            return Err(MeasurementError::NonFinite);
        }

        Ok(RegionMeasurement {
            x,
            y,
            moments,
            peak,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::thresholding::{FootprintDetector, ThresholdDetector};
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn single_footprint(image: &Array2<f64>, threshold: f64) -> Footprint {
        let mut footprints = ThresholdDetector.detect(image.view(), threshold);
        assert_eq!(footprints.len(), 1);
        footprints.remove(0)
    }

    #[test]
    fn test_single_pixel_has_zero_width() {
        let mut image = Array2::zeros((5, 5));
        image[[3, 1]] = 7.0;
        let fp = single_footprint(&image, 0.0);

        let m = WeightedMomentMeasurer.measure(image.view(), &fp).unwrap();
        assert_eq!(m.x, 1.0);
        assert_eq!(m.y, 3.0);
        assert_eq!(m.moments, Moments::new(0.0, 0.0, 0.0));
        assert_eq!(m.peak, 7.0);
    }

    #[test]
    fn test_weighted_centroid_and_spread() {
        let mut image = Array2::zeros((6, 6));
        image[[2, 2]] = 1.0;
        image[[2, 3]] = 3.0;
        image[[3, 2]] = 1.0;
        image[[3, 3]] = 3.0;
        let fp = single_footprint(&image, 0.5);

        let m = WeightedMomentMeasurer.measure(image.view(), &fp).unwrap();
        assert_relative_eq!(m.x, 2.75, epsilon = 1e-12);
        assert_relative_eq!(m.y, 2.5, epsilon = 1e-12);
        // x: weights 2 at 2 and 6 at 3 -> variance 0.1875
        assert_relative_eq!(m.moments.ixx, 0.1875, epsilon = 1e-12);
        assert_relative_eq!(m.moments.iyy, 0.25, epsilon = 1e-12);
        assert_relative_eq!(m.moments.ixy, 0.0, epsilon = 1e-12);
        assert_eq!(m.peak, 3.0);
    }

    #[test]
    fn test_zero_pixels_do_not_shift_centroid() {
        let mut image = Array2::zeros((8, 8));
        image[[4, 5]] = 2.0;
        // Negative threshold: the footprint spans the whole image
        let fp = single_footprint(&image, -1.0);
        assert_eq!(fp.area(), 64);

        let m = WeightedMomentMeasurer.measure(image.view(), &fp).unwrap();
        assert_eq!((m.x, m.y), (5.0, 4.0));
        assert_eq!(m.moments.ixx, 0.0);
    }

    #[test]
    fn test_errors() {
        let image = Array2::<f64>::zeros((3, 3));
        let empty = Footprint {
            pixels: vec![],
            bbox: crate::image_proc::BoundingBox::new(0, 0, 0, 0),
        };
        assert_eq!(
            WeightedMomentMeasurer.measure(image.view(), &empty),
            Err(MeasurementError::EmptyFootprint)
        );

        let zero = single_footprint(&image, -1.0);
        assert_eq!(
            WeightedMomentMeasurer.measure(image.view(), &zero),
            Err(MeasurementError::NoWeight(0.0))
        );

        let outside = Footprint {
            pixels: vec![(5, 5)],
            bbox: crate::image_proc::BoundingBox::new(5, 5, 1, 1),
        };
        assert_eq!(
            WeightedMomentMeasurer.measure(image.view(), &outside),
            Err(MeasurementError::OutOfBounds(5, 5))
        );
    }

    #[test]
    fn test_bbox_past_image_edge_rejected() {
        let image = Array2::<f64>::ones((4, 6));
        // Pixels lie inside, but the box claims a corner past the last column
        let fp = Footprint {
            pixels: vec![(1, 1), (2, 2)],
            bbox: crate::image_proc::BoundingBox::new(1, 1, 6, 2),
        };
        assert_eq!(
            WeightedMomentMeasurer.measure(image.view(), &fp),
            Err(MeasurementError::OutOfBounds(2, 6))
        );
    }
}

//! Threshold detection of connected regions ("footprints")
//!
//! This module finds the connected sets of pixels above a threshold. It is used on
//! the padded moment histogram to locate clumps, but works on any 2-D image.

use ndarray::{Array2, ArrayView2};

/// Bounding box of a footprint, inclusive of its edge pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    /// Left column
    pub x_min: usize,
    /// Top row
    pub y_min: usize,
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
}

impl BoundingBox {
    pub fn new(x_min: usize, y_min: usize, width: usize, height: usize) -> Self {
        Self {
            x_min,
            y_min,
            width,
            height,
        }
    }

    /// One past the right column
    pub fn x_max(&self) -> usize {
        self.x_min + self.width
    }

    /// One past the bottom row
    pub fn y_max(&self) -> usize {
        self.y_min + self.height
    }
}

/// A connected set of above-threshold pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    /// Member pixels as (row, col), in flood-fill order
    pub pixels: Vec<(usize, usize)>,
    /// Smallest box containing every member pixel
    pub bbox: BoundingBox,
}

impl Footprint {
    fn from_pixels(pixels: Vec<(usize, usize)>) -> Self {
        let mut x_min = usize::MAX;
        let mut y_min = usize::MAX;
        let mut x_max = 0;
        let mut y_max = 0;
        for &(row, col) in &pixels {
            x_min = x_min.min(col);
            y_min = y_min.min(row);
            x_max = x_max.max(col);
            y_max = y_max.max(row);
        }
        let bbox = if pixels.is_empty() {
            BoundingBox::new(0, 0, 0, 0)
        } else {
            BoundingBox::new(x_min, y_min, x_max - x_min + 1, y_max - y_min + 1)
        };
        Self { pixels, bbox }
    }

    /// Number of member pixels
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Finds footprints in an image at a given threshold.
pub trait FootprintDetector {
    /// Return every connected region of pixels above `threshold`.
    ///
    /// Regions are returned in the raster order of their first pixel.
    fn detect(&self, image: ArrayView2<f64>, threshold: f64) -> Vec<Footprint>;
}

/// Threshold mask followed by an 8-connected flood fill
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdDetector;

impl FootprintDetector for ThresholdDetector {
    fn detect(&self, image: ArrayView2<f64>, threshold: f64) -> Vec<Footprint> {
        let mask = apply_threshold(image, threshold);
        let (labels, num_labels) = connected_components(mask.view());
        components_to_footprints(labels.view(), num_labels)
    }
}

/// Apply thresholding to an image and return a binary mask
///
/// A pixel is set when its value is strictly above `threshold`. NaN pixels are
/// never set.
pub fn apply_threshold(image: ArrayView2<f64>, threshold: f64) -> Array2<bool> {
    image.mapv(|v| v > threshold)
}

/// Find connected components in a binary mask
///
/// This uses a simple 8-connectivity flood fill algorithm. Labels start at 1 and
/// are assigned in raster order of each component's first pixel; 0 is background.
pub fn connected_components(mask: ArrayView2<bool>) -> (Array2<u32>, u32) {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::zeros((rows, cols));
    let mut label_counter = 0;

    // 8-connectivity neighboring offsets
    let neighbors = [
        (-1, -1),
        (-1, 0),
        (-1, 1),
        (0, -1),
        (0, 1),
        (1, -1),
        (1, 0),
        (1, 1),
    ];

    for i in 0..rows {
        for j in 0..cols {
            if mask[[i, j]] && labels[[i, j]] == 0 {
                label_counter += 1;
                let mut stack = vec![(i, j)];

                while let Some((y, x)) = stack.pop() {
                    if !mask[[y, x]] || labels[[y, x]] != 0 {
                        continue;
                    }

                    labels[[y, x]] = label_counter;

                    for &(dy, dx) in &neighbors {
                        let ny = y as isize + dy;
                        let nx = x as isize + dx;

                        if ny >= 0 && ny < rows as isize && nx >= 0 && nx < cols as isize {
                            let ny = ny as usize;
                            let nx = nx as usize;

                            if mask[[ny, nx]] && labels[[ny, nx]] == 0 {
                                stack.push((ny, nx));
                            }
                        }
                    }
                }
            }
        }
    }

    (labels, label_counter)
}

/// Collect the pixels of each labeled component into a footprint
///
/// Footprint `k` holds the pixels labeled `k + 1`. Pixels within a footprint are
/// in raster order.
pub fn components_to_footprints(labels: ArrayView2<u32>, num_labels: u32) -> Vec<Footprint> {
    let mut members: Vec<Vec<(usize, usize)>> = vec![Vec::new(); num_labels as usize];

    for ((row, col), &label) in labels.indexed_iter() {
        if label > 0 && label <= num_labels {
            members[(label - 1) as usize].push((row, col));
        }
    }

    members
        .into_iter()
        .filter(|pixels| !pixels.is_empty())
        .map(Footprint::from_pixels)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_apply_threshold_is_strict() {
        let image = arr2(&[[0.1, 0.9], [0.5, f64::NAN]]);

        let mask = apply_threshold(image.view(), 0.5);

        assert!(!mask[[0, 0]]);
        assert!(mask[[0, 1]]);
        assert!(!mask[[1, 0]]);
        assert!(!mask[[1, 1]]);
    }

    #[test]
    fn test_connected_components() {
        let mask = arr2(&[
            [false, true, true, false],
            [false, true, false, false],
            [false, false, false, true],
            [false, false, true, true],
        ]);

        let (labels, num_labels) = connected_components(mask.view());

        assert_eq!(num_labels, 2);
        assert_eq!(labels[[0, 1]], 1);
        assert_eq!(labels[[0, 2]], 1);
        assert_eq!(labels[[1, 1]], 1);
        assert_eq!(labels[[2, 3]], 2);
        assert_eq!(labels[[3, 2]], 2);
        assert_eq!(labels[[0, 0]], 0);
    }

    #[test]
    fn test_diagonal_pixels_connect() {
        let mask = arr2(&[[true, false], [false, true]]);
        let (_, num_labels) = connected_components(mask.view());
        assert_eq!(num_labels, 1);
    }

    #[test]
    fn test_components_to_footprints() {
        let labels = arr2(&[[1, 1, 0, 0], [1, 1, 0, 0], [0, 0, 0, 2], [0, 0, 2, 2]]);

        let footprints = components_to_footprints(labels.view(), 2);

        assert_eq!(footprints.len(), 2);
        assert_eq!(footprints[0].area(), 4);
        assert_eq!(footprints[0].bbox, BoundingBox::new(0, 0, 2, 2));
        assert_eq!(footprints[1].pixels, vec![(2, 3), (3, 2), (3, 3)]);
        assert_eq!(footprints[1].bbox, BoundingBox::new(2, 2, 2, 2));
        assert_eq!(footprints[1].bbox.x_max(), 4);
    }

    #[test]
    fn test_detector_orders_by_first_pixel() {
        let mut image = Array2::zeros((10, 10));
        image[[7, 1]] = 5.0;
        image[[2, 8]] = 3.0;
        image[[2, 7]] = 3.0;

        let footprints = ThresholdDetector.detect(image.view(), 1.0);

        assert_eq!(footprints.len(), 2);
        assert_eq!(footprints[0].bbox.y_min, 2);
        assert_eq!(footprints[0].area(), 2);
        assert_eq!(footprints[1].pixels, vec![(7, 1)]);
    }

    #[test]
    fn test_negative_threshold_takes_whole_image() {
        let image = Array2::<f64>::zeros((4, 6));
        let footprints = ThresholdDetector.detect(image.view(), -1.0);
        assert_eq!(footprints.len(), 1);
        assert_eq!(footprints[0].area(), 24);
    }
}

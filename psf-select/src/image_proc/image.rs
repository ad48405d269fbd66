use image::{ImageBuffer, Luma};
use ndarray::Array2;
use std::path::Path;

/// Converts a 16-bit grayscale image to an `Array2<f64>`
///
/// Pixel (x, y) maps to array index [y, x], so the array has shape (height, width).
pub fn gray16_image_to_array2(img: &ImageBuffer<Luma<u16>, Vec<u16>>) -> Array2<f64> {
    let (width, height) = img.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        f64::from(img.get_pixel(x as u32, y as u32)[0])
    })
}

/// Load an image file as 16-bit grayscale pixel values
///
/// Color images are converted to luminance; 8-bit data is widened to 16 bits.
pub fn load_image(path: &Path) -> Result<Array2<f64>, image::ImageError> {
    let img = image::open(path)?.into_luma16();
    Ok(gray16_image_to_array2(&img))
}

//! Convenience helpers for loading frames via the `image` crate.
//!
//! Available when the `image-io` feature is enabled. Frames are converted to
//! 16-bit grayscale so 12/16-bit camera TIFFs keep their dynamic range.

use crate::image::{GradientMethod, Image, ImageView};
use crate::util::{DicError, DicResult};
use std::path::Path;

/// Creates an owned image from an 8-bit grayscale buffer.
pub fn image_from_gray8(img: &image::GrayImage, gradient: GradientMethod) -> DicResult<Image> {
    let view = ImageView::from_slice(img.as_raw(), img.width() as usize, img.height() as usize)?;
    Image::from_view(view, gradient)
}

/// Creates an owned image from a dynamic image.
pub fn image_from_dynamic(img: &image::DynamicImage, gradient: GradientMethod) -> DicResult<Image> {
    let gray = img.to_luma16();
    let view = ImageView::from_slice(gray.as_raw(), gray.width() as usize, gray.height() as usize)?;
    Image::from_view(view, gradient)
}

/// Loads an image from disk and converts it to a grayscale intensity image.
pub fn load_gray_image<P: AsRef<Path>>(path: P, gradient: GradientMethod) -> DicResult<Image> {
    let img = image::open(path).map_err(|err| DicError::ImageIo {
        reason: err.to_string(),
    })?;
    image_from_dynamic(&img, gradient)
}

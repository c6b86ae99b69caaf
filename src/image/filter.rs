//! Gaussian pre-filtering of images.
//!
//! Filtering removes high-frequency content (noise, aliasing) before
//! correlation. The mask is separable and normalized; borders replicate the
//! edge pixel.

use crate::image::{Image, ImageField};
use crate::util::{DicError, DicResult};

/// Mask sizes accepted by `gauss_filter_mask_size`.
pub const GAUSS_MASK_SIZES: [usize; 6] = [3, 5, 7, 9, 11, 13];

fn gauss_weights(mask_size: usize) -> Vec<f64> {
    let half = (mask_size / 2) as isize;
    let sigma = mask_size as f64 / 6.0;
    let mut weights: Vec<f64> = (-half..=half)
        .map(|k| (-(k * k) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Returns a Gaussian-filtered copy of `img`.
pub fn gauss_filter(img: &Image, mask_size: usize) -> DicResult<Image> {
    if !GAUSS_MASK_SIZES.contains(&mask_size) {
        return Err(DicError::InvalidParameterValue {
            name: "gauss_filter_mask_size".to_string(),
            value: mask_size.to_string(),
        });
    }
    let width = img.width();
    let height = img.height();
    let weights = gauss_weights(mask_size);
    let half = (mask_size / 2) as isize;
    let src = img.data();

    let mut tmp = vec![0.0; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, w) in weights.iter().enumerate() {
                let xx = (x as isize + k as isize - half).clamp(0, width as isize - 1) as usize;
                acc += w * src[y * width + xx];
            }
            tmp[y * width + x] = acc;
        }
    }

    let mut out = vec![0.0; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, w) in weights.iter().enumerate() {
                let yy = (y as isize + k as isize - half).clamp(0, height as isize - 1) as usize;
                acc += w * tmp[yy * width + x];
            }
            out[y * width + x] = acc;
        }
    }

    Image::with_gradient(out, width, height, img.gradient_method())
}

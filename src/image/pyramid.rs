//! Image pyramid construction for coarse-to-fine searches.
//!
//! Downsampling uses a 2x2 box filter: `dst = (a + b + c + d) / 4`. Odd
//! trailing rows and columns are dropped.

use crate::image::{Image, ImageField};
use crate::util::DicResult;

/// Owned image pyramid built from a base level.
pub struct ImagePyramid {
    levels: Vec<Image>,
}

impl ImagePyramid {
    /// Builds a pyramid from a base image.
    ///
    /// `max_levels` is clamped to at least 1 so the base level is always present.
    /// Construction stops early once a level would drop below `min_size` pixels
    /// on either side.
    pub fn build(base: &Image, max_levels: usize, min_size: usize) -> DicResult<Self> {
        let max_levels = max_levels.max(1);
        let mut levels = vec![base.clone()];

        while levels.len() < max_levels {
            let Some(src) = levels.last() else {
                break;
            };
            let dst_width = src.width() / 2;
            let dst_height = src.height() / 2;
            if dst_width < min_size.max(1) || dst_height < min_size.max(1) {
                break;
            }

            let data = src.data();
            let stride = src.width();
            let mut dst = Vec::with_capacity(dst_width * dst_height);
            for y in 0..dst_height {
                let r0 = 2 * y * stride;
                let r1 = r0 + stride;
                for x in 0..dst_width {
                    let sum = data[r0 + 2 * x]
                        + data[r0 + 2 * x + 1]
                        + data[r1 + 2 * x]
                        + data[r1 + 2 * x + 1];
                    dst.push(0.25 * sum);
                }
            }
            let level = Image::with_gradient(dst, dst_width, dst_height, src.gradient_method())?;
            levels.push(level);
        }

        Ok(Self { levels })
    }

    /// Returns the number of levels (level 0 is the base resolution).
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns true if the pyramid has no levels.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Returns a specific pyramid level.
    pub fn level(&self, index: usize) -> Option<&Image> {
        self.levels.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::ImagePyramid;
    use crate::image::{Image, ImageField};

    #[test]
    fn pyramid_halves_dimensions_and_averages() {
        let img = Image::from_fn(8, 6, |x, y| x + 10.0 * y).unwrap();
        let pyr = ImagePyramid::build(&img, 3, 1).unwrap();
        assert_eq!(pyr.len(), 3);
        let l1 = pyr.level(1).unwrap();
        assert_eq!((l1.width(), l1.height()), (4, 3));
        assert!((l1.intensity(0, 0) - 5.5).abs() < 1e-12);
    }

    #[test]
    fn pyramid_respects_min_size() {
        let img = Image::from_fn(32, 32, |_, _| 0.0).unwrap();
        let pyr = ImagePyramid::build(&img, 10, 8).unwrap();
        assert_eq!(pyr.len(), 3);
    }
}

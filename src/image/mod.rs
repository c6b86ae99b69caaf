//! Image views, owned intensity images and the sampling contract used by the
//! correlation core.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows.
//!
//! `Image` is the owned, `f64` working representation. It precomputes the
//! intensity gradients once at construction so that gamma evaluation only
//! performs lookups and interpolation. Everything downstream talks to images
//! through the [`ImageField`] trait.

use crate::util::{DicError, DicResult};

pub mod filter;
pub mod gradient;
pub mod interp;
#[cfg(feature = "image-io")]
pub mod io;
pub mod pyramid;

pub use gradient::GradientMethod;
pub use interp::InterpolationMethod;

/// Pixel types that can be converted to `f64` intensities.
pub trait Pixel: Copy {
    /// Converts the pixel to a floating-point intensity.
    fn to_f64(self) -> f64;
}

impl Pixel for u8 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Pixel for u16 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Pixel for f32 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Pixel for f64 {
    fn to_f64(self) -> f64 {
        self
    }
}

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> DicResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> DicResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(DicError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> DicResult<usize> {
    if width == 0 || height == 0 {
        return Err(DicError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(DicError::InvalidStride { width, stride });
    }
    let needed = (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(DicError::InvalidDimensions { width, height })?;
    Ok(needed)
}

/// Intensity lookup, interpolation and gradient contract consumed by the
/// gamma evaluator, initializers and driver.
///
/// Coordinates are in pixels with `(0, 0)` at the center of the top-left
/// pixel. Implementations must be pure lookups so they can be shared across
/// worker threads.
pub trait ImageField: Sync {
    /// Image width in pixels.
    fn width(&self) -> usize;

    /// Image height in pixels.
    fn height(&self) -> usize;

    /// Intensity at an integer pixel.
    fn intensity(&self, x: usize, y: usize) -> f64;

    /// Intensity at a sub-pixel location.
    fn interpolate(&self, x: f64, y: f64, method: InterpolationMethod) -> f64;

    /// Intensity gradient `(dI/dx, dI/dy)` at an integer pixel.
    fn gradient(&self, x: usize, y: usize) -> (f64, f64);

    /// Intensity gradient at a sub-pixel location.
    fn interpolate_gradient(&self, x: f64, y: f64, method: InterpolationMethod) -> (f64, f64);

    /// Returns true if `(x, y)` lies inside the sampled area of the image.
    fn contains(&self, x: f64, y: f64) -> bool {
        x.is_finite()
            && y.is_finite()
            && x >= 0.0
            && y >= 0.0
            && x <= (self.width() - 1) as f64
            && y <= (self.height() - 1) as f64
    }
}

/// Owned grayscale intensity image with precomputed gradients.
#[derive(Clone, Debug)]
pub struct Image {
    width: usize,
    height: usize,
    data: Vec<f64>,
    grad_x: Vec<f64>,
    grad_y: Vec<f64>,
    gradient_method: GradientMethod,
}

impl Image {
    /// Creates an image from a contiguous row-major buffer.
    pub fn from_vec(data: Vec<f64>, width: usize, height: usize) -> DicResult<Self> {
        Self::with_gradient(data, width, height, GradientMethod::FiniteDifference)
    }

    /// Creates an image from a contiguous buffer with an explicit gradient method.
    pub fn with_gradient(
        data: Vec<f64>,
        width: usize,
        height: usize,
        gradient_method: GradientMethod,
    ) -> DicResult<Self> {
        let needed = required_len(width, height, width)?;
        if data.len() != needed {
            return Err(DicError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        let (grad_x, grad_y) = gradient::compute(&data, width, height, gradient_method);
        Ok(Self {
            width,
            height,
            data,
            grad_x,
            grad_y,
            gradient_method,
        })
    }

    /// Copies any strided view into an owned image.
    pub fn from_view<T: Pixel>(
        view: ImageView<'_, T>,
        gradient_method: GradientMethod,
    ) -> DicResult<Self> {
        let width = view.width();
        let height = view.height();
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            let row = view.row(y).ok_or(DicError::IndexOutOfBounds {
                index: y,
                len: height,
                context: "row",
            })?;
            data.extend(row.iter().map(|&v| v.to_f64()));
        }
        Self::with_gradient(data, width, height, gradient_method)
    }

    /// Samples an analytic intensity function on the pixel grid.
    pub fn from_fn<F>(width: usize, height: usize, f: F) -> DicResult<Self>
    where
        F: Fn(f64, f64) -> f64,
    {
        let mut data = Vec::with_capacity(width.saturating_mul(height));
        for y in 0..height {
            for x in 0..width {
                data.push(f(x as f64, y as f64));
            }
        }
        Self::from_vec(data, width, height)
    }

    /// Returns the row-major intensity buffer.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Returns the gradient method used at construction.
    pub fn gradient_method(&self) -> GradientMethod {
        self.gradient_method
    }

    /// Returns a copy of a rectangular window, clamping reads to the border.
    pub fn window(&self, x0: isize, y0: isize, width: usize, height: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(width * height);
        let max_x = self.width as isize - 1;
        let max_y = self.height as isize - 1;
        for y in 0..height as isize {
            let yy = (y0 + y).clamp(0, max_y) as usize;
            for x in 0..width as isize {
                let xx = (x0 + x).clamp(0, max_x) as usize;
                out.push(self.data[yy * self.width + xx]);
            }
        }
        out
    }
}

impl ImageField for Image {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn intensity(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    fn interpolate(&self, x: f64, y: f64, method: InterpolationMethod) -> f64 {
        interp::sample(&self.data, self.width, self.height, x, y, method)
    }

    fn gradient(&self, x: usize, y: usize) -> (f64, f64) {
        let idx = y * self.width + x;
        (self.grad_x[idx], self.grad_y[idx])
    }

    fn interpolate_gradient(&self, x: f64, y: f64, method: InterpolationMethod) -> (f64, f64) {
        (
            interp::sample(&self.grad_x, self.width, self.height, x, y, method),
            interp::sample(&self.grad_y, self.width, self.height, x, y, method),
        )
    }
}

//! Intensity gradient computation.

use crate::util::DicError;
use std::fmt;
use std::str::FromStr;

/// Finite-difference stencil used to build gradient images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GradientMethod {
    /// Central difference, one-sided at the border.
    #[default]
    FiniteDifference,
    /// Five-point stencil `(f[-2] - 8 f[-1] + 8 f[1] - f[2]) / 12`.
    Convolution5Point,
}

impl GradientMethod {
    /// All variants in registry order.
    pub const ALL: [GradientMethod; 2] = [Self::FiniteDifference, Self::Convolution5Point];

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FiniteDifference => "FINITE_DIFFERENCE",
            Self::Convolution5Point => "CONVOLUTION_5_POINT",
        }
    }
}

impl fmt::Display for GradientMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradientMethod {
    type Err = DicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| DicError::InvalidParameterValue {
                name: "gradient_method".to_string(),
                value: s.to_string(),
            })
    }
}

/// Derivative along a strided line of `len` samples at position `i`.
fn derivative(line: impl Fn(usize) -> f64, i: usize, len: usize, method: GradientMethod) -> f64 {
    if len < 2 {
        return 0.0;
    }
    if method == GradientMethod::Convolution5Point && i >= 2 && i + 2 < len {
        return (line(i - 2) - 8.0 * line(i - 1) + 8.0 * line(i + 1) - line(i + 2)) / 12.0;
    }
    if i == 0 {
        line(1) - line(0)
    } else if i == len - 1 {
        line(len - 1) - line(len - 2)
    } else {
        0.5 * (line(i + 1) - line(i - 1))
    }
}

/// Computes `(grad_x, grad_y)` images for a row-major buffer.
pub(crate) fn compute(
    data: &[f64],
    width: usize,
    height: usize,
    method: GradientMethod,
) -> (Vec<f64>, Vec<f64>) {
    let mut gx = vec![0.0; width * height];
    let mut gy = vec![0.0; width * height];
    for y in 0..height {
        let row = y * width;
        for x in 0..width {
            gx[row + x] = derivative(|i| data[row + i], x, width, method);
            gy[row + x] = derivative(|j| data[j * width + x], y, height, method);
        }
    }
    (gx, gy)
}

#[cfg(test)]
mod tests {
    use super::{compute, GradientMethod};

    #[test]
    fn five_point_is_exact_for_cubics() {
        let (w, h) = (10, 3);
        let data: Vec<f64> = (0..w * h).map(|i| ((i % w) as f64).powi(3)).collect();
        let (gx, _) = compute(&data, w, h, GradientMethod::Convolution5Point);
        let x = 5.0f64;
        assert!((gx[w + 5] - 3.0 * x * x).abs() < 1e-9);
    }

    #[test]
    fn border_uses_one_sided_difference() {
        let data = vec![0.0, 1.0, 4.0];
        let (gx, gy) = compute(&data, 3, 1, GradientMethod::FiniteDifference);
        assert_eq!(gx, vec![1.0, 2.0, 3.0]);
        assert_eq!(gy, vec![0.0, 0.0, 0.0]);
    }
}

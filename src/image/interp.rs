//! Sub-pixel interpolation kernels.
//!
//! All kernels are separable and clamp sample indices to the image border, so
//! they can be evaluated anywhere; callers decide what counts as in-bounds.
//! At integer coordinates every kernel reproduces the stored samples exactly.

use crate::util::DicError;
use std::fmt;
use std::str::FromStr;

/// Interpolation kernel used for deformed-image lookups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InterpolationMethod {
    /// 2x2 bilinear.
    Bilinear,
    /// 4x4 cubic convolution (Catmull-Rom, a = -0.5).
    Bicubic,
    /// 6x6 fourth-order cubic convolution of Keys.
    #[default]
    KeysFourth,
}

impl InterpolationMethod {
    /// All variants in registry order.
    pub const ALL: [InterpolationMethod; 3] = [Self::Bilinear, Self::Bicubic, Self::KeysFourth];

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bilinear => "BILINEAR",
            Self::Bicubic => "BICUBIC",
            Self::KeysFourth => "KEYS_FOURTH",
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterpolationMethod {
    type Err = DicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| DicError::InvalidParameterValue {
                name: "interpolation_method".to_string(),
                value: s.to_string(),
            })
    }
}

fn catmull_rom(s: f64) -> f64 {
    let s = s.abs();
    if s <= 1.0 {
        1.5 * s * s * s - 2.5 * s * s + 1.0
    } else if s < 2.0 {
        -0.5 * s * s * s + 2.5 * s * s - 4.0 * s + 2.0
    } else {
        0.0
    }
}

fn keys_fourth(s: f64) -> f64 {
    let s = s.abs();
    if s <= 1.0 {
        4.0 / 3.0 * s * s * s - 7.0 / 3.0 * s * s + 1.0
    } else if s <= 2.0 {
        -7.0 / 12.0 * s * s * s + 3.0 * s * s - 59.0 / 12.0 * s + 15.0 / 6.0
    } else if s <= 3.0 {
        1.0 / 12.0 * s * s * s - 2.0 / 3.0 * s * s + 21.0 / 12.0 * s - 1.5
    } else {
        0.0
    }
}

/// Samples a row-major buffer at `(x, y)` with the given kernel.
pub(crate) fn sample(
    data: &[f64],
    width: usize,
    height: usize,
    x: f64,
    y: f64,
    method: InterpolationMethod,
) -> f64 {
    match method {
        InterpolationMethod::Bilinear => bilinear(data, width, height, x, y),
        InterpolationMethod::Bicubic => separable(data, width, height, x, y, 2, catmull_rom),
        InterpolationMethod::KeysFourth => separable(data, width, height, x, y, 3, keys_fourth),
    }
}

fn bilinear(data: &[f64], width: usize, height: usize, x: f64, y: f64) -> f64 {
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let a = data[y0 * width + x0];
    let b = data[y0 * width + x1];
    let c = data[y1 * width + x0];
    let d = data[y1 * width + x1];
    a * (1.0 - fx) * (1.0 - fy) + b * fx * (1.0 - fy) + c * (1.0 - fx) * fy + d * fx * fy
}

fn separable(
    data: &[f64],
    width: usize,
    height: usize,
    x: f64,
    y: f64,
    radius: isize,
    kernel: fn(f64) -> f64,
) -> f64 {
    if !x.is_finite() || !y.is_finite() {
        return f64::NAN;
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let xi = x0 as isize;
    let yi = y0 as isize;
    let max_x = width as isize - 1;
    let max_y = height as isize - 1;

    let mut acc = 0.0;
    for j in (1 - radius)..=radius {
        let wy = kernel(fy - j as f64);
        if wy == 0.0 {
            continue;
        }
        let row = (yi + j).clamp(0, max_y) as usize * width;
        let mut row_acc = 0.0;
        for i in (1 - radius)..=radius {
            let wx = kernel(fx - i as f64);
            if wx == 0.0 {
                continue;
            }
            row_acc += wx * data[row + (xi + i).clamp(0, max_x) as usize];
        }
        acc += wy * row_acc;
    }
    acc
}

//! Scalar reference kernels.

use crate::image::{Image, ImageField};
use crate::kernel::{zncc_score, TemplatePlan};

#[cfg_attr(feature = "simd", allow(dead_code))]
pub(crate) fn zncc_at(image: &Image, plan: &TemplatePlan, x: usize, y: usize) -> f64 {
    let width = plan.width();
    let height = plan.height();
    if x + width > image.width() || y + height > image.height() {
        return f64::NEG_INFINITY;
    }
    let data = image.data();
    let stride = image.width();
    let t_prime = plan.t_prime();
    let weights = plan.weights();

    let mut dot = 0.0;
    let mut sum_i = 0.0;
    let mut sum_i2 = 0.0;
    for ty in 0..height {
        let row = &data[(y + ty) * stride + x..(y + ty) * stride + x + width];
        let base = ty * width;
        for (tx, &value) in row.iter().enumerate() {
            let w = weights[base + tx];
            dot += t_prime[base + tx] * value;
            sum_i += w * value;
            sum_i2 += w * value * value;
        }
    }
    zncc_score(plan, dot, sum_i, sum_i2)
}

#[cfg_attr(feature = "simd", allow(dead_code))]
pub(crate) fn squared_residual_sum(
    a: &[f64],
    a_mean: f64,
    a_scale: f64,
    b: &[f64],
    b_mean: f64,
    b_scale: f64,
) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&ai, &bi)| {
            let d = (ai - a_mean) * a_scale - (bi - b_mean) * b_scale;
            d * d
        })
        .sum()
}

//! SIMD kernels using the `wide` crate.
//!
//! Inner loops process four `f64` lanes at a time with a scalar tail.

use crate::image::{Image, ImageField};
use crate::kernel::{zncc_score, TemplatePlan};
use wide::f64x4;

const LANES: usize = 4;

#[inline]
fn load(slice: &[f64]) -> f64x4 {
    f64x4::from([slice[0], slice[1], slice[2], slice[3]])
}

#[inline]
fn hsum(v: f64x4) -> f64 {
    let arr = v.to_array();
    arr[0] + arr[1] + arr[2] + arr[3]
}

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
    let simd_end = width / LANES * LANES;

    let mut dot_v = f64x4::ZERO;
    let mut sum_v = f64x4::ZERO;
    let mut sum2_v = f64x4::ZERO;
    let mut dot = 0.0;
    let mut sum_i = 0.0;
    let mut sum_i2 = 0.0;

    for ty in 0..height {
        let row = &data[(y + ty) * stride + x..(y + ty) * stride + x + width];
        let base = ty * width;
        let mut tx = 0;
        while tx < simd_end {
            let img = load(&row[tx..]);
            let w = load(&weights[base + tx..]);
            let wi = w * img;
            dot_v += load(&t_prime[base + tx..]) * img;
            sum_v += wi;
            sum2_v += wi * img;
            tx += LANES;
        }
        while tx < width {
            let value = row[tx];
            let w = weights[base + tx];
            dot += t_prime[base + tx] * value;
            sum_i += w * value;
            sum_i2 += w * value * value;
            tx += 1;
        }
    }

    zncc_score(
        plan,
        hsum(dot_v) + dot,
        hsum(sum_v) + sum_i,
        hsum(sum2_v) + sum_i2,
    )
}

pub(crate) fn squared_residual_sum(
    a: &[f64],
    a_mean: f64,
    a_scale: f64,
    b: &[f64],
    b_mean: f64,
    b_scale: f64,
) -> f64 {
    let n = a.len().min(b.len());
    let simd_end = n / LANES * LANES;
    let am = f64x4::splat(a_mean);
    let asc = f64x4::splat(a_scale);
    let bm = f64x4::splat(b_mean);
    let bsc = f64x4::splat(b_scale);

    let mut acc = f64x4::ZERO;
    let mut i = 0;
    while i < simd_end {
        let d = (load(&a[i..]) - am) * asc - (load(&b[i..]) - bm) * bsc;
        acc += d * d;
        i += LANES;
    }
    let mut tail = 0.0;
    while i < n {
        let d = (a[i] - a_mean) * a_scale - (b[i] - b_mean) * b_scale;
        tail += d * d;
        i += 1;
    }
    hsum(acc) + tail
}

#[cfg(test)]
mod tests {
    use super::squared_residual_sum;
    use crate::kernel::scalar;

    #[test]
    fn simd_residual_matches_scalar() {
        let a: Vec<f64> = (0..37).map(|i| (i as f64 * 0.7).sin() * 10.0).collect();
        let b: Vec<f64> = (0..37).map(|i| (i as f64 * 0.5).cos() * 8.0).collect();
        let s = squared_residual_sum(&a, 0.3, 1.1, &b, -0.2, 0.9);
        let r = scalar::squared_residual_sum(&a, 0.3, 1.1, &b, -0.2, 0.9);
        assert!((s - r).abs() < 1e-9 * r.abs().max(1.0));
    }
}

//! Mathematical helpers shared by the solver stages.

use std::f64::consts::PI;

/// Wraps an angle in radians to the range [-pi, pi).
pub(crate) fn wrap_angle(angle: f64) -> f64 {
    let mut wrapped = angle % (2.0 * PI);
    if wrapped < -PI {
        wrapped += 2.0 * PI;
    }
    if wrapped >= PI {
        wrapped -= 2.0 * PI;
    }
    wrapped
}

/// Euclidean norm of a parameter vector.
pub(crate) fn norm2(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Returns true if every value is finite.
pub(crate) fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Mean and population standard deviation of a sample.
pub(crate) fn mean_std(values: impl Iterator<Item = f64>) -> (f64, f64, usize) {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for v in values {
        count += 1;
        sum += v;
        sum_sq += v * v;
    }
    if count == 0 {
        return (0.0, 0.0, 0);
    }
    let n = count as f64;
    let mean = sum / n;
    let var = (sum_sq / n - mean * mean).max(0.0);
    (mean, var.sqrt(), count)
}

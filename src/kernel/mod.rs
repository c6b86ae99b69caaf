//! Residual and correlation kernels.
//!
//! Two hot loops live here: the squared normalized residual sum behind the
//! gamma objective, and the masked ZNCC score used by integer template
//! scans. Each has a scalar reference implementation; the `simd` feature
//! swaps in `wide` versions and the `rayon` feature parallelizes scans over
//! rows. Every scan scores through [`zncc_at`], so sequential and parallel
//! scans pick the same best placement (ties resolve to the
//! smallest `y`, then the smallest `x`).

use crate::image::Image;
use crate::util::math::mean_std;

pub(crate) mod scalar;

#[cfg(feature = "simd")]
pub(crate) mod simd;

#[cfg(feature = "rayon")]
pub(crate) mod rayon;

/// Minimum intensity variance of an image window for a ZNCC score.
pub(crate) const MIN_WINDOW_VARIANCE: f64 = 1e-10;

/// Zero-mean, masked template prepared for ZNCC scans.
#[derive(Clone, Debug)]
pub(crate) struct TemplatePlan {
    width: usize,
    height: usize,
    /// Mask weights, 1.0 for used pixels and 0.0 otherwise.
    weights: Vec<f64>,
    /// `w * (t - mean_t)`.
    t_prime: Vec<f64>,
    sum_w: f64,
    var_t: f64,
}

impl TemplatePlan {
    /// Builds a plan from row-major template values and a usage mask.
    ///
    /// Returns `None` when no pixel is used or the template is flat.
    pub(crate) fn new(values: &[f64], mask: &[bool], width: usize, height: usize) -> Option<Self> {
        if values.len() != width * height || mask.len() != values.len() {
            return None;
        }
        let (mean, std, count) = mean_std(
            values
                .iter()
                .zip(mask)
                .filter(|(_, &m)| m)
                .map(|(&v, _)| v),
        );
        if count == 0 || std <= 0.0 {
            return None;
        }
        let weights: Vec<f64> = mask.iter().map(|&m| if m { 1.0 } else { 0.0 }).collect();
        let t_prime: Vec<f64> = values
            .iter()
            .zip(&weights)
            .map(|(&v, &w)| w * (v - mean))
            .collect();
        let var_t = t_prime.iter().map(|t| t * t).sum();
        Some(Self {
            width,
            height,
            weights,
            t_prime,
            sum_w: count as f64,
            var_t,
        })
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn height(&self) -> usize {
        self.height
    }

    pub(crate) fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub(crate) fn t_prime(&self) -> &[f64] {
        &self.t_prime
    }

    pub(crate) fn sum_w(&self) -> f64 {
        self.sum_w
    }

    pub(crate) fn var_t(&self) -> f64 {
        self.var_t
    }
}

/// Scored integer placement (top-left corner of the template).
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Peak {
    pub x: usize,
    pub y: usize,
    pub score: f64,
}

impl Peak {
    /// True when `self` should replace `best` under the scan ordering.
    #[inline]
    pub(crate) fn beats(&self, best: &Option<Peak>) -> bool {
        match best {
            None => true,
            Some(b) => {
                self.score > b.score
                    || (self.score == b.score && (self.y, self.x) < (b.y, b.x))
            }
        }
    }
}

/// Inclusive range of top-left placements to score.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ScanWindow {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl ScanWindow {
    /// Clips the window to placements where the template fits in the image.
    pub(crate) fn clip(self, image: &Image, plan: &TemplatePlan) -> Option<Self> {
        use crate::image::ImageField;
        if image.width() < plan.width() || image.height() < plan.height() {
            return None;
        }
        let max_x = image.width() - plan.width();
        let max_y = image.height() - plan.height();
        let clipped = Self {
            x0: self.x0,
            y0: self.y0,
            x1: self.x1.min(max_x),
            y1: self.y1.min(max_y),
        };
        if clipped.x0 > clipped.x1 || clipped.y0 > clipped.y1 {
            return None;
        }
        Some(clipped)
    }
}

/// ZNCC score of the template placed at `(x, y)`; `NEG_INFINITY` if invalid.
#[inline]
pub(crate) fn zncc_at(image: &Image, plan: &TemplatePlan, x: usize, y: usize) -> f64 {
    #[cfg(feature = "simd")]
    {
        simd::zncc_at(image, plan, x, y)
    }
    #[cfg(not(feature = "simd"))]
    {
        scalar::zncc_at(image, plan, x, y)
    }
}

/// Best ZNCC placement inside `window`.
pub(crate) fn scan_best(image: &Image, plan: &TemplatePlan, window: ScanWindow) -> Option<Peak> {
    let window = window.clip(image, plan)?;
    #[cfg(feature = "rayon")]
    {
        rayon::scan_best_par(image, plan, window)
    }
    #[cfg(not(feature = "rayon"))]
    {
        scan_rows(image, plan, window)
    }
}

/// Sequential scan over an already clipped window, row by row.
#[cfg_attr(feature = "rayon", allow(dead_code))]
pub(crate) fn scan_rows(image: &Image, plan: &TemplatePlan, window: ScanWindow) -> Option<Peak> {
    let mut best = None;
    for y in window.y0..=window.y1 {
        for x in window.x0..=window.x1 {
            let score = zncc_at(image, plan, x, y);
            if !score.is_finite() {
                continue;
            }
            let peak = Peak { x, y, score };
            if peak.beats(&best) {
                best = Some(peak);
            }
        }
    }
    best
}

/// `sum_i ((a_i - a_mean) * a_scale - (b_i - b_mean) * b_scale)^2`.
#[inline]
pub(crate) fn squared_residual_sum(
    a: &[f64],
    a_mean: f64,
    a_scale: f64,
    b: &[f64],
    b_mean: f64,
    b_scale: f64,
) -> f64 {
    #[cfg(feature = "simd")]
    {
        simd::squared_residual_sum(a, a_mean, a_scale, b, b_mean, b_scale)
    }
    #[cfg(not(feature = "simd"))]
    {
        scalar::squared_residual_sum(a, a_mean, a_scale, b, b_mean, b_scale)
    }
}

/// Combines two ZNCC statistics into a score; shared by every kernel.
#[inline]
pub(crate) fn zncc_score(plan: &TemplatePlan, dot: f64, sum_i: f64, sum_i2: f64) -> f64 {
    let var_i = sum_i2 - sum_i * sum_i / plan.sum_w();
    if var_i <= MIN_WINDOW_VARIANCE {
        return f64::NEG_INFINITY;
    }
    let score = dot / (plan.var_t() * var_i).sqrt();
    if score.is_finite() {
        score
    } else {
        f64::NEG_INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::{scan_best, scan_rows, squared_residual_sum, zncc_at, ScanWindow, TemplatePlan};
    use crate::image::Image;

    fn speckle(x: f64, y: f64) -> f64 {
        100.0 + 40.0 * (0.37 * x + 0.5).sin() * (0.29 * y).cos() + 25.0 * (0.11 * x - 0.23 * y).cos()
    }

    #[test]
    fn flat_template_has_no_plan() {
        assert!(TemplatePlan::new(&[3.0; 9], &[true; 9], 3, 3).is_none());
        assert!(TemplatePlan::new(&[1.0, 2.0], &[false, false], 2, 1).is_none());
    }

    #[test]
    fn scan_finds_template_origin() {
        let img = Image::from_fn(64, 64, speckle).unwrap();
        let tpl = img.window(21, 17, 11, 11);
        let plan = TemplatePlan::new(&tpl, &[true; 121], 11, 11).unwrap();
        let window = ScanWindow {
            x0: 10,
            y0: 5,
            x1: 40,
            y1: 40,
        };
        let peak = scan_best(&img, &plan, window).unwrap();
        assert_eq!((peak.x, peak.y), (21, 17));
        assert!((peak.score - 1.0).abs() < 1e-9);
        assert!((zncc_at(&img, &plan, 21, 17) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn scans_score_with_the_active_kernel() {
        let img = Image::from_fn(48, 40, |x, y| {
            50.0 + 20.0 * (0.4 * x).sin() * (0.3 * y + 0.2).cos() + 0.1 * x * y
        })
        .unwrap();
        let tpl = img.window(12, 9, 9, 9);
        let plan = TemplatePlan::new(&tpl, &[true; 81], 9, 9).unwrap();
        let window = ScanWindow {
            x0: 0,
            y0: 0,
            x1: 39,
            y1: 31,
        };
        let sequential = scan_rows(&img, &plan, window).unwrap();
        assert_eq!((sequential.x, sequential.y), (12, 9));
        assert_eq!(sequential.score, zncc_at(&img, &plan, 12, 9));
        assert_eq!(scan_best(&img, &plan, window), Some(sequential));
    }

    #[test]
    fn residual_sum_of_identical_normalized_signals_is_zero() {
        let a = [1.0, 3.0, 5.0, 7.0, 9.0];
        let b = [2.0, 3.0, 4.0, 5.0, 6.0];
        let s = squared_residual_sum(&a, 5.0, 0.5, &b, 4.0, 1.0);
        assert!(s.abs() < 1e-12);
        let t = squared_residual_sum(&a, 0.0, 1.0, &b, 0.0, 1.0);
        assert!((t - (1.0 + 0.0 + 1.0 + 4.0 + 9.0)).abs() < 1e-12);
    }
}

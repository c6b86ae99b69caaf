//! The gamma objective: zero-normalized sum of squared differences between
//! a subset's reference intensities and the deformed image sampled through a
//! shape function.
//!
//! With `r_i` and `d_i` the reference and deformed intensities normalized to
//! zero mean and unit standard deviation over the active pixels,
//!
//! ```text
//! gamma = sum_active (d_i - r_i)^2 / (2 N)
//! ```
//!
//! where `N` is the active-pixel count (when normalizing with active pixels)
//! or the full subset size. Gamma is 0 for a perfect match and at most 2.

use crate::image::{ImageField, InterpolationMethod};
use crate::kernel::squared_residual_sum;
use crate::shape::ShapeFunction;
use crate::subset::Subset;
use crate::util::math::mean_std;
use thiserror::Error;

/// Relative standard deviation below which intensities are treated as flat.
const MIN_RELATIVE_STD: f64 = 1e-12;

/// Why a gamma evaluation could not produce a usable value.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum GammaFailure {
    /// Fewer than half of the unmasked subset pixels map inside the deformed
    /// image.
    #[error("only {active} of {total} unmasked subset pixels map inside the image")]
    OutOfBounds { active: usize, total: usize },
    /// Reference or deformed intensities have no variation.
    #[error("subset intensities have zero variance")]
    ZeroVariance,
    /// Interpolation or parameters produced NaN or infinity.
    #[error("non-finite value during gamma evaluation")]
    NonFinite,
    /// Gamma exceeds an acceptance threshold.
    #[error("gamma {gamma} exceeds threshold {threshold}")]
    AboveThreshold { gamma: f64, threshold: f64 },
}

/// Result of a gamma evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct GammaEval {
    pub gamma: f64,
    pub active_pixels: usize,
    /// Deformed intensity per subset pixel; zero for inactive pixels.
    pub deformed: Vec<f64>,
}

/// Gamma plus the Gauss-Newton system of the normalized residual.
#[derive(Clone, Debug, PartialEq)]
pub struct GammaGradient {
    pub gamma: f64,
    pub active_pixels: usize,
    /// Row-major `n x n` approximation `sum J^T J`.
    pub hessian: Vec<f64>,
    /// `sum J^T r`.
    pub residual: Vec<f64>,
}

/// Returns `AboveThreshold` when a positive `threshold` is exceeded.
pub fn check_threshold(gamma: f64, threshold: f64) -> Result<(), GammaFailure> {
    if threshold > 0.0 && gamma > threshold {
        return Err(GammaFailure::AboveThreshold { gamma, threshold });
    }
    Ok(())
}

/// Stateless gamma evaluator; safe to share between threads.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GammaEvaluator {
    pub interpolation: InterpolationMethod,
    pub normalize_with_active_pixels: bool,
}

struct Sampled {
    deformed: Vec<f64>,
    mapped: Vec<(f64, f64)>,
    active: Vec<bool>,
    active_count: usize,
}

struct Moments {
    ref_mean: f64,
    ref_std: f64,
    def_mean: f64,
    def_std: f64,
}

impl GammaEvaluator {
    pub fn new(interpolation: InterpolationMethod, normalize_with_active_pixels: bool) -> Self {
        Self {
            interpolation,
            normalize_with_active_pixels,
        }
    }

    fn sample<I: ImageField + ?Sized>(
        &self,
        subset: &Subset,
        image: &I,
        shape: &ShapeFunction,
        params: &[f64],
    ) -> Result<Sampled, GammaFailure> {
        if params.len() != shape.num_params() || params.iter().any(|p| !p.is_finite()) {
            return Err(GammaFailure::NonFinite);
        }
        let deformation = shape.deformation(params);
        let (cx, cy) = subset.centroid();
        let total = subset.len();
        let mut deformed = vec![0.0; total];
        let mut mapped = vec![(f64::NAN, f64::NAN); total];
        let mut active = vec![false; total];
        let mut active_count = 0usize;
        for (i, &(x, y)) in subset.pixels().iter().enumerate() {
            if !subset.is_active(i) {
                continue;
            }
            let (mx, my) = deformation.map(cx, cy, x, y);
            if !image.contains(mx, my) {
                continue;
            }
            let value = image.interpolate(mx, my, self.interpolation);
            if !value.is_finite() {
                return Err(GammaFailure::NonFinite);
            }
            deformed[i] = value;
            mapped[i] = (mx, my);
            active[i] = true;
            active_count += 1;
        }
        let unmasked = subset.active_count();
        if active_count == 0 || 2 * active_count < unmasked {
            return Err(GammaFailure::OutOfBounds {
                active: active_count,
                total: unmasked,
            });
        }
        Ok(Sampled {
            deformed,
            mapped,
            active,
            active_count,
        })
    }

    fn moments(subset: &Subset, sampled: &Sampled) -> Result<Moments, GammaFailure> {
        let pick = |values: &[f64]| {
            mean_std(
                values
                    .iter()
                    .zip(&sampled.active)
                    .filter(|(_, &a)| a)
                    .map(|(&v, _)| v),
            )
        };
        let (ref_mean, ref_std, _) = pick(subset.reference());
        let (def_mean, def_std, _) = pick(&sampled.deformed);
        let flat = |mean: f64, std: f64| std <= MIN_RELATIVE_STD * mean.abs().max(1.0);
        if flat(ref_mean, ref_std) || flat(def_mean, def_std) {
            return Err(GammaFailure::ZeroVariance);
        }
        Ok(Moments {
            ref_mean,
            ref_std,
            def_mean,
            def_std,
        })
    }

    fn gamma_from(&self, subset: &Subset, sampled: &Sampled, m: &Moments) -> Result<f64, GammaFailure> {
        let mut r = Vec::with_capacity(sampled.active_count);
        let mut d = Vec::with_capacity(sampled.active_count);
        for (i, &a) in sampled.active.iter().enumerate() {
            if a {
                r.push(subset.reference()[i]);
                d.push(sampled.deformed[i]);
            }
        }
        let sum = squared_residual_sum(
            &d,
            m.def_mean,
            1.0 / m.def_std,
            &r,
            m.ref_mean,
            1.0 / m.ref_std,
        );
        let n = if self.normalize_with_active_pixels {
            sampled.active_count
        } else {
            subset.len()
        };
        let gamma = sum / (2.0 * n as f64);
        if gamma.is_finite() {
            Ok(gamma)
        } else {
            Err(GammaFailure::NonFinite)
        }
    }

    /// Evaluates gamma for `params`.
    pub fn evaluate<I: ImageField + ?Sized>(
        &self,
        subset: &Subset,
        image: &I,
        shape: &ShapeFunction,
        params: &[f64],
    ) -> Result<GammaEval, GammaFailure> {
        let sampled = self.sample(subset, image, shape, params)?;
        let moments = Self::moments(subset, &sampled)?;
        let gamma = self.gamma_from(subset, &sampled, &moments)?;
        Ok(GammaEval {
            gamma,
            active_pixels: sampled.active_count,
            deformed: sampled.deformed,
        })
    }

    /// Evaluates gamma together with the Gauss-Newton Hessian and gradient.
    pub fn evaluate_with_gradient<I: ImageField + ?Sized>(
        &self,
        subset: &Subset,
        image: &I,
        shape: &ShapeFunction,
        params: &[f64],
    ) -> Result<GammaGradient, GammaFailure> {
        let sampled = self.sample(subset, image, shape, params)?;
        let m = Self::moments(subset, &sampled)?;
        let gamma = self.gamma_from(subset, &sampled, &m)?;

        let n = shape.num_params();
        let deformation = shape.deformation(params);
        let (cx, cy) = subset.centroid();
        let scale = m.ref_std / m.def_std;
        let mut hessian = vec![0.0; n * n];
        let mut residual = vec![0.0; n];
        let mut jx = vec![0.0; n];
        let mut jy = vec![0.0; n];
        let mut j = vec![0.0; n];
        for (i, &(x, y)) in subset.pixels().iter().enumerate() {
            if !sampled.active[i] {
                continue;
            }
            let (mx, my) = sampled.mapped[i];
            let (gx, gy) = image.interpolate_gradient(mx, my, self.interpolation);
            if !gx.is_finite() || !gy.is_finite() {
                return Err(GammaFailure::NonFinite);
            }
            shape.jacobian(&deformation, cx, cy, x, y, &mut jx, &mut jy);
            for k in 0..n {
                j[k] = scale * (gx * jx[k] + gy * jy[k]);
            }
            let r = (sampled.deformed[i] - m.def_mean) * scale - (subset.reference()[i] - m.ref_mean);
            for a in 0..n {
                residual[a] += j[a] * r;
                for b in a..n {
                    hessian[a * n + b] += j[a] * j[b];
                }
            }
        }
        for a in 0..n {
            for b in 0..a {
                hessian[a * n + b] = hessian[b * n + a];
            }
        }
        Ok(GammaGradient {
            gamma,
            active_pixels: sampled.active_count,
            hessian,
            residual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{check_threshold, GammaEvaluator, GammaFailure};
    use crate::image::{Image, InterpolationMethod};
    use crate::shape::{DofFlags, ShapeFunction, ShapeFunctionType};
    use crate::subset::Subset;

    fn speckle(x: f64, y: f64) -> f64 {
        100.0 + 40.0 * (0.21 * x + 0.5).sin() * (0.17 * y).cos() + 30.0 * (0.09 * x - 0.13 * y).cos()
    }

    fn translation() -> ShapeFunction {
        ShapeFunction::new(ShapeFunctionType::Affine, &DofFlags::default()).unwrap()
    }

    #[test]
    fn self_gamma_is_zero_for_every_interpolator() {
        let img = Image::from_fn(64, 64, speckle).unwrap();
        let subset = Subset::square(0, 32, 32, 21, &img).unwrap();
        let sf = translation();
        for method in InterpolationMethod::ALL {
            let eval = GammaEvaluator::new(method, true)
                .evaluate(&subset, &img, &sf, &sf.zero_params())
                .unwrap();
            assert!(eval.gamma.abs() < 1e-12, "{method}");
            assert_eq!(eval.active_pixels, 441);
        }
    }

    #[test]
    fn gamma_grows_away_from_the_match_and_stays_bounded() {
        let img = Image::from_fn(64, 64, speckle).unwrap();
        let subset = Subset::square(0, 32, 32, 21, &img).unwrap();
        let sf = translation();
        let eval = GammaEvaluator::default();
        let near = eval.evaluate(&subset, &img, &sf, &[0.3, 0.0]).unwrap().gamma;
        let far = eval.evaluate(&subset, &img, &sf, &[1.5, 0.0]).unwrap().gamma;
        assert!(near > 0.0 && far > near && far <= 2.0);
    }

    #[test]
    fn mostly_outside_is_out_of_bounds() {
        let img = Image::from_fn(64, 64, speckle).unwrap();
        let subset = Subset::square(0, 32, 32, 21, &img).unwrap();
        let sf = translation();
        let err = GammaEvaluator::default()
            .evaluate(&subset, &img, &sf, &[40.0, 0.0])
            .unwrap_err();
        assert!(matches!(err, GammaFailure::OutOfBounds { .. }));
    }

    #[test]
    fn masked_pixels_do_not_count_against_coverage() {
        let img = Image::from_fn(64, 64, speckle).unwrap();
        let mut subset = Subset::square(0, 32, 32, 21, &img).unwrap();
        subset.exclude_where(|x, _| x < 34.0);
        assert_eq!(subset.active_count(), 189);
        let sf = translation();
        let eval = GammaEvaluator::new(InterpolationMethod::Bicubic, true)
            .evaluate(&subset, &img, &sf, &sf.zero_params())
            .unwrap();
        assert_eq!(eval.active_pixels, 189);
        assert!(eval.gamma.abs() < 1e-12);

        let err = GammaEvaluator::default()
            .evaluate(&subset, &img, &sf, &[28.0, 0.0])
            .unwrap_err();
        assert!(matches!(err, GammaFailure::OutOfBounds { total: 189, .. }));
    }

    #[test]
    fn flat_images_have_zero_variance() {
        let img = Image::from_fn(32, 32, |_, _| 9.0).unwrap();
        let subset = Subset::square(0, 16, 16, 9, &img).unwrap();
        let sf = translation();
        let err = GammaEvaluator::default()
            .evaluate(&subset, &img, &sf, &[0.0, 0.0])
            .unwrap_err();
        assert_eq!(err, GammaFailure::ZeroVariance);
    }

    #[test]
    fn gradient_points_towards_the_match() {
        let img = Image::from_fn(64, 64, speckle).unwrap();
        let subset = Subset::square(0, 32, 32, 21, &img).unwrap();
        let sf = translation();
        let g = GammaEvaluator::default()
            .evaluate_with_gradient(&subset, &img, &sf, &[0.4, -0.3])
            .unwrap();
        assert_eq!(g.hessian.len(), 4);
        assert!((g.hessian[1] - g.hessian[2]).abs() < 1e-9);
        // Gauss-Newton step -H^-1 q should reduce the offset.
        let (a, b, d) = (g.hessian[0], g.hessian[1], g.hessian[3]);
        let det = a * d - b * b;
        let step_u = -(d * g.residual[0] - b * g.residual[1]) / det;
        let step_v = -(a * g.residual[1] - b * g.residual[0]) / det;
        assert!(step_u < 0.0 && step_v > 0.0);
    }

    #[test]
    fn threshold_checks_ignore_non_positive_limits() {
        assert!(check_threshold(0.5, -1.0).is_ok());
        assert!(check_threshold(0.5, 0.0).is_ok());
        assert!(check_threshold(0.01, 0.02).is_ok());
        assert!(matches!(
            check_threshold(0.05, 0.02),
            Err(GammaFailure::AboveThreshold { .. })
        ));
    }
}

//! Gauss-Newton iteration with optional Levenberg-Marquardt damping and
//! momentum.
//!
//! Each iteration solves `(H + lambda diag(H)) delta = -q` with `H` and `q`
//! from the gamma evaluator, then applies `delta + momentum * previous_step`.
//! The iteration stops once the applied step is shorter than the fast solver
//! tolerance.

use crate::image::ImageField;
use crate::optimizer::{
    OptimizationMethod, Problem, Solution, SolveFailure, SolverSettings, Unsolved,
};
use crate::util::math::{all_finite, norm2};
use nalgebra::{DMatrix, DVector};

/// `|det H| / prod(H_ii)` below which the Hessian counts as degenerate.
const DETERMINANT_RATIO_EPS: f64 = 1.0e-14;

/// Solves the damped normal equations for one step.
fn newton_step(
    hessian: &[f64],
    residual: &[f64],
    lm_factor: f64,
) -> Result<Vec<f64>, SolveFailure> {
    if !all_finite(hessian) || !all_finite(residual) {
        return Err(SolveFailure::NanInHessianOrResidual);
    }
    let n = residual.len();
    let mut h = DMatrix::from_row_slice(n, n, hessian);
    if lm_factor > 0.0 {
        for i in 0..n {
            h[(i, i)] *= 1.0 + lm_factor;
        }
    }

    let diag_product: f64 = (0..n).map(|i| h[(i, i)].abs()).product();
    let det = h.determinant();
    if !det.is_finite() {
        return Err(SolveFailure::NanInHessianOrResidual);
    }
    if diag_product == 0.0 || det.abs() <= DETERMINANT_RATIO_EPS * diag_product {
        return Err(SolveFailure::ZeroHessianDeterminant);
    }

    let rhs = -DVector::from_column_slice(residual);
    let delta = h.lu().solve(&rhs).ok_or(SolveFailure::HessianSingular)?;
    Ok(delta.iter().copied().collect())
}

/// Minimizes gamma starting from `guess`.
pub fn minimize<I: ImageField + ?Sized>(
    problem: Problem<'_, I>,
    settings: &SolverSettings,
    guess: &[f64],
) -> Result<Solution, Unsolved> {
    let mut params = guess.to_vec();
    let mut previous = vec![0.0; params.len()];

    for iteration in 1..=settings.max_iterations_fast {
        let g = problem
            .evaluator
            .evaluate_with_gradient(problem.subset, problem.image, problem.shape, &params)
            .map_err(|f| Unsolved::new(f, iteration))?;
        let delta = newton_step(&g.hessian, &g.residual, settings.lm_factor)
            .map_err(|f| Unsolved::new(f, iteration))?;

        let step: Vec<f64> = delta
            .iter()
            .zip(&previous)
            .map(|(d, p)| d + settings.momentum * p)
            .collect();
        for (p, s) in params.iter_mut().zip(&step) {
            *p += s;
        }
        if !all_finite(&params) {
            return Err(Unsolved::new(
                SolveFailure::NanInHessianOrResidual,
                iteration,
            ));
        }

        if norm2(&step) < settings.fast_tolerance {
            let (gamma, active_pixels) = problem
                .gamma(&params)
                .map_err(|f| Unsolved::new(f, iteration))?;
            return Ok(Solution {
                params,
                gamma,
                active_pixels,
                iterations: iteration,
                method_used: OptimizationMethod::GradientBased,
            });
        }
        previous = step;
    }

    Err(Unsolved::new(
        SolveFailure::MaxIterations,
        settings.max_iterations_fast,
    ))
}

#[cfg(test)]
mod tests {
    use super::{minimize, newton_step};
    use crate::gamma::GammaEvaluator;
    use crate::image::InterpolationMethod;
    use crate::optimizer::test_support::shifted_pair;
    use crate::optimizer::{Problem, SolveFailure, SolverSettings};
    use crate::shape::{DofFlags, ShapeFunction, ShapeFunctionType};
    use crate::subset::Subset;

    #[test]
    fn degenerate_systems_are_classified() {
        assert_eq!(
            newton_step(&[f64::NAN, 0.0, 0.0, 1.0], &[1.0, 1.0], -1.0),
            Err(SolveFailure::NanInHessianOrResidual)
        );
        assert_eq!(
            newton_step(&[1.0, 1.0, 1.0, 1.0], &[1.0, 1.0], -1.0),
            Err(SolveFailure::ZeroHessianDeterminant)
        );
        let step = newton_step(&[2.0, 0.0, 0.0, 4.0], &[2.0, -4.0], -1.0).unwrap();
        assert!((step[0] + 1.0).abs() < 1e-12 && (step[1] - 1.0).abs() < 1e-12);
        let damped = newton_step(&[2.0, 0.0, 0.0, 4.0], &[2.0, -4.0], 1.0).unwrap();
        assert!((damped[0] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn recovers_translation_and_rotation() {
        let (reference, deformed) = shifted_pair(2.3, -1.1);
        let subset = Subset::square(0, 50, 50, 31, &reference).unwrap();
        let flags = DofFlags {
            rotation: true,
            ..DofFlags::default()
        };
        let shape = ShapeFunction::new(ShapeFunctionType::Affine, &flags).unwrap();
        let problem = Problem {
            subset: &subset,
            image: &deformed,
            shape: &shape,
            evaluator: GammaEvaluator::new(InterpolationMethod::KeysFourth, true),
        };
        let settings = SolverSettings::default();
        let sol = minimize(problem, &settings, &[2.0, -1.0, 0.0]).unwrap();
        assert!((sol.params[0] - 2.3).abs() < 0.05);
        assert!((sol.params[1] + 1.1).abs() < 0.05);
        assert!(sol.params[2].abs() < 0.01);
        assert!(sol.iterations < settings.max_iterations_fast);
    }

    #[test]
    fn out_of_bounds_is_a_gamma_failure() {
        let (reference, deformed) = shifted_pair(0.0, 0.0);
        let subset = Subset::square(0, 50, 50, 21, &reference).unwrap();
        let shape = ShapeFunction::new(ShapeFunctionType::Affine, &DofFlags::default()).unwrap();
        let problem = Problem {
            subset: &subset,
            image: &deformed,
            shape: &shape,
            evaluator: GammaEvaluator::default(),
        };
        let err = minimize(problem, &SolverSettings::default(), &[80.0, 0.0]).unwrap_err();
        assert!(matches!(err.failure, SolveFailure::Gamma(_)));
    }
}

//! Per-subset optimization of the shape-function parameters.
//!
//! Two engines minimize gamma: a derivative-free Nelder-Mead simplex
//! ([`simplex`]) and a Gauss-Newton/Levenberg-Marquardt iteration driven by
//! the evaluator's Hessian approximation ([`gradient`]). The hybrid methods
//! chain them; iteration counts of chained stages are summed.

pub mod gradient;
pub mod simplex;

use crate::gamma::{GammaEvaluator, GammaFailure};
use crate::image::ImageField;
use crate::shape::ShapeFunction;
use crate::subset::Subset;
use crate::util::DicError;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Optimization strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OptimizationMethod {
    Simplex,
    GradientBased,
    /// Gradient-based with simplex fallback; failures also request a search retry.
    GradientThenSearch,
    SimplexThenGradientBased,
    #[default]
    GradientBasedThenSimplex,
    /// No optimization; the initial guess is evaluated and returned.
    NotApplicable,
}

impl OptimizationMethod {
    pub const ALL: [OptimizationMethod; 6] = [
        Self::Simplex,
        Self::GradientBased,
        Self::GradientThenSearch,
        Self::SimplexThenGradientBased,
        Self::GradientBasedThenSimplex,
        Self::NotApplicable,
    ];

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simplex => "SIMPLEX",
            Self::GradientBased => "GRADIENT_BASED",
            Self::GradientThenSearch => "GRADIENT_THEN_SEARCH",
            Self::SimplexThenGradientBased => "SIMPLEX_THEN_GRADIENT_BASED",
            Self::GradientBasedThenSimplex => "GRADIENT_BASED_THEN_SIMPLEX",
            Self::NotApplicable => "OPTIMIZATION_METHOD_NOT_APPLICABLE",
        }
    }

    /// True when a failed solve should be retried from a search initialization.
    pub fn retries_with_search(self) -> bool {
        matches!(self, Self::GradientThenSearch)
    }
}

impl fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationMethod {
    type Err = DicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| DicError::InvalidParameterValue {
                name: "optimization_method".to_string(),
                value: s.to_string(),
            })
    }
}

/// Iteration caps, tolerances and step controls shared by both engines.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverSettings {
    pub max_iterations_fast: usize,
    pub max_iterations_robust: usize,
    pub fast_tolerance: f64,
    pub robust_tolerance: f64,
    pub delta_disp: f64,
    pub delta_theta: f64,
    /// Levenberg-Marquardt damping; non-positive disables it.
    pub lm_factor: f64,
    pub momentum: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations_fast: 25,
            max_iterations_robust: 1000,
            fast_tolerance: 1.0e-4,
            robust_tolerance: 1.0e-6,
            delta_disp: 1.0,
            delta_theta: 0.1,
            lm_factor: -1.0,
            momentum: 0.0,
        }
    }
}

/// Why an optimization did not converge.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum SolveFailure {
    #[error("maximum iterations reached")]
    MaxIterations,
    #[error("NaN in hessian or residual")]
    NanInHessianOrResidual,
    #[error("hessian determinant is zero")]
    ZeroHessianDeterminant,
    #[error("hessian is singular")]
    HessianSingular,
    #[error(transparent)]
    Gamma(#[from] GammaFailure),
}

/// Failure plus the work spent before it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unsolved {
    pub failure: SolveFailure,
    pub iterations: usize,
}

impl Unsolved {
    fn new(failure: impl Into<SolveFailure>, iterations: usize) -> Self {
        Self {
            failure: failure.into(),
            iterations,
        }
    }
}

/// Converged parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub params: Vec<f64>,
    pub gamma: f64,
    pub active_pixels: usize,
    pub iterations: usize,
    /// Engine that produced `params`.
    pub method_used: OptimizationMethod,
}

/// One subset against one deformed image.
pub struct Problem<'a, I: ImageField + ?Sized> {
    pub subset: &'a Subset,
    pub image: &'a I,
    pub shape: &'a ShapeFunction,
    pub evaluator: GammaEvaluator,
}

impl<I: ImageField + ?Sized> Clone for Problem<'_, I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I: ImageField + ?Sized> Copy for Problem<'_, I> {}

impl<I: ImageField + ?Sized> Problem<'_, I> {
    /// Gamma and active-pixel count at `params`.
    pub fn gamma(&self, params: &[f64]) -> Result<(f64, usize), GammaFailure> {
        self.evaluator
            .evaluate(self.subset, self.image, self.shape, params)
            .map(|e| (e.gamma, e.active_pixels))
    }
}

/// Runs `method` from `guess`.
pub fn solve<I: ImageField + ?Sized>(
    method: OptimizationMethod,
    problem: Problem<'_, I>,
    settings: &SolverSettings,
    guess: &[f64],
) -> Result<Solution, Unsolved> {
    match method {
        OptimizationMethod::Simplex => simplex::minimize(problem, settings, guess),
        OptimizationMethod::GradientBased => gradient::minimize(problem, settings, guess),
        OptimizationMethod::GradientBasedThenSimplex | OptimizationMethod::GradientThenSearch => {
            match gradient::minimize(problem, settings, guess) {
                Ok(sol) => Ok(sol),
                Err(first) => match simplex::minimize(problem, settings, guess) {
                    Ok(mut sol) => {
                        sol.iterations += first.iterations;
                        Ok(sol)
                    }
                    Err(mut second) => {
                        second.iterations += first.iterations;
                        Err(second)
                    }
                },
            }
        }
        OptimizationMethod::SimplexThenGradientBased => {
            let coarse = simplex::minimize(problem, settings, guess)?;
            match gradient::minimize(problem, settings, &coarse.params) {
                Ok(mut fine) if fine.gamma <= coarse.gamma => {
                    fine.iterations += coarse.iterations;
                    Ok(fine)
                }
                Ok(fine) => Ok(Solution {
                    iterations: coarse.iterations + fine.iterations,
                    ..coarse
                }),
                Err(polish) => Ok(Solution {
                    iterations: coarse.iterations + polish.iterations,
                    ..coarse
                }),
            }
        }
        OptimizationMethod::NotApplicable => {
            let (gamma, active_pixels) = problem.gamma(guess).map_err(|f| Unsolved::new(f, 0))?;
            Ok(Solution {
                params: guess.to_vec(),
                gamma,
                active_pixels,
                iterations: 0,
                method_used: OptimizationMethod::NotApplicable,
            })
        }
    }
}

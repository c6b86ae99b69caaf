//! Nelder-Mead simplex minimization of gamma.
//!
//! The initial simplex is the guess plus one vertex per parameter, offset by
//! the shape function's simplex deltas. Reflection, expansion, contraction
//! and shrink use the standard coefficients 1, 2, 1/2 and 1/2.

use crate::image::ImageField;
use crate::optimizer::{
    OptimizationMethod, Problem, Solution, SolveFailure, SolverSettings, Unsolved,
};
use crate::util::math::all_finite;

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;
const TINY: f64 = 1.0e-10;

struct Vertex {
    params: Vec<f64>,
    gamma: f64,
    active_pixels: usize,
}

fn vertex<I: ImageField + ?Sized>(problem: &Problem<'_, I>, params: Vec<f64>) -> Vertex {
    match problem.gamma(&params) {
        Ok((gamma, active_pixels)) if all_finite(&params) => Vertex {
            params,
            gamma,
            active_pixels,
        },
        _ => Vertex {
            params,
            gamma: f64::INFINITY,
            active_pixels: 0,
        },
    }
}

/// Point `c + t (p - c)`.
fn along(c: &[f64], p: &[f64], t: f64) -> Vec<f64> {
    c.iter().zip(p).map(|(&ci, &pi)| ci + t * (pi - ci)).collect()
}

fn converged(simplex: &[Vertex], tolerance: f64) -> bool {
    let best = &simplex[0];
    let worst = &simplex[simplex.len() - 1];
    let spread =
        2.0 * (worst.gamma - best.gamma).abs() / (worst.gamma.abs() + best.gamma.abs() + TINY);
    if spread < tolerance {
        return true;
    }
    let size = simplex[1..]
        .iter()
        .map(|v| {
            v.params
                .iter()
                .zip(&best.params)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max)
        })
        .fold(0.0, f64::max);
    size < tolerance
}

/// Minimizes gamma starting from `guess`.
pub fn minimize<I: ImageField + ?Sized>(
    problem: Problem<'_, I>,
    settings: &SolverSettings,
    guess: &[f64],
) -> Result<Solution, Unsolved> {
    let (gamma0, active0) = problem
        .gamma(guess)
        .map_err(|f| Unsolved::new(f, 0))?;

    let deltas = problem
        .shape
        .simplex_deltas(settings.delta_disp, settings.delta_theta);
    let mut simplex = Vec::with_capacity(guess.len() + 1);
    simplex.push(Vertex {
        params: guess.to_vec(),
        gamma: gamma0,
        active_pixels: active0,
    });
    for (i, delta) in deltas.iter().enumerate() {
        let mut p = guess.to_vec();
        p[i] += delta;
        simplex.push(vertex(&problem, p));
    }

    let n = guess.len();
    for iteration in 0..settings.max_iterations_robust {
        simplex.sort_by(|a, b| a.gamma.total_cmp(&b.gamma));
        if converged(&simplex, settings.robust_tolerance) {
            let best = &simplex[0];
            return Ok(Solution {
                params: best.params.clone(),
                gamma: best.gamma,
                active_pixels: best.active_pixels,
                iterations: iteration,
                method_used: OptimizationMethod::Simplex,
            });
        }

        let mut centroid = vec![0.0; n];
        for v in &simplex[..n] {
            for (c, p) in centroid.iter_mut().zip(&v.params) {
                *c += p / n as f64;
            }
        }
        let worst_gamma = simplex[n].gamma;
        let second_gamma = simplex[n - 1].gamma;
        let best_gamma = simplex[0].gamma;

        let reflected = vertex(&problem, along(&centroid, &simplex[n].params, -REFLECT));
        if reflected.gamma < best_gamma {
            let expanded = vertex(&problem, along(&centroid, &simplex[n].params, -EXPAND));
            simplex[n] = if expanded.gamma < reflected.gamma {
                expanded
            } else {
                reflected
            };
            continue;
        }
        if reflected.gamma < second_gamma {
            simplex[n] = reflected;
            continue;
        }

        let contracted = if reflected.gamma < worst_gamma {
            vertex(&problem, along(&centroid, &reflected.params, CONTRACT))
        } else {
            vertex(&problem, along(&centroid, &simplex[n].params, CONTRACT))
        };
        if contracted.gamma < reflected.gamma.min(worst_gamma) {
            simplex[n] = contracted;
            continue;
        }

        let best = simplex[0].params.clone();
        for v in simplex.iter_mut().skip(1) {
            let p = along(&best, &v.params, SHRINK);
            *v = vertex(&problem, p);
        }
    }

    Err(Unsolved::new(
        SolveFailure::MaxIterations,
        settings.max_iterations_robust,
    ))
}

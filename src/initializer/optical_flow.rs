//! Translation-only Lucas-Kanade optical flow.
//!
//! Starting from the predicted solution, each iteration linearizes the
//! deformed intensities around the current translation using reference
//! gradients and solves the 2x2 normal equations for an update. Non-
//! translational parameters of the prediction are kept unchanged.

use super::{GuessSource, InitContext, InitFailure, InitialGuess, InitializationMethod, Initializer};
use crate::image::ImageField;

/// Lucas-Kanade settings.
#[derive(Clone, Copy, Debug)]
pub struct OpticalFlowInitializer {
    pub max_iterations: usize,
    /// Update length below which the iteration stops.
    pub tolerance: f64,
}

impl Default for OpticalFlowInitializer {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance: 0.01,
        }
    }
}

impl Initializer for OpticalFlowInitializer {
    fn method(&self) -> InitializationMethod {
        InitializationMethod::UseOpticalFlow
    }

    fn initialize(&self, ctx: &InitContext<'_>, subset: usize) -> Result<InitialGuess, InitFailure> {
        let s = ctx.subset(subset)?;
        let method = ctx.evaluator.interpolation;

        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for (i, &(x, y)) in s.pixels().iter().enumerate() {
            if !s.is_active(i) {
                continue;
            }
            let (gx, gy) = ctx.reference.gradient(x as usize, y as usize);
            sxx += gx * gx;
            sxy += gx * gy;
            syy += gy * gy;
        }
        let det = sxx * syy - sxy * sxy;
        if !(det.abs() > f64::EPSILON * (sxx * syy).abs().max(1.0)) {
            return Err(InitFailure::NoEstimate("structure tensor is singular"));
        }

        let mut params = ctx.predicted(subset);
        let start = ctx.shape.motion(&params);
        let (mut u, mut v) = (start.u, start.v);
        for _ in 0..self.max_iterations {
            let (mut bx, mut by) = (0.0, 0.0);
            for (i, &(x, y)) in s.pixels().iter().enumerate() {
                if !s.is_active(i) || !ctx.deformed.contains(x + u, y + v) {
                    continue;
                }
                let (gx, gy) = ctx.reference.gradient(x as usize, y as usize);
                let diff = s.reference()[i] - ctx.deformed.interpolate(x + u, y + v, method);
                bx += gx * diff;
                by += gy * diff;
            }
            let du = (syy * bx - sxy * by) / det;
            let dv = (sxx * by - sxy * bx) / det;
            if !du.is_finite() || !dv.is_finite() {
                return Err(InitFailure::NoEstimate("optical flow diverged"));
            }
            u += du;
            v += dv;
            if du.hypot(dv) < self.tolerance {
                break;
            }
        }

        ctx.shape.add_translation(&mut params, u - start.u, v - start.v);
        ctx.guess(subset, params, GuessSource::OpticalFlow)
    }
}

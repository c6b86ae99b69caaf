//! Frame-by-frame correlation driver.
//!
//! The [`Driver`] owns the subsets, the field store and the per-subset
//! solution history. Each call to [`Driver::correlate_frame`] initializes,
//! optimizes and checks every subset against one deformed frame, writes the
//! accepted values to the field store and returns a [`FrameReport`].
//!
//! Subsets are processed in dependency waves (see [`schedule`]); members of
//! a wave are solved concurrently when the `rayon` feature is enabled and
//! their results are written after the wave in subset order, so parallel and
//! sequential runs produce identical fields. Per-subset failures never abort
//! a frame: they become [`StatusFlag`]s, the subset keeps its previous
//! displacement and its GAMMA and SIGMA are set to -1.

pub mod motion;
pub mod report;
pub mod schedule;
pub mod state;
pub mod status;

pub use report::{FrameReport, SubsetResult};
pub use state::SubsetState;
pub use status::StatusFlag;

use crate::field::{FieldName, FieldSpec, FieldState, FieldStore};
use crate::gamma::{check_threshold, GammaEval};
use crate::image::filter::gauss_filter;
use crate::image::{Image, ImageField};
use crate::initializer::{
    self, Collaborators, GuessSource, InitContext, InitFailure, InitialGuess,
    InitializationMethod, Initializer, SolutionHistory,
};
use crate::optimizer::{solve, OptimizationMethod, Problem, Solution, SolverSettings, Unsolved};
use crate::params::CorrelationParams;
use crate::search::search_translation;
use crate::shape::{Dof, ShapeFunction};
use crate::subset::Subset;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{DicError, DicResult};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Scalar fields written for every subset.
const SCALAR_FIELDS: [FieldName; 9] = [
    FieldName::Gamma,
    FieldName::Sigma,
    FieldName::Sssig,
    FieldName::NoiseLevel,
    FieldName::ActivePixels,
    FieldName::Match,
    FieldName::Iterations,
    FieldName::StatusFlag,
    FieldName::NeighborId,
];

/// Result of processing one subset, before it is stored.
#[derive(Clone, Debug)]
struct Outcome {
    status: StatusFlag,
    accepted: Option<Accepted>,
    iterations: usize,
    active_pixels: usize,
}

#[derive(Clone, Debug)]
struct Accepted {
    params: Vec<f64>,
    gamma: f64,
    deformed: Vec<f64>,
}

impl Outcome {
    fn failed(status: StatusFlag, iterations: usize, active_pixels: usize) -> Self {
        Self {
            status,
            accepted: None,
            iterations,
            active_pixels,
        }
    }

    fn accepted(status: StatusFlag, params: Vec<f64>, eval: GammaEval, iterations: usize) -> Self {
        Self {
            status,
            accepted: Some(Accepted {
                params,
                gamma: eval.gamma,
                deformed: eval.deformed,
            }),
            iterations,
            active_pixels: eval.active_pixels,
        }
    }
}

/// Tracks a set of subsets through a sequence of deformed frames.
pub struct Driver {
    params: CorrelationParams,
    shape: ShapeFunction,
    settings: SolverSettings,
    reference: Image,
    subsets: Vec<Subset>,
    fields: FieldStore,
    history: Vec<SolutionHistory>,
    initializer: Box<dyn Initializer>,
    waves: Vec<Vec<usize>>,
    previous_deformed: Option<Image>,
    frame: usize,
    parallel: bool,
}

impl Driver {
    /// Creates a driver without external collaborators.
    pub fn new(params: CorrelationParams, subsets: Vec<Subset>, reference: Image) -> DicResult<Self> {
        Self::with_collaborators(params, subsets, reference, Collaborators::default())
    }

    /// Creates a driver; `collaborators` supply point mappings for the
    /// initialization methods that need them.
    pub fn with_collaborators(
        params: CorrelationParams,
        subsets: Vec<Subset>,
        reference: Image,
        collaborators: Collaborators,
    ) -> DicResult<Self> {
        params.check()?;
        if subsets.is_empty() {
            return Err(DicError::InvalidConfig("no subsets to correlate"));
        }
        for s in &subsets {
            let (_, _, x1, y1) = s.bounds();
            if x1 >= reference.width() || y1 >= reference.height() {
                return Err(DicError::InvalidConfig(
                    "subset extends beyond the reference image",
                ));
            }
        }
        let shape = params.shape_function()?;

        let (reference, subsets) = if params.gauss_filter_images {
            let filtered = gauss_filter(&reference, params.gauss_filter_mask_size)?;
            let resampled = subsets
                .iter()
                .map(|s| s.resample(&filtered))
                .collect::<DicResult<Vec<_>>>()?;
            (filtered, resampled)
        } else {
            (reference, subsets)
        };

        let initializer = initializer::build(params.initialization_method, &reference, collaborators)?;
        let waves = if params.initialization_method == InitializationMethod::UseSpaceFillingIterations {
            schedule::space_filling_order(&subsets)
        } else {
            schedule::waves(&subsets)
        };

        let mut fields = FieldStore::new(subsets.len());
        fields.register(FieldSpec::current(FieldName::SubsetCoordinates));
        for dof in shape.dofs() {
            fields.register_all_states(dof.field().0);
        }
        for name in SCALAR_FIELDS {
            fields.register(FieldSpec::current(name));
        }
        for (i, s) in subsets.iter().enumerate() {
            let (cx, cy) = s.centroid();
            let stats = s.stats();
            fields.set_vector(FieldSpec::current(FieldName::SubsetCoordinates), i, [cx, cy])?;
            fields.set(
                FieldSpec::current(FieldName::NeighborId),
                i,
                s.neighbor().map_or(-1.0, |n| n as f64),
            )?;
            fields.set(FieldSpec::current(FieldName::Sssig), i, stats.sssig)?;
            fields.set(FieldSpec::current(FieldName::NoiseLevel), i, stats.noise)?;
            fields.set(FieldSpec::current(FieldName::Sigma), i, stats.sigma)?;
        }

        trace_event!(
            "driver_ready",
            subsets = subsets.len(),
            waves = waves.len(),
            params = shape.num_params(),
            routine = params.correlation_routine.as_str(),
            initializer = initializer.method().as_str()
        );

        Ok(Self {
            settings: params.solver_settings(),
            history: vec![SolutionHistory::default(); subsets.len()],
            params,
            shape,
            reference,
            subsets,
            fields,
            initializer,
            waves,
            previous_deformed: None,
            frame: 0,
            parallel: true,
        })
    }

    /// Solves the subsets of a wave in parallel when the `rayon` feature is
    /// enabled (the default). Results do not depend on this setting.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn params(&self) -> &CorrelationParams {
        &self.params
    }

    pub fn shape(&self) -> &ShapeFunction {
        &self.shape
    }

    pub fn subsets(&self) -> &[Subset] {
        &self.subsets
    }

    pub fn field_store(&self) -> &FieldStore {
        &self.fields
    }

    /// Reference image as used for correlation (filtered when enabled).
    pub fn reference(&self) -> &Image {
        &self.reference
    }

    /// Strategy producing initial guesses.
    pub fn initialization_method(&self) -> InitializationMethod {
        self.initializer.method()
    }

    /// Number of frames correlated so far.
    pub fn frame_index(&self) -> usize {
        self.frame
    }

    /// Seeds the stored solution of subset `index` before the next frame.
    pub fn set_initial_solution(&mut self, index: usize, params: Vec<f64>) -> DicResult<()> {
        if index >= self.subsets.len() {
            return Err(DicError::IndexOutOfBounds {
                index,
                len: self.subsets.len(),
                context: "subset",
            });
        }
        if params.len() != self.shape.num_params() || params.iter().any(|p| !p.is_finite()) {
            return Err(DicError::InvalidConfig(
                "initial solution does not match the shape function",
            ));
        }
        self.write_params(FieldState::N, index, &params)?;
        self.history[index].push(params);
        Ok(())
    }

    /// Correlates every subset against `frame`.
    pub fn correlate_frame(&mut self, frame: &Image) -> DicResult<FrameReport> {
        if frame.width() != self.reference.width() || frame.height() != self.reference.height() {
            return Err(DicError::InvalidConfig(
                "deformed frame size differs from the reference",
            ));
        }
        let _span = trace_span!("frame", index = self.frame).entered();
        let deformed = if self.params.gauss_filter_images {
            gauss_filter(frame, self.params.gauss_filter_mask_size)?
        } else {
            frame.clone()
        };

        self.fields.advance();
        let prepared = match self.initializer.prepare_frame(&self.reference, &deformed) {
            Ok(()) => true,
            Err(e) => {
                trace_warn!("prepare_frame_failed", frame = self.frame, error = e.to_string().as_str());
                false
            }
        };
        for i in 0..self.subsets.len() {
            if let Some(predicted) = self.history[i].extrapolate(self.params.projection_method) {
                self.write_params(FieldState::NPlusOne, i, &predicted)?;
            }
        }

        let mut current: Vec<Option<Vec<f64>>> = vec![None; self.subsets.len()];
        let mut outcomes: Vec<Option<Outcome>> = vec![None; self.subsets.len()];
        let waves = self.waves.clone();
        for (w, wave) in waves.iter().enumerate() {
            let _wave_span = trace_span!("wave", index = w, size = wave.len()).entered();
            let results = self.run_wave(wave, &deformed, &current, prepared);
            for (idx, outcome) in results {
                let outcome = self.store(idx, outcome);
                if let Some(acc) = &outcome.accepted {
                    current[idx] = Some(acc.params.clone());
                }
                outcomes[idx] = Some(outcome);
            }
        }

        for (idx, slot) in current.into_iter().enumerate() {
            if let Some(params) = slot {
                self.history[idx].push(params);
            }
        }
        let report = self.report(&outcomes)?;
        trace_event!(
            "frame_summary",
            frame = self.frame,
            successful = report.num_successful(),
            failed = report.num_failed()
        );
        self.previous_deformed = Some(deformed);
        self.frame += 1;
        Ok(report)
    }

    fn run_wave(
        &self,
        wave: &[usize],
        deformed: &Image,
        current: &[Option<Vec<f64>>],
        prepared: bool,
    ) -> Vec<(usize, Outcome)> {
        let ctx = InitContext {
            frame: self.frame,
            subsets: &self.subsets,
            shape: &self.shape,
            evaluator: self.params.evaluator(),
            reference: &self.reference,
            deformed,
            history: &self.history,
            current,
            projection: self.params.projection_method,
        };

        #[cfg(feature = "rayon")]
        {
            if self.parallel && wave.len() > 1 {
                return wave
                    .par_iter()
                    .map(|&idx| (idx, self.process(&ctx, idx, prepared)))
                    .collect();
            }
        }
        wave.iter()
            .map(|&idx| (idx, self.process(&ctx, idx, prepared)))
            .collect()
    }

    /// Runs one subset through initialization, optimization and acceptance.
    fn process(&self, ctx: &InitContext<'_>, idx: usize, prepared: bool) -> Outcome {
        let subset = &self.subsets[idx];
        let p = &self.params;
        let mut state = SubsetState::Pending;

        if let Some(outcome) = self.unchanged_window(ctx, idx) {
            state.advance(SubsetState::Converged(outcome.status));
            return outcome;
        }
        if p.sssig_threshold > 0.0 && subset.stats().sssig < p.sssig_threshold {
            state.advance(SubsetState::Failed(StatusFlag::SubsetConstructionFailed));
            return Outcome::failed(StatusFlag::SubsetConstructionFailed, 0, 0);
        }
        if !prepared {
            state.advance(SubsetState::Failed(StatusFlag::InitializeFailedByException));
            return Outcome::failed(StatusFlag::InitializeFailedByException, 0, 0);
        }

        state.advance(SubsetState::Initializing);
        let first = match self.initializer.initialize(ctx, idx) {
            Ok(g) if check_threshold(g.gamma, p.initial_gamma_threshold).is_ok() => Some(g),
            Ok(_) | Err(InitFailure::Gamma(_)) | Err(InitFailure::NoEstimate(_)) => None,
            Err(InitFailure::Collaborator(e)) => {
                trace_warn!("initialize_failed", subset = subset.id(), error = e.to_string().as_str());
                state.advance(SubsetState::Failed(StatusFlag::InitializeFailedByException));
                return Outcome::failed(StatusFlag::InitializeFailedByException, 0, 0);
            }
        };
        let guess = match first {
            Some(g) => g,
            None if !p.use_search_initialization_for_failed_steps => {
                state.advance(SubsetState::Failed(StatusFlag::InitializeFailed));
                return Outcome::failed(StatusFlag::InitializeFailed, 0, 0);
            }
            None => match self.search_guess(ctx, idx) {
                Ok(Some(g)) if check_threshold(g.gamma, p.initial_gamma_threshold).is_ok() => g,
                Ok(Some(g)) => {
                    state.advance(SubsetState::Failed(StatusFlag::InitializeFailed));
                    return Outcome::failed(StatusFlag::InitializeFailed, 0, g.active_pixels);
                }
                Ok(None) => {
                    state.advance(SubsetState::Failed(StatusFlag::SearchFailed));
                    return Outcome::failed(StatusFlag::SearchFailed, 0, 0);
                }
                Err(e) => {
                    trace_warn!("search_failed", subset = subset.id(), error = e.to_string().as_str());
                    state.advance(SubsetState::Failed(StatusFlag::SearchFailedByException));
                    return Outcome::failed(StatusFlag::SearchFailedByException, 0, 0);
                }
            },
        };

        let skip = p.skip_all_solves || guess.gamma < p.skip_solve_gamma_threshold;
        let (solution, status) = if skip {
            let status = StatusFlag::from_guess_source(guess.source);
            (
                Solution {
                    params: guess.params,
                    gamma: guess.gamma,
                    active_pixels: guess.active_pixels,
                    iterations: 0,
                    method_used: OptimizationMethod::NotApplicable,
                },
                status,
            )
        } else {
            state.advance(SubsetState::Optimizing);
            match self.optimize(ctx, idx, &guess, &mut state) {
                Ok(sol) => (sol, StatusFlag::CorrelationSuccessful),
                Err(unsolved) => {
                    let status = StatusFlag::from(unsolved.failure);
                    state.advance(SubsetState::Failed(status));
                    return Outcome::failed(status, unsolved.iterations, guess.active_pixels);
                }
            }
        };

        if let Some(status) = self.rejection(idx, &solution) {
            state.advance(SubsetState::Failed(status));
            return Outcome::failed(status, solution.iterations, solution.active_pixels);
        }
        let eval = match ctx
            .evaluator
            .evaluate(subset, ctx.deformed, &self.shape, &solution.params)
        {
            Ok(eval) => eval,
            Err(_) => {
                state.advance(SubsetState::Failed(StatusFlag::CorrelationFailed));
                return Outcome::failed(StatusFlag::CorrelationFailed, solution.iterations, 0);
            }
        };
        state.advance(SubsetState::Converged(status));
        Outcome::accepted(
            status,
            solution.params,
            GammaEval {
                gamma: solution.gamma,
                ..eval
            },
            solution.iterations,
        )
    }

    /// Optimizer for a subset, honouring its force-simplex hint.
    fn method_for(&self, subset: &Subset) -> OptimizationMethod {
        if subset.force_simplex() && !self.params.override_force_simplex {
            OptimizationMethod::Simplex
        } else {
            self.params.optimization_method
        }
    }

    fn optimize(
        &self,
        ctx: &InitContext<'_>,
        idx: usize,
        guess: &InitialGuess,
        state: &mut SubsetState,
    ) -> Result<Solution, Unsolved> {
        let subset = &self.subsets[idx];
        let method = self.method_for(subset);
        let problem = Problem {
            subset,
            image: ctx.deformed,
            shape: &self.shape,
            evaluator: ctx.evaluator,
        };
        let failed = match solve(method, problem, &self.settings, &guess.params) {
            Ok(sol) => return Ok(sol),
            Err(failed) => failed,
        };
        if !method.retries_with_search() || guess.source == GuessSource::Search {
            return Err(failed);
        }

        state.advance(SubsetState::Initializing);
        let retry = match self.search_guess(ctx, idx) {
            Ok(Some(g)) => g,
            _ => return Err(failed),
        };
        state.advance(SubsetState::Optimizing);
        solve(method, problem, &self.settings, &retry.params)
            .map(|mut sol| {
                sol.iterations += failed.iterations;
                sol
            })
            .map_err(|mut again| {
                again.iterations += failed.iterations;
                again
            })
    }

    /// Template search around the predicted position.
    fn search_guess(
        &self,
        ctx: &InitContext<'_>,
        idx: usize,
    ) -> Result<Option<InitialGuess>, InitFailure> {
        let subset = &self.subsets[idx];
        let mut params = ctx.predicted(idx);
        let motion = self.shape.motion(&params);
        let Some(found) = search_translation(
            subset,
            ctx.deformed,
            (motion.u, motion.v),
            self.params.search_window_radius,
        ) else {
            return Ok(None);
        };
        self.shape
            .add_translation(&mut params, found.u - motion.u, found.v - motion.v);
        match ctx.guess(idx, params, GuessSource::Search) {
            Ok(g) => Ok(Some(g)),
            Err(InitFailure::Collaborator(e)) => Err(InitFailure::Collaborator(e)),
            Err(_) => Ok(None),
        }
    }

    /// Copies the stored solution forward when the subset window did not
    /// change since the previous frame.
    fn unchanged_window(&self, ctx: &InitContext<'_>, idx: usize) -> Option<Outcome> {
        if !self.params.enable_motion_detection {
            return None;
        }
        let subset = &self.subsets[idx];
        let previous = self.previous_deformed.as_ref()?;
        let last = self.history.get(idx)?.latest()?;
        let change = motion::mean_abs_change(previous, ctx.deformed, subset)?;
        if change >= self.params.motion_detection_threshold {
            return None;
        }
        let eval = ctx
            .evaluator
            .evaluate(subset, ctx.deformed, &self.shape, last)
            .ok()?;
        Some(Outcome::accepted(
            StatusFlag::FrameSkippedDueToNoMotion,
            last.to_vec(),
            eval,
            0,
        ))
    }

    /// Acceptance checks on a solution: final gamma, jump tolerances, sigma.
    fn rejection(&self, idx: usize, solution: &Solution) -> Option<StatusFlag> {
        let p = &self.params;
        if check_threshold(solution.gamma, p.final_gamma_threshold).is_err() {
            return Some(StatusFlag::FrameFailedDueToHighGamma);
        }
        let zero = self.shape.zero_params();
        let last = self.history[idx].latest().unwrap_or(&zero);
        let value = |params: &[f64], dof: Dof| self.shape.value(params, dof);
        let du = (value(&solution.params, Dof::U) - value(last, Dof::U)).abs();
        let dv = (value(&solution.params, Dof::V) - value(last, Dof::V)).abs();
        let dt = (value(&solution.params, Dof::Theta) - value(last, Dof::Theta)).abs();
        if du > p.disp_jump_tol || dv > p.disp_jump_tol || dt > p.theta_jump_tol {
            return Some(StatusFlag::JumpToleranceExceeded);
        }
        let sigma = self.subsets[idx].stats().sigma;
        if sigma < 0.0 || !sigma.is_finite() {
            return Some(StatusFlag::FrameFailedDueToNegativeSigma);
        }
        None
    }

    /// Writes DOF values of `params` into the fields at `state`.
    fn write_params(&mut self, state: FieldState, idx: usize, params: &[f64]) -> DicResult<()> {
        for (dof, &value) in self.shape.dofs().iter().zip(params) {
            let (name, component) = dof.field();
            self.fields
                .set_component(FieldSpec::new(name, state), idx, component, value)?;
        }
        Ok(())
    }

    /// Stores an outcome; storage errors turn it into a failure.
    fn store(&mut self, idx: usize, outcome: Outcome) -> Outcome {
        match self.try_store(idx, &outcome) {
            Ok(()) => {
                if !outcome.status.is_success() {
                    trace_warn!(
                        "subset_failed",
                        subset = self.subsets[idx].id(),
                        status = outcome.status.as_str()
                    );
                }
                outcome
            }
            Err(e) => {
                trace_warn!("store_failed", subset = self.subsets[idx].id(), error = e.to_string().as_str());
                let failed = Outcome::failed(
                    StatusFlag::CorrelationFailedByException,
                    outcome.iterations,
                    outcome.active_pixels,
                );
                let _ = self.try_store(idx, &failed);
                failed
            }
        }
    }

    fn try_store(&mut self, idx: usize, outcome: &Outcome) -> DicResult<()> {
        let current = FieldSpec::current;
        match &outcome.accepted {
            Some(acc) => {
                self.write_params(FieldState::N, idx, &acc.params)?;
                self.fields.set(current(FieldName::Gamma), idx, acc.gamma)?;
                self.fields
                    .set(current(FieldName::Sigma), idx, self.subsets[idx].stats().sigma)?;
                self.fields.set(current(FieldName::Match), idx, 0.0)?;
                self.subsets[idx].set_deformed(acc.deformed.clone());
            }
            None => {
                self.fields.set(current(FieldName::Gamma), idx, -1.0)?;
                self.fields.set(current(FieldName::Sigma), idx, -1.0)?;
                self.fields.set(current(FieldName::Match), idx, -1.0)?;
            }
        }
        self.fields
            .set(current(FieldName::ActivePixels), idx, outcome.active_pixels as f64)?;
        self.fields
            .set(current(FieldName::Iterations), idx, outcome.iterations as f64)?;
        self.fields
            .set(current(FieldName::StatusFlag), idx, f64::from(outcome.status.code()))?;
        Ok(())
    }

    fn report(&self, outcomes: &[Option<Outcome>]) -> DicResult<FrameReport> {
        let current = FieldSpec::current;
        let component = |name: FieldName, idx: usize, comp: usize| -> DicResult<f64> {
            let spec = current(name);
            if self.fields.is_registered(spec) {
                self.fields.get_component(spec, idx, comp)
            } else {
                Ok(0.0)
            }
        };
        let scalar = |name: FieldName, idx: usize| component(name, idx, 0);
        let mut results = Vec::with_capacity(self.subsets.len());
        for (idx, subset) in self.subsets.iter().enumerate() {
            let Some(outcome) = outcomes.get(idx).and_then(Option::as_ref) else {
                continue;
            };
            let (x, y) = subset.centroid();
            let u = component(FieldName::Displacement, idx, 0)?;
            let v = component(FieldName::Displacement, idx, 1)?;
            let params = match &outcome.accepted {
                Some(acc) => acc.params.clone(),
                None => self
                    .shape
                    .dofs()
                    .iter()
                    .map(|d| {
                        let (name, component) = d.field();
                        self.fields.get_component(current(name), idx, component)
                    })
                    .collect::<DicResult<Vec<_>>>()?,
            };
            results.push(SubsetResult {
                id: subset.id(),
                x,
                y,
                u,
                v,
                theta: scalar(FieldName::RotationZ, idx)?,
                ex: scalar(FieldName::NormalStrainXx, idx)?,
                ey: scalar(FieldName::NormalStrainYy, idx)?,
                gxy: scalar(FieldName::ShearStrainXy, idx)?,
                gamma: scalar(FieldName::Gamma, idx)?,
                sigma: scalar(FieldName::Sigma, idx)?,
                active_pixels: outcome.active_pixels,
                iterations: outcome.iterations,
                status: outcome.status,
                params,
            });
        }
        Ok(FrameReport {
            frame: self.frame,
            results,
            omit_row_id: self.params.omit_output_row_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Driver, StatusFlag};
    use crate::field::{DISPLACEMENT_FS, DISPLACEMENT_NM1_FS, GAMMA_FS, STATUS_FLAG_FS};
    use crate::image::Image;
    use crate::initializer::{Collaborators, InitializationMethod, PointTransform};
    use crate::optimizer::test_support::{shifted_pair, speckle};
    use crate::params::CorrelationParams;
    use crate::subset::Subset;
    use crate::util::{DicError, DicResult};

    fn grid(reference: &Image) -> Vec<Subset> {
        [(35, 35), (65, 35), (35, 65), (65, 65)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Subset::square(i, x, y, 21, reference).unwrap())
            .collect()
    }

    #[test]
    fn recovers_a_uniform_translation() {
        let (reference, deformed) = shifted_pair(0.6, -0.4);
        let mut driver = Driver::new(CorrelationParams::generic(), grid(&reference), reference).unwrap();
        let report = driver.correlate_frame(&deformed).unwrap();
        assert_eq!(report.num_successful(), 4);
        for r in &report.results {
            assert_eq!(r.status, StatusFlag::CorrelationSuccessful);
            assert!((r.u - 0.6).abs() < 0.02, "u = {}", r.u);
            assert!((r.v + 0.4).abs() < 0.02, "v = {}", r.v);
            assert!(r.gamma >= 0.0 && r.gamma < 1e-3);
        }
        let fields = driver.field_store();
        assert!((fields.get_vector(DISPLACEMENT_FS, 2).unwrap()[0] - 0.6).abs() < 0.02);
        assert_eq!(fields.get(STATUS_FLAG_FS, 2).unwrap(), 0.0);
        assert_eq!(driver.frame_index(), 1);
    }

    #[test]
    fn jump_tolerance_rejects_and_keeps_stale_values() {
        let (reference, deformed) = shifted_pair(2.3, 0.0);
        let params = CorrelationParams {
            disp_jump_tol: 1.0,
            ..CorrelationParams::generic()
        };
        let mut driver = Driver::new(params, grid(&reference), reference).unwrap();
        let report = driver.correlate_frame(&deformed).unwrap();
        for r in &report.results {
            assert_eq!(r.status, StatusFlag::JumpToleranceExceeded);
            assert_eq!(r.u, 0.0);
            assert_eq!(r.gamma, -1.0);
            assert_eq!(r.sigma, -1.0);
        }
        assert_eq!(driver.field_store().get(GAMMA_FS, 0).unwrap(), -1.0);
    }

    #[test]
    fn later_frames_start_from_stored_values() {
        let reference = Image::from_fn(100, 100, speckle).unwrap();
        let subsets = grid(&reference);
        let mut driver = Driver::new(CorrelationParams::generic(), subsets, reference).unwrap();
        for step in 1..=3 {
            let shift = 0.8 * step as f64;
            let frame = Image::from_fn(100, 100, |x, y| speckle(x - shift, y)).unwrap();
            let report = driver.correlate_frame(&frame).unwrap();
            assert_eq!(report.frame, step - 1);
            for r in &report.results {
                assert!(r.is_success(), "{:?}", r.status);
                assert!((r.u - shift).abs() < 0.02);
            }
        }
        let prev = driver.field_store().get_vector(DISPLACEMENT_NM1_FS, 0).unwrap();
        assert!((prev[0] - 1.6).abs() < 0.02);
    }

    #[test]
    fn skip_all_solves_accepts_the_initial_guess() {
        let (reference, deformed) = shifted_pair(0.3, 0.0);
        let params = CorrelationParams {
            skip_all_solves: true,
            initialization_method: InitializationMethod::UseZeros,
            ..CorrelationParams::generic()
        };
        let mut driver = Driver::new(params, grid(&reference), reference).unwrap();
        let report = driver.correlate_frame(&deformed).unwrap();
        for r in &report.results {
            assert_eq!(r.status, StatusFlag::InitializeSuccessful);
            assert_eq!(r.iterations, 0);
            assert_eq!(r.u, 0.0);
        }
    }

    /// Known translation on the left half of the image, an error elsewhere.
    struct LeftHalfOnly;

    impl PointTransform for LeftHalfOnly {
        fn apply(&self, x: f64, y: f64) -> DicResult<Option<(f64, f64)>> {
            if x > 50.0 {
                return Err(DicError::NumericalFailure("outside the calibrated region"));
            }
            Ok(Some((x + 0.6, y - 0.4)))
        }
    }

    #[test]
    fn collaborator_errors_fail_only_their_subsets() {
        let (reference, deformed) = shifted_pair(0.6, -0.4);
        let params = CorrelationParams {
            initialization_method: InitializationMethod::UsePlanarProjection,
            ..CorrelationParams::generic()
        };
        let collaborators = Collaborators {
            point_transform: Some(Box::new(LeftHalfOnly)),
            ..Collaborators::default()
        };
        let mut driver =
            Driver::with_collaborators(params, grid(&reference), reference, collaborators).unwrap();
        assert_eq!(
            driver.initialization_method(),
            InitializationMethod::UsePlanarProjection
        );
        let report = driver.correlate_frame(&deformed).unwrap();
        assert_eq!(report.results.len(), 4);
        for r in &report.results {
            if r.x > 50.0 {
                assert_eq!(r.status, StatusFlag::InitializeFailedByException);
                assert_eq!(r.gamma, -1.0);
                assert_eq!(r.u, 0.0);
            } else {
                assert_eq!(r.status, StatusFlag::CorrelationSuccessful);
                assert!((r.u - 0.6).abs() < 0.02, "u = {}", r.u);
            }
        }
        let code = driver.field_store().get(STATUS_FLAG_FS, 1).unwrap();
        assert_eq!(code, f64::from(StatusFlag::InitializeFailedByException.code()));
        assert_eq!(driver.frame_index(), 1);
    }

    #[test]
    fn setup_errors_are_reported() {
        let (reference, deformed) = shifted_pair(0.0, 0.0);
        assert!(matches!(
            Driver::new(CorrelationParams::generic(), Vec::new(), reference.clone()),
            Err(DicError::InvalidConfig(_))
        ));
        let small = Image::from_fn(50, 50, speckle).unwrap();
        let mut driver = Driver::new(CorrelationParams::generic(), grid(&reference), reference).unwrap();
        assert!(driver.correlate_frame(&small).is_err());
        assert!(driver.set_initial_solution(0, vec![1.0]).is_err());
        assert!(driver.set_initial_solution(9, vec![1.0, 0.0]).is_err());
        driver.set_initial_solution(0, vec![0.1, 0.0]).unwrap();
        assert!(driver.correlate_frame(&deformed).is_ok());
    }
}

//! Correlation parameters.
//!
//! Parameters arrive as a loosely typed [`ParamMap`] (for example from a
//! configuration file), are validated against the [`registry`] and are then
//! folded into an immutable [`CorrelationParams`] on top of one of two
//! presets: [`CorrelationParams::generic`] or [`CorrelationParams::tracking`].

pub mod registry;

use crate::gamma::GammaEvaluator;
use crate::image::filter::GAUSS_MASK_SIZES;
use crate::image::{GradientMethod, InterpolationMethod};
use crate::initializer::{InitializationMethod, ProjectionMethod};
use crate::optimizer::{OptimizationMethod, SolverSettings};
use crate::shape::{DofFlags, ShapeFunction, ShapeFunctionType};
use crate::util::{DicError, DicResult};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Overall correlation routine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CorrelationRoutine {
    #[default]
    Generic,
    /// Tracking of few, large, possibly obstructed subsets.
    Tracking,
    NotApplicable,
}

impl CorrelationRoutine {
    pub const ALL: [CorrelationRoutine; 3] = [Self::Generic, Self::Tracking, Self::NotApplicable];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "GENERIC_ROUTINE",
            Self::Tracking => "TRACKING_ROUTINE",
            Self::NotApplicable => "CORRELATION_ROUTINE_NOT_APPLICABLE",
        }
    }
}

impl fmt::Display for CorrelationRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrelationRoutine {
    type Err = DicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == upper)
            .ok_or_else(|| DicError::InvalidParameterValue {
                name: "correlation_routine".to_string(),
                value: s.to_string(),
            })
    }
}

/// A loosely typed parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Size(i64),
    Scalar(f64),
    Text(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Size(_) => "size",
            ParamValue::Scalar(_) => "scalar",
            ParamValue::Text(_) => "string",
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Size(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Size(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Scalar(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Size(v) => write!(f, "{v}"),
            ParamValue::Scalar(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

/// Named parameter values; names are stored lower-case.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamMap {
    values: BTreeMap<String, ParamValue>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> &mut Self {
        self.values
            .insert(name.trim().to_ascii_lowercase(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(&name.trim().to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        self.values.remove(&name.trim().to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn type_error(name: &str, expected: &'static str, got: &ParamValue) -> DicError {
        DicError::ParameterType {
            name: name.to_string(),
            expected,
            got: got.type_name(),
        }
    }

    fn bool_value(&self, name: &str) -> DicResult<Option<bool>> {
        match self.get(name) {
            None => Ok(None),
            Some(ParamValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(Self::type_error(name, "bool", other)),
        }
    }

    fn scalar_value(&self, name: &str) -> DicResult<Option<f64>> {
        match self.get(name) {
            None => Ok(None),
            Some(ParamValue::Scalar(s)) => Ok(Some(*s)),
            Some(ParamValue::Size(s)) => Ok(Some(*s as f64)),
            Some(other) => Err(Self::type_error(name, "scalar", other)),
        }
    }

    fn size_value(&self, name: &str) -> DicResult<Option<usize>> {
        match self.get(name) {
            None => Ok(None),
            Some(ParamValue::Size(s)) => usize::try_from(*s).map(Some).map_err(|_| {
                DicError::InvalidParameterValue {
                    name: name.to_string(),
                    value: s.to_string(),
                }
            }),
            Some(other) => Err(Self::type_error(name, "size", other)),
        }
    }

    fn text_value(&self, name: &str) -> DicResult<Option<&str>> {
        match self.get(name) {
            None => Ok(None),
            Some(ParamValue::Text(t)) => Ok(Some(t.as_str())),
            Some(other) => Err(Self::type_error(name, "string", other)),
        }
    }

    fn parsed<T: FromStr<Err = DicError>>(&self, name: &str) -> DicResult<Option<T>> {
        self.text_value(name)?.map(str::parse).transpose()
    }
}

/// Immutable, typed configuration of a correlation run.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationParams {
    pub correlation_routine: CorrelationRoutine,
    pub interpolation_method: InterpolationMethod,
    pub gradient_method: GradientMethod,
    pub initialization_method: InitializationMethod,
    pub optimization_method: OptimizationMethod,
    pub projection_method: ProjectionMethod,
    pub shape_function_type: ShapeFunctionType,
    pub dof_flags: DofFlags,

    pub max_solver_iterations_fast: usize,
    pub max_solver_iterations_robust: usize,
    pub fast_solver_tolerance: f64,
    pub robust_solver_tolerance: f64,
    pub robust_delta_disp: f64,
    pub robust_delta_theta: f64,
    /// Non-positive disables damping.
    pub levenberg_marquardt_regularization_factor: f64,
    pub momentum_factor: f64,

    /// Accept initial guesses without optimizing.
    pub skip_all_solves: bool,
    /// Initial gamma below which the solve is skipped.
    pub skip_solve_gamma_threshold: f64,
    /// Non-positive disables the check.
    pub initial_gamma_threshold: f64,
    /// Non-positive disables the check.
    pub final_gamma_threshold: f64,
    /// Non-positive disables the check.
    pub sssig_threshold: f64,
    pub disp_jump_tol: f64,
    pub theta_jump_tol: f64,

    pub use_search_initialization_for_failed_steps: bool,
    pub search_window_radius: usize,
    pub normalize_gamma_with_active_pixels: bool,
    pub override_force_simplex: bool,
    pub gauss_filter_images: bool,
    pub gauss_filter_mask_size: usize,
    pub enable_motion_detection: bool,
    pub motion_detection_threshold: f64,
    pub obstruction_skin_factor: f64,

    pub output_delimiter: String,
    pub omit_output_row_id: bool,
}

impl Default for CorrelationParams {
    fn default() -> Self {
        Self::generic()
    }
}

impl CorrelationParams {
    /// Preset for dense grids of small subsets.
    pub fn generic() -> Self {
        Self {
            correlation_routine: CorrelationRoutine::Generic,
            interpolation_method: InterpolationMethod::KeysFourth,
            gradient_method: GradientMethod::FiniteDifference,
            initialization_method: InitializationMethod::UseFieldValues,
            optimization_method: OptimizationMethod::GradientBasedThenSimplex,
            projection_method: ProjectionMethod::DisplacementBased,
            shape_function_type: ShapeFunctionType::Affine,
            dof_flags: DofFlags::default(),
            max_solver_iterations_fast: 25,
            max_solver_iterations_robust: 1000,
            fast_solver_tolerance: 1.0e-4,
            robust_solver_tolerance: 1.0e-6,
            robust_delta_disp: 1.0,
            robust_delta_theta: 0.1,
            levenberg_marquardt_regularization_factor: -1.0,
            momentum_factor: 0.0,
            skip_all_solves: false,
            skip_solve_gamma_threshold: 1.0e-10,
            initial_gamma_threshold: -1.0,
            final_gamma_threshold: -1.0,
            sssig_threshold: -1.0,
            disp_jump_tol: 10000.0,
            theta_jump_tol: 100.0,
            use_search_initialization_for_failed_steps: false,
            search_window_radius: 10,
            normalize_gamma_with_active_pixels: false,
            override_force_simplex: false,
            gauss_filter_images: false,
            gauss_filter_mask_size: 7,
            enable_motion_detection: false,
            motion_detection_threshold: 1.0,
            obstruction_skin_factor: 1.0,
            output_delimiter: " ".to_string(),
            omit_output_row_id: false,
        }
    }

    /// Preset for tracking a few large objects with robust settings.
    pub fn tracking() -> Self {
        Self {
            correlation_routine: CorrelationRoutine::Tracking,
            optimization_method: OptimizationMethod::Simplex,
            dof_flags: DofFlags {
                rotation: true,
                ..DofFlags::default()
            },
            disp_jump_tol: 8.0,
            theta_jump_tol: 0.1,
            override_force_simplex: true,
            normalize_gamma_with_active_pixels: true,
            obstruction_skin_factor: 1.8,
            output_delimiter: ",".to_string(),
            ..Self::generic()
        }
    }

    /// Validates `map` and applies it on top of the selected preset.
    pub fn from_map(map: &ParamMap) -> DicResult<Self> {
        registry::validate(map)?;
        let tracking = map.bool_value("use_tracking_default_params")?.unwrap_or(false);
        let mut p = if tracking {
            Self::tracking()
        } else {
            Self::generic()
        };

        if let Some(v) = map.parsed("correlation_routine")? {
            p.correlation_routine = v;
        }
        if let Some(v) = map.parsed("interpolation_method")? {
            p.interpolation_method = v;
        }
        if let Some(v) = map.parsed("gradient_method")? {
            p.gradient_method = v;
        }
        if let Some(v) = map.parsed("initialization_method")? {
            p.initialization_method = v;
        }
        if let Some(v) = map.parsed("optimization_method")? {
            p.optimization_method = v;
        }
        if let Some(v) = map.parsed("projection_method")? {
            p.projection_method = v;
        }
        if let Some(v) = map.parsed("shape_function_type")? {
            p.shape_function_type = v;
        }

        let flags = &mut p.dof_flags;
        for (name, slot) in [
            ("enable_translation", &mut flags.translation),
            ("enable_rotation", &mut flags.rotation),
            ("enable_normal_strain", &mut flags.normal_strain),
            ("enable_shear_strain", &mut flags.shear_strain),
            ("enable_projection_shape_function", &mut flags.projection),
        ] {
            if let Some(v) = map.bool_value(name)? {
                *slot = v;
            }
        }

        for (name, slot) in [
            ("max_solver_iterations_fast", &mut p.max_solver_iterations_fast),
            ("max_solver_iterations_robust", &mut p.max_solver_iterations_robust),
            ("search_window_radius", &mut p.search_window_radius),
            ("gauss_filter_mask_size", &mut p.gauss_filter_mask_size),
        ] {
            if let Some(v) = map.size_value(name)? {
                *slot = v;
            }
        }

        for (name, slot) in [
            ("fast_solver_tolerance", &mut p.fast_solver_tolerance),
            ("robust_solver_tolerance", &mut p.robust_solver_tolerance),
            ("robust_delta_disp", &mut p.robust_delta_disp),
            ("robust_delta_theta", &mut p.robust_delta_theta),
            (
                "levenberg_marquardt_regularization_factor",
                &mut p.levenberg_marquardt_regularization_factor,
            ),
            ("momentum_factor", &mut p.momentum_factor),
            ("skip_solve_gamma_threshold", &mut p.skip_solve_gamma_threshold),
            ("initial_gamma_threshold", &mut p.initial_gamma_threshold),
            ("final_gamma_threshold", &mut p.final_gamma_threshold),
            ("sssig_threshold", &mut p.sssig_threshold),
            ("disp_jump_tol", &mut p.disp_jump_tol),
            ("theta_jump_tol", &mut p.theta_jump_tol),
            ("motion_detection_threshold", &mut p.motion_detection_threshold),
            ("obstruction_skin_factor", &mut p.obstruction_skin_factor),
        ] {
            if let Some(v) = map.scalar_value(name)? {
                *slot = v;
            }
        }

        for (name, slot) in [
            ("skip_all_solves", &mut p.skip_all_solves),
            (
                "use_search_initialization_for_failed_steps",
                &mut p.use_search_initialization_for_failed_steps,
            ),
            (
                "normalize_gamma_with_active_pixels",
                &mut p.normalize_gamma_with_active_pixels,
            ),
            ("override_force_simplex", &mut p.override_force_simplex),
            ("gauss_filter_images", &mut p.gauss_filter_images),
            ("enable_motion_detection", &mut p.enable_motion_detection),
            ("omit_output_row_id", &mut p.omit_output_row_id),
        ] {
            if let Some(v) = map.bool_value(name)? {
                *slot = v;
            }
        }

        if let Some(v) = map.text_value("output_delimiter")? {
            p.output_delimiter = v.to_string();
        }

        p.check()?;
        Ok(p)
    }

    /// Cross-field consistency checks.
    pub fn check(&self) -> DicResult<()> {
        if self.max_solver_iterations_fast == 0 || self.max_solver_iterations_robust == 0 {
            return Err(DicError::InvalidConfig("solver iteration caps must be positive"));
        }
        if !(self.fast_solver_tolerance > 0.0 && self.robust_solver_tolerance > 0.0) {
            return Err(DicError::InvalidConfig("solver tolerances must be positive"));
        }
        if !(self.robust_delta_disp > 0.0 && self.robust_delta_theta > 0.0) {
            return Err(DicError::InvalidConfig("simplex deltas must be positive"));
        }
        if !(self.disp_jump_tol >= 0.0 && self.theta_jump_tol >= 0.0) {
            return Err(DicError::InvalidConfig("jump tolerances must be non-negative"));
        }
        if self.gauss_filter_images && !GAUSS_MASK_SIZES.contains(&self.gauss_filter_mask_size) {
            return Err(DicError::InvalidParameterValue {
                name: "gauss_filter_mask_size".to_string(),
                value: self.gauss_filter_mask_size.to_string(),
            });
        }
        if self.output_delimiter.is_empty() {
            return Err(DicError::InvalidConfig("output delimiter must not be empty"));
        }
        Ok(())
    }

    /// Renders the typed configuration back into a parameter map.
    pub fn to_map(&self) -> ParamMap {
        let mut m = ParamMap::new();
        m.set("correlation_routine", self.correlation_routine.as_str())
            .set("interpolation_method", self.interpolation_method.as_str())
            .set("gradient_method", self.gradient_method.as_str())
            .set("initialization_method", self.initialization_method.as_str())
            .set("optimization_method", self.optimization_method.as_str())
            .set("projection_method", self.projection_method.as_str())
            .set("shape_function_type", self.shape_function_type.as_str())
            .set("enable_translation", self.dof_flags.translation)
            .set("enable_rotation", self.dof_flags.rotation)
            .set("enable_normal_strain", self.dof_flags.normal_strain)
            .set("enable_shear_strain", self.dof_flags.shear_strain)
            .set("enable_projection_shape_function", self.dof_flags.projection)
            .set("max_solver_iterations_fast", self.max_solver_iterations_fast)
            .set("max_solver_iterations_robust", self.max_solver_iterations_robust)
            .set("fast_solver_tolerance", self.fast_solver_tolerance)
            .set("robust_solver_tolerance", self.robust_solver_tolerance)
            .set("robust_delta_disp", self.robust_delta_disp)
            .set("robust_delta_theta", self.robust_delta_theta)
            .set(
                "levenberg_marquardt_regularization_factor",
                self.levenberg_marquardt_regularization_factor,
            )
            .set("momentum_factor", self.momentum_factor)
            .set("skip_all_solves", self.skip_all_solves)
            .set("skip_solve_gamma_threshold", self.skip_solve_gamma_threshold)
            .set("initial_gamma_threshold", self.initial_gamma_threshold)
            .set("final_gamma_threshold", self.final_gamma_threshold)
            .set("sssig_threshold", self.sssig_threshold)
            .set("disp_jump_tol", self.disp_jump_tol)
            .set("theta_jump_tol", self.theta_jump_tol)
            .set(
                "use_search_initialization_for_failed_steps",
                self.use_search_initialization_for_failed_steps,
            )
            .set("search_window_radius", self.search_window_radius)
            .set(
                "normalize_gamma_with_active_pixels",
                self.normalize_gamma_with_active_pixels,
            )
            .set("override_force_simplex", self.override_force_simplex)
            .set("gauss_filter_images", self.gauss_filter_images)
            .set("gauss_filter_mask_size", self.gauss_filter_mask_size)
            .set("enable_motion_detection", self.enable_motion_detection)
            .set("motion_detection_threshold", self.motion_detection_threshold)
            .set("obstruction_skin_factor", self.obstruction_skin_factor)
            .set("output_delimiter", self.output_delimiter.as_str())
            .set("omit_output_row_id", self.omit_output_row_id);
        m
    }

    pub fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            max_iterations_fast: self.max_solver_iterations_fast,
            max_iterations_robust: self.max_solver_iterations_robust,
            fast_tolerance: self.fast_solver_tolerance,
            robust_tolerance: self.robust_solver_tolerance,
            delta_disp: self.robust_delta_disp,
            delta_theta: self.robust_delta_theta,
            lm_factor: self.levenberg_marquardt_regularization_factor,
            momentum: self.momentum_factor,
        }
    }

    pub fn evaluator(&self) -> GammaEvaluator {
        GammaEvaluator::new(
            self.interpolation_method,
            self.normalize_gamma_with_active_pixels,
        )
    }

    pub fn shape_function(&self) -> DicResult<ShapeFunction> {
        ShapeFunction::new(self.shape_function_type, &self.dof_flags)
    }
}

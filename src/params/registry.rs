//! Registry of recognized correlation parameter names.
//!
//! Every name a [`ParamMap`](super::ParamMap) may carry is listed here with
//! its value type and, where the generic preset defines one, its default.
//! Names that configure collaborators outside the local solver (global DIC,
//! cine readers, calibration, output writers) are still recognized so that
//! existing parameter files validate.

use super::{ParamMap, ParamValue};
use crate::image::{GradientMethod, InterpolationMethod};
use crate::initializer::{InitializationMethod, ProjectionMethod};
use crate::optimizer::OptimizationMethod;
use crate::params::CorrelationRoutine;
use crate::shape::ShapeFunctionType;
use crate::util::{DicError, DicResult};

/// Value type of a registry entry.
#[derive(Clone, Copy, Debug)]
pub enum ParamKind {
    Bool,
    /// Integer; negative values are allowed where the entry says so.
    Size,
    Scalar,
    /// Free text.
    Text,
    /// Text restricted to the names accepted by the predicate.
    Choice(fn(&str) -> bool),
}

impl ParamKind {
    pub fn name(&self) -> &'static str {
        match self {
            ParamKind::Bool => "bool",
            ParamKind::Size => "size",
            ParamKind::Scalar => "scalar",
            ParamKind::Text | ParamKind::Choice(_) => "string",
        }
    }
}

/// Default value of a registry entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamDefault {
    Bool(bool),
    Size(i64),
    Scalar(f64),
    Text(&'static str),
    Unset,
}

impl ParamDefault {
    pub fn to_value(self) -> Option<ParamValue> {
        match self {
            ParamDefault::Bool(b) => Some(ParamValue::Bool(b)),
            ParamDefault::Size(s) => Some(ParamValue::Size(s)),
            ParamDefault::Scalar(s) => Some(ParamValue::Scalar(s)),
            ParamDefault::Text(t) => Some(ParamValue::Text(t.to_string())),
            ParamDefault::Unset => None,
        }
    }
}

/// One recognized parameter.
#[derive(Clone, Copy, Debug)]
pub struct ParamEntry {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamDefault,
    pub description: &'static str,
}

const fn entry(
    name: &'static str,
    kind: ParamKind,
    default: ParamDefault,
    description: &'static str,
) -> ParamEntry {
    ParamEntry {
        name,
        kind,
        default,
        description,
    }
}

fn is_routine(s: &str) -> bool {
    s.parse::<CorrelationRoutine>().is_ok()
}

fn is_interpolation(s: &str) -> bool {
    s.parse::<InterpolationMethod>().is_ok()
}

fn is_gradient(s: &str) -> bool {
    s.parse::<GradientMethod>().is_ok()
}

fn is_initialization(s: &str) -> bool {
    s.parse::<InitializationMethod>().is_ok()
}

fn is_optimization(s: &str) -> bool {
    s.parse::<OptimizationMethod>().is_ok()
}

fn is_projection(s: &str) -> bool {
    s.parse::<ProjectionMethod>().is_ok()
}

fn is_shape_function(s: &str) -> bool {
    s.parse::<ShapeFunctionType>().is_ok()
}

fn is_global_formulation(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_uppercase().as_str(),
        "HORN_SCHUNCK"
            | "MIXED_HORN_SCHUNCK"
            | "LEVENBERG_MARQUARDT"
            | "LEHOUCQ_TURNER"
            | "UNREGULARIZED"
            | "METHOD_OF_MANUFACTURED_SOLUTIONS"
    )
}

fn is_global_solver(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_uppercase().as_str(),
        "CG_SOLVER" | "GMRES_SOLVER" | "LSQR_SOLVER"
    )
}

use ParamDefault as D;
use ParamKind as K;

/// All recognized parameters.
pub static REGISTRY: [ParamEntry; 95] = [
    entry("correlation_routine", K::Choice(is_routine), D::Text("GENERIC_ROUTINE"), "Overall correlation routine"),
    entry("interpolation_method", K::Choice(is_interpolation), D::Text("KEYS_FOURTH"), "Kernel for deformed-image interpolation"),
    entry("gradient_method", K::Choice(is_gradient), D::Text("FINITE_DIFFERENCE"), "Stencil for image gradients"),
    entry("initialization_method", K::Choice(is_initialization), D::Text("USE_FIELD_VALUES"), "How each subset's initial guess is produced"),
    entry("cross_initialization_method", K::Choice(is_initialization), D::Text("USE_PLANAR_PROJECTION"), "Initialization between stereo cameras"),
    entry("optimization_method", K::Choice(is_optimization), D::Text("GRADIENT_BASED_THEN_SIMPLEX"), "Optimizer strategy"),
    entry("projection_method", K::Choice(is_projection), D::Text("DISPLACEMENT_BASED"), "Extrapolation of previous solutions"),
    entry("compute_ref_gradients", K::Bool, D::Unset, "Compute reference image gradients"),
    entry("compute_def_gradients", K::Bool, D::Unset, "Compute deformed image gradients"),
    entry("compute_image_gradients", K::Bool, D::Unset, "Compute gradients for all images"),
    entry("gauss_filter_images", K::Bool, D::Bool(false), "Smooth images with a Gauss filter before correlation"),
    entry("initial_condition_file", K::Text, D::Unset, "File with initial subset solutions"),
    entry("shape_function_type", K::Choice(is_shape_function), D::Text("AFFINE"), "Deformation model"),
    entry("enable_translation", K::Bool, D::Bool(true), "Enable u and v"),
    entry("enable_rotation", K::Bool, D::Bool(false), "Enable rotation about the subset centroid"),
    entry("enable_normal_strain", K::Bool, D::Bool(false), "Enable normal stretches"),
    entry("enable_shear_strain", K::Bool, D::Bool(false), "Enable shear"),
    entry("max_evolution_iterations", K::Size, D::Size(10), "Subset evolution iteration cap"),
    entry("max_solver_iterations_fast", K::Size, D::Size(25), "Iteration cap of the gradient-based solver"),
    entry("max_solver_iterations_robust", K::Size, D::Size(1000), "Iteration cap of the simplex solver"),
    entry("fast_solver_tolerance", K::Scalar, D::Scalar(1.0e-4), "Step-length tolerance of the gradient-based solver"),
    entry("robust_solver_tolerance", K::Scalar, D::Scalar(1.0e-6), "Convergence tolerance of the simplex solver"),
    entry("skip_all_solves", K::Bool, D::Bool(false), "Accept initial guesses without optimizing"),
    entry("skip_solve_gamma_threshold", K::Scalar, D::Scalar(1.0e-10), "Initial gamma below which the solve is skipped"),
    entry("initial_gamma_threshold", K::Scalar, D::Scalar(-1.0), "Maximum gamma of an acceptable initial guess"),
    entry("sssig_threshold", K::Scalar, D::Scalar(-1.0), "Minimum SSSIG of a usable subset"),
    entry("final_gamma_threshold", K::Scalar, D::Scalar(-1.0), "Maximum gamma of an accepted solution"),
    entry("path_distance_threshold", K::Scalar, D::Scalar(-1.0), "Maximum distance from a prescribed path"),
    entry("disp_jump_tol", K::Scalar, D::Scalar(10000.0), "Maximum per-frame displacement change"),
    entry("theta_jump_tol", K::Scalar, D::Scalar(100.0), "Maximum per-frame rotation change"),
    entry("robust_delta_disp", K::Scalar, D::Scalar(1.0), "Initial simplex size for displacements"),
    entry("robust_delta_theta", K::Scalar, D::Scalar(0.1), "Initial simplex size for rotation"),
    entry("output_deformed_subset_images", K::Bool, D::Bool(false), "Write deformed subset images"),
    entry("output_deformed_subset_intensity_images", K::Bool, D::Bool(false), "Write deformed subset intensities"),
    entry("output_evolved_subset_images", K::Bool, D::Bool(false), "Write evolved subset images"),
    entry("use_subset_evolution", K::Bool, D::Bool(false), "Evolve reference subsets over time"),
    entry("output_beta", K::Bool, D::Bool(false), "Write the beta sensitivity"),
    entry("output_spec", K::Text, D::Unset, "Output column specification"),
    entry("undistort_images", K::Bool, D::Unset, "Undistort images with the calibration"),
    entry("read_full_images", K::Bool, D::Bool(false), "Read full frames rather than sub-images"),
    entry("output_delimiter", K::Text, D::Text(" "), "Column delimiter of text output"),
    entry("omit_output_row_id", K::Bool, D::Bool(false), "Omit the subset id column"),
    entry("obstruction_skin_factor", K::Scalar, D::Scalar(1.0), "Growth factor of obstruction regions"),
    entry("exact_solution_dic_challenge_14", K::Scalar, D::Unset, "Exact solution for the DIC challenge 14 images"),
    entry("exact_solution_constant_value_x", K::Scalar, D::Unset, "Constant exact x displacement"),
    entry("exact_solution_constant_value_y", K::Scalar, D::Unset, "Constant exact y displacement"),
    entry("estimate_resolution_error", K::Bool, D::Unset, "Run the resolution-error study"),
    entry("estimate_resolution_error_min_period", K::Scalar, D::Unset, "Resolution study: minimum period"),
    entry("estimate_resolution_error_max_period", K::Scalar, D::Unset, "Resolution study: maximum period"),
    entry("estimate_resolution_error_period_factor", K::Scalar, D::Unset, "Resolution study: period factor"),
    entry("estimate_resolution_error_min_amplitude", K::Scalar, D::Unset, "Resolution study: minimum amplitude"),
    entry("estimate_resolution_error_max_amplitude", K::Scalar, D::Unset, "Resolution study: maximum amplitude"),
    entry("estimate_resolution_error_amplitude_step", K::Scalar, D::Unset, "Resolution study: amplitude step"),
    entry("estimate_resolution_error_speckle_size", K::Scalar, D::Unset, "Resolution study: speckle size"),
    entry("estimate_resolution_error_noise_percent", K::Scalar, D::Unset, "Resolution study: noise percent"),
    entry("use_incremental_formulation", K::Bool, D::Bool(false), "Correlate against the previous frame"),
    entry("use_nonlinear_projection", K::Bool, D::Bool(false), "Nonlinear stereo projection"),
    entry("sort_txt_output", K::Bool, D::Bool(false), "Sort text output by subset id"),
    entry("write_json_output", K::Bool, D::Bool(false), "Write JSON output"),
    entry("use_search_initialization_for_failed_steps", K::Bool, D::Bool(false), "Retry failed initializations with a local search"),
    entry("use_tracking_default_params", K::Bool, D::Bool(false), "Start from the tracking preset"),
    entry("override_force_simplex", K::Bool, D::Bool(false), "Ignore per-subset force-simplex requests"),
    entry("normalize_gamma_with_active_pixels", K::Bool, D::Bool(false), "Normalize gamma by the active pixel count"),
    entry("use_global_dic", K::Bool, D::Unset, "Use the global formulation"),
    entry("use_constrained_opt_dic", K::Bool, D::Unset, "Use the constrained optimization formulation"),
    entry("use_integrated_dic", K::Bool, D::Unset, "Use the integrated formulation"),
    entry("pixel_integration_order", K::Size, D::Size(1), "Sub-pixel integration order"),
    entry("gauss_filter_mask_size", K::Size, D::Size(7), "Gauss filter mask size (3 to 13, odd)"),
    entry("rotate_ref_image_90", K::Bool, D::Bool(false), "Rotate the reference image by 90 degrees"),
    entry("rotate_def_image_90", K::Bool, D::Bool(false), "Rotate deformed images by 90 degrees"),
    entry("rotate_ref_image_180", K::Bool, D::Bool(false), "Rotate the reference image by 180 degrees"),
    entry("rotate_def_image_180", K::Bool, D::Bool(false), "Rotate deformed images by 180 degrees"),
    entry("rotate_ref_image_270", K::Bool, D::Bool(false), "Rotate the reference image by 270 degrees"),
    entry("rotate_def_image_270", K::Bool, D::Bool(false), "Rotate deformed images by 270 degrees"),
    entry("levenberg_marquardt_regularization_factor", K::Scalar, D::Scalar(-1.0), "Damping of the gradient-based solver"),
    entry("momentum_factor", K::Scalar, D::Scalar(0.0), "Fraction of the previous step added to each step"),
    entry("filter_failed_cine_pixels", K::Bool, D::Unset, "Filter failed cine pixels"),
    entry("convert_cine_to_8_bit", K::Bool, D::Unset, "Convert cine frames to 8 bit"),
    entry("remove_outlier_pixels", K::Bool, D::Unset, "Replace outlier pixel intensities"),
    entry("time_average_cine_ref_frame", K::Size, D::Unset, "Frames averaged into the cine reference"),
    entry("time_average_video_ref_frame", K::Size, D::Unset, "Frames averaged into the video reference"),
    entry("global_regularization_alpha", K::Scalar, D::Scalar(1.0), "Global regularization weight"),
    entry("global_stabilization_tau", K::Scalar, D::Scalar(-1.0), "Global stabilization parameter"),
    entry("global_formulation", K::Choice(is_global_formulation), D::Text("HORN_SCHUNCK"), "Global formulation"),
    entry("global_solver", K::Choice(is_global_solver), D::Text("CG_SOLVER"), "Global linear solver"),
    entry("global_element_type", K::Text, D::Text("TRI6"), "Global element type"),
    entry("num_image_integration_points", K::Size, D::Size(20), "Global image integration points"),
    entry("use_fixed_point_iterations", K::Bool, D::Unset, "Global fixed-point iterations"),
    entry("compute_laplacian_image", K::Bool, D::Unset, "Compute the image Laplacian"),
    entry("enable_projection_shape_function", K::Bool, D::Bool(false), "Allow the PROJECTION shape function"),
    entry("write_exodus_output", K::Bool, D::Bool(false), "Write Exodus output"),
    entry("threshold_block_size", K::Size, D::Size(-1), "Block size of adaptive thresholding"),
    entry("enable_motion_detection", K::Bool, D::Bool(false), "Skip subsets whose window did not change"),
    entry("motion_detection_threshold", K::Scalar, D::Scalar(1.0), "Mean absolute intensity change that counts as motion"),
    entry("search_window_radius", K::Size, D::Size(10), "Radius of the search initialization window"),
];

/// Looks up a parameter by name (case-insensitive).
pub fn lookup(name: &str) -> Option<&'static ParamEntry> {
    let lower = name.trim().to_ascii_lowercase();
    REGISTRY.iter().find(|e| e.name == lower)
}

/// Checks one value against its registry entry.
pub fn check(name: &str, value: &ParamValue) -> DicResult<&'static ParamEntry> {
    let entry = lookup(name).ok_or_else(|| DicError::UnknownParameter {
        name: name.to_string(),
    })?;
    let mismatch = || DicError::ParameterType {
        name: entry.name.to_string(),
        expected: entry.kind.name(),
        got: value.type_name(),
    };
    match (entry.kind, value) {
        (K::Bool, ParamValue::Bool(_))
        | (K::Size, ParamValue::Size(_))
        | (K::Scalar, ParamValue::Scalar(_) | ParamValue::Size(_))
        | (K::Text, ParamValue::Text(_)) => Ok(entry),
        (K::Choice(accepts), ParamValue::Text(t)) => {
            if accepts(t) {
                Ok(entry)
            } else {
                Err(DicError::InvalidParameterValue {
                    name: entry.name.to_string(),
                    value: t.clone(),
                })
            }
        }
        _ => Err(mismatch()),
    }
}

/// Validates every entry of `map`.
pub fn validate(map: &ParamMap) -> DicResult<()> {
    for (name, value) in map.iter() {
        check(name, value)?;
    }
    Ok(())
}

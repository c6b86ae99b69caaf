//! subsetdic is a CPU-first subset-based digital image correlation solver.
//!
//! A [`Driver`] tracks square or arbitrary pixel [`Subset`]s of a reference
//! image through a sequence of deformed frames. For every subset and frame it
//! produces an initial guess (stored values, neighbors, phase correlation,
//! optical flow, feature matching or user mappings), minimizes the ZNSSD
//! gamma over a configurable shape function with a simplex or
//! Gauss-Newton optimizer, and stores displacement, rotation, strain and
//! quality measures in a [`FieldStore`].
//!
//! Runs are configured through a [`ParamMap`] of named parameters, validated
//! into [`CorrelationParams`]. Optional features: `rayon` solves independent
//! subsets in parallel, `simd` vectorizes the residual kernels, `image-io`
//! loads frames from disk and `tracing` emits spans and events.

mod trace;

pub mod driver;
pub mod field;
pub mod gamma;
pub mod image;
pub mod initializer;
mod kernel;
pub mod optimizer;
pub mod params;
pub mod search;
pub mod shape;
pub mod subset;
pub mod util;

pub use driver::{Driver, FrameReport, StatusFlag, SubsetResult, SubsetState};
pub use field::{FieldName, FieldSpec, FieldState, FieldStore};
pub use gamma::{GammaEval, GammaEvaluator, GammaFailure};
pub use image::pyramid::ImagePyramid;
pub use image::{GradientMethod, Image, ImageField, ImageView, InterpolationMethod};
pub use initializer::{
    Collaborators, Correspondences, Homography, InitializationMethod, PointTransform,
    ProjectionMethod,
};
pub use optimizer::{OptimizationMethod, SolverSettings};
pub use params::{CorrelationParams, CorrelationRoutine, ParamMap, ParamValue};
pub use shape::{Dof, DofFlags, ShapeFunction, ShapeFunctionType};
pub use subset::{Subset, SubsetStats};
pub use util::{DicError, DicResult};

#[cfg(feature = "image-io")]
pub use image::io;

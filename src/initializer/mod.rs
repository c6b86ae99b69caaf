//! Initial-guess strategies.
//!
//! An [`Initializer`] produces a starting parameter vector for one subset in
//! the current frame and evaluates its gamma. Strategies range from reusing
//! stored solutions (optionally extrapolated, see [`projection`]) to
//! image-based estimates: FFT phase correlation ([`phase`]), Lucas-Kanade
//! optical flow ([`optical_flow`]), pyramid template matching and externally
//! supplied point mappings ([`geometry`]).
//!
//! Strategies that need per-frame preprocessing (pyramids, global
//! registration) do it in [`Initializer::prepare_frame`], which the driver
//! calls once before any subset of the frame is initialized.

pub mod geometry;
pub mod optical_flow;
pub mod phase;
pub mod projection;

pub use geometry::{Correspondences, Homography, PointTransform};
pub use projection::SolutionHistory;

use crate::gamma::{GammaEvaluator, GammaFailure};
use crate::image::pyramid::ImagePyramid;
use crate::image::Image;
use crate::search::coarse::coarse_to_fine;
use crate::shape::{Motion, ShapeFunction};
use crate::subset::Subset;
use crate::util::{DicError, DicResult};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Pyramid depth used for feature matching.
const MATCH_PYRAMID_LEVELS: usize = 4;
/// Smallest pyramid level side used for feature matching.
const MATCH_PYRAMID_MIN_SIZE: usize = 16;

/// Initialization strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InitializationMethod {
    #[default]
    UseFieldValues,
    UseNeighborValues,
    UseNeighborValuesFirstStepOnly,
    UsePhaseCorrelation,
    UseOpticalFlow,
    UseZeros,
    UseFeatureMatching,
    UseImageRegistration,
    UseSatelliteGeometry,
    UseSpaceFillingIterations,
    UsePlanarProjection,
    UseRectifiedCorrespondences,
    NotApplicable,
}

impl InitializationMethod {
    pub const ALL: [InitializationMethod; 13] = [
        Self::UseFieldValues,
        Self::UseNeighborValues,
        Self::UseNeighborValuesFirstStepOnly,
        Self::UsePhaseCorrelation,
        Self::UseOpticalFlow,
        Self::UseZeros,
        Self::UseFeatureMatching,
        Self::UseImageRegistration,
        Self::UseSatelliteGeometry,
        Self::UseSpaceFillingIterations,
        Self::UsePlanarProjection,
        Self::UseRectifiedCorrespondences,
        Self::NotApplicable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UseFieldValues => "USE_FIELD_VALUES",
            Self::UseNeighborValues => "USE_NEIGHBOR_VALUES",
            Self::UseNeighborValuesFirstStepOnly => "USE_NEIGHBOR_VALUES_FIRST_STEP_ONLY",
            Self::UsePhaseCorrelation => "USE_PHASE_CORRELATION",
            Self::UseOpticalFlow => "USE_OPTICAL_FLOW",
            Self::UseZeros => "USE_ZEROS",
            Self::UseFeatureMatching => "USE_FEATURE_MATCHING",
            Self::UseImageRegistration => "USE_IMAGE_REGISTRATION",
            Self::UseSatelliteGeometry => "USE_SATELLITE_GEOMETRY",
            Self::UseSpaceFillingIterations => "USE_SPACE_FILLING_ITERATIONS",
            Self::UsePlanarProjection => "USE_PLANAR_PROJECTION",
            Self::UseRectifiedCorrespondences => "USE_RECTIFIED_CORRESPONDENCES",
            Self::NotApplicable => "INITIALIZATION_METHOD_NOT_APPLICABLE",
        }
    }
}

impl fmt::Display for InitializationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitializationMethod {
    type Err = DicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| DicError::InvalidParameterValue {
                name: "initialization_method".to_string(),
                value: s.to_string(),
            })
    }
}

/// Extrapolation applied to stored solutions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProjectionMethod {
    /// Last stored value.
    #[default]
    DisplacementBased,
    /// Linear extrapolation from the last two values.
    VelocityBased,
    /// Quadratic extrapolation from the last three values.
    Multistep,
}

impl ProjectionMethod {
    pub const ALL: [ProjectionMethod; 3] = [
        Self::DisplacementBased,
        Self::VelocityBased,
        Self::Multistep,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DisplacementBased => "DISPLACEMENT_BASED",
            Self::VelocityBased => "VELOCITY_BASED",
            Self::Multistep => "MULTISTEP",
        }
    }
}

impl fmt::Display for ProjectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectionMethod {
    type Err = DicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| DicError::InvalidParameterValue {
                name: "projection_method".to_string(),
                value: s.to_string(),
            })
    }
}

/// Where an initial guess came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuessSource {
    FieldValues,
    NeighborValues,
    SpaceFilling,
    Zeros,
    PhaseCorrelation,
    OpticalFlow,
    FeatureMatching,
    ImageRegistration,
    PointTransform,
    Search,
}

/// Starting point handed to the optimizer.
#[derive(Clone, Debug, PartialEq)]
pub struct InitialGuess {
    pub params: Vec<f64>,
    pub gamma: f64,
    pub active_pixels: usize,
    pub source: GuessSource,
}

/// Why no usable initial guess was produced.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum InitFailure {
    #[error(transparent)]
    Gamma(#[from] GammaFailure),
    #[error("no estimate: {0}")]
    NoEstimate(&'static str),
    #[error(transparent)]
    Collaborator(#[from] DicError),
}

/// Read-only view of the run state for one frame.
pub struct InitContext<'a> {
    /// Zero-based index of the frame being correlated.
    pub frame: usize,
    pub subsets: &'a [Subset],
    pub shape: &'a ShapeFunction,
    pub evaluator: GammaEvaluator,
    pub reference: &'a Image,
    pub deformed: &'a Image,
    /// Stored solutions of previous frames, per subset.
    pub history: &'a [SolutionHistory],
    /// Solutions converged earlier in this frame, per subset.
    pub current: &'a [Option<Vec<f64>>],
    pub projection: ProjectionMethod,
}

impl InitContext<'_> {
    /// Extrapolated stored solution, or the identity when there is none.
    pub fn predicted(&self, subset: usize) -> Vec<f64> {
        self.history
            .get(subset)
            .and_then(|h| h.extrapolate(self.projection))
            .unwrap_or_else(|| self.shape.zero_params())
    }

    /// Evaluates `params` for `subset` and packages the guess.
    pub fn guess(
        &self,
        subset: usize,
        params: Vec<f64>,
        source: GuessSource,
    ) -> Result<InitialGuess, InitFailure> {
        let s = self.subset(subset)?;
        let eval = self
            .evaluator
            .evaluate(s, self.deformed, self.shape, &params)?;
        Ok(InitialGuess {
            params,
            gamma: eval.gamma,
            active_pixels: eval.active_pixels,
            source,
        })
    }

    fn subset(&self, subset: usize) -> Result<&Subset, InitFailure> {
        self.subsets.get(subset).ok_or_else(|| {
            InitFailure::Collaborator(DicError::IndexOutOfBounds {
                index: subset,
                len: self.subsets.len(),
                context: "subset",
            })
        })
    }
}

/// Produces initial guesses for one strategy.
pub trait Initializer: Send + Sync {
    fn method(&self) -> InitializationMethod;

    /// Per-frame preprocessing.
    fn prepare_frame(&mut self, _reference: &Image, _deformed: &Image) -> DicResult<()> {
        Ok(())
    }

    fn initialize(&self, ctx: &InitContext<'_>, subset: usize) -> Result<InitialGuess, InitFailure>;
}

/// Externally supplied inputs some strategies need.
#[derive(Default)]
pub struct Collaborators {
    /// Used by USE_PLANAR_PROJECTION and USE_SATELLITE_GEOMETRY.
    pub point_transform: Option<Box<dyn PointTransform>>,
    /// Used by USE_RECTIFIED_CORRESPONDENCES.
    pub correspondences: Option<Correspondences>,
}

/// Builds the initializer for `method`.
pub fn build(
    method: InitializationMethod,
    reference: &Image,
    collaborators: Collaborators,
) -> DicResult<Box<dyn Initializer>> {
    let init: Box<dyn Initializer> = match method {
        InitializationMethod::UseFieldValues => Box::new(FieldValues),
        InitializationMethod::UseNeighborValues => Box::new(NeighborValues {
            first_step_only: false,
        }),
        InitializationMethod::UseNeighborValuesFirstStepOnly => Box::new(NeighborValues {
            first_step_only: true,
        }),
        InitializationMethod::UseSpaceFillingIterations => Box::new(SpaceFilling),
        InitializationMethod::UseZeros => Box::new(Zeros),
        InitializationMethod::UsePhaseCorrelation => Box::new(phase::PhaseInitializer::new()),
        InitializationMethod::UseImageRegistration => {
            Box::new(phase::RegistrationInitializer::new(reference)?)
        }
        InitializationMethod::UseOpticalFlow => {
            Box::new(optical_flow::OpticalFlowInitializer::default())
        }
        InitializationMethod::UseFeatureMatching => Box::new(FeatureMatching::new(reference)?),
        InitializationMethod::UsePlanarProjection | InitializationMethod::UseSatelliteGeometry => {
            let transform = collaborators.point_transform.ok_or(DicError::InvalidConfig(
                "initialization method requires a point transform",
            ))?;
            Box::new(geometry::TransformInitializer::new(method, transform))
        }
        InitializationMethod::UseRectifiedCorrespondences => {
            let set = collaborators.correspondences.ok_or(DicError::InvalidConfig(
                "initialization method requires a correspondence set",
            ))?;
            Box::new(geometry::TransformInitializer::new(method, Box::new(set)))
        }
        InitializationMethod::NotApplicable => {
            return Err(DicError::InvalidConfig(
                "initialization method is not applicable to subset correlation",
            ))
        }
    };
    Ok(init)
}

/// Stored solution of the previous frames, extrapolated.
#[derive(Clone, Copy, Debug, Default)]
pub struct FieldValues;

impl Initializer for FieldValues {
    fn method(&self) -> InitializationMethod {
        InitializationMethod::UseFieldValues
    }

    fn initialize(&self, ctx: &InitContext<'_>, subset: usize) -> Result<InitialGuess, InitFailure> {
        ctx.guess(subset, ctx.predicted(subset), GuessSource::FieldValues)
    }
}

/// Current-frame solution of the subset's neighbor.
#[derive(Clone, Copy, Debug)]
pub struct NeighborValues {
    pub first_step_only: bool,
}

impl Initializer for NeighborValues {
    fn method(&self) -> InitializationMethod {
        if self.first_step_only {
            InitializationMethod::UseNeighborValuesFirstStepOnly
        } else {
            InitializationMethod::UseNeighborValues
        }
    }

    fn initialize(&self, ctx: &InitContext<'_>, subset: usize) -> Result<InitialGuess, InitFailure> {
        let usable = !self.first_step_only || ctx.frame == 0;
        let neighbor = ctx
            .subset(subset)?
            .neighbor()
            .filter(|_| usable)
            .and_then(|n| ctx.current.get(n))
            .and_then(|p| p.clone());
        match neighbor {
            Some(params) => ctx.guess(subset, params, GuessSource::NeighborValues),
            None => ctx.guess(subset, ctx.predicted(subset), GuessSource::FieldValues),
        }
    }
}

/// Solution of the nearest subset already converged in this frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpaceFilling;

impl Initializer for SpaceFilling {
    fn method(&self) -> InitializationMethod {
        InitializationMethod::UseSpaceFillingIterations
    }

    fn initialize(&self, ctx: &InitContext<'_>, subset: usize) -> Result<InitialGuess, InitFailure> {
        let (cx, cy) = ctx.subset(subset)?.centroid();
        let nearest = ctx
            .current
            .iter()
            .enumerate()
            .filter(|&(i, p)| i != subset && p.is_some())
            .filter_map(|(i, p)| {
                let (x, y) = ctx.subsets.get(i)?.centroid();
                Some(((x - cx).powi(2) + (y - cy).powi(2), p.as_ref()?))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));
        match nearest {
            Some((_, params)) => ctx.guess(subset, params.clone(), GuessSource::SpaceFilling),
            None => ctx.guess(subset, ctx.predicted(subset), GuessSource::FieldValues),
        }
    }
}

/// Identity mapping.
#[derive(Clone, Copy, Debug, Default)]
pub struct Zeros;

impl Initializer for Zeros {
    fn method(&self) -> InitializationMethod {
        InitializationMethod::UseZeros
    }

    fn initialize(&self, ctx: &InitContext<'_>, subset: usize) -> Result<InitialGuess, InitFailure> {
        ctx.guess(subset, ctx.shape.zero_params(), GuessSource::Zeros)
    }
}

/// Whole-image coarse-to-fine template matching.
pub struct FeatureMatching {
    reference: ImagePyramid,
    deformed: Option<ImagePyramid>,
}

impl FeatureMatching {
    pub fn new(reference: &Image) -> DicResult<Self> {
        Ok(Self {
            reference: ImagePyramid::build(reference, MATCH_PYRAMID_LEVELS, MATCH_PYRAMID_MIN_SIZE)?,
            deformed: None,
        })
    }
}

impl Initializer for FeatureMatching {
    fn method(&self) -> InitializationMethod {
        InitializationMethod::UseFeatureMatching
    }

    fn prepare_frame(&mut self, _reference: &Image, deformed: &Image) -> DicResult<()> {
        self.deformed = Some(ImagePyramid::build(
            deformed,
            MATCH_PYRAMID_LEVELS,
            MATCH_PYRAMID_MIN_SIZE,
        )?);
        Ok(())
    }

    fn initialize(&self, ctx: &InitContext<'_>, subset: usize) -> Result<InitialGuess, InitFailure> {
        let deformed = self
            .deformed
            .as_ref()
            .ok_or(InitFailure::NoEstimate("frame not prepared"))?;
        let found = coarse_to_fine(ctx.subset(subset)?, &self.reference, deformed)
            .ok_or(InitFailure::NoEstimate("no template match"))?;
        let params = ctx.shape.params_from_motion(&Motion {
            u: found.u,
            v: found.v,
            ..Motion::default()
        });
        ctx.guess(subset, params, GuessSource::FeatureMatching)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{InitContext, ProjectionMethod, SolutionHistory};
    use crate::gamma::GammaEvaluator;
    use crate::image::Image;
    use crate::shape::ShapeFunction;
    use crate::subset::Subset;

    /// Owns everything an [`InitContext`] borrows.
    pub(crate) struct Fixture {
        pub reference: Image,
        pub deformed: Image,
        pub subsets: Vec<Subset>,
        pub shape: ShapeFunction,
        pub history: Vec<SolutionHistory>,
        pub current: Vec<Option<Vec<f64>>>,
        pub projection: ProjectionMethod,
    }

    impl Fixture {
        pub(crate) fn new(reference: Image, deformed: Image, subsets: Vec<Subset>, shape: ShapeFunction) -> Self {
            let n = subsets.len();
            Self {
                reference,
                deformed,
                subsets,
                shape,
                history: vec![SolutionHistory::default(); n],
                current: vec![None; n],
                projection: ProjectionMethod::DisplacementBased,
            }
        }

        pub(crate) fn ctx(&self, frame: usize) -> InitContext<'_> {
            InitContext {
                frame,
                subsets: &self.subsets,
                shape: &self.shape,
                evaluator: GammaEvaluator::default(),
                reference: &self.reference,
                deformed: &self.deformed,
                history: &self.history,
                current: &self.current,
                projection: self.projection,
            }
        }
    }
}

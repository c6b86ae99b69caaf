//! Per-subset outcome codes.

use crate::gamma::GammaFailure;
use crate::initializer::GuessSource;
use crate::optimizer::SolveFailure;
use crate::util::DicError;
use std::fmt;
use std::str::FromStr;

/// Outcome of one subset in one frame.
///
/// The numeric value (`as i32`) is what the STATUS_FLAG field stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusFlag {
    CorrelationSuccessful = 0,
    InitializeUsingPreviousFrameSuccessful,
    InitializeUsingConnectedSubsetValueSuccessful,
    InitializeUsingNeighborValueSuccessful,
    InitializeSuccessful,
    InitializeFailed,
    SearchSuccessful,
    SearchFailed,
    CorrelationFailed,
    SubsetConstructionFailed,
    LinearSolveFailed,
    MaxIterationsReached,
    InitializeFailedByException,
    SearchFailedByException,
    CorrelationFailedByException,
    CorrelationByAveragingConnectedValues,
    JumpToleranceExceeded,
    ZeroHessianDeterminant,
    SearchUsingPreviousStepSuccessful,
    LinearizedGammaOutOfBounds,
    NanInHessianOrResidual,
    HessianSingular,
    SkippedFrameDueToHighGamma,
    FrameFailedDueToHighGamma,
    FrameFailedDueToNegativeSigma,
    FrameFailedDueToHighPathDistance,
    ResetRefSubsetDueToHighGamma,
    MaxGlobalIterationsReachedInEvolutionLoop,
    FailureDueToTooManyRestarts,
    FailureDueToDeviationFromPath,
    FrameSkipped,
    FrameSkippedDueToNoMotion,
}

impl StatusFlag {
    pub const ALL: [StatusFlag; 32] = [
        Self::CorrelationSuccessful,
        Self::InitializeUsingPreviousFrameSuccessful,
        Self::InitializeUsingConnectedSubsetValueSuccessful,
        Self::InitializeUsingNeighborValueSuccessful,
        Self::InitializeSuccessful,
        Self::InitializeFailed,
        Self::SearchSuccessful,
        Self::SearchFailed,
        Self::CorrelationFailed,
        Self::SubsetConstructionFailed,
        Self::LinearSolveFailed,
        Self::MaxIterationsReached,
        Self::InitializeFailedByException,
        Self::SearchFailedByException,
        Self::CorrelationFailedByException,
        Self::CorrelationByAveragingConnectedValues,
        Self::JumpToleranceExceeded,
        Self::ZeroHessianDeterminant,
        Self::SearchUsingPreviousStepSuccessful,
        Self::LinearizedGammaOutOfBounds,
        Self::NanInHessianOrResidual,
        Self::HessianSingular,
        Self::SkippedFrameDueToHighGamma,
        Self::FrameFailedDueToHighGamma,
        Self::FrameFailedDueToNegativeSigma,
        Self::FrameFailedDueToHighPathDistance,
        Self::ResetRefSubsetDueToHighGamma,
        Self::MaxGlobalIterationsReachedInEvolutionLoop,
        Self::FailureDueToTooManyRestarts,
        Self::FailureDueToDeviationFromPath,
        Self::FrameSkipped,
        Self::FrameSkippedDueToNoMotion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CorrelationSuccessful => "CORRELATION_SUCCESSFUL",
            Self::InitializeUsingPreviousFrameSuccessful => "INITIALIZE_USING_PREVIOUS_FRAME_SUCCESSFUL",
            Self::InitializeUsingConnectedSubsetValueSuccessful => {
                "INITIALIZE_USING_CONNECTED_SUBSET_VALUE_SUCCESSFUL"
            }
            Self::InitializeUsingNeighborValueSuccessful => "INITIALIZE_USING_NEIGHBOR_VALUE_SUCCESSFUL",
            Self::InitializeSuccessful => "INITIALIZE_SUCCESSFUL",
            Self::InitializeFailed => "INITIALIZE_FAILED",
            Self::SearchSuccessful => "SEARCH_SUCCESSFUL",
            Self::SearchFailed => "SEARCH_FAILED",
            Self::CorrelationFailed => "CORRELATION_FAILED",
            Self::SubsetConstructionFailed => "SUBSET_CONSTRUCTION_FAILED",
            Self::LinearSolveFailed => "LINEAR_SOLVE_FAILED",
            Self::MaxIterationsReached => "MAX_ITERATIONS_REACHED",
            Self::InitializeFailedByException => "INITIALIZE_FAILED_BY_EXCEPTION",
            Self::SearchFailedByException => "SEARCH_FAILED_BY_EXCEPTION",
            Self::CorrelationFailedByException => "CORRELATION_FAILED_BY_EXCEPTION",
            Self::CorrelationByAveragingConnectedValues => "CORRELATION_BY_AVERAGING_CONNECTED_VALUES",
            Self::JumpToleranceExceeded => "JUMP_TOLERANCE_EXCEEDED",
            Self::ZeroHessianDeterminant => "ZERO_HESSIAN_DETERMINANT",
            Self::SearchUsingPreviousStepSuccessful => "SEARCH_USING_PREVIOUS_STEP_SUCCESSFUL",
            Self::LinearizedGammaOutOfBounds => "LINEARIZED_GAMMA_OUT_OF_BOUNDS",
            Self::NanInHessianOrResidual => "NAN_IN_HESSIAN_OR_RESIDUAL",
            Self::HessianSingular => "HESSIAN_SINGULAR",
            Self::SkippedFrameDueToHighGamma => "SKIPPED_FRAME_DUE_TO_HIGH_GAMMA",
            Self::FrameFailedDueToHighGamma => "FRAME_FAILED_DUE_TO_HIGH_GAMMA",
            Self::FrameFailedDueToNegativeSigma => "FRAME_FAILED_DUE_TO_NEGATIVE_SIGMA",
            Self::FrameFailedDueToHighPathDistance => "FRAME_FAILED_DUE_TO_HIGH_PATH_DISTANCE",
            Self::ResetRefSubsetDueToHighGamma => "RESET_REF_SUBSET_DUE_TO_HIGH_GAMMA",
            Self::MaxGlobalIterationsReachedInEvolutionLoop => {
                "MAX_GLOBAL_ITERATIONS_REACHED_IN_EVOLUTION_LOOP"
            }
            Self::FailureDueToTooManyRestarts => "FAILURE_DUE_TO_TOO_MANY_RESTARTS",
            Self::FailureDueToDeviationFromPath => "FAILURE_DUE_TO_DEVIATION_FROM_PATH",
            Self::FrameSkipped => "FRAME_SKIPPED",
            Self::FrameSkippedDueToNoMotion => "FRAME_SKIPPED_DUE_TO_NO_MOTION",
        }
    }

    /// Numeric code stored in the STATUS_FLAG field.
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// True when the subset's values for the frame can be trusted.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Self::CorrelationSuccessful
                | Self::InitializeUsingPreviousFrameSuccessful
                | Self::InitializeUsingConnectedSubsetValueSuccessful
                | Self::InitializeUsingNeighborValueSuccessful
                | Self::InitializeSuccessful
                | Self::SearchSuccessful
                | Self::SearchUsingPreviousStepSuccessful
                | Self::FrameSkippedDueToNoMotion
        )
    }

    /// Flag reported when an initialized guess is accepted without a solve.
    pub fn from_guess_source(source: GuessSource) -> Self {
        match source {
            GuessSource::FieldValues => Self::InitializeUsingPreviousFrameSuccessful,
            GuessSource::SpaceFilling => Self::InitializeUsingConnectedSubsetValueSuccessful,
            GuessSource::NeighborValues => Self::InitializeUsingNeighborValueSuccessful,
            GuessSource::Search => Self::SearchSuccessful,
            _ => Self::InitializeSuccessful,
        }
    }
}

impl From<SolveFailure> for StatusFlag {
    fn from(failure: SolveFailure) -> Self {
        match failure {
            SolveFailure::MaxIterations => Self::MaxIterationsReached,
            SolveFailure::NanInHessianOrResidual => Self::NanInHessianOrResidual,
            SolveFailure::ZeroHessianDeterminant => Self::ZeroHessianDeterminant,
            SolveFailure::HessianSingular => Self::HessianSingular,
            SolveFailure::Gamma(GammaFailure::AboveThreshold { .. }) => Self::FrameFailedDueToHighGamma,
            SolveFailure::Gamma(_) => Self::CorrelationFailed,
        }
    }
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFlag {
    type Err = DicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == upper)
            .ok_or_else(|| DicError::InvalidParameterValue {
                name: "status_flag".to_string(),
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::StatusFlag;
    use crate::gamma::GammaFailure;
    use crate::optimizer::SolveFailure;

    #[test]
    fn codes_follow_declaration_order() {
        for (i, flag) in StatusFlag::ALL.into_iter().enumerate() {
            assert_eq!(flag.code(), i as i32);
            assert_eq!(StatusFlag::from_code(i as i32), Some(flag));
            assert_eq!(flag.as_str().parse::<StatusFlag>().unwrap(), flag);
        }
        assert_eq!(StatusFlag::from_code(-1), None);
        assert_eq!(StatusFlag::from_code(32), None);
        assert_eq!(StatusFlag::FrameSkippedDueToNoMotion.code(), 31);
    }

    #[test]
    fn solve_failures_map_to_flags() {
        assert_eq!(
            StatusFlag::from(SolveFailure::MaxIterations),
            StatusFlag::MaxIterationsReached
        );
        assert_eq!(
            StatusFlag::from(SolveFailure::Gamma(GammaFailure::AboveThreshold {
                gamma: 0.5,
                threshold: 0.1
            })),
            StatusFlag::FrameFailedDueToHighGamma
        );
        assert_eq!(
            StatusFlag::from(SolveFailure::Gamma(GammaFailure::ZeroVariance)),
            StatusFlag::CorrelationFailed
        );
        assert!(!StatusFlag::JumpToleranceExceeded.is_success());
    }
}

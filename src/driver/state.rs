//! Per-subset state machine within one frame.

use super::status::StatusFlag;

/// Where a subset is in the current frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubsetState {
    #[default]
    Pending,
    Initializing,
    Optimizing,
    Converged(StatusFlag),
    Failed(StatusFlag),
}

impl SubsetState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged(_) | Self::Failed(_))
    }

    pub fn flag(self) -> Option<StatusFlag> {
        match self {
            Self::Converged(f) | Self::Failed(f) => Some(f),
            _ => None,
        }
    }

    /// True when `next` may follow `self`.
    pub fn can_advance_to(self, next: SubsetState) -> bool {
        use SubsetState::*;
        matches!(
            (self, next),
            (Pending, Initializing)
                | (Pending, Converged(_))
                | (Pending, Failed(_))
                | (Initializing, Initializing)
                | (Initializing, Optimizing)
                | (Initializing, Converged(_))
                | (Initializing, Failed(_))
                | (Optimizing, Initializing)
                | (Optimizing, Converged(_))
                | (Optimizing, Failed(_))
        )
    }

    /// Moves to `next`; illegal transitions are caught in debug builds.
    pub fn advance(&mut self, next: SubsetState) {
        debug_assert!(
            self.can_advance_to(next),
            "illegal subset transition {self:?} -> {next:?}"
        );
        *self = next;
    }
}

//! The per-column pipeline state machine.

use thiserror::Error;

/// State of a score column's authorize and compute cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No cycle has started.
    #[default]
    Idle,
    /// Waiting for the authorizer.
    Authorizing {
        /// 1-based authorization attempt.
        attempt: u32,
    },
    /// The score capability is running.
    Computing {
        /// The attempt this computation belongs to.
        attempt: u32,
    },
    /// The values were computed and attached.
    Success,
    /// The computation was rejected because of stale tokens.
    AuthFailed {
        /// The rejected tokens.
        token_ids: Vec<String>,
        /// The attempt that was rejected.
        attempt: u32,
    },
    /// The computation failed for another reason. Needs a manual retry.
    FatalError(String),
    /// The cycle was abandoned.
    Cancelled,
}

/// Inputs of [`PipelineState::transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A new cycle starts (initial load, reload or manual retry).
    Start,
    /// Every required authorization succeeded.
    Authorized,
    /// The computation produced values.
    Computed,
    /// The computation was rejected with an invalid token.
    InvalidToken(Vec<String>),
    /// The computation failed with any other error.
    Failed(String),
    /// Re-authorize after an invalid token.
    Retry,
    /// Abandon the cycle.
    Cancel,
}

/// An event that is not accepted in the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pipeline transition from {from:?} on {event:?}")]
pub struct InvalidTransition {
    /// The state the event was applied to.
    pub from: PipelineState,
    /// The rejected event.
    pub event: PipelineEvent,
}

impl PipelineState {
    /// Apply an event.
    pub fn transition(&self, event: PipelineEvent) -> Result<Self, InvalidTransition> {
        use PipelineEvent as E;
        use PipelineState as S;

        let next = match (self, &event) {
            (S::Idle | S::Success | S::FatalError(_) | S::Cancelled, E::Start) => {
                S::Authorizing { attempt: 1 }
            }
            (S::Authorizing { attempt }, E::Authorized) => S::Computing { attempt: *attempt },
            (S::Computing { .. }, E::Computed) => S::Success,
            (S::Computing { attempt }, E::InvalidToken(token_ids)) => S::AuthFailed {
                token_ids: token_ids.clone(),
                attempt: *attempt,
            },
            (S::Computing { .. }, E::Failed(message)) => S::FatalError(message.clone()),
            (S::AuthFailed { attempt, .. }, E::Retry) => S::Authorizing {
                attempt: attempt + 1,
            },
            (S::Idle | S::Authorizing { .. } | S::Computing { .. } | S::AuthFailed { .. }, E::Cancel) => {
                S::Cancelled
            }
            _ => {
                return Err(InvalidTransition {
                    from: self.clone(),
                    event: event.clone(),
                });
            }
        };
        Ok(next)
    }

    /// Returns true while a cycle is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Authorizing { .. } | Self::Computing { .. } | Self::AuthFailed { .. }
        )
    }

    /// The current attempt, if a cycle is in flight.
    pub fn attempt(&self) -> Option<u32> {
        match self {
            Self::Authorizing { attempt }
            | Self::Computing { attempt }
            | Self::AuthFailed { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }
}

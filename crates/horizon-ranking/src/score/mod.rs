//! Score columns.
//!
//! A [`Score`] computes one value per row identity, possibly behind an
//! authorization requirement. [`ScorePipeline`] attaches a score as a lazy
//! column and runs its authorize, compute and retry cycle:
//!
//! ```text
//! Idle ──> Authorizing ──> Computing ──> Success
//!              ^               │
//!              │               ├──> AuthFailed ──┐  (invalid token)
//!              └───────────────┼─────────────────┘
//!                              └──> FatalError      (anything else)
//! ```
//!
//! Progress that needs the user's attention is published as a
//! [`HeaderOverlay`] on the column header through the [`OverlayBoard`].

mod overlay;
mod pipeline;
mod state;

use std::collections::HashSet;

use futures_util::future::BoxFuture;

pub use overlay::{HeaderOverlay, OverlayBoard, OverlayChange};
pub use pipeline::{PipelineConfig, ScoreColumn, ScorePipeline};
pub use state::{InvalidTransition, PipelineEvent, PipelineState};

use crate::auth::AuthorizationConfig;
use crate::error::ScoreError;
use crate::model::{ColumnDescriptor, IdType, RowId, ScoreRow};

/// The outcome of one score computation.
pub type ScoreResult = Result<Vec<ScoreRow>, ScoreError>;

/// A capability computing a score column.
pub trait Score: Send + Sync {
    /// Describe the column this score produces.
    fn create_desc(&self, params: &serde_json::Value) -> ColumnDescriptor;

    /// Authorizations required before [`compute`](Self::compute) may run.
    fn authorization_configuration(&self) -> Vec<AuthorizationConfig> {
        Vec::new()
    }

    /// Compute the score for `ids`.
    ///
    /// Rejects with [`ScoreError::InvalidToken`] when a token used by the
    /// request is no longer accepted.
    fn compute(
        &self,
        ids: &HashSet<RowId>,
        id_type: &IdType,
        params: &serde_json::Value,
    ) -> BoxFuture<'static, ScoreResult>;
}

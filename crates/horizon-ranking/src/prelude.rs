//! Prelude module for Horizon Ranking.
//!
//! ```ignore
//! use horizon_ranking::prelude::*;
//! ```

// ============================================================================
// Core Primitives
// ============================================================================

pub use horizon_ranking_core::{AsyncRuntime, ConnectionId, Property, Signal};

// ============================================================================
// Columns and Rows
// ============================================================================

pub use crate::model::{
    ColumnData, ColumnDescriptor, ColumnHandle, ColumnKind, ColumnRegistry, IdType, LazyColumn,
    LoadStatus, RowId, RowOrder, RowPositions, ScoreRow, ScoreValue,
};

// ============================================================================
// Selection
// ============================================================================

pub use crate::model::{
    GridEngine, Selection, SelectionBridge, SelectionBus, SelectionChannel, SelectionTransition,
};

// ============================================================================
// Scores and Authorization
// ============================================================================

pub use crate::auth::{AuthorizationConfig, AuthorizationFlow, Authorizer, TokenManager};
pub use crate::error::ScoreError;
pub use crate::plugin::ScoreRegistry;
pub use crate::score::{HeaderOverlay, PipelineState, Score, ScoreColumn};

// ============================================================================
// Ranking
// ============================================================================

pub use crate::{Ranking, RankingOptions, ViewMode};

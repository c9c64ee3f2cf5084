//! The column and selection model of a ranking.
//!
//! # Core Types
//!
//! - `ColumnDescriptor`: Immutable metadata of a column
//! - `ColumnRegistry`: The ordered set of attached columns
//! - `LazyColumnLoader` / `LazyColumn`: Columns attached before their values exist
//! - `RowId` / `RowOrder` / `RowPositions`: Row identities and grid positions
//! - `SelectionBridge`: Identity-based selection kept in sync with the grid
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────┐  values   ┌────────────────┐  signals  ┌─────────────┐
//! │ LazyColumn   │──────────>│ ColumnRegistry │──────────>│ Grid engine │
//! └──────────────┘           └────────────────┘           └─────────────┘
//!                                                            │      ^
//!                                                  positions │      │ highlight
//!                                                            v      │
//! ┌──────────────┐ identities ┌─────────────────┐            │      │
//! │ SelectionBus │<───────────│ SelectionBridge │<───────────┘      │
//! └──────────────┘            └─────────────────┘───────────────────┘
//! ```

mod column;
pub mod lazy;
pub mod registry;
mod row;
pub mod selection;

pub use column::{Color, ColumnData, ColumnDescriptor, ColumnKind, ScoreRow, ScoreValue};
pub use lazy::{LazyColumn, LazyColumnLoader, LoadStatus, ValueFuture};
pub use registry::{ColumnChange, ColumnHandle, ColumnInfo, ColumnRegistry};
pub use row::{IdType, RowId, RowOrder, RowPositions};
pub use selection::{
    GridEngine, Selection, SelectionBridge, SelectionBus, SelectionChannel, SelectionEvent,
    SelectionTransition,
};

//! Horizon Ranking - a ranking engine for tabular views of scored items.
//!
//! The engine keeps a grid of rows and columns in sync with the rest of a
//! page:
//!
//! - **Lazy columns**: columns appear immediately and fill in once their
//!   values resolve ([`model::LazyColumnLoader`])
//! - **Score columns**: computed columns gated behind authorization, with
//!   automatic re-authorization when a token goes stale ([`score`])
//! - **Selection sync**: grid positions translated to stable row identities
//!   and back ([`model::SelectionBridge`])
//! - **Ranking facade**: view modes, score plugins and the column chooser
//!   ([`Ranking`])
//!
//! Everything is UI-agnostic: the grid, the authorizer and the page-wide
//! selection bus are traits implemented by the embedding application.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_ranking::color::ColumnColors;
//! use horizon_ranking::model::{ColumnData, ColumnDescriptor, ColumnKind, ColumnRegistry, ScoreRow};
//!
//! let registry = ColumnRegistry::new(Arc::new(ColumnColors::new()));
//! registry.column_added.connect(|change| println!("added {}", change.id));
//!
//! let handle = registry
//!     .add_column(
//!         ColumnDescriptor::new("tpm", ColumnKind::Numeric, "Expression"),
//!         ColumnData::Ready(vec![ScoreRow::new("ENSG00000141510", 12.5)]),
//!         None,
//!     )
//!     .unwrap();
//! assert!(registry.descriptor(handle).unwrap().color.is_some());
//! ```

pub mod auth;
pub mod color;
pub mod error;
pub mod model;
pub mod options;
pub mod plugin;
pub mod prelude;
mod ranking;
pub mod score;
pub mod vis;

pub use error::{RankingError, Result};
pub use options::{RankingOptions, ViewMode};
pub use ranking::{
    Ranking, RankingBuilder, RankingContext, ScoreColumnResult, SelectionColumn,
};

//! Logging facilities for Horizon Ranking.
//!
//! Horizon Ranking uses the `tracing` crate for instrumentation. The library
//! never installs a subscriber; to see logs, install one in your application:
//!
//! ```ignore
//! use tracing_subscriber::EnvFilter;
//!
//! tracing_subscriber::fmt()
//!     .with_env_filter(EnvFilter::new("horizon_ranking::score=debug"))
//!     .init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core primitives target.
    pub const CORE: &str = "horizon_ranking_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_ranking_core::signal";
    /// Async runtime target.
    pub const RUNTIME: &str = "horizon_ranking_core::async_runtime";
    /// Column registry target.
    pub const REGISTRY: &str = "horizon_ranking::registry";
    /// Lazy column loader target.
    pub const LAZY: &str = "horizon_ranking::lazy";
    /// Score authorization pipeline target.
    pub const SCORE: &str = "horizon_ranking::score";
    /// Authorization and token handling target.
    pub const AUTH: &str = "horizon_ranking::auth";
    /// Selection synchronization target.
    pub const SELECTION: &str = "horizon_ranking::selection";
    /// Ranking facade target.
    pub const RANKING: &str = "horizon_ranking::ranking";
}


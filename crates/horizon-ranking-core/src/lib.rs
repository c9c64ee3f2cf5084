//! Core primitives for Horizon Ranking.
//!
//! This crate provides the UI-agnostic building blocks the ranking engine is
//! assembled from:
//!
//! - **Signal/Slot System**: Type-safe observer notifications
//! - **Property System**: Change-detecting cells that pair with signals
//! - **Async Runtime**: A thin Tokio wrapper with cooperative cancellation
//! - **Logging**: `tracing` target names used across the workspace
//!
//! # Signal/Slot Example
//!
//! ```
//! use horizon_ranking_core::Signal;
//!
//! // Create a signal that notifies when a value changes
//! let value_changed = Signal::<i32>::new();
//!
//! // Connect a slot to handle the signal
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! // Emit the signal
//! value_changed.emit(42);
//!
//! // Disconnect when done
//! value_changed.disconnect(conn_id);
//! ```
//!
//! # Property Example
//!
//! ```
//! use horizon_ranking_core::{Property, Signal};
//!
//! struct Counter {
//!     value: Property<i32>,
//!     value_changed: Signal<i32>,
//! }
//!
//! impl Counter {
//!     fn increment(&self) {
//!         let new_value = self.value.get() + 1;
//!         if self.value.set(new_value) {
//!             self.value_changed.emit(new_value);
//!         }
//!     }
//! }
//! ```

pub mod async_runtime;
mod error;
pub mod logging;
pub mod property;
pub mod signal;

pub use async_runtime::{
    AsyncCancellationToken, AsyncRuntime, AsyncRuntimeConfig, AsyncTaskHandle,
};
pub use error::{AsyncRuntimeError, CoreError, Result};
pub use property::Property;
pub use signal::{ConnectionId, Signal};

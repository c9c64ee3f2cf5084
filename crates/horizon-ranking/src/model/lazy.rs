//! Lazily loaded columns.
//!
//! A lazy column is attached to the [`ColumnRegistry`] before its values are
//! known. Its values arrive through a [`ValueFuture`] that resolves on the
//! async runtime; when it settles the registry entry is swapped from
//! [`ColumnData::Pending`] to the materialized rows (or to
//! [`ColumnData::Failed`]). The loader never surfaces a failure itself:
//! callers observe it through [`LazyColumn::loaded`] or the registry.
//!
//! Reloads are last-write-wins. Every call to [`LazyColumn::reload`] starts a
//! new generation; a value future of an older generation that settles later
//! is discarded, and everyone awaiting `loaded()` observes the newest one.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use horizon_ranking_core::logging::targets;
use horizon_ranking_core::{AsyncRuntime, Signal};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::Instrument;

use super::column::{ColumnData, ColumnDescriptor, ScoreRow};
use super::registry::{ColumnChange, ColumnHandle, ColumnRegistry};
use crate::error::{RegistryError, ScoreError};

/// A pending set of column values.
pub type ValueFuture = BoxFuture<'static, Result<Vec<ScoreRow>, ScoreError>>;

/// Load state of the latest value future of a lazy column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// The latest value future has not settled.
    Pending,
    /// Values were swapped into the registry.
    Loaded,
    /// The latest value future failed; the column stays attached.
    Failed(String),
    /// The column was removed before its values arrived.
    Detached,
}

impl LoadStatus {
    /// Returns true once the latest value future has settled.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone)]
struct LoadState {
    generation: u64,
    status: LoadStatus,
}

/// Attaches columns whose values resolve asynchronously.
pub struct LazyColumnLoader {
    registry: Arc<ColumnRegistry>,
    runtime: AsyncRuntime,

    /// Emitted after a lazy column's values were swapped in.
    pub column_loaded: Arc<Signal<ColumnChange>>,
}

impl LazyColumnLoader {
    /// Create a loader attaching to `registry` and resolving on `runtime`.
    pub fn new(registry: Arc<ColumnRegistry>, runtime: AsyncRuntime) -> Self {
        Self {
            registry,
            runtime,
            column_loaded: Arc::new(Signal::new()),
        }
    }

    /// The registry columns are attached to.
    pub fn registry(&self) -> &Arc<ColumnRegistry> {
        &self.registry
    }

    /// Attach a column now and resolve its values in the background.
    ///
    /// # Errors
    ///
    /// Fails only if the registry rejects the descriptor.
    pub fn add_lazy_column(
        &self,
        descriptor: ColumnDescriptor,
        values: ValueFuture,
        position: Option<usize>,
    ) -> Result<LazyColumn, RegistryError> {
        let id = descriptor.id.clone();
        let handle = self
            .registry
            .add_column(descriptor, ColumnData::Pending, position)?;

        let (state, _) = watch::channel(LoadState {
            generation: 0,
            status: LoadStatus::Pending,
        });
        let column = LazyColumn {
            handle,
            inner: Arc::new(LazyInner {
                id,
                registry: self.registry.clone(),
                runtime: self.runtime.clone(),
                column_loaded: self.column_loaded.clone(),
                state,
                apply: Mutex::new(()),
            }),
        };
        column.start(values);
        Ok(column)
    }
}

impl std::fmt::Debug for LazyColumnLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyColumnLoader")
            .field("registry", &self.registry)
            .finish()
    }
}

struct LazyInner {
    id: String,
    registry: Arc<ColumnRegistry>,
    runtime: AsyncRuntime,
    column_loaded: Arc<Signal<ColumnChange>>,
    state: watch::Sender<LoadState>,
    /// Serializes generation bumps against result application.
    apply: Mutex<()>,
}

/// A column attached before its values were available.
///
/// Cloning is cheap; clones refer to the same column.
#[derive(Clone)]
pub struct LazyColumn {
    handle: ColumnHandle,
    inner: Arc<LazyInner>,
}

impl LazyColumn {
    /// The registry handle of the column.
    pub fn handle(&self) -> ColumnHandle {
        self.handle
    }

    /// The column id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Returns true while the column is attached to the registry.
    pub fn is_attached(&self) -> bool {
        self.inner.registry.contains(self.handle)
    }

    /// The load state of the latest value future.
    pub fn status(&self) -> LoadStatus {
        self.inner.state.borrow().status.clone()
    }

    /// The materialized values, if loaded.
    pub fn values(&self) -> Option<Vec<ScoreRow>> {
        self.inner
            .registry
            .with_data(self.handle, |data| data.rows().map(<[ScoreRow]>::to_vec))
            .flatten()
    }

    /// Wait until the latest value future has settled.
    ///
    /// A reload issued while waiting extends the wait to the new future.
    pub async fn loaded(&self) -> LoadStatus {
        let mut rx = self.inner.state.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if state.status.is_settled() {
                    return state.status.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.status();
            }
        }
    }

    /// Replace the column's value future in place.
    ///
    /// The column keeps its id and position; the previous values stay visible
    /// until the new ones arrive. The returned future resolves once this (or
    /// a later) reload has settled.
    pub fn reload(&self, values: ValueFuture) -> impl Future<Output = LoadStatus> + Send + 'static {
        self.start(values);
        let column = self.clone();
        async move { column.loaded().await }
    }

    fn start(&self, values: ValueFuture) {
        let generation = {
            let _apply = self.inner.apply.lock();
            let mut generation = 0;
            self.inner.state.send_modify(|state| {
                state.generation += 1;
                state.status = LoadStatus::Pending;
                generation = state.generation;
            });
            generation
        };

        tracing::debug!(target: targets::LAZY, column = %self.inner.id, generation, "loading column values");

        let inner = self.inner.clone();
        let handle = self.handle;
        let span = tracing::debug_span!(target: targets::LAZY, "lazy_load", column = %self.inner.id, generation);
        self.inner.runtime.spawn(
            async move {
                let result = values.await;
                inner.settle(handle, generation, result);
            }
            .instrument(span),
        );
    }
}

impl LazyInner {
    fn settle(
        &self,
        handle: ColumnHandle,
        generation: u64,
        result: Result<Vec<ScoreRow>, ScoreError>,
    ) {
        let applied = {
            let _apply = self.apply.lock();
            if self.state.borrow().generation != generation {
                tracing::debug!(target: targets::LAZY, column = %self.id, generation, "discarding superseded values");
                return;
            }

            let (data, status) = match result {
                Ok(rows) => (ColumnData::Ready(rows), LoadStatus::Loaded),
                Err(err) => {
                    tracing::warn!(target: targets::LAZY, column = %self.id, error = %err, "column values failed to load");
                    let message = err.to_string();
                    (ColumnData::Failed(message.clone()), LoadStatus::Failed(message))
                }
            };

            match self.registry.replace_data(handle, data) {
                Ok(change) => {
                    let loaded = status == LoadStatus::Loaded;
                    self.state.send_modify(|state| state.status = status);
                    Some((change, loaded))
                }
                Err(_) => {
                    tracing::debug!(target: targets::LAZY, column = %self.id, "column detached before values arrived");
                    self.state.send_modify(|state| state.status = LoadStatus::Detached);
                    None
                }
            }
        };

        if let Some((change, loaded)) = applied {
            self.registry.column_updated.emit(change.clone());
            if loaded {
                self.column_loaded.emit(change);
            }
        }
    }
}

impl std::fmt::Debug for LazyColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyColumn")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}

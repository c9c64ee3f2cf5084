//! The ranking facade.
//!
//! [`Ranking`] wires the column registry, the lazy column loader, the score
//! pipeline and the selection bridge to one grid engine, and adds the
//! behavior of a ranking view on top: building the initial columns, score
//! plugins, view modes and the column chooser.
//!
//! # Example
//!
//! ```ignore
//! use horizon_ranking::prelude::*;
//!
//! let ranking = Ranking::builder(grid, authorizer)
//!     .id_type(IdType::from("Ensembl"))
//!     .options(RankingOptions::from_toml_str(CONFIG)?)
//!     .plugins(plugins)
//!     .build()?;
//!
//! ranking.build(rows, columns, None)?;
//! let added = ranking.add_tracked_score("expression", params).await?;
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use horizon_ranking_core::logging::targets;
use horizon_ranking_core::{AsyncRuntime, Property, Signal};
use parking_lot::Mutex;

use crate::auth::Authorizer;
use crate::color::{ColorAllocator, ColumnColors};
use crate::error::{RankingError, RegistryError, Result};
use crate::model::{
    ColumnData, ColumnDescriptor, ColumnHandle, ColumnInfo, ColumnKind, ColumnRegistry,
    GridEngine, IdType, LazyColumn, LazyColumnLoader, LoadStatus, RowId, ScoreRow, Selection,
    SelectionBridge, SelectionBus, SelectionChannel, ValueFuture,
};
use crate::options::{RankingOptions, ViewMode};
use crate::plugin::ScoreRegistry;
use crate::score::{OverlayBoard, Score, ScoreColumn, ScorePipeline};
use crate::vis::VisConfig;

/// A column a selection adapter attaches through a [`RankingContext`].
pub struct SelectionColumn {
    /// The column descriptor.
    pub descriptor: ColumnDescriptor,
    /// The column's values.
    pub values: ValueFuture,
    /// Insert position; `None` appends.
    pub position: Option<usize>,
}

/// Snapshot of a ranking's columns handed to selection adapters.
///
/// Adapters add and remove per-selection columns through it.
#[derive(Clone)]
pub struct RankingContext {
    columns: Vec<ColumnInfo>,
    loader: Arc<LazyColumnLoader>,
}

impl RankingContext {
    /// The attached columns when the snapshot was taken.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Attach columns. Stops at the first rejected descriptor.
    pub fn add(&self, columns: Vec<SelectionColumn>) -> std::result::Result<Vec<LazyColumn>, RegistryError> {
        columns
            .into_iter()
            .map(|column| {
                self.loader
                    .add_lazy_column(column.descriptor, column.values, column.position)
            })
            .collect()
    }

    /// Detach columns. Returns how many were attached.
    pub fn remove(&self, handles: impl IntoIterator<Item = ColumnHandle>) -> usize {
        let registry = self.loader.registry();
        handles
            .into_iter()
            .filter(|&handle| registry.remove_column(handle))
            .count()
    }

    /// Release the color assigned to a column id.
    pub fn free_color(&self, id: &str) {
        self.loader.registry().colors().free_column_color(id);
    }
}

impl std::fmt::Debug for RankingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingContext")
            .field("columns", &self.columns.len())
            .finish()
    }
}

/// A score column added by [`Ranking::add_tracked_score`], once loaded.
#[derive(Debug, Clone)]
pub struct ScoreColumnResult {
    /// The score column.
    pub column: ScoreColumn,
    /// Its descriptor; `None` if the column was removed while loading.
    pub descriptor: Option<Arc<ColumnDescriptor>>,
    /// How loading ended.
    pub status: LoadStatus,
    /// The loaded values.
    pub values: Option<Vec<ScoreRow>>,
}

/// Coalesces column additions into one chooser refresh per quiet period.
struct ChooserDebounce {
    registry: Weak<ColumnRegistry>,
    runtime: AsyncRuntime,
    delay: Duration,
    ticket: AtomicU64,
    chooser_update: Arc<Signal<Vec<ColumnInfo>>>,
}

impl ChooserDebounce {
    fn schedule(self: &Arc<Self>) {
        let ticket = self.ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let this = self.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(this.delay).await;
            if this.ticket.load(Ordering::SeqCst) != ticket {
                return;
            }
            if let Some(registry) = this.registry.upgrade() {
                let columns = registry.columns();
                tracing::trace!(target: targets::RANKING, columns = columns.len(), "refreshing column chooser");
                this.chooser_update.emit(columns);
            }
        });
    }
}

#[derive(Default)]
struct ViewState {
    primary_sort: Option<ColumnHandle>,
    /// Columns hidden by leaving focus mode.
    dump: Option<HashSet<ColumnHandle>>,
    score_columns: Vec<ScoreColumn>,
}

/// Builder for [`Ranking`].
pub struct RankingBuilder {
    grid: Arc<dyn GridEngine>,
    authorizer: Arc<dyn Authorizer>,
    id_type: Option<IdType>,
    options: RankingOptions,
    plugins: Option<Arc<ScoreRegistry>>,
    colors: Option<Arc<dyn ColorAllocator>>,
    bus: Option<Arc<dyn SelectionBus>>,
    runtime: Option<AsyncRuntime>,
}

impl RankingBuilder {
    /// Set the identity space of the rows.
    ///
    /// Defaults to `item_id_type` from the options, then to the item name.
    pub fn id_type(mut self, id_type: IdType) -> Self {
        self.id_type = Some(id_type);
        self
    }

    /// Set the options.
    pub fn options(mut self, options: RankingOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the score plugins available to [`Ranking::add_tracked_score`].
    pub fn plugins(mut self, plugins: Arc<ScoreRegistry>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// Use a custom color allocator.
    pub fn colors(mut self, colors: Arc<dyn ColorAllocator>) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Publish default selections on a page-wide bus.
    pub fn selection_bus(mut self, bus: Arc<dyn SelectionBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Drive lazy loads on this runtime instead of the current one.
    pub fn runtime(mut self, runtime: AsyncRuntime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the ranking.
    ///
    /// # Errors
    ///
    /// Fails if no runtime was given and the caller is not inside a Tokio
    /// runtime.
    pub fn build(self) -> Result<Ranking> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => AsyncRuntime::current()?,
        };
        let options = self.options;
        let id_type = self
            .id_type
            .or_else(|| options.item_id_type.clone())
            .unwrap_or_else(|| IdType::new(options.item_name.clone()));

        let colors = self
            .colors
            .unwrap_or_else(|| Arc::new(ColumnColors::new()) as Arc<dyn ColorAllocator>);
        let registry = Arc::new(ColumnRegistry::new(colors));
        let loader = Arc::new(LazyColumnLoader::new(registry.clone(), runtime.clone()));
        let overlays = Arc::new(OverlayBoard::new());

        let mut bridge = SelectionBridge::new(self.grid.clone(), id_type.clone());
        if let Some(bus) = self.bus {
            bridge = bridge.with_bus(bus);
        }

        let pipeline = ScorePipeline::new(
            loader.clone(),
            self.authorizer,
            overlays.clone(),
            self.grid.clone(),
            id_type.clone(),
            options.pipeline.clone(),
        );

        let context_changed = Arc::new(Signal::new());
        let chooser_update = Arc::new(Signal::new());
        let chooser = Arc::new(ChooserDebounce {
            registry: Arc::downgrade(&registry),
            runtime,
            delay: options.chooser_debounce(),
            ticket: AtomicU64::new(0),
            chooser_update: chooser_update.clone(),
        });

        registry.column_added.connect({
            let chooser = chooser.clone();
            move |_| chooser.schedule()
        });
        for signal in [&registry.column_added, &registry.column_removed] {
            let loader = Arc::downgrade(&loader);
            let context_changed = Arc::clone(&context_changed);
            signal.connect(move |_| {
                if let Some(loader) = loader.upgrade() {
                    context_changed.emit(RankingContext {
                        columns: loader.registry().columns(),
                        loader,
                    });
                }
            });
        }
        loader.column_loaded.connect({
            let grid = self.grid.clone();
            move |_| grid.refresh()
        });

        tracing::debug!(target: targets::RANKING, id_type = %id_type, "ranking created");

        Ok(Ranking {
            mode: Property::new(options.mode.unwrap_or_default()),
            options,
            id_type,
            grid: self.grid,
            registry,
            loader,
            bridge: Arc::new(bridge),
            overlays,
            pipeline,
            plugins: self.plugins.unwrap_or_default(),
            built: AtomicBool::new(false),
            view: Mutex::new(ViewState::default()),
            context_changed,
            chooser_update,
            mode_changed: Signal::new(),
            score_columns_added: Signal::new(),
        })
    }
}

/// A ranking view over one grid engine.
///
/// # Signals
///
/// - `context_changed`: the column set changed
/// - `chooser_update`: columns were added (debounced)
/// - `mode_changed`: the view mode changed
/// - `score_columns_added`: a tracked score finished loading
pub struct Ranking {
    options: RankingOptions,
    id_type: IdType,
    grid: Arc<dyn GridEngine>,
    registry: Arc<ColumnRegistry>,
    loader: Arc<LazyColumnLoader>,
    bridge: Arc<SelectionBridge>,
    overlays: Arc<OverlayBoard>,
    pipeline: ScorePipeline,
    plugins: Arc<ScoreRegistry>,
    mode: Property<ViewMode>,
    built: AtomicBool,
    view: Mutex<ViewState>,

    /// Emitted with a fresh context whenever columns are added or removed,
    /// and once after [`build`](Self::build).
    pub context_changed: Arc<Signal<RankingContext>>,

    /// Emitted with all columns once additions have been quiet for the
    /// chooser debounce window.
    pub chooser_update: Arc<Signal<Vec<ColumnInfo>>>,

    /// Emitted when the view mode changes.
    pub mode_changed: Signal<ViewMode>,

    /// Emitted when the columns of a tracked score have loaded.
    pub score_columns_added: Signal<Vec<ScoreColumnResult>>,
}

impl Ranking {
    /// Start building a ranking over `grid`.
    pub fn builder(grid: Arc<dyn GridEngine>, authorizer: Arc<dyn Authorizer>) -> RankingBuilder {
        RankingBuilder {
            grid,
            authorizer,
            id_type: None,
            options: RankingOptions::default(),
            plugins: None,
            colors: None,
            bus: None,
            runtime: None,
        }
    }

    /// The options in effect.
    pub fn options(&self) -> &RankingOptions {
        &self.options
    }

    /// The identity space of the rows.
    pub fn id_type(&self) -> &IdType {
        &self.id_type
    }

    /// The column registry.
    pub fn registry(&self) -> &Arc<ColumnRegistry> {
        &self.registry
    }

    /// The lazy column loader.
    pub fn loader(&self) -> &Arc<LazyColumnLoader> {
        &self.loader
    }

    /// The selection bridge.
    pub fn selection(&self) -> &Arc<SelectionBridge> {
        &self.bridge
    }

    /// The header overlays of score columns.
    pub fn overlays(&self) -> &Arc<OverlayBoard> {
        &self.overlays
    }

    /// The score plugins.
    pub fn plugins(&self) -> &Arc<ScoreRegistry> {
        &self.plugins
    }

    /// Returns true once [`build`](Self::build) has succeeded.
    pub fn is_built(&self) -> bool {
        self.built.load(Ordering::SeqCst)
    }

    /// Attach the initial columns and rows.
    ///
    /// Applies `selection` (or an empty one) to the default channel, emits
    /// one `context_changed`, applies the configured view mode and refreshes
    /// the grid.
    ///
    /// # Errors
    ///
    /// Fails if the ranking was already built or a descriptor is rejected.
    /// A rejected build attaches nothing and may be retried.
    pub fn build<I, T>(
        &self,
        rows: I,
        columns: Vec<(ColumnDescriptor, ColumnData)>,
        selection: Option<Selection>,
    ) -> Result<Vec<ColumnHandle>>
    where
        I: IntoIterator<Item = T>,
        T: Into<RowId>,
    {
        if self.built.swap(true, Ordering::SeqCst) {
            return Err(RankingError::AlreadyBuilt);
        }

        let mut seen = HashSet::new();
        for (descriptor, _) in &columns {
            if !seen.insert(descriptor.id.as_str()) || self.registry.find_by_id(&descriptor.id).is_some() {
                tracing::warn!(target: targets::RANKING, column = %descriptor.id, "build rejected duplicate column id");
                self.built.store(false, Ordering::SeqCst);
                return Err(RegistryError::DuplicateColumn {
                    id: descriptor.id.clone(),
                }
                .into());
            }
        }

        self.context_changed.set_blocked(true);
        let mut handles = Vec::with_capacity(columns.len());
        for (descriptor, data) in columns {
            match self.registry.add_column(descriptor, data, None) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in handles {
                        self.registry.remove_column(handle);
                    }
                    self.context_changed.set_blocked(false);
                    self.built.store(false, Ordering::SeqCst);
                    return Err(err.into());
                }
            }
        }
        self.context_changed.set_blocked(false);

        self.bridge.set_rows(rows);
        self.bridge.set_item_selection(
            &SelectionChannel::Default,
            selection.unwrap_or_else(|| Selection::empty(self.id_type.clone())),
        );
        self.context_changed.emit(self.context());

        tracing::info!(
            target: targets::RANKING,
            columns = handles.len(),
            rows = self.bridge.row_count(),
            "ranking built"
        );
        self.apply_mode(self.mode.get());
        Ok(handles)
    }

    /// Attach a column whose values resolve later.
    pub fn add_column(
        &self,
        descriptor: ColumnDescriptor,
        values: ValueFuture,
        position: Option<usize>,
    ) -> Result<LazyColumn> {
        Ok(self.loader.add_lazy_column(descriptor, values, position)?)
    }

    /// Detach a column. Returns whether it was attached.
    pub fn remove_column(&self, handle: ColumnHandle) -> bool {
        self.registry.remove_column(handle)
    }

    /// Attach a score column computed with the configured extra parameters.
    ///
    /// # Errors
    ///
    /// Fails with [`RankingError::ScoresDisabled`] if the options forbid
    /// score columns, or if the descriptor is rejected.
    pub fn add_score_column(&self, score: Arc<dyn Score>) -> Result<ScoreColumn> {
        if !self.options.enable_adding_score_columns {
            return Err(RankingError::ScoresDisabled);
        }
        let params = self.options.additional_compute_score_parameter.clone();
        let column = self.pipeline.add_score_column(score, params, None)?;

        let mut view = self.view.lock();
        view.score_columns.retain(|c| c.column().is_attached());
        view.score_columns.push(column.clone());
        Ok(column)
    }

    /// Add every score plugin `score_id` produces for `params` and wait
    /// until all of them have loaded.
    ///
    /// Emits `score_columns_added` with the results.
    ///
    /// # Errors
    ///
    /// Fails if no plugin is registered under `score_id`, if score columns
    /// are disabled, or if a descriptor is rejected.
    pub async fn add_tracked_score(
        &self,
        score_id: &str,
        params: serde_json::Value,
    ) -> Result<Vec<ScoreColumnResult>> {
        let scores = self
            .plugins
            .create(score_id, &params)
            .ok_or_else(|| RankingError::UnknownScore(score_id.to_string()))?;
        tracing::debug!(target: targets::RANKING, score = score_id, columns = scores.len(), "adding tracked score");

        let columns = scores
            .into_iter()
            .map(|score| self.add_score_column(score))
            .collect::<Result<Vec<_>>>()?;

        let statuses = join_all(columns.iter().map(|column| column.loaded())).await;
        let results: Vec<ScoreColumnResult> = columns
            .into_iter()
            .zip(statuses)
            .map(|(column, status)| ScoreColumnResult {
                descriptor: self.registry.descriptor(column.handle()),
                values: column.column().values(),
                status,
                column,
            })
            .collect();

        self.score_columns_added.emit(results.clone());
        Ok(results)
    }

    /// The score column attached under `handle`.
    pub fn score_column(&self, handle: ColumnHandle) -> Option<ScoreColumn> {
        self.view
            .lock()
            .score_columns
            .iter()
            .find(|c| c.handle() == handle && c.column().is_attached())
            .cloned()
    }

    /// All attached score columns.
    pub fn score_columns(&self) -> Vec<ScoreColumn> {
        self.view
            .lock()
            .score_columns
            .iter()
            .filter(|c| c.column().is_attached())
            .cloned()
            .collect()
    }

    /// A snapshot for selection adapters.
    pub fn context(&self) -> RankingContext {
        RankingContext {
            columns: self.registry.columns(),
            loader: self.loader.clone(),
        }
    }

    /// Apply a selection pushed from the page to the default channel.
    pub fn set_item_selection(&self, selection: Selection) {
        self.bridge
            .set_item_selection(&SelectionChannel::Default, selection);
    }

    /// The current view mode.
    pub fn mode(&self) -> ViewMode {
        self.mode.get()
    }

    /// Switch the view mode. Returns whether it changed.
    ///
    /// Leaving [`ViewMode::Focus`] hides every column except the label
    /// column, the primary sort column, rank and selection columns and the
    /// `id` column. Returning to focus shows exactly the columns hidden then.
    pub fn set_mode(&self, mode: ViewMode) -> bool {
        let Some(previous) = self.mode.replace(mode) else {
            return false;
        };
        tracing::debug!(target: targets::RANKING, from = %previous, to = %mode, "view mode changed");
        if self.is_built() {
            self.apply_mode(mode);
        }
        self.mode_changed.emit(mode);
        true
    }

    /// The column the ranking is primarily sorted by.
    pub fn primary_sort(&self) -> Option<ColumnHandle> {
        self.view
            .lock()
            .primary_sort
            .filter(|&handle| self.registry.contains(handle))
    }

    /// Record the column the grid is primarily sorted by.
    pub fn set_primary_sort(&self, handle: Option<ColumnHandle>) {
        self.view.lock().primary_sort = handle;
    }

    /// Fill the unset column choices of a chart from the visible columns.
    pub fn vis_defaults(&self, config: VisConfig) -> VisConfig {
        let descriptors: Vec<ColumnDescriptor> = self
            .registry
            .columns()
            .into_iter()
            .filter(|info| info.visible)
            .map(|info| ColumnDescriptor::clone(&info.descriptor))
            .collect();
        config.merge_defaults(&descriptors)
    }

    fn apply_mode(&self, mode: ViewMode) {
        if mode == ViewMode::Focus {
            let dump = self.view.lock().dump.take();
            for handle in dump.into_iter().flatten() {
                if self.registry.set_visible(handle, true).is_err() {
                    tracing::trace!(target: targets::RANKING, "hidden column was removed");
                }
            }
            self.grid.refresh();
            return;
        }

        let primary_sort = {
            let mut view = self.view.lock();
            if view.dump.is_some() {
                return;
            }
            view.dump = Some(HashSet::new());
            view.primary_sort
        };

        let columns = self.registry.columns();
        let label = columns
            .iter()
            .find(|info| info.descriptor.kind == ColumnKind::String)
            .map(|info| info.handle);

        let mut hidden = HashSet::new();
        for info in &columns {
            let keep = Some(info.handle) == label
                || Some(info.handle) == primary_sort
                || matches!(info.descriptor.kind, ColumnKind::Rank | ColumnKind::Selection)
                || info.descriptor.column.as_deref() == Some("id");
            if !keep && matches!(self.registry.set_visible(info.handle, false), Ok(true)) {
                hidden.insert(info.handle);
            }
        }
        tracing::debug!(target: targets::RANKING, mode = %mode, hidden = hidden.len(), "columns hidden");

        self.view.lock().dump = Some(hidden);
        self.grid.refresh();
    }
}

impl std::fmt::Debug for Ranking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ranking")
            .field("id_type", &self.id_type)
            .field("mode", &self.mode.get())
            .field("built", &self.is_built())
            .field("registry", &self.registry)
            .finish()
    }
}

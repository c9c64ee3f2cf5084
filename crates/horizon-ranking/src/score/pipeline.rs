//! The authorize, compute and retry cycle of score columns.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, OnceLock, Weak};

use futures_util::FutureExt;
use horizon_ranking_core::logging::targets;
use horizon_ranking_core::{AsyncCancellationToken, ConnectionId, Signal};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::Instrument;

use super::overlay::{HeaderOverlay, OverlayBoard};
use super::state::{PipelineEvent, PipelineState};
use super::{Score, ScoreResult};
use crate::auth::{AuthorizationRender, AuthorizationTrigger, Authorizer, RenderCallback};
use crate::error::{RegistryError, ScoreError};
use crate::model::{
    ColumnHandle, ColumnRegistry, GridEngine, IdType, LazyColumn, LazyColumnLoader, LoadStatus,
    RowId, ScoreRow,
};

/// Retry limits of the score pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Authorization attempts per cycle before giving up.
    ///
    /// `None` retries until authorized or until the column is removed.
    pub max_attempts: Option<u32>,
}

impl PipelineConfig {
    /// Give up after `attempts` authorization attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }
}

struct PipelineEnv {
    loader: Arc<LazyColumnLoader>,
    authorizer: Arc<dyn Authorizer>,
    overlays: Arc<OverlayBoard>,
    grid: Arc<dyn GridEngine>,
    id_type: IdType,
    config: PipelineConfig,
}

impl PipelineEnv {
    fn registry(&self) -> &Arc<ColumnRegistry> {
        self.loader.registry()
    }

    /// Identities of the rows currently in the grid.
    fn current_ids(&self) -> HashSet<RowId> {
        self.grid.row_order().ids().iter().cloned().collect()
    }
}

/// Attaches [`Score`]s as lazy columns and drives their cycles.
#[derive(Clone)]
pub struct ScorePipeline {
    env: Arc<PipelineEnv>,
}

impl ScorePipeline {
    /// Create a pipeline.
    ///
    /// Row identities for every computation are read from `grid` when the
    /// cycle starts.
    pub fn new(
        loader: Arc<LazyColumnLoader>,
        authorizer: Arc<dyn Authorizer>,
        overlays: Arc<OverlayBoard>,
        grid: Arc<dyn GridEngine>,
        id_type: IdType,
        config: PipelineConfig,
    ) -> Self {
        Self {
            env: Arc::new(PipelineEnv {
                loader,
                authorizer,
                overlays,
                grid,
                id_type,
                config,
            }),
        }
    }

    /// The retry limits in effect.
    pub fn config(&self) -> &PipelineConfig {
        &self.env.config
    }

    /// Attach a score column and start its first cycle.
    ///
    /// The column is visible immediately. Authorization and computation
    /// errors never surface here; they show up as header overlays and as the
    /// column's [`LoadStatus`].
    ///
    /// # Errors
    ///
    /// Fails only if the registry rejects the column descriptor.
    pub fn add_score_column(
        &self,
        score: Arc<dyn Score>,
        params: serde_json::Value,
        position: Option<usize>,
    ) -> Result<ScoreColumn, RegistryError> {
        let mut descriptor = score.create_desc(&params);
        descriptor.is_score = true;
        let id = descriptor.id.clone();

        let inner = Arc::new(ScoreInner {
            id,
            score,
            params,
            env: self.env.clone(),
            column: OnceLock::new(),
            cycle: Mutex::new(Cycle {
                generation: 0,
                token: AsyncCancellationToken::new(),
                state: PipelineState::Idle,
            }),
            removal: Mutex::new(None),
            state_changed: Signal::new(),
        });

        let (generation, token) = inner.begin_cycle();
        let (handle_tx, handle_rx) = oneshot::channel();
        let first = {
            let inner = inner.clone();
            async move {
                let Ok(handle) = handle_rx.await else {
                    return Err(ScoreError::Cancelled("column was not attached".into()));
                };
                inner.run_cycle(handle, generation, token).await
            }
            .boxed()
        };

        let column = match self.env.loader.add_lazy_column(descriptor, first, position) {
            Ok(column) => column,
            Err(err) => {
                inner.cycle.lock().token.cancel();
                return Err(err);
            }
        };
        let handle = column.handle();
        let _ = handle_tx.send(handle);
        let _ = inner.column.set(column.clone());
        inner.watch_removal(handle);

        Ok(ScoreColumn { column, inner })
    }
}

impl std::fmt::Debug for ScorePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScorePipeline")
            .field("id_type", &self.env.id_type)
            .field("config", &self.env.config)
            .finish()
    }
}

struct Cycle {
    generation: u64,
    token: AsyncCancellationToken,
    state: PipelineState,
}

struct ScoreInner {
    id: String,
    score: Arc<dyn Score>,
    params: serde_json::Value,
    env: Arc<PipelineEnv>,
    column: OnceLock<LazyColumn>,
    /// Only the cycle of the current generation may change `state`.
    cycle: Mutex<Cycle>,
    removal: Mutex<Option<ConnectionId>>,
    state_changed: Signal<PipelineState>,
}

impl Drop for ScoreInner {
    fn drop(&mut self) {
        if let Some(connection) = self.removal.get_mut().take() {
            self.env.registry().column_removed.disconnect(connection);
        }
    }
}

/// How a cycle ended without values.
enum CycleEnd {
    /// Superseded, cancelled or the column was removed.
    Cancelled(&'static str),
    /// The attempt limit was reached.
    Exhausted(u32),
    /// The score capability failed.
    Failed(ScoreError),
}

impl ScoreInner {
    /// Start a new cycle, cancelling the one in flight.
    fn begin_cycle(&self) -> (u64, AsyncCancellationToken) {
        let (generation, token, state) = {
            let mut cycle = self.cycle.lock();
            cycle.token.cancel();
            cycle.generation += 1;
            cycle.token = AsyncCancellationToken::new();
            if cycle.state.is_active() {
                self.apply(&mut cycle, PipelineEvent::Cancel);
            }
            self.apply(&mut cycle, PipelineEvent::Start);
            (cycle.generation, cycle.token.clone(), cycle.state.clone())
        };
        tracing::debug!(target: targets::SCORE, column = %self.id, generation, "score cycle started");
        self.state_changed.emit(state);
        (generation, token)
    }

    /// Run `event` through the state machine. A rejected event leaves the
    /// state unchanged.
    fn apply(&self, cycle: &mut Cycle, event: PipelineEvent) -> Option<PipelineState> {
        match cycle.state.transition(event) {
            Ok(next) => {
                tracing::debug!(target: targets::SCORE, column = %self.id, from = ?cycle.state, to = ?next, "pipeline transition");
                cycle.state = next.clone();
                Some(next)
            }
            Err(err) => {
                tracing::warn!(target: targets::SCORE, column = %self.id, error = %err, "ignoring pipeline event");
                None
            }
        }
    }

    /// Apply an event on behalf of cycle `generation`.
    ///
    /// Returns false if the cycle was superseded or the event was rejected.
    fn advance(&self, generation: u64, event: PipelineEvent) -> bool {
        let state = {
            let mut cycle = self.cycle.lock();
            if cycle.generation != generation {
                return false;
            }
            match self.apply(&mut cycle, event) {
                Some(next) => next,
                None => return false,
            }
        };
        self.state_changed.emit(state);
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.cycle.lock().generation == generation
    }

    /// Move the cycle of `generation` to `Cancelled` if it is still in flight.
    fn mark_cancelled(&self, generation: u64) -> bool {
        let state = {
            let mut cycle = self.cycle.lock();
            if cycle.generation != generation || !cycle.state.is_active() {
                return false;
            }
            self.apply(&mut cycle, PipelineEvent::Cancel)
        };
        match state {
            Some(state) => {
                self.state_changed.emit(state);
                true
            }
            None => false,
        }
    }

    /// Cancel the cycle in flight, if any.
    fn cancel(&self, handle: ColumnHandle) {
        let generation = {
            let cycle = self.cycle.lock();
            cycle.token.cancel();
            cycle.generation
        };
        if self.mark_cancelled(generation) {
            tracing::info!(target: targets::SCORE, column = %self.id, "score cycle cancelled");
        }
        self.env.overlays.clear(handle);
    }

    /// Stop retrying once the column is removed.
    fn watch_removal(self: &Arc<Self>, handle: ColumnHandle) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let id = self.env.registry().column_removed.connect(move |change| {
            if change.handle != handle {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                tracing::debug!(target: targets::SCORE, column = %inner.id, "score column removed");
                inner.cancel(handle);
                let connection = inner.removal.lock().take();
                if let Some(connection) = connection {
                    inner.env.registry().column_removed.disconnect(connection);
                }
            }
        });
        *self.removal.lock() = Some(id);
        if !self.env.registry().contains(handle) {
            self.cancel(handle);
        }
    }

    /// Re-run the pipeline with the latest row identities.
    fn reload(self: &Arc<Self>) -> Option<impl Future<Output = LoadStatus> + Send + 'static> {
        let column = self.column.get()?;
        let (generation, token) = self.begin_cycle();
        let cycle = self.clone().run_cycle(column.handle(), generation, token).boxed();
        Some(column.reload(cycle))
    }

    /// A trigger that restarts the pipeline.
    fn retry_trigger(self: &Arc<Self>) -> AuthorizationTrigger {
        let weak = Arc::downgrade(self);
        AuthorizationTrigger::new(move || {
            if let Some(inner) = weak.upgrade() {
                tracing::debug!(target: targets::SCORE, column = %inner.id, "manual retry");
                drop(inner.reload());
            }
        })
    }

    /// Forward authorization progress to the header overlay.
    fn render_callback(
        self: &Arc<Self>,
        handle: ColumnHandle,
        token: AsyncCancellationToken,
        outside_error: Arc<Mutex<Option<String>>>,
    ) -> RenderCallback {
        let weak = Arc::downgrade(self);
        Arc::new(move |render: AuthorizationRender| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if token.is_cancelled() {
                return;
            }
            if !inner.env.registry().contains(handle) {
                token.cancel();
                return;
            }
            let outside = outside_error.lock().clone();
            match HeaderOverlay::from_render(&render, outside.as_deref()) {
                Some(overlay) => inner.env.overlays.show(handle, overlay, render.trigger.clone()),
                None => {
                    inner.env.overlays.clear(handle);
                }
            }
        })
    }

    async fn run_cycle(
        self: Arc<Self>,
        handle: ColumnHandle,
        generation: u64,
        token: AsyncCancellationToken,
    ) -> ScoreResult {
        let span = tracing::debug_span!(target: targets::SCORE, "score_cycle", column = %self.id, generation);
        self.cycle_loop(handle, generation, &token)
            .instrument(span)
            .await
            .map_err(|end| self.finish(handle, generation, end))
    }

    async fn cycle_loop(
        self: &Arc<Self>,
        handle: ColumnHandle,
        generation: u64,
        token: &AsyncCancellationToken,
    ) -> Result<Vec<ScoreRow>, CycleEnd> {
        let env = self.env.clone();
        let ids = env.current_ids();
        let outside_error = Arc::new(Mutex::new(None));
        let mut attempt = 1;

        loop {
            let configs = self.score.authorization_configuration();
            if !configs.is_empty() {
                let render = self.render_callback(handle, token.clone(), outside_error.clone());
                tracing::debug!(target: targets::SCORE, column = %self.id, attempt, "requesting authorization");
                tokio::select! {
                    _ = env.authorizer.request_authorizations(configs, render) => {}
                    _ = token.cancelled() => return Err(CycleEnd::Cancelled("cycle cancelled while authorizing")),
                }
            }
            if token.is_cancelled() || !env.registry().contains(handle) {
                return Err(CycleEnd::Cancelled("cancelled while authorizing"));
            }
            env.overlays.clear(handle);
            self.advance(generation, PipelineEvent::Authorized);

            tracing::debug!(target: targets::SCORE, column = %self.id, attempt, rows = ids.len(), "computing score");
            let computed = tokio::select! {
                result = self.score.compute(&ids, &env.id_type, &self.params) => result,
                _ = token.cancelled() => return Err(CycleEnd::Cancelled("cycle cancelled while computing")),
            };
            if token.is_cancelled() || !env.registry().contains(handle) {
                return Err(CycleEnd::Cancelled("cancelled while computing"));
            }

            match computed {
                Ok(rows) => {
                    if !self.is_current(generation) {
                        return Err(CycleEnd::Cancelled("superseded"));
                    }
                    env.overlays.clear(handle);
                    self.advance(generation, PipelineEvent::Computed);
                    tracing::info!(target: targets::SCORE, column = %self.id, attempt, rows = rows.len(), "score computed");
                    return Ok(rows);
                }
                Err(ScoreError::InvalidToken { token_ids, message }) => {
                    tracing::warn!(target: targets::SCORE, column = %self.id, attempt, tokens = ?token_ids, %message, "score rejected with invalid token");
                    *outside_error.lock() = Some(
                        ScoreError::InvalidToken {
                            token_ids: token_ids.clone(),
                            message,
                        }
                        .to_string(),
                    );
                    self.advance(generation, PipelineEvent::InvalidToken(token_ids.clone()));

                    if !env.registry().contains(handle) {
                        return Err(CycleEnd::Cancelled("column removed after token rejection"));
                    }
                    env.authorizer.invalidate_token(&token_ids);

                    if let Some(max) = env.config.max_attempts
                        && attempt >= max
                    {
                        return Err(CycleEnd::Exhausted(attempt));
                    }
                    attempt += 1;
                    self.advance(generation, PipelineEvent::Retry);
                }
                Err(err) => {
                    tracing::warn!(target: targets::SCORE, column = %self.id, attempt, error = %err, "score computation failed");
                    if self.advance(generation, PipelineEvent::Failed(err.to_string())) {
                        env.overlays.show(
                            handle,
                            HeaderOverlay::Error {
                                message: err.to_string(),
                            },
                            self.retry_trigger(),
                        );
                    }
                    return Err(CycleEnd::Failed(err));
                }
            }
        }
    }

    fn finish(self: &Arc<Self>, handle: ColumnHandle, generation: u64, end: CycleEnd) -> ScoreError {
        let reason = match end {
            CycleEnd::Failed(err) => return err,
            CycleEnd::Cancelled(reason) => {
                if self.mark_cancelled(generation) {
                    self.env.overlays.clear(handle);
                }
                reason.to_string()
            }
            CycleEnd::Exhausted(attempts) => {
                let reason = format!("gave up after {attempts} authorization attempts");
                if self.mark_cancelled(generation) {
                    self.env.overlays.show(
                        handle,
                        HeaderOverlay::Error {
                            message: reason.clone(),
                        },
                        self.retry_trigger(),
                    );
                }
                reason
            }
        };
        tracing::debug!(target: targets::SCORE, column = %self.id, generation, %reason, "score cycle abandoned");
        ScoreError::Cancelled(reason)
    }
}

/// A score attached as a lazy column.
///
/// Cloning is cheap; clones refer to the same column.
#[derive(Clone)]
pub struct ScoreColumn {
    column: LazyColumn,
    inner: Arc<ScoreInner>,
}

impl ScoreColumn {
    /// The registry handle of the column.
    pub fn handle(&self) -> ColumnHandle {
        self.column.handle()
    }

    /// The column id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The underlying lazy column.
    pub fn column(&self) -> &LazyColumn {
        &self.column
    }

    /// The parameters every computation receives.
    pub fn params(&self) -> &serde_json::Value {
        &self.inner.params
    }

    /// The pipeline state of the latest cycle.
    pub fn state(&self) -> PipelineState {
        self.inner.cycle.lock().state.clone()
    }

    /// Emitted on every pipeline state change.
    pub fn state_changed(&self) -> &Signal<PipelineState> {
        &self.inner.state_changed
    }

    /// Wait until the latest cycle has settled.
    pub async fn loaded(&self) -> LoadStatus {
        self.column.loaded().await
    }

    /// Recompute with the grid's current row identities and the original
    /// parameters.
    ///
    /// Supersedes a cycle in flight; its result is discarded when it arrives.
    pub fn reload(&self) -> impl Future<Output = LoadStatus> + Send + 'static {
        let (generation, token) = self.inner.begin_cycle();
        let cycle = self
            .inner
            .clone()
            .run_cycle(self.column.handle(), generation, token)
            .boxed();
        self.column.reload(cycle)
    }

    /// Stop the cycle in flight. It ends as [`PipelineState::Cancelled`].
    pub fn cancel(&self) {
        self.inner.cancel(self.column.handle());
    }
}

impl std::fmt::Debug for ScoreColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreColumn")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthorizationConfig;
    use crate::color::ColumnColors;
    use crate::model::{ColumnDescriptor, RowOrder, SelectionChannel};
    use futures_util::future::BoxFuture;
    use horizon_ranking_core::AsyncRuntime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Rows(RowOrder);

    impl GridEngine for Rows {
        fn row_order(&self) -> RowOrder {
            self.0.clone()
        }

        fn highlight(&self, _channel: &SelectionChannel, _positions: &[usize]) {}
    }

    #[derive(Default)]
    struct AlwaysAuthorized {
        requests: AtomicUsize,
        invalidated: Mutex<Vec<Vec<String>>>,
    }

    impl Authorizer for AlwaysAuthorized {
        fn request_authorizations(
            &self,
            _configs: Vec<AuthorizationConfig>,
            _render: RenderCallback,
        ) -> BoxFuture<'static, ()> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            async {}.boxed()
        }

        fn invalidate_token(&self, token_ids: &[String]) {
            self.invalidated.lock().push(token_ids.to_vec());
        }
    }

    /// Fails with a computation error on the first call, then succeeds.
    struct Flaky {
        calls: AtomicUsize,
    }

    impl Score for Flaky {
        fn create_desc(&self, _params: &serde_json::Value) -> ColumnDescriptor {
            ColumnDescriptor::score("flaky", "Flaky")
        }

        fn authorization_configuration(&self) -> Vec<AuthorizationConfig> {
            vec![AuthorizationConfig::new("a", "A")]
        }

        fn compute(
            &self,
            ids: &HashSet<RowId>,
            _id_type: &IdType,
            _params: &serde_json::Value,
        ) -> BoxFuture<'static, ScoreResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let rows: Vec<ScoreRow> = ids.iter().map(|id| ScoreRow::new(id.clone(), 1)).collect();
            async move {
                if call == 0 {
                    Err(ScoreError::Computation("backend unavailable".into()))
                } else {
                    Ok(rows)
                }
            }
            .boxed()
        }
    }

    /// Never finishes computing.
    struct Stalled;

    impl Score for Stalled {
        fn create_desc(&self, _params: &serde_json::Value) -> ColumnDescriptor {
            ColumnDescriptor::score("stalled", "Stalled")
        }

        fn compute(
            &self,
            _ids: &HashSet<RowId>,
            _id_type: &IdType,
            _params: &serde_json::Value,
        ) -> BoxFuture<'static, ScoreResult> {
            futures_util::future::pending().boxed()
        }
    }

    fn pipeline(authorizer: Arc<AlwaysAuthorized>) -> (ScorePipeline, Arc<OverlayBoard>) {
        let registry = Arc::new(ColumnRegistry::new(Arc::new(ColumnColors::new())));
        let loader = Arc::new(LazyColumnLoader::new(registry, AsyncRuntime::current().unwrap()));
        let overlays = Arc::new(OverlayBoard::new());
        let grid = Arc::new(Rows(["r1", "r2"].into_iter().collect()));
        let pipeline = ScorePipeline::new(
            loader,
            authorizer,
            overlays.clone(),
            grid,
            IdType::from("Gene"),
            PipelineConfig::default(),
        );
        (pipeline, overlays)
    }

    #[tokio::test]
    async fn test_fatal_error_shows_overlay_and_trigger_retries() {
        let authorizer = Arc::new(AlwaysAuthorized::default());
        let (pipeline, overlays) = pipeline(authorizer.clone());
        let score = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
        });

        let column = pipeline
            .add_score_column(score.clone(), serde_json::Value::Null, None)
            .unwrap();
        assert!(matches!(column.loaded().await, LoadStatus::Failed(_)));
        assert!(matches!(column.state(), PipelineState::FatalError(_)));
        assert!(matches!(
            overlays.overlay(column.handle()),
            Some(HeaderOverlay::Error { .. })
        ));

        assert!(overlays.trigger(column.handle()));
        assert_eq!(column.loaded().await, LoadStatus::Loaded);
        assert_eq!(column.state(), PipelineState::Success);
        assert_eq!(overlays.overlay(column.handle()), None);
        assert_eq!(score.calls.load(Ordering::SeqCst), 2);
        assert_eq!(authorizer.requests.load(Ordering::SeqCst), 2);
        assert_eq!(column.column().values().map(|v| v.len()), Some(2));
    }

    #[tokio::test]
    async fn test_score_descriptor_is_flagged() {
        let (pipeline, _) = pipeline(Arc::new(AlwaysAuthorized::default()));
        let column = pipeline
            .add_score_column(
                Arc::new(Flaky {
                    calls: AtomicUsize::new(1),
                }),
                serde_json::json!({ "threshold": 2 }),
                None,
            )
            .unwrap();

        assert_eq!(column.loaded().await, LoadStatus::Loaded);
        assert_eq!(column.params()["threshold"], 2);
        let registry = pipeline.env.registry();
        assert!(registry.descriptor(column.handle()).unwrap().is_score);
    }

    #[tokio::test]
    async fn test_cancel_and_restart_follow_transitions() {
        let (pipeline, _) = pipeline(Arc::new(AlwaysAuthorized::default()));
        let column = pipeline
            .add_score_column(Arc::new(Stalled), serde_json::Value::Null, None)
            .unwrap();
        let states = Arc::new(Mutex::new(Vec::new()));
        let states_clone = states.clone();
        column.state_changed().connect(move |state| {
            states_clone.lock().push(state.clone());
        });

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(column.state(), PipelineState::Computing { attempt: 1 });

        let reloaded = column.reload();
        assert_eq!(column.state(), PipelineState::Authorizing { attempt: 1 });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        column.cancel();
        assert!(matches!(reloaded.await, LoadStatus::Failed(_)));

        column.cancel();
        assert_eq!(column.state(), PipelineState::Cancelled);
        assert_eq!(
            *states.lock(),
            vec![
                PipelineState::Computing { attempt: 1 },
                PipelineState::Authorizing { attempt: 1 },
                PipelineState::Computing { attempt: 1 },
                PipelineState::Cancelled,
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_column_releases_removal_slot() {
        let (pipeline, _) = pipeline(Arc::new(AlwaysAuthorized::default()));
        let registry = pipeline.env.registry().clone();
        let baseline = registry.column_removed.connection_count();

        let column = pipeline
            .add_score_column(
                Arc::new(Flaky {
                    calls: AtomicUsize::new(1),
                }),
                serde_json::Value::Null,
                None,
            )
            .unwrap();
        assert_eq!(column.loaded().await, LoadStatus::Loaded);
        assert_eq!(registry.column_removed.connection_count(), baseline + 1);

        drop(column);
        for _ in 0..10 {
            if registry.column_removed.connection_count() == baseline {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(registry.column_removed.connection_count(), baseline);
        assert_eq!(registry.len(), 1);
    }
}

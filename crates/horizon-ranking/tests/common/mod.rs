//! Mock collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use horizon_ranking::auth::{
    AuthorizationConfig, AuthorizationRender, AuthorizationStatus, AuthorizationTrigger,
    Authorizer, RenderCallback,
};
use horizon_ranking::error::ScoreError;
use horizon_ranking::model::{
    ColumnDescriptor, GridEngine, IdType, RowId, RowOrder, ScoreRow, SelectionBus,
    SelectionChannel,
};
use horizon_ranking::score::{Score, ScoreResult};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

/// Install a subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A grid whose row order the test controls.
pub struct TestGrid {
    rows: Mutex<RowOrder>,
    pub highlights: Mutex<Vec<(SelectionChannel, Vec<usize>)>>,
    pub refreshes: AtomicUsize,
}

impl TestGrid {
    pub fn new(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(ids.iter().copied().collect()),
            highlights: Mutex::new(Vec::new()),
            refreshes: AtomicUsize::new(0),
        })
    }

    pub fn reorder(&self, ids: &[&str]) {
        *self.rows.lock() = ids.iter().copied().collect();
    }

    pub fn highlight_count(&self) -> usize {
        self.highlights.lock().len()
    }

    pub fn last_highlight(&self) -> Option<(SelectionChannel, Vec<usize>)> {
        self.highlights.lock().last().cloned()
    }
}

impl GridEngine for TestGrid {
    fn row_order(&self) -> RowOrder {
        self.rows.lock().clone()
    }

    fn highlight(&self, channel: &SelectionChannel, positions: &[usize]) {
        self.highlights
            .lock()
            .push((channel.clone(), positions.to_vec()));
    }

    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Grants every authorization immediately and records invalidations.
#[derive(Default)]
pub struct RecordingAuthorizer {
    requests: AtomicUsize,
    pub invalidated: Mutex<Vec<Vec<String>>>,
}

impl RecordingAuthorizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn invalidations(&self) -> Vec<Vec<String>> {
        self.invalidated.lock().clone()
    }
}

impl Authorizer for RecordingAuthorizer {
    fn request_authorizations(
        &self,
        configs: Vec<AuthorizationConfig>,
        render: RenderCallback,
    ) -> BoxFuture<'static, ()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        for config in configs {
            render(AuthorizationRender {
                config: Arc::new(config),
                status: AuthorizationStatus::Success,
                error: None,
                trigger: AuthorizationTrigger::noop(),
            });
        }
        async {}.boxed()
    }

    fn invalidate_token(&self, token_ids: &[String]) {
        self.invalidated.lock().push(token_ids.to_vec());
    }
}

/// A score that replays queued responses, then succeeds with one value per
/// row.
pub struct ScriptedScore {
    id: String,
    auth: Vec<AuthorizationConfig>,
    responses: Mutex<VecDeque<BoxFuture<'static, ScoreResult>>>,
    pub calls: Mutex<Vec<HashSet<RowId>>>,
    pub params: Mutex<Vec<serde_json::Value>>,
}

impl ScriptedScore {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            auth: Vec::new(),
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    pub fn with_auth(mut self, config: AuthorizationConfig) -> Self {
        self.auth.push(config);
        self
    }

    pub fn respond(self, result: ScoreResult) -> Self {
        self.responses
            .lock()
            .push_back(async move { result }.boxed());
        self
    }

    pub fn rejecting(self, times: usize, token: &str) -> Self {
        (0..times).fold(self, |score, _| {
            score.respond(Err(ScoreError::invalid_token([token], "token expired")))
        })
    }

    /// Queue a response the test resolves later.
    pub fn respond_later(&self) -> oneshot::Sender<ScoreResult> {
        let (tx, rx) = oneshot::channel();
        self.responses.lock().push_back(
            async move {
                rx.await
                    .unwrap_or_else(|_| Err(ScoreError::Cancelled("response dropped".into())))
            }
            .boxed(),
        );
        tx
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Score for ScriptedScore {
    fn create_desc(&self, _params: &serde_json::Value) -> ColumnDescriptor {
        ColumnDescriptor::score(self.id.clone(), self.id.to_uppercase())
    }

    fn authorization_configuration(&self) -> Vec<AuthorizationConfig> {
        self.auth.clone()
    }

    fn compute(
        &self,
        ids: &HashSet<RowId>,
        _id_type: &IdType,
        params: &serde_json::Value,
    ) -> BoxFuture<'static, ScoreResult> {
        self.calls.lock().push(ids.clone());
        self.params.lock().push(params.clone());
        if let Some(response) = self.responses.lock().pop_front() {
            return response;
        }
        let mut rows: Vec<ScoreRow> = ids.iter().map(|id| ScoreRow::new(id.clone(), 1)).collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        async move { Ok(rows) }.boxed()
    }
}

/// Records what the bridge publishes page-wide.
#[derive(Default)]
pub struct RecordingBus {
    pub selected: Mutex<Vec<(IdType, HashSet<RowId>)>>,
    pub cleared: Mutex<Vec<IdType>>,
}

impl SelectionBus for RecordingBus {
    fn select(&self, id_type: &IdType, ids: &HashSet<RowId>) {
        self.selected.lock().push((id_type.clone(), ids.clone()));
    }

    fn clear(&self, id_type: &IdType) {
        self.cleared.lock().push(id_type.clone());
    }
}

pub fn ids(items: &[&str]) -> HashSet<RowId> {
    items.iter().map(|&id| RowId::from(id)).collect()
}

/// Yield to spawned tasks until `done` holds.
pub async fn settle_until(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    assert!(done(), "condition not reached");
}

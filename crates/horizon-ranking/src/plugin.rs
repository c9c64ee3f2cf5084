//! Score plugins resolved by id.

use std::collections::HashMap;
use std::sync::Arc;

use horizon_ranking_core::logging::targets;
use parking_lot::RwLock;

use crate::score::Score;

type ScoreFactory = Arc<dyn Fn(&serde_json::Value) -> Vec<Arc<dyn Score>> + Send + Sync>;

/// Maps score ids to factories.
///
/// A factory receives the parameters of the tracked score and may produce
/// several scores (one column each). Registries are plain values; build one
/// at startup and hand it to the [`Ranking`](crate::Ranking).
#[derive(Default)]
pub struct ScoreRegistry {
    factories: RwLock<HashMap<String, ScoreFactory>>,
}

impl ScoreRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one with the same id.
    pub fn register<F>(&self, id: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Vec<Arc<dyn Score>> + Send + Sync + 'static,
    {
        let id = id.into();
        tracing::debug!(target: targets::RANKING, score = %id, "score plugin registered");
        self.factories.write().insert(id, Arc::new(factory));
    }

    /// Register a single score that ignores its parameters.
    pub fn register_score(&self, id: impl Into<String>, score: Arc<dyn Score>) {
        self.register(id, move |_| vec![score.clone()]);
    }

    /// Create the scores of plugin `id`.
    pub fn create(&self, id: &str, params: &serde_json::Value) -> Option<Vec<Arc<dyn Score>>> {
        let factory = self.factories.read().get(id).cloned()?;
        Some(factory(params))
    }

    /// Returns true if a plugin is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.factories.read().contains_key(id)
    }

    /// Registered plugin ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ScoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

//! Tests for the ranking facade.

mod common;

use std::sync::Arc;

use common::{RecordingAuthorizer, ScriptedScore, TestGrid};
use futures_util::FutureExt;
use horizon_ranking::model::{ColumnData, ColumnDescriptor, ColumnKind, LoadStatus, ScoreRow};
use horizon_ranking::plugin::ScoreRegistry;
use horizon_ranking::score::Score;
use horizon_ranking::vis::VisConfig;
use horizon_ranking::{
    Ranking, RankingContext, RankingError, RankingOptions, SelectionColumn, ViewMode,
};
use parking_lot::Mutex;

fn plugins() -> Arc<ScoreRegistry> {
    let plugins = ScoreRegistry::new();
    plugins.register("per_tissue", |params| {
        params["tissues"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|tissue| tissue.as_str())
            .map(|tissue| Arc::new(ScriptedScore::new(tissue)) as Arc<dyn Score>)
            .collect()
    });
    Arc::new(plugins)
}

fn initial_columns() -> Vec<(ColumnDescriptor, ColumnData)> {
    vec![
        (
            ColumnDescriptor::new("symbol", ColumnKind::String, "Symbol"),
            ColumnData::Ready(vec![ScoreRow::new("r1", "TP53"), ScoreRow::new("r2", "EGFR")]),
        ),
        (
            ColumnDescriptor::new("tpm", ColumnKind::Numeric, "TPM"),
            ColumnData::Ready(vec![ScoreRow::new("r1", 1.5), ScoreRow::new("r2", 0.2)]),
        ),
    ]
}

#[tokio::test]
async fn test_tracked_score_adds_every_column() {
    let ranking = Ranking::builder(TestGrid::new(&["r1", "r2"]), RecordingAuthorizer::new())
        .plugins(plugins())
        .build()
        .unwrap();
    ranking.build(["r1", "r2"], initial_columns(), None).unwrap();

    let announced = Arc::new(Mutex::new(Vec::new()));
    let announced_clone = announced.clone();
    ranking.score_columns_added.connect(move |results| {
        announced_clone
            .lock()
            .extend(results.iter().map(|r| r.column.id().to_string()));
    });

    let results = ranking
        .add_tracked_score("per_tissue", serde_json::json!({ "tissues": ["lung", "liver"] }))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(result.status, LoadStatus::Loaded);
        assert_eq!(result.values.as_ref().map(Vec::len), Some(2));
        assert!(result.descriptor.as_ref().is_some_and(|d| d.is_score));
    }
    assert_eq!(*announced.lock(), vec!["lung", "liver"]);
    assert_eq!(ranking.score_columns().len(), 2);
    assert_eq!(ranking.registry().len(), 4);

    let lung = ranking.registry().find_by_id("lung").unwrap();
    assert!(ranking.score_column(lung).is_some());
    ranking.remove_column(lung);
    assert!(ranking.score_column(lung).is_none());
    assert_eq!(ranking.score_columns().len(), 1);
}

#[tokio::test]
async fn test_unknown_tracked_score() {
    let ranking = Ranking::builder(TestGrid::new(&["r1"]), RecordingAuthorizer::new())
        .build()
        .unwrap();
    let err = ranking
        .add_tracked_score("missing", serde_json::Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, RankingError::UnknownScore(id) if id == "missing"));
}

#[tokio::test]
async fn test_context_adds_and_removes_selection_columns() {
    let ranking = Ranking::builder(TestGrid::new(&["r1", "r2"]), RecordingAuthorizer::new())
        .build()
        .unwrap();
    let contexts: Arc<Mutex<Vec<RankingContext>>> = Arc::new(Mutex::new(Vec::new()));
    let contexts_clone = contexts.clone();
    ranking.context_changed.connect(move |context| {
        contexts_clone.lock().push(context.clone());
    });

    ranking.build(["r1", "r2"], initial_columns(), None).unwrap();
    let context = contexts.lock().last().cloned().unwrap();
    assert_eq!(context.columns().len(), 2);

    let added = context
        .add(vec![SelectionColumn {
            descriptor: ColumnDescriptor::new("r1_corr", ColumnKind::Numeric, "Correlation r1"),
            values: async { Ok(vec![ScoreRow::new("r2", 0.8)]) }.boxed(),
            position: Some(1),
        }])
        .unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].loaded().await, LoadStatus::Loaded);
    assert_eq!(ranking.registry().position_of(added[0].handle()), Some(1));
    assert_eq!(contexts.lock().last().unwrap().columns().len(), 3);

    let color = ranking
        .registry()
        .descriptor(added[0].handle())
        .and_then(|d| d.color);
    assert_eq!(context.remove([added[0].handle(), added[0].handle()]), 1);
    assert_eq!(contexts.lock().last().unwrap().columns().len(), 2);
    context.free_color("r1_corr");

    let again = ranking
        .add_column(
            ColumnDescriptor::new("r2_corr", ColumnKind::Numeric, "Correlation r2"),
            async { Ok(vec![]) }.boxed(),
            None,
        )
        .unwrap();
    let reused = ranking
        .registry()
        .descriptor(again.handle())
        .and_then(|d| d.color);
    assert_eq!(reused, color);

    assert!(matches!(
        context.add(vec![SelectionColumn {
            descriptor: ColumnDescriptor::new("symbol", ColumnKind::String, "Symbol"),
            values: async { Ok(vec![]) }.boxed(),
            position: None,
        }]),
        Err(horizon_ranking::error::RegistryError::DuplicateColumn { .. })
    ));
}

#[tokio::test]
async fn test_options_from_toml_drive_the_ranking() {
    let options = RankingOptions::from_toml_str(
        r#"
        item_name = "gene"
        item_name_plural = "genes"
        item_id_type = "Ensembl"
        mode = "contextual"
        "#,
    )
    .unwrap();
    let grid = TestGrid::new(&["r1", "r2"]);
    let ranking = Ranking::builder(grid.clone(), RecordingAuthorizer::new())
        .options(options)
        .build()
        .unwrap();
    assert_eq!(ranking.id_type().name(), "Ensembl");

    let modes = Arc::new(Mutex::new(Vec::new()));
    let modes_clone = modes.clone();
    ranking.mode_changed.connect(move |mode| modes_clone.lock().push(*mode));

    ranking.build(["r1", "r2"], initial_columns(), None).unwrap();
    let visible: Vec<bool> = ranking
        .registry()
        .columns()
        .iter()
        .map(|info| info.visible)
        .collect();
    assert_eq!(visible, vec![true, false]);

    assert!(ranking.set_mode(ViewMode::Focus));
    assert!(ranking.registry().columns().iter().all(|info| info.visible));
    assert_eq!(*modes.lock(), vec![ViewMode::Focus]);
}

#[tokio::test]
async fn test_vis_defaults_use_visible_columns() {
    let ranking = Ranking::builder(TestGrid::new(&["r1", "r2"]), RecordingAuthorizer::new())
        .build()
        .unwrap();
    let mut columns = initial_columns();
    columns.push((
        ColumnDescriptor::new("length", ColumnKind::Numeric, "Length"),
        ColumnData::Ready(vec![]),
    ));
    columns.push((
        ColumnDescriptor::new("gc", ColumnKind::Numeric, "GC content"),
        ColumnData::Ready(vec![]),
    ));
    let handles = ranking.build(["r1", "r2"], columns, None).unwrap();
    ranking.registry().set_visible(handles[2], false).unwrap();

    let config: VisConfig = serde_json::from_str(r#"{ "type": "scatter" }"#).unwrap();
    let VisConfig::Scatter(scatter) = ranking.vis_defaults(config) else {
        panic!("expected a scatter config");
    };
    let chosen: Vec<&str> = scatter
        .num_columns_selected
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    assert_eq!(chosen, vec!["gc", "tpm"]);
}

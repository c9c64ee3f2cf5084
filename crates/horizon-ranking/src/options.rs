//! Ranking options.
//!
//! [`RankingOptions`] holds every user-tunable setting of a
//! [`Ranking`](crate::Ranking). All fields have defaults, so a configuration
//! file only names what it changes:
//!
//! ```
//! use horizon_ranking::options::{RankingOptions, ViewMode};
//!
//! let options = RankingOptions::from_toml_str(r#"
//!     item_name = "gene"
//!     item_name_plural = "genes"
//!     mode = "contextual"
//!
//!     [pipeline]
//!     max_attempts = 3
//! "#).unwrap();
//!
//! assert_eq!(options.item_name, "gene");
//! assert_eq!(options.mode, Some(ViewMode::Contextual));
//! assert!(options.enable_adding_score_columns);
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;
use crate::model::IdType;
use crate::score::PipelineConfig;

/// How much room the ranking takes in its surrounding view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// The ranking is the main view; every column is shown.
    #[default]
    Focus,
    /// The ranking shares the screen; only identifying columns stay visible.
    Contextual,
    /// The ranking is collapsed; only identifying columns stay visible.
    Hidden,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Focus => "focus",
            Self::Contextual => "contextual",
            Self::Hidden => "hidden",
        };
        f.write_str(name)
    }
}

/// Initial state of the side panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidePanel {
    /// No side panel.
    Hidden,
    /// Expanded next to the ranking.
    Open,
    /// Collapsed to a button bar.
    #[default]
    Collapsed,
    /// Shown above the ranking.
    Top,
}

/// Limits forwarded to the data provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// Maximum number of nested sort criteria; `None` is unlimited.
    pub max_nested_sorting_criteria: Option<u32>,
    /// Maximum number of group columns; `None` is unlimited.
    pub max_group_columns: Option<u32>,
    /// Apply filters to every ranking instead of only the active one.
    pub filter_globally: bool,
    /// Share aggregation (collapse) state between rankings.
    pub propagate_aggregation_state: bool,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            max_nested_sorting_criteria: None,
            max_group_columns: None,
            filter_globally: true,
            propagate_aggregation_state: false,
        }
    }
}

/// User-tunable settings of a ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingOptions {
    /// Singular name of a row, e.g. "gene".
    pub item_name: String,
    /// Plural name of rows, e.g. "genes".
    pub item_name_plural: String,
    /// Identity type of the rows. Falls back to the ranking's own id type.
    pub item_id_type: Option<IdType>,
    /// Fixed row height in pixels; `None` lets the grid decide.
    pub item_row_height: Option<u32>,
    /// Extra parameters passed to every score the ranking adds.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub additional_compute_score_parameter: serde_json::Value,
    /// Allow switching between focus and overview rendering.
    pub enable_overview_mode: bool,
    /// Allow users to add score columns.
    pub enable_adding_score_columns: bool,
    /// Side panel placement.
    pub enable_side_panel: SidePanel,
    /// Show summaries in column headers.
    pub enable_header_summary: bool,
    /// Rotate column headers.
    pub enable_header_rotation: bool,
    /// Data provider limits.
    pub provider: ProviderOptions,
    /// View mode applied once the ranking is built; `None` leaves it alone.
    pub mode: Option<ViewMode>,
    /// Retry limits of score columns.
    pub pipeline: PipelineConfig,
    /// Quiet period before the column chooser is refreshed, in milliseconds.
    pub chooser_debounce_ms: u64,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            item_name: "item".to_string(),
            item_name_plural: "items".to_string(),
            item_id_type: None,
            item_row_height: None,
            additional_compute_score_parameter: serde_json::Value::Null,
            enable_overview_mode: true,
            enable_adding_score_columns: true,
            enable_side_panel: SidePanel::Collapsed,
            enable_header_summary: true,
            enable_header_rotation: false,
            provider: ProviderOptions::default(),
            mode: None,
            pipeline: PipelineConfig::default(),
            chooser_debounce_ms: 100,
        }
    }
}

impl RankingOptions {
    /// Parse options from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, OptionsError> {
        Ok(toml::from_str(s)?)
    }

    /// Parse options from JSON. Missing keys keep their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serialize the options to pretty-printed TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// The chooser debounce window.
    pub fn chooser_debounce(&self) -> Duration {
        Duration::from_millis(self.chooser_debounce_ms)
    }

    /// Set the item names.
    pub fn with_item_names(mut self, singular: impl Into<String>, plural: impl Into<String>) -> Self {
        self.item_name = singular.into();
        self.item_name_plural = plural.into();
        self
    }

    /// Set the view mode applied on build.
    pub fn with_mode(mut self, mode: ViewMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the parameters passed to every score.
    pub fn with_score_parameter(mut self, params: serde_json::Value) -> Self {
        self.additional_compute_score_parameter = params;
        self
    }

    /// Set the pipeline retry limits.
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RankingOptions::default();
        assert_eq!(options.item_name, "item");
        assert_eq!(options.item_name_plural, "items");
        assert!(options.enable_overview_mode);
        assert!(!options.enable_header_rotation);
        assert_eq!(options.enable_side_panel, SidePanel::Collapsed);
        assert!(options.provider.filter_globally);
        assert_eq!(options.provider.max_group_columns, None);
        assert_eq!(options.chooser_debounce(), Duration::from_millis(100));
        assert_eq!(options.pipeline.max_attempts, None);
    }

    #[test]
    fn test_json_partial_override() {
        let options = RankingOptions::from_json_str(
            r#"{
                "item_id_type": "Ensembl",
                "enable_adding_score_columns": false,
                "additional_compute_score_parameter": {"species": "human"},
                "provider": {"max_group_columns": 2}
            }"#,
        )
        .unwrap();
        assert_eq!(options.item_id_type, Some(IdType::from("Ensembl")));
        assert!(!options.enable_adding_score_columns);
        assert_eq!(options.additional_compute_score_parameter["species"], "human");
        assert_eq!(options.provider.max_group_columns, Some(2));
        assert!(options.provider.filter_globally);
        assert_eq!(options.item_name, "item");
    }

    #[test]
    fn test_toml_round_trip() {
        let options = RankingOptions::default()
            .with_item_names("gene", "genes")
            .with_mode(ViewMode::Hidden)
            .with_pipeline(PipelineConfig::default().with_max_attempts(2));
        let text = options.to_toml_string().unwrap();
        assert_eq!(RankingOptions::from_toml_str(&text).unwrap(), options);
    }

    #[test]
    fn test_invalid_options() {
        assert!(matches!(
            RankingOptions::from_toml_str("mode = \"sideways\""),
            Err(OptionsError::Toml(_))
        ));
        assert!(matches!(
            RankingOptions::from_json_str("{"),
            Err(OptionsError::Json(_))
        ));
    }
}

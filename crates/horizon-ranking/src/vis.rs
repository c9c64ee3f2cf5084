//! Visualization configurations.
//!
//! Charts linked to a ranking are rendered elsewhere; this module only owns
//! their configuration. [`VisConfig`] is a closed union over the supported
//! chart kinds. Every kind fills unspecified fields with its defaults when
//! deserialized, and [`VisConfig::merge_defaults`] picks default columns from
//! the ranking's columns when the user has not chosen any.
//!
//! # Example
//!
//! ```
//! use horizon_ranking::model::{ColumnDescriptor, ColumnKind};
//! use horizon_ranking::vis::VisConfig;
//!
//! let columns = [
//!     ColumnDescriptor::new("age", ColumnKind::Numeric, "Age"),
//!     ColumnDescriptor::new("size", ColumnKind::Numeric, "Size"),
//! ];
//! let config: VisConfig = serde_json::from_str(r#"{ "type": "scatter" }"#).unwrap();
//! let VisConfig::Scatter(scatter) = config.merge_defaults(&columns) else {
//!     unreachable!()
//! };
//! assert_eq!(scatter.num_columns_selected.len(), 2);
//! ```

use serde::{Deserialize, Serialize};

use crate::model::{ColumnDescriptor, ColumnKind};

/// A column reference inside a chart configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    /// The column id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&ColumnDescriptor> for ColumnRef {
    fn from(desc: &ColumnDescriptor) -> Self {
        Self {
            id: desc.id.clone(),
            name: desc.label.clone(),
            description: desc.description.clone(),
        }
    }
}

fn is_numerical(desc: &ColumnDescriptor) -> bool {
    matches!(desc.kind, ColumnKind::Numeric | ColumnKind::Score)
}

fn is_categorical(desc: &ColumnDescriptor) -> bool {
    desc.kind == ColumnKind::Categorical
}

/// Fill up to two numeric selections from the last numeric columns.
fn pick_two_numerical(selected: &mut Vec<ColumnRef>, numerical: &[&ColumnDescriptor]) {
    let [.., second_last, last] = numerical else {
        return;
    };
    match selected.as_slice() {
        [] => {
            selected.push(ColumnRef::from(*last));
            selected.push(ColumnRef::from(*second_last));
        }
        [only] => {
            let pick = if only.id != last.id { last } else { second_last };
            selected.push(ColumnRef::from(*pick));
        }
        _ => {}
    }
}

/// Lasso/rectangle style of brushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragMode {
    /// Rectangular brush.
    #[default]
    Rectangle,
    /// Free-form lasso.
    Lasso,
    /// Pan the viewport.
    Pan,
    /// Zoom into a region.
    Zoom,
}

/// Color scale of numeric color mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScaleType {
    /// One hue from low to high.
    #[default]
    Sequential,
    /// Two hues around a midpoint.
    Divergent,
}

/// Scatter plot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScatterConfig {
    /// Numeric columns on the axes.
    pub num_columns_selected: Vec<ColumnRef>,
    /// Column mapped to color.
    pub color: Option<ColumnRef>,
    /// Scale used when `color` is numeric.
    pub num_color_scale_type: ColorScaleType,
    /// Column mapped to marker shape.
    pub shape: Option<ColumnRef>,
    /// Brushing mode.
    pub drag_mode: DragMode,
    /// Marker opacity.
    pub alpha_slider_val: f64,
    /// Marker size.
    pub size_slider_val: f64,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            num_columns_selected: Vec::new(),
            color: None,
            num_color_scale_type: ColorScaleType::Sequential,
            shape: None,
            drag_mode: DragMode::Rectangle,
            alpha_slider_val: 0.5,
            size_slider_val: 8.0,
        }
    }
}

/// Bar chart orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarDirection {
    /// Bars grow upwards.
    #[default]
    Vertical,
    /// Bars grow to the right.
    Horizontal,
}

/// How bars aggregate their rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarAggregate {
    /// Row count.
    #[default]
    Count,
    /// Minimum of the aggregate column.
    Min,
    /// Mean of the aggregate column.
    Avg,
    /// Median of the aggregate column.
    Median,
    /// Maximum of the aggregate column.
    Max,
}

/// Bar chart configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BarConfig {
    /// The categorical column forming the bars.
    pub cat_column_selected: Option<ColumnRef>,
    /// Column splitting bars into groups.
    pub group: Option<ColumnRef>,
    /// Column splitting the chart into small multiples.
    pub multiples: Option<ColumnRef>,
    /// Orientation.
    pub direction: BarDirection,
    /// Aggregation.
    pub aggregate_type: BarAggregate,
    /// Numeric column for non-count aggregations.
    pub aggregate_column: Option<ColumnRef>,
}

/// What violins are overlaid with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolinOverlay {
    /// Nothing.
    #[default]
    None,
    /// A box plot.
    Box,
    /// The individual points.
    Strip,
}

/// How multiple violins are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeparationMode {
    /// Side by side in one plot.
    #[default]
    Group,
    /// One plot per category.
    Facets,
}

/// Violin plot configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViolinConfig {
    /// Numeric columns shown as violins.
    pub num_columns_selected: Vec<ColumnRef>,
    /// Categorical columns splitting the violins.
    pub cat_columns_selected: Vec<ColumnRef>,
    /// Overlay drawn on each violin.
    pub violin_overlay: ViolinOverlay,
    /// Layout of multiple violins.
    pub multiples_mode: SeparationMode,
}

/// What a hexbin cell encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HexbinOptions {
    /// Majority category color.
    #[default]
    Color,
    /// Category pie chart.
    Pie,
    /// Plain bin counts.
    Bins,
}

/// Hexbin (density) plot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HexbinConfig {
    /// Numeric columns on the axes.
    pub num_columns_selected: Vec<ColumnRef>,
    /// Categorical column mapped to color.
    pub color: Option<ColumnRef>,
    /// Scale opacity by bin count.
    pub is_opacity_scale: bool,
    /// Scale hexagon size by bin count.
    pub is_size_scale: bool,
    /// Hexagon radius in pixels.
    pub hex_radius: u32,
    /// Brushing mode.
    pub drag_mode: DragMode,
    /// Cell encoding.
    pub hexbin_options: HexbinOptions,
}

impl Default for HexbinConfig {
    fn default() -> Self {
        Self {
            num_columns_selected: Vec::new(),
            color: None,
            is_opacity_scale: true,
            is_size_scale: false,
            hex_radius: 10,
            drag_mode: DragMode::Pan,
            hexbin_options: HexbinOptions::Color,
        }
    }
}

/// Sankey diagram configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SankeyConfig {
    /// Categorical columns forming the diagram's stages.
    pub cat_columns_selected: Vec<ColumnRef>,
}

/// Correlation matrix configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CorrelationConfig {
    /// Numeric columns in the matrix.
    pub num_columns_selected: Vec<ColumnRef>,
}

/// Configuration of a chart linked to the ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VisConfig {
    /// Scatter plot.
    Scatter(ScatterConfig),
    /// Bar chart.
    Bar(BarConfig),
    /// Violin plot.
    Violin(ViolinConfig),
    /// Hexbin plot.
    Hexbin(HexbinConfig),
    /// Sankey diagram.
    Sankey(SankeyConfig),
    /// Correlation matrix.
    Correlation(CorrelationConfig),
}

impl Default for VisConfig {
    fn default() -> Self {
        Self::Scatter(ScatterConfig::default())
    }
}

impl VisConfig {
    /// The chart kind as used in the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scatter(_) => "scatter",
            Self::Bar(_) => "bar",
            Self::Violin(_) => "violin",
            Self::Hexbin(_) => "hexbin",
            Self::Sankey(_) => "sankey",
            Self::Correlation(_) => "correlation",
        }
    }

    /// Fill default column choices from the available columns.
    ///
    /// Explicit choices are kept. Columns are considered in display order;
    /// defaults prefer the last matching columns.
    pub fn merge_defaults(self, columns: &[ColumnDescriptor]) -> Self {
        let numerical: Vec<&ColumnDescriptor> = columns.iter().filter(|c| is_numerical(c)).collect();
        let categorical: Vec<&ColumnDescriptor> =
            columns.iter().filter(|c| is_categorical(c)).collect();

        match self {
            Self::Scatter(mut config) => {
                pick_two_numerical(&mut config.num_columns_selected, &numerical);
                Self::Scatter(config)
            }
            Self::Hexbin(mut config) => {
                pick_two_numerical(&mut config.num_columns_selected, &numerical);
                Self::Hexbin(config)
            }
            Self::Violin(mut config) => {
                if config.num_columns_selected.is_empty()
                    && let Some(last) = numerical.last()
                {
                    config.num_columns_selected.push(ColumnRef::from(*last));
                }
                Self::Violin(config)
            }
            Self::Bar(mut config) => {
                if config.cat_column_selected.is_none() {
                    config.cat_column_selected = categorical.last().map(|c| ColumnRef::from(*c));
                }
                Self::Bar(config)
            }
            Self::Correlation(mut config) => {
                if config.num_columns_selected.is_empty() {
                    config.num_columns_selected =
                        numerical.iter().map(|c| ColumnRef::from(*c)).collect();
                }
                Self::Correlation(config)
            }
            Self::Sankey(config) => Self::Sankey(config),
        }
    }
}

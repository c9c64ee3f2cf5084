//! Column descriptors and column values.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::row::RowId;

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Numeric values, rendered as bars.
    #[default]
    Numeric,
    /// Categorical values.
    Categorical,
    /// The rank column.
    Rank,
    /// The selection checkbox column.
    Selection,
    /// Free text; the first string column is the row label.
    String,
    /// A computed score column.
    Score,
}

/// An sRGB color, serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Create a color from channels.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        Some(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("invalid color '{value}'"))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Immutable metadata of a column.
///
/// `id` is unique among attached columns. A descriptor without a `color`
/// receives one from the color allocator when it is added to a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Unique column id.
    pub id: String,
    /// Semantic type.
    #[serde(rename = "type", default)]
    pub kind: ColumnKind,
    /// Display label.
    pub label: String,
    /// Optional color mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    /// Marks computed score columns (they can be reloaded).
    #[serde(default)]
    pub is_score: bool,
    /// One-line summary shown in the column chooser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Longer description, used when no summary is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The source data field this column reads, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Provider-specific extra settings.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl ColumnDescriptor {
    /// Create a descriptor with the given id, kind and label.
    pub fn new(id: impl Into<String>, kind: ColumnKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            color: None,
            is_score: false,
            summary: None,
            description: None,
            column: None,
            extra: serde_json::Value::Null,
        }
    }

    /// Create a score column descriptor.
    pub fn score(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            is_score: true,
            ..Self::new(id, ColumnKind::Score, label)
        }
    }

    /// Set the color mapping.
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    /// Set the source data field.
    pub fn with_source_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Set the chooser summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// The text shown next to the label in the column chooser.
    pub fn chooser_hint(&self) -> Option<&str> {
        self.summary.as_deref().or(self.description.as_deref())
    }
}

/// A single computed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    /// Missing value.
    Missing,
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// Categorical or text value.
    Text(String),
}

impl ScoreValue {
    /// The numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for ScoreValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for ScoreValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for ScoreValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One `(row identity, value)` pair of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    /// The row identity.
    pub id: RowId,
    /// The computed value.
    #[serde(rename = "score", alias = "val")]
    pub value: ScoreValue,
}

impl ScoreRow {
    /// Create a score row.
    pub fn new(id: impl Into<RowId>, value: impl Into<ScoreValue>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// The values currently backing a column.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ColumnData {
    /// The value promise has not settled yet.
    #[default]
    Pending,
    /// Materialized values.
    Ready(Vec<ScoreRow>),
    /// The value promise failed; the column stays attached.
    Failed(String),
}

impl ColumnData {
    /// Returns true while values are outstanding.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The materialized values, if any.
    pub fn rows(&self) -> Option<&[ScoreRow]> {
        match self {
            Self::Ready(rows) => Some(rows),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_hex_round_trip() {
        let color = Color::from_hex("#1f77b4").unwrap();
        assert_eq!(color, Color::rgb(0x1f, 0x77, 0xb4));
        assert_eq!(color.to_string(), "#1f77b4");
        assert!(Color::from_hex("#12345").is_none());
        assert!(Color::from_hex("zzzzzz").is_none());
    }

    #[test]
    fn test_descriptor_deserializes_with_defaults() {
        let desc: ColumnDescriptor = serde_json::from_value(serde_json::json!({
            "id": "tpm",
            "type": "numeric",
            "label": "Expression",
            "color": "#ff7f0e",
        }))
        .unwrap();
        assert_eq!(desc.kind, ColumnKind::Numeric);
        assert_eq!(desc.color, Some(Color::rgb(0xff, 0x7f, 0x0e)));
        assert!(!desc.is_score);
        assert_eq!(desc.chooser_hint(), None);
    }

    #[test]
    fn test_score_rows_accept_val_alias() {
        let rows: Vec<ScoreRow> = serde_json::from_value(serde_json::json!([
            {"id": "r1", "val": 5.0},
            {"id": "r2", "score": "high"},
            {"id": "r3", "score": null},
        ]))
        .unwrap();
        assert_eq!(rows[0], ScoreRow::new("r1", 5.0));
        assert_eq!(rows[1].value, ScoreValue::Text("high".into()));
        assert_eq!(rows[2].value, ScoreValue::Missing);
    }
}

//! Row identities, row order and grid positions.
//!
//! A [`RowId`] is the stable key of a data row. The grid reorders, groups and
//! filters rows at will; what it reports back are *positions*, indices into
//! the current [`RowOrder`]. Grid engines hand positions over either as plain
//! index vectors or as fixed-width unsigned arrays; [`RowPositions`]
//! normalizes all of them into one `Vec<usize>` before any translation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable identity of a data row, independent of its display position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    /// Create a row id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The identity space rows belong to (e.g. `"Ensembl"`, `"Cellline"`).
///
/// Selections only compare equal when they share an id type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdType(String);

impl IdType {
    /// Create an id type.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The id type name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// The current sequence of row identities after sort, group and filter.
///
/// Owned by the grid; the engine only reads it. Cloning is cheap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowOrder {
    ids: Arc<[RowId]>,
}

impl RowOrder {
    /// Create a row order from identities in display order.
    pub fn new(ids: impl IntoIterator<Item = RowId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Number of rows currently visible.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no row passes the current filter.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The identity at a display position.
    pub fn get(&self, position: usize) -> Option<&RowId> {
        self.ids.get(position)
    }

    /// All identities in display order.
    pub fn ids(&self) -> &[RowId] {
        &self.ids
    }

    /// Map every identity to its display position.
    pub fn position_index(&self) -> HashMap<&RowId, usize> {
        self.ids.iter().enumerate().map(|(pos, id)| (id, pos)).collect()
    }
}

impl<T: Into<RowId>> FromIterator<T> for RowOrder {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into))
    }
}

/// Positions reported by the grid, in any of the encodings grid engines use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowPositions {
    /// A plain index vector.
    Plain(Vec<usize>),
    /// Compact 8-bit indices (small tables).
    U8(Vec<u8>),
    /// Compact 16-bit indices.
    U16(Vec<u16>),
    /// Compact 32-bit indices.
    U32(Vec<u32>),
}

impl RowPositions {
    /// Convert into the canonical ordered index sequence.
    pub fn normalize(self) -> Vec<usize> {
        match self {
            Self::Plain(positions) => positions,
            Self::U8(positions) => positions.into_iter().map(usize::from).collect(),
            Self::U16(positions) => positions.into_iter().map(usize::from).collect(),
            Self::U32(positions) => positions.into_iter().map(|p| p as usize).collect(),
        }
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        match self {
            Self::Plain(p) => p.len(),
            Self::U8(p) => p.len(),
            Self::U16(p) => p.len(),
            Self::U32(p) => p.len(),
        }
    }

    /// Returns true if there are no positions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<usize>> for RowPositions {
    fn from(positions: Vec<usize>) -> Self {
        Self::Plain(positions)
    }
}

impl From<&[usize]> for RowPositions {
    fn from(positions: &[usize]) -> Self {
        Self::Plain(positions.to_vec())
    }
}

impl From<Vec<u8>> for RowPositions {
    fn from(positions: Vec<u8>) -> Self {
        Self::U8(positions)
    }
}

impl From<Vec<u16>> for RowPositions {
    fn from(positions: Vec<u16>) -> Self {
        Self::U16(positions)
    }
}

impl From<Vec<u32>> for RowPositions {
    fn from(positions: Vec<u32>) -> Self {
        Self::U32(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_positions_normalize_identically() {
        let plain = RowPositions::from(vec![0usize, 2, 7]).normalize();
        assert_eq!(RowPositions::from(vec![0u8, 2, 7]).normalize(), plain);
        assert_eq!(RowPositions::from(vec![0u16, 2, 7]).normalize(), plain);
        assert_eq!(RowPositions::from(vec![0u32, 2, 7]).normalize(), plain);
    }

    #[test]
    fn test_row_order_lookup() {
        let order: RowOrder = ["r3", "r1", "r2"].into_iter().collect();
        assert_eq!(order.len(), 3);
        assert_eq!(order.get(0), Some(&RowId::from("r3")));
        assert_eq!(order.get(3), None);
        assert_eq!(order.position_index()[&RowId::from("r2")], 2);
    }
}

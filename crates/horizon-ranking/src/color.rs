//! Column color allocation.
//!
//! Columns without an explicit color mapping get one from a [`ColorAllocator`]
//! keyed by column id. Removing a column frees its color so the palette does
//! not run dry while users add and remove score columns.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::model::Color;

/// Assigns colors to columns by id.
pub trait ColorAllocator: Send + Sync {
    /// The color for a column, allocating one on first request.
    fn column_color(&self, id: &str) -> Color;

    /// Release the color assigned to a column id.
    fn free_column_color(&self, id: &str);
}

/// The default categorical palette.
pub const DEFAULT_PALETTE: [Color; 10] = [
    Color::rgb(0x1f, 0x77, 0xb4),
    Color::rgb(0xff, 0x7f, 0x0e),
    Color::rgb(0x2c, 0xa0, 0x2c),
    Color::rgb(0xd6, 0x27, 0x28),
    Color::rgb(0x94, 0x67, 0xbd),
    Color::rgb(0x8c, 0x56, 0x4b),
    Color::rgb(0xe3, 0x77, 0xc2),
    Color::rgb(0x7f, 0x7f, 0x7f),
    Color::rgb(0xbc, 0xbd, 0x22),
    Color::rgb(0x17, 0xbe, 0xcf),
];

#[derive(Debug, Default)]
struct ColorState {
    /// Palette index per column id.
    assigned: HashMap<String, usize>,
    /// How many columns currently use each palette entry.
    usage: Vec<usize>,
}

/// Palette-based allocator.
///
/// An id keeps its color until freed; new ids get the least-used palette
/// entry, lowest index first.
#[derive(Debug)]
pub struct ColumnColors {
    palette: Vec<Color>,
    state: Mutex<ColorState>,
}

impl Default for ColumnColors {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnColors {
    /// Create an allocator over [`DEFAULT_PALETTE`].
    pub fn new() -> Self {
        Self::with_palette(DEFAULT_PALETTE.to_vec())
    }

    /// Create an allocator over a custom palette.
    ///
    /// An empty palette falls back to [`DEFAULT_PALETTE`].
    pub fn with_palette(palette: Vec<Color>) -> Self {
        let palette = if palette.is_empty() {
            DEFAULT_PALETTE.to_vec()
        } else {
            palette
        };
        let usage = vec![0; palette.len()];
        Self {
            palette,
            state: Mutex::new(ColorState {
                assigned: HashMap::new(),
                usage,
            }),
        }
    }

    /// Number of column ids currently holding a color.
    pub fn assigned_count(&self) -> usize {
        self.state.lock().assigned.len()
    }
}

impl ColorAllocator for ColumnColors {
    fn column_color(&self, id: &str) -> Color {
        let mut state = self.state.lock();
        if let Some(&index) = state.assigned.get(id) {
            return self.palette[index];
        }
        let index = state
            .usage
            .iter()
            .enumerate()
            .min_by_key(|&(index, used)| (*used, index))
            .map_or(0, |(index, _)| index);
        state.usage[index] += 1;
        state.assigned.insert(id.to_string(), index);
        self.palette[index]
    }

    fn free_column_color(&self, id: &str) {
        let mut state = self.state.lock();
        if let Some(index) = state.assigned.remove(id) {
            state.usage[index] = state.usage[index].saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_id_keeps_color() {
        let colors = ColumnColors::new();
        let first = colors.column_color("score1");
        assert_eq!(colors.column_color("score1"), first);
        assert_eq!(colors.assigned_count(), 1);
    }

    #[test]
    fn test_freed_color_is_reused_first() {
        let colors = ColumnColors::new();
        let a = colors.column_color("a");
        let b = colors.column_color("b");
        assert_ne!(a, b);

        colors.free_column_color("a");
        colors.free_column_color("a");
        assert_eq!(colors.column_color("c"), a);
    }

    #[test]
    fn test_palette_wraps_to_least_used() {
        let colors = ColumnColors::with_palette(vec![Color::rgb(1, 1, 1), Color::rgb(2, 2, 2)]);
        colors.column_color("a");
        colors.column_color("b");
        assert_eq!(colors.column_color("c"), Color::rgb(1, 1, 1));
        assert_eq!(colors.column_color("d"), Color::rgb(2, 2, 2));
    }
}

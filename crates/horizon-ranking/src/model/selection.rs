//! Selection synchronization between the grid and the rest of the page.
//!
//! The grid thinks in *positions*; everything else thinks in row
//! *identities*. [`SelectionBridge`] keeps the canonical selection of every
//! [`SelectionChannel`] as a set of [`RowId`]s and translates in both
//! directions through the grid's current [`RowOrder`], so a selection
//! survives any sort, group or filter.
//!
//! Feedback loops are cut by comparing identity sets: highlighting a
//! selection in the grid makes the grid report it back, and that echo is
//! recognized as unchanged and dropped.
//!
//! # Example
//!
//! ```ignore
//! use horizon_ranking::model::{Selection, SelectionBridge, SelectionChannel};
//!
//! let bridge = SelectionBridge::new(grid, "Ensembl".into()).with_bus(bus);
//! bridge.set_rows(["r1", "r2", "r3"]);
//!
//! bridge.item_selection_changed.connect(|transition| {
//!     println!("selection: {transition:?}");
//! });
//!
//! // Grid reported positions 0 and 2 on the default channel.
//! bridge.on_selection_changed(&SelectionChannel::Default, vec![0u32, 2]);
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use horizon_ranking_core::Signal;
use horizon_ranking_core::logging::targets;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::row::{IdType, RowId, RowOrder, RowPositions};

/// The grid engine rendering the rows.
pub trait GridEngine: Send + Sync {
    /// The current row order after sort, group and filter.
    fn row_order(&self) -> RowOrder;

    /// Highlight the rows at the given positions on a channel.
    fn highlight(&self, channel: &SelectionChannel, positions: &[usize]);

    /// Re-render after columns or rows changed.
    fn refresh(&self) {}
}

/// Page-wide notification bus for selections of an identity space.
///
/// Fire and forget; no acknowledgment.
pub trait SelectionBus: Send + Sync {
    /// Rows of `id_type` were selected.
    fn select(&self, id_type: &IdType, ids: &HashSet<RowId>);

    /// The selection of `id_type` was cleared.
    fn clear(&self, id_type: &IdType);
}

/// A named partition of the selection state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SelectionChannel {
    /// The primary selection, shared with other visualizations.
    #[default]
    Default,
    /// An additional selection used for cross-linking.
    Named(String),
}

impl SelectionChannel {
    /// Create a named channel.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Returns true for the default channel.
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl fmt::Display for SelectionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// A set of selected row identities within one identity space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// The identity space of `ids`.
    pub id_type: IdType,
    /// The selected rows.
    pub ids: HashSet<RowId>,
}

impl Selection {
    /// Create a selection.
    pub fn new<I, T>(id_type: IdType, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RowId>,
    {
        Self {
            id_type,
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// An empty selection.
    pub fn empty(id_type: IdType) -> Self {
        Self {
            id_type,
            ids: HashSet::new(),
        }
    }

    /// Returns true if no row is selected.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of selected rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the row is selected.
    pub fn contains(&self, id: &RowId) -> bool {
        self.ids.contains(id)
    }
}

/// Payload of [`SelectionBridge::item_selected`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionEvent {
    /// The channel that changed.
    pub channel: SelectionChannel,
    /// The selection before the change.
    pub previous: Selection,
    /// The selection after the change.
    pub current: Selection,
}

/// Payload of [`SelectionBridge::item_selection_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionTransition {
    /// The selection went from empty to non-empty.
    Selected {
        /// The channel that changed.
        channel: SelectionChannel,
        /// The new selection.
        selection: Selection,
    },
    /// A non-empty selection was replaced by another non-empty one.
    Changed {
        /// The channel that changed.
        channel: SelectionChannel,
        /// The new selection.
        selection: Selection,
    },
    /// The selection became empty.
    Cleared {
        /// The channel that changed.
        channel: SelectionChannel,
        /// The identity space that was cleared.
        id_type: IdType,
    },
}

impl SelectionTransition {
    fn classify(channel: SelectionChannel, previous: &Selection, current: &Selection) -> Option<Self> {
        match (previous.is_empty(), current.is_empty()) {
            (true, true) => None,
            (true, false) => Some(Self::Selected {
                channel,
                selection: current.clone(),
            }),
            (false, false) => Some(Self::Changed {
                channel,
                selection: current.clone(),
            }),
            (false, true) => Some(Self::Cleared {
                channel,
                id_type: current.id_type.clone(),
            }),
        }
    }
}

#[derive(Default)]
struct BridgeState {
    /// Every known row identity, including rows filtered out of the grid.
    known: HashSet<RowId>,
    channels: HashMap<SelectionChannel, Selection>,
}

/// Keeps identity-based selections in sync with the grid and the page.
///
/// The bridge is the only mutator of the selection state. All outward calls
/// (grid, bus, signals) happen after the internal lock is released, so a grid
/// that reports highlights back synchronously re-enters safely.
pub struct SelectionBridge {
    grid: Arc<dyn GridEngine>,
    bus: Option<Arc<dyn SelectionBus>>,
    id_type: IdType,
    state: Mutex<BridgeState>,

    /// Emitted on every accepted selection change, on any channel.
    pub item_selected: Signal<SelectionEvent>,

    /// Emitted when a selection is set, changed or cleared.
    ///
    /// Not emitted for an empty to empty transition.
    pub item_selection_changed: Signal<SelectionTransition>,
}

impl SelectionBridge {
    /// Create a bridge for a grid showing rows of `id_type`.
    pub fn new(grid: Arc<dyn GridEngine>, id_type: IdType) -> Self {
        Self {
            grid,
            bus: None,
            id_type,
            state: Mutex::new(BridgeState::default()),
            item_selected: Signal::new(),
            item_selection_changed: Signal::new(),
        }
    }

    /// Publish default-channel changes on a page-wide bus.
    pub fn with_bus(mut self, bus: Arc<dyn SelectionBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The identity space of the rows.
    pub fn id_type(&self) -> &IdType {
        &self.id_type
    }

    /// The grid engine.
    pub fn grid(&self) -> &Arc<dyn GridEngine> {
        &self.grid
    }

    /// Replace the full row identity set.
    pub fn set_rows<I, T>(&self, ids: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<RowId>,
    {
        let known: HashSet<RowId> = ids.into_iter().map(Into::into).collect();
        tracing::debug!(target: targets::SELECTION, rows = known.len(), "row identities replaced");
        self.state.lock().known = known;
    }

    /// Number of known row identities.
    pub fn row_count(&self) -> usize {
        self.state.lock().known.len()
    }

    /// The stored selection of a channel.
    pub fn item_selection(&self, channel: &SelectionChannel) -> Selection {
        self.state
            .lock()
            .channels
            .get(channel)
            .cloned()
            .unwrap_or_else(|| Selection::empty(self.id_type.clone()))
    }

    /// Apply a selection pushed from outside the grid.
    ///
    /// Selections of another id type are ignored. Unknown identities are
    /// dropped. An identity set equal to the stored one is a no-op; otherwise
    /// it is stored and highlighted. Nothing is published: the caller already
    /// knows.
    pub fn set_item_selection(&self, channel: &SelectionChannel, selection: Selection) {
        if selection.id_type != self.id_type {
            tracing::warn!(
                target: targets::SELECTION,
                channel = %channel,
                expected = %self.id_type,
                got = %selection.id_type,
                "ignoring selection of another id type"
            );
            return;
        }
        let selection = {
            let mut state = self.state.lock();
            let before = selection.len();
            let ids: HashSet<RowId> = selection
                .ids
                .into_iter()
                .filter(|id| state.known.contains(id))
                .collect();
            if ids.len() < before {
                tracing::debug!(
                    target: targets::SELECTION,
                    channel = %channel,
                    dropped = before - ids.len(),
                    "ignoring unknown row identities"
                );
            }
            let selection = Selection {
                id_type: selection.id_type,
                ids,
            };

            if state.channels.get(channel) == Some(&selection) {
                tracing::trace!(target: targets::SELECTION, channel = %channel, "selection unchanged");
                return;
            }
            state.channels.insert(channel.clone(), selection.clone());
            selection
        };

        let positions = self.positions_of(&selection);
        tracing::debug!(
            target: targets::SELECTION,
            channel = %channel,
            rows = selection.len(),
            visible = positions.len(),
            "applying item selection"
        );
        self.grid.highlight(channel, &positions);
    }

    /// Handle a selection reported by the grid.
    ///
    /// Positions are translated through the current row order. Positions only
    /// cover visible rows, so selected rows outside the current order stay
    /// selected. An unchanged identity set (typically the echo of
    /// [`set_item_selection`]) is suppressed.
    ///
    /// [`set_item_selection`]: Self::set_item_selection
    pub fn on_selection_changed(&self, channel: &SelectionChannel, positions: impl Into<RowPositions>) {
        let order = self.grid.row_order();
        let picked = translate(&order, positions.into());

        let (previous, current) = {
            let mut state = self.state.lock();
            let previous = state
                .channels
                .get(channel)
                .cloned()
                .unwrap_or_else(|| Selection::empty(self.id_type.clone()));

            let visible: HashSet<&RowId> = order.ids().iter().collect();
            let mut ids = picked;
            ids.extend(
                previous
                    .ids
                    .iter()
                    .filter(|id| !visible.contains(id))
                    .cloned(),
            );
            let current = Selection {
                id_type: self.id_type.clone(),
                ids,
            };

            if previous == current {
                tracing::trace!(target: targets::SELECTION, channel = %channel, "suppressing selection echo");
                return;
            }
            state.channels.insert(channel.clone(), current.clone());
            (previous, current)
        };

        tracing::debug!(
            target: targets::SELECTION,
            channel = %channel,
            previous = previous.len(),
            current = current.len(),
            "grid selection changed"
        );

        if channel.is_default()
            && let Some(bus) = &self.bus
        {
            if current.is_empty() {
                bus.clear(&current.id_type);
            } else {
                bus.select(&current.id_type, &current.ids);
            }
        }

        let transition = SelectionTransition::classify(channel.clone(), &previous, &current);
        self.item_selected.emit(SelectionEvent {
            channel: channel.clone(),
            previous,
            current,
        });
        if let Some(transition) = transition {
            self.item_selection_changed.emit(transition);
        }
    }

    /// Translate grid positions into row identities.
    ///
    /// Every position encoding yields the same result; out-of-range positions
    /// are ignored.
    pub fn row_ids_as_set(&self, positions: impl Into<RowPositions>) -> HashSet<RowId> {
        translate(&self.grid.row_order(), positions.into())
    }

    /// Positions of the selected rows in the current row order, ascending.
    ///
    /// Selected rows not in the current order are skipped.
    pub fn positions_of(&self, selection: &Selection) -> Vec<usize> {
        let order = self.grid.row_order();
        order
            .ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| selection.contains(id))
            .map(|(position, _)| position)
            .collect()
    }

    /// Re-highlight every stored selection from its identities.
    ///
    /// Call after the grid reordered, regrouped or refiltered its rows.
    pub fn reapply(&self) {
        let channels: Vec<(SelectionChannel, Selection)> = self
            .state
            .lock()
            .channels
            .iter()
            .map(|(channel, selection)| (channel.clone(), selection.clone()))
            .collect();
        for (channel, selection) in channels {
            let positions = self.positions_of(&selection);
            self.grid.highlight(&channel, &positions);
        }
    }
}

fn translate(order: &RowOrder, positions: RowPositions) -> HashSet<RowId> {
    positions
        .normalize()
        .into_iter()
        .filter_map(|position| order.get(position).cloned())
        .collect()
}

impl fmt::Debug for SelectionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SelectionBridge")
            .field("id_type", &self.id_type)
            .field("rows", &state.known.len())
            .field("channels", &state.channels.len())
            .finish()
    }
}

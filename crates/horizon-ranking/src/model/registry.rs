//! The column registry.
//!
//! [`ColumnRegistry`] owns the ordered set of attached columns: their
//! descriptors, their current values and their visibility. Columns are
//! visible in the registry the moment they are added, even while their values
//! are still [`ColumnData::Pending`].
//!
//! # Signals
//!
//! - `column_added`: a column was attached
//! - `column_removed`: a column was detached
//! - `column_updated`: a column's values or visibility changed
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_ranking::color::ColumnColors;
//! use horizon_ranking::model::{ColumnData, ColumnDescriptor, ColumnKind, ColumnRegistry};
//!
//! let registry = ColumnRegistry::new(Arc::new(ColumnColors::new()));
//! let handle = registry
//!     .add_column(ColumnDescriptor::new("name", ColumnKind::String, "Name"), ColumnData::Pending, None)
//!     .unwrap();
//! assert!(registry.contains(handle));
//! assert!(registry.remove_column(handle));
//! assert!(!registry.remove_column(handle));
//! ```

use std::sync::Arc;

use horizon_ranking_core::Signal;
use horizon_ranking_core::logging::targets;
use parking_lot::RwLock;
use slotmap::{SlotMap, new_key_type};

use super::column::{ColumnData, ColumnDescriptor};
use crate::color::ColorAllocator;
use crate::error::RegistryError;

new_key_type! {
    /// Handle to an attached column.
    ///
    /// Handles are generational: once a column is removed its handle never
    /// refers to another column, so stale handles are harmless.
    pub struct ColumnHandle;
}

/// Payload of the registry's change signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChange {
    /// The affected column.
    pub handle: ColumnHandle,
    /// The affected column's id.
    pub id: String,
}

/// A lightweight view of an attached column.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// The column's handle.
    pub handle: ColumnHandle,
    /// The column's descriptor.
    pub descriptor: Arc<ColumnDescriptor>,
    /// Whether the column is currently shown.
    pub visible: bool,
    /// Whether the column's values are still outstanding.
    pub pending: bool,
}

struct ColumnEntry {
    descriptor: Arc<ColumnDescriptor>,
    data: ColumnData,
    visible: bool,
}

#[derive(Default)]
struct RegistryInner {
    entries: SlotMap<ColumnHandle, ColumnEntry>,
    /// Display order of attached columns.
    order: Vec<ColumnHandle>,
}

/// Ordered set of attached columns.
///
/// The registry is the only mutator of attached columns. Every mutation fires
/// its signal after the internal lock has been released, so slots may query
/// the registry.
pub struct ColumnRegistry {
    inner: RwLock<RegistryInner>,
    colors: Arc<dyn ColorAllocator>,

    /// Emitted after a column was attached.
    pub column_added: Signal<ColumnChange>,

    /// Emitted after a column was detached.
    pub column_removed: Signal<ColumnChange>,

    /// Emitted after a column's values or visibility changed.
    pub column_updated: Signal<ColumnChange>,
}

impl ColumnRegistry {
    /// Create an empty registry using the given color allocator.
    pub fn new(colors: Arc<dyn ColorAllocator>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            colors,
            column_added: Signal::new(),
            column_removed: Signal::new(),
            column_updated: Signal::new(),
        }
    }

    /// The color allocator columns draw from.
    pub fn colors(&self) -> &Arc<dyn ColorAllocator> {
        &self.colors
    }

    /// Attach a column.
    ///
    /// The column is visible immediately. `position` is clamped to the current
    /// column count; `None` appends. A descriptor without a color receives one
    /// from the color allocator.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::DuplicateColumn`] if a column with the same
    /// id is still attached.
    pub fn add_column(
        &self,
        mut descriptor: ColumnDescriptor,
        initial: ColumnData,
        position: Option<usize>,
    ) -> Result<ColumnHandle, RegistryError> {
        let mut inner = self.inner.write();

        if inner
            .entries
            .values()
            .any(|entry| entry.descriptor.id == descriptor.id)
        {
            tracing::warn!(target: targets::REGISTRY, column = %descriptor.id, "rejecting duplicate column id");
            return Err(RegistryError::DuplicateColumn { id: descriptor.id });
        }

        if descriptor.color.is_none() {
            descriptor.color = Some(self.colors.column_color(&descriptor.id));
        }

        let id = descriptor.id.clone();
        let handle = inner.entries.insert(ColumnEntry {
            descriptor: Arc::new(descriptor),
            data: initial,
            visible: true,
        });
        let index = position.map_or(inner.order.len(), |p| p.min(inner.order.len()));
        inner.order.insert(index, handle);
        drop(inner);

        tracing::debug!(target: targets::REGISTRY, column = %id, position = index, "column added");
        self.column_added.emit(ColumnChange { handle, id });
        Ok(handle)
    }

    /// Detach a column.
    ///
    /// Returns `false` if the column was already removed; removing twice is a
    /// no-op. Frees the color assigned to the column id.
    pub fn remove_column(&self, handle: ColumnHandle) -> bool {
        let mut inner = self.inner.write();
        let Some(entry) = inner.entries.remove(handle) else {
            return false;
        };
        inner.order.retain(|&h| h != handle);
        drop(inner);

        let id = entry.descriptor.id.clone();
        self.colors.free_column_color(&id);

        tracing::debug!(target: targets::REGISTRY, column = %id, "column removed");
        self.column_removed.emit(ColumnChange { handle, id });
        true
    }

    /// Returns true while the column is attached.
    pub fn contains(&self, handle: ColumnHandle) -> bool {
        self.inner.read().entries.contains_key(handle)
    }

    /// The descriptor of an attached column.
    pub fn descriptor(&self, handle: ColumnHandle) -> Option<Arc<ColumnDescriptor>> {
        self.inner
            .read()
            .entries
            .get(handle)
            .map(|entry| entry.descriptor.clone())
    }

    /// A copy of the column's current values.
    pub fn data(&self, handle: ColumnHandle) -> Option<ColumnData> {
        self.with_data(handle, ColumnData::clone)
    }

    /// Access the column's values without cloning them.
    pub fn with_data<R>(&self, handle: ColumnHandle, f: impl FnOnce(&ColumnData) -> R) -> Option<R> {
        self.inner.read().entries.get(handle).map(|entry| f(&entry.data))
    }

    /// Replace the column's values.
    pub fn set_data(&self, handle: ColumnHandle, data: ColumnData) -> Result<(), RegistryError> {
        let change = self.replace_data(handle, data)?;
        self.column_updated.emit(change);
        Ok(())
    }

    /// Replace the column's values without notifying; the caller emits
    /// `column_updated` once it has released its own locks.
    pub(crate) fn replace_data(
        &self,
        handle: ColumnHandle,
        data: ColumnData,
    ) -> Result<ColumnChange, RegistryError> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .get_mut(handle)
            .ok_or(RegistryError::UnknownColumn)?;
        entry.data = data;
        Ok(ColumnChange {
            handle,
            id: entry.descriptor.id.clone(),
        })
    }

    /// Show or hide a column. Returns whether the visibility changed.
    pub fn set_visible(&self, handle: ColumnHandle, visible: bool) -> Result<bool, RegistryError> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .get_mut(handle)
            .ok_or(RegistryError::UnknownColumn)?;
        if entry.visible == visible {
            return Ok(false);
        }
        entry.visible = visible;
        let id = entry.descriptor.id.clone();
        drop(inner);

        self.column_updated.emit(ColumnChange { handle, id });
        Ok(true)
    }

    /// Whether an attached column is shown.
    pub fn is_visible(&self, handle: ColumnHandle) -> Option<bool> {
        self.inner.read().entries.get(handle).map(|entry| entry.visible)
    }

    /// The display position of an attached column.
    pub fn position_of(&self, handle: ColumnHandle) -> Option<usize> {
        self.inner.read().order.iter().position(|&h| h == handle)
    }

    /// Find an attached column by id.
    pub fn find_by_id(&self, id: &str) -> Option<ColumnHandle> {
        self.inner
            .read()
            .entries
            .iter()
            .find(|(_, entry)| entry.descriptor.id == id)
            .map(|(handle, _)| handle)
    }

    /// All attached columns in display order.
    pub fn columns(&self) -> Vec<ColumnInfo> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|&handle| {
                inner.entries.get(handle).map(|entry| ColumnInfo {
                    handle,
                    descriptor: entry.descriptor.clone(),
                    visible: entry.visible,
                    pending: entry.data.is_pending(),
                })
            })
            .collect()
    }

    /// Number of attached columns.
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// Returns true if no column is attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ColumnRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        let ids: Vec<&str> = inner
            .order
            .iter()
            .filter_map(|&h| inner.entries.get(h).map(|e| e.descriptor.id.as_str()))
            .collect();
        f.debug_struct("ColumnRegistry").field("columns", &ids).finish()
    }
}

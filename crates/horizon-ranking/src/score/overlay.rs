//! Column header overlays.

use std::collections::HashMap;

use horizon_ranking_core::Signal;
use parking_lot::Mutex;

use crate::auth::{AuthorizationRender, AuthorizationStatus, AuthorizationTrigger};
use crate::model::ColumnHandle;

/// What a column header shows while its score is not available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderOverlay {
    /// Authorization in progress (spinner).
    Pending,
    /// Authorization required; clicking starts it (lock icon).
    Locked {
        /// Name of the required authorization.
        name: String,
    },
    /// Authorization or computation failed; clicking retries.
    Error {
        /// The error text.
        message: String,
    },
}

impl HeaderOverlay {
    /// The overlay for an authorization render call.
    ///
    /// `None` means the overlay must be removed. An error reported outside the
    /// authorizer (e.g. a rejected token) takes precedence over the status.
    pub fn from_render(render: &AuthorizationRender, outside_error: Option<&str>) -> Option<Self> {
        if render.status == AuthorizationStatus::Success {
            return None;
        }
        if let Some(message) = render.error.as_deref().or(outside_error) {
            return Some(Self::Error {
                message: message.to_string(),
            });
        }
        Some(match render.status {
            AuthorizationStatus::Pending => Self::Pending,
            _ => Self::Locked {
                name: render.config.name.clone(),
            },
        })
    }
}

/// Payload of [`OverlayBoard::overlay_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayChange {
    /// The column whose header changed.
    pub handle: ColumnHandle,
    /// The new overlay; `None` if it was removed.
    pub overlay: Option<HeaderOverlay>,
}

struct OverlayEntry {
    overlay: HeaderOverlay,
    trigger: AuthorizationTrigger,
}

/// Current header overlays of all columns.
pub struct OverlayBoard {
    overlays: Mutex<HashMap<ColumnHandle, OverlayEntry>>,

    /// Emitted when an overlay is shown, replaced or removed.
    pub overlay_changed: Signal<OverlayChange>,
}

impl Default for OverlayBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayBoard {
    /// Create an empty board.
    pub fn new() -> Self {
        Self {
            overlays: Mutex::new(HashMap::new()),
            overlay_changed: Signal::new(),
        }
    }

    /// Show an overlay with a click action on a column header.
    pub fn show(&self, handle: ColumnHandle, overlay: HeaderOverlay, trigger: AuthorizationTrigger) {
        let previous = self.overlays.lock().insert(
            handle,
            OverlayEntry {
                overlay: overlay.clone(),
                trigger,
            },
        );
        if previous.is_some_and(|entry| entry.overlay == overlay) {
            return;
        }
        self.overlay_changed.emit(OverlayChange {
            handle,
            overlay: Some(overlay),
        });
    }

    /// Remove a column's overlay. Returns whether one was shown.
    pub fn clear(&self, handle: ColumnHandle) -> bool {
        let removed = self.overlays.lock().remove(&handle).is_some();
        if removed {
            self.overlay_changed.emit(OverlayChange {
                handle,
                overlay: None,
            });
        }
        removed
    }

    /// The overlay currently shown on a column header.
    pub fn overlay(&self, handle: ColumnHandle) -> Option<HeaderOverlay> {
        self.overlays
            .lock()
            .get(&handle)
            .map(|entry| entry.overlay.clone())
    }

    /// Click a column's overlay. Returns whether an overlay was shown.
    pub fn trigger(&self, handle: ColumnHandle) -> bool {
        let trigger = self
            .overlays
            .lock()
            .get(&handle)
            .map(|entry| entry.trigger.clone());
        match trigger {
            Some(trigger) => {
                trigger.fire();
                true
            }
            None => false,
        }
    }

    /// Number of headers showing an overlay.
    pub fn len(&self) -> usize {
        self.overlays.lock().len()
    }

    /// Returns true if no header shows an overlay.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for OverlayBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayBoard")
            .field("overlays", &self.len())
            .finish()
    }
}

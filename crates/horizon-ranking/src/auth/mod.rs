//! Authorization of score computations.
//!
//! Score capabilities may require one or more [`AuthorizationConfig`]s to be
//! satisfied before they can be invoked. An [`Authorizer`] drives the
//! authorization and reports progress through a render callback, which the
//! score pipeline turns into a header overlay. [`TokenManager`] is the
//! bundled implementation.

mod token;

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use token::{AuthorizationFlow, TokenManager, TokenState, TokenStore};

/// A named requirement that must be satisfied before a score may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Unique id; also the id of the token it yields.
    pub id: String,
    /// Human-readable name shown in the header overlay.
    pub name: String,
    /// Whether the flow must be started by the user (e.g. a login popup).
    #[serde(default)]
    pub interactive: bool,
    /// Flow-specific settings.
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl AuthorizationConfig {
    /// Create a configuration that authorizes without user interaction.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            interactive: false,
            extra: serde_json::Value::Null,
        }
    }

    /// Require a user action before the flow starts.
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }
}

/// Progress of one authorization configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    /// The flow is running.
    Pending,
    /// A valid token is available.
    Success,
    /// Not authorized. With an error the flow failed; without one it waits
    /// for the user to trigger it.
    Error,
}

/// A cloneable click handler that (re)starts an authorization.
#[derive(Clone)]
pub struct AuthorizationTrigger {
    action: Arc<dyn Fn() + Send + Sync>,
}

impl AuthorizationTrigger {
    /// Wrap an action.
    pub fn new<F>(action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            action: Arc::new(action),
        }
    }

    /// A trigger that does nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Invoke the action.
    pub fn fire(&self) {
        (self.action)();
    }
}

impl fmt::Debug for AuthorizationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationTrigger")
    }
}

/// One render call of an authorization in progress.
#[derive(Debug, Clone)]
pub struct AuthorizationRender {
    /// The configuration being authorized.
    pub config: Arc<AuthorizationConfig>,
    /// Its current status.
    pub status: AuthorizationStatus,
    /// The failure, if the last attempt failed.
    pub error: Option<String>,
    /// Restarts the authorization.
    pub trigger: AuthorizationTrigger,
}

/// Receives authorization progress.
pub type RenderCallback = Arc<dyn Fn(AuthorizationRender) + Send + Sync>;

/// The authorization collaborator.
pub trait Authorizer: Send + Sync {
    /// Authorize every configuration.
    ///
    /// Drives `render` while authorizing; resolves once all configurations
    /// hold a valid token. A failed configuration keeps the future pending
    /// until the user fires the rendered trigger and the retry succeeds.
    fn request_authorizations(
        &self,
        configs: Vec<AuthorizationConfig>,
        render: RenderCallback,
    ) -> BoxFuture<'static, ()>;

    /// Mark tokens as stale so the next request re-authorizes.
    fn invalidate_token(&self, token_ids: &[String]);
}

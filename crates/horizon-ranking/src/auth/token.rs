//! Token bookkeeping and the bundled [`Authorizer`].

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use horizon_ranking_core::logging::targets;
use parking_lot::RwLock;
use tokio::sync::Notify;

use super::{
    AuthorizationConfig, AuthorizationRender, AuthorizationStatus, AuthorizationTrigger,
    Authorizer, RenderCallback,
};
use crate::error::AuthorizationError;

/// Obtains a token for one configuration (login popup, device flow, ...).
pub trait AuthorizationFlow: Send + Sync {
    /// Run the flow.
    fn authorize(
        &self,
        config: &AuthorizationConfig,
    ) -> BoxFuture<'static, Result<String, AuthorizationError>>;
}

/// Known state of one token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenState {
    /// The last token obtained, valid or not.
    pub token: Option<String>,
    /// Whether the token may be used.
    pub valid: bool,
    /// The last flow failure.
    pub last_error: Option<String>,
}

/// Authorization token state keyed by configuration id.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: RwLock<HashMap<String, TokenState>>,
}

impl TokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The token for `id`, if it is valid.
    pub fn valid_token(&self, id: &str) -> Option<String> {
        self.tokens
            .read()
            .get(id)
            .filter(|state| state.valid)
            .and_then(|state| state.token.clone())
    }

    /// A snapshot of the state of `id`.
    pub fn state(&self, id: &str) -> Option<TokenState> {
        self.tokens.read().get(id).cloned()
    }

    /// Store a freshly obtained token.
    pub fn store(&self, id: &str, token: impl Into<String>) {
        self.tokens.write().insert(
            id.to_string(),
            TokenState {
                token: Some(token.into()),
                valid: true,
                last_error: None,
            },
        );
    }

    /// Record a failed flow.
    pub fn record_error(&self, id: &str, error: impl Into<String>) {
        let mut tokens = self.tokens.write();
        let state = tokens.entry(id.to_string()).or_default();
        state.valid = false;
        state.last_error = Some(error.into());
    }

    /// Mark tokens as stale. Returns how many valid tokens were invalidated.
    pub fn invalidate(&self, ids: &[String]) -> usize {
        let mut tokens = self.tokens.write();
        let mut invalidated = 0;
        for id in ids {
            if let Some(state) = tokens.get_mut(id)
                && state.valid
            {
                state.valid = false;
                invalidated += 1;
            }
        }
        invalidated
    }
}

/// Authorizes configurations through an [`AuthorizationFlow`], caching
/// tokens in a [`TokenStore`].
///
/// Valid tokens short-circuit to [`AuthorizationStatus::Success`]. A failed
/// flow renders [`AuthorizationStatus::Error`] and retries only once the
/// rendered trigger fires. Interactive configurations wait for the trigger
/// before their first attempt as well.
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<TokenStore>,
    flow: Arc<dyn AuthorizationFlow>,
}

impl TokenManager {
    /// Create a manager with its own token store.
    pub fn new(flow: Arc<dyn AuthorizationFlow>) -> Self {
        Self::with_store(flow, Arc::new(TokenStore::new()))
    }

    /// Create a manager sharing an existing token store.
    pub fn with_store(flow: Arc<dyn AuthorizationFlow>, store: Arc<TokenStore>) -> Self {
        Self { store, flow }
    }

    /// The token store.
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }
}

impl Authorizer for TokenManager {
    fn request_authorizations(
        &self,
        configs: Vec<AuthorizationConfig>,
        render: RenderCallback,
    ) -> BoxFuture<'static, ()> {
        let store = self.store.clone();
        let flow = self.flow.clone();
        async move {
            for config in configs {
                authorize(&store, flow.as_ref(), Arc::new(config), &render).await;
            }
        }
        .boxed()
    }

    fn invalidate_token(&self, token_ids: &[String]) {
        let invalidated = self.store.invalidate(token_ids);
        tracing::info!(target: targets::AUTH, tokens = ?token_ids, invalidated, "tokens invalidated");
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("store", &self.store)
            .finish()
    }
}

async fn authorize(
    store: &TokenStore,
    flow: &dyn AuthorizationFlow,
    config: Arc<AuthorizationConfig>,
    render: &RenderCallback,
) {
    let emit = |status, error, trigger| {
        render(AuthorizationRender {
            config: config.clone(),
            status,
            error,
            trigger,
        });
    };

    let mut wait_for_user = config.interactive;
    let mut error = None;
    loop {
        if store.valid_token(&config.id).is_some() {
            emit(AuthorizationStatus::Success, None, AuthorizationTrigger::noop());
            return;
        }

        if wait_for_user {
            let clicked = Arc::new(Notify::new());
            let trigger = {
                let clicked = clicked.clone();
                AuthorizationTrigger::new(move || clicked.notify_one())
            };
            emit(AuthorizationStatus::Error, error.take(), trigger);
            clicked.notified().await;
        }

        emit(AuthorizationStatus::Pending, None, AuthorizationTrigger::noop());
        tracing::debug!(target: targets::AUTH, config = %config.id, "running authorization flow");
        match flow.authorize(&config).await {
            Ok(token) => {
                store.store(&config.id, token);
                tracing::info!(target: targets::AUTH, config = %config.id, "authorized");
                emit(AuthorizationStatus::Success, None, AuthorizationTrigger::noop());
                return;
            }
            Err(err) => {
                tracing::warn!(target: targets::AUTH, config = %config.id, error = %err, "authorization failed");
                store.record_error(&config.id, err.to_string());
                error = Some(err.to_string());
                wait_for_user = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Fails the first `failures` calls, then hands out numbered tokens.
    struct CountingFlow {
        calls: AtomicUsize,
        failures: usize,
    }

    impl CountingFlow {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
            })
        }
    }

    impl AuthorizationFlow for CountingFlow {
        fn authorize(
            &self,
            _config: &AuthorizationConfig,
        ) -> BoxFuture<'static, Result<String, AuthorizationError>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let failures = self.failures;
            async move {
                if call < failures {
                    Err(AuthorizationError::Denied("popup closed".into()))
                } else {
                    Ok(format!("token-{call}"))
                }
            }
            .boxed()
        }
    }

    fn recorder() -> (RenderCallback, mpsc::UnboundedReceiver<AuthorizationRender>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let render: RenderCallback = Arc::new(move |r| {
            let _ = tx.send(r);
        });
        (render, rx)
    }

    #[tokio::test]
    async fn test_valid_token_short_circuits() {
        let flow = CountingFlow::new(0);
        let manager = TokenManager::new(flow.clone());
        let config = AuthorizationConfig::new("gitlab", "GitLab");
        let (render, mut rx) = recorder();

        manager
            .request_authorizations(vec![config.clone()], render.clone())
            .await;
        manager.request_authorizations(vec![config], render).await;

        assert_eq!(flow.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.store().valid_token("gitlab"), Some("token-0".into()));

        let statuses: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                AuthorizationStatus::Pending,
                AuthorizationStatus::Success,
                AuthorizationStatus::Success
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_flow_waits_for_trigger() {
        let flow = CountingFlow::new(1);
        let manager = TokenManager::new(flow.clone());
        let (render, mut rx) = recorder();

        let request = tokio::spawn(
            manager.request_authorizations(vec![AuthorizationConfig::new("a", "A")], render),
        );

        assert_eq!(rx.recv().await.unwrap().status, AuthorizationStatus::Pending);
        let failed = rx.recv().await.unwrap();
        assert_eq!(failed.status, AuthorizationStatus::Error);
        assert!(failed.error.unwrap().contains("popup closed"));
        assert!(!manager.store().state("a").unwrap().valid);

        failed.trigger.fire();
        request.await.unwrap();
        assert_eq!(flow.calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.store().valid_token("a"), Some("token-1".into()));
    }

    #[tokio::test]
    async fn test_interactive_config_waits_for_first_click() {
        let flow = CountingFlow::new(0);
        let manager = TokenManager::new(flow.clone());
        let (render, mut rx) = recorder();

        let request = tokio::spawn(manager.request_authorizations(
            vec![AuthorizationConfig::new("sso", "SSO").interactive()],
            render,
        ));

        let locked = rx.recv().await.unwrap();
        assert_eq!(locked.status, AuthorizationStatus::Error);
        assert_eq!(locked.error, None);
        assert_eq!(flow.calls.load(Ordering::SeqCst), 0);

        locked.trigger.fire();
        request.await.unwrap();
        assert_eq!(flow.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_flow() {
        let flow = CountingFlow::new(0);
        let manager = TokenManager::new(flow.clone());
        let config = AuthorizationConfig::new("a", "A");
        let (render, _rx) = recorder();

        manager
            .request_authorizations(vec![config.clone()], render.clone())
            .await;
        manager.invalidate_token(&["a".to_string(), "unknown".to_string()]);
        assert_eq!(manager.store().valid_token("a"), None);

        manager.request_authorizations(vec![config], render).await;
        assert_eq!(flow.calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.store().valid_token("a"), Some("token-1".into()));
    }
}

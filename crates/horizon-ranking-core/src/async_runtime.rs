//! Async runtime integration for Horizon Ranking.
//!
//! Lazy columns and score pipelines resolve their values on a Tokio runtime.
//! [`AsyncRuntime`] wraps a runtime [`Handle`], counts in-flight tasks and
//! hands out [`AsyncTaskHandle`]s; [`AsyncCancellationToken`] gives tasks a
//! cooperative way to stop.
//!
//! # Example: Adopting the Ambient Runtime
//!
//! ```no_run
//! use horizon_ranking_core::AsyncRuntime;
//!
//! # async fn example() -> Result<(), horizon_ranking_core::AsyncRuntimeError> {
//! let runtime = AsyncRuntime::current()?;
//! let handle = runtime.spawn(async { 40 + 2 });
//! assert_eq!(handle.wait().await, Some(42));
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Owning a Runtime
//!
//! ```no_run
//! use horizon_ranking_core::{AsyncRuntime, AsyncRuntimeConfig};
//!
//! let runtime = AsyncRuntime::new(AsyncRuntimeConfig::default().with_worker_threads(2))?;
//! let answer = runtime.block_on(async { 42 });
//! # Ok::<(), horizon_ranking_core::AsyncRuntimeError>(())
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;

use crate::error::{AsyncRuntimeError, CoreError};
use crate::logging::targets;

/// Counter for unique task IDs.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Configuration for an owned async runtime.
#[derive(Debug, Clone)]
pub struct AsyncRuntimeConfig {
    /// Number of worker threads. Defaults to the number of CPU cores.
    pub worker_threads: Option<usize>,
    /// Name prefix for runtime threads.
    pub thread_name: String,
    /// Enable I/O driver (required for network-backed score providers).
    pub enable_io: bool,
    /// Enable time driver (required for debounced notifications).
    pub enable_time: bool,
}

impl Default for AsyncRuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name: "horizon-ranking".to_string(),
            enable_io: true,
            enable_time: true,
        }
    }
}

impl AsyncRuntimeConfig {
    /// Set the number of worker threads.
    pub fn with_worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = Some(count);
        self
    }

    /// Set the thread name prefix.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// A handle to a spawned async task.
#[derive(Debug)]
pub struct AsyncTaskHandle<T> {
    id: u64,
    receiver: oneshot::Receiver<T>,
}

impl<T> AsyncTaskHandle<T> {
    /// Get the unique task ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the task to complete.
    ///
    /// Returns `None` if the task was dropped before producing a value
    /// (for example because the runtime shut down).
    pub async fn wait(self) -> Option<T> {
        self.receiver.await.ok()
    }

    /// Wait for the task and turn a lost result into an error.
    pub async fn join(self) -> Result<T, CoreError> {
        let task_id = self.id;
        self.receiver
            .await
            .map_err(|_| CoreError::TaskAborted { task_id })
    }
}

/// A cancellation token for async tasks.
///
/// Clones share state: cancelling any clone cancels all of them. Supports
/// both polling and async waiting.
#[derive(Debug, Clone)]
pub struct AsyncCancellationToken {
    inner: Arc<AsyncCancellationState>,
}

#[derive(Debug)]
struct AsyncCancellationState {
    cancelled: AtomicBool,
    notify: tokio::sync::Notify,
}

impl AsyncCancellationToken {
    /// Create a new cancellation token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AsyncCancellationState {
                cancelled: AtomicBool::new(false),
                notify: tokio::sync::Notify::new(),
            }),
        }
    }

    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation.
    ///
    /// This sets the cancellation flag and wakes any waiters.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Wait asynchronously until cancellation is requested.
    ///
    /// Returns immediately if already cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl Default for AsyncCancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The async runtime manager.
///
/// Either owns a multi-threaded Tokio runtime (see [`AsyncRuntime::new`]) or
/// borrows the runtime the caller is already running on
/// (see [`AsyncRuntime::current`]). Cloning is cheap; clones share the task
/// counter and the underlying runtime.
#[derive(Clone)]
pub struct AsyncRuntime {
    /// Kept alive so an owned runtime does not shut down.
    #[allow(dead_code)]
    runtime: Option<Arc<Runtime>>,
    /// Handle to the runtime for spawning tasks.
    handle: Handle,
    /// Active task count.
    active_tasks: Arc<AtomicU64>,
}

impl AsyncRuntime {
    /// Create and own a new multi-threaded runtime.
    pub fn new(config: AsyncRuntimeConfig) -> Result<Self, AsyncRuntimeError> {
        let mut builder = Builder::new_multi_thread();
        builder.thread_name(&config.thread_name);

        if let Some(workers) = config.worker_threads {
            builder.worker_threads(workers);
        }
        if config.enable_io {
            builder.enable_io();
        }
        if config.enable_time {
            builder.enable_time();
        }

        let runtime = builder
            .build()
            .map_err(|e| AsyncRuntimeError::CreationFailed(e.to_string()))?;
        let handle = runtime.handle().clone();

        tracing::debug!(target: targets::RUNTIME, thread_name = %config.thread_name, "created owned runtime");

        Ok(Self {
            runtime: Some(Arc::new(runtime)),
            handle,
            active_tasks: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Adopt the Tokio runtime the current thread is running on.
    pub fn current() -> Result<Self, AsyncRuntimeError> {
        let handle = Handle::try_current().map_err(|_| AsyncRuntimeError::NoCurrentRuntime)?;
        Ok(Self::from_handle(handle))
    }

    /// Wrap an existing runtime handle.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            runtime: None,
            handle,
            active_tasks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the number of active tasks.
    pub fn active_tasks(&self) -> u64 {
        self.active_tasks.load(Ordering::Acquire)
    }

    /// Get a handle to the Tokio runtime.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawn an async task on the runtime.
    ///
    /// Returns a handle that can be used to wait for the result. Dropping the
    /// handle detaches the task; it still runs to completion.
    pub fn spawn<F, T>(&self, future: F) -> AsyncTaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        let active_tasks = self.active_tasks.clone();

        active_tasks.fetch_add(1, Ordering::AcqRel);

        self.handle.spawn(async move {
            let result = future.await;
            active_tasks.fetch_sub(1, Ordering::AcqRel);
            let _ = sender.send(result);
        });

        AsyncTaskHandle { id, receiver }
    }

    /// Block on a future, running it to completion.
    ///
    /// Do not call this from within an async context; it will panic inside
    /// Tokio. Intended for application startup and tests.
    pub fn block_on<F, T>(&self, future: F) -> T
    where
        F: Future<Output = T>,
    {
        self.handle.block_on(future)
    }
}

impl std::fmt::Debug for AsyncRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRuntime")
            .field("owned", &self.runtime.is_some())
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_owned_runtime_spawn_and_block_on() {
        let runtime = AsyncRuntime::new(AsyncRuntimeConfig::default().with_worker_threads(1)).unwrap();
        let handle = runtime.spawn(async { 42 });
        assert_eq!(runtime.block_on(handle.wait()), Some(42));
    }

    #[test]
    fn test_current_without_runtime_fails() {
        assert_eq!(
            AsyncRuntime::current().unwrap_err(),
            AsyncRuntimeError::NoCurrentRuntime
        );
    }

    #[tokio::test]
    async fn test_current_runtime_spawn() {
        let runtime = AsyncRuntime::current().unwrap();
        let handle = runtime.spawn(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            "hello"
        });
        assert_eq!(handle.join().await.unwrap(), "hello");
        assert_eq!(runtime.active_tasks(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_token_wakes_waiter() {
        let token = AsyncCancellationToken::new();
        let waiter = token.clone();
        let runtime = AsyncRuntime::current().unwrap();
        let handle = runtime.spawn(async move {
            waiter.cancelled().await;
            true
        });

        tokio::task::yield_now().await;
        assert!(!token.is_cancelled());
        token.cancel();
        assert_eq!(handle.wait().await, Some(true));
        assert!(token.is_cancelled());
    }
}

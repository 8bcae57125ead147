//! Execution contexts owning per-context engine caches.
//!
//! An execution context is either a future entered through
//! [`ExecutionContext::scope`] or, outside any scope, the current OS thread.
//! Engines cached in one context are never visible from another.
//!
//! ```ignore
//! // One context per unit of work, e.g. per inbound request
//! tokio::spawn(ExecutionContext::scope(async move {
//!     let engine = registry.default_engine()?;
//!     engine.backend().await?.query("RETURN 1").run().await
//! }));
//! ```
//!
//! Spawned tasks do not inherit the caller's scope; wrap them in their own.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;
use ulid::Ulid;

use crate::engine::Engine;

tokio::task_local! {
    static TASK: ExecutionContext;
}

thread_local! {
    static THREAD: ExecutionContext = ExecutionContext::new();
}

/// Cache key: registry id plus alias.
type EngineKey = (u64, String);

/// A unit of isolation for cached engines.
#[derive(Debug)]
pub struct ExecutionContext {
    id: Ulid,
    engines: RefCell<HashMap<EngineKey, Arc<Engine>>>,
}

impl ExecutionContext {
    fn new() -> Self {
        Self {
            id: Ulid::new(),
            engines: RefCell::new(HashMap::new()),
        }
    }

    /// Runs `future` in a fresh execution context.
    ///
    /// The context gets a new ULID, recorded on a `context` tracing span
    /// wrapping the future. Its cache is dropped when the future completes.
    pub async fn scope<F: Future>(future: F) -> F::Output {
        let context = Self::new();
        let span = tracing::info_span!("context", id = %context.id);
        TASK.scope(context, future.instrument(span)).await
    }

    /// Runs a synchronous closure in a fresh execution context.
    pub fn sync_scope<R>(f: impl FnOnce() -> R) -> R {
        let context = Self::new();
        let _guard = tracing::info_span!("context", id = %context.id).entered();
        TASK.sync_scope(context, f)
    }

    /// Identifier of the current context.
    pub fn current_id() -> Ulid {
        Self::with_current(|ctx| ctx.id)
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Number of engines cached in this context across all registries.
    pub fn cached_engines(&self) -> usize {
        self.engines.borrow().len()
    }

    /// Calls `f` with the current context.
    ///
    /// Borrows taken inside `f` must not be held across an `.await`.
    pub fn with_current<R>(f: impl FnOnce(&ExecutionContext) -> R) -> R {
        if TASK.try_with(|_| ()).is_ok() {
            TASK.with(f)
        } else {
            THREAD.with(f)
        }
    }

    /// Like [`with_current`](Self::with_current), but returns `None` while
    /// thread-local storage is being torn down.
    pub(crate) fn try_with_current<R>(f: impl FnOnce(&ExecutionContext) -> R) -> Option<R> {
        if TASK.try_with(|_| ()).is_ok() {
            TASK.try_with(f).ok()
        } else {
            THREAD.try_with(f).ok()
        }
    }

    pub(crate) fn engine(&self, registry: u64, alias: &str) -> Option<Arc<Engine>> {
        self.engines
            .borrow()
            .get(&(registry, alias.to_string()))
            .cloned()
    }

    pub(crate) fn insert_engine(&self, registry: u64, engine: Arc<Engine>) {
        self.engines
            .borrow_mut()
            .insert((registry, engine.alias().to_string()), engine);
    }

    pub(crate) fn remove_engine(&self, registry: u64, alias: &str) -> Option<Arc<Engine>> {
        self.engines
            .borrow_mut()
            .remove(&(registry, alias.to_string()))
    }

    /// Drops every engine cached for `registry`.
    pub(crate) fn purge(&self, registry: u64) -> usize {
        let mut engines = self.engines.borrow_mut();
        let before = engines.len();
        engines.retain(|(id, _), _| *id != registry);
        before - engines.len()
    }
}

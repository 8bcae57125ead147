//! Process-wide connection registry with per-context engine caches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::Backend;
use crate::config::{ConnectionConfig, DEFAULT_ALIAS};
use crate::context::ExecutionContext;
use crate::engine::Engine;
use crate::error::AppError;
use crate::graph::backends::neo4j::Neo4jConnector;
use crate::graph::Connector;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Resolves aliases to engines cached in the current execution context.
///
/// The configuration is fixed for the registry's lifetime. Lookups never
/// connect; only [`Engine::backend`] does.
///
/// # Example
///
/// ```ignore
/// let registry = ConnectionRegistry::neo4j(Settings::load()?.into_connections()?);
///
/// let engine = registry.get("default")?;
/// assert!(Arc::ptr_eq(&engine, &registry.get("default")?));
///
/// let rows = engine.backend().await?.query("MATCH (n) RETURN n LIMIT 5").fetch_all().await?;
/// ```
pub struct ConnectionRegistry {
    id: u64,
    config: Arc<ConnectionConfig>,
    connector: Arc<dyn Connector>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("id", &self.id)
            .field("aliases", &self.config.aliases().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    pub fn new(config: ConnectionConfig, connector: impl Connector + 'static) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            config: Arc::new(config),
            connector: Arc::new(connector),
        }
    }

    /// Registry connecting through the Neo4j driver.
    pub fn neo4j(config: ConnectionConfig) -> Self {
        Self::new(config, Neo4jConnector)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns the engine for `alias` in the current execution context.
    ///
    /// The first lookup in a context creates and caches the engine; later
    /// lookups return the same instance until [`reload`](Self::reload).
    ///
    /// # Errors
    ///
    /// [`AppError::UnknownAlias`] if `alias` is not configured. Nothing is
    /// cached in that case.
    pub fn get(&self, alias: &str) -> Result<Arc<Engine>, AppError> {
        self.config.options_for(alias)?;

        Ok(ExecutionContext::with_current(|ctx| {
            if let Some(engine) = ctx.engine(self.id, alias) {
                return engine;
            }
            tracing::debug!(alias, context = %ctx.id(), "Creating engine");
            let engine = Arc::new(self.new_engine(alias));
            ctx.insert_engine(self.id, engine.clone());
            engine
        }))
    }

    /// The engine for [`DEFAULT_ALIAS`].
    pub fn default_engine(&self) -> Result<Arc<Engine>, AppError> {
        self.get(DEFAULT_ALIAS)
    }

    /// Engines for every configured alias, in alias order.
    pub fn all(&self) -> Result<Vec<Arc<Engine>>, AppError> {
        self.config.aliases().map(|alias| self.get(alias)).collect()
    }

    /// Replaces the cached engine for `alias` with a new one.
    ///
    /// The old engine is discarded, not reset; its backend is released once
    /// no caller holds it anymore.
    ///
    /// # Errors
    ///
    /// [`AppError::UnknownAlias`] if `alias` is not configured. Other cached
    /// engines are left untouched.
    pub fn reload(&self, alias: &str) -> Result<Arc<Engine>, AppError> {
        self.config.options_for(alias)?;

        Ok(ExecutionContext::with_current(|ctx| {
            if ctx.remove_engine(self.id, alias).is_some() {
                tracing::info!(alias, context = %ctx.id(), "Reloading engine");
            }
            let engine = Arc::new(self.new_engine(alias));
            ctx.insert_engine(self.id, engine.clone());
            engine
        }))
    }

    /// Returns true if the current context holds an engine for `alias`.
    pub fn is_cached(&self, alias: &str) -> bool {
        ExecutionContext::with_current(|ctx| ctx.engine(self.id, alias).is_some())
    }

    /// Shorthand for `get(alias)?.backend().await`.
    pub async fn backend(&self, alias: &str) -> Result<Arc<Backend>, AppError> {
        let engine = self.get(alias)?;
        engine.backend().await
    }

    fn new_engine(&self, alias: &str) -> Engine {
        Engine::new(Some(alias), self.config.clone(), self.connector.clone())
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        // Other contexts drop their entries when they end.
        if let Some(purged) = ExecutionContext::try_with_current(|ctx| ctx.purge(self.id)) {
            if purged > 0 {
                tracing::debug!(registry = self.id, purged, "Dropped cached engines");
            }
        }
    }
}

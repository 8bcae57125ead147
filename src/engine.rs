//! Lazy holder of one [`Backend`] per alias.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::backend::Backend;
use crate::config::{ConnectionConfig, DEFAULT_ALIAS};
use crate::error::AppError;
use crate::graph::Connector;

/// Owns at most one live [`Backend`] for its alias.
///
/// The backend is connected on first use and kept until
/// [`reset_sessions`](Engine::reset_sessions). Engines are handed out by the
/// [`ConnectionRegistry`](crate::registry::ConnectionRegistry) and belong to a
/// single execution context.
pub struct Engine {
    alias: String,
    config: Arc<ConnectionConfig>,
    connector: Arc<dyn Connector>,
    backend: Mutex<Option<Arc<Backend>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine without connecting. `None` selects the default alias.
    pub fn new(
        alias: Option<&str>,
        config: Arc<ConnectionConfig>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            alias: alias.unwrap_or(DEFAULT_ALIAS).to_string(),
            config,
            connector,
            backend: Mutex::new(None),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Returns the backend, connecting it on first use.
    ///
    /// Repeated calls return the same instance until
    /// [`reset_sessions`](Engine::reset_sessions). A failed connection leaves
    /// the engine empty, so the next call tries again.
    ///
    /// # Errors
    ///
    /// - [`AppError::UnknownAlias`] if the alias is not configured
    /// - [`AppError::MissingEndpoint`] if its entry has no `URL`
    /// - Backend errors from the driver
    pub async fn backend(&self) -> Result<Arc<Backend>, AppError> {
        let mut slot = self.backend.lock().await;
        if let Some(backend) = slot.as_ref() {
            return Ok(backend.clone());
        }

        let options = self.config.options_for(&self.alias)?.clone();
        let backend = Arc::new(Backend::connect(&self.alias, options, &*self.connector).await?);
        *slot = Some(backend.clone());
        Ok(backend)
    }

    /// Drops the current backend and releases its connection.
    ///
    /// The alias is kept; the next [`backend`](Engine::backend) call connects
    /// a fresh backend. Callers still holding the old `Arc<Backend>` keep a
    /// closed handle.
    pub async fn reset_sessions(&self) -> Result<(), AppError> {
        let previous = self.backend.lock().await.take();
        match previous {
            Some(backend) => {
                tracing::debug!(alias = %self.alias, "Resetting backend");
                backend.close().await
            }
            None => Ok(()),
        }
    }

    /// Returns true while a backend is held.
    pub async fn is_connected(&self) -> bool {
        self.backend.lock().await.is_some()
    }
}

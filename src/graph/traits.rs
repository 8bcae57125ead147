//! Core traits for the driver boundary.
//!
//! - [`CypherExecutor`] - Execute parameterized Cypher against one live connection
//! - [`Connector`] - Open a [`CypherExecutor`] for a configured endpoint
//!
//! Both traits are object safe: a [`Backend`](crate::backend::Backend) stores a
//! `Box<dyn CypherExecutor>` and the registry shares an `Arc<dyn Connector>`.

use async_trait::async_trait;

use crate::config::ConnectionOptions;
use crate::error::AppError;
use crate::graph::row::{Params, RowStream};

/// Executes Cypher queries against a graph database.
///
/// Implementations own a live connection (or pool) and forward statements
/// to the server. They perform no retries.
#[async_trait]
pub trait CypherExecutor: Send + Sync {
    /// Executes a Cypher query and returns a stream of result rows.
    ///
    /// Use this for queries that return data (MATCH, RETURN).
    ///
    /// # Arguments
    ///
    /// * `cypher` - The Cypher query string
    /// * `params` - Parameters to bind to the query
    async fn execute_cypher(&self, cypher: &str, params: Params)
        -> Result<RowStream<'_>, AppError>;

    /// Executes a Cypher query without returning results.
    ///
    /// Use this for mutations (CREATE, MERGE, DELETE, SET).
    async fn run_cypher(&self, cypher: &str, params: Params) -> Result<(), AppError> {
        use futures::StreamExt;
        let mut stream = self.execute_cypher(cypher, params).await?;
        // Drain the stream to ensure the query completes
        while let Some(result) = stream.next().await {
            result?;
        }
        Ok(())
    }

    /// Releases the underlying connection.
    ///
    /// Called when an engine drops its backend. Dropping the executor must
    /// also release it, so the default does nothing.
    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Opens executors for configured endpoints.
///
/// The registry holds one connector and hands it to every engine it creates.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection to `url` for the given alias.
    ///
    /// `url` is the verbatim `URL` option; `options` is the complete entry
    /// for the alias so drivers can read credentials or pool settings.
    async fn connect(
        &self,
        alias: &str,
        url: &str,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn CypherExecutor>, AppError>;
}

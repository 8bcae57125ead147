//! Query builder for fluent Cypher query construction.

use futures::{StreamExt, TryStreamExt};
use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::graph::row::{Params, Row, RowStream};
use crate::graph::traits::CypherExecutor;

/// A builder for constructing and executing Cypher queries.
///
/// # Example
///
/// ```ignore
/// let rows = Query::new(&executor, "MATCH (n:Person) WHERE n.name = $name RETURN n.born AS born")
///     .param("name", "Keanu Reeves")
///     .fetch_all()
///     .await?;
/// ```
pub struct Query<'a, E: CypherExecutor + ?Sized> {
    executor: &'a E,
    cypher: String,
    params: Params,
}

impl<'a, E: CypherExecutor + ?Sized> Query<'a, E> {
    pub fn new(executor: &'a E, cypher: &str) -> Self {
        Self {
            executor,
            cypher: cypher.to_string(),
            params: Params::new(),
        }
    }

    /// Adds a parameter, referenced in Cypher as `$name`.
    pub fn param(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Merges a whole parameter map into the query.
    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn cypher(&self) -> &str {
        &self.cypher
    }

    /// Executes the query and returns a stream of rows.
    pub async fn execute(self) -> Result<RowStream<'a>, AppError> {
        tracing::debug!(cypher = %self.cypher, "executing query");
        self.executor
            .execute_cypher(&self.cypher, self.params)
            .await
    }

    /// Executes the query and collects all rows into a vector.
    pub async fn fetch_all(self) -> Result<Vec<Row>, AppError> {
        self.execute().await?.try_collect().await
    }

    /// Executes the query and returns the first row, if any.
    pub async fn fetch_one(self) -> Result<Option<Row>, AppError> {
        let mut stream = self.execute().await?;
        stream.next().await.transpose()
    }

    /// Returns the first value of the first row, or `None` when there are no rows.
    pub async fn fetch_value(self) -> Result<Option<JsonValue>, AppError> {
        Ok(self
            .fetch_one()
            .await?
            .and_then(|row| row.into_inner().into_iter().next().map(|(_, v)| v)))
    }

    /// Executes the query without returning results.
    pub async fn run(self) -> Result<(), AppError> {
        tracing::debug!(cypher = %self.cypher, "running statement");
        self.executor.run_cypher(&self.cypher, self.params).await
    }
}

/// Extension trait providing `executor.query("...")`.
pub trait QueryExt: CypherExecutor {
    fn query(&self, cypher: &str) -> Query<'_, Self> {
        Query::new(self, cypher)
    }
}

impl<E: CypherExecutor + ?Sized> QueryExt for E {}

//! Neo4j backend over the Bolt protocol via `neo4rs`.
//!
//! # Example
//!
//! ```ignore
//! use tracer::graph::backends::neo4j::Neo4jConnector;
//! use tracer::registry::ConnectionRegistry;
//!
//! let registry = ConnectionRegistry::new(config, Neo4jConnector);
//! let engine = registry.get("default")?;
//! let rows = engine.backend().await?.query("MATCH (n) RETURN count(n) AS n").fetch_all().await?;
//! ```
//!
//! # Options
//!
//! Besides `URL`, the connector reads these keys from the alias entry:
//!
//! | Key | Meaning | Default |
//! |-----|---------|---------|
//! | `USER` | Basic auth user | `neo4j` |
//! | `PASSWORD` | Basic auth password | empty |
//! | `DATABASE` | Target database | server default |
//! | `FETCH_SIZE` | Records per pull | driver default |
//! | `MAX_CONNECTIONS` | Pool size | driver default |

use async_trait::async_trait;
use neo4rs::{BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder, Graph};
use serde_json::Value as JsonValue;

use crate::config::ConnectionOptions;
use crate::error::AppError;
use crate::graph::row::{Params, Row, RowStream};
use crate::graph::traits::{Connector, CypherExecutor};

/// Opens [`Neo4jClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Neo4jConnector;

#[async_trait]
impl Connector for Neo4jConnector {
    async fn connect(
        &self,
        alias: &str,
        url: &str,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn CypherExecutor>, AppError> {
        let client = Neo4jClient::connect(url, options).await?;
        tracing::debug!(alias, "Neo4j connection pool ready");
        Ok(Box::new(client))
    }
}

/// Neo4j client backed by the driver's connection pool.
///
/// This type is cheap to clone; the pool is shared.
#[derive(Clone)]
pub struct Neo4jClient {
    graph: Graph,
}

impl Neo4jClient {
    /// Connects to `url` with the credentials and pool settings in `options`.
    pub async fn connect(url: &str, options: &ConnectionOptions) -> Result<Self, AppError> {
        let mut builder = ConfigBuilder::default()
            .uri(url)
            .user(options.get_str("USER").unwrap_or("neo4j"))
            .password(options.get_str("PASSWORD").unwrap_or(""));

        if let Some(db) = options.get_str("DATABASE") {
            builder = builder.db(db);
        }
        if let Some(size) = options.get_u64("FETCH_SIZE") {
            builder = builder.fetch_size(size as usize);
        }
        if let Some(max) = options.get_u64("MAX_CONNECTIONS") {
            builder = builder.max_connections(max as usize);
        }

        let graph = Graph::connect(builder.build()?).await?;
        Ok(Self { graph })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}

#[async_trait]
impl CypherExecutor for Neo4jClient {
    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Params,
    ) -> Result<RowStream<'_>, AppError> {
        let mut query = neo4rs::query(cypher);
        for (name, value) in params {
            query = query.param(&name, json_to_bolt(value));
        }

        let graph = self.graph.clone();
        let cypher = cypher.to_string();
        Ok(Box::pin(async_stream::try_stream! {
            let mut result = graph.execute(query).await.map_err(|source| AppError::Query {
                query: cypher.clone(),
                source,
            })?;
            while let Some(row) = result.next().await.map_err(AppError::from)? {
                let data = row
                    .to::<serde_json::Map<String, JsonValue>>()
                    .map_err(|e| AppError::Decode(format!("failed to decode row: {}", e)))?;
                yield Row::new(data);
            }
        }))
    }
}

/// Converts a JSON parameter into a Bolt value.
///
/// Integers that fit `i64` stay integers; everything else numeric becomes a float.
fn json_to_bolt(value: JsonValue) -> BoltType {
    match value {
        JsonValue::Null => BoltType::Null(BoltNull),
        JsonValue::Bool(b) => b.into(),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        JsonValue::String(s) => s.into(),
        JsonValue::Array(items) => BoltType::List(BoltList::from(
            items.into_iter().map(json_to_bolt).collect::<Vec<_>>(),
        )),
        JsonValue::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, value) in map {
                bolt.put(BoltString::from(key.as_str()), json_to_bolt(value));
            }
            BoltType::Map(bolt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_to_bolt_scalars() {
        assert!(matches!(json_to_bolt(JsonValue::Null), BoltType::Null(_)));
        assert!(matches!(json_to_bolt(json!(true)), BoltType::Boolean(_)));
        assert!(matches!(json_to_bolt(json!(42)), BoltType::Integer(_)));
        assert!(matches!(json_to_bolt(json!(1.5)), BoltType::Float(_)));
        assert!(matches!(json_to_bolt(json!("x")), BoltType::String(_)));
    }

    #[test]
    fn test_json_to_bolt_nested() {
        let bolt = json_to_bolt(json!({"ids": [1, 2], "meta": {"k": "v"}}));
        let BoltType::Map(map) = bolt else {
            panic!("expected map");
        };
        assert_eq!(map.value.len(), 2);
        assert!(matches!(
            map.value.get(&BoltString::from("ids")),
            Some(BoltType::List(_))
        ));
    }
}

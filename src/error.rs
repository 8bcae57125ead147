//! Application error types.

use thiserror::Error;

/// Application-level errors for tracer.
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("The key \"{0}\" isn't an available connection.")]
    UnknownAlias(String),

    #[error("You must specify a \"URL\" in your settings for connection \"{0}\".")]
    MissingEndpoint(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    // Neo4j errors
    #[error("Neo4j connection error: {0}")]
    Connection(#[from] neo4rs::Error),

    #[error("Neo4j query error: {source}")]
    Query {
        query: String,
        #[source]
        source: neo4rs::Error,
    },

    #[error("Failed to decode result: {0}")]
    Decode(String),

    // Graph value errors
    #[error("Invalid subgraph: {0}")]
    InvalidSubgraph(String),

    #[error("Not bound to a remote entity: {0}")]
    Unbound(String),

    #[error("Invalid object schema: {0}")]
    InvalidSchema(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true for failures surfaced by the driver or the server.
    ///
    /// These carry the underlying cause unmodified and are never retried here.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            AppError::Connection(_) | AppError::Query { .. } | AppError::Decode(_)
        )
    }
}

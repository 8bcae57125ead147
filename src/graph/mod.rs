//! Graph access layer shared by every backend.
//!
//! # Architecture
//!
//! - [`CypherExecutor`] - Execute Cypher on one live connection
//! - [`Connector`] - Open an executor from an alias entry
//! - [`Node`], [`Relationship`] and [`Subgraph`] - Local graph values that
//!   backend operations bind to remote entities
//!
//! # Usage
//!
//! ```ignore
//! use tracer::graph::QueryExt;
//!
//! let backend = registry.backend("default").await?;
//!
//! // Query with parameters
//! let rows = backend.query("MATCH (n:Person) WHERE n.name = $name RETURN n.born AS born")
//!     .param("name", "Keanu Reeves")
//!     .fetch_all()
//!     .await?;
//!
//! // Write query (no results)
//! backend.query("CREATE (n:Person {name: $name})")
//!     .param("name", "Carrie-Anne Moss")
//!     .run()
//!     .await?;
//! ```

pub mod backends;
pub mod cypher;

mod query;
mod row;
mod subgraph;
mod traits;

// Re-export core types
pub use query::{Query, QueryExt};
pub use row::{Params, Row, RowStream};
pub use subgraph::{Node, Properties, Relationship, Subgraph};
pub use traits::{Connector, CypherExecutor};

//! Driver implementations of [`Connector`](crate::graph::Connector).
//!
//! Each backend implements the two traits from [`crate::graph::traits`]:
//!
//! - [`CypherExecutor`](crate::graph::CypherExecutor) - Execute statements on a live connection
//! - [`Connector`](crate::graph::Connector) - Open an executor for a configured endpoint
//!
//! # Available Backends
//!
//! | Backend | Module | Status |
//! |---------|--------|--------|
//! | Neo4j (Bolt) | [`neo4j`] | Available |
//!
//! # Implementing a Backend
//!
//! 1. Create a client struct (e.g., `Neo4jClient`) and implement `CypherExecutor` for it
//! 2. Create a connector struct that builds the client from `URL` plus the alias options
//! 3. Hand the connector to [`ConnectionRegistry::new`](crate::registry::ConnectionRegistry::new)

pub mod neo4j;

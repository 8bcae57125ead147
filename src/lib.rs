//! Tracer - Neo4j connection registry
//!
//! Binds application code to Neo4j through per-alias, per-execution-context
//! engines that lazily connect a [`Backend`](backend::Backend).

pub mod backend;
pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod models;
pub mod registry;

pub use backend::Backend;
pub use config::{ConnectionConfig, ConnectionOptions, Settings, DEFAULT_ALIAS};
pub use context::ExecutionContext;
pub use engine::Engine;
pub use error::AppError;
pub use registry::ConnectionRegistry;

//! CLI module for tracer.
//!
//! Subcommands:
//! - `check`: Validate the connection settings
//! - `ping`: Connect to an alias and run a trivial statement
//! - `labels`: List node labels and relationship types
//! - `run`: Run a Cypher statement and print rows as JSON lines

mod check;
mod labels;
mod ping;
mod run;

use clap::{Parser, Subcommand};
use color_eyre::Result;

use crate::config::{Settings, DEFAULT_ALIAS};
use crate::context::ExecutionContext;
use crate::registry::ConnectionRegistry;

/// tracer - Neo4j connection registry
#[derive(Parser)]
#[command(name = "tracer")]
#[command(about = "Inspect and query configured Neo4j connections")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate settings and list configured aliases
    Check,

    /// Connect to an alias and run `RETURN 1`
    Ping {
        /// Connection alias
        #[arg(long, default_value = DEFAULT_ALIAS)]
        alias: String,
    },

    /// List node labels and relationship types
    Labels {
        /// Connection alias
        #[arg(long, default_value = DEFAULT_ALIAS)]
        alias: String,
    },

    /// Run a Cypher statement and print each row as a JSON line
    Run {
        /// Connection alias
        #[arg(long, default_value = DEFAULT_ALIAS)]
        alias: String,

        /// Statement parameter as NAME=JSON (repeatable)
        #[arg(long = "param", value_name = "NAME=JSON")]
        params: Vec<String>,

        /// Cypher statement
        statement: String,
    },
}

impl App {
    /// Run the CLI application in its own execution context.
    pub async fn run(self) -> Result<()> {
        ExecutionContext::scope(async {
            match &self.command {
                Command::Check => self.run_check(),
                Command::Ping { alias } => self.run_ping(alias).await,
                Command::Labels { alias } => self.run_labels(alias).await,
                Command::Run {
                    alias,
                    params,
                    statement,
                } => self.run_statement(alias, params, statement).await,
            }
        })
        .await
    }

    /// Loads validated settings and builds a Neo4j registry.
    fn registry(&self) -> Result<ConnectionRegistry> {
        let connections = Settings::load()?.into_connections()?;
        tracing::debug!(aliases = connections.len(), "Loaded connection settings");
        Ok(ConnectionRegistry::neo4j(connections))
    }
}

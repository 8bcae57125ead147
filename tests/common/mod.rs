//! Shared test doubles: a connector that records every connection and
//! statement instead of talking to a server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracer::graph::{Connector, CypherExecutor, Params, Row, RowStream};
use tracer::{AppError, ConnectionConfig, ConnectionOptions};

#[derive(Default)]
pub struct Recorder {
    pub connects: Mutex<Vec<(String, String)>>,
    pub statements: Mutex<Vec<(String, Params)>>,
    pub responses: Mutex<VecDeque<Vec<Row>>>,
    pub closes: Mutex<usize>,
    pub failing_connects: Mutex<usize>,
    pub failing_statements: Mutex<usize>,
}

/// Takes one pending failure from `counter`, if any.
fn take_failure(counter: &Mutex<usize>) -> bool {
    let mut pending = counter.lock().unwrap();
    if *pending == 0 {
        return false;
    }
    *pending -= 1;
    true
}

/// The error a driver would report for `message`.
pub fn driver_error(message: &str) -> neo4rs::Error {
    neo4rs::Error::UnexpectedMessage(message.to_string())
}

impl Recorder {
    pub fn respond(&self, rows: Vec<Row>) -> &Self {
        self.responses.lock().unwrap().push_back(rows);
        self
    }

    pub fn connects(&self) -> Vec<(String, String)> {
        self.connects.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<(String, Params)> {
        self.statements.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        *self.closes.lock().unwrap()
    }

    /// Makes the next connection attempt fail with a driver error.
    pub fn fail_next_connect(&self) -> &Self {
        *self.failing_connects.lock().unwrap() += 1;
        self
    }

    /// Makes the next statement fail with a driver error.
    pub fn fail_next_statement(&self) -> &Self {
        *self.failing_statements.lock().unwrap() += 1;
        self
    }
}

#[derive(Clone, Default)]
pub struct RecordingConnector(pub Arc<Recorder>);

struct RecordingExecutor(Arc<Recorder>);

#[async_trait]
impl CypherExecutor for RecordingExecutor {
    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Params,
    ) -> Result<RowStream<'_>, AppError> {
        self.0
            .statements
            .lock()
            .unwrap()
            .push((cypher.to_string(), params));
        if take_failure(&self.0.failing_statements) {
            return Err(AppError::Query {
                query: cypher.to_string(),
                source: driver_error("statement rejected"),
            });
        }
        let rows = self
            .0
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(
            rows.into_iter().map(Ok::<Row, AppError>),
        )))
    }

    async fn close(&self) -> Result<(), AppError> {
        *self.0.closes.lock().unwrap() += 1;
        Ok(())
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(
        &self,
        alias: &str,
        url: &str,
        _options: &ConnectionOptions,
    ) -> Result<Box<dyn CypherExecutor>, AppError> {
        self.0
            .connects
            .lock()
            .unwrap()
            .push((alias.to_string(), url.to_string()));
        if take_failure(&self.0.failing_connects) {
            return Err(AppError::Connection(driver_error("connection refused")));
        }
        Ok(Box::new(RecordingExecutor(self.0.clone())))
    }
}

/// `{default: {URL: "http://h1"}, other: {URL: "http://h2"}}`
pub fn two_hosts() -> ConnectionConfig {
    ConnectionConfig::new()
        .with("default", ConnectionOptions::new().with("URL", "http://h1"))
        .with("other", ConnectionOptions::new().with("URL", "http://h2"))
}

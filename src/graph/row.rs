//! Row and streaming types for query results.

use crate::error::AppError;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::pin::Pin;

/// Parameters for Cypher queries.
///
/// A map of parameter names to JSON values that can be passed to queries.
pub type Params = HashMap<String, JsonValue>;

/// A stream of rows from a query result.
///
/// Rows are fetched on-demand, not loaded all at once.
pub type RowStream<'a> = Pin<Box<dyn Stream<Item = Result<Row, AppError>> + Send + 'a>>;

/// A single record from a query result.
///
/// Columns keep the order of the `RETURN` clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    data: Map<String, JsonValue>,
}

impl Row {
    pub fn new(data: Map<String, JsonValue>) -> Self {
        Self { data }
    }

    /// Builds a row from `(column, value)` pairs, preserving their order.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, JsonValue)>,
        K: Into<String>,
    {
        Self {
            data: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Gets a value from the row by column name, deserializing to the requested type.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not found or if deserialization fails.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, AppError> {
        let value = self
            .data
            .get(key)
            .ok_or_else(|| AppError::Decode(format!("column not found: {}", key)))?;
        serde_json::from_value(value.clone())
            .map_err(|e| AppError::Decode(format!("failed to deserialize '{}': {}", key, e)))
    }

    /// Gets a value from the row, returning `None` if the key is missing or null.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.data.get(key) {
            Some(v) if v.is_null() => Ok(None),
            Some(_) => self.get(key).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the raw JSON value for a column, if it exists.
    pub fn get_raw(&self, key: &str) -> Option<&JsonValue> {
        self.data.get(key)
    }

    /// Returns the value of the first column.
    pub fn first(&self) -> Option<&JsonValue> {
        self.data.values().next()
    }

    /// Returns all column names in `RETURN` order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the row and returns the underlying ordered map.
    pub fn into_inner(self) -> Map<String, JsonValue> {
        self.data
    }
}

impl From<Map<String, JsonValue>> for Row {
    fn from(data: Map<String, JsonValue>) -> Self {
        Self::new(data)
    }
}

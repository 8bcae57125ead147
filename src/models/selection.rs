//! Lazy selections of stored graph objects.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::TryStreamExt;
use serde_json::Value as JsonValue;

use crate::engine::Engine;
use crate::error::AppError;
use crate::graph::cypher::{label_clause, node_projection, quote_name};
use crate::graph::{Node, Params, QueryExt};
use crate::models::object::GraphObject;

/// A query over objects of type `T`, built up before it is sent.
///
/// Filters are equality matches combined with `AND`; an array value matches
/// any of its elements. Nothing is sent until [`first`](Selection::first),
/// [`all`](Selection::all) or [`count`](Selection::count).
pub struct Selection<T: GraphObject> {
    engine: Arc<Engine>,
    filters: Vec<(String, JsonValue)>,
    order: Vec<(String, bool)>,
    skip: Option<usize>,
    limit: Option<usize>,
    _object: PhantomData<fn() -> T>,
}

impl<T: GraphObject> std::fmt::Debug for Selection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("label", &T::schema().label())
            .field("filters", &self.filters)
            .field("order", &self.order)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<T: GraphObject> Selection<T> {
    pub(crate) fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            filters: Vec::new(),
            order: Vec::new(),
            skip: None,
            limit: None,
            _object: PhantomData,
        }
    }

    /// Keeps objects whose `field` equals `value`.
    pub fn filter(mut self, field: &str, value: impl Into<JsonValue>) -> Result<Self, AppError> {
        let key = T::schema().key_for(field)?.to_string();
        self.filters.push((key, value.into()));
        Ok(self)
    }

    /// Sorts ascending by `field`. Repeated calls add tie-breakers.
    pub fn order_by(self, field: &str) -> Result<Self, AppError> {
        self.push_order(field, false)
    }

    pub fn order_by_desc(self, field: &str) -> Result<Self, AppError> {
        self.push_order(field, true)
    }

    fn push_order(mut self, field: &str, descending: bool) -> Result<Self, AppError> {
        let key = T::schema().key_for(field)?.to_string();
        self.order.push((key, descending));
        Ok(self)
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The first matching object, if any.
    pub async fn first(self) -> Result<Option<T>, AppError> {
        Ok(self.limit(1).all().await?.into_iter().next())
    }

    /// Every matching object.
    pub async fn all(self) -> Result<Vec<T>, AppError> {
        let (cypher, params) = self.statement(&format!("RETURN {}", node_projection("n", "")));
        let backend = self.engine.backend().await?;
        let rows = backend.query(&cypher).params(params).execute().await?;
        rows.and_then(|row| async move {
            let node = Node::from_row(&row, "")?;
            T::from_node(&node)
        })
        .try_collect()
        .await
    }

    /// Number of matching objects, ignoring skip and limit.
    pub async fn count(self) -> Result<i64, AppError> {
        let unpaged = Self {
            skip: None,
            limit: None,
            order: Vec::new(),
            ..self
        };
        let (cypher, params) = unpaged.statement("RETURN count(n) AS count");
        let backend = unpaged.engine.backend().await?;
        let row = backend.query(&cypher).params(params).fetch_one().await?;
        match row {
            Some(row) => row.get("count"),
            None => Ok(0),
        }
    }

    fn statement(&self, projection: &str) -> (String, Params) {
        let mut params = Params::new();
        let mut cypher = format!("MATCH (n{})", label_clause([T::schema().label()]));

        let conditions: Vec<String> = self
            .filters
            .iter()
            .enumerate()
            .map(|(i, (key, value))| {
                let op = if value.is_array() { "IN" } else { "=" };
                params.insert(format!("p{i}"), value.clone());
                format!("n.{} {op} $p{i}", quote_name(key))
            })
            .collect();
        if !conditions.is_empty() {
            cypher.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
        }

        cypher.push(' ');
        cypher.push_str(projection);

        if !self.order.is_empty() {
            let order: Vec<String> = self
                .order
                .iter()
                .map(|(key, desc)| {
                    let dir = if *desc { " DESC" } else { "" };
                    format!("n.{}{dir}", quote_name(key))
                })
                .collect();
            cypher.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }
        if let Some(skip) = self.skip {
            cypher.push_str(" SKIP $skip");
            params.insert("skip".to_string(), (skip as u64).into());
        }
        if let Some(limit) = self.limit {
            cypher.push_str(" LIMIT $limit");
            params.insert("limit".to_string(), (limit as u64).into());
        }
        (cypher, params)
    }
}

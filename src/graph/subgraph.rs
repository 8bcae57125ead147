//! Local representation of graph entities.
//!
//! A [`Node`] or [`Relationship`] is *bound* once it carries the identity of
//! its remote counterpart. Backend operations bind, refresh and unbind these
//! values in place.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::AppError;
use crate::graph::row::Row;

/// Property map of a node or relationship.
pub type Properties = Map<String, JsonValue>;

/// A node with an optional remote identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    identity: Option<i64>,
    labels: Vec<String>,
    properties: Properties,
}

impl Node {
    /// Creates an unbound node. Duplicate labels are ignored.
    pub fn new<I, S>(labels: I, properties: Properties) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut node = Self {
            identity: None,
            labels: Vec::new(),
            properties,
        };
        for label in labels {
            node.add_label(label);
        }
        node
    }

    /// Creates a handle for a remote node without fetching its data.
    pub fn bound(identity: i64) -> Self {
        Self {
            identity: Some(identity),
            ..Self::default()
        }
    }

    /// Sets a property, builder style.
    pub fn with_property(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn identity(&self) -> Option<i64> {
        self.identity
    }

    pub fn is_bound(&self) -> bool {
        self.identity.is_some()
    }

    pub(crate) fn bind(&mut self, identity: i64) {
        self.identity = Some(identity);
    }

    pub(crate) fn unbind(&mut self) {
        self.identity = None;
    }

    /// Labels in insertion order; the first one is the primary label.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn primary_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn add_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.has_label(&label) {
            self.labels.push(label);
        }
    }

    pub fn remove_label(&mut self, label: &str) {
        self.labels.retain(|l| l != label);
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.properties.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<JsonValue>) {
        self.properties.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<JsonValue> {
        self.properties.remove(key)
    }

    /// Replaces labels and properties with remote state.
    pub(crate) fn refresh(&mut self, labels: Vec<String>, properties: Properties) {
        self.labels = labels;
        self.properties = properties;
    }

    /// Decodes a node from `{prefix}id`, `{prefix}labels` and `{prefix}properties` columns.
    pub(crate) fn from_row(row: &Row, prefix: &str) -> Result<Self, AppError> {
        let identity: i64 = row.get(&format!("{prefix}id"))?;
        let labels: Vec<String> = row
            .get_opt(&format!("{prefix}labels"))?
            .unwrap_or_default();
        let properties: Properties = row
            .get_opt(&format!("{prefix}properties"))?
            .unwrap_or_default();
        Ok(Self {
            identity: Some(identity),
            labels,
            properties,
        })
    }
}

/// A typed, directed relationship between two nodes.
///
/// A handle from [`Relationship::bound`] has not loaded its type or
/// endpoints. Until it is pulled its endpoints are placeholders and are not
/// enumerated by [`Subgraph::nodes`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    identity: Option<i64>,
    start: Node,
    rel_type: String,
    end: Node,
    properties: Properties,
    loaded: bool,
}

impl Relationship {
    /// Creates an unbound relationship `(start)-[:rel_type]->(end)`.
    pub fn new(start: Node, rel_type: impl Into<String>, end: Node) -> Self {
        Self {
            identity: None,
            start,
            rel_type: rel_type.into(),
            end,
            properties: Properties::new(),
            loaded: true,
        }
    }

    /// Creates a handle for a remote relationship without fetching its data.
    ///
    /// Type and endpoints stay empty until the handle is pulled.
    pub fn bound(identity: i64) -> Self {
        Self {
            identity: Some(identity),
            loaded: false,
            ..Self::default()
        }
    }

    /// Returns false for a handle whose type and endpoints were never fetched.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn with_property(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn identity(&self) -> Option<i64> {
        self.identity
    }

    pub fn is_bound(&self) -> bool {
        self.identity.is_some()
    }

    pub(crate) fn bind(&mut self, identity: i64) {
        self.identity = Some(identity);
    }

    pub(crate) fn unbind(&mut self) {
        self.identity = None;
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    pub fn start(&self) -> &Node {
        &self.start
    }

    pub fn end(&self) -> &Node {
        &self.end
    }

    pub fn start_mut(&mut self) -> &mut Node {
        &mut self.start
    }

    pub fn end_mut(&mut self) -> &mut Node {
        &mut self.end
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.properties.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<JsonValue>) {
        self.properties.insert(key.to_string(), value.into());
    }

    /// Replaces type, endpoint identities and properties with remote state.
    ///
    /// Endpoints that already point at the same remote nodes keep their local data.
    pub(crate) fn refresh(
        &mut self,
        rel_type: String,
        start: i64,
        end: i64,
        properties: Properties,
    ) {
        self.rel_type = rel_type;
        if self.start.identity != Some(start) {
            self.start = Node::bound(start);
        }
        if self.end.identity != Some(end) {
            self.end = Node::bound(end);
        }
        self.properties = properties;
        self.loaded = true;
    }

    /// Decodes a relationship from `id`, `type`, `properties` and prefixed endpoint columns.
    pub(crate) fn from_row(row: &Row) -> Result<Self, AppError> {
        Ok(Self {
            identity: Some(row.get("id")?),
            start: Node::from_row(row, "start_")?,
            rel_type: row.get("type")?,
            end: Node::from_row(row, "end_")?,
            properties: row.get_opt("properties")?.unwrap_or_default(),
            loaded: true,
        })
    }
}

/// A node, a relationship, or a composite of them.
///
/// `nodes` and `nodes_mut` (likewise the relationship pair) must enumerate
/// entities in the same order. Relationship endpoints are owned by their
/// relationship and are enumerated as nodes once loaded.
pub trait Subgraph: Send + Sync {
    fn nodes(&self) -> Vec<&Node>;
    fn nodes_mut(&mut self) -> Vec<&mut Node>;
    fn relationships(&self) -> Vec<&Relationship>;
    fn relationships_mut(&mut self) -> Vec<&mut Relationship>;

    /// Identities of bound nodes.
    fn node_ids(&self) -> Vec<i64> {
        self.nodes().iter().filter_map(|n| n.identity()).collect()
    }

    /// Identities of bound relationships.
    fn relationship_ids(&self) -> Vec<i64> {
        self.relationships()
            .iter()
            .filter_map(|r| r.identity())
            .collect()
    }
}

impl Subgraph for Node {
    fn nodes(&self) -> Vec<&Node> {
        vec![self]
    }

    fn nodes_mut(&mut self) -> Vec<&mut Node> {
        vec![self]
    }

    fn relationships(&self) -> Vec<&Relationship> {
        Vec::new()
    }

    fn relationships_mut(&mut self) -> Vec<&mut Relationship> {
        Vec::new()
    }
}

impl Subgraph for Relationship {
    fn nodes(&self) -> Vec<&Node> {
        if !self.loaded {
            return Vec::new();
        }
        vec![&self.start, &self.end]
    }

    fn nodes_mut(&mut self) -> Vec<&mut Node> {
        if !self.loaded {
            return Vec::new();
        }
        vec![&mut self.start, &mut self.end]
    }

    fn relationships(&self) -> Vec<&Relationship> {
        vec![self]
    }

    fn relationships_mut(&mut self) -> Vec<&mut Relationship> {
        vec![self]
    }
}

impl<T: Subgraph> Subgraph for Vec<T> {
    fn nodes(&self) -> Vec<&Node> {
        self.iter().flat_map(|t| t.nodes()).collect()
    }

    fn nodes_mut(&mut self) -> Vec<&mut Node> {
        self.iter_mut().flat_map(|t| t.nodes_mut()).collect()
    }

    fn relationships(&self) -> Vec<&Relationship> {
        self.iter().flat_map(|t| t.relationships()).collect()
    }

    fn relationships_mut(&mut self) -> Vec<&mut Relationship> {
        self.iter_mut()
            .flat_map(|t| t.relationships_mut())
            .collect()
    }
}

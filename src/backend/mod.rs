//! The Neo4j backend: one live connection for one alias.
//!
//! A [`Backend`] is immutable once connected. Reconfiguration goes through
//! [`Engine::reset_sessions`](crate::engine::Engine::reset_sessions), which
//! drops the backend so the next access connects a fresh one.
//!
//! Every operation is a single autocommit statement forwarded to the
//! underlying [`CypherExecutor`]. Driver errors propagate unmodified and
//! nothing is retried.

mod statements;

use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::config::ConnectionOptions;
use crate::error::AppError;
use crate::graph::{
    Connector, CypherExecutor, Node, Params, QueryExt, Relationship, Row, RowStream, Subgraph,
};

use statements::{Statement, WriteMode, WritePlan};

/// Lazy stream of nodes.
pub type NodeStream<'a> = Pin<Box<dyn Stream<Item = Result<Node, AppError>> + Send + 'a>>;

/// Lazy stream of relationships.
pub type RelationshipStream<'a> =
    Pin<Box<dyn Stream<Item = Result<Relationship, AppError>> + Send + 'a>>;

/// One index or constraint reported by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub labels_or_types: Option<Vec<String>>,
    #[serde(default)]
    pub properties: Option<Vec<String>>,
}

impl SchemaEntry {
    /// Returns true when the entry applies to the given label or relationship type.
    pub fn applies_to(&self, label: &str) -> bool {
        self.labels_or_types
            .as_ref()
            .is_some_and(|l| l.iter().any(|x| x == label))
    }
}

/// Indexes and constraints currently defined in the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSchema {
    pub indexes: Vec<SchemaEntry>,
    pub constraints: Vec<SchemaEntry>,
}

impl GraphSchema {
    pub fn indexes_for<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a SchemaEntry> {
        self.indexes.iter().filter(move |e| e.applies_to(label))
    }

    pub fn constraints_for<'a>(
        &'a self,
        label: &'a str,
    ) -> impl Iterator<Item = &'a SchemaEntry> {
        self.constraints.iter().filter(move |e| e.applies_to(label))
    }
}

/// One server component as reported by `dbms.components()`.
#[derive(Debug, Clone, PartialEq)]
pub struct DbmsComponent {
    pub name: String,
    pub versions: Vec<String>,
    pub edition: String,
}

impl DbmsComponent {
    /// The first reported version, e.g. `5.12.0`.
    pub fn version(&self) -> Option<&str> {
        self.versions.first().map(String::as_str)
    }
}

/// A live connection to the graph for one alias.
pub struct Backend {
    alias: String,
    url: String,
    options: ConnectionOptions,
    client: Box<dyn CypherExecutor>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("alias", &self.alias)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// Connects a backend for `alias` with exactly the given options.
    ///
    /// # Errors
    ///
    /// - [`AppError::MissingEndpoint`] when `URL` is absent or not a string,
    ///   before any I/O is attempted.
    /// - Whatever the connector reports while opening the connection.
    pub async fn connect(
        alias: &str,
        options: ConnectionOptions,
        connector: &dyn Connector,
    ) -> Result<Self, AppError> {
        let url = options
            .url()
            .ok_or_else(|| AppError::MissingEndpoint(alias.to_string()))?
            .to_string();

        tracing::info!(alias, url = %url, "Connecting backend");
        let client = connector.connect(alias, &url, &options).await?;

        Ok(Self {
            alias: alias.to_string(),
            url,
            options,
            client,
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The options this backend was constructed from.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Releases the underlying connection.
    pub async fn close(&self) -> Result<(), AppError> {
        tracing::debug!(alias = %self.alias, "Closing backend");
        self.client.close().await
    }

    async fn fetch_all(&self, stmt: Statement) -> Result<Vec<Row>, AppError> {
        self.client
            .query(&stmt.cypher)
            .params(stmt.params)
            .fetch_all()
            .await
    }

    async fn fetch_one(&self, stmt: Statement) -> Result<Option<Row>, AppError> {
        self.client
            .query(&stmt.cypher)
            .params(stmt.params)
            .fetch_one()
            .await
    }

    async fn execute_plan<S: Subgraph + ?Sized>(
        &self,
        subgraph: &mut S,
        plan: WritePlan,
    ) -> Result<(), AppError> {
        let row = self.fetch_one(plan.statement).await?.ok_or_else(|| {
            AppError::Decode("write statement returned no identities".to_string())
        })?;

        let mut nodes = subgraph.nodes_mut();
        for i in plan.new_nodes {
            let id = row.get(&format!("n{i}"))?;
            nodes[i].bind(id);
        }
        drop(nodes);

        let mut relationships = subgraph.relationships_mut();
        for j in plan.new_relationships {
            let id = row.get(&format!("r{j}"))?;
            relationships[j].bind(id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Creates every unbound node and relationship of `subgraph` and binds them.
    ///
    /// Bound entities are left untouched. Runs as one statement.
    pub async fn create<S: Subgraph + ?Sized>(&self, subgraph: &mut S) -> Result<(), AppError> {
        match statements::plan_write(&*subgraph, &WriteMode::Create)? {
            Some(plan) => self.execute_plan(subgraph, plan).await,
            None => Ok(()),
        }
    }

    /// Deletes the remote entities of `subgraph` and unbinds them locally.
    ///
    /// Nodes are detached first, so relationships not in `subgraph` are deleted too.
    pub async fn delete<S: Subgraph + ?Sized>(&self, subgraph: &mut S) -> Result<(), AppError> {
        let node_ids = subgraph.node_ids();
        let relationship_ids = subgraph.relationship_ids();
        if node_ids.is_empty() && relationship_ids.is_empty() {
            return Ok(());
        }

        let stmt = statements::delete_statement(node_ids, relationship_ids);
        self.client
            .query(&stmt.cypher)
            .params(stmt.params)
            .run()
            .await?;

        for rel in subgraph.relationships_mut() {
            rel.unbind();
        }
        for node in subgraph.nodes_mut() {
            node.unbind();
        }
        Ok(())
    }

    /// Deletes the remote relationships of `subgraph`, keeping its nodes.
    pub async fn separate<S: Subgraph + ?Sized>(&self, subgraph: &mut S) -> Result<(), AppError> {
        let relationship_ids = subgraph.relationship_ids();
        if relationship_ids.is_empty() {
            return Ok(());
        }

        let stmt = statements::separate_statement(relationship_ids);
        self.client
            .query(&stmt.cypher)
            .params(stmt.params)
            .run()
            .await?;

        for rel in subgraph.relationships_mut() {
            rel.unbind();
        }
        Ok(())
    }

    /// Deletes *all* nodes and relationships in the graph.
    ///
    /// This cannot be undone.
    pub async fn delete_all(&self) -> Result<(), AppError> {
        tracing::warn!(alias = %self.alias, "Deleting all nodes and relationships");
        self.client.query("MATCH (n) DETACH DELETE n").run().await
    }

    /// Creates or matches each unbound node on `label` and `property_keys`, then updates it.
    ///
    /// `label` defaults to each node's primary label and an empty
    /// `property_keys` merges on every property of the node. Relationships
    /// are merged between the resulting nodes.
    pub async fn merge<S: Subgraph + ?Sized>(
        &self,
        subgraph: &mut S,
        label: Option<&str>,
        property_keys: &[&str],
    ) -> Result<(), AppError> {
        let mode = WriteMode::Merge {
            label,
            keys: property_keys,
        };
        let Some(plan) = statements::plan_write(&*subgraph, &mode)? else {
            return Ok(());
        };
        let merged = plan.new_nodes.clone();
        self.execute_plan(subgraph, plan).await?;

        if let Some(label) = label {
            let mut nodes = subgraph.nodes_mut();
            for i in merged {
                nodes[i].add_label(label);
            }
        }
        Ok(())
    }

    /// Pushes local state to the server.
    ///
    /// Unbound entities are created first. Remote properties and labels of
    /// every bound entity are then replaced with the local ones.
    ///
    /// # Errors
    ///
    /// [`AppError::InvalidSubgraph`] for a relationship handle that was never
    /// pulled, before anything is sent. [`AppError::Unbound`] when an entity
    /// no longer exists remotely.
    pub async fn push<S: Subgraph + ?Sized>(&self, subgraph: &mut S) -> Result<(), AppError> {
        if let Some(id) = subgraph
            .relationships()
            .iter()
            .find(|r| !r.is_loaded())
            .and_then(|r| r.identity())
        {
            return Err(AppError::InvalidSubgraph(format!(
                "relationship {id} must be pulled before it is pushed"
            )));
        }
        self.create(subgraph).await?;

        let node_ids = subgraph.node_ids();
        let mut remote_labels = HashMap::new();
        if !node_ids.is_empty() {
            for row in self
                .fetch_all(statements::labels_statement(node_ids))
                .await?
            {
                let id: i64 = row.get("id")?;
                let labels: Vec<String> = row.get("labels")?;
                remote_labels.insert(id, labels);
            }
        }

        let Some(stmt) = statements::push_statement(&*subgraph, &remote_labels) else {
            return Ok(());
        };
        let pushed = match self.fetch_one(stmt).await? {
            Some(row) => row.get::<i64>("pushed")?,
            None => 0,
        };
        if pushed == 0 {
            return Err(AppError::Unbound(
                "one or more entities no longer exist remotely".to_string(),
            ));
        }
        Ok(())
    }

    /// Refreshes local state from the server.
    ///
    /// Entities that no longer exist remotely are unbound.
    pub async fn pull<S: Subgraph + ?Sized>(&self, subgraph: &mut S) -> Result<(), AppError> {
        let relationship_ids = subgraph.relationship_ids();
        if !relationship_ids.is_empty() {
            let mut remote = HashMap::new();
            for row in self
                .fetch_all(statements::pull_relationships_statement(relationship_ids))
                .await?
            {
                let id: i64 = row.get("id")?;
                remote.insert(id, row);
            }
            for rel in subgraph.relationships_mut() {
                let Some(id) = rel.identity() else { continue };
                match remote.get(&id) {
                    Some(row) => rel.refresh(
                        row.get("type")?,
                        row.get("start")?,
                        row.get("end")?,
                        row.get_opt("properties")?.unwrap_or_default(),
                    ),
                    None => rel.unbind(),
                }
            }
        }

        let node_ids = subgraph.node_ids();
        if !node_ids.is_empty() {
            let mut remote = HashMap::new();
            for row in self
                .fetch_all(statements::pull_nodes_statement(node_ids))
                .await?
            {
                let node = Node::from_row(&row, "")?;
                if let Some(id) = node.identity() {
                    remote.insert(id, node);
                }
            }
            for node in subgraph.nodes_mut() {
                let Some(id) = node.identity() else { continue };
                match remote.get(&id) {
                    Some(fresh) => node.refresh(
                        fresh.labels().map(str::to_string).collect(),
                        fresh.properties().clone(),
                    ),
                    None => node.unbind(),
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Runs a statement and returns its rows as a lazy stream.
    pub async fn run(&self, statement: &str, params: Params) -> Result<RowStream<'_>, AppError> {
        self.client.query(statement).params(params).execute().await
    }

    /// Runs a statement and returns the first value of the first record.
    pub async fn evaluate(
        &self,
        statement: &str,
        params: Params,
    ) -> Result<Option<JsonValue>, AppError> {
        self.client
            .query(statement)
            .params(params)
            .fetch_value()
            .await
    }

    /// Yields nodes with `label`, optionally filtered by one property.
    ///
    /// Nothing is sent until the stream is first polled; each call issues
    /// its own statement. An array filter value matches any of its elements.
    pub fn find(
        &self,
        label: &str,
        filter: Option<(&str, JsonValue)>,
        limit: Option<usize>,
    ) -> NodeStream<'_> {
        let stmt = statements::find_statement(label, filter, limit);
        Box::pin(async_stream::try_stream! {
            let mut rows = self
                .client
                .query(&stmt.cypher)
                .params(stmt.params)
                .execute()
                .await?;
            while let Some(row) = rows.next().await {
                let row = row?;
                yield Node::from_row(&row, "")?;
            }
        })
    }

    /// Returns one node matching the filter, if any.
    ///
    /// Does not fail when several match; which one wins is up to the server.
    pub async fn find_one(
        &self,
        label: &str,
        filter: Option<(&str, JsonValue)>,
    ) -> Result<Option<Node>, AppError> {
        self.find(label, filter, Some(1)).next().await.transpose()
    }

    /// Yields relationships matching optional endpoints and type.
    ///
    /// `bidirectional` also matches relationships stored in the reverse
    /// direction. Endpoint nodes must be bound.
    pub fn match_relationships(
        &self,
        start: Option<&Node>,
        rel_type: Option<&str>,
        end: Option<&Node>,
        bidirectional: bool,
        limit: Option<usize>,
    ) -> Result<RelationshipStream<'_>, AppError> {
        let start = endpoint_identity(start, "start node")?;
        let end = endpoint_identity(end, "end node")?;
        let stmt = statements::match_statement(start, rel_type, end, bidirectional, limit);

        Ok(Box::pin(async_stream::try_stream! {
            let mut rows = self
                .client
                .query(&stmt.cypher)
                .params(stmt.params)
                .execute()
                .await?;
            while let Some(row) = rows.next().await {
                let row = row?;
                yield Relationship::from_row(&row)?;
            }
        }))
    }

    /// Returns one relationship matching the criteria, if any.
    pub async fn match_one(
        &self,
        start: Option<&Node>,
        rel_type: Option<&str>,
        end: Option<&Node>,
        bidirectional: bool,
    ) -> Result<Option<Relationship>, AppError> {
        self.match_relationships(start, rel_type, end, bidirectional, Some(1))?
            .next()
            .await
            .transpose()
    }

    /// Returns a handle for the remote node `id` without fetching it.
    ///
    /// The node may not exist; nothing is verified until an operation touches it.
    pub fn node(&self, id: i64) -> Node {
        Node::bound(id)
    }

    /// Returns a handle for the remote relationship `id` without fetching it.
    ///
    /// Type and endpoints are loaded by [`pull`](Self::pull). Until then the
    /// handle contributes no nodes to any operation.
    pub fn relationship(&self, id: i64) -> Relationship {
        Relationship::bound(id)
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Total degree of all bound nodes in `subgraph`.
    ///
    /// Endpoints of relationship handles that were never pulled are not counted.
    pub async fn degree<S: Subgraph + ?Sized>(&self, subgraph: &S) -> Result<i64, AppError> {
        let node_ids = subgraph.node_ids();
        if node_ids.is_empty() {
            return Ok(0);
        }
        match self.fetch_one(statements::degree_statement(node_ids)).await? {
            Some(row) => row.get("degree"),
            None => Ok(0),
        }
    }

    /// Returns true when every entity of `subgraph` is bound and still exists remotely.
    ///
    /// A relationship handle is checked by its own identity only.
    pub async fn exists<S: Subgraph + ?Sized>(&self, subgraph: &S) -> Result<bool, AppError> {
        let nodes = subgraph.nodes();
        let relationships = subgraph.relationships();
        if nodes.iter().any(|n| !n.is_bound()) || relationships.iter().any(|r| !r.is_bound()) {
            return Ok(false);
        }

        let node_ids: BTreeSet<i64> = subgraph.node_ids().into_iter().collect();
        let relationship_ids: BTreeSet<i64> = subgraph.relationship_ids().into_iter().collect();
        if node_ids.is_empty() && relationship_ids.is_empty() {
            return Ok(true);
        }

        let stmt = statements::exists_statement(
            node_ids.iter().copied().collect(),
            relationship_ids.iter().copied().collect(),
        );
        let Some(row) = self.fetch_one(stmt).await? else {
            return Ok(false);
        };
        let found_nodes: usize = row.get("nodes")?;
        let found_relationships: usize = row.get("relationships")?;
        Ok(found_nodes == node_ids.len() && found_relationships == relationship_ids.len())
    }

    /// Labels currently defined in the graph, fetched on every call.
    pub async fn node_labels(&self) -> Result<BTreeSet<String>, AppError> {
        self.string_column("CALL db.labels() YIELD label RETURN label", "label")
            .await
    }

    /// Relationship types currently defined in the graph, fetched on every call.
    pub async fn relationship_types(&self) -> Result<BTreeSet<String>, AppError> {
        self.string_column(
            "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType",
            "relationshipType",
        )
        .await
    }

    /// Components of the server this backend is connected to.
    pub async fn dbms(&self) -> Result<Vec<DbmsComponent>, AppError> {
        const CYPHER: &str = "CALL dbms.components() YIELD name, versions, edition \
                              RETURN name, versions, edition";

        let rows = self.client.query(CYPHER).fetch_all().await?;
        rows.into_iter()
            .map(|row| {
                Ok(DbmsComponent {
                    name: row.get("name")?,
                    versions: row.get("versions")?,
                    edition: row.get("edition")?,
                })
            })
            .collect()
    }

    /// Indexes and constraints, fetched on every call.
    pub async fn schema(&self) -> Result<GraphSchema, AppError> {
        const COLUMNS: &str = "YIELD name, type, entityType, labelsOrTypes, properties \
                               RETURN name, type, entityType, labelsOrTypes, properties";

        let indexes = self
            .client
            .query(&format!("SHOW INDEXES {COLUMNS}"))
            .fetch_all()
            .await?;
        let constraints = self
            .client
            .query(&format!("SHOW CONSTRAINTS {COLUMNS}"))
            .fetch_all()
            .await?;

        Ok(GraphSchema {
            indexes: decode_entries(indexes)?,
            constraints: decode_entries(constraints)?,
        })
    }

    async fn string_column(
        &self,
        cypher: &str,
        column: &str,
    ) -> Result<BTreeSet<String>, AppError> {
        self.client
            .query(cypher)
            .fetch_all()
            .await?
            .iter()
            .map(|row| row.get::<String>(column))
            .collect()
    }
}

fn endpoint_identity(node: Option<&Node>, what: &str) -> Result<Option<i64>, AppError> {
    match node {
        None => Ok(None),
        Some(node) => node
            .identity()
            .map(Some)
            .ok_or_else(|| AppError::Unbound(what.to_string())),
    }
}

fn decode_entries(rows: Vec<Row>) -> Result<Vec<SchemaEntry>, AppError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(JsonValue::Object(row.into_inner()))
                .map_err(|e| AppError::Decode(format!("invalid schema entry: {}", e)))
        })
        .collect()
}

// Forward CypherExecutor to the underlying client so callers can build queries directly.
#[async_trait]
impl CypherExecutor for Backend {
    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Params,
    ) -> Result<RowStream<'_>, AppError> {
        self.client.execute_cypher(cypher, params).await
    }

    async fn run_cypher(&self, cypher: &str, params: Params) -> Result<(), AppError> {
        self.client.run_cypher(cypher, params).await
    }

    async fn close(&self) -> Result<(), AppError> {
        self.client.close().await
    }
}

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::json;

use super::*;
use crate::graph::Properties;

/// Records every statement and answers with queued row sets.
#[derive(Default)]
struct Script {
    calls: Mutex<Vec<(String, Params)>>,
    responses: Mutex<VecDeque<Vec<Row>>>,
    urls: Mutex<Vec<String>>,
}

impl Script {
    fn respond(&self, rows: Vec<Row>) -> &Self {
        self.responses.lock().unwrap().push_back(rows);
        self
    }

    fn calls(&self) -> Vec<(String, Params)> {
        self.calls.lock().unwrap().clone()
    }
}

struct ScriptedExecutor(Arc<Script>);

#[async_trait]
impl CypherExecutor for ScriptedExecutor {
    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Params,
    ) -> Result<RowStream<'_>, AppError> {
        self.0
            .calls
            .lock()
            .unwrap()
            .push((cypher.to_string(), params));
        let rows = self.0.responses.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(rows.into_iter().map(Ok::<Row, AppError>))))
    }
}

struct ScriptedConnector(Arc<Script>);

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        _alias: &str,
        url: &str,
        _options: &ConnectionOptions,
    ) -> Result<Box<dyn CypherExecutor>, AppError> {
        self.0.urls.lock().unwrap().push(url.to_string());
        Ok(Box::new(ScriptedExecutor(self.0.clone())))
    }
}

async fn backend() -> (Backend, Arc<Script>) {
    let script = Arc::new(Script::default());
    let options = ConnectionOptions::new().with("URL", "bolt://localhost:7687");
    let backend = Backend::connect("default", options, &ScriptedConnector(script.clone()))
        .await
        .unwrap();
    (backend, script)
}

fn person(name: &str) -> Node {
    Node::new(["Person"], Properties::new()).with_property("name", name)
}

fn node_row(id: i64, labels: serde_json::Value, properties: serde_json::Value) -> Row {
    Row::from_pairs([
        ("id", json!(id)),
        ("labels", labels),
        ("properties", properties),
    ])
}

#[tokio::test]
async fn test_connect_passes_url_verbatim() {
    let script = Arc::new(Script::default());
    let options = ConnectionOptions::new()
        .with("URL", "neo4j+s://user:pw@example.com:7687/db?x=1")
        .with("USER", "neo4j");

    let backend = Backend::connect("other", options.clone(), &ScriptedConnector(script.clone()))
        .await
        .unwrap();

    assert_eq!(backend.alias(), "other");
    assert_eq!(backend.options(), &options);
    assert_eq!(
        script.urls.lock().unwrap().as_slice(),
        ["neo4j+s://user:pw@example.com:7687/db?x=1"]
    );
}

#[tokio::test]
async fn test_connect_without_url_does_no_io() {
    let script = Arc::new(Script::default());
    let options = ConnectionOptions::new().with("USER", "neo4j");

    let err = Backend::connect("invalid", options, &ScriptedConnector(script.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::MissingEndpoint(ref alias) if alias == "invalid"));
    assert!(script.urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_rejects_non_string_url() {
    let script = Arc::new(Script::default());
    let options = ConnectionOptions::new().with("URL", 7687);

    let err = Backend::connect("default", options, &ScriptedConnector(script))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingEndpoint(_)));
}

#[tokio::test]
async fn test_create_binds_new_entities() {
    let (backend, script) = backend().await;
    script.respond(vec![Row::from_pairs([
        ("n0", json!(1)),
        ("n1", json!(2)),
        ("r0", json!(9)),
    ])]);

    let mut rel = Relationship::new(person("Keanu"), "KNOWS", person("Carrie"));
    backend.create(&mut rel).await.unwrap();

    assert_eq!(rel.identity(), Some(9));
    assert_eq!(rel.start().identity(), Some(1));
    assert_eq!(rel.end().identity(), Some(2));
    assert_eq!(script.calls().len(), 1);
}

#[tokio::test]
async fn test_create_bound_node_sends_nothing() {
    let (backend, script) = backend().await;
    let mut node = Node::bound(4);

    backend.create(&mut node).await.unwrap();
    assert!(script.calls().is_empty());
}

#[tokio::test]
async fn test_delete_unbinds() {
    let (backend, script) = backend().await;
    let mut node = person("Keanu");
    node.bind(5);

    backend.delete(&mut node).await.unwrap();

    assert!(!node.is_bound());
    let calls = script.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1["nodes"], json!([5]));
}

#[tokio::test]
async fn test_separate_keeps_nodes() {
    let (backend, script) = backend().await;
    let mut rel = Relationship::new(Node::bound(1), "KNOWS", Node::bound(2));
    rel.bind(3);

    backend.separate(&mut rel).await.unwrap();

    assert!(!rel.is_bound());
    assert!(rel.start().is_bound());
    assert_eq!(script.calls()[0].1["relationships"], json!([3]));
}

#[tokio::test]
async fn test_merge_adds_label_locally() {
    let (backend, script) = backend().await;
    script.respond(vec![Row::from_pairs([("n0", json!(11))])]);

    let mut node = Node::new(Vec::<String>::new(), Properties::new()).with_property("email", "a@b");
    backend
        .merge(&mut node, Some("Person"), &["email"])
        .await
        .unwrap();

    assert_eq!(node.identity(), Some(11));
    assert!(node.has_label("Person"));
    assert!(script.calls()[0].0.starts_with("MERGE (n0:`Person` {`email`: $n0_k0})"));
}

#[tokio::test]
async fn test_push_overwrites_remote_state() {
    let (backend, script) = backend().await;
    script
        .respond(vec![Row::from_pairs([
            ("id", json!(3)),
            ("labels", json!(["Person", "Old"])),
        ])])
        .respond(vec![Row::from_pairs([("pushed", json!(1))])]);

    let mut node = person("Keanu");
    node.bind(3);
    backend.push(&mut node).await.unwrap();

    let calls = script.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].0.contains("REMOVE n0:`Old`"));
    assert_eq!(calls[1].1["n0_props"], json!({"name": "Keanu"}));
}

#[tokio::test]
async fn test_push_missing_entity_fails() {
    let (backend, script) = backend().await;
    script
        .respond(vec![])
        .respond(vec![Row::from_pairs([("pushed", json!(0))])]);

    let mut node = person("Keanu");
    node.bind(3);
    let err = backend.push(&mut node).await.unwrap_err();
    assert!(matches!(err, AppError::Unbound(_)));
}

#[tokio::test]
async fn test_pull_refreshes_and_unbinds_missing() {
    let (backend, script) = backend().await;
    script.respond(vec![node_row(1, json!(["Person", "Actor"]), json!({"name": "Keanu Reeves"}))]);

    let mut nodes = vec![person("Keanu"), person("Gone")];
    nodes[0].bind(1);
    nodes[1].bind(2);
    backend.pull(&mut nodes).await.unwrap();

    assert_eq!(nodes[0].get("name"), Some(&json!("Keanu Reeves")));
    assert!(nodes[0].has_label("Actor"));
    assert!(!nodes[1].is_bound());
}

#[tokio::test]
async fn test_evaluate_returns_first_value() {
    let (backend, script) = backend().await;
    script.respond(vec![Row::from_pairs([("x", json!(42)), ("y", json!(0))])]);

    let value = backend.evaluate("RETURN 42 AS x, 0 AS y", Params::new()).await.unwrap();
    assert_eq!(value, Some(json!(42)));
}

#[tokio::test]
async fn test_evaluate_without_rows() {
    let (backend, _script) = backend().await;
    let value = backend.evaluate("MATCH (n:Nothing) RETURN n", Params::new()).await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn test_find_is_lazy() {
    let (backend, script) = backend().await;
    script.respond(vec![
        node_row(1, json!(["Person"]), json!({"name": "a"})),
        node_row(2, json!(["Person"]), json!({"name": "b"})),
    ]);

    let stream = backend.find("Person", Some(("name", json!(["a", "b"]))), None);
    assert!(script.calls().is_empty());

    let nodes: Vec<Node> = stream.try_collect().await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[1].identity(), Some(2));
    assert_eq!(script.calls()[0].1["value"], json!(["a", "b"]));
}

#[tokio::test]
async fn test_find_one_none() {
    let (backend, script) = backend().await;
    let found = backend.find_one("Person", None).await.unwrap();
    assert!(found.is_none());
    assert_eq!(script.calls()[0].1["limit"], json!(1));
}

#[tokio::test]
async fn test_match_one_decodes_endpoints() {
    let (backend, script) = backend().await;
    script.respond(vec![Row::from_pairs([
        ("id", json!(7)),
        ("type", json!("KNOWS")),
        ("properties", json!({"since": 1999})),
        ("start_id", json!(1)),
        ("start_labels", json!(["Person"])),
        ("start_properties", json!({"name": "a"})),
        ("end_id", json!(2)),
        ("end_labels", json!(["Person"])),
        ("end_properties", json!({"name": "b"})),
    ])]);

    let rel = backend
        .match_one(Some(&Node::bound(1)), Some("KNOWS"), None, false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(rel.identity(), Some(7));
    assert_eq!(rel.rel_type(), "KNOWS");
    assert_eq!(rel.end().get("name"), Some(&json!("b")));
}

#[tokio::test]
async fn test_match_with_unbound_endpoint_fails() {
    let (backend, _script) = backend().await;
    let result = backend.match_relationships(Some(&person("a")), None, None, false, None);
    assert!(matches!(result, Err(AppError::Unbound(_))));
}

#[tokio::test]
async fn test_node_handle_does_no_io() {
    let (backend, script) = backend().await;
    let node = backend.node(123);
    assert_eq!(node.identity(), Some(123));
    assert!(script.calls().is_empty());
}

#[tokio::test]
async fn test_exists() {
    let (backend, script) = backend().await;
    assert!(!backend.exists(&person("a")).await.unwrap());
    assert!(backend.exists(&Vec::<Node>::new()).await.unwrap());
    assert!(script.calls().is_empty());

    script.respond(vec![Row::from_pairs([
        ("nodes", json!(1)),
        ("relationships", json!(0)),
    ])]);
    assert!(backend.exists(&Node::bound(1)).await.unwrap());
}

#[tokio::test]
async fn test_exists_checks_relationship_handle_remotely() {
    let (backend, script) = backend().await;
    script.respond(vec![Row::from_pairs([
        ("nodes", json!(0)),
        ("relationships", json!(1)),
    ])]);

    let handle = backend.relationship(5);
    assert!(backend.exists(&handle).await.unwrap());

    let calls = script.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1["nodes"], json!([]));
    assert_eq!(calls[0].1["relationships"], json!([5]));
}

#[tokio::test]
async fn test_degree_ignores_unloaded_endpoints() {
    let (backend, script) = backend().await;
    assert_eq!(backend.degree(&backend.relationship(5)).await.unwrap(), 0);
    assert!(script.calls().is_empty());
}

#[tokio::test]
async fn test_push_relationship_handle_is_refused() {
    let (backend, script) = backend().await;
    let mut handle = backend.relationship(5).with_property("since", 1999);

    let err = backend.push(&mut handle).await.unwrap_err();

    assert!(matches!(err, AppError::InvalidSubgraph(_)));
    assert!(script.calls().is_empty());
    assert_eq!(handle.identity(), Some(5));
}

#[tokio::test]
async fn test_pulled_relationship_handle_pushes_without_creating() {
    let (backend, script) = backend().await;
    script
        .respond(vec![Row::from_pairs([
            ("id", json!(5)),
            ("type", json!("KNOWS")),
            ("properties", json!({"since": 1999})),
            ("start", json!(1)),
            ("end", json!(2)),
        ])])
        .respond(vec![
            node_row(1, json!(["Person"]), json!({"name": "Keanu"})),
            node_row(2, json!(["Person"]), json!({"name": "Carrie"})),
        ])
        .respond(vec![])
        .respond(vec![Row::from_pairs([("pushed", json!(1))])]);

    let mut handle = backend.relationship(5);
    backend.pull(&mut handle).await.unwrap();
    assert!(handle.is_loaded());
    assert_eq!(handle.rel_type(), "KNOWS");
    assert_eq!(handle.start().get("name"), Some(&json!("Keanu")));

    backend.push(&mut handle).await.unwrap();

    let calls = script.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls.iter().all(|(cypher, _)| !cypher.contains("CREATE")));
    assert_eq!(calls[3].1["r0_props"], json!({"since": 1999}));
}

#[tokio::test]
async fn test_create_refuses_unloaded_unbound_relationship() {
    let (backend, script) = backend().await;
    script.respond(vec![]);

    // A handle that turned out to be missing remotely
    let mut handle = backend.relationship(5);
    backend.pull(&mut handle).await.unwrap();
    assert!(!handle.is_bound());

    let err = backend.create(&mut handle).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidSubgraph(_)));
    assert_eq!(script.calls().len(), 1);
}

#[tokio::test]
async fn test_dbms_components() {
    let (backend, script) = backend().await;
    script.respond(vec![Row::from_pairs([
        ("name", json!("Neo4j Kernel")),
        ("versions", json!(["5.12.0"])),
        ("edition", json!("community")),
    ])]);

    let components = backend.dbms().await.unwrap();

    assert_eq!(components.len(), 1);
    assert_eq!(components[0].version(), Some("5.12.0"));
    assert_eq!(components[0].edition, "community");
    assert!(script.calls()[0].0.starts_with("CALL dbms.components()"));
}

#[tokio::test]
async fn test_degree() {
    let (backend, script) = backend().await;
    script.respond(vec![Row::from_pairs([("degree", json!(3))])]);
    assert_eq!(backend.degree(&Node::bound(1)).await.unwrap(), 3);
}

#[tokio::test]
async fn test_metadata_is_fetched_every_call() {
    let (backend, script) = backend().await;
    script
        .respond(vec![Row::from_pairs([("label", json!("Person"))])])
        .respond(vec![
            Row::from_pairs([("label", json!("Person"))]),
            Row::from_pairs([("label", json!("Movie"))]),
        ]);

    let first = backend.node_labels().await.unwrap();
    let second = backend.node_labels().await.unwrap();

    assert_eq!(first.len(), 1);
    assert!(second.contains("Movie"));
    assert_eq!(script.calls().len(), 2);
}

#[tokio::test]
async fn test_schema_decodes_entries() {
    let (backend, script) = backend().await;
    script
        .respond(vec![Row::from_pairs([
            ("name", json!("person_name")),
            ("type", json!("RANGE")),
            ("entityType", json!("NODE")),
            ("labelsOrTypes", json!(["Person"])),
            ("properties", json!(["name"])),
        ])])
        .respond(vec![]);

    let schema = backend.schema().await.unwrap();
    assert_eq!(schema.indexes_for("Person").count(), 1);
    assert_eq!(schema.indexes[0].kind, "RANGE");
    assert!(schema.constraints.is_empty());
}

//! Cypher generation for backend operations.
//!
//! Every builder here is pure: it turns local graph values into a single
//! autocommit statement plus its parameters. Node variables are `n{i}` and
//! relationship variables `r{j}`, where `i`/`j` are positions in
//! [`Subgraph::nodes`] and [`Subgraph::relationships`].

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::graph::cypher::{label_clause, node_projection, quote_name};
use crate::graph::{Node, Params, Subgraph};

/// A statement ready to hand to an executor.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub cypher: String,
    pub params: Params,
}

/// A write statement plus the entities whose identities it returns.
///
/// Columns `n{i}` / `r{j}` of the single result row hold the new identities.
#[derive(Debug)]
pub(crate) struct WritePlan {
    pub statement: Statement,
    pub new_nodes: Vec<usize>,
    pub new_relationships: Vec<usize>,
}

pub(crate) enum WriteMode<'a> {
    Create,
    Merge {
        label: Option<&'a str>,
        keys: &'a [&'a str],
    },
}

fn position_of(nodes: &[&Node], target: &Node) -> Option<usize> {
    nodes.iter().position(|n| std::ptr::eq(*n, target))
}

/// Plans creation or merging of every unbound entity in `subgraph`.
///
/// Bound nodes are matched by identity when an unbound relationship needs
/// them. Returns `None` when nothing is unbound.
pub(crate) fn plan_write<S: Subgraph + ?Sized>(
    subgraph: &S,
    mode: &WriteMode<'_>,
) -> Result<Option<WritePlan>, AppError> {
    let nodes = subgraph.nodes();
    let relationships = subgraph.relationships();

    let mut needed = vec![false; nodes.len()];
    let mut endpoints = Vec::new();
    for (j, rel) in relationships.iter().enumerate() {
        if rel.is_bound() {
            continue;
        }
        if !rel.is_loaded() {
            return Err(AppError::InvalidSubgraph(
                "relationship type and endpoints were never loaded".to_string(),
            ));
        }
        if rel.rel_type().is_empty() {
            return Err(AppError::InvalidSubgraph(
                "relationship has no type".to_string(),
            ));
        }
        let start = position_of(&nodes, rel.start());
        let end = position_of(&nodes, rel.end());
        let (Some(start), Some(end)) = (start, end) else {
            return Err(AppError::InvalidSubgraph(
                "relationship endpoints are not enumerated as nodes".to_string(),
            ));
        };
        needed[start] = true;
        needed[end] = true;
        endpoints.push((j, start, end));
    }

    let mut params = Params::new();
    let mut matches = Vec::new();
    let mut writes = Vec::new();
    let mut returns = Vec::new();
    let mut new_nodes = Vec::new();

    for (i, node) in nodes.iter().enumerate() {
        let var = format!("n{i}");
        match node.identity() {
            Some(id) if needed[i] => {
                matches.push(format!("MATCH ({var}) WHERE id({var}) = ${var}"));
                params.insert(var, id.into());
            }
            Some(_) => {}
            None => {
                writes.push(node_write(&var, node, mode, &mut params)?);
                returns.push(format!("id({var}) AS {var}"));
                new_nodes.push(i);
            }
        }
    }

    let mut new_relationships = Vec::new();
    for (j, start, end) in endpoints {
        let rel = relationships[j];
        let var = format!("r{j}");
        let props = format!("{var}_props");
        let rel_type = quote_name(rel.rel_type());
        writes.push(match mode {
            WriteMode::Create => {
                format!("CREATE (n{start})-[{var}:{rel_type} ${props}]->(n{end})")
            }
            WriteMode::Merge { .. } => {
                format!("MERGE (n{start})-[{var}:{rel_type}]->(n{end}) SET {var} += ${props}")
            }
        });
        params.insert(props, JsonValue::Object(rel.properties().clone()));
        returns.push(format!("id({var}) AS {var}"));
        new_relationships.push(j);
    }

    if returns.is_empty() {
        return Ok(None);
    }

    let mut clauses = matches;
    clauses.extend(writes);
    clauses.push(format!("RETURN {}", returns.join(", ")));

    Ok(Some(WritePlan {
        statement: Statement {
            cypher: clauses.join(" "),
            params,
        },
        new_nodes,
        new_relationships,
    }))
}

fn node_write(
    var: &str,
    node: &Node,
    mode: &WriteMode<'_>,
    params: &mut Params,
) -> Result<String, AppError> {
    let props = format!("{var}_props");
    params.insert(props.clone(), JsonValue::Object(node.properties().clone()));

    let (label, keys) = match mode {
        WriteMode::Create => {
            let labels = label_clause(node.labels());
            return Ok(format!("CREATE ({var}{labels} ${props})"));
        }
        WriteMode::Merge { label, keys } => (label.or(node.primary_label()), *keys),
    };

    let keys: Vec<&str> = if keys.is_empty() {
        node.properties().keys().map(String::as_str).collect()
    } else {
        keys.to_vec()
    };
    if label.is_none() && keys.is_empty() {
        return Err(AppError::InvalidSubgraph(
            "cannot merge a node without a label or properties".to_string(),
        ));
    }

    let mut key_parts = Vec::with_capacity(keys.len());
    for (k, key) in keys.iter().enumerate() {
        let value = node
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| AppError::InvalidSubgraph(format!("merge key '{key}' is missing")))?;
        let param = format!("{var}_k{k}");
        key_parts.push(format!("{}: ${param}", quote_name(key)));
        params.insert(param, value.clone());
    }

    let pattern_props = if key_parts.is_empty() {
        String::new()
    } else {
        format!(" {{{}}}", key_parts.join(", "))
    };
    let primary = label.map(|l| label_clause([l])).unwrap_or_default();

    let mut sets = vec![format!("{var} += ${props}")];
    let extra = label_clause(node.labels().filter(|l| Some(*l) != label));
    if !extra.is_empty() {
        sets.push(format!("{var}{extra}"));
    }

    Ok(format!(
        "MERGE ({var}{primary}{pattern_props}) SET {}",
        sets.join(", ")
    ))
}

/// Overwrites remote properties and label sets of every bound entity.
///
/// `remote_labels` holds the current server-side labels per node identity so
/// labels removed locally can be removed remotely. The statement returns a
/// single `pushed` count, zero when any entity no longer exists.
pub(crate) fn push_statement<S: Subgraph + ?Sized>(
    subgraph: &S,
    remote_labels: &HashMap<i64, Vec<String>>,
) -> Option<Statement> {
    let mut params = Params::new();
    let mut matches = Vec::new();
    let mut sets = Vec::new();
    let mut removes = Vec::new();

    for (i, node) in subgraph.nodes().iter().enumerate() {
        let Some(id) = node.identity() else { continue };
        let var = format!("n{i}");
        matches.push(format!("MATCH ({var}) WHERE id({var}) = ${var}"));
        params.insert(var.clone(), id.into());

        let props = format!("{var}_props");
        sets.push(format!("{var} = ${props}"));
        params.insert(props, JsonValue::Object(node.properties().clone()));

        let labels = label_clause(node.labels());
        if !labels.is_empty() {
            sets.push(format!("{var}{labels}"));
        }

        let stale: Vec<&str> = remote_labels
            .get(&id)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|l| !node.has_label(l))
            .collect();
        if !stale.is_empty() {
            removes.push(format!("{var}{}", label_clause(stale)));
        }
    }

    for (j, rel) in subgraph.relationships().iter().enumerate() {
        let Some(id) = rel.identity() else { continue };
        let var = format!("r{j}");
        matches.push(format!("MATCH ()-[{var}]->() WHERE id({var}) = ${var}"));
        params.insert(var.clone(), id.into());

        let props = format!("{var}_props");
        sets.push(format!("{var} = ${props}"));
        params.insert(props, JsonValue::Object(rel.properties().clone()));
    }

    if matches.is_empty() {
        return None;
    }

    let mut cypher = format!("{} SET {}", matches.join(" "), sets.join(", "));
    if !removes.is_empty() {
        cypher.push_str(&format!(" REMOVE {}", removes.join(", ")));
    }
    cypher.push_str(" RETURN count(*) AS pushed");

    Some(Statement { cypher, params })
}

/// Current labels of the given nodes.
pub(crate) fn labels_statement(node_ids: Vec<i64>) -> Statement {
    statement(
        "MATCH (n) WHERE id(n) IN $ids RETURN id(n) AS id, labels(n) AS labels",
        [("ids", node_ids.into())],
    )
}

/// Remote state of the given nodes.
pub(crate) fn pull_nodes_statement(node_ids: Vec<i64>) -> Statement {
    statement(
        &format!(
            "MATCH (n) WHERE id(n) IN $ids RETURN {}",
            node_projection("n", "")
        ),
        [("ids", node_ids.into())],
    )
}

/// Remote state of the given relationships, endpoints as identities.
pub(crate) fn pull_relationships_statement(relationship_ids: Vec<i64>) -> Statement {
    statement(
        "MATCH (a)-[r]->(b) WHERE id(r) IN $ids \
         RETURN id(r) AS id, type(r) AS type, properties(r) AS properties, \
         id(a) AS start, id(b) AS end",
        [("ids", relationship_ids.into())],
    )
}

/// Deletes relationships, then detaches and deletes nodes.
pub(crate) fn delete_statement(node_ids: Vec<i64>, relationship_ids: Vec<i64>) -> Statement {
    statement(
        "OPTIONAL MATCH ()-[r]->() WHERE id(r) IN $relationships DELETE r \
         WITH count(*) AS _ \
         OPTIONAL MATCH (n) WHERE id(n) IN $nodes DETACH DELETE n",
        [
            ("nodes", node_ids.into()),
            ("relationships", relationship_ids.into()),
        ],
    )
}

/// Deletes relationships only.
pub(crate) fn separate_statement(relationship_ids: Vec<i64>) -> Statement {
    statement(
        "MATCH ()-[r]->() WHERE id(r) IN $relationships DELETE r",
        [("relationships", relationship_ids.into())],
    )
}

pub(crate) fn degree_statement(node_ids: Vec<i64>) -> Statement {
    statement(
        "MATCH (n)-[r]-() WHERE id(n) IN $ids RETURN count(r) AS degree",
        [("ids", node_ids.into())],
    )
}

pub(crate) fn exists_statement(node_ids: Vec<i64>, relationship_ids: Vec<i64>) -> Statement {
    statement(
        "OPTIONAL MATCH (n) WHERE id(n) IN $nodes \
         WITH count(DISTINCT n) AS nodes \
         OPTIONAL MATCH ()-[r]->() WHERE id(r) IN $relationships \
         RETURN nodes, count(DISTINCT r) AS relationships",
        [
            ("nodes", node_ids.into()),
            ("relationships", relationship_ids.into()),
        ],
    )
}

/// Nodes with `label`, optionally filtered on one property.
///
/// An array filter value matches any of its elements.
pub(crate) fn find_statement(
    label: &str,
    filter: Option<(&str, JsonValue)>,
    limit: Option<usize>,
) -> Statement {
    let mut params = Params::new();
    let mut cypher = format!("MATCH (n{})", label_clause([label]));

    if let Some((key, value)) = filter {
        let op = if value.is_array() { "IN" } else { "=" };
        cypher.push_str(&format!(" WHERE n.{} {op} $value", quote_name(key)));
        params.insert("value".to_string(), value);
    }

    cypher.push_str(&format!(" RETURN {}", node_projection("n", "")));
    push_limit(&mut cypher, &mut params, limit);

    Statement { cypher, params }
}

/// Relationships matching optional endpoints and type.
///
/// Endpoint columns follow the stored direction even when matched bidirectionally.
pub(crate) fn match_statement(
    start: Option<i64>,
    rel_type: Option<&str>,
    end: Option<i64>,
    bidirectional: bool,
    limit: Option<usize>,
) -> Statement {
    let mut params = Params::new();
    let rel = rel_type
        .filter(|t| !t.is_empty())
        .map(|t| format!(":{}", quote_name(t)))
        .unwrap_or_default();
    let tail = if bidirectional { "-" } else { "->" };
    let mut cypher = format!("MATCH (a)-[r{rel}]{tail}(b)");

    let mut conditions = Vec::new();
    if let Some(id) = start {
        conditions.push("id(a) = $start");
        params.insert("start".to_string(), id.into());
    }
    if let Some(id) = end {
        conditions.push("id(b) = $end");
        params.insert("end".to_string(), id.into());
    }
    if !conditions.is_empty() {
        cypher.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
    }

    cypher.push_str(&format!(
        " WITH r, startNode(r) AS s, endNode(r) AS e \
         RETURN id(r) AS id, type(r) AS type, properties(r) AS properties, {}, {}",
        node_projection("s", "start_"),
        node_projection("e", "end_")
    ));
    push_limit(&mut cypher, &mut params, limit);

    Statement { cypher, params }
}

fn push_limit(cypher: &mut String, params: &mut Params, limit: Option<usize>) {
    if let Some(limit) = limit {
        cypher.push_str(" LIMIT $limit");
        params.insert("limit".to_string(), (limit as u64).into());
    }
}

fn statement<const N: usize>(cypher: &str, params: [(&str, JsonValue); N]) -> Statement {
    Statement {
        cypher: cypher.to_string(),
        params: params
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Properties, Relationship};
    use serde_json::json;

    fn person(name: &str) -> Node {
        Node::new(["Person"], Properties::new()).with_property("name", name)
    }

    #[test]
    fn test_plan_create_single_node() {
        let node = person("Keanu");
        let plan = plan_write(&node, &WriteMode::Create).unwrap().unwrap();

        assert_eq!(
            plan.statement.cypher,
            "CREATE (n0:`Person` $n0_props) RETURN id(n0) AS n0"
        );
        assert_eq!(plan.statement.params["n0_props"], json!({"name": "Keanu"}));
        assert_eq!(plan.new_nodes, vec![0]);
        assert!(plan.new_relationships.is_empty());
    }

    #[test]
    fn test_plan_create_relationship_matches_bound_endpoint() {
        let mut start = person("Keanu");
        start.bind(10);
        let rel = Relationship::new(start, "ACTED_IN", Node::new(["Movie"], Properties::new()))
            .with_property("role", "Neo");

        let plan = plan_write(&rel, &WriteMode::Create).unwrap().unwrap();

        assert_eq!(
            plan.statement.cypher,
            "MATCH (n0) WHERE id(n0) = $n0 \
             CREATE (n1:`Movie` $n1_props) \
             CREATE (n0)-[r0:`ACTED_IN` $r0_props]->(n1) \
             RETURN id(n1) AS n1, id(r0) AS r0"
        );
        assert_eq!(plan.statement.params["n0"], json!(10));
        assert_eq!(plan.statement.params["r0_props"], json!({"role": "Neo"}));
        assert_eq!(plan.new_nodes, vec![1]);
        assert_eq!(plan.new_relationships, vec![0]);
    }

    #[test]
    fn test_plan_create_everything_bound_is_noop() {
        let mut node = person("Keanu");
        node.bind(1);
        assert!(plan_write(&node, &WriteMode::Create).unwrap().is_none());
    }

    #[test]
    fn test_plan_create_skips_relationship_handle() {
        let rel = Relationship::bound(5);
        assert!(plan_write(&rel, &WriteMode::Create).unwrap().is_none());
    }

    #[test]
    fn test_push_statement_on_handle_touches_only_the_relationship() {
        let stmt = push_statement(&Relationship::bound(5), &HashMap::new()).unwrap();
        assert_eq!(
            stmt.cypher,
            "MATCH ()-[r0]->() WHERE id(r0) = $r0 SET r0 = $r0_props RETURN count(*) AS pushed"
        );
    }

    #[test]
    fn test_plan_create_rejects_untyped_relationship() {
        let rel = Relationship::new(person("a"), "", person("b"));
        let err = plan_write(&rel, &WriteMode::Create).unwrap_err();
        assert!(matches!(err, AppError::InvalidSubgraph(_)));
    }

    #[test]
    fn test_plan_merge_on_explicit_key() {
        let node = Node::new(["Person", "Actor"], Properties::new())
            .with_property("name", "Keanu")
            .with_property("born", 1964);
        let keys = ["name"];
        let mode = WriteMode::Merge {
            label: None,
            keys: &keys,
        };

        let plan = plan_write(&node, &mode).unwrap().unwrap();
        assert_eq!(
            plan.statement.cypher,
            "MERGE (n0:`Person` {`name`: $n0_k0}) SET n0 += $n0_props, n0:`Actor` \
             RETURN id(n0) AS n0"
        );
        assert_eq!(plan.statement.params["n0_k0"], json!("Keanu"));
    }

    #[test]
    fn test_plan_merge_missing_key() {
        let node = person("Keanu");
        let keys = ["email"];
        let mode = WriteMode::Merge {
            label: Some("Person"),
            keys: &keys,
        };
        let err = plan_write(&node, &mode).unwrap_err();
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn test_plan_merge_without_label_or_properties() {
        let node = Node::default();
        let mode = WriteMode::Merge {
            label: None,
            keys: &[],
        };
        assert!(plan_write(&node, &mode).is_err());
    }

    #[test]
    fn test_push_statement_removes_stale_labels() {
        let mut node = person("Keanu");
        node.bind(3);
        let remote = HashMap::from([(3, vec!["Person".to_string(), "Extra".to_string()])]);

        let stmt = push_statement(&node, &remote).unwrap();
        assert_eq!(
            stmt.cypher,
            "MATCH (n0) WHERE id(n0) = $n0 SET n0 = $n0_props, n0:`Person` \
             REMOVE n0:`Extra` RETURN count(*) AS pushed"
        );
    }

    #[test]
    fn test_push_statement_skips_unbound() {
        assert!(push_statement(&person("Keanu"), &HashMap::new()).is_none());
    }

    #[test]
    fn test_find_statement_with_any_of_filter() {
        let stmt = find_statement("Person", Some(("name", json!(["a", "b"]))), Some(5));
        assert_eq!(
            stmt.cypher,
            "MATCH (n:`Person`) WHERE n.`name` IN $value \
             RETURN id(n) AS id, labels(n) AS labels, properties(n) AS properties LIMIT $limit"
        );
        assert_eq!(stmt.params["limit"], json!(5));
    }

    #[test]
    fn test_match_statement_bidirectional() {
        let stmt = match_statement(Some(1), Some("KNOWS"), None, true, None);
        assert!(stmt
            .cypher
            .starts_with("MATCH (a)-[r:`KNOWS`]-(b) WHERE id(a) = $start WITH r"));
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_match_statement_any() {
        let stmt = match_statement(None, None, None, false, Some(1));
        assert!(stmt.cypher.starts_with("MATCH (a)-[r]->(b) WITH r"));
        assert!(stmt.cypher.ends_with("LIMIT $limit"));
    }
}

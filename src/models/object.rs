//! Graph objects: structs stored as single labelled nodes.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::backend::Backend;
use crate::error::AppError;
use crate::graph::{Node, Properties, Relationship};
use crate::models::schema::{Direction, ObjectSchema};
use crate::models::selection::Selection;
use crate::registry::ConnectionRegistry;

/// A struct mapped to one node through its [`ObjectSchema`].
///
/// The identity field must be skipped by serde; only declared properties
/// are written to the node.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Person {
///     #[serde(skip)]
///     id: Option<i64>,
///     name: String,
///     born: Option<i64>,
/// }
///
/// impl GraphObject for Person {
///     fn schema() -> &'static ObjectSchema {
///         static SCHEMA: OnceLock<ObjectSchema> = OnceLock::new();
///         SCHEMA.get_or_init(|| {
///             ObjectSchema::describe("Person")
///                 .primary_key("name")
///                 .property("born")
///                 .build()
///                 .expect("valid schema")
///         })
///     }
///
///     fn identity(&self) -> Option<i64> { self.id }
///     fn set_identity(&mut self, identity: Option<i64>) { self.id = identity }
/// }
/// ```
pub trait GraphObject: Serialize + DeserializeOwned + Send + Sync {
    fn schema() -> &'static ObjectSchema;

    fn identity(&self) -> Option<i64>;

    fn set_identity(&mut self, identity: Option<i64>);

    /// Builds the node for this object. Null properties are left out.
    fn to_node(&self) -> Result<Node, AppError> {
        let schema = Self::schema();
        let fields = match serde_json::to_value(self) {
            Ok(JsonValue::Object(fields)) => fields,
            Ok(_) => {
                return Err(AppError::InvalidSchema(format!(
                    "{} does not serialize to a map",
                    schema.label()
                )))
            }
            Err(e) => return Err(AppError::Internal(format!("serialize failed: {}", e))),
        };

        let mut properties = Properties::new();
        for prop in schema.properties() {
            match fields.get(&prop.field) {
                Some(JsonValue::Null) | None => {}
                Some(value) => {
                    properties.insert(prop.key.clone(), value.clone());
                }
            }
        }

        let mut node = Node::new([schema.label()], properties);
        if let Some(id) = self.identity() {
            node.bind(id);
        }
        Ok(node)
    }

    /// Rebuilds an object from a node, taking its identity.
    fn from_node(node: &Node) -> Result<Self, AppError> {
        let mut fields = Map::new();
        for prop in Self::schema().properties() {
            if let Some(value) = node.get(&prop.key) {
                fields.insert(prop.field.clone(), value.clone());
            }
        }
        let mut object: Self =
            serde_json::from_value(JsonValue::Object(fields)).map_err(|e| {
                AppError::Decode(format!("failed to decode {}: {}", Self::schema().label(), e))
            })?;
        object.set_identity(node.identity());
        Ok(object)
    }
}

/// Database operations for every [`GraphObject`].
///
/// Each operation runs on `using`, or the schema's alias when `None`.
/// Abstract schemas fail with [`AppError::InvalidSchema`].
#[async_trait]
pub trait GraphObjectExt: GraphObject + Sized {
    /// Stores the object. Same as [`merge`](Self::merge), since objects are
    /// unique by label and primary key.
    async fn create(
        &mut self,
        registry: &ConnectionRegistry,
        using: Option<&str>,
    ) -> Result<(), AppError> {
        self.merge(registry, using).await
    }

    /// Matches the node on label and primary key, creating it if missing.
    ///
    /// Without a primary key a new node is always created. Already bound
    /// objects are left alone.
    async fn merge(
        &mut self,
        registry: &ConnectionRegistry,
        using: Option<&str>,
    ) -> Result<(), AppError> {
        let backend = backend_for::<Self>(registry, using).await?;
        if self.identity().is_some() {
            return Ok(());
        }

        let schema = Self::schema();
        let mut node = self.to_node()?;
        match schema.primary_key() {
            Some(pk) => {
                backend
                    .merge(&mut node, Some(schema.label()), &[pk.key.as_str()])
                    .await?
            }
            None => backend.create(&mut node).await?,
        }
        self.set_identity(node.identity());
        Ok(())
    }

    /// Deletes the remote node and its relationships.
    async fn delete(
        &mut self,
        registry: &ConnectionRegistry,
        using: Option<&str>,
    ) -> Result<(), AppError> {
        let backend = backend_for::<Self>(registry, using).await?;
        let mut node = self.to_node()?;
        backend.delete(&mut node).await?;
        self.set_identity(None);
        Ok(())
    }

    /// Writes local state over the remote node, creating it if unbound.
    async fn push(
        &mut self,
        registry: &ConnectionRegistry,
        using: Option<&str>,
    ) -> Result<(), AppError> {
        let backend = backend_for::<Self>(registry, using).await?;
        let mut node = self.to_node()?;
        backend.push(&mut node).await?;
        self.set_identity(node.identity());
        Ok(())
    }

    /// Replaces local state with the remote node.
    ///
    /// An object whose node no longer exists is unbound and keeps its fields.
    async fn pull(
        &mut self,
        registry: &ConnectionRegistry,
        using: Option<&str>,
    ) -> Result<(), AppError> {
        let backend = backend_for::<Self>(registry, using).await?;
        let mut node = self.to_node()?;
        if !node.is_bound() {
            return Err(AppError::Unbound(Self::schema().label().to_string()));
        }
        backend.pull(&mut node).await?;
        if node.is_bound() {
            *self = Self::from_node(&node)?;
        } else {
            self.set_identity(None);
        }
        Ok(())
    }

    /// Starts a selection of stored objects, optionally by primary value.
    fn select(
        registry: &ConnectionRegistry,
        primary_value: Option<JsonValue>,
        using: Option<&str>,
    ) -> Result<Selection<Self>, AppError> {
        let schema = Self::schema();
        schema.ensure_concrete()?;
        let engine = registry.get(using.unwrap_or(schema.db_alias()))?;
        let selection = Selection::new(engine);
        match primary_value {
            Some(value) => {
                let pk = schema.primary_key().ok_or_else(|| {
                    AppError::InvalidSchema(format!("{} has no primary key", schema.label()))
                })?;
                Ok(selection.filter(&pk.field, value)?)
            }
            None => Ok(selection),
        }
    }

    /// Objects of type `U` linked through the declared relation `name`.
    async fn related<U: GraphObject>(
        &self,
        registry: &ConnectionRegistry,
        name: &str,
        using: Option<&str>,
    ) -> Result<Vec<U>, AppError> {
        let relation = Self::schema().relation(name)?;
        check_target::<U>(&relation.target)?;
        let backend = backend_for::<Self>(registry, using).await?;
        let this = Node::bound(self.identity().ok_or_else(|| {
            AppError::Unbound(Self::schema().label().to_string())
        })?);

        let (start, end) = match relation.direction {
            Direction::Outgoing => (Some(&this), None),
            Direction::Incoming => (None, Some(&this)),
        };
        let relationships: Vec<Relationship> = backend
            .match_relationships(start, Some(&relation.rel_type), end, false, None)?
            .try_collect()
            .await?;

        relationships
            .iter()
            .map(|rel| match relation.direction {
                Direction::Outgoing => rel.end(),
                Direction::Incoming => rel.start(),
            })
            .filter(|node| node.has_label(U::schema().label()))
            .map(U::from_node)
            .collect()
    }

    /// Links this object to `other` through the declared relation `name`.
    ///
    /// Both objects must already be stored.
    async fn relate<U: GraphObject>(
        &self,
        registry: &ConnectionRegistry,
        name: &str,
        other: &U,
        properties: Properties,
        using: Option<&str>,
    ) -> Result<(), AppError> {
        let relation = Self::schema().relation(name)?;
        check_target::<U>(&relation.target)?;
        let backend = backend_for::<Self>(registry, using).await?;

        let this = Node::bound(self.identity().ok_or_else(|| {
            AppError::Unbound(Self::schema().label().to_string())
        })?);
        let that = Node::bound(other.identity().ok_or_else(|| {
            AppError::Unbound(U::schema().label().to_string())
        })?);

        let (start, end) = match relation.direction {
            Direction::Outgoing => (this, that),
            Direction::Incoming => (that, this),
        };
        let mut rel = Relationship::new(start, relation.rel_type.clone(), end);
        for (key, value) in properties {
            rel.set(&key, value);
        }
        backend.create(&mut rel).await
    }
}

impl<T: GraphObject> GraphObjectExt for T {}

async fn backend_for<T: GraphObject>(
    registry: &ConnectionRegistry,
    using: Option<&str>,
) -> Result<Arc<Backend>, AppError> {
    let schema = T::schema();
    schema.ensure_concrete()?;
    registry.backend(using.unwrap_or(schema.db_alias())).await
}

fn check_target<U: GraphObject>(target: &str) -> Result<(), AppError> {
    let label = U::schema().label();
    if label != target {
        return Err(AppError::InvalidSchema(format!(
            "relation targets {} but {} was requested",
            target, label
        )));
    }
    Ok(())
}

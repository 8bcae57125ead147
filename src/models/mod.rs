//! Graph objects: domain structs stored as labelled nodes.
//!
//! A struct implements [`GraphObject`] by returning an [`ObjectSchema`] and
//! exposing its identity. [`GraphObjectExt`] then provides
//! `create/delete/push/pull/merge/select` plus relation helpers, each
//! resolving its backend through a [`ConnectionRegistry`](crate::registry::ConnectionRegistry).

mod object;
mod schema;
mod selection;

pub use object::{GraphObject, GraphObjectExt};
pub use schema::{Direction, ObjectSchema, ObjectSchemaBuilder, PropertySchema, RelationSchema};
pub use selection::Selection;

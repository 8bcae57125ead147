//! Object schemas describing how a struct maps to a labelled node.

use crate::config::DEFAULT_ALIAS;
use crate::error::AppError;

/// Direction of a declared relation, seen from the owning object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A struct field stored as a node property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    /// Field name in the serialized struct.
    pub field: String,
    /// Property key on the node.
    pub key: String,
}

/// A named relation from this object to nodes with `target` label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSchema {
    pub name: String,
    pub rel_type: String,
    pub target: String,
    pub direction: Direction,
}

/// Immutable description of a graph object.
///
/// Built once with [`ObjectSchema::describe`] and usually stored in a
/// `OnceLock` returned from [`GraphObject::schema`](super::GraphObject::schema).
///
/// ```ignore
/// let schema = ObjectSchema::describe("Person")
///     .primary_key("name")
///     .property("born")
///     .related_to("acted_in", "ACTED_IN", "Movie")
///     .using("default")
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    label: String,
    primary_key: Option<String>,
    properties: Vec<PropertySchema>,
    relations: Vec<RelationSchema>,
    db_alias: String,
    is_abstract: bool,
    verbose_name: String,
    verbose_name_plural: String,
}

impl ObjectSchema {
    /// Starts describing objects stored as nodes labelled `label`.
    pub fn describe(label: &str) -> ObjectSchemaBuilder {
        ObjectSchemaBuilder {
            label: label.to_string(),
            primary_key: None,
            properties: Vec::new(),
            relations: Vec::new(),
            db_alias: DEFAULT_ALIAS.to_string(),
            is_abstract: false,
            verbose_name: None,
            verbose_name_plural: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Field whose property identifies the object, if any.
    pub fn primary_key(&self) -> Option<&PropertySchema> {
        let field = self.primary_key.as_deref()?;
        self.property(field)
    }

    pub fn properties(&self) -> &[PropertySchema] {
        &self.properties
    }

    pub fn property(&self, field: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.field == field)
    }

    /// Property key for `field`, failing for undeclared fields.
    pub fn key_for(&self, field: &str) -> Result<&str, AppError> {
        self.property(field).map(|p| p.key.as_str()).ok_or_else(|| {
            AppError::InvalidSchema(format!("{} has no property '{}'", self.label, field))
        })
    }

    pub fn relations(&self) -> &[RelationSchema] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Result<&RelationSchema, AppError> {
        self.relations.iter().find(|r| r.name == name).ok_or_else(|| {
            AppError::InvalidSchema(format!("{} has no relation '{}'", self.label, name))
        })
    }

    /// Alias used when an operation does not name one.
    pub fn db_alias(&self) -> &str {
        &self.db_alias
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn verbose_name(&self) -> &str {
        &self.verbose_name
    }

    pub fn verbose_name_plural(&self) -> &str {
        &self.verbose_name_plural
    }

    /// Fails for abstract schemas, which never touch the database.
    pub fn ensure_concrete(&self) -> Result<(), AppError> {
        if self.is_abstract {
            return Err(AppError::InvalidSchema(format!(
                "{} is abstract",
                self.label
            )));
        }
        Ok(())
    }
}

/// Builder returned by [`ObjectSchema::describe`].
#[derive(Debug, Clone)]
pub struct ObjectSchemaBuilder {
    label: String,
    primary_key: Option<String>,
    properties: Vec<PropertySchema>,
    relations: Vec<RelationSchema>,
    db_alias: String,
    is_abstract: bool,
    verbose_name: Option<String>,
    verbose_name_plural: Option<String>,
}

impl ObjectSchemaBuilder {
    /// Declares the identifying property. It is also declared as a property.
    pub fn primary_key(mut self, field: &str) -> Self {
        self.primary_key = Some(field.to_string());
        if !self.properties.iter().any(|p| p.field == field) {
            self = self.property(field);
        }
        self
    }

    /// Declares a field stored under its own name.
    pub fn property(self, field: &str) -> Self {
        self.property_as(field, field)
    }

    /// Declares a field stored under a different property key.
    pub fn property_as(mut self, field: &str, key: &str) -> Self {
        self.properties.push(PropertySchema {
            field: field.to_string(),
            key: key.to_string(),
        });
        self
    }

    /// Declares `(self)-[:rel_type]->(target)`.
    pub fn related_to(self, name: &str, rel_type: &str, target: &str) -> Self {
        self.relation(name, rel_type, target, Direction::Outgoing)
    }

    /// Declares `(target)-[:rel_type]->(self)`.
    pub fn related_from(self, name: &str, rel_type: &str, target: &str) -> Self {
        self.relation(name, rel_type, target, Direction::Incoming)
    }

    fn relation(mut self, name: &str, rel_type: &str, target: &str, direction: Direction) -> Self {
        self.relations.push(RelationSchema {
            name: name.to_string(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            direction,
        });
        self
    }

    /// Sets the default connection alias.
    pub fn using(mut self, alias: &str) -> Self {
        self.db_alias = alias.to_string();
        self
    }

    /// Marks the schema as a template that cannot be stored.
    pub fn abstract_schema(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn verbose_name(mut self, name: &str) -> Self {
        self.verbose_name = Some(name.to_string());
        self
    }

    pub fn verbose_name_plural(mut self, name: &str) -> Self {
        self.verbose_name_plural = Some(name.to_string());
        self
    }

    /// Validates and freezes the schema.
    ///
    /// # Errors
    ///
    /// [`AppError::InvalidSchema`] for an empty label or alias, duplicate
    /// fields, keys or relation names, or a relation without type or target.
    pub fn build(self) -> Result<ObjectSchema, AppError> {
        let invalid = |reason: String| Err(AppError::InvalidSchema(reason));

        if self.label.trim().is_empty() {
            return invalid("label must not be empty".to_string());
        }
        if self.db_alias.is_empty() {
            return invalid(format!("{} has an empty connection alias", self.label));
        }

        for (i, prop) in self.properties.iter().enumerate() {
            if prop.field.is_empty() || prop.key.is_empty() {
                return invalid(format!("{} declares an unnamed property", self.label));
            }
            let earlier = &self.properties[..i];
            if earlier.iter().any(|p| p.field == prop.field) {
                return invalid(format!("{} declares '{}' twice", self.label, prop.field));
            }
            if earlier.iter().any(|p| p.key == prop.key) {
                return invalid(format!(
                    "{} maps two fields to key '{}'",
                    self.label, prop.key
                ));
            }
        }

        for (i, rel) in self.relations.iter().enumerate() {
            if rel.rel_type.is_empty() || rel.target.is_empty() {
                return invalid(format!(
                    "relation '{}' of {} needs a type and a target",
                    rel.name, self.label
                ));
            }
            if self.relations[..i].iter().any(|r| r.name == rel.name) {
                return invalid(format!(
                    "{} declares relation '{}' twice",
                    self.label, rel.name
                ));
            }
        }

        let verbose_name = self
            .verbose_name
            .unwrap_or_else(|| camel_case_to_spaces(&self.label));
        let verbose_name_plural = self
            .verbose_name_plural
            .unwrap_or_else(|| format!("{verbose_name}s"));

        Ok(ObjectSchema {
            label: self.label,
            primary_key: self.primary_key,
            properties: self.properties,
            relations: self.relations,
            db_alias: self.db_alias,
            is_abstract: self.is_abstract,
            verbose_name,
            verbose_name_plural,
        })
    }
}

/// `"MovieActor"` → `"movie actor"`, `"HTTPServer"` → `"http server"`.
fn camel_case_to_spaces(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || (prev.is_uppercase() && next_lower) {
                out.push(' ');
            }
        }
        out.extend(c.to_lowercase());
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_defaults() {
        let schema = ObjectSchema::describe("MovieActor").build().unwrap();
        assert_eq!(schema.label(), "MovieActor");
        assert_eq!(schema.db_alias(), "default");
        assert!(!schema.is_abstract());
        assert!(schema.primary_key().is_none());
        assert_eq!(schema.verbose_name(), "movie actor");
        assert_eq!(schema.verbose_name_plural(), "movie actors");
    }

    #[test]
    fn test_primary_key_is_declared_once() {
        let schema = ObjectSchema::describe("Person")
            .property("name")
            .primary_key("name")
            .property_as("born", "year_of_birth")
            .using("other")
            .build()
            .unwrap();

        assert_eq!(schema.properties().len(), 2);
        assert_eq!(schema.primary_key().map(|p| p.key.as_str()), Some("name"));
        assert_eq!(schema.key_for("born").unwrap(), "year_of_birth");
        assert_eq!(schema.db_alias(), "other");
    }

    #[test]
    fn test_relations() {
        let schema = ObjectSchema::describe("Person")
            .related_to("acted_in", "ACTED_IN", "Movie")
            .related_from("followers", "FOLLOWS", "Person")
            .build()
            .unwrap();

        let rel = schema.relation("followers").unwrap();
        assert_eq!(rel.direction, Direction::Incoming);
        assert!(schema.relation("directed").is_err());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = ObjectSchema::describe("Person")
            .property("name")
            .property("name")
            .build()
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSchema(_)));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let result = ObjectSchema::describe("Person")
            .property("name")
            .property_as("full_name", "name")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_label_rejected() {
        assert!(ObjectSchema::describe(" ").build().is_err());
    }

    #[test]
    fn test_abstract_schema_is_not_concrete() {
        let schema = ObjectSchema::describe("Base")
            .abstract_schema()
            .build()
            .unwrap();
        assert!(schema.ensure_concrete().is_err());
    }

    #[test]
    fn test_camel_case_to_spaces() {
        assert_eq!(camel_case_to_spaces("HTTPServer"), "http server");
        assert_eq!(camel_case_to_spaces("Person"), "person");
    }
}

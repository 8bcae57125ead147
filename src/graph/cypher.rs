//! Cypher text helpers.
//!
//! Labels, relationship types and property keys cannot be passed as query
//! parameters, so they are spliced into statements as backtick-quoted names.
//! Values always travel as parameters.

/// Quotes a label, relationship type or property key.
///
/// Embedded backticks are doubled, which is the Cypher escape for quoted names.
pub fn quote_name(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Renders a label set as `` :`A`:`B` ``, or an empty string for no labels.
pub fn label_clause<'a, I>(labels: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    labels
        .into_iter()
        .map(|label| format!(":{}", quote_name(label)))
        .collect()
}

/// Projection returning a node as `id`, `labels` and `properties` columns with a prefix.
pub fn node_projection(var: &str, prefix: &str) -> String {
    format!(
        "id({var}) AS {prefix}id, labels({var}) AS {prefix}labels, \
         properties({var}) AS {prefix}properties"
    )
}

//! Run command handler.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use futures::StreamExt;
use serde_json::Value as JsonValue;

use crate::graph::Params;

use super::App;

impl App {
    /// Run `statement` on `alias` and print rows as JSON lines.
    pub async fn run_statement(
        &self,
        alias: &str,
        params: &[String],
        statement: &str,
    ) -> Result<()> {
        let params = parse_params(params)?;
        let registry = self.registry()?;
        let backend = registry.backend(alias).await?;

        let mut rows = backend.run(statement, params).await?;
        let mut count = 0usize;
        while let Some(row) = rows.next().await {
            let row = row?;
            println!("{}", JsonValue::Object(row.into_inner()));
            count += 1;
        }

        tracing::info!(alias, rows = count, "Statement finished");
        Ok(())
    }
}

/// Parses `NAME=JSON` pairs; values that are not valid JSON are taken as strings.
fn parse_params(raw: &[String]) -> Result<Params> {
    raw.iter()
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| eyre!("Invalid parameter '{}', expected NAME=JSON", pair))?;
            if name.is_empty() {
                return Err(eyre!("Invalid parameter '{}', empty name", pair));
            }
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| JsonValue::String(value.to_string()));
            Ok((name.to_string(), value))
        })
        .collect()
}

//! Ping command handler.

use std::time::Instant;

use color_eyre::Result;

use crate::graph::Params;

use super::App;

impl App {
    /// Connect to `alias` and time a trivial statement.
    pub async fn run_ping(&self, alias: &str) -> Result<()> {
        let registry = self.registry()?;
        let backend = registry.backend(alias).await?;

        let started = Instant::now();
        let value = backend.evaluate("RETURN 1 AS ok", Params::new()).await?;
        let elapsed = started.elapsed();

        let components = backend.dbms().await?;
        let server = components
            .first()
            .map(|c| format!("{} {} {}", c.name, c.version().unwrap_or("?"), c.edition))
            .unwrap_or_default();

        tracing::info!(alias, url = backend.url(), ?elapsed, %server, "Ping succeeded");
        println!(
            "{alias}\t{}\t{:?}\t{}\t{server}",
            backend.url(),
            elapsed,
            value.unwrap_or_default()
        );
        Ok(())
    }
}

//! Labels command handler.

use color_eyre::Result;

use super::App;

impl App {
    /// Print node labels and relationship types of `alias`.
    pub async fn run_labels(&self, alias: &str) -> Result<()> {
        let registry = self.registry()?;
        let backend = registry.backend(alias).await?;

        for label in backend.node_labels().await? {
            println!("label\t{label}");
        }
        for rel_type in backend.relationship_types().await? {
            println!("type\t{rel_type}");
        }
        Ok(())
    }
}

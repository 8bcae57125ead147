//! Check command handler.

use color_eyre::Result;

use super::App;

impl App {
    /// Validate settings without connecting.
    pub fn run_check(&self) -> Result<()> {
        let registry = self.registry()?;
        for alias in registry.config().aliases() {
            let options = registry.config().options_for(alias)?;
            match options.url() {
                Some(url) => println!("{alias}\t{url}"),
                None => {
                    tracing::warn!(alias, "Connection has no URL");
                    println!("{alias}\t<missing URL>");
                }
            }
        }
        Ok(())
    }
}

//! Connection configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. User config: `~/.config/tracer/config.toml` (XDG) or platform config dir
//! 2. Project config: `.tracer.toml`
//! 3. Environment variables: `TRACER_NEO4J_CONNECTIONS__<alias>__<KEY>`
//!
//! # Example
//!
//! ```toml
//! [NEO4J_CONNECTIONS.default]
//! URL = "bolt://localhost:7687"
//! USER = "neo4j"
//! PASSWORD = "secret"
//!
//! [NEO4J_CONNECTIONS.analytics]
//! URL = "bolt://analytics:7687"
//! ```
//!
//! Option keys keep their case. Only `URL` is interpreted by the backend;
//! every other key is handed to the driver connector untouched.

use std::collections::BTreeMap;
use std::ops::Deref;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::AppError;

/// Alias every deployment is expected to configure.
pub const DEFAULT_ALIAS: &str = "default";

/// Option key holding the connection endpoint.
pub const URL_KEY: &str = "URL";

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

impl ConfigError {
    fn message(msg: impl Into<String>) -> Self {
        Self::from(figment::Error::from(msg.into()))
    }
}

/// Options for a single connection alias.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ConnectionOptions(BTreeMap<String, JsonValue>);

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an option, builder style.
    pub fn with(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Returns the option as a string slice, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    /// Returns the option as an unsigned integer.
    ///
    /// Numeric strings are accepted since environment variables arrive as text.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            JsonValue::Number(n) => n.as_u64(),
            JsonValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// The endpoint URL, if configured.
    pub fn url(&self) -> Option<&str> {
        self.get_str(URL_KEY)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<JsonValue>> FromIterator<(K, V)> for ConnectionOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Read-only view over every configured connection, keyed by alias.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ConnectionConfig(BTreeMap<String, ConnectionOptions>);

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection, builder style.
    pub fn with(mut self, alias: &str, options: ConnectionOptions) -> Self {
        self.0.insert(alias.to_string(), options);
        self
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.0.contains_key(alias)
    }

    /// Returns the options declared for `alias`.
    ///
    /// # Errors
    ///
    /// [`AppError::UnknownAlias`] when the alias is not configured.
    pub fn options_for(&self, alias: &str) -> Result<&ConnectionOptions, AppError> {
        self.0
            .get(alias)
            .ok_or_else(|| AppError::UnknownAlias(alias.to_string()))
    }

    /// Configured aliases in sorted order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Root settings structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(rename = "NEO4J_CONNECTIONS", default)]
    pub connections: Option<ConnectionConfig>,
}

impl Settings {
    /// Load settings with layered resolution (user → project → env) and validate them.
    pub fn load() -> Result<Self, ConfigError> {
        let figment = Figment::new()
            // Layer 1: User config (lowest priority)
            .merge(Toml::file(Self::user_config_path()))
            // Layer 2: Project config
            .merge(Toml::file(".tracer.toml"))
            // Layer 3: Environment variables (highest priority)
            .merge(Self::env_provider());

        let settings = Self::from_figment(figment)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Extracts settings from an arbitrary figment without validating them.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(ConfigError::from)
    }

    /// Environment provider: `TRACER_NEO4J_CONNECTIONS__default__URL=...`.
    pub fn env_provider() -> Env {
        Env::prefixed("TRACER_").lowercase(false).split("__")
    }

    /// Checks the start-up contract: connections are declared and include the default alias.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let connections = self
            .connections
            .as_ref()
            .ok_or_else(|| ConfigError::message("The NEO4J_CONNECTIONS setting is required."))?;

        if !connections.has_alias(DEFAULT_ALIAS) {
            return Err(ConfigError::message(format!(
                "The default alias \"{}\" must be included in the NEO4J_CONNECTIONS setting.",
                DEFAULT_ALIAS
            )));
        }

        Ok(())
    }

    /// Returns the validated connection table.
    pub fn into_connections(self) -> Result<ConnectionConfig, ConfigError> {
        self.validate()?;
        Ok(self.connections.unwrap_or_default())
    }

    /// User config path: ~/.config/tracer/config.toml (XDG) or platform config dir.
    fn user_config_path() -> std::path::PathBuf {
        // Prefer XDG config location (~/.config) on all platforms
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("tracer").join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }
        dirs::config_dir()
            .map(|p| p.join("tracer").join("config.toml"))
            .unwrap_or_default()
    }
}

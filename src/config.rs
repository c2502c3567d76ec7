//! Configuration loaded from TOML and the environment.
//!
//! Looked up at `--config <path>`, else `$CONFIG_DIR/rowmap/config.toml`
//! (`~/.config/rowmap/config.toml` on Linux). `ROWMAP_DATABASE_URL` wins
//! over the file's `database_url`.
//!
//! ```toml
//! database_url = "sqlite://app.db"
//! max_connections = 5
//! pool_max_idle = 64
//! statement_timeout_ms = 5000
//! shared_registry = true
//! ```

use crate::error::{RowmapError, RowmapResult};
use crate::registry::Registry;
use crate::table::DEFAULT_POOL_MAX_IDLE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable overriding `database_url`.
pub const DATABASE_URL_ENV: &str = "ROWMAP_DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Connection URL; its scheme selects the dialect.
    pub database_url: Option<String>,
    /// Upper bound of the sqlx pool.
    pub max_connections: u32,
    /// Idle records each table keeps for reuse. Applies only with a
    /// private registry; the process-wide one keeps its own bound.
    pub pool_max_idle: usize,
    /// Deadline applied to every compiled statement.
    pub statement_timeout_ms: Option<u64>,
    /// Share the process-wide descriptor registry (`true`) or give the
    /// handle its own.
    pub shared_registry: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            pool_max_idle: DEFAULT_POOL_MAX_IDLE,
            statement_timeout_ms: None,
            shared_registry: true,
        }
    }
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> RowmapResult<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file.
    pub fn load(path: impl AsRef<Path>) -> RowmapResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    /// Default config file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rowmap").join("config.toml"))
    }

    /// Load `path`, else the default file when it exists, else defaults;
    /// then apply the environment override.
    pub fn discover(path: Option<&Path>) -> RowmapResult<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::load(path)?,
                None => Self::default(),
            },
        };
        config.apply_env(std::env::var(DATABASE_URL_ENV).ok());
        Ok(config)
    }

    /// Override `database_url` with a non-empty value.
    pub fn apply_env(&mut self, database_url: Option<String>) {
        if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
            self.database_url = Some(url);
        }
    }

    /// Descriptor registry selected by `shared_registry`.
    pub fn registry(&self) -> Arc<Registry> {
        if self.shared_registry {
            Registry::global()
        } else {
            Arc::new(Registry::with_pool_max_idle(self.pool_max_idle))
        }
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    /// The configured URL, or `NotInitialized`.
    pub fn require_url(&self) -> RowmapResult<&str> {
        self.database_url.as_deref().ok_or(RowmapError::NotInitialized)
    }

    fn validate(&self) -> RowmapResult<()> {
        if self.max_connections == 0 {
            return Err(RowmapError::Config("max_connections must be at least 1".into()));
        }
        if self.statement_timeout_ms == Some(0) {
            return Err(RowmapError::Config("statement_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

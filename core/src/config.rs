//! Configuration loading
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. TOML file (explicit path, `SQLRUN_CONFIG_PATH`, or `./sqlrun.toml`)
//! 3. `SQLRUN_*` environment variables (after loading `.env`), with `__`
//!    between section and key, e.g. `SQLRUN_DATABASE__URL`
//! 4. Explicit overrides passed to [`ConfigBuilder`]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::scheduler::{OnError, SchedulerOptions};

const ENV_PREFIX: &str = "SQLRUN";
const CONFIG_PATH_VAR: &str = "SQLRUN_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "sqlrun.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// What to do after a statement fails
    pub on_error: OnError,
    /// Characters of statement text shown in progress events
    pub preview_chars: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            on_error: OnError::Continue,
            preview_chars: 100,
        }
    }
}

impl ExecutionConfig {
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            preview_chars: self.preview_chars,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default sources with no explicit overrides.
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.connect_timeout_secs == 0 {
            bail!("database.connect_timeout_secs cannot be 0");
        }

        if self.execution.preview_chars == 0 {
            bail!("execution.preview_chars cannot be 0");
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    database_url: Option<String>,
    config_path: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigBuilder {
    pub fn database_url(mut self, url: Option<String>) -> Self {
        self.database_url = url;
        self
    }

    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Ignore `.env` and `SQLRUN_*` variables.
    pub fn skip_env(mut self, skip: bool) -> Self {
        self.skip_env = skip;
        self
    }

    pub fn build(self) -> Result<Config> {
        if !self.skip_env {
            dotenvy::dotenv().ok();
        }

        let mut sources = config::Config::builder();

        if let Some((path, required)) = self.resolve_file() {
            tracing::debug!(path = %path.display(), "loading configuration file");
            sources = sources.add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(required),
            );
        }

        if !self.skip_env {
            sources = sources.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        sources = sources
            .set_override_option("database.url", self.database_url)
            .context("Invalid database URL override")?;

        let config: Config = sources
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Which file to read, and whether it must exist.
    fn resolve_file(&self) -> Option<(PathBuf, bool)> {
        if let Some(path) = &self.config_path {
            return Some((path.clone(), true));
        }

        if !self.skip_env {
            if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
                return Some((PathBuf::from(path), true));
            }
        }

        let default = Path::new(DEFAULT_CONFIG_FILE);
        default.exists().then(|| (default.to_path_buf(), false))
    }
}

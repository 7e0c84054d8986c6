//! Engine configuration.
//!
//! [`EngineConfig`] is loaded from `config/config.toml` (section `[engine]`)
//! and/or `LIFELINE__ENGINE__*` environment variables via
//! [`EngineConfig::load`]. [`Settings`] bundles it with the status table
//! built from it; construct it once at startup and pass it by reference.

use crate::include::IncludeOptions;
use crate::status::StatusTable;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "LIFELINE";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Replace numeric machine codes with their text names
    #[serde(default)]
    pub use_text_errors: bool,
    #[serde(default)]
    pub allow_remote_includes: bool,
    /// Issue the lookups of one include level concurrently
    #[serde(default)]
    pub parallel_levels: bool,
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
    /// Stack size for lookup coroutines in parallel mode
    #[serde(default = "default_coroutine_stack_size")]
    pub coroutine_stack_size: usize,
    /// Count matching records for collection results
    #[serde(default)]
    pub include_record_count: bool,
    /// Put store failure messages into client-facing errors
    #[serde(default)]
    pub expose_internal_errors: bool,
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    #[serde(default = "default_maximum_page_size")]
    pub maximum_page_size: u64,
    /// Extra or replacement symbolic status names
    #[serde(default)]
    pub status_overrides: HashMap<String, u16>,
}

fn default_max_include_depth() -> usize {
    8
}

fn default_coroutine_stack_size() -> usize {
    0x10000
}

fn default_page_size() -> u64 {
    10
}

fn default_maximum_page_size() -> u64 {
    20
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_text_errors: false,
            allow_remote_includes: false,
            parallel_levels: false,
            max_include_depth: default_max_include_depth(),
            coroutine_stack_size: default_coroutine_stack_size(),
            include_record_count: false,
            expose_internal_errors: false,
            default_page_size: default_page_size(),
            maximum_page_size: default_maximum_page_size(),
            status_overrides: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load the engine configuration from `config/config.toml`, falling back to env vars.
    ///
    /// A missing `[engine]` section yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when neither source can be read or the section
    /// does not deserialize.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!("Failed to load {CONFIG_FILE}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, \
                             then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        match settings.get::<EngineConfig>("engine") {
            Ok(engine) => Ok(engine),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Engine configuration could not be loaded from file or environment: {e}"
            ))),
        }
    }

    pub fn include_options(&self) -> IncludeOptions {
        IncludeOptions {
            allow_remote_includes: self.allow_remote_includes,
            max_depth: self.max_include_depth,
        }
    }
}

/// Process-wide settings: configuration plus the status table derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config: EngineConfig,
    pub statuses: StatusTable,
}

impl Settings {
    pub fn new(config: EngineConfig) -> Self {
        let statuses = StatusTable::with_overrides(&config.status_overrides);
        Self { config, statuses }
    }

    /// [`EngineConfig::load`] then build the status table
    ///
    /// # Errors
    ///
    /// Propagates the configuration loading error.
    pub fn load() -> Result<Self, ConfigError> {
        EngineConfig::load().map(Self::new)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

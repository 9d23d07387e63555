//! Runtime configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! TOML files and `PLEXUS__`-prefixed environment variables. Each
//! sub-module represents a logical configuration section; every field has
//! a default so an empty source yields a usable configuration.

pub mod lifecycle;
pub mod logging;
pub mod resolver;
pub mod services;

use serde::{Deserialize, Serialize};

use self::lifecycle::LifecycleConfig;
use self::logging::{LOG_FORMATS, LoggingConfig};
use self::resolver::ResolverConfig;
use self::services::ServiceConfig;

use crate::error::AppError;

/// Root runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Dependency resolution policy.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Lifecycle manager settings.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Service registry settings.
    #[serde(default)]
    pub services: ServiceConfig,
}

impl RuntimeConfig {
    /// Load configuration from TOML files and the environment.
    ///
    /// Merges `config/default.toml` with an environment-specific overlay
    /// `config/{env}.toml` and environment variables such as
    /// `PLEXUS__LOGGING__LEVEL=debug`. Missing files are skipped.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("PLEXUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Checks values serde cannot express as types.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.logging.level.trim().is_empty() {
            return Err(AppError::configuration("logging.level must not be empty"));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(AppError::configuration(format!(
                "logging.format must be one of {:?}, got '{}'",
                LOG_FORMATS, self.logging.format
            )));
        }
        Ok(())
    }
}

// src/config/loader.rs
//! Layered configuration loading: defaults, TOML file, environment

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};

use crate::config::constants::paths;
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};

/// Builds a [`CoreConfig`] from layered sources.
///
/// Later sources override earlier ones: built-in defaults, then the TOML
/// file (skipped when missing), then `<PREFIX>__SECTION__KEY` environment
/// variables, e.g. `LABMETER__ACQUISITION__JOIN_TIMEOUT_MS=500`.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create loader reading `labmeter.toml` from the working directory
    pub fn new() -> Self {
        Self {
            file: Some(PathBuf::from(paths::DEFAULT_CONFIG_FILE)),
            env_prefix: paths::ENV_PREFIX.to_string(),
        }
    }

    /// Create loader with a custom file
    pub fn with_file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            file: Some(path.as_ref().to_path_buf()),
            ..Self::new()
        }
    }

    /// Defaults and environment only
    pub fn without_file() -> Self {
        Self {
            file: None,
            ..Self::new()
        }
    }

    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    /// Load and validate the configuration
    pub fn load(&self) -> CoreResult<CoreConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&CoreConfig::default())?);

        if let Some(path) = &self.file {
            tracing::debug!(path = %path.display(), "reading configuration file");
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator(paths::ENV_SEPARATOR)
                .separator(paths::ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: CoreConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(CoreError::InvalidConfig)?;
        Ok(config)
    }

    /// Write `config` as TOML
    pub fn export<P: AsRef<Path>>(config: &CoreConfig, path: P) -> CoreResult<()> {
        let content = toml::to_string_pretty(config)
            .map_err(|e| CoreError::Config(config::ConfigError::Message(e.to_string())))?;
        std::fs::write(path, content)
            .map_err(|e| CoreError::Config(config::ConfigError::Foreign(Box::new(e))))?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

//! Source composition for [`MirrorConfig`].

use super::MirrorConfig;
use crate::error::Result;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "NSMIRROR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// `$XDG_CONFIG_HOME/nsmirror/config.toml`, falling back to `~/.config`.
    pub fn user_config_path() -> Option<PathBuf> {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            if !xdg.is_empty() {
                return Some(PathBuf::from(xdg).join("nsmirror").join("config.toml"));
            }
        }
        std::env::var("HOME").ok().map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("nsmirror")
                .join("config.toml")
        })
    }

    /// Defaults, then `path` (or the user config file when it exists), then environment.
    pub fn load(path: Option<&Path>) -> Result<MirrorConfig> {
        let builder = Self::builder_with_defaults()?;
        let builder = match path {
            Some(path) => builder.add_source(File::from(path).format(FileFormat::Toml)),
            None => match Self::user_config_path() {
                Some(user) => builder.add_source(
                    File::from(user)
                        .format(FileFormat::Toml)
                        .required(false),
                ),
                None => builder,
            },
        };
        let config = Self::add_environment(builder).build()?;
        let config: MirrorConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document over the defaults, without consulting the environment.
    pub fn from_toml_str(text: &str) -> Result<MirrorConfig> {
        let config = Self::builder_with_defaults()?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        let config: MirrorConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn builder_with_defaults() -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
        let defaults = MirrorConfig::default();
        Config::builder()
            .set_default("namespace.root", defaults.namespace.root)?
            .set_default(
                "namespace.local_root",
                defaults.namespace.local_root.to_string_lossy().to_string(),
            )?
            .set_default("storage.collection", defaults.storage.collection)?
            .set_default("storage.event_pool", defaults.storage.event_pool)?
            .set_default("processor.poll_interval_ms", defaults.processor.poll_interval_ms)?
            .set_default("processor.audit_events", defaults.processor.audit_events)?
            .set_default("processor.temporary_suffix", defaults.processor.temporary_suffix)?
            .set_default("logging.level", defaults.logging.level)
    }

    fn add_environment(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
        builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
    }
}

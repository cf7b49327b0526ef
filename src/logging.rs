//! Logging
//!
//! `tracing` subscriber setup. Level, format and destination come from
//! [`LoggingConfig`] and can be overridden with `NSMIRROR_LOG`,
//! `NSMIRROR_LOG_FORMAT`, `NSMIRROR_LOG_OUTPUT` and `NSMIRROR_LOG_FILE`.

use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// json or text
    #[serde(default = "default_format")]
    pub format: String,

    /// stdout, stderr, file, file+stderr, both
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Colored text output; never applied to files.
    #[serde(default = "default_true")]
    pub color: bool,

    /// Per-module levels, e.g. `nsmirror::store = "debug"`.
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: true,
            modules: BTreeMap::new(),
        }
    }
}

/// Log file location: `NSMIRROR_LOG_FILE`, then the configured file, then the
/// platform state directory.
pub fn resolve_log_file_path(config_file: Option<PathBuf>) -> Result<PathBuf> {
    if let Ok(env_path) = std::env::var("NSMIRROR_LOG_FILE") {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }
    if let Some(p) = config_file.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(p);
    }
    let dirs = directories::ProjectDirs::from("", "", "nsmirror").ok_or_else(|| {
        MirrorError::Config("Could not determine platform directories for log file".to_string())
    })?;
    let dir = dirs
        .state_dir()
        .unwrap_or_else(|| dirs.data_local_dir())
        .to_path_buf();
    Ok(dir.join("nsmirror.log"))
}

/// Install the global subscriber.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<()> {
    if config.map(|c| !c.enabled).unwrap_or(false) {
        Registry::default()
            .with(EnvFilter::new("off"))
            .with(fmt::layer().with_writer(std::io::sink))
            .init();
        return Ok(());
    }

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;
    let color = config.map(|c| c.color).unwrap_or(true) && !output.file;
    let writer = output.make_writer(config)?;

    let registry = Registry::default().with(filter);
    if format == "json" {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(color)
                    .with_writer(writer),
            )
            .init();
    }
    Ok(())
}

fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env("NSMIRROR_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    if level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(level);
    if let Some(config) = config {
        for (module, module_level) in &config.modules {
            let directive = format!("{}={}", module, module_level)
                .parse()
                .map_err(|e| MirrorError::Config(format!("Invalid log directive: {}", e)))?;
            filter = filter.add_directive(directive);
        }
    }
    Ok(filter)
}

fn determine_format(config: Option<&LoggingConfig>) -> Result<String> {
    if let Ok(format) = std::env::var("NSMIRROR_LOG_FORMAT") {
        if format == "json" || format == "text" {
            return Ok(format);
        }
    }
    match config.map(|c| c.format.as_str()).unwrap_or("text") {
        f @ ("json" | "text") => Ok(f.to_string()),
        other => Err(MirrorError::Config(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            other
        ))),
    }
}

#[derive(Debug, PartialEq, Eq)]
struct OutputDestinations {
    stdout: bool,
    stderr: bool,
    file: bool,
}

impl OutputDestinations {
    fn make_writer(&self, config: Option<&LoggingConfig>) -> Result<BoxMakeWriter> {
        let file = if self.file {
            Some(open_log_file(config.and_then(|c| c.file.clone()))?)
        } else {
            None
        };
        Ok(match (file, self.stdout, self.stderr) {
            (Some(file), _, true) => BoxMakeWriter::new(file.and(std::io::stderr)),
            (Some(file), _, false) => BoxMakeWriter::new(file),
            (None, true, true) => BoxMakeWriter::new(std::io::stdout.and(std::io::stderr)),
            (None, false, true) => BoxMakeWriter::new(std::io::stderr),
            (None, _, false) => BoxMakeWriter::new(std::io::stdout),
        })
    }
}

fn open_log_file(configured: Option<PathBuf>) -> Result<std::fs::File> {
    let path = resolve_log_file_path(configured)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| MirrorError::Config(format!("Failed to create log directory: {}", e)))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| MirrorError::Config(format!("Failed to open log file {:?}: {}", path, e)))
}

fn determine_output(config: Option<&LoggingConfig>) -> Result<OutputDestinations> {
    if let Ok(output) = std::env::var("NSMIRROR_LOG_OUTPUT") {
        return parse_output_destinations(&output);
    }
    parse_output_destinations(config.map(|c| c.output.as_str()).unwrap_or("stderr"))
}

fn parse_output_destinations(output: &str) -> Result<OutputDestinations> {
    let (stdout, stderr, file) = match output {
        "stdout" => (true, false, false),
        "stderr" => (false, true, false),
        "file" => (false, false, true),
        "file+stderr" => (false, true, true),
        "both" => (true, true, false),
        _ => {
            return Err(MirrorError::Config(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr', 'file', 'file+stderr', or 'both')",
                output
            )))
        }
    };
    Ok(OutputDestinations {
        stdout,
        stderr,
        file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_logging_config() {
        let config = LoggingConfig::default();
        assert!(config.enabled);
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "text");
        assert_eq!(config.output, "stderr");
        assert_eq!(config.file, None);
    }

    #[test]
    fn test_parse_output_destinations() {
        let out = parse_output_destinations("both").unwrap();
        assert!(out.stdout && out.stderr && !out.file);

        let out = parse_output_destinations("file+stderr").unwrap();
        assert!(!out.stdout && out.stderr && out.file);

        assert!(matches!(
            parse_output_destinations("syslog"),
            Err(MirrorError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_format_rejected() {
        let config = LoggingConfig {
            format: "xml".to_string(),
            ..LoggingConfig::default()
        };
        if std::env::var("NSMIRROR_LOG_FORMAT").is_err() {
            assert!(determine_format(Some(&config)).is_err());
        }
    }

    #[test]
    fn test_resolve_log_file_path() {
        if std::env::var("NSMIRROR_LOG_FILE").is_ok() {
            return;
        }
        let configured = resolve_log_file_path(Some(PathBuf::from("/tmp/mirror.log"))).unwrap();
        assert_eq!(configured, PathBuf::from("/tmp/mirror.log"));
        let fallback = resolve_log_file_path(None).unwrap();
        assert!(fallback.ends_with("nsmirror.log"));
    }
}

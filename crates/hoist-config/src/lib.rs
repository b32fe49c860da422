//! `hoist.toml` configuration and tracing setup.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! json = false
//! stderr = true
//!
//! [refactor]
//! temp_name = "tmp"
//! source_roots = [".", "src"]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Once;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// File name looked up in the workspace root when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "hoist.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HoistConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub refactor: RefactorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,

    /// Write logs to stderr. When disabled no subscriber is installed.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "warn".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    /// Map level aliases (`WARNING`, `none`) to `EnvFilter` syntax; anything
    /// else is passed through as a directive string.
    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let level = input.trim();
        let lowered = level.to_ascii_lowercase();
        match lowered.as_str() {
            "" => Self::default_level(),
            "warning" => "warn".to_owned(),
            "none" => "off".to_owned(),
            "trace" | "debug" | "info" | "warn" | "error" | "off" => lowered,
            _ => level.to_owned(),
        }
    }

    /// The effective filter: `level` merged with `RUST_LOG` when that is set.
    pub fn env_filter(&self) -> EnvFilter {
        let configured = Self::normalize_level_directives(&self.level);
        let from_env = std::env::var("RUST_LOG")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let mut candidates = Vec::with_capacity(3);
        if let Some(from_env) = &from_env {
            candidates.push(format!("{configured},{}", from_env.trim()));
            candidates.push(from_env.trim().to_owned());
        }
        candidates.push(configured);

        candidates
            .iter()
            .find_map(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::default().add_directive(LevelFilter::WARN.into()))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefactorConfig {
    /// Base name for temporaries introduced at call sites (`tmp`, `tmp1`, ...).
    #[serde(default = "RefactorConfig::default_temp_name")]
    pub temp_name: String,

    /// Directories (relative to the workspace root) that module paths are
    /// computed from.
    #[serde(default = "RefactorConfig::default_source_roots")]
    pub source_roots: Vec<PathBuf>,
}

impl RefactorConfig {
    fn default_temp_name() -> String {
        "tmp".to_owned()
    }

    fn default_source_roots() -> Vec<PathBuf> {
        vec![PathBuf::from(".")]
    }
}

impl Default for RefactorConfig {
    fn default() -> Self {
        Self {
            temp_name: Self::default_temp_name(),
            source_roots: Self::default_source_roots(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` includes a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl HoistConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: HoistConfig = toml::from_str(text)?;
        config.normalize();
        Ok(config)
    }

    /// Loads `hoist.toml` from `root` if present, defaults otherwise.
    pub fn discover(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = root.as_ref().join(CONFIG_FILE_NAME);
        if path.is_file() {
            tracing::debug!(target: "hoist.config", path = %path.display(), "loading config");
            Self::load_from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    fn normalize(&mut self) {
        let temp_name = self.refactor.temp_name.trim();
        self.refactor.temp_name = if temp_name.is_empty() {
            RefactorConfig::default_temp_name()
        } else {
            temp_name.to_owned()
        };
        if self.refactor.source_roots.is_empty() {
            self.refactor.source_roots = RefactorConfig::default_source_roots();
        }
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs a global `tracing` subscriber writing to stderr.
///
/// Safe to call multiple times; only the first call has an effect.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        if !config.stderr {
            return;
        }
        let fmt = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false);
        let layer: Box<dyn Layer<_> + Send + Sync> = if config.json {
            fmt.json().boxed()
        } else {
            fmt.boxed()
        };

        let installed = tracing_subscriber::registry()
            .with(config.env_filter())
            .with(layer)
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!(target: "hoist.config", level = %config.level, json = config.json, "tracing initialized");
        }
    });
}

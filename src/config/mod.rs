//! Exporter configuration: YAML document schema and loading.
//!
//! The document mirrors the three-level collection hierarchy: an `exporter`
//! scope carrying general defaults and server settings, a list of named
//! `trees`, and per-scope `files` pattern groups. Metric toggles are
//! tri-state ([`Toggle`]) so an explicit `false` survives merging against a
//! `true` default. Unknown fields are rejected to catch operator typos.

mod merge;

pub use merge::{CliDefaults, ResolvedConfig, merge};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use tracing::info;

/// A boolean configuration field that distinguishes "not configured" from an
/// explicit `false`.
///
/// YAML absence (or `null`) decodes to `Unset`; merging fills `Unset` fields
/// from the enclosing scope and never touches explicitly set ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Toggle {
    #[default]
    Unset,
    Enabled,
    Disabled,
}

impl Toggle {
    /// Returns `self` when explicitly set, `fallback` otherwise.
    pub fn or(self, fallback: Toggle) -> Toggle {
        match self {
            Toggle::Unset => fallback,
            set => set,
        }
    }

    pub fn is_unset(self) -> bool {
        self == Toggle::Unset
    }

    /// Resolves to a concrete boolean; `Unset` counts as disabled.
    pub fn is_enabled(self) -> bool {
        self == Toggle::Enabled
    }
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        if value { Toggle::Enabled } else { Toggle::Disabled }
    }
}

impl<'de> Deserialize<'de> for Toggle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<bool>::deserialize(deserializer)? {
            None => Toggle::Unset,
            Some(value) => Toggle::from(value),
        })
    }
}

/// One pattern group: glob patterns sharing a metric-toggle configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternGroupConfig {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub enable_crc32_metric: Toggle,
    #[serde(default)]
    pub enable_nb_line_metric: Toggle,
}

/// A named tree of pattern groups sharing a root path.
///
/// Tree-level `patterns` are appended to every group in the tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeConfig {
    #[serde(default)]
    pub tree_name: Option<String>,
    #[serde(default)]
    pub tree_root: Option<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub enable_crc32_metric: Toggle,
    #[serde(default)]
    pub enable_nb_line_metric: Toggle,
    #[serde(default)]
    pub files: Vec<PatternGroupConfig>,
}

/// The `exporter` scope: general-scope tree fields plus server settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    #[serde(default)]
    pub tree_name: Option<String>,
    #[serde(default)]
    pub tree_root: Option<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub enable_crc32_metric: Toggle,
    #[serde(default)]
    pub enable_nb_line_metric: Toggle,
    #[serde(default)]
    pub files: Vec<PatternGroupConfig>,
    #[serde(default)]
    pub trees: Vec<TreeConfig>,

    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub listen_address: Option<String>,
    #[serde(default)]
    pub metrics_path: Option<String>,
    #[serde(default)]
    pub metric_namespace: Option<String>,
}

/// Root of the configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    #[serde(default)]
    pub exporter: ExporterConfig,
}

/// Error type for configuration loading and merging failures.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file exists but could not be read.
    Read { path: PathBuf, source: std::io::Error },
    /// Config file content is not a valid document.
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    /// No pattern group anywhere after merging: nothing to collect.
    NothingToCollect,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "could not read config '{}': {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config '{}': {}", path.display(), source)
            }
            ConfigError::NothingToCollect => {
                write!(
                    f,
                    "no patterns configured: provide a config file with patterns \
                     or trees, or at least one pattern argument"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::NothingToCollect => None,
        }
    }
}

impl ConfigDocument {
    /// Loads the document from a YAML file.
    ///
    /// A path that does not point to a regular file yields an empty document
    /// (command-line-only operation); malformed content is a fatal error.
    pub fn load(path: &Path) -> Result<ConfigDocument, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            _ => {
                info!(path = %path.display(), "no config file, using defaults");
                return Ok(ConfigDocument::default());
            }
        }

        info!(path = %path.display(), "reading config");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

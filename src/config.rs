//! Configuration for squadgraph.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (applied by the CLI on top of the resolved config)
//! 2. Environment variables (SQUADGRAPH_DB)
//! 3. Config file (.squadgraph/config.yaml)
//! 4. Defaults (~/.squadgraph/squadgraph.sqlite3)
//!
//! Config file discovery:
//! - Searches the start directory and its parents for .squadgraph/config.yaml
//! - Relative paths in the config file resolve against the project root
//!   (the directory containing .squadgraph/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::{footballia, statsbomb};
use crate::core::fetcher::{PolitenessBudget, RetryPolicy};

/// Environment variable overriding the store path
pub const DB_ENV_VAR: &str = "SQUADGRAPH_DB";

const CONFIG_DIR: &str = ".squadgraph";
const CONFIG_FILE: &str = "config.yaml";
const DEFAULT_DB_FILE: &str = "squadgraph.sqlite3";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Fatal configuration problems; nothing is ingested when one is raised
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid date range: {from} is after {to}")]
    InvalidDateRange { from: NaiveDate, to: NaiveDate },

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("nothing to ingest: give at least one team name or an events file")]
    NoWork,

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub store: StoreFileConfig,
    #[serde(default)]
    pub ingest: IngestFileConfig,
    #[serde(default)]
    pub sources: SourcesFileConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreFileConfig {
    /// Database file (relative to the project root)
    pub path: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestFileConfig {
    pub concurrency: Option<usize>,
    pub progress_every: Option<usize>,
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesFileConfig {
    pub statsbomb: Option<SourceFileConfig>,
    pub footballia: Option<SourceFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceFileConfig {
    pub base_url: Option<String>,
    /// `[min, max]` delay before each request
    pub politeness_ms: Option<[u64; 2]>,
    pub timeout_secs: Option<u64>,
}

/// Per-source network settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSettings {
    pub base_url: String,
    pub politeness: PolitenessBudget,
    pub timeout_secs: u64,
}

impl SourceSettings {
    fn merged(mut self, file: Option<&SourceFileConfig>) -> Self {
        if let Some(file) = file {
            if let Some(url) = &file.base_url {
                self.base_url = url.clone();
            }
            if let Some([min, max]) = file.politeness_ms {
                self.politeness = PolitenessBudget::new(min, max);
            }
            if let Some(secs) = file.timeout_secs {
                self.timeout_secs = secs;
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcesConfig {
    pub statsbomb: SourceSettings,
    pub footballia: SourceSettings,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            statsbomb: SourceSettings {
                base_url: statsbomb::DEFAULT_BASE_URL.to_string(),
                politeness: PolitenessBudget::new(200, 600),
                timeout_secs: 30,
            },
            footballia: SourceSettings {
                base_url: footballia::DEFAULT_BASE_URL.to_string(),
                politeness: PolitenessBudget::new(1000, 2500),
                timeout_secs: 30,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSettings {
    /// Worker count (N)
    pub concurrency: usize,
    /// Log a progress line every this many processed events
    pub progress_every: usize,
    pub retry: RetryPolicy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            progress_every: 10,
            retry: RetryPolicy::default(),
        }
    }
}

impl IngestSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidSetting(
                "ingest.concurrency must be at least 1".to_string(),
            ));
        }
        if self.progress_every == 0 {
            return Err(ConfigError::InvalidSetting(
                "ingest.progress_every must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting(
                "ingest.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSettings {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub store: StoreSettings,
    pub ingest: IngestSettings,
    pub sources: SourcesConfig,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn default_db_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::InvalidSetting("failed to determine home directory".to_string())
    })?;
    Ok(home.join(CONFIG_DIR).join(DEFAULT_DB_FILE))
}

/// Merge the config file (if any), the env override and defaults
fn resolve(
    config_file: Option<PathBuf>,
    env_db: Option<String>,
) -> Result<ResolvedConfig, ConfigError> {
    let file = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    // Project root is the parent of .squadgraph/
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));

    let path = match (env_db, &file.store.path) {
        (Some(env), _) if !env.trim().is_empty() => PathBuf::from(env),
        (_, Some(p)) => resolve_path(base_dir, p),
        _ => default_db_path()?,
    };

    let store = StoreSettings {
        path,
        busy_timeout_ms: file.store.busy_timeout_ms.unwrap_or(5000),
    };

    let defaults = IngestSettings::default();
    let ingest = IngestSettings {
        concurrency: file.ingest.concurrency.unwrap_or(defaults.concurrency),
        progress_every: file.ingest.progress_every.unwrap_or(defaults.progress_every),
        retry: file.ingest.retry.clone().unwrap_or(defaults.retry),
    };
    ingest.validate()?;

    let defaults = SourcesConfig::default();
    let sources = SourcesConfig {
        statsbomb: defaults.statsbomb.merged(file.sources.statsbomb.as_ref()),
        footballia: defaults.footballia.merged(file.sources.footballia.as_ref()),
    };

    Ok(ResolvedConfig {
        store,
        ingest,
        sources,
        config_file,
    })
}

/// Load configuration discovered from `dir` (uncached)
pub fn load_config_from(dir: &Path) -> Result<ResolvedConfig, ConfigError> {
    resolve(find_config_file(dir), std::env::var(DB_ENV_VAR).ok())
}

fn load_config() -> anyhow::Result<ResolvedConfig> {
    let cwd = std::env::current_dir()?;
    Ok(load_config_from(&cwd)?)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> anyhow::Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", body).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None, None).unwrap();

        let expected = dirs::home_dir()
            .unwrap()
            .join(".squadgraph")
            .join("squadgraph.sqlite3");
        assert_eq!(config.store.path, expected);
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert_eq!(config.ingest, IngestSettings::default());
        assert_eq!(config.sources.footballia.politeness, PolitenessBudget::new(1000, 2500));
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            r#"
version: "1"
store:
  path: ./data/football.sqlite3
ingest:
  concurrency: 2
  retry:
    max_attempts: 5
sources:
  footballia:
    politeness_ms: [50, 10]
"#,
        );

        let config = resolve(Some(path.clone()), None).unwrap();
        assert_eq!(config.store.path, temp.path().join("./data/football.sqlite3"));
        assert_eq!(config.ingest.concurrency, 2);
        assert_eq!(config.ingest.progress_every, 10);
        assert_eq!(config.ingest.retry.max_attempts, 5);
        assert_eq!(config.ingest.retry.initial_delay_ms, 1000);
        assert_eq!(config.sources.footballia.politeness, PolitenessBudget::new(10, 50));
        assert_eq!(config.sources.footballia.base_url, footballia::DEFAULT_BASE_URL);
        assert_eq!(config.config_file, Some(path));
    }

    #[test]
    fn test_env_overrides_file_path() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "store:\n  path: ./a.sqlite3\n");

        let config = resolve(Some(path), Some("/tmp/b.sqlite3".to_string())).unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/b.sqlite3"));
    }

    #[test]
    fn test_discovery_walks_upward() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "version: \"1\"\n");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(path));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "ingest:\n  concurrency: 0\n");
        assert!(matches!(resolve(Some(path), None), Err(ConfigError::InvalidSetting(_))));

        let path = write_config(temp.path(), "ingest: [not, a, map]\n");
        assert!(matches!(resolve(Some(path), None), Err(ConfigError::Parse { .. })));
    }
}

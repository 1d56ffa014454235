//! Configuration for cohortlens.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (COHORTLENS_HOME, COHORTLENS_DATA)
//! 2. Config file (.cohortlens/config.yaml)
//! 3. Defaults (~/.cohortlens, ./data, built-in roster)
//!
//! Config file discovery:
//! - Searches current directory and parents for .cohortlens/config.yaml
//! - Paths in config file are relative to the config file's project root

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::RetryPolicy;
use crate::specialists::{MetricField, DEFAULT_DEADLINE};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub orchestrator: Option<OrchestratorConfig>,
    #[serde(default)]
    pub specialists: Vec<SpecialistConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .cohortlens/)
    pub home: Option<String>,
    /// CSV data directory (relative to project root)
    pub data: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-attempt deadline in milliseconds
    pub deadline_ms: Option<u64>,
    pub retry: Option<RetryPolicy>,
}

/// One roster entry
#[derive(Debug, Clone, Deserialize)]
pub struct SpecialistConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: SpecialistKind,
    /// Overrides the orchestrator deadline for this specialist
    pub deadline_ms: Option<u64>,
    /// Overrides the orchestrator retry policy for this specialist
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpecialistKind {
    /// One of the built-in specialists, selected by name
    Builtin,
    /// Remote specialist reached over HTTP
    Http { url: String, fields: Vec<MetricField> },
}

/// Deadline and retry defaults applied to every roster entry
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub deadline: Duration,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            retry: RetryPolicy::default(),
        }
    }
}

impl OrchestratorSettings {
    fn from_config(config: Option<&OrchestratorConfig>) -> Self {
        let defaults = Self::default();
        match config {
            Some(c) => Self {
                deadline: c
                    .deadline_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.deadline),
                retry: c.retry.clone().unwrap_or(defaults.retry),
            },
            None => defaults,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Path to cohortlens home (reports and state)
    pub home: PathBuf,
    /// Directory searched for CSV files
    pub data_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Orchestrator defaults
    pub orchestrator: OrchestratorSettings,
    /// Configured roster (empty means built-ins)
    pub specialists: Vec<SpecialistConfig>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".cohortlens").join("config.yaml");
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
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse config YAML content
pub fn parse_config(content: &str) -> Result<ConfigFile> {
    serde_yaml::from_str(content).context("Invalid config YAML")
}

/// Resolve a path that may be relative to a base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".cohortlens");
    let default_data = PathBuf::from("data");

    let config_file = find_config_file();

    let (home, data_dir, orchestrator, specialists) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        // .cohortlens/ and the project root above it
        let state_dir = config_path.parent().unwrap_or(Path::new("."));
        let base_dir = state_dir.parent().unwrap_or(Path::new("."));

        let home = if let Ok(env_home) = std::env::var("COHORTLENS_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            resolve_path(state_dir, home_path)
        } else {
            default_home.clone()
        };

        let data_dir = if let Ok(env_data) = std::env::var("COHORTLENS_DATA") {
            PathBuf::from(env_data)
        } else if let Some(ref data_path) = config.paths.data {
            resolve_path(base_dir, data_path)
        } else {
            base_dir.join(&default_data)
        };

        let orchestrator = OrchestratorSettings::from_config(config.orchestrator.as_ref());

        (home, data_dir, orchestrator, config.specialists)
    } else {
        // No config file - use env vars or defaults
        let home = std::env::var("COHORTLENS_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());

        let data_dir = std::env::var("COHORTLENS_DATA")
            .map(PathBuf::from)
            .unwrap_or(default_data);

        (home, data_dir, OrchestratorSettings::default(), Vec::new())
    };

    Ok(ResolvedConfig {
        home,
        data_dir,
        config_file,
        orchestrator,
        specialists,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Get the reports directory ($COHORTLENS_HOME/reports)
pub fn reports_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("reports"))
}

/// Get the CSV data directory
pub fn data_dir() -> Result<PathBuf> {
    Ok(config()?.data_dir.clone())
}

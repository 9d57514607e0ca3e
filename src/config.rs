use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::core::BackupJob;
use crate::core::transfer_engine::DEFAULT_MAX_FILE_SIZE;

pub const DEFAULT_CONFIG_FILE: &str = "savejob.toml";
const ENV_PREFIX: &str = "SAVEJOB_";

/// On-disk format of the business log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Xml,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Jobs refuse to start while a process runs from this executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_software: Option<PathBuf>,
    /// External tool invoked as `<tool> [args...] <source> <destination>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_tool: Option<PathBuf>,
    #[serde(default)]
    pub encryption_args: Vec<String>,
    /// Files larger than this many bytes are skipped; 0 disables the limit.
    pub max_file_size: u64,
    #[serde(default)]
    pub log_format: LogFormat,
    pub log_directory: PathBuf,
    pub state_directory: PathBuf,
    pub verbose: bool,
    pub json_logs: bool,
    #[serde(default)]
    pub jobs: Vec<BackupJob>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            business_software: None,
            encryption_tool: None,
            encryption_args: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            log_format: LogFormat::Json,
            log_directory: data_dir.join("logs"),
            state_directory: data_dir.join("states"),
            verbose: false,
            json_logs: false,
            jobs: Vec::new(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("savejob")
}

impl AppConfig {
    /// Layer defaults, the TOML file, `SAVEJOB_*` environment variables and
    /// command-line overrides, in that order.
    pub fn new<T: Serialize>(file: Option<&Path>, overrides: Option<&T>) -> Result<Self> {
        let file = file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["jobs"]));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", file.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                bail!("Backup job with source {} has no name", job.source.display());
            }
            if !seen.insert(job.name.as_str()) {
                bail!("Duplicate backup job name: {}", job.name);
            }
        }
        Ok(())
    }

    pub fn max_file_size_limit(&self) -> Option<u64> {
        (self.max_file_size > 0).then_some(self.max_file_size)
    }

    pub fn job(&self, name: &str) -> Option<&BackupJob> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;

/// What to do when a line or file cannot be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Abort the whole run on the first error. No table is produced.
    #[default]
    FailFast,
    /// Skip malformed lines and unreadable files, record them in the
    /// failure report, and return the table built from everything else.
    Isolate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyConfig {
    /// Directory to scan when none is given on the command line.
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
    /// Worker pool size. `0` means one worker per available CPU.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    /// How many isolated failures to keep verbatim in the report.
    #[serde(default = "default_failure_samples")]
    pub failure_samples: usize,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            workers: default_workers(),
            error_policy: ErrorPolicy::default(),
            failure_samples: default_failure_samples(),
        }
    }
}

impl TallyConfig {
    /// The effective worker count, resolving `0` to the number of
    /// available processing units.
    #[must_use]
    pub fn resolved_workers(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.workers).unwrap_or_else(available_workers)
    }
}

/// Number of processing units, falling back to one when unknown.
#[must_use]
pub fn available_workers() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

pub fn load_config(path: &Path) -> Result<TallyConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<TallyConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `<config dir>/logtally/config.toml`, or defaults when it is absent.
pub fn load_user_config() -> Result<TallyConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(TallyConfig::default());
    };

    let path = config_dir.join("logtally/config.toml");
    if !path.exists() {
        return Ok(TallyConfig::default());
    }

    load_config(&path)
}

const fn default_workers() -> usize {
    1
}

const fn default_failure_samples() -> usize {
    100
}

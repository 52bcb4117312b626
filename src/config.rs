//! Run configuration, read from JSON.
//!
//! ```json
//! {
//!   "domain": "software_eol",
//!   "task_timeout_secs": 120,
//!   "sources": [
//!     { "id": "paloalto", "snapshot": "paloalto.json" },
//!     { "id": "vendor-x", "group_label": { "fixed": "Vendor X" },
//!       "rules": [{ "pattern": "retire", "role": "eol_date" }] }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::ConcurrentAggregator;
use crate::harvest::assemble::{GroupLabelStrategy, RecordAssembler};
use crate::harvest::columns::{ColumnRoleResolver, HeaderConflict, RoleRule};
use crate::model::{Domain, Role};
use crate::sink::{ExportFormat, FileSink};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Source '{source_id}': invalid rule pattern '{pattern}': {error}")]
    InvalidRule {
        source_id: String,
        pattern: String,
        error: regex::Error,
    },
    #[error("Source '{source_id}': role '{role}' is not part of domain {domain:?}")]
    RoleOutsideDomain {
        source_id: String,
        role: Role,
        domain: Domain,
    },
    #[error("Source id must not be empty")]
    EmptySourceId,
    #[error("Duplicate source id '{0}'")]
    DuplicateSource(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub domain: Domain,

    /// Worker count; defaults to the available parallelism.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Per-source deadline; `null` disables it.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: Option<u64>,

    #[serde(default)]
    pub dedupe: bool,

    #[serde(default)]
    pub header_conflict: HeaderConflict,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            domain: Domain::default(),
            concurrency: None,
            task_timeout_secs: default_task_timeout_secs(),
            dedupe: false,
            header_conflict: HeaderConflict::default(),
            output: OutputConfig::default(),
            sources: Vec::new(),
        }
    }
}

fn default_task_timeout_secs() -> Option<u64> {
    Some(300)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_formats")]
    pub formats: Vec<ExportFormat>,

    #[serde(default = "default_records_stem")]
    pub records_stem: String,

    #[serde(default = "default_summary_file")]
    pub summary_file: String,

    #[serde(default)]
    pub timestamped: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            formats: default_formats(),
            records_stem: default_records_stem(),
            summary_file: default_summary_file(),
            timestamped: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_formats() -> Vec<ExportFormat> {
    vec![ExportFormat::Csv, ExportFormat::Json]
}

fn default_records_stem() -> String {
    String::from("records")
}

fn default_summary_file() -> String {
    String::from("summary.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,

    /// Pre-fetched tables for [`crate::snapshot::SnapshotFetcher`].
    #[serde(default)]
    pub snapshot: Option<PathBuf>,

    #[serde(default)]
    pub group_label: GroupLabelStrategy,

    /// Replaces the domain's built-in rules when present.
    #[serde(default)]
    pub rules: Option<Vec<RuleConfig>>,

    /// Overrides the run-wide header conflict policy.
    #[serde(default)]
    pub header_conflict: Option<HeaderConflict>,
}

impl SourceConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            snapshot: None,
            group_label: GroupLabelStrategy::default(),
            rules: None,
            header_conflict: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub pattern: String,
    pub role: Role,
}

impl HarvestConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: HarvestConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks source ids and compiles every rule override.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(ConfigError::EmptySourceId);
            }
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateSource(source.id.clone()));
            }
            self.resolver_for(source)?;
        }
        Ok(())
    }

    pub fn resolver_for(&self, source: &SourceConfig) -> Result<ColumnRoleResolver, ConfigError> {
        let conflict = source.header_conflict.unwrap_or(self.header_conflict);
        let resolver = ColumnRoleResolver::for_domain(self.domain).with_conflict(conflict);

        let Some(rules) = &source.rules else {
            return Ok(resolver);
        };

        let roles = self.domain.roles();
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            if !roles.contains(&rule.role) {
                return Err(ConfigError::RoleOutsideDomain {
                    source_id: source.id.clone(),
                    role: rule.role,
                    domain: self.domain,
                });
            }
            let compiled_rule =
                RoleRule::new(&rule.pattern, rule.role).map_err(|error| ConfigError::InvalidRule {
                    source_id: source.id.clone(),
                    pattern: rule.pattern.clone(),
                    error,
                })?;
            compiled.push(compiled_rule);
        }

        Ok(resolver.with_rules(compiled))
    }

    pub fn assembler_for(&self, source: &SourceConfig) -> Result<RecordAssembler, ConfigError> {
        Ok(RecordAssembler::new(self.resolver_for(source)?)
            .with_strategy(source.group_label.clone()))
    }

    pub fn aggregator(&self) -> ConcurrentAggregator {
        let aggregator = match self.concurrency {
            Some(n) => ConcurrentAggregator::new(n),
            None => ConcurrentAggregator::default(),
        };
        aggregator
            .with_timeout(self.task_timeout_secs.map(Duration::from_secs))
            .with_dedupe(self.dedupe)
    }

    pub fn sink(&self) -> FileSink {
        FileSink::new(&self.output.dir, self.domain)
            .with_formats(self.output.formats.clone())
            .with_records_stem(self.output.records_stem.clone())
            .with_summary_file(self.output.summary_file.clone())
            .with_timestamp(self.output.timestamped)
    }
}

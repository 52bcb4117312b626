//! File exports: the record list (CSV and/or JSON) plus a run summary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::executor::{AggregationResult, RunSummary, SourceReport};
use crate::model::{CanonicalRecord, Domain, Role};
use crate::traits::{ResultSink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

#[derive(Serialize)]
struct SummaryExport<'a> {
    #[serde(flatten)]
    summary: &'a RunSummary,
    sources: &'a [SourceReport],
}

/// Writes exports into one directory, creating it when missing.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    roles: Vec<Role>,
    formats: Vec<ExportFormat>,
    records_stem: String,
    summary_file: String,
    timestamped: bool,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, domain: Domain) -> Self {
        Self {
            dir: dir.into(),
            roles: domain.roles().to_vec(),
            formats: vec![ExportFormat::Csv, ExportFormat::Json],
            records_stem: "records".to_string(),
            summary_file: "summary.json".to_string(),
            timestamped: false,
        }
    }

    pub fn with_formats(mut self, formats: Vec<ExportFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_records_stem(mut self, stem: impl Into<String>) -> Self {
        self.records_stem = stem.into();
        self
    }

    pub fn with_summary_file(mut self, name: impl Into<String>) -> Self {
        self.summary_file = name.into();
        self
    }

    /// Appends `_YYYYMMDD_HHMMSS` (local time) to record export names.
    pub fn with_timestamp(mut self, timestamped: bool) -> Self {
        self.timestamped = timestamped;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, format: ExportFormat, stamp: Option<&str>) -> PathBuf {
        let name = match stamp {
            Some(stamp) => format!("{}_{}.{}", self.records_stem, stamp, format.extension()),
            None => format!("{}.{}", self.records_stem, format.extension()),
        };
        self.dir.join(name)
    }

    /// CSV bytes: a `group,source,<roles…>` header, then one line per record.
    pub fn render_csv(&self, records: &[CanonicalRecord]) -> Result<Vec<u8>, SinkError> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["group", "source"];
        header.extend(self.roles.iter().map(Role::as_str));
        writer.write_record(&header)?;

        for record in records {
            writer.write_record(record.to_row(&self.roles))?;
        }

        writer
            .into_inner()
            .map_err(|e| SinkError::IoError(e.into_error()))
    }

    pub fn render_json(&self, records: &[CanonicalRecord]) -> Result<Vec<u8>, SinkError> {
        Ok(serde_json::to_vec_pretty(records)?)
    }

    fn render_summary(&self, result: &AggregationResult) -> Result<Vec<u8>, SinkError> {
        let export = SummaryExport {
            summary: &result.summary,
            sources: &result.reports,
        };
        Ok(serde_json::to_vec_pretty(&export)?)
    }
}

#[async_trait]
impl ResultSink for FileSink {
    async fn persist(&self, result: &AggregationResult) -> Result<Vec<PathBuf>, SinkError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stamp = self
            .timestamped
            .then(|| chrono::Local::now().format("%Y%m%d_%H%M%S").to_string());

        let mut written = Vec::with_capacity(self.formats.len() + 1);
        for format in &self.formats {
            let bytes = match format {
                ExportFormat::Csv => self.render_csv(&result.records)?,
                ExportFormat::Json => self.render_json(&result.records)?,
            };
            let path = self.record_path(*format, stamp.as_deref());
            tokio::fs::write(&path, bytes).await?;
            written.push(path);
        }

        let summary_path = self.dir.join(&self.summary_file);
        tokio::fs::write(&summary_path, self.render_summary(result)?).await?;
        written.push(summary_path);

        info!(
            dir = %self.dir.display(),
            records = result.records.len(),
            files = written.len(),
            "Exports written"
        );
        Ok(written)
    }
}

//! Per-source extraction pipeline.
//!
//! A [`SourceTask`] runs one source end to end:
//! 1. **Fetch**: the (possibly blocking) [`TableFetcher`] on tokio's blocking pool
//! 2. **Resolve + assemble**: pure, via [`RecordAssembler`]
//!
//! Tasks own everything they touch and return their records by value, so any
//! number of them can run side by side. Failure of one task is reported as a
//! [`SourceError`] and never affects another.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

use crate::harvest::assemble::RecordAssembler;
use crate::model::CanonicalRecord;
use crate::traits::{FetchError, TableFetcher};

// ============================================================================
// Pipeline Types
// ============================================================================

/// Output of one successful source.
#[derive(Debug)]
pub struct SourceOutput {
    /// Source identifier, as configured
    pub source: String,

    /// Records in row order
    pub records: Vec<CanonicalRecord>,

    /// Processing statistics
    pub stats: SourceStats,
}

/// Statistics about one source run.
#[derive(Debug, Default, Clone)]
pub struct SourceStats {
    /// Time spent in the fetch layer (milliseconds)
    pub fetch_duration_ms: u64,

    /// Time spent resolving and assembling (milliseconds)
    pub assemble_duration_ms: u64,

    /// Number of tables handed over by the fetch layer
    pub tables: usize,

    /// Number of raw rows across all tables
    pub rows: usize,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that make a source contribute zero records.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// The fetch layer failed
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The task exceeded its deadline
    #[error("Source timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The task panicked
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// The task could not be scheduled or joined
    #[error("Task join error: {0}")]
    TaskJoin(String),
}

// ============================================================================
// Source Task
// ============================================================================

/// One source's fetch → resolve → assemble unit of work.
pub struct SourceTask {
    source: String,
    fetcher: Arc<dyn TableFetcher>,
    assembler: Arc<RecordAssembler>,
}

impl SourceTask {
    pub fn new<F>(source: impl Into<String>, fetcher: F, assembler: RecordAssembler) -> Self
    where
        F: TableFetcher + 'static,
    {
        Self {
            source: source.into(),
            fetcher: Arc::new(fetcher),
            assembler: Arc::new(assembler),
        }
    }

    /// Builds a task sharing an already-wrapped fetcher and assembler.
    pub fn from_parts(
        source: impl Into<String>,
        fetcher: Arc<dyn TableFetcher>,
        assembler: Arc<RecordAssembler>,
    ) -> Self {
        Self {
            source: source.into(),
            fetcher,
            assembler,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Runs the pipeline to completion.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Fetch`] when the fetch layer fails and
    /// [`SourceError::Panicked`] / [`SourceError::TaskJoin`] when the blocking
    /// fetch cannot be joined. Row-level problems are never errors.
    #[instrument(skip(self), fields(source = %self.source))]
    pub async fn run(self) -> Result<SourceOutput, SourceError> {
        let mut stats = SourceStats::default();

        // ====================================================================
        // Stage 1: Fetch
        // ====================================================================

        let fetch_start = Instant::now();
        let fetcher = Arc::clone(&self.fetcher);

        let tables = tokio::task::spawn_blocking(move || fetcher.fetch())
            .await
            .map_err(|e| {
                if e.is_panic() {
                    SourceError::Panicked(e.to_string())
                } else {
                    SourceError::TaskJoin(e.to_string())
                }
            })??;

        stats.fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;
        stats.tables = tables.len();
        stats.rows = tables.iter().map(|t| t.rows.len()).sum();

        info!(
            duration_ms = stats.fetch_duration_ms,
            tables = stats.tables,
            rows = stats.rows,
            "Fetch completed"
        );

        // ====================================================================
        // Stage 2: Resolve + assemble
        // ====================================================================

        let assemble_start = Instant::now();
        let records = self.assembler.assemble_tables(&self.source, &tables);
        stats.assemble_duration_ms = assemble_start.elapsed().as_millis() as u64;

        info!(
            duration_ms = stats.assemble_duration_ms,
            records = records.len(),
            "Assembly completed"
        );

        Ok(SourceOutput {
            source: self.source,
            records,
            stats,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::columns::ColumnRoleResolver;
    use crate::model::{Domain, RawRow, RawTable, Role};

    fn assembler() -> RecordAssembler {
        RecordAssembler::new(ColumnRoleResolver::for_domain(Domain::SoftwareEol))
    }

    fn eol_tables() -> Result<Vec<RawTable>, FetchError> {
        Ok(vec![
            RawTable {
                header: Some(vec!["Version".into(), "Release Date".into(), "EOL Date".into()]),
                group_label: Some("PAN-OS".into()),
                rows: vec![
                    RawRow::plain(["11.1", "May 3, 2023", "May 3, 2025"]),
                    RawRow::plain(["11.0", "November 17, 2022", "November 17, 2024"]),
                ],
            },
            RawTable {
                header: Some(vec!["Version".into(), "EOL Date".into()]),
                group_label: None,
                rows: vec![RawRow::plain(["10.2", "08/01/2025"])],
            },
        ])
    }

    #[tokio::test]
    async fn test_task_execution() {
        let task = SourceTask::new("paloalto", eol_tables, assembler());
        let output = task.run().await.unwrap();

        assert_eq!(output.source, "paloalto");
        assert_eq!(output.records.len(), 3);
        assert_eq!(output.stats.tables, 2);
        assert_eq!(output.stats.rows, 3);

        // row order and group carry-over are preserved
        let versions: Vec<_> = output
            .records
            .iter()
            .map(|r| r.get(Role::Version).unwrap())
            .collect();
        assert_eq!(versions, vec!["11.1", "11.0", "10.2"]);
        assert_eq!(output.records[2].group, "PAN-OS");
        assert_eq!(output.records[2].get(Role::EolDate), Some("2025-08-01"));
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let fetcher = || -> Result<Vec<RawTable>, FetchError> {
            Err(FetchError::Unavailable("page did not load".into()))
        };
        let task = SourceTask::new("broken", fetcher, assembler());

        let err = task.run().await.unwrap_err();
        assert!(matches!(err, SourceError::Fetch(FetchError::Unavailable(_))));
        assert!(err.to_string().contains("page did not load"));
    }

    #[tokio::test]
    async fn test_fetch_panic_is_reported() {
        let fetcher = || -> Result<Vec<RawTable>, FetchError> { panic!("driver crashed") };
        let task = SourceTask::new("panicky", fetcher, assembler());

        let err = task.run().await.unwrap_err();
        assert!(matches!(err, SourceError::Panicked(_)));
    }

    #[tokio::test]
    async fn test_empty_fetch_is_success() {
        let fetcher = || -> Result<Vec<RawTable>, FetchError> { Ok(vec![]) };
        let output = SourceTask::new("empty", fetcher, assembler())
            .run()
            .await
            .unwrap();
        assert!(output.records.is_empty());
        assert_eq!(output.stats.tables, 0);
    }
}

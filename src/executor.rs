use crate::harvest::pipeline::{SourceError, SourceOutput, SourceTask};
use crate::model::CanonicalRecord;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Outcome of one source task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Succeeded { records: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

impl SourceReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SourceOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_records: usize,
    pub sources_used: usize, // distinct sources among successful records
    pub duplicates_removed: usize,
    pub failed_sources: Vec<String>,
}

/// Everything one run produced. Built once, then handed to a sink.
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    pub records: Vec<CanonicalRecord>,
    pub reports: Vec<SourceReport>,
    pub summary: RunSummary,
}

pub struct ConcurrentAggregator {
    concurrency: usize,
    semaphore: Arc<Semaphore>,
    task_timeout: Option<Duration>,
    dedupe: bool,
}

impl Default for ConcurrentAggregator {
    fn default() -> Self {
        Self::new(default_concurrency())
    }
}

/// Worker count when none is configured.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl ConcurrentAggregator {
    pub fn new(concurrency_limit: usize) -> Self {
        let concurrency = concurrency_limit.max(1);
        Self {
            concurrency,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            task_timeout: None,
            dedupe: false,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Per-task deadline; an expired task counts as a failed source.
    ///
    /// A blocking fetch cannot be interrupted. After its deadline the permit
    /// is released while the fetch thread runs on, so more than
    /// `concurrency` fetches may be executing at once. Use
    /// [`block_on_with_grace`] so process exit does not wait for them.
    pub fn with_timeout(mut self, task_timeout: Option<Duration>) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    /// Drops records whose group label and role values were already seen.
    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// Runs every task and waits for all of them.
    ///
    /// Records are merged in completion order; a source's own records keep
    /// their order. A failing task is logged and contributes nothing.
    pub async fn run(&self, tasks: Vec<SourceTask>) -> AggregationResult {
        info!(
            tasks = tasks.len(),
            workers = self.concurrency,
            "Starting aggregation"
        );

        let mut pending = FuturesUnordered::new();
        for task in tasks {
            let source = task.source().to_string();
            let handle = tokio::spawn(run_guarded(
                task,
                Arc::clone(&self.semaphore),
                self.task_timeout,
            ));
            pending.push(async move { (source, handle.await) });
        }

        let mut records = Vec::new();
        let mut reports = Vec::new();

        while let Some((source, joined)) = pending.next().await {
            let (duration_ms, result) = match joined {
                Ok(done) => done,
                Err(e) if e.is_panic() => (0, Err(SourceError::Panicked(e.to_string()))),
                Err(e) => (0, Err(SourceError::TaskJoin(e.to_string()))),
            };

            let outcome = match result {
                Ok(output) => {
                    info!(
                        source = %source,
                        records = output.records.len(),
                        duration_ms,
                        "Source finished"
                    );
                    let count = output.records.len();
                    records.extend(output.records);
                    SourceOutcome::Succeeded { records: count }
                }
                Err(e) => {
                    error!(source = %source, error = %e, duration_ms, "Source failed");
                    SourceOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            reports.push(SourceReport {
                source,
                duration_ms,
                outcome,
            });
        }

        let duplicates_removed = if self.dedupe {
            remove_duplicates(&mut records)
        } else {
            0
        };

        let summary = summarize(&records, &reports, duplicates_removed);
        info!(
            total_records = summary.total_records,
            sources_used = summary.sources_used,
            duplicates_removed = summary.duplicates_removed,
            failed = summary.failed_sources.len(),
            "Aggregation finished"
        );

        AggregationResult {
            records,
            reports,
            summary,
        }
    }
}

/// Runs `future` on a fresh multi-threaded runtime, then shuts the runtime
/// down waiting at most `grace` for leftover blocking work.
///
/// A fetch abandoned by its deadline keeps its blocking thread busy; dropping
/// the runtime normally would wait for it.
pub fn block_on_with_grace<F: Future>(future: F, grace: Duration) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

async fn run_guarded(
    task: SourceTask,
    semaphore: Arc<Semaphore>,
    deadline: Option<Duration>,
) -> (u64, Result<SourceOutput, SourceError>) {
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return (0, Err(SourceError::TaskJoin(format!("Semaphore error: {}", e)))),
    };

    info!("Starting source: {}", task.source());
    let start = Instant::now();

    let result = match deadline {
        Some(limit) => match timeout(limit, task.run()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                timeout_ms: limit.as_millis() as u64,
            }),
        },
        None => task.run().await,
    };

    (start.elapsed().as_millis() as u64, result)
}

/// Keeps the first record of each natural key; returns how many were dropped.
fn remove_duplicates(records: &mut Vec<CanonicalRecord>) -> usize {
    let before = records.len();
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.natural_key()));

    let removed = before - records.len();
    if removed > 0 {
        warn!(removed, "Dropped duplicate records");
    }
    removed
}

fn summarize(
    records: &[CanonicalRecord],
    reports: &[SourceReport],
    duplicates_removed: usize,
) -> RunSummary {
    let sources: HashSet<&str> = records.iter().map(|r| r.source.as_str()).collect();

    let mut failed_sources: Vec<String> = reports
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.source.clone())
        .collect();
    failed_sources.sort();

    RunSummary {
        total_records: records.len(),
        sources_used: sources.len(),
        duplicates_removed,
        failed_sources,
    }
}

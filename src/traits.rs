use crate::executor::AggregationResult;
use crate::model::RawTable;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed source content: {0}")]
    Malformed(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// The fetch layer: hands over one source's already-extracted tables.
///
/// Implementations may block (browser automation, HTTP); the pipeline runs
/// them on the blocking thread pool.
pub trait TableFetcher: Send + Sync {
    fn fetch(&self) -> Result<Vec<RawTable>, FetchError>;
}

impl<F> TableFetcher for F
where
    F: Fn() -> Result<Vec<RawTable>, FetchError> + Send + Sync,
{
    fn fetch(&self) -> Result<Vec<RawTable>, FetchError> {
        self()
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persists the records and run summary, returning the written paths.
    ///
    /// Zero records is a valid export. Failures are returned as-is; nothing
    /// is retried.
    async fn persist(&self, result: &AggregationResult) -> Result<Vec<PathBuf>, SinkError>;
}

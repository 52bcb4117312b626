//! Fetch layer backed by JSON snapshots of already-scraped pages.
//!
//! A snapshot is a JSON array of [`RawTable`]s:
//!
//! ```json
//! [{ "group_label": "PAN-OS",
//!    "header": ["Version", "Release Date", "End-of-Life Date"],
//!    "rows": [[{ "text": "11.0" }, { "text": "November 17, 2022" }, { "text": "November 17, 2024" }]] }]
//! ```

use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::model::RawTable;
use crate::traits::{FetchError, TableFetcher};

#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    path: PathBuf,
}

impl SnapshotFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TableFetcher for SnapshotFetcher {
    fn fetch(&self) -> Result<Vec<RawTable>, FetchError> {
        let text = fs::read_to_string(&self.path)?;
        let tables: Vec<RawTable> = serde_json::from_str(&text).map_err(|e| {
            FetchError::Malformed(format!("{}: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), tables = tables.len(), "Loaded snapshot");
        Ok(tables)
    }
}

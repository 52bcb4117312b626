//! Harvest module - schema inference and record extraction pipeline.
//!
//! - **Dates**: [`DateNormalizer`] maps known date spellings to `YYYY-MM-DD`
//! - **Columns**: [`ColumnRoleResolver`] assigns roles to header columns
//! - **Assembly**: [`RecordAssembler`] turns raw rows into canonical records
//! - **Pipeline**: [`SourceTask`] runs one source end to end

pub mod assemble;
pub mod columns;
pub mod dates;
pub mod pipeline;

// Re-export commonly used types
pub use assemble::{placeholder_label, GroupLabelStrategy, RecordAssembler};
pub use columns::{default_rules, ColumnRoleMap, ColumnRoleResolver, HeaderConflict, RoleRule};
pub use dates::{normalize_date, DateFormat, DateNormalizer};
pub use pipeline::{SourceError, SourceOutput, SourceStats, SourceTask};

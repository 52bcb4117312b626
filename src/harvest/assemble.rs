//! Record assembly: raw rows + resolved roles → [`CanonicalRecord`]s.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::harvest::columns::{ColumnRoleMap, ColumnRoleResolver};
use crate::harvest::dates::DateNormalizer;
use crate::model::{CanonicalRecord, RawRow, RawTable, Role};

/// How a source's tables obtain their group label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupLabelStrategy {
    /// A table without a label reuses the previous table's label.
    #[default]
    CarryOver,
    /// A table without a label always gets a placeholder.
    PerTable,
    /// Every table uses this label (e.g. the vendor name).
    Fixed(String),
}

/// Placeholder label for the `n`-th table (1-based) of a source.
pub fn placeholder_label(n: usize) -> String {
    format!("Unknown_Table_{}", n)
}

/// Turns raw rows into canonical records.
#[derive(Debug, Clone)]
pub struct RecordAssembler {
    resolver: ColumnRoleResolver,
    dates: DateNormalizer,
    strategy: GroupLabelStrategy,
}

impl RecordAssembler {
    pub fn new(resolver: ColumnRoleResolver) -> Self {
        Self {
            resolver,
            dates: DateNormalizer::new(),
            strategy: GroupLabelStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: GroupLabelStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Assembles every table of one source, in order.
    ///
    /// Each table gets a fresh role map from its header row (or an
    /// all-unresolved map when it has none) and a group label chosen by the
    /// configured [`GroupLabelStrategy`].
    pub fn assemble_tables(&self, source: &str, tables: &[RawTable]) -> Vec<CanonicalRecord> {
        let mut records = Vec::new();
        let mut previous: Option<String> = None;

        for (idx, table) in tables.iter().enumerate() {
            let group = self.group_label(table, idx + 1, previous.as_deref());

            let role_map = match &table.header {
                Some(header) => self.resolver.resolve(header),
                None => self.resolver.unresolved(),
            };

            let assembled = self.assemble(source, &table.rows, &role_map, &group);
            debug!(
                source = %source,
                table = idx + 1,
                group = %group,
                resolved_roles = role_map.resolved_count(),
                rows = table.rows.len(),
                records = assembled.len(),
                "Assembled table"
            );

            records.extend(assembled);
            previous = Some(group);
        }

        records
    }

    /// Assembles the rows of one table under `role_map`.
    ///
    /// Rows are dropped, not reported, when they carry heading markup, are
    /// too short for the highest resolved column, or have no non-empty role
    /// value. A heading row that looks like a header (see
    /// [`starts_header_band`]) replaces the role map for the rows after it.
    pub fn assemble(
        &self,
        source: &str,
        rows: &[RawRow],
        role_map: &ColumnRoleMap,
        group: &str,
    ) -> Vec<CanonicalRecord> {
        let mut current = role_map.clone();
        let mut records = Vec::new();

        for (row_idx, row) in rows.iter().enumerate() {
            if row.is_empty() {
                continue;
            }

            if row.is_heading() {
                let band = self.resolver.resolve(&row.texts());
                if starts_header_band(&band, &current) {
                    trace!(row = row_idx, roles = band.resolved_count(), "Header band");
                    current = band;
                }
                continue;
            }

            let Some(max_index) = current.max_index() else {
                continue;
            };
            if row.len() <= max_index {
                trace!(row = row_idx, cells = row.len(), max_index, "Row too short");
                continue;
            }

            let values: Vec<(Role, String)> = current
                .entries()
                .iter()
                .map(|(role, idx)| (*role, self.cell_value(row, *role, *idx)))
                .collect();

            if values.iter().all(|(_, v)| v.is_empty()) {
                continue;
            }

            records.push(CanonicalRecord {
                group: group.to_string(),
                source: source.to_string(),
                values,
            });
        }

        records
    }

    fn cell_value(&self, row: &RawRow, role: Role, idx: Option<usize>) -> String {
        let raw = idx
            .and_then(|i| row.cells.get(i))
            .map(|c| c.text.trim())
            .unwrap_or_default();

        if role.is_date() {
            self.dates.normalize(raw)
        } else {
            raw.to_string()
        }
    }

    fn group_label(&self, table: &RawTable, n: usize, previous: Option<&str>) -> String {
        let explicit = table
            .group_label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty());

        match (&self.strategy, explicit) {
            (GroupLabelStrategy::Fixed(label), _) => label.clone(),
            (_, Some(label)) => label.to_string(),
            (GroupLabelStrategy::CarryOver, None) => previous
                .map(str::to_string)
                .unwrap_or_else(|| placeholder_label(n)),
            (GroupLabelStrategy::PerTable, None) => placeholder_label(n),
        }
    }
}

/// Whether a heading row resolving to `band` is a real header.
///
/// A bold notice such as "Versions below have reached EOL" matches one rule
/// by accident; it only counts when nothing is resolved yet. Otherwise a band
/// needs two roles, or every role of a one-role domain.
fn starts_header_band(band: &ColumnRoleMap, current: &ColumnRoleMap) -> bool {
    let resolved = band.resolved_count();
    if resolved == 0 {
        return false;
    }
    if current.is_unresolved() {
        return true;
    }
    resolved >= 2.min(band.entries().len())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cell, Domain};

    fn assembler() -> RecordAssembler {
        RecordAssembler::new(ColumnRoleResolver::for_domain(Domain::SoftwareEol))
    }

    fn eol_map() -> ColumnRoleMap {
        ColumnRoleMap::from_indices(
            Domain::SoftwareEol.roles(),
            &[(Role::Version, 0), (Role::ReleaseDate, 1), (Role::EolDate, 2)],
        )
    }

    #[test]
    fn test_valid_row_yields_one_record() {
        let rows = vec![RawRow::plain(["1.0", "2020-01-01", "2021-01-01"])];
        let records = assembler().assemble("src", &rows, &eol_map(), "ProductX");

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.group, "ProductX");
        assert_eq!(record.source, "src");
        assert_eq!(record.get(Role::Version), Some("1.0"));
        assert_eq!(record.get(Role::ReleaseDate), Some("2020-01-01"));
        assert_eq!(record.get(Role::EolDate), Some("2021-01-01"));
    }

    #[test]
    fn test_short_row_dropped() {
        let rows = vec![
            RawRow::plain(["1.0", "2020-01-01"]),
            RawRow::plain(["2.0", "2021-01-01", "2022-01-01"]),
        ];
        let records = assembler().assemble("src", &rows, &eol_map(), "ProductX");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(Role::Version), Some("2.0"));
    }

    #[test]
    fn test_blank_row_dropped() {
        let rows = vec![RawRow::plain(["  ", "", "\t"]), RawRow::default()];
        let records = assembler().assemble("src", &rows, &eol_map(), "ProductX");
        assert!(records.is_empty());
    }

    #[test]
    fn test_unresolved_map_drops_everything() {
        let rows = vec![RawRow::plain(["1.0", "2020-01-01", "2021-01-01"])];
        let map = ColumnRoleMap::unresolved(Domain::SoftwareEol.roles());
        assert!(assembler().assemble("src", &rows, &map, "g").is_empty());
    }

    #[test]
    fn test_dates_normalized_and_values_trimmed() {
        let rows = vec![RawRow::plain([" 10.1 ", "March 3rd, 2021", "01/05/24"])];
        let records = assembler().assemble("src", &rows, &eol_map(), "PAN-OS");
        assert_eq!(records[0].get(Role::Version), Some("10.1"));
        assert_eq!(records[0].get(Role::ReleaseDate), Some("2021-03-03"));
        assert_eq!(records[0].get(Role::EolDate), Some("2024-01-05"));
    }

    #[test]
    fn test_partial_map_leaves_unresolved_empty() {
        let map = ColumnRoleMap::from_indices(
            Domain::SoftwareEol.roles(),
            &[(Role::Version, 0), (Role::EolDate, 1)],
        );
        let rows = vec![RawRow::plain(["9.1", "TBD"])];
        let records = assembler().assemble("src", &rows, &map, "g");
        assert_eq!(records[0].get(Role::ReleaseDate), Some(""));
        assert_eq!(records[0].get(Role::EolDate), Some("TBD"));
    }

    #[test]
    fn test_heading_rows_skipped_and_start_band() {
        let rows = vec![
            RawRow::headings(["PAN-OS"]),
            RawRow::headings(["Version", "Release Date", "End-of-Life Date"]),
            RawRow::plain(["11.0", "November 17, 2022", "November 17, 2024"]),
            RawRow::headings(["EOL", "Version"]),
            RawRow::plain(["May 1, 2025", "10.2"]),
        ];
        let map = ColumnRoleMap::unresolved(Domain::SoftwareEol.roles());
        let records = assembler().assemble("paloalto", &rows, &map, "PAN-OS");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(Role::Version), Some("11.0"));
        assert_eq!(records[0].get(Role::EolDate), Some("2024-11-17"));
        assert_eq!(records[1].get(Role::Version), Some("10.2"));
        assert_eq!(records[1].get(Role::ReleaseDate), Some(""));
        assert_eq!(records[1].get(Role::EolDate), Some("2025-05-01"));
    }

    #[test]
    fn test_bold_notice_row_keeps_current_band() {
        let rows = vec![
            RawRow::headings(["Version", "Release Date", "End-of-Life Date"]),
            RawRow::plain(["11.0", "November 17, 2022", "November 17, 2024"]),
            RawRow::headings(["Versions below have reached EOL"]),
            RawRow::plain(["10.2", "February 27, 2022", "August 1, 2025"]),
        ];
        let map = ColumnRoleMap::unresolved(Domain::SoftwareEol.roles());
        let records = assembler().assemble("paloalto", &rows, &map, "PAN-OS");

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get(Role::Version), Some("10.2"));
        assert_eq!(records[1].get(Role::ReleaseDate), Some("2022-02-27"));
        assert_eq!(records[1].get(Role::EolDate), Some("2025-08-01"));
    }

    #[test]
    fn test_single_role_heading_starts_band_when_unresolved() {
        let rows = vec![
            RawRow::headings(["Version"]),
            RawRow::plain(["9.1"]),
        ];
        let map = ColumnRoleMap::unresolved(Domain::SoftwareEol.roles());
        let records = assembler().assemble("src", &rows, &map, "g");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(Role::Version), Some("9.1"));
    }

    #[test]
    fn test_row_with_one_heading_cell_is_skipped() {
        let rows = vec![RawRow {
            cells: vec![Cell::new("1.0"), Cell::heading("note"), Cell::new("x")],
        }];
        let records = assembler().assemble("src", &rows, &eol_map(), "g");
        assert!(records.is_empty());
    }

    fn table(label: Option<&str>, version: &str) -> RawTable {
        RawTable {
            header: Some(vec!["Version".into(), "Release".into(), "EOL".into()]),
            group_label: label.map(str::to_string),
            rows: vec![RawRow::plain([version, "", ""])],
        }
    }

    #[test]
    fn test_group_label_carry_over() {
        let tables = vec![
            table(None, "1"),
            table(Some("Panorama"), "2"),
            table(Some("   "), "3"),
            table(Some("GlobalProtect"), "4"),
        ];
        let records = assembler().assemble_tables("src", &tables);
        let groups: Vec<&str> = records.iter().map(|r| r.group.as_str()).collect();
        assert_eq!(
            groups,
            vec!["Unknown_Table_1", "Panorama", "Panorama", "GlobalProtect"]
        );
    }

    #[test]
    fn test_placeholder_carries_over_too() {
        let tables = vec![table(None, "1"), table(None, "2")];
        let records = assembler().assemble_tables("src", &tables);
        assert_eq!(records[1].group, "Unknown_Table_1");
    }

    #[test]
    fn test_group_label_per_table() {
        let tables = vec![table(Some("A"), "1"), table(None, "2")];
        let records = assembler()
            .with_strategy(GroupLabelStrategy::PerTable)
            .assemble_tables("src", &tables);
        assert_eq!(records[0].group, "A");
        assert_eq!(records[1].group, "Unknown_Table_2");
    }

    #[test]
    fn test_group_label_fixed() {
        let tables = vec![table(Some("A"), "1"), table(None, "2")];
        let records = assembler()
            .with_strategy(GroupLabelStrategy::Fixed("Palo Alto".into()))
            .assemble_tables("src", &tables);
        assert!(records.iter().all(|r| r.group == "Palo Alto"));
    }

    #[test]
    fn test_role_map_not_shared_across_tables() {
        let tables = vec![
            table(Some("A"), "1"),
            RawTable {
                header: Some(vec!["Notes".into()]),
                group_label: None,
                rows: vec![RawRow::plain(["5", "x", "y"])],
            },
        ];
        let records = assembler().assemble_tables("src", &tables);
        assert_eq!(records.len(), 1);
    }
}

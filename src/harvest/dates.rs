//! Date normalization for scraped table cells.
//!
//! Source pages spell dates in several ways ("January 5th, 2021", "Jan 5, 2021",
//! "01/05/21", "2021-01-05"). [`DateNormalizer`] maps every supported spelling to
//! `YYYY-MM-DD` and leaves anything else untouched (trimmed), so a date that
//! cannot be parsed never costs a record.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static DEFAULT: Lazy<DateNormalizer> = Lazy::new(DateNormalizer::new);

/// Normalizes `text` with the default format list.
pub fn normalize_date(text: &str) -> String {
    DEFAULT.normalize(text)
}

// ============================================================================
// Formats
// ============================================================================

/// Supported input formats, in the order they are attempted.
///
/// Named-month formats come first: a numeric `03/04/2021` is always read as
/// month/day, so the unambiguous spellings must get the first chance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `January 5, 2021`
    MonthNameDayYear,
    /// `Jan 5, 2021`
    AbbrevMonthDayYear,
    /// `5 January 2021` or `5 January, 2021`
    DayMonthNameYear,
    /// `01/05/2021`
    NumericFullYear,
    /// `01/05/21`
    NumericShortYear,
    /// `2021-01-05`
    Iso,
}

impl DateFormat {
    pub const ALL: [DateFormat; 6] = [
        DateFormat::MonthNameDayYear,
        DateFormat::AbbrevMonthDayYear,
        DateFormat::DayMonthNameYear,
        DateFormat::NumericFullYear,
        DateFormat::NumericShortYear,
        DateFormat::Iso,
    ];
}

// ============================================================================
// Normalizer
// ============================================================================

/// Converts free-form date text to `YYYY-MM-DD`.
#[derive(Debug, Clone)]
pub struct DateNormalizer {
    formats: Vec<DateFormat>,
    ordinal: Regex,
    numeric: Regex,
}

impl Default for DateNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DateNormalizer {
    /// Creates a normalizer trying every format of [`DateFormat::ALL`].
    pub fn new() -> Self {
        Self::with_formats(DateFormat::ALL.to_vec())
    }

    /// Creates a normalizer with a custom, ordered format list.
    pub fn with_formats(formats: Vec<DateFormat>) -> Self {
        Self {
            formats,
            ordinal: Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("valid ordinal regex"),
            numeric: Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2}|\d{4})$")
                .expect("valid numeric date regex"),
        }
    }

    /// Returns the first successful parse as `YYYY-MM-DD`, otherwise the
    /// trimmed input. Never fails.
    pub fn normalize(&self, text: &str) -> String {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
        let cleaned = self.ordinal.replace_all(&collapsed, "$1");

        self.parse(&cleaned)
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| trimmed.to_string())
    }

    /// Parses already-cleaned text with the configured formats.
    pub fn parse(&self, text: &str) -> Option<NaiveDate> {
        self.formats.iter().find_map(|fmt| self.try_format(*fmt, text))
    }

    fn try_format(&self, format: DateFormat, text: &str) -> Option<NaiveDate> {
        match format {
            DateFormat::MonthNameDayYear => parse_full_year(text, &["%B %d, %Y"]),
            DateFormat::AbbrevMonthDayYear => parse_full_year(text, &["%b %d, %Y"]),
            DateFormat::DayMonthNameYear => parse_full_year(text, &["%d %B %Y", "%d %B, %Y"]),
            DateFormat::NumericFullYear => self.parse_numeric(text, 4),
            DateFormat::NumericShortYear => self.parse_numeric(text, 2),
            DateFormat::Iso => parse_full_year(text, &["%Y-%m-%d"]),
        }
    }

    /// `MM/DD/YYYY` or `MM/DD/YY`, depending on `year_digits`.
    fn parse_numeric(&self, text: &str, year_digits: usize) -> Option<NaiveDate> {
        let caps = self.numeric.captures(text)?;
        let year_text = caps.get(3)?.as_str();
        if year_text.len() != year_digits {
            return None;
        }

        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let mut year: i32 = year_text.parse().ok()?;
        if year_digits == 2 {
            // POSIX pivot: 69-99 → 19xx, 00-68 → 20xx
            year += if year >= 69 { 1900 } else { 2000 };
        }

        NaiveDate::from_ymd_opt(year, month, day)
    }
}

/// chrono's `%Y` accepts any digit count; four-digit years only.
fn parse_full_year(text: &str, patterns: &[&str]) -> Option<NaiveDate> {
    patterns
        .iter()
        .filter_map(|p| NaiveDate::parse_from_str(text, p).ok())
        .find(|d| (1000..=9999).contains(&d.year()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_formats() {
        let cases = [
            ("January 5, 2021", "2021-01-05"),
            ("Jan 5, 2021", "2021-01-05"),
            ("December 31, 1999", "1999-12-31"),
            ("5 March 2024", "2024-03-05"),
            ("5 March, 2024", "2024-03-05"),
            ("01/05/2021", "2021-01-05"),
            ("1/5/2021", "2021-01-05"),
            ("01/05/21", "2021-01-05"),
            ("2021-01-05", "2021-01-05"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_date(input), expected, "input: {input}");
        }
    }

    #[test]
    fn test_ordinals_and_whitespace() {
        assert_eq!(normalize_date("  March 3rd, 2023 "), "2023-03-03");
        assert_eq!(normalize_date("August 1st, 2020"), "2020-08-01");
        assert_eq!(normalize_date("Nov 22nd,  2019"), "2019-11-22");
    }

    #[test]
    fn test_numeric_is_month_first() {
        assert_eq!(normalize_date("03/04/2021"), "2021-03-04");
    }

    #[test]
    fn test_two_digit_year_pivot() {
        assert_eq!(normalize_date("06/30/99"), "1999-06-30");
        assert_eq!(normalize_date("06/30/68"), "2068-06-30");
        assert_eq!(normalize_date("06/30/69"), "1969-06-30");
    }

    #[test]
    fn test_unrecognized_passes_through_trimmed() {
        assert_eq!(normalize_date("  TBD  "), "TBD");
        assert_eq!(normalize_date("Q3 2025"), "Q3 2025");
        assert_eq!(normalize_date("02/30/2021"), "02/30/2021");
        assert_eq!(normalize_date("January 5, 21"), "January 5, 21");
        assert_eq!(normalize_date("3rd quarter"), "3rd quarter");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize_date(""), "");
        assert_eq!(normalize_date("   \t"), "");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "January 5th, 2021",
            "01/05/21",
            "2021-01-05",
            "  not a date ",
            "",
            "Sept 9, 2020",
        ];
        for input in inputs {
            let once = normalize_date(input);
            assert_eq!(normalize_date(&once), once, "input: {input}");
        }
    }

    #[test]
    fn test_custom_format_list() {
        let iso_only = DateNormalizer::with_formats(vec![DateFormat::Iso]);
        assert_eq!(iso_only.normalize("Jan 5, 2021"), "Jan 5, 2021");
        assert_eq!(iso_only.normalize("2021-1-5"), "2021-01-05");
    }
}

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{MonthColumn, RawGrid};

const THAI_MONTHS: [&str; 12] = [
    "มกราคม",
    "กุมภาพันธ์",
    "มีนาคม",
    "เมษายน",
    "พฤษภาคม",
    "มิถุนายน",
    "กรกฎาคม",
    "สิงหาคม",
    "กันยายน",
    "ตุลาคม",
    "พฤศจิกายน",
    "ธันวาคม",
];

const THAI_MONTHS_SHORT: [&str; 12] = [
    "ม.ค", "ก.พ", "มี.ค", "เม.ย", "พ.ค", "มิ.ย", "ก.ค", "ส.ค", "ก.ย", "ต.ค", "พ.ย", "ธ.ค",
];

const ENGLISH_MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// English abbreviation standing on its own: "Jan 24", "Sept-23", "oct24".
fn english_abbreviation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(sept|jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)(?:[^a-z]|$)")
            .expect("static pattern")
    })
}

fn year_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{2,4})$").expect("static pattern"))
}

/// Thai display name for a 0-based month.
pub fn month_name(month_index: u32) -> &'static str {
    THAI_MONTHS[month_index as usize % 12]
}

/// Year from a trailing 2-4 digit run. Two digits mean 20xx.
pub fn parse_year(label: &str) -> Option<i32> {
    let caps = year_suffix().captures(label.trim())?;
    let digits = caps.get(1)?.as_str();
    let value: i32 = digits.parse().ok()?;
    Some(if digits.len() == 2 { 2000 + value } else { value })
}

/// 0-based month from label text. Full names are tried before abbreviations
/// so a short form cannot match inside a longer name.
pub fn parse_month(label: &str) -> Option<u32> {
    let lower = label.to_lowercase();
    let full = THAI_MONTHS
        .iter()
        .position(|m| label.contains(m))
        .or_else(|| ENGLISH_MONTHS.iter().position(|m| lower.contains(m)));
    let found = full
        .or_else(|| THAI_MONTHS_SHORT.iter().position(|m| label.contains(m)))
        .or_else(|| {
            let caps = english_abbreviation().captures(label)?;
            let abbr = caps.get(1)?.as_str().to_lowercase();
            ENGLISH_MONTHS.iter().position(|m| m[..3] == abbr[..3])
        });
    found.map(|i| i as u32)
}

/// Resolve one header cell. Never fails: an unrecognized month falls back to
/// the column position, a missing year to `fallback_year`.
pub fn resolve_month_column(column_index: usize, label: &str, fallback_year: i32) -> MonthColumn {
    let year = parse_year(label).unwrap_or(fallback_year);
    let month_index = parse_month(label)
        .unwrap_or_else(|| (column_index.saturating_sub(1) % 12) as u32);
    MonthColumn {
        column_index,
        raw_label: label.trim().to_string(),
        year,
        month_index,
    }
}

/// One `MonthColumn` per header column after the label column.
pub fn resolve_month_columns(grid: &RawGrid, fallback_year: i32) -> Vec<MonthColumn> {
    grid.header()
        .iter()
        .enumerate()
        .skip(1)
        .map(|(col, label)| resolve_month_column(col, label, fallback_year))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_name() {
        assert_eq!(month_name(0), "มกราคม");
        assert_eq!(month_name(11), "ธันวาคม");
    }

    #[test]
    fn test_two_digit_year() {
        assert_eq!(parse_year("ม.ค. 24"), Some(2024));
        assert_eq!(parse_year("Jan 99"), Some(2099));
    }

    #[test]
    fn test_four_digit_year() {
        assert_eq!(parse_year("มกราคม 2025"), Some(2025));
        assert_eq!(parse_year("Dec 2023  "), Some(2023));
    }

    #[test]
    fn test_no_year() {
        assert_eq!(parse_year("มกราคม"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn test_thai_full_names() {
        assert_eq!(parse_month("มกราคม 2024"), Some(0));
        assert_eq!(parse_month("มีนาคม"), Some(2));
        assert_eq!(parse_month("ธันวาคม 67"), Some(11));
    }

    #[test]
    fn test_thai_abbreviations() {
        let labels = [
            "ม.ค. 24", "ก.พ. 24", "มี.ค. 24", "เม.ย. 24", "พ.ค. 24", "มิ.ย. 24",
            "ก.ค. 24", "ส.ค. 24", "ก.ย. 24", "ต.ค. 24", "พ.ย. 24", "ธ.ค. 24",
        ];
        for (i, label) in labels.iter().enumerate() {
            assert_eq!(parse_month(label), Some(i as u32), "label {label}");
        }
    }

    #[test]
    fn test_english_names() {
        assert_eq!(parse_month("March 2024"), Some(2));
        assert_eq!(parse_month("Jun-24"), Some(5));
        assert_eq!(parse_month("SEP 24"), Some(8));
        assert_eq!(parse_month("Sept-23"), Some(8));
        assert_eq!(parse_month("oct24"), Some(9));
    }

    #[test]
    fn test_abbreviation_inside_word_is_ignored() {
        assert_eq!(parse_month("Summary"), None);
        assert_eq!(parse_month("Remarks"), None);
        assert_eq!(parse_month("Decimal"), None);
        let col = resolve_month_column(5, "Summary", 2024);
        assert_eq!(col.month_index, 4);
    }

    #[test]
    fn test_positional_fallback() {
        let col = resolve_month_column(3, "???", 2024);
        assert_eq!(col.month_index, 2);
        assert_eq!(col.year, 2024);
        let col = resolve_month_column(13, "Total", 2024);
        assert_eq!(col.month_index, 0);
    }

    #[test]
    fn test_resolution_is_total() {
        let grid = RawGrid::new(vec![vec![
            "".into(),
            "ม.ค. 24".into(),
            "garbage".into(),
            "".into(),
            "มีนาคม 2024".into(),
        ]]);
        let cols = resolve_month_columns(&grid, 2030);
        assert_eq!(cols.len(), 4);
        assert_eq!((cols[0].year, cols[0].month_index), (2024, 0));
        assert_eq!((cols[1].year, cols[1].month_index), (2030, 1));
        assert_eq!((cols[2].year, cols[2].month_index), (2030, 2));
        assert_eq!((cols[3].year, cols[3].month_index), (2024, 2));
        assert_eq!(cols[3].column_index, 4);
    }
}

use std::collections::HashSet;
use std::ops::Range;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{LedgerError, Result};
use crate::importer::{checked_sum, normalize_cell};
use crate::markers::{scan_markers, StructuralMarkers};
use crate::models::{CategoryType, DetailEntry, DiscoveredCategory, MonthColumn, MonthlyRecord, RawGrid};
use crate::months::resolve_month_columns;

/// Everything derived from one grid.
#[derive(Debug, Clone, Default)]
pub struct ParsedLedger {
    pub markers: StructuralMarkers,
    pub records: Vec<MonthlyRecord>,
    pub categories: Vec<DiscoveredCategory>,
    pub rejected: Vec<RejectedMonth>,
}

/// A month column whose amounts could not be turned into a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedMonth {
    pub year: i32,
    pub month_index: u32,
    pub reason: String,
}

impl RejectedMonth {
    /// "YYYY-MM" key used in sync failures.
    pub fn key(&self) -> String {
        format!("{}-{:02}", self.year, self.month_index + 1)
    }
}

impl ParsedLedger {
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.year).collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

/// Sparse category amounts for one month column. Blank labels and zero
/// amounts are skipped; the label doubles as the category id.
pub fn extract_details(grid: &RawGrid, rows: Range<usize>, column: &MonthColumn) -> Vec<DetailEntry> {
    let end = rows.end.min(grid.len());
    (rows.start..end)
        .filter_map(|row| {
            let label = grid.cell(row, 0).trim();
            if label.is_empty() {
                return None;
            }
            let amount = normalize_cell(grid.cell(row, column.column_index));
            if amount.is_zero() {
                return None;
            }
            Some(DetailEntry {
                category_id: label.to_string(),
                label: label.to_string(),
                amount,
            })
        })
        .collect()
}

/// Labels of every category row in the income and expense blocks, in sheet
/// order. A code seen twice keeps its first position.
pub fn discover_categories(grid: &RawGrid, markers: &StructuralMarkers) -> Vec<DiscoveredCategory> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (rows, category_type) in [
        (markers.income_rows(), CategoryType::Income),
        (markers.expense_rows(), CategoryType::Expense),
    ] {
        let end = rows.end.min(grid.len());
        let mut order = 0i64;
        for row in rows.start..end {
            let label = grid.cell(row, 0).trim();
            if label.is_empty() || !seen.insert(label.to_string()) {
                continue;
            }
            out.push(DiscoveredCategory {
                code: label.to_string(),
                name: label.to_string(),
                category_type,
                order,
            });
            order += 1;
        }
    }
    out
}

fn summary_cell(grid: &RawGrid, row: Option<usize>, col: usize) -> Option<Decimal> {
    let raw = grid.cell(row?, col);
    if raw.trim().is_empty() {
        None
    } else {
        Some(normalize_cell(raw))
    }
}

fn build_record(grid: &RawGrid, markers: &StructuralMarkers, column: &MonthColumn) -> Result<MonthlyRecord> {
    let col = column.column_index;
    let income_details = extract_details(grid, markers.income_rows(), column);
    let expense_details = extract_details(grid, markers.expense_rows(), column);

    // Summary rows are the source of truth; details only fill in when a
    // summary row is missing altogether.
    let income = match markers.total_income_row {
        Some(row) => normalize_cell(grid.cell(row, col)),
        None => checked_sum(income_details.iter().map(|d| d.amount), "income details")?,
    };
    let expenses = match markers.total_expense_row {
        Some(row) => normalize_cell(grid.cell(row, col)),
        None => checked_sum(expense_details.iter().map(|d| d.amount), "expense details")?,
    };
    let balance = match summary_cell(grid, markers.total_sum_row, col) {
        Some(balance) => balance,
        None => income
            .checked_sub(expenses)
            .ok_or_else(|| LedgerError::AmountOverflow("balance".into()))?,
    };

    let label = if column.raw_label.is_empty() {
        format!("เดือน {col}")
    } else {
        column.raw_label.clone()
    };

    Ok(MonthlyRecord {
        year: column.year,
        month_index: column.month_index,
        income,
        expenses,
        balance,
        income_details,
        expense_details,
        label,
    })
}

/// Parse a grid into monthly records and discovered categories.
/// `fallback_year` applies to header labels without a year suffix.
pub fn parse_ledger(grid: &RawGrid, fallback_year: i32) -> ParsedLedger {
    if grid.is_empty() {
        warn!("Source grid is empty");
        return ParsedLedger::default();
    }

    let markers = scan_markers(grid);
    if markers.income_header.is_none() && markers.expense_header.is_none() {
        warn!(?markers, "No income or expense section found; no category rows will be read");
    }

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut rejected = Vec::new();
    for column in resolve_month_columns(grid, fallback_year) {
        if !seen.insert((column.year, column.month_index)) {
            warn!(
                column = column.column_index,
                label = %column.raw_label,
                year = column.year,
                month = column.month_index + 1,
                "Column resolves to a month already read; skipping"
            );
            continue;
        }
        match build_record(grid, &markers, &column) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(
                    column = column.column_index,
                    year = column.year,
                    month = column.month_index + 1,
                    error = %e,
                    "Month column rejected"
                );
                rejected.push(RejectedMonth {
                    year: column.year,
                    month_index: column.month_index,
                    reason: e.to_string(),
                });
            }
        }
    }

    let categories = discover_categories(grid, &markers);
    debug!(
        records = records.len(),
        rejected = rejected.len(),
        categories = categories.len(),
        "Parsed ledger grid"
    );

    ParsedLedger {
        markers,
        records,
        categories,
        rejected,
    }
}

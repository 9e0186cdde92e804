use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// Cell grid as returned by a source fetch. Row 0 is the header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGrid {
    pub rows: Vec<Vec<String>>,
}

impl RawGrid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Build a grid from transport output, dropping leading blank rows so the
    /// header always lands on row 0.
    pub fn from_fetched(rows: Vec<Vec<String>>) -> Self {
        let first = rows
            .iter()
            .position(|r| r.iter().any(|c| !c.trim().is_empty()))
            .unwrap_or(rows.len());
        Self::new(rows.into_iter().skip(first).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cell text, or "" when the row is short or missing.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Income,
    Expense,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(LedgerError::Other(format!(
                "Invalid category type: {other} (must be 'income' or 'expense')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthColumn {
    pub column_index: usize,
    pub raw_label: String,
    pub year: i32,
    /// 0-based.
    pub month_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailEntry {
    pub category_id: String,
    pub label: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRecord {
    pub year: i32,
    pub month_index: u32,
    pub income: Decimal,
    pub expenses: Decimal,
    pub balance: Decimal,
    pub income_details: Vec<DetailEntry>,
    pub expense_details: Vec<DetailEntry>,
    pub label: String,
}

/// User-facing configuration for one raw category. `id` is the category code
/// (the raw label text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySetting {
    pub id: String,
    pub name: String,
    pub category_type: CategoryType,
    pub order: i64,
    pub visible: bool,
    pub aggregate_into: Option<String>,
    /// `None` applies to every year.
    pub year: Option<i32>,
}

impl CategorySetting {
    #[cfg(test)]
    pub fn new(id: &str, category_type: CategoryType) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            category_type,
            order: 0,
            visible: true,
            aggregate_into: None,
            year: None,
        }
    }
}

/// A raw category seen in the source grid during extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredCategory {
    pub code: String,
    pub name: String,
    pub category_type: CategoryType,
    pub order: i64,
}

/// The user-owned fields of a category. Sync never writes these.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPreferences {
    pub visible: bool,
    pub aggregate_into: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedLedgerEntry {
    pub id: i64,
    pub period_start: DateTime<Utc>,
    pub label: String,
    pub income: Decimal,
    pub expenses: Decimal,
    pub balance: Decimal,
    pub income_details: String,
    pub expense_details: String,
    pub created_at: String,
}

impl PersistedLedgerEntry {
    /// Rebuild the in-memory record from its stored form.
    pub fn to_record(&self) -> Result<MonthlyRecord> {
        Ok(MonthlyRecord {
            year: self.period_start.year(),
            month_index: self.period_start.month0(),
            income: self.income,
            expenses: self.expenses,
            balance: self.balance,
            income_details: serde_json::from_str(&self.income_details)?,
            expense_details: serde_json::from_str(&self.expense_details)?,
            label: self.label.clone(),
        })
    }

    /// True when the stored values match `data` on every synced field.
    pub fn matches(&self, data: &LedgerEntryData) -> bool {
        self.income == data.income
            && self.expenses == data.expenses
            && self.balance == data.balance
            && self.income_details == data.income_details
            && self.expense_details == data.expense_details
    }
}

/// Writable ledger entry fields, with detail lists already serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntryData {
    pub period_start: DateTime<Utc>,
    pub label: String,
    pub income: Decimal,
    pub expenses: Decimal,
    pub balance: Decimal,
    pub income_details: String,
    pub expense_details: String,
}

impl LedgerEntryData {
    pub fn from_record(record: &MonthlyRecord, period_start: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            period_start,
            label: record.label.clone(),
            income: record.income,
            expenses: record.expenses,
            balance: record.balance,
            income_details: serde_json::to_string(&record.income_details)?,
            expense_details: serde_json::to_string(&record.expense_details)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_out_of_range_is_blank() {
        let grid = RawGrid::new(vec![vec!["".into(), "Jan 24".into()], vec!["Income".into()]]);
        assert_eq!(grid.cell(0, 1), "Jan 24");
        assert_eq!(grid.cell(1, 1), "");
        assert_eq!(grid.cell(9, 0), "");
    }

    #[test]
    fn test_from_fetched_drops_leading_blank_rows() {
        let grid = RawGrid::from_fetched(vec![
            vec![],
            vec!["  ".into(), "".into()],
            vec!["".into(), "Jan 24".into()],
            vec![],
            vec!["Income".into()],
        ]);
        assert_eq!(grid.len(), 3);
        assert_eq!(grid.header()[1], "Jan 24");
    }

    #[test]
    fn test_category_type_parse() {
        assert_eq!("Income".parse::<CategoryType>().unwrap(), CategoryType::Income);
        assert_eq!(" expense ".parse::<CategoryType>().unwrap(), CategoryType::Expense);
        assert!("transfer".parse::<CategoryType>().is_err());
    }

    #[test]
    fn test_detail_entry_serializes_camel_case() {
        let entry = DetailEntry {
            category_id: "Tithes".into(),
            label: "Tithes".into(),
            amount: Decimal::from(10000),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"categoryId":"Tithes","label":"Tithes","amount":"10000"}"#);
    }
}

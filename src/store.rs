use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{
    CategoryPreferences, CategorySetting, CategoryType, DiscoveredCategory, LedgerEntryData,
    PersistedLedgerEntry,
};

/// Persistence used by the sync engine and the settings surface.
pub trait LedgerStore {
    /// Entries whose period falls in `[start, end)`, oldest first.
    fn find_ledger_entries_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PersistedLedgerEntry>>;
    fn create_ledger_entry(&self, data: &LedgerEntryData) -> Result<i64>;
    fn update_ledger_entry(&self, id: i64, data: &LedgerEntryData) -> Result<()>;
    fn delete_ledger_entries(&self, ids: &[i64]) -> Result<usize>;

    fn find_category_by_code(&self, code: &str) -> Result<Option<CategorySetting>>;
    fn create_category(&self, category: &DiscoveredCategory) -> Result<()>;
    /// Sync-owned fields only: name, type, order.
    fn update_category(&self, category: &DiscoveredCategory) -> Result<()>;

    /// Entries ordered by period, for reporting.
    fn ledger_entries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PersistedLedgerEntry>>;
    /// Every category with its global settings, followed per category by
    /// one row for each year that overrides them.
    fn list_categories(&self) -> Result<Vec<CategorySetting>>;
    /// Settings stored for exactly this scope; `None` year is global.
    fn category_preferences(&self, code: &str, year: Option<i32>) -> Result<Option<CategoryPreferences>>;
    /// Upsert the settings for `prefs.year`. Returns false when the code is
    /// unknown.
    fn set_category_preferences(&self, code: &str, prefs: &CategoryPreferences) -> Result<bool>;
    /// Drop every setting stored for the scope. Returns the rows removed.
    fn reset_category_preferences(&self, year: Option<i32>) -> Result<usize>;
}

/// Period timestamps are stored as fixed-width UTC text so string order is
/// time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn category_type_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<CategoryType> {
    let raw: String = row.get(idx)?;
    CategoryType::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

const ENTRY_COLUMNS: &str =
    "id, period_start, label, income, expenses, balance, income_details, expense_details, created_at";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedLedgerEntry> {
    let period: String = row.get(1)?;
    Ok(PersistedLedgerEntry {
        id: row.get(0)?,
        period_start: parse_timestamp(&period, 1)?,
        label: row.get(2)?,
        income: decimal_at(row, 3)?,
        expenses: decimal_at(row, 4)?,
        balance: decimal_at(row, 5)?,
        income_details: row.get(6)?,
        expense_details: row.get(7)?,
        created_at: row.get(8)?,
    })
}

// Global view of a category: its base row plus the NULL-year preferences.
const GLOBAL_CATEGORY_SELECT: &str = "\
    SELECT c.code, c.name, c.category_type, c.sort_order, \
           COALESCE(p.visible, 1) AS visible, p.aggregate_into, NULL AS year \
    FROM categories c \
    LEFT JOIN category_preferences p ON p.code = c.code AND p.year IS NULL";

const YEAR_CATEGORY_SELECT: &str = "\
    SELECT c.code, c.name, c.category_type, c.sort_order, \
           p.visible, p.aggregate_into, p.year \
    FROM categories c \
    JOIN category_preferences p ON p.code = c.code AND p.year IS NOT NULL";

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<CategorySetting> {
    Ok(CategorySetting {
        id: row.get(0)?,
        name: row.get(1)?,
        category_type: category_type_at(row, 2)?,
        order: row.get(3)?,
        visible: row.get(4)?,
        aggregate_into: row.get(5)?,
        year: row.get(6)?,
    })
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn query_entries(
        &self,
        order: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PersistedLedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
             WHERE period_start >= ?1 AND period_start < ?2 ORDER BY {order}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params![format_timestamp(start), format_timestamp(end)],
                entry_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl LedgerStore for SqliteStore<'_> {
    fn find_ledger_entries_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PersistedLedgerEntry>> {
        self.query_entries("created_at ASC, id ASC", start, end)
    }

    fn create_ledger_entry(&self, data: &LedgerEntryData) -> Result<i64> {
        let now = now_stamp();
        self.conn.execute(
            "INSERT INTO ledger_entries (period_start, label, income, expenses, balance, \
             income_details, expense_details, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            rusqlite::params![
                format_timestamp(data.period_start),
                data.label,
                data.income.to_string(),
                data.expenses.to_string(),
                data.balance.to_string(),
                data.income_details,
                data.expense_details,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_ledger_entry(&self, id: i64, data: &LedgerEntryData) -> Result<()> {
        self.conn.execute(
            "UPDATE ledger_entries SET label = ?1, income = ?2, expenses = ?3, balance = ?4, \
             income_details = ?5, expense_details = ?6, updated_at = ?7, period_start = ?9 WHERE id = ?8",
            rusqlite::params![
                data.label,
                data.income.to_string(),
                data.expenses.to_string(),
                data.balance.to_string(),
                data.income_details,
                data.expense_details,
                now_stamp(),
                id,
                format_timestamp(data.period_start),
            ],
        )?;
        Ok(())
    }

    fn delete_ledger_entries(&self, ids: &[i64]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached("DELETE FROM ledger_entries WHERE id = ?1")?;
        let mut deleted = 0usize;
        for id in ids {
            deleted += stmt.execute([id])?;
        }
        Ok(deleted)
    }

    fn find_category_by_code(&self, code: &str) -> Result<Option<CategorySetting>> {
        let sql = format!("{GLOBAL_CATEGORY_SELECT} WHERE c.code = ?1");
        let found = self
            .conn
            .query_row(&sql, [code], category_from_row)
            .optional()?;
        Ok(found)
    }

    fn create_category(&self, category: &DiscoveredCategory) -> Result<()> {
        self.conn.execute(
            "INSERT INTO categories (code, name, category_type, sort_order, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                category.code,
                category.name,
                category.category_type.as_str(),
                category.order,
                now_stamp(),
            ],
        )?;
        Ok(())
    }

    fn update_category(&self, category: &DiscoveredCategory) -> Result<()> {
        self.conn.execute(
            "UPDATE categories SET name = ?1, category_type = ?2, sort_order = ?3, updated_at = ?4 \
             WHERE code = ?5",
            rusqlite::params![
                category.name,
                category.category_type.as_str(),
                category.order,
                now_stamp(),
                category.code,
            ],
        )?;
        Ok(())
    }

    fn ledger_entries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PersistedLedgerEntry>> {
        self.query_entries("period_start ASC, id ASC", start, end)
    }

    fn list_categories(&self) -> Result<Vec<CategorySetting>> {
        let sql = format!(
            "SELECT * FROM ({GLOBAL_CATEGORY_SELECT} UNION ALL {YEAR_CATEGORY_SELECT}) \
             ORDER BY CASE category_type WHEN 'income' THEN 0 ELSE 1 END, sort_order ASC, code ASC, \
             year IS NOT NULL, year ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], category_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn category_preferences(&self, code: &str, year: Option<i32>) -> Result<Option<CategoryPreferences>> {
        let found = self
            .conn
            .query_row(
                "SELECT visible, aggregate_into, year FROM category_preferences \
                 WHERE code = ?1 AND year IS ?2",
                rusqlite::params![code, year],
                |row| {
                    Ok(CategoryPreferences {
                        visible: row.get(0)?,
                        aggregate_into: row.get(1)?,
                        year: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    fn set_category_preferences(&self, code: &str, prefs: &CategoryPreferences) -> Result<bool> {
        let known: Option<i64> = self
            .conn
            .query_row("SELECT id FROM categories WHERE code = ?1", [code], |r| r.get(0))
            .optional()?;
        if known.is_none() {
            return Ok(false);
        }
        let now = now_stamp();
        let changed = self.conn.execute(
            "UPDATE category_preferences SET visible = ?1, aggregate_into = ?2, updated_at = ?3 \
             WHERE code = ?4 AND year IS ?5",
            rusqlite::params![prefs.visible, prefs.aggregate_into, now, code, prefs.year],
        )?;
        if changed == 0 {
            self.conn.execute(
                "INSERT INTO category_preferences (code, year, visible, aggregate_into, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![code, prefs.year, prefs.visible, prefs.aggregate_into, now],
            )?;
        }
        Ok(true)
    }

    fn reset_category_preferences(&self, year: Option<i32>) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM category_preferences WHERE year IS ?1", [year])?;
        Ok(removed)
    }
}

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::OverviewCache;
use crate::error::{LedgerError, Result};
use crate::models::{DiscoveredCategory, LedgerEntryData, MonthlyRecord};
use crate::parser::ParsedLedger;
use crate::reports::load_overview;
use crate::store::LedgerStore;

// ---------------------------------------------------------------------------
// Canonical windows
// ---------------------------------------------------------------------------

fn first_of_month(year: i32, month: u32) -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| LedgerError::Other(format!("Invalid month: {year}-{month:02}")))
}

/// `[first of month 00:00Z, first of next month 00:00Z)` for a 0-based month.
pub fn month_window(year: i32, month_index: u32) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = first_of_month(year, month_index + 1)?;
    let end = if month_index >= 11 {
        first_of_month(year + 1, 1)?
    } else {
        first_of_month(year, month_index + 2)?
    };
    Ok((start, end))
}

pub fn year_window(year: i32) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    Ok((first_of_month(year, 1)?, first_of_month(year + 1, 1)?))
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    pub scope: &'static str,
    pub key: String,
    pub error: String,
}

/// What a caller of the sync sees. Partial failures are listed rather than
/// raised.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub success: bool,
    pub records: RecordCounts,
    pub categories: CategoryCounts,
    pub duplicates_removed: usize,
    pub failures: Vec<SyncFailure>,
    pub timestamp: DateTime<Utc>,
}

impl SyncSummary {
    fn wrote_anything(&self) -> bool {
        self.records.created + self.records.updated + self.duplicates_removed > 0
            || self.categories.created + self.categories.updated > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Skipped,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Reconciles parsed records and categories against a store. Assumes it is
/// the only writer while it runs.
pub struct SyncEngine<'a, S: LedgerStore> {
    store: &'a S,
    cache: Option<&'a OverviewCache>,
}

impl<'a, S: LedgerStore> SyncEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store, cache: None }
    }

    pub fn with_cache(mut self, cache: &'a OverviewCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn run(&self, parsed: &ParsedLedger) -> SyncSummary {
        let mut summary = SyncSummary {
            records: RecordCounts {
                total: parsed.records.len() + parsed.rejected.len(),
                failed: parsed.rejected.len(),
                ..RecordCounts::default()
            },
            ..SyncSummary::default()
        };
        info!(records = parsed.records.len(), categories = parsed.categories.len(), "Starting ledger sync");

        for rejected in &parsed.rejected {
            summary.failures.push(SyncFailure {
                scope: "record",
                key: rejected.key(),
                error: rejected.reason.clone(),
            });
        }

        for record in &parsed.records {
            let key = format!("{}-{:02}", record.year, record.month_index + 1);
            match self.reconcile_month(record, &mut summary) {
                Ok(Outcome::Created) => summary.records.created += 1,
                Ok(Outcome::Updated) => summary.records.updated += 1,
                Ok(Outcome::Skipped) => summary.records.skipped += 1,
                Err(e) => {
                    warn!(month = %key, error = %e, "Ledger entry sync failed");
                    summary.records.failed += 1;
                    summary.failures.push(SyncFailure {
                        scope: "record",
                        key,
                        error: e.to_string(),
                    });
                }
            }
        }

        for category in &parsed.categories {
            match self.reconcile_category(category) {
                Ok(Outcome::Created) => summary.categories.created += 1,
                Ok(Outcome::Updated) => summary.categories.updated += 1,
                Ok(Outcome::Skipped) => summary.categories.skipped += 1,
                Err(e) => {
                    warn!(code = %category.code, error = %e, "Category sync failed");
                    summary.categories.failed += 1;
                    summary.failures.push(SyncFailure {
                        scope: "category",
                        key: category.code.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Some(cache) = self.cache {
            self.refresh_cache(cache, parsed, summary.wrote_anything());
        }

        summary.success = summary.failures.is_empty();
        summary.timestamp = Utc::now();
        info!(
            created = summary.records.created,
            updated = summary.records.updated,
            skipped = summary.records.skipped,
            failed = summary.records.failed,
            duplicates_removed = summary.duplicates_removed,
            categories_created = summary.categories.created,
            categories_updated = summary.categories.updated,
            "Ledger sync completed"
        );
        summary
    }

    /// One month is a self-contained unit: dedupe, then update, skip or create.
    fn reconcile_month(&self, record: &MonthlyRecord, summary: &mut SyncSummary) -> Result<Outcome> {
        let (start, end) = month_window(record.year, record.month_index)?;
        let data = LedgerEntryData::from_record(record, start)?;

        let mut existing = self.store.find_ledger_entries_in_window(start, end)?;
        if existing.len() > 1 {
            let extra: Vec<i64> = existing.drain(1..).map(|e| e.id).collect();
            let removed = self.store.delete_ledger_entries(&extra)?;
            summary.duplicates_removed += removed;
            info!(period = %start, kept = existing[0].id, removed, "Removed duplicate ledger entries");
        }

        match existing.first() {
            Some(canonical) if canonical.matches(&data) => Ok(Outcome::Skipped),
            Some(canonical) => {
                self.store.update_ledger_entry(canonical.id, &data)?;
                debug!(period = %start, income = %data.income, expenses = %data.expenses, balance = %data.balance, "Ledger entry updated");
                Ok(Outcome::Updated)
            }
            None => {
                self.store.create_ledger_entry(&data)?;
                debug!(period = %start, income = %data.income, expenses = %data.expenses, balance = %data.balance, "Ledger entry created");
                Ok(Outcome::Created)
            }
        }
    }

    /// Name, type and order follow the sheet. Visibility and redirection
    /// belong to the user and are left alone.
    fn reconcile_category(&self, category: &DiscoveredCategory) -> Result<Outcome> {
        match self.store.find_category_by_code(&category.code)? {
            None => {
                self.store.create_category(category)?;
                debug!(code = %category.code, "Category created");
                Ok(Outcome::Created)
            }
            Some(stored)
                if stored.name != category.name
                    || stored.category_type != category.category_type
                    || stored.order != category.order =>
            {
                self.store.update_category(category)?;
                debug!(code = %category.code, "Category updated");
                Ok(Outcome::Updated)
            }
            Some(_) => Ok(Outcome::Skipped),
        }
    }

    fn refresh_cache(&self, cache: &OverviewCache, parsed: &ParsedLedger, changed: bool) {
        if changed {
            cache.invalidate();
        }
        for year in parsed.years() {
            match load_overview(self.store, year) {
                Ok(overview) => cache.put(year, overview),
                Err(e) => warn!(year, error = %e, "Could not rebuild overview"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::models::{CategoryPreferences, CategorySetting, PersistedLedgerEntry, RawGrid};
    use crate::parser::parse_ledger;
    use crate::store::{format_timestamp, SqliteStore};
    use rusqlite::Connection;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn sync_grid<S: LedgerStore>(
        store: &S,
        cache: Option<&OverviewCache>,
        grid: &RawGrid,
        fallback_year: i32,
    ) -> SyncSummary {
        let parsed = parse_ledger(grid, fallback_year);
        let engine = SyncEngine::new(store);
        match cache {
            Some(cache) => engine.with_cache(cache).run(&parsed),
            None => engine.run(&parsed),
        }
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn january_grid() -> RawGrid {
        RawGrid::new(vec![
            row(&["", "ม.ค. 24"]),
            row(&["Income"]),
            row(&["Tithes", "10,000"]),
            row(&["Expense"]),
            row(&["Rent", "4,000"]),
            row(&["Total Income", "10000"]),
            row(&["Total Expense", "4000"]),
        ])
    }

    fn quarter_grid() -> RawGrid {
        RawGrid::new(vec![
            row(&["", "ม.ค. 24", "ก.พ. 24", "มี.ค. 24"]),
            row(&["Income"]),
            row(&["Tithes", "100", "200", "300"]),
            row(&["Expense"]),
            row(&["Rent", "50", "50", "50"]),
            row(&["Total Income", "100", "200", "300"]),
            row(&["Total Expense", "50", "50", "50"]),
        ])
    }

    fn all_entries(store: &SqliteStore<'_>) -> Vec<PersistedLedgerEntry> {
        let (start, end) = (first_of_month(2000, 1).unwrap(), first_of_month(2100, 1).unwrap());
        store.ledger_entries_between(start, end).unwrap()
    }

    fn insert_raw(conn: &Connection, period: &str, income: &str, created_at: &str) -> i64 {
        conn.execute(
            "INSERT INTO ledger_entries (period_start, label, income, expenses, balance, created_at, updated_at) \
             VALUES (?1, 'legacy', ?2, '0', ?2, ?3, ?3)",
            rusqlite::params![period, income, created_at],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn test_month_window() {
        let (start, end) = month_window(2024, 0).unwrap();
        assert_eq!(format_timestamp(start), "2024-01-01T00:00:00Z");
        assert_eq!(format_timestamp(end), "2024-02-01T00:00:00Z");
        let (start, end) = month_window(2024, 11).unwrap();
        assert_eq!(format_timestamp(start), "2024-12-01T00:00:00Z");
        assert_eq!(format_timestamp(end), "2025-01-01T00:00:00Z");
        assert!(month_window(2024, 12).is_err());
    }

    #[test]
    fn test_first_sync_creates_records_and_categories() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        let summary = sync_grid(&store, None, &january_grid(), 2030);
        assert!(summary.success);
        assert_eq!(summary.records, RecordCounts { created: 1, updated: 0, skipped: 0, failed: 0, total: 1 });
        assert_eq!(summary.categories.created, 2);

        let entries = all_entries(&store);
        assert_eq!(entries.len(), 1);
        assert_eq!(format_timestamp(entries[0].period_start), "2024-01-01T00:00:00Z");
        let rec = entries[0].to_record().unwrap();
        assert_eq!(rec.income, Decimal::from(10000));
        assert_eq!(rec.expenses, Decimal::from(4000));
        assert_eq!(rec.balance, Decimal::from(6000));
        assert_eq!(rec.income_details[0].label, "Tithes");
        assert_eq!(rec.expense_details[0].label, "Rent");
    }

    #[test]
    fn test_second_sync_is_idempotent() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        sync_grid(&store, None, &quarter_grid(), 2030);
        let second = sync_grid(&store, None, &quarter_grid(), 2030);
        assert_eq!(second.records, RecordCounts { created: 0, updated: 0, skipped: 3, failed: 0, total: 3 });
        assert_eq!(second.categories, CategoryCounts { created: 0, updated: 0, skipped: 2, failed: 0 });
        assert_eq!(all_entries(&store).len(), 3);
    }

    #[test]
    fn test_changed_cell_updates_only_that_month() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        sync_grid(&store, None, &quarter_grid(), 2030);
        let mut grid = quarter_grid();
        grid.rows[2][2] = "250".into();
        grid.rows[5][2] = "250".into();
        let summary = sync_grid(&store, None, &grid, 2030);
        assert_eq!(summary.records.updated, 1);
        assert_eq!(summary.records.skipped, 2);
        let feb = all_entries(&store)[1].to_record().unwrap();
        assert_eq!(feb.income, Decimal::from(250));
        assert_eq!(feb.income_details[0].amount, Decimal::from(250));
    }

    #[test]
    fn test_detail_only_change_is_detected() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        sync_grid(&store, None, &january_grid(), 2030);
        let mut grid = january_grid();
        grid.rows.insert(3, row(&["Offering", "0"]));
        assert_eq!(sync_grid(&store, None, &grid, 2030).records.skipped, 1);
        grid.rows[3][1] = "1".into();
        assert_eq!(sync_grid(&store, None, &grid, 2030).records.updated, 1);
    }

    #[test]
    fn test_duplicates_are_collapsed_to_earliest() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        let later = insert_raw(&conn, "2024-01-01T00:00:00Z", "1", "2024-03-01T00:00:00.000000Z");
        let earliest = insert_raw(&conn, "2024-01-01T07:00:00Z", "2", "2024-02-01T00:00:00.000000Z");
        let summary = sync_grid(&store, None, &january_grid(), 2030);
        assert_eq!(summary.duplicates_removed, 1);
        assert_eq!(summary.records.updated, 1);

        let entries = all_entries(&store);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, earliest);
        assert_ne!(entries[0].id, later);
        assert_eq!(entries[0].income, Decimal::from(10000));
        assert_eq!(format_timestamp(entries[0].period_start), "2024-01-01T00:00:00Z");

        let again = sync_grid(&store, None, &january_grid(), 2030);
        assert_eq!(again.duplicates_removed, 0);
        assert_eq!(again.records.skipped, 1);
    }

    #[test]
    fn test_other_months_untouched() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        insert_raw(&conn, "2023-06-01T00:00:00Z", "77", "2023-06-02T00:00:00.000000Z");
        sync_grid(&store, None, &january_grid(), 2030);
        let entries = all_entries(&store);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].income, Decimal::from(77));
    }

    #[test]
    fn test_category_user_fields_survive_resync() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        sync_grid(&store, None, &january_grid(), 2030);
        let prefs = CategoryPreferences {
            visible: false,
            aggregate_into: Some("Giving".into()),
            year: None,
        };
        store.set_category_preferences("Tithes", &prefs).unwrap();

        let mut grid = january_grid();
        grid.rows.insert(2, row(&["Building Fund", "5"]));
        let summary = sync_grid(&store, None, &grid, 2030);
        assert_eq!(summary.categories.created, 1);
        // Tithes moved from position 0 to 1.
        assert_eq!(summary.categories.updated, 1);

        let tithes = store.find_category_by_code("Tithes").unwrap().unwrap();
        assert_eq!(tithes.order, 1);
        assert!(!tithes.visible);
        assert_eq!(tithes.aggregate_into.as_deref(), Some("Giving"));
    }

    #[test]
    fn test_cache_is_refreshed_with_settings_applied() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        let cache = OverviewCache::new(Duration::from_secs(300));
        sync_grid(&store, Some(&cache), &january_grid(), 2030);
        store
            .set_category_preferences(
                "Tithes",
                &CategoryPreferences { visible: true, aggregate_into: Some("Giving".into()), year: None },
            )
            .unwrap();
        let mut grid = january_grid();
        grid.rows[2][1] = "10,001".into();
        sync_grid(&store, Some(&cache), &grid, 2030);

        let overview = cache.get(2024).unwrap();
        assert_eq!(overview.income[0].category, "Giving");
        assert_eq!(overview.income[0].amount, Decimal::from(10001));
    }

    // Wraps a real store and fails writes for one period.
    struct FlakyStore<'c> {
        inner: SqliteStore<'c>,
        fail_period: String,
    }

    impl LedgerStore for FlakyStore<'_> {
        fn find_ledger_entries_in_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<PersistedLedgerEntry>> {
            self.inner.find_ledger_entries_in_window(start, end)
        }
        fn create_ledger_entry(&self, data: &LedgerEntryData) -> Result<i64> {
            if format_timestamp(data.period_start) == self.fail_period {
                return Err(LedgerError::Other("disk full".into()));
            }
            self.inner.create_ledger_entry(data)
        }
        fn update_ledger_entry(&self, id: i64, data: &LedgerEntryData) -> Result<()> {
            self.inner.update_ledger_entry(id, data)
        }
        fn delete_ledger_entries(&self, ids: &[i64]) -> Result<usize> {
            self.inner.delete_ledger_entries(ids)
        }
        fn find_category_by_code(&self, code: &str) -> Result<Option<CategorySetting>> {
            self.inner.find_category_by_code(code)
        }
        fn create_category(&self, category: &DiscoveredCategory) -> Result<()> {
            self.inner.create_category(category)
        }
        fn update_category(&self, category: &DiscoveredCategory) -> Result<()> {
            self.inner.update_category(category)
        }
        fn ledger_entries_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<PersistedLedgerEntry>> {
            self.inner.ledger_entries_between(start, end)
        }
        fn list_categories(&self) -> Result<Vec<CategorySetting>> {
            self.inner.list_categories()
        }
        fn category_preferences(&self, code: &str, year: Option<i32>) -> Result<Option<CategoryPreferences>> {
            self.inner.category_preferences(code, year)
        }
        fn set_category_preferences(&self, code: &str, prefs: &CategoryPreferences) -> Result<bool> {
            self.inner.set_category_preferences(code, prefs)
        }
        fn reset_category_preferences(&self, year: Option<i32>) -> Result<usize> {
            self.inner.reset_category_preferences(year)
        }
    }

    #[test]
    fn test_failed_month_does_not_abort_run() {
        let (_dir, conn) = test_db();
        let store = FlakyStore {
            inner: SqliteStore::new(&conn),
            fail_period: "2024-02-01T00:00:00Z".into(),
        };
        let summary = sync_grid(&store, None, &quarter_grid(), 2030);
        assert!(!summary.success);
        assert_eq!(summary.records.created, 2);
        assert_eq!(summary.records.failed, 1);
        assert_eq!(summary.records.skipped, 0);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].key, "2024-02");
        assert_eq!(all_entries(&store.inner).len(), 2);
    }

    #[test]
    fn test_out_of_range_month_counts_as_failed() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        let max = "79228162514264337593543950335";
        let grid = RawGrid::new(vec![
            row(&["", "ม.ค. 24", "ก.พ. 24"]),
            row(&["Income"]),
            row(&["Tithes", max, "100"]),
            row(&["Offering", max, "1"]),
            row(&["Expense"]),
        ]);
        let summary = sync_grid(&store, None, &grid, 2030);
        assert!(!summary.success);
        assert_eq!(summary.records, RecordCounts { created: 1, updated: 0, skipped: 0, failed: 1, total: 2 });
        assert_eq!(summary.failures[0].scope, "record");
        assert_eq!(summary.failures[0].key, "2024-01");
        assert_eq!(all_entries(&store).len(), 1);
    }

    #[test]
    fn test_summary_json_shape() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        let summary = sync_grid(&store, None, &january_grid(), 2030);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["records"]["created"], 1);
        assert_eq!(json["records"]["total"], 1);
        assert_eq!(json["categories"]["created"], 2);
        assert_eq!(json["duplicatesRemoved"], 0);
        assert!(json["timestamp"].is_string());
    }
}

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::sync::SyncSummary;

pub const DB_FILE: &str = "churchbooks.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY,
    period_start TEXT NOT NULL,
    label TEXT NOT NULL DEFAULT '',
    income TEXT NOT NULL,
    expenses TEXT NOT NULL,
    balance TEXT NOT NULL,
    income_details TEXT NOT NULL DEFAULT '[]',
    expense_details TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_entries_period ON ledger_entries(period_start);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    category_type TEXT NOT NULL,
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT
);

-- User-owned display settings. A NULL year is the global setting.
CREATE TABLE IF NOT EXISTS category_preferences (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL REFERENCES categories(code) ON DELETE CASCADE,
    year INTEGER,
    visible INTEGER NOT NULL DEFAULT 1,
    aggregate_into TEXT,
    updated_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_category_preferences_scope
    ON category_preferences(code, COALESCE(year, 0));

CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY,
    source TEXT NOT NULL,
    checksum TEXT,
    records_created INTEGER NOT NULL DEFAULT 0,
    records_updated INTEGER NOT NULL DEFAULT 0,
    records_skipped INTEGER NOT NULL DEFAULT 0,
    records_failed INTEGER NOT NULL DEFAULT 0,
    categories_created INTEGER NOT NULL DEFAULT 0,
    categories_updated INTEGER NOT NULL DEFAULT 0,
    duplicates_removed INTEGER NOT NULL DEFAULT 0,
    finished_at TEXT NOT NULL
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Sync run audit trail
// ---------------------------------------------------------------------------

pub struct SyncRunRow {
    pub source: String,
    pub checksum: Option<String>,
    pub records_created: i64,
    pub records_updated: i64,
    pub records_skipped: i64,
    pub records_failed: i64,
    pub finished_at: String,
}

pub fn record_sync_run(conn: &Connection, source: &str, checksum: &str, summary: &SyncSummary) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_runs (source, checksum, records_created, records_updated, records_skipped, \
         records_failed, categories_created, categories_updated, duplicates_removed, finished_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            source,
            checksum,
            summary.records.created as i64,
            summary.records.updated as i64,
            summary.records.skipped as i64,
            summary.records.failed as i64,
            summary.categories.created as i64,
            summary.categories.updated as i64,
            summary.duplicates_removed as i64,
            summary.timestamp.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn last_sync_run(conn: &Connection) -> Result<Option<SyncRunRow>> {
    let row = conn
        .query_row(
            "SELECT source, checksum, records_created, records_updated, records_skipped, records_failed, finished_at \
             FROM sync_runs ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                Ok(SyncRunRow {
                    source: row.get(0)?,
                    checksum: row.get(1)?,
                    records_created: row.get(2)?,
                    records_updated: row.get(3)?,
                    records_skipped: row.get(4)?,
                    records_failed: row.get(5)?,
                    finished_at: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

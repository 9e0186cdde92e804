pub mod backup;
pub mod categories;
pub mod init;
pub mod overview;
pub mod records;
pub mod status;
pub mod sync;

use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::{get_connection, init_db, DB_FILE};
use crate::error::Result;
use crate::settings::get_data_dir;

/// Open the configured database, creating the schema if it is missing.
pub(crate) fn open_db() -> Result<Connection> {
    let data_dir = get_data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let conn = get_connection(&data_dir.join(DB_FILE))?;
    init_db(&conn)?;
    Ok(conn)
}

pub(crate) fn current_year() -> i32 {
    Utc::now().year()
}

#[derive(Parser)]
#[command(
    name = "churchbooks",
    about = "Sync a church's monthly ledger sheet into a local database and report on it."
)]
pub struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for churchbooks data (default: ~/Documents/churchbooks)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Fetch the ledger grid and reconcile it into the database.
    Sync {
        /// CSV/XLSX path or Google Sheets spreadsheet id (default: from settings)
        #[arg(long)]
        source: Option<String>,
        /// Source kind: csv, xlsx, sheets (default: detect)
        #[arg(long)]
        kind: Option<String>,
        /// A1 range, e.g. 'Monthly!AF:AR' (default: from settings)
        #[arg(long)]
        range: Option<String>,
        /// Print the sync summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Yearly and monthly totals by category.
    Overview {
        /// Calendar year (default: current year)
        #[arg(long)]
        year: Option<i32>,
        /// Print the overview as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored monthly ledger entries.
    Records {
        /// Only entries for this year
        #[arg(long)]
        year: Option<i32>,
    },
    /// Manage category visibility and aggregation.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Back up the database.
    Backup {
        /// Output path (default: <data_dir>/backups/churchbooks-YYYYMMDD-HHMMSS.db)
        #[arg(long)]
        output: Option<String>,
    },
    /// Show current settings, database and last sync run.
    Status,
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// List all categories with their settings.
    List,
    /// Change one category's visibility or aggregation target.
    Set {
        /// Category code (the row label in the sheet)
        code: String,
        /// Show or hide the category in reports
        #[arg(long)]
        visible: Option<bool>,
        /// Report this category under another name
        #[arg(long = "aggregate-into", conflicts_with = "clear_aggregate")]
        aggregate_into: Option<String>,
        /// Stop aggregating this category into another
        #[arg(long = "clear-aggregate")]
        clear_aggregate: bool,
        /// Apply only to this year (default: every year)
        #[arg(long)]
        year: Option<i32>,
    },
    /// Write category settings as JSON.
    Export {
        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<String>,
        /// Settings in effect for this year (default: global settings)
        #[arg(long)]
        year: Option<i32>,
    },
    /// Apply category settings from a JSON file.
    Import {
        /// JSON file produced by `categories export`
        file: String,
        /// Store the settings for this year only (default: every year)
        #[arg(long)]
        year: Option<i32>,
    },
    /// Delete stored category settings for one scope.
    Reset {
        /// Year whose settings are removed (default: the global settings)
        #[arg(long)]
        year: Option<i32>,
    },
}

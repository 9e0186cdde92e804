use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cache::OverviewCache;
use crate::cli::{current_year, open_db};
use crate::db::record_sync_run;
use crate::error::{LedgerError, Result};
use crate::fmt::money;
use crate::importer::{fetch_grid, grid_checksum};
use crate::parser::parse_ledger;
use crate::settings::load_settings;
use crate::store::SqliteStore;
use crate::sync::{SyncEngine, SyncSummary};

pub fn run(source: Option<&str>, kind: Option<&str>, range: Option<&str>, json: bool) -> Result<()> {
    let settings = load_settings();
    let spec = settings.source_spec(source, kind, range)?;
    let grid = fetch_grid(&spec)?;
    let checksum = grid_checksum(&grid);

    let conn = open_db()?;
    let store = SqliteStore::new(&conn);
    let cache = OverviewCache::new(settings.cache_ttl());
    let parsed = parse_ledger(&grid, current_year());
    if parsed.markers.is_empty() {
        eprintln!("Warning: no section rows (Income, Expense, Total ...) found in the grid. Check the range.");
    }
    let summary = SyncEngine::new(&store).with_cache(&cache).run(&parsed);
    record_sync_run(&conn, &spec.location, &checksum, &summary)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
        for year in parsed.years() {
            if let Some(overview) = cache.get(year) {
                println!(
                    "{year}: income {}, expenses {}, balance {}",
                    money(overview.totals.income),
                    money(overview.totals.expenses),
                    money(overview.totals.balance)
                );
            }
        }
    }

    if !summary.success {
        return Err(LedgerError::Other(format!(
            "{} item(s) failed to sync",
            summary.failures.len()
        )));
    }
    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    let mut table = Table::new();
    table.set_header(vec!["", "Created", "Updated", "Skipped", "Failed"]);
    table.add_row(vec![
        Cell::new("Months"),
        Cell::new(summary.records.created),
        Cell::new(summary.records.updated),
        Cell::new(summary.records.skipped),
        Cell::new(summary.records.failed),
    ]);
    table.add_row(vec![
        Cell::new("Categories"),
        Cell::new(summary.categories.created),
        Cell::new(summary.categories.updated),
        Cell::new(summary.categories.skipped),
        Cell::new(summary.categories.failed),
    ]);
    println!("Sync summary\n{table}");

    if summary.duplicates_removed > 0 {
        println!("{} duplicate entries removed", summary.duplicates_removed);
    }
    for failure in &summary.failures {
        println!("{} {} {}: {}", "FAILED".red().bold(), failure.scope, failure.key, failure.error);
    }
    if summary.success {
        println!("{}", "Sync completed".green());
    }
}

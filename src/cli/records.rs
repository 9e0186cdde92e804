use comfy_table::{Cell, Table};

use crate::cli::open_db;
use crate::error::Result;
use crate::fmt::money;
use crate::store::{format_timestamp, LedgerStore, SqliteStore};
use crate::sync::year_window;

pub fn run(year: Option<i32>) -> Result<()> {
    let conn = open_db()?;
    let store = SqliteStore::new(&conn);
    let (start, end) = match year {
        Some(y) => year_window(y)?,
        None => (year_window(1900)?.0, year_window(9998)?.1),
    };
    let entries = store.ledger_entries_between(start, end)?;
    if entries.is_empty() {
        println!("No ledger entries found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Period", "Label", "Income", "Expenses", "Balance", "Categories"]);
    for entry in &entries {
        let record = entry.to_record()?;
        table.add_row(vec![
            Cell::new(entry.id),
            Cell::new(&format_timestamp(entry.period_start)[..7]),
            Cell::new(&entry.label),
            Cell::new(money(entry.income)),
            Cell::new(money(entry.expenses)),
            Cell::new(money(entry.balance)),
            Cell::new(record.income_details.len() + record.expense_details.len()),
        ]);
    }
    println!("Ledger entries\n{table}");
    Ok(())
}

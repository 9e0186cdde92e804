use comfy_table::{Cell, Table};

use crate::category_settings::{
    apply_payload, export_payload, reset_preferences, set_preferences, SettingsPayload,
};
use crate::cli::open_db;
use crate::error::{LedgerError, Result};
use crate::models::CategoryPreferences;
use crate::store::{LedgerStore, SqliteStore};

pub fn list() -> Result<()> {
    let conn = open_db()?;
    let store = SqliteStore::new(&conn);
    let categories = store.list_categories()?;
    if categories.is_empty() {
        println!("No categories yet. Run `churchbooks sync` first.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Code", "Type", "Order", "Visible", "Aggregate Into", "Year"]);
    for cat in categories {
        table.add_row(vec![
            Cell::new(cat.id),
            Cell::new(cat.category_type),
            Cell::new(cat.order),
            Cell::new(if cat.visible { "yes" } else { "no" }),
            Cell::new(cat.aggregate_into.unwrap_or_default()),
            Cell::new(cat.year.map(|y| y.to_string()).unwrap_or_else(|| "all".into())),
        ]);
    }
    println!("Categories\n{table}");
    Ok(())
}

fn scope_label(year: Option<i32>) -> String {
    year.map(|y| y.to_string()).unwrap_or_else(|| "all years".into())
}

/// Flags not given keep the value stored for the same scope. A year with no
/// settings of its own starts from the global ones.
pub fn set(
    code: &str,
    visible: Option<bool>,
    aggregate_into: Option<String>,
    clear_aggregate: bool,
    year: Option<i32>,
) -> Result<()> {
    let conn = open_db()?;
    let store = SqliteStore::new(&conn);
    let global = store
        .find_category_by_code(code)?
        .ok_or_else(|| LedgerError::UnknownCategory(code.to_string()))?;
    let current = match store.category_preferences(code, year)? {
        Some(prefs) => prefs,
        None => CategoryPreferences {
            visible: global.visible,
            aggregate_into: global.aggregate_into,
            year,
        },
    };

    let prefs = CategoryPreferences {
        visible: visible.unwrap_or(current.visible),
        aggregate_into: if clear_aggregate {
            None
        } else {
            aggregate_into.or(current.aggregate_into)
        },
        year,
    };
    set_preferences(&store, code, &prefs)?;
    println!("Updated category: {code} ({})", scope_label(year));
    Ok(())
}

pub fn reset(year: Option<i32>) -> Result<()> {
    let conn = open_db()?;
    let store = SqliteStore::new(&conn);
    let removed = reset_preferences(&store, year)?;
    println!("Reset {removed} category setting(s) for {}", scope_label(year));
    Ok(())
}

pub fn export(output: Option<String>, year: Option<i32>) -> Result<()> {
    let conn = open_db()?;
    let store = SqliteStore::new(&conn);
    let payload = export_payload(&store, year)?;
    let json = serde_json::to_string_pretty(&payload)?;
    match output {
        Some(path) => {
            std::fs::write(&path, format!("{json}\n"))?;
            println!("Category settings written to {path}");
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub fn import(file: &str, year: Option<i32>) -> Result<()> {
    let content = std::fs::read_to_string(file)?;
    let payload: SettingsPayload = serde_json::from_str(&content)?;
    let conn = open_db()?;
    let store = SqliteStore::new(&conn);
    let outcome = apply_payload(&store, &payload, year)?;
    println!(
        "{} updated, {} created ({})",
        outcome.updated,
        outcome.created,
        scope_label(year)
    );
    Ok(())
}

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::aggregator::BucketTotal;
use crate::cli::{current_year, open_db};
use crate::error::Result;
use crate::fmt::money;
use crate::months::month_name;
use crate::reports::{load_overview, FinancialOverview};
use crate::store::SqliteStore;

pub fn run(year: Option<i32>, json: bool) -> Result<()> {
    let year = year.unwrap_or_else(current_year);
    let conn = open_db()?;
    let store = SqliteStore::new(&conn);
    let overview = load_overview(&store, year)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }
    if overview.monthly_data.is_empty() {
        println!("No ledger entries for {year}. Run `churchbooks sync` first.");
        return Ok(());
    }
    print_yearly(&overview);
    println!();
    print_monthly(&overview);
    Ok(())
}

fn add_section(table: &mut Table, title: colored::ColoredString, buckets: &[BucketTotal]) {
    table.add_row(vec![Cell::new(title), Cell::new("")]);
    for bucket in buckets {
        table.add_row(vec![
            Cell::new(format!("  {}", bucket.category)),
            Cell::new(money(bucket.amount)),
        ]);
    }
}

fn print_yearly(overview: &FinancialOverview) {
    let mut table = Table::new();
    table.set_header(vec!["Category", "Amount"]);

    add_section(&mut table, "INCOME".green().bold(), &overview.income);
    table.add_row(vec![
        Cell::new("Total Income".bold()),
        Cell::new(money(overview.totals.income)),
    ]);
    table.add_row(vec![Cell::new(""), Cell::new("")]);

    add_section(&mut table, "EXPENSES".red().bold(), &overview.expenses);
    table.add_row(vec![
        Cell::new("Total Expenses".bold()),
        Cell::new(money(overview.totals.expenses)),
    ]);
    table.add_row(vec![Cell::new(""), Cell::new("")]);

    let balance_label = if overview.totals.balance.is_sign_negative() {
        "BALANCE".red().bold()
    } else {
        "BALANCE".green().bold()
    };
    table.add_row(vec![Cell::new(balance_label), Cell::new(money(overview.totals.balance))]);

    println!("Overview {}\n{table}", overview.year);
}

fn print_monthly(overview: &FinancialOverview) {
    let mut table = Table::new();
    table.set_header(vec!["Month", "Income", "Expenses", "Balance", "Top expense"]);
    for month in &overview.monthly_data {
        let balance = if month.balance.is_sign_negative() {
            money(month.balance).red().to_string()
        } else {
            money(month.balance).green().to_string()
        };
        let top = month
            .expense_details
            .first()
            .map(|b| format!("{} ({})", b.category, money(b.amount)))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(month_name(month.month_index)),
            Cell::new(money(month.income)),
            Cell::new(money(month.expenses)),
            Cell::new(balance),
            Cell::new(top),
        ]);
    }
    println!("Monthly\n{table}");
}

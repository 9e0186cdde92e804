use crate::db::{get_connection, last_sync_run, DB_FILE};
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::{load_settings, settings_file_exists};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join(DB_FILE);
    let source = &settings.source;

    if !settings_file_exists() {
        println!("Settings:   (defaults, run `churchbooks init` to save)");
    }
    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());
    println!(
        "Source:     {}",
        if source.location.is_empty() { "(not set)" } else { &source.location }
    );
    println!("Range:      {}", source.range);

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let conn = get_connection(&db_path)?;
        let entries: i64 = conn.query_row("SELECT count(*) FROM ledger_entries", [], |r| r.get(0))?;
        let categories: i64 = conn.query_row("SELECT count(*) FROM categories", [], |r| r.get(0))?;
        let hidden: i64 = conn.query_row(
            "SELECT count(*) FROM category_preferences WHERE visible = 0 AND year IS NULL",
            [],
            |r| r.get(0),
        )?;

        println!();
        println!("Ledger entries:  {entries}");
        println!("Categories:      {categories}");
        println!("Hidden:          {hidden}");

        match last_sync_run(&conn)? {
            Some(run) => {
                println!();
                println!("Last sync:  {} from {}", run.finished_at, run.source);
                println!(
                    "            {} created, {} updated, {} skipped, {} failed",
                    run.records_created, run.records_updated, run.records_skipped, run.records_failed
                );
                if let Some(checksum) = run.checksum {
                    println!("Checksum:   {}", &checksum[..checksum.len().min(12)]);
                }
            }
            None => {
                println!();
                println!("No sync has run yet.");
            }
        }
    } else {
        println!();
        println!("Database not found. Run `churchbooks init` to set up.");
    }

    Ok(())
}

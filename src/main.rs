mod aggregator;
mod cache;
mod category_settings;
mod cli;
mod db;
mod error;
mod fmt;
mod importer;
mod markers;
mod models;
mod months;
mod parser;
mod reports;
mod settings;
mod store;
mod sync;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{CategoriesCommands, Cli, Commands};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Init { data_dir }) => cli::init::run(data_dir),
        Some(Commands::Sync {
            source,
            kind,
            range,
            json,
        }) => cli::sync::run(source.as_deref(), kind.as_deref(), range.as_deref(), json),
        Some(Commands::Overview { year, json }) => cli::overview::run(year, json),
        Some(Commands::Records { year }) => cli::records::run(year),
        Some(Commands::Categories { command }) => match command {
            CategoriesCommands::List => cli::categories::list(),
            CategoriesCommands::Set {
                code,
                visible,
                aggregate_into,
                clear_aggregate,
                year,
            } => cli::categories::set(&code, visible, aggregate_into, clear_aggregate, year),
            CategoriesCommands::Export { output, year } => cli::categories::export(output, year),
            CategoriesCommands::Import { file, year } => cli::categories::import(&file, year),
            CategoriesCommands::Reset { year } => cli::categories::reset(year),
        },
        Some(Commands::Backup { output }) => cli::backup::run(output),
        Some(Commands::Status) | None => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

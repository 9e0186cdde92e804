use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to fetch source grid: {0}")]
    Transport(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Unknown source kind: {0}")]
    UnknownSource(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Invalid category setting: {0}")]
    InvalidSetting(String),

    #[error("Amount out of range: {0}")]
    AmountOverflow(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::models::RawGrid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Decimal value of a cell. Thousands separators are stripped; blank or
/// non-numeric cells are zero.
pub fn normalize_cell(raw: &str) -> Decimal {
    let s = raw.replace(',', "");
    let s = s.trim();
    if s.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(s)
        .map(|d| d.normalize())
        .unwrap_or(Decimal::ZERO)
}

/// Sum of `amounts`, or `AmountOverflow` naming `what` when the total does
/// not fit in a `Decimal`.
pub fn checked_sum<I>(amounts: I, what: &str) -> Result<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts.into_iter().try_fold(Decimal::ZERO, |acc, amount| {
        acc.checked_add(amount)
            .ok_or_else(|| LedgerError::AmountOverflow(what.to_string()))
    })
}

/// SHA-256 over the grid contents, used to tag sync runs.
pub fn grid_checksum(grid: &RawGrid) -> String {
    let mut hasher = Sha256::new();
    for row in &grid.rows {
        for cell in row {
            hasher.update(cell.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}

/// Zero-based column index for A1 letters: A → 0, Z → 25, AA → 26.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let n = letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize);
    Some(n - 1)
}

// ---------------------------------------------------------------------------
// Range spec: "Monthly!AF:AR", "AF:AR" or "Monthly"
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeSpec {
    pub raw: String,
    pub sheet: Option<String>,
    /// Inclusive zero-based column span.
    pub columns: Option<(usize, usize)>,
}

impl RangeSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (sheet, cells) = match raw.rsplit_once('!') {
            Some((sheet, cells)) => (Some(sheet.trim_matches('\'').to_string()), cells),
            None if raw.contains(':') => (None, raw),
            None => (Some(raw.to_string()).filter(|s| !s.is_empty()), ""),
        };
        let columns = if cells.is_empty() {
            None
        } else {
            let (from, to) = cells
                .split_once(':')
                .ok_or_else(|| LedgerError::Spreadsheet(format!("Bad range: {raw}")))?;
            let letters = |s: &str| -> String { s.chars().take_while(|c| c.is_ascii_alphabetic()).collect() };
            let start = column_index(&letters(from))
                .ok_or_else(|| LedgerError::Spreadsheet(format!("Bad range start: {raw}")))?;
            let end = column_index(&letters(to))
                .ok_or_else(|| LedgerError::Spreadsheet(format!("Bad range end: {raw}")))?;
            Some((start.min(end), start.max(end)))
        };
        Ok(Self {
            raw: raw.to_string(),
            sheet,
            columns,
        })
    }

    /// Keep only the configured columns of `row`, dropping trailing blanks.
    fn slice(&self, row: Vec<String>) -> Vec<String> {
        let mut out = match self.columns {
            Some((start, end)) => row.into_iter().skip(start).take(end - start + 1).collect(),
            None => row,
        };
        while out.last().is_some_and(|c| c.trim().is_empty()) {
            out.pop();
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Source kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceKind {
    Csv,
    #[cfg(feature = "xlsx")]
    Xlsx,
    #[cfg(feature = "sheets")]
    Sheets,
}

const ALL_SOURCES: &[SourceKind] = &[
    SourceKind::Csv,
    #[cfg(feature = "xlsx")]
    SourceKind::Xlsx,
    #[cfg(feature = "sheets")]
    SourceKind::Sheets,
];

impl SourceKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            #[cfg(feature = "xlsx")]
            Self::Xlsx => "xlsx",
            #[cfg(feature = "sheets")]
            Self::Sheets => "sheets",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Csv => "CSV export",
            #[cfg(feature = "xlsx")]
            Self::Xlsx => "Excel workbook",
            #[cfg(feature = "sheets")]
            Self::Sheets => "Google Sheets",
        }
    }

    pub fn from_key(key: &str) -> Result<Self> {
        ALL_SOURCES
            .iter()
            .find(|s| s.key() == key)
            .copied()
            .ok_or_else(|| LedgerError::UnknownSource(key.to_string()))
    }

    pub fn needs_api_key(&self) -> bool {
        match self {
            #[cfg(feature = "sheets")]
            Self::Sheets => true,
            _ => false,
        }
    }

    /// Guess from the location: file extension, otherwise a spreadsheet id.
    pub fn detect(location: &str) -> Self {
        let ext = Path::new(location)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Self::Csv,
            #[cfg(feature = "xlsx")]
            Some("xlsx" | "xlsm" | "xls" | "ods") => Self::Xlsx,
            #[cfg(feature = "sheets")]
            None if !Path::new(location).exists() => Self::Sheets,
            _ => Self::Csv,
        }
    }

    pub fn fetch(&self, spec: &SourceSpec) -> Result<Vec<Vec<String>>> {
        match self {
            Self::Csv => read_csv(Path::new(&spec.location)),
            #[cfg(feature = "xlsx")]
            Self::Xlsx => read_workbook(Path::new(&spec.location), spec.range.as_ref()),
            #[cfg(feature = "sheets")]
            Self::Sheets => fetch_sheets(spec),
        }
    }
}

/// Everything needed to fetch one grid.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub kind: SourceKind,
    /// File path, or spreadsheet id for Google Sheets.
    pub location: String,
    pub range: Option<RangeSpec>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Fetch the raw grid. Any failure here is fatal for the run.
pub fn fetch_grid(spec: &SourceSpec) -> Result<RawGrid> {
    info!(source = spec.kind.name(), location = %spec.location, "Fetching source grid");
    let rows = spec.kind.fetch(spec).map_err(|e| match e {
        LedgerError::Transport(_) => e,
        other => LedgerError::Transport(other.to_string()),
    })?;
    let rows = match (&spec.range, spec.kind) {
        #[cfg(feature = "sheets")]
        (_, SourceKind::Sheets) => rows,
        (Some(range), _) => rows.into_iter().map(|r| range.slice(r)).collect(),
        (None, _) => rows,
    };
    let grid = RawGrid::from_fetched(rows);
    info!(rows = grid.len(), "Source grid fetched");
    Ok(grid)
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn read_csv(file_path: &Path) -> Result<Vec<Vec<String>>> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    debug!(path = %file_path.display(), rows = rows.len(), "Read CSV grid");
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Excel workbook (feature-gated)
// ---------------------------------------------------------------------------

#[cfg(feature = "xlsx")]
fn read_workbook(file_path: &Path, range: Option<&RangeSpec>) -> Result<Vec<Vec<String>>> {
    use calamine::{Data, Reader};

    let mut workbook = calamine::open_workbook_auto(file_path)
        .map_err(|e| LedgerError::Spreadsheet(format!("Failed to open workbook: {e}")))?;

    let sheet_name = match range.and_then(|r| r.sheet.clone()) {
        Some(name) => name,
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| LedgerError::Spreadsheet("Workbook has no sheets".into()))?,
    };
    let sheet = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| LedgerError::Spreadsheet(format!("Sheet '{sheet_name}': {e}")))?;

    // Ranges start at the first used cell; pad so column letters stay absolute.
    let col_offset = sheet.start().map(|(_, c)| c as usize).unwrap_or(0);
    let rows = sheet
        .rows()
        .map(|row| {
            std::iter::repeat(String::new())
                .take(col_offset)
                .chain(row.iter().map(|cell| match cell {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                }))
                .collect()
        })
        .collect::<Vec<Vec<String>>>();
    debug!(path = %file_path.display(), sheet = %sheet_name, rows = rows.len(), "Read workbook grid");
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Google Sheets values API (feature-gated)
// ---------------------------------------------------------------------------

#[cfg(feature = "sheets")]
const SHEETS_ENDPOINT: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[cfg(feature = "sheets")]
#[derive(serde::Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[cfg(feature = "sheets")]
fn fetch_sheets(spec: &SourceSpec) -> Result<Vec<Vec<String>>> {
    let api_key = spec
        .api_key
        .as_deref()
        .ok_or_else(|| LedgerError::Transport("No Google Sheets API key configured".into()))?;
    let range = spec.range.as_ref().map(|r| r.raw.as_str()).unwrap_or("A:Z");

    let client = reqwest::blocking::Client::builder()
        .timeout(spec.timeout)
        .build()
        .map_err(|e| LedgerError::Transport(e.to_string()))?;
    let url = format!("{SHEETS_ENDPOINT}/{}/values/{range}", spec.location);
    let response = client
        .get(&url)
        .query(&[("key", api_key), ("majorDimension", "ROWS")])
        .send()
        .map_err(|e| LedgerError::Transport(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(LedgerError::Transport(format!("HTTP {status}: {body}")));
    }
    let payload: ValueRange = response
        .json()
        .map_err(|e| LedgerError::Transport(format!("Malformed response: {e}")))?;

    Ok(payload
        .values
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect())
}

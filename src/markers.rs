use std::ops::Range;

use crate::models::RawGrid;

/// Row labels that delimit sections of the monthly sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    TotalIncome,
    TotalExpense,
    TotalSum,
    IncomeHeader,
    ExpenseHeader,
}

impl Marker {
    /// Checked in this order. Totals come first so "Total Income" is never
    /// read as the income section header.
    pub const PRIORITY: [Marker; 5] = [
        Marker::TotalIncome,
        Marker::TotalExpense,
        Marker::TotalSum,
        Marker::IncomeHeader,
        Marker::ExpenseHeader,
    ];

    pub fn needle(&self) -> &'static str {
        match self {
            Self::TotalIncome => "total income",
            Self::TotalExpense => "total expense",
            Self::TotalSum => "total sum",
            Self::IncomeHeader => "income",
            Self::ExpenseHeader => "expense",
        }
    }

    /// Classify a column-0 label. Case-insensitive substring match.
    pub fn classify(label: &str) -> Option<Marker> {
        let normalized = label.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        Self::PRIORITY
            .into_iter()
            .find(|m| normalized.contains(m.needle()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructuralMarkers {
    pub income_header: Option<usize>,
    pub expense_header: Option<usize>,
    pub total_income_row: Option<usize>,
    pub total_expense_row: Option<usize>,
    pub total_sum_row: Option<usize>,
}

impl StructuralMarkers {
    fn record(&mut self, marker: Marker, row: usize) {
        let slot = match marker {
            Marker::TotalIncome => &mut self.total_income_row,
            Marker::TotalExpense => &mut self.total_expense_row,
            Marker::TotalSum => &mut self.total_sum_row,
            Marker::IncomeHeader => &mut self.income_header,
            Marker::ExpenseHeader => &mut self.expense_header,
        };
        *slot = Some(row);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Category rows of the income block. Ends before the expense header, or
    /// before the total-income row when there is no expense header.
    pub fn income_rows(&self) -> Range<usize> {
        let stop = self.expense_header.or(self.total_income_row);
        rows_between(self.income_header, stop)
    }

    /// Category rows of the expense block, ending before the total-income row.
    pub fn expense_rows(&self) -> Range<usize> {
        rows_between(self.expense_header, self.total_income_row)
    }
}

/// Rows strictly between `header` and `stop`. Empty when either is missing.
fn rows_between(header: Option<usize>, stop: Option<usize>) -> Range<usize> {
    match (header, stop) {
        (Some(h), Some(s)) if s > h + 1 => (h + 1)..s,
        _ => 0..0,
    }
}

/// Single top-to-bottom pass over column 0. A repeated marker keeps its last
/// occurrence.
pub fn scan_markers(grid: &RawGrid) -> StructuralMarkers {
    let mut markers = StructuralMarkers::default();
    for (idx, row) in grid.rows.iter().enumerate() {
        let Some(label) = row.first() else { continue };
        if let Some(marker) = Marker::classify(label) {
            markers.record(marker, idx);
        }
    }
    markers
}

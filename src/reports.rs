use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregator::{aggregate, sorted_buckets, BucketTotal, SettingsIndex};
use crate::error::{LedgerError, Result};
use crate::importer::checked_sum;
use crate::models::{CategorySetting, DetailEntry, MonthlyRecord};
use crate::store::LedgerStore;
use crate::sync::year_window;

/// Bucket used for a month whose sheet column carried a total but no
/// category rows.
pub const INCOME_FALLBACK_BUCKET: &str = "รวมรายรับ";
pub const EXPENSE_FALLBACK_BUCKET: &str = "รวมรายจ่าย";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBreakdown {
    pub month_index: u32,
    pub label: String,
    pub income: Decimal,
    pub expenses: Decimal,
    pub balance: Decimal,
    pub income_details: Vec<BucketTotal>,
    pub expense_details: Vec<BucketTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub income: Decimal,
    pub expenses: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialOverview {
    pub year: i32,
    pub income: Vec<BucketTotal>,
    pub expenses: Vec<BucketTotal>,
    pub monthly_data: Vec<MonthlyBreakdown>,
    pub totals: Totals,
}

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

fn month_buckets(
    details: &[DetailEntry],
    index: &SettingsIndex<'_>,
    total: Decimal,
    fallback: &str,
) -> Result<Vec<BucketTotal>> {
    if details.is_empty() && !total.is_zero() {
        return Ok(vec![BucketTotal {
            category: fallback.to_string(),
            amount: total,
        }]);
    }
    Ok(sorted_buckets(aggregate(details, index)?))
}

/// Yearly and per-month aggregation of `records` for `year`. Both views go
/// through the same settings index, so a hidden category is hidden everywhere.
pub fn build_overview(year: i32, records: &[MonthlyRecord], settings: &[CategorySetting]) -> Result<FinancialOverview> {
    let index = SettingsIndex::new(settings, Some(year));
    let mut in_year: Vec<&MonthlyRecord> = records.iter().filter(|r| r.year == year).collect();
    in_year.sort_by_key(|r| r.month_index);

    let all_income: Vec<DetailEntry> = in_year
        .iter()
        .flat_map(|r| r.income_details.iter().cloned())
        .collect();
    let all_expenses: Vec<DetailEntry> = in_year
        .iter()
        .flat_map(|r| r.expense_details.iter().cloned())
        .collect();

    let monthly_data = in_year
        .iter()
        .map(|r| {
            Ok(MonthlyBreakdown {
                month_index: r.month_index,
                label: r.label.clone(),
                income: r.income,
                expenses: r.expenses,
                balance: r.balance,
                income_details: month_buckets(&r.income_details, &index, r.income, INCOME_FALLBACK_BUCKET)?,
                expense_details: month_buckets(&r.expense_details, &index, r.expenses, EXPENSE_FALLBACK_BUCKET)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let income = checked_sum(in_year.iter().map(|r| r.income), "yearly income")?;
    let expenses = checked_sum(in_year.iter().map(|r| r.expenses), "yearly expenses")?;
    let balance = income
        .checked_sub(expenses)
        .ok_or_else(|| LedgerError::AmountOverflow("yearly balance".into()))?;

    Ok(FinancialOverview {
        year,
        income: sorted_buckets(aggregate(&all_income, &index)?),
        expenses: sorted_buckets(aggregate(&all_expenses, &index)?),
        monthly_data,
        totals: Totals {
            income,
            expenses,
            balance,
        },
    })
}

/// Build the overview for `year` from persisted entries and stored settings.
pub fn load_overview<S: LedgerStore>(store: &S, year: i32) -> Result<FinancialOverview> {
    let (start, end) = year_window(year)?;
    let records = store
        .ledger_entries_between(start, end)?
        .iter()
        .map(|e| e.to_record())
        .collect::<Result<Vec<_>>>()?;
    let settings = store.list_categories()?;
    build_overview(year, &records, &settings)
}

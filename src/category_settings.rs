use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregator::SettingsIndex;
use crate::error::{LedgerError, Result};
use crate::models::{CategoryPreferences, CategoryType, DiscoveredCategory};
use crate::store::LedgerStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub aggregate_into: Option<String>,
}

fn default_visible() -> bool {
    true
}

/// The JSON document exchanged by `categories export` / `categories import`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
    #[serde(default)]
    pub income_rows: Vec<SettingsRow>,
    #[serde(default)]
    pub expense_rows: Vec<SettingsRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyOutcome {
    pub updated: usize,
    pub created: usize,
}

/// Blank redirect targets mean "no redirect".
fn clean_target(target: Option<&str>) -> Option<String> {
    target
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn validate(id: &str, aggregate_into: Option<&str>) -> Result<()> {
    if id.trim().is_empty() {
        return Err(LedgerError::InvalidSetting("category id must not be empty".into()));
    }
    if aggregate_into.is_some_and(|t| t == id.trim()) {
        return Err(LedgerError::InvalidSetting(format!(
            "{id} cannot aggregate into itself"
        )));
    }
    Ok(())
}

/// Settings in effect for `year` (or the global ones), one row per category.
pub fn export_payload<S: LedgerStore>(store: &S, year: Option<i32>) -> Result<SettingsPayload> {
    let settings = store.list_categories()?;
    let index = SettingsIndex::new(&settings, year);
    let mut payload = SettingsPayload::default();
    for setting in settings.iter().filter(|s| s.year.is_none()) {
        let effective = index.get(&setting.id).unwrap_or(setting);
        let row = SettingsRow {
            id: setting.id.clone(),
            name: setting.name.clone(),
            visible: effective.visible,
            aggregate_into: effective.aggregate_into.clone(),
        };
        match setting.category_type {
            CategoryType::Income => payload.income_rows.push(row),
            CategoryType::Expense => payload.expense_rows.push(row),
        }
    }
    Ok(payload)
}

/// Write visibility and redirection for every row, scoped to `year` or
/// global. Rows are all validated before anything is written. Unknown ids are
/// created in the row's section; names of existing categories stay as the
/// sheet has them.
pub fn apply_payload<S: LedgerStore>(
    store: &S,
    payload: &SettingsPayload,
    year: Option<i32>,
) -> Result<ApplyOutcome> {
    let sections = [
        (&payload.income_rows, CategoryType::Income),
        (&payload.expense_rows, CategoryType::Expense),
    ];
    for (rows, _) in &sections {
        for row in rows.iter() {
            validate(&row.id, clean_target(row.aggregate_into.as_deref()).as_deref())?;
        }
    }

    let mut outcome = ApplyOutcome::default();
    for (rows, category_type) in sections {
        for (position, row) in rows.iter().enumerate() {
            let id = row.id.trim();
            match store.find_category_by_code(id)? {
                Some(_) => outcome.updated += 1,
                None => {
                    let name = if row.name.trim().is_empty() { id } else { row.name.trim() };
                    store.create_category(&DiscoveredCategory {
                        code: id.to_string(),
                        name: name.to_string(),
                        category_type,
                        order: position as i64,
                    })?;
                    outcome.created += 1;
                }
            }
            let prefs = CategoryPreferences {
                visible: row.visible,
                aggregate_into: clean_target(row.aggregate_into.as_deref()),
                year,
            };
            store.set_category_preferences(id, &prefs)?;
        }
    }
    info!(updated = outcome.updated, created = outcome.created, ?year, "Applied category settings");
    Ok(outcome)
}

/// Remove every stored setting for `year`, or the global settings when
/// `year` is `None`. Categories themselves stay.
pub fn reset_preferences<S: LedgerStore>(store: &S, year: Option<i32>) -> Result<usize> {
    let removed = store.reset_category_preferences(year)?;
    info!(removed, ?year, "Reset category settings");
    Ok(removed)
}

/// Edit one category's user-owned fields.
pub fn set_preferences<S: LedgerStore>(store: &S, code: &str, prefs: &CategoryPreferences) -> Result<()> {
    let prefs = CategoryPreferences {
        aggregate_into: clean_target(prefs.aggregate_into.as_deref()),
        ..prefs.clone()
    };
    validate(code, prefs.aggregate_into.as_deref())?;
    if !store.set_category_preferences(code.trim(), &prefs)? {
        return Err(LedgerError::UnknownCategory(code.to_string()));
    }
    Ok(())
}

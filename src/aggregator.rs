use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{LedgerError, Result};
use crate::models::{CategorySetting, DetailEntry};

/// Settings applicable to one year, looked up by category id. A setting
/// scoped to the year replaces a global one with the same id.
pub struct SettingsIndex<'a> {
    by_id: HashMap<&'a str, &'a CategorySetting>,
}

impl<'a> SettingsIndex<'a> {
    pub fn new(settings: &'a [CategorySetting], year: Option<i32>) -> Self {
        let mut by_id: HashMap<&'a str, &'a CategorySetting> = HashMap::new();
        for setting in settings {
            match (setting.year, year) {
                (None, _) => {
                    by_id.entry(setting.id.as_str()).or_insert(setting);
                }
                (Some(y), Some(target)) if y == target => {
                    by_id.insert(setting.id.as_str(), setting);
                }
                _ => {}
            }
        }
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&'a CategorySetting> {
        self.by_id.get(id).copied()
    }

    /// Bucket an entry lands in, or `None` when it is hidden.
    pub fn bucket_for<'e>(&self, entry: &'e DetailEntry) -> Option<&'e str>
    where
        'a: 'e,
    {
        let Some(setting) = self.get(&entry.category_id) else {
            return Some(entry.label.as_str());
        };
        if !setting.visible {
            return None;
        }
        match setting.aggregate_into.as_deref() {
            Some(target) if !target.is_empty() && target != setting.id => Some(target),
            _ => Some(setting.name.as_str()),
        }
    }
}

/// Collapse detail entries into user-facing buckets.
///
/// Unconfigured categories keep their own label, hidden ones are dropped,
/// redirected ones are summed into their target bucket, and the rest appear
/// under the setting's name. A bucket whose total leaves the `Decimal` range
/// is an error.
pub fn aggregate(details: &[DetailEntry], index: &SettingsIndex<'_>) -> Result<BTreeMap<String, Decimal>> {
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    for entry in details {
        if let Some(bucket) = index.bucket_for(entry) {
            let total = totals.entry(bucket.to_string()).or_default();
            *total = total
                .checked_add(entry.amount)
                .ok_or_else(|| LedgerError::AmountOverflow(format!("bucket {bucket}")))?;
        }
    }
    Ok(totals)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketTotal {
    pub category: String,
    pub amount: Decimal,
}

/// Largest bucket first; ties by label.
pub fn sorted_buckets(totals: BTreeMap<String, Decimal>) -> Vec<BucketTotal> {
    let mut items: Vec<BucketTotal> = totals
        .into_iter()
        .map(|(category, amount)| BucketTotal { category, amount })
        .collect();
    items.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.category.cmp(&b.category)));
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryType;
    use std::str::FromStr;

    fn entry(id: &str, amount: &str) -> DetailEntry {
        DetailEntry {
            category_id: id.to_string(),
            label: id.to_string(),
            amount: Decimal::from_str(amount).unwrap(),
        }
    }

    fn aggregate_with(details: &[DetailEntry], settings: &[CategorySetting], year: Option<i32>) -> BTreeMap<String, Decimal> {
        aggregate(details, &SettingsIndex::new(settings, year)).unwrap()
    }

    fn setting(id: &str, visible: bool, aggregate_into: Option<&str>) -> CategorySetting {
        CategorySetting {
            visible,
            aggregate_into: aggregate_into.map(str::to_string),
            ..CategorySetting::new(id, CategoryType::Income)
        }
    }

    #[test]
    fn test_unconfigured_category_is_kept() {
        let totals = aggregate_with(&[entry("Tithes", "100")], &[], None);
        assert_eq!(totals.get("Tithes"), Some(&Decimal::from(100)));
    }

    #[test]
    fn test_hidden_category_is_dropped() {
        let settings = vec![setting("Interest", false, None)];
        let totals = aggregate_with(&[entry("Interest", "5"), entry("Tithes", "100")], &settings, None);
        assert!(!totals.contains_key("Interest"));
        assert_eq!(totals.len(), 1);
    }

    #[test]
    fn test_hidden_wins_over_redirect() {
        let settings = vec![setting("Interest", false, Some("Other"))];
        let totals = aggregate_with(&[entry("Interest", "5")], &settings, None);
        assert!(totals.is_empty());
    }

    #[test]
    fn test_redirect_sums_into_bucket() {
        let settings = vec![
            setting("Tithes", true, Some("Giving")),
            setting("Offering", true, Some("Giving")),
        ];
        let details = [entry("Tithes", "10000"), entry("Offering", "250.50"), entry("Interest", "3")];
        let totals = aggregate_with(&details, &settings, None);
        assert_eq!(totals.get("Giving"), Some(&Decimal::from_str("10250.50").unwrap()));
        assert!(!totals.contains_key("Tithes"));
        assert!(!totals.contains_key("Offering"));
        assert_eq!(totals.get("Interest"), Some(&Decimal::from(3)));
    }

    #[test]
    fn test_visible_setting_uses_its_name() {
        let mut s = setting("ดอกเบี้ย", true, None);
        s.name = "Interest".into();
        let totals = aggregate_with(&[entry("ดอกเบี้ย", "12")], &[s], None);
        assert_eq!(totals.get("Interest"), Some(&Decimal::from(12)));
    }

    #[test]
    fn test_self_redirect_is_ignored() {
        let settings = vec![setting("Tithes", true, Some("Tithes"))];
        let totals = aggregate_with(&[entry("Tithes", "1")], &settings, None);
        assert_eq!(totals.get("Tithes"), Some(&Decimal::ONE));
    }

    #[test]
    fn test_redirect_is_single_level() {
        let settings = vec![
            setting("A", true, Some("B")),
            setting("B", true, Some("C")),
        ];
        let totals = aggregate_with(&[entry("A", "1"), entry("B", "2")], &settings, None);
        assert_eq!(totals.get("B"), Some(&Decimal::ONE));
        assert_eq!(totals.get("C"), Some(&Decimal::from(2)));
    }

    #[test]
    fn test_year_scoped_setting_overrides_global() {
        let global = setting("Tithes", true, None);
        let mut scoped = setting("Tithes", false, None);
        scoped.year = Some(2024);
        let settings = vec![scoped, global];
        assert!(aggregate_with(&[entry("Tithes", "1")], &settings, Some(2024)).is_empty());
        assert_eq!(aggregate_with(&[entry("Tithes", "1")], &settings, Some(2023)).len(), 1);
        assert_eq!(aggregate_with(&[entry("Tithes", "1")], &settings, None).len(), 1);
    }

    #[test]
    fn test_decimal_sums_do_not_drift() {
        let details: Vec<_> = (0..1000).map(|_| entry("Coins", "0.10")).collect();
        let totals = aggregate_with(&details, &[], None);
        assert_eq!(totals.get("Coins"), Some(&Decimal::from(100)));
    }

    #[test]
    fn test_bucket_overflow_is_an_error() {
        let settings = vec![
            setting("Tithes", true, Some("Giving")),
            setting("Offering", true, Some("Giving")),
        ];
        let max = Decimal::MAX.to_string();
        let details = [entry("Tithes", &max), entry("Offering", &max)];
        let err = aggregate(&details, &SettingsIndex::new(&settings, None)).unwrap_err();
        assert!(err.to_string().contains("Giving"));
    }

    #[test]
    fn test_sorted_buckets() {
        let mut totals = BTreeMap::new();
        totals.insert("b".to_string(), Decimal::from(5));
        totals.insert("a".to_string(), Decimal::from(5));
        totals.insert("c".to_string(), Decimal::from(9));
        let sorted = sorted_buckets(totals);
        let names: Vec<_> = sorted.iter().map(|b| b.category.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}

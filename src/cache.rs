use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::reports::FinancialOverview;

/// Per-year overview cache with a fixed time-to-live. Owned by the caller and
/// handed to whoever needs it; the sync engine invalidates it after writes.
pub struct OverviewCache {
    ttl: Duration,
    entries: Mutex<HashMap<i32, (Instant, FinancialOverview)>>,
}

impl OverviewCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, year: i32) -> Option<FinancialOverview> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = entries
            .get(&year)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, overview)| overview.clone());
        if fresh.is_none() {
            entries.remove(&year);
        }
        fresh
    }

    pub fn put(&self, year: i32, overview: FinancialOverview) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(year, (Instant::now(), overview));
    }

    pub fn invalidate(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }
}

use chrono::Utc;
use tracing::debug;

use super::keys;
use super::manager::PersistentCache;
use crate::config::CleanupConfig;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    /// Entries removed for being older than the age limit.
    pub expired: usize,
    /// Entries removed to get back under the count limit.
    pub trimmed: usize,
}

/// Prune match detail entries: drop those past the age limit (or without a
/// readable timestamp), then keep only the newest `match_detail_max_items`.
pub fn cleanup_caches(cache: &PersistentCache, config: &CleanupConfig) -> CleanupReport {
    let now = Utc::now().timestamp_millis();
    let max_age_ms = config.match_detail_max_age_days.saturating_mul(DAY_MS);
    let mut report = CleanupReport::default();

    let mut remaining: Vec<(String, i64)> = Vec::new();
    for key in cache.keys_with_prefix(keys::MATCH_DETAIL_PREFIX) {
        match cache.timestamp(&key) {
            Some(ts) if ts > 0 && now - ts <= max_age_ms => remaining.push((key, ts)),
            _ => {
                cache.delete(&key);
                report.expired += 1;
            }
        }
    }

    if remaining.len() > config.match_detail_max_items {
        remaining.sort_by(|a, b| b.1.cmp(&a.1));
        for (key, _) in remaining.drain(config.match_detail_max_items..) {
            cache.delete(&key);
            report.trimmed += 1;
        }
    }

    if report.expired + report.trimmed > 0 {
        debug!(
            expired = report.expired,
            trimmed = report.trimmed,
            "Pruned match detail cache"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::manager::CacheEntry;
    use crate::cache::scheduler::ManualScheduler;
    use crate::cache::store::{DurableStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn detail_entry(code: &str, age_ms: i64) -> CacheEntry<serde_json::Value> {
        CacheEntry {
            key: keys::match_detail(code),
            timestamp: Utc::now().timestamp_millis() - age_ms,
            payload: json!({"data": {"match": {"publicCode": code}}}),
        }
    }

    #[test]
    fn test_cleanup_expires_then_trims() {
        let store = Arc::new(MemoryStore::new());
        store
            .write(&keys::match_detail("BROKEN"), "{}")
            .expect("seed");
        let cache = PersistentCache::new(store, Arc::new(ManualScheduler::new()));

        cache.set_entry(&detail_entry("OLD", 31 * DAY_MS));
        cache.set_entry(&detail_entry("A", 3_000));
        cache.set_entry(&detail_entry("B", 2_000));
        cache.set_entry(&detail_entry("C", 1_000));
        cache.set(keys::SEASONS, json!({"seasons": []}));

        let config = CleanupConfig {
            match_detail_max_items: 2,
            match_detail_max_age_days: 30,
        };
        let report = cleanup_caches(&cache, &config);

        assert_eq!(report, CleanupReport { expired: 2, trimmed: 1 });
        assert_eq!(
            cache.keys_with_prefix(keys::MATCH_DETAIL_PREFIX),
            vec![keys::match_detail("B"), keys::match_detail("C")]
        );
        assert!(cache.contains(keys::SEASONS));
    }
}

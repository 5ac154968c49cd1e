use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use super::keys;
use super::scheduler::FlushScheduler;
use super::store::{DurableStore, StorageError};
use crate::models::{
    AdminMatches, CurrentUser, LeaderboardCache, MatchDetailCache, OpenMatches, PastMatches,
    PlayersList, Seasons, SelectedSeason, UsersList,
};

/// Capacity of the change broadcast; slow subscribers see `Lagged`.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A cached payload and when it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, payload: T) -> Self {
        Self {
            key: key.into(),
            timestamp: Utc::now().timestamp_millis(),
            payload,
        }
    }

    pub fn age_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.timestamp
    }

    pub fn age_minutes(&self) -> i64 {
        self.age_ms() / 60_000
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    /// Whether the entry is younger than `ttl`. A timestamp in the future
    /// counts as fresh.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.age_ms() < ttl_ms
    }
}

/// Field holding a payload that is not a JSON object, as `{"ts", "value"}`.
const VALUE_FIELD: &str = "value";

/// Persisted shape of an entry: `{"ts": <ms>, ...payload fields}`.
#[derive(Deserialize)]
struct StoredRecord<T> {
    ts: i64,
    #[serde(flatten)]
    payload: T,
}

#[derive(Default)]
struct State {
    /// Hydrated records; `None` remembers that storage had nothing.
    mirror: HashMap<String, Option<Arc<Value>>>,
    /// Records waiting for the next flush, last write wins.
    pending: HashMap<String, Arc<Value>>,
    flush_scheduled: bool,
}

struct Inner {
    store: Arc<dyn DurableStore>,
    scheduler: Arc<dyn FlushScheduler>,
    state: Mutex<State>,
    /// Serializes physical writes and removals so they land in call order.
    io_lock: Mutex<()>,
    changes: broadcast::Sender<String>,
}

/// Durable key-value cache with an in-memory mirror and coalesced writes.
///
/// The mirror is authoritative for the lifetime of the process. Durable
/// storage is hydrated lazily per key and written in batches; if it fails,
/// the cache keeps working from memory.
#[derive(Clone)]
pub struct PersistentCache {
    inner: Arc<Inner>,
}

impl PersistentCache {
    pub fn new(store: Arc<dyn DurableStore>, scheduler: Arc<dyn FlushScheduler>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                scheduler,
                state: Mutex::new(State::default()),
                io_lock: Mutex::new(()),
                changes,
            }),
        }
    }

    /// Receiver of keys whose value changed through `set` or `delete`.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inner.changes.subscribe()
    }

    fn record(&self, key: &str) -> Option<Arc<Value>> {
        if let Some(cached) = self.inner.state.lock().mirror.get(key) {
            return cached.clone();
        }

        let hydrated = match self.inner.store.read(key) {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(value) if value.get("ts").and_then(Value::as_i64).is_some() => {
                    Some(Arc::new(value))
                }
                Ok(_) => {
                    debug!(key = %key, "Stored record has no timestamp, treating as miss");
                    None
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "Failed to parse stored record");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!(key = %key, error = %e, "Durable read failed");
                None
            }
        };

        // A set that raced with hydration wins
        self.inner
            .state
            .lock()
            .mirror
            .entry(key.to_string())
            .or_insert(hydrated)
            .clone()
    }

    /// Typed read. Records that do not match `T` read as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let record = self.record(key)?;
        let parsed = StoredRecord::<T>::deserialize(record.as_ref()).or_else(|e| {
            // Non-object payloads are stored wrapped
            let ts = record.get("ts").and_then(Value::as_i64);
            match (ts, record.get(VALUE_FIELD)) {
                (Some(ts), Some(value)) => T::deserialize(value)
                    .map(|payload| StoredRecord { ts, payload })
                    .map_err(|_| e),
                _ => Err(e),
            }
        });
        match parsed {
            Ok(stored) => Some(CacheEntry {
                key: key.to_string(),
                timestamp: stored.ts,
                payload: stored.payload,
            }),
            Err(e) => {
                debug!(key = %key, error = %e, "Cached record has an unexpected shape");
                None
            }
        }
    }

    /// Timestamp of the entry under `key`, whatever its payload type.
    pub fn timestamp(&self, key: &str) -> Option<i64> {
        self.record(key)?.get("ts").and_then(Value::as_i64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.record(key).is_some()
    }

    /// Store `payload` under `key` stamped with the current time.
    pub fn set<T: Serialize>(&self, key: &str, payload: T) -> CacheEntry<T> {
        let entry = CacheEntry::new(key, payload);
        self.set_entry(&entry);
        entry
    }

    /// Store an entry with its own timestamp.
    ///
    /// A payload that cannot be serialized removes the key instead, so the
    /// value it was meant to replace is never served.
    pub fn set_entry<T: Serialize>(&self, entry: &CacheEntry<T>) {
        let mut fields = match serde_json::to_value(&entry.payload) {
            Ok(Value::Object(fields)) => fields,
            Ok(other) => {
                let mut fields = Map::new();
                fields.insert(VALUE_FIELD.to_string(), other);
                fields
            }
            Err(e) => {
                warn!(key = %entry.key, error = %e, "Failed to serialize cache entry, dropping key");
                self.delete(&entry.key);
                return;
            }
        };
        fields.insert("ts".to_string(), Value::from(entry.timestamp));
        let value = Arc::new(Value::Object(fields));

        let schedule = {
            let mut state = self.inner.state.lock();
            state
                .mirror
                .insert(entry.key.clone(), Some(value.clone()));
            state.pending.insert(entry.key.clone(), value);
            !std::mem::replace(&mut state.flush_scheduled, true)
        };

        trace!(key = %entry.key, ts = entry.timestamp, "Cache set");
        let _ = self.inner.changes.send(entry.key.clone());

        if schedule {
            let cache = self.clone();
            self.inner
                .scheduler
                .schedule(Box::new(move || cache.flush_all()));
        }
    }

    /// Remove `key` from memory and durable storage right away.
    pub fn delete(&self, key: &str) {
        {
            let mut state = self.inner.state.lock();
            state.mirror.insert(key.to_string(), None);
            state.pending.remove(key);
        }

        {
            let _io = self.inner.io_lock.lock();
            if let Err(e) = self.inner.store.remove(key) {
                log_storage_error(key, &e);
            }
        }

        let _ = self.inner.changes.send(key.to_string());
    }

    /// Write every pending record to durable storage now.
    pub fn flush_all(&self) {
        let _io = self.inner.io_lock.lock();
        let pending = {
            let mut state = self.inner.state.lock();
            state.flush_scheduled = false;
            std::mem::take(&mut state.pending)
        };

        for (key, value) in pending {
            let raw = match serde_json::to_string(value.as_ref()) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to serialize cache record");
                    continue;
                }
            };
            match self.inner.store.write(&key, &raw) {
                Ok(()) => trace!(key = %key, bytes = raw.len(), "Flushed cache record"),
                Err(e) => log_storage_error(&key, &e),
            }
        }
    }

    /// Keys currently known under `prefix`, from storage and memory.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut found: HashSet<String> = match self.inner.store.keys() {
            Ok(keys) => keys.into_iter().filter(|k| k.starts_with(prefix)).collect(),
            Err(e) => {
                debug!(error = %e, "Failed to list durable keys");
                HashSet::new()
            }
        };

        let state = self.inner.state.lock();
        for (key, value) in &state.mirror {
            if !key.starts_with(prefix) {
                continue;
            }
            if value.is_some() {
                found.insert(key.clone());
            } else {
                found.remove(key);
            }
        }
        drop(state);

        let mut keys: Vec<String> = found.into_iter().collect();
        keys.sort();
        keys
    }

    // ===== Seasons =====

    pub fn load_seasons(&self) -> Option<CacheEntry<Seasons>> {
        self.get(keys::SEASONS)
    }

    pub fn save_seasons(&self, seasons: &Seasons) {
        self.set(keys::SEASONS, seasons);
    }

    pub fn load_selected_season(&self) -> Option<String> {
        self.get::<SelectedSeason>(keys::SELECTED_SEASON)
            .map(|e| e.payload.season_id)
            .filter(|s| !s.is_empty())
    }

    pub fn save_selected_season(&self, season_id: &str) {
        self.set(
            keys::SELECTED_SEASON,
            SelectedSeason {
                season_id: season_id.to_string(),
            },
        );
    }

    // ===== Open Matches =====

    pub fn load_open_matches(&self, season_id: &str) -> Option<CacheEntry<OpenMatches>> {
        self.get(&keys::open_matches(season_id))
    }

    pub fn save_open_matches(&self, season_id: &str, open: &OpenMatches) {
        self.set(&keys::open_matches(season_id), open);
    }

    // ===== Past Matches =====

    pub fn load_past_matches(&self, season_id: &str, page: u32) -> Option<CacheEntry<PastMatches>> {
        self.get(&keys::past_matches(season_id, page))
    }


    // ===== Match Detail =====

    pub fn load_match_detail(&self, code: &str) -> Option<CacheEntry<MatchDetailCache>> {
        self.get(&keys::match_detail(code))
    }

    // ===== Leaderboard =====

    pub fn load_leaderboard(&self, season_id: &str) -> Option<CacheEntry<LeaderboardCache>> {
        self.get(&keys::leaderboard(season_id))
    }

    pub fn save_leaderboard(&self, season_id: &str, leaderboard: &LeaderboardCache) {
        self.set(&keys::leaderboard(season_id), leaderboard);
    }

    // ===== Admin =====

    pub fn load_admin_matches(&self, season_id: &str) -> Option<CacheEntry<AdminMatches>> {
        self.get(&keys::admin_matches(season_id))
    }

    pub fn save_admin_matches(&self, season_id: &str, matches: &AdminMatches) {
        self.set(&keys::admin_matches(season_id), matches);
    }

    // ===== People =====

    pub fn load_players(&self) -> Option<CacheEntry<PlayersList>> {
        self.get(keys::PLAYERS)
    }

    pub fn load_admin_users(&self) -> Option<CacheEntry<UsersList>> {
        self.get(keys::ADMIN_USERS)
    }

    pub fn save_admin_users(&self, users: &UsersList) {
        self.set(keys::ADMIN_USERS, users);
    }

    pub fn load_current_user(&self) -> Option<CacheEntry<CurrentUser>> {
        self.get(keys::CURRENT_USER)
    }
}

fn log_storage_error(key: &str, error: &StorageError) {
    match error {
        StorageError::QuotaExceeded | StorageError::Unavailable => {
            debug!(key = %key, error = %error, "Durable storage unavailable, keeping value in memory")
        }
        StorageError::Io(_) => {
            warn!(key = %key, error = %error, "Durable storage write failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::scheduler::ManualScheduler;
    use crate::cache::store::{FileStore, MemoryStore};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        value: u32,
    }

    fn setup() -> (PersistentCache, Arc<MemoryStore>, Arc<ManualScheduler>) {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let cache = PersistentCache::new(store.clone(), scheduler.clone());
        (cache, store, scheduler)
    }

    #[test]
    fn test_writes_coalesce_to_last_value() {
        let (cache, store, scheduler) = setup();

        cache.set("k", Payload { value: 1 });
        cache.set("k", Payload { value: 2 });

        // Mirror is current before any flush
        assert_eq!(cache.get::<Payload>("k").map(|e| e.payload.value), Some(2));
        assert_eq!(store.write_count(), 0);
        assert_eq!(scheduler.pending(), 1);

        scheduler.run_pending();
        assert_eq!(store.write_count(), 1);

        let raw: Value = serde_json::from_str(&store.raw("k").expect("flushed")).expect("json");
        assert_eq!(raw["value"], json!(2));
        assert!(raw["ts"].is_i64());
    }

    #[test]
    fn test_hydrates_lazily_and_caches_absence() {
        let store = Arc::new(MemoryStore::new());
        store
            .write("k", r#"{"ts": 1000, "value": 7}"#)
            .expect("seed");
        let cache = PersistentCache::new(store.clone(), Arc::new(ManualScheduler::new()));

        let entry = cache.get::<Payload>("k").expect("hydrated");
        assert_eq!(entry.timestamp, 1000);
        assert_eq!(entry.payload.value, 7);

        assert!(cache.get::<Payload>("missing").is_none());
        // Absence is remembered, so a later durable write is not observed
        store.write("missing", r#"{"ts": 1, "value": 1}"#).expect("seed");
        assert!(cache.get::<Payload>("missing").is_none());
    }

    #[test]
    fn test_malformed_records_are_misses() {
        let store = Arc::new(MemoryStore::new());
        store.write("garbage", "not json").expect("seed");
        store.write("no_ts", r#"{"value": 1}"#).expect("seed");
        store.write("wrong_shape", r#"{"ts": 5, "value": "x"}"#).expect("seed");
        let cache = PersistentCache::new(store, Arc::new(ManualScheduler::new()));

        assert!(cache.get::<Payload>("garbage").is_none());
        assert!(cache.get::<Payload>("no_ts").is_none());
        assert!(cache.get::<Payload>("wrong_shape").is_none());
        assert_eq!(cache.timestamp("wrong_shape"), Some(5));
    }

    #[test]
    fn test_delete_drops_pending_write() {
        let (cache, store, scheduler) = setup();
        store.write("k", r#"{"ts": 1, "value": 1}"#).expect("seed");

        cache.set("k", Payload { value: 2 });
        cache.delete("k");
        assert!(cache.get::<Payload>("k").is_none());
        assert!(store.raw("k").is_none());

        scheduler.run_pending();
        assert!(store.raw("k").is_none());
    }

    #[test]
    fn test_storage_failure_degrades_to_memory() {
        let (cache, store, scheduler) = setup();
        store.set_unavailable(true);

        cache.set("k", Payload { value: 3 });
        scheduler.run_pending();
        assert_eq!(cache.get::<Payload>("k").map(|e| e.payload.value), Some(3));

        store.set_unavailable(false);
        assert!(store.raw("k").is_none());
    }

    #[test]
    fn test_quota_failure_keeps_mirror() {
        let store = Arc::new(MemoryStore::with_quota(8));
        let scheduler = Arc::new(ManualScheduler::new());
        let cache = PersistentCache::new(store.clone(), scheduler.clone());

        cache.set("k", Payload { value: 12345 });
        scheduler.run_pending();
        assert_eq!(store.write_count(), 0);
        assert_eq!(cache.get::<Payload>("k").map(|e| e.payload.value), Some(12345));
    }

    #[tokio::test]
    async fn test_set_and_delete_broadcast() {
        let (cache, _, _) = setup();
        let mut rx = cache.subscribe();

        cache.set("a", Payload { value: 1 });
        cache.delete("a");

        assert_eq!(rx.recv().await.expect("set"), "a");
        assert_eq!(rx.recv().await.expect("delete"), "a");
    }

    #[test]
    fn test_file_backed_roundtrip_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = Arc::new(ManualScheduler::new());
        let first = PersistentCache::new(
            Arc::new(FileStore::new(dir.path()).expect("store")),
            scheduler.clone(),
        );
        first.save_selected_season("S2");
        scheduler.run_pending();

        let second = PersistentCache::new(
            Arc::new(FileStore::new(dir.path()).expect("store")),
            Arc::new(ManualScheduler::new()),
        );
        assert_eq!(second.load_selected_season().as_deref(), Some("S2"));
    }

    #[test]
    fn test_keys_with_prefix_merges_memory_and_storage() {
        let (cache, store, _) = setup();
        store.write("detail:A", r#"{"ts": 1, "value": 1}"#).expect("seed");
        store.write("detail:B", r#"{"ts": 1, "value": 1}"#).expect("seed");
        store.write("other", r#"{"ts": 1, "value": 1}"#).expect("seed");

        cache.set("detail:C", Payload { value: 1 });
        cache.delete("detail:A");

        assert_eq!(cache.keys_with_prefix("detail:"), vec!["detail:B", "detail:C"]);
    }

    #[test]
    fn test_non_object_payload_replaces_previous_value() {
        let (cache, store, scheduler) = setup();

        cache.set("k", Payload { value: 1 });
        cache.set("k", vec![1u32, 2]);
        assert!(cache.get::<Payload>("k").is_none());
        assert_eq!(cache.get::<Vec<u32>>("k").map(|e| e.payload), Some(vec![1, 2]));

        scheduler.run_pending();
        let raw: Value = serde_json::from_str(&store.raw("k").expect("flushed")).expect("json");
        assert_eq!(raw["value"], json!([1, 2]));

        let reopened = PersistentCache::new(store, Arc::new(ManualScheduler::new()));
        assert_eq!(reopened.get::<Vec<u32>>("k").map(|e| e.payload), Some(vec![1, 2]));
    }

    #[test]
    fn test_unserializable_payload_drops_key() {
        let (cache, store, scheduler) = setup();
        cache.set("k", Payload { value: 1 });
        scheduler.run_pending();

        // Maps with non-string keys have no JSON form
        let mut bad = HashMap::new();
        bad.insert((1u32, 2u32), 3u32);
        cache.set("k", bad);

        assert!(cache.get::<Payload>("k").is_none());
        assert!(store.raw("k").is_none());
        scheduler.run_pending();
        assert!(store.raw("k").is_none());
    }

    /// Runs a hook right after its first physical write.
    struct HookStore {
        inner: MemoryStore,
        hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl DurableStore for HookStore {
        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.write(key, value)?;
            let hook = self.hook.lock().take();
            if let Some(hook) = hook {
                hook();
            }
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }

        fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_set_during_flush_lands_last() {
        let store = Arc::new(HookStore {
            inner: MemoryStore::new(),
            hook: Mutex::new(None),
        });
        let scheduler = Arc::new(ManualScheduler::new());
        let cache = PersistentCache::new(store.clone(), scheduler.clone());

        cache.set("k", Payload { value: 1 });
        let writer = cache.clone();
        *store.hook.lock() = Some(Box::new(move || {
            writer.set("k", Payload { value: 2 });
        }));

        assert_eq!(scheduler.run_pending(), 1);
        // The set made mid-flush queued its own flush
        assert_eq!(scheduler.pending(), 1);
        scheduler.run_pending();

        let raw: Value =
            serde_json::from_str(&store.inner.raw("k").expect("flushed")).expect("json");
        assert_eq!(raw["value"], json!(2));
        assert_eq!(store.inner.write_count(), 2);
        assert_eq!(cache.get::<Payload>("k").map(|e| e.payload.value), Some(2));
    }

    #[test]
    fn test_entry_freshness_and_age() {
        let mut entry = CacheEntry::new("k", ());
        assert!(entry.is_fresh(Duration::from_secs(60)));
        assert_eq!(entry.age_display(), "just now");

        entry.timestamp -= 2 * 60 * 60 * 1000;
        assert!(!entry.is_fresh(Duration::from_secs(60)));
        assert_eq!(entry.age_display(), "2h ago");

        entry.timestamp -= 2 * 24 * 60 * 60 * 1000;
        assert_eq!(entry.age_display(), "2d ago");
    }
}

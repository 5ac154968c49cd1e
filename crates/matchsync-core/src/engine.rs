//! The sync engine: one explicitly owned context tying the cache, the
//! request deduplicator, the busy indicator, the navigation context and the
//! remote source together.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::activity::{ActivityIndicator, BusySurface, NoopSurface};
use crate::api::{ApiError, ReadOp, RemoteDataSource, WriteOp};
use crate::cache::{
    CacheEntry, DeferredScheduler, DurableStore, FileStore, FlushScheduler, MemoryStore,
    PersistentCache,
};
use crate::config::Config;
use crate::dedup::RequestDeduplicator;
use crate::navigation::{NavigationContext, NavigationSignals};
use crate::route::{GenerationClock, Location};

/// A settled network read, shared by every caller that joined it.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub value: Arc<Value>,
    /// When the response arrived, in epoch milliseconds.
    pub fetched_at: i64,
}

struct EngineInner {
    config: Config,
    cache: PersistentCache,
    reads: RequestDeduplicator<Fetched>,
    activity: ActivityIndicator,
    navigation: NavigationContext,
    clock: GenerationClock,
    source: Arc<dyn RemoteDataSource>,
}

#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

pub struct SyncEngineBuilder {
    source: Arc<dyn RemoteDataSource>,
    config: Config,
    store: Option<Arc<dyn DurableStore>>,
    session: Option<Arc<dyn DurableStore>>,
    scheduler: Option<Arc<dyn FlushScheduler>>,
    surface: Option<Arc<dyn BusySurface>>,
    signals: NavigationSignals,
    location: Location,
}

impl SyncEngineBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Durable store for the cache. Defaults to a `FileStore` in the
    /// configured cache directory.
    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Session-scoped store. Defaults to memory.
    pub fn session(mut self, session: Arc<dyn DurableStore>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn FlushScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn busy_surface(mut self, surface: Arc<dyn BusySurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// How this load started and where it landed.
    pub fn navigation(mut self, signals: NavigationSignals, location: Location) -> Self {
        self.signals = signals;
        self.location = location;
        self
    }

    pub fn build(self) -> Result<SyncEngine> {
        let store: Arc<dyn DurableStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::new(self.config.cache_dir()?)?),
        };
        let session: Arc<dyn DurableStore> = self
            .session
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let scheduler: Arc<dyn FlushScheduler> = self
            .scheduler
            .unwrap_or_else(|| Arc::new(DeferredScheduler::new(self.config.flush_delay())));
        let surface: Arc<dyn BusySurface> = self.surface.unwrap_or_else(|| Arc::new(NoopSurface));

        let navigation = NavigationContext::init(&self.signals, &self.location, session.as_ref());
        let activity = ActivityIndicator::new(self.config.busy_delay(), surface);
        info!(
            reload = navigation.is_reload(),
            location = %self.location,
            "Sync engine ready"
        );

        Ok(SyncEngine {
            inner: Arc::new(EngineInner {
                cache: PersistentCache::new(store, scheduler),
                reads: RequestDeduplicator::new(activity.clone()),
                activity,
                navigation,
                clock: GenerationClock::new(),
                source: self.source,
                config: self.config,
            }),
        })
    }
}

impl SyncEngine {
    pub fn builder(source: Arc<dyn RemoteDataSource>) -> SyncEngineBuilder {
        SyncEngineBuilder {
            source,
            config: Config::default(),
            store: None,
            session: None,
            scheduler: None,
            surface: None,
            signals: NavigationSignals::default(),
            location: Location::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn cache(&self) -> &PersistentCache {
        &self.inner.cache
    }

    pub fn activity(&self) -> &ActivityIndicator {
        &self.inner.activity
    }

    pub fn navigation(&self) -> &NavigationContext {
        &self.inner.navigation
    }

    pub fn clock(&self) -> &GenerationClock {
        &self.inner.clock
    }

    pub fn reads_in_flight(&self) -> usize {
        self.inner.reads.in_flight()
    }

    pub fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        self.inner.cache.get(key)
    }

    /// Deduplicated network read, not cached.
    pub fn fetch(&self, op: &ReadOp) -> BoxFuture<'static, Result<Value, ApiError>> {
        let source = self.inner.source.clone();
        let owned = op.clone();
        let shared = self.inner.reads.read_through(&op.dedup_key(), move || async move {
            let value = source.read(&owned).await?;
            Ok::<_, ApiError>(Fetched {
                value: Arc::new(value),
                fetched_at: Utc::now().timestamp_millis(),
            })
        });
        async move { shared.await.map(|fetched| (*fetched.value).clone()) }.boxed()
    }

    /// Deduplicated network read that replaces the cache entry under
    /// `cache_key` with the parsed response.
    ///
    /// The cache is written once per request, from inside the shared read,
    /// so it lands even if every caller goes away. A caller that joined a
    /// plain `fetch` of the same operation writes it instead, unless the
    /// cache already holds something at least as new.
    pub fn refresh_with<P, F>(
        &self,
        cache_key: &str,
        op: &ReadOp,
        parse: F,
    ) -> BoxFuture<'static, Result<CacheEntry<P>, ApiError>>
    where
        P: Serialize + Send + 'static,
        F: Fn(Value) -> Result<P, ApiError> + Send + Sync + 'static,
    {
        let parse = Arc::new(parse);

        let shared = {
            let parse = parse.clone();
            let source = self.inner.source.clone();
            let cache = self.inner.cache.clone();
            let key = cache_key.to_string();
            let owned = op.clone();
            self.inner.reads.read_through(&op.dedup_key(), move || async move {
                let value = source.read(&owned).await?;
                let fetched_at = Utc::now().timestamp_millis();
                let payload = parse(value.clone())?;
                cache.set_entry(&CacheEntry {
                    key: key.clone(),
                    timestamp: fetched_at,
                    payload,
                });
                debug!(key = %key, op = %owned, "Refreshed cache entry");
                Ok::<_, ApiError>(Fetched {
                    value: Arc::new(value),
                    fetched_at,
                })
            })
        };

        let cache = self.inner.cache.clone();
        let key = cache_key.to_string();
        async move {
            let fetched = shared.await?;
            let entry = CacheEntry {
                key,
                timestamp: fetched.fetched_at,
                payload: parse((*fetched.value).clone())?,
            };
            if cache
                .timestamp(&entry.key)
                .map_or(true, |ts| ts < entry.timestamp)
            {
                cache.set_entry(&entry);
            }
            Ok::<_, ApiError>(entry)
        }
        .boxed()
    }

    /// [`refresh_with`](Self::refresh_with) for payloads that deserialize
    /// straight from the response.
    pub fn refresh<T>(
        &self,
        cache_key: &str,
        op: &ReadOp,
    ) -> BoxFuture<'static, Result<CacheEntry<T>, ApiError>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        self.refresh_with(cache_key, op, |value| {
            serde_json::from_value(value).map_err(ApiError::from)
        })
    }

    /// Mutations are never deduplicated, but they do count as activity.
    pub async fn write(&self, op: &WriteOp) -> Result<Value, ApiError> {
        let _busy = self.inner.activity.acquire();
        debug!(op = %op.name(), "Sending write");
        self.inner.source.write(op).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedSource;
    use super::*;
    use crate::api::endpoints;
    use crate::cache::{keys, ManualScheduler};
    use crate::models::Seasons;
    use serde_json::json;
    use std::time::Duration;

    fn engine(source: Arc<ScriptedSource>) -> SyncEngine {
        SyncEngine::builder(source)
            .store(Arc::new(MemoryStore::new()))
            .scheduler(Arc::new(ManualScheduler::new()))
            .build()
            .expect("engine")
    }

    fn seasons_response() -> Value {
        json!({"ok": true, "seasons": [{"seasonId": "S1", "name": "Spring"}], "currentSeasonId": "S1"})
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_fetch_once() {
        let source = Arc::new(ScriptedSource::new());
        source.respond("seasons", Ok(seasons_response()));
        source.set_delay(Duration::from_millis(20));
        let engine = engine(source.clone());

        let a = engine.refresh::<Seasons>(keys::SEASONS, &endpoints::seasons());
        let b = engine.refresh::<Seasons>(keys::SEASONS, &endpoints::seasons());
        let (a, b) = futures::future::join(a, b).await;
        let (a, b) = (a.expect("a"), b.expect("b"));

        assert_eq!(source.calls("seasons"), 1);
        assert_eq!(a, b);
        assert_eq!(
            engine.cache().timestamp(keys::SEASONS),
            Some(a.timestamp)
        );
        assert_eq!(engine.reads_in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_lands_after_callers_leave() {
        let source = Arc::new(ScriptedSource::new());
        source.respond("seasons", Ok(seasons_response()));
        source.set_delay(Duration::from_millis(20));
        let engine = engine(source.clone());

        drop(engine.refresh::<Seasons>(keys::SEASONS, &endpoints::seasons()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let cached = engine.cache().load_seasons().expect("cached");
        assert_eq!(cached.payload.current_season_id, "S1");
    }

    #[tokio::test]
    async fn test_refresh_failure_leaves_cache_alone() {
        let source = Arc::new(ScriptedSource::new());
        source.respond("seasons", Err(ApiError::Rejected("nope".to_string())));
        let engine = engine(source.clone());

        let err = engine
            .refresh::<Seasons>(keys::SEASONS, &endpoints::seasons())
            .await
            .expect_err("should fail");
        assert_eq!(err, ApiError::Rejected("nope".to_string()));
        assert!(engine.cache().load_seasons().is_none());
    }

    #[tokio::test]
    async fn test_malformed_response_is_invalid() {
        let source = Arc::new(ScriptedSource::new());
        source.respond("seasons", Ok(json!({"ok": true, "seasons": "oops"})));
        let engine = engine(source);

        let err = engine
            .refresh::<Seasons>(keys::SEASONS, &endpoints::seasons())
            .await
            .expect_err("should fail");
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_joining_fetch_writes_cache() {
        let source = Arc::new(ScriptedSource::new());
        source.respond("seasons", Ok(seasons_response()));
        source.set_delay(Duration::from_millis(20));
        let engine = engine(source.clone());

        let plain = engine.fetch(&endpoints::seasons());
        let cached = engine.refresh::<Seasons>(keys::SEASONS, &endpoints::seasons());
        let (plain, cached) = futures::future::join(plain, cached).await;

        assert_eq!(source.calls("seasons"), 1);
        assert_eq!(plain.expect("plain")["currentSeasonId"], json!("S1"));
        let entry = cached.expect("cached");
        assert_eq!(engine.cache().timestamp(keys::SEASONS), Some(entry.timestamp));
    }

    #[tokio::test]
    async fn test_writes_are_not_deduplicated() {
        let source = Arc::new(ScriptedSource::new());
        let engine = engine(source.clone());
        let op = endpoints::set_availability("ABC", "YES");

        let (a, b) = futures::future::join(engine.write(&op), engine.write(&op)).await;
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(source.writes(), 2);
        assert_eq!(engine.activity().outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_operations_release_activity() {
        let source = Arc::new(ScriptedSource::new());
        source.respond("seasons", Err(ApiError::ServerError("down".to_string())));
        source.respond_to_writes(Err(ApiError::Rejected("closed".to_string())));
        source.set_delay(Duration::from_millis(500));
        let engine = engine(source.clone());

        let read = engine.refresh::<Seasons>(keys::SEASONS, &endpoints::seasons());
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(engine.activity().is_visible());
        assert!(read.await.is_err());
        assert_eq!(engine.activity().outstanding(), 0);
        assert!(!engine.activity().is_visible());

        let err = engine
            .write(&endpoints::set_availability("ABC", "YES"))
            .await
            .expect_err("write should fail");
        assert_eq!(err, ApiError::Rejected("closed".to_string()));
        assert_eq!(source.writes(), 1);
        assert_eq!(engine.activity().outstanding(), 0);
    }

    #[test]
    fn test_builder_records_reload() {
        let session = Arc::new(MemoryStore::new());
        let engine = SyncEngine::builder(Arc::new(ScriptedSource::new()))
            .store(Arc::new(MemoryStore::new()))
            .session(session.clone())
            .navigation(NavigationSignals::reload(), Location::parse("#/leaderboard"))
            .build()
            .expect("engine");

        assert!(engine.navigation().is_reload_for_route("leaderboard"));
        assert_eq!(
            session.raw(crate::cache::keys::RELOAD_LOCATION).as_deref(),
            Some("#/leaderboard")
        );
    }
}

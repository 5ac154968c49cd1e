use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use matchsync_core::api::endpoints;
use matchsync_core::cache::{keys, ManualScheduler};
use matchsync_core::models::{OpenMatches, Season, Seasons};
use matchsync_core::route::Location;
use matchsync_core::{
    ApiError, App, Content, MemoryStore, NavigationOutcome, NavigationSignals, ReadOp,
    RemoteDataSource, SyncEngine, WriteOp,
};

/// Answers every read after a short delay and counts calls per operation.
#[derive(Default)]
struct SlowSource {
    calls: Mutex<HashMap<String, usize>>,
}

impl SlowSource {
    fn calls(&self, name: &str) -> usize {
        self.calls.lock().get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RemoteDataSource for SlowSource {
    async fn read(&self, op: &ReadOp) -> Result<Value, ApiError> {
        *self.calls.lock().entry(op.name().to_string()).or_insert(0) += 1;
        tokio::time::sleep(Duration::from_millis(50)).await;
        match op.name() {
            "public_open_matches" => Ok(json!({"ok": true, "matches": [
                {"publicCode": "AAA", "seasonId": "S1", "date": "2026-05-01", "time": "18:00"}
            ]})),
            "public_matches_meta" => Ok(json!({"ok": true, "fingerprint": "f1", "latestCode": "AAA"})),
            "public_match" => Ok(json!({"ok": true, "match": {"publicCode": "AAA", "seasonId": "S1"}, "availability": []})),
            "me" => Ok(json!({"ok": true, "user": {"name": "Sam", "isAdmin": false}})),
            other => Err(ApiError::NotFound(other.to_string())),
        }
    }

    async fn write(&self, _op: &WriteOp) -> Result<Value, ApiError> {
        Ok(json!({"ok": true}))
    }
}

fn seasons() -> Seasons {
    Seasons {
        seasons: vec![Season {
            season_id: "S1".to_string(),
            name: "Spring".to_string(),
        }],
        current_season_id: "S1".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_same_tick_reads_share_one_fetch() {
    let source = Arc::new(SlowSource::default());
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(ManualScheduler::new());
    let engine = SyncEngine::builder(source.clone())
        .store(store.clone())
        .scheduler(scheduler.clone())
        .build()
        .expect("engine");
    let key = keys::open_matches("S1");
    let mut changes = engine.cache().subscribe();

    let first = engine.refresh::<OpenMatches>(&key, &endpoints::open_matches("S1"));
    let second = engine.refresh::<OpenMatches>(&key, &endpoints::open_matches("S1"));
    assert_eq!(engine.reads_in_flight(), 1);

    let (first, second) = futures::future::join(first, second).await;
    let (first, second) = (first.expect("first"), second.expect("second"));

    assert_eq!(source.calls("public_open_matches"), 1);
    assert_eq!(first.payload, second.payload);
    assert_eq!(first.timestamp, second.timestamp);
    assert_eq!(engine.reads_in_flight(), 0);

    // One broadcast for the key, so one re-render downstream.
    assert_eq!(changes.try_recv().ok().as_deref(), Some(key.as_str()));
    assert!(changes.try_recv().is_err());

    scheduler.run_pending();
    assert_eq!(store.write_count(), 1);
    let raw: Value = serde_json::from_str(&store.raw(&key).expect("persisted")).expect("json");
    assert_eq!(raw["ts"], json!(first.timestamp));
    assert_eq!(raw["matches"][0]["publicCode"], "AAA");
}

#[tokio::test(start_paused = true)]
async fn test_reload_warmup_and_render_share_one_fetch() {
    let source = Arc::new(SlowSource::default());
    let engine = SyncEngine::builder(source.clone())
        .store(Arc::new(MemoryStore::new()))
        .scheduler(Arc::new(ManualScheduler::new()))
        .navigation(NavigationSignals::reload(), Location::parse("#/match"))
        .build()
        .expect("engine");
    engine.cache().save_seasons(&seasons());

    let app = App::new(engine.clone());
    app.auth().store_token("t-1");

    let outcome = app.start(Some(Location::parse("#/match"))).await;
    assert_eq!(outcome, NavigationOutcome::Rendered);
    assert_eq!(source.calls("public_open_matches"), 1);

    match app.router().container("match").map(|c| c.content()) {
        Some(Content::Ready(value)) => {
            assert_eq!(value["view"], "list");
            assert_eq!(value["matches"][0]["publicCode"], "AAA");
        }
        other => panic!("expected the match list, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(source.calls("public_matches_meta"), 1);
    assert_eq!(source.calls("public_open_matches"), 1);
}

//! Background cache warm-up.
//!
//! Warming happens only after a browser reload, and only for the route that
//! was reloaded; other tabs fill their caches when they are first visited.
//! Fingerprint records are left to the staleness reconciler.

use tracing::debug;

use crate::api::endpoints;
use crate::cache::keys;
use crate::engine::SyncEngine;
use crate::models::{pick_selected_season, Leaderboard, LeaderboardCache, OpenMatches};
use crate::views::refresh_match_detail;

/// Start refreshes for the reloaded route's stale caches. Returns the cache
/// keys being warmed.
///
/// Refreshes are shared reads: they run to completion in the background, and
/// a view rendering the same key joins them instead of fetching again.
pub fn warm_on_reload(engine: &SyncEngine) -> Vec<String> {
    let Some(location) = engine.navigation().reloaded_location() else {
        return Vec::new();
    };
    let cache = engine.cache();
    let Some(season_id) = cache
        .load_seasons()
        .and_then(|e| pick_selected_season(&e.payload, cache.load_selected_season().as_deref()))
    else {
        debug!("No cached seasons, nothing to warm");
        return Vec::new();
    };
    let ttl = &engine.config().ttl;

    let mut warmed = Vec::new();
    match location.route() {
        "match" if location.param("code").is_none() => {
            let key = keys::open_matches(&season_id);
            let fresh = cache
                .load_open_matches(&season_id)
                .is_some_and(|e| e.is_fresh(ttl.open_matches()));
            if !fresh {
                drop(engine.refresh::<OpenMatches>(&key, &endpoints::open_matches(&season_id)));
                warmed.push(key);
            }
        }
        "leaderboard" => {
            let key = keys::leaderboard(&season_id);
            let fresh = cache
                .load_leaderboard(&season_id)
                .is_some_and(|e| e.is_fresh(ttl.leaderboard()));
            if !fresh {
                drop(engine.refresh_with(&key, &endpoints::leaderboard(&season_id), |value| {
                    let data: Leaderboard = serde_json::from_value(value)?;
                    Ok(LeaderboardCache { data })
                }));
                warmed.push(key);
            }
        }
        _ => {}
    }

    if !warmed.is_empty() {
        debug!(location = %location, keys = ?warmed, "Warming caches after reload");
    }
    warmed
}

/// Fetch the details of listed open matches that are not cached yet.
/// Returns how many fetches were started.
pub fn prefetch_open_match_details(engine: &SyncEngine, open: &OpenMatches) -> usize {
    let mut started = 0;
    for summary in &open.matches {
        let code = summary.public_code.trim();
        if code.is_empty() || engine.cache().contains(&keys::match_detail(code)) {
            continue;
        }
        drop(refresh_match_detail(engine, code));
        started += 1;
    }
    if started > 0 {
        debug!(count = started, "Prefetching open match details");
    }
    started
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, ManualScheduler, MemoryStore};
    use crate::engine::testing::ScriptedSource;
    use crate::models::{Season, Seasons};
    use crate::navigation::NavigationSignals;
    use crate::route::Location;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(source: Arc<ScriptedSource>, signals: NavigationSignals, at: &str) -> SyncEngine {
        let engine = SyncEngine::builder(source)
            .store(Arc::new(MemoryStore::new()))
            .scheduler(Arc::new(ManualScheduler::new()))
            .navigation(signals, Location::parse(at))
            .build()
            .expect("engine");
        engine.cache().save_seasons(&Seasons {
            seasons: vec![Season {
                season_id: "S1".to_string(),
                name: "Spring".to_string(),
            }],
            current_season_id: "S1".to_string(),
        });
        engine
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_warmed_without_reload() {
        let source = Arc::new(ScriptedSource::new());
        let engine = engine(source.clone(), NavigationSignals::navigate(), "#/match");
        assert!(warm_on_reload(&engine).is_empty());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls("public_open_matches"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_warms_only_reloaded_route() {
        let source = Arc::new(ScriptedSource::new());
        source.respond("public_open_matches", Ok(json!({"ok": true, "matches": []})));
        let engine = engine(source.clone(), NavigationSignals::reload(), "#/match");

        assert_eq!(warm_on_reload(&engine), vec![keys::open_matches("S1")]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls("public_open_matches"), 1);
        assert_eq!(source.calls("leaderboard_season"), 0);
        assert_eq!(source.calls("public_matches_meta"), 0);
        assert!(engine.cache().load_open_matches("S1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_cache_is_not_warmed() {
        let source = Arc::new(ScriptedSource::new());
        let engine = engine(source.clone(), NavigationSignals::reload(), "#/leaderboard");
        engine.cache().save_leaderboard("S1", &LeaderboardCache::default());
        assert!(warm_on_reload(&engine).is_empty());

        let mut stale = CacheEntry::new(keys::leaderboard("S1"), LeaderboardCache::default());
        stale.timestamp -= 10 * 60 * 1000;
        engine.cache().set_entry(&stale);
        assert_eq!(warm_on_reload(&engine), vec![keys::leaderboard("S1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_prefetch_skips_cached_codes() {
        let source = Arc::new(ScriptedSource::new());
        source.respond(
            "public_match",
            Ok(json!({"ok": true, "match": {"publicCode": "AAA"}, "availability": []})),
        );
        let engine = engine(source.clone(), NavigationSignals::navigate(), "#/match");
        let open: OpenMatches = serde_json::from_value(json!({"matches": [
            {"publicCode": "AAA"}, {"publicCode": ""}, {"publicCode": "BBB"}
        ]}))
        .expect("open");
        engine.cache().set(&keys::match_detail("BBB"), json!({"data": {}}));

        assert_eq!(prefetch_open_match_details(&engine, &open), 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls("public_match"), 1);
        assert!(engine.cache().load_match_detail("AAA").is_some());
    }
}

use tracing::debug;

use crate::api::endpoints;
use crate::cache::keys;
use crate::engine::SyncEngine;
use crate::models::{pick_selected_season, Seasons};
use crate::policy::{FetchDecision, FetchPolicy};

/// The season every per-season view should show, loading the season list
/// when nothing usable is cached. The choice is remembered.
pub(crate) async fn resolve_season(engine: &SyncEngine) -> anyhow::Result<Option<String>> {
    let cache = engine.cache();
    let cached = cache
        .load_seasons()
        .filter(|e| !e.payload.seasons.is_empty());
    let policy = FetchPolicy::Ttl(engine.config().ttl.seasons());

    let seasons: Seasons = match policy.decide(cached.as_ref(), false) {
        FetchDecision::FetchNow => {
            engine
                .refresh::<Seasons>(keys::SEASONS, &endpoints::seasons())
                .await?
                .payload
        }
        FetchDecision::RevalidateInBackground => {
            debug!("Season list is stale, refreshing in background");
            // The shared read keeps running and lands in the cache.
            drop(engine.refresh::<Seasons>(keys::SEASONS, &endpoints::seasons()));
            cached.map(|e| e.payload).unwrap_or_default()
        }
        FetchDecision::UseCache => cached.map(|e| e.payload).unwrap_or_default(),
    };

    let stored = cache.load_selected_season();
    let selected = pick_selected_season(&seasons, stored.as_deref());
    if let Some(season_id) = &selected {
        if stored.as_deref() != Some(season_id.as_str()) {
            cache.save_selected_season(season_id);
        }
    }
    Ok(selected)
}

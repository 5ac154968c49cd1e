use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use crate::api::{endpoints, ApiError};
use crate::cache::{keys, CacheEntry};
use crate::engine::SyncEngine;
use crate::models::PlayersList;
use crate::policy::{FetchDecision, FetchPolicy};

#[derive(Debug, Deserialize)]
struct NamedPlayer {
    #[serde(default)]
    name: String,
}

/// `players` answers `{ok, players: [{name, ...}]}`.
#[derive(Debug, Deserialize)]
struct PlayersResponse {
    #[serde(default)]
    players: Vec<NamedPlayer>,
}

/// Fetch the player names into the cache, sorted and de-duplicated.
pub fn refresh_players(
    engine: &SyncEngine,
) -> BoxFuture<'static, Result<CacheEntry<PlayersList>, ApiError>> {
    engine.refresh_with(keys::PLAYERS, &endpoints::players(), |value| {
        let response: PlayersResponse = serde_json::from_value(value)?;
        Ok(PlayersList::from_names(response.players.into_iter().map(|p| p.name)))
    })
}

/// Player names for pickers. A cached list is used as is and refreshed in
/// the background once it is older than the players TTL; an empty cache
/// waits for the network.
pub async fn load_players(engine: &SyncEngine) -> Result<PlayersList, ApiError> {
    let cached = engine
        .cache()
        .load_players()
        .filter(|e| !e.payload.players.is_empty());
    let policy = FetchPolicy::Ttl(engine.config().ttl.players());

    match (policy.decide(cached.as_ref(), false), cached) {
        (FetchDecision::UseCache, Some(entry)) => Ok(entry.payload),
        (FetchDecision::RevalidateInBackground, Some(entry)) => {
            debug!(age = %entry.age_display(), "Player list is stale, refreshing in background");
            drop(refresh_players(engine));
            Ok(entry.payload)
        }
        _ => Ok(refresh_players(engine).await?.payload),
    }
}

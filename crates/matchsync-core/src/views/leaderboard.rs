use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use super::season::resolve_season;
use crate::api::{endpoints, ApiError};
use crate::auth::AuthSession;
use crate::cache::{keys, CacheEntry};
use crate::engine::SyncEngine;
use crate::models::{Leaderboard, LeaderboardCache, LeaderboardSort};
use crate::policy::{FetchDecision, FetchPolicy};
use crate::route::{Content, RenderContext, View};

fn parse_sort(raw: Option<&str>) -> LeaderboardSort {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("assists") => LeaderboardSort::Assists,
        Some("rating") => LeaderboardSort::Rating,
        _ => LeaderboardSort::Goals,
    }
}

/// Season leaderboard. Served from the cache and refreshed only when the
/// browser reload happened on this route or nothing is cached yet.
#[derive(Clone)]
pub struct LeaderboardView {
    engine: SyncEngine,
    auth: Option<Arc<AuthSession>>,
}

impl LeaderboardView {
    pub fn new(engine: SyncEngine, auth: Option<Arc<AuthSession>>) -> Self {
        Self { engine, auth }
    }

    /// Ratings are shown to admins only.
    fn show_rating(&self) -> bool {
        self.auth
            .as_ref()
            .and_then(|a| a.current_user())
            .is_some_and(|u| u.is_admin)
    }

    fn content(
        &self,
        season_id: &str,
        sort: LeaderboardSort,
        entry: &CacheEntry<LeaderboardCache>,
    ) -> Content {
        let show_rating = self.show_rating();
        let rows = entry.payload.data.sorted(sort, show_rating);
        Content::Ready(json!({
            "view": "leaderboard",
            "seasonId": season_id,
            "showRating": show_rating,
            "rows": rows,
            "updated": entry.age_display(),
        }))
    }

    /// Fetch the season's leaderboard into the cache. The read keeps going
    /// if the returned future is dropped.
    pub fn refresh(
        &self,
        season_id: &str,
    ) -> BoxFuture<'static, Result<CacheEntry<LeaderboardCache>, ApiError>> {
        self.engine.refresh_with(
            &keys::leaderboard(season_id),
            &endpoints::leaderboard(season_id),
            |value| {
                let data: Leaderboard = serde_json::from_value(value)?;
                Ok(LeaderboardCache { data })
            },
        )
    }
}

#[async_trait]
impl View for LeaderboardView {
    async fn render(&self, ctx: &RenderContext) -> anyhow::Result<()> {
        let Some(season_id) = resolve_season(&self.engine).await? else {
            ctx.commit(Content::Ready(json!({"view": "leaderboard", "rows": []})));
            return Ok(());
        };
        let sort = parse_sort(ctx.param("sort"));
        ctx.bind_key(keys::leaderboard(&season_id));

        let cached = self.engine.cache().load_leaderboard(&season_id);
        let reload_here = self.engine.navigation().is_reload_for_route("leaderboard");

        match (
            FetchPolicy::ReloadRefresh.decide(cached.as_ref(), reload_here),
            cached,
        ) {
            (FetchDecision::UseCache, Some(entry)) => {
                ctx.commit(self.content(&season_id, sort, &entry));
            }
            (FetchDecision::RevalidateInBackground, Some(entry)) => {
                ctx.commit(self.content(&season_id, sort, &entry));
                let refresh = self.refresh(&season_id);
                let view = self.clone();
                let bg_ctx = ctx.clone();
                tokio::spawn(async move {
                    match refresh.await {
                        Ok(fresh) => {
                            bg_ctx.commit(view.content(&season_id, sort, &fresh));
                        }
                        // Keep showing the cached rows.
                        Err(e) => debug!(season = %season_id, error = %e, "Leaderboard refresh failed"),
                    }
                });
            }
            _ => {
                let entry = self.refresh(&season_id).await?;
                ctx.commit(self.content(&season_id, sort, &entry));
            }
        }
        Ok(())
    }
}

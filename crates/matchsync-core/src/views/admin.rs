//! The `admin` route: the season's match list (`view=open|past`), one
//! match's management page (`view=manage&code=..`) and the user list
//! (`view=users`).
//!
//! Lists come from the cache and are refetched only after a browser reload
//! on a list view, or when nothing is cached yet. The user list is fetched
//! on its first visit per app run and after a reload on this route.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::follow_cache;
use super::matches::refresh_match_detail;
use super::players::load_players;
use super::season::resolve_season;
use crate::api::{endpoints, ApiError};
use crate::cache::{keys, CacheEntry};
use crate::engine::SyncEngine;
use crate::models::{AdminMatches, MatchDetailCache, PlayersList, UsersList};
use crate::policy::{FetchDecision, FetchPolicy};
use crate::route::{Container, Content, RenderContext, View};

#[derive(Clone)]
struct AdminState {
    engine: SyncEngine,
    showing_past: Arc<AtomicBool>,
}

impl AdminState {
    fn list_content(&self, season_id: &str, entry: &CacheEntry<AdminMatches>) -> Content {
        let past = self.showing_past.load(Ordering::SeqCst);
        Content::Ready(json!({
            "view": if past { "past" } else { "open" },
            "seasonId": season_id,
            "matches": entry.payload.with_status(!past),
            "updated": entry.age_display(),
        }))
    }

    fn manage_content(&self, entry: &CacheEntry<MatchDetailCache>, players: &PlayersList) -> Content {
        let detail = &entry.payload.data;
        Content::Ready(json!({
            "view": "manage",
            "code": detail.summary.public_code,
            "match": detail.summary,
            "availability": detail.availability,
            "players": players.players,
            "updated": entry.age_display(),
        }))
    }

    fn users_content(&self, entry: &CacheEntry<UsersList>) -> Content {
        Content::Ready(json!({
            "view": "users",
            "users": entry.payload.users,
            "updated": entry.age_display(),
        }))
    }

    fn content_for_key(&self, key: &str) -> Option<Content> {
        let cache = self.engine.cache();
        if let Some(season_id) = key.strip_prefix(keys::ADMIN_MATCHES_PREFIX) {
            let entry = cache.load_admin_matches(season_id)?;
            return Some(self.list_content(season_id, &entry));
        }
        if let Some(code) = key.strip_prefix(keys::MATCH_DETAIL_PREFIX) {
            let entry = cache.load_match_detail(code)?;
            let players = cache.load_players().map(|e| e.payload).unwrap_or_default();
            return Some(self.manage_content(&entry, &players));
        }
        if key == keys::ADMIN_USERS {
            let entry = cache.load_admin_users()?;
            return Some(self.users_content(&entry));
        }
        None
    }
}

pub struct AdminView {
    state: AdminState,
    users_loaded: AtomicBool,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl AdminView {
    pub fn new(engine: SyncEngine) -> Self {
        Self {
            state: AdminState {
                engine,
                showing_past: Arc::new(AtomicBool::new(false)),
            },
            users_loaded: AtomicBool::new(false),
            follower: Mutex::new(None),
        }
    }

    fn attach(&self, container: &Container) {
        let mut follower = self.follower.lock();
        if follower.is_none() {
            let state = self.state.clone();
            *follower = Some(follow_cache(
                self.state.engine.cache(),
                container.clone(),
                move |key| state.content_for_key(key),
            ));
        }
    }

    async fn render_list(&self, ctx: &RenderContext, past: bool) -> anyhow::Result<()> {
        let engine = &self.state.engine;
        self.state.showing_past.store(past, Ordering::SeqCst);
        let Some(season_id) = resolve_season(engine).await? else {
            ctx.commit(Content::Ready(json!({"view": "open", "seasonId": null, "matches": []})));
            return Ok(());
        };

        let key = keys::admin_matches(&season_id);
        ctx.bind_key(key.clone());
        let op = endpoints::admin_list_matches(&season_id);
        let cached = engine.cache().load_admin_matches(&season_id);
        let reload_here = engine.navigation().is_reload_for_admin_list();

        match (
            FetchPolicy::ReloadRefresh.decide(cached.as_ref(), reload_here),
            cached,
        ) {
            (FetchDecision::UseCache, Some(entry)) => {
                ctx.commit(self.state.list_content(&season_id, &entry));
            }
            (FetchDecision::RevalidateInBackground, Some(entry)) => {
                ctx.commit(self.state.list_content(&season_id, &entry));
                let refresh = engine.refresh::<AdminMatches>(&key, &op);
                let state = self.state.clone();
                let bg_ctx = ctx.clone();
                tokio::spawn(async move {
                    match refresh.await {
                        Ok(fresh) => {
                            bg_ctx.commit(state.list_content(&season_id, &fresh));
                        }
                        Err(e) => debug!(season = %season_id, error = %e, "Admin list refresh failed"),
                    }
                });
            }
            _ => {
                let entry = engine.refresh::<AdminMatches>(&key, &op).await?;
                ctx.commit(self.state.list_content(&season_id, &entry));
            }
        }
        Ok(())
    }

    async fn render_manage(&self, ctx: &RenderContext, code: &str) -> anyhow::Result<()> {
        let engine = &self.state.engine;
        ctx.bind_key(keys::match_detail(code));

        let players = match load_players(engine).await {
            Ok(players) => players,
            Err(e) => {
                debug!(error = %e, "Player list unavailable");
                PlayersList::default()
            }
        };
        let cached = engine.cache().load_match_detail(code);
        let reload_here = engine.navigation().is_reload_for_admin_match_code(code);

        match (
            FetchPolicy::ReloadRefresh.decide(cached.as_ref(), reload_here),
            cached,
        ) {
            (FetchDecision::UseCache, Some(entry)) => {
                ctx.commit(self.state.manage_content(&entry, &players));
            }
            (FetchDecision::RevalidateInBackground, Some(entry)) => {
                ctx.commit(self.state.manage_content(&entry, &players));
                let refresh = refresh_match_detail(engine, code);
                let state = self.state.clone();
                let bg_ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Ok(fresh) = refresh.await {
                        bg_ctx.commit(state.manage_content(&fresh, &players));
                    }
                });
            }
            _ => {
                let entry = refresh_match_detail(engine, code).await?;
                ctx.commit(self.state.manage_content(&entry, &players));
            }
        }
        Ok(())
    }

    async fn render_users(&self, ctx: &RenderContext) -> anyhow::Result<()> {
        let engine = &self.state.engine;
        ctx.bind_key(keys::ADMIN_USERS);

        let first_visit = !self.users_loaded.swap(true, Ordering::SeqCst);
        let policy = if first_visit || engine.navigation().is_reload_for_route("admin") {
            FetchPolicy::Always
        } else {
            FetchPolicy::CacheFirst
        };

        let cached = engine.cache().load_admin_users();
        let entry = match (policy.decide(cached.as_ref(), false), cached) {
            (FetchDecision::UseCache, Some(entry)) => entry,
            _ => {
                engine
                    .refresh::<UsersList>(keys::ADMIN_USERS, &endpoints::admin_users())
                    .await?
            }
        };
        ctx.commit(self.state.users_content(&entry));
        Ok(())
    }

    // ===== Admin actions =====

    /// Delete a match, then drop it from the cached list so the list redraws
    /// without a refetch.
    pub async fn delete_match(&self, season_id: &str, match_id: &str) -> Result<(), ApiError> {
        let engine = &self.state.engine;
        engine.write(&endpoints::admin_delete_match(match_id)).await?;

        if let Some(entry) = engine.cache().load_admin_matches(season_id) {
            let mut matches = entry.payload;
            if matches.remove(match_id) {
                engine.cache().save_admin_matches(season_id, &matches);
            }
        }
        Ok(())
    }

    /// Record a player's availability on their behalf, then refetch the
    /// match detail.
    pub async fn set_availability_for(
        &self,
        code: &str,
        match_id: &str,
        player_name: &str,
        availability: &str,
        note: &str,
    ) -> Result<(), ApiError> {
        let engine = &self.state.engine;
        engine
            .write(&endpoints::admin_set_availability_for(
                match_id,
                player_name,
                availability,
                note,
            ))
            .await?;
        if let Err(e) = refresh_match_detail(engine, code).await {
            warn!(code = %code, error = %e, "Availability saved but detail refresh failed");
        }
        Ok(())
    }
}

impl Drop for AdminView {
    fn drop(&mut self) {
        if let Some(follower) = self.follower.lock().take() {
            follower.abort();
        }
    }
}

#[async_trait]
impl View for AdminView {
    async fn render(&self, ctx: &RenderContext) -> anyhow::Result<()> {
        self.attach(&ctx.container);
        let view = ctx
            .param("view")
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "open".to_string());
        match (view.as_str(), ctx.param("code")) {
            ("users", _) => self.render_users(ctx).await,
            ("manage", Some(code)) if !code.is_empty() => self.render_manage(ctx, code).await,
            (other, _) => self.render_list(ctx, other == "past").await,
        }
    }
}

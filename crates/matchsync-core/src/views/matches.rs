//! The `match` route: the open-match list of the selected season, or one
//! match's detail when the location carries `code`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::follow_cache;
use super::season::resolve_season;
use crate::api::{endpoints, ApiError};
use crate::cache::{keys, CacheEntry, PersistentCache};
use crate::engine::SyncEngine;
use crate::models::{
    Availability, MatchDetail, MatchDetailCache, MatchSummary, OpenMatches, PastMatches,
};
use crate::policy::{FetchDecision, FetchPolicy};
use crate::prefetch::prefetch_open_match_details;
use crate::route::{Container, Content, Location, RenderContext, View};
use crate::staleness::{
    CheckOutcome, CheckReason, ReconcileScope, StalenessReconciler, StalenessRecord,
};

/// Past matches are fetched one page at a time, on demand only.
const PAST_PAGE_SIZE: u32 = 20;

/// Fingerprint last recorded for a season, if any.
fn season_fingerprint(cache: &PersistentCache, season_id: &str) -> Option<String> {
    cache
        .get::<StalenessRecord>(&keys::matches_meta(season_id))
        .map(|e| e.payload.fingerprint)
        .filter(|fp| !fp.is_empty())
}

/// Fetch one match detail into the cache, stamped with the fingerprint its
/// season had when it was fetched.
pub fn refresh_match_detail(
    engine: &SyncEngine,
    code: &str,
) -> BoxFuture<'static, Result<CacheEntry<MatchDetailCache>, ApiError>> {
    let cache = engine.cache().clone();
    engine.refresh_with(
        &keys::match_detail(code),
        &endpoints::public_match(code),
        move |value| {
            let data: MatchDetail = serde_json::from_value(value)?;
            let meta_fingerprint =
                season_fingerprint(&cache, &data.summary.season_id).unwrap_or_default();
            Ok(MatchDetailCache {
                data,
                meta_fingerprint,
            })
        },
    )
}

fn detail_content(entry: &CacheEntry<MatchDetailCache>) -> Content {
    let detail = &entry.payload.data;
    let (available, unavailable): (Vec<_>, Vec<_>) =
        detail.availability.iter().partition(|a| a.is_yes());
    let names = |list: Vec<&Availability>| -> Vec<String> {
        list.into_iter().map(|a| a.player_name.clone()).collect()
    };
    Content::Ready(json!({
        "view": "detail",
        "code": detail.summary.public_code,
        "match": detail.summary,
        "home": detail.summary.team_label(true),
        "away": detail.summary.team_label(false),
        "result": detail.summary.result_label(),
        "available": names(available),
        "unavailable": names(unavailable),
        "updated": entry.age_display(),
    }))
}

/// Shared between the view and its background tasks.
#[derive(Clone)]
struct MatchState {
    engine: SyncEngine,
    reconciler: Arc<StalenessReconciler>,
}

impl MatchState {
    fn list_content(&self, season_id: &str, entry: &CacheEntry<OpenMatches>) -> Content {
        let scope = ReconcileScope::open_matches(season_id);
        let matches: Vec<&MatchSummary> = entry.payload.sorted_for_display();
        let past = self.engine.cache().load_past_matches(season_id, 1);
        let past_stale = past
            .as_ref()
            .map_or(true, |e| !e.is_fresh(self.engine.config().ttl.past_matches()));
        Content::Ready(json!({
            "view": "list",
            "seasonId": season_id,
            "latestCode": entry.payload.latest_code(),
            "matches": matches,
            "updated": entry.age_display(),
            "update": self.reconciler.affordance(&scope),
            "past": past.as_ref().map(|e| &e.payload.matches),
            "pastStale": past_stale,
        }))
    }

    fn content_for_key(&self, key: &str) -> Option<Content> {
        let cache = self.engine.cache();
        if let Some(season_id) = key.strip_prefix(keys::OPEN_MATCHES_PREFIX) {
            let entry = cache.load_open_matches(season_id)?;
            return Some(self.list_content(season_id, &entry));
        }
        if let Some(code) = key.strip_prefix(keys::MATCH_DETAIL_PREFIX) {
            let entry = cache.load_match_detail(code)?;
            return Some(detail_content(&entry));
        }
        None
    }

    /// Run a fingerprint check, then redraw the list so the update prompt
    /// matches the outcome.
    fn spawn_check(&self, ctx: &RenderContext, season_id: &str, reason: CheckReason) {
        let state = self.clone();
        let ctx = ctx.clone();
        let season_id = season_id.to_string();
        tokio::spawn(async move {
            let scope = ReconcileScope::open_matches(&season_id);
            let outcome = state.reconciler.check(&scope, reason).await;
            if matches!(outcome, CheckOutcome::Skipped(_)) {
                return;
            }
            if let Some(entry) = state.engine.cache().load_open_matches(&season_id) {
                ctx.commit(state.list_content(&season_id, &entry));
            }
        });
    }
}

pub struct MatchView {
    state: MatchState,
    container: Mutex<Option<Container>>,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl MatchView {
    pub fn new(engine: SyncEngine, reconciler: Arc<StalenessReconciler>) -> Self {
        Self {
            state: MatchState { engine, reconciler },
            container: Mutex::new(None),
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
            *self.container.lock() = Some(container.clone());
        }
    }

    async fn render_list(&self, ctx: &RenderContext) -> anyhow::Result<()> {
        let engine = &self.state.engine;
        let Some(season_id) = resolve_season(engine).await? else {
            ctx.commit(Content::Ready(json!({
                "view": "list",
                "seasonId": null,
                "matches": [],
            })));
            return Ok(());
        };

        let key = keys::open_matches(&season_id);
        ctx.bind_key(key.clone());
        let op = endpoints::open_matches(&season_id);
        // An empty list is treated as never filled.
        let cached = engine
            .cache()
            .load_open_matches(&season_id)
            .filter(|e| !e.payload.matches.is_empty());
        let reload_here = engine.navigation().is_reload_for_match_list();

        let listing = match (
            FetchPolicy::ReloadRefresh.decide(cached.as_ref(), reload_here),
            cached,
        ) {
            (FetchDecision::UseCache, Some(entry)) => {
                ctx.commit(self.state.list_content(&season_id, &entry));
                entry.payload
            }
            (FetchDecision::RevalidateInBackground, Some(entry)) => {
                ctx.commit(self.state.list_content(&season_id, &entry));
                let refresh = engine.refresh::<OpenMatches>(&key, &op);
                let state = self.state.clone();
                let bg_ctx = ctx.clone();
                let bg_season = season_id.clone();
                tokio::spawn(async move {
                    match refresh.await {
                        Ok(fresh) => {
                            bg_ctx.commit(state.list_content(&bg_season, &fresh));
                        }
                        Err(e) => debug!(season = %bg_season, error = %e, "Background refresh failed"),
                    }
                });
                entry.payload
            }
            _ => {
                let entry = engine.refresh::<OpenMatches>(&key, &op).await?;
                ctx.commit(self.state.list_content(&season_id, &entry));
                entry.payload
            }
        };

        if reload_here {
            prefetch_open_match_details(engine, &listing);
        }
        self.state.spawn_check(ctx, &season_id, CheckReason::Load);
        Ok(())
    }

    async fn render_detail(&self, ctx: &RenderContext, code: &str) -> anyhow::Result<()> {
        let engine = &self.state.engine;
        ctx.bind_key(keys::match_detail(code));

        let cached = engine.cache().load_match_detail(code);
        let drifted = cached.as_ref().is_some_and(|e| {
            season_fingerprint(engine.cache(), &e.payload.data.summary.season_id)
                .is_some_and(|fp| fp != e.payload.meta_fingerprint)
        });
        let reload_here = engine.navigation().is_reload_for_match_code(code);
        if drifted {
            debug!(code = %code, "Season fingerprint moved since detail was cached");
        }

        match (
            FetchPolicy::ReloadRefresh.decide(cached.as_ref(), reload_here || drifted),
            cached,
        ) {
            (FetchDecision::UseCache, Some(entry)) => {
                ctx.commit(detail_content(&entry));
            }
            (FetchDecision::RevalidateInBackground, Some(entry)) => {
                ctx.commit(detail_content(&entry));
                let refresh = refresh_match_detail(engine, code);
                let bg_ctx = ctx.clone();
                let bg_code = code.to_string();
                tokio::spawn(async move {
                    match refresh.await {
                        Ok(fresh) => {
                            bg_ctx.commit(detail_content(&fresh));
                        }
                        Err(e) => debug!(code = %bg_code, error = %e, "Background refresh failed"),
                    }
                });
            }
            _ => {
                let entry = refresh_match_detail(engine, code).await?;
                ctx.commit(detail_content(&entry));
            }
        }
        Ok(())
    }

    // ===== User intents =====

    /// Fetch the full list behind the shown update prompt. Returns whether a
    /// prompt was applied; the list redraws through the cache.
    pub async fn apply_update(&self, season_id: &str) -> Result<bool, ApiError> {
        let scope = ReconcileScope::open_matches(season_id);
        let applied = self.state.reconciler.apply_update(&scope).await?;
        Ok(applied.is_some())
    }

    /// Where "open latest" leads, if the prompt is shown.
    pub fn open_latest(&self, season_id: &str) -> Option<Location> {
        self.state
            .reconciler
            .open_latest(&ReconcileScope::open_matches(season_id))
    }

    pub fn dismiss_update(&self, season_id: &str) {
        self.state
            .reconciler
            .dismiss(&ReconcileScope::open_matches(season_id));
        self.redraw_list(season_id);
    }

    /// Fingerprint check outside of navigation, e.g. when the app comes back
    /// to the foreground or on a timer. `None` when no season is selected.
    pub async fn check_for_updates(&self, reason: CheckReason) -> Option<CheckOutcome> {
        let season_id = self.state.engine.cache().load_selected_season()?;
        let scope = ReconcileScope::open_matches(&season_id);
        let outcome = self.state.reconciler.check(&scope, reason).await;
        if !matches!(outcome, CheckOutcome::Skipped(_)) {
            self.redraw_list(&season_id);
        }
        Some(outcome)
    }

    /// Fetch the first page of past matches, then redraw the list to show it.
    /// Always goes to the network; a cached page is only shown, never reused.
    pub async fn refresh_past(&self, season_id: &str) -> Result<usize, ApiError> {
        let engine = &self.state.engine;
        let key = keys::past_matches(season_id, 1);
        let entry = engine
            .refresh::<PastMatches>(&key, &endpoints::past_matches(season_id, 1, PAST_PAGE_SIZE))
            .await?;
        self.redraw_list(season_id);
        Ok(entry.payload.matches.len())
    }

    /// Redraw the list if the container still shows it.
    fn redraw_list(&self, season_id: &str) {
        let key = keys::open_matches(season_id);
        let container = self.container.lock().clone();
        if let (Some(container), Some(content)) = (container, self.state.content_for_key(&key)) {
            container.refresh_from(&key, content);
        }
    }

    /// Post the user's availability, then refetch the detail so the cache
    /// (and the view following it) reflects the change.
    pub async fn set_availability(&self, code: &str, availability: &str) -> Result<(), ApiError> {
        let engine = &self.state.engine;
        engine
            .write(&endpoints::set_availability(code, availability))
            .await?;
        if let Err(e) = refresh_match_detail(engine, code).await {
            warn!(code = %code, error = %e, "Availability saved but detail refresh failed");
        }
        Ok(())
    }

    /// Captain score entry. `mode` is passed through as the backend expects it.
    pub async fn submit_score(
        &self,
        code: &str,
        mode: &str,
        score_a: u32,
        score_b: u32,
    ) -> Result<(), ApiError> {
        let engine = &self.state.engine;
        engine
            .write(&endpoints::captain_submit_score(code, mode, score_a, score_b))
            .await?;
        if let Err(e) = refresh_match_detail(engine, code).await {
            warn!(code = %code, error = %e, "Score saved but detail refresh failed");
        }
        Ok(())
    }
}

impl Drop for MatchView {
    fn drop(&mut self) {
        if let Some(follower) = self.follower.lock().take() {
            follower.abort();
        }
    }
}

#[async_trait]
impl View for MatchView {
    async fn render(&self, ctx: &RenderContext) -> anyhow::Result<()> {
        self.attach(&ctx.container);
        match ctx.param("code") {
            Some(code) => self.render_detail(ctx, code).await,
            None => self.render_list(ctx).await,
        }
    }

    async fn activated(&self, ctx: &RenderContext) -> anyhow::Result<()> {
        if ctx.param("code").is_none() {
            if let Some(season_id) = self.state.engine.cache().load_selected_season() {
                self.state.spawn_check(ctx, &season_id, CheckReason::Tab);
            }
        }
        Ok(())
    }
}

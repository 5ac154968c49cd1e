//! Wires the engine, router, views and session into one app, and plays the
//! host's part: following redirects and relaying visibility changes.

use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::AuthSession;
use crate::cache::cleanup_caches;
use crate::engine::SyncEngine;
use crate::prefetch::warm_on_reload;
use crate::route::{Access, AuthState, Location, NavigationOutcome, RouteController};
use crate::staleness::{CheckOutcome, CheckReason, StalenessReconciler};
use crate::views::{AdminView, LeaderboardView, LoginView, MatchView};

/// Redirect hops followed per navigation before giving up.
const MAX_REDIRECTS: usize = 3;

pub struct App {
    engine: SyncEngine,
    router: RouteController,
    auth: Arc<AuthSession>,
    matches: Arc<MatchView>,
    admin: Arc<AdminView>,
}

impl App {
    pub fn new(engine: SyncEngine) -> Self {
        let auth = Arc::new(AuthSession::new(engine.cache().clone()));
        let router = RouteController::with_auth(engine.clock().clone(), Some(auth.clone()));
        let reconciler = Arc::new(StalenessReconciler::new(
            engine.clone(),
            Arc::new(router.clone()),
        ));

        let matches = Arc::new(MatchView::new(engine.clone(), reconciler));
        router.register("match", Access::Authenticated, matches.clone());
        router.register(
            "leaderboard",
            Access::Public,
            Arc::new(LeaderboardView::new(engine.clone(), Some(auth.clone()))),
        );
        router.register("login", Access::Public, Arc::new(LoginView::new(auth.clone())));
        let admin = Arc::new(AdminView::new(engine.clone()));
        router.register("admin", Access::Admin, admin.clone());

        Self {
            engine,
            router,
            auth,
            matches,
            admin,
        }
    }

    // ===== Accessors =====

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn router(&self) -> &RouteController {
        &self.router
    }

    pub fn auth(&self) -> &Arc<AuthSession> {
        &self.auth
    }

    pub fn matches(&self) -> &Arc<MatchView> {
        &self.matches
    }

    pub fn admin(&self) -> &Arc<AdminView> {
        &self.admin
    }

    // ===== Lifecycle =====

    /// Boot: prune old entries, make sure a signed-in user is known, warm
    /// the reloaded route, then render the first location. Without one,
    /// signed-in users land on the match list and others on the leaderboard.
    pub async fn start(&self, initial: Option<Location>) -> NavigationOutcome {
        let report = cleanup_caches(self.engine.cache(), &self.engine.config().cleanup);
        debug!(expired = report.expired, trimmed = report.trimmed, "Startup cleanup done");

        if self.auth.has_token() && self.auth.current_user().is_none() {
            if let Err(e) = self.auth.load_user(&self.engine).await {
                debug!(error = %e, "Could not load current user");
            }
        }

        let warmed = warm_on_reload(&self.engine);
        let initial = initial.unwrap_or_else(|| {
            if self.auth.has_token() {
                Location::parse("#/match")
            } else {
                Location::parse("#/leaderboard")
            }
        });
        info!(location = %initial, warmed = warmed.len(), "App starting");
        self.navigate(initial).await
    }

    /// Navigate, following access redirects.
    pub async fn navigate(&self, location: Location) -> NavigationOutcome {
        let mut outcome = self.router.navigate(location).await;
        for _ in 0..MAX_REDIRECTS {
            match outcome {
                NavigationOutcome::Redirect(target) => {
                    outcome = self.router.navigate(target).await;
                }
                other => return other,
            }
        }
        outcome
    }

    /// The host document was shown or hidden. Coming back counts as a tab
    /// activation for the fingerprint check.
    pub async fn set_visible(&self, visible: bool) -> Option<CheckOutcome> {
        self.router.set_document_visible(visible);
        if !visible {
            return None;
        }
        self.matches.check_for_updates(CheckReason::Tab).await
    }

    /// Periodic fingerprint check; skipped inside the cooldown.
    pub async fn tick(&self) -> Option<CheckOutcome> {
        self.matches.check_for_updates(CheckReason::Periodic).await
    }
}

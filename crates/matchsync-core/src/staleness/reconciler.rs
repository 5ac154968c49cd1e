use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::record::{Listing, ReconcileScope, StalenessRecord};
use crate::api::ApiError;
use crate::cache::CacheEntry;
use crate::engine::SyncEngine;
use crate::models::{MatchesMeta, OpenMatches};
use crate::route::{Location, RouteController};

/// Where the user is looking right now.
pub trait Presence: Send + Sync {
    fn current_location(&self) -> Option<Location>;

    fn is_document_visible(&self) -> bool;
}

impl Presence for RouteController {
    fn current_location(&self) -> Option<Location> {
        RouteController::current_location(self)
    }

    fn is_document_visible(&self) -> bool {
        RouteController::is_document_visible(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckReason {
    /// The owning view was just rendered.
    Load,
    /// The user switched back to the owning tab.
    Tab,
    /// Any other trigger; subject to the cooldown.
    Periodic,
}

impl CheckReason {
    fn waives_cooldown(self) -> bool {
        matches!(self, CheckReason::Load | CheckReason::Tab)
    }
}

/// The "update available" prompt for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAffordance {
    pub scope: String,
    pub fingerprint: String,
    pub latest_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Inactive,
    Cooldown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Skipped(SkipReason),
    Unchanged,
    /// Drift detected, but the listing already has it, or the user already
    /// acted on this fingerprint.
    Suppressed,
    /// The fingerprint read failed; the prompt is hidden.
    Unavailable,
    Changed(UpdateAffordance),
}

#[derive(Default)]
struct ScopeState {
    last_check: Option<Instant>,
    affordance: Option<UpdateAffordance>,
    /// Fingerprints the user applied or dismissed.
    settled: HashSet<String>,
}

/// Compares a scope's server fingerprint with the last one seen and offers
/// an update when they drift.
///
/// It never changes the listing by itself; only `apply_update` does. It is
/// also the only writer of the scope's [`StalenessRecord`].
pub struct StalenessReconciler<L = OpenMatches> {
    engine: SyncEngine,
    presence: Arc<dyn Presence>,
    cooldown: Duration,
    race_window_ms: i64,
    scopes: Mutex<HashMap<String, ScopeState>>,
    _listing: PhantomData<fn() -> L>,
}

impl<L> StalenessReconciler<L>
where
    L: Listing + Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(engine: SyncEngine, presence: Arc<dyn Presence>) -> Self {
        let cooldown = engine.config().meta_cooldown();
        let race_window_ms = engine.config().race_window_ms();
        Self {
            engine,
            presence,
            cooldown,
            race_window_ms,
            scopes: Mutex::new(HashMap::new()),
            _listing: PhantomData,
        }
    }

    pub fn affordance(&self, scope: &ReconcileScope) -> Option<UpdateAffordance> {
        self.scopes
            .lock()
            .get(&scope.name)
            .and_then(|s| s.affordance.clone())
    }

    /// Location of the latest item behind the shown prompt.
    pub fn open_latest(&self, scope: &ReconcileScope) -> Option<Location> {
        self.affordance(scope)
            .filter(|a| !a.latest_id.is_empty())
            .map(|a| scope.location_for(&a.latest_id))
    }

    fn is_active(&self, scope: &ReconcileScope) -> bool {
        self.presence.is_document_visible()
            && self
                .presence
                .current_location()
                .is_some_and(|loc| scope.is_shown_at(&loc))
    }

    fn set_affordance(&self, scope: &ReconcileScope, affordance: Option<UpdateAffordance>) {
        self.scopes
            .lock()
            .entry(scope.name.clone())
            .or_default()
            .affordance = affordance;
    }

    /// Fetch the scope's fingerprint and decide whether to offer an update.
    pub async fn check(&self, scope: &ReconcileScope, reason: CheckReason) -> CheckOutcome {
        if !self.is_active(scope) {
            trace!(scope = %scope.name, ?reason, "Scope not visible, skipping check");
            return CheckOutcome::Skipped(SkipReason::Inactive);
        }

        {
            let mut scopes = self.scopes.lock();
            let state = scopes.entry(scope.name.clone()).or_default();
            let now = Instant::now();
            if !reason.waives_cooldown() {
                if let Some(last) = state.last_check {
                    if now.duration_since(last) < self.cooldown {
                        trace!(scope = %scope.name, "Check within cooldown");
                        return CheckOutcome::Skipped(SkipReason::Cooldown);
                    }
                }
            }
            state.last_check = Some(now);
        }

        let cache = self.engine.cache();
        let previous = cache
            .get::<StalenessRecord>(&scope.record_key)
            .map(|e| e.payload);

        let fresh = match self.engine.fetch(&scope.check_op).await.and_then(|value| {
            serde_json::from_value::<MatchesMeta>(value).map_err(ApiError::from)
        }) {
            Ok(meta) => StalenessRecord {
                fingerprint: meta.fingerprint,
                latest_id: meta.latest_code,
            },
            Err(e) => {
                debug!(scope = %scope.name, error = %e, "Fingerprint check failed");
                self.set_affordance(scope, None);
                return CheckOutcome::Unavailable;
            }
        };
        cache.set(&scope.record_key, &fresh);

        let outcome = self.evaluate(scope, previous.as_ref(), &fresh);
        debug!(
            scope = %scope.name,
            ?reason,
            fingerprint = %fresh.fingerprint,
            ?outcome,
            "Fingerprint checked"
        );
        let affordance = match &outcome {
            CheckOutcome::Changed(affordance) => Some(affordance.clone()),
            _ => None,
        };
        self.set_affordance(scope, affordance);
        outcome
    }

    fn evaluate(
        &self,
        scope: &ReconcileScope,
        previous: Option<&StalenessRecord>,
        fresh: &StalenessRecord,
    ) -> CheckOutcome {
        if fresh.fingerprint.is_empty() {
            return CheckOutcome::Unchanged;
        }

        let listing: Option<CacheEntry<L>> = self.engine.cache().get(&scope.listing_key);
        let listed = !fresh.latest_id.is_empty()
            && listing
                .as_ref()
                .is_some_and(|e| e.payload.contains_id(&fresh.latest_id));

        let drifted = match previous {
            None => true,
            Some(prev) => prev.fingerprint.is_empty() || prev.fingerprint != fresh.fingerprint,
        };
        let missing_latest = !fresh.latest_id.is_empty() && !listed;
        if !drifted && !missing_latest {
            return CheckOutcome::Unchanged;
        }

        // The listing may have been refreshed by a request that raced this
        // check; trust it when it is recent and already has the latest id.
        if listed
            && listing
                .as_ref()
                .is_some_and(|e| e.age_ms() <= self.race_window_ms)
        {
            return CheckOutcome::Suppressed;
        }

        let settled = self
            .scopes
            .lock()
            .get(&scope.name)
            .is_some_and(|s| s.settled.contains(&fresh.fingerprint));
        if settled {
            return CheckOutcome::Suppressed;
        }

        CheckOutcome::Changed(UpdateAffordance {
            scope: scope.name.clone(),
            fingerprint: fresh.fingerprint.clone(),
            latest_id: fresh.latest_id.clone(),
        })
    }

    /// Hide the prompt, fetch the full listing into the cache and record the
    /// fingerprint as seen. Returns `None` when no prompt was shown.
    pub async fn apply_update(
        &self,
        scope: &ReconcileScope,
    ) -> Result<Option<CacheEntry<L>>, ApiError> {
        let taken = self
            .scopes
            .lock()
            .get_mut(&scope.name)
            .and_then(|s| s.affordance.take());
        let Some(affordance) = taken else {
            return Ok(None);
        };

        let entry = self
            .engine
            .refresh::<L>(&scope.listing_key, &scope.refresh_op)
            .await?;

        self.engine.cache().set(
            &scope.record_key,
            StalenessRecord {
                fingerprint: affordance.fingerprint.clone(),
                latest_id: affordance.latest_id,
            },
        );
        self.scopes
            .lock()
            .entry(scope.name.clone())
            .or_default()
            .settled
            .insert(affordance.fingerprint);
        debug!(scope = %scope.name, "Applied update");
        Ok(Some(entry))
    }

    /// Hide the prompt for good for its fingerprint.
    pub fn dismiss(&self, scope: &ReconcileScope) {
        let mut scopes = self.scopes.lock();
        let state = scopes.entry(scope.name.clone()).or_default();
        if let Some(affordance) = state.affordance.take() {
            state.settled.insert(affordance.fingerprint);
        }
    }
}

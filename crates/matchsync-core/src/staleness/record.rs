use serde::{Deserialize, Serialize};

use crate::api::{endpoints, ReadOp};
use crate::cache::keys;
use crate::models::OpenMatches;
use crate::route::Location;

/// Last fingerprint seen for a scope, persisted as
/// `{ts, fingerprint, latestCode}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessRecord {
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default, rename = "latestCode")]
    pub latest_id: String,
}

/// A cached collection the fingerprint's latest id can be looked up in.
pub trait Listing {
    fn contains_id(&self, id: &str) -> bool;
}

impl Listing for OpenMatches {
    fn contains_id(&self, id: &str) -> bool {
        self.contains_code(id)
    }
}

/// Everything the reconciler needs to know about one watched collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileScope {
    /// Stable name; cooldowns and dismissals are tracked per scope.
    pub name: String,
    /// Route that owns the scope.
    pub route: String,
    pub record_key: String,
    pub listing_key: String,
    /// Lightweight fingerprint read.
    pub check_op: ReadOp,
    /// Full listing read used by "apply update".
    pub refresh_op: ReadOp,
}

impl ReconcileScope {
    /// Open matches of one season, watched from the match list.
    pub fn open_matches(season_id: &str) -> Self {
        Self {
            name: format!("open_matches:{}", season_id),
            route: "match".to_string(),
            record_key: keys::matches_meta(season_id),
            listing_key: keys::open_matches(season_id),
            check_op: endpoints::matches_meta(season_id),
            refresh_op: endpoints::open_matches(season_id),
        }
    }

    /// Whether the scope's view is the one shown at `location`. The match
    /// list owns open matches; a match detail on the same route does not.
    pub fn is_shown_at(&self, location: &Location) -> bool {
        location.route() == self.route && location.param("code").is_none()
    }

    /// Where "open latest" leads.
    pub fn location_for(&self, id: &str) -> Location {
        Location::with_query(&format!("#/{}", self.route), &[("code", id)])
    }
}

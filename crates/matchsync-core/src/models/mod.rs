//! Data models for the club API.
//!
//! Each cached resource kind has its own payload type, so structural
//! validation happens when an entry is read rather than at arbitrary later
//! points:
//!
//! - `Seasons`, `SelectedSeason`: season list and the user's choice
//! - `OpenMatches`, `PastMatches`, `MatchDetailCache`: match lists and details
//! - `AdminMatches`: the admin's all-status match list
//! - `MatchesMeta`: the lightweight fingerprint summary of a season
//! - `LeaderboardCache`: per-season leaderboard rows
//! - `PlayersList`, `UsersList`, `CurrentUser`: people

pub mod leaderboard;
pub mod matches;
pub mod season;
pub mod user;

pub use leaderboard::{Leaderboard, LeaderboardCache, LeaderboardRow, LeaderboardSort};
pub use matches::{
    latest_open_code, AdminMatches, Availability, MatchDetail, MatchDetailCache, MatchSummary, MatchesMeta,
    OpenMatches, PastMatches,
};
pub use season::{pick_selected_season, Season, Seasons, SelectedSeason};
pub use user::{CurrentUser, PlayersList, UserSummary, UsersList};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accept strings, numbers, or null for fields the API is loose about
/// (scores are sometimes `2`, sometimes `"2"`, sometimes missing).
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

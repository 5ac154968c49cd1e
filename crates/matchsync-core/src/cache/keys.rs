//! Cache key names.
//!
//! Keys carry a schema version suffix; bumping it orphans records written
//! in an incompatible shape instead of misreading them.

pub const SEASONS: &str = "seasons_cache_v1";
pub const SELECTED_SEASON: &str = "selected_season_v1";
pub const PLAYERS: &str = "players_cache_v2";
pub const ADMIN_USERS: &str = "admin_users_cache_v1";
pub const CURRENT_USER: &str = "user_v1";
pub const SESSION_TOKEN: &str = "token_v1";

/// Session-scoped record of the location a reload landed on.
pub const RELOAD_LOCATION: &str = "reload_location_v1";

pub const OPEN_MATCHES_PREFIX: &str = "open_matches_cache_v2:";
pub const PAST_MATCHES_PREFIX: &str = "past_matches_cache_v2:";
pub const MATCH_DETAIL_PREFIX: &str = "match_detail_cache_v2:";
pub const MATCHES_META_PREFIX: &str = "matches_meta_v2:";
pub const LEADERBOARD_PREFIX: &str = "leaderboard_v2:";
pub const ADMIN_MATCHES_PREFIX: &str = "admin_matches_cache_v3:";

pub fn open_matches(season_id: &str) -> String {
    format!("{}{}", OPEN_MATCHES_PREFIX, season_id)
}

pub fn past_matches(season_id: &str, page: u32) -> String {
    format!("{}{}:{}", PAST_MATCHES_PREFIX, season_id, page)
}

pub fn match_detail(code: &str) -> String {
    format!("{}{}", MATCH_DETAIL_PREFIX, code)
}

pub fn matches_meta(season_id: &str) -> String {
    format!("{}{}", MATCHES_META_PREFIX, season_id)
}

pub fn leaderboard(season_id: &str) -> String {
    format!("{}{}", LEADERBOARD_PREFIX, season_id)
}

pub fn admin_matches(season_id: &str) -> String {
    format!("{}{}", ADMIN_MATCHES_PREFIX, season_id)
}

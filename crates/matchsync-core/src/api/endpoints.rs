//! Named operations of the club API.
//!
//! Reads are plain [`ReadOp`] builders; the engine decides whether they are
//! answered from cache or deduplicated onto an in-flight request.

use super::source::{ReadOp, WriteOp};

// ===== Reads =====

pub fn me() -> ReadOp {
    ReadOp::new("me")
}

pub fn seasons() -> ReadOp {
    ReadOp::new("seasons")
}

pub fn leaderboard(season_id: &str) -> ReadOp {
    ReadOp::new("leaderboard_season").param("seasonId", season_id)
}

pub fn open_matches(season_id: &str) -> ReadOp {
    ReadOp::new("public_open_matches").param("seasonId", season_id)
}

pub fn past_matches(season_id: &str, page: u32, page_size: u32) -> ReadOp {
    ReadOp::new("public_past_matches")
        .param("seasonId", season_id)
        .param("page", page)
        .param("pageSize", page_size)
}

/// Lightweight `{fingerprint, latestCode}` summary of a season's matches.
pub fn matches_meta(season_id: &str) -> ReadOp {
    ReadOp::new("public_matches_meta").param("seasonId", season_id)
}

pub fn public_match(code: &str) -> ReadOp {
    ReadOp::new("public_match").param("code", code)
}

pub fn players() -> ReadOp {
    ReadOp::new("players")
}

pub fn admin_users() -> ReadOp {
    ReadOp::new("admin_users")
}

pub fn admin_list_matches(season_id: &str) -> ReadOp {
    ReadOp::new("admin_list_matches").param("seasonId", season_id)
}

// ===== Mutations =====

pub fn set_availability(code: &str, availability: &str) -> WriteOp {
    WriteOp::new("set_availability")
        .field("code", code)
        .field("availability", availability)
}

pub fn captain_submit_score(code: &str, mode: &str, score_a: u32, score_b: u32) -> WriteOp {
    WriteOp::new("captain_submit_score")
        .field("code", code)
        .field("mode", mode)
        .field("scoreA", score_a)
        .field("scoreB", score_b)
        .field("scope", "CAPTAIN")
}

pub fn admin_set_availability_for(
    match_id: &str,
    player_name: &str,
    availability: &str,
    note: &str,
) -> WriteOp {
    WriteOp::new("admin_set_availability_for")
        .field("matchId", match_id)
        .field("playerName", player_name)
        .field("availability", availability)
        .field("note", note)
}

pub fn admin_delete_match(match_id: &str) -> WriteOp {
    WriteOp::new("admin_delete_match").field("matchId", match_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_scoped_reads() {
        assert_eq!(open_matches("S1").dedup_key(), "public_open_matches?seasonId=S1");
        assert_eq!(matches_meta("S1").dedup_key(), "public_matches_meta?seasonId=S1");
        assert_eq!(leaderboard("S1").dedup_key(), "leaderboard_season?seasonId=S1");
    }

    #[test]
    fn test_score_mutation_fields() {
        let op = captain_submit_score("ABC", "FINAL", 3, 1);
        assert_eq!(op.name(), "captain_submit_score");
        assert_eq!(op.fields()["scoreA"], 3);
        assert_eq!(op.fields()["scope"], "CAPTAIN");
    }
}

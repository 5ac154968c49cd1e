use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub player_name: String,
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub avg_rating: f64,
    #[serde(default)]
    pub matches_rated: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    #[serde(default)]
    pub rows: Vec<LeaderboardRow>,
}

/// Leaderboard of one season, cached as `{ts, data}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardCache {
    pub data: Leaderboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardSort {
    Goals,
    Assists,
    Rating,
}

impl Leaderboard {
    /// Rows ordered for display. Ratings are admin-only; without them the
    /// rating order falls back to goals.
    pub fn sorted(&self, sort: LeaderboardSort, show_rating: bool) -> Vec<&LeaderboardRow> {
        let mut rows: Vec<&LeaderboardRow> = self.rows.iter().collect();
        match sort {
            LeaderboardSort::Assists => rows.sort_by(|a, b| b.assists.cmp(&a.assists)),
            LeaderboardSort::Rating if show_rating => {
                rows.sort_by(|a, b| b.avg_rating.total_cmp(&a.avg_rating))
            }
            _ => rows.sort_by(|a, b| b.goals.cmp(&a.goals)),
        }
        rows
    }
}

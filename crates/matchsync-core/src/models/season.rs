use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub season_id: String,
    #[serde(default)]
    pub name: String,
}

/// Season list, cached as `{ts, seasons, currentSeasonId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seasons {
    #[serde(default)]
    pub seasons: Vec<Season>,
    #[serde(default)]
    pub current_season_id: String,
}

impl Seasons {
    pub fn contains(&self, season_id: &str) -> bool {
        self.seasons.iter().any(|s| s.season_id == season_id)
    }
}

/// The season the user last looked at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedSeason {
    pub season_id: String,
}

/// Keep the stored choice when it still exists; otherwise fall back to the
/// current season, then the first listed one.
pub fn pick_selected_season(seasons: &Seasons, stored: Option<&str>) -> Option<String> {
    if let Some(stored) = stored.filter(|s| seasons.contains(s)) {
        return Some(stored.to_string());
    }
    if !seasons.current_season_id.is_empty() {
        return Some(seasons.current_season_id.clone());
    }
    seasons.seasons.first().map(|s| s.season_id.clone())
}

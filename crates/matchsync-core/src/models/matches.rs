use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::lenient_string;

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    #[serde(default, deserialize_with = "lenient_string")]
    pub match_id: String,
    pub public_code: String,
    #[serde(default)]
    pub season_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub score_home: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub score_away: String,
}

/// Ordering key for open matches: a creation time always beats a scheduled
/// date/time, since it reflects when the match was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    Created(i64),
    Scheduled(i64),
}

impl MatchSummary {
    fn is_internal(&self) -> bool {
        self.kind.eq_ignore_ascii_case("INTERNAL")
    }

    /// Display label for one side of the match.
    pub fn team_label(&self, home: bool) -> &'static str {
        match (self.is_internal(), home) {
            (true, true) => "BLUE",
            (true, false) => "ORANGE",
            (false, true) => "MLFC",
            (false, false) => "OPPONENT",
        }
    }

    /// "BLUE 2 - 1 ORANGE", or `None` until both scores are in.
    pub fn result_label(&self) -> Option<String> {
        let home = self.score_home.trim();
        let away = self.score_away.trim();
        if home.is_empty() || away.is_empty() {
            return None;
        }
        Some(format!(
            "{} {} - {} {}",
            self.team_label(true),
            home,
            away,
            self.team_label(false)
        ))
    }

    fn created_millis(&self) -> Option<i64> {
        let raw = self.created_at.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        let millis = DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.timestamp_millis())
            .or_else(|_| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                    .map(|dt| dt.and_utc().timestamp_millis())
            })
            .ok()?;
        (millis > 0).then_some(millis)
    }

    fn scheduled_millis(&self) -> i64 {
        let date: String = self.date.trim().chars().take(10).collect();
        let mut time: String = self.time.trim().chars().take(5).collect();
        if time.is_empty() {
            time = "00:00".to_string();
        }
        NaiveDateTime::parse_from_str(&format!("{}T{}", date, time), "%Y-%m-%dT%H:%M")
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(0)
    }

    fn sort_key(&self) -> SortKey {
        match self.created_millis() {
            Some(created) => SortKey::Created(created),
            None => SortKey::Scheduled(self.scheduled_millis()),
        }
    }
}

/// Code of the newest open match, used for the LATEST badge and as the
/// locally known latest id.
pub fn latest_open_code(matches: &[MatchSummary]) -> Option<&str> {
    let mut best: Option<(&MatchSummary, SortKey)> = None;
    for m in matches {
        let key = m.sort_key();
        let replace = match (best.map(|(_, k)| k), key) {
            (None, _) => true,
            (Some(SortKey::Scheduled(_)), SortKey::Created(_)) => true,
            (Some(SortKey::Created(b)), SortKey::Created(k)) => k > b,
            (Some(SortKey::Scheduled(b)), SortKey::Scheduled(k)) => k > b,
            (Some(SortKey::Created(_)), SortKey::Scheduled(_)) => false,
        };
        if replace {
            best = Some((m, key));
        }
    }
    best.map(|(m, _)| m.public_code.as_str())
        .filter(|code| !code.is_empty())
}

/// Open matches of one season, cached as `{ts, matches}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenMatches {
    #[serde(default)]
    pub matches: Vec<MatchSummary>,
}

impl OpenMatches {
    pub fn contains_code(&self, code: &str) -> bool {
        self.matches.iter().any(|m| m.public_code == code)
    }

    pub fn latest_code(&self) -> Option<&str> {
        latest_open_code(&self.matches)
    }

    /// Newest posted first, then by kick-off time.
    pub fn sorted_for_display(&self) -> Vec<&MatchSummary> {
        let mut sorted: Vec<&MatchSummary> = self.matches.iter().collect();
        sorted.sort_by(|a, b| match (a.sort_key(), b.sort_key()) {
            (SortKey::Created(x), SortKey::Created(y)) => y.cmp(&x),
            (SortKey::Created(_), SortKey::Scheduled(_)) => std::cmp::Ordering::Less,
            (SortKey::Scheduled(_), SortKey::Created(_)) => std::cmp::Ordering::Greater,
            (SortKey::Scheduled(x), SortKey::Scheduled(y)) => x.cmp(&y),
        });
        sorted
    }
}

/// One page of past matches, cached as `{ts, page, pageSize, total, hasMore, matches}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PastMatches {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub matches: Vec<MatchSummary>,
}

/// Every match of one season as the admin list shows it, cached as
/// `{ts, matches}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminMatches {
    #[serde(default)]
    pub matches: Vec<MatchSummary>,
}

impl AdminMatches {
    /// Open matches, or everything else when `open` is false.
    pub fn with_status(&self, open: bool) -> Vec<&MatchSummary> {
        self.matches
            .iter()
            .filter(|m| m.status.trim().eq_ignore_ascii_case("OPEN") == open)
            .collect()
    }

    /// Drop a match by id. Returns whether it was listed.
    pub fn remove(&mut self, match_id: &str) -> bool {
        let before = self.matches.len();
        self.matches.retain(|m| m.match_id != match_id);
        self.matches.len() != before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub player_name: String,
    #[serde(default)]
    pub availability: String,
}

impl Availability {
    pub fn is_yes(&self) -> bool {
        self.availability.trim().eq_ignore_ascii_case("YES")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetail {
    #[serde(rename = "match")]
    pub summary: MatchSummary,
    #[serde(default)]
    pub availability: Vec<Availability>,
}

/// A match detail together with the season fingerprint it was fetched under.
/// A later fingerprint change means the detail may be out of date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetailCache {
    pub data: MatchDetail,
    #[serde(default)]
    pub meta_fingerprint: String,
}

/// Response of the lightweight matches-meta read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchesMeta {
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default, alias = "latestId")]
    pub latest_code: String,
    #[serde(default)]
    pub captain_codes: Vec<String>,
}

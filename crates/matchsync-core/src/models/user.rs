use serde::{Deserialize, Serialize};

/// The signed-in user as returned by the `me` read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub phone: String,
}

/// Admin users list, cached as `{ts, users}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsersList {
    #[serde(default)]
    pub users: Vec<UserSummary>,
}

/// Sorted, de-duplicated player names, cached as `{ts, players}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayersList {
    #[serde(default)]
    pub players: Vec<String>,
}

impl PlayersList {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut players: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        players.sort();
        players.dedup();
        Self { players }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_players_sorted_and_unique() {
        let list = PlayersList::from_names(["Sam", "alex", " Sam ", "", "Alex"]);
        assert_eq!(list.players, vec!["Alex", "Sam", "alex"]);
    }
}

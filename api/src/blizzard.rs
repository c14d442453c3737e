/// Wire types for the community leaderboard endpoint.
/// Endpoint: https://hearthstone.blizzard.com/en-us/api/community/leaderboardsData
///
/// The row shape has drifted between seasons: the identifier has shipped as
/// `accountid` (string, sometimes numeric), `battleTag` and `name`.
use serde::Deserialize;

#[derive(Deserialize, Default, Debug)]
pub struct LeaderboardResponse {
    pub leaderboard: Option<Leaderboard>,
}

#[derive(Deserialize, Default, Debug)]
pub struct Leaderboard {
    #[serde(default)]
    pub rows: Vec<RawRow>,
    pub pagination: Option<Pagination>,
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct RawRow {
    pub rank: Option<u32>,
    pub rating: Option<serde_json::Value>,
    pub accountid: Option<serde_json::Value>,
    #[serde(rename = "battleTag")]
    pub battle_tag: Option<String>,
    pub battletag: Option<String>,
    pub name: Option<String>,
}

#[derive(Deserialize, Default, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_pages: Option<u32>,
    pub total_size: Option<u32>,
}

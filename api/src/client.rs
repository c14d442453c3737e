use crate::blizzard::{LeaderboardResponse, RawRow};
use crate::twitch::{StreamsResponse, UsersResponse};
use crate::{LadderRow, LadderSource, StreamProfile, StreamSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::{Client, RequestBuilder};
use std::fmt;
use std::time::Duration;

pub type ApiResult<T> = Result<T, ApiError>;

pub const LEADERBOARD_ENDPOINT: &str =
    "https://hearthstone.blizzard.com/en-us/api/community/leaderboardsData";
pub const TWITCH_HELIX: &str = "https://api.twitch.tv";

const USER_AGENT: &str = "ladderwatch/0.1 (roster leaderboard tracker)";

#[derive(Debug)]
pub enum ApiError {
    Network(reqwest::Error, String),
    Api(reqwest::Error, String),
    Parsing(reqwest::Error, String),
    NotFound(String),
    Other(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(e, url) => write!(f, "Network error for {url}: {e}"),
            ApiError::Api(e, url) => write!(f, "API error for {url}: {e}"),
            ApiError::Parsing(e, url) => write!(f, "Parse error for {url}: {e}"),
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

fn build_client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// Send a GET and decode the JSON body.
///
/// A 4xx answer decodes to `T::default()`: the ladder answers out-of-range
/// pages and unknown seasons with client errors, which are "no rows" rather
/// than failures.
async fn send_json<T: Default + serde::de::DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
) -> ApiResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| ApiError::Network(e, url.to_owned()))?;

    match response.error_for_status() {
        Ok(res) => res
            .json::<T>()
            .await
            .map_err(|e| ApiError::Parsing(e, url.to_owned())),
        Err(e) => {
            if e.status().map(|s| s.is_client_error()).unwrap_or(false) {
                Ok(T::default())
            } else {
                Err(ApiError::Api(e, url.to_owned()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ranking source
// ---------------------------------------------------------------------------

/// Client for the paginated community leaderboard.
#[derive(Debug, Clone)]
pub struct LadderApi {
    client: Client,
    endpoint: String,
    region: String,
    ladder_id: String,
    timeout: Duration,
}

impl Default for LadderApi {
    fn default() -> Self {
        Self {
            client: build_client(),
            endpoint: LEADERBOARD_ENDPOINT.to_owned(),
            region: "EU".to_owned(),
            ladder_id: "battlegrounds".to_owned(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl LadderApi {
    pub fn new(region: impl Into<String>, ladder_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ladder_id: ladder_id.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn page_url(&self, season_id: u32, page: u32) -> String {
        format!(
            "{}?region={}&leaderboardId={}&page={page}&seasonId={season_id}",
            self.endpoint, self.region, self.ladder_id
        )
    }
}

#[async_trait]
impl LadderSource for LadderApi {
    async fn fetch_page(&self, season_id: u32, page: u32) -> ApiResult<Vec<LadderRow>> {
        let url = self.page_url(season_id, page);
        let request = self.client.get(&url).timeout(self.timeout);
        let raw: LeaderboardResponse = send_json(request, &url).await?;
        let rows = raw
            .leaderboard
            .map(|l| l.rows)
            .unwrap_or_default()
            .iter()
            .filter_map(map_row)
            .collect::<Vec<_>>();
        debug!("season {season_id} page {page}: {} rows", rows.len());
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Mapping: leaderboard wire rows → LadderRow
// ---------------------------------------------------------------------------

type IdStrategy = fn(&RawRow) -> Option<String>;

/// Identifier extraction strategies, tried in order. The field carrying the
/// account name has changed across API revisions.
const ID_STRATEGIES: &[IdStrategy] = &[
    |r| r.accountid.as_ref().and_then(value_to_string),
    |r| r.battle_tag.clone(),
    |r| r.battletag.clone(),
    |r| r.name.clone(),
];

fn value_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn extract_account_id(row: &RawRow) -> Option<String> {
    ID_STRATEGIES
        .iter()
        .filter_map(|strategy| strategy(row))
        .map(|id| id.trim().to_owned())
        .find(|id| !id.is_empty())
}

fn parse_rating(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn map_row(raw: &RawRow) -> Option<LadderRow> {
    let account_id = extract_account_id(raw)?;
    let rank = raw.rank?;
    Some(LadderRow {
        account_id,
        rank,
        rating: raw.rating.as_ref().and_then(parse_rating),
    })
}

// ---------------------------------------------------------------------------
// Streaming source
// ---------------------------------------------------------------------------

/// Twitch Helix client. Lookups fail fast when no credentials are configured.
#[derive(Debug, Clone)]
pub struct TwitchApi {
    client: Client,
    base_url: String,
    client_id: Option<String>,
    token: Option<String>,
    timeout: Duration,
}

impl Default for TwitchApi {
    fn default() -> Self {
        Self {
            client: build_client(),
            base_url: TWITCH_HELIX.to_owned(),
            client_id: None,
            token: None,
            timeout: Duration::from_secs(4),
        }
    }
}

impl TwitchApi {
    pub fn new(client_id: Option<String>, token: Option<String>) -> Self {
        Self {
            client_id,
            token,
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn authorized_get(&self, url: &str) -> ApiResult<RequestBuilder> {
        let (Some(client_id), Some(token)) = (&self.client_id, &self.token) else {
            return Err(ApiError::Other("twitch credentials not configured".into()));
        };
        Ok(self
            .client
            .get(url)
            .timeout(self.timeout)
            .header("Client-Id", client_id)
            .bearer_auth(token))
    }
}

#[async_trait]
impl StreamSource for TwitchApi {
    async fn lookup(&self, handle: &str) -> ApiResult<StreamProfile> {
        let login = handle.trim().to_lowercase();

        let users_url = format!("{}/helix/users?login={login}", self.base_url);
        let users: UsersResponse = send_json(self.authorized_get(&users_url)?, &users_url).await?;
        let user = users
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("twitch user {login}")))?;

        let streams_url = format!("{}/helix/streams?user_login={login}", self.base_url);
        let streams: StreamsResponse =
            send_json(self.authorized_get(&streams_url)?, &streams_url).await?;
        let stream = streams
            .data
            .into_iter()
            .find(|s| s.user_login.eq_ignore_ascii_case(&login) && s.stream_type == "live");

        Ok(StreamProfile {
            login: user.login,
            avatar_url: user.profile_image_url,
            live: stream.is_some(),
            started_at: stream
                .and_then(|s| s.started_at)
                .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }
}

pub mod blizzard;
pub mod client;
pub mod twitch;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ApiResult;

// ---------------------------------------------------------------------------
// Domain types, independent of the upstream wire formats
// ---------------------------------------------------------------------------

/// One ranking row from the upstream ladder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderRow {
    /// Account identifier as the ladder printed it. Depending on the season
    /// this is `Name#1234` or just `Name`.
    pub account_id: String,
    pub rank: u32,
    pub rating: Option<i64>,
}

impl LadderRow {
    /// Lowercased identifier used for case-insensitive matching.
    pub fn match_key(&self) -> String {
        self.account_id.to_lowercase()
    }
}

/// Streaming state for a single handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProfile {
    pub login: String,
    pub avatar_url: Option<String>,
    pub live: bool,
    pub started_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Seams consumed by the sync engine
// ---------------------------------------------------------------------------

/// A paginated, read-only ranking source keyed by season and page.
#[async_trait]
pub trait LadderSource: Send + Sync {
    /// Fetch one page (1-based). An empty vec means the page holds no rows.
    async fn fetch_page(&self, season_id: u32, page: u32) -> ApiResult<Vec<LadderRow>>;
}

/// Per-handle streaming status lookups.
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn lookup(&self, handle: &str) -> ApiResult<StreamProfile>;
}

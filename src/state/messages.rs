use crate::state::catalog::SeasonCatalog;
use crate::state::coordinator::SeasonView;
use crate::state::history::{PlayerSummary, RatingPoint};
use crate::state::live_status::LiveStatus;
use serde::{Deserialize, Serialize};

/// One relay request, sent as a JSON text frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Query {
    /// Ranking for a season; the current one when omitted.
    Ranking {
        #[serde(default)]
        season: Option<u32>,
    },
    Catalog,
    Live,
    History { player: String },
    Summary { player: String },
    Rescan {
        season: u32,
        #[serde(default)]
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Reply {
    Ranking(SeasonView),
    Catalog(SeasonCatalog),
    Live { players: Vec<LiveStatus> },
    History { player: String, points: Vec<RatingPoint> },
    Summary(PlayerSummary),
    Error { message: String },
}

impl Reply {
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error { message: message.into() }
    }
}

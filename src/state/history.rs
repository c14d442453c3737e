use crate::state::persist::{load_json, save_json};
use crate::state::season_store::SeasonRecord;
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

const HISTORY_FILE: &str = "rating_history.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingPoint {
    pub date: NaiveDate,
    pub rating: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerHistory {
    battle_tag: String,
    points: Vec<RatingPoint>,
}

/// One closed season as seen from a single player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonPlacement {
    pub season_id: u32,
    pub local_rank: usize,
    pub rank: Option<u32>,
    pub rating: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub battle_tag: String,
    pub peak_rating: Option<i64>,
    pub points: Vec<RatingPoint>,
    /// Newest season first.
    pub seasons: Vec<SeasonPlacement>,
}

/// Daily rating samples per player, taken from current-season full scans.
#[derive(Debug)]
pub struct RatingHistory {
    path: PathBuf,
    players: RwLock<BTreeMap<String, PlayerHistory>>,
}

impl RatingHistory {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let path = dir.into().join(HISTORY_FILE);
        let players = load_json(&path).await?;
        Ok(Self { path, players: RwLock::new(players) })
    }

    pub async fn record(&self, season: &SeasonRecord) -> Result<()> {
        self.record_on(season, Utc::now().date_naive()).await
    }

    /// Keep one sample per player per day; a later scan the same day wins.
    async fn record_on(&self, season: &SeasonRecord, date: NaiveDate) -> Result<()> {
        let mut players = self.players.write().await;
        let mut touched = 0;
        for entry in season.entries.iter().filter(|e| e.found) {
            let Some(rating) = entry.rating.value() else {
                continue;
            };
            let history = players.entry(entry.key()).or_default();
            history.battle_tag.clone_from(&entry.battle_tag);
            match history.points.last_mut() {
                Some(last) if last.date == date => last.rating = rating,
                _ => history.points.push(RatingPoint { date, rating }),
            }
            touched += 1;
        }
        if touched > 0 {
            save_json(&self.path, &*players).await?;
            debug!("rating history: {touched} samples for {date}");
        }
        Ok(())
    }

    pub async fn history(&self, player: &str) -> Vec<RatingPoint> {
        let key = player.trim().to_lowercase();
        self.players
            .read()
            .await
            .get(&key)
            .map(|h| h.points.clone())
            .unwrap_or_default()
    }

    /// Rating history plus placements in every archived season the player
    /// was tracked in.
    pub async fn summary(&self, player: &str, archived: &[SeasonRecord]) -> PlayerSummary {
        let key = player.trim().to_lowercase();
        let points = self.history(&key).await;

        let mut battle_tag = player.trim().to_owned();
        let mut seasons = Vec::new();
        for record in archived.iter().rev() {
            if let Some(entry) = record.entries.iter().find(|e| e.key() == key) {
                battle_tag.clone_from(&entry.battle_tag);
                seasons.push(SeasonPlacement {
                    season_id: record.season_id,
                    local_rank: entry.local_rank,
                    rank: entry.rank,
                    rating: entry.rating.value(),
                });
            }
        }

        let peak_rating = points
            .iter()
            .map(|p| p.rating)
            .chain(seasons.iter().filter_map(|s| s.rating))
            .max();

        PlayerSummary { battle_tag, peak_rating, points, seasons }
    }
}

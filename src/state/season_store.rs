use crate::state::persist::{load_json, save_json};
use crate::state::ranking::{RankEntry, merge_entries};
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

const CURRENT_FILE: &str = "current_season.json";
const ARCHIVE_FILE: &str = "archive.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonRecord {
    pub season_id: u32,
    pub is_current: bool,
    pub last_scan: DateTime<Utc>,
    pub roster_fingerprint: Option<String>,
    pub entries: Vec<RankEntry>,
}

/// Which persistence tier a write goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Time-boxed slot for the season being played, re-scanned periodically.
    Current,
    /// Permanent per-season archive for closed seasons.
    Archive,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ArchiveFile {
    seasons: BTreeMap<u32, SeasonRecord>,
}

/// Two-tier season persistence: the current-season slot (memory plus an
/// on-disk snapshot) and the historical archive.
///
/// Writers for one season are serialized by the coordinator's scan permits;
/// the locks here only keep the in-memory maps and their files consistent.
#[derive(Debug)]
pub struct SeasonStore {
    dir: PathBuf,
    current: RwLock<Option<SeasonRecord>>,
    archive: RwLock<BTreeMap<u32, SeasonRecord>>,
}

impl SeasonStore {
    /// Open the store, recovering the snapshot and archive left by a previous run.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let current: Option<SeasonRecord> = load_json(&dir.join(CURRENT_FILE)).await?;
        let archive: ArchiveFile = load_json(&dir.join(ARCHIVE_FILE)).await?;
        info!(
            "season store opened at {}: current={:?}, archived={}",
            dir.display(),
            current.as_ref().map(|r| r.season_id),
            archive.seasons.len()
        );
        Ok(Self {
            dir,
            current: RwLock::new(current),
            archive: RwLock::new(archive.seasons),
        })
    }

    /// The current-season slot, if it holds `season_id`.
    pub async fn current(&self, season_id: u32) -> Option<SeasonRecord> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|r| r.season_id == season_id)
            .cloned()
    }

    pub async fn archived(&self, season_id: u32) -> Option<SeasonRecord> {
        self.archive.read().await.get(&season_id).cloned()
    }

    /// All archived seasons, oldest first.
    pub async fn archived_seasons(&self) -> Vec<SeasonRecord> {
        self.archive.read().await.values().cloned().collect()
    }

    /// Merge scan results into a season and persist the result.
    ///
    /// A full scan replaces the season's entries wholesale. A targeted scan
    /// only replaces entries for the players it carries and appends new ones.
    pub async fn merge_results(
        &self,
        season_id: u32,
        tier: Tier,
        entries: Vec<RankEntry>,
        targeted: bool,
        fingerprint: Option<String>,
    ) -> Result<SeasonRecord> {
        match tier {
            Tier::Current => {
                let mut slot = self.current.write().await;
                let existing = slot
                    .take()
                    .filter(|r| r.season_id == season_id)
                    .map(|r| r.entries)
                    .unwrap_or_default();
                let record = SeasonRecord {
                    season_id,
                    is_current: true,
                    last_scan: Utc::now(),
                    roster_fingerprint: fingerprint,
                    entries: merge_entries(existing, entries, targeted),
                };
                *slot = Some(record.clone());
                save_json(&self.dir.join(CURRENT_FILE), &*slot).await?;
                debug!("season {season_id}: current snapshot written ({} entries)", record.entries.len());
                Ok(record)
            }
            Tier::Archive => {
                let mut archive = self.archive.write().await;
                let existing = archive
                    .remove(&season_id)
                    .map(|r| r.entries)
                    .unwrap_or_default();
                let record = SeasonRecord {
                    season_id,
                    is_current: false,
                    last_scan: Utc::now(),
                    roster_fingerprint: fingerprint,
                    entries: merge_entries(existing, entries, targeted),
                };
                archive.insert(season_id, record.clone());
                let file = ArchiveFile { seasons: archive.clone() };
                save_json(&self.dir.join(ARCHIVE_FILE), &file).await?;
                debug!("season {season_id}: archived ({} entries)", record.entries.len());
                Ok(record)
            }
        }
    }

    /// Drop every stored record for a season (admin rescan).
    pub async fn clear(&self, season_id: u32) -> Result<()> {
        self.retire_current(season_id).await?;
        let mut archive = self.archive.write().await;
        if archive.remove(&season_id).is_some() {
            let file = ArchiveFile { seasons: archive.clone() };
            save_json(&self.dir.join(ARCHIVE_FILE), &file).await?;
        }
        Ok(())
    }

    /// Empty the current-season slot if it still holds `season_id`.
    pub async fn retire_current(&self, season_id: u32) -> Result<()> {
        let mut slot = self.current.write().await;
        if slot.as_ref().is_some_and(|r| r.season_id == season_id) {
            *slot = None;
            save_json(&self.dir.join(CURRENT_FILE), &*slot).await?;
        }
        Ok(())
    }
}

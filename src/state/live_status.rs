use crate::state::persist::{load_json, save_json};
use crate::state::ranking::RankEntry;
use crate::state::roster::PlayerTarget;
use anyhow::Result;
use futures_util::future::join_all;
use ladder_api::StreamSource;
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;

const AVATAR_FILE: &str = "avatars.json";
const BATCH_WIDTH: usize = 5;
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatus {
    pub battle_tag: String,
    pub twitch_user: String,
    pub is_live: bool,
    pub twitch_avatar: Option<String>,
}

/// Streaming status for tracked players. A failed lookup degrades to
/// "offline" with the last avatar seen for that handle.
pub struct LiveStatusEnricher {
    source: Arc<dyn StreamSource>,
    avatar_path: PathBuf,
    /// handle -> last known avatar URL, persisted across restarts.
    avatars: RwLock<BTreeMap<String, String>>,
    latest: RwLock<HashMap<String, LiveStatus>>,
    lookup_timeout: Duration,
}

impl LiveStatusEnricher {
    pub async fn open(source: Arc<dyn StreamSource>, dir: impl Into<PathBuf>) -> Result<Self> {
        let avatar_path = dir.into().join(AVATAR_FILE);
        let avatars = load_json(&avatar_path).await?;
        Ok(Self {
            source,
            avatar_path,
            avatars: RwLock::new(avatars),
            latest: RwLock::new(HashMap::new()),
            lookup_timeout: LOOKUP_TIMEOUT,
        })
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    /// Look up every roster player with a streaming handle, a few at a time.
    pub async fn refresh(&self, roster: &[PlayerTarget]) -> Vec<LiveStatus> {
        let handles: Vec<(&PlayerTarget, &str)> = roster
            .iter()
            .filter_map(|t| t.twitch.as_deref().map(|h| (t, h)))
            .collect();

        let mut statuses = Vec::with_capacity(handles.len());
        for batch in handles.chunks(BATCH_WIDTH) {
            let lookups = batch.iter().map(|(target, handle)| self.lookup(target, handle));
            statuses.extend(join_all(lookups).await);
        }

        let mut latest = self.latest.write().await;
        for status in &statuses {
            latest.insert(status.twitch_user.to_lowercase(), status.clone());
        }
        debug!(
            "live status refreshed: {} handles, {} live",
            statuses.len(),
            statuses.iter().filter(|s| s.is_live).count()
        );
        statuses
    }

    async fn lookup(&self, target: &PlayerTarget, handle: &str) -> LiveStatus {
        let key = handle.to_lowercase();
        let found = match timeout(self.lookup_timeout, self.source.lookup(handle)).await {
            Ok(Ok(profile)) => Some(profile),
            Ok(Err(e)) => {
                warn!("stream lookup for {handle} failed: {e}");
                None
            }
            Err(_) => {
                warn!("stream lookup for {handle} timed out");
                None
            }
        };

        match found {
            Some(profile) => {
                if let Some(url) = &profile.avatar_url {
                    self.remember_avatar(&key, url).await;
                }
                let twitch_avatar = match profile.avatar_url {
                    Some(url) => Some(url),
                    None => self.avatars.read().await.get(&key).cloned(),
                };
                LiveStatus {
                    battle_tag: target.id.clone(),
                    twitch_user: handle.to_owned(),
                    is_live: profile.live,
                    twitch_avatar,
                }
            }
            None => LiveStatus {
                battle_tag: target.id.clone(),
                twitch_user: handle.to_owned(),
                is_live: false,
                twitch_avatar: self.avatars.read().await.get(&key).cloned(),
            },
        }
    }

    async fn remember_avatar(&self, key: &str, url: &str) {
        let mut avatars = self.avatars.write().await;
        if avatars.get(key).is_some_and(|known| known == url) {
            return;
        }
        avatars.insert(key.to_owned(), url.to_owned());
        if let Err(e) = save_json(&self.avatar_path, &*avatars).await {
            warn!("avatar cache not saved: {e:#}");
        }
    }

    /// Statuses from the last refresh, without touching the network.
    pub async fn latest(&self) -> Vec<LiveStatus> {
        let mut statuses: Vec<LiveStatus> = self.latest.read().await.values().cloned().collect();
        statuses.sort_by(|a, b| a.battle_tag.cmp(&b.battle_tag));
        statuses
    }

    /// Stamp live state and avatars from the last refresh onto ranking entries.
    pub async fn annotate(&self, entries: &mut [RankEntry]) {
        let latest = self.latest.read().await;
        let avatars = self.avatars.read().await;
        for entry in entries {
            let Some(key) = entry.twitch_user.as_deref().map(str::to_lowercase) else {
                continue;
            };
            match latest.get(&key) {
                Some(status) => {
                    entry.is_live = status.is_live;
                    entry.avatar.clone_from(&status.twitch_avatar);
                }
                None => entry.avatar = avatars.get(&key).cloned(),
            }
        }
    }
}

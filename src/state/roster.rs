use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// A tracked player, with the lowercase keys the scanner matches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerTarget {
    /// Canonical, case-preserving identifier (`Name#1234`).
    pub id: String,
    /// Lowercased full identifier.
    pub full_key: String,
    /// Lowercased portion before the `#` discriminator.
    pub name_key: String,
    pub twitch: Option<String>,
}

impl PlayerTarget {
    pub fn new(id: impl Into<String>, twitch: Option<String>) -> Self {
        let id = id.into().trim().to_owned();
        let full_key = id.to_lowercase();
        let name_key = full_key.split('#').next().unwrap_or_default().to_owned();
        let twitch = twitch.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty());
        Self { id, full_key, name_key, twitch }
    }

    /// Whether an upstream account identifier refers to this player. The
    /// ladder sometimes hides the discriminator, so the bare name also counts.
    pub fn matches(&self, account_key: &str) -> bool {
        // Whole-name equality, not a prefix test: `Foo` must not claim `Foobar`.
        account_key == self.full_key || account_key == self.name_key
    }
}

/// The locally curated player list and its change fingerprint.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn load(&self) -> Result<Vec<PlayerTarget>>;

    /// Changes whenever the roster changes. `None` when it cannot be determined.
    async fn fingerprint(&self) -> Option<String>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RosterItem {
    Tag(String),
    Player {
        #[serde(rename = "battleTag", alias = "battletag")]
        battle_tag: String,
        #[serde(default)]
        twitch: Option<String>,
    },
}

/// `players.json` on disk; its mtime is the fingerprint.
#[derive(Debug, Clone)]
pub struct FileRoster {
    path: PathBuf,
}

impl FileRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RosterSource for FileRoster {
    async fn load(&self) -> Result<Vec<PlayerTarget>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("could not read roster {}", self.path.display()))?;
        let targets = parse_roster(&content)
            .with_context(|| format!("invalid roster json at {}", self.path.display()))?;
        debug!("roster loaded: {} players", targets.len());
        Ok(targets)
    }

    async fn fingerprint(&self) -> Option<String> {
        let modified = tokio::fs::metadata(&self.path).await.ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified).to_rfc3339())
    }
}

fn parse_roster(content: &str) -> Result<Vec<PlayerTarget>> {
    let items: Vec<RosterItem> = serde_json::from_str(content)?;
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(items.len());
    for item in items {
        let target = match item {
            RosterItem::Tag(tag) => PlayerTarget::new(tag, None),
            RosterItem::Player { battle_tag, twitch } => PlayerTarget::new(battle_tag, twitch),
        };
        if target.id.is_empty() {
            continue;
        }
        if !seen.insert(target.full_key.clone()) {
            debug!("duplicate roster entry {} ignored", target.id);
            continue;
        }
        targets.push(target);
    }
    Ok(targets)
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// In-memory roster whose fingerprint is bumped on every replacement.
    #[derive(Debug, Default)]
    pub struct MemoryRoster {
        inner: Mutex<(Vec<PlayerTarget>, u64)>,
        pub fail: std::sync::atomic::AtomicBool,
    }

    impl MemoryRoster {
        pub fn new(ids: &[&str]) -> Self {
            let roster = Self::default();
            roster.replace(ids);
            roster
        }

        pub fn replace(&self, ids: &[&str]) {
            let mut guard = self.inner.lock().unwrap();
            guard.0 = ids.iter().map(|id| PlayerTarget::new(*id, None)).collect();
            guard.1 += 1;
        }
    }

    #[async_trait]
    impl RosterSource for MemoryRoster {
        async fn load(&self) -> Result<Vec<PlayerTarget>> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                anyhow::bail!("roster unavailable");
            }
            Ok(self.inner.lock().unwrap().0.clone())
        }

        async fn fingerprint(&self) -> Option<String> {
            Some(format!("v{}", self.inner.lock().unwrap().1))
        }
    }
}

use crate::state::persist::{load_json, save_json};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;

const CATALOG_FILE: &str = "seasons.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonInfo {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub current: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonCatalog {
    pub current_season: u32,
    /// Ordered by season id, newest last.
    pub seasons: Vec<SeasonInfo>,
}

/// The persisted season list and the "which season is current" pointer.
/// Only the lifecycle detector rotates it.
#[derive(Debug)]
pub struct CatalogStore {
    path: PathBuf,
    state: RwLock<SeasonCatalog>,
}

impl CatalogStore {
    /// Load `seasons.json`, seeding it with `initial_season` on first run.
    pub async fn open(
        dir: impl Into<PathBuf>,
        initial_season: u32,
        label: impl Fn(u32) -> String,
    ) -> Result<Self> {
        let path = dir.into().join(CATALOG_FILE);
        let mut catalog: SeasonCatalog = load_json(&path).await?;
        if catalog.seasons.is_empty() {
            catalog = SeasonCatalog {
                current_season: initial_season,
                seasons: vec![SeasonInfo {
                    id: initial_season,
                    name: label(initial_season),
                    current: true,
                }],
            };
            save_json(&path, &catalog).await?;
            info!("season catalog initialised at season {initial_season}");
        }
        Ok(Self { path, state: RwLock::new(catalog) })
    }

    pub async fn snapshot(&self) -> SeasonCatalog {
        self.state.read().await.clone()
    }

    pub async fn current_season(&self) -> u32 {
        self.state.read().await.current_season
    }

    /// Make `new_season` current: the outgoing entry is relabelled historical
    /// and the catalog is persisted before returning.
    pub async fn rotate(&self, new_season: u32, name: String) -> Result<()> {
        let mut catalog = self.state.write().await;
        let previous = catalog.current_season;
        for season in &mut catalog.seasons {
            season.current = false;
        }
        match catalog.seasons.iter_mut().find(|s| s.id == new_season) {
            Some(existing) => existing.current = true,
            None => catalog.seasons.push(SeasonInfo { id: new_season, name, current: true }),
        }
        catalog.seasons.sort_by_key(|s| s.id);
        catalog.current_season = new_season;
        save_json(&self.path, &*catalog).await?;
        info!("season catalog rotated: {previous} -> {new_season}");
        Ok(())
    }
}

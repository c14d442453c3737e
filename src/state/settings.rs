use log::warn;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub region: String,
    pub ladder_id: String,
    pub ladder_endpoint: String,
    pub data_dir: PathBuf,
    pub roster_path: PathBuf,
    pub initial_season: u32,
    /// Display labels are `Season {id - offset}`. The upstream id and the
    /// community's season numbering disagree, so this is deployment data.
    pub season_label_offset: u32,
    pub scan: ScanSettings,
    pub cache_ttl: Duration,
    pub probe_interval: Duration,
    pub scan_workers: usize,
    pub live_interval: Duration,
    pub bind: String,
    pub admin_token: Option<String>,
    pub twitch_base_url: String,
    pub twitch_client_id: Option<String>,
    pub twitch_token: Option<String>,
}

/// Knobs for one leaderboard sweep.
#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    pub page_budget: u32,
    pub concurrency_width: u32,
    pub inter_batch_delay: Duration,
    pub page_timeout: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            page_budget: 100,
            concurrency_width: 5,
            inter_batch_delay: Duration::from_millis(750),
            page_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: "EU".into(),
            ladder_id: "battlegrounds".into(),
            ladder_endpoint: ladder_api::client::LEADERBOARD_ENDPOINT.into(),
            data_dir: PathBuf::from("data"),
            roster_path: PathBuf::from("players.json"),
            initial_season: 17,
            season_label_offset: 0,
            scan: ScanSettings::default(),
            cache_ttl: Duration::from_secs(600),
            probe_interval: Duration::from_secs(3600),
            scan_workers: 2,
            live_interval: Duration::from_secs(120),
            bind: "127.0.0.1:8787".into(),
            admin_token: None,
            twitch_base_url: ladder_api::client::TWITCH_HELIX.into(),
            twitch_client_id: None,
            twitch_token: None,
        }
    }
}

impl Settings {
    /// Read settings from the environment, falling back to defaults.
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(parse_or(key, text(key), default.as_secs()))
        };

        let scan = ScanSettings {
            page_budget: parse_or("LADDER_PAGE_BUDGET", text("LADDER_PAGE_BUDGET"), d.scan.page_budget)
                .max(1),
            concurrency_width: parse_or(
                "LADDER_BATCH_WIDTH",
                text("LADDER_BATCH_WIDTH"),
                d.scan.concurrency_width,
            )
            .max(1),
            inter_batch_delay: Duration::from_millis(parse_or(
                "LADDER_BATCH_DELAY_MS",
                text("LADDER_BATCH_DELAY_MS"),
                d.scan.inter_batch_delay.as_millis() as u64,
            )),
            page_timeout: secs("LADDER_PAGE_TIMEOUT_SECS", d.scan.page_timeout),
        };

        Self {
            region: text("LADDER_REGION").unwrap_or(d.region),
            ladder_id: text("LADDER_ID").unwrap_or(d.ladder_id),
            ladder_endpoint: text("LADDER_BASE_URL").unwrap_or(d.ladder_endpoint),
            data_dir: text("LADDER_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            roster_path: text("LADDER_ROSTER_PATH").map(PathBuf::from).unwrap_or(d.roster_path),
            initial_season: parse_or(
                "LADDER_INITIAL_SEASON",
                text("LADDER_INITIAL_SEASON"),
                d.initial_season,
            ),
            season_label_offset: parse_or(
                "LADDER_SEASON_LABEL_OFFSET",
                text("LADDER_SEASON_LABEL_OFFSET"),
                d.season_label_offset,
            ),
            scan,
            cache_ttl: secs("LADDER_CACHE_TTL_SECS", d.cache_ttl),
            probe_interval: secs("LADDER_PROBE_INTERVAL_SECS", d.probe_interval),
            scan_workers: parse_or("LADDER_SCAN_WORKERS", text("LADDER_SCAN_WORKERS"), d.scan_workers)
                .max(1),
            live_interval: secs("LADDER_LIVE_INTERVAL_SECS", d.live_interval),
            bind: text("LADDER_BIND").unwrap_or(d.bind),
            admin_token: text("LADDER_ADMIN_TOKEN"),
            twitch_base_url: text("TWITCH_BASE_URL").unwrap_or(d.twitch_base_url),
            twitch_client_id: text("TWITCH_CLIENT_ID"),
            twitch_token: text("TWITCH_TOKEN"),
        }
    }

    pub fn season_label(&self, season_id: u32) -> String {
        format!("Season {}", season_id.saturating_sub(self.season_label_offset))
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(v) => v.parse().unwrap_or_else(|_| {
            warn!("ignoring malformed {key}={v:?}, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Settings {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let s = from_pairs(&[]);
        assert_eq!(s.region, "EU");
        assert_eq!(s.initial_season, 17);
        assert_eq!(s.scan.page_budget, 100);
        assert_eq!(s.cache_ttl, Duration::from_secs(600));
        assert!(s.admin_token.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let s = from_pairs(&[
            ("LADDER_REGION", "US"),
            ("LADDER_PAGE_BUDGET", "40"),
            ("LADDER_BATCH_DELAY_MS", "0"),
            ("LADDER_SEASON_LABEL_OFFSET", "5"),
            ("LADDER_ADMIN_TOKEN", "s3cret"),
        ]);
        assert_eq!(s.region, "US");
        assert_eq!(s.scan.page_budget, 40);
        assert_eq!(s.scan.inter_batch_delay, Duration::ZERO);
        assert_eq!(s.season_label(17), "Season 12");
        assert_eq!(s.admin_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn malformed_numbers_fall_back() {
        let s = from_pairs(&[("LADDER_BATCH_WIDTH", "lots"), ("LADDER_SCAN_WORKERS", "0")]);
        assert_eq!(s.scan.concurrency_width, 5);
        assert_eq!(s.scan_workers, 1);
    }
}

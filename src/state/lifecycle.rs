use crate::state::catalog::CatalogStore;
use crate::state::coordinator::ScanCoordinator;
use crate::state::scanner::LeaderboardScanner;
use anyhow::{Context, Result};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Unchanged,
    Rotated { from: u32, to: u32 },
}

/// Watches the ranking source for the next season and rotates the catalog
/// when it appears.
pub struct SeasonLifecycleDetector {
    coordinator: ScanCoordinator,
    catalog: Arc<CatalogStore>,
    scanner: LeaderboardScanner,
    label: Box<dyn Fn(u32) -> String + Send + Sync>,
    probe_timeout: Duration,
}

impl SeasonLifecycleDetector {
    pub fn new(
        coordinator: ScanCoordinator,
        catalog: Arc<CatalogStore>,
        scanner: LeaderboardScanner,
        label: impl Fn(u32) -> String + Send + Sync + 'static,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            catalog,
            scanner,
            label: Box::new(label),
            probe_timeout,
        }
    }

    /// Probe once. On rotation the outgoing season is archived with a final
    /// full scan and the catalog moves on under the same scan permit, then the
    /// new season gets its first scan in the background.
    pub async fn check_once(&self) -> Result<LifecycleOutcome> {
        let current = self.catalog.current_season().await;
        let next = current + 1;
        if !self.scanner.has_rows(next, self.probe_timeout).await {
            debug!("season {next} not published yet");
            return Ok(LifecycleOutcome::Unchanged);
        }

        info!("season {next} has started, closing season {current}");
        let archived = self
            .coordinator
            .finalize_and_rotate(current, next, (self.label)(next))
            .await
            .with_context(|| format!("closing season {current} failed"))?;
        info!("season {current} archived with {} entries", archived.entries.len());

        self.coordinator.refresh_in_background(next).await?;
        Ok(LifecycleOutcome::Rotated { from: current, to: next })
    }

    /// Probe at startup and then every `period`. A failed probe leaves the
    /// catalog as it was; the next tick retries.
    pub async fn run(self, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.check_once().await {
                Ok(LifecycleOutcome::Rotated { from, to }) => info!("season rotated {from} -> {to}"),
                Ok(LifecycleOutcome::Unchanged) => {}
                Err(e) => error!("season lifecycle check failed: {e:#}"),
            }
        }
    }
}

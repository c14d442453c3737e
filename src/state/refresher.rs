use crate::state::coordinator::ScanCoordinator;
use crate::state::live_status::LiveStatusEnricher;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Periodic live-status refresh. Each tick also reads the current season so a
/// stale cache gets revalidated even when nobody is asking.
pub struct PeriodicRefresher {
    coordinator: ScanCoordinator,
    enricher: Arc<LiveStatusEnricher>,
    period: Duration,
}

impl PeriodicRefresher {
    pub fn new(coordinator: ScanCoordinator, enricher: Arc<LiveStatusEnricher>, period: Duration) -> Self {
        Self { coordinator, enricher, period }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.period);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        match self.coordinator.roster().await {
            Ok(roster) => {
                self.enricher.refresh(&roster).await;
            }
            Err(e) => warn!("live status skipped, roster unavailable: {e:#}"),
        }

        let current = self.coordinator.catalog().await.current_season;
        match self.coordinator.get_season(current).await {
            Ok(view) if view.refreshing => debug!("season {current} is being refreshed"),
            Ok(_) => {}
            Err(e) => warn!("season {current} warm-up failed: {e:#}"),
        }
    }
}

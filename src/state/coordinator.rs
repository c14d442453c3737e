use crate::state::catalog::{CatalogStore, SeasonCatalog};
use crate::state::history::{PlayerSummary, RatingHistory, RatingPoint};
use crate::state::ranking::{RankEntry, missing_targets, with_placeholders};
use crate::state::roster::{PlayerTarget, RosterSource};
use crate::state::scanner::{LeaderboardScanner, ScanJob};
use crate::state::season_store::{SeasonRecord, SeasonStore, Tier};
use crate::state::settings::{ScanSettings, Settings};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;

// ---------------------------------------------------------------------------
// In-progress set
// ---------------------------------------------------------------------------

/// Seasons with a scan in flight. The only shared state needing test-and-set.
#[derive(Debug, Default)]
struct InFlight {
    seasons: Mutex<HashSet<u32>>,
    released: Notify,
}

impl InFlight {
    fn try_acquire(self: &Arc<Self>, season_id: u32) -> Option<ScanPermit> {
        let mut seasons = self.seasons.lock().unwrap_or_else(PoisonError::into_inner);
        seasons.insert(season_id).then(|| ScanPermit {
            season_id,
            in_flight: Arc::clone(self),
        })
    }

    fn is_busy(&self, season_id: u32) -> bool {
        self.seasons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&season_id)
    }

    async fn wait_idle(&self, season_id: u32) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_busy(season_id) {
                return;
            }
            notified.await;
        }
    }
}

/// Exclusive right to scan and write one season. Released on drop, whether
/// the scan succeeded, failed or panicked.
#[derive(Debug)]
pub struct ScanPermit {
    season_id: u32,
    in_flight: Arc<InFlight>,
}

impl Drop for ScanPermit {
    fn drop(&mut self) {
        self.in_flight
            .seasons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.season_id);
        self.in_flight.released.notify_waiters();
    }
}

// ---------------------------------------------------------------------------
// Background pool
// ---------------------------------------------------------------------------

/// Detached scan tasks, at most `workers` running at once.
#[derive(Debug)]
struct BackgroundPool {
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundPool {
    fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let Ok(_worker) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
    }

    /// Wait for every submitted task, including ones submitted meanwhile.
    async fn drain(&self) {
        loop {
            let mut tasks =
                std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
            if tasks.is_empty() {
                return;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!("background scan task aborted: {e}");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    pub scan: ScanSettings,
    pub cache_ttl: Duration,
    pub workers: usize,
}

impl From<&Settings> for CoordinatorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            scan: settings.scan,
            cache_ttl: settings.cache_ttl,
            workers: settings.scan_workers,
        }
    }
}

/// What the read path serves for one season.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonView {
    pub season_id: u32,
    pub is_current: bool,
    pub last_scan: DateTime<Utc>,
    /// A scan for this season is running; the entries may change shortly.
    pub refreshing: bool,
    pub entries: Vec<RankEntry>,
}

impl SeasonView {
    fn new(record: &SeasonRecord, entries: Vec<RankEntry>, refreshing: bool) -> Self {
        Self {
            season_id: record.season_id,
            is_current: record.is_current,
            last_scan: record.last_scan,
            refreshing,
            entries,
        }
    }
}

/// Scan output waiting to be merged into the store.
struct Scanned {
    entries: Vec<RankEntry>,
    targeted: bool,
    fingerprint: Option<String>,
}

struct Inner {
    store: Arc<SeasonStore>,
    catalog: Arc<CatalogStore>,
    roster: Arc<dyn RosterSource>,
    scanner: LeaderboardScanner,
    history: Arc<RatingHistory>,
    config: CoordinatorConfig,
    in_flight: Arc<InFlight>,
    pool: BackgroundPool,
}

/// Single entry point of the read path. Deduplicates scans per season, serves
/// cached data while refreshing it in the background, and backfills closed
/// seasons with targeted scans for newly tracked players.
#[derive(Clone)]
pub struct ScanCoordinator {
    inner: Arc<Inner>,
}

impl ScanCoordinator {
    pub fn new(
        store: Arc<SeasonStore>,
        catalog: Arc<CatalogStore>,
        roster: Arc<dyn RosterSource>,
        scanner: LeaderboardScanner,
        history: Arc<RatingHistory>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                catalog,
                roster,
                scanner,
                history,
                config,
                in_flight: Arc::new(InFlight::default()),
                pool: BackgroundPool::new(config.workers),
            }),
        }
    }

    pub async fn catalog(&self) -> SeasonCatalog {
        self.inner.catalog.snapshot().await
    }

    pub async fn roster(&self) -> Result<Vec<PlayerTarget>> {
        self.inner.roster.load().await
    }

    pub fn is_scanning(&self, season_id: u32) -> bool {
        self.inner.in_flight.is_busy(season_id)
    }

    /// Ranking for a season, per the stale-while-revalidate policy.
    ///
    /// Errors only when nothing is stored and a synchronous scan cannot run.
    pub async fn get_season(&self, season_id: u32) -> Result<SeasonView> {
        loop {
            // Re-read every pass: a rotation may have moved the season to the archive.
            let tier = self.tier_for(season_id).await?;
            if let Some(record) = self.stored(season_id, tier).await {
                return Ok(self.serve_stored(record, tier).await);
            }

            let Some(permit) = self.inner.in_flight.try_acquire(season_id) else {
                debug!("season {season_id}: scan in flight, waiting for it");
                self.inner.in_flight.wait_idle(season_id).await;
                continue;
            };
            // Another scan may have landed between the read and the acquire.
            let tier = self.tier_for(season_id).await?;
            if self.stored(season_id, tier).await.is_some() {
                drop(permit);
                continue;
            }

            info!("season {season_id}: nothing stored, scanning synchronously");
            let record = self.run_scan(season_id, tier, None, &permit).await?;
            drop(permit);
            let entries = record.entries.clone();
            return Ok(SeasonView::new(&record, entries, false));
        }
    }

    /// Replace what is stored for a season with a fresh full scan. Stored data
    /// is only dropped once the scan has produced something.
    pub async fn force_rescan(&self, season_id: u32) -> Result<SeasonView> {
        let tier = self.tier_for(season_id).await?;
        let permit = self.acquire(season_id).await;
        let targets = self.inner.roster.load().await.context("roster load failed")?;
        info!("season {season_id}: forced rescan");
        let scanned = self.scan_season(season_id, targets, false, &permit).await?;
        self.inner.store.clear(season_id).await?;
        let record = self.commit(season_id, tier, scanned, &permit).await?;
        drop(permit);
        let entries = record.entries.clone();
        Ok(SeasonView::new(&record, entries, false))
    }

    /// Close a season: final full scan into the archive, then make `next`
    /// current, then empty the old current-season slot. The season's permit
    /// is held throughout so no reader rescans it halfway through.
    pub async fn finalize_and_rotate(&self, season_id: u32, next: u32, name: String) -> Result<SeasonRecord> {
        let permit = self.acquire(season_id).await;
        let record = self.run_scan(season_id, Tier::Archive, None, &permit).await?;
        self.inner.catalog.rotate(next, name).await?;
        self.inner.store.retire_current(season_id).await?;
        drop(permit);
        Ok(record)
    }

    /// Launch a background full scan unless one is already running.
    pub async fn refresh_in_background(&self, season_id: u32) -> Result<bool> {
        let tier = self.tier_for(season_id).await?;
        Ok(self.spawn_scan(season_id, tier, None))
    }

    /// Wait for every background scan submitted so far.
    pub async fn drain(&self) {
        self.inner.pool.drain().await;
    }

    pub async fn history(&self, player: &str) -> Vec<RatingPoint> {
        self.inner.history.history(player).await
    }

    pub async fn player_summary(&self, player: &str) -> PlayerSummary {
        let archived = self.inner.store.archived_seasons().await;
        self.inner.history.summary(player, &archived).await
    }

    async fn tier_for(&self, season_id: u32) -> Result<Tier> {
        let current = self.inner.catalog.current_season().await;
        if season_id > current {
            bail!("season {season_id} has not started (current season is {current})");
        }
        Ok(if season_id == current { Tier::Current } else { Tier::Archive })
    }

    async fn stored(&self, season_id: u32, tier: Tier) -> Option<SeasonRecord> {
        match tier {
            Tier::Current => self.inner.store.current(season_id).await,
            Tier::Archive => self.inner.store.archived(season_id).await,
        }
    }

    async fn acquire(&self, season_id: u32) -> ScanPermit {
        loop {
            if let Some(permit) = self.inner.in_flight.try_acquire(season_id) {
                return permit;
            }
            self.inner.in_flight.wait_idle(season_id).await;
        }
    }

    async fn serve_stored(&self, record: SeasonRecord, tier: Tier) -> SeasonView {
        let season_id = record.season_id;
        let roster = match self.inner.roster.load().await {
            Ok(roster) => Some(roster),
            Err(e) => {
                warn!("season {season_id}: serving stored data without roster check: {e:#}");
                None
            }
        };

        let refreshing = match (tier, &roster) {
            (Tier::Current, _) => {
                if self.is_stale(&record).await {
                    self.spawn_scan(season_id, tier, None)
                } else {
                    self.is_scanning(season_id)
                }
            }
            (Tier::Archive, Some(roster)) => {
                let missing: Vec<PlayerTarget> =
                    missing_targets(roster, &record.entries).into_iter().cloned().collect();
                if missing.is_empty() {
                    self.is_scanning(season_id)
                } else {
                    debug!("season {season_id}: {} roster players missing from archive", missing.len());
                    self.spawn_scan(season_id, tier, Some(missing))
                }
            }
            (Tier::Archive, None) => self.is_scanning(season_id),
        };

        let entries = match &roster {
            Some(roster) => with_placeholders(&record.entries, roster),
            None => record.entries.clone(),
        };
        SeasonView::new(&record, entries, refreshing)
    }

    async fn is_stale(&self, record: &SeasonRecord) -> bool {
        let ttl = chrono::Duration::from_std(self.inner.config.cache_ttl).unwrap_or(chrono::Duration::MAX);
        if Utc::now() - record.last_scan > ttl {
            debug!("season {}: cache older than {:?}", record.season_id, self.inner.config.cache_ttl);
            return true;
        }
        let fingerprint = self.inner.roster.fingerprint().await;
        if fingerprint != record.roster_fingerprint {
            debug!("season {}: roster changed since last scan", record.season_id);
            return true;
        }
        false
    }

    /// Submit a background scan if the season is idle. Returns whether a scan
    /// is now running for it (newly launched or already in flight).
    fn spawn_scan(&self, season_id: u32, tier: Tier, targets: Option<Vec<PlayerTarget>>) -> bool {
        let Some(permit) = self.inner.in_flight.try_acquire(season_id) else {
            debug!("season {season_id}: scan already in flight");
            return true;
        };
        let this = self.clone();
        self.inner.pool.submit(async move {
            if let Err(e) = this.run_scan(season_id, tier, targets, &permit).await {
                warn!("background scan for season {season_id} failed, keeping previous data: {e:#}");
            }
            drop(permit);
        });
        true
    }

    /// Scan the whole roster (`targets == None`) or just the given players.
    async fn run_scan(
        &self,
        season_id: u32,
        tier: Tier,
        targets: Option<Vec<PlayerTarget>>,
        permit: &ScanPermit,
    ) -> Result<SeasonRecord> {
        match targets {
            Some(targets) => self.run_job(season_id, tier, targets, true, permit).await,
            None => {
                let targets = self.inner.roster.load().await.context("roster load failed")?;
                self.run_job(season_id, tier, targets, false, permit).await
            }
        }
    }

    async fn run_job(
        &self,
        season_id: u32,
        tier: Tier,
        targets: Vec<PlayerTarget>,
        targeted: bool,
        permit: &ScanPermit,
    ) -> Result<SeasonRecord> {
        let scanned = self.scan_season(season_id, targets, targeted, permit).await?;
        self.commit(season_id, tier, scanned, permit).await
    }

    /// Scan without writing anything. Fails when every page requested failed:
    /// an unreachable ladder must not overwrite stored standings.
    async fn scan_season(
        &self,
        season_id: u32,
        targets: Vec<PlayerTarget>,
        targeted: bool,
        _permit: &ScanPermit,
    ) -> Result<Scanned> {
        // Taken before the scan: a roster edit during the scan leaves the
        // record stale and schedules another pass.
        let fingerprint = self.inner.roster.fingerprint().await;
        let job = ScanJob {
            season_id,
            targets,
            targeted,
            settings: self.inner.config.scan,
        };
        let report = self.inner.scanner.scan(&job).await;
        if report.pages_requested > 0 && report.failed_pages == report.pages_requested {
            bail!(
                "season {season_id}: all {} pages failed, keeping stored data",
                report.pages_requested
            );
        }
        Ok(Scanned { entries: report.entries, targeted, fingerprint })
    }

    async fn commit(
        &self,
        season_id: u32,
        tier: Tier,
        scanned: Scanned,
        _permit: &ScanPermit,
    ) -> Result<SeasonRecord> {
        let Scanned { entries, targeted, fingerprint } = scanned;
        let record = self
            .inner
            .store
            .merge_results(season_id, tier, entries, targeted, fingerprint)
            .await
            .with_context(|| format!("could not persist season {season_id}"))?;

        if tier == Tier::Current
            && !targeted
            && let Err(e) = self.inner.history.record(&record).await
        {
            warn!("rating history not updated: {e:#}");
        }
        Ok(record)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::state::roster::testing::MemoryRoster;
    use crate::state::scanner::testing::{FakeLadder, fast_settings};
    use tempfile::TempDir;

    pub struct Harness {
        pub dir: TempDir,
        pub ladder: Arc<FakeLadder>,
        pub roster: Arc<MemoryRoster>,
        pub store: Arc<SeasonStore>,
        pub catalog: Arc<CatalogStore>,
        pub coordinator: ScanCoordinator,
    }

    pub async fn harness(ladder: FakeLadder, roster: &[&str], current: u32, ttl: Duration) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ladder = Arc::new(ladder);
        let roster = Arc::new(MemoryRoster::new(roster));
        let store = Arc::new(SeasonStore::open(dir.path()).await.unwrap());
        let catalog = Arc::new(
            CatalogStore::open(dir.path(), current, |id| format!("Season {id}")).await.unwrap(),
        );
        let history = Arc::new(RatingHistory::open(dir.path()).await.unwrap());
        let coordinator = ScanCoordinator::new(
            store.clone(),
            catalog.clone(),
            roster.clone(),
            LeaderboardScanner::new(ladder.clone()),
            history,
            CoordinatorConfig { scan: fast_settings(10, 2), cache_ttl: ttl, workers: 2 },
        );
        Harness { dir, ladder, roster, store, catalog, coordinator }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::state::ranking::Rating;
    use crate::state::scanner::testing::{FakeLadder, row};
    use std::sync::atomic::Ordering;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn cold_current_season_scans_synchronously() {
        let ladder = FakeLadder::default();
        ladder.set_page(17, 1, vec![row("Bar#222", 5, 9000)]);
        let h = harness(ladder, &["Foo#111", "Bar#222"], 17, HOUR).await;

        let view = h.coordinator.get_season(17).await.unwrap();

        assert!(view.is_current);
        assert!(!view.refreshing);
        assert_eq!(view.entries[0].battle_tag, "Bar#222");
        assert_eq!(view.entries[0].local_rank, 1);
        assert_eq!(view.entries[1].rating, Rating::NO_DATA);
        assert!(h.store.current(17).await.is_some());
        assert!(!h.coordinator.is_scanning(17));
    }

    #[tokio::test]
    async fn fresh_cache_is_served_without_scanning() {
        let h = harness(FakeLadder::default(), &["Foo#111"], 17, HOUR).await;
        h.coordinator.get_season(17).await.unwrap();
        h.ladder.clear_requests();

        let view = h.coordinator.get_season(17).await.unwrap();
        h.coordinator.drain().await;

        assert!(!view.refreshing);
        assert!(h.ladder.requests().is_empty());
    }

    #[tokio::test]
    async fn concurrent_stale_reads_start_one_scan() {
        let ladder = FakeLadder::with_latency(Duration::from_millis(50));
        ladder.set_page(17, 1, vec![row("Foo#111", 1, 9000)]);
        let h = harness(ladder, &["Foo#111"], 17, Duration::ZERO).await;
        h.coordinator.get_season(17).await.unwrap();
        h.ladder.clear_requests();

        let reads = (0..8).map(|_| h.coordinator.get_season(17));
        let views = futures_util::future::join_all(reads).await;
        h.coordinator.drain().await;

        assert!(views.iter().all(|v| v.as_ref().unwrap().refreshing));
        assert_eq!(h.ladder.scans_started(17), 1);
    }

    #[tokio::test]
    async fn concurrent_cold_reads_share_one_scan() {
        let ladder = FakeLadder::with_latency(Duration::from_millis(50));
        ladder.set_page(17, 1, vec![row("Foo#111", 1, 9000)]);
        let h = harness(ladder, &["Foo#111"], 17, HOUR).await;

        let reads = (0..5).map(|_| h.coordinator.get_season(17));
        let views = futures_util::future::join_all(reads).await;

        for view in views {
            assert_eq!(view.unwrap().entries[0].rank, Some(1));
        }
        assert_eq!(h.ladder.scans_started(17), 1);
    }

    #[tokio::test]
    async fn roster_change_triggers_rescan_within_ttl() {
        let ladder = FakeLadder::default();
        ladder.set_page(17, 1, vec![row("Foo#111", 3, 9000), row("Bar#222", 4, 8900)]);
        let h = harness(ladder, &["Foo#111"], 17, HOUR).await;
        h.coordinator.get_season(17).await.unwrap();
        h.ladder.clear_requests();

        h.roster.replace(&["Foo#111", "Bar#222"]);
        let view = h.coordinator.get_season(17).await.unwrap();

        assert!(view.refreshing);
        let bar = view.entries.iter().find(|e| e.battle_tag == "Bar#222").unwrap();
        assert_eq!(bar.rating, Rating::UPDATING, "served as placeholder until the rescan lands");

        h.coordinator.drain().await;
        assert_eq!(h.ladder.scans_started(17), 1);
        let record = h.store.current(17).await.unwrap();
        assert_eq!(record.entries.len(), 2);
        assert!(record.entries.iter().all(|e| e.found));
    }

    #[tokio::test]
    async fn past_season_backfills_only_new_player() {
        let ladder = FakeLadder::with_latency(Duration::from_millis(20));
        ladder.set_page(16, 1, vec![row("Foo#111", 10, 9000), row("Bar#222", 20, 8000)]);
        let h = harness(ladder, &["Foo#111", "Bar#222"], 17, HOUR).await;
        let first = h.coordinator.get_season(16).await.unwrap();
        assert!(!first.is_current);

        // The ladder has since moved on; archived entries must not follow it.
        h.ladder.set_page(16, 1, vec![
            row("Foo#111", 1, 12000),
            row("Bar#222", 2, 11000),
            row("New#333", 30, 7000),
        ]);
        h.ladder.clear_requests();
        h.roster.replace(&["Foo#111", "Bar#222", "New#333"]);

        let view = h.coordinator.get_season(16).await.unwrap();
        assert!(view.refreshing);
        let new = view.entries.iter().find(|e| e.battle_tag == "New#333").unwrap();
        assert_eq!(new.rating, Rating::UPDATING);
        assert_eq!(h.store.archived(16).await.unwrap().entries.len(), 2, "placeholders are not persisted");

        h.coordinator.drain().await;
        assert_eq!(h.ladder.scans_started(16), 1);

        let archived = h.store.archived(16).await.unwrap();
        let by_tag = |tag: &str| archived.entries.iter().find(|e| e.battle_tag == tag).unwrap().clone();
        let before_foo = first.entries.iter().find(|e| e.battle_tag == "Foo#111").unwrap();
        let before_bar = first.entries.iter().find(|e| e.battle_tag == "Bar#222").unwrap();
        assert_eq!(by_tag("Foo#111"), *before_foo);
        assert_eq!(by_tag("Bar#222"), *before_bar);
        assert_eq!(by_tag("New#333").rank, Some(30));
        assert_eq!(by_tag("New#333").local_rank, 3);
    }

    #[tokio::test]
    async fn complete_archive_triggers_no_scan() {
        let ladder = FakeLadder::default();
        ladder.set_page(16, 1, vec![row("Foo#111", 10, 9000)]);
        let h = harness(ladder, &["Foo#111"], 17, HOUR).await;
        h.coordinator.get_season(16).await.unwrap();
        h.ladder.clear_requests();

        let view = h.coordinator.get_season(16).await.unwrap();
        h.coordinator.drain().await;

        assert!(!view.refreshing);
        assert!(h.ladder.requests().is_empty());
    }

    #[tokio::test]
    async fn roster_failure_keeps_serving_cache() {
        let h = harness(FakeLadder::default(), &["Foo#111"], 17, Duration::ZERO).await;
        h.coordinator.get_season(17).await.unwrap();
        h.roster.fail.store(true, Ordering::SeqCst);

        let view = h.coordinator.get_season(17).await.unwrap();
        h.coordinator.drain().await;

        assert_eq!(view.entries.len(), 1);
        assert!(!h.coordinator.is_scanning(17), "failed job must clear its flag");
        assert_eq!(h.store.current(17).await.unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn cold_start_with_unreadable_roster_is_an_error() {
        let h = harness(FakeLadder::default(), &["Foo#111"], 17, HOUR).await;
        h.roster.fail.store(true, Ordering::SeqCst);

        assert!(h.coordinator.get_season(17).await.is_err());
        assert!(!h.coordinator.is_scanning(17));
    }

    #[tokio::test]
    async fn future_season_is_rejected() {
        let h = harness(FakeLadder::default(), &["Foo#111"], 17, HOUR).await;
        assert!(h.coordinator.get_season(18).await.is_err());
        assert!(h.ladder.requests().is_empty());
    }

    #[tokio::test]
    async fn force_rescan_replaces_archived_entries() {
        let ladder = FakeLadder::default();
        ladder.set_page(16, 1, vec![row("Foo#111", 10, 9000)]);
        let h = harness(ladder, &["Foo#111"], 17, HOUR).await;
        h.coordinator.get_season(16).await.unwrap();

        h.ladder.set_page(16, 1, vec![row("Foo#111", 2, 11000)]);
        let view = h.coordinator.force_rescan(16).await.unwrap();

        assert_eq!(view.entries[0].rank, Some(2));
        assert_eq!(h.store.archived(16).await.unwrap().entries[0].rank, Some(2));
    }

    fn take_ladder_down(ladder: &FakeLadder, season: u32) {
        for page in 1..=10 {
            ladder.fail_page(season, page);
        }
    }

    #[tokio::test]
    async fn ladder_outage_keeps_current_standings() {
        let ladder = FakeLadder::default();
        ladder.set_page(17, 1, vec![row("Foo#111", 3, 9000)]);
        let h = harness(ladder, &["Foo#111"], 17, Duration::ZERO).await;
        h.coordinator.get_season(17).await.unwrap();

        take_ladder_down(&h.ladder, 17);
        let view = h.coordinator.get_season(17).await.unwrap();
        h.coordinator.drain().await;

        assert!(view.refreshing);
        assert_eq!(view.entries[0].rank, Some(3));
        let stored = h.store.current(17).await.unwrap();
        assert!(stored.entries[0].found);
        assert_eq!(stored.entries[0].rank, Some(3));
        assert!(!h.coordinator.is_scanning(17));
    }

    #[tokio::test]
    async fn ladder_outage_fails_cold_read() {
        let h = harness(FakeLadder::default(), &["Foo#111"], 17, HOUR).await;
        take_ladder_down(&h.ladder, 17);

        assert!(h.coordinator.get_season(17).await.is_err());
        assert!(h.store.current(17).await.is_none());
    }

    #[tokio::test]
    async fn ladder_outage_leaves_backfill_pending() {
        let ladder = FakeLadder::default();
        ladder.set_page(16, 1, vec![row("Foo#111", 10, 9000)]);
        let h = harness(ladder, &["Foo#111"], 17, HOUR).await;
        h.coordinator.get_season(16).await.unwrap();

        take_ladder_down(&h.ladder, 16);
        h.roster.replace(&["Foo#111", "New#333"]);
        h.coordinator.get_season(16).await.unwrap();
        h.coordinator.drain().await;

        assert_eq!(h.store.archived(16).await.unwrap().entries.len(), 1);

        h.ladder.clear_requests();
        let view = h.coordinator.get_season(16).await.unwrap();
        h.coordinator.drain().await;
        assert!(view.refreshing, "missing player is retried");
        assert_eq!(h.ladder.scans_started(16), 1);
    }

    #[tokio::test]
    async fn ladder_outage_does_not_clear_on_rescan() {
        let ladder = FakeLadder::default();
        ladder.set_page(16, 1, vec![row("Foo#111", 10, 9000)]);
        let h = harness(ladder, &["Foo#111"], 17, HOUR).await;
        h.coordinator.get_season(16).await.unwrap();

        take_ladder_down(&h.ladder, 16);
        assert!(h.coordinator.force_rescan(16).await.is_err());

        let archived = h.store.archived(16).await.unwrap();
        assert_eq!(archived.entries[0].rank, Some(10));
        assert!(!h.coordinator.is_scanning(16));
    }

    #[tokio::test]
    async fn ladder_outage_blocks_finalize() {
        let ladder = FakeLadder::default();
        ladder.set_page(17, 1, vec![row("Foo#111", 3, 9000)]);
        let h = harness(ladder, &["Foo#111"], 17, HOUR).await;
        h.coordinator.get_season(17).await.unwrap();

        take_ladder_down(&h.ladder, 17);
        let result = h.coordinator.finalize_and_rotate(17, 18, "Season 18".into()).await;

        assert!(result.is_err());
        assert!(h.store.archived(17).await.is_none());
        assert_eq!(h.store.current(17).await.unwrap().entries[0].rank, Some(3));
        assert_eq!(h.catalog.current_season().await, 17);
    }

    #[tokio::test]
    async fn reads_during_rotation_never_rescan_closed_season() {
        let ladder = FakeLadder::with_latency(Duration::from_millis(20));
        ladder.set_page(17, 1, vec![row("Foo#111", 3, 9000)]);
        let h = harness(ladder, &["Foo#111"], 17, HOUR).await;
        h.coordinator.get_season(17).await.unwrap();
        h.ladder.clear_requests();

        let rotate = h.coordinator.finalize_and_rotate(17, 18, "Season 18".into());
        let reads = (0..10u64).map(|i| {
            let coordinator = h.coordinator.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(i * 5)).await;
                coordinator.get_season(17).await
            }
        });
        let (rotated, views) = tokio::join!(rotate, futures_util::future::join_all(reads));
        h.coordinator.drain().await;

        rotated.unwrap();
        assert!(views.iter().all(|v| v.as_ref().unwrap().entries[0].rank == Some(3)));
        assert_eq!(h.ladder.scans_started(17), 1, "only the final scan ran");
        assert_eq!(h.catalog.current_season().await, 18);
        assert!(h.store.current(17).await.is_none());

        let view = h.coordinator.get_season(17).await.unwrap();
        assert!(!view.is_current);
        assert_eq!(h.ladder.scans_started(17), 1);
    }

    #[tokio::test]
    async fn current_season_scan_records_history() {
        let ladder = FakeLadder::default();
        ladder.set_page(17, 1, vec![row("Foo#111", 10, 9100)]);
        let h = harness(ladder, &["Foo#111"], 17, HOUR).await;
        h.coordinator.get_season(17).await.unwrap();

        let points = h.coordinator.history("foo#111").await;
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].rating, 9100);
    }
}

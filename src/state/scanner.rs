use crate::state::ranking::{RankEntry, Rating};
use crate::state::roster::PlayerTarget;
use crate::state::settings::ScanSettings;
use futures_util::future::join_all;
use ladder_api::{LadderRow, LadderSource};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// One bounded sweep of the ladder for one season. Not persisted.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub season_id: u32,
    pub targets: Vec<PlayerTarget>,
    /// Delta scan for a subset of the roster rather than the full roster.
    pub targeted: bool,
    pub settings: ScanSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every target was found.
    AllResolved,
    /// A whole batch came back without rows: past the end of the ladder.
    Exhausted,
    BudgetSpent,
    NoTargets,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    /// One entry per target, in target order. Not ranked.
    pub entries: Vec<RankEntry>,
    pub pages_requested: u32,
    pub failed_pages: u32,
    pub stop: StopReason,
}

/// Walks the ladder's pages in batches of concurrent fetches until every
/// target is found, the ladder runs out, or the page budget is spent.
#[derive(Clone)]
pub struct LeaderboardScanner {
    source: Arc<dyn LadderSource>,
}

impl LeaderboardScanner {
    pub fn new(source: Arc<dyn LadderSource>) -> Self {
        Self { source }
    }

    /// Run a scan. Never fails: a page that errors or times out counts as empty.
    pub async fn scan(&self, job: &ScanJob) -> ScanReport {
        let mut entries: Vec<RankEntry> = job.targets.iter().map(RankEntry::unresolved).collect();
        let mut pages_requested = 0;
        let mut failed_pages = 0;

        if job.targets.is_empty() {
            return ScanReport { entries, pages_requested, failed_pages, stop: StopReason::NoTargets };
        }

        let settings = job.settings;
        let width = settings.concurrency_width.max(1);
        let mut next_page = 1;

        let stop = loop {
            if next_page > settings.page_budget {
                break StopReason::BudgetSpent;
            }
            let last_page = (next_page + width - 1).min(settings.page_budget);

            // join_all keeps page order, so rows are applied in ladder order.
            let batch = join_all(
                (next_page..=last_page)
                    .map(|page| self.fetch_or_empty(job.season_id, page, settings.page_timeout)),
            )
            .await;

            pages_requested += last_page - next_page + 1;
            let mut batch_rows = 0;
            for page in batch {
                let Some(rows) = page else {
                    failed_pages += 1;
                    continue;
                };
                batch_rows += rows.len();
                apply_rows(&job.targets, &mut entries, &rows);
            }
            debug!(
                "season {} pages {next_page}-{last_page}: {batch_rows} rows",
                job.season_id
            );

            if entries.iter().all(|e| e.found) {
                break StopReason::AllResolved;
            }
            if batch_rows == 0 {
                break StopReason::Exhausted;
            }

            next_page = last_page + 1;
            if next_page <= settings.page_budget && !settings.inter_batch_delay.is_zero() {
                tokio::time::sleep(settings.inter_batch_delay).await;
            }
        };

        let found = entries.iter().filter(|e| e.found).count();
        info!(
            "scan season {} ({}): {found}/{} found, {pages_requested} pages ({failed_pages} failed), stop={stop:?}",
            job.season_id,
            if job.targeted { "targeted" } else { "full" },
            entries.len(),
        );

        ScanReport { entries, pages_requested, failed_pages, stop }
    }

    /// Probe whether a season has any rows on its first page.
    pub async fn has_rows(&self, season_id: u32, timeout: Duration) -> bool {
        self.fetch_or_empty(season_id, 1, timeout)
            .await
            .is_some_and(|rows| !rows.is_empty())
    }

    async fn fetch_or_empty(&self, season_id: u32, page: u32, timeout: Duration) -> Option<Vec<LadderRow>> {
        match tokio::time::timeout(timeout, self.source.fetch_page(season_id, page)).await {
            Ok(Ok(rows)) => Some(rows),
            Ok(Err(e)) => {
                warn!("season {season_id} page {page} failed, treating as empty: {e}");
                None
            }
            Err(_) => {
                warn!("season {season_id} page {page} timed out after {timeout:?}, treating as empty");
                None
            }
        }
    }
}

/// Assign ladder rows to unresolved targets. Each row goes to the first
/// unresolved target it matches and a target is assigned at most once, so
/// re-applying the same rows changes nothing.
pub fn apply_rows(targets: &[PlayerTarget], entries: &mut [RankEntry], rows: &[LadderRow]) {
    for row in rows {
        let key = row.match_key();
        let slot = targets
            .iter()
            .zip(entries.iter_mut())
            .find(|(target, entry)| !entry.found && target.matches(&key));
        if let Some((_, entry)) = slot {
            entry.found = true;
            entry.rank = Some(row.rank);
            entry.rating = row.rating.map(Rating::Value).unwrap_or(Rating::NO_DATA);
        }
    }
}

//! Concurrent run scheduler.
//!
//! Fans the item list out over a bounded number of workers, keeps a progress
//! bar honest while results arrive in completion order, and hands back the
//! results re-sorted into enumeration order so downstream consumers (concat,
//! summaries) see a deterministic sequence.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::filename::existing_output;
use crate::proxy::ProxyPool;
use crate::stats::{TextStats, group_thousands, text_stats};
use crate::transport::TranscriptSource;
use crate::worker::{DownloadConfig, DownloadResult, DownloadStatus, Downloader, Item};

/// Runs a whole batch and reports per-status buckets at the end.
pub struct Scheduler {
    downloader: Arc<Downloader>,
    config: DownloadConfig,
    jobs: usize,
    /// Rewrite outputs that already exist instead of skipping them.
    overwrite: bool,
    /// Skip videos with an existing output file. Disabled when a
    /// concatenation pass follows, which needs every document fresh.
    skip_existing: bool,
}

impl Scheduler {
    /// Builds a scheduler running at most `jobs` downloads at once.
    #[must_use]
    pub fn new(
        source: Arc<dyn TranscriptSource>,
        pool: Option<Arc<ProxyPool>>,
        config: DownloadConfig,
        jobs: usize,
        overwrite: bool,
        skip_existing: bool,
    ) -> Self {
        Scheduler {
            downloader: Arc::new(Downloader::new(source, pool, config.clone())),
            config,
            jobs: jobs.max(1),
            overwrite,
            skip_existing,
        }
    }

    /// Downloads every item, returning results sorted by sequence number.
    pub async fn run(&self, items: Vec<Item>) -> Vec<DownloadResult> {
        let total = items.len() as u64;
        let progress = ProgressBar::new(total);
        progress.set_style(progress_style());

        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut tasks: JoinSet<DownloadResult> = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let sequence = index + 1;

            if let Some(result) = self.skip_if_downloaded(sequence, &item) {
                debug!(video_id = %item.id, "output exists; skipping");
                progress.inc(1);
                tasks.spawn(async move { result });
                continue;
            }

            let downloader = Arc::clone(&self.downloader);
            let semaphore = Arc::clone(&semaphore);
            let bar = progress.clone();
            tasks.spawn(async move {
                // The semaphore is never closed; acquire cannot fail.
                let _permit = semaphore.acquire().await.ok();
                let result = downloader.grab(sequence, item).await;
                bar.inc(1);
                result
            });
        }

        let mut results = Vec::with_capacity(total as usize);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "worker task panicked"),
            }
        }
        progress.finish_and_clear();

        results.sort_by_key(|r| r.sequence);
        results
    }

    fn skip_if_downloaded(&self, sequence: usize, item: &Item) -> Option<DownloadResult> {
        if self.overwrite || !self.skip_existing {
            return None;
        }
        let path = existing_output(
            &self.config.folder,
            &item.id,
            self.config.format.extension(),
        )?;
        let stats = std::fs::read_to_string(&path)
            .ok()
            .map(|text| text_stats(&text));
        Some(DownloadResult {
            sequence,
            item: item.clone(),
            status: DownloadStatus::Ok,
            path: Some(path),
            stats,
            message: Some("already downloaded".to_string()),
        })
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {percent}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Per-status view over a finished run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Successfully written (or skipped-as-done) videos.
    pub ok: usize,
    /// Videos with no caption track.
    pub no_captions: usize,
    /// Videos that failed outright.
    pub failed: usize,
    /// Videos lost to proxy-pool exhaustion.
    pub proxy_failed: usize,
    /// Every proxy handed to a worker during the run.
    pub proxies_used: Vec<String>,
    /// Proxies banned during the run.
    pub proxies_banned: Vec<String>,
}

impl RunSummary {
    /// Tallies `results` and snapshots the pool's bookkeeping.
    #[must_use]
    pub fn tally(results: &[DownloadResult], pool: Option<&ProxyPool>) -> Self {
        let mut summary = RunSummary::default();
        for result in results {
            match result.status {
                DownloadStatus::Ok => summary.ok += 1,
                DownloadStatus::NoCaptions => summary.no_captions += 1,
                DownloadStatus::Failed => summary.failed += 1,
                DownloadStatus::ProxyFailed => summary.proxy_failed += 1,
            }
        }
        if let Some(pool) = pool {
            summary.proxies_used = pool.used_snapshot();
            summary.proxies_banned = pool.banned_snapshot();
        }
        summary
    }

    /// Process exit code: 0 for a clean run, 2 when anything failed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.failed + self.proxy_failed > 0 { 2 } else { 0 }
    }

    /// One-line human summary for the end of the run.
    #[must_use]
    pub fn render(&self) -> String {
        let mut line = format!(
            "Summary: ✓ {} ok • ↯ {} no-caption • ⚠ {} failed",
            self.ok,
            self.no_captions,
            self.failed + self.proxy_failed
        );
        if !self.proxies_used.is_empty() {
            line.push_str(&format!("\nProxies used: {}", self.proxies_used.join(", ")));
        }
        if !self.proxies_banned.is_empty() {
            line.push_str(&format!(
                "\nProxies banned: {}",
                self.proxies_banned.join(", ")
            ));
        }
        line
    }
}

/// Renders the `--stats-top` block: the largest written files ranked by word
/// count, plus a grand total. `top == 0` lists everything; `None` when no
/// file carries stats.
#[must_use]
pub fn render_file_statistics(results: &[DownloadResult], top: usize) -> Option<String> {
    let mut sized: Vec<(&DownloadResult, TextStats)> = results
        .iter()
        .filter(|r| r.status == DownloadStatus::Ok)
        .filter_map(|r| r.stats.map(|s| (r, s)))
        .collect();
    if sized.is_empty() {
        return None;
    }

    let total = sized
        .iter()
        .fold(TextStats::default(), |acc, (_, s)| acc + *s);
    sized.sort_by(|a, b| b.1.words.cmp(&a.1.words));
    let top = if top == 0 { sized.len() } else { top };

    let mut out = String::from("File statistics (largest first):\n");
    for (result, stats) in sized.iter().take(top) {
        let name = result
            .path
            .as_deref()
            .and_then(|p| p.file_name())
            .map_or_else(|| result.item.id.clone(), |n| n.to_string_lossy().into_owned());
        out.push_str(&format!(
            "  {:>12} words  {:>10} lines  {:>12} chars  {}\n",
            group_thousands(stats.words),
            group_thousands(stats.lines),
            group_thousands(stats.chars),
            name
        ));
    }
    out.push_str(&format!(
        "  Total: {} words · {} lines · {} chars across {} files",
        group_thousands(total.words),
        group_thousands(total.lines),
        group_thousands(total.chars),
        sized.len()
    ));
    Some(out)
}

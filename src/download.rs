use futures::{future, prelude::*, stream};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tracing::{error, info, warn};

use crate::bounding_box::BoundingBox;
use crate::config::Config;
use crate::error::{Result, TileError};
use crate::fetcher::{HttpFetcher, TileFetcher};
use crate::progress::{Progress, RunReport, TileOutcome};
use crate::shutdown::Shutdown;
use crate::store::{FsTileStore, TileStore};
use crate::tile::{Tile, TileRange, ZoomRange};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Backoff doubling stops growing after this many retries.
const MAX_BACKOFF_DOUBLINGS: u8 = 10;

/// Asynchronously fetch the open street map tiles specified in `cfg` and save them
/// to the file system, showing a progress bar on the terminal.
///
/// Tiles already present below the output folder are skipped unless
/// `cfg.fetch_existing` is set, so an interrupted run can simply be started
/// again. Individual tile failures are reported in the returned
/// [`RunReport`] and never abort the run.
///
/// # Example
/// ```rust,no_run
/// use offline_tile_downloader::{fetch, BoundingBox, Config, Shutdown, ZoomRange};
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = Config::new(
///     BoundingBox::new(50.7492, 50.811, 6.031, 6.1649).unwrap(),
///     ZoomRange::new(10, 12).unwrap(),
///     "./tiles",
/// );
///
/// let report = fetch(config, Shutdown::new()).await.expect("failed fetching tiles");
/// println!("{}", report.summary);
/// # }
/// ```
///
/// # Errors
/// Fails before any request is made if the configuration is invalid or the
/// output folder cannot be written to, and mid-run if the output folder
/// stops being writable.
pub async fn fetch(cfg: Config, shutdown: Shutdown) -> Result<RunReport> {
    cfg.validate()?;

    let fetcher = HttpFetcher::new(cfg.url, &cfg.user_agent, cfg.timeout)?;
    let downloader = Downloader::new(FsTileStore::new(cfg.output_folder), fetcher)
        .workers(cfg.workers as usize)
        .pacing(cfg.pacing)
        .retries(cfg.retries, cfg.retry_backoff)
        .fetch_existing(cfg.fetch_existing)
        .shutdown(shutdown)
        .progress_bar(true);

    downloader.run(&cfg.bounding_box, cfg.zoom).await
}

/// Drives the acquisition of every tile covering a bounding box.
///
/// Tiles are taken in order (zoom ascending, then x, then y) from a single
/// queue by up to `workers` concurrent acquisitions. Each one checks the
/// store, fetches the tile if it is missing and writes it back. Requests of
/// all workers share one rate limiter.
pub struct Downloader<S, F> {
    store: S,
    fetcher: F,
    limiter: Option<Limiter>,
    workers: usize,
    retries: u8,
    retry_backoff: Duration,
    fetch_existing: bool,
    shutdown: Shutdown,
    progress_bar: bool,
}

impl<S: TileStore, F: TileFetcher> Downloader<S, F> {
    /// A sequential downloader without pacing or retries.
    pub fn new(store: S, fetcher: F) -> Self {
        Self {
            store,
            fetcher,
            limiter: None,
            workers: 1,
            retries: 0,
            retry_backoff: Duration::from_secs(1),
            fetch_existing: false,
            shutdown: Shutdown::new(),
            progress_bar: false,
        }
    }

    /// Maximum number of tiles in flight at once.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Minimum interval between two requests across all workers. Zero
    /// disables pacing.
    pub fn pacing(mut self, interval: Duration) -> Self {
        self.limiter = Quota::with_period(interval).map(RateLimiter::direct);
        self
    }

    /// Retry failed requests up to `retries` times, waiting `backoff` before
    /// the first retry and twice as long before each further one.
    pub fn retries(mut self, retries: u8, backoff: Duration) -> Self {
        self.retries = retries;
        self.retry_backoff = backoff;
        self
    }

    /// Fetch tiles even if the store already has them.
    pub fn fetch_existing(mut self, fetch_existing: bool) -> Self {
        self.fetch_existing = fetch_existing;
        self
    }

    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Draw a progress bar on the terminal while running.
    pub fn progress_bar(mut self, enabled: bool) -> Self {
        self.progress_bar = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Acquires every tile covering `bbox` on the `zooms` levels.
    pub async fn run(&self, bbox: &BoundingBox, zooms: ZoomRange) -> Result<RunReport> {
        let ranges = bbox.tile_ranges(zooms)?;
        let total: u64 = ranges.iter().map(TileRange::count).sum();

        for range in &ranges {
            info!(
                zoom = range.zoom(),
                tiles = range.count(),
                from = %range.top_left,
                to = %range.bottom_right,
                "planned zoom level"
            );
        }
        info!(total, zoom = %zooms, "starting download");

        self.store.prepare().await?;

        let mut progress = if self.progress_bar {
            Progress::new(total)
        } else {
            Progress::hidden(total)
        };

        let halt = AtomicBool::new(false);
        let halt = &halt;

        let mut outcomes = stream::iter(ranges.iter().flat_map(TileRange::iter))
            .take_while(|_| future::ready(!self.stopping(halt)))
            .map(|tile| async move { (tile, self.acquire(&tile, halt).await) })
            .buffer_unordered(self.workers);

        let mut fatal = None;
        while let Some((tile, outcome)) = outcomes.next().await {
            // cancelled before a request went out
            let outcome = match outcome {
                Some(outcome) => outcome,
                None => continue,
            };

            if let TileOutcome::Failed(e) = &outcome {
                if fatal.is_none() {
                    fatal = e.to_unwritable_output();
                    if fatal.is_some() {
                        error!(tile = %tile, error = %e, "output is not writable, stopping");
                        halt.store(true, Ordering::SeqCst);
                    }
                }
            }

            progress.record(tile, outcome);
        }

        let summary = progress.summary();
        let report = progress.finish(summary.completed() < summary.total);

        if let Some(e) = fatal {
            return Err(e);
        }

        if report.cancelled {
            warn!(summary = %report.summary, "download cancelled");
        } else {
            info!(summary = %report.summary, "download complete");
        }

        Ok(report)
    }

    fn stopping(&self, halt: &AtomicBool) -> bool {
        self.shutdown.is_requested() || halt.load(Ordering::SeqCst)
    }

    /// Takes one tile to a terminal outcome. Returns `None` if the run was
    /// stopped before any request for the tile was made.
    async fn acquire(&self, tile: &Tile, halt: &AtomicBool) -> Option<TileOutcome> {
        if !self.fetch_existing {
            match self.store.exists(tile).await {
                Ok(true) => return Some(TileOutcome::Skipped),
                Ok(false) => {}
                Err(e) => return Some(TileOutcome::Failed(e)),
            }
        }

        let mut last_error = None;

        for attempt in 0..=self.retries {
            if let Some(wait) = last_error.as_ref().map(|e| self.backoff(e, attempt)) {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = self.shutdown.requested() => break,
                }
            }

            if !self.wait_for_turn(halt).await {
                break;
            }

            match self.fetcher.fetch(tile).await {
                Ok(bytes) => {
                    return Some(match self.store.write(tile, &bytes).await {
                        Ok(()) => TileOutcome::Downloaded,
                        Err(e) => TileOutcome::Failed(e),
                    });
                }
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    warn!(tile = %tile, error = %e, attempt = attempt + 1, "retrying tile");
                    last_error = Some(e);
                }
                Err(e) => return Some(TileOutcome::Failed(e)),
            }
        }

        last_error.map(TileOutcome::Failed)
    }

    /// Waits until the rate limiter admits another request. Returns `false`
    /// if the run is stopping instead.
    async fn wait_for_turn(&self, halt: &AtomicBool) -> bool {
        if let Some(limiter) = &self.limiter {
            tokio::select! {
                _ = limiter.until_ready() => {}
                _ = self.shutdown.requested() => return false,
            }
        }

        !self.stopping(halt)
    }

    fn backoff(&self, error: &TileError, attempt: u8) -> Duration {
        match error {
            TileError::RateLimited {
                retry_after: Some(retry_after),
            } => *retry_after,
            _ => {
                let doublings = attempt.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
                self.retry_backoff.saturating_mul(1 << doublings)
            }
        }
    }
}

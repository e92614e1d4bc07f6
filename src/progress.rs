use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use tracing::{debug, warn};

use crate::error::TileError;
use crate::tile::Tile;

/// What happened to a single tile.
#[derive(Debug)]
pub enum TileOutcome {
    /// Fetched and stored.
    Downloaded,
    /// Already present in the store.
    Skipped,
    /// Could not be acquired in this run.
    Failed(TileError),
}

/// Aggregate tile counts of a run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    pub total: u64,
    pub downloaded: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl RunSummary {
    /// Tiles that reached a terminal outcome.
    pub fn completed(&self) -> u64 {
        self.downloaded + self.skipped + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} tiles processed: {} downloaded, {} skipped (already present), {} failed",
            self.completed(),
            self.total,
            self.downloaded,
            self.skipped,
            self.failed
        )
    }
}

/// A tile that failed, with the reason.
#[derive(Debug)]
pub struct FailedTile {
    pub tile: Tile,
    pub error: TileError,
}

impl fmt::Display for FailedTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tile, self.error)
    }
}

/// Final result of a run.
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub failures: Vec<FailedTile>,
    /// Whether the run stopped before every tile was processed.
    pub cancelled: bool,
}

/// Tracks tile outcomes as they arrive and mirrors them onto a progress bar.
///
/// This is the only place the counters of a run are changed.
#[derive(Debug)]
pub struct Progress {
    summary: RunSummary,
    failures: Vec<FailedTile>,
    bar: ProgressBar,
}

impl Progress {
    /// Tracks `total` tiles with a terminal progress bar.
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{elapsed_precise}] {bar:60.cyan/blue} {pos:>7}/{len:7} ETA: {eta} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        Self::with_bar(total, bar)
    }

    /// Tracks `total` tiles without drawing anything.
    pub fn hidden(total: u64) -> Self {
        Self::with_bar(total, ProgressBar::hidden())
    }

    fn with_bar(total: u64, bar: ProgressBar) -> Self {
        Self {
            summary: RunSummary {
                total,
                ..RunSummary::default()
            },
            failures: Vec::new(),
            bar,
        }
    }

    /// Records the outcome of one tile.
    pub fn record(&mut self, tile: Tile, outcome: TileOutcome) {
        match outcome {
            TileOutcome::Downloaded => {
                self.summary.downloaded += 1;
                debug!(tile = %tile, "downloaded tile");
            }
            TileOutcome::Skipped => {
                self.summary.skipped += 1;
                debug!(tile = %tile, "skipped existing tile");
            }
            TileOutcome::Failed(error) => {
                self.summary.failed += 1;
                warn!(tile = %tile, error = %error, "failed fetching tile");
                self.failures.push(FailedTile { tile, error });
            }
        }

        self.bar.set_position(self.summary.completed());
        self.bar.set_message(format!("{} failed", self.summary.failed));
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn failures(&self) -> &[FailedTile] {
        &self.failures
    }

    /// Fraction of tiles processed, from 0 to 1. Never decreases.
    pub fn ratio(&self) -> f64 {
        if self.summary.total == 0 {
            return 1_f64;
        }
        self.summary.completed() as f64 / self.summary.total as f64
    }

    pub fn finish(self, cancelled: bool) -> RunReport {
        self.bar.finish_and_clear();

        RunReport {
            summary: self.summary,
            failures: self.failures,
            cancelled,
        }
    }
}

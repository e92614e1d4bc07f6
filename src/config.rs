use std::{fmt::Debug, path::PathBuf, time::Duration};

use crate::bounding_box::BoundingBox;
use crate::error::{Error, Result};
use crate::fetcher::default_user_agent;
use crate::tile::{Tile, ZoomRange};
use crate::url::UrlFormat;

/// Tile fetching configuration.
#[derive(Debug, PartialEq)]
pub struct Config {
    /// The area to cover.
    pub bounding_box: BoundingBox,

    /// The zoom levels to download, both ends included.
    pub zoom: ZoomRange,

    /// The folder to output the data to.
    pub output_folder: PathBuf,

    /// The URL to download individual tiles from including the replacement
    /// specifiers `{x}`, `{y}` and `{z}`.
    pub url: UrlFormat,

    /// Minimum time between two requests to the tile server, shared by all
    /// workers. Zero disables pacing.
    pub pacing: Duration,

    /// Sent as `User-Agent` with every request.
    pub user_agent: String,

    /// Maximum number of tiles in flight at once.
    pub workers: u8,

    /// How many times to retry a tile whose request failed.
    pub retries: u8,

    /// Delay before the first retry, doubled on every further one.
    pub retry_backoff: Duration,

    /// Timeout for fetching a single tile.
    ///
    /// Pass the zero duration to disable the timeout.
    pub timeout: Duration,

    /// Download tiles again even if they are already stored.
    pub fetch_existing: bool,
}

impl Config {
    /// A configuration with default settings for everything but the area and
    /// zoom levels.
    pub fn new(bounding_box: BoundingBox, zoom: ZoomRange, output_folder: impl Into<PathBuf>) -> Self {
        Self {
            bounding_box,
            zoom,
            output_folder: output_folder.into(),
            url: UrlFormat::default(),
            pacing: Duration::from_millis(100),
            user_agent: default_user_agent(),
            workers: 4,
            retries: 2,
            retry_backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            fetch_existing: false,
        }
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("at least one worker is required".into()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "tile servers require a descriptive user agent".into(),
            ));
        }

        // surfaces invalid zoom levels before any work starts
        self.tile_count().map(|_| ())
    }

    /// Creates an iterator iterating over all tiles in the contained bounding box.
    pub fn tiles(&self) -> Result<impl Iterator<Item = Tile> + Debug> {
        self.bounding_box.tiles(self.zoom)
    }

    /// Number of tiles the configuration covers.
    pub fn tile_count(&self) -> Result<u64> {
        self.bounding_box.tile_count(self.zoom)
    }
}

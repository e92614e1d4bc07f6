//! Download OpenStreetMap-tiles covering an area to your disk for offline use.
//!
//! **Be considerate.** Public tile servers are a shared resource; keep the
//! request pacing in place and identify yourself with a descriptive user
//! agent.
//!
//! Tiles are written to `<output>/<z>/<x>/<y>.png`, the same layout tile
//! servers use in their URLs, so the output folder can be served as static
//! files. Tiles already present on disk are never fetched again, which makes
//! interrupted runs resumable by simply starting them again.
//!
//! # CLI Example
//!
//! ```bash
//! offline-tile-downloader \
//!   --north 50.811 \
//!   --east 6.1649 \
//!   --south 50.7492 \
//!   --west 6.031 \
//!   --min-zoom 10 \
//!   --max-zoom 16 \
//!   --output ./tiles \
//!   --delay 100
//! ```
//!
//! # Library Example
//! ```rust
//! use offline_tile_downloader::{BoundingBox, Downloader, MemoryTileStore, TileFetcher, TileError, Tile, ZoomRange};
//!
//! struct Blank;
//!
//! #[async_trait::async_trait]
//! impl TileFetcher for Blank {
//!     async fn fetch(&self, _tile: &Tile) -> Result<Vec<u8>, TileError> {
//!         Ok(vec![0; 16])
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bbox = BoundingBox::new(-1.0, 1.0, -1.0, 1.0).unwrap();
//! let downloader = Downloader::new(MemoryTileStore::new(), Blank).workers(4);
//!
//! let report = downloader
//!     .run(&bbox, ZoomRange::new(0, 1).unwrap())
//!     .await
//!     .expect("failed fetching tiles");
//! assert_eq!(report.summary.downloaded, 5);
//! # }
//! ```

mod bounding_box;
mod config;
mod download;
mod error;
mod fetcher;
mod progress;
mod shutdown;
mod store;
mod tile;
mod url;

pub use bounding_box::{BoundingBox, Fixture};
pub use config::Config;
pub use download::{fetch, Downloader};
pub use error::{Error, Result, TileError};
pub use fetcher::{default_user_agent, HttpFetcher, TileFetcher};
pub use progress::{FailedTile, Progress, RunReport, RunSummary, TileOutcome};
pub use shutdown::Shutdown;
pub use store::{FsTileStore, MemoryTileStore, TileStore};
pub use tile::{Tile, TileRange, ZoomRange, LAT_LIMIT, MAX_ZOOM};
pub use url::{UrlFormat, DEFAULT_URL_TEMPLATE};

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result, TileError};
use crate::tile::Tile;
use crate::url::UrlFormat;

const ZERO_DURATION: Duration = Duration::from_secs(0);

/// Identifies the client towards tile servers, whose usage policies ask for
/// a `User-Agent` naming the application and a way to reach its authors.
pub fn default_user_agent() -> String {
    format!(
        "{}/{} (+{})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_REPOSITORY")
    )
}

/// Retrieves the raw bytes of a single tile. Implementations make exactly
/// one attempt; retrying is up to the caller.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, tile: &Tile) -> Result<Vec<u8>, TileError>;
}

/// Fetches tiles over HTTP(S) from a tile server.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url_fmt: UrlFormat,
}

impl HttpFetcher {
    /// Builds a fetcher sending `user_agent` with every request. A zero
    /// `timeout` disables the per-request timeout.
    pub fn new(url_fmt: UrlFormat, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if timeout > ZERO_DURATION {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(Error::HttpClient)?;

        Ok(Self::with_client(url_fmt, client))
    }

    /// Uses a preconfigured client, which is expected to carry the
    /// `User-Agent` already.
    pub fn with_client(url_fmt: UrlFormat, client: reqwest::Client) -> Self {
        Self { client, url_fmt }
    }
}

#[async_trait]
impl TileFetcher for HttpFetcher {
    async fn fetch(&self, tile: &Tile) -> Result<Vec<u8>, TileError> {
        let url = self.url_fmt.tile_url(tile);
        debug!(tile = %tile, url = %url, "requesting tile");

        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|val| val.parse::<u64>().ok())
                .map(Duration::from_secs);

            return Err(TileError::RateLimited { retry_after });
        }

        if !response.status().is_success() {
            return Err(TileError::Status(response.status()));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

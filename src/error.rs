//! Error types.
//!
//! [`Error`] covers everything that aborts a run before (or instead of)
//! finishing it: malformed configuration and an unwritable output root.
//! [`TileError`] is the per-tile failure which is recorded and never
//! aborts the run.

use std::{io, path::PathBuf, time::Duration};

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fatal errors, raised before any tile work starts (or when the output
/// root turns out to be unwritable mid-run).
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid latitude {lat}°: must lie inside the web mercator band (±85.0511°)")]
    InvalidLatitude { lat: f64 },

    #[error("invalid longitude {lon}°: must lie within [-180°, 180°]")]
    InvalidLongitude { lon: f64 },

    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("invalid zoom range {min}..={max}: min must not exceed max, max must be <= {limit}")]
    InvalidZoomRange { min: u8, max: u8, limit: u8 },

    #[error("invalid tile URL template `{0}`: {1}")]
    InvalidUrlTemplate(String, String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed creating HTTP client")]
    HttpClient(#[source] reqwest::Error),

    /// `path` is the output root when detected up front, or the tile whose
    /// write failed mid-run.
    #[error("output is not writable: cannot write {}", path.display())]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure to acquire a single tile.
#[derive(Error, Debug)]
pub enum TileError {
    #[error("transport error: {0}")]
    Network(String),

    #[error("server responded with HTTP {0}")]
    Status(StatusCode),

    #[error("server is rate limiting requests (HTTP 429)")]
    RateLimited { retry_after: Option<Duration> },

    #[error("failed writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TileError {
    /// Whether another attempt at the same tile could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TileError::Network(_) | TileError::RateLimited { .. } => true,
            TileError::Status(status) => status.is_server_error(),
            TileError::Io { .. } => false,
        }
    }

    /// The fatal error to escalate to if this failure means nothing can be
    /// written below the output root anymore.
    pub(crate) fn to_unwritable_output(&self) -> Option<Error> {
        match self {
            TileError::Io { path, source } if affects_whole_output(source.kind()) => {
                Some(Error::OutputUnwritable {
                    path: path.clone(),
                    source: io::Error::new(source.kind(), source.to_string()),
                })
            }
            _ => None,
        }
    }
}

fn affects_whole_output(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::ReadOnlyFilesystem
            | io::ErrorKind::StorageFull
    )
}

impl From<reqwest::Error> for TileError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => TileError::Status(status),
            None => TileError::Network(e.to_string()),
        }
    }
}

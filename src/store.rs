//! Tile persistence.
//!
//! Presence in the store is the only record of progress: a tile that
//! [`TileStore::exists`] is never fetched again, which is what makes runs
//! resumable.
//!
//! [`FsTileStore`] lays tiles out as `<root>/<z>/<x>/<y>.<ext>`. That path
//! is also read by whatever serves the tiles afterwards, so it must not
//! change.

use async_trait::async_trait;
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tokio::fs;
use tracing::debug;

use crate::error::{Error, Result, TileError};
use crate::tile::Tile;

const PARTIAL_SUFFIX: &str = "part";
const PROBE_FILE: &str = ".write-probe";

#[async_trait]
pub trait TileStore: Send + Sync {
    /// Called once before any tile is fetched. Fails if nothing could be
    /// written.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Whether a complete tile is already stored.
    async fn exists(&self, tile: &Tile) -> Result<bool, TileError>;

    /// Stores `bytes` for `tile`. Either the whole tile becomes visible or
    /// none of it.
    async fn write(&self, tile: &Tile, bytes: &[u8]) -> Result<(), TileError>;
}

/// Stores tiles as individual files below a root directory.
#[derive(Clone, Debug)]
pub struct FsTileStore {
    root: PathBuf,
    extension: String,
}

impl FsTileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_extension(root, "png")
    }

    pub fn with_extension(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    /// The canonical location of `tile`: `<root>/<z>/<x>/<y>.<ext>`.
    pub fn tile_path(&self, tile: &Tile) -> PathBuf {
        let mut target = self.root.join(tile.z.to_string());
        target.push(tile.x.to_string());
        target.push(format!("{}.{}", tile.y, self.extension));

        target
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(PARTIAL_SUFFIX);
        PathBuf::from(name)
    }

    fn unwritable(&self, source: io::Error) -> Error {
        Error::OutputUnwritable {
            path: self.root.clone(),
            source,
        }
    }
}

#[async_trait]
impl TileStore for FsTileStore {
    async fn prepare(&self) -> Result<()> {
        if let Ok(meta) = fs::metadata(&self.root).await {
            if !meta.is_dir() {
                return Err(self.unwritable(io::Error::new(
                    io::ErrorKind::Other,
                    "output must be a directory",
                )));
            }
        }

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| self.unwritable(e))?;

        let probe = self.root.join(PROBE_FILE);
        fs::write(&probe, b"").await.map_err(|e| self.unwritable(e))?;
        fs::remove_file(&probe)
            .await
            .map_err(|e| self.unwritable(e))?;

        Ok(())
    }

    async fn exists(&self, tile: &Tile) -> Result<bool, TileError> {
        let path = self.tile_path(tile);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(TileError::Io { path, source }),
        }
    }

    async fn write(&self, tile: &Tile, bytes: &[u8]) -> Result<(), TileError> {
        let path = self.tile_path(tile);
        let partial = Self::partial_path(&path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| TileError::Io {
                    path: parent.to_owned(),
                    source,
                })?;
        }

        let written = async {
            fs::write(&partial, bytes).await?;
            fs::rename(&partial, &path).await
        }
        .await;

        if let Err(source) = written {
            let _ = fs::remove_file(&partial).await;
            return Err(TileError::Io { path, source });
        }

        debug!(tile = %tile, path = %path.display(), bytes = bytes.len(), "stored tile");
        Ok(())
    }
}

/// Keeps tiles in memory. Useful for tests and for embedding the downloader
/// somewhere the tiles are consumed directly.
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    tiles: Mutex<HashMap<Tile, Vec<u8>>>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `tiles`, each holding an empty body.
    pub fn with_tiles(tiles: impl IntoIterator<Item = Tile>) -> Self {
        let store = Self::new();
        store
            .lock()
            .extend(tiles.into_iter().map(|tile| (tile, Vec::new())));
        store
    }

    pub fn get(&self, tile: &Tile) -> Option<Vec<u8>> {
        self.lock().get(tile).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Tile, Vec<u8>>> {
        // a poisoned map is still a consistent map
        self.tiles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TileStore for MemoryTileStore {
    async fn exists(&self, tile: &Tile) -> Result<bool, TileError> {
        Ok(self.lock().contains_key(tile))
    }

    async fn write(&self, tile: &Tile, bytes: &[u8]) -> Result<(), TileError> {
        self.lock().insert(*tile, bytes.to_vec());
        Ok(())
    }
}

use async_trait::async_trait;
use offline_tile_downloader::{
    BoundingBox, Downloader, Error, FsTileStore, HttpFetcher, MemoryTileStore, Tile, TileError,
    TileFetcher, TileStore, UrlFormat, ZoomRange,
};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

/// Serves every tile with its own name as body and records what was asked
/// for. Tiles in `broken` fail with a transport error.
#[derive(Clone, Default)]
struct RecordingFetcher {
    requests: Arc<Mutex<Vec<Tile>>>,
    broken: HashSet<Tile>,
}

impl RecordingFetcher {
    fn broken(tile: Tile) -> Self {
        Self {
            broken: [tile].into_iter().collect(),
            ..Self::default()
        }
    }

    fn requests(&self) -> Vec<Tile> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TileFetcher for RecordingFetcher {
    async fn fetch(&self, tile: &Tile) -> Result<Vec<u8>, TileError> {
        self.requests.lock().unwrap().push(*tile);

        if self.broken.contains(tile) {
            return Err(TileError::Network("connection reset".into()));
        }

        Ok(tile.to_string().into_bytes())
    }
}

fn equator_box() -> BoundingBox {
    BoundingBox::new(-1.0, 1.0, -1.0, 1.0).unwrap()
}

fn zooms() -> ZoomRange {
    ZoomRange::new(0, 3).unwrap()
}

#[tokio::test]
async fn second_run_skips_everything() {
    let dir = TempDir::new().unwrap();
    let fetcher = RecordingFetcher::default();
    let downloader = Downloader::new(FsTileStore::new(dir.path()), fetcher.clone()).workers(4);

    let first = downloader.run(&equator_box(), zooms()).await.unwrap();
    assert_eq!(first.summary.total, 1 + 4 + 4 + 4);
    assert_eq!(first.summary.downloaded, first.summary.total);
    assert_eq!(first.summary.failed, 0);

    let second = downloader.run(&equator_box(), zooms()).await.unwrap();
    assert_eq!(second.summary.downloaded, 0);
    assert_eq!(second.summary.skipped, second.summary.total);
    assert_eq!(fetcher.requests().len() as u64, first.summary.total);
}

#[tokio::test]
async fn resumes_partially_populated_store() {
    let bbox = equator_box();
    let all: Vec<_> = bbox.tiles(zooms()).unwrap().collect();
    let present: Vec<_> = all.iter().copied().step_by(3).collect();

    let fetcher = RecordingFetcher::default();
    let downloader = Downloader::new(MemoryTileStore::with_tiles(present.clone()), fetcher.clone())
        .workers(3);

    let report = downloader.run(&bbox, zooms()).await.unwrap();

    assert_eq!(
        report.summary.downloaded,
        report.summary.total - present.len() as u64
    );
    assert_eq!(report.summary.skipped, present.len() as u64);

    let requested: HashSet<_> = fetcher.requests().into_iter().collect();
    assert!(present.iter().all(|tile| !requested.contains(tile)));
    assert!(all.iter().all(|tile| downloader.store().get(tile).is_some()));
}

#[tokio::test]
async fn one_broken_tile_does_not_stop_the_run() {
    let broken = Tile::new(1, 0, 1);
    let downloader = Downloader::new(MemoryTileStore::new(), RecordingFetcher::broken(broken))
        .workers(2)
        .retries(1, Duration::from_millis(1));

    let report = downloader.run(&equator_box(), zooms()).await.unwrap();

    assert_eq!(report.summary.failed, 1);
    assert_eq!(
        report.summary.downloaded + report.summary.skipped,
        report.summary.total - 1
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].tile, broken);
    assert!(!report.cancelled);
    assert!(downloader.store().get(&broken).is_none());
}

#[tokio::test]
async fn totals_are_independent_of_worker_count() {
    let mut summaries = Vec::new();

    for workers in [1, 2, 8] {
        let downloader = Downloader::new(
            MemoryTileStore::with_tiles(vec![Tile::new(0, 0, 0)]),
            RecordingFetcher::broken(Tile::new(3, 4, 3)),
        )
        .workers(workers);

        summaries.push(downloader.run(&equator_box(), zooms()).await.unwrap().summary);
    }

    assert!(summaries.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn tiles_land_in_the_documented_layout() {
    let dir = TempDir::new().unwrap();
    let downloader = Downloader::new(FsTileStore::new(dir.path()), RecordingFetcher::default());

    downloader
        .run(&equator_box(), ZoomRange::single(1).unwrap())
        .await
        .unwrap();

    for (x, y) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        let path = dir.path().join("1").join(x.to_string()).join(format!("{}.png", y));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("1/{}/{}", x, y)
        );
    }
}

#[tokio::test]
async fn output_that_is_a_file_fails_before_fetching() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("tiles");
    std::fs::write(&file, b"").unwrap();

    let fetcher = RecordingFetcher::default();
    let downloader = Downloader::new(FsTileStore::new(&file), fetcher.clone());

    let err = downloader.run(&equator_box(), zooms()).await.unwrap_err();

    assert!(matches!(err, Error::OutputUnwritable { .. }));
    assert!(fetcher.requests().is_empty());
}

/// A file store whose root turns read-only once it has been checked.
#[cfg(unix)]
struct FreezingStore(FsTileStore, std::path::PathBuf);

#[cfg(unix)]
#[async_trait]
impl TileStore for FreezingStore {
    async fn prepare(&self) -> offline_tile_downloader::Result<()> {
        self.0.prepare().await?;
        set_mode(&self.1, 0o555);
        Ok(())
    }

    async fn exists(&self, tile: &Tile) -> Result<bool, TileError> {
        self.0.exists(tile).await
    }

    async fn write(&self, tile: &Tile, bytes: &[u8]) -> Result<(), TileError> {
        self.0.write(tile, bytes).await
    }
}

#[cfg(unix)]
fn set_mode(path: &std::path::Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn output_turning_read_only_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tiles");

    // privileged users write through read-only permissions
    std::fs::create_dir(&root).unwrap();
    set_mode(&root, 0o555);
    let enforced = std::fs::create_dir(root.join("check")).is_err();
    set_mode(&root, 0o755);
    if !enforced {
        eprintln!("file permissions are not enforced for this user, skipping");
        return;
    }

    let fetcher = RecordingFetcher::default();
    let store = FreezingStore(FsTileStore::new(&root), root.clone());
    let downloader = Downloader::new(store, fetcher.clone()).workers(2);

    let err = downloader.run(&equator_box(), zooms()).await.unwrap_err();
    set_mode(&root, 0o755);

    assert!(matches!(err, Error::OutputUnwritable { .. }), "{:?}", err);
    assert!(fetcher.requests().len() <= 2, "{:?}", fetcher.requests());
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
}

/// Minimal tile server answering `GET /{z}/{x}/{y}.png`. Requests for
/// `missing` get a 404, everything else a 200 with the request path as body.
/// Returns the base URL and the user agents seen.
async fn serve_tiles(missing: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let agents = Arc::new(Mutex::new(Vec::new()));

    let seen = agents.clone();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let seen = seen.clone();

            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut len = 0;
                while !buf[..len].windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf[len..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => len += n,
                    }
                }

                let request = String::from_utf8_lossy(&buf[..len]).into_owned();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_owned();
                if let Some(agent) = request
                    .lines()
                    .find_map(|l| l.strip_prefix("user-agent: ").or_else(|| l.strip_prefix("User-Agent: ")))
                {
                    seen.lock().unwrap().push(agent.to_owned());
                }

                let response = if path == missing {
                    "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n".to_owned()
                } else {
                    format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: image/png\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        path.len(),
                        path
                    )
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}", addr), agents)
}

#[tokio::test]
async fn end_to_end_over_http() {
    let (base, agents) = serve_tiles("/1/1/0.png").await;
    let dir = TempDir::new().unwrap();

    let url_fmt = UrlFormat::new(format!("{}/{{z}}/{{x}}/{{y}}.png", base)).unwrap();
    let client = reqwest::Client::builder()
        .user_agent("village-map-tests/1.0")
        .no_proxy()
        .build()
        .unwrap();
    let fetcher = HttpFetcher::with_client(url_fmt, client);
    let downloader = Downloader::new(FsTileStore::new(dir.path()), fetcher)
        .workers(2)
        .pacing(Duration::from_millis(1));

    let report = downloader
        .run(&equator_box(), ZoomRange::new(0, 1).unwrap())
        .await
        .unwrap();

    assert_eq!(report.summary.total, 5);
    assert_eq!(report.summary.downloaded, 4);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.failures[0].tile, Tile::new(1, 0, 1));
    assert!(matches!(report.failures[0].error, TileError::Status(s) if s.as_u16() == 404));

    assert_eq!(
        std::fs::read_to_string(dir.path().join("1").join("0").join("1.png")).unwrap(),
        "/1/0/1.png"
    );
    assert!(!dir.path().join("1").join("1").join("0.png").exists());

    let agents = agents.lock().unwrap();
    assert_eq!(agents.len(), 5);
    assert!(agents.iter().all(|agent| agent == "village-map-tests/1.0"));
}

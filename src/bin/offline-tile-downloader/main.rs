mod args;
mod validators;

use anyhow::{Context, Result};
use args::Args;
use offline_tile_downloader::{fetch, Config, Shutdown};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Assumed average tile size for dry-run estimates.
const BYTES_PER_TILE: f64 = 10_000f64;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse()?;
    init_logging(args.verbose);

    let dry_run = args.dry_run;
    let config: Config = args.into();
    config.validate()?;

    if dry_run {
        for range in config.bounding_box.tile_ranges(config.zoom)? {
            eprintln!("zoom {:>2}: {} tiles", range.zoom(), range.count());
        }

        let tile_count = config.tile_count()?;
        eprintln!(
            "would download {} tiles (approx {}, assuming 10 kb per tile)",
            tile_count,
            pretty_bytes::converter::convert((tile_count as f64) * BYTES_PER_TILE)
        );

        return Ok(());
    }

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, letting in-flight tiles finish");
                shutdown.request();
            }
        });
    }

    let output_folder = config.output_folder.clone();
    let report = fetch(config, shutdown)
        .await
        .context("failed fetching tiles")?;

    eprintln!("{}", report.summary);
    if !report.failures.is_empty() {
        eprintln!("failed tiles:");
        for failure in &report.failures {
            eprintln!("  {}", failure);
        }
    }
    if report.cancelled || !report.failures.is_empty() {
        eprintln!("run again to fetch the missing tiles");
    }

    info!(output = %output_folder.display(), "tiles saved");

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("offline_tile_downloader={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

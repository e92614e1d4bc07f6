use anyhow::{Context, Result};
use clap::{command, value_parser, Arg, ArgAction, ArgMatches};
use std::{path::PathBuf, time::Duration};

use crate::validators;
use offline_tile_downloader::{
    default_user_agent, BoundingBox, Config, Fixture, UrlFormat, ZoomRange, DEFAULT_URL_TEMPLATE,
};

const URL_ARG: &str = "url";
const ZOOM_ARG: &str = "zoom";
const OUTPUT_DIR_ARG: &str = "output_dir";
const BBOX_FIXTURE_ARG: &str = "fixture";
const BBOX_NORTH_ARG: &str = "north";
const BBOX_SOUTH_ARG: &str = "south";
const BBOX_WEST_ARG: &str = "west";
const BBOX_EAST_ARG: &str = "east";
const MIN_ZOOM_ARG: &str = "min_zoom";
const MAX_ZOOM_ARG: &str = "max_zoom";
const TIMEOUT_ARG: &str = "timeout";
const DELAY_ARG: &str = "delay";
const USER_AGENT_ARG: &str = "user_agent";
const DRY_RUN_ARG: &str = "dry_run";
const REQUEST_RETRIES_ARG: &str = "num_retries";
const PARALLEL_FETCHES_ARG: &str = "num_parallel";
const FETCH_EXISTING_ARG: &str = "should_fetch_existing";
const VERBOSE_ARG: &str = "verbose";

pub struct Args {
    pub bounding_box: BoundingBox,
    pub zoom: ZoomRange,
    pub parallel_fetches: u8,
    pub retries: u8,
    pub timeout: Duration,
    pub delay: Duration,
    pub user_agent: String,
    pub output_dir: PathBuf,
    pub url: UrlFormat,
    pub fetch_existing: bool,
    pub dry_run: bool,
    pub verbose: u8,
}

impl std::convert::From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            bounding_box: args.bounding_box,
            zoom: args.zoom,
            output_folder: args.output_dir,
            url: args.url,
            pacing: args.delay,
            user_agent: args.user_agent,
            workers: args.parallel_fetches,
            retries: args.retries,
            retry_backoff: Duration::from_secs(1),
            timeout: args.timeout,
            fetch_existing: args.fetch_existing,
        }
    }
}

impl Args {
    /// Parses the command line. Fails on arguments which are individually
    /// well-formed but don't fit together.
    pub fn parse() -> Result<Self> {
        Self::from_matches(&command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let zoom = match matches.get_one::<u8>(ZOOM_ARG) {
            // if `zoom` is set, use it for both min/max
            Some(&zoom) => ZoomRange::single(zoom),
            // otherwise, parse min/max separately
            None => ZoomRange::new(
                *matches.get_one::<u8>(MIN_ZOOM_ARG).unwrap_or(&14),
                *matches.get_one::<u8>(MAX_ZOOM_ARG).unwrap_or(&19),
            ),
        }
        .context("invalid zoom levels")?;

        let bounding_box = match matches.get_one::<Fixture>(BBOX_FIXTURE_ARG) {
            // if a fixture is specified, construct the bounding box from that
            Some(&fixture) => BoundingBox::from(fixture),
            // otherwise, parse the 4 coords separately
            None => {
                let edge = |name: &str| {
                    matches
                        .get_one::<f64>(name)
                        .copied()
                        .with_context(|| format!("missing --{}", name))
                };

                BoundingBox::from_edges(
                    edge(BBOX_NORTH_ARG)?,
                    edge(BBOX_EAST_ARG)?,
                    edge(BBOX_SOUTH_ARG)?,
                    edge(BBOX_WEST_ARG)?,
                )
                .context("invalid bounding box")?
            }
        };

        let url = matches
            .get_one::<String>(URL_ARG)
            .map(String::as_str)
            .unwrap_or(DEFAULT_URL_TEMPLATE);

        Ok(Self {
            bounding_box,
            zoom,
            parallel_fetches: *matches.get_one::<u8>(PARALLEL_FETCHES_ARG).unwrap_or(&4),
            retries: *matches.get_one::<u8>(REQUEST_RETRIES_ARG).unwrap_or(&2),
            timeout: Duration::from_secs(*matches.get_one::<u64>(TIMEOUT_ARG).unwrap_or(&10)),
            delay: Duration::from_millis(*matches.get_one::<u64>(DELAY_ARG).unwrap_or(&100)),
            user_agent: matches
                .get_one::<String>(USER_AGENT_ARG)
                .cloned()
                .unwrap_or_else(default_user_agent),
            output_dir: matches
                .get_one::<PathBuf>(OUTPUT_DIR_ARG)
                .cloned()
                .unwrap_or_else(|| PathBuf::from("tiles")),
            url: UrlFormat::new(url).context("invalid tile URL")?,
            fetch_existing: matches.get_flag(FETCH_EXISTING_ARG),
            dry_run: matches.get_flag(DRY_RUN_ARG),
            verbose: matches.get_count(VERBOSE_ARG),
        })
    }
}

fn command() -> clap::Command {
    command!()
        .arg(
            Arg::new(BBOX_NORTH_ARG)
                .help("Latitude of north bounding box boundary (in degrees)")
                .required_unless_present(BBOX_FIXTURE_ARG)
                .value_parser(validators::latitude)
                .allow_hyphen_values(true)
                .short('n')
                .long("north"),
        )
        .arg(
            Arg::new(BBOX_SOUTH_ARG)
                .help("Latitude of south bounding box boundary (in degrees)")
                .required_unless_present(BBOX_FIXTURE_ARG)
                .value_parser(validators::latitude)
                .allow_hyphen_values(true)
                .short('s')
                .long("south"),
        )
        .arg(
            Arg::new(BBOX_EAST_ARG)
                .help("Longitude of east bounding box boundary (in degrees)")
                .required_unless_present(BBOX_FIXTURE_ARG)
                .value_parser(validators::longitude)
                .allow_hyphen_values(true)
                .short('e')
                .long("east"),
        )
        .arg(
            Arg::new(BBOX_WEST_ARG)
                .help("Longitude of west bounding box boundary (in degrees)")
                .required_unless_present(BBOX_FIXTURE_ARG)
                .value_parser(validators::longitude)
                .allow_hyphen_values(true)
                .short('w')
                .long("west"),
        )
        .arg(
            Arg::new(BBOX_FIXTURE_ARG)
                .help("Use a known, named bounding box (village, usa, aachen)")
                .value_parser(validators::fixture)
                .conflicts_with_all([BBOX_NORTH_ARG, BBOX_SOUTH_ARG, BBOX_EAST_ARG, BBOX_WEST_ARG])
                .short('f')
                .long("fixture"),
        )
        .arg(
            Arg::new(PARALLEL_FETCHES_ARG)
                .help("The amount of tiles fetched in parallel.")
                .value_parser(value_parser!(u8).range(1..))
                .default_value("4")
                .short('r')
                .long("rate"),
        )
        .arg(
            Arg::new(DELAY_ARG)
                .help("Minimum delay (in milliseconds) between two requests to the tile server. Pass 0 to disable pacing.")
                .value_parser(value_parser!(u64))
                .default_value("100")
                .short('d')
                .long("delay"),
        )
        .arg(
            Arg::new(REQUEST_RETRIES_ARG)
                .help("The amount of times to retry a failed HTTP request.")
                .value_parser(value_parser!(u8))
                .default_value("2")
                .long("retries"),
        )
        .arg(
            Arg::new(TIMEOUT_ARG)
                .help("The timeout (in seconds) for fetching a single tile. Pass 0 for no timeout.")
                .value_parser(value_parser!(u64))
                .default_value("10")
                .short('t')
                .long("timeout"),
        )
        .arg(
            Arg::new(MIN_ZOOM_ARG)
                .help("The minimum zoom level to fetch")
                .value_parser(value_parser!(u8))
                .default_value("14")
                .long("min-zoom"),
        )
        .arg(
            Arg::new(MAX_ZOOM_ARG)
                .help("The maximum zoom level to fetch")
                .value_parser(value_parser!(u8))
                .default_value("19")
                .long("max-zoom"),
        )
        .arg(
            Arg::new(ZOOM_ARG)
                .help("Only fetch a single zoom level (implies min=x/max=x)")
                .value_parser(value_parser!(u8))
                .long("zoom")
                .short('z'),
        )
        .arg(
            Arg::new(OUTPUT_DIR_ARG)
                .help("The folder to output the tiles to. Tiles are stored as <output>/<z>/<x>/<y>.png.")
                .value_parser(value_parser!(PathBuf))
                .default_value("tiles")
                .short('o')
                .long("output"),
        )
        .arg(
            Arg::new(URL_ARG)
                .help("The URL with format specifiers `{x}`, `{y}`, `{z}` to fetch the tiles from. Also supports the format specifier `{s}` which is replaced with `a`, `b` or `c` in turn to spread the load between different servers.")
                .default_value(DEFAULT_URL_TEMPLATE)
                .short('u')
                .long("url"),
        )
        .arg(
            Arg::new(USER_AGENT_ARG)
                .help("The User-Agent sent to the tile server. Public tile servers require it to identify the application.")
                .long("user-agent"),
        )
        .arg(
            Arg::new(FETCH_EXISTING_ARG)
                .help("Fetch tiles that we've already downloaded (this usually isn't required)")
                .action(ArgAction::SetTrue)
                .long("fetch-existing"),
        )
        .arg(
            Arg::new(DRY_RUN_ARG)
                .help("Don't actually fetch anything, just determine how many tiles would be fetched.")
                .action(ArgAction::SetTrue)
                .long("dry-run"),
        )
        .arg(
            Arg::new(VERBOSE_ARG)
                .help("Log more details (repeat for even more)")
                .action(ArgAction::Count)
                .short('v')
                .long("verbose"),
        )
}

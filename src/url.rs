use maplit::hashmap;
use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};
use strfmt::strfmt;

use crate::error::{Error, Result};
use crate::tile::Tile;

const OSM_SERVERS: &[&str] = &["a", "b", "c"];

/// The public OpenStreetMap tile server.
pub const DEFAULT_URL_TEMPLATE: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

/// A tile URL template with the replacement specifiers `{x}`, `{y}`, `{z}`
/// and the optional subdomain specifier `{s}`, which rotates through `a`,
/// `b` and `c` to spread the load between servers.
pub struct UrlFormat {
    inc: AtomicUsize,
    format_str: String,
}

impl UrlFormat {
    pub fn new(format_str: impl Into<String>) -> Result<Self> {
        let format_str = format_str.into();

        for spec in ["{x}", "{y}", "{z}"] {
            if !format_str.contains(spec) {
                return Err(Error::InvalidUrlTemplate(
                    format_str,
                    format!("missing `{}`", spec),
                ));
            }
        }

        let url_fmt = Self {
            inc: AtomicUsize::new(0),
            format_str,
        };

        // catches unbalanced braces and unknown specifiers up front
        url_fmt
            .render(&Tile::new(0, 0, 0), OSM_SERVERS[0])
            .map_err(|e| Error::InvalidUrlTemplate(url_fmt.format_str.clone(), e.to_string()))?;

        Ok(url_fmt)
    }

    pub fn as_str(&self) -> &str {
        &self.format_str
    }

    /// Formats the URL for `tile`, advancing the `{s}` rotation.
    pub fn tile_url(&self, tile: &Tile) -> String {
        let inc = self.inc.fetch_add(1, Ordering::Relaxed);
        let server = OSM_SERVERS[inc % OSM_SERVERS.len()];

        // validated in `new`
        self.render(tile, server)
            .unwrap_or_else(|_| self.format_str.clone())
    }

    fn render(&self, tile: &Tile, server: &str) -> Result<String, strfmt::FmtError> {
        let vars = hashmap! {
            "s".to_owned() => server.to_owned(),
            "x".to_owned() => tile.x.to_string(),
            "y".to_owned() => tile.y.to_string(),
            "z".to_owned() => tile.z.to_string(),
        };

        strfmt(&self.format_str, &vars)
    }
}

impl Default for UrlFormat {
    fn default() -> Self {
        Self {
            inc: AtomicUsize::new(0),
            format_str: DEFAULT_URL_TEMPLATE.to_owned(),
        }
    }
}

impl PartialEq for UrlFormat {
    fn eq(&self, other: &Self) -> bool {
        self.format_str == other.format_str
    }
}

impl fmt::Debug for UrlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlFormat")
            .field("format_str", &self.format_str)
            .finish()
    }
}

use std::{f64::consts::PI, fmt, ops::RangeInclusive};

use crate::error::{Error, Result};

/// Latitude limit of the web mercator projection, in degrees. Points at or
/// beyond it have no finite tile row.
pub const LAT_LIMIT: f64 = 85.0511;
const LON_MIN: f64 = -180_f64;
const LON_MAX: f64 = 180_f64;

/// Highest zoom level accepted. At 24 a tile index still fits in a `u32`
/// with room to spare.
pub const MAX_ZOOM: u8 = 24;

/// An OSM slippy-map tile with x, y and z-coordinate.
/// ref: https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl Tile {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Returns the tile containing the point at `lat_deg`/`lon_deg` on zoom
    /// level `zoom`.
    ///
    /// # Example
    /// ```rust
    /// # use offline_tile_downloader::Tile;
    /// let tile = Tile::for_point(50.7929, 6.0402, 18).unwrap();
    /// assert_eq!((tile.x, tile.y), (135470, 87999));
    /// ```
    ///
    /// # Errors
    /// Fails with [`Error::InvalidLatitude`] outside of the mercator band
    /// and with [`Error::InvalidLongitude`] outside of [-180°, 180°].
    pub fn for_point(lat_deg: f64, lon_deg: f64, zoom: u8) -> Result<Self> {
        if lat_deg.is_nan() || lat_deg.abs() >= LAT_LIMIT {
            return Err(Error::InvalidLatitude { lat: lat_deg });
        }
        if !(LON_MIN..=LON_MAX).contains(&lon_deg) {
            return Err(Error::InvalidLongitude { lon: lon_deg });
        }
        if zoom > MAX_ZOOM {
            return Err(Error::InvalidZoomRange {
                min: zoom,
                max: zoom,
                limit: MAX_ZOOM,
            });
        }

        // scale factor
        let n = 2_f64.powi(zoom as i32);
        let lat_rad = lat_deg.to_radians();

        let x = (lon_deg + 180_f64) / 360_f64 * n;
        let y = (1_f64 - lat_rad.tan().asinh() / PI) / 2_f64 * n;

        // lon = 180° lands exactly on the (non-existent) column n
        let clamp = |v: f64| v.floor().clamp(0_f64, n - 1_f64) as u32;

        Ok(Self::new(clamp(x), clamp(y), zoom))
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// The inclusive rectangle of tiles on one zoom level spanned by a
/// north-west and a south-east tile.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TileRange {
    pub top_left: Tile,
    pub bottom_right: Tile,
}

impl TileRange {
    pub fn zoom(&self) -> u8 {
        self.top_left.z
    }

    /// Number of tiles in the range, computed without enumerating them.
    pub fn count(&self) -> u64 {
        let dx = u64::from(self.bottom_right.x - self.top_left.x);
        let dy = u64::from(self.bottom_right.y - self.top_left.y);
        (dx + 1) * (dy + 1)
    }

    /// Iterates all tiles of the range, x ascending, then y ascending.
    pub fn iter(&self) -> impl Iterator<Item = Tile> + Clone + fmt::Debug {
        let (tl, br, z) = (self.top_left, self.bottom_right, self.zoom());

        (tl.x..=br.x).flat_map(move |x| (tl.y..=br.y).map(move |y| Tile::new(x, y, z)))
    }
}

/// An inclusive range of zoom levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Result<Self> {
        if min > max || max > MAX_ZOOM {
            return Err(Error::InvalidZoomRange {
                min,
                max,
                limit: MAX_ZOOM,
            });
        }

        Ok(Self { min, max })
    }

    /// A range containing only `zoom`.
    pub fn single(zoom: u8) -> Result<Self> {
        Self::new(zoom, zoom)
    }

    pub fn levels(&self) -> RangeInclusive<u8> {
        self.min..=self.max
    }
}

impl fmt::Display for ZoomRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_index() {
        let tile = Tile::for_point(50.7929, 6.0402, 18).unwrap();
        assert_eq!((tile.x, tile.y), (135470, 87999));
    }

    #[test]
    fn zoom_zero_is_a_single_tile() {
        assert_eq!(Tile::for_point(-84.0, -180.0, 0).unwrap(), Tile::new(0, 0, 0));
        assert_eq!(Tile::for_point(84.0, 180.0, 0).unwrap(), Tile::new(0, 0, 0));
    }

    #[test]
    fn indices_stay_in_grid() {
        for zoom in 0..=MAX_ZOOM {
            let max = (1u32 << zoom) - 1;
            for &(lat, lon) in &[
                (85.05, -180.0),
                (-85.05, 180.0),
                (0.0, 0.0),
                (-7.46, 112.72),
                (50.79, 6.04),
            ] {
                let tile = Tile::for_point(lat, lon, zoom).unwrap();
                assert!(tile.x <= max, "x out of range for {}", tile);
                assert!(tile.y <= max, "y out of range for {}", tile);
            }
        }
    }

    #[test]
    fn rejects_latitude_outside_mercator_band() {
        for lat in [85.06, -85.06, 90.0, -90.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                Tile::for_point(lat, 0.0, 3),
                Err(Error::InvalidLatitude { .. })
            ));
        }
    }

    #[test]
    fn rejects_longitude_outside_range() {
        assert!(matches!(
            Tile::for_point(0.0, 180.5, 3),
            Err(Error::InvalidLongitude { .. })
        ));
    }

    #[test]
    fn north_has_smaller_row() {
        let north = Tile::for_point(10.0, 0.0, 5).unwrap();
        let south = Tile::for_point(-10.0, 0.0, 5).unwrap();
        assert!(north.y < south.y);
    }

    #[test]
    fn range_count_and_order() {
        let range = TileRange {
            top_left: Tile::new(2, 5, 4),
            bottom_right: Tile::new(3, 7, 4),
        };
        assert_eq!(range.count(), 6);

        let tiles: Vec<_> = range.iter().collect();
        assert_eq!(tiles.len() as u64, range.count());
        assert_eq!(
            tiles,
            vec![
                Tile::new(2, 5, 4),
                Tile::new(2, 6, 4),
                Tile::new(2, 7, 4),
                Tile::new(3, 5, 4),
                Tile::new(3, 6, 4),
                Tile::new(3, 7, 4),
            ]
        );
    }

    #[test]
    fn zoom_range_validation() {
        assert!(ZoomRange::new(0, 0).is_ok());
        assert!(ZoomRange::new(14, 19).is_ok());
        assert!(ZoomRange::new(5, 4).is_err());
        assert!(ZoomRange::new(0, MAX_ZOOM + 1).is_err());
        assert_eq!(ZoomRange::single(3).unwrap().levels().count(), 1);
    }

    #[test]
    fn tile_display_is_path_order() {
        assert_eq!(Tile::new(3, 5, 4).to_string(), "4/3/5");
    }
}

use std::fmt::Debug;

use crate::error::{Error, Result};
use crate::tile::{Tile, TileRange, ZoomRange, LAT_LIMIT};

/// A geographic bounding box given in decimal degrees.
///
/// # Example
/// ```rust
/// # use offline_tile_downloader::BoundingBox;
/// let aachen_germany = BoundingBox::new(50.7492, 50.811, 6.031, 6.1649).unwrap();
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl BoundingBox {
    /// Create a new bounding box from its latitude and longitude extents.
    ///
    /// # Errors
    /// Latitudes must lie inside the web mercator band, longitudes inside
    /// [-180°, 180°] and both minimums must be strictly smaller than their
    /// maximums.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self> {
        for lat in [min_lat, max_lat] {
            if lat.is_nan() || lat.abs() >= LAT_LIMIT {
                return Err(Error::InvalidLatitude { lat });
            }
        }
        for lon in [min_lon, max_lon] {
            if !(-180_f64..=180_f64).contains(&lon) {
                return Err(Error::InvalidLongitude { lon });
            }
        }
        if min_lat >= max_lat {
            return Err(Error::InvalidBoundingBox(format!(
                "south edge {}° must be below north edge {}°",
                min_lat, max_lat
            )));
        }
        if min_lon >= max_lon {
            return Err(Error::InvalidBoundingBox(format!(
                "west edge {}° must be left of east edge {}°",
                min_lon, max_lon
            )));
        }

        Ok(Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }

    /// Create a new bounding box from its edges in north, east, south, west
    /// order.
    pub fn from_edges(north: f64, east: f64, south: f64, west: f64) -> Result<Self> {
        Self::new(south, north, west, east)
    }

    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    /// The minimal rectangle of tiles covering the box on `zoom`.
    ///
    /// The north-west corner yields the top left tile, the south-east corner
    /// the bottom right one, since tile rows grow southwards.
    pub fn tile_range(&self, zoom: u8) -> Result<TileRange> {
        Ok(TileRange {
            top_left: Tile::for_point(self.max_lat, self.min_lon, zoom)?,
            bottom_right: Tile::for_point(self.min_lat, self.max_lon, zoom)?,
        })
    }

    /// Tile ranges for every level of `zooms`, lowest zoom first.
    pub fn tile_ranges(&self, zooms: ZoomRange) -> Result<Vec<TileRange>> {
        zooms.levels().map(|zoom| self.tile_range(zoom)).collect()
    }

    /// Total number of tiles covering the box across `zooms`, computed in
    /// closed form.
    pub fn tile_count(&self, zooms: ZoomRange) -> Result<u64> {
        Ok(self.tile_ranges(zooms)?.iter().map(TileRange::count).sum())
    }

    /// Creates an iterator over all tiles in the bounding box, zoom level by
    /// zoom level, then x ascending, then y ascending.
    pub fn tiles(&self, zooms: ZoomRange) -> Result<impl Iterator<Item = Tile> + Debug> {
        Ok(self
            .tile_ranges(zooms)?
            .into_iter()
            .flat_map(|range| range.iter()))
    }
}

/// A bounding box fixture containing preset coordinates for a known geographic
/// region (a continent, country, city, etc).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fixture {
    /// The village area the offline map was first built for.
    Village,
    USA,
    AachenGermany,
}

impl std::str::FromStr for Fixture {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Fixture::*;

        let s = s.to_lowercase();

        if s.starts_with("village") {
            return Ok(Village);
        }

        if s.starts_with("us") {
            return Ok(USA);
        }

        if s.starts_with("aachen") {
            return Ok(AachenGermany);
        }

        Err("unrecognized fixture")
    }
}

impl std::convert::From<Fixture> for BoundingBox {
    fn from(fixture: Fixture) -> Self {
        use Fixture::*;

        let (min_lat, max_lat, min_lon, max_lon) = match fixture {
            Village => (
                -7.469666314397088,
                -7.449283835216734,
                112.71131515502931,
                112.73800849914552,
            ),
            USA => (23.8991, 49.4325, -125.3321, -65.7421),
            AachenGermany => (50.7492, 50.811, 6.031, 6.1649),
        };

        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equator_box() -> BoundingBox {
        BoundingBox::new(-1.0, 1.0, -1.0, 1.0).unwrap()
    }

    #[test]
    fn equator_box_zoom_zero_is_root_tile() {
        let tiles: Vec<_> = equator_box()
            .tiles(ZoomRange::single(0).unwrap())
            .unwrap()
            .collect();
        assert_eq!(tiles, vec![Tile::new(0, 0, 0)]);
    }

    #[test]
    fn equator_box_zoom_one_covers_all_four_tiles() {
        let zooms = ZoomRange::single(1).unwrap();
        let tiles: Vec<_> = equator_box().tiles(zooms).unwrap().collect();
        assert_eq!(
            tiles,
            vec![
                Tile::new(0, 0, 1),
                Tile::new(0, 1, 1),
                Tile::new(1, 0, 1),
                Tile::new(1, 1, 1),
            ]
        );
        assert_eq!(equator_box().tile_count(zooms).unwrap(), 4);
    }

    #[test]
    fn box_inside_one_tile_collapses_range() {
        let bbox = BoundingBox::new(10.0, 20.0, 10.0, 20.0).unwrap();
        let range = bbox.tile_range(2).unwrap();
        assert_eq!(range.top_left, range.bottom_right);
        assert_eq!(range.count(), 1);
        assert_eq!(range.top_left, Tile::new(2, 1, 2));
    }

    #[test]
    fn tile_count_is_monotonic_in_zoom() {
        let boxes = [
            equator_box(),
            BoundingBox::from(Fixture::Village),
            BoundingBox::from(Fixture::AachenGermany),
            BoundingBox::from(Fixture::USA),
        ];

        for bbox in &boxes {
            let mut previous = 0;
            for zoom in 0..=18 {
                let count = bbox.tile_range(zoom).unwrap().count();
                assert!(count >= previous, "{:?} shrank at zoom {}", bbox, zoom);
                previous = count;
            }
        }
    }

    #[test]
    fn closed_form_count_matches_enumeration() {
        let bbox = BoundingBox::from(Fixture::Village);
        let zooms = ZoomRange::new(14, 17).unwrap();
        assert_eq!(
            bbox.tile_count(zooms).unwrap(),
            bbox.tiles(zooms).unwrap().count() as u64
        );
    }

    #[test]
    fn tiles_are_grouped_by_ascending_zoom() {
        let bbox = BoundingBox::from(Fixture::AachenGermany);
        let zooms: Vec<_> = bbox
            .tiles(ZoomRange::new(8, 12).unwrap())
            .unwrap()
            .map(|t| t.z)
            .collect();
        let mut sorted = zooms.clone();
        sorted.sort_unstable();
        assert_eq!(zooms, sorted);
    }

    #[test]
    fn rejects_inverted_edges() {
        assert!(matches!(
            BoundingBox::new(1.0, -1.0, -1.0, 1.0),
            Err(Error::InvalidBoundingBox(_))
        ));
        assert!(matches!(
            BoundingBox::new(-1.0, 1.0, 1.0, 1.0),
            Err(Error::InvalidBoundingBox(_))
        ));
    }

    #[test]
    fn rejects_polar_latitudes() {
        assert!(matches!(
            BoundingBox::new(-1.0, 89.0, -1.0, 1.0),
            Err(Error::InvalidLatitude { lat }) if lat == 89.0
        ));
    }

    #[test]
    fn from_edges_matches_new() {
        assert_eq!(
            BoundingBox::from_edges(50.811, 6.1649, 50.7492, 6.031).unwrap(),
            BoundingBox::from(Fixture::AachenGermany)
        );
    }

    #[test]
    fn parses_fixtures() {
        assert_eq!("Village".parse::<Fixture>(), Ok(Fixture::Village));
        assert_eq!("usa".parse::<Fixture>(), Ok(Fixture::USA));
        assert_eq!("aachen".parse::<Fixture>(), Ok(Fixture::AachenGermany));
        assert!("atlantis".parse::<Fixture>().is_err());
    }
}

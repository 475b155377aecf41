//! Slippy-map tile math at the store's fixed zoom level.
//!
//! Tile files and objects are named by these indices, so the numbering must
//! match the standard Web-Mercator scheme exactly: any reader has to be able
//! to reconstruct a tile name from a coordinate without consulting the writer.

use geo::Rect;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Zoom level of the tile grid used for partitioning.
pub const ZOOM_LEVEL: u8 = 11;

/// Number of tiles along one axis at `zoom`.
#[inline]
pub fn tiles_per_axis(zoom: u8) -> u32 {
    1u32 << zoom
}

#[inline]
fn clamp_index(value: f64, zoom: u8) -> u32 {
    let max = (tiles_per_axis(zoom) - 1) as f64;
    // NaN saturates to 0 on cast
    value.clamp(0.0, max) as u32
}

/// Convert a longitude to a tile column.
pub fn lon_to_tile(lon: f64, zoom: u8) -> u32 {
    let n = tiles_per_axis(zoom) as f64;
    clamp_index(((lon + 180.0) * n / 360.0).floor(), zoom)
}

/// Convert a latitude to a tile row. Rows increase southward.
pub fn lat_to_tile(lat: f64, zoom: u8) -> u32 {
    let n = tiles_per_axis(zoom) as f64;
    let lat_rad = lat.to_radians();
    clamp_index(
        ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor(),
        zoom,
    )
}

/// Longitude of the west edge of tile column `x`.
pub fn tile_to_lon(x: u32, zoom: u8) -> f64 {
    x as f64 * 360.0 / tiles_per_axis(zoom) as f64 - 180.0
}

/// Latitude of the north edge of tile row `y`.
pub fn tile_to_lat(y: u32, zoom: u8) -> f64 {
    let n = tiles_per_axis(zoom) as f64;
    (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan().to_degrees()
}

/// A tile at [`ZOOM_LEVEL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// The tile containing a lon/lat position.
    pub fn containing(lon: f64, lat: f64) -> Self {
        Self {
            x: lon_to_tile(lon, ZOOM_LEVEL),
            y: lat_to_tile(lat, ZOOM_LEVEL),
        }
    }

    /// Relative location of this tile's payload: `{x}/{y}.{extension}`.
    ///
    /// Used both as a path below a local root and as an object key.
    pub fn relative_path(&self, extension: &str) -> String {
        format!("{}/{}.{}", self.x, self.y, extension)
    }

    /// Geographic extent of the tile.
    pub fn bounds(&self) -> Rect<f64> {
        Rect::new(
            (tile_to_lon(self.x, ZOOM_LEVEL), tile_to_lat(self.y + 1, ZOOM_LEVEL)),
            (tile_to_lon(self.x + 1, ZOOM_LEVEL), tile_to_lat(self.y, ZOOM_LEVEL)),
        )
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", ZOOM_LEVEL, self.x, self.y)
    }
}

/// Inclusive rectangular range of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Tiles touched by a geographic envelope, corners included.
    pub fn covering(envelope: &Rect<f64>) -> Self {
        let min = envelope.min();
        let max = envelope.max();
        Self {
            min_x: lon_to_tile(min.x, ZOOM_LEVEL),
            max_x: lon_to_tile(max.x, ZOOM_LEVEL),
            // north edge has the smaller row index
            min_y: lat_to_tile(max.y, ZOOM_LEVEL),
            max_y: lat_to_tile(min.y, ZOOM_LEVEL),
        }
    }

    /// Tiles touched by a north/east/south/west query box.
    pub fn for_bounds(north: f64, east: f64, south: f64, west: f64) -> Self {
        Self {
            min_x: lon_to_tile(west, ZOOM_LEVEL),
            max_x: lon_to_tile(east, ZOOM_LEVEL),
            min_y: lat_to_tile(north, ZOOM_LEVEL),
            max_y: lat_to_tile(south, ZOOM_LEVEL),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Number of tiles in the range.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (self.max_x - self.min_x + 1) as usize * (self.max_y - self.min_y + 1) as usize
    }

    pub fn contains(&self, tile: &TileCoord) -> bool {
        (self.min_x..=self.max_x).contains(&tile.x) && (self.min_y..=self.max_y).contains(&tile.y)
    }

    /// Tiles in x-major order, matching the order of the membership index.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + use<> {
        let range = *self;
        let ys = if range.is_empty() {
            1..=0
        } else {
            range.min_y..=range.max_y
        };
        (range.min_x..=range.max_x)
            .flat_map(move |x| ys.clone().map(move |y| TileCoord::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_tiles() {
        // New York at z11
        assert_eq!(lon_to_tile(-74.0060, ZOOM_LEVEL), 602);
        assert_eq!(lat_to_tile(40.7128, ZOOM_LEVEL), 770);

        // Origin sits on the corner of four tiles
        assert_eq!(lon_to_tile(0.0, ZOOM_LEVEL), 1024);
        assert_eq!(lat_to_tile(0.0, ZOOM_LEVEL), 1024);
    }

    #[test]
    fn test_grid_edges_clamp() {
        let last = tiles_per_axis(ZOOM_LEVEL) - 1;
        assert_eq!(lon_to_tile(-180.0, ZOOM_LEVEL), 0);
        assert_eq!(lon_to_tile(180.0, ZOOM_LEVEL), last);
        assert_eq!(lat_to_tile(89.9, ZOOM_LEVEL), 0);
        assert_eq!(lat_to_tile(-89.9, ZOOM_LEVEL), last);
        assert_eq!(lon_to_tile(f64::NAN, ZOOM_LEVEL), 0);
    }

    #[test]
    fn test_tile_edges_round_trip() {
        for x in [0u32, 10, 11, 602, 1024, 2047] {
            let west = tile_to_lon(x, ZOOM_LEVEL);
            assert_eq!(lon_to_tile(west + 1e-9, ZOOM_LEVEL), x);
        }
        for y in [1u32, 20, 770, 1024, 2000] {
            let north = tile_to_lat(y, ZOOM_LEVEL);
            assert_eq!(lat_to_tile(north - 1e-9, ZOOM_LEVEL), y);
        }
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(TileCoord::new(10, 20).relative_path("smls.gz"), "10/20.smls.gz");
    }

    #[test]
    fn test_tile_bounds_contain_center() {
        let tile = TileCoord::new(602, 770);
        let bounds = tile.bounds();
        let center = bounds.center();
        assert_eq!(TileCoord::containing(center.x, center.y), tile);
    }

    #[test]
    fn test_range_for_bounds_inverts_latitude() {
        let range = TileRange::for_bounds(40.8, -73.9, 40.6, -74.1);
        assert!(range.min_y <= range.max_y);
        assert!(range.min_x <= range.max_x);
        assert!(range.contains(&TileCoord::new(602, 770)));
    }

    #[test]
    fn test_range_iteration_order() {
        let range = TileRange {
            min_x: 3,
            max_x: 4,
            min_y: 7,
            max_y: 8,
        };
        let tiles: Vec<_> = range.iter().collect();
        assert_eq!(
            tiles,
            vec![
                TileCoord::new(3, 7),
                TileCoord::new(3, 8),
                TileCoord::new(4, 7),
                TileCoord::new(4, 8),
            ]
        );
        assert_eq!(range.len(), 4);
    }

    #[test]
    fn test_empty_range() {
        let range = TileRange {
            min_x: 5,
            max_x: 4,
            min_y: 0,
            max_y: 0,
        };
        assert!(range.is_empty());
        assert_eq!(range.len(), 0);
        assert_eq!(range.iter().count(), 0);
    }
}

//! Pixel grid <-> longitude/latitude projection
//!
//! The host addresses its canvas as one global raster, top-left origin, laid
//! over a spherical Mercator world. Both directions here use the host's exact
//! constants so that overlay corners land on pixel boundaries.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use crate::TILE_SIZE;

const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Half of the Mercator world width in meters
const HALF_EXTENT: f64 = PI * EARTH_RADIUS_M;

/// Meters per raster pixel
const METERS_PER_PIXEL: f64 = HALF_EXTENT / TILE_SIZE as f64 / 1024.0;

/// Side of the global raster in pixels
pub const RASTER_SIZE: i64 = 2 * TILE_SIZE as i64 * 1024;

/// Forward values closer than this to an integer are treated as that integer
///
/// A few ULPs of a coordinate at raster scale; any real fraction is wider.
const SNAP_EPSILON: f64 = 1e-8;

/// Geographic coordinate in degrees
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

/// Absolute pixel in the global raster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PixelPoint {
    pub x: i64,
    pub y: i64,
}

impl PixelPoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn tile(&self) -> TileId {
        let size = TILE_SIZE as i64;
        TileId::new(self.x.div_euclid(size), self.y.div_euclid(size))
    }

    pub fn tile_pixel(&self) -> TilePixel {
        let size = TILE_SIZE as i64;
        TilePixel {
            x: self.x.rem_euclid(size) as u32,
            y: self.y.rem_euclid(size) as u32,
        }
    }
}

/// Tile grid coordinates; also the key of per-tile bookkeeping
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub x: i64,
    pub y: i64,
}

impl TileId {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Global pixel of this tile's top-left corner
    pub fn origin(&self) -> PixelPoint {
        let size = TILE_SIZE as i64;
        PixelPoint::new(self.x * size, self.y * size)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Pixel offset inside one tile
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TilePixel {
    pub x: u32,
    pub y: u32,
}

/// Inverse projection: raster pixel -> longitude/latitude
pub fn pixel_to_geo(x: f64, y: f64) -> LngLat {
    let lng = (x * METERS_PER_PIXEL - HALF_EXTENT) / HALF_EXTENT * 180.0;
    let merc = (HALF_EXTENT - y * METERS_PER_PIXEL) / HALF_EXTENT * 180.0;
    let lat = 180.0 / PI * (2.0 * (merc * PI / 180.0).exp().atan() - PI / 2.0);
    LngLat::new(lng, lat)
}

/// Forward projection without flooring
pub fn geo_to_pixel_f(point: LngLat) -> (f64, f64) {
    let merc = ((90.0 + point.lat) * PI / 360.0).tan().ln() / (PI / 180.0);
    let x = (point.lng / 180.0 * HALF_EXTENT + HALF_EXTENT) / METERS_PER_PIXEL;
    let y = (HALF_EXTENT - merc / 180.0 * HALF_EXTENT) / METERS_PER_PIXEL;
    (x, y)
}

/// Forward projection: longitude/latitude -> containing raster pixel
pub fn geo_to_pixel(point: LngLat) -> PixelPoint {
    let (x, y) = geo_to_pixel_f(point);
    PixelPoint::new(snap_floor(x), snap_floor(y))
}

/// Tile and in-tile pixel under a geographic point
pub fn locate(point: LngLat) -> (TileId, TilePixel) {
    let pixel = geo_to_pixel(point);
    (pixel.tile(), pixel.tile_pixel())
}

/// Corners of a `width` x `height` image whose top-left pixel is `origin`,
/// ordered top-left, top-right, bottom-right, bottom-left
pub fn footprint(origin: PixelPoint, width: u32, height: u32) -> [LngLat; 4] {
    let (x0, y0) = (origin.x as f64, origin.y as f64);
    let (x1, y1) = (x0 + width as f64, y0 + height as f64);
    [
        pixel_to_geo(x0, y0),
        pixel_to_geo(x1, y0),
        pixel_to_geo(x1, y1),
        pixel_to_geo(x0, y1),
    ]
}

// Absorb projection round-off before flooring.
fn snap_floor(value: f64) -> i64 {
    let nearest = value.round();
    if (value - nearest).abs() < SNAP_EPSILON {
        nearest as i64
    } else {
        value.floor() as i64
    }
}

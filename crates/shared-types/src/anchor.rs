//! Parsing of the host's pixel endpoint URLs into absolute overlay anchors

use url::Url;

use crate::geo::PixelPoint;
use crate::TILE_SIZE;

pub const DEFAULT_BACKEND_HOST: &str = "backend.wplace.live";

/// A pixel position recovered from a `/s0/pixel/<tx>/<ty>?x=&y=` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelAnchor {
    pub tile_x: i64,
    pub tile_y: i64,
    pub x: i64,
    pub y: i64,
    pub normalized: String,
}

impl PixelAnchor {
    /// Parse `url` if it targets the pixel endpoint on `backend_host`
    pub fn parse(url: &str, backend_host: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        if parsed.host_str()? != backend_host {
            return None;
        }

        let segments: Vec<&str> = parsed.path_segments()?.collect();
        let [s0, pixel, tx, ty] = segments.as_slice() else {
            return None;
        };
        if *s0 != "s0" || *pixel != "pixel" {
            return None;
        }
        let tile_x = parse_digits(tx)?;
        let tile_y = parse_digits(ty)?;

        let mut x = 0;
        let mut y = 0;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "x" => x = value.parse().unwrap_or(0),
                "y" => y = value.parse().unwrap_or(0),
                _ => {}
            }
        }

        Some(Self {
            tile_x,
            tile_y,
            x,
            y,
            normalized: format!("https://{backend_host}/s0/pixel/{tile_x}/{tile_y}?x={x}&y={y}"),
        })
    }

    /// Absolute raster pixel of the anchor
    pub fn pixel(&self) -> PixelPoint {
        let size = TILE_SIZE as i64;
        PixelPoint::new(self.tile_x * size + self.x, self.tile_y * size + self.y)
    }
}

fn parse_digits(segment: &str) -> Option<i64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

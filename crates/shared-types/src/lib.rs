//! Shared types for Overlay Pro
//!
//! This crate contains the data model that is shared between the hooks,
//! renderer, and wasm-bridge crates: overlay records, display enums, tile
//! addressing, and the pixel-grid projection used to place overlays.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;

#[cfg(feature = "typescript")]
use tsify::Tsify;

pub mod anchor;
pub mod errors;
pub mod geo;

pub use errors::{ErrorResponse, OverlayError, OverlayResult};
pub use geo::{LngLat, PixelPoint, TileId, TilePixel};

/// Side length of one host tile, in pixels
pub const TILE_SIZE: u32 = 1000;

/// Images with either dimension at or above this size are rejected
pub const MAX_OVERLAY_DIM: u32 = 2048;

/// Fixed upscale applied before any style-specific scaling
pub const UPSCALE: u32 = 2;

/// Minification factor of the dot visualization
pub const MINIFY_SCALE: u32 = 4;

/// Prefix of every map layer/source id owned by the overlay pipeline
pub const LAYER_PREFIX: &str = "op-";

/// A user-defined image placed at fixed pixel coordinates on the host map
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "typescript", derive(Tsify))]
#[serde(rename_all = "camelCase")]
pub struct OverlayRecord {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Raw image payload (usually a data URL); decoded lazily and cached
    #[serde(default)]
    pub image: Option<String>,
    pub x: i64,
    pub y: i64,
}

impl OverlayRecord {
    pub fn new(name: impl Into<String>, x: i64, y: i64) -> Self {
        Self {
            id: new_overlay_id(),
            name: name.into(),
            enabled: true,
            image: None,
            x,
            y,
        }
    }

    pub fn with_image(mut self, payload: impl Into<String>) -> Self {
        self.image = Some(payload.into());
        self
    }

    /// Map layer and source id for this record
    pub fn layer_name(&self) -> String {
        format!("{LAYER_PREFIX}{}", self.name)
    }

    pub fn origin(&self) -> PixelPoint {
        PixelPoint::new(self.x, self.y)
    }
}

/// Global display style of all overlays
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "typescript", derive(Tsify))]
#[serde(rename_all = "lowercase")]
pub enum OverlayStyle {
    Full,
    #[default]
    Dots,
    None,
}

impl OverlayStyle {
    pub fn is_visible(&self) -> bool {
        !matches!(self, OverlayStyle::None)
    }
}

impl fmt::Display for OverlayStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayStyle::Full => write!(f, "full"),
            OverlayStyle::Dots => write!(f, "dots"),
            OverlayStyle::None => write!(f, "none"),
        }
    }
}

/// Where overlay layers sit in the host's layer stack
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "typescript", derive(Tsify))]
#[serde(rename_all = "lowercase")]
pub enum Layering {
    /// Immediately behind the host's painted-pixel layer
    Behind,
    /// Immediately above the host's hover layer
    Above,
    #[default]
    Top,
}

/// 8-bit RGBA color
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "typescript", derive(Tsify))]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba([0, 0, 0, 0]);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }
}

/// Latch that lets a repeated diagnostic through the first time only
#[derive(Debug, Default)]
pub struct LogOnce(Cell<bool>);

impl LogOnce {
    pub const fn new() -> Self {
        Self(Cell::new(false))
    }

    /// True on the first call, false afterwards
    pub fn first(&self) -> bool {
        !self.0.replace(true)
    }
}

/// Create an opaque identifier for a new overlay
pub fn new_overlay_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Return `base`, or `base (n)` with the smallest `n` that does not collide
/// case-insensitively with any of `existing`
pub fn unique_name<S: AsRef<str>>(base: &str, existing: &[S]) -> String {
    let taken: HashSet<String> = existing
        .iter()
        .map(|name| name.as_ref().to_lowercase())
        .collect();
    if !taken.contains(&base.to_lowercase()) {
        return base.to_string();
    }
    let mut i = 1;
    loop {
        let candidate = format!("{base} ({i})");
        if !taken.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        i += 1;
    }
}

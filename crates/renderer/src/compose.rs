//! Overlay compositing
//!
//! Everything here samples nearest-neighbour only; overlay art is pixel art
//! and must keep hard edges.

use overlay_pro_config::RenderConfig;
use overlay_pro_shared::{OverlayStyle, Rgba};

use crate::bitmap::Bitmap;

/// Compositing parameters taken from the render configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComposeParams {
    pub upscale: u32,
    pub minify: u32,
    pub checker_light: Rgba,
    pub checker_dark: Rgba,
}

impl From<&RenderConfig> for ComposeParams {
    fn from(config: &RenderConfig) -> Self {
        Self {
            upscale: config.upscale.max(1),
            minify: config.minify_scale.max(1),
            checker_light: config.checker_light,
            checker_dark: config.checker_dark,
        }
    }
}

impl Default for ComposeParams {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

impl ComposeParams {
    /// Side of the square one source pixel occupies in dots style
    pub fn dot_cell(&self) -> u32 {
        self.upscale * self.minify
    }

    /// Offset of the dot inside its cell
    pub fn dot_offset(&self) -> u32 {
        (self.minify - 1) / 2 * self.upscale
    }
}

/// Build the payload for `style`; `None` style has no payload
pub fn compose(style: OverlayStyle, source: &Bitmap, params: &ComposeParams) -> Option<Bitmap> {
    match style {
        OverlayStyle::Full => Some(compose_full(source, params)),
        OverlayStyle::Dots => Some(compose_dots(source, params)),
        OverlayStyle::None => None,
    }
}

/// Upscaled copy of `source` with a checkerboard behind partially transparent pixels
pub fn compose_full(source: &Bitmap, params: &ComposeParams) -> Bitmap {
    let mut out = source.scale_nearest(params.upscale);
    let width = out.width() as usize;
    if width == 0 {
        return out;
    }

    for (i, pixel) in out.pixels_mut().iter_mut().enumerate() {
        let alpha = pixel[3];
        if alpha == 0 || alpha == 255 {
            continue;
        }
        let (x, y) = (i % width, i / width);
        let checker = if (x + y) % 2 == 0 {
            params.checker_light
        } else {
            params.checker_dark
        };
        *pixel = source_over(*pixel, checker.0);
    }
    out
}

/// One `upscale`-sized dot per source pixel, in the source pixel's color
pub fn compose_dots(source: &Bitmap, params: &ComposeParams) -> Bitmap {
    let mut out = compose_full(source, params).scale_nearest(params.minify);
    let width = out.width() as usize;
    if width == 0 {
        return out;
    }

    let cell = params.dot_cell() as usize;
    let dot = params.dot_offset() as usize..(params.dot_offset() + params.upscale) as usize;
    for (i, pixel) in out.pixels_mut().iter_mut().enumerate() {
        let (x, y) = (i % width, i / width);
        if !(dot.contains(&(x % cell)) && dot.contains(&(y % cell))) {
            *pixel = [0; 4];
        }
    }
    out
}

/// Multiply every pixel by `tint`, keeping the original alpha
pub fn tint_multiply_masked(source: &Bitmap, tint: Rgba) -> Bitmap {
    let mut out = source.clone();
    let strength = tint.0[3] as u32;
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            let original = pixel[c] as u32;
            let multiplied = (original * tint.0[c] as u32 + 127) / 255;
            let mixed = (original * (255 - strength) + multiplied * strength + 127) / 255;
            pixel[c] = mixed as u8;
        }
    }
    out
}

/// Straight-alpha `src` over `dst`
fn source_over(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_alpha = sa + da * (1.0 - sa);
    if out_alpha <= 0.0 {
        return [0; 4];
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let value = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_alpha;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_alpha * 255.0).round() as u8;
    out
}

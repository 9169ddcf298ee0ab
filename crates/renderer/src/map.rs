//! The subset of the host map API the render pipeline drives

use overlay_pro_shared::{LngLat, OverlayResult};

use crate::bitmap::Bitmap;

pub const RASTER_OPACITY: &str = "raster-opacity";

/// Image source payload: composed pixels pinned to four geographic corners
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayImage {
    pub bitmap: Bitmap,
    /// Top-left, top-right, bottom-right, bottom-left
    pub coordinates: [LngLat; 4],
}

/// Raster layer drawing one image source
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub id: String,
    pub source: String,
    pub opacity: f64,
}

impl RasterLayer {
    /// Layer and source share `id`
    pub fn new(id: &str, opacity: f64) -> Self {
        Self {
            id: id.to_string(),
            source: id.to_string(),
            opacity,
        }
    }
}

/// Layer and source operations on the host map
///
/// `before` names the layer to insert in front of; `None` means topmost.
/// Layers are always drawn with nearest-neighbour resampling.
pub trait MapTarget {
    fn has_layer(&self, id: &str) -> bool;

    fn has_source(&self, id: &str) -> bool;

    fn add_source(&self, id: &str, image: &OverlayImage) -> OverlayResult<()>;

    /// Replace the pixels and corners of an existing image source
    fn update_source(&self, id: &str, image: &OverlayImage) -> OverlayResult<()>;

    fn remove_source(&self, id: &str) -> OverlayResult<()>;

    fn add_layer(&self, layer: &RasterLayer, before: Option<&str>) -> OverlayResult<()>;

    fn remove_layer(&self, id: &str) -> OverlayResult<()>;

    fn move_layer(&self, id: &str, before: Option<&str>) -> OverlayResult<()>;

    fn set_paint_property(&self, id: &str, property: &str, value: f64) -> OverlayResult<()>;
}

/// Remove the layer, then the source, for `id`; missing parts are skipped
///
/// The source removal is attempted even if removing the layer failed.
pub fn remove_overlay<M: MapTarget + ?Sized>(map: &M, id: &str) -> OverlayResult<()> {
    let layer = if map.has_layer(id) {
        map.remove_layer(id)
    } else {
        Ok(())
    };
    let source = if map.has_source(id) {
        map.remove_source(id)
    } else {
        Ok(())
    };
    layer.and(source)
}

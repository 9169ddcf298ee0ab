//! Paint verification
//!
//! Every paint records an annotation under its tile. An annotation is checked
//! right away and once more when its tile's data refreshes; after that refresh
//! it is gone whatever the outcome. Annotations for tiles that never refresh
//! stay pending.

use once_cell::unsync::OnceCell;
use overlay_pro_shared::geo::locate;
use overlay_pro_shared::{LngLat, Rgba, TileId, TilePixel};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bitmap::Bitmap;
use crate::compose::tint_multiply_masked;

/// Source of one color per tile pixel
pub trait PixelSampler {
    /// `None` when the pixel cannot be read right now
    fn sample(&self, tile: TileId, pixel: TilePixel) -> Option<Rgba>;
}

/// Placement crosshair shared by every canvas that shows it
pub trait Crosshair {
    /// The unmodified crosshair image, once loaded
    fn image(&self) -> Option<Bitmap>;

    /// Switch every user of this crosshair to `painted`
    fn show_painted(&self, painted: &Bitmap);
}

/// One pending paint awaiting verification
#[derive(Clone)]
pub struct PaintAnnotation {
    pub crosshair: Rc<dyn Crosshair>,
    pub lng_lat: LngLat,
    pub tile: TileId,
    pub pixel: TilePixel,
    /// Position inside the tile-sized preview canvas
    pub canvas_position: (u32, u32),
}

impl PaintAnnotation {
    pub fn new(crosshair: Rc<dyn Crosshair>, lng_lat: LngLat) -> Self {
        let (tile, pixel) = locate(lng_lat);
        Self {
            crosshair,
            lng_lat,
            tile,
            pixel,
            canvas_position: (pixel.x, pixel.y),
        }
    }
}

/// Pending annotations by tile, in paint order
#[derive(Default)]
pub struct AnnotationIndex {
    pending: HashMap<TileId, Vec<PaintAnnotation>>,
}

impl AnnotationIndex {
    pub fn record(&mut self, annotation: PaintAnnotation) {
        self.pending
            .entry(annotation.tile)
            .or_default()
            .push(annotation);
    }

    /// Remove and return everything pending for `tile`
    pub fn drain(&mut self, tile: TileId) -> Vec<PaintAnnotation> {
        self.pending.remove(&tile).unwrap_or_default()
    }

    pub fn pending(&self, tile: TileId) -> usize {
        self.pending.get(&tile).map(Vec::len).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Lazily built tinted variant of the crosshair
pub struct TintedCrosshair {
    tint: Rgba,
    tinted: OnceCell<Bitmap>,
}

impl TintedCrosshair {
    pub fn new(tint: Rgba) -> Self {
        Self {
            tint,
            tinted: OnceCell::new(),
        }
    }

    /// Tinted `base`; built on first use and reused afterwards
    pub fn variant(&self, base: &Bitmap) -> &Bitmap {
        self.tinted
            .get_or_init(|| tint_multiply_masked(base, self.tint))
    }

    pub fn is_built(&self) -> bool {
        self.tinted.get().is_some()
    }
}

/// Compares painted pixels against the live map and retints the crosshair
pub struct PixelVerifier {
    preview: Box<dyn PixelSampler>,
    live: Box<dyn PixelSampler>,
    tinted: TintedCrosshair,
    index: RefCell<AnnotationIndex>,
}

impl PixelVerifier {
    pub fn new(preview: Box<dyn PixelSampler>, live: Box<dyn PixelSampler>, tint: Rgba) -> Self {
        Self {
            preview,
            live,
            tinted: TintedCrosshair::new(tint),
            index: RefCell::new(AnnotationIndex::default()),
        }
    }

    /// Record a paint at `lng_lat` and verify it immediately
    pub fn on_paint(&self, crosshair: Rc<dyn Crosshair>, lng_lat: LngLat) -> TileId {
        let annotation = PaintAnnotation::new(crosshair, lng_lat);
        let tile = annotation.tile;
        self.index.borrow_mut().record(annotation.clone());
        self.verify(&annotation);
        tile
    }

    /// Verify and drop every annotation pending for `tile`
    ///
    /// Returns how many of them matched.
    pub fn on_tile_refresh(&self, tile: TileId) -> usize {
        // Drained before any crosshair update can re-enter this path.
        let drained = self.index.borrow_mut().drain(tile);
        if !drained.is_empty() {
            log::debug!("Verifying {} paints on tile {tile}", drained.len());
        }
        drained
            .iter()
            .filter(|annotation| self.verify(annotation))
            .count()
    }

    /// Apply the painted tint if preview and live colors agree
    pub fn verify(&self, annotation: &PaintAnnotation) -> bool {
        let painted = self.preview.sample(annotation.tile, annotation.pixel);
        let current = self.live.sample(annotation.tile, annotation.pixel);
        match (painted, current) {
            (Some(painted), Some(current)) if painted == current => {
                let Some(base) = annotation.crosshair.image() else {
                    return false;
                };
                annotation.crosshair.show_painted(self.tinted.variant(&base));
                true
            }
            _ => false,
        }
    }

    pub fn pending(&self, tile: TileId) -> usize {
        self.index.borrow().pending(tile)
    }

    pub fn pending_total(&self) -> usize {
        self.index.borrow().len()
    }
}

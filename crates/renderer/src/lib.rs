//! Overlay render pipeline
//!
//! Decodes overlay images, composites them into their display style, keeps
//! the host map's overlay layers in line with the display settings, and
//! verifies painted pixels against the live map. The host map and every pixel
//! source are reached only through the traits in `map` and `verify`.

pub mod bitmap;
pub mod compose;
pub mod decode;
pub mod map;
pub mod reconcile;
pub mod verify;

pub use bitmap::Bitmap;
pub use compose::{compose, compose_dots, compose_full, tint_multiply_masked, ComposeParams};
pub use decode::{DecodeCache, ImageDecoder};
pub use map::{MapTarget, OverlayImage, RasterLayer};
pub use reconcile::{LogNotifier, Notifier, ReconcileStats, Reconciler};
pub use verify::{
    AnnotationIndex, Crosshair, PaintAnnotation, PixelSampler, PixelVerifier, TintedCrosshair,
};

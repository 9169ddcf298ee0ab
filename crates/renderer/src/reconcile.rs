//! Overlay reconciliation
//!
//! A pass runs in two phases. The decode phase may suspend while images are
//! decoded; it touches the map only to read. The mutation phase then applies
//! every layer and source change synchronously, so a pass never interleaves
//! map mutations with anything else. Callers serialize passes.

use overlay_pro_config::{DisplaySettings, LayerAnchors, RenderConfig};
use overlay_pro_shared::geo::footprint;
use overlay_pro_shared::{Layering, OverlayError, OverlayRecord, OverlayResult, OverlayStyle};
use std::cell::RefCell;
use std::collections::HashSet;

use crate::compose::{compose, ComposeParams};
use crate::decode::{DecodeCache, ImageDecoder};
use crate::map::{remove_overlay, MapTarget, OverlayImage, RasterLayer, RASTER_OPACITY};

/// Sink for the few messages the user must see
pub trait Notifier {
    fn notify(&self, message: &str);
}

/// Notifier that only logs
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        log::warn!("{message}");
    }
}

/// Outcome counters of one pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    pub displayed: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Opacity and stacking every layer of a pass shares
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    opacity: f64,
    layering: Layering,
}

/// What a record shows: image, style and position
#[derive(Debug, Clone, PartialEq)]
struct Shown {
    payload: String,
    style: OverlayStyle,
    x: i64,
    y: i64,
}

#[derive(Debug, Clone)]
struct DisplayedOverlay {
    layer: String,
    shown: Shown,
    placement: Placement,
}

enum Payload {
    Unchanged,
    Fresh(OverlayImage),
}

struct Prepared<'r> {
    record: &'r OverlayRecord,
    layer: String,
    shown: Shown,
    payload: Payload,
}

/// Records that should be on the map, in input order
pub fn desired_records(settings: &DisplaySettings) -> impl Iterator<Item = &OverlayRecord> {
    let visible = settings.style.is_visible();
    settings
        .overlays
        .iter()
        .filter(move |record| visible && record.enabled && record.image.is_some())
}

/// Keeps the map's overlay layers in line with the display settings
pub struct Reconciler {
    params: ComposeParams,
    max_dim: u32,
    layer_prefix: String,
    anchors: LayerAnchors,
    decoder: Box<dyn ImageDecoder>,
    notifier: Box<dyn Notifier>,
    cache: DecodeCache,
    displayed: RefCell<Vec<DisplayedOverlay>>,
}

impl Reconciler {
    pub fn new(
        config: &RenderConfig,
        decoder: Box<dyn ImageDecoder>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            params: ComposeParams::from(config),
            max_dim: config.max_overlay_dim,
            layer_prefix: config.layer_prefix.clone(),
            anchors: config.layer_anchors.clone(),
            decoder,
            notifier,
            cache: DecodeCache::new(),
            displayed: RefCell::new(Vec::new()),
        }
    }

    pub fn cache(&self) -> &DecodeCache {
        &self.cache
    }

    /// Map layer and source id of `record`
    pub fn layer_name(&self, record: &OverlayRecord) -> String {
        format!("{}{}", self.layer_prefix, record.name)
    }

    /// Layer ids currently displayed, in input order
    pub fn displayed_layers(&self) -> Vec<String> {
        self.displayed
            .borrow()
            .iter()
            .map(|entry| entry.layer.clone())
            .collect()
    }

    pub fn is_displayed(&self, layer: &str) -> bool {
        self.displayed.borrow().iter().any(|entry| entry.layer == layer)
    }

    /// Bring the map in line with `settings`
    ///
    /// Per-record failures are rolled back and logged; the pass always
    /// continues with the next record.
    pub async fn reconcile<M: MapTarget + ?Sized>(
        &self,
        map: &M,
        settings: &DisplaySettings,
    ) -> ReconcileStats {
        let mut stats = ReconcileStats::default();

        let mut prepared = Vec::new();
        for record in desired_records(settings) {
            match self.prepare(map, record, settings.style).await {
                Ok(Some(item)) => prepared.push(item),
                Ok(None) => stats.rejected += 1,
                Err(err) => {
                    log::error!("Overlay \"{}\" skipped: {err}", record.name);
                    self.surface(&err);
                    stats.failed += 1;
                }
            }
        }

        // Everything below runs without suspending.
        let previous = self.displayed.take();
        let keep: HashSet<&str> = prepared.iter().map(|item| item.layer.as_str()).collect();
        for entry in previous.iter().filter(|e| !keep.contains(e.layer.as_str())) {
            match remove_overlay(map, &entry.layer) {
                Ok(()) => stats.removed += 1,
                Err(err) => log::error!("Failed to remove overlay layer {}: {err}", entry.layer),
            }
        }

        let placement = Placement {
            opacity: settings.layer_opacity(),
            layering: settings.layering,
        };
        let mut displayed = Vec::with_capacity(prepared.len());
        // Set once a layer was placed at the anchor; every later layer must follow it.
        let mut restack = false;
        for item in prepared {
            let shown = previous.iter().find(|entry| entry.layer == item.layer);
            match self.apply(map, &item, shown, placement, &mut restack, &mut stats) {
                Ok(()) => displayed.push(DisplayedOverlay {
                    layer: item.layer,
                    shown: item.shown,
                    placement,
                }),
                Err(err) => {
                    log::error!("Failed to display overlay \"{}\": {err}", item.record.name);
                    if let Err(cleanup) = remove_overlay(map, &item.layer) {
                        log::error!("Rollback of {} incomplete: {cleanup}", item.layer);
                    }
                    stats.failed += 1;
                }
            }
        }

        stats.displayed = displayed.len();
        *self.displayed.borrow_mut() = displayed;
        log::debug!("Reconciled overlays: {stats:?}");
        stats
    }

    fn surface(&self, err: &OverlayError) {
        if err.is_user_visible() {
            self.notifier.notify(&err.to_string());
        }
    }

    async fn prepare<'r, M: MapTarget + ?Sized>(
        &self,
        map: &M,
        record: &'r OverlayRecord,
        style: OverlayStyle,
    ) -> OverlayResult<Option<Prepared<'r>>> {
        let Some(payload) = record.image.as_deref() else {
            return Ok(None);
        };
        if self.cache.is_rejected(&record.id, payload) {
            return Ok(None);
        }

        let layer = self.layer_name(record);
        let shown = Shown {
            payload: payload.to_string(),
            style,
            x: record.x,
            y: record.y,
        };
        let unchanged = self
            .displayed
            .borrow()
            .iter()
            .any(|entry| entry.layer == layer && entry.shown == shown);
        if unchanged && map.has_source(&layer) && map.has_layer(&layer) {
            return Ok(Some(Prepared {
                record,
                layer,
                shown,
                payload: Payload::Unchanged,
            }));
        }

        let bitmap = self
            .cache
            .get_or_decode(self.decoder.as_ref(), payload)
            .await?;
        let (width, height) = bitmap.dimensions();
        if width >= self.max_dim || height >= self.max_dim {
            self.cache.reject(&record.id, payload);
            let err = OverlayError::ImageTooLarge {
                name: record.name.clone(),
                width,
                height,
                max: self.max_dim,
            };
            log::warn!("{err}");
            self.surface(&err);
            return Ok(None);
        }

        let composed = compose(style, &bitmap, &self.params).ok_or_else(|| OverlayError::Internal {
            message: format!("style {style} has no image"),
        })?;
        Ok(Some(Prepared {
            record,
            layer,
            shown,
            payload: Payload::Fresh(OverlayImage {
                bitmap: composed,
                coordinates: footprint(record.origin(), width, height),
            }),
        }))
    }

    fn apply<M: MapTarget + ?Sized>(
        &self,
        map: &M,
        item: &Prepared<'_>,
        shown: Option<&DisplayedOverlay>,
        placement: Placement,
        restack: &mut bool,
        stats: &mut ReconcileStats,
    ) -> OverlayResult<()> {
        let Placement { opacity, layering } = placement;
        let before = self.anchors.before_id(layering);
        let has_layer = map.has_layer(&item.layer);

        if has_layer {
            if shown.map(|s| s.placement.opacity != opacity).unwrap_or(true) {
                map.set_paint_property(&item.layer, RASTER_OPACITY, opacity)?;
            }
            if *restack || shown.map(|s| s.placement.layering != layering).unwrap_or(true) {
                map.move_layer(&item.layer, before)?;
                *restack = true;
            }
        }

        if let Payload::Fresh(image) = &item.payload {
            if map.has_source(&item.layer) {
                map.update_source(&item.layer, image)?;
                stats.updated += 1;
            } else {
                map.add_source(&item.layer, image)?;
            }
        }

        if !has_layer {
            map.add_layer(&RasterLayer::new(&item.layer, opacity), before)?;
            *restack = true;
            stats.added += 1;
        }
        Ok(())
    }
}

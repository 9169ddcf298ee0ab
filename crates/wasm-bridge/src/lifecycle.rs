//! Wiring of a core instance to the page
//!
//! `start` installs the interceptions and begins bundle discovery. Everything
//! else happens in reaction to captures: the first pass runs once the map is
//! captured, and verification starts once both map and preview are known.

use overlay_pro_config::DisplaySettings;
use overlay_pro_hooks::{install_captures, locate_preview, locate_user_state, watch_paint};
use overlay_pro_renderer::{Crosshair, PixelVerifier, ReconcileStats};
use overlay_pro_shared::{OverlayError, OverlayResult, TileId};
use std::rc::{Rc, Weak};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::discovery;
use crate::instance_manager::OverlayInstance;
use crate::js_host::{call_method, get_property, js_error, JsHandle};
use crate::js_map::JsMap;
use crate::samplers::{base_source, GlTextureSampler, ImageCrosshair, PreviewSampler, TILE_ZOOM};

/// Map event fired when tile data of a source changes
const SOURCE_DATA_EVENT: &str = "sourcedata";

pub fn start(instance: &Rc<OverlayInstance>) -> OverlayResult<()> {
    if instance.started.replace(true) {
        log::debug!("Core already started");
        return Ok(());
    }

    let weak = Rc::downgrade(instance);
    instance.bindings.map.subscribe(move |map| {
        if let Some(instance) = weak.upgrade() {
            on_map(&instance, map);
        }
    });
    let weak = Rc::downgrade(instance);
    instance.bindings.preview.subscribe(move |_| {
        if let Some(instance) = weak.upgrade() {
            setup_verification(&instance);
        }
    });
    let refresh = instance.bindings.ui_refresh.clone();
    instance.settings.subscribe(move |_| refresh.fire());

    install_captures(&instance.hooks, &instance.config.detection, &instance.bindings)?;
    discovery::watch_bundles(instance.registry.clone()).map_err(|err| js_error("discovery", &err))?;

    spawn_local({
        let locate = locate_user_state(
            instance.registry.clone(),
            instance.scope.clone(),
            instance.bindings.clone(),
            instance.config.cooldown_unit_ms,
        );
        async move {
            if let Err(err) = locate.await {
                log::warn!("{err}; cooldown rounding unavailable");
            }
        }
    });
    spawn_local({
        let locate = locate_preview(
            instance.registry.clone(),
            instance.config.detection.preview_paint_method.clone(),
            instance.bindings.preview.clone(),
        );
        async move {
            if let Err(err) = locate.await {
                log::warn!("{err}; paint verification unavailable");
            }
        }
    });

    log::info!("Overlay core started");
    Ok(())
}

fn on_map(instance: &Rc<OverlayInstance>, map: &JsHandle) {
    log::info!("Captured map");
    if let Err(err) = watch_tile_refresh(Rc::downgrade(instance), map) {
        log::warn!("Tile refreshes will not be verified: {err}");
    }
    setup_verification(instance);

    let instance = instance.clone();
    spawn_local(async move {
        let settings = instance.settings.current();
        if let Err(err) = run_pass(&instance, &settings).await {
            log::error!("Initial overlay pass failed: {err}");
        }
    });
}

/// Reconcile the captured map against `settings`
///
/// Does nothing until the map is captured. Passes are serialized.
pub async fn run_pass(instance: &OverlayInstance, settings: &DisplaySettings) -> OverlayResult<ReconcileStats> {
    let map = instance
        .bindings
        .map
        .get()
        .ok_or_else(|| OverlayError::DetectionMiss {
            what: "map".to_string(),
        })?;
    let _pass = instance.pass.lock().await;
    let stats = instance
        .reconciler
        .reconcile(&JsMap::new(map.0), settings)
        .await;
    instance.bindings.ui_refresh.fire();
    Ok(stats)
}

fn setup_verification(instance: &OverlayInstance) {
    let (Some(map), Some(preview)) = (instance.bindings.map.get(), instance.bindings.preview.get()) else {
        return;
    };
    if instance.verifier.borrow().is_some() {
        return;
    }
    let Some(crosshair) = ImageCrosshair::from_preview(preview.value()) else {
        log::warn!("Paint preview has no crosshair image; paint verification unavailable");
        return;
    };
    let crosshair: Rc<dyn Crosshair> = Rc::new(crosshair);

    let render = &instance.config.render;
    let verifier = Rc::new(PixelVerifier::new(
        Box::new(PreviewSampler::new(preview.0.clone())),
        Box::new(GlTextureSampler::new(map.0, &render.layer_anchors.behind)),
        render.painted_tint,
    ));

    let on_paint = {
        let verifier = verifier.clone();
        move |lng_lat| {
            let tile = verifier.on_paint(crosshair.clone(), lng_lat);
            log::debug!("Paint on tile {tile} recorded");
        }
    };
    let method = &instance.config.detection.preview_paint_method;
    match watch_paint(instance.scope.as_ref(), &preview, method, on_paint) {
        Ok(()) => {
            *instance.verifier.borrow_mut() = Some(verifier);
            log::info!("Paint verification active");
        }
        Err(err) => log::warn!("Paint verification unavailable: {err}"),
    }
}

/// Tile of the base layer whose data an event reports as refreshed
fn refreshed_tile(event: &JsValue, source: Option<&str>) -> Option<TileId> {
    let event_source = get_property(event, "sourceId")?.as_string()?;
    if Some(event_source.as_str()) != source {
        return None;
    }
    let canonical = get_property(event, "tile")
        .and_then(|tile| get_property(&tile, "tileID"))
        .and_then(|id| get_property(&id, "canonical"))?;
    let coord = |key| get_property(&canonical, key).and_then(|v| v.as_f64());
    if coord("z")? != TILE_ZOOM {
        return None;
    }
    Some(TileId::new(coord("x")? as i64, coord("y")? as i64))
}

fn watch_tile_refresh(instance: Weak<OverlayInstance>, map: &JsHandle) -> OverlayResult<()> {
    let behind = instance
        .upgrade()
        .map(|instance| instance.config.render.layer_anchors.behind.clone())
        .unwrap_or_default();
    let target = map.0.clone();
    let listener = Closure::<dyn Fn(JsValue)>::new(move |event: JsValue| {
        let Some(instance) = instance.upgrade() else {
            return;
        };
        let source = base_source(&target, &behind);
        let Some(tile) = refreshed_tile(&event, source.as_deref()) else {
            return;
        };
        let verifier = instance.verifier.borrow().clone();
        if let Some(verifier) = verifier {
            verifier.on_tile_refresh(tile);
        }
    });
    call_method(
        map.value(),
        "on",
        &[JsValue::from_str(SOURCE_DATA_EVENT), listener.into_js_value()],
    )?;
    Ok(())
}

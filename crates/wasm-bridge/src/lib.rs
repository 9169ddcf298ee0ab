//! WASM Bridge crate for Overlay Pro
//! Binds the host-agnostic core to the page: JS host access, the MapLibre
//! map adapter, bundle discovery, and the API exported to the userscript.

use js_sys::{Array, Function, Promise};
use overlay_pro_config::{ConfigValidator, CoreConfig};
use overlay_pro_shared::anchor::{PixelAnchor, DEFAULT_BACKEND_HOST};
use overlay_pro_shared::geo::{self, LngLat};
use overlay_pro_shared::{ErrorResponse, OverlayError};
use serde_json::json;
use std::rc::Rc;
use std::sync::Once;
use uuid::Uuid;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

pub mod canvas;
pub mod discovery;
pub mod instance_manager;
pub mod js_host;
pub mod js_map;
pub mod lifecycle;
pub mod samplers;

use instance_manager::{InstanceManager, OverlayInstance};

static INIT: Once = Once::new();

/// Panic hook and console logger; safe to call repeatedly
pub fn init_runtime() {
    INIT.call_once(|| {
        console_error_panic_hook::set_once();
        // Another logger may already be installed by the embedding page.
        let _ = console_log::init_with_level(log::Level::Info);
    });
}

fn to_js_error(err: OverlayError, operation: &str) -> JsValue {
    JsValue::from_str(&ErrorResponse::new(err).with_context("OverlayPro", operation).to_json())
}

#[wasm_bindgen]
pub struct OverlayPro {
    instance_id: Uuid,
}

impl OverlayPro {
    fn instance(&self) -> Result<Rc<OverlayInstance>, JsValue> {
        InstanceManager::get(&self.instance_id).ok_or_else(|| JsValue::from_str("Overlay instance not found"))
    }

    fn captured(&self, get: impl FnOnce(&OverlayInstance) -> Option<js_host::JsHandle>) -> JsValue {
        InstanceManager::with_instance(&self.instance_id, get)
            .flatten()
            .map(|handle| handle.0)
            .unwrap_or(JsValue::UNDEFINED)
    }
}

#[wasm_bindgen]
impl OverlayPro {
    /// Create a core from an optional JSON configuration
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<OverlayPro, JsValue> {
        init_runtime();
        let config = match config_json {
            Some(json) => CoreConfig::from_json(&json),
            None => {
                let config = CoreConfig::default();
                ConfigValidator::validate_core(&config).map(|()| config)
            }
        }
        .map_err(|err| to_js_error(err.into(), "new"))?;

        Ok(OverlayPro {
            instance_id: InstanceManager::create_instance(config),
        })
    }

    /// Install the interceptions and start bundle discovery
    ///
    /// Must run before the host constructs its map.
    pub fn start(&self) -> Result<(), JsValue> {
        let instance = self.instance()?;
        lifecycle::start(&instance).map_err(|err| to_js_error(err, "start"))
    }

    /// Store new display settings (when given) and reconcile the map
    ///
    /// Resolves with the pass counters as a JSON string.
    pub fn reconcile(&self, settings_json: Option<String>) -> Result<Promise, JsValue> {
        let instance = self.instance()?;
        if let Some(json) = settings_json {
            instance
                .settings
                .update_json(&json)
                .map_err(|err| to_js_error(err.into(), "reconcile"))?;
        }

        Ok(future_to_promise(async move {
            let settings = instance.settings.current();
            let stats = lifecycle::run_pass(&instance, &settings)
                .await
                .map_err(|err| to_js_error(err, "reconcile"))?;
            Ok(JsValue::from_str(
                &json!({
                    "displayed": stats.displayed,
                    "added": stats.added,
                    "updated": stats.updated,
                    "removed": stats.removed,
                    "rejected": stats.rejected,
                    "failed": stats.failed,
                })
                .to_string(),
            ))
        }))
    }

    /// Current display settings as JSON
    pub fn settings(&self) -> Result<String, JsValue> {
        let current = self.instance()?.settings.current();
        serde_json::to_string(current.as_ref()).map_err(|err| to_js_error(err.into(), "settings"))
    }

    /// Register the callback run whenever something the UI shows has changed
    pub fn set_ui_refresh(&self, callback: Function) -> Result<(), JsValue> {
        let instance = self.instance()?;
        instance.bindings.ui_refresh.set_callback(move || {
            if let Err(err) = callback.call0(&JsValue::NULL) {
                log::error!("UI refresh callback failed: {err:?}");
            }
        });
        Ok(())
    }

    /// Register the callback receiving user-facing messages
    pub fn set_notifier(&self, callback: Function) -> Result<(), JsValue> {
        self.instance()?.notifier.set_callback(callback);
        Ok(())
    }

    /// The captured map, or `undefined`
    pub fn map(&self) -> JsValue {
        self.captured(|instance| instance.bindings.map.get())
    }

    /// The most recently captured UI-state object, or `undefined`
    pub fn ui_state(&self) -> JsValue {
        self.captured(|instance| instance.bindings.ui_state.get())
    }

    /// The captured user-state object, or `undefined`
    pub fn user_state(&self) -> JsValue {
        self.captured(|instance| instance.bindings.user_state.get())
    }

    /// JSON of the pixel anchor last requested by the page, or `undefined`
    pub fn pixel_anchor(&self) -> Option<String> {
        InstanceManager::with_instance(&self.instance_id, |instance| instance.bindings.pixel_anchor.get())
            .flatten()
            .map(|anchor| anchor_json(&anchor))
    }

    /// Paints still waiting for their tile to refresh
    pub fn pending_verifications(&self) -> usize {
        InstanceManager::with_instance(&self.instance_id, |instance| {
            instance
                .verifier
                .borrow()
                .as_ref()
                .map(|verifier| verifier.pending_total())
                .unwrap_or(0)
        })
        .unwrap_or(0)
    }

    /// Forget decoded images; rejected images stay rejected
    pub fn clear_image_cache(&self) -> Result<(), JsValue> {
        self.instance()?.reconciler.cache().clear();
        Ok(())
    }

    /// Undo every interception and drop the core
    pub fn destroy(self) -> bool {
        InstanceManager::remove_instance(&self.instance_id)
    }
}

/// `[lng, lat]` of a point on the global pixel grid
#[wasm_bindgen(js_name = pixelToGeo)]
pub fn pixel_to_geo(x: f64, y: f64) -> Box<[f64]> {
    Box::new(geo::pixel_to_geo(x, y).to_array())
}

/// `[x, y]` global pixel containing a geographic point
#[wasm_bindgen(js_name = geoToPixel)]
pub fn geo_to_pixel(lng: f64, lat: f64) -> Box<[f64]> {
    let point = geo::geo_to_pixel(LngLat::new(lng, lat));
    Box::new([point.x as f64, point.y as f64])
}

/// `base`, or `base (n)` with the smallest free `n`
#[wasm_bindgen(js_name = uniqueName)]
pub fn unique_name(base: &str, existing: Array) -> String {
    let existing: Vec<String> = existing.iter().filter_map(|name| name.as_string()).collect();
    overlay_pro_shared::unique_name(base, &existing)
}

#[wasm_bindgen(js_name = newOverlayId)]
pub fn new_overlay_id() -> String {
    overlay_pro_shared::new_overlay_id()
}

/// Anchor of a pixel URL as JSON, or `undefined` if `url` is not one
#[wasm_bindgen(js_name = parsePixelUrl)]
pub fn parse_pixel_url(url: &str, backend_host: Option<String>) -> Option<String> {
    let host = backend_host.as_deref().unwrap_or(DEFAULT_BACKEND_HOST);
    PixelAnchor::parse(url, host).map(|anchor| anchor_json(&anchor))
}

fn anchor_json(anchor: &PixelAnchor) -> String {
    let pixel = anchor.pixel();
    json!({
        "tileX": anchor.tile_x,
        "tileY": anchor.tile_y,
        "x": anchor.x,
        "y": anchor.y,
        "pixelX": pixel.x,
        "pixelY": pixel.y,
        "url": anchor.normalized,
    })
    .to_string()
}

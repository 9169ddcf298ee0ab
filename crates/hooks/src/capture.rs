//! Capture installers for the host objects the overlay core depends on
//!
//! One mechanism per captured object:
//! - the map instance comes from the `Promise` whose executor mentions the
//!   map host; the hook removes itself after the first match
//! - the UI state comes from every `Proxy` wrapping an object whose `name`
//!   is a known UI-state label
//! - the user state is an export of a late-loaded bundle, located through the
//!   symbol registry, whose `cooldown` getter is then patched
//! - the pixel anchor comes from `fetch` calls to the backend pixel endpoint

use overlay_pro_config::{DetectionConfig, UrlRewriteRule};
use overlay_pro_shared::anchor::PixelAnchor;
use overlay_pro_shared::{LngLat, OverlayError, OverlayResult};
use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::captured::{CapturedCell, HostBindings, UiRefresh};
use crate::hook::{HookRegistry, Unhook};
use crate::host::{ConstructObserver, HostScope, HostValue};
use crate::registry::{filters, find_export, SymbolRegistry};

pub const PROMISE_GLOBAL: &str = "Promise";
pub const PROXY_GLOBAL: &str = "Proxy";
pub const URL_GLOBAL: &str = "URL";
pub const FETCH_GLOBAL: &str = "fetch";

pub const COOLDOWN_KEY: &str = "cooldown";
pub const COOLDOWN_ORIGINAL_KEY: &str = "cooldownOriginal";
pub const USER_DATA_KEY: &str = "data";

/// Observes promise constructions until the one building the map shows up
pub struct MapCapture<S: HostScope> {
    marker: String,
    cell: CapturedCell<S::Value>,
    unhook: Unhook<S>,
    fired: Cell<bool>,
}

impl<S: HostScope> ConstructObserver<S::Value> for MapCapture<S> {
    fn after(&self, args: &[S::Value], instance: &S::Value) {
        if self.fired.get() {
            return;
        }
        let Some(executor) = args.first() else {
            return;
        };
        if !filters::source_contains(executor, &self.marker) {
            return;
        }

        self.fired.set(true);
        self.unhook.unhook();

        let cell = self.cell.clone();
        self.unhook.scope().on_settle(
            instance,
            Box::new(move |map| {
                log::info!("Captured map instance");
                cell.set(map);
            }),
        );
    }
}

/// Install the one-shot map capture on the promise constructor
pub fn capture_map<S: HostScope>(
    hooks: &HookRegistry<S>,
    marker: &str,
    cell: CapturedCell<S::Value>,
) -> OverlayResult<Unhook<S>> {
    let marker = marker.to_string();
    hooks.install_constructor_hook(PROMISE_GLOBAL, move |unhook| {
        Rc::new(MapCapture {
            marker,
            cell,
            unhook,
            fired: Cell::new(false),
        }) as Rc<dyn ConstructObserver<S::Value>>
    })
}

/// Observes proxy constructions for UI-state objects
pub struct UiStateCapture<V> {
    labels: HashSet<String>,
    cell: CapturedCell<V>,
    refresh: UiRefresh,
}

impl<V: HostValue> UiStateCapture<V> {
    pub fn new(labels: &[String], cell: CapturedCell<V>, refresh: UiRefresh) -> Self {
        Self {
            labels: labels.iter().cloned().collect(),
            cell,
            refresh,
        }
    }

    /// Target carries a `name` drawn from the known label set
    pub fn is_ui_state(&self, target: &V) -> bool {
        target
            .get("name")
            .and_then(|name| name.as_str())
            .map(|name| self.labels.contains(&name))
            .unwrap_or(false)
    }
}

impl<V: HostValue> ConstructObserver<V> for UiStateCapture<V> {
    fn after(&self, args: &[V], instance: &V) {
        let Some(target) = args.first() else {
            return;
        };
        if !self.is_ui_state(target) {
            return;
        }
        log::debug!(
            "UI state changed to {}",
            target
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
        );
        self.cell.set(instance.clone());
        self.refresh.fire();
    }
}

/// Install the repeating UI-state capture on the proxy constructor
pub fn capture_ui_state<S: HostScope>(
    hooks: &HookRegistry<S>,
    labels: &[String],
    cell: CapturedCell<S::Value>,
    refresh: UiRefresh,
) -> OverlayResult<Unhook<S>> {
    let capture = UiStateCapture::new(labels, cell, refresh);
    hooks.install_constructor_hook(PROXY_GLOBAL, move |_| {
        Rc::new(capture) as Rc<dyn ConstructObserver<S::Value>>
    })
}

/// Rewrites the input of URL constructions containing a configured needle
pub struct UrlRewrite {
    rules: Vec<UrlRewriteRule>,
}

impl UrlRewrite {
    pub fn new(rules: Vec<UrlRewriteRule>) -> Self {
        Self { rules }
    }

    pub fn rewrite(&self, input: &str) -> Option<String> {
        self.rules
            .iter()
            .find(|rule| input.contains(&rule.needle))
            .map(|rule| input.replace(&rule.needle, &rule.replacement))
    }
}

impl<V: HostValue> ConstructObserver<V> for UrlRewrite {
    fn before(&self, args: &mut Vec<V>) {
        let Some(input) = args.first().and_then(|arg| arg.as_str()) else {
            return;
        };
        if let Some(rewritten) = self.rewrite(&input) {
            log::debug!("Rewrote URL {input} -> {rewritten}");
            args[0] = V::from_string(&rewritten);
        }
    }
}

pub fn rewrite_urls<S: HostScope>(
    hooks: &HookRegistry<S>,
    rules: Vec<UrlRewriteRule>,
) -> OverlayResult<Unhook<S>> {
    let rewrite = UrlRewrite::new(rules);
    hooks.install_constructor_hook(URL_GLOBAL, move |_| {
        Rc::new(rewrite) as Rc<dyn ConstructObserver<S::Value>>
    })
}

/// URL requested by a `fetch` input: a string, a `URL` or a `Request`
pub fn request_url<V: HostValue>(input: &V) -> Option<String> {
    input
        .as_str()
        .or_else(|| input.get("url").and_then(|url| url.as_str()))
        .or_else(|| input.get("href").and_then(|href| href.as_str()))
}

/// Publishes the anchor of every backend pixel request that moves it
pub struct AnchorCapture {
    backend_host: String,
    cell: CapturedCell<PixelAnchor>,
    refresh: UiRefresh,
}

impl AnchorCapture {
    pub fn new(backend_host: &str, cell: CapturedCell<PixelAnchor>, refresh: UiRefresh) -> Self {
        Self {
            backend_host: backend_host.to_string(),
            cell,
            refresh,
        }
    }

    /// Record `url` if it is a pixel request; returns whether the anchor changed
    pub fn observe(&self, url: &str) -> bool {
        let Some(anchor) = PixelAnchor::parse(url, &self.backend_host) else {
            return false;
        };
        if self.cell.get().as_ref() == Some(&anchor) {
            return false;
        }
        log::info!("Captured pixel anchor {}", anchor.normalized);
        self.cell.set(anchor);
        self.refresh.fire();
        true
    }
}

/// Wrap `fetch` so backend pixel requests update the captured anchor
pub fn capture_pixel_anchor<S: HostScope>(
    hooks: &HookRegistry<S>,
    backend_host: &str,
    cell: CapturedCell<PixelAnchor>,
    refresh: UiRefresh,
) -> OverlayResult<Unhook<S>> {
    let capture = AnchorCapture::new(backend_host, cell, refresh);
    hooks.install_hook(FETCH_GLOBAL, move |context| {
        context.scope().wrap_function(
            context.original(),
            Rc::new(move |_this: &S::Value, args: &[S::Value]| {
                if let Some(url) = args.first().and_then(request_url) {
                    capture.observe(&url);
                }
            }),
        )
    })
}

/// Install every global-level capture the configuration asks for
///
/// The map capture is skipped once a map has been captured, and a capture
/// that is still active from an earlier call is left alone.
pub fn install_captures<S: HostScope>(
    hooks: &HookRegistry<S>,
    detection: &DetectionConfig,
    bindings: &HostBindings<S::Value>,
) -> OverlayResult<Vec<Unhook<S>>> {
    let mut installed = Vec::new();

    if !bindings.map.is_set() {
        keep_installed(
            &mut installed,
            capture_map(hooks, &detection.map_host_marker, bindings.map.clone()),
        )?;
    }

    keep_installed(
        &mut installed,
        capture_ui_state(
            hooks,
            &detection.ui_state_labels,
            bindings.ui_state.clone(),
            bindings.ui_refresh.clone(),
        ),
    )?;

    if !detection.url_rewrites.is_empty() {
        keep_installed(
            &mut installed,
            rewrite_urls(hooks, detection.url_rewrites.clone()),
        )?;
    }

    if detection.capture_pixel_anchor {
        keep_installed(
            &mut installed,
            capture_pixel_anchor(
                hooks,
                &detection.backend_host,
                bindings.pixel_anchor.clone(),
                bindings.ui_refresh.clone(),
            ),
        )?;
    }

    log::info!("Installed {} interceptions", installed.len());
    Ok(installed)
}

fn keep_installed<S: HostScope>(
    installed: &mut Vec<Unhook<S>>,
    result: OverlayResult<Unhook<S>>,
) -> OverlayResult<()> {
    match result {
        Ok(unhook) => {
            installed.push(unhook);
            Ok(())
        }
        Err(OverlayError::HookAlreadyActive { name }) => {
            log::debug!("Interception of {name} already active");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Round `value` up to the next multiple of `unit`
pub fn round_up_to_unit(value: f64, unit: f64) -> f64 {
    if !value.is_finite() || !unit.is_finite() || unit <= 0.0 {
        return value;
    }
    (value / unit).ceil() * unit
}

/// Wrap the `cooldown` getter of the user-state prototype so it reports whole units
///
/// The original getter stays available as `cooldownOriginal`. Patching an
/// already patched prototype does nothing.
pub fn patch_cooldown<S: HostScope>(
    scope: &S,
    user_state: &S::Value,
    unit_ms: f64,
) -> OverlayResult<()> {
    let proto = user_state
        .prototype()
        .ok_or_else(|| OverlayError::DetectionMiss {
            what: "user state prototype".to_string(),
        })?;
    if proto.has_accessor(COOLDOWN_ORIGINAL_KEY) {
        log::debug!("Cooldown getter already patched");
        return Ok(());
    }

    scope.wrap_getter(
        &proto,
        COOLDOWN_KEY,
        COOLDOWN_ORIGINAL_KEY,
        Rc::new(move |value: S::Value| match value.as_f64() {
            Some(ms) => S::Value::from_number(round_up_to_unit(ms, unit_ms)),
            None => value,
        }),
    )
}

/// Fire the UI refresh whenever fresh data is assigned to the user state
pub fn watch_user_data<S: HostScope>(
    scope: &S,
    user_state: &S::Value,
    refresh: UiRefresh,
) -> OverlayResult<()> {
    let proto = user_state
        .prototype()
        .ok_or_else(|| OverlayError::DetectionMiss {
            what: "user state prototype".to_string(),
        })?;
    scope.wrap_setter(
        &proto,
        USER_DATA_KEY,
        Rc::new(move |_user: &S::Value| refresh.fire()),
    )
}

/// Wait for the bundle exporting the user state, then patch and publish it
///
/// Resolves with `DetectionMiss` if discovery finishes without a match; the
/// cooldown display and paint-state refresh are then unavailable.
pub async fn locate_user_state<S: HostScope>(
    registry: SymbolRegistry<S::Value>,
    scope: Rc<S>,
    bindings: HostBindings<S::Value>,
    cooldown_unit_ms: f64,
) -> OverlayResult<S::Value> {
    let miss = || OverlayError::DetectionMiss {
        what: "user state".to_string(),
    };

    let module = registry
        .find_module(filters::user_state_module::<S::Value>())
        .await
        .ok_or_else(miss)?;
    let user = find_export(&module, filters::is_user_state).ok_or_else(miss)?;

    patch_cooldown(scope.as_ref(), &user, cooldown_unit_ms)?;
    if let Err(err) = watch_user_data(scope.as_ref(), &user, bindings.ui_refresh.clone()) {
        log::warn!("User data updates will not refresh the UI: {err}");
    }

    log::info!("Captured user state");
    bindings.user_state.set(user.clone());
    bindings.ui_refresh.fire();
    Ok(user)
}

/// Wait for the bundle exporting the paint preview and publish it
pub async fn locate_preview<V: HostValue>(
    registry: SymbolRegistry<V>,
    paint_method: String,
    cell: CapturedCell<V>,
) -> OverlayResult<V> {
    let miss = || OverlayError::DetectionMiss {
        what: "paint preview".to_string(),
    };

    let module = registry
        .find_module(filters::preview_module::<V>(paint_method.clone()))
        .await
        .ok_or_else(miss)?;
    let preview =
        find_export(&module, |export| filters::has_method(export, &paint_method)).ok_or_else(miss)?;

    log::info!("Captured paint preview");
    cell.set(preview.clone());
    Ok(preview)
}

/// Call `on_paint` with the location of every pixel placed through the preview
pub fn watch_paint<S: HostScope>(
    scope: &S,
    preview: &S::Value,
    paint_method: &str,
    on_paint: impl Fn(LngLat) + 'static,
) -> OverlayResult<()> {
    scope.wrap_method(
        preview,
        paint_method,
        Rc::new(move |_preview: &S::Value, args: &[S::Value]| match paint_location(args) {
            Some(location) => on_paint(location),
            None => log::debug!("Paint call without a location"),
        }),
    )
}

/// Location argument of a paint call: an object carrying numeric `lng`/`lat`
pub fn paint_location<V: HostValue>(args: &[V]) -> Option<LngLat> {
    let location = args.first()?;
    let lng = location.get("lng")?.as_f64()?;
    let lat = location.get("lat")?.as_f64()?;
    Some(LngLat { lng, lat })
}

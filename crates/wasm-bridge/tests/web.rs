//! Browser tests for the JS glue

use js_sys::{Array, Function, Reflect};
use overlay_pro_hooks::host::ConstructObserver;
use overlay_pro_hooks::{HostScope, HostValue};
use overlay_pro_renderer::{Bitmap, ImageDecoder, MapTarget, OverlayImage, PixelSampler, RasterLayer};
use overlay_pro_shared::{LngLat, Rgba, TileId, TilePixel};
use overlay_pro_wasm::canvas::{bitmap_to_data_url, CanvasDecoder};
use overlay_pro_wasm::discovery::{chunk_urls, is_parsed};
use overlay_pro_wasm::js_host::{get_property, JsHandle, JsScope};
use overlay_pro_wasm::js_map::JsMap;
use overlay_pro_wasm::samplers::GlTextureSampler;
use overlay_pro_wasm::{geo_to_pixel, pixel_to_geo, unique_name, OverlayPro};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn eval(body: &str) -> JsValue {
    Function::new_no_args(body)
        .call0(&JsValue::NULL)
        .expect("test snippet throws")
}

#[wasm_bindgen_test]
fn test_handle_structural_queries() {
    let value = JsHandle(eval(
        "return { count: 3, label: 'paint', build: function () { return 'maps.example'; } };",
    ));

    assert_eq!(value.get("count").and_then(|v| v.as_f64()), Some(3.0));
    assert_eq!(value.get("label").and_then(|v| v.as_str()), Some("paint".to_string()));
    assert!(value.get("missing").is_none());

    let build = value.get("build").unwrap();
    assert!(build.is_function());
    assert!(build.source_text().unwrap().contains("maps.example"));

    let names: Vec<String> = value.entries().into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["count", "label", "build"]);
    assert!(value.same(&value.clone()));
    assert!(!value.same(&JsHandle(eval("return {};"))));
}

#[wasm_bindgen_test]
fn test_primitives_have_no_properties() {
    let number = JsHandle::from_number(4.0);
    assert!(number.get("toFixed").is_none());
    assert!(number.entries().is_empty());
    assert!(number.prototype().is_none());
}

struct DoubleFirstArg {
    seen: RefCell<Vec<f64>>,
}

impl ConstructObserver<JsHandle> for DoubleFirstArg {
    fn before(&self, args: &mut Vec<JsHandle>) {
        if let Some(value) = args.first().and_then(|v| v.as_f64()) {
            args[0] = JsHandle::from_number(value * 2.0);
        }
    }

    fn after(&self, args: &[JsHandle], _instance: &JsHandle) {
        if let Some(value) = args.first().and_then(|v| v.as_f64()) {
            self.seen.borrow_mut().push(value);
        }
    }
}

#[wasm_bindgen_test]
fn test_wrapped_constructor_rewrites_and_observes() {
    let scope = JsScope::new();
    let original = JsHandle(eval("return class Thing { constructor(v) { this.v = v; } };"));
    let observer = Rc::new(DoubleFirstArg {
        seen: RefCell::new(Vec::new()),
    });
    let wrapped = scope
        .wrap_constructor(&original, observer.clone() as Rc<dyn ConstructObserver<JsHandle>>)
        .unwrap();

    let args = Array::of1(&JsValue::from_f64(21.0));
    let instance = Reflect::construct(wrapped.value().unchecked_ref::<Function>(), &args).unwrap();
    assert_eq!(get_property(&instance, "v").and_then(|v| v.as_f64()), Some(42.0));
    assert!(instance.is_instance_of::<js_sys::Object>());
    assert_eq!(*observer.seen.borrow(), vec![42.0]);

    let prototype = JsHandle(instance).prototype().unwrap();
    assert!(prototype.same(&original.get("prototype").unwrap()));
}

#[wasm_bindgen_test]
fn test_wrapped_getter_keeps_original() {
    let scope = JsScope::new();
    let instance = JsHandle(eval(
        "class User { get cooldown() { return 1500; } }; return new User();",
    ));
    let prototype = instance.prototype().unwrap();
    scope
        .wrap_getter(
            &prototype,
            "cooldown",
            "cooldownOriginal",
            Rc::new(|value: JsHandle| JsHandle::from_number(value.as_f64().unwrap_or(0.0) + 500.0)),
        )
        .unwrap();

    assert_eq!(instance.get("cooldown").and_then(|v| v.as_f64()), Some(2000.0));
    assert_eq!(instance.get("cooldownOriginal").and_then(|v| v.as_f64()), Some(1500.0));
    assert!(prototype.has_accessor("cooldownOriginal"));
}

#[wasm_bindgen_test]
fn test_wrapped_method_taps_arguments() {
    let scope = JsScope::new();
    let preview = JsHandle(eval(
        "return { placed: 0, placePixel(location) { this.placed += 1; return 'ok'; } };",
    ));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    scope
        .wrap_method(
            &preview,
            "placePixel",
            Rc::new(move |_this: &JsHandle, args: &[JsHandle]| {
                let lng = args[0].get("lng").and_then(|v| v.as_f64());
                sink.borrow_mut().push(lng);
            }),
        )
        .unwrap();

    let place = preview.get("placePixel").unwrap();
    let result = place
        .value()
        .unchecked_ref::<Function>()
        .call1(preview.value(), &eval("return { lng: 12.5, lat: -3 };"))
        .unwrap();
    assert_eq!(result.as_string(), Some("ok".to_string()));
    assert_eq!(preview.get("placed").and_then(|v| v.as_f64()), Some(1.0));
    assert_eq!(*seen.borrow(), vec![Some(12.5)]);
}

#[wasm_bindgen_test]
fn test_wrapped_function_forwards_and_reports() {
    let scope = JsScope::new();
    let original = JsHandle(eval("return function (input) { return 'fetched ' + input; };"));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let wrapped = scope
        .wrap_function(
            &original,
            Rc::new(move |_this: &JsHandle, args: &[JsHandle]| {
                sink.borrow_mut().push(args[0].as_str());
            }),
        )
        .unwrap();

    let result = wrapped
        .value()
        .unchecked_ref::<Function>()
        .call1(&JsValue::NULL, &JsValue::from_str("/s0/pixel/1/2"))
        .unwrap();
    assert_eq!(result.as_string(), Some("fetched /s0/pixel/1/2".to_string()));
    assert_eq!(*seen.borrow(), vec![Some("/s0/pixel/1/2".to_string())]);
    assert!(scope.wrap_function(&JsHandle::from_number(1.0), Rc::new(|_: &JsHandle, _: &[JsHandle]| {})).is_err());
}

#[wasm_bindgen_test]
async fn test_settle_delivers_value() {
    let scope = JsScope::new();
    let promise = JsHandle(js_sys::Promise::resolve(&JsValue::from_str("map")).into());
    let (sender, receiver) = futures::channel::oneshot::channel();
    scope.on_settle(
        &promise,
        Box::new(move |value: JsHandle| {
            let _ = sender.send(value.as_str());
        }),
    );
    assert_eq!(receiver.await.unwrap(), Some("map".to_string()));
}

#[wasm_bindgen_test]
async fn test_bitmap_survives_data_url() {
    let red = Rgba::new(255, 0, 0, 255);
    let mut bitmap = Bitmap::filled(3, 2, red);
    bitmap.put(2, 1, Rgba::new(0, 0, 255, 255));

    let url = bitmap_to_data_url(&bitmap).unwrap();
    assert!(url.starts_with("data:image/png"));

    let decoded = CanvasDecoder.decode(&url).await.unwrap();
    assert_eq!(decoded.dimensions(), (3, 2));
    assert_eq!(decoded.get(0, 0), Some(red));
    assert_eq!(decoded.get(2, 1), Some(Rgba::new(0, 0, 255, 255)));
}

#[wasm_bindgen_test]
async fn test_undecodable_payload_fails() {
    assert!(CanvasDecoder.decode("data:image/png;base64,AAAA").await.is_err());
}

fn fake_map() -> JsValue {
    eval(
        "const layers = new Map(); const sources = new Map();
         return {
           layers, sources, order: [],
           getLayer(id) { return layers.get(id); },
           getSource(id) { return sources.get(id); },
           addSource(id, spec) { sources.set(id, Object.assign({ updateImage(s) { this.url = s.url; } }, spec)); },
           removeSource(id) { sources.delete(id); },
           addLayer(spec, before) { layers.set(spec.id, spec); this.order.push([spec.id, before]); },
           removeLayer(id) { layers.delete(id); },
           moveLayer(id, before) { this.order.push([id, before]); },
           setPaintProperty(id, key, value) { layers.get(id).paint[key] = value; },
         };",
    )
}

#[wasm_bindgen_test]
fn test_map_adapter_drives_layers() {
    let raw = fake_map();
    let map = JsMap::new(raw.clone());
    let image = OverlayImage {
        bitmap: Bitmap::filled(2, 2, Rgba::new(1, 2, 3, 255)),
        coordinates: [
            LngLat::new(0.0, 1.0),
            LngLat::new(1.0, 1.0),
            LngLat::new(1.0, 0.0),
            LngLat::new(0.0, 0.0),
        ],
    };

    assert!(!map.has_source("op-a"));
    map.add_source("op-a", &image).unwrap();
    map.add_layer(&RasterLayer::new("op-a", 0.5), Some("pixel-art-layer"))
        .unwrap();
    assert!(map.has_source("op-a"));
    assert!(map.has_layer("op-a"));

    let source = get_property(&Reflect::get(&raw, &"sources".into()).unwrap(), "size");
    assert_eq!(source.and_then(|v| v.as_f64()), Some(1.0));

    let layer = eval_on(&raw, "return map.getLayer('op-a');");
    assert_eq!(
        get_property(&layer, "type").and_then(|v| v.as_string()),
        Some("raster".to_string())
    );
    let paint = get_property(&layer, "paint").unwrap();
    assert_eq!(
        get_property(&paint, "raster-resampling").and_then(|v| v.as_string()),
        Some("nearest".to_string())
    );

    map.set_paint_property("op-a", "raster-opacity", 0.8).unwrap();
    assert_eq!(
        get_property(&paint, "raster-opacity").and_then(|v| v.as_f64()),
        Some(0.8)
    );

    map.update_source("op-a", &image).unwrap();
    map.remove_layer("op-a").unwrap();
    map.remove_source("op-a").unwrap();
    assert!(!map.has_layer("op-a"));
    assert!(!map.has_source("op-a"));
    assert!(map.update_source("op-a", &image).is_err());
}

#[wasm_bindgen_test]
fn test_map_adapter_reports_host_failures() {
    let raw = eval(
        "return { moveLayer(id) { throw new Error('layer ' + id + ' not found'); } };",
    );
    let err = JsMap::new(raw).move_layer("op-a", None).unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("Map operation failed: moveLayer"), "{message}");
    assert!(message.contains("layer op-a not found"), "{message}");
}

fn eval_on(map: &JsValue, body: &str) -> JsValue {
    Function::new_with_args("map", body)
        .call1(&JsValue::NULL, map)
        .expect("test snippet throws")
}

#[wasm_bindgen_test]
fn test_exported_helpers() {
    let geo = pixel_to_geo(0.0, 0.0);
    assert!((geo[0] + 180.0).abs() < 1e-9);

    let center = pixel_to_geo(1234.5, 5678.5);
    assert_eq!(&*geo_to_pixel(center[0], center[1]), &[1234.0, 5678.0]);

    let existing = Array::of2(&"Castle".into(), &"Castle (1)".into());
    assert_eq!(unique_name("Castle", existing), "Castle (2)");
}

#[wasm_bindgen_test]
fn test_core_construction() {
    assert!(OverlayPro::new(None).is_ok());
    assert!(OverlayPro::new(Some("{\"render\": {\"upscale\": 0}}".to_string())).is_err());
    assert!(OverlayPro::new(Some("{".to_string())).is_err());

    let core = OverlayPro::new(Some("{}".to_string())).unwrap();
    assert!(core.map().is_undefined());
    assert!(core.pixel_anchor().is_none());
    assert_eq!(core.pending_verifications(), 0);
    assert!(core.destroy());
}

#[wasm_bindgen_test]
fn test_ready_state_gates_discovery() {
    assert!(!is_parsed("loading"));
    assert!(is_parsed("interactive"));
    assert!(is_parsed("complete"));

    let document = web_sys::window().unwrap().document().unwrap();
    assert!(is_parsed(&document.ready_state()));

    let root = document.document_element().unwrap();
    for (rel, href) in [
        ("modulepreload", "/assets/chunk-a1.js"),
        ("modulepreload", "/assets/entry.js"),
        ("stylesheet", "/assets/chunk-b2.css"),
    ] {
        let link = document.create_element("link").unwrap();
        link.set_attribute("rel", rel).unwrap();
        link.set_attribute("href", href).unwrap();
        root.append_child(&link).unwrap();
    }
    let urls = chunk_urls(&document);
    assert_eq!(urls.len(), 1);
    assert!(urls[0].ends_with("/assets/chunk-a1.js"));
}

/// Map exposing one z11 tile texture at (5, 6) on a real WebGL2 context
fn textured_map(allocate: bool) -> JsValue {
    eval(&format!(
        "const gl = document.createElement('canvas').getContext('webgl2');
         if (!gl) return null;
         const texture = gl.createTexture();
         gl.bindTexture(gl.TEXTURE_2D, texture);
         if ({allocate}) {{
           gl.texImage2D(gl.TEXTURE_2D, 0, gl.RGBA, 2, 1, 0, gl.RGBA, gl.UNSIGNED_BYTE,
             new Uint8Array([10, 20, 30, 255, 200, 100, 50, 255]));
         }}
         const prior = gl.createFramebuffer();
         gl.bindFramebuffer(gl.FRAMEBUFFER, prior);
         const tile = {{ tileID: {{ canonical: {{ z: 11, x: 5, y: 6 }} }}, texture: {{ texture }} }};
         return {{
           gl, prior,
           painter: {{ context: {{ gl }} }},
           getLayer(id) {{ return id === 'pixel-art-layer' ? {{ source: 'pixels' }} : undefined; }},
           style: {{ sourceCaches: {{ pixels: {{ _tiles: {{ a: tile }} }} }} }},
         }};"
    ))
}

fn binding_restored(map: &JsValue) -> bool {
    eval_on(map, "return map.gl.getParameter(map.gl.FRAMEBUFFER_BINDING) === map.prior;")
        .as_bool()
        .unwrap_or(false)
}

#[wasm_bindgen_test]
fn test_texture_sampler_reads_texel_and_restores_binding() {
    let map = textured_map(true);
    if map.is_null() {
        return;
    }
    let sampler = GlTextureSampler::new(map.clone(), "pixel-art-layer");
    assert_eq!(sampler.source().as_deref(), Some("pixels"));

    let color = sampler.sample(TileId::new(5, 6), TilePixel { x: 1, y: 0 });
    assert_eq!(color, Some(Rgba::new(200, 100, 50, 255)));
    assert!(binding_restored(&map));

    assert_eq!(sampler.sample(TileId::new(5, 7), TilePixel { x: 0, y: 0 }), None);
}

#[wasm_bindgen_test]
fn test_texture_sampler_survives_unreadable_texture() {
    let map = textured_map(false);
    if map.is_null() {
        return;
    }
    let sampler = GlTextureSampler::new(map.clone(), "pixel-art-layer");
    assert_eq!(sampler.sample(TileId::new(5, 6), TilePixel { x: 0, y: 0 }), None);
    assert!(binding_restored(&map));
}

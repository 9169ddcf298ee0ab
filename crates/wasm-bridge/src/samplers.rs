//! Pixel sources for paint verification
//!
//! The live color comes from the base layer's tile texture on the map's GPU
//! context; the painted color comes from the preview's per-tile canvases.

use once_cell::unsync::OnceCell;
use overlay_pro_renderer::{Bitmap, Crosshair, PixelSampler};
use overlay_pro_shared::{LogOnce, OverlayError, OverlayResult, Rgba, TileId, TilePixel};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{HtmlImageElement, ImageData, WebGl2RenderingContext as Gl, WebGlFramebuffer, WebGlTexture};

use crate::canvas::{bitmap_to_data_url, image_to_bitmap};
use crate::js_host::{call_method, get_property, js_error};

/// Zoom level at which one map tile is one host tile
pub const TILE_ZOOM: f64 = 11.0;

/// Property of the preview holding its canvases, keyed by `"x,y"` tile id
pub const PREVIEW_CANVASES_KEY: &str = "canvases";

/// Property of the preview holding the crosshair image
pub const CROSSHAIR_KEY: &str = "crosshair";

/// Reads single texels of the base layer's tile textures
pub struct GlTextureSampler {
    map: JsValue,
    base_layer: String,
    framebuffer: OnceCell<WebGlFramebuffer>,
    unreadable: LogOnce,
}

impl GlTextureSampler {
    /// Sample the tiles of the source drawn by `base_layer`
    pub fn new(map: JsValue, base_layer: &str) -> Self {
        Self {
            map,
            base_layer: base_layer.to_string(),
            framebuffer: OnceCell::new(),
            unreadable: LogOnce::new(),
        }
    }

    /// Source id of the base layer; unknown until the host style has loaded
    pub fn source(&self) -> Option<String> {
        base_source(&self.map, &self.base_layer)
    }

    fn context(&self) -> Option<Gl> {
        get_property(&self.map, "painter")
            .and_then(|painter| get_property(&painter, "context"))
            .and_then(|context| get_property(&context, "gl"))
            .and_then(|gl| gl.dyn_into::<Gl>().ok())
    }

    /// Texture of the loaded tile `tile`, if the map holds one
    fn texture(&self, tile: TileId) -> Option<WebGlTexture> {
        let caches = get_property(&self.map, "style")
            .and_then(|style| get_property(&style, "sourceCaches"))?;
        let tiles = get_property(&get_property(&caches, &self.source()?)?, "_tiles")?;
        js_sys::Object::values(tiles.unchecked_ref())
            .iter()
            .find(|loaded| {
                get_property(loaded, "tileID")
                    .and_then(|id| get_property(&id, "canonical"))
                    .is_some_and(|canonical| {
                        let coord = |key| get_property(&canonical, key).and_then(|v| v.as_f64());
                        coord("z") == Some(TILE_ZOOM)
                            && coord("x") == Some(tile.x as f64)
                            && coord("y") == Some(tile.y as f64)
                    })
            })
            .and_then(|loaded| get_property(&loaded, "texture"))
            .and_then(|texture| get_property(&texture, "texture"))
            .and_then(|texture| texture.dyn_into::<WebGlTexture>().ok())
    }

    /// Read one texel through a scratch framebuffer
    ///
    /// The framebuffer binding the map had is restored afterwards, since the
    /// map caches it and skips redundant binds.
    fn read(&self, gl: &Gl, texture: &WebGlTexture, pixel: TilePixel) -> OverlayResult<Rgba> {
        let framebuffer = self
            .framebuffer
            .get_or_try_init(|| gl.create_framebuffer().ok_or_else(|| readback_error("no framebuffer")))?;
        let previous = gl
            .get_parameter(Gl::FRAMEBUFFER_BINDING)
            .ok()
            .and_then(|binding| binding.dyn_into::<WebGlFramebuffer>().ok());

        gl.bind_framebuffer(Gl::FRAMEBUFFER, Some(framebuffer));
        gl.framebuffer_texture_2d(Gl::FRAMEBUFFER, Gl::COLOR_ATTACHMENT0, Gl::TEXTURE_2D, Some(texture), 0);

        let mut texel = [0u8; 4];
        let status = gl.check_framebuffer_status(Gl::FRAMEBUFFER);
        let read = if status == Gl::FRAMEBUFFER_COMPLETE {
            gl.read_pixels_with_opt_u8_array(
                pixel.x as i32,
                pixel.y as i32,
                1,
                1,
                Gl::RGBA,
                Gl::UNSIGNED_BYTE,
                Some(&mut texel),
            )
            .map(|()| Rgba(texel))
            .map_err(|err| readback_error(&js_error("readPixels", &err).to_string()))
        } else {
            Err(readback_error(&format!("framebuffer incomplete (status {status:#x})")))
        };

        gl.framebuffer_texture_2d(Gl::FRAMEBUFFER, Gl::COLOR_ATTACHMENT0, Gl::TEXTURE_2D, None, 0);
        gl.bind_framebuffer(Gl::FRAMEBUFFER, previous.as_ref());
        read
    }
}

fn readback_error(message: &str) -> OverlayError {
    OverlayError::GpuReadback {
        message: message.to_string(),
    }
}

impl PixelSampler for GlTextureSampler {
    fn sample(&self, tile: TileId, pixel: TilePixel) -> Option<Rgba> {
        let gl = self.context()?;
        let texture = self.texture(tile)?;
        match self.read(&gl, &texture, pixel) {
            Ok(color) => Some(color),
            Err(err) => {
                if self.unreadable.first() {
                    log::warn!("{err}; live pixels unavailable");
                } else {
                    log::debug!("{err}");
                }
                None
            }
        }
    }
}

pub fn base_source(map: &JsValue, base_layer: &str) -> Option<String> {
    let layer = call_method(map, "getLayer", &[JsValue::from_str(base_layer)]).ok()?;
    get_property(&layer, "source")?.as_string()
}

/// Reads the colors the user painted from the preview canvases
pub struct PreviewSampler {
    preview: JsValue,
}

impl PreviewSampler {
    pub fn new(preview: JsValue) -> Self {
        Self { preview }
    }

    fn canvas(&self, tile: TileId) -> Option<JsValue> {
        let canvases = get_property(&self.preview, PREVIEW_CANVASES_KEY)?;
        let key = JsValue::from_str(&tile.to_string());
        match canvases.dyn_ref::<js_sys::Map>() {
            Some(map) => Some(map.get(&key)).filter(|c| !c.is_undefined()),
            None => get_property(&canvases, &tile.to_string()),
        }
    }
}

impl PixelSampler for PreviewSampler {
    fn sample(&self, tile: TileId, pixel: TilePixel) -> Option<Rgba> {
        let canvas = self.canvas(tile)?;
        let context = call_method(&canvas, "getContext", &[JsValue::from_str("2d")]).ok()?;
        let data = call_method(
            &context,
            "getImageData",
            &[
                JsValue::from_f64(pixel.x as f64),
                JsValue::from_f64(pixel.y as f64),
                JsValue::from_f64(1.0),
                JsValue::from_f64(1.0),
            ],
        )
        .ok()?
        .dyn_into::<ImageData>()
        .ok()?;
        let bytes = data.data().0;
        let texel: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(Rgba(texel))
    }
}

/// The preview's crosshair image; every canvas drawing it picks up a swap
pub struct ImageCrosshair {
    image: HtmlImageElement,
    original: OnceCell<Bitmap>,
}

impl ImageCrosshair {
    pub fn from_preview(preview: &JsValue) -> Option<Self> {
        let image = get_property(preview, CROSSHAIR_KEY)?
            .dyn_into::<HtmlImageElement>()
            .ok()?;
        Some(Self {
            image,
            original: OnceCell::new(),
        })
    }
}

impl Crosshair for ImageCrosshair {
    fn image(&self) -> Option<Bitmap> {
        if let Some(bitmap) = self.original.get() {
            return Some(bitmap.clone());
        }
        if !self.image.complete() {
            return None;
        }
        match image_to_bitmap(&self.image) {
            Ok(bitmap) => Some(self.original.get_or_init(|| bitmap).clone()),
            Err(err) => {
                log::debug!("Crosshair not readable: {err}");
                None
            }
        }
    }

    fn show_painted(&self, painted: &Bitmap) {
        match bitmap_to_data_url(painted) {
            Ok(url) if url != self.image.src() => self.image.set_src(&url),
            Ok(_) => {}
            Err(err) => log::warn!("Failed to swap crosshair: {err}"),
        }
    }
}

//! Canvas helpers: moving bitmaps in and out of the page

use futures::future::LocalBoxFuture;
use overlay_pro_renderer::{Bitmap, ImageDecoder};
use overlay_pro_shared::{OverlayError, OverlayResult};
use wasm_bindgen::{Clamped, JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement, ImageData};

use crate::js_host::js_error;

pub fn create_canvas(width: u32, height: u32) -> OverlayResult<HtmlCanvasElement> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| OverlayError::js("no document"))?;
    let canvas = document
        .create_element("canvas")
        .map_err(|err| js_error("create canvas", &err))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| OverlayError::js("canvas element has the wrong type"))?;
    canvas.set_width(width);
    canvas.set_height(height);
    Ok(canvas)
}

pub fn context_2d(canvas: &HtmlCanvasElement) -> OverlayResult<CanvasRenderingContext2d> {
    canvas
        .get_context("2d")
        .map_err(|err| js_error("getContext", &err))?
        .and_then(|context| context.dyn_into::<CanvasRenderingContext2d>().ok())
        .ok_or_else(|| OverlayError::js("2d context unavailable"))
}

/// Canvas holding `bitmap`'s pixels
pub fn bitmap_to_canvas(bitmap: &Bitmap) -> OverlayResult<HtmlCanvasElement> {
    let (width, height) = bitmap.dimensions();
    let canvas = create_canvas(width, height)?;
    if width == 0 || height == 0 {
        return Ok(canvas);
    }
    let image = ImageData::new_with_u8_clamped_array_and_sh(Clamped(bitmap.as_bytes()), width, height)
        .map_err(|err| js_error("ImageData", &err))?;
    context_2d(&canvas)?
        .put_image_data(&image, 0.0, 0.0)
        .map_err(|err| js_error("putImageData", &err))?;
    Ok(canvas)
}

/// PNG data URL of `bitmap`, usable as an image source URL
pub fn bitmap_to_data_url(bitmap: &Bitmap) -> OverlayResult<String> {
    bitmap_to_canvas(bitmap)?
        .to_data_url()
        .map_err(|err| js_error("toDataURL", &err))
}

/// Read back the pixels of a loaded image
pub fn image_to_bitmap(image: &HtmlImageElement) -> OverlayResult<Bitmap> {
    let (width, height) = (image.natural_width(), image.natural_height());
    if width == 0 || height == 0 {
        return Err(OverlayError::decode("image has no pixels"));
    }
    let canvas = create_canvas(width, height)?;
    let context = context_2d(&canvas)?;
    context
        .draw_image_with_html_image_element(image, 0.0, 0.0)
        .map_err(|err| js_error("drawImage", &err))?;
    let data = context
        .get_image_data(0.0, 0.0, width as f64, height as f64)
        .map_err(|err| js_error("getImageData", &err))?;
    Bitmap::from_rgba(width, height, data.data().0)
}

/// Decodes data URLs and fetchable image URLs through an `<img>` element
#[derive(Default)]
pub struct CanvasDecoder;

impl CanvasDecoder {
    async fn load(payload: &str) -> OverlayResult<Bitmap> {
        let image = HtmlImageElement::new().map_err(|err| js_error("Image", &err))?;
        image.set_cross_origin(Some("anonymous"));
        image.set_src(payload);
        JsFuture::from(image.decode())
            .await
            .map_err(|err| OverlayError::decode(describe(&err)))?;
        image_to_bitmap(&image)
    }
}

fn describe(err: &JsValue) -> String {
    js_error("decode", err).to_string()
}

impl ImageDecoder for CanvasDecoder {
    fn decode<'a>(&'a self, payload: &'a str) -> LocalBoxFuture<'a, OverlayResult<Bitmap>> {
        Box::pin(Self::load(payload))
    }
}

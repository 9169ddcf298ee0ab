//! `MapTarget` over the captured MapLibre map

use overlay_pro_renderer::map::RASTER_OPACITY;
use overlay_pro_renderer::{MapTarget, OverlayImage, RasterLayer};
use overlay_pro_shared::{map_op_error, OverlayError, OverlayResult};
use serde::Serialize;
use serde_json::json;
use wasm_bindgen::JsValue;

use crate::canvas::bitmap_to_data_url;
use crate::js_host::{call_method, get_property};

/// Nearest-neighbour keeps overlay pixels crisp at every zoom
const RASTER_RESAMPLING: &str = "raster-resampling";

pub struct JsMap {
    map: JsValue,
}

impl JsMap {
    pub fn new(map: JsValue) -> Self {
        Self { map }
    }

    pub fn raw(&self) -> &JsValue {
        &self.map
    }

    fn call(&self, method: &str, args: &[JsValue]) -> OverlayResult<JsValue> {
        map_op_error!(call_method(&self.map, method, args), method)
    }

    fn image_spec(image: &OverlayImage) -> OverlayResult<serde_json::Value> {
        let coordinates: Vec<[f64; 2]> = image.coordinates.iter().map(|c| c.to_array()).collect();
        Ok(json!({
            "url": bitmap_to_data_url(&image.bitmap)?,
            "coordinates": coordinates,
        }))
    }
}

/// Plain JS object for `value`; maps become objects rather than `Map`s
fn to_js(value: &serde_json::Value) -> OverlayResult<JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|err| OverlayError::js(err.to_string()))
}

fn before_arg(before: Option<&str>) -> JsValue {
    before.map(JsValue::from_str).unwrap_or(JsValue::UNDEFINED)
}

impl MapTarget for JsMap {
    fn has_layer(&self, id: &str) -> bool {
        self.call("getLayer", &[JsValue::from_str(id)])
            .map(|layer| !layer.is_undefined() && !layer.is_null())
            .unwrap_or(false)
    }

    fn has_source(&self, id: &str) -> bool {
        self.call("getSource", &[JsValue::from_str(id)])
            .map(|source| !source.is_undefined() && !source.is_null())
            .unwrap_or(false)
    }

    fn add_source(&self, id: &str, image: &OverlayImage) -> OverlayResult<()> {
        let mut spec = Self::image_spec(image)?;
        spec["type"] = json!("image");
        self.call("addSource", &[JsValue::from_str(id), to_js(&spec)?])?;
        Ok(())
    }

    fn update_source(&self, id: &str, image: &OverlayImage) -> OverlayResult<()> {
        let source = self
            .call("getSource", &[JsValue::from_str(id)])
            .ok()
            .filter(|source| get_property(source, "updateImage").is_some())
            .ok_or_else(|| OverlayError::map_op(format!("{id} is not an image source")))?;
        map_op_error!(
            call_method(&source, "updateImage", &[to_js(&Self::image_spec(image)?)?]),
            id
        )?;
        Ok(())
    }

    fn remove_source(&self, id: &str) -> OverlayResult<()> {
        self.call("removeSource", &[JsValue::from_str(id)])?;
        Ok(())
    }

    fn add_layer(&self, layer: &RasterLayer, before: Option<&str>) -> OverlayResult<()> {
        let spec = json!({
            "id": layer.id,
            "type": "raster",
            "source": layer.source,
            "paint": {
                RASTER_RESAMPLING: "nearest",
                RASTER_OPACITY: layer.opacity,
            },
        });
        self.call("addLayer", &[to_js(&spec)?, before_arg(before)])?;
        Ok(())
    }

    fn remove_layer(&self, id: &str) -> OverlayResult<()> {
        self.call("removeLayer", &[JsValue::from_str(id)])?;
        Ok(())
    }

    fn move_layer(&self, id: &str, before: Option<&str>) -> OverlayResult<()> {
        self.call("moveLayer", &[JsValue::from_str(id), before_arg(before)])?;
        Ok(())
    }

    fn set_paint_property(&self, id: &str, property: &str, value: f64) -> OverlayResult<()> {
        self.call(
            "setPaintProperty",
            &[
                JsValue::from_str(id),
                JsValue::from_str(property),
                JsValue::from_f64(value),
            ],
        )?;
        Ok(())
    }
}

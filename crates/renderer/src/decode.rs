//! Image decoding and the session-wide decode cache

use futures::future::LocalBoxFuture;
use overlay_pro_shared::OverlayResult;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bitmap::Bitmap;

/// Turns an overlay image payload (data URL or remote URL) into pixels
pub trait ImageDecoder {
    fn decode<'a>(&'a self, payload: &'a str) -> LocalBoxFuture<'a, OverlayResult<Bitmap>>;
}

/// Decoded bitmaps keyed by payload, plus overlays rejected for the session
///
/// Entries are never evicted; `clear()` is the only way to drop them.
#[derive(Default)]
pub struct DecodeCache {
    entries: RefCell<HashMap<String, Rc<Bitmap>>>,
    rejected: RefCell<HashMap<String, String>>,
}

impl DecodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, payload: &str) -> Option<Rc<Bitmap>> {
        self.entries.borrow().get(payload).cloned()
    }

    /// Cached bitmap for `payload`, decoding it on first use
    pub async fn get_or_decode(
        &self,
        decoder: &dyn ImageDecoder,
        payload: &str,
    ) -> OverlayResult<Rc<Bitmap>> {
        if let Some(bitmap) = self.get(payload) {
            return Ok(bitmap);
        }

        let bitmap = Rc::new(decoder.decode(payload).await?);
        log::debug!(
            "Decoded overlay image {}x{}",
            bitmap.width(),
            bitmap.height()
        );
        self.entries
            .borrow_mut()
            .insert(payload.to_string(), bitmap.clone());
        Ok(bitmap)
    }

    /// Reject overlay `id` for as long as its image stays `payload`
    pub fn reject(&self, id: &str, payload: &str) {
        self.rejected
            .borrow_mut()
            .insert(id.to_string(), payload.to_string());
    }

    pub fn is_rejected(&self, id: &str, payload: &str) -> bool {
        self.rejected.borrow().get(id).map(String::as_str) == Some(payload)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drop decoded bitmaps; rejections last for the session
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

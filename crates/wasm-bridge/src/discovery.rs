//! Bundle discovery
//!
//! The host preloads its code-split chunks with `<link rel="modulepreload">`.
//! Once the document is parsed, every chunk link is imported again (the
//! browser serves the already loaded module) and its namespace object is
//! handed to the symbol registry. The registry is closed when all imports
//! have settled, so lookups that matched nothing resolve to `None`.

use futures::future::join_all;
use js_sys::{Function, Promise};
use overlay_pro_hooks::SymbolRegistry;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, HtmlLinkElement};

use crate::js_host::JsHandle;

/// Substring identifying the host's code-split chunks
pub const CHUNK_MARKER: &str = "chunk";

/// `href`s of the modulepreload links naming a chunk, in document order
pub fn chunk_urls(document: &Document) -> Vec<String> {
    let links = document.get_elements_by_tag_name("link");
    (0..links.length())
        .filter_map(|index| links.item(index))
        .filter_map(|element| element.dyn_into::<HtmlLinkElement>().ok())
        .filter(|link| link.rel() == "modulepreload")
        .map(|link| link.href())
        .filter(|href| href.contains(CHUNK_MARKER))
        .collect()
}

/// Dynamic `import()` is syntax, so it has to be reached through a function
fn import(url: &str) -> Result<Promise, JsValue> {
    let importer = Function::new_with_args("url", "return import(url);");
    importer
        .call1(&JsValue::NULL, &JsValue::from_str(url))?
        .dyn_into::<Promise>()
}

/// Import every chunk and register its namespace
pub async fn load_bundles(document: Document, registry: SymbolRegistry<JsHandle>) {
    let urls = chunk_urls(&document);
    log::debug!("Importing {} chunks", urls.len());

    let imports = urls.into_iter().map(|url| {
        let registry = registry.clone();
        async move {
            let module = match import(&url) {
                Ok(promise) => JsFuture::from(promise).await,
                Err(err) => Err(err),
            };
            match module {
                Ok(module) => {
                    registry.notify_bundle(&url, JsHandle(module));
                }
                Err(err) => log::warn!("Failed to import {url}: {err:?}"),
            }
        }
    });
    join_all(imports).await;

    let unmatched = registry.close();
    if unmatched > 0 {
        log::warn!("{unmatched} module lookups matched no bundle");
    }
}

/// `Document.readyState` while the document is still being parsed
const LOADING: &str = "loading";

/// Whether a `readyState` value means parsing has finished
pub fn is_parsed(ready_state: &str) -> bool {
    ready_state != LOADING
}

/// Run discovery once the document is parsed
pub fn watch_bundles(registry: SymbolRegistry<JsHandle>) -> Result<(), JsValue> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("no document"))?;

    if is_parsed(&document.ready_state()) {
        wasm_bindgen_futures::spawn_local(load_bundles(document, registry));
        return Ok(());
    }

    let target = document.clone();
    let on_ready = Closure::once_into_js(move || {
        wasm_bindgen_futures::spawn_local(load_bundles(document, registry));
    });
    target.add_event_listener_with_callback("DOMContentLoaded", on_ready.unchecked_ref())
}

//! Safe instance management for Overlay Pro cores
//! Each core lives in thread-local storage keyed by id; the exported handle
//! only carries the id.

use futures::lock::Mutex;
use js_sys::Function;
use overlay_pro_config::{CoreConfig, SettingsStore};
use overlay_pro_hooks::{HookRegistry, HostBindings, SymbolRegistry};
use overlay_pro_renderer::{Notifier, PixelVerifier, Reconciler};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use uuid::Uuid;
use wasm_bindgen::JsValue;

use crate::canvas::CanvasDecoder;
use crate::js_host::{JsHandle, JsScope};

/// Shows user-facing messages through a page callback, or the console
#[derive(Clone, Default)]
pub struct JsNotifier {
    callback: Rc<RefCell<Option<Function>>>,
}

impl JsNotifier {
    pub fn set_callback(&self, callback: Function) {
        *self.callback.borrow_mut() = Some(callback);
    }
}

impl Notifier for JsNotifier {
    fn notify(&self, message: &str) {
        let callback = self.callback.borrow().clone();
        match callback {
            Some(callback) => {
                if let Err(err) = callback.call1(&JsValue::NULL, &JsValue::from_str(message)) {
                    log::error!("Notification callback failed: {err:?}");
                }
            }
            None => log::warn!("{message}"),
        }
    }
}

/// Everything one running core owns
pub struct OverlayInstance {
    pub config: CoreConfig,
    pub scope: Rc<JsScope>,
    pub hooks: HookRegistry<JsScope>,
    pub registry: SymbolRegistry<JsHandle>,
    pub bindings: HostBindings<JsHandle>,
    pub settings: SettingsStore,
    pub reconciler: Reconciler,
    pub notifier: JsNotifier,
    pub verifier: RefCell<Option<Rc<PixelVerifier>>>,
    /// Held for the duration of a reconcile pass
    pub pass: Mutex<()>,
    pub started: Cell<bool>,
}

impl OverlayInstance {
    pub fn new(config: CoreConfig) -> Self {
        let scope = Rc::new(JsScope::new());
        let notifier = JsNotifier::default();
        let reconciler = Reconciler::new(
            &config.render,
            Box::new(CanvasDecoder),
            Box::new(notifier.clone()),
        );
        Self {
            hooks: HookRegistry::new(scope.clone()),
            scope,
            registry: SymbolRegistry::new(),
            bindings: HostBindings::default(),
            settings: SettingsStore::default(),
            reconciler,
            notifier,
            verifier: RefCell::new(None),
            pass: Mutex::new(()),
            started: Cell::new(false),
            config,
        }
    }
}

// Thread-local storage for core instances
thread_local! {
    static OVERLAY_INSTANCES: RefCell<HashMap<Uuid, Rc<OverlayInstance>>> = RefCell::new(HashMap::new());
}

/// Manages core instances without global mutable state
pub struct InstanceManager;

impl InstanceManager {
    /// Create a new core instance and return its ID
    pub fn create_instance(config: CoreConfig) -> Uuid {
        let id = Uuid::new_v4();
        let instance = Rc::new(OverlayInstance::new(config));
        OVERLAY_INSTANCES.with(|instances| {
            instances.borrow_mut().insert(id, instance);
        });
        id
    }

    /// Shared handle to an instance, for work that outlives the call
    pub fn get(id: &Uuid) -> Option<Rc<OverlayInstance>> {
        OVERLAY_INSTANCES.with(|instances| instances.borrow().get(id).cloned())
    }

    pub fn with_instance<F, R>(id: &Uuid, f: F) -> Option<R>
    where
        F: FnOnce(&OverlayInstance) -> R,
    {
        let instance = Self::get(id)?;
        Some(f(&instance))
    }

    /// Remove an instance; its interceptions are undone
    pub fn remove_instance(id: &Uuid) -> bool {
        let removed = OVERLAY_INSTANCES.with(|instances| instances.borrow_mut().remove(id));
        match removed {
            Some(instance) => {
                let unhooked = instance.hooks.unhook_all();
                log::debug!("Removed instance {id}, {unhooked} interceptions undone");
                true
            }
            None => false,
        }
    }

    pub fn instance_count() -> usize {
        OVERLAY_INSTANCES.with(|instances| instances.borrow().len())
    }
}

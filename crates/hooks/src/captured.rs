//! Observable cells holding host objects captured at runtime
//!
//! Each cell has a single producer (the capture that fills it) and any number
//! of readers. Readers either poll `get()` or `subscribe()` to be told about
//! every new value.

use overlay_pro_shared::anchor::PixelAnchor;
use std::cell::RefCell;
use std::rc::Rc;

type Subscriber<T> = Rc<dyn Fn(&T)>;

struct CellInner<T> {
    value: RefCell<Option<T>>,
    subscribers: RefCell<Vec<Subscriber<T>>>,
}

/// Single-value cell; clones share the same slot
pub struct CapturedCell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Clone for CapturedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Default for CapturedCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> CapturedCell<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(CellInner {
                value: RefCell::new(None),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn get(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Store `value` and notify every subscriber
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = Some(value.clone());
        // Subscribers may read or subscribe again while being notified.
        let subscribers = self.inner.subscribers.borrow().clone();
        for subscriber in subscribers {
            subscriber(&value);
        }
    }

    pub fn clear(&self) {
        self.inner.value.borrow_mut().take();
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) {
        self.inner.subscribers.borrow_mut().push(Rc::new(callback));
    }
}

/// Registrable "something the UI shows has changed" callback
#[derive(Clone, Default)]
pub struct UiRefresh {
    callback: Rc<RefCell<Option<Rc<dyn Fn()>>>>,
}

impl UiRefresh {
    pub fn set_callback(&self, callback: impl Fn() + 'static) {
        *self.callback.borrow_mut() = Some(Rc::new(callback));
    }

    pub fn fire(&self) {
        let callback = self.callback.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Every host object the core captures, plus the UI refresh hook
pub struct HostBindings<V> {
    pub map: CapturedCell<V>,
    pub ui_state: CapturedCell<V>,
    pub user_state: CapturedCell<V>,
    pub preview: CapturedCell<V>,
    /// Last pixel the page requested from the backend
    pub pixel_anchor: CapturedCell<PixelAnchor>,
    pub ui_refresh: UiRefresh,
}

impl<V> Clone for HostBindings<V> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            ui_state: self.ui_state.clone(),
            user_state: self.user_state.clone(),
            preview: self.preview.clone(),
            pixel_anchor: self.pixel_anchor.clone(),
            ui_refresh: self.ui_refresh.clone(),
        }
    }
}

impl<V: Clone + 'static> Default for HostBindings<V> {
    fn default() -> Self {
        Self {
            map: CapturedCell::new(),
            ui_state: CapturedCell::new(),
            user_state: CapturedCell::new(),
            preview: CapturedCell::new(),
            pixel_anchor: CapturedCell::new(),
            ui_refresh: UiRefresh::default(),
        }
    }
}

//! Host runtime abstraction
//!
//! The host page exposes no stable API, so every value coming from it is an
//! opaque handle that can only be inspected structurally. `HostValue` is that
//! inspection surface and `HostScope` is the set of global-level operations the
//! interception layer needs. The browser implementation lives in the wasm
//! bridge; tests use an in-memory fake.

use overlay_pro_shared::OverlayResult;
use std::rc::Rc;

/// Opaque value owned by the host runtime
pub trait HostValue: Clone + 'static {
    /// Property lookup; `None` when absent or undefined
    fn get(&self, key: &str) -> Option<Self>;

    fn as_str(&self) -> Option<String>;

    fn as_f64(&self) -> Option<f64>;

    fn is_function(&self) -> bool;

    /// Source text of a function value
    fn source_text(&self) -> Option<String>;

    /// Enumerable own bindings, in host enumeration order
    fn entries(&self) -> Vec<(String, Self)>;

    /// Prototype of this value (`Object.getPrototypeOf`)
    fn prototype(&self) -> Option<Self>;

    /// Whether `key` is an own accessor property with a getter
    fn has_accessor(&self, key: &str) -> bool;

    fn from_string(value: &str) -> Self;

    fn from_number(value: f64) -> Self;

    /// Structural identity; two handles to the same host object are equal
    fn same(&self, other: &Self) -> bool;
}

/// Observer of constructions routed through a wrapped constructor
pub trait ConstructObserver<V> {
    /// Runs before the original constructor and may rewrite its arguments
    fn before(&self, _args: &mut Vec<V>) {}

    /// Runs after the original constructor produced `instance`
    fn after(&self, _args: &[V], _instance: &V) {}
}

pub type GetterWrap<V> = Rc<dyn Fn(V) -> V>;
pub type SetterTap<V> = Rc<dyn Fn(&V)>;
pub type MethodTap<V> = Rc<dyn Fn(&V, &[V])>;

/// Global-level operations on the host runtime
pub trait HostScope: 'static {
    type Value: HostValue;

    fn global(&self, name: &str) -> Option<Self::Value>;

    fn set_global(&self, name: &str, value: Self::Value);

    /// Build a constructible replacement for `original` that behaves exactly
    /// like it, except that every construction is reported to `observer`
    fn wrap_constructor(
        &self,
        original: &Self::Value,
        observer: Rc<dyn ConstructObserver<Self::Value>>,
    ) -> OverlayResult<Self::Value>;

    /// Run `callback` with the fulfilment value of a thenable
    fn on_settle(&self, promise: &Self::Value, callback: Box<dyn FnOnce(Self::Value)>);

    /// Replace getter `key` on `target` with `wrap(original getter result)`,
    /// keeping the original getter reachable as `preserve_as`
    fn wrap_getter(
        &self,
        target: &Self::Value,
        key: &str,
        preserve_as: &str,
        wrap: GetterWrap<Self::Value>,
    ) -> OverlayResult<()>;

    /// Call `tap(this)` after every assignment through setter `key` on `target`
    fn wrap_setter(&self, target: &Self::Value, key: &str, tap: SetterTap<Self::Value>)
        -> OverlayResult<()>;

    /// Call `tap(this, args)` after every invocation of method `key` on `target`
    fn wrap_method(&self, target: &Self::Value, key: &str, tap: MethodTap<Self::Value>)
        -> OverlayResult<()>;

    /// Build a function that forwards to `original` and then calls `tap(this, args)`
    fn wrap_function(&self, original: &Self::Value, tap: MethodTap<Self::Value>)
        -> OverlayResult<Self::Value>;
}

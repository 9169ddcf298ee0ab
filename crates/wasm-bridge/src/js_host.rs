//! Browser implementation of the host abstraction
//!
//! `JsHandle` wraps any JavaScript value and answers the structural queries of
//! `HostValue` through `Reflect`. `JsScope` performs the interceptions on the
//! page's global object: constructors are replaced by a `Proxy` with a
//! `construct` trap, and accessors and methods are redefined with small JS
//! shims that call back into Rust.

use js_sys::{Array, Function, Object, Promise, Proxy, Reflect};
use overlay_pro_hooks::host::{ConstructObserver, GetterWrap, MethodTap, SetterTap};
use overlay_pro_hooks::{HostScope, HostValue};
use overlay_pro_shared::{OverlayError, OverlayResult};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

/// Any value owned by the page
#[derive(Debug, Clone)]
pub struct JsHandle(pub JsValue);

impl JsHandle {
    pub fn value(&self) -> &JsValue {
        &self.0
    }

    fn is_object_like(&self) -> bool {
        self.0.is_object() || self.0.is_function()
    }

    /// Namespace objects have a null prototype, so `instanceof Object` fails
    fn as_object(&self) -> Option<&Object> {
        self.is_object_like().then(|| self.0.unchecked_ref::<Object>())
    }
}

impl From<JsValue> for JsHandle {
    fn from(value: JsValue) -> Self {
        JsHandle(value)
    }
}

/// `Reflect.get` that treats undefined, null and throwing lookups as absent
pub fn get_property(target: &JsValue, key: &str) -> Option<JsValue> {
    if !(target.is_object() || target.is_function()) {
        return None;
    }
    Reflect::get(target, &JsValue::from_str(key))
        .ok()
        .filter(|value| !value.is_undefined() && !value.is_null())
}

/// Call method `name` of `target` with `args`
pub fn call_method(target: &JsValue, name: &str, args: &[JsValue]) -> OverlayResult<JsValue> {
    let method = get_property(target, name)
        .and_then(|value| value.dyn_into::<Function>().ok())
        .ok_or_else(|| OverlayError::js(format!("{name} is not a function")))?;
    let args: Array = args.iter().collect();
    method.apply(target, &args).map_err(|err| js_error(name, &err))
}

pub fn js_error(context: &str, err: &JsValue) -> OverlayError {
    let message = err
        .as_string()
        .or_else(|| get_property(err, "message").and_then(|m| m.as_string()))
        .unwrap_or_else(|| format!("{err:?}"));
    OverlayError::js(format!("{context}: {message}"))
}

impl HostValue for JsHandle {
    fn get(&self, key: &str) -> Option<Self> {
        get_property(&self.0, key).map(JsHandle)
    }

    fn as_str(&self) -> Option<String> {
        self.0.as_string()
    }

    fn as_f64(&self) -> Option<f64> {
        self.0.as_f64()
    }

    fn is_function(&self) -> bool {
        self.0.is_function()
    }

    fn source_text(&self) -> Option<String> {
        self.0
            .dyn_ref::<Function>()
            .map(|function| String::from(function.to_string()))
    }

    fn entries(&self) -> Vec<(String, Self)> {
        let Some(object) = self.as_object() else {
            return Vec::new();
        };
        Object::keys(object)
            .iter()
            .filter_map(|key| {
                let name = key.as_string()?;
                let value = Reflect::get(object, &key).ok()?;
                Some((name, JsHandle(value)))
            })
            .collect()
    }

    fn prototype(&self) -> Option<Self> {
        if !self.is_object_like() {
            return None;
        }
        let proto = Object::get_prototype_of(&self.0);
        (!proto.is_null()).then(|| JsHandle(proto.into()))
    }

    fn has_accessor(&self, key: &str) -> bool {
        let Some(object) = self.as_object() else {
            return false;
        };
        let descriptor = Object::get_own_property_descriptor(object, &JsValue::from_str(key));
        get_property(&descriptor, "get").is_some_and(|getter| getter.is_function())
    }

    fn from_string(value: &str) -> Self {
        JsHandle(JsValue::from_str(value))
    }

    fn from_number(value: f64) -> Self {
        JsHandle(JsValue::from_f64(value))
    }

    fn same(&self, other: &Self) -> bool {
        Object::is(&self.0, &other.0)
    }
}

/// The page's global object
#[derive(Default)]
pub struct JsScope;

impl JsScope {
    pub fn new() -> Self {
        JsScope
    }

    fn define(target: &Object, key: &str, descriptor: &Object) -> OverlayResult<()> {
        Reflect::define_property(target, &JsValue::from_str(key), descriptor)
            .map_err(|err| js_error(key, &err))
            .and_then(|defined| {
                defined
                    .then_some(())
                    .ok_or_else(|| OverlayError::js(format!("{key} is not configurable")))
            })
    }

    fn own_descriptor(target: &Object, key: &str) -> OverlayResult<JsValue> {
        let descriptor = Object::get_own_property_descriptor(target, &JsValue::from_str(key));
        if descriptor.is_undefined() {
            return Err(OverlayError::js(format!("{key} is not an own property")));
        }
        Ok(descriptor)
    }
}

/// Build a JS function from a factory shim, passing it `callback` and `original`
fn shim(body: &str, callback: JsValue, original: &JsValue) -> OverlayResult<Function> {
    let factory = Function::new_with_args("callback, original", body);
    factory
        .call2(&JsValue::NULL, &callback, original)
        .map_err(|err| js_error("shim", &err))?
        .dyn_into::<Function>()
        .map_err(|_| OverlayError::js("shim did not produce a function"))
}

fn set_field(target: &Object, key: &str, value: &JsValue) {
    // Plain object literals always accept new fields.
    let _ = Reflect::set(target, &JsValue::from_str(key), value);
}

fn target_object(target: &JsHandle) -> OverlayResult<&Object> {
    target
        .as_object()
        .ok_or_else(|| OverlayError::js("interception target is not an object"))
}

impl HostScope for JsScope {
    type Value = JsHandle;

    fn global(&self, name: &str) -> Option<JsHandle> {
        get_property(&js_sys::global(), name).map(JsHandle)
    }

    fn set_global(&self, name: &str, value: JsHandle) {
        if let Err(err) = Reflect::set(&js_sys::global(), &JsValue::from_str(name), &value.0) {
            log::error!("{}", js_error(name, &err));
        }
    }

    fn wrap_constructor(
        &self,
        original: &JsHandle,
        observer: Rc<dyn ConstructObserver<JsHandle>>,
    ) -> OverlayResult<JsHandle> {
        let target = original
            .0
            .dyn_ref::<Function>()
            .ok_or_else(|| OverlayError::js("constructor is not a function"))?;

        let trap = Closure::<dyn Fn(Function, Array, Function) -> Result<JsValue, JsValue>>::new(
            move |target: Function, args: Array, new_target: Function| {
                let mut values: Vec<JsHandle> = args.iter().map(JsHandle).collect();
                observer.before(&mut values);
                let args: Array = values.iter().map(JsHandle::value).collect();
                let instance = Reflect::construct_with_new_target(&target, &args, &new_target)?;
                observer.after(&values, &JsHandle(instance.clone()));
                Ok(instance)
            },
        );

        let handler = Object::new();
        set_field(&handler, "construct", &trap.into_js_value());
        Ok(JsHandle(Proxy::new(target, &handler).into()))
    }

    fn on_settle(&self, promise: &JsHandle, callback: Box<dyn FnOnce(JsHandle)>) {
        let promise = Promise::resolve(&promise.0);
        wasm_bindgen_futures::spawn_local(async move {
            match JsFuture::from(promise).await {
                Ok(value) => callback(JsHandle(value)),
                Err(err) => log::debug!("Observed promise rejected: {err:?}"),
            }
        });
    }

    fn wrap_getter(
        &self,
        target: &JsHandle,
        key: &str,
        preserve_as: &str,
        wrap: GetterWrap<JsHandle>,
    ) -> OverlayResult<()> {
        let object = target_object(target)?;
        let descriptor = Self::own_descriptor(object, key)?;
        let getter = get_property(&descriptor, "get")
            .filter(JsValue::is_function)
            .ok_or_else(|| OverlayError::js(format!("{key} has no getter")))?;

        let preserved = Object::new();
        set_field(&preserved, "get", &getter);
        set_field(&preserved, "configurable", &JsValue::TRUE);
        Self::define(object, preserve_as, &preserved)?;

        let callback = Closure::<dyn Fn(JsValue) -> JsValue>::new(move |value: JsValue| {
            wrap(JsHandle(value)).0
        });
        let wrapped = shim(
            "return function () { return callback(original.call(this)); };",
            callback.into_js_value(),
            &getter,
        )?;

        let replaced = Object::new();
        set_field(&replaced, "get", &wrapped);
        if let Some(setter) = get_property(&descriptor, "set") {
            set_field(&replaced, "set", &setter);
        }
        set_field(&replaced, "configurable", &JsValue::TRUE);
        Self::define(object, key, &replaced)
    }

    fn wrap_setter(&self, target: &JsHandle, key: &str, tap: SetterTap<JsHandle>) -> OverlayResult<()> {
        let object = target_object(target)?;
        let descriptor = Self::own_descriptor(object, key)?;
        let setter = get_property(&descriptor, "set")
            .filter(JsValue::is_function)
            .ok_or_else(|| OverlayError::js(format!("{key} has no setter")))?;

        let callback = Closure::<dyn Fn(JsValue)>::new(move |this: JsValue| tap(&JsHandle(this)));
        let wrapped = shim(
            "return function (value) { original.call(this, value); callback(this); };",
            callback.into_js_value(),
            &setter,
        )?;

        let replaced = Object::new();
        if let Some(getter) = get_property(&descriptor, "get") {
            set_field(&replaced, "get", &getter);
        }
        set_field(&replaced, "set", &wrapped);
        set_field(&replaced, "configurable", &JsValue::TRUE);
        Self::define(object, key, &replaced)
    }

    fn wrap_method(&self, target: &JsHandle, key: &str, tap: MethodTap<JsHandle>) -> OverlayResult<()> {
        let object = target_object(target)?;
        let method = get_property(object, key)
            .filter(JsValue::is_function)
            .ok_or_else(|| OverlayError::js(format!("{key} is not a method")))?;

        let wrapped = tapped_function(&method, tap)?;

        Reflect::set(object, &JsValue::from_str(key), &wrapped)
            .map_err(|err| js_error(key, &err))?
            .then_some(())
            .ok_or_else(|| OverlayError::js(format!("{key} is read-only")))
    }

    fn wrap_function(&self, original: &JsHandle, tap: MethodTap<JsHandle>) -> OverlayResult<JsHandle> {
        if !original.is_function() {
            return Err(OverlayError::js("wrapped value is not a function"));
        }
        Ok(JsHandle(tapped_function(original.value(), tap)?.into()))
    }
}

/// Function calling `original` with the same `this` and arguments, then `tap`
fn tapped_function(original: &JsValue, tap: MethodTap<JsHandle>) -> OverlayResult<Function> {
    let callback = Closure::<dyn Fn(JsValue, Array)>::new(move |this: JsValue, args: Array| {
        let args: Vec<JsHandle> = args.iter().map(JsHandle).collect();
        tap(&JsHandle(this), &args);
    });
    shim(
        "return function (...args) { const result = original.apply(this, args); callback(this, args); return result; };",
        callback.into_js_value(),
        original,
    )
}

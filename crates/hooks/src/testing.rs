//! In-memory host used by the unit tests

use overlay_pro_shared::{OverlayError, OverlayResult};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::host::{ConstructObserver, GetterWrap, HostScope, HostValue, MethodTap, SetterTap};

type NativeFn = Rc<dyn Fn(&FakeValue, &[FakeValue]) -> FakeValue>;
type NativeCtor = Rc<dyn Fn(Vec<FakeValue>) -> FakeValue>;
type Getter = Rc<dyn Fn(&FakeValue) -> FakeValue>;
type Setter = Rc<dyn Fn(&FakeValue, FakeValue)>;

#[derive(Clone, Default)]
struct Accessor {
    get: Option<Getter>,
    set: Option<Setter>,
}

#[derive(Default)]
struct PromiseSlot {
    value: Option<FakeValue>,
    waiting: Vec<Box<dyn FnOnce(FakeValue)>>,
}

enum Kind {
    Plain,
    Function(NativeFn),
    Constructor(NativeCtor),
    Promise(RefCell<PromiseSlot>),
}

pub struct FakeObject {
    kind: Kind,
    source: Option<String>,
    props: RefCell<Vec<(String, FakeValue)>>,
    accessors: RefCell<HashMap<String, Accessor>>,
    proto: RefCell<Option<FakeValue>>,
}

#[derive(Clone)]
pub enum FakeValue {
    Undefined,
    Number(f64),
    Text(String),
    Object(Rc<FakeObject>),
}

impl FakeValue {
    fn object(kind: Kind, source: Option<String>) -> Self {
        FakeValue::Object(Rc::new(FakeObject {
            kind,
            source,
            props: RefCell::new(Vec::new()),
            accessors: RefCell::new(HashMap::new()),
            proto: RefCell::new(None),
        }))
    }

    pub fn text(value: &str) -> Self {
        FakeValue::Text(value.to_string())
    }

    pub fn plain() -> Self {
        Self::object(Kind::Plain, None)
    }

    /// Plain object with string fields
    pub fn record(fields: &[(&str, &str)]) -> Self {
        let value = Self::plain();
        for (key, field) in fields {
            value.set(key, FakeValue::text(field));
        }
        value
    }

    pub fn function(source: &str, body: impl Fn(&FakeValue, &[FakeValue]) -> FakeValue + 'static) -> Self {
        Self::object(Kind::Function(Rc::new(body)), Some(source.to_string()))
    }

    pub fn constructor(body: impl Fn(Vec<FakeValue>) -> FakeValue + 'static) -> Self {
        Self::object(Kind::Constructor(Rc::new(body)), Some("class {}".to_string()))
    }

    pub fn pending_promise() -> Self {
        Self::object(Kind::Promise(RefCell::new(PromiseSlot::default())), None)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FakeValue::Text(text) => Some(text),
            _ => None,
        }
    }

    fn obj(&self) -> Option<&Rc<FakeObject>> {
        match self {
            FakeValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Data property assignment, or a setter call if `key` is an accessor
    pub fn set(&self, key: &str, value: FakeValue) {
        let Some(obj) = self.obj() else { return };
        if let Some(setter) = self.find_accessor(key).and_then(|a| a.set) {
            setter(self, value);
            return;
        }
        let mut props = obj.props.borrow_mut();
        match props.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => props.push((key.to_string(), value)),
        }
    }

    pub fn set_proto(&self, proto: FakeValue) {
        if let Some(obj) = self.obj() {
            *obj.proto.borrow_mut() = Some(proto);
        }
    }

    /// Own accessor property with only a getter
    pub fn define_getter(&self, key: &str, get: impl Fn(&FakeValue) -> FakeValue + 'static) {
        self.insert_accessor(
            key,
            Accessor {
                get: Some(Rc::new(get)),
                set: None,
            },
        );
    }

    /// Own accessor property with a getter and a setter
    pub fn define_property(
        &self,
        key: &str,
        get: impl Fn(&FakeValue) -> FakeValue + 'static,
        set: impl Fn(&FakeValue, FakeValue) + 'static,
    ) {
        self.insert_accessor(
            key,
            Accessor {
                get: Some(Rc::new(get)),
                set: Some(Rc::new(set)),
            },
        );
    }

    fn insert_accessor(&self, key: &str, accessor: Accessor) {
        if let Some(obj) = self.obj() {
            obj.accessors.borrow_mut().insert(key.to_string(), accessor);
        }
    }

    fn find_accessor(&self, key: &str) -> Option<Accessor> {
        let obj = self.obj()?;
        if let Some(accessor) = obj.accessors.borrow().get(key) {
            return Some(accessor.clone());
        }
        obj.proto.borrow().as_ref()?.find_accessor(key)
    }

    /// Invoke a function value
    pub fn call(&self, this: &FakeValue, args: &[FakeValue]) -> FakeValue {
        match self.obj().map(|o| &o.kind) {
            Some(Kind::Function(body)) => body(this, args),
            _ => FakeValue::Undefined,
        }
    }

    /// Invoke method `key` of this value
    pub fn call_method(&self, key: &str, args: &[FakeValue]) -> FakeValue {
        match self.get(key) {
            Some(method) => method.call(self, args),
            None => FakeValue::Undefined,
        }
    }

    pub fn construct(&self, args: Vec<FakeValue>) -> FakeValue {
        match self.obj().map(|o| &o.kind) {
            Some(Kind::Constructor(body)) => body(args),
            _ => FakeValue::Undefined,
        }
    }

    pub fn resolve(&self, value: FakeValue) {
        let Some(Kind::Promise(slot)) = self.obj().map(|o| &o.kind) else {
            return;
        };
        let waiting = {
            let mut slot = slot.borrow_mut();
            slot.value = Some(value.clone());
            std::mem::take(&mut slot.waiting)
        };
        for callback in waiting {
            callback(value.clone());
        }
    }
}

impl HostValue for FakeValue {
    fn get(&self, key: &str) -> Option<Self> {
        let obj = self.obj()?;
        if let Some((_, value)) = obj.props.borrow().iter().find(|(k, _)| k == key) {
            return Some(value.clone());
        }
        if let Some(getter) = self.find_accessor(key).and_then(|a| a.get) {
            return Some(getter(self));
        }
        let proto = obj.proto.borrow().clone()?;
        proto.get(key)
    }

    fn as_str(&self) -> Option<String> {
        self.as_text().map(str::to_string)
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            FakeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn is_function(&self) -> bool {
        matches!(
            self.obj().map(|o| &o.kind),
            Some(Kind::Function(_)) | Some(Kind::Constructor(_))
        )
    }

    fn source_text(&self) -> Option<String> {
        self.obj().and_then(|o| o.source.clone())
    }

    fn entries(&self) -> Vec<(String, Self)> {
        self.obj()
            .map(|o| o.props.borrow().clone())
            .unwrap_or_default()
    }

    fn prototype(&self) -> Option<Self> {
        self.obj().and_then(|o| o.proto.borrow().clone())
    }

    fn has_accessor(&self, key: &str) -> bool {
        self.obj()
            .map(|o| {
                o.accessors
                    .borrow()
                    .get(key)
                    .map(|a| a.get.is_some())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    fn from_string(value: &str) -> Self {
        FakeValue::text(value)
    }

    fn from_number(value: f64) -> Self {
        FakeValue::Number(value)
    }

    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (FakeValue::Object(a), FakeValue::Object(b)) => Rc::ptr_eq(a, b),
            (FakeValue::Text(a), FakeValue::Text(b)) => a == b,
            (FakeValue::Number(a), FakeValue::Number(b)) => a == b,
            (FakeValue::Undefined, FakeValue::Undefined) => true,
            _ => false,
        }
    }
}

/// Global object of the fake host
#[derive(Default)]
pub struct FakeScope {
    globals: RefCell<HashMap<String, FakeValue>>,
    sets: RefCell<HashMap<String, usize>>,
}

impl FakeScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope with `Promise`, `Proxy` and `URL` constructors and `fetch` installed
    pub fn with_builtins() -> Self {
        let scope = Self::new();
        scope.set_global(
            "Promise",
            FakeValue::constructor(|_executor| FakeValue::pending_promise()),
        );
        scope.set_global(
            "Proxy",
            FakeValue::constructor(|args| {
                let proxy = FakeValue::plain();
                if let Some(target) = args.first() {
                    proxy.set("target", target.clone());
                }
                proxy
            }),
        );
        scope.set_global(
            "fetch",
            FakeValue::function("function fetch() { [native code] }", |_, _| {
                FakeValue::pending_promise()
            }),
        );
        scope.set_global(
            "URL",
            FakeValue::constructor(|args| {
                let url = FakeValue::plain();
                url.set("href", args.first().cloned().unwrap_or(FakeValue::Undefined));
                url
            }),
        );
        scope
    }

    pub fn global_text(&self, name: &str) -> Option<String> {
        self.global(name).and_then(|v| v.as_str())
    }

    pub fn set_count(&self, name: &str) -> usize {
        self.sets.borrow().get(name).copied().unwrap_or(0)
    }

    /// `new <name>(...args)` against whatever is currently installed
    pub fn construct(&self, name: &str, args: Vec<FakeValue>) -> FakeValue {
        self.global(name)
            .map(|ctor| ctor.construct(args))
            .unwrap_or(FakeValue::Undefined)
    }

    /// `<name>(...args)` against whatever is currently installed
    pub fn call(&self, name: &str, args: &[FakeValue]) -> FakeValue {
        self.global(name)
            .map(|function| function.call(&FakeValue::Undefined, args))
            .unwrap_or(FakeValue::Undefined)
    }
}

impl HostScope for FakeScope {
    type Value = FakeValue;

    fn global(&self, name: &str) -> Option<FakeValue> {
        self.globals.borrow().get(name).cloned()
    }

    fn set_global(&self, name: &str, value: FakeValue) {
        self.globals.borrow_mut().insert(name.to_string(), value);
        *self.sets.borrow_mut().entry(name.to_string()).or_default() += 1;
    }

    fn wrap_constructor(
        &self,
        original: &FakeValue,
        observer: Rc<dyn ConstructObserver<FakeValue>>,
    ) -> OverlayResult<FakeValue> {
        if !original.is_function() {
            return Err(OverlayError::js("not a constructor"));
        }
        let original = original.clone();
        Ok(FakeValue::constructor(move |mut args| {
            observer.before(&mut args);
            let instance = original.construct(args.clone());
            observer.after(&args, &instance);
            instance
        }))
    }

    fn on_settle(&self, promise: &FakeValue, callback: Box<dyn FnOnce(FakeValue)>) {
        let Some(Kind::Promise(slot)) = promise.obj().map(|o| &o.kind) else {
            return;
        };
        let ready = slot.borrow().value.clone();
        match ready {
            Some(value) => callback(value),
            None => slot.borrow_mut().waiting.push(callback),
        }
    }

    fn wrap_getter(
        &self,
        target: &FakeValue,
        key: &str,
        preserve_as: &str,
        wrap: GetterWrap<FakeValue>,
    ) -> OverlayResult<()> {
        let obj = target.obj().ok_or_else(|| OverlayError::js("not an object"))?;
        let mut accessors = obj.accessors.borrow_mut();
        let existing = accessors
            .get(key)
            .cloned()
            .ok_or_else(|| OverlayError::js(format!("no accessor {key}")))?;
        let getter = existing
            .get
            .clone()
            .ok_or_else(|| OverlayError::js(format!("no getter {key}")))?;
        accessors.insert(preserve_as.to_string(), existing.clone());

        let wrapped: Getter = Rc::new(move |this: &FakeValue| wrap(getter(this)));
        accessors.insert(
            key.to_string(),
            Accessor {
                get: Some(wrapped),
                set: existing.set,
            },
        );
        Ok(())
    }

    fn wrap_setter(&self, target: &FakeValue, key: &str, tap: SetterTap<FakeValue>) -> OverlayResult<()> {
        let obj = target.obj().ok_or_else(|| OverlayError::js("not an object"))?;
        let mut accessors = obj.accessors.borrow_mut();
        let existing = accessors
            .get(key)
            .cloned()
            .ok_or_else(|| OverlayError::js(format!("no accessor {key}")))?;
        let setter = existing
            .set
            .clone()
            .ok_or_else(|| OverlayError::js(format!("no setter {key}")))?;

        let wrapped: Setter = Rc::new(move |this: &FakeValue, value: FakeValue| {
            setter(this, value);
            tap(this);
        });
        accessors.insert(
            key.to_string(),
            Accessor {
                get: existing.get,
                set: Some(wrapped),
            },
        );
        Ok(())
    }

    fn wrap_method(&self, target: &FakeValue, key: &str, tap: MethodTap<FakeValue>) -> OverlayResult<()> {
        let method = target
            .get(key)
            .filter(|method| method.is_function())
            .ok_or_else(|| OverlayError::js(format!("no method {key}")))?;
        let source = method.source_text().unwrap_or_default();
        target.set(
            key,
            FakeValue::function(&source, move |this, args| {
                let result = method.call(this, args);
                tap(this, args);
                result
            }),
        );
        Ok(())
    }

    fn wrap_function(&self, original: &FakeValue, tap: MethodTap<FakeValue>) -> OverlayResult<FakeValue> {
        if !original.is_function() {
            return Err(OverlayError::js("not a function"));
        }
        let original = original.clone();
        let source = original.source_text().unwrap_or_default();
        Ok(FakeValue::function(&source, move |this, args| {
            let result = original.call(this, args);
            tap(this, args);
            result
        }))
    }
}

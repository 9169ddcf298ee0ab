//! Symbol registry: find late-loaded code bundles and their exports
//!
//! Bundles arrive asynchronously and in no particular order. A lookup
//! registered before its bundle shows up is parked and resolved the moment a
//! satisfying bundle is announced.

use futures::channel::oneshot;
use futures::{Future, FutureExt};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::host::HostValue;

type Predicate<B> = Rc<dyn Fn(&B) -> bool>;

/// A registered lookup; `sender` is taken once it resolves
struct Lookup<B> {
    id: u64,
    predicate: Predicate<B>,
    sender: Option<oneshot::Sender<B>>,
}

struct RegistryInner<B> {
    bundles: Vec<B>,
    seen: HashSet<String>,
    lookups: Vec<Lookup<B>>,
    next_id: u64,
    ambiguous: usize,
    closed: bool,
}

/// Known bundles plus lookups still waiting for one
pub struct SymbolRegistry<B> {
    inner: Rc<RefCell<RegistryInner<B>>>,
}

impl<B> Clone for SymbolRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: Clone + 'static> Default for SymbolRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Clone + 'static> SymbolRegistry<B> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                bundles: Vec::new(),
                seen: HashSet::new(),
                lookups: Vec::new(),
                next_id: 0,
                ambiguous: 0,
                closed: false,
            })),
        }
    }

    /// Resolve with the first known or future bundle satisfying `predicate`
    ///
    /// Resolves to `None` only if the registry is closed before any bundle
    /// matched.
    pub fn find_module(
        &self,
        predicate: impl Fn(&B) -> bool + 'static,
    ) -> impl Future<Output = Option<B>> {
        let (sender, receiver) = oneshot::channel();
        let mut inner = self.inner.borrow_mut();

        let mut matches = inner.bundles.iter().filter(|bundle| predicate(bundle));
        let sender = match matches.next() {
            Some(first) => {
                let first = first.clone();
                let extra = matches.count();
                if extra > 0 {
                    log::warn!("{} more modules match the same lookup, using the first", extra);
                    inner.ambiguous += extra;
                }
                let _ = sender.send(first);
                None
            }
            None if inner.closed => {
                log::warn!("Module lookup registered after discovery finished, nothing matched");
                return receiver.map(Result::ok);
            }
            None => Some(sender),
        };

        if !inner.closed {
            let id = inner.next_id;
            inner.next_id += 1;
            inner.lookups.push(Lookup {
                id,
                predicate: Rc::new(predicate),
                sender,
            });
        }
        receiver.map(Result::ok)
    }

    /// Announce a newly loaded bundle; `unit` identifies it so that repeated
    /// announcements of the same unit are ignored
    pub fn notify_bundle(&self, unit: &str, bundle: B) -> bool {
        let satisfied = {
            let mut inner = self.inner.borrow_mut();
            if !inner.seen.insert(unit.to_string()) {
                log::debug!("Bundle {unit} already registered");
                return false;
            }
            inner.bundles.push(bundle.clone());

            let mut satisfied = Vec::new();
            let mut ambiguous = 0;
            for lookup in inner.lookups.iter_mut() {
                if !(lookup.predicate)(&bundle) {
                    continue;
                }
                match lookup.sender.take() {
                    Some(sender) => satisfied.push((lookup.id, sender)),
                    None => {
                        log::warn!("Bundle {unit} also matches resolved lookup #{}, ignoring it", lookup.id);
                        ambiguous += 1;
                    }
                }
            }
            inner.ambiguous += ambiguous;
            satisfied
        };

        if !satisfied.is_empty() {
            log::debug!("Bundle {unit} resolved {} lookups", satisfied.len());
        }
        for (id, sender) in satisfied {
            log::trace!("Resolving lookup #{id}");
            let _ = sender.send(bundle.clone());
        }
        true
    }

    /// No more bundles will arrive; unresolved lookups complete with `None`
    pub fn close(&self) -> usize {
        let mut inner = self.inner.borrow_mut();
        inner.closed = true;
        let unresolved = std::mem::take(&mut inner.lookups)
            .into_iter()
            .filter(|lookup| lookup.sender.is_some())
            .count();
        if unresolved > 0 {
            log::warn!("Module discovery finished with {unresolved} unresolved lookups");
        }
        unresolved
    }

    pub fn bundle_count(&self) -> usize {
        self.inner.borrow().bundles.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner
            .borrow()
            .lookups
            .iter()
            .filter(|lookup| lookup.sender.is_some())
            .count()
    }

    /// Extra matches seen for lookups that had already resolved
    pub fn ambiguous_count(&self) -> usize {
        self.inner.borrow().ambiguous
    }
}

/// Name of the first export of `bundle` satisfying `predicate`
pub fn find_export_name<V: HostValue>(bundle: &V, predicate: impl Fn(&V) -> bool) -> Option<String> {
    let mut found: Option<String> = None;
    for (name, value) in bundle.entries() {
        if !predicate(&value) {
            continue;
        }
        match &found {
            Some(first) => log::warn!(
                "Multiple exports match the same filter: {first} and {name}, using {first}"
            ),
            None => found = Some(name),
        }
    }
    found
}

/// First export of `bundle` satisfying `predicate`
pub fn find_export<V: HostValue>(bundle: &V, predicate: impl Fn(&V) -> bool) -> Option<V> {
    find_export_name(bundle, predicate).and_then(|name| bundle.get(&name))
}

/// Bundle filters for the host modules the core looks for
pub mod filters {
    use super::find_export;
    use crate::host::HostValue;

    /// Exports the user-state object
    pub fn user_state_module<V: HostValue>() -> impl Fn(&V) -> bool {
        |bundle| find_export(bundle, is_user_state).is_some()
    }

    /// Exports the paint preview object
    pub fn preview_module<V: HostValue>(paint_method: String) -> impl Fn(&V) -> bool {
        move |bundle| find_export(bundle, |export| has_method(export, &paint_method)).is_some()
    }

    /// Function whose source mentions `marker`
    pub fn source_contains<V: HostValue>(value: &V, marker: &str) -> bool {
        value
            .source_text()
            .map(|source| source.contains(marker))
            .unwrap_or(false)
    }

    /// Object whose prototype defines a `cooldown` accessor
    pub fn is_user_state<V: HostValue>(value: &V) -> bool {
        value
            .prototype()
            .map(|proto| proto.has_accessor("cooldown"))
            .unwrap_or(false)
    }

    /// Object (or its prototype) carrying a callable `method`
    pub fn has_method<V: HostValue>(value: &V, method: &str) -> bool {
        value
            .get(method)
            .map(|m| m.is_function())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeValue;
    use futures::executor::block_on;

    fn bundle(exports: &[(&str, FakeValue)]) -> FakeValue {
        let value = FakeValue::plain();
        for (name, export) in exports {
            value.set(name, export.clone());
        }
        value
    }

    fn tagged(tag: &str) -> FakeValue {
        bundle(&[("tag", FakeValue::text(tag))])
    }

    fn tag_of(bundle: &FakeValue) -> Option<String> {
        bundle.get("tag").and_then(|t| t.as_str())
    }

    #[test]
    fn test_resolves_from_known_bundle() {
        let registry = SymbolRegistry::new();
        registry.notify_bundle("a.js", tagged("a"));

        let found = block_on(registry.find_module(|b: &FakeValue| tag_of(b).as_deref() == Some("a")));
        assert_eq!(found.and_then(|b| tag_of(&b)).as_deref(), Some("a"));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_lookup_before_bundle_resolves_with_matching_one() {
        let registry = SymbolRegistry::new();
        let mut lookup =
            Box::pin(registry.find_module(|b: &FakeValue| tag_of(b).as_deref() == Some("second")));
        assert!(lookup.as_mut().now_or_never().is_none());
        assert_eq!(registry.pending_count(), 1);

        registry.notify_bundle("first.js", tagged("first"));
        assert!(lookup.as_mut().now_or_never().is_none());

        registry.notify_bundle("second.js", tagged("second"));
        let found = block_on(lookup);
        assert_eq!(found.and_then(|b| tag_of(&b)).as_deref(), Some("second"));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_first_match_wins() {
        let registry = SymbolRegistry::new();
        registry.notify_bundle("one.js", tagged("x1"));
        registry.notify_bundle("two.js", tagged("x2"));

        let found = block_on(registry.find_module(|b: &FakeValue| {
            tag_of(b).map(|t| t.starts_with('x')).unwrap_or(false)
        }));
        assert_eq!(found.and_then(|b| tag_of(&b)).as_deref(), Some("x1"));
    }

    #[test]
    fn test_later_match_of_resolved_lookup_is_flagged() {
        let registry = SymbolRegistry::new();
        let lookup = registry.find_module(|b: &FakeValue| {
            tag_of(b).map(|t| t.starts_with("user")).unwrap_or(false)
        });
        registry.notify_bundle("user-a.js", tagged("user-a"));
        assert_eq!(block_on(lookup).and_then(|b| tag_of(&b)).as_deref(), Some("user-a"));
        assert_eq!(registry.ambiguous_count(), 0);

        registry.notify_bundle("user-b.js", tagged("user-b"));
        registry.notify_bundle("other.js", tagged("other"));
        assert_eq!(registry.ambiguous_count(), 1);
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_immediate_match_still_flags_late_bundles() {
        let registry = SymbolRegistry::new();
        registry.notify_bundle("x1.js", tagged("x1"));
        let found = block_on(registry.find_module(|b: &FakeValue| {
            tag_of(b).map(|t| t.starts_with('x')).unwrap_or(false)
        }));
        assert_eq!(found.and_then(|b| tag_of(&b)).as_deref(), Some("x1"));

        registry.notify_bundle("x2.js", tagged("x2"));
        assert_eq!(registry.ambiguous_count(), 1);
        assert_eq!(registry.close(), 0);
    }

    #[test]
    fn test_lookups_resolve_in_registration_order() {
        let registry = SymbolRegistry::new();
        let a = registry.find_module(|_: &FakeValue| true);
        let b = registry.find_module(|_: &FakeValue| true);
        registry.notify_bundle("only.js", tagged("only"));
        assert!(block_on(a).is_some());
        assert!(block_on(b).is_some());
    }

    #[test]
    fn test_duplicate_unit_is_ignored() {
        let registry = SymbolRegistry::new();
        assert!(registry.notify_bundle("a.js", tagged("a")));
        assert!(!registry.notify_bundle("a.js", tagged("a")));
        assert_eq!(registry.bundle_count(), 1);
    }

    #[test]
    fn test_close_completes_pending_with_none() {
        let registry = SymbolRegistry::new();
        let lookup = registry.find_module(|_: &FakeValue| false);
        assert_eq!(registry.close(), 1);
        assert!(block_on(lookup).is_none());
        assert!(block_on(registry.find_module(|_: &FakeValue| false)).is_none());
    }

    #[test]
    fn test_find_export_first_match() {
        let module = bundle(&[
            ("a", FakeValue::text("nope")),
            ("b", FakeValue::record(&[("url", "https://backend.wplace.live")])),
            ("c", FakeValue::record(&[("url", "https://backend.wplace.live/other")])),
        ]);
        let name = find_export_name(&module, |v: &FakeValue| v.get("url").is_some());
        assert_eq!(name.as_deref(), Some("b"));
        assert!(find_export(&module, |v: &FakeValue| v.as_text() == Some("nope")).is_some());
        assert!(find_export(&module, |v: &FakeValue| v.as_text() == Some("missing")).is_none());
    }

    #[test]
    fn test_module_filters() {
        let mount = bundle(&[(
            "mount",
            FakeValue::function("function(){ window.__svelte ??= {} }", |_, _| FakeValue::Undefined),
        )]);
        assert!(filters::source_contains(&mount.get("mount").unwrap(), "window.__svelte"));

        let preview = FakeValue::plain();
        preview.set(
            "placePixel",
            FakeValue::function("placePixel(at) {}", |_, _| FakeValue::Undefined),
        );
        let preview_bundle = bundle(&[("preview", preview)]);
        let is_preview = filters::preview_module::<FakeValue>("placePixel".to_string());
        assert!(is_preview(&preview_bundle));
        assert!(!is_preview(&mount));

        let proto = FakeValue::plain();
        proto.define_getter("cooldown", |_| FakeValue::Number(0.0));
        let user = FakeValue::plain();
        user.set_proto(proto);
        let user_bundle = bundle(&[("user", user)]);
        assert!(filters::user_state_module::<FakeValue>()(&user_bundle));
        assert!(!filters::user_state_module::<FakeValue>()(&mount));
    }
}

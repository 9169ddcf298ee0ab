//! Generic "replace global, observe, restore" primitive
//!
//! Each global name has at most one active interception. The original value
//! is captured at install time and stays reachable from the replacement for
//! as long as the hook lives; restoring puts it back exactly once.

use overlay_pro_shared::{OverlayError, OverlayResult};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::host::{ConstructObserver, HostScope};

struct HookState<V> {
    name: String,
    original: V,
    active: Cell<bool>,
}

/// Restores one interception; cloneable so a replacement can restore itself
pub struct Unhook<S: HostScope> {
    scope: Rc<S>,
    state: Rc<HookState<S::Value>>,
}

impl<S: HostScope> Clone for Unhook<S> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S: HostScope> Unhook<S> {
    /// Put the original global back; returns false if already restored
    pub fn unhook(&self) -> bool {
        if !self.state.active.replace(false) {
            return false;
        }
        self.scope
            .set_global(&self.state.name, self.state.original.clone());
        log::debug!("Restored global {}", self.state.name);
        true
    }

    pub fn is_active(&self) -> bool {
        self.state.active.get()
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn scope(&self) -> &Rc<S> {
        &self.scope
    }
}

/// What a replacement factory gets to work with
pub struct HookContext<S: HostScope> {
    unhook: Unhook<S>,
}

impl<S: HostScope> HookContext<S> {
    /// The global as it was before installation
    pub fn original(&self) -> &S::Value {
        &self.unhook.state.original
    }

    pub fn scope(&self) -> &Rc<S> {
        &self.unhook.scope
    }

    /// Handle the replacement can use to restore the original itself
    pub fn unhook(&self) -> Unhook<S> {
        self.unhook.clone()
    }
}

/// Per-name bookkeeping of installed interceptions
pub struct HookRegistry<S: HostScope> {
    scope: Rc<S>,
    hooks: RefCell<HashMap<String, Unhook<S>>>,
}

impl<S: HostScope> HookRegistry<S> {
    pub fn new(scope: Rc<S>) -> Self {
        Self {
            scope,
            hooks: RefCell::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> &Rc<S> {
        &self.scope
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.hooks
            .borrow()
            .get(name)
            .map(Unhook::is_active)
            .unwrap_or(false)
    }

    /// Replace global `name` with the value built by `factory`
    ///
    /// Fails with `HookAlreadyActive` while an earlier interception of the
    /// same name is still installed, and with `GlobalMissing` if the global
    /// does not exist. If `factory` fails nothing is installed.
    pub fn install_hook<F>(&self, name: &str, factory: F) -> OverlayResult<Unhook<S>>
    where
        F: FnOnce(&HookContext<S>) -> OverlayResult<S::Value>,
    {
        if self.is_active(name) {
            return Err(OverlayError::HookAlreadyActive {
                name: name.to_string(),
            });
        }

        let original = self
            .scope
            .global(name)
            .ok_or_else(|| OverlayError::GlobalMissing {
                name: name.to_string(),
            })?;

        let context = HookContext {
            unhook: Unhook {
                scope: self.scope.clone(),
                state: Rc::new(HookState {
                    name: name.to_string(),
                    original,
                    active: Cell::new(false),
                }),
            },
        };

        let replacement = factory(&context)?;
        context.unhook.state.active.set(true);
        self.scope.set_global(name, replacement);
        self.hooks
            .borrow_mut()
            .insert(name.to_string(), context.unhook.clone());
        log::debug!("Installed hook on global {name}");

        Ok(context.unhook)
    }

    /// Wrap constructor global `name` so `observer` sees every construction
    pub fn install_constructor_hook(
        &self,
        name: &str,
        observer: impl FnOnce(Unhook<S>) -> Rc<dyn ConstructObserver<S::Value>>,
    ) -> OverlayResult<Unhook<S>> {
        self.install_hook(name, |context| {
            let observer = observer(context.unhook());
            context.scope().wrap_constructor(context.original(), observer)
        })
    }

    /// Restore every active interception
    pub fn unhook_all(&self) -> usize {
        self.hooks
            .borrow_mut()
            .drain()
            .filter(|(_, unhook)| unhook.unhook())
            .count()
    }
}

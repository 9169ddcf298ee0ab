//! Runtime detection of host application objects
//!
//! Interception of host globals, the symbol registry over late-loaded
//! bundles, and the captures that publish the map, UI state, user state,
//! paint preview and pixel anchor as they appear.

pub mod capture;
pub mod captured;
pub mod hook;
pub mod host;
pub mod registry;

#[cfg(test)]
mod testing;

pub use capture::{install_captures, locate_preview, locate_user_state, watch_paint};
pub use captured::{CapturedCell, HostBindings, UiRefresh};
pub use hook::{HookContext, HookRegistry, Unhook};
pub use host::{ConstructObserver, HostScope, HostValue};
pub use registry::{filters, find_export, find_export_name, SymbolRegistry};

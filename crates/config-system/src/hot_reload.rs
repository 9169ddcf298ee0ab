//! Hot-reload store for the display settings pushed by the editor

use crate::{ConfigValidator, DisplaySettings, Result};
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::sync::Arc;

type Subscriber = Box<dyn Fn(&DisplaySettings)>;

/// Current display settings plus change subscribers
pub struct SettingsStore {
    /// Current settings wrapped in ArcSwap for lock-free reads
    current: ArcSwap<DisplaySettings>,

    subscribers: RwLock<Vec<Subscriber>>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(DisplaySettings::default())
    }
}

impl SettingsStore {
    pub fn new(initial: DisplaySettings) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Get the current settings
    pub fn current(&self) -> Arc<DisplaySettings> {
        self.current.load_full()
    }

    /// Validate and store new settings; returns whether anything changed
    pub fn update(&self, settings: DisplaySettings) -> Result<bool> {
        ConfigValidator::validate_settings(&settings)?;

        if *self.current.load_full() == settings {
            return Ok(false);
        }

        let settings = Arc::new(settings);
        self.current.store(settings.clone());
        log::debug!(
            "Display settings updated: {} overlays, style {}",
            settings.overlays.len(),
            settings.style
        );

        for subscriber in self.subscribers.read().iter() {
            subscriber(&settings);
        }

        Ok(true)
    }

    /// Parse, validate, and store settings from JSON
    pub fn update_json(&self, json: &str) -> Result<bool> {
        self.update(DisplaySettings::from_json(json)?)
    }

    /// Register a callback invoked after every effective update
    pub fn subscribe(&self, callback: impl Fn(&DisplaySettings) + 'static) {
        self.subscribers.write().push(Box::new(callback));
    }
}

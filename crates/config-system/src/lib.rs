//! Configuration system for Overlay Pro
//! Host detection markers, compositing tunables, and the editor-owned display settings

use overlay_pro_shared::anchor::DEFAULT_BACKEND_HOST;
use overlay_pro_shared::{
    Layering, OverlayError, OverlayRecord, OverlayStyle, Rgba, LAYER_PREFIX, MAX_OVERLAY_DIM,
    MINIFY_SCALE, UPSCALE,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod hot_reload;
pub mod validation;

pub use hot_reload::SettingsStore;
pub use validation::ConfigValidator;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for OverlayError {
    fn from(err: ConfigError) -> Self {
        OverlayError::InvalidConfig {
            message: err.to_string(),
            field: None,
        }
    }
}

/// Named layers of the host that overlays are anchored against
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerAnchors {
    pub behind: String,
    pub above: String,
}

impl Default for LayerAnchors {
    fn default() -> Self {
        Self {
            behind: "pixel-art-layer".to_string(),
            above: "pixel-hover".to_string(),
        }
    }
}

impl LayerAnchors {
    /// Layer id an overlay must be inserted before; `None` means topmost
    pub fn before_id(&self, layering: Layering) -> Option<&str> {
        match layering {
            Layering::Behind => Some(&self.behind),
            Layering::Above => Some(&self.above),
            Layering::Top => None,
        }
    }
}

/// Rewrite applied to URL constructions whose input contains `needle`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UrlRewriteRule {
    pub needle: String,
    pub replacement: String,
}

/// Strings used to recognise host objects at runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionConfig {
    /// Appears in the source of the promise executor that builds the map
    pub map_host_marker: String,
    /// Host of the backend API
    pub backend_host: String,
    /// Publish the anchor of every backend pixel request
    pub capture_pixel_anchor: bool,
    /// Closed set of `name` values carried by UI-state objects
    pub ui_state_labels: Vec<String>,
    pub url_rewrites: Vec<UrlRewriteRule>,
    /// Method of the paint preview object that places one pixel
    pub preview_paint_method: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            map_host_marker: "maps.wplace.live".to_string(),
            backend_host: DEFAULT_BACKEND_HOST.to_string(),
            capture_pixel_anchor: true,
            ui_state_labels: ["default", "paint", "pick", "selected", "zoom"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            url_rewrites: Vec::new(),
            preview_paint_method: "placePixel".to_string(),
        }
    }
}

/// Overlay compositing parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    pub max_overlay_dim: u32,
    pub upscale: u32,
    pub minify_scale: u32,
    pub layer_prefix: String,
    pub layer_anchors: LayerAnchors,
    pub checker_light: Rgba,
    pub checker_dark: Rgba,
    /// Tint of the crosshair once the painted pixel matches the live tile
    pub painted_tint: Rgba,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_overlay_dim: MAX_OVERLAY_DIM,
            upscale: UPSCALE,
            minify_scale: MINIFY_SCALE,
            layer_prefix: LAYER_PREFIX.to_string(),
            layer_anchors: LayerAnchors::default(),
            checker_light: Rgba::new(255, 255, 255, 160),
            checker_dark: Rgba::new(200, 200, 200, 160),
            painted_tint: Rgba::new(64, 220, 96, 255),
        }
    }
}

/// Complete static configuration of the core
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub render: RenderConfig,
    /// Cooldown values are rounded up to a multiple of this many milliseconds
    #[serde(default = "default_cooldown_unit")]
    pub cooldown_unit_ms: f64,
}

fn default_cooldown_unit() -> f64 {
    1000.0
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            render: RenderConfig::default(),
            cooldown_unit_ms: default_cooldown_unit(),
        }
    }
}

impl CoreConfig {
    /// Parse and validate a JSON configuration; missing sections take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CoreConfig = serde_json::from_str(json)?;
        ConfigValidator::validate_core(&config)?;
        Ok(config)
    }
}

/// Editor-owned inputs of the render pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    #[serde(default)]
    pub overlays: Vec<OverlayRecord>,
    #[serde(default)]
    pub style: OverlayStyle,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub layering: Layering,
}

fn default_opacity() -> f64 {
    0.7
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            overlays: Vec::new(),
            style: OverlayStyle::default(),
            opacity: default_opacity(),
            layering: Layering::default(),
        }
    }
}

impl DisplaySettings {
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: DisplaySettings = serde_json::from_str(json)?;
        ConfigValidator::validate_settings(&settings)?;
        Ok(settings)
    }

    /// Raster opacity of overlay layers; dots always render opaque
    pub fn layer_opacity(&self) -> f64 {
        match self.style {
            OverlayStyle::Full => self.opacity,
            _ => 1.0,
        }
    }
}

//! Configuration validation utilities

use crate::{ConfigError, CoreConfig, DetectionConfig, DisplaySettings, RenderConfig, Result};

/// Largest canvas side browsers reliably allocate
const MAX_CANVAS_SIDE: u64 = 16_384;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the static core configuration
    pub fn validate_core(config: &CoreConfig) -> Result<()> {
        Self::validate_detection(&config.detection)?;
        Self::validate_render(&config.render)?;

        if !config.cooldown_unit_ms.is_finite() || config.cooldown_unit_ms <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "Invalid cooldown unit: {}. Must be a positive number of milliseconds",
                config.cooldown_unit_ms
            )));
        }

        Ok(())
    }

    fn validate_detection(detection: &DetectionConfig) -> Result<()> {
        if detection.map_host_marker.is_empty() {
            return Err(ConfigError::Validation(
                "Map host marker cannot be empty".to_string(),
            ));
        }

        if detection.capture_pixel_anchor && detection.backend_host.is_empty() {
            return Err(ConfigError::Validation(
                "Backend host is required for pixel anchor capture".to_string(),
            ));
        }

        if detection.ui_state_labels.is_empty() {
            return Err(ConfigError::Validation(
                "At least one UI state label is required".to_string(),
            ));
        }

        for rule in &detection.url_rewrites {
            if rule.needle.is_empty() {
                return Err(ConfigError::Validation(
                    "URL rewrite needle cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn validate_render(render: &RenderConfig) -> Result<()> {
        if render.upscale == 0 || render.minify_scale == 0 {
            return Err(ConfigError::Validation(format!(
                "Invalid scale factors: upscale {} minify {}. Both must be at least 1",
                render.upscale, render.minify_scale
            )));
        }

        if render.max_overlay_dim < 2 {
            return Err(ConfigError::Validation(format!(
                "Invalid max overlay dimension: {}",
                render.max_overlay_dim
            )));
        }

        // Largest accepted image is one pixel below the limit.
        let largest = (render.max_overlay_dim as u64 - 1)
            * render.upscale as u64
            * render.minify_scale as u64;
        if largest > MAX_CANVAS_SIDE {
            log::warn!(
                "Dots canvas for a {}px overlay would be {}px wide, above the usual browser limit of {}px",
                render.max_overlay_dim - 1,
                largest,
                MAX_CANVAS_SIDE
            );
        }

        if render.layer_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "Layer prefix cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate editor-supplied display settings
    pub fn validate_settings(settings: &DisplaySettings) -> Result<()> {
        if !settings.opacity.is_finite() || settings.opacity < 0.0 || settings.opacity > 1.0 {
            return Err(ConfigError::Validation(format!(
                "Invalid opacity: {}. Must be between 0.0 and 1.0",
                settings.opacity
            )));
        }

        Ok(())
    }
}

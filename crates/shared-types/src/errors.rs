//! Common error types used across all Overlay Pro crates
//!
//! Nothing in the core escalates to a fatal error: every variant here is
//! either logged and skipped, or reported once to the user.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base error type for all Overlay Pro operations
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum OverlayError {
    // Interception errors
    #[error("Hook already active for global: {name}")]
    HookAlreadyActive { name: String },

    #[error("Global not found: {name}")]
    GlobalMissing { name: String },

    #[error("Host object not detected: {what}")]
    DetectionMiss { what: String },

    // Image errors
    #[error("Image decode failed: {message}")]
    ImageDecode { message: String },

    #[error("Overlay \"{name}\" image too large: {width}x{height} (must be smaller than {max}x{max})")]
    ImageTooLarge {
        name: String,
        width: u32,
        height: u32,
        max: u32,
    },

    // Map errors
    #[error("Map operation failed: {message}")]
    MapOperation { message: String },

    #[error("GPU readback failed: {message}")]
    GpuReadback { message: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        message: String,
        field: Option<String>,
    },

    // WASM-specific errors
    #[error("JavaScript interop error: {message}")]
    JsInterop { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl OverlayError {
    pub fn map_op(message: impl Into<String>) -> Self {
        OverlayError::MapOperation {
            message: message.into(),
        }
    }

    pub fn js(message: impl Into<String>) -> Self {
        OverlayError::JsInterop {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        OverlayError::ImageDecode {
            message: message.into(),
        }
    }

    /// Whether the error should be surfaced to the user rather than only logged
    pub fn is_user_visible(&self) -> bool {
        matches!(self, OverlayError::ImageTooLarge { .. })
    }
}

/// Result type alias for Overlay Pro operations
pub type OverlayResult<T> = Result<T, OverlayError>;

/// Error response structure for JavaScript interop
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: OverlayError,
    pub context: Option<ErrorContext>,
}

/// Additional context for error reporting
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorContext {
    pub component: String,
    pub operation: String,
}

impl ErrorResponse {
    pub fn new(error: OverlayError) -> Self {
        Self {
            success: false,
            error,
            context: None,
        }
    }

    /// Add context to the error response
    pub fn with_context(mut self, component: &str, operation: &str) -> Self {
        self.context = Some(ErrorContext {
            component: component.to_string(),
            operation: operation.to_string(),
        });
        self
    }

    /// Convert to JSON string for JavaScript
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":{"type":"Internal","details":{"message":"Failed to serialize error"}}}"#.to_string()
        })
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(err: serde_json::Error) -> Self {
        OverlayError::InvalidConfig {
            message: err.to_string(),
            field: None,
        }
    }
}

/// Helper macro for converting foreign results into map operation errors
#[macro_export]
macro_rules! map_op_error {
    ($result:expr, $message:expr) => {
        $result.map_err(|e| $crate::errors::OverlayError::MapOperation {
            message: format!("{}: {}", $message, e),
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let error = OverlayError::ImageTooLarge {
            name: "Castle".to_string(),
            width: 4000,
            height: 10,
            max: 2048,
        };
        assert!(error.is_user_visible());

        let json = ErrorResponse::new(error)
            .with_context("Reconciler", "reconcile")
            .to_json();
        assert!(json.contains("ImageTooLarge"));
        assert!(json.contains("Reconciler"));
    }

    #[test]
    fn test_error_display() {
        let error = OverlayError::HookAlreadyActive {
            name: "Promise".to_string(),
        };
        assert_eq!(error.to_string(), "Hook already active for global: Promise");
        assert!(!error.is_user_visible());
    }

    #[test]
    fn test_map_op_macro() {
        let failing: Result<(), &str> = Err("boom");
        let err = crate::map_op_error!(failing, "add layer").unwrap_err();
        assert_eq!(
            err,
            OverlayError::MapOperation {
                message: "add layer: boom".to_string()
            }
        );
    }
}

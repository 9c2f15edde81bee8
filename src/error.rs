//! Crate-wide error handling for dtx-core
//!
//! Each subsystem reports its own `thiserror` enum; this module folds them into
//! one error type for callers that drive the whole pipeline (the scene model
//! builder, config loading).

use std::error::Error as StdError;
use std::fmt;

use crate::compression::CompressionError;
use crate::config::ConfigError;
use crate::layer::LayerError;
use crate::tiles::TileError;

/// Main error type for dtx-core
#[derive(Debug)]
pub enum DtxError {
    // Geometry Errors
    Compression(CompressionError),
    GeometryNotFound {
        id: String,
    },
    DuplicateGeometry {
        id: String,
    },

    // Layer Errors
    Layer(LayerError),
    MeshNotFound {
        id: String,
    },
    DuplicateMesh {
        id: String,
    },

    // Tile Errors
    Tile(TileError),

    // Configuration Errors
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },
    Config(ConfigError),

    // Lifecycle Errors
    StateError {
        expected: String,
        actual: String,
    },
}

impl fmt::Display for DtxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DtxError::Compression(e) => write!(f, "Compression failed: {}", e),
            DtxError::GeometryNotFound { id } => write!(f, "Geometry not found: {}", id),
            DtxError::DuplicateGeometry { id } => {
                write!(f, "Geometry already exists: {}", id)
            }

            DtxError::Layer(e) => write!(f, "Layer error: {}", e),
            DtxError::MeshNotFound { id } => write!(f, "Mesh not found: {}", id),
            DtxError::DuplicateMesh { id } => write!(f, "Mesh already exists: {}", id),

            DtxError::Tile(e) => write!(f, "Tile error: {}", e),

            DtxError::InvalidConfig {
                field,
                value,
                reason,
            } => write!(f, "Invalid config: {} = {} ({})", field, value, reason),
            DtxError::Config(e) => write!(f, "Config error: {}", e),

            DtxError::StateError { expected, actual } => {
                write!(f, "State error: expected {}, actual {}", expected, actual)
            }
        }
    }
}

impl StdError for DtxError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DtxError::Compression(e) => Some(e),
            DtxError::Layer(e) => Some(e),
            DtxError::Tile(e) => Some(e),
            DtxError::Config(e) => Some(e),
            _ => None,
        }
    }
}

/// Type alias for Results in dtx-core
pub type DtxResult<T> = Result<T, DtxError>;

// Conversion traits for subsystem errors

impl From<CompressionError> for DtxError {
    fn from(error: CompressionError) -> Self {
        DtxError::Compression(error)
    }
}

impl From<LayerError> for DtxError {
    fn from(error: LayerError) -> Self {
        DtxError::Layer(error)
    }
}

impl From<TileError> for DtxError {
    fn from(error: TileError) -> Self {
        DtxError::Tile(error)
    }
}

impl From<ConfigError> for DtxError {
    fn from(error: ConfigError) -> Self {
        DtxError::Config(error)
    }
}

// Helper functions for common error patterns

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_dtx<F>(self, f: F) -> DtxResult<T>
    where
        F: FnOnce() -> DtxError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_dtx<F>(self, f: F) -> DtxResult<T>
    where
        F: FnOnce() -> DtxError,
    {
        self.ok_or_else(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DtxError::GeometryNotFound {
            id: "beam-01".to_string(),
        };
        assert_eq!(err.to_string(), "Geometry not found: beam-01");
    }

    #[test]
    fn test_layer_error_conversion() {
        let err: DtxError = LayerError::AlreadyBuilt.into();
        assert!(matches!(err, DtxError::Layer(LayerError::AlreadyBuilt)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_dtx(|| DtxError::MeshNotFound {
            id: "slab-3".to_string(),
        });
        assert!(matches!(result, Err(DtxError::MeshNotFound { .. })));
        assert_eq!(Some(7).ok_or_dtx(|| unreachable!()).unwrap(), 7);
    }
}

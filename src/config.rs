//! Configuration for compression, layer packing and the RTC tile pool
//!
//! All sections deserialize from TOML with every field optional; missing
//! fields fall back to the defaults in [`crate::constants`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{DtxError, DtxResult};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {error}")]
    Read { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// Geometry compression settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Cell size the geometry origin is snapped to
    pub rtc_cell_size: f64,
    /// Dihedral angle (degrees) above which an edge is kept
    pub edge_threshold_degrees: f64,
    /// Split geometries with more than 65536 unique vertices into 16-bit buckets
    pub split_large_geometries: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            rtc_cell_size: constants::quantization::DEFAULT_RTC_CELL_SIZE,
            edge_threshold_degrees: constants::quantization::DEFAULT_EDGE_THRESHOLD_DEGREES,
            split_large_geometries: true,
        }
    }
}

/// Layer capacity and update policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Maximum mesh-parts per layer
    pub max_parts: usize,
    /// Per-frame updates after which the layer batches uploads
    pub batch_update_threshold: usize,
    /// Data texture row width, in elements
    pub data_texture_width: usize,
    /// Maximum data texture height
    pub max_data_texture_height: usize,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            max_parts: constants::layer::DEFAULT_MAX_PARTS,
            batch_update_threshold: constants::layer::DEFAULT_BATCH_UPDATE_THRESHOLD,
            data_texture_width: constants::layer::DATA_TEXTURE_WIDTH,
            max_data_texture_height: constants::layer::MAX_DATA_TEXTURE_HEIGHT,
        }
    }
}

impl LayerConfig {
    /// Maximum number of elements any one width tier may hold
    pub fn max_tier_elements(&self) -> usize {
        self.data_texture_width * self.max_data_texture_height
    }
}

/// RTC tile pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    pub cell_size: f64,
    pub capacity: usize,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            cell_size: constants::tiles::DEFAULT_TILE_CELL_SIZE,
            capacity: constants::tiles::DEFAULT_TILE_CAPACITY,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtxConfig {
    pub compression: CompressionConfig,
    pub layer: LayerConfig,
    pub tiles: TileConfig,
}

impl DtxConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> DtxResult<Self> {
        let config: DtxConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> DtxResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        log::debug!("[DtxConfig::load] Loaded config from {}", path.display());
        Self::from_toml_str(&source)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> DtxResult<()> {
        let compression = &self.compression;
        if !(compression.rtc_cell_size.is_finite() && compression.rtc_cell_size > 0.0) {
            return Err(invalid(
                "compression.rtc_cell_size",
                compression.rtc_cell_size,
                "must be a positive finite number",
            ));
        }
        if !(0.0..=180.0).contains(&compression.edge_threshold_degrees) {
            return Err(invalid(
                "compression.edge_threshold_degrees",
                compression.edge_threshold_degrees,
                "must be within 0..=180",
            ));
        }

        let layer = &self.layer;
        if layer.max_parts == 0 {
            return Err(invalid("layer.max_parts", layer.max_parts, "cannot be 0"));
        }
        if layer.data_texture_width == 0 || layer.max_data_texture_height == 0 {
            return Err(invalid(
                "layer.data_texture_width",
                format!(
                    "{}x{}",
                    layer.data_texture_width, layer.max_data_texture_height
                ),
                "data texture dimensions cannot be 0",
            ));
        }
        if layer.max_tier_elements() > u32::MAX as usize {
            return Err(invalid(
                "layer.max_data_texture_height",
                layer.max_data_texture_height,
                "tier capacity must be addressable with 32-bit offsets",
            ));
        }

        let tiles = &self.tiles;
        if !(tiles.cell_size.is_finite() && tiles.cell_size > 0.0) {
            return Err(invalid(
                "tiles.cell_size",
                tiles.cell_size,
                "must be a positive finite number",
            ));
        }
        if tiles.capacity == 0 {
            return Err(invalid("tiles.capacity", tiles.capacity, "cannot be 0"));
        }

        log::debug!("[DtxConfig::validate] Configuration validated successfully");
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> DtxError {
    DtxError::InvalidConfig {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

//! Configuration structures for the green view pipeline.
//!
//! Configuration can be loaded from JSON files or constructed
//! programmatically:
//!
//! ```no_run
//! use green_view::config::PipelineConfig;
//! use std::path::Path;
//!
//! // Load from file
//! let config = PipelineConfig::from_json_file(Path::new("green_view.json"))?;
//!
//! // Or use defaults
//! let config = PipelineConfig::default();
//! # Ok::<(), green_view::GreenViewError>(())
//! ```
//!
//! The threshold band and the vegetation channel caps are not configurable;
//! they live as constants in [`crate::core_modules::classifier`].

use crate::core_modules::aggregator::AreaPolicy;
use crate::core_modules::classifier::DEFAULT_FALLBACK_LEVEL;
use crate::error::{GreenViewError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How tiles are split into regions before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SegmentationMethod {
    /// No segmentation; every pixel is its own region.
    Identity,
    /// Average over a fixed grid of rectangular blocks.
    BlockAverage {
        block_width: usize,
        block_height: usize,
    },
}

impl Default for SegmentationMethod {
    fn default() -> Self {
        SegmentationMethod::BlockAverage {
            block_width: 8,
            block_height: 8,
        }
    }
}

/// Complete configuration for classifying tiles and panoramas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Threshold returned by `graythresh` when the histogram has no split.
    #[serde(default = "default_fallback_level")]
    pub fallback_level: f64,

    /// Denominator used when converting a mask into a percentage.
    #[serde(default)]
    pub area_policy: AreaPolicy,

    /// Region-average segmentation applied before index derivation.
    #[serde(default)]
    pub segmentation: SegmentationMethod,

    /// Number of batch workers; `None` uses one per logical CPU.
    #[serde(default)]
    pub worker_count: Option<usize>,

    /// File extension of directional tiles on disk.
    #[serde(default = "default_tile_extension")]
    pub tile_extension: String,
}

fn default_fallback_level() -> f64 {
    DEFAULT_FALLBACK_LEVEL
}

fn default_tile_extension() -> String {
    "jpg".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fallback_level: default_fallback_level(),
            area_policy: AreaPolicy::default(),
            segmentation: SegmentationMethod::default(),
            worker_count: None,
            tile_extension: default_tile_extension(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GreenViewError::config(format!("cannot read {}", path.display()), e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| GreenViewError::config(format!("cannot parse {}", path.display()), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| GreenViewError::config("cannot serialize configuration", e))?;
        std::fs::write(path, json)
            .map_err(|e| GreenViewError::config(format!("cannot write {}", path.display()), e))
    }

    /// Effective number of batch workers.
    pub fn workers(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fallback_level) {
            return Err(GreenViewError::invalid_parameter(
                "fallback_level",
                self.fallback_level,
            ));
        }
        if let SegmentationMethod::BlockAverage {
            block_width,
            block_height,
        } = self.segmentation
        {
            if block_width == 0 || block_height == 0 {
                return Err(GreenViewError::invalid_parameter(
                    "segmentation.block",
                    format!("{block_width}x{block_height}"),
                ));
            }
        }
        if self.worker_count == Some(0) {
            return Err(GreenViewError::invalid_parameter("worker_count", 0));
        }
        if self.tile_extension.is_empty() {
            return Err(GreenViewError::invalid_parameter("tile_extension", "\"\""));
        }
        Ok(())
    }
}

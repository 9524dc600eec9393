//! Error types for the green_view library

use thiserror::Error;

/// Result type alias for green_view operations
pub type Result<T> = std::result::Result<T, GreenViewError>;

/// Every failure the library can surface to a caller.
///
/// Degenerate histograms and non-finite thresholds are deliberately absent:
/// the threshold selector resolves both through its fallback level.
#[derive(Error, Debug)]
pub enum GreenViewError {
    /// Per-pixel arrays disagree on shape, or the declared dimensions are empty
    #[error("Invalid shape: expected {expected_width}x{expected_height} ({expected_len} values), got {actual_len}")]
    InvalidShape {
        expected_width: usize,
        expected_height: usize,
        expected_len: usize,
        actual_len: usize,
    },

    /// Image file could not be loaded or decoded
    #[error("Failed to load image: {message}")]
    ImageLoad {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A directional tile could not be supplied for a panorama
    #[error("Tile unavailable for panorama {pano_id} at heading {heading}: {reason}")]
    TileUnavailable {
        pano_id: String,
        heading: u32,
        reason: String,
    },

    /// Configuration file could not be read, parsed or written
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A report file could not be read or written
    #[error("Report error: {message}")]
    Report {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    /// The batch worker pool dropped a task or its reply channel
    #[error("Worker pool error: {message}")]
    WorkerPool { message: String },
}

impl GreenViewError {
    /// Create a shape error for a `width x height` grid fed `actual_len` values
    pub fn invalid_shape(width: usize, height: usize, actual_len: usize) -> Self {
        Self::InvalidShape {
            expected_width: width,
            expected_height: height,
            expected_len: width.saturating_mul(height),
            actual_len,
        }
    }

    /// Create an image load error with context
    pub fn image_load<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ImageLoad {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error with context
    pub fn config<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a report file error with context
    pub fn report<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Report {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }

    pub fn worker_pool(message: impl Into<String>) -> Self {
        Self::WorkerPool {
            message: message.into(),
        }
    }

    /// Whether the failure is an expected acquisition gap.
    ///
    /// Missing or undecodable tiles happen in normal runs; shape, worker and
    /// configuration errors point at a bug and are logged as errors.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GreenViewError::ImageLoad { .. } | GreenViewError::TileUnavailable { .. }
        )
    }
}

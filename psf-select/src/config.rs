//! Star selector configuration
//!
//! Plain serde structs with defaults matching a ground-based survey camera.
//! Stored as JSON when persisted.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::histogram::HistogramConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parameters of the second-moment star selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// PSF kernel size in pixels
    pub kernel_size: usize,
    /// Border added on every side of the kernel in candidate stamps
    pub border_width: usize,
    /// Clump acceptance radius; sources need dist² < 2·clump_n_sigma
    pub clump_n_sigma: f64,
    /// Minimum PSF flux of a usable source
    pub flux_lim: Option<f64>,
    /// Maximum PSF flux of a usable source; 0 disables the cut
    pub flux_max: f64,
    /// Poisson margin, in sigma, below the highest histogram bin; must be positive
    pub histogram_sigma: f64,
    /// Moment histogram layout
    pub histogram: HistogramConfig,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            kernel_size: 21,
            border_width: 0,
            clump_n_sigma: 2.0,
            flux_lim: Some(5000.0),
            flux_max: 0.0,
            histogram_sigma: 1.0,
            histogram: HistogramConfig::default(),
        }
    }
}

impl SelectorConfig {
    /// Width and height of candidate stamps
    pub fn candidate_size(&self) -> usize {
        self.kernel_size + 2 * self.border_width
    }

    /// Check that every parameter is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kernel_size == 0 {
            return Err(ConfigError::Invalid("kernel_size must be positive".into()));
        }
        if !(self.clump_n_sigma.is_finite() && self.clump_n_sigma > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "clump_n_sigma must be positive, got {}",
                self.clump_n_sigma
            )));
        }
        if let Some(lim) = self.flux_lim {
            if !lim.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "flux_lim must be finite, got {lim}"
                )));
            }
        }
        if !(self.flux_max.is_finite() && self.flux_max >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "flux_max must be non-negative, got {}",
                self.flux_max
            )));
        }
        if let (Some(lim), max) = (self.flux_lim, self.flux_max) {
            if max != 0.0 && max < lim {
                return Err(ConfigError::Invalid(format!(
                    "flux_max {max} is below flux_lim {lim}"
                )));
            }
        }
        // At zero the threshold equals the highest bin and nothing is strictly above it
        if !(self.histogram_sigma.is_finite() && self.histogram_sigma > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "histogram_sigma must be positive, got {}",
                self.histogram_sigma
            )));
        }
        let h = &self.histogram;
        if h.x_size == 0 || h.y_size == 0 {
            return Err(ConfigError::Invalid(format!(
                "histogram size must be positive, got {}x{}",
                h.x_size, h.y_size
            )));
        }
        if !(h.x_max.is_finite() && h.x_max > 0.0 && h.y_max.is_finite() && h.y_max > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "histogram moment range must be positive, got {}x{}",
                h.x_max, h.y_max
            )));
        }
        Ok(())
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file and validate
    ///
    /// Missing fields take their default values.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

//! Resolver and trigger configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::section::SectionId;

/// Fraction of the viewport height, centered, in which observed sections
/// report crossings. The remaining 90% is trimmed equally from the top and
/// the bottom.
pub const DEFAULT_FOCAL_FRACTION: f64 = 0.10;

/// Intersection-ratio thresholds at which an observed section reports.
pub const DEFAULT_THRESHOLDS: [f64; 5] = [0.0, 0.1, 0.25, 0.5, 0.75];

/// Invalid scroll configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Focal band fraction outside `(0, 1]`.
    #[error("focal band fraction must be in (0, 1], got {0}")]
    FocalFraction(f64),

    /// Threshold outside `[0, 1]`.
    #[error("intersection threshold must be in [0, 1], got {0}")]
    Threshold(f64),

    /// No thresholds at all.
    #[error("at least one intersection threshold is required")]
    NoThresholds,
}

/// Configuration for section activation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ScrollConfig {
    /// Section reported before any anchor resolves.
    /// Defaults to the first tracked section.
    pub default_section: Option<SectionId>,

    /// Height of the focal band as a fraction of the viewport.
    pub focal_fraction: f64,

    /// Intersection-ratio thresholds for the observation strategy.
    pub thresholds: Vec<f64>,

    /// Force the polled strategy even when observation is available.
    pub force_polling: bool,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            default_section: None,
            focal_fraction: DEFAULT_FOCAL_FRACTION,
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            force_polling: false,
        }
    }
}

impl ScrollConfig {
    /// Set the default section.
    #[must_use]
    pub fn with_default_section(mut self, id: impl Into<SectionId>) -> Self {
        self.default_section = Some(id.into());
        self
    }

    /// Set the focal band fraction.
    #[must_use]
    pub fn with_focal_fraction(mut self, fraction: f64) -> Self {
        self.focal_fraction = fraction;
        self
    }

    /// Set the intersection thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Vec<f64>) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Always use the polled strategy.
    #[must_use]
    pub fn with_polling(mut self) -> Self {
        self.force_polling = true;
        self
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.focal_fraction > 0.0 && self.focal_fraction <= 1.0) {
            return Err(ConfigError::FocalFraction(self.focal_fraction));
        }
        if self.thresholds.is_empty() {
            return Err(ConfigError::NoThresholds);
        }
        if let Some(&bad) = self
            .thresholds
            .iter()
            .find(|t| !(0.0..=1.0).contains(*t))
        {
            return Err(ConfigError::Threshold(bad));
        }
        Ok(())
    }
}

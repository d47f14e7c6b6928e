use std::fs;
use std::path::Path;

use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};

use crate::detector::{DetectorConfig, TerminationCriteria};
use crate::optical_flow::FlowConfig;

/// What to do once pruning has removed every tracked point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTrackPolicy {
    /// Keep tracking nothing until a reinitialize command arrives
    Wait,
    /// Select new features on the next frame
    Reinitialize,
}

/// Tracking parameters, fixed for the whole run.
#[derive(Debug, Clone, PartialEq)]
#[derive(clap::Parser, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum number of features to track
    #[clap(long, default_value = "500")]
    pub max_feature_count: usize,

    /// Corner strength relative to the strongest corner of the frame
    #[clap(long, default_value = "0.01")]
    pub quality_level: f64,

    /// Minimum distance between two selected features, in pixels
    #[clap(long, default_value = "10")]
    pub min_distance: f64,

    /// Half size of the corner refinement window
    #[clap(long, default_value = "10")]
    pub sub_pix_window: usize,

    /// Side of the matching window, in pixels
    #[clap(long, default_value = "31")]
    pub search_window: usize,

    /// Coarse pyramid levels on top of the full image
    #[clap(long, default_value = "3")]
    pub pyramid_levels: usize,

    #[clap(long, default_value = "20")]
    pub max_iterations: usize,

    #[clap(long, default_value = "0.03")]
    pub convergence_epsilon: f64,

    /// Minimum eigenvalue of the matching window's gradient matrix
    #[clap(long, default_value = "0.001")]
    pub min_eigen_threshold: f64,

    /// Largest mean absolute difference of matched windows, in gray levels
    #[clap(long, default_value = "30")]
    pub max_residual: f64,

    /// Largest residual relative to the contrast of the matching window
    #[clap(long, default_value = "0.5")]
    pub max_relative_residual: f64,

    #[clap(long, value_enum, default_value = "wait")]
    pub empty_track_policy: EmptyTrackPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_feature_count: 500,
            quality_level: 0.01,
            min_distance: 10.,
            sub_pix_window: 10,
            search_window: 31,
            pyramid_levels: 3,
            max_iterations: 20,
            convergence_epsilon: 0.03,
            min_eigen_threshold: 0.001,
            max_residual: 30.,
            max_relative_residual: 0.5,
            empty_track_policy: EmptyTrackPolicy::Wait,
        }
    }
}

impl TrackerConfig {
    /// Read a JSON config file, missing keys take their default
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Could not read config {}", path.display()))?;
        let config: TrackerConfig = serde_json::from_str(&text)
            .with_context(|| format!("Malformed config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.quality_level > 0. && self.quality_level <= 1.) {
            bail!("quality level must be in (0, 1], got {}", self.quality_level);
        }
        if !(self.min_distance >= 0.) {
            bail!("min distance must not be negative, got {}", self.min_distance);
        }
        if self.search_window < 3 {
            bail!("search window must be at least 3 pixels, got {}", self.search_window);
        }
        if self.pyramid_levels > 16 {
            bail!("at most 16 pyramid levels, got {}", self.pyramid_levels);
        }
        if self.max_iterations == 0 {
            bail!("max iterations must be positive");
        }
        if !(self.convergence_epsilon >= 0.) {
            bail!("convergence epsilon must not be negative");
        }
        if !(self.min_eigen_threshold >= 0.)
            || !(self.max_residual > 0.)
            || !(self.max_relative_residual > 0.)
        {
            bail!("thresholds must be positive");
        }
        Ok(())
    }

    pub fn criteria(&self) -> TerminationCriteria {
        TerminationCriteria {
            max_iterations: self.max_iterations,
            epsilon: self.convergence_epsilon,
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            max_count: self.max_feature_count,
            quality_level: self.quality_level,
            min_distance: self.min_distance,
            sub_pix_window: self.sub_pix_window,
            criteria: self.criteria(),
        }
    }

    pub fn flow_config(&self) -> FlowConfig {
        FlowConfig {
            search_window: self.search_window,
            pyramid_levels: self.pyramid_levels,
            criteria: self.criteria(),
            min_eigen_threshold: self.min_eigen_threshold,
            max_residual: self.max_residual,
            max_relative_residual: self.max_relative_residual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_flag_defaults_match_default() {
        let parsed = TrackerConfig::parse_from(["flow-avoidance"]);
        assert_eq!(parsed, TrackerConfig::default());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_flags() {
        let parsed = TrackerConfig::parse_from([
            "flow-avoidance",
            "--max-feature-count",
            "100",
            "--pyramid-levels",
            "2",
            "--empty-track-policy",
            "reinitialize",
        ]);
        assert_eq!(parsed.max_feature_count, 100);
        assert_eq!(parsed.flow_config().pyramid_levels, 2);
        assert_eq!(parsed.empty_track_policy, EmptyTrackPolicy::Reinitialize);
    }

    #[test]
    fn test_partial_json() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"min_distance": 4, "empty_track_policy": "reinitialize"}"#)
                .unwrap();
        assert_eq!(config.min_distance, 4.);
        assert_eq!(config.empty_track_policy, EmptyTrackPolicy::Reinitialize);
        assert_eq!(config.search_window, 31);
    }

    #[test]
    fn test_validate() {
        let mut config = TrackerConfig::default();
        config.quality_level = 0.;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.search_window = 1;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.convergence_epsilon = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.max_relative_residual = 0.;
        assert!(config.validate().is_err());
    }
}

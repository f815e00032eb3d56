//! Tunables for every refinement stage.
//!
//! All sections deserialize with defaults, so a config file only needs the
//! values it changes.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::RefineError;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    /// Stop when the mean squared exposure change per frame drops below this.
    pub tolerance: f32,
    pub max_iterations: usize,
    /// Image channel sampled for brightness, `0..3`.
    pub channel: usize,
}

impl ExposureConfig {
    pub const CHANNELS: usize = 3;
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 10_000,
            channel: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    /// Live density at or above which a point is pruned.
    pub threshold: f32,
    /// Ceiling applied to every normalized density.
    pub ceiling: f32,
    /// Stop when the mean squared density change drops below this.
    pub tolerance: f32,
    pub max_iterations: usize,
    /// The filter radius is the latest alpha divided by this.
    pub alpha_divisor: f32,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            ceiling: 2.0,
            tolerance: 1e-6,
            max_iterations: 1_000,
            alpha_divisor: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub seed: u64,
    /// Expected number of stop votes per sweep over the mesh area.
    pub expected_misses: f32,
    /// Flat weight added to cameras that are already a main camera.
    pub main_reuse_bonus: f32,
    /// Flat weight added to sides already paired with the chosen main.
    pub side_reuse_bonus: f32,
    pub viewer_focal: f32,
    pub viewer_near: f32,
    pub viewer_far: f32,
    /// Upper bound on face draws per selection.
    pub max_samples: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            expected_misses: 1.0,
            main_reuse_bonus: 50.0,
            side_reuse_bonus: 5.0,
            viewer_focal: 0.25,
            viewer_near: 0.001,
            viewer_far: 10.0,
            max_samples: 100_000,
        }
    }
}

/// Which main/side pairs a pass triangulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PairPolicy {
    /// Only the first side of the first main camera.
    #[default]
    FirstPair,
    /// Every main camera with every one of its sides.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub pair_policy: PairPolicy,
    /// Hard cap on passes, whatever the convergence criterion says.
    pub max_passes: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            pair_policy: PairPolicy::FirstPair,
            max_passes: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct RefineConfig {
    pub exposure: ExposureConfig,
    pub density: DensityConfig,
    pub selector: SelectorConfig,
    #[serde(rename = "loop")]
    pub refinement: LoopConfig,
}

impl RefineConfig {
    pub fn from_json(text: &str) -> Result<Self, RefineError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RefineError> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break a stage at run time.
    pub fn validate(&self) -> Result<(), RefineError> {
        if self.exposure.channel >= ExposureConfig::CHANNELS {
            return Err(RefineError::InvalidConfig(format!(
                "exposure.channel is {} but images have {} channels",
                self.exposure.channel,
                ExposureConfig::CHANNELS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = RefineConfig::from_json(
            r#"{"selector": {"seed": 7}, "loop": {"pair_policy": "all"}}"#,
        )
        .unwrap();
        assert_eq!(config.selector.seed, 7);
        assert_eq!(config.selector.main_reuse_bonus, 50.0);
        assert_eq!(config.refinement.pair_policy, PairPolicy::All);
        assert_eq!(config.density, DensityConfig::default());
    }

    #[test]
    fn test_empty_config() {
        assert_eq!(RefineConfig::from_json("{}").unwrap(), RefineConfig::default());
    }

    #[test]
    fn test_out_of_range_channel_is_rejected() {
        let result = RefineConfig::from_json(r#"{"exposure": {"channel": 3}}"#);
        match result {
            Err(RefineError::InvalidConfig(message)) => assert!(message.contains("exposure.channel")),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
        let config = RefineConfig::from_json(r#"{"exposure": {"channel": 2}}"#).unwrap();
        assert_eq!(config.exposure.channel, 2);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            RefineConfig::from_json(r#"{"density": {"threshold": "high"}}"#),
            Err(RefineError::Config(_))
        ));
    }
}

//! Configuration of the pattern generators.
//!
//! All tunables live in one [`WalkConfig`] aggregate that can be loaded from
//! and stored to a toml file. Every section has sensible defaults for a
//! mid-sized humanoid, so a partial file is enough.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from `{path}`")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write config to `{path}`")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to serialize config")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to deserialize config")]
    Deserialize(#[from] toml::de::Error),
}

/// Timing of the control loop and the gait phases.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Period of the control loop, in seconds.
    pub sampling_period: f64,
    /// Default single support duration.
    pub single_support_duration: f64,
    /// Default double support duration.
    pub double_support_duration: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sampling_period: 0.005,
            single_support_duration: 0.7,
            double_support_duration: 0.1,
        }
    }
}

/// The linearized inverted pendulum the trajectories are generated for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PendulumConfig {
    /// Height of the center of mass above the ground.
    pub com_height: f64,
    /// Gravity.
    pub gravity: f64,
}

impl Default for PendulumConfig {
    fn default() -> Self {
        Self {
            com_height: 0.814,
            gravity: 9.81,
        }
    }
}

/// Geometry of the feet and of the stance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct FeetConfig {
    /// Half width of the sole.
    pub sole_half_width: f64,
    /// Half length of the sole.
    pub sole_half_length: f64,
    /// Distance from the ankle to the back edge of the sole.
    pub back: f64,
    /// Height of the ankle above the sole.
    pub height: f64,
    /// Distance from the ankle to the front edge of the sole.
    pub front: f64,
    /// Lateral distance between the feet while standing.
    pub double_support_distance: f64,
    /// Lateral distance between the feet when the walk ends.
    pub final_stance_distance: f64,
    /// How high the swing foot is lifted.
    pub step_height: f64,
    /// Shrinkage of the pressure polygon along x.
    pub security_margin_x: f64,
    /// Shrinkage of the pressure polygon along y.
    pub security_margin_y: f64,
}

impl Default for FeetConfig {
    fn default() -> Self {
        Self {
            sole_half_width: 0.07,
            sole_half_length: 0.12,
            back: 0.1,
            height: 0.105,
            front: 0.13,
            double_support_distance: 0.2,
            final_stance_distance: 0.2,
            step_height: 0.05,
            security_margin_x: 0.04,
            security_margin_y: 0.04,
        }
    }
}

/// Shape of the rolling-horizon optimization.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PreviewConfig {
    /// Period between two previewed samples.
    pub period: f64,
    /// Number of previewed samples.
    pub horizon: usize,
    /// Weight on the jerk of the center of mass.
    pub jerk_weight: f64,
    /// Weight on tracking the reference velocity.
    pub velocity_weight: f64,
    /// Weight on keeping the pressure point centered under the stance foot.
    pub centering_weight: f64,
    /// Reference speeds below this mean "stand still".
    pub stationary_threshold: f64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            period: 0.1,
            horizon: 16,
            jerk_weight: 1e-6,
            velocity_weight: 1.0,
            centering_weight: 1e-3,
            stationary_threshold: 1e-3,
        }
    }
}

/// All tunables of the walking pattern generation.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct WalkConfig {
    pub timing: TimingConfig,
    pub pendulum: PendulumConfig,
    pub feet: FeetConfig,
    pub preview: PreviewConfig,
}

impl WalkConfig {
    /// The relative path this config is conventionally stored at.
    pub const PATH: &'static str = "config/walking.toml";

    /// Natural pulsation of the pendulum, `√(g / h)`.
    #[must_use]
    pub fn omega(&self) -> f64 {
        (self.pendulum.gravity / self.pendulum.com_height).sqrt()
    }

    /// Load the configuration from a toml file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Ok(toml::from_str(&contents)?)
    }

    /// Store the configuration in a toml file at the given path.
    pub fn store(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}

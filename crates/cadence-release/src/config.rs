use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::vsync::ChangeFrameRateStrategy;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseConfigInput {
    pub version: u32,
    pub allowed_joining_time_ms: Option<i64>,
    pub release_first_frame_before_started: Option<bool>,
    pub change_frame_rate_strategy: Option<ChangeFrameRateStrategy>,
    pub playback_speed: Option<f32>,
}

/// Resolved release control configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseConfig {
    pub version: u32,
    /// How long the control may pretend to be ready while joining an
    /// ongoing playback. `None` disables joining.
    pub allowed_joining_time: Option<Duration>,
    /// Passed to `on_enabled` by renderers that honour it.
    pub release_first_frame_before_started: bool,
    pub change_frame_rate_strategy: ChangeFrameRateStrategy,
    pub playback_speed: f32,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            allowed_joining_time: None,
            release_first_frame_before_started: false,
            change_frame_rate_strategy: ChangeFrameRateStrategy::default(),
            playback_speed: 1.0,
        }
    }
}

impl ReleaseConfigInput {
    pub fn resolve(self) -> Result<ReleaseConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let defaults = ReleaseConfig::default();

        let playback_speed = self.playback_speed.unwrap_or(defaults.playback_speed);
        if !playback_speed.is_finite() || playback_speed <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "playback_speed must be positive, got {playback_speed}"
            )));
        }

        // Non-positive joining time disables joining.
        let allowed_joining_time = self
            .allowed_joining_time_ms
            .filter(|ms| *ms > 0)
            .map(|ms| Duration::from_millis(ms as u64));

        Ok(ReleaseConfig {
            version,
            allowed_joining_time,
            release_first_frame_before_started: self
                .release_first_frame_before_started
                .unwrap_or(defaults.release_first_frame_before_started),
            change_frame_rate_strategy: self
                .change_frame_rate_strategy
                .unwrap_or(defaults.change_frame_rate_strategy),
            playback_speed,
        })
    }
}

impl ReleaseConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(ReleaseConfig::default());
        }
        let parsed: ReleaseConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    /// Joining time in milliseconds as taken by
    /// [`ReleaseControl::new`](crate::control::ReleaseControl::new); 0 when disabled.
    pub fn allowed_joining_time_ms(&self) -> i64 {
        self.allowed_joining_time
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

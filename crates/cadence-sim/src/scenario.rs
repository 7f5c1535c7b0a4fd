use std::collections::HashMap;

use anyhow::{ensure, Context, Result};
use cadence_release::config::ReleaseConfigInput;
use cadence_release::ReleaseConfig;
use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use serde::Deserialize;

/// Configuration for a deterministic playback scenario.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub seed: u64,
    /// Content frame rate.
    pub fps: f64,
    pub frame_count: u64,
    /// Every n-th frame is a keyframe, starting with frame 0.
    pub keyframe_interval: u64,
    pub refresh_rate_hz: f64,
    /// Render loop period.
    pub tick_ms: u64,
    /// When playback starts advancing. Frames may be decoded before.
    pub start_at_ms: u64,
    /// Call `join()` at start.
    pub join_on_start: bool,
    /// Decoded frames the decoder may hold ahead of the renderer.
    pub queue_depth: usize,
    /// Decoder throughput as a multiple of realtime.
    pub decode_speed: f64,
    /// Extra per-frame decode time, uniformly drawn from `[0, decode_jitter_ms)`.
    pub decode_jitter_ms: f64,
    pub stalls: Vec<StallConfig>,
    pub seeks: Vec<SeekConfig>,
    /// Release control settings.
    pub release: ReleaseConfigInput,
}

/// Decoder stall: decoding frame `at_frame` takes `duration_ms` longer.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StallConfig {
    pub at_frame: u64,
    pub duration_ms: u64,
}

/// Seek issued at wall time `at_ms` to media time `to_ms`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeekConfig {
    pub at_ms: u64,
    pub to_ms: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            seed: 1,
            fps: 30.0,
            frame_count: 300,
            keyframe_interval: 30,
            refresh_rate_hz: 60.0,
            tick_ms: 10,
            start_at_ms: 0,
            join_on_start: false,
            queue_depth: 4,
            decode_speed: 4.0,
            decode_jitter_ms: 0.0,
            stalls: Vec::new(),
            seeks: Vec::new(),
            release: ReleaseConfigInput::default(),
        }
    }
}

impl ScenarioConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let cfg: ScenarioConfig = toml::from_str(input).context("invalid scenario TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.fps > 0.0 && self.fps.is_finite(), "fps must be positive");
        ensure!(self.frame_count > 0, "frame_count must be positive");
        ensure!(self.keyframe_interval > 0, "keyframe_interval must be positive");
        ensure!(
            self.refresh_rate_hz > 0.0 && self.refresh_rate_hz.is_finite(),
            "refresh_rate_hz must be positive"
        );
        ensure!(self.tick_ms > 0, "tick_ms must be positive");
        ensure!(self.queue_depth > 0, "queue_depth must be positive");
        ensure!(
            self.decode_speed > 0.0 && self.decode_speed.is_finite(),
            "decode_speed must be positive"
        );
        ensure!(self.decode_jitter_ms >= 0.0, "decode_jitter_ms must not be negative");
        self.release_config()?;
        Ok(())
    }

    pub fn release_config(&self) -> Result<ReleaseConfig> {
        Ok(self.release.clone().resolve()?)
    }

    pub fn frame_duration_us(&self) -> i64 {
        (1_000_000.0 / self.fps).round() as i64
    }

    pub fn presentation_time_us(&self, index: u64) -> i64 {
        (index as f64 * 1_000_000.0 / self.fps).round() as i64
    }

    pub fn is_keyframe(&self, index: u64) -> bool {
        index % self.keyframe_interval == 0
    }

    /// Index of the last keyframe at or before `index`.
    pub fn keyframe_at_or_before(&self, index: u64) -> u64 {
        index - index % self.keyframe_interval
    }

    /// Index of the first frame whose presentation time is at or after `position_us`.
    pub fn frame_at_or_after(&self, position_us: i64) -> u64 {
        let idx = (position_us.max(0) as f64 * self.fps / 1_000_000.0).ceil() as u64;
        idx.min(self.frame_count)
    }
}

/// Seeded per-frame decode cost model.
#[derive(Debug)]
pub struct DecodeCostModel {
    base_us: i64,
    jitter_us: f64,
    stalls: HashMap<u64, i64>,
    rng: StdRng,
}

impl DecodeCostModel {
    pub fn new(cfg: &ScenarioConfig) -> Self {
        let mut stalls = HashMap::new();
        for stall in &cfg.stalls {
            *stalls.entry(stall.at_frame).or_insert(0) += stall.duration_ms as i64 * 1_000;
        }
        DecodeCostModel {
            base_us: (cfg.frame_duration_us() as f64 / cfg.decode_speed).round() as i64,
            jitter_us: cfg.decode_jitter_ms * 1_000.0,
            stalls,
            rng: StdRng::seed_from_u64(cfg.seed),
        }
    }

    /// Time to decode frame `index`, in µs.
    pub fn cost_us(&mut self, index: u64) -> i64 {
        let jitter = if self.jitter_us > 0.0 {
            (self.rng.random::<f64>() * self.jitter_us) as i64
        } else {
            0
        };
        self.base_us + jitter + self.stalls.get(&index).copied().unwrap_or(0)
    }
}

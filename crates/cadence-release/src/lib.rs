//! # cadence-release
//!
//! Video frame release control for a playback render loop.
//!
//! Given a decoded frame's presentation time, the current playback position
//! and a wall clock sample, [`control::ReleaseControl`] decides whether the
//! frame is released now, scheduled for a vsync-aligned instant, dropped,
//! skipped, or left for a later loop iteration.
//!
//! ## Crate structure
//!
//! - [`control`] — Release control state machine and per-frame decision
//! - [`evaluator`] — Pluggable late/very-late/force-release policy
//! - [`vsync`] — Display vsync adjustment seam
//! - [`clock`] — Injectable wall clock (real and fake)
//! - [`config`] — TOML configuration
//! - [`error`] — Configuration errors

pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod evaluator;
pub mod vsync;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::ReleaseConfig;
pub use control::{FirstFrameState, FrameReleaseAction, FrameReleaseInfo, ReleaseControl};
pub use error::ConfigError;
pub use evaluator::{DefaultFrameTimingEvaluator, FrameTimingEvaluator};
pub use vsync::{ChangeFrameRateStrategy, PassthroughAdjuster, SurfaceHandle, VsyncAdjuster};

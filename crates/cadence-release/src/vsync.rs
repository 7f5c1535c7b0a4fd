//! # Vsync Adjustment
//!
//! The release control never talks to the display directly. It hands the
//! desired release instant to a [`VsyncAdjuster`], which snaps it onto a
//! time the display will actually refresh at, and keeps the adjuster
//! informed of lifecycle, surface, frame-rate and speed changes so it can
//! track the content cadence.

use serde::Deserialize;

/// Opaque identifier of the output surface frames are released to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// Whether the adjuster may ask the display to change its refresh rate
/// to match the content frame rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeFrameRateStrategy {
    /// Only change the refresh rate when the switch is seamless.
    #[default]
    OnlyIfSeamless,
    /// Never change the refresh rate.
    Off,
}

/// Display-alignment collaborator of the release control.
///
/// `adjust_release_time` must stay within a bounded distance of its input
/// and return the same value for the same input unless one of the
/// notification methods has been called in between.
pub trait VsyncAdjuster: Send {
    /// Snap `release_time_ns` (same timebase as
    /// [`Clock::nano_time`](crate::clock::Clock::nano_time)) to a
    /// display-aligned instant.
    fn adjust_release_time(&mut self, release_time_ns: i64) -> i64;

    fn on_started(&mut self) {}

    fn on_stopped(&mut self) {}

    fn on_surface_changed(&mut self, _surface: Option<SurfaceHandle>) {}

    /// The content frame rate changed.
    fn on_format_changed(&mut self, _frame_rate: f32) {}

    fn on_playback_speed_changed(&mut self, _speed: f32) {}

    /// A frame with a new presentation time is about to be evaluated.
    fn on_next_frame(&mut self, _presentation_time_us: i64) {}

    /// Playback position jumped (seek); cadence tracking must restart.
    fn on_position_reset(&mut self) {}

    fn set_change_frame_rate_strategy(&mut self, _strategy: ChangeFrameRateStrategy) {}
}

/// Adjuster that releases frames exactly when asked.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughAdjuster;

impl VsyncAdjuster for PassthroughAdjuster {
    fn adjust_release_time(&mut self, release_time_ns: i64) -> i64 {
        release_time_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_is_identity() {
        let mut adjuster = PassthroughAdjuster;
        for t in [i64::MIN, -1, 0, 16_666_667, i64::MAX] {
            assert_eq!(adjuster.adjust_release_time(t), t);
        }
    }

    #[test]
    fn strategy_parses_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            strategy: ChangeFrameRateStrategy,
        }
        let w: Wrapper = toml::from_str(r#"strategy = "only-if-seamless""#).unwrap();
        assert_eq!(w.strategy, ChangeFrameRateStrategy::OnlyIfSeamless);
        let w: Wrapper = toml::from_str(r#"strategy = "off""#).unwrap();
        assert_eq!(w.strategy, ChangeFrameRateStrategy::Off);
        assert!(toml::from_str::<Wrapper>(r#"strategy = "always""#).is_err());
    }
}

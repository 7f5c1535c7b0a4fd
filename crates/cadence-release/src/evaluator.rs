//! # Frame Timing Evaluation
//!
//! Policy consulted by the release control once it knows how early (or
//! late) a frame is. The policy is stateless and can be swapped on a live
//! [`ReleaseControl`](crate::control::ReleaseControl) without touching any
//! other state.

/// Earliness below which a frame is late, in µs.
pub const MIN_EARLY_US_LATE_THRESHOLD: i64 = -30_000;

/// Earliness below which a frame is very late, in µs.
pub const MIN_EARLY_US_VERY_LATE_THRESHOLD: i64 = -500_000;

/// Largest earliness at which a frame is handed to the display, in µs.
/// Frames earlier than this are re-evaluated on a later loop iteration.
pub const MAX_EARLY_US_THRESHOLD: i64 = 50_000;

/// Minimum gap between releases before a late frame is force released, in µs.
pub const FORCE_RELEASE_INTERVAL_US: i64 = 100_000;

/// Decides whether a frame is forced out, dropped, or dropped up to the
/// next keyframe.
///
/// `early_us` is the time until the frame should be presented; negative
/// means it is already late.
pub trait FrameTimingEvaluator: Send {
    /// Whether the frame should be released immediately regardless of its
    /// timing. `elapsed_since_last_release_us` is the wall-clock time since
    /// the previous release.
    fn should_force_release_frame(&self, early_us: i64, elapsed_since_last_release_us: i64)
        -> bool;

    /// Whether the frame should be dropped. `elapsed_realtime_us` is the
    /// wall clock sampled at the start of the current render loop iteration.
    fn should_drop_frame(&self, early_us: i64, elapsed_realtime_us: i64, is_last_frame: bool)
        -> bool;

    /// Whether every frame from this one up to the keyframe at or after the
    /// playback position should be dropped.
    fn should_drop_frames_to_keyframe(
        &self,
        early_us: i64,
        elapsed_realtime_us: i64,
        is_last_frame: bool,
    ) -> bool;
}

/// Default policy: drop late frames (< -30 ms), drop to keyframe when very
/// late (< -500 ms), and force a late frame out every 100 ms so the picture
/// never freezes. The last frame of a stream is never dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFrameTimingEvaluator;

impl FrameTimingEvaluator for DefaultFrameTimingEvaluator {
    fn should_force_release_frame(
        &self,
        early_us: i64,
        elapsed_since_last_release_us: i64,
    ) -> bool {
        early_us < MIN_EARLY_US_LATE_THRESHOLD
            && elapsed_since_last_release_us > FORCE_RELEASE_INTERVAL_US
    }

    fn should_drop_frame(&self, early_us: i64, _elapsed_realtime_us: i64, is_last_frame: bool) -> bool {
        early_us < MIN_EARLY_US_LATE_THRESHOLD && !is_last_frame
    }

    fn should_drop_frames_to_keyframe(
        &self,
        early_us: i64,
        _elapsed_realtime_us: i64,
        is_last_frame: bool,
    ) -> bool {
        early_us < MIN_EARLY_US_VERY_LATE_THRESHOLD && !is_last_frame
    }
}

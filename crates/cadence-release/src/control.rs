//! # Release Control
//!
//! Decides, for every decoded frame offered by the render loop, what the
//! renderer should do with it. The control is driven by two interacting
//! state machines.
//!
//! First-frame gating, ordered from most to least restrictive:
//!
//! ```text
//!                 on_disabled (from any state)
//!                            │
//!                            ▼
//!   NotRenderedOnlyIfStarted ──allow_release_first_frame_before_started──▶ NotRendered
//!                                                                              ▲
//!                                                   reset, set_output_surface  │
//!   NotRenderedAfterStreamChange ◀──on_processed_stream_change── Rendered ─────┘
//!
//!   any not-rendered state ──first release──▶ Rendered
//! ```
//!
//! `reset`, `set_output_surface`, `on_processed_stream_change` and
//! `on_disabled` only ever lower the state; `on_enabled` sets it outright.
//!
//! Joining: `join()` opens a deadline during which the control reports
//! ready even though no frame has been shown, late frames are skipped
//! instead of dropped, and force release is suspended.
//!
//! Per-frame decision pipeline:
//!
//! ```text
//!   earliness ─▶ force release? ─▶ too early / not started? ─▶ vsync adjust ─▶ evaluator
//!                  │                      │                                     │
//!           ReleaseImmediately      TryAgainLater          DropToKeyframe / Drop / ReleaseScheduled
//! ```

use std::fmt;

use crate::clock::{Clock, SystemClock};
use crate::config::ReleaseConfig;
use crate::evaluator::{DefaultFrameTimingEvaluator, FrameTimingEvaluator, MAX_EARLY_US_THRESHOLD};
use crate::vsync::{ChangeFrameRateStrategy, SurfaceHandle, VsyncAdjuster};

// ─── Actions ────────────────────────────────────────────────────────────────

/// What the renderer should do with the frame it asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameReleaseAction {
    /// Release the frame now.
    ReleaseImmediately,
    /// Release the frame at [`FrameReleaseInfo::release_time_ns`].
    ReleaseScheduled,
    /// Drop the frame.
    Drop,
    /// Drop frames up to the next keyframe.
    DropToKeyframe,
    /// Skip the frame (a drop that is not counted as one, used while joining).
    Skip,
    /// Skip frames up to the next keyframe.
    SkipToKeyframe,
    /// Keep the frame and ask again on a later loop iteration.
    TryAgainLater,
}

impl FrameReleaseAction {
    /// Whether the action hands the frame to the display.
    pub fn is_release(self) -> bool {
        matches!(
            self,
            FrameReleaseAction::ReleaseImmediately | FrameReleaseAction::ReleaseScheduled
        )
    }
}

/// Timing details of a release decision.
///
/// Both fields are only populated for [`FrameReleaseAction::ReleaseImmediately`]
/// and [`FrameReleaseAction::ReleaseScheduled`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReleaseInfo {
    early_us: Option<i64>,
    release_time_ns: Option<i64>,
}

impl FrameReleaseInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// How early the frame is relative to the playback position, in µs.
    /// For scheduled releases this reflects the vsync-adjusted release time.
    pub fn early_us(&self) -> Option<i64> {
        self.early_us
    }

    /// When the frame should be released, in [`Clock::nano_time`] units.
    pub fn release_time_ns(&self) -> Option<i64> {
        self.release_time_ns
    }

    fn reset(&mut self) {
        self.early_us = None;
        self.release_time_ns = None;
    }
}

// ─── First Frame State ──────────────────────────────────────────────────────

/// How the first frame after enable, seek, surface or stream change is gated.
///
/// Variants are ordered: a lower state is an earlier, more restrictive stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FirstFrameState {
    /// Not rendered; may only be released once playback has started.
    NotRenderedOnlyIfStarted,
    /// Not rendered; release as soon as possible.
    NotRendered,
    /// Not rendered since a stream change; release once the position reaches
    /// the new stream.
    NotRenderedAfterStreamChange,
    /// A frame has been rendered.
    Rendered,
}

// ─── Release Control ────────────────────────────────────────────────────────

/// Controls the release of video frames for one renderer.
pub struct ReleaseControl {
    adjuster: Box<dyn VsyncAdjuster>,
    evaluator: Box<dyn FrameTimingEvaluator>,
    clock: Box<dyn Clock>,
    /// Maximum time to pretend readiness while joining; `<= 0` disables joining.
    allowed_joining_time_ms: i64,

    started: bool,
    first_frame_state: FirstFrameState,
    /// First position seen since the last reset.
    initial_position_us: Option<i64>,
    last_release_realtime_us: i64,
    last_presentation_time_us: Option<i64>,
    joining_deadline_ms: Option<i64>,
    playback_speed: f32,
}

impl ReleaseControl {
    /// Create a control with the system clock and the default timing policy.
    pub fn new(allowed_joining_time_ms: i64, adjuster: impl VsyncAdjuster + 'static) -> Self {
        ReleaseControl {
            adjuster: Box::new(adjuster),
            evaluator: Box::new(DefaultFrameTimingEvaluator),
            clock: Box::new(SystemClock::new()),
            allowed_joining_time_ms,

            started: false,
            first_frame_state: FirstFrameState::NotRenderedOnlyIfStarted,
            initial_position_us: None,
            last_release_realtime_us: 0,
            last_presentation_time_us: None,
            joining_deadline_ms: None,
            playback_speed: 1.0,
        }
    }

    /// Create a control from a resolved configuration.
    pub fn from_config(config: &ReleaseConfig, adjuster: impl VsyncAdjuster + 'static) -> Self {
        let mut control = Self::new(config.allowed_joining_time_ms(), adjuster);
        control.set_change_frame_rate_strategy(config.change_frame_rate_strategy);
        if config.playback_speed != 1.0 {
            control.set_playback_speed(config.playback_speed);
        }
        control
    }

    // ─── Collaborators ──────────────────────────────────────────────────

    pub fn set_frame_timing_evaluator(&mut self, evaluator: impl FrameTimingEvaluator + 'static) {
        self.evaluator = Box::new(evaluator);
    }

    pub fn set_clock(&mut self, clock: impl Clock + 'static) {
        self.clock = Box::new(clock);
    }

    pub fn set_change_frame_rate_strategy(&mut self, strategy: ChangeFrameRateStrategy) {
        tracing::debug!(?strategy, "change frame rate strategy");
        self.adjuster.set_change_frame_rate_strategy(strategy);
    }

    // ─── Getters ────────────────────────────────────────────────────────

    pub fn first_frame_state(&self) -> FirstFrameState {
        self.first_frame_state
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Wall-clock deadline of the current join, if joining.
    pub fn joining_deadline_ms(&self) -> Option<i64> {
        self.joining_deadline_ms
    }

    pub fn playback_speed(&self) -> f32 {
        self.playback_speed
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Called when the renderer is enabled.
    pub fn on_enabled(&mut self, release_first_frame_before_started: bool) {
        self.first_frame_state = if release_first_frame_before_started {
            FirstFrameState::NotRendered
        } else {
            FirstFrameState::NotRenderedOnlyIfStarted
        };
        tracing::debug!(state = ?self.first_frame_state, "release control enabled");
    }

    /// Called when the renderer is disabled.
    pub fn on_disabled(&mut self) {
        self.lower_first_frame_state(FirstFrameState::NotRenderedOnlyIfStarted);
        tracing::debug!("release control disabled");
    }

    /// Called when playback starts advancing.
    pub fn on_started(&mut self) {
        self.started = true;
        self.last_release_realtime_us = self.now_us();
        self.adjuster.on_started();
        tracing::debug!("release control started");
    }

    /// Called when playback stops advancing. Abandons any join.
    pub fn on_stopped(&mut self) {
        self.started = false;
        self.joining_deadline_ms = None;
        self.adjuster.on_stopped();
        tracing::debug!("release control stopped");
    }

    /// Called when the renderer has processed a change to a new stream.
    pub fn on_processed_stream_change(&mut self) {
        self.lower_first_frame_state(FirstFrameState::NotRenderedAfterStreamChange);
        tracing::debug!(state = ?self.first_frame_state, "stream change processed");
    }

    /// Called when frames go to a different output surface.
    pub fn set_output_surface(&mut self, surface: Option<SurfaceHandle>) {
        self.adjuster.on_surface_changed(surface);
        self.lower_first_frame_state(FirstFrameState::NotRendered);
        tracing::debug!(?surface, state = ?self.first_frame_state, "output surface changed");
    }

    /// Set the content frame rate.
    pub fn set_frame_rate(&mut self, frame_rate: f32) {
        tracing::debug!(frame_rate, "frame rate changed");
        self.adjuster.on_format_changed(frame_rate);
    }

    /// Record that a frame was released. Returns whether it was the first
    /// frame since the last enable, reset, surface or stream change.
    pub fn on_frame_released_is_first_frame(&mut self) -> bool {
        let first_frame = self.first_frame_state != FirstFrameState::Rendered;
        self.first_frame_state = FirstFrameState::Rendered;
        self.last_release_realtime_us = self.now_us();
        if first_frame {
            tracing::debug!("first frame rendered");
        }
        first_frame
    }

    /// Allow the first frame to be released before playback starts.
    pub fn allow_release_first_frame_before_started(&mut self) {
        if self.first_frame_state == FirstFrameState::NotRenderedOnlyIfStarted {
            self.first_frame_state = FirstFrameState::NotRendered;
        }
    }

    /// Whether playback may proceed, given whether the renderer itself is ready.
    pub fn is_ready(&mut self, renderer_ready: bool) -> bool {
        if renderer_ready && self.first_frame_state == FirstFrameState::Rendered {
            // Joined, if we were joining.
            self.joining_deadline_ms = None;
            return true;
        }
        let Some(deadline_ms) = self.joining_deadline_ms else {
            return false;
        };
        if self.clock.elapsed_realtime_ms() < deadline_ms {
            return true;
        }
        tracing::debug!(deadline_ms, "joining deadline exceeded");
        self.joining_deadline_ms = None;
        false
    }

    /// Start joining an ongoing playback.
    pub fn join(&mut self) {
        self.joining_deadline_ms = if self.allowed_joining_time_ms > 0 {
            Some(self.clock.elapsed_realtime_ms().saturating_add(self.allowed_joining_time_ms))
        } else {
            None
        };
        tracing::debug!(deadline_ms = ?self.joining_deadline_ms, "joining");
    }

    /// Set the playback speed. Non-finite or non-positive speeds are ignored.
    pub fn set_playback_speed(&mut self, speed: f32) {
        if !speed.is_finite() || speed <= 0.0 {
            tracing::warn!(speed, "ignoring invalid playback speed");
            return;
        }
        self.playback_speed = speed;
        self.adjuster.on_playback_speed_changed(speed);
        tracing::debug!(speed, "playback speed changed");
    }

    /// Reset position tracking, e.g. after a seek.
    pub fn reset(&mut self) {
        self.adjuster.on_position_reset();
        self.last_presentation_time_us = None;
        self.initial_position_us = None;
        self.lower_first_frame_state(FirstFrameState::NotRendered);
        self.joining_deadline_ms = None;
        tracing::debug!(state = ?self.first_frame_state, "release control reset");
    }

    // ─── Per-frame decision ─────────────────────────────────────────────

    /// Decide what to do with a frame.
    ///
    /// `position_us` and `elapsed_realtime_us` are sampled together at the
    /// start of the render loop iteration. `info` is cleared and then filled
    /// for the two release actions.
    pub fn get_frame_release_action(
        &mut self,
        presentation_time_us: i64,
        position_us: i64,
        elapsed_realtime_us: i64,
        output_stream_start_position_us: i64,
        is_last_frame: bool,
        info: &mut FrameReleaseInfo,
    ) -> FrameReleaseAction {
        info.reset();

        let initial_position_us = *self.initial_position_us.get_or_insert(position_us);
        if self.last_presentation_time_us != Some(presentation_time_us) {
            self.adjuster.on_next_frame(presentation_time_us);
            self.last_presentation_time_us = Some(presentation_time_us);
        }

        let early_us =
            self.calculate_early_time_us(position_us, elapsed_realtime_us, presentation_time_us);

        if self.should_force_release(position_us, early_us, output_stream_start_position_us) {
            info.early_us = Some(early_us);
            info.release_time_ns = Some(self.clock.nano_time());
            return trace_action(presentation_time_us, early_us, FrameReleaseAction::ReleaseImmediately);
        }
        if !self.started || position_us == initial_position_us || early_us > MAX_EARLY_US_THRESHOLD {
            return trace_action(presentation_time_us, early_us, FrameReleaseAction::TryAgainLater);
        }

        // Align the release to the display and re-derive earliness from it.
        let system_time_ns = self.clock.nano_time();
        let release_time_ns = self
            .adjuster
            .adjust_release_time(system_time_ns.saturating_add(early_us.saturating_mul(1_000)));
        let early_us = release_time_ns.saturating_sub(system_time_ns) / 1_000;

        // Late frames are skipped rather than dropped while joining.
        let treat_drop_as_skip = self.joining_deadline_ms.is_some();
        let action = if self
            .evaluator
            .should_drop_frames_to_keyframe(early_us, elapsed_realtime_us, is_last_frame)
        {
            if treat_drop_as_skip {
                FrameReleaseAction::SkipToKeyframe
            } else {
                FrameReleaseAction::DropToKeyframe
            }
        } else if self
            .evaluator
            .should_drop_frame(early_us, elapsed_realtime_us, is_last_frame)
        {
            if treat_drop_as_skip {
                FrameReleaseAction::Skip
            } else {
                FrameReleaseAction::Drop
            }
        } else {
            info.early_us = Some(early_us);
            info.release_time_ns = Some(release_time_ns);
            FrameReleaseAction::ReleaseScheduled
        };
        trace_action(presentation_time_us, early_us, action)
    }

    // ─── Internals ──────────────────────────────────────────────────────

    fn now_us(&self) -> i64 {
        self.clock.elapsed_realtime_ms() * 1_000
    }

    fn lower_first_frame_state(&mut self, state: FirstFrameState) {
        self.first_frame_state = self.first_frame_state.min(state);
    }

    /// Realtime that must elapse, while started, before the frame is due.
    /// Negative when already late.
    fn calculate_early_time_us(
        &self,
        position_us: i64,
        elapsed_realtime_us: i64,
        presentation_time_us: i64,
    ) -> i64 {
        // f64 keeps precision for large timestamps.
        let mut early_us =
            (presentation_time_us.saturating_sub(position_us) as f64 / self.playback_speed as f64) as i64;
        if self.started {
            // Time spent since the loop iteration sampled the position.
            early_us = early_us.saturating_sub(self.now_us().saturating_sub(elapsed_realtime_us));
        }
        early_us
    }

    fn should_force_release(
        &self,
        position_us: i64,
        early_us: i64,
        output_stream_start_position_us: i64,
    ) -> bool {
        if self.joining_deadline_ms.is_some() {
            return false;
        }
        match self.first_frame_state {
            FirstFrameState::NotRenderedOnlyIfStarted => self.started,
            FirstFrameState::NotRendered => true,
            FirstFrameState::NotRenderedAfterStreamChange => {
                position_us >= output_stream_start_position_us
            }
            FirstFrameState::Rendered => {
                let elapsed_since_last_release_us = self.now_us() - self.last_release_realtime_us;
                self.started
                    && self
                        .evaluator
                        .should_force_release_frame(early_us, elapsed_since_last_release_us)
            }
        }
    }
}

fn trace_action(
    presentation_time_us: i64,
    early_us: i64,
    action: FrameReleaseAction,
) -> FrameReleaseAction {
    tracing::trace!(presentation_time_us, early_us, ?action, "frame release decision");
    action
}

impl fmt::Debug for ReleaseControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseControl")
            .field("allowed_joining_time_ms", &self.allowed_joining_time_ms)
            .field("started", &self.started)
            .field("first_frame_state", &self.first_frame_state)
            .field("initial_position_us", &self.initial_position_us)
            .field("last_release_realtime_us", &self.last_release_realtime_us)
            .field("last_presentation_time_us", &self.last_presentation_time_us)
            .field("joining_deadline_ms", &self.joining_deadline_ms)
            .field("playback_speed", &self.playback_speed)
            .finish_non_exhaustive()
    }
}

//! # Integration tests: render loop ↔ ReleaseControl
//!
//! Drives the public API the way a renderer does, with a fake clock and an
//! adjuster that records every notification it receives.

use std::sync::{Arc, Mutex};

use cadence_release::{
    ChangeFrameRateStrategy, FakeClock, FirstFrameState, FrameReleaseAction, FrameReleaseInfo,
    FrameTimingEvaluator, ReleaseConfig, ReleaseControl, SurfaceHandle, VsyncAdjuster,
};

// ─── Helpers ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum AdjusterEvent {
    Adjust(i64),
    Started,
    Stopped,
    SurfaceChanged(Option<SurfaceHandle>),
    FormatChanged(f32),
    SpeedChanged(f32),
    NextFrame(i64),
    PositionReset,
    Strategy(ChangeFrameRateStrategy),
}

/// Records notifications and shifts every release time by `offset_ns`.
#[derive(Clone, Default)]
struct RecordingAdjuster {
    events: Arc<Mutex<Vec<AdjusterEvent>>>,
    offset_ns: i64,
}

impl RecordingAdjuster {
    fn with_offset(offset_ns: i64) -> Self {
        Self {
            offset_ns,
            ..Default::default()
        }
    }

    fn push(&self, event: AdjusterEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<AdjusterEvent> {
        self.events.lock().unwrap().clone()
    }

    fn next_frames(&self) -> Vec<i64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AdjusterEvent::NextFrame(pt) => Some(pt),
                _ => None,
            })
            .collect()
    }
}

impl VsyncAdjuster for RecordingAdjuster {
    fn adjust_release_time(&mut self, release_time_ns: i64) -> i64 {
        self.push(AdjusterEvent::Adjust(release_time_ns));
        release_time_ns + self.offset_ns
    }
    fn on_started(&mut self) {
        self.push(AdjusterEvent::Started);
    }
    fn on_stopped(&mut self) {
        self.push(AdjusterEvent::Stopped);
    }
    fn on_surface_changed(&mut self, surface: Option<SurfaceHandle>) {
        self.push(AdjusterEvent::SurfaceChanged(surface));
    }
    fn on_format_changed(&mut self, frame_rate: f32) {
        self.push(AdjusterEvent::FormatChanged(frame_rate));
    }
    fn on_playback_speed_changed(&mut self, speed: f32) {
        self.push(AdjusterEvent::SpeedChanged(speed));
    }
    fn on_next_frame(&mut self, presentation_time_us: i64) {
        self.push(AdjusterEvent::NextFrame(presentation_time_us));
    }
    fn on_position_reset(&mut self) {
        self.push(AdjusterEvent::PositionReset);
    }
    fn set_change_frame_rate_strategy(&mut self, strategy: ChangeFrameRateStrategy) {
        self.push(AdjusterEvent::Strategy(strategy));
    }
}

fn setup(allowed_joining_time_ms: i64, adjuster: RecordingAdjuster) -> (ReleaseControl, FakeClock) {
    let clock = FakeClock::new();
    let mut control = ReleaseControl::new(allowed_joining_time_ms, adjuster);
    control.set_clock(clock.clone());
    (control, clock)
}

/// Enable, start, and render a first frame at position 0.
fn render_first_frame(control: &mut ReleaseControl, clock: &FakeClock) {
    control.on_enabled(true);
    control.on_started();
    let mut info = FrameReleaseInfo::new();
    let action =
        control.get_frame_release_action(0, 0, clock.elapsed_realtime_us(), 0, false, &mut info);
    assert_eq!(action, FrameReleaseAction::ReleaseImmediately);
    assert!(control.on_frame_released_is_first_frame());
}

// ─── Collaborator notifications ─────────────────────────────────────────────

#[test]
fn lifecycle_is_forwarded_to_adjuster() {
    let adjuster = RecordingAdjuster::default();
    let (mut control, _) = setup(0, adjuster.clone());

    control.on_started();
    control.set_frame_rate(29.97);
    control.set_playback_speed(1.5);
    control.set_output_surface(Some(SurfaceHandle(7)));
    control.set_change_frame_rate_strategy(ChangeFrameRateStrategy::Off);
    control.reset();
    control.on_stopped();

    assert_eq!(
        adjuster.events(),
        vec![
            AdjusterEvent::Started,
            AdjusterEvent::FormatChanged(29.97),
            AdjusterEvent::SpeedChanged(1.5),
            AdjusterEvent::SurfaceChanged(Some(SurfaceHandle(7))),
            AdjusterEvent::Strategy(ChangeFrameRateStrategy::Off),
            AdjusterEvent::PositionReset,
            AdjusterEvent::Stopped,
        ]
    );
}

#[test]
fn next_frame_is_notified_once_per_presentation_time() {
    let adjuster = RecordingAdjuster::default();
    let (mut control, clock) = setup(0, adjuster.clone());
    control.on_enabled(false);
    let mut info = FrameReleaseInfo::new();

    // Retries of the same frame are not new frames.
    for _ in 0..3 {
        control.get_frame_release_action(33_333, 0, clock.elapsed_realtime_us(), 0, false, &mut info);
    }
    control.get_frame_release_action(66_666, 0, clock.elapsed_realtime_us(), 0, false, &mut info);
    assert_eq!(adjuster.next_frames(), vec![33_333, 66_666]);

    // After a reset the same presentation time counts as new again.
    control.reset();
    control.get_frame_release_action(66_666, 0, clock.elapsed_realtime_us(), 0, false, &mut info);
    assert_eq!(adjuster.next_frames(), vec![33_333, 66_666, 66_666]);
}

#[test]
fn scheduled_release_uses_adjusted_time() {
    // Display snaps releases 4ms later than requested.
    let adjuster = RecordingAdjuster::with_offset(4_000_000);
    let (mut control, clock) = setup(0, adjuster.clone());
    render_first_frame(&mut control, &clock);

    let mut info = FrameReleaseInfo::new();
    let action = control.get_frame_release_action(
        30_000,
        10_000,
        clock.elapsed_realtime_us(),
        0,
        false,
        &mut info,
    );
    assert_eq!(action, FrameReleaseAction::ReleaseScheduled);
    assert_eq!(info.release_time_ns(), Some(24_000_000));
    assert_eq!(info.early_us(), Some(24_000));
    assert!(adjuster.events().contains(&AdjusterEvent::Adjust(20_000_000)));
}

#[test]
fn adjustment_can_push_frame_into_drop() {
    // A late-but-tolerable frame becomes droppable once the display moves it.
    let adjuster = RecordingAdjuster::with_offset(-20_000_000);
    let (mut control, clock) = setup(0, adjuster);
    render_first_frame(&mut control, &clock);

    let mut info = FrameReleaseInfo::new();
    let action = control.get_frame_release_action(
        0,
        20_000,
        clock.elapsed_realtime_us(),
        0,
        false,
        &mut info,
    );
    assert_eq!(action, FrameReleaseAction::Drop);
    assert_eq!(info, FrameReleaseInfo::default());
}

// ─── Joining ────────────────────────────────────────────────────────────────

#[test]
fn join_scenario_five_seconds() {
    let (mut control, clock) = setup(5_000, RecordingAdjuster::default());
    control.join();

    clock.set_elapsed_realtime_ms(3_000);
    assert!(control.is_ready(false));
    clock.set_elapsed_realtime_ms(6_000);
    assert!(!control.is_ready(false));
    clock.set_elapsed_realtime_ms(6_500);
    assert!(!control.is_ready(false));

    control.join();
    assert!(control.is_ready(false));
}

#[test]
fn very_late_frame_drops_or_skips_to_keyframe() {
    let (mut control, clock) = setup(5_000, RecordingAdjuster::default());
    render_first_frame(&mut control, &clock);

    let mut info = FrameReleaseInfo::new();
    let now = clock.elapsed_realtime_us();
    let action = control.get_frame_release_action(400_000, 1_000_000, now, 0, false, &mut info);
    assert_eq!(action, FrameReleaseAction::DropToKeyframe);

    control.join();
    let action = control.get_frame_release_action(400_000, 1_000_000, now, 0, false, &mut info);
    assert_eq!(action, FrameReleaseAction::SkipToKeyframe);
}

#[test]
fn late_frame_drops_or_skips() {
    let (mut control, clock) = setup(5_000, RecordingAdjuster::default());
    render_first_frame(&mut control, &clock);

    let mut info = FrameReleaseInfo::new();
    let now = clock.elapsed_realtime_us();
    let action = control.get_frame_release_action(960_000, 1_000_000, now, 0, false, &mut info);
    assert_eq!(action, FrameReleaseAction::Drop);

    control.join();
    let action = control.get_frame_release_action(960_000, 1_000_000, now, 0, false, &mut info);
    assert_eq!(action, FrameReleaseAction::Skip);
}

#[test]
fn last_frame_is_released_even_when_late() {
    let (mut control, clock) = setup(0, RecordingAdjuster::default());
    render_first_frame(&mut control, &clock);

    let mut info = FrameReleaseInfo::new();
    let now = clock.elapsed_realtime_us();
    let action = control.get_frame_release_action(0, 1_000_000, now, 0, true, &mut info);
    assert_eq!(action, FrameReleaseAction::ReleaseScheduled);
    assert_eq!(info.early_us(), Some(-1_000_000));
}

// ─── Custom policy ──────────────────────────────────────────────────────────

/// Never drops, never forces.
struct KeepEverything;

impl FrameTimingEvaluator for KeepEverything {
    fn should_force_release_frame(&self, _: i64, _: i64) -> bool {
        false
    }
    fn should_drop_frame(&self, _: i64, _: i64, _: bool) -> bool {
        false
    }
    fn should_drop_frames_to_keyframe(&self, _: i64, _: i64, _: bool) -> bool {
        false
    }
}

#[test]
fn evaluator_can_be_replaced_mid_session() {
    let (mut control, clock) = setup(0, RecordingAdjuster::default());
    render_first_frame(&mut control, &clock);
    let mut info = FrameReleaseInfo::new();
    let now = clock.elapsed_realtime_us();

    let action = control.get_frame_release_action(0, 700_000, now, 0, false, &mut info);
    assert_eq!(action, FrameReleaseAction::DropToKeyframe);

    control.set_frame_timing_evaluator(KeepEverything);
    let action = control.get_frame_release_action(0, 700_000, now, 0, false, &mut info);
    assert_eq!(action, FrameReleaseAction::ReleaseScheduled);
    assert_eq!(control.first_frame_state(), FirstFrameState::Rendered);
    assert!(control.is_started());
}

// ─── Config ─────────────────────────────────────────────────────────────────

#[test]
fn control_from_config() {
    let cfg = ReleaseConfig::from_toml_str(
        r#"
            allowed_joining_time_ms = 2000
            change_frame_rate_strategy = "off"
            playback_speed = 2.0
        "#,
    )
    .unwrap();
    let adjuster = RecordingAdjuster::default();
    let clock = FakeClock::new();
    let mut control = ReleaseControl::from_config(&cfg, adjuster.clone());
    control.set_clock(clock.clone());

    assert_eq!(control.playback_speed(), 2.0);
    assert_eq!(
        adjuster.events(),
        vec![
            AdjusterEvent::Strategy(ChangeFrameRateStrategy::Off),
            AdjusterEvent::SpeedChanged(2.0),
        ]
    );

    control.join();
    assert_eq!(control.joining_deadline_ms(), Some(2_000));
}

//! # Render Loop Simulation
//!
//! A tick-driven model of a video renderer:
//!
//! ```text
//!   DecodeCostModel ─▶ decoder ─▶ output queue ─▶ render loop ─▶ ReleaseControl
//!                                                     │
//!                                         release / drop / skip / wait
//! ```
//!
//! Every tick the loop samples the playback position and wall clock once,
//! then offers queued frames to the release control in order until it asks
//! to try again later, exactly like a renderer draining decoder output.

use std::collections::VecDeque;

use anyhow::Result;
use cadence_release::{
    FakeClock, FrameReleaseAction, FrameReleaseInfo, ReleaseControl, SurfaceHandle,
};
use serde::Serialize;

use crate::scenario::{DecodeCostModel, ScenarioConfig};
use crate::vsync_grid::VsyncGrid;

/// Outcome of a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimReport {
    pub frames_total: u64,
    pub released_immediately: u64,
    pub released_scheduled: u64,
    pub dropped: u64,
    /// Frames discarded by drop-to-keyframe decisions, including the frame
    /// that triggered it.
    pub dropped_to_keyframe: u64,
    pub skipped: u64,
    pub skipped_to_keyframe: u64,
    /// Frames before a seek target, discarded without consulting the control.
    pub decode_only: u64,
    /// Frames the decoder jumped over while discarding to a keyframe.
    pub undecoded: u64,
    /// Wall time of the first release, in ms.
    pub first_frame_at_ms: Option<i64>,
    /// Ticks after start in which the control reported not ready.
    pub not_ready_ticks: u64,
    /// Largest lateness of a released frame, in µs.
    pub max_release_lateness_us: i64,
    pub ticks: u64,
}

impl SimReport {
    pub fn released(&self) -> u64 {
        self.released_immediately + self.released_scheduled
    }

    /// Every frame that left the queue without being shown.
    pub fn discarded(&self) -> u64 {
        self.dropped
            + self.dropped_to_keyframe
            + self.skipped
            + self.skipped_to_keyframe
            + self.decode_only
    }
}

#[derive(Debug, Clone, Copy)]
struct DecodedFrame {
    index: u64,
    presentation_time_us: i64,
    keyframe: bool,
}

/// Decoder with a bounded output queue.
#[derive(Debug)]
struct Decoder {
    costs: DecodeCostModel,
    queue: VecDeque<DecodedFrame>,
    next_index: u64,
    /// Completion time of frame `next_index`.
    ready_at_us: i64,
    /// Output was full when the pending frame completed.
    blocked: bool,
}

impl Decoder {
    fn new(cfg: &ScenarioConfig) -> Self {
        let mut costs = DecodeCostModel::new(cfg);
        let ready_at_us = costs.cost_us(0);
        Decoder {
            costs,
            queue: VecDeque::with_capacity(cfg.queue_depth),
            next_index: 0,
            ready_at_us,
            blocked: false,
        }
    }

    fn decode_until(&mut self, cfg: &ScenarioConfig, now_us: i64) {
        while self.next_index < cfg.frame_count && self.ready_at_us <= now_us {
            if self.queue.len() >= cfg.queue_depth {
                self.blocked = true;
                return;
            }
            let index = self.next_index;
            self.queue.push_back(DecodedFrame {
                index,
                presentation_time_us: cfg.presentation_time_us(index),
                keyframe: cfg.is_keyframe(index),
            });
            self.next_index += 1;
            // A blocked decoder resumes when space frees up, i.e. now.
            let start_us = if self.blocked { now_us } else { self.ready_at_us };
            self.blocked = false;
            self.ready_at_us = start_us + self.costs.cost_us(self.next_index);
        }
    }

    /// Restart decoding at `index`, discarding queued output.
    fn restart_at(&mut self, index: u64, now_us: i64) {
        self.queue.clear();
        self.next_index = index;
        self.blocked = false;
        self.ready_at_us = now_us + self.costs.cost_us(index);
    }

    /// Discard queued frames up to the next keyframe. If none is queued,
    /// the decoder jumps ahead to the next keyframe. Returns the number of
    /// queued frames discarded and the number of frames jumped over.
    fn discard_to_keyframe(&mut self, cfg: &ScenarioConfig, now_us: i64) -> (u64, u64) {
        let mut discarded = 0;
        while let Some(frame) = self.queue.front() {
            if frame.keyframe {
                return (discarded, 0);
            }
            self.queue.pop_front();
            discarded += 1;
        }
        if self.next_index >= cfg.frame_count || cfg.is_keyframe(self.next_index) {
            return (discarded, 0);
        }
        let next_keyframe = (cfg.keyframe_at_or_before(self.next_index) + cfg.keyframe_interval)
            .min(cfg.frame_count);
        let jumped = next_keyframe - self.next_index;
        self.restart_at(next_keyframe, now_us);
        (discarded, jumped)
    }

    fn is_exhausted(&self, cfg: &ScenarioConfig) -> bool {
        self.queue.is_empty() && self.next_index >= cfg.frame_count
    }
}

/// Media clock that advances with wall time while started.
#[derive(Debug, Clone, Copy)]
struct PlaybackPosition {
    base_position_us: i64,
    base_realtime_us: i64,
    speed: f64,
    started: bool,
}

impl PlaybackPosition {
    fn at(&self, now_us: i64) -> i64 {
        if self.started {
            self.base_position_us + ((now_us - self.base_realtime_us) as f64 * self.speed) as i64
        } else {
            self.base_position_us
        }
    }

    fn start(&mut self, now_us: i64) {
        self.base_realtime_us = now_us;
        self.started = true;
    }

    fn seek(&mut self, position_us: i64, now_us: i64) {
        self.base_position_us = position_us;
        self.base_realtime_us = now_us;
    }
}

/// A single deterministic playback run.
pub struct Simulation {
    cfg: ScenarioConfig,
    clock: FakeClock,
    control: ReleaseControl,
    decoder: Decoder,
    position: PlaybackPosition,
    /// Frames before this media time are decode-only after a seek.
    seek_target_us: Option<i64>,
    next_seek: usize,
    report: SimReport,
}

impl Simulation {
    pub fn new(cfg: ScenarioConfig) -> Result<Self> {
        cfg.validate()?;
        let release = cfg.release_config()?;

        let clock = FakeClock::new();
        let mut control = ReleaseControl::from_config(&release, VsyncGrid::new(cfg.refresh_rate_hz));
        control.set_clock(clock.clone());
        control.set_frame_rate(cfg.fps as f32);
        control.set_output_surface(Some(SurfaceHandle(1)));
        control.on_enabled(release.release_first_frame_before_started);

        let decoder = Decoder::new(&cfg);
        let position = PlaybackPosition {
            base_position_us: 0,
            base_realtime_us: 0,
            speed: release.playback_speed as f64,
            started: false,
        };
        let report = SimReport {
            frames_total: cfg.frame_count,
            ..Default::default()
        };

        Ok(Simulation {
            cfg,
            clock,
            control,
            decoder,
            position,
            seek_target_us: None,
            next_seek: 0,
            report,
        })
    }

    /// Upper bound on simulated wall time: the content at speed, plus start
    /// delay, seeks and stalls, plus slack.
    fn time_limit_us(&self) -> i64 {
        let content_us = self.cfg.presentation_time_us(self.cfg.frame_count) as f64
            / self.position.speed;
        let seeks_us: i64 = self.cfg.seeks.iter().map(|s| s.to_ms as i64 * 1_000).sum();
        let stalls_us: i64 = self.cfg.stalls.iter().map(|s| s.duration_ms as i64 * 1_000).sum();
        content_us as i64 + self.cfg.start_at_ms as i64 * 1_000 + seeks_us + stalls_us + 10_000_000
    }

    pub fn run(mut self) -> SimReport {
        let tick_ms = self.cfg.tick_ms;
        let limit_us = self.time_limit_us();
        tracing::info!(
            seed = self.cfg.seed,
            frames = self.cfg.frame_count,
            fps = self.cfg.fps,
            refresh_hz = self.cfg.refresh_rate_hz,
            "simulation starting"
        );

        loop {
            let now_us = self.clock.elapsed_realtime_us();
            if self.decoder.is_exhausted(&self.cfg) || now_us > limit_us {
                break;
            }
            self.tick(now_us);
            self.report.ticks += 1;
            self.clock.advance_ms(tick_ms);
        }

        self.control.on_stopped();
        tracing::info!(
            released = self.report.released(),
            discarded = self.report.discarded(),
            first_frame_at_ms = ?self.report.first_frame_at_ms,
            "simulation finished"
        );
        self.report
    }

    fn tick(&mut self, now_us: i64) {
        if !self.position.started && now_us >= self.cfg.start_at_ms as i64 * 1_000 {
            self.position.start(now_us);
            self.control.on_started();
            if self.cfg.join_on_start {
                self.control.join();
            }
        }
        self.maybe_seek(now_us);
        self.decoder.decode_until(&self.cfg, now_us);

        // Position and wall clock are sampled once per loop iteration.
        let position_us = self.position.at(now_us);
        let mut info = FrameReleaseInfo::new();
        while let Some(frame) = self.decoder.queue.front().copied() {
            if self.seek_target_us.is_some_and(|target| frame.presentation_time_us < target) {
                self.decoder.queue.pop_front();
                self.report.decode_only += 1;
                continue;
            }
            let is_last_frame = frame.index + 1 == self.cfg.frame_count;
            let action = self.control.get_frame_release_action(
                frame.presentation_time_us,
                position_us,
                now_us,
                0,
                is_last_frame,
                &mut info,
            );
            if !self.apply(action, &info, now_us) {
                break;
            }
        }

        // The renderer is ready while it holds a decoded frame.
        let renderer_ready = !self.decoder.queue.is_empty();
        if !self.control.is_ready(renderer_ready) && self.position.started {
            self.report.not_ready_ticks += 1;
        }
    }

    /// Apply a decision to the head frame. Returns whether the loop should
    /// offer the next frame.
    fn apply(&mut self, action: FrameReleaseAction, info: &FrameReleaseInfo, now_us: i64) -> bool {
        match action {
            FrameReleaseAction::ReleaseImmediately | FrameReleaseAction::ReleaseScheduled => {
                self.decoder.queue.pop_front();
                if action == FrameReleaseAction::ReleaseImmediately {
                    self.report.released_immediately += 1;
                } else {
                    self.report.released_scheduled += 1;
                }
                let lateness_us = -info.early_us().unwrap_or(0);
                self.report.max_release_lateness_us =
                    self.report.max_release_lateness_us.max(lateness_us);
                if self.control.on_frame_released_is_first_frame() {
                    tracing::debug!(at_us = now_us, "first frame released");
                    if self.report.first_frame_at_ms.is_none() {
                        self.report.first_frame_at_ms = Some(now_us / 1_000);
                    }
                }
                self.seek_target_us = None;
                true
            }
            FrameReleaseAction::Drop => {
                self.decoder.queue.pop_front();
                self.report.dropped += 1;
                true
            }
            FrameReleaseAction::Skip => {
                self.decoder.queue.pop_front();
                self.report.skipped += 1;
                true
            }
            FrameReleaseAction::DropToKeyframe | FrameReleaseAction::SkipToKeyframe => {
                self.decoder.queue.pop_front();
                let (queued, jumped) = self.decoder.discard_to_keyframe(&self.cfg, now_us);
                let discarded = 1 + queued;
                self.report.undecoded += jumped;
                tracing::debug!(discarded, jumped, ?action, "discarding to keyframe");
                if action == FrameReleaseAction::DropToKeyframe {
                    self.report.dropped_to_keyframe += discarded;
                } else {
                    self.report.skipped_to_keyframe += discarded;
                }
                true
            }
            FrameReleaseAction::TryAgainLater => false,
        }
    }

    fn maybe_seek(&mut self, now_us: i64) {
        let Some(seek) = self.cfg.seeks.get(self.next_seek) else {
            return;
        };
        if now_us < seek.at_ms as i64 * 1_000 {
            return;
        }
        let target_us = seek.to_ms as i64 * 1_000;
        self.next_seek += 1;

        let target_frame = self.cfg.frame_at_or_after(target_us);
        let start_frame = self.cfg.keyframe_at_or_before(target_frame.min(self.cfg.frame_count - 1));
        tracing::debug!(target_us, start_frame, "seeking");

        self.position.seek(target_us, now_us);
        self.control.reset();
        self.decoder.restart_at(start_frame, now_us);
        self.seek_target_us = Some(target_us);
    }
}

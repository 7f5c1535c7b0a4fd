//! Fixed-refresh display model.

use cadence_release::{ChangeFrameRateStrategy, SurfaceHandle, VsyncAdjuster};

/// Snaps release times to the nearest vsync of a display refreshing at a
/// fixed rate, with vsyncs at integer multiples of the period.
#[derive(Debug, Clone)]
pub struct VsyncGrid {
    period_ns: i64,
    frame_rate: Option<f32>,
    strategy: ChangeFrameRateStrategy,
    surface: Option<SurfaceHandle>,
}

impl VsyncGrid {
    pub fn new(refresh_rate_hz: f64) -> Self {
        let period_ns = (1_000_000_000.0 / refresh_rate_hz).round().max(1.0) as i64;
        VsyncGrid {
            period_ns,
            frame_rate: None,
            strategy: ChangeFrameRateStrategy::default(),
            surface: None,
        }
    }

    pub fn period_ns(&self) -> i64 {
        self.period_ns
    }

    /// Content frame rate last reported through `on_format_changed`.
    pub fn frame_rate(&self) -> Option<f32> {
        self.frame_rate
    }
}

impl VsyncAdjuster for VsyncGrid {
    fn adjust_release_time(&mut self, release_time_ns: i64) -> i64 {
        let half = self.period_ns / 2;
        release_time_ns
            .saturating_add(half)
            .div_euclid(self.period_ns)
            .saturating_mul(self.period_ns)
    }

    fn on_surface_changed(&mut self, surface: Option<SurfaceHandle>) {
        self.surface = surface;
    }

    fn on_format_changed(&mut self, frame_rate: f32) {
        self.frame_rate = Some(frame_rate);
        if self.strategy == ChangeFrameRateStrategy::OnlyIfSeamless {
            // A fixed panel never switches rate; only record the request.
            tracing::debug!(frame_rate, period_ns = self.period_ns, "display rate unchanged");
        }
    }

    fn on_position_reset(&mut self) {
        tracing::trace!("vsync grid position reset");
    }

    fn set_change_frame_rate_strategy(&mut self, strategy: ChangeFrameRateStrategy) {
        self.strategy = strategy;
    }
}

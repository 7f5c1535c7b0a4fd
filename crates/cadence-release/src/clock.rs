//! # Clocks
//!
//! All wall-clock access of the release control goes through [`Clock`]:
//! a coarse millisecond "elapsed realtime" used for deadlines and pacing,
//! and a monotonic nanosecond time used for release scheduling.
//!
//! [`SystemClock`] reads the TSC-backed [`quanta::Clock`]. [`FakeClock`]
//! wraps a mocked quanta clock that only moves when a test advances it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use quanta::{Instant, Mock};

/// Monotonic time source.
pub trait Clock: Send {
    /// Milliseconds elapsed since the clock's origin.
    fn elapsed_realtime_ms(&self) -> i64;

    /// Monotonic time in nanoseconds since the clock's origin.
    fn nano_time(&self) -> i64;
}

// ─── System Clock ───────────────────────────────────────────────────────────

/// Clock backed by [`quanta::Clock`], anchored at construction.
#[derive(Clone)]
pub struct SystemClock {
    clock: quanta::Clock,
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::from_quanta(quanta::Clock::new())
    }

    fn from_quanta(clock: quanta::Clock) -> Self {
        let origin = clock.now();
        SystemClock { clock, origin }
    }

    fn elapsed(&self) -> Duration {
        self.clock.now().duration_since(self.origin)
    }
}

impl fmt::Debug for SystemClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemClock")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed_realtime_ms(&self) -> i64 {
        self.elapsed().as_millis() as i64
    }

    fn nano_time(&self) -> i64 {
        self.elapsed().as_nanos() as i64
    }
}

// ─── Fake Clock ─────────────────────────────────────────────────────────────

/// Manually advanced clock for deterministic tests and simulation.
///
/// Clones share the same underlying time, so a test can keep one handle
/// and hand another to a [`ReleaseControl`](crate::control::ReleaseControl).
/// Time starts at zero.
#[derive(Clone)]
pub struct FakeClock {
    inner: SystemClock,
    mock: Arc<Mock>,
}

impl FakeClock {
    pub fn new() -> Self {
        let (clock, mock) = quanta::Clock::mock();
        FakeClock {
            inner: SystemClock::from_quanta(clock),
            mock,
        }
    }

    /// Advance time by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Advance time by `us` microseconds.
    pub fn advance_us(&self, us: u64) {
        self.advance(Duration::from_micros(us));
    }

    pub fn advance(&self, by: Duration) {
        self.mock.increment(by);
    }

    /// Move time forward to `ms` milliseconds after the origin.
    /// Never moves backward.
    pub fn set_elapsed_realtime_ms(&self, ms: i64) {
        let target_ns = ms.saturating_mul(1_000_000);
        let now_ns = self.nano_time();
        if target_ns > now_ns {
            self.advance(Duration::from_nanos((target_ns - now_ns) as u64));
        }
    }

    /// Current time in microseconds, convenient for building frame inputs.
    pub fn elapsed_realtime_us(&self) -> i64 {
        self.nano_time() / 1_000
    }
}

impl fmt::Debug for FakeClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeClock")
            .field("nano_time", &self.nano_time())
            .finish()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn elapsed_realtime_ms(&self) -> i64 {
        self.inner.elapsed_realtime_ms()
    }

    fn nano_time(&self) -> i64 {
        self.inner.nano_time()
    }
}

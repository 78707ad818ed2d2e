//! Host Platform
//!
//! The run loop never blocks and never spawns threads. It asks the host for
//! three kinds of wake-up (a timer, an animation frame, the next turn of the
//! event loop) and expects the host to call back into the matching
//! `RunLoop` entry point:
//!
//! | request                     | host calls back                   |
//! |-----------------------------|-----------------------------------|
//! | `schedule_timer(Some(t))`   | `RunLoop::did_fire_timer()`       |
//! | `request_frame()`           | `RunLoop::did_animate_frame(now)` |
//! | `request_next_event_loop()` | `RunLoop::flush_next_event_loop()`|

use std::cell::Cell;
use std::time::Instant;

/// Milliseconds on the platform clock.
pub type Millis = u64;

/// The services a host provides to the run loop.
pub trait Platform {
    /// Current time in milliseconds.
    fn now(&self) -> Millis;

    /// Arrange for `RunLoop::did_fire_timer` at `fire_at`, replacing any
    /// earlier request. `None` cancels the pending timer.
    fn schedule_timer(&self, fire_at: Option<Millis>);

    /// Arrange for `RunLoop::did_animate_frame` before the next repaint.
    fn request_frame(&self);

    /// Arrange for `RunLoop::flush_next_event_loop` once the current
    /// callback stack has unwound.
    fn request_next_event_loop(&self);
}

/// Monotonic clock with no scheduling of its own: the host polls.
#[derive(Debug)]
pub struct SystemPlatform {
    epoch: Instant,
}

impl SystemPlatform {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SystemPlatform {
    fn now(&self) -> Millis {
        self.epoch.elapsed().as_millis() as Millis
    }

    fn schedule_timer(&self, fire_at: Option<Millis>) {
        tracing::trace!(?fire_at, "timer requested");
    }

    fn request_frame(&self) {
        tracing::trace!("frame requested");
    }

    fn request_next_event_loop(&self) {
        tracing::trace!("next event loop requested");
    }
}

/// A platform driven by hand. The clock only moves when told to, and every
/// request is recorded so the host (or a test) can answer it.
#[derive(Debug, Default)]
pub struct ManualPlatform {
    now: Cell<Millis>,
    timer: Cell<Option<Millis>>,
    timer_requests: Cell<usize>,
    frame_requests: Cell<usize>,
    next_loop_requests: Cell<usize>,
}

impl ManualPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, ms: Millis) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set_now(&self, now: Millis) {
        self.now.set(now);
    }

    /// The fire time of the pending timer request.
    pub fn scheduled_timer(&self) -> Option<Millis> {
        self.timer.get()
    }

    pub fn timer_requests(&self) -> usize {
        self.timer_requests.get()
    }

    pub fn frame_requests(&self) -> usize {
        self.frame_requests.get()
    }

    pub fn next_loop_requests(&self) -> usize {
        self.next_loop_requests.get()
    }
}

impl Platform for ManualPlatform {
    fn now(&self) -> Millis {
        self.now.get()
    }

    fn schedule_timer(&self, fire_at: Option<Millis>) {
        self.timer.set(fire_at);
        self.timer_requests.set(self.timer_requests.get() + 1);
    }

    fn request_frame(&self) {
        self.frame_requests.set(self.frame_requests.get() + 1);
    }

    fn request_next_event_loop(&self) {
        self.next_loop_requests.set(self.next_loop_requests.get() + 1);
    }
}

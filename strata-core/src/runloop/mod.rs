//! Run Loop
//!
//! A cooperative, single-threaded scheduler. Nothing here blocks: deferred
//! work goes into one of five phased queues, a timeout heap, or a
//! next-frame/next-event-loop list, and the host calls back in through the
//! [`Platform`] entry points.

mod heap;
mod queue;
mod platform;
mod scheduler;

pub use heap::Heap;
pub use queue::{Queue, Task};
pub use platform::{ManualPlatform, Millis, Platform, SystemPlatform};
pub use scheduler::{RunLoop, TimeoutId};

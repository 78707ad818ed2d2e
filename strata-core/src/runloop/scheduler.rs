//! Run-Loop Scheduler
//!
//! The scheduler decides when deferred work runs. It keeps, per thread:
//!
//! - five ordered queues (`before`, `bindings`, `middle`, `render`, `after`)
//! - a min-heap of timeouts ordered by fire time
//! - the next-event-loop and next-frame callback lists
//! - the `invoke` nesting depth
//!
//! # Algorithm
//!
//! 1. Work triggered inside [`RunLoop::invoke`] is queued, not run.
//! 2. When the outermost `invoke` returns, queues are drained in order. After
//!    any queue does work, draining restarts from `before`, so later phases
//!    never see a half-updated earlier phase.
//! 3. A queue is swapped out before it runs; tasks that enqueue into the same
//!    queue run on the next pass.
//! 4. The `render` queue only runs while redraw is allowed (inside an
//!    animation frame); otherwise a frame is requested and draining stops.
//! 5. Due timeouts then run, each inside its own `invoke`.
//!
//! Errors returned by tasks go to the global error hook; they never stop the
//! remaining tasks.

use std::cell::RefCell;
use std::rc::Rc;

use super::heap::Heap;
use super::platform::{Millis, Platform, SystemPlatform};
use super::queue::{sort_by_depth, Queue, Task};
use crate::config::RunLoopConfig;
use crate::error::{did_error, report, Result};

/// Identifies a scheduled timeout for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutId(u64);

type TimeoutFn = Rc<dyn Fn() -> Result<()>>;
type FrameFn = Rc<dyn Fn(Millis) -> Result<()>>;

#[derive(Clone)]
struct Timeout {
    id: TimeoutId,
    fire_at: Millis,
    /// Zero for one-shot timeouts.
    period: Millis,
    func: TimeoutFn,
}

struct State {
    queues: [Vec<Task>; 5],
    timeouts: Heap<Timeout>,
    next_timeout_id: u64,
    next_timer_at: Option<Millis>,
    /// The platform timer fired and must be re-armed even if the earliest
    /// fire time is unchanged.
    timer_spent: bool,
    next_loop: Vec<Task>,
    next_loop_requested: bool,
    next_frame: Vec<FrameFn>,
    frame_requested: bool,
    depth: usize,
    flushing: bool,
    processing_timeouts: bool,
    may_redraw: bool,
    platform: Rc<dyn Platform>,
}

impl State {
    fn new() -> Self {
        Self {
            queues: Default::default(),
            timeouts: Heap::new(|a: &Timeout, b: &Timeout| {
                a.fire_at.cmp(&b.fire_at).then(a.id.0.cmp(&b.id.0))
            }),
            next_timeout_id: 0,
            next_timer_at: None,
            timer_spent: false,
            next_loop: Vec::new(),
            next_loop_requested: false,
            next_frame: Vec::new(),
            frame_requested: false,
            depth: 0,
            flushing: false,
            processing_timeouts: false,
            may_redraw: false,
            platform: Rc::new(SystemPlatform::new()),
        }
    }
}

thread_local! {
    static RUN_LOOP: RefCell<State> = RefCell::new(State::new());
}

fn with_state<R>(f: impl FnOnce(&mut State) -> R) -> R {
    RUN_LOOP.with(|state| f(&mut state.borrow_mut()))
}

/// The run loop of the current thread.
pub struct RunLoop;

impl RunLoop {
    /// Install the host platform for this thread.
    pub fn set_platform(platform: Rc<dyn Platform>) {
        with_state(|s| {
            s.platform = platform;
            s.next_timer_at = None;
        });
        Self::schedule_timer();
    }

    pub fn configure(config: &RunLoopConfig) {
        with_state(|s| s.may_redraw = config.may_redraw);
    }

    fn platform() -> Rc<dyn Platform> {
        with_state(|s| Rc::clone(&s.platform))
    }

    /// Current platform time.
    pub fn now() -> Millis {
        Self::platform().now()
    }

    /// How many `invoke` calls are on the stack.
    pub fn depth() -> usize {
        with_state(|s| s.depth)
    }

    pub fn may_redraw() -> bool {
        with_state(|s| s.may_redraw)
    }

    /// Allow or forbid running the render queue outside animation frames.
    pub fn set_may_redraw(may_redraw: bool) {
        with_state(|s| s.may_redraw = may_redraw);
    }

    /// Number of tasks waiting in `queue`.
    pub fn pending(queue: Queue) -> usize {
        with_state(|s| s.queues[queue.index()].len())
    }

    // ------------------------------------------------------------------------
    // Queues
    // ------------------------------------------------------------------------

    /// Queue a task unless the same task is already waiting in that queue.
    ///
    /// Returns false if the task was a duplicate.
    pub fn queue_fn(queue: Queue, task: &Task) -> bool {
        let queued = with_state(|s| {
            let tasks = &mut s.queues[queue.index()];
            if tasks.iter().any(|t| t.same(task)) {
                false
            } else {
                tasks.push(task.clone());
                true
            }
        });
        if queued {
            Self::request_flush();
        }
        queued
    }

    /// Queue a task without the duplicate scan. For callers that already
    /// guarantee uniqueness.
    pub fn queue_fn_allowing_duplicates(queue: Queue, task: Task) {
        with_state(|s| s.queues[queue.index()].push(task));
        Self::request_flush();
    }

    /// Outside any `invoke`, nothing would drain the queues: ask the host to
    /// flush on the next event loop.
    fn request_flush() {
        let request = with_state(|s| {
            let idle = s.depth == 0 && !s.flushing;
            let request = idle && !s.next_loop_requested;
            if request {
                s.next_loop_requested = true;
            }
            request
        });
        if request {
            Self::platform().request_next_event_loop();
        }
    }

    /// Run every task currently in `queue`. Returns true if any ran.
    pub fn flush_queue(queue: Queue) -> bool {
        let mut tasks = with_state(|s| std::mem::take(&mut s.queues[queue.index()]));
        if tasks.is_empty() {
            return false;
        }
        tracing::trace!(%queue, count = tasks.len(), "flushing queue");
        if queue == Queue::Render {
            sort_by_depth(&mut tasks);
        }
        for task in &tasks {
            report(task.run());
        }
        true
    }

    /// Drain all queues in order, restarting from the first after each flush.
    pub fn flush_all_queues() {
        let was_flushing = with_state(|s| std::mem::replace(&mut s.flushing, true));
        let mut i = 0;
        while i < Queue::ORDER.len() {
            let queue = Queue::ORDER[i];
            if Self::pending(queue) == 0 {
                i += 1;
                continue;
            }
            if queue == Queue::Render && !Self::may_redraw() {
                Self::request_frame();
                break;
            }
            Self::flush_queue(queue);
            i = 0;
        }
        with_state(|s| s.flushing = was_flushing);
    }

    // ------------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------------

    /// Run `f` as a unit of work. Queued work runs when the outermost
    /// invocation returns. An error from `f` goes to the error hook and
    /// yields `None`.
    pub fn invoke<R, F>(f: F) -> Option<R>
    where
        F: FnOnce() -> Result<R>,
    {
        with_state(|s| s.depth += 1);
        let result = f();
        let depth = with_state(|s| {
            s.depth -= 1;
            s.depth
        });
        let value = match result {
            Ok(value) => Some(value),
            Err(error) => {
                did_error(&error);
                None
            }
        };
        if depth == 0 {
            Self::flush_all_queues();
            Self::process_timeouts();
        }
        value
    }

    /// Run a task on the next turn of the host event loop.
    pub fn invoke_in_next_event_loop(task: Task) {
        let request = with_state(|s| {
            s.next_loop.push(task);
            !std::mem::replace(&mut s.next_loop_requested, true)
        });
        if request {
            Self::platform().request_next_event_loop();
        }
    }

    /// Host entry point: the next event loop turn has arrived.
    pub fn flush_next_event_loop() {
        let tasks = with_state(|s| {
            s.next_loop_requested = false;
            std::mem::take(&mut s.next_loop)
        });
        Self::invoke(|| {
            for task in &tasks {
                report(task.run());
            }
            Ok(())
        });
    }

    /// Run `f` in the next animation frame, with the frame time.
    pub fn invoke_in_next_frame<F>(f: F)
    where
        F: Fn(Millis) -> Result<()> + 'static,
    {
        with_state(|s| s.next_frame.push(Rc::new(f)));
        Self::request_frame();
    }

    fn request_frame() {
        let request = with_state(|s| !std::mem::replace(&mut s.frame_requested, true));
        if request {
            Self::platform().request_frame();
        }
    }

    /// Host entry point: an animation frame is starting. Frame callbacks run
    /// and the render queue is drained.
    pub fn did_animate_frame(time: Millis) {
        let callbacks = with_state(|s| {
            s.frame_requested = false;
            std::mem::take(&mut s.next_frame)
        });
        let previous = with_state(|s| std::mem::replace(&mut s.may_redraw, true));
        Self::invoke(|| {
            for callback in &callbacks {
                report(callback(time));
            }
            Ok(())
        });
        with_state(|s| s.may_redraw = previous);
    }

    // ------------------------------------------------------------------------
    // Timeouts
    // ------------------------------------------------------------------------

    /// Run `f` once, `delay` milliseconds from now.
    pub fn invoke_after_delay<F>(f: F, delay: Millis) -> TimeoutId
    where
        F: Fn() -> Result<()> + 'static,
    {
        Self::add_timeout(Rc::new(f), delay, 0)
    }

    /// Run `f` every `period` milliseconds until cancelled.
    pub fn invoke_periodically<F>(f: F, period: Millis) -> TimeoutId
    where
        F: Fn() -> Result<()> + 'static,
    {
        let period = period.max(1);
        Self::add_timeout(Rc::new(f), period, period)
    }

    fn add_timeout(func: TimeoutFn, delay: Millis, period: Millis) -> TimeoutId {
        let now = Self::now();
        let id = with_state(|s| {
            let id = TimeoutId(s.next_timeout_id);
            s.next_timeout_id += 1;
            s.timeouts.push(Timeout {
                id,
                fire_at: now + delay,
                period,
                func,
            });
            id
        });
        Self::schedule_timer();
        id
    }

    /// Remove a scheduled timeout. Returns false if it already fired (for
    /// one-shots) or was never scheduled.
    pub fn cancel(id: TimeoutId) -> bool {
        let removed = with_state(|s| s.timeouts.remove_where(|t| t.id == id).is_some());
        if removed {
            Self::schedule_timer();
        }
        removed
    }

    /// Number of scheduled timeouts.
    pub fn pending_timeouts() -> usize {
        with_state(|s| s.timeouts.len())
    }

    /// Host entry point: the platform timer fired.
    pub fn did_fire_timer() {
        with_state(|s| s.timer_spent = true);
        Self::process_timeouts();
    }

    /// Run every timeout whose fire time has passed.
    pub fn process_timeouts() {
        if with_state(|s| std::mem::replace(&mut s.processing_timeouts, true)) {
            return;
        }
        let platform = Self::platform();
        loop {
            let now = platform.now();
            let due = with_state(|s| {
                if !s.timeouts.peek().is_some_and(|t| t.fire_at <= now) {
                    return None;
                }
                let timeout = s.timeouts.pop()?;
                if timeout.period > 0 {
                    s.timeouts.push(Timeout {
                        fire_at: now + timeout.period,
                        ..timeout.clone()
                    });
                }
                Some(timeout.func)
            });
            match due {
                Some(func) => {
                    Self::invoke(|| func());
                }
                None => break,
            }
        }
        with_state(|s| s.processing_timeouts = false);
        Self::schedule_timer();
    }

    /// Point the platform timer at the earliest timeout, if that changed.
    fn schedule_timer() {
        let request = with_state(|s| {
            let next = s.timeouts.peek().map(|t| t.fire_at);
            if next == s.next_timer_at && !s.timer_spent {
                None
            } else {
                s.next_timer_at = next;
                s.timer_spent = false;
                Some((Rc::clone(&s.platform), next))
            }
        });
        if let Some((platform, next)) = request {
            tracing::trace!(fire_at = ?next, "rescheduling platform timer");
            platform.schedule_timer(next);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runloop::ManualPlatform;
    use std::cell::{Cell, RefCell};

    fn manual() -> Rc<ManualPlatform> {
        let platform = Rc::new(ManualPlatform::new());
        RunLoop::set_platform(platform.clone());
        RunLoop::set_may_redraw(false);
        platform
    }

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn logging_task(log: &Log, name: &'static str) -> Task {
        let log = log.clone();
        Task::new(move || {
            log.borrow_mut().push(name);
            Ok(())
        })
    }

    #[test]
    fn queued_work_waits_for_outermost_invoke() {
        let _platform = manual();
        let log: Log = Rc::default();
        let task = logging_task(&log, "queued");

        RunLoop::invoke(|| {
            RunLoop::invoke(|| {
                RunLoop::queue_fn(Queue::Middle, &task);
                Ok(())
            });
            assert!(log.borrow().is_empty());
            Ok(())
        });
        assert_eq!(*log.borrow(), vec!["queued"]);
    }

    #[test]
    fn earlier_queues_settle_before_render() {
        let _platform = manual();
        RunLoop::set_may_redraw(true);
        let log: Log = Rc::default();
        let render = logging_task(&log, "render");
        let bindings = logging_task(&log, "bindings");
        let before = {
            let log = log.clone();
            let (render, bindings) = (render.clone(), bindings.clone());
            Task::new(move || {
                log.borrow_mut().push("before");
                RunLoop::queue_fn(Queue::Render, &render);
                RunLoop::queue_fn(Queue::Bindings, &bindings);
                Ok(())
            })
        };

        RunLoop::invoke(|| {
            RunLoop::queue_fn(Queue::Before, &before);
            Ok(())
        });
        assert_eq!(*log.borrow(), vec!["before", "bindings", "render"]);
    }

    #[test]
    fn duplicates_are_suppressed_unless_allowed() {
        let _platform = manual();
        let log: Log = Rc::default();
        let task = logging_task(&log, "once");

        RunLoop::invoke(|| {
            assert!(RunLoop::queue_fn(Queue::Middle, &task));
            assert!(!RunLoop::queue_fn(Queue::Middle, &task));
            RunLoop::queue_fn_allowing_duplicates(Queue::After, task.clone());
            RunLoop::queue_fn_allowing_duplicates(Queue::After, task.clone());
            Ok(())
        });
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn same_queue_work_runs_on_next_pass() {
        let _platform = manual();
        let passes = Rc::new(Cell::new(0));
        let inner = {
            let passes = passes.clone();
            Task::new(move || {
                passes.set(passes.get() + 10);
                Ok(())
            })
        };
        let outer = {
            let passes = passes.clone();
            let inner = inner.clone();
            Task::new(move || {
                passes.set(passes.get() + 1);
                RunLoop::queue_fn(Queue::Middle, &inner);
                assert_eq!(RunLoop::pending(Queue::Middle), 1);
                Ok(())
            })
        };

        RunLoop::invoke(|| {
            RunLoop::queue_fn(Queue::Middle, &outer);
            Ok(())
        });
        assert_eq!(passes.get(), 11);
    }

    #[test]
    fn render_waits_for_animation_frame() {
        let platform = manual();
        let log: Log = Rc::default();
        let render = logging_task(&log, "render");
        let after = logging_task(&log, "after");

        RunLoop::invoke(|| {
            RunLoop::queue_fn(Queue::Render, &render);
            RunLoop::queue_fn(Queue::After, &after);
            Ok(())
        });
        assert!(log.borrow().is_empty());
        assert_eq!(platform.frame_requests(), 1);

        RunLoop::did_animate_frame(16);
        assert_eq!(*log.borrow(), vec!["render", "after"]);
        assert!(!RunLoop::may_redraw());
    }

    #[test]
    fn failing_tasks_do_not_stop_the_queue() {
        let _platform = manual();
        let log: Log = Rc::default();
        let failing = Task::new(|| Err(crate::Error::handler("task failed on purpose")));
        let ok = logging_task(&log, "ok");

        RunLoop::invoke(|| {
            RunLoop::queue_fn(Queue::Middle, &failing);
            RunLoop::queue_fn(Queue::Middle, &ok);
            Ok(())
        });
        assert_eq!(*log.borrow(), vec!["ok"]);
    }

    #[test]
    fn queueing_outside_invoke_requests_next_loop() {
        let platform = manual();
        let log: Log = Rc::default();
        let task = logging_task(&log, "later");

        RunLoop::queue_fn(Queue::Middle, &task);
        assert_eq!(platform.next_loop_requests(), 1);
        assert!(log.borrow().is_empty());

        RunLoop::flush_next_event_loop();
        assert_eq!(*log.borrow(), vec!["later"]);
    }

    #[test]
    fn next_event_loop_tasks_run_in_order() {
        let platform = manual();
        let log: Log = Rc::default();
        RunLoop::invoke_in_next_event_loop(logging_task(&log, "a"));
        RunLoop::invoke_in_next_event_loop(logging_task(&log, "b"));
        assert_eq!(platform.next_loop_requests(), 1);

        RunLoop::flush_next_event_loop();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn frame_callbacks_receive_frame_time() {
        let platform = manual();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();
        RunLoop::invoke_in_next_frame(move |time| {
            seen_clone.set(time);
            Ok(())
        });
        assert_eq!(platform.frame_requests(), 1);
        RunLoop::did_animate_frame(33);
        assert_eq!(seen.get(), 33);
    }

    #[test]
    fn timeouts_fire_in_time_order() {
        let platform = manual();
        let log: Log = Rc::default();
        {
            let log = log.clone();
            RunLoop::invoke_after_delay(
                move || {
                    log.borrow_mut().push("late");
                    Ok(())
                },
                50,
            );
        }
        {
            let log = log.clone();
            RunLoop::invoke_after_delay(
                move || {
                    log.borrow_mut().push("early");
                    Ok(())
                },
                10,
            );
        }
        assert_eq!(platform.scheduled_timer(), Some(10));

        platform.advance(10);
        RunLoop::did_fire_timer();
        assert_eq!(*log.borrow(), vec!["early"]);
        assert_eq!(platform.scheduled_timer(), Some(50));

        platform.advance(40);
        RunLoop::did_fire_timer();
        assert_eq!(*log.borrow(), vec!["early", "late"]);
        assert_eq!(platform.scheduled_timer(), None);
    }

    #[test]
    fn spent_timer_is_rearmed_or_cleared() {
        let platform = manual();
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        RunLoop::invoke_after_delay(
            move || {
                fired_clone.set(true);
                Ok(())
            },
            10,
        );
        let requests = platform.timer_requests();

        // Fires early: nothing is due, the same fire time is requested again.
        platform.advance(5);
        RunLoop::did_fire_timer();
        assert!(!fired.get());
        assert_eq!(platform.scheduled_timer(), Some(10));
        assert_eq!(platform.timer_requests(), requests + 1);

        platform.advance(5);
        RunLoop::did_fire_timer();
        assert!(fired.get());
        assert_eq!(platform.scheduled_timer(), None);
        assert_eq!(platform.timer_requests(), requests + 2);
    }

    #[test]
    fn periodic_timeouts_repeat_until_cancelled() {
        let platform = manual();
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let id = RunLoop::invoke_periodically(
            move || {
                count_clone.set(count_clone.get() + 1);
                Ok(())
            },
            100,
        );

        for _ in 0..3 {
            platform.advance(100);
            RunLoop::did_fire_timer();
        }
        assert_eq!(count.get(), 3);
        assert_eq!(RunLoop::pending_timeouts(), 1);

        assert!(RunLoop::cancel(id));
        platform.advance(100);
        RunLoop::did_fire_timer();
        assert_eq!(count.get(), 3);
        assert!(!RunLoop::cancel(id));
    }

    #[test]
    fn cancelled_timeout_never_fires() {
        let platform = manual();
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        let id = RunLoop::invoke_after_delay(
            move || {
                fired_clone.set(true);
                Ok(())
            },
            5,
        );
        assert!(RunLoop::cancel(id));
        platform.advance(10);
        RunLoop::did_fire_timer();
        assert!(!fired.get());
    }

    #[test]
    fn invoke_returns_value_or_none_on_error() {
        let _platform = manual();
        assert_eq!(RunLoop::invoke(|| Ok(5)), Some(5));
        let failed: Option<i32> =
            RunLoop::invoke(|| Err(crate::Error::handler("invoke failed on purpose")));
        assert_eq!(failed, None);
        assert_eq!(RunLoop::depth(), 0);
    }
}

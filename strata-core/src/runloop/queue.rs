//! Run-Loop Queues and Tasks
//!
//! Deferred work lives in five named queues that are always drained in the
//! same order. A [`Task`] is a shared callback; two tasks are the same task
//! when they share the same allocation, which is what duplicate suppression
//! compares.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The named run-loop queues, in flush order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Queue {
    Before,
    Bindings,
    Middle,
    Render,
    After,
}

impl Queue {
    /// Flush order.
    pub const ORDER: [Queue; 5] = [
        Queue::Before,
        Queue::Bindings,
        Queue::Middle,
        Queue::Render,
        Queue::After,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Queue::Before => "before",
            Queue::Bindings => "bindings",
            Queue::Middle => "middle",
            Queue::Render => "render",
            Queue::After => "after",
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A unit of deferred work.
#[derive(Clone)]
pub struct Task {
    func: Rc<dyn Fn() -> Result<()>>,
    /// Tree depth of the view this task updates; render tasks run
    /// shallowest first.
    depth: Option<usize>,
}

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Result<()> + 'static,
    {
        Self {
            func: Rc::new(f),
            depth: None,
        }
    }

    /// Record the depth of the view this task updates (number of ancestors).
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn depth(&self) -> Option<usize> {
        self.depth
    }

    /// True if both handles refer to the same task.
    pub fn same(&self, other: &Task) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }

    pub(crate) fn run(&self) -> Result<()> {
        (self.func)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("ptr", &Rc::as_ptr(&self.func).cast::<()>())
            .field("depth", &self.depth)
            .finish()
    }
}

/// Sort render tasks so ancestors update before descendants. Tasks with no
/// depth keep their relative order and run last.
pub(crate) fn sort_by_depth(tasks: &mut [Task]) {
    tasks.sort_by_key(|task| task.depth.unwrap_or(usize::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_matches_indices() {
        for (i, queue) in Queue::ORDER.iter().enumerate() {
            assert_eq!(queue.index(), i);
        }
        assert_eq!(Queue::Render.to_string(), "render");
    }

    #[test]
    fn clones_are_the_same_task() {
        let a = Task::new(|| Ok(()));
        let b = a.clone();
        let c = Task::new(|| Ok(()));
        assert!(a.same(&b));
        assert!(!a.same(&c));
    }

    #[test]
    fn render_sort_puts_parents_first_and_untyped_last() {
        let untyped = Task::new(|| Ok(()));
        let child = Task::new(|| Ok(())).with_depth(3);
        let root = Task::new(|| Ok(())).with_depth(0);
        let parent = Task::new(|| Ok(())).with_depth(1);

        let mut tasks = vec![untyped.clone(), child.clone(), root.clone(), parent.clone()];
        sort_by_depth(&mut tasks);

        assert!(tasks[0].same(&root));
        assert!(tasks[1].same(&parent));
        assert!(tasks[2].same(&child));
        assert!(tasks[3].same(&untyped));
    }

    #[test]
    fn queue_names_deserialize() {
        let queue: Queue = serde_json::from_str("\"middle\"").unwrap();
        assert_eq!(queue, Queue::Middle);
    }
}

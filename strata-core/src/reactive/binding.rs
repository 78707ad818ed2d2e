//! Bindings
//!
//! A binding keeps a value at one object/path (`to`) in step with a value at
//! another (`from`). It is a pair of structural path observers plus a sync
//! task that runs in a run-loop queue.
//!
//! # How Sync Works
//!
//! 1. A change at the observed endpoint calls `needs_sync`, which marks the
//!    binding dirty, records the direction and queues the sync task (the
//!    same task every time, so repeated changes sync once).
//!
//! 2. `sync` clears the dirty flag, reads the source path, runs the transform
//!    and writes the destination. A final segment made only of digits writes
//!    the object's indexed content; any other segment writes a property.
//!
//! 3. Notifications caused by the binding's own write are ignored, so a
//!    two-way binding never bounces a value back.
//!
//! # Endpoints
//!
//! An endpoint path may contain one `*`. The part before it is resolved once
//! at connect time; the part after it is observed continuously. Without a
//! `*` the whole path is observed from the root.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::object::{Object, WeakObject};
use super::observer::{Observer, ObserverId};
use super::value::{parse_index, Value};
use crate::config::BindingConfig;
use crate::error::{Error, Result};
use crate::runloop::{Queue, RunLoop, Task};

/// Which way a sync copies the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From the `from` endpoint to the `to` endpoint.
    Forward,
    /// From `to` back to `from` (two-way bindings only).
    Backward,
}

type TransformFn = dyn Fn(Value, Direction) -> Option<Value>;

/// The root of an endpoint. The destination owns its bindings, so it is held
/// weakly. The source is held strongly until the binding connects; from then
/// on the source's observer owns the binding and the anchor is weak.
#[derive(Clone, Default)]
enum Anchor {
    #[default]
    Unset,
    Owned(Object),
    Borrowed(WeakObject),
}

impl Anchor {
    fn get(&self) -> Option<Object> {
        match self {
            Anchor::Unset => None,
            Anchor::Owned(object) => Some(object.clone()),
            Anchor::Borrowed(weak) => weak.upgrade(),
        }
    }

    fn downgrade(&mut self) {
        if let Anchor::Owned(object) = self {
            *self = Anchor::Borrowed(object.downgrade());
        }
    }

    fn is(&self, object: &Object) -> bool {
        self.get().is_some_and(|root| root.ptr_eq(object))
    }
}

#[derive(Default)]
struct Endpoint {
    anchor: Anchor,
    /// Resolved once at connect time.
    prefix: String,
    /// Observed for as long as the binding is connected.
    path: String,
    object: Option<WeakObject>,
    observer: Option<ObserverId>,
}

impl Endpoint {
    fn new(anchor: Anchor, path: &str) -> Self {
        let (prefix, path) = match path.split_once('*') {
            Some((prefix, rest)) => (
                prefix.trim_end_matches('.').to_owned(),
                rest.trim_start_matches('.').to_owned(),
            ),
            None => (String::new(), path.to_owned()),
        };
        Self {
            anchor,
            prefix,
            path,
            object: None,
            observer: None,
        }
    }

    fn full_path(&self) -> String {
        if self.prefix.is_empty() {
            self.path.clone()
        } else {
            format!("{}*{}", self.prefix, self.path)
        }
    }

    fn resolve(&self) -> Option<Object> {
        let root = self.anchor.get()?;
        if self.prefix.is_empty() {
            return Some(root);
        }
        root.get_from_path(&self.prefix).as_object().cloned()
    }

    fn object(&self) -> Option<Object> {
        self.object.as_ref().and_then(WeakObject::upgrade)
    }

    fn read(&self) -> Option<Value> {
        Some(self.object()?.get_from_path(&self.path))
    }

    /// Write `value` at the end of the path. Returns false if the path does
    /// not lead to an object.
    fn write(&self, value: Value) -> bool {
        let Some(object) = self.object() else {
            return false;
        };
        let (parent, key) = match self.path.rsplit_once('.') {
            Some((parent, key)) => match object.get_from_path(parent) {
                Value::Object(parent) => (parent, key),
                _ => return false,
            },
            None => (object, self.path.as_str()),
        };
        match parse_index(key) {
            Some(index) => parent.set_object_at(index, value),
            None => parent.set(key, value),
        };
        true
    }

    fn detach(&mut self) {
        if let (Some(object), Some(id)) = (self.object(), self.observer.take()) {
            object.remove_observer_for_path(&self.path, id);
        }
        self.object = None;
    }
}

#[derive(Default)]
struct State {
    from: Endpoint,
    to: Endpoint,
    is_connected: bool,
    is_suspended: bool,
    is_not_in_sync: bool,
    will_sync_forward: bool,
    is_two_way: bool,
    retried: bool,
    queue: Option<Queue>,
}

struct BindingInner {
    state: RefCell<State>,
    syncing: Cell<bool>,
    transform: RefCell<Option<Rc<TransformFn>>>,
    sync_task: Task,
    connect_task: Task,
}

/// A shared handle to a binding.
#[derive(Clone)]
pub struct Binding(Rc<BindingInner>);

impl Binding {
    /// An unconnected binding that syncs in the `bindings` queue.
    pub fn new() -> Self {
        Self::with_config(&BindingConfig::default())
    }

    pub fn with_config(config: &BindingConfig) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<BindingInner>| {
            let sync_weak = weak.clone();
            let connect_weak = weak.clone();
            BindingInner {
                state: RefCell::new(State {
                    queue: config.queue,
                    will_sync_forward: true,
                    ..State::default()
                }),
                syncing: Cell::new(false),
                transform: RefCell::new(None),
                sync_task: Task::new(move || match sync_weak.upgrade() {
                    Some(inner) => Binding(inner).sync(false).map(|_| ()),
                    None => Ok(()),
                }),
                connect_task: Task::new(move || match connect_weak.upgrade() {
                    Some(inner) => Binding(inner).connect(),
                    None => Ok(()),
                }),
            }
        });
        Self(inner)
    }

    fn state(&self) -> std::cell::RefMut<'_, State> {
        self.0.state.borrow_mut()
    }

    /// Declare the source endpoint.
    pub fn from(self, root: &Object, path: &str) -> Self {
        let mut state = self.state();
        let anchor = if state.to.anchor.is(root) {
            Anchor::Borrowed(root.downgrade())
        } else {
            Anchor::Owned(root.clone())
        };
        state.from = Endpoint::new(anchor, path);
        drop(state);
        self
    }

    /// Declare the destination endpoint.
    pub fn to(self, root: &Object, path: &str) -> Self {
        let mut state = self.state();
        if state.from.anchor.is(root) {
            state.from.anchor.downgrade();
        }
        state.to = Endpoint::new(Anchor::Borrowed(root.downgrade()), path);
        drop(state);
        self
    }

    /// Also sync changes at `to` back to `from`.
    pub fn two_way(self) -> Self {
        self.state().is_two_way = true;
        self
    }

    /// Map values as they cross the binding. Returning `None` skips the write.
    pub fn transform<F>(self, f: F) -> Self
    where
        F: Fn(Value, Direction) -> Option<Value> + 'static,
    {
        *self.0.transform.borrow_mut() = Some(Rc::new(f));
        self
    }

    /// Sync in `queue`, or immediately with `None`.
    pub fn queue(self, queue: Option<Queue>) -> Self {
        self.state().queue = queue;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.0.state.borrow().is_connected
    }

    pub fn is_suspended(&self) -> bool {
        self.0.state.borrow().is_suspended
    }

    pub fn is_not_in_sync(&self) -> bool {
        self.0.state.borrow().is_not_in_sync
    }

    pub fn is_two_way(&self) -> bool {
        self.0.state.borrow().is_two_way
    }

    /// Resolve the endpoints, start observing and sync once.
    ///
    /// If an endpoint cannot be resolved yet, the connect is retried once
    /// from the `before` queue. A second failure is an error.
    pub fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let (from, to) = {
            let state = self.0.state.borrow();
            (state.from.resolve(), state.to.resolve())
        };
        let (Some(from), Some(to)) = (from, to) else {
            let mut state = self.state();
            if !state.retried {
                state.retried = true;
                drop(state);
                RunLoop::queue_fn(Queue::Before, &self.0.connect_task);
                return Ok(());
            }
            let path = if state.from.resolve().is_none() {
                state.from.full_path()
            } else {
                state.to.full_path()
            };
            return Err(Error::UnresolvedBinding { path });
        };

        let (from_path, to_path, two_way) = {
            let mut state = self.state();
            state.from.object = Some(from.downgrade());
            state.from.anchor.downgrade();
            state.to.object = Some(to.downgrade());
            state.is_connected = true;
            (state.from.path.clone(), state.to.path.clone(), state.is_two_way)
        };
        let observer = self.observer(Direction::Forward);
        let id = from.add_observer_for_path(&from_path, observer);
        self.state().from.observer = Some(id);
        if two_way {
            let observer = self.observer(Direction::Backward);
            let id = to.add_observer_for_path(&to_path, observer);
            self.state().to.observer = Some(id);
        }
        tracing::trace!(from = %from_path, to = %to_path, two_way, "binding connected");

        self.sync(true)?;
        Ok(())
    }

    /// The source's observer keeps the binding alive until it disconnects;
    /// the destination's only refers to it.
    fn observer(&self, direction: Direction) -> Observer {
        let observer = match direction {
            Direction::Forward => {
                let inner = self.0.clone();
                Observer::new(move |_, _, _, _| {
                    Binding(inner.clone()).needs_sync(direction);
                    Ok(())
                })
            }
            Direction::Backward => {
                let weak = Rc::downgrade(&self.0);
                Observer::new(move |_, _, _, _| {
                    if let Some(inner) = weak.upgrade() {
                        Binding(inner).needs_sync(direction);
                    }
                    Ok(())
                })
            }
        };
        observer.structural()
    }

    /// Mark the binding dirty and schedule a sync in `direction`.
    pub fn needs_sync(&self, direction: Direction) {
        if self.0.syncing.get() {
            return;
        }
        let queue = {
            let mut state = self.state();
            state.is_not_in_sync = true;
            state.will_sync_forward = direction == Direction::Forward;
            if state.is_suspended {
                return;
            }
            state.queue
        };
        match queue {
            Some(queue) => {
                RunLoop::queue_fn(queue, &self.0.sync_task);
            }
            None => crate::error::report(self.sync(false).map(|_| ())),
        }
    }

    /// Copy the value across the binding. Returns true if it wrote.
    ///
    /// Does nothing while suspended, or when the binding is in sync and
    /// `force` is false.
    pub fn sync(&self, force: bool) -> Result<bool> {
        let direction = {
            let mut state = self.state();
            if state.is_suspended || !state.is_connected || !(state.is_not_in_sync || force) {
                return Ok(false);
            }
            state.is_not_in_sync = false;
            if state.will_sync_forward {
                Direction::Forward
            } else {
                Direction::Backward
            }
        };

        let value = {
            let state = self.0.state.borrow();
            let source = match direction {
                Direction::Forward => &state.from,
                Direction::Backward => &state.to,
            };
            source.read()
        };
        let Some(value) = value else {
            return Ok(false);
        };
        let transform = self.0.transform.borrow().clone();
        let value = match transform {
            Some(transform) => transform(value, direction),
            None => Some(value),
        };
        let Some(value) = value else {
            return Ok(false);
        };

        // Resolve the destination before writing; the write may re-enter.
        let destination = {
            let state = self.0.state.borrow();
            let endpoint = match direction {
                Direction::Forward => &state.to,
                Direction::Backward => &state.from,
            };
            Endpoint {
                anchor: Anchor::Unset,
                prefix: String::new(),
                path: endpoint.path.clone(),
                object: endpoint.object.clone(),
                observer: None,
            }
        };
        self.0.syncing.set(true);
        let wrote = destination.write(value);
        self.0.syncing.set(false);
        Ok(wrote)
    }

    /// Stop syncing. Changes are still tracked.
    pub fn suspend(&self) -> &Self {
        self.state().is_suspended = true;
        self
    }

    /// Resume syncing; a change made while suspended syncs immediately.
    pub fn resume(&self) -> Result<&Self> {
        let dirty = {
            let mut state = self.state();
            state.is_suspended = false;
            state.is_not_in_sync
        };
        if dirty {
            self.sync(false)?;
        }
        Ok(self)
    }

    /// Stop observing both endpoints.
    pub fn disconnect(&self) -> &Self {
        if !self.is_connected() {
            return self;
        }
        let (mut from, mut to) = {
            let mut state = self.state();
            state.is_connected = false;
            (
                std::mem::take(&mut state.from),
                std::mem::take(&mut state.to),
            )
        };
        from.detach();
        to.detach();
        let mut state = self.state();
        state.from = from;
        state.to = to;
        self
    }
}

impl Default for Binding {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BindingInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.from.detach();
        state.to.detach();
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.borrow();
        f.debug_struct("Binding")
            .field("from", &state.from.full_path())
            .field("to", &state.to.full_path())
            .field("connected", &state.is_connected)
            .field("two_way", &state.is_two_way)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

//! Events
//!
//! Events reuse the observer table: a handler for `type` is an observer of
//! the synthetic key `__event__type`. Firing walks from the target along the
//! `next_event_target` chain, calling every handler at each step in
//! registration order, until a handler stops propagation or the chain ends.
//!
//! A handler that returns an error is reported to the global error hook; the
//! remaining handlers and the rest of the chain still run.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use super::object::Object;
use super::observer::{Callback, Observer, ObserverId};
use crate::error::{report, Result};

const EVENT_PREFIX: &str = "__event__";

pub(crate) fn event_key(kind: &str) -> String {
    format!("{EVENT_PREFIX}{kind}")
}

/// An event travelling along a target chain.
pub struct Event {
    kind: String,
    target: Object,
    current_target: Object,
    detail: Option<Rc<dyn Any>>,
    propagation_stopped: bool,
    default_prevented: bool,
}

impl Event {
    pub fn new(kind: impl Into<String>, target: &Object) -> Self {
        Self {
            kind: kind.into(),
            target: target.clone(),
            current_target: target.clone(),
            detail: None,
            propagation_stopped: false,
            default_prevented: false,
        }
    }

    /// Attach a typed payload.
    pub fn with_detail<T: Any>(mut self, detail: T) -> Self {
        self.detail = Some(Rc::new(detail));
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The object the event was fired on.
    pub fn target(&self) -> &Object {
        &self.target
    }

    /// The object whose handlers are currently running.
    pub fn current_target(&self) -> &Object {
        &self.current_target
    }

    /// The payload, if it has type `T`.
    pub fn detail<T: Any>(&self) -> Option<&T> {
        self.detail.as_deref().and_then(|d| d.downcast_ref::<T>())
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("propagation_stopped", &self.propagation_stopped)
            .finish()
    }
}

/// Publish/subscribe on top of an object's observer table.
///
/// Implementors only say which object carries their handlers.
pub trait EventTarget {
    fn event_object(&self) -> &Object;

    /// Register a handler for events of `kind`.
    fn on<F>(&self, kind: &str, handler: F) -> ObserverId
    where
        F: Fn(&mut Event) -> Result<()> + 'static,
        Self: Sized,
    {
        self.event_object()
            .add_observer_for_key(&event_key(kind), Observer::event(handler))
    }

    fn off(&self, kind: &str, id: ObserverId) {
        self.event_object()
            .remove_observer_for_key(&event_key(kind), id);
    }

    /// Fire a payload-free event of `kind`.
    fn fire(&self, kind: &str) -> Event {
        let event = Event::new(kind, self.event_object());
        self.fire_event(event)
    }

    /// Dispatch a prepared event and return it after the chain has run.
    fn fire_event(&self, mut event: Event) -> Event {
        let key = event_key(&event.kind);
        let mut next = Some(self.event_object().clone());
        while let Some(target) = next {
            event.current_target = target.clone();
            for registration in target.registrations(&key) {
                if let Callback::Event(handler) = registration.observer.callback() {
                    report(handler(&mut event));
                }
            }
            if event.propagation_stopped {
                break;
            }
            next = target.next_event_target();
        }
        event
    }
}

impl EventTarget for Object {
    fn event_object(&self) -> &Object {
        self
    }
}

//! Observer types for the reactive kernel.
//!
//! An Observer is a callback registered in an object's observer table. The
//! same table holds three kinds of callback: property observers (one key or a
//! dot-path), generic observers registered on the wildcard key `*`, and event
//! handlers registered on a synthetic event key.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::event::Event;
use super::object::Object;
use super::value::Value;
use crate::error::Result;

/// Unique identifier for an observer.
///
/// Each observer gets a unique ID when created. The ID is the observer's
/// identity: removal, path re-attachment and de-duplication all compare IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// Old and new value of one property in a change batch.
#[derive(Debug, Clone)]
pub struct ValueChange {
    pub old_value: Value,
    pub new_value: Value,
}

/// Every property changed in one delivery, in first-change order.
pub type ChangeSet = IndexMap<String, ValueChange>;

pub(crate) type PropertyFn = dyn Fn(&Object, &str, &Value, &Value) -> Result<()>;
pub(crate) type GenericFn = dyn Fn(&Object, &ChangeSet) -> Result<()>;
pub(crate) type EventFn = dyn Fn(&mut Event) -> Result<()>;

#[derive(Clone)]
pub(crate) enum Callback {
    Property(Rc<PropertyFn>),
    Generic(Rc<GenericFn>),
    Event(Rc<EventFn>),
}

/// A callback plus the identity used to register and remove it.
#[derive(Clone)]
pub struct Observer {
    id: ObserverId,
    callback: Callback,
    /// Structural observers are notified while the observed object is still
    /// initialising. Bindings use this to sync default values.
    structural: bool,
}

impl Observer {
    /// Observe a property: called with the object, the key or path, and the
    /// old and new values.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Object, &str, &Value, &Value) -> Result<()> + 'static,
    {
        Self {
            id: ObserverId::new(),
            callback: Callback::Property(Rc::new(f)),
            structural: false,
        }
    }

    /// Observe every property of an object at once. Register on the `*` key.
    pub fn generic<F>(f: F) -> Self
    where
        F: Fn(&Object, &ChangeSet) -> Result<()> + 'static,
    {
        Self {
            id: ObserverId::new(),
            callback: Callback::Generic(Rc::new(f)),
            structural: false,
        }
    }

    pub(crate) fn event<F>(f: F) -> Self
    where
        F: Fn(&mut Event) -> Result<()> + 'static,
    {
        Self {
            id: ObserverId::new(),
            callback: Callback::Event(Rc::new(f)),
            structural: false,
        }
    }

    /// Mark this observer as structural.
    pub fn structural(mut self) -> Self {
        self.structural = true;
        self
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn is_structural(&self) -> bool {
        self.structural
    }

    pub(crate) fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Invoke a property observer. Other kinds ignore property changes.
    pub(crate) fn property_did_change(
        &self,
        object: &Object,
        key: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> Result<()> {
        match &self.callback {
            Callback::Property(f) => f(object, key, old_value, new_value),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.callback {
            Callback::Property(_) => "property",
            Callback::Generic(_) => "generic",
            Callback::Event(_) => "event",
        };
        f.debug_struct("Observer")
            .field("id", &self.id)
            .field("kind", &kind)
            .field("structural", &self.structural)
            .finish()
    }
}

/// One entry in an object's observer table.
#[derive(Clone, Debug)]
pub(crate) struct Registration {
    pub observer: Observer,
    /// The full dot-path, for observers registered through a path.
    pub path: Option<Rc<str>>,
}

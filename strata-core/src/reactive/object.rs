//! Reactive Objects
//!
//! An [`Object`] is a bag of named property slots plus the metadata that makes
//! those slots observable: the observer table, the computed-property cache,
//! the dependent-key graph and the pending change set of the current batch.
//!
//! # How Notification Works
//!
//! 1. `set` writes a stored value (skipping identical writes) or runs a
//!    computed property's setter, then calls `property_did_change`.
//!
//! 2. `property_did_change` invalidates the cache of every property that
//!    transitively depends on the key.
//!
//! 3. With no dependents, no open batch and no wildcard observers, the key's
//!    observers are called straight away. Otherwise the change is merged into
//!    the pending change set, keeping the earliest old value per key, and
//!    delivered when the outermost batch ends.
//!
//! 4. Delivery runs in passes. Each pass calls the key observers, then hands
//!    the pass's change set to wildcard (`*`) observers. Passes repeat until
//!    no observer queued a new change.
//!
//! # Lifecycle
//!
//! Objects are built in three stages (constructing, initialising,
//! initialised). Until an object is initialised only structural observers are
//! called; path observers are still re-attached so bindings set up during
//! construction track the right objects.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::map::Entry;
use indexmap::IndexMap;
use smallvec::SmallVec;

use super::binding::Binding;
use super::computed::Computed;
use super::dependents::DependencyGraph;
use super::observer::{Callback, ChangeSet, Observer, ObserverId, Registration, ValueChange};
use super::value::{parse_index, Value};
use crate::error::{report, Result};

/// Observer key that receives every change of an object.
pub const ANY_KEY: &str = "*";

/// Observer key notified when an object's indexed content changes.
pub const CONTENT_KEY: &str = "[]";

/// Unique identifier for a reactive object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where an object is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifeStage {
    #[default]
    Constructing,
    Initialising,
    Initialised,
    Destroyed,
}

/// A property slot is either a plain value or a computed property.
#[derive(Clone, Debug)]
pub enum Slot {
    Stored(Value),
    Computed(Rc<Computed>),
}

#[derive(Debug)]
struct PendingChange {
    old_value: Value,
    /// `None` for invalidated computed properties; resolved lazily on delivery.
    new_value: Option<Value>,
}

/// Per-object observation metadata.
#[derive(Default)]
struct Meta {
    observers: IndexMap<String, Vec<Registration>>,
    graph: Option<DependencyGraph>,
    cache: HashMap<String, Value>,
    changed: Option<IndexMap<String, PendingChange>>,
    depth: u32,
    /// Paths registered through `observe_paths`, usually one or two.
    path_observers: HashMap<ObserverId, SmallVec<[String; 2]>>,
    lifestage: LifeStage,
}

pub(crate) struct ObjectInner {
    id: ObjectId,
    slots: RefCell<IndexMap<String, Slot>>,
    elements: RefCell<Vec<Value>>,
    meta: RefCell<Meta>,
    bindings: RefCell<Vec<Binding>>,
    next_event_target: RefCell<Option<Weak<ObjectInner>>>,
}

/// A shared handle to a reactive object.
///
/// Cloning the handle shares the object; equality of handles is identity.
#[derive(Clone)]
pub struct Object(Rc<ObjectInner>);

/// A non-owning handle to an [`Object`].
#[derive(Clone, Default)]
pub struct WeakObject(Weak<ObjectInner>);

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }
}

impl Object {
    fn with_stage(lifestage: LifeStage) -> Self {
        Self(Rc::new(ObjectInner {
            id: ObjectId::next(),
            slots: RefCell::new(IndexMap::new()),
            elements: RefCell::new(Vec::new()),
            meta: RefCell::new(Meta {
                lifestage,
                ..Meta::default()
            }),
            bindings: RefCell::new(Vec::new()),
            next_event_target: RefCell::new(None),
        }))
    }

    /// Create an empty, initialised object.
    pub fn new() -> Self {
        Self::with_stage(LifeStage::Initialised)
    }

    /// Start building an object with declared properties and bindings.
    pub fn builder() -> ObjectBuilder {
        ObjectBuilder::default()
    }

    /// Build an object whose stored properties mirror a JSON map.
    pub fn from_json(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        map.iter()
            .fold(Self::builder(), |builder, (key, value)| {
                builder.value(key, Value::from(value))
            })
            .build()
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// True if both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.0))
    }

    fn meta(&self) -> Ref<'_, Meta> {
        self.0.meta.borrow()
    }

    fn meta_mut(&self) -> RefMut<'_, Meta> {
        self.0.meta.borrow_mut()
    }

    pub fn lifestage(&self) -> LifeStage {
        self.meta().lifestage
    }

    pub fn is_initialised(&self) -> bool {
        self.lifestage() == LifeStage::Initialised
    }

    fn set_lifestage(&self, lifestage: LifeStage) {
        self.meta_mut().lifestage = lifestage;
    }

    /// Tear the object down: disconnect its bindings and drop every observer.
    ///
    /// No further notifications are delivered.
    pub fn destroy(&self) {
        let bindings = std::mem::take(&mut *self.0.bindings.borrow_mut());
        for binding in bindings {
            binding.disconnect();
        }
        let observers = {
            let mut meta = self.meta_mut();
            meta.lifestage = LifeStage::Destroyed;
            meta.path_observers.clear();
            meta.cache.clear();
            meta.changed = None;
            std::mem::take(&mut meta.observers)
        };
        drop(observers);
        *self.0.next_event_target.borrow_mut() = None;
    }

    // ------------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------------

    /// Names of all declared property slots.
    pub fn keys(&self) -> Vec<String> {
        self.0.slots.borrow().keys().cloned().collect()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.0.slots.borrow().contains_key(key)
    }

    /// Declare (or replace) a computed property.
    pub fn define_computed(&self, key: &str, computed: Computed) -> &Self {
        self.0
            .slots
            .borrow_mut()
            .insert(key.to_owned(), Slot::Computed(Rc::new(computed)));
        let mut meta = self.meta_mut();
        meta.graph = None;
        meta.cache.remove(key);
        self
    }

    /// Read a property.
    ///
    /// Computed properties are evaluated (and cached unless volatile). An
    /// all-digit key with no slot reads the object's indexed content.
    pub fn get(&self, key: &str) -> Value {
        let slot = self.0.slots.borrow().get(key).cloned();
        match slot {
            Some(Slot::Stored(value)) => value,
            Some(Slot::Computed(computed)) => {
                if !computed.is_volatile() {
                    if let Some(cached) = self.meta().cache.get(key) {
                        return cached.clone();
                    }
                }
                let value = computed.compute(self);
                if !computed.is_volatile() {
                    self.meta_mut().cache.insert(key.to_owned(), value.clone());
                }
                value
            }
            None => parse_index(key)
                .map(|index| self.get_object_at(index))
                .unwrap_or_default(),
        }
    }

    /// Read a dot-path starting at this object.
    pub fn get_from_path(&self, path: &str) -> Value {
        Value::Object(self.clone()).get_path(path)
    }

    /// Write a property and notify observers.
    ///
    /// Writing a value equal to the stored one does nothing.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> &Self {
        let value = value.into();
        let slot = self.0.slots.borrow().get(key).cloned();
        match slot {
            Some(Slot::Computed(computed)) => {
                let old_value = if computed.is_volatile() {
                    Value::Undefined
                } else {
                    self.meta().cache.get(key).cloned().unwrap_or_default()
                };
                let Some(new_value) = computed.assign(self, value) else {
                    tracing::warn!(key, "ignoring write to read-only computed property");
                    return self;
                };
                if !computed.is_volatile() {
                    self.meta_mut()
                        .cache
                        .insert(key.to_owned(), new_value.clone());
                }
                if !computed.is_silent() {
                    self.property_did_change(key, old_value, new_value);
                }
            }
            Some(Slot::Stored(old_value)) => {
                if old_value == value {
                    return self;
                }
                self.store(key, old_value, value);
            }
            None => {
                if value.is_undefined() {
                    return self;
                }
                self.store(key, Value::Undefined, value);
            }
        }
        self
    }

    fn store(&self, key: &str, old_value: Value, value: Value) {
        self.0
            .slots
            .borrow_mut()
            .insert(key.to_owned(), Slot::Stored(value.clone()));
        self.property_did_change(key, old_value, value);
    }

    // ------------------------------------------------------------------------
    // Indexed content
    // ------------------------------------------------------------------------

    pub fn get_object_at(&self, index: usize) -> Value {
        self.0
            .elements
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of indexed elements.
    pub fn element_count(&self) -> usize {
        self.0.elements.borrow().len()
    }

    /// Replace the element at `index`, growing the content if needed.
    ///
    /// Observers of the index key and of `[]` are notified.
    pub fn set_object_at(&self, index: usize, value: impl Into<Value>) -> &Self {
        let value = value.into();
        let old_value = {
            let mut elements = self.0.elements.borrow_mut();
            if index >= elements.len() {
                elements.resize(index + 1, Value::Undefined);
            }
            if elements[index] == value {
                return self;
            }
            std::mem::replace(&mut elements[index], value.clone())
        };
        self.begin_property_changes();
        self.property_did_change(&index.to_string(), old_value, value);
        self.property_did_change(CONTENT_KEY, Value::Undefined, Value::Undefined);
        self.end_property_changes();
        self
    }

    // ------------------------------------------------------------------------
    // Change notification
    // ------------------------------------------------------------------------

    /// Every computed key that must be invalidated when `key` changes.
    pub fn properties_dependent_on_key(&self, key: &str) -> Rc<[String]> {
        let mut meta = self.meta_mut();
        if meta.graph.is_none() {
            let slots = self.0.slots.borrow();
            let declarations = slots.iter().filter_map(|(k, slot)| match slot {
                Slot::Computed(c) => Some((k.as_str(), c.dependencies())),
                Slot::Stored(_) => None,
            });
            meta.graph = Some(DependencyGraph::from_declarations(declarations));
        }
        meta.graph
            .as_mut()
            .map(|graph| graph.all_dependents(key))
            .unwrap_or_default()
    }

    /// Record that `key` changed and notify, now or at the end of the batch.
    pub fn property_did_change(
        &self,
        key: &str,
        old_value: Value,
        new_value: Value,
    ) -> &Self {
        let dependents = self.properties_dependent_on_key(key);
        let fast_path = {
            let meta = self.meta();
            dependents.is_empty() && meta.depth == 0 && !meta.observers.contains_key(ANY_KEY)
        };
        if fast_path {
            self.notify_observers(key, &old_value, Some(new_value));
            return self;
        }

        let depth = {
            let mut meta = self.meta_mut();
            let Meta { cache, changed, .. } = &mut *meta;
            let changed = changed.get_or_insert_with(IndexMap::new);
            for dependent in dependents.iter().rev() {
                if !changed.contains_key(dependent) {
                    let old_value = cache.get(dependent).cloned().unwrap_or_default();
                    changed.insert(
                        dependent.clone(),
                        PendingChange {
                            old_value,
                            new_value: None,
                        },
                    );
                }
                cache.remove(dependent);
            }
            match changed.entry(key.to_owned()) {
                Entry::Occupied(mut entry) => entry.get_mut().new_value = Some(new_value),
                Entry::Vacant(entry) => {
                    entry.insert(PendingChange {
                        old_value,
                        new_value: Some(new_value),
                    });
                }
            }
            meta.depth
        };

        if depth == 0 {
            self.begin_property_changes();
            self.end_property_changes();
        }
        self
    }

    /// Open a batch. Notifications are held until the matching
    /// [`end_property_changes`](Self::end_property_changes).
    pub fn begin_property_changes(&self) -> &Self {
        self.meta_mut().depth += 1;
        self
    }

    /// Close a batch. The outermost close delivers every pending change.
    pub fn end_property_changes(&self) -> &Self {
        if self.meta().depth == 1 {
            // Each pass delivers what the previous pass's observers (wildcard
            // ones included) changed.
            loop {
                let changed = self.meta_mut().changed.take();
                let Some(changed) = changed.filter(|c| !c.is_empty()) else {
                    break;
                };
                let collect = self.has_observers(ANY_KEY);
                let mut delivered = ChangeSet::new();
                for (key, change) in changed {
                    let resolved = self.notify_observers(&key, &change.old_value, change.new_value);
                    if collect {
                        let new_value = resolved.unwrap_or_else(|| self.get(&key));
                        delivered.insert(
                            key,
                            ValueChange {
                                old_value: change.old_value,
                                new_value,
                            },
                        );
                    }
                }
                if !delivered.is_empty() {
                    self.notify_generic_observers(&delivered);
                }
            }
        }
        let mut meta = self.meta_mut();
        meta.depth = meta.depth.saturating_sub(1);
        self
    }

    /// Call the observers of one key. Returns the new value if it had to be
    /// resolved.
    fn notify_observers(
        &self,
        key: &str,
        old_value: &Value,
        new_value: Option<Value>,
    ) -> Option<Value> {
        let registrations = self.registrations(key);
        if registrations.is_empty() {
            return new_value;
        }
        let initialised = self.is_initialised();
        let mut new_value = new_value;

        for registration in registrations {
            let observer = &registration.observer;
            let should_call = initialised || observer.is_structural();
            match registration.path.as_deref() {
                Some(path) => {
                    let rest = path.split_once('.').map_or("", |(_, rest)| rest);
                    let current = new_value.get_or_insert_with(|| self.get(key)).clone();
                    // Move the downstream registration from the old value to the new one.
                    if let Value::Object(previous) = old_value {
                        previous.remove_observer_for_path(rest, observer.id());
                    }
                    if let Value::Object(next) = &current {
                        next.add_observer_for_path(rest, observer.clone());
                    }
                    if should_call {
                        let old_leaf = old_value.get_path(rest);
                        let new_leaf = current.get_path(rest);
                        report(observer.property_did_change(self, path, &old_leaf, &new_leaf));
                    }
                }
                None if should_call => {
                    let current = new_value.get_or_insert_with(|| self.get(key));
                    report(observer.property_did_change(self, key, old_value, current));
                }
                None => {}
            }
        }
        new_value
    }

    fn notify_generic_observers(&self, changes: &ChangeSet) {
        let initialised = self.is_initialised();
        for registration in self.registrations(ANY_KEY) {
            let observer = &registration.observer;
            if !(initialised || observer.is_structural()) {
                continue;
            }
            if let Callback::Generic(f) = observer.callback() {
                report(f(self, changes));
            }
        }
    }

    // ------------------------------------------------------------------------
    // Observer registration
    // ------------------------------------------------------------------------

    pub(crate) fn registrations(&self, key: &str) -> Vec<Registration> {
        self.meta()
            .observers
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// True if anything observes `key`.
    pub fn has_observers(&self, key: &str) -> bool {
        self.meta()
            .observers
            .get(key)
            .is_some_and(|list| !list.is_empty())
    }

    /// Observe a single key. Use [`ANY_KEY`] with a generic observer to see
    /// every change.
    pub fn add_observer_for_key(&self, key: &str, observer: Observer) -> ObserverId {
        let id = observer.id();
        self.meta_mut()
            .observers
            .entry(key.to_owned())
            .or_default()
            .push(Registration {
                observer,
                path: None,
            });
        id
    }

    pub fn remove_observer_for_key(&self, key: &str, id: ObserverId) -> &Self {
        self.remove_registration(key, |r| r.observer.id() == id && r.path.is_none());
        self
    }

    fn remove_registration(&self, key: &str, matches: impl Fn(&Registration) -> bool) {
        let removed = {
            let mut meta = self.meta_mut();
            let Some(list) = meta.observers.get_mut(key) else {
                return;
            };
            let removed = list.iter().position(|r| matches(r)).map(|pos| list.remove(pos));
            if list.is_empty() {
                meta.observers.shift_remove(key);
            }
            removed
        };
        // The registration may own a binding whose drop detaches from us.
        drop(removed);
    }

    /// Observe a dot-path. The observer is re-attached whenever an
    /// intermediate object is replaced, and is called with the old and new
    /// values at the end of the path.
    pub fn add_observer_for_path(&self, path: &str, observer: Observer) -> ObserverId {
        let Some((head, rest)) = path.split_once('.') else {
            return self.add_observer_for_key(path, observer);
        };
        let id = observer.id();
        self.meta_mut()
            .observers
            .entry(head.to_owned())
            .or_default()
            .push(Registration {
                observer: observer.clone(),
                path: Some(Rc::from(path)),
            });
        if let Value::Object(child) = self.get(head) {
            child.add_observer_for_path(rest, observer);
        }
        id
    }

    pub fn remove_observer_for_path(&self, path: &str, id: ObserverId) -> &Self {
        let Some((head, rest)) = path.split_once('.') else {
            return self.remove_observer_for_key(path, id);
        };
        self.remove_registration(head, |r| {
            r.observer.id() == id && r.path.as_deref() == Some(path)
        });
        if let Value::Object(child) = self.get(head) {
            child.remove_observer_for_path(rest, id);
        }
        self
    }

    /// Observe several paths with one observer; [`unobserve`](Self::unobserve)
    /// removes them all.
    pub fn observe_paths<I, S>(&self, paths: I, observer: Observer) -> ObserverId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = observer.id();
        let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        for path in &paths {
            self.add_observer_for_path(path, observer.clone());
        }
        self.meta_mut()
            .path_observers
            .entry(id)
            .or_default()
            .extend(paths);
        id
    }

    pub fn unobserve(&self, id: ObserverId) -> &Self {
        let paths = self.meta_mut().path_observers.remove(&id).unwrap_or_default();
        for path in paths {
            self.remove_observer_for_path(&path, id);
        }
        self
    }

    // ------------------------------------------------------------------------
    // Event chain and bindings
    // ------------------------------------------------------------------------

    /// The next object an event bubbles to. Not an ownership relation.
    pub fn next_event_target(&self) -> Option<Object> {
        self.0
            .next_event_target
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Object)
    }

    pub fn set_next_event_target(&self, target: Option<&Object>) -> &Self {
        *self.0.next_event_target.borrow_mut() = target.map(|t| Rc::downgrade(&t.0));
        self
    }

    /// Bind `key` on this object to a path on another object.
    pub fn bind(&self, key: &str, from: &Object, path: &str) -> Result<Binding> {
        let binding = Binding::new().from(from, path).to(self, key);
        self.attach_binding(binding)
    }

    /// Bind `key` on this object to a path on another object, both ways.
    pub fn bind_two_way(&self, key: &str, from: &Object, path: &str) -> Result<Binding> {
        let binding = Binding::new().from(from, path).to(self, key).two_way();
        self.attach_binding(binding)
    }

    fn attach_binding(&self, binding: Binding) -> Result<Binding> {
        self.0.bindings.borrow_mut().push(binding.clone());
        binding.connect()?;
        Ok(binding)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object#{}", self.0.id.0)
    }
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Declares an object's slots and bindings before it is initialised.
#[derive(Default)]
pub struct ObjectBuilder {
    slots: Vec<(String, Slot)>,
    observers: Vec<(String, Observer)>,
    bindings: Vec<(String, Binding)>,
}

impl ObjectBuilder {
    pub fn value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.slots.push((key.to_owned(), Slot::Stored(value.into())));
        self
    }

    pub fn computed(mut self, key: &str, computed: Computed) -> Self {
        self.slots
            .push((key.to_owned(), Slot::Computed(Rc::new(computed))));
        self
    }

    /// Observe `path` from construction on. Unless the observer is structural
    /// it stays silent until the object is initialised.
    pub fn observe(mut self, path: &str, observer: Observer) -> Self {
        self.observers.push((path.to_owned(), observer));
        self
    }

    /// Bind `key` with a binding whose source is already declared. The
    /// destination is set to the new object when it is built.
    pub fn bind(mut self, key: &str, binding: Binding) -> Self {
        self.bindings.push((key.to_owned(), binding));
        self
    }

    /// Create the object, connect its bindings while it is initialising, and
    /// mark it initialised.
    pub fn build(self) -> Object {
        let object = Object::with_stage(LifeStage::Constructing);
        object.0.slots.borrow_mut().extend(self.slots);
        object.set_lifestage(LifeStage::Initialising);
        for (path, observer) in self.observers {
            object.add_observer_for_path(&path, observer);
        }
        for (key, binding) in self.bindings {
            let binding = binding.to(&object, &key);
            object.0.bindings.borrow_mut().push(binding.clone());
            report(binding.connect());
        }
        object.set_lifestage(LifeStage::Initialised);
        object
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<(String, Value, Value)>>>, Observer) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let observer = Observer::new(move |_, key, old, new| {
            log_clone
                .borrow_mut()
                .push((key.to_owned(), old.clone(), new.clone()));
            Ok(())
        });
        (log, observer)
    }

    #[test]
    fn get_and_set() {
        let object = Object::new();
        assert!(object.get("missing").is_undefined());
        object.set("count", 1);
        assert_eq!(object.get("count"), Value::from(1));
    }

    #[test]
    fn identical_writes_do_not_notify() {
        let object = Object::new();
        let (log, observer) = recorder();
        object.add_observer_for_key("count", observer);

        object.set("count", 1);
        object.set("count", 1);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn batched_writes_coalesce_to_one_notification() {
        let object = Object::builder().value("x", 0).build();
        let (log, observer) = recorder();
        object.add_observer_for_key("x", observer);

        object.begin_property_changes();
        object.set("x", 1);
        object.set("x", 2);
        object.begin_property_changes();
        object.set("x", 3);
        object.end_property_changes();
        assert!(log.borrow().is_empty());
        object.end_property_changes();

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0], ("x".to_string(), Value::from(0), Value::from(3)));
    }

    #[test]
    fn dependents_are_invalidated_and_notified() {
        let object = Object::builder()
            .value("a", 1)
            .computed(
                "b",
                Computed::new(|o| Value::from(o.get("a").as_i64().unwrap_or(0) + 1))
                    .depends_on(["a"]),
            )
            .computed(
                "c",
                Computed::new(|o| Value::from(o.get("b").as_i64().unwrap_or(0) * 10))
                    .depends_on(["b"]),
            )
            .build();
        assert_eq!(object.get("c"), Value::from(20));

        let (log, observer) = recorder();
        object.add_observer_for_key("c", observer);
        object.set("a", 5);

        assert_eq!(object.get("c"), Value::from(60));
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0], ("c".to_string(), Value::from(20), Value::from(60)));
    }

    #[test]
    fn wildcard_observers_receive_the_change_set() {
        let object = Object::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        object.add_observer_for_key(
            ANY_KEY,
            Observer::generic(move |_, changes| {
                seen_clone
                    .borrow_mut()
                    .push(changes.keys().cloned().collect::<Vec<_>>());
                Ok(())
            }),
        );

        {
            let _batch = object.batch();
            object.set("a", 1);
            object.set("b", 2);
        }

        assert_eq!(*seen.borrow(), vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn writes_from_wildcard_observers_are_delivered() {
        let object = Object::builder().value("a", 0).value("b", 0).build();
        object.add_observer_for_key(
            ANY_KEY,
            Observer::generic(|o, changes| {
                if let Some(change) = changes.get("a") {
                    o.set("b", change.new_value.clone());
                }
                Ok(())
            }),
        );
        let (log, observer) = recorder();
        object.add_observer_for_key("b", observer);

        object.set("a", 5);

        assert_eq!(object.get("b"), Value::from(5));
        assert_eq!(
            *log.borrow(),
            vec![("b".to_string(), Value::from(0), Value::from(5))]
        );
    }

    #[test]
    fn only_structural_observers_run_while_initialising() {
        let first = Object::builder().value("name", "first").build();
        let source = Object::builder()
            .value("title", "ready")
            .value("child", &first)
            .build();
        let (plain_log, plain) = recorder();
        let (structural_log, structural) = recorder();
        let (path_log, path_observer) = recorder();

        let object = Object::builder()
            .observe("title", plain)
            .observe("title", structural.structural())
            .observe("child.name", path_observer)
            .bind("title", Binding::new().from(&source, "title"))
            .bind("child", Binding::new().from(&source, "child"))
            .build();

        assert!(plain_log.borrow().is_empty());
        assert_eq!(structural_log.borrow().len(), 1);
        assert!(path_log.borrow().is_empty());

        // The path observer was still moved onto the bound child.
        assert!(first.has_observers("name"));
        first.set("name", "renamed");
        assert_eq!(
            *path_log.borrow(),
            vec![("name".to_string(), Value::from("first"), Value::from("renamed"))]
        );

        object.set("title", "later");
        assert_eq!(plain_log.borrow().len(), 1);
        assert_eq!(structural_log.borrow().len(), 2);
    }

    #[test]
    fn observers_that_write_are_drained_in_the_same_delivery() {
        let object = Object::builder()
            .value("a", 0)
            .value("b", 0)
            .computed("sum", Computed::new(|o| {
                Value::from(o.get("a").as_i64().unwrap_or(0) + o.get("b").as_i64().unwrap_or(0))
            }).depends_on(["a", "b"]))
            .build();

        object.add_observer_for_key(
            "a",
            Observer::new(|o, _, _, new| {
                o.set("b", new.clone());
                Ok(())
            }),
        );
        let (log, observer) = recorder();
        object.add_observer_for_key("sum", observer);

        object.set("a", 2);
        assert_eq!(object.get("sum"), Value::from(4));
        assert!(!log.borrow().is_empty());
    }

    #[test]
    fn path_observers_follow_replaced_objects() {
        let first = Object::builder().value("name", "first").build();
        let second = Object::builder().value("name", "second").build();
        let root = Object::builder().value("child", &first).build();

        let (log, observer) = recorder();
        root.add_observer_for_path("child.name", observer);

        first.set("name", "first-renamed");
        root.set("child", &second);
        // Old child no longer reports.
        first.set("name", "ignored");
        second.set("name", "second-renamed");

        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].2, Value::from("first-renamed"));
        assert_eq!(log[1], (
            "child.name".to_string(),
            Value::from("first-renamed"),
            Value::from("second"),
        ));
        assert_eq!(log[2].2, Value::from("second-renamed"));
    }

    #[test]
    fn missing_path_segments_yield_undefined() {
        let root = Object::new();
        let (log, observer) = recorder();
        root.add_observer_for_path("child.name", observer);

        let child = Object::builder().value("name", "x").build();
        root.set("child", &child);
        assert_eq!(log.borrow()[0].1, Value::Undefined);
        assert_eq!(log.borrow()[0].2, Value::from("x"));
    }

    #[test]
    fn removing_a_path_observer_detaches_downstream() {
        let child = Object::builder().value("name", "x").build();
        let root = Object::builder().value("child", &child).build();
        let (log, observer) = recorder();
        let id = root.add_observer_for_path("child.name", observer);

        root.remove_observer_for_path("child.name", id);
        child.set("name", "y");
        assert!(log.borrow().is_empty());
        assert!(!child.has_observers("name"));
    }

    #[test]
    fn unobserve_removes_every_path() {
        let root = Object::new();
        let (log, observer) = recorder();
        let id = root.observe_paths(["a", "b"], observer);

        root.set("a", 1);
        root.unobserve(id);
        root.set("b", 1);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn indexed_content_notifies_index_and_content_keys() {
        let object = Object::new();
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        object.add_observer_for_key(
            CONTENT_KEY,
            Observer::new(move |_, _, _, _| {
                count_clone.set(count_clone.get() + 1);
                Ok(())
            }),
        );
        let (log, observer) = recorder();
        object.add_observer_for_key("2", observer);

        object.set_object_at(2, "c");
        assert_eq!(object.element_count(), 3);
        assert_eq!(object.get("2"), Value::from("c"));
        assert_eq!(count.get(), 1);
        assert_eq!(log.borrow()[0].2, Value::from("c"));
    }

    #[test]
    fn destroyed_objects_stop_notifying() {
        let object = Object::new();
        let (log, observer) = recorder();
        object.add_observer_for_key("x", observer);
        object.destroy();
        object.set("x", 1);
        assert!(log.borrow().is_empty());
        assert_eq!(object.lifestage(), LifeStage::Destroyed);
    }

    #[test]
    fn observer_errors_do_not_stop_other_observers() {
        let object = Object::new();
        object.add_observer_for_key(
            "x",
            Observer::new(|_, _, _, _| Err(crate::Error::handler("observer failed on purpose"))),
        );
        let (log, observer) = recorder();
        object.add_observer_for_key("x", observer);

        object.set("x", 1);
        assert_eq!(log.borrow().len(), 1);
    }
}

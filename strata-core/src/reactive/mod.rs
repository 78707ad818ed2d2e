//! Reactive Objects
//!
//! This module implements the observation kernel: observable objects,
//! computed properties, change batching, path observers, events and
//! bindings.
//!
//! # Concepts
//!
//! ## Objects
//!
//! An Object holds named property slots. Every write notifies the observers
//! of that key, either straight away or at the end of the current batch.
//!
//! ## Computed Properties
//!
//! A Computed property is a function of the object plus a declared list of
//! dependency keys. Its value is cached until one of those keys (directly or
//! transitively) changes.
//!
//! ## Path Observers
//!
//! An observer can watch a dot-path such as `user.address.city`. When an
//! object along the path is replaced, the observer moves to the new object.
//!
//! ## Events
//!
//! Events are observers of a synthetic key. Firing an event walks the
//! `next_event_target` chain until a handler stops it.
//!
//! ## Bindings
//!
//! A Binding is a pair of path observers that copy a value from one object to
//! another inside a run-loop queue.
//!
//! # Implementation Notes
//!
//! Objects are single-threaded (`Rc` + `RefCell`). Dependencies are declared,
//! not tracked: a computed property lists the keys it reads.

mod value;
mod observer;
mod computed;
mod dependents;
mod object;
mod batch;
mod event;
mod binding;

pub use value::Value;
pub use observer::{ChangeSet, Observer, ObserverId, ValueChange};
pub use computed::Computed;
pub use dependents::DependencyGraph;
pub use object::{LifeStage, Object, ObjectBuilder, ObjectId, Slot, WeakObject, ANY_KEY, CONTENT_KEY};
pub use batch::ChangeBatch;
pub use event::{Event, EventTarget};
pub use binding::{Binding, Direction};

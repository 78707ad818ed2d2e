//! Data Store
//!
//! Records are JSON attribute maps addressed by a [`StoreKey`], each with a
//! [`Status`] bitmask. Stores form a tree:
//!
//! - a root store ([`MemoryStore`]) holds the committed data;
//! - a [`NestedStore`] is a copy-on-write overlay on a parent store. Local
//!   edits stay in the overlay until `commit_changes` forwards them or
//!   `discard_changes` drops them.
//!
//! A parent tells its nested stores about changes through the
//! [`NestedListener`] callbacks. [`Query`] keeps a remotely sourced, ordered
//! list of store keys in sync with a [`Source`].

mod status;
mod layer;
mod memory;
mod nested;
mod query;
mod source;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use status::Status;
pub use layer::Layer;
pub use memory::MemoryStore;
pub use nested::{NestedStore, RecordChange};
pub use query::{diff_store_keys, AutoRefresh, ListDiff, Query, QueryOptions, QueryUpdate};
pub use source::{FnSource, Source};

/// Record attributes.
pub type Data = serde_json::Map<String, serde_json::Value>;

/// Identifies a record across every store in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreKey(String);

impl StoreKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl From<String> for StoreKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Unique identifier for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a nested store needs from its parent.
pub trait Store {
    fn store_id(&self) -> StoreId;

    /// Status of a record; `EMPTY` if unknown.
    fn get_status(&self, key: &StoreKey) -> Status;

    /// A copy of the record's attributes, if loaded.
    fn get_data(&self, key: &StoreKey) -> Option<Data>;

    /// Create a record. Fails if the record already exists.
    fn create_record(&self, key: &StoreKey, data: Data) -> Result<()>;

    /// Merge `data` into a loaded record. `change_is_dirty` marks a local
    /// edit (tracked for commit) rather than a load. Returns true if any
    /// attribute changed.
    fn update_data(&self, key: &StoreKey, data: &Data, change_is_dirty: bool) -> Result<bool>;

    fn destroy_record(&self, key: &StoreKey) -> Result<()>;

    /// Flag a record as out of date.
    fn set_obsolete(&self, key: &StoreKey);

    /// Flag a record as being fetched.
    fn set_loading(&self, key: &StoreKey);

    fn add_nested(&self, nested: Weak<dyn NestedListener>);

    fn remove_nested(&self, id: StoreId);
}

/// Callbacks a parent store makes into its nested stores.
pub trait NestedListener {
    fn store_id(&self) -> StoreId;

    fn parent_did_change_status(&self, key: &StoreKey, previous: Status, status: Status);

    /// The parent loaded or replaced a record's data.
    fn parent_did_set_data(&self, key: &StoreKey, changed: &[String]);

    /// The parent changed attributes of a record.
    fn parent_did_update_data(&self, key: &StoreKey, changed: &[String]);
}

/// The nested stores registered on a store.
#[derive(Default)]
pub(crate) struct Children(RefCell<Vec<Weak<dyn NestedListener>>>);

impl Children {
    pub(crate) fn add(&self, nested: Weak<dyn NestedListener>) {
        self.0.borrow_mut().push(nested);
    }

    pub(crate) fn remove(&self, id: StoreId) {
        self.0
            .borrow_mut()
            .retain(|weak| weak.upgrade().is_some_and(|child| child.store_id() != id));
    }

    /// Live children, in registration order. Dead entries are dropped.
    pub(crate) fn live(&self) -> Vec<Rc<dyn NestedListener>> {
        let mut children = self.0.borrow_mut();
        children.retain(|weak| weak.strong_count() > 0);
        children.iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.live().len()
    }
}

/// Attribute names whose values differ between two records.
pub(crate) fn changed_attributes(old: Option<&Data>, new: &Data) -> Vec<String> {
    let mut changed: Vec<String> = new
        .iter()
        .filter(|(key, value)| old.and_then(|old| old.get(*key)) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();
    if let Some(old) = old {
        changed.extend(old.keys().filter(|key| !new.contains_key(*key)).cloned());
    }
    changed
}

//! Nested Store
//!
//! A nested store is a transaction over a parent store. It keeps only its
//! divergence from the parent:
//!
//! - `data` / `status`: copy-on-write layers; an absent own entry falls
//!   through to the parent.
//! - `changed`: the locally edited attribute names of each record.
//! - `committed`: the parent's version of each edited record, used to tell
//!   whether an edit still differs and to rebase.
//! - `created` / `destroyed`: records created or destroyed locally.
//!
//! # Commit and Discard
//!
//! `commit_changes` forwards creates, the edited attributes of updates, and
//! destroys to the parent, then resets the overlay so every key falls
//! through to the (now updated) parent. `discard_changes` resets the overlay
//! without forwarding anything.
//!
//! # Rebase
//!
//! When the parent updates a record that has local edits, each edited
//! attribute keeps its local value and stays edited only while it differs
//! from the new parent value. Unedited attributes take the parent value. A
//! record with no remaining differences is dropped from the overlay.
//! With `rebase_conflicts` off, parent values always win.

use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};

use super::layer::Layer;
use super::{changed_attributes, Children, Data, NestedListener, Status, Store, StoreId, StoreKey};
use crate::config::StoreConfig;
use crate::error::{did_error, Error, Result};
use crate::reactive::{Event, EventTarget, Object, Value};

/// Detail of a `record:changed` event.
///
/// `attributes` lists the attributes whose values changed; it is empty when
/// only the record's readiness changed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    pub store_key: StoreKey,
    pub attributes: Vec<String>,
}

#[derive(Default)]
struct Overlay {
    data: Layer<StoreKey, Data>,
    status: Layer<StoreKey, Status>,
    changed: IndexMap<StoreKey, IndexSet<String>>,
    committed: HashMap<StoreKey, Data>,
    created: IndexSet<StoreKey>,
    destroyed: IndexSet<StoreKey>,
}

impl Overlay {
    fn has_changes(&self) -> bool {
        !self.created.is_empty() || !self.changed.is_empty() || !self.destroyed.is_empty()
    }

    fn diverges(&self, key: &StoreKey) -> bool {
        self.data.has_own(key) || self.status.has_own(key)
    }

    /// Drop every own entry for `key`.
    fn forget(&mut self, key: &StoreKey) {
        self.data.remove_own(key);
        self.status.remove_own(key);
        self.changed.shift_remove(key);
        self.committed.remove(key);
        self.created.shift_remove(key);
        self.destroyed.shift_remove(key);
    }
}

/// A copy-on-write transaction over a parent store.
pub struct NestedStore {
    id: StoreId,
    object: Object,
    parent: Rc<dyn Store>,
    rebase_conflicts: bool,
    overlay: RefCell<Overlay>,
    children: Children,
}

impl NestedStore {
    pub fn new(parent: Rc<dyn Store>) -> Rc<Self> {
        Self::with_config(parent, &StoreConfig::default())
    }

    pub fn with_config(parent: Rc<dyn Store>, config: &StoreConfig) -> Rc<Self> {
        let store = Rc::new(Self {
            id: StoreId::new(),
            object: Object::builder().value("has_changes", false).build(),
            parent,
            rebase_conflicts: config.rebase_conflicts,
            overlay: RefCell::new(Overlay::default()),
            children: Children::default(),
        });
        let weak: Weak<Self> = Rc::downgrade(&store);
        let listener: Weak<dyn NestedListener> = weak;
        store.parent.add_nested(listener);
        store
    }

    pub fn parent(&self) -> &Rc<dyn Store> {
        &self.parent
    }

    /// The observable object carrying `has_changes` and the store's events.
    pub fn object(&self) -> &Object {
        &self.object
    }

    /// True while there are uncommitted creates, edits or destroys.
    pub fn has_changes(&self) -> bool {
        self.object.get("has_changes").as_bool().unwrap_or(false)
    }

    /// Attribute names edited locally on `key`.
    pub fn changed_attributes(&self, key: &StoreKey) -> Vec<String> {
        self.overlay
            .borrow()
            .changed
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True if `key` has an own entry (its data or status diverges from the
    /// parent).
    pub fn has_own_record(&self, key: &StoreKey) -> bool {
        self.overlay.borrow().diverges(key)
    }

    fn overlay_mut(&self) -> RefMut<'_, Overlay> {
        self.overlay.borrow_mut()
    }

    /// Replace a record's attributes. A loaded record is edited (and tracked
    /// for commit); any other record is loaded locally.
    pub fn set_data(&self, key: &StoreKey, data: Data) -> Result<()> {
        if self.get_status(key).is_ready() {
            self.update_data(key, &data, true)?;
            return Ok(());
        }
        let attributes: Vec<String> = data.keys().cloned().collect();
        let previous = self.get_status(key);
        {
            let mut overlay = self.overlay_mut();
            overlay.data.set_own(key.clone(), data);
            overlay.status.set_own(key.clone(), Status::READY);
        }
        self.status_did_change(key, previous, Status::READY);
        self.record_did_change(key, attributes.clone());
        for child in self.children.live() {
            child.parent_did_set_data(key, &attributes);
        }
        Ok(())
    }

    /// Forward every local change to the parent and reset the overlay.
    ///
    /// Every change is forwarded even if one fails; the first failure is
    /// returned and later ones go to the error hook.
    pub fn commit_changes(&self) -> Result<()> {
        self.fire("store:willCommit");
        let (created, changed, destroyed, data) = {
            let mut overlay = self.overlay_mut();
            let created = std::mem::take(&mut overlay.created);
            let changed = std::mem::take(&mut overlay.changed);
            let destroyed = std::mem::take(&mut overlay.destroyed);
            overlay.committed.clear();
            overlay.status.reset();
            (created, changed, destroyed, overlay.data.reset())
        };
        tracing::debug!(
            store = ?self.id,
            created = created.len(),
            changed = changed.len(),
            destroyed = destroyed.len(),
            "committing nested store"
        );

        let mut first_error = None;
        let mut record = |result: Result<()>| {
            if let Err(error) = result {
                match first_error {
                    None => first_error = Some(error),
                    Some(_) => did_error(&error),
                }
            }
        };
        for key in &created {
            let Some(attributes) = data.get(key) else {
                continue;
            };
            if self.parent.get_status(key).is_ready() {
                record(self.parent.update_data(key, attributes, true).map(|_| ()));
            } else {
                record(self.parent.create_record(key, attributes.clone()));
            }
        }
        for (key, edited) in &changed {
            if destroyed.contains(key) {
                continue;
            }
            let Some(attributes) = data.get(key) else {
                continue;
            };
            let partial: Data = edited
                .iter()
                .filter_map(|name| attributes.get(name).map(|v| (name.clone(), v.clone())))
                .collect();
            record(self.parent.update_data(key, &partial, true).map(|_| ()));
        }
        for key in &destroyed {
            record(self.parent.destroy_record(key));
        }

        self.update_has_changes();
        self.fire("store:didCommit");
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Abandon every local change.
    pub fn discard_changes(&self) {
        let (data, status) = {
            let mut overlay = self.overlay_mut();
            overlay.changed.clear();
            overlay.committed.clear();
            overlay.created.clear();
            overlay.destroyed.clear();
            (overlay.data.reset(), overlay.status.reset())
        };
        tracing::debug!(store = ?self.id, records = status.len(), "discarding nested store");

        for (key, previous) in status {
            let local = data.get(&key);
            let parent_data = self.parent.get_data(&key);
            let status = self.get_status(&key);
            let mask = if local.is_some() { Status::empty() } else { Status::LOCAL };
            self.status_did_change(&key, previous - mask, status);
            let attributes = match (&parent_data, local) {
                (Some(parent_data), local) => changed_attributes(local, parent_data),
                (None, Some(local)) => local.keys().cloned().collect(),
                (None, None) => Vec::new(),
            };
            if !attributes.is_empty() {
                self.record_did_change(&key, attributes.clone());
                for child in self.children.live() {
                    child.parent_did_update_data(&key, &attributes);
                }
            }
        }
        self.update_has_changes();
        self.fire("store:didDiscard");
    }

    /// Detach from the parent. The store stops receiving parent changes.
    pub fn destroy(&self) {
        self.parent.remove_nested(self.id);
        self.object.destroy();
    }

    fn update_has_changes(&self) {
        let has_changes = self.overlay.borrow().has_changes();
        self.object.set("has_changes", Value::from(has_changes));
    }

    fn status_did_change(&self, key: &StoreKey, previous: Status, status: Status) {
        if previous == status {
            return;
        }
        if previous.is_ready() != status.is_ready() {
            self.record_did_change(key, Vec::new());
        }
        for child in self.children.live() {
            child.parent_did_change_status(key, previous, status);
        }
    }

    fn record_did_change(&self, key: &StoreKey, attributes: Vec<String>) {
        let change = RecordChange {
            store_key: key.clone(),
            attributes,
        };
        self.fire_event(Event::new("record:changed", &self.object).with_detail(change));
    }

    fn invalid(operation: &'static str, key: &StoreKey, status: Status) -> Error {
        Error::InvalidState {
            operation,
            key: key.clone(),
            status: status.to_string(),
        }
    }
}

impl Store for NestedStore {
    fn store_id(&self) -> StoreId {
        self.id
    }

    fn get_status(&self, key: &StoreKey) -> Status {
        let overlay = self.overlay.borrow();
        let status = overlay
            .status
            .get_or_else(key, || Some(self.parent.get_status(key)))
            .unwrap_or(Status::EMPTY);
        if overlay.data.has_own(key) {
            status
        } else {
            status - Status::LOCAL
        }
    }

    fn get_data(&self, key: &StoreKey) -> Option<Data> {
        self.overlay
            .borrow()
            .data
            .get_or_else(key, || self.parent.get_data(key))
    }

    fn create_record(&self, key: &StoreKey, data: Data) -> Result<()> {
        let previous = self.get_status(key);
        if !previous.is_empty() && !previous.intersects(Status::EMPTY | Status::DESTROYED) {
            return Err(Self::invalid("create", key, previous));
        }
        let status = Status::READY | Status::NEW;
        let attributes: Vec<String> = data.keys().cloned().collect();
        {
            let mut overlay = self.overlay_mut();
            overlay.destroyed.shift_remove(key);
            overlay.changed.shift_remove(key);
            overlay.committed.remove(key);
            overlay.created.insert(key.clone());
            overlay.data.set_own(key.clone(), data);
            overlay.status.set_own(key.clone(), status);
        }
        self.status_did_change(key, previous, status);
        self.record_did_change(key, attributes.clone());
        for child in self.children.live() {
            child.parent_did_set_data(key, &attributes);
        }
        self.update_has_changes();
        Ok(())
    }

    fn update_data(&self, key: &StoreKey, data: &Data, change_is_dirty: bool) -> Result<bool> {
        let previous = self.get_status(key);
        let Some(original) = self.get_data(key) else {
            tracing::warn!(%key, "update of a record that is not loaded");
            return Err(Error::UnknownRecord(key.clone()));
        };
        if change_is_dirty && !previous.is_ready() {
            tracing::warn!(%key, status = %previous, "edit of a record that is not ready");
            return Err(Self::invalid("update", key, previous));
        }

        let mut current = original.clone();
        let mut changed = Vec::new();
        for (attribute, value) in data {
            if current.get(attribute) != Some(value) {
                current.insert(attribute.clone(), value.clone());
                changed.push(attribute.clone());
            }
        }
        if changed.is_empty() {
            return Ok(false);
        }

        // Edits of a new record are not tracked: the whole record is created
        // on commit.
        let tracked = change_is_dirty && !previous.contains(Status::NEW);
        let status = {
            let mut overlay = self.overlay_mut();
            let Overlay {
                data: layer,
                status: status_layer,
                changed: edits,
                committed,
                ..
            } = &mut *overlay;
            let mut status = previous;
            if tracked {
                let base = committed.entry(key.clone()).or_insert(original);
                let edited = edits.entry(key.clone()).or_default();
                for attribute in &changed {
                    if current.get(attribute) == base.get(attribute) {
                        edited.shift_remove(attribute);
                    } else {
                        edited.insert(attribute.clone());
                    }
                }
                if edited.is_empty() {
                    edits.remove(key);
                    committed.remove(key);
                    status.remove(Status::DIRTY);
                } else {
                    status.insert(Status::DIRTY);
                }
            }
            layer.set_own(key.clone(), current);
            status_layer.set_own(key.clone(), status);
            status
        };

        self.status_did_change(key, previous, status);
        self.record_did_change(key, changed.clone());
        for child in self.children.live() {
            child.parent_did_update_data(key, &changed);
        }
        self.update_has_changes();
        Ok(true)
    }

    fn destroy_record(&self, key: &StoreKey) -> Result<()> {
        let previous = self.get_status(key);
        let status = if previous.contains(Status::NEW) {
            let mut overlay = self.overlay_mut();
            overlay.forget(key);
            overlay.status.set_own(key.clone(), Status::DESTROYED);
            Status::DESTROYED
        } else if previous.is_ready() {
            let parent_data = self.parent.get_data(key);
            let mut overlay = self.overlay_mut();
            // Edits are abandoned with the record.
            let data = overlay
                .committed
                .remove(key)
                .or_else(|| overlay.data.own(key).cloned())
                .or(parent_data)
                .unwrap_or_default();
            overlay.changed.shift_remove(key);
            let status = Status::DESTROYED | Status::DIRTY | (previous & Status::INHERITED);
            overlay.data.set_own(key.clone(), data);
            overlay.status.set_own(key.clone(), status);
            overlay.destroyed.insert(key.clone());
            status
        } else {
            return Err(Self::invalid("destroy", key, previous));
        };
        self.status_did_change(key, previous, status);
        self.update_has_changes();
        Ok(())
    }

    fn set_obsolete(&self, key: &StoreKey) {
        self.parent.set_obsolete(key);
    }

    fn set_loading(&self, key: &StoreKey) {
        self.parent.set_loading(key);
    }

    fn add_nested(&self, nested: Weak<dyn NestedListener>) {
        self.children.add(nested);
    }

    fn remove_nested(&self, id: StoreId) {
        self.children.remove(id);
    }
}

impl NestedListener for NestedStore {
    fn store_id(&self) -> StoreId {
        self.id
    }

    fn parent_did_change_status(&self, key: &StoreKey, previous: Status, status: Status) {
        let own = self.overlay.borrow().status.own(key).copied();
        let Some(own) = own else {
            self.status_did_change(key, previous - Status::LOCAL, status - Status::LOCAL);
            return;
        };
        let before = self.get_status(key);
        {
            let mut overlay = self.overlay_mut();
            if status.contains(Status::DESTROYED) {
                // Local edits of a record the parent destroyed are dropped
                // with the rest of the overlay entry.
                tracing::debug!(%key, local = %own, "parent destroyed a locally changed record");
                overlay.forget(key);
            } else {
                let mirrored = (own - Status::INHERITED) | (status & Status::INHERITED);
                overlay.status.set_own(key.clone(), mirrored);
            }
        }
        let after = self.get_status(key);
        self.status_did_change(key, before, after);
        self.update_has_changes();
    }

    fn parent_did_set_data(&self, key: &StoreKey, changed: &[String]) {
        if self.overlay.borrow().data.has_own(key) {
            self.parent_did_update_data(key, changed);
            return;
        }
        self.record_did_change(key, changed.to_vec());
        for child in self.children.live() {
            child.parent_did_set_data(key, changed);
        }
    }

    fn parent_did_update_data(&self, key: &StoreKey, changed: &[String]) {
        let (has_own, locally_owned) = {
            let overlay = self.overlay.borrow();
            (
                overlay.data.has_own(key),
                overlay.created.contains(key) || overlay.destroyed.contains(key),
            )
        };
        if !has_own {
            self.record_did_change(key, changed.to_vec());
            for child in self.children.live() {
                child.parent_did_update_data(key, changed);
            }
            return;
        }
        if locally_owned {
            return;
        }

        let before = self.get_status(key);
        let new_base = self.parent.get_data(key).unwrap_or_default();
        let inherited = self.parent.get_status(key) & Status::INHERITED;
        let (old_data, new_data) = {
            let mut overlay = self.overlay_mut();
            let Overlay {
                data: layer,
                status: status_layer,
                changed: edits,
                committed,
                ..
            } = &mut *overlay;
            let old_data = layer.own(key).cloned().unwrap_or_default();
            let old_edits = edits.get(key).cloned().unwrap_or_default();

            let names: IndexSet<&String> = old_data.keys().chain(new_base.keys()).collect();
            let mut new_data = Data::new();
            let mut new_edits = IndexSet::new();
            for name in names {
                let local = old_data.get(name);
                let base = new_base.get(name);
                let value = if self.rebase_conflicts && old_edits.contains(name) {
                    if local != base {
                        new_edits.insert(name.clone());
                    }
                    local
                } else {
                    base
                };
                if let Some(value) = value {
                    new_data.insert(name.clone(), value.clone());
                }
            }

            if new_edits.is_empty() {
                layer.remove_own(key);
                status_layer.remove_own(key);
                edits.remove(key);
                committed.remove(key);
                (old_data, new_base.clone())
            } else {
                layer.set_own(key.clone(), new_data.clone());
                status_layer.set_own(key.clone(), Status::READY | Status::DIRTY | inherited);
                edits.insert(key.clone(), new_edits);
                committed.insert(key.clone(), new_base.clone());
                (old_data, new_data)
            }
        };
        tracing::debug!(%key, kept_local = self.has_own_record(key), "rebased record on parent update");

        let after = self.get_status(key);
        self.status_did_change(key, before, after);
        self.update_has_changes();
        let attributes = changed_attributes(Some(&old_data), &new_data);
        if !attributes.is_empty() {
            self.record_did_change(key, attributes.clone());
            for child in self.children.live() {
                child.parent_did_update_data(key, &attributes);
            }
        }
    }
}

impl EventTarget for NestedStore {
    fn event_object(&self) -> &Object {
        &self.object
    }
}

impl Drop for NestedStore {
    fn drop(&mut self) {
        self.parent.remove_nested(self.id);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

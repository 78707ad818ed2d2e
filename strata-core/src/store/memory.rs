//! In-memory Root Store
//!
//! The root of a store tree. Writes apply immediately (there is no remote
//! source to commit to), and every change is pushed down to the nested
//! stores through the [`NestedListener`] callbacks.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::nested::RecordChange;
use super::{changed_attributes, Children, Data, NestedListener, Status, Store, StoreId, StoreKey};
use crate::error::{Error, Result};
use crate::reactive::{Event, EventTarget, Object};

#[derive(Default)]
struct Records {
    data: HashMap<StoreKey, Data>,
    status: HashMap<StoreKey, Status>,
}

/// A root store holding committed records in memory.
pub struct MemoryStore {
    id: StoreId,
    object: Object,
    records: RefCell<Records>,
    children: Children,
}

impl MemoryStore {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            id: StoreId::new(),
            object: Object::new(),
            records: RefCell::new(Records::default()),
            children: Children::default(),
        })
    }

    /// Load data delivered by a source. A loaded record is updated in place;
    /// any other record becomes `READY`.
    pub fn source_did_fetch_data(&self, key: &StoreKey, data: Data) {
        let previous = self.get_status(key);
        let old = self.records.borrow_mut().data.insert(key.clone(), data.clone());
        let changed = changed_attributes(old.as_ref(), &data);
        tracing::debug!(%key, status = %previous, changed = changed.len(), "source delivered record");

        if previous.is_ready() {
            self.set_status(key, previous - Status::INHERITED);
            if !changed.is_empty() {
                self.record_did_change(key, changed.clone());
                for child in self.children.live() {
                    child.parent_did_update_data(key, &changed);
                }
            }
        } else {
            self.set_status(key, Status::READY);
            self.record_did_change(key, changed.clone());
            for child in self.children.live() {
                child.parent_did_set_data(key, &changed);
            }
        }
    }

    /// Number of live nested stores.
    pub fn nested_count(&self) -> usize {
        self.children.len()
    }

    fn set_status(&self, key: &StoreKey, status: Status) {
        let previous = self
            .records
            .borrow_mut()
            .status
            .insert(key.clone(), status)
            .unwrap_or(Status::EMPTY);
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
}

impl Store for MemoryStore {
    fn store_id(&self) -> StoreId {
        self.id
    }

    fn get_status(&self, key: &StoreKey) -> Status {
        self.records
            .borrow()
            .status
            .get(key)
            .copied()
            .unwrap_or(Status::EMPTY)
    }

    fn get_data(&self, key: &StoreKey) -> Option<Data> {
        self.records.borrow().data.get(key).cloned()
    }

    fn create_record(&self, key: &StoreKey, data: Data) -> Result<()> {
        let status = self.get_status(key);
        if !status.intersects(Status::EMPTY | Status::DESTROYED) {
            return Err(Error::InvalidState {
                operation: "create",
                key: key.clone(),
                status: status.to_string(),
            });
        }
        let attributes: Vec<String> = data.keys().cloned().collect();
        self.records.borrow_mut().data.insert(key.clone(), data);
        self.set_status(key, Status::READY);
        self.record_did_change(key, attributes.clone());
        for child in self.children.live() {
            child.parent_did_set_data(key, &attributes);
        }
        Ok(())
    }

    fn update_data(&self, key: &StoreKey, data: &Data, _change_is_dirty: bool) -> Result<bool> {
        let changed = {
            let mut records = self.records.borrow_mut();
            let Some(current) = records.data.get_mut(key) else {
                tracing::warn!(%key, "update of a record that is not loaded");
                return Err(Error::UnknownRecord(key.clone()));
            };
            let mut changed = Vec::new();
            for (attribute, value) in data {
                if current.get(attribute) != Some(value) {
                    current.insert(attribute.clone(), value.clone());
                    changed.push(attribute.clone());
                }
            }
            changed
        };
        if changed.is_empty() {
            return Ok(false);
        }
        self.record_did_change(key, changed.clone());
        for child in self.children.live() {
            child.parent_did_update_data(key, &changed);
        }
        Ok(true)
    }

    fn destroy_record(&self, key: &StoreKey) -> Result<()> {
        let status = self.get_status(key);
        if !status.is_ready() {
            return Err(Error::InvalidState {
                operation: "destroy",
                key: key.clone(),
                status: status.to_string(),
            });
        }
        self.records.borrow_mut().data.remove(key);
        self.set_status(key, Status::DESTROYED);
        Ok(())
    }

    fn set_obsolete(&self, key: &StoreKey) {
        let status = self.get_status(key);
        self.set_status(key, status | Status::OBSOLETE);
    }

    fn set_loading(&self, key: &StoreKey) {
        let status = self.get_status(key);
        self.set_status(key, status | Status::LOADING);
    }

    fn add_nested(&self, nested: Weak<dyn NestedListener>) {
        self.children.add(nested);
    }

    fn remove_nested(&self, id: StoreId) {
        self.children.remove(id);
    }
}

impl EventTarget for MemoryStore {
    fn event_object(&self) -> &Object {
        &self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn data(value: serde_json::Value) -> Data {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Data::new(),
        }
    }

    #[test]
    fn fetched_records_become_ready() {
        let store = MemoryStore::new();
        let key = StoreKey::from("k1");
        assert_eq!(store.get_status(&key), Status::EMPTY);

        store.set_loading(&key);
        assert_eq!(store.get_status(&key), Status::EMPTY | Status::LOADING);

        store.source_did_fetch_data(&key, data(json!({ "a": 1 })));
        assert_eq!(store.get_status(&key), Status::READY);
        assert_eq!(store.get_data(&key), Some(data(json!({ "a": 1 }))));
    }

    #[test]
    fn refetch_clears_obsolete_and_reports_changed_attributes() {
        let store = MemoryStore::new();
        let key = StoreKey::from("k1");
        store.source_did_fetch_data(&key, data(json!({ "a": 1, "b": 1 })));
        store.set_obsolete(&key);
        assert!(store.get_status(&key).contains(Status::OBSOLETE));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        store.on("record:changed", move |event| {
            if let Some(change) = event.detail::<RecordChange>() {
                seen_clone.borrow_mut().push(change.attributes.clone());
            }
            Ok(())
        });

        store.source_did_fetch_data(&key, data(json!({ "a": 1, "b": 2 })));
        assert_eq!(store.get_status(&key), Status::READY);
        assert_eq!(*seen.borrow(), vec![vec!["b".to_string()]]);
    }

    #[test]
    fn create_update_destroy() {
        let store = MemoryStore::new();
        let key = StoreKey::from("k1");
        store.create_record(&key, data(json!({ "a": 1 }))).unwrap();
        assert!(store.create_record(&key, Data::new()).is_err());

        assert!(store.update_data(&key, &data(json!({ "a": 2 })), true).unwrap());
        assert!(!store.update_data(&key, &data(json!({ "a": 2 })), true).unwrap());

        store.destroy_record(&key).unwrap();
        assert_eq!(store.get_status(&key), Status::DESTROYED);
        assert_eq!(store.get_data(&key), None);
        assert!(matches!(
            store.update_data(&key, &Data::new(), true),
            Err(Error::UnknownRecord(_))
        ));
    }
}

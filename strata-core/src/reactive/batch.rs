//! Change Batches
//!
//! A batch holds back observer notifications on one object until it closes.
//! Batches nest: only the outermost close delivers, and every key that
//! changed more than once is reported once, with its earliest old value and
//! its latest new value.
//!
//! [`ChangeBatch`] is a guard around `begin_property_changes` and
//! `end_property_changes` so the batch closes even on early return.

use super::object::Object;

/// Guard that closes a change batch when dropped.
#[must_use = "the batch closes as soon as the guard is dropped"]
pub struct ChangeBatch {
    object: Object,
}

impl Object {
    /// Open a change batch on this object.
    pub fn batch(&self) -> ChangeBatch {
        self.begin_property_changes();
        ChangeBatch {
            object: self.clone(),
        }
    }
}

impl ChangeBatch {
    /// The object this batch holds notifications for.
    pub fn object(&self) -> &Object {
        &self.object
    }
}

impl Drop for ChangeBatch {
    fn drop(&mut self) {
        self.object.end_property_changes();
    }
}

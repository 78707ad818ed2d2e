//! Remote Queries
//!
//! A query is a live, ordered list of store keys fetched from a [`Source`].
//! Each fetch result replaces the list; the difference to the previous list
//! is reported so views can animate and pending range requests stay on the
//! same items.
//!
//! # How Reconciliation Works
//!
//! 1. Scan from the front for the first index where the lists differ.
//! 2. Scan from the back for the common suffix, never crossing the first
//!    change.
//! 3. In the region between, a new key that sat at the same index in the old
//!    list is unchanged; every other new key is added and every unmatched
//!    old key is removed.
//! 4. The first fetch has nothing to diff against: it only reports the whole
//!    range as changed.
//!
//! Status, length and state are updated inside one change batch. Then
//! `query:updated` fires (if the list changed and this was not the first
//! fetch) and `query:idsLoaded` always fires.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::source::Source;
use super::{Status, StoreKey};
use crate::config::QueryConfig;
use crate::error::{report, Result};
use crate::reactive::{Event, EventTarget, Object, ObserverId, Value, CONTENT_KEY};

/// When an obsolete query refetches by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoRefresh {
    Never,
    /// Only while something observes the query's contents.
    #[default]
    IfObserved,
    Always,
}

/// Filter and sort descriptors. Opaque to the query; the source reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    #[serde(rename = "where")]
    pub filter: serde_json::Value,
    pub sort: serde_json::Value,
}

/// Detail of a `query:updated` event: what a refetch removed and added.
///
/// Removed indexes refer to the old list, added indexes to the new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryUpdate {
    pub removed_indexes: Vec<usize>,
    pub removed_store_keys: Vec<StoreKey>,
    pub added_indexes: Vec<usize>,
    pub added_store_keys: Vec<StoreKey>,
    pub total: usize,
}

impl QueryUpdate {
    pub fn is_empty(&self) -> bool {
        self.removed_indexes.is_empty() && self.added_indexes.is_empty()
    }
}

/// The difference between two key lists.
#[derive(Debug, Clone, PartialEq)]
pub struct ListDiff {
    /// First index that differs.
    pub first_change: usize,
    /// End (exclusive) of the range whose contents changed.
    pub range_end: usize,
    pub update: QueryUpdate,
}

/// Compare two key lists.
pub fn diff_store_keys(old: &[StoreKey], new: &[StoreKey]) -> ListDiff {
    let (old_total, new_total) = (old.len(), new.len());
    let shortest = old_total.min(new_total);

    let mut first_change = 0;
    while first_change < shortest && old[first_change] == new[first_change] {
        first_change += 1;
    }

    let (mut old_end, mut new_end) = (old_total, new_total);
    while old_end > first_change && new_end > first_change && old[old_end - 1] == new[new_end - 1]
    {
        old_end -= 1;
        new_end -= 1;
    }

    let old_index: HashMap<&StoreKey, usize> = old[first_change..old_end]
        .iter()
        .enumerate()
        .map(|(offset, key)| (key, first_change + offset))
        .collect();
    let mut kept = vec![false; old_end - first_change];
    let mut update = QueryUpdate {
        total: new_total,
        ..QueryUpdate::default()
    };
    for (index, key) in new.iter().enumerate().take(new_end).skip(first_change) {
        if old_index.get(key) == Some(&index) {
            kept[index - first_change] = true;
        } else {
            update.added_indexes.push(index);
            update.added_store_keys.push(key.clone());
        }
    }
    for (offset, key) in old[first_change..old_end].iter().enumerate() {
        if !kept[offset] {
            update.removed_indexes.push(first_change + offset);
            update.removed_store_keys.push(key.clone());
        }
    }

    // A length change shifts everything after the first change.
    let range_end = if old_total == new_total {
        old_end.max(new_end)
    } else {
        old_total.max(new_total)
    };
    ListDiff {
        first_change,
        range_end,
        update,
    }
}

type RangeCallback = Box<dyn FnOnce(&[StoreKey], usize, usize)>;
type RangeObserverFn = Rc<dyn Fn(usize, usize) -> Result<()>>;

struct PendingRange {
    start: usize,
    end: usize,
    callback: RangeCallback,
}

struct RangeObserver {
    id: ObserverId,
    start: usize,
    end: usize,
    callback: RangeObserverFn,
}

struct QueryState {
    store_keys: Vec<StoreKey>,
    length: Option<usize>,
    state: Option<String>,
    status: Status,
    awaiting: Vec<PendingRange>,
    range_observers: Vec<RangeObserver>,
    fetch_callbacks: Vec<Box<dyn FnOnce()>>,
    obsolete_during_fetch: bool,
}

/// A remotely sourced list of store keys.
pub struct Query {
    object: Object,
    source: Rc<dyn Source>,
    options: QueryOptions,
    auto_refresh: AutoRefresh,
    state: RefCell<QueryState>,
}

impl Query {
    /// Create a query and issue its first fetch.
    pub fn new(source: Rc<dyn Source>, options: QueryOptions) -> Rc<Self> {
        Self::with_config(source, options, &QueryConfig::default())
    }

    pub fn with_config(
        source: Rc<dyn Source>,
        options: QueryOptions,
        config: &QueryConfig,
    ) -> Rc<Self> {
        let object = Object::builder()
            .value("status", Status::EMPTY)
            .value("length", Value::Null)
            .value("state", Value::Null)
            .build();
        let query = Rc::new(Self {
            object,
            source,
            options,
            auto_refresh: config.auto_refresh,
            state: RefCell::new(QueryState {
                store_keys: Vec::new(),
                length: None,
                state: None,
                status: Status::EMPTY,
                awaiting: Vec::new(),
                range_observers: Vec::new(),
                fetch_callbacks: Vec::new(),
                obsolete_during_fetch: false,
            }),
        });

        let weak = Rc::downgrade(&query);
        query.on("query:updated", move |event| {
            if let (Some(query), Some(update)) = (weak.upgrade(), event.detail::<QueryUpdate>()) {
                query.adjust_id_fetches(update);
            }
            Ok(())
        });
        let weak = Rc::downgrade(&query);
        query.on("query:idsLoaded", move |_| {
            if let Some(query) = weak.upgrade() {
                query.ids_were_fetched();
            }
            Ok(())
        });

        query.fetch(false, None);
        query
    }

    /// The observable object carrying `status`, `length` and `state`.
    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn status(&self) -> Status {
        self.state.borrow().status
    }

    /// Number of results, or `None` before the first fetch completes.
    pub fn length(&self) -> Option<usize> {
        self.state.borrow().length
    }

    /// The source's cursor for the current results.
    pub fn state(&self) -> Option<String> {
        self.state.borrow().state.clone()
    }

    pub fn store_keys(&self) -> Vec<StoreKey> {
        self.state.borrow().store_keys.clone()
    }

    pub fn store_key_at(&self, index: usize) -> Option<StoreKey> {
        self.state.borrow().store_keys.get(index).cloned()
    }

    pub fn index_of_store_key(&self, key: &StoreKey) -> Option<usize> {
        self.state.borrow().store_keys.iter().position(|k| k == key)
    }

    fn set_status(&self, status: Status) {
        self.state.borrow_mut().status = status;
        self.object.set("status", status);
    }

    /// True if a range observer or a content observer is registered.
    pub fn is_observed(&self) -> bool {
        !self.state.borrow().range_observers.is_empty() || self.object.has_observers(CONTENT_KEY)
    }

    fn should_refresh(&self) -> bool {
        match self.auto_refresh {
            AutoRefresh::Never => false,
            AutoRefresh::IfObserved => self.is_observed(),
            AutoRefresh::Always => true,
        }
    }

    /// Ask the source for fresh results if forced, never fetched, or
    /// obsolete. Otherwise `callback` runs straight away.
    pub fn fetch(&self, force: bool, callback: Option<Box<dyn FnOnce()>>) {
        let status = self.status();
        if status.intersects(Status::DESTROYED | Status::NON_EXISTENT) {
            return;
        }
        let needed = force || status.intersects(Status::EMPTY | Status::OBSOLETE);
        if !needed {
            if let Some(callback) = callback {
                callback();
            }
            return;
        }
        {
            let mut state = self.state.borrow_mut();
            state.fetch_callbacks.extend(callback);
            if status.contains(Status::LOADING) && !force {
                return;
            }
            state.obsolete_during_fetch = false;
        }
        tracing::debug!(%status, force, "fetching query");
        self.set_status(status | Status::LOADING);
        report(self.source.fetch_query(self));
    }

    /// Mark the results out of date and refetch if the refresh policy says
    /// so.
    pub fn set_obsolete(&self) {
        let status = self.status();
        if status.intersects(Status::DESTROYED | Status::NON_EXISTENT) {
            return;
        }
        if status.contains(Status::LOADING) {
            self.state.borrow_mut().obsolete_during_fetch = true;
        }
        self.set_status(status | Status::OBSOLETE);
        if self.should_refresh() {
            self.fetch(false, None);
        }
    }

    /// Reconcile the results of a fetch.
    pub fn source_did_fetch_query(&self, store_keys: Vec<StoreKey>, state: impl Into<String>) {
        let new_state = state.into();
        if self
            .status()
            .intersects(Status::DESTROYED | Status::NON_EXISTENT)
        {
            return;
        }
        let new_total = store_keys.len();
        let (diff, first_fetch) = {
            let state = self.state.borrow();
            match state.length {
                None => (None, true),
                Some(_) => (Some(diff_store_keys(&state.store_keys, &store_keys)), false),
            }
        };
        let (first_change, range_end) = match &diff {
            Some(diff) => (diff.first_change, diff.range_end),
            None => (0, new_total),
        };
        tracing::debug!(
            total = new_total,
            first_fetch,
            first_change,
            range_end,
            "query results arrived"
        );

        let status = {
            let mut state = self.state.borrow_mut();
            state.store_keys = store_keys;
            state.length = Some(new_total);
            state.state = Some(new_state.clone());
            let mut status = Status::READY;
            if std::mem::take(&mut state.obsolete_during_fetch) {
                status |= Status::OBSOLETE;
            }
            state.status = status;
            status
        };
        {
            let _batch = self.object.batch();
            self.object.set("status", status);
            self.object.set("length", new_total);
            self.object.set("state", new_state.as_str());
            if first_change < range_end {
                self.range_did_change(first_change, range_end);
            }
        }

        if let Some(diff) = diff {
            if first_change < range_end && !diff.update.is_empty() {
                self.fire_event(Event::new("query:updated", &self.object).with_detail(diff.update));
            }
        }
        self.fire("query:idsLoaded");

        let callbacks = std::mem::take(&mut self.state.borrow_mut().fetch_callbacks);
        for callback in callbacks {
            callback();
        }
        if status.contains(Status::OBSOLETE) && self.should_refresh() {
            self.fetch(false, None);
        }
    }

    /// Call `callback` with the keys in `[start, end)`. Returns true if the
    /// call had to wait for the first fetch.
    pub fn get_store_keys_for_objects_in_range<F>(&self, start: usize, end: usize, callback: F) -> bool
    where
        F: FnOnce(&[StoreKey], usize, usize) + 'static,
    {
        let Some(length) = self.length() else {
            self.state.borrow_mut().awaiting.push(PendingRange {
                start,
                end,
                callback: Box::new(callback),
            });
            self.fetch(false, None);
            return true;
        };
        let end = end.min(length);
        let start = start.min(end);
        let keys = self.state.borrow().store_keys[start..end].to_vec();
        callback(&keys, start, end);
        false
    }

    /// Ranges still waiting for the first fetch.
    pub fn pending_ranges(&self) -> Vec<(usize, usize)> {
        self.state
            .borrow()
            .awaiting
            .iter()
            .map(|pending| (pending.start, pending.end))
            .collect()
    }

    fn ids_were_fetched(&self) {
        if self.length().is_none() {
            return;
        }
        let awaiting = std::mem::take(&mut self.state.borrow_mut().awaiting);
        for pending in awaiting {
            self.get_store_keys_for_objects_in_range(pending.start, pending.end, pending.callback);
        }
    }

    /// Shift pending ranges so they keep pointing at the same items after
    /// `update`.
    pub fn adjust_id_fetches(&self, update: &QueryUpdate) {
        let mut state = self.state.borrow_mut();
        for pending in &mut state.awaiting {
            let (start, end) = (pending.start, pending.end);
            let removed_before_start = update.removed_indexes.iter().filter(|&&i| i < start).count();
            let removed_before_end = update.removed_indexes.iter().filter(|&&i| i < end).count();
            let added_at_start = update.added_indexes.iter().filter(|&&i| i <= start).count();
            let added_before_end = update.added_indexes.iter().filter(|&&i| i < end).count();
            pending.start = (start + added_at_start).saturating_sub(removed_before_start);
            pending.end = (end + added_before_end).saturating_sub(removed_before_end);
        }
    }

    /// Be told when anything in `[start, end)` changes.
    pub fn add_range_observer<F>(&self, start: usize, end: usize, callback: F) -> ObserverId
    where
        F: Fn(usize, usize) -> Result<()> + 'static,
    {
        let id = ObserverId::new();
        self.state.borrow_mut().range_observers.push(RangeObserver {
            id,
            start,
            end,
            callback: Rc::new(callback),
        });
        id
    }

    pub fn remove_range_observer(&self, id: ObserverId) {
        self.state
            .borrow_mut()
            .range_observers
            .retain(|observer| observer.id != id);
    }

    /// Notify the range observers overlapping `[start, end)` and the content
    /// observers.
    pub fn range_did_change(&self, start: usize, end: usize) {
        let callbacks: Vec<RangeObserverFn> = self
            .state
            .borrow()
            .range_observers
            .iter()
            .filter(|observer| observer.start < end && observer.end > start)
            .map(|observer| Rc::clone(&observer.callback))
            .collect();
        for callback in callbacks {
            report(callback(start, end));
        }
        self.object
            .property_did_change(CONTENT_KEY, Value::Undefined, Value::Undefined);
    }

    /// Tear the query down. A query that never loaded ends up
    /// `NON_EXISTENT`, any other `DESTROYED`.
    pub fn destroy(&self) {
        let status = self.status();
        let terminal = if status.is_empty_record() {
            Status::NON_EXISTENT
        } else {
            Status::DESTROYED
        };
        {
            let mut state = self.state.borrow_mut();
            state.awaiting.clear();
            state.range_observers.clear();
            state.fetch_callbacks.clear();
        }
        self.set_status(terminal);
        self.object.destroy();
    }
}

impl EventTarget for Query {
    fn event_object(&self) -> &Object {
        &self.object
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observer;
    use crate::store::FnSource;
    use std::cell::Cell;

    fn keys(names: &[&str]) -> Vec<StoreKey> {
        names.iter().map(|n| StoreKey::from(*n)).collect()
    }

    /// A source that counts fetches and never answers.
    fn silent_source() -> (Rc<Cell<usize>>, Rc<dyn Source>) {
        let fetches = Rc::new(Cell::new(0));
        let counter = fetches.clone();
        let source = FnSource::new(move |_: &Query| {
            counter.set(counter.get() + 1);
            None
        });
        (fetches, Rc::new(source))
    }

    fn loaded(names: &[&str]) -> (Rc<Cell<usize>>, Rc<Query>) {
        let (fetches, source) = silent_source();
        let query = Query::new(source, QueryOptions::default());
        query.source_did_fetch_query(keys(names), "s1");
        (fetches, query)
    }

    #[test]
    fn diff_reports_removed_and_added_positions() {
        let diff = diff_store_keys(&keys(&["A", "B", "C", "D", "E"]), &keys(&["A", "X", "C", "D", "F"]));
        assert_eq!(diff.first_change, 1);
        assert_eq!(diff.range_end, 5);
        assert_eq!(diff.update.removed_store_keys, keys(&["B", "E"]));
        assert_eq!(diff.update.removed_indexes, vec![1, 4]);
        assert_eq!(diff.update.added_store_keys, keys(&["X", "F"]));
        assert_eq!(diff.update.added_indexes, vec![1, 4]);
    }

    #[test]
    fn diff_of_pure_insertion_and_removal() {
        let diff = diff_store_keys(&keys(&["A", "C"]), &keys(&["A", "B", "C"]));
        assert_eq!(diff.update.added_indexes, vec![1]);
        assert!(diff.update.removed_indexes.is_empty());
        assert_eq!((diff.first_change, diff.range_end), (1, 3));

        let diff = diff_store_keys(&keys(&["A", "B", "C"]), &keys(&["A", "C"]));
        assert_eq!(diff.update.removed_store_keys, keys(&["B"]));
        assert!(diff.update.added_indexes.is_empty());
        assert_eq!((diff.first_change, diff.range_end), (1, 3));
    }

    #[test]
    fn diff_of_identical_lists_is_empty() {
        let diff = diff_store_keys(&keys(&["A", "B"]), &keys(&["A", "B"]));
        assert!(diff.update.is_empty());
        assert_eq!(diff.first_change, diff.range_end);
    }

    #[test]
    fn moved_keys_are_removed_and_added() {
        let diff = diff_store_keys(&keys(&["A", "B", "C"]), &keys(&["B", "A", "C"]));
        assert_eq!(diff.update.removed_store_keys, keys(&["A", "B"]));
        assert_eq!(diff.update.added_store_keys, keys(&["B", "A"]));
    }

    #[test]
    fn first_fetch_moves_from_empty_through_loading_to_ready() {
        let (fetches, source) = silent_source();
        let query = Query::new(source, QueryOptions::default());
        assert_eq!(fetches.get(), 1);
        assert_eq!(query.status(), Status::EMPTY | Status::LOADING);
        assert_eq!(query.length(), None);

        query.source_did_fetch_query(keys(&["A", "B"]), "s1");
        assert_eq!(query.status(), Status::READY);
        assert_eq!(query.length(), Some(2));
        assert_eq!(query.state().as_deref(), Some("s1"));
        assert_eq!(query.object().get("length"), Value::from(2));
        assert_eq!(query.index_of_store_key(&StoreKey::from("B")), Some(1));
        assert_eq!(query.store_key_at(5), None);
    }

    #[test]
    fn first_fetch_fires_ids_loaded_but_not_updated() {
        let (_, source) = silent_source();
        let query = Query::new(source, QueryOptions::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        for kind in ["query:updated", "query:idsLoaded"] {
            let log = log.clone();
            query.on(kind, move |event| {
                log.borrow_mut().push(event.kind().to_owned());
                Ok(())
            });
        }

        query.source_did_fetch_query(keys(&["A"]), "s1");
        assert_eq!(*log.borrow(), vec!["query:idsLoaded"]);

        query.source_did_fetch_query(keys(&["A", "B"]), "s2");
        assert_eq!(*log.borrow(), vec!["query:idsLoaded", "query:updated", "query:idsLoaded"]);
    }

    #[test]
    fn fetch_is_skipped_when_current() {
        let (fetches, query) = loaded(&["A"]);
        let called = Rc::new(Cell::new(false));
        let called_clone = called.clone();
        query.fetch(false, Some(Box::new(move || called_clone.set(true))));
        assert!(called.get());
        assert_eq!(fetches.get(), 1);

        query.fetch(true, None);
        assert_eq!(fetches.get(), 2);
        assert!(query.status().contains(Status::LOADING));
    }

    #[test]
    fn obsolete_refetches_only_when_observed() {
        let (fetches, query) = loaded(&["A"]);
        query.set_obsolete();
        assert_eq!(query.status(), Status::READY | Status::OBSOLETE);
        assert_eq!(fetches.get(), 1);

        query.object().add_observer_for_key(CONTENT_KEY, Observer::new(|_, _, _, _| Ok(())));
        query.set_obsolete();
        assert_eq!(fetches.get(), 2);
        assert_eq!(query.status(), Status::READY | Status::OBSOLETE | Status::LOADING);

        query.source_did_fetch_query(keys(&["A"]), "s2");
        assert_eq!(query.status(), Status::READY);
    }

    #[test]
    fn always_policy_refetches_unobserved_queries() {
        let (fetches, source) = silent_source();
        let config = QueryConfig {
            auto_refresh: AutoRefresh::Always,
        };
        let query = Query::with_config(source, QueryOptions::default(), &config);
        query.source_did_fetch_query(keys(&["A"]), "s1");
        query.set_obsolete();
        assert_eq!(fetches.get(), 2);
    }

    #[test]
    fn obsolete_during_fetch_survives_reconciliation() {
        let (_, source) = silent_source();
        let config = QueryConfig {
            auto_refresh: AutoRefresh::Never,
        };
        let query = Query::with_config(source, QueryOptions::default(), &config);
        query.set_obsolete();
        query.source_did_fetch_query(keys(&["A"]), "s1");
        assert_eq!(query.status(), Status::READY | Status::OBSOLETE);
    }

    #[test]
    fn range_requests_wait_for_the_first_fetch() {
        let (_, source) = silent_source();
        let query = Query::new(source, QueryOptions::default());
        let seen = Rc::new(RefCell::new(None));
        let seen_clone = seen.clone();
        let waited = query.get_store_keys_for_objects_in_range(1, 10, move |keys, start, end| {
            *seen_clone.borrow_mut() = Some((keys.to_vec(), start, end));
        });
        assert!(waited);
        assert_eq!(query.pending_ranges(), vec![(1, 10)]);

        query.source_did_fetch_query(keys(&["A", "B", "C"]), "s1");
        assert_eq!(*seen.borrow(), Some((keys(&["B", "C"]), 1, 3)));
        assert!(query.pending_ranges().is_empty());
    }

    #[test]
    fn pending_ranges_follow_their_items() {
        let (_, source) = silent_source();
        let query = Query::new(source, QueryOptions::default());
        query.get_store_keys_for_objects_in_range(10, 20, |_, _, _| {});

        let shifted_both = QueryUpdate {
            removed_indexes: vec![5],
            added_indexes: vec![5],
            ..QueryUpdate::default()
        };
        query.adjust_id_fetches(&shifted_both);
        assert_eq!(query.pending_ranges(), vec![(10, 20)]);

        let insert_at_start = QueryUpdate {
            added_indexes: vec![10],
            ..QueryUpdate::default()
        };
        query.adjust_id_fetches(&insert_at_start);
        assert_eq!(query.pending_ranges(), vec![(11, 21)]);

        let insert_at_end = QueryUpdate {
            added_indexes: vec![21],
            ..QueryUpdate::default()
        };
        query.adjust_id_fetches(&insert_at_end);
        assert_eq!(query.pending_ranges(), vec![(11, 21)]);

        let remove_inside = QueryUpdate {
            removed_indexes: vec![15],
            ..QueryUpdate::default()
        };
        query.adjust_id_fetches(&remove_inside);
        assert_eq!(query.pending_ranges(), vec![(11, 20)]);
    }

    #[test]
    fn range_observers_see_overlapping_changes() {
        let (_, query) = loaded(&["A", "B", "C", "D"]);
        let hits = Rc::new(RefCell::new(Vec::new()));
        let (low, high) = (hits.clone(), hits.clone());
        query.add_range_observer(0, 2, move |start, end| {
            low.borrow_mut().push(("low", start, end));
            Ok(())
        });
        let id = query.add_range_observer(2, 4, move |start, end| {
            high.borrow_mut().push(("high", start, end));
            Ok(())
        });

        query.source_did_fetch_query(keys(&["A", "B", "C", "X"]), "s2");
        assert_eq!(*hits.borrow(), vec![("high", 3, 4)]);

        query.remove_range_observer(id);
        query.source_did_fetch_query(keys(&["Y", "B", "C", "X"]), "s3");
        assert_eq!(hits.borrow().last(), Some(&("low", 0, 1)));
        assert_eq!(hits.borrow().len(), 2);
    }

    #[test]
    fn destroy_distinguishes_never_loaded() {
        let (_, source) = silent_source();
        let never = Query::new(source, QueryOptions::default());
        never.destroy();
        assert_eq!(never.status(), Status::NON_EXISTENT);

        let (_, loaded) = loaded(&["A"]);
        loaded.destroy();
        assert_eq!(loaded.status(), Status::DESTROYED);
        loaded.source_did_fetch_query(keys(&["B"]), "late");
        assert_eq!(loaded.store_keys(), keys(&["A"]));
    }

    #[test]
    fn synchronous_sources_answer_during_construction() {
        let source = FnSource::new(|query: &Query| {
            assert!(query.options().filter.is_null());
            Some((keys(&["A", "B"]), "s1".to_owned()))
        });
        let query = Query::new(Rc::new(source), QueryOptions::default());
        assert_eq!(query.status(), Status::READY);
        assert_eq!(query.store_keys(), keys(&["A", "B"]));
    }
}

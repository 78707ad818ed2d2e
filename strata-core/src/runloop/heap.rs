//! Binary Heap
//!
//! A binary min-heap ordered by a caller-supplied comparator. Unlike
//! `std::collections::BinaryHeap` it supports removing an arbitrary element,
//! which the run loop needs to cancel a scheduled timeout.

use std::cmp::Ordering;
use std::fmt;

/// A min-heap: `peek` and `pop` return the element that compares smallest.
pub struct Heap<T> {
    data: Vec<T>,
    comparator: Box<dyn Fn(&T, &T) -> Ordering>,
}

impl<T> Heap<T> {
    pub fn new<F>(comparator: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + 'static,
    {
        Self {
            data: Vec::new(),
            comparator: Box::new(comparator),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn peek(&self) -> Option<&T> {
        self.data.first()
    }

    pub fn push(&mut self, item: T) {
        self.data.push(item);
        self.up(self.data.len() - 1);
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.data.is_empty() {
            return None;
        }
        let item = self.data.swap_remove(0);
        if !self.data.is_empty() {
            self.down(0);
        }
        Some(item)
    }

    /// Remove the first element matching `predicate`.
    pub fn remove_where<P>(&mut self, predicate: P) -> Option<T>
    where
        P: Fn(&T) -> bool,
    {
        let index = self.data.iter().position(predicate)?;
        let item = self.data.swap_remove(index);
        if index < self.data.len() {
            // The element moved into `index` may belong above or below it.
            let index = self.up(index);
            self.down(index);
        }
        Some(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    fn less(&self, a: usize, b: usize) -> bool {
        (self.comparator)(&self.data[a], &self.data[b]) == Ordering::Less
    }

    fn up(&mut self, mut index: usize) -> usize {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.less(index, parent) {
                break;
            }
            self.data.swap(index, parent);
            index = parent;
        }
        index
    }

    fn down(&mut self, mut index: usize) {
        let len = self.data.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;
            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.data.swap(index, smallest);
            index = smallest;
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap").field("data", &self.data).finish()
    }
}

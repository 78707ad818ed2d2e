//! Dependent-Key Graph
//!
//! Computed properties declare which keys they are computed from. This module
//! inverts those declarations into a graph from a source key to the computed
//! keys that read it, and answers "which keys must be invalidated when `key`
//! changes?" with the transitive closure.
//!
//! # Algorithm
//!
//! 1. The direct-dependents map is built once from the declarations.
//! 2. The closure for a key is found by breadth-first search over that map,
//!    visiting each key once, so cycles in declarations terminate.
//! 3. Closures are memoized per key until the declarations change.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

/// Direct and transitive dependents of each property key on one object.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Source key -> computed keys that declared a dependency on it.
    dependents: HashMap<String, Vec<String>>,

    /// Memoized transitive closures.
    all_dependents: HashMap<String, Rc<[String]>>,
}

impl DependencyGraph {
    /// Build the graph from `(computed key, declared dependencies)` pairs.
    pub fn from_declarations<'a, I>(declarations: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for (key, depends_on) in declarations {
            for source in depends_on {
                let entry = dependents.entry(source.clone()).or_default();
                if !entry.iter().any(|k| k == key) {
                    entry.push(key.to_owned());
                }
            }
        }
        Self {
            dependents,
            all_dependents: HashMap::new(),
        }
    }

    /// Computed keys that declared a direct dependency on `key`.
    pub fn direct_dependents(&self, key: &str) -> &[String] {
        self.dependents.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every key that must be invalidated when `key` changes, nearest first.
    pub fn all_dependents(&mut self, key: &str) -> Rc<[String]> {
        if let Some(cached) = self.all_dependents.get(key) {
            return Rc::clone(cached);
        }

        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(key.to_owned());

        for dependent in self.direct_dependents(key) {
            queue.push_back(dependent.clone());
        }

        while let Some(next) = queue.pop_front() {
            if !visited.insert(next.clone()) {
                continue;
            }
            for dependent in self.direct_dependents(&next) {
                queue.push_back(dependent.clone());
            }
            result.push(next);
        }

        let closure: Rc<[String]> = Rc::from(result);
        self.all_dependents
            .insert(key.to_owned(), Rc::clone(&closure));
        closure
    }
}

//! Computed Properties
//!
//! A computed property is a property slot whose value is produced by a
//! function of the owning object rather than stored directly.
//!
//! # How Computed Properties Work
//!
//! 1. On first `get`, the getter runs and the result is cached in the
//!    object's metadata.
//!
//! 2. Later reads return the cached value.
//!
//! 3. When any property the computed property depends on (directly or
//!    transitively) changes, the cache entry is deleted. The next read
//!    recomputes.
//!
//! Volatile properties are never cached. Silent properties do not notify
//! observers when written.

use std::fmt;
use std::rc::Rc;

use super::object::Object;
use super::value::Value;

type Getter = dyn Fn(&Object) -> Value;
type Setter = dyn Fn(&Object, Value) -> Value;

/// Descriptor for a computed property slot.
#[derive(Clone)]
pub struct Computed {
    get: Rc<Getter>,
    set: Option<Rc<Setter>>,
    depends_on: Vec<String>,
    volatile: bool,
    silent: bool,
}

impl Computed {
    /// Create a read-only computed property.
    pub fn new<F>(get: F) -> Self
    where
        F: Fn(&Object) -> Value + 'static,
    {
        Self {
            get: Rc::new(get),
            set: None,
            depends_on: Vec::new(),
            volatile: false,
            silent: false,
        }
    }

    /// Accept writes. The setter's return value becomes the cached value.
    pub fn with_setter<F>(mut self, set: F) -> Self
    where
        F: Fn(&Object, Value) -> Value + 'static,
    {
        self.set = Some(Rc::new(set));
        self
    }

    /// Declare the keys this property is computed from.
    pub fn depends_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Never cache the value; every read recomputes.
    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    /// Do not notify observers when the property is written.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }

    pub(crate) fn compute(&self, object: &Object) -> Value {
        (self.get)(object)
    }

    /// Run the setter, if any.
    pub(crate) fn assign(&self, object: &Object, value: Value) -> Option<Value> {
        self.set.as_ref().map(|set| set(object, value))
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("depends_on", &self.depends_on)
            .field("volatile", &self.volatile)
            .field("silent", &self.silent)
            .field("writable", &self.is_writable())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn computes_on_first_access_and_caches() {
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();

        let object = Object::builder()
            .computed(
                "answer",
                Computed::new(move |_| {
                    call_count_clone.set(call_count_clone.get() + 1);
                    Value::from(42)
                }),
            )
            .build();

        // Not computed yet
        assert_eq!(call_count.get(), 0);

        assert_eq!(object.get("answer"), Value::from(42));
        assert_eq!(object.get("answer"), Value::from(42));
        assert_eq!(object.get("answer"), Value::from(42));
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn volatile_recomputes_every_read() {
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();

        let object = Object::builder()
            .computed(
                "now",
                Computed::new(move |_| {
                    call_count_clone.set(call_count_clone.get() + 1);
                    Value::from(call_count_clone.get())
                })
                .volatile(),
            )
            .build();

        assert_eq!(object.get("now"), Value::from(1));
        assert_eq!(object.get("now"), Value::from(2));
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn recomputes_after_dependency_changes() {
        let object = Object::builder()
            .value("first", "Ada")
            .value("last", "Lovelace")
            .computed(
                "full",
                Computed::new(|o| {
                    let first = o.get("first");
                    let last = o.get("last");
                    Value::from(format!(
                        "{} {}",
                        first.as_str().unwrap_or(""),
                        last.as_str().unwrap_or("")
                    ))
                })
                .depends_on(["first", "last"]),
            )
            .build();

        assert_eq!(object.get("full"), Value::from("Ada Lovelace"));
        object.set("first", "Augusta");
        assert_eq!(object.get("full"), Value::from("Augusta Lovelace"));
    }

    #[test]
    fn setter_result_is_cached() {
        let object = Object::builder()
            .value("raw", 0)
            .computed(
                "doubled",
                Computed::new(|o| Value::from(o.get("raw").as_i64().unwrap_or(0) * 2))
                    .with_setter(|o, v| {
                        let half = v.as_i64().unwrap_or(0) / 2;
                        o.set("raw", half);
                        Value::from(half * 2)
                    })
                    .depends_on(["raw"]),
            )
            .build();

        object.set("doubled", 9);
        assert_eq!(object.get("raw"), Value::from(4));
        assert_eq!(object.get("doubled"), Value::from(8));
    }
}

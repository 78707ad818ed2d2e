//! Strata Core
//!
//! This crate provides the core runtime for the Strata UI framework.
//! It implements:
//!
//! - Observable objects with computed properties, dependent keys and batched
//!   change notification
//! - Bindings that keep two property paths in sync
//! - A run loop with ordered queues, timeouts and animation frames
//! - A data store tree with copy-on-write nested stores and remote queries
//!
//! Everything is single threaded. Handles are reference counted and cloning
//! one shares the underlying state.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: objects, observers, computed properties, events, bindings
//! - `runloop`: queues, the timeout heap and the platform seam
//! - `store`: record status, root and nested stores, queries
//! - `config`: tunables loaded from JSON
//! - `error`: the error type and the global error hook
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_core::reactive::{Computed, Object, Observer};
//!
//! let person = Object::builder()
//!     .value("first", "Ada")
//!     .value("last", "Lovelace")
//!     .computed(
//!         "full",
//!         Computed::new(|o| {
//!             let first = o.get("first");
//!             let last = o.get("last");
//!             format!("{} {}", first.as_str().unwrap_or(""), last.as_str().unwrap_or("")).into()
//!         })
//!         .depends_on(["first", "last"]),
//!     )
//!     .build();
//!
//! person.add_observer_for_key("full", Observer::new(|_, _, _, new| {
//!     println!("full name is now {new:?}");
//!     Ok(())
//! }));
//! person.set("first", "Augusta");
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod runloop;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};

//! Error Types and the Global Error Hook
//!
//! Programmer errors (an unresolvable binding endpoint, a write to a record
//! that does not exist) are returned as [`Error`] values. Errors returned by
//! user callbacks never escape a dispatch loop: the run loop, the observer
//! notifier and the event dispatcher hand them to [`did_error`], which calls
//! the process-wide hook.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use thiserror::Error;

use crate::store::StoreKey;

/// Errors produced by the reactive kernel and the data store.
#[derive(Debug, Error)]
pub enum Error {
    /// A binding endpoint could not be resolved, even after the deferred retry.
    #[error("binding endpoint `{path}` could not be resolved to an object")]
    UnresolvedBinding { path: String },

    /// The store has no data for this key.
    #[error("no record loaded for store key `{0}`")]
    UnknownRecord(StoreKey),

    /// The record's status does not allow the requested operation.
    #[error("cannot {operation} record `{key}` with status {status}")]
    InvalidState {
        operation: &'static str,
        key: StoreKey,
        status: String,
    },

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A user callback reported a failure.
    #[error("{0}")]
    Handler(String),
}

impl Error {
    /// Build a handler error from any displayable message.
    pub fn handler(message: impl Into<String>) -> Self {
        Error::Handler(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type Hook = Arc<dyn Fn(&Error) + Send + Sync>;

static ERROR_HOOK: OnceLock<RwLock<Option<Hook>>> = OnceLock::new();

fn hook() -> &'static RwLock<Option<Hook>> {
    ERROR_HOOK.get_or_init(|| RwLock::new(None))
}

/// Replace the global error hook.
///
/// The hook receives every error caught at a dispatch boundary. There is one
/// hook per process; components that want different handling must replace it.
pub fn set_error_hook<F>(f: F)
where
    F: Fn(&Error) + Send + Sync + 'static,
{
    *hook().write() = Some(Arc::new(f));
}

/// Restore the default hook, which logs the error.
pub fn reset_error_hook() {
    *hook().write() = None;
}

/// Route an error caught at a dispatch boundary to the global hook.
pub fn did_error(error: &Error) {
    // Clone the hook out so it may itself replace the hook.
    let current = hook().read().clone();
    match current {
        Some(f) => f(error),
        None => tracing::error!(%error, "uncaught error in callback"),
    }
}

/// Route the error of `result`, if any, to the global hook.
pub(crate) fn report(result: Result<()>) {
    if let Err(error) = result {
        did_error(&error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_offender() {
        let err = Error::UnresolvedBinding {
            path: "content.title".into(),
        };
        assert!(err.to_string().contains("content.title"));

        let err = Error::UnknownRecord(StoreKey::from("k1"));
        assert!(err.to_string().contains("k1"));
    }

    #[test]
    fn config_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse.into();
        assert!(matches!(err, Error::Config(_)));
    }
}

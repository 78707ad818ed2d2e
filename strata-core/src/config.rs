//! Configuration
//!
//! Every section has defaults, so an empty JSON object is a valid
//! configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::runloop::Queue;
use crate::store::AutoRefresh;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run_loop: RunLoopConfig,
    pub binding: BindingConfig,
    pub store: StoreConfig,
    pub query: QueryConfig,
}

impl Config {
    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLoopConfig {
    /// Run the render queue without waiting for an animation frame. For hosts
    /// that never paint.
    pub may_redraw: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Queue bindings sync in; `null` syncs immediately.
    pub queue: Option<Queue>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            queue: Some(Queue::Bindings),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Keep local edits when the parent store updates the same record.
    /// When false, parent updates overwrite local edits.
    pub rebase_conflicts: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            rebase_conflicts: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub auto_refresh: AutoRefresh,
}

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

/// Restores view state when navigating back or forward onto an entry.
pub type RestoreFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PushMode {
    Push,
    /// Overwrite the current entry, used for transitional views.
    Replace,
}

#[derive(Clone)]
pub struct NavigationEntry {
    pub view: String,
    pub params: Option<Value>,
    pub restore: Option<RestoreFn>,
}

impl NavigationEntry {
    pub fn new(view: &str) -> NavigationEntry {
        return NavigationEntry {
            view: view.to_string(),
            params: None,
            restore: None,
        };
    }

    pub fn with_params(mut self, params: Value) -> NavigationEntry {
        self.params = Some(params);
        return self;
    }

    pub fn with_restore(mut self, restore: RestoreFn) -> NavigationEntry {
        self.restore = Some(restore);
        return self;
    }

    pub fn same_location(&self, other: &NavigationEntry) -> bool {
        return self.view == other.view && self.params == other.params;
    }
}

impl fmt::Debug for NavigationEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        return f
            .debug_struct("NavigationEntry")
            .field("view", &self.view)
            .field("params", &self.params)
            .field("restore", &self.restore.is_some())
            .finish();
    }
}

/// Result of a successful back or forward move.
#[derive(Debug)]
pub struct NavigationOutcome {
    pub entry: NavigationEntry,
    /// Set when the entry's restore callback failed. The move still happened.
    pub warning: Option<String>,
}

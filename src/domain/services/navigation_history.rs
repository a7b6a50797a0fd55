#[cfg(test)]
#[path = "navigation_history_test.rs"]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use super::Clock;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::NavigationEntry;
use crate::domain::models::NavigationOutcome;
use crate::domain::models::PushMode;

#[derive(Clone, Debug)]
pub struct NavigationConfig {
    pub max_entries: usize,
    pub debounce: Duration,
    /// Views that are never recorded, e.g. splash or auth screens.
    pub skip_views: HashSet<String>,
}

impl Default for NavigationConfig {
    fn default() -> NavigationConfig {
        return NavigationConfig {
            max_entries: 50,
            debounce: Duration::milliseconds(200),
            skip_views: HashSet::new(),
        };
    }
}

impl NavigationConfig {
    pub fn from_config() -> NavigationConfig {
        let mut config = NavigationConfig::default();
        if let Ok(max_entries) = Config::get(ConfigKey::HistoryMaxEntries).parse::<usize>() {
            config.max_entries = max_entries;
        }
        if let Ok(debounce_ms) = Config::get(ConfigKey::NavigationDebounceMs).parse::<i64>() {
            config.debounce = Duration::milliseconds(debounce_ms);
        }

        return config;
    }

    pub fn with_skip_views(mut self, views: &[&str]) -> NavigationConfig {
        self.skip_views = views.iter().map(|view| return view.to_string()).collect();
        return self;
    }
}

/// Bounded back/forward stack over application views, with browser-history
/// semantics.
pub struct NavigationHistory {
    entries: Vec<NavigationEntry>,
    index: usize,
    config: NavigationConfig,
    clock: Arc<dyn Clock + Send + Sync>,
    last_navigation: Option<DateTime<Utc>>,
}

impl NavigationHistory {
    pub fn new(config: NavigationConfig, clock: Arc<dyn Clock + Send + Sync>) -> NavigationHistory {
        return NavigationHistory {
            entries: vec![],
            index: 0,
            config,
            clock,
            last_navigation: None,
        };
    }

    pub fn current(&self) -> Option<&NavigationEntry> {
        return self.entries.get(self.index);
    }

    pub fn len(&self) -> usize {
        return self.entries.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.entries.is_empty();
    }

    pub fn index(&self) -> usize {
        return self.index;
    }

    pub fn views(&self) -> Vec<&str> {
        return self
            .entries
            .iter()
            .map(|entry| return entry.view.as_str())
            .collect();
    }

    pub fn can_go_back(&self) -> bool {
        return self.index > 0;
    }

    pub fn can_go_forward(&self) -> bool {
        return !self.entries.is_empty() && self.index < self.entries.len() - 1;
    }

    /// Records a view. Returns whether the history changed.
    pub fn push(&mut self, entry: NavigationEntry, mode: PushMode) -> bool {
        if self.config.skip_views.contains(&entry.view) {
            tracing::debug!(view = entry.view.as_str(), "Skipped recording view");
            return false;
        }

        if self.entries.is_empty() {
            self.entries.push(entry);
            self.index = 0;
            return true;
        }

        if mode == PushMode::Replace {
            self.entries[self.index] = entry;
            return true;
        }

        if self.entries[self.index].same_location(&entry) {
            return false;
        }

        self.entries.truncate(self.index + 1);
        self.entries.push(entry);

        let max_entries = self.config.max_entries.max(1);
        if self.entries.len() > max_entries {
            let overflow = self.entries.len() - max_entries;
            self.entries.drain(..overflow);
        }
        self.index = self.entries.len() - 1;

        return true;
    }

    fn debounced(&self) -> bool {
        if let Some(last) = self.last_navigation {
            return self.clock.now() - last < self.config.debounce;
        }

        return false;
    }

    pub fn go_back(&mut self) -> Option<NavigationOutcome> {
        if !self.can_go_back() || self.debounced() {
            return None;
        }

        self.index -= 1;
        return Some(self.arrive());
    }

    pub fn go_forward(&mut self) -> Option<NavigationOutcome> {
        if !self.can_go_forward() || self.debounced() {
            return None;
        }

        self.index += 1;
        return Some(self.arrive());
    }

    fn arrive(&mut self) -> NavigationOutcome {
        self.last_navigation = Some(self.clock.now());
        let entry = self.entries[self.index].clone();

        let mut warning = None;
        if let Some(restore) = &entry.restore {
            if let Err(err) = restore() {
                tracing::warn!(view = entry.view.as_str(), error = %err, "Failed to restore view state");
                warning = Some(format!("Could not restore {}: {err}", entry.view));
            }
        }

        return NavigationOutcome { entry, warning };
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = 0;
        self.last_navigation = None;
    }
}

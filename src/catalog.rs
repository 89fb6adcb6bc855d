//! Session-scoped restaurant directory.
//!
//! Resolves restaurant ids to display names for notification copy. The
//! directory is an explicit, injectable object owned by the running
//! session; it is created with the runtime and cleared when the session ends.

use dashmap::DashMap;
use tracing::debug;

use crate::types::RestaurantId;

/// Concurrent restaurant-name cache.
#[derive(Debug, Default)]
pub struct RestaurantDirectory {
    names: DashMap<RestaurantId, String>,
}

impl RestaurantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory pre-populated with `(id, name)` pairs.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let directory = Self::new();
        for (id, name) in entries {
            directory.insert(RestaurantId::new(id), name);
        }
        directory
    }

    /// Insert or replace a restaurant name.
    pub fn insert(&self, id: RestaurantId, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    pub fn name_of(&self, id: &RestaurantId) -> Option<String> {
        self.names.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Drop all entries (session end).
    pub fn clear(&self) {
        debug!(entries = self.names.len(), "Clearing restaurant directory");
        self.names.clear();
    }
}

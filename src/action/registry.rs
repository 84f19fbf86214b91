//! Process-wide action catalog
//!
//! Maps composite keys to registered actions. Reads vastly outnumber
//! writes, so a concurrent map carries the catalog; registration is safe
//! at any point, including after the first execution.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{PlaitError, Result};

use super::{action_key, Action};

static REGISTRY: LazyLock<DashMap<String, Arc<dyn Action>>> = LazyLock::new(DashMap::new);

/// Register an action under its metadata's composite key.
///
/// Re-registration under an existing key fails without mutating the
/// catalog.
pub fn register(action: Arc<dyn Action>) -> Result<()> {
    let metadata = action.metadata();
    if metadata.activity.is_empty() {
        return Err(PlaitError::ActivityNameEmpty);
    }

    let key = metadata.key();
    match REGISTRY.entry(key.clone()) {
        Entry::Occupied(_) => Err(PlaitError::AlreadyRegistered { key }),
        Entry::Vacant(slot) => {
            slot.insert(action);
            Ok(())
        }
    }
}

/// Look up an action. An empty namespace matches registrations under `""`.
pub fn lookup(namespace: &str, activity: &str) -> Result<Arc<dyn Action>> {
    let key = action_key(namespace, activity);
    REGISTRY
        .get(&key)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| PlaitError::NotRegistered {
            namespace: namespace.to_string(),
            activity: activity.to_string(),
        })
}

/// Snapshot of the catalog.
pub fn all_actions() -> HashMap<String, Arc<dyn Action>> {
    REGISTRY
        .iter()
        .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
        .collect()
}

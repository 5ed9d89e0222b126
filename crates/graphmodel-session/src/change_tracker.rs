//! Change tracking and dirty detection for persisted entities.
//!
//! A snapshot is the entity's property map as last written to or read from the
//! store. An entity is dirty when its current properties differ from it.

use crate::identity_map::EntityKey;
use graphmodel_core::Properties;
use std::collections::HashMap;

/// Tracks changes to persisted entities by snapshot comparison.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    snapshots: HashMap<EntityKey, Properties>,
}

impl ChangeTracker {
    /// Create a new empty change tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` as the baseline for `key`.
    #[tracing::instrument(level = "trace", skip(self, data))]
    pub fn snapshot(&mut self, key: EntityKey, data: Properties) {
        tracing::trace!(properties = data.len(), "Taking object snapshot");
        self.snapshots.insert(key, data);
    }

    /// Check if `current` differs from the snapshot.
    ///
    /// An entity with no snapshot is treated as dirty.
    pub fn is_dirty(&self, key: &EntityKey, current: &Properties) -> bool {
        let dirty = self
            .snapshots
            .get(key)
            .is_none_or(|snapshot| snapshot != current);
        tracing::trace!(?key, dirty, "Dirty check result");
        dirty
    }

    /// Names of properties that were added, removed or changed since the
    /// snapshot, sorted. Without a snapshot every current property counts.
    #[tracing::instrument(level = "debug", skip(self, current))]
    pub fn changed_properties(&self, key: &EntityKey, current: &Properties) -> Vec<String> {
        let Some(original) = self.snapshots.get(key) else {
            let mut all: Vec<String> = current.keys().cloned().collect();
            all.sort();
            tracing::debug!(
                changed_count = all.len(),
                "No snapshot - all properties considered changed"
            );
            return all;
        };

        let mut changed: Vec<String> = current
            .iter()
            .filter(|(name, value)| original.get(*name) != Some(*value))
            .map(|(name, _)| name.clone())
            .chain(
                original
                    .keys()
                    .filter(|name| !current.contains_key(*name))
                    .cloned(),
            )
            .collect();
        changed.sort();

        tracing::debug!(
            changed_count = changed.len(),
            properties = ?changed,
            "Detected changed properties"
        );
        changed
    }

    /// Drop the snapshot for one entity.
    pub fn clear(&mut self, key: &EntityKey) {
        self.snapshots.remove(key);
    }

    /// Drop every snapshot.
    pub fn clear_all(&mut self) {
        self.snapshots.clear();
    }

    /// Number of tracked snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if there are no snapshots.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: serde_json::Value) -> Properties {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn missing_snapshot_is_dirty() {
        let tracker = ChangeTracker::new();
        let key = EntityKey::node(1);
        assert!(tracker.is_dirty(&key, &props(json!({"name": "Ann"}))));
        assert!(tracker.is_empty());
    }

    #[test]
    fn snapshot_then_compare() {
        let mut tracker = ChangeTracker::new();
        let key = EntityKey::node(1);
        tracker.snapshot(key, props(json!({"name": "Ann", "age": 30})));

        assert!(!tracker.is_dirty(&key, &props(json!({"age": 30, "name": "Ann"}))));
        assert!(tracker.is_dirty(&key, &props(json!({"name": "Ann", "age": 31}))));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn changed_properties_covers_added_and_removed() {
        let mut tracker = ChangeTracker::new();
        let key = EntityKey::node(2);
        tracker.snapshot(key, props(json!({"name": "Ann", "age": 30, "nick": "a"})));

        let changed = tracker.changed_properties(&key, &props(json!({"name": "Bo", "age": 30, "city": "Oslo"})));
        assert_eq!(changed, vec!["city", "name", "nick"]);

        let fresh = tracker.changed_properties(&EntityKey::node(3), &props(json!({"b": 1, "a": 2})));
        assert_eq!(fresh, vec!["a", "b"]);
    }

    #[test]
    fn node_and_relationship_keys_are_separate() {
        let mut tracker = ChangeTracker::new();
        tracker.snapshot(EntityKey::node(5), props(json!({"x": 1})));
        assert!(tracker.is_dirty(&EntityKey::relationship(5), &props(json!({"x": 1}))));

        tracker.clear(&EntityKey::node(5));
        assert!(tracker.is_empty());

        tracker.snapshot(EntityKey::node(6), Properties::new());
        tracker.clear_all();
        assert!(tracker.is_empty());
    }
}

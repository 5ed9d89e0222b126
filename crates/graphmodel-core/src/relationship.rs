//! Relationship metadata and confirmed relationship records.
//!
//! `RelationshipInfo` is the hand-written mapping metadata for one relationship
//! type. `RelationshipRecord` is a fact the session has confirmed against the
//! store: both endpoints and the relationship itself carry permanent ids.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Mapping metadata for a relationship type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipInfo {
    /// The relationship type as stored (e.g. `"KNOWS"`).
    pub rel_type: String,

    /// At most one relationship of this type may connect an unordered pair of
    /// endpoints. Matching against a singleton type ignores direction.
    pub singleton: bool,
}

impl RelationshipInfo {
    /// Metadata for a directed, multi-valued relationship type.
    pub fn new(rel_type: impl Into<String>) -> Self {
        Self {
            rel_type: rel_type.into(),
            singleton: false,
        }
    }

    /// Set the singleton flag (builder pattern).
    #[must_use]
    pub fn singleton(mut self, value: bool) -> Self {
        self.singleton = value;
        self
    }
}

/// A relationship confirmed to exist in the store.
///
/// Records are immutable. Two records are equal when they share
/// `rel_id` and `rel_type` and connect the same endpoints in the same
/// direction, or in either direction when the type is singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRecord {
    start_id: i64,
    rel_id: i64,
    end_id: i64,
    rel_type: String,
    start_type: String,
    end_type: String,
    singleton: bool,
}

impl RelationshipRecord {
    /// Create a record for a relationship of the given type.
    pub fn new(
        start_id: i64,
        rel_id: i64,
        end_id: i64,
        info: &RelationshipInfo,
        start_type: impl Into<String>,
        end_type: impl Into<String>,
    ) -> Self {
        Self {
            start_id,
            rel_id,
            end_id,
            rel_type: info.rel_type.clone(),
            start_type: start_type.into(),
            end_type: end_type.into(),
            singleton: info.singleton,
        }
    }

    pub fn start_id(&self) -> i64 {
        self.start_id
    }

    pub fn rel_id(&self) -> i64 {
        self.rel_id
    }

    pub fn end_id(&self) -> i64 {
        self.end_id
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    /// Entity kind (label) of the start node.
    pub fn start_type(&self) -> &str {
        &self.start_type
    }

    /// Entity kind (label) of the end node.
    pub fn end_type(&self) -> &str {
        &self.end_type
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// Check if this record touches the given node at either end.
    pub fn touches(&self, node_id: i64) -> bool {
        self.start_id == node_id || self.end_id == node_id
    }

    /// Check if this record connects `start` to `end` with the given type.
    ///
    /// Direction is ignored only when `singleton` is set. The type always has
    /// to match: two different types on the same pair never match each other.
    pub fn connects(&self, start_id: i64, rel_type: &str, end_id: i64, singleton: bool) -> bool {
        if self.rel_type != rel_type {
            return false;
        }
        if self.start_id == start_id && self.end_id == end_id {
            return true;
        }
        singleton && self.start_id == end_id && self.end_id == start_id
    }

    /// Check if `candidate` describes the same logical connection as this
    /// record, regardless of relationship id. The candidate's singleton flag
    /// decides whether direction matters.
    pub fn duplicates(&self, candidate: &RelationshipRecord) -> bool {
        self.connects(
            candidate.start_id,
            &candidate.rel_type,
            candidate.end_id,
            candidate.singleton,
        )
    }

    fn ordered_endpoints(&self) -> (i64, i64) {
        if self.start_id <= self.end_id {
            (self.start_id, self.end_id)
        } else {
            (self.end_id, self.start_id)
        }
    }
}

impl PartialEq for RelationshipRecord {
    fn eq(&self, other: &Self) -> bool {
        self.rel_id == other.rel_id
            && self.connects(
                other.start_id,
                &other.rel_type,
                other.end_id,
                self.singleton && other.singleton,
            )
    }
}

impl Eq for RelationshipRecord {}

impl Hash for RelationshipRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Unordered endpoints so that swapped singleton records hash alike.
        self.rel_id.hash(state);
        self.rel_type.hash(state);
        self.ordered_endpoints().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn record(start: i64, rel: i64, end: i64, info: &RelationshipInfo) -> RelationshipRecord {
        RelationshipRecord::new(start, rel, end, info, "Person", "Person")
    }

    #[test]
    fn info_builder() {
        let info = RelationshipInfo::new("KNOWS");
        assert!(!info.singleton);
        assert!(info.clone().singleton(true).singleton);
        assert_eq!(info.rel_type, "KNOWS");
    }

    #[test]
    fn connects_respects_direction_for_non_singleton() {
        let knows = RelationshipInfo::new("KNOWS");
        let r = record(1, 10, 2, &knows);
        assert!(r.connects(1, "KNOWS", 2, false));
        assert!(!r.connects(2, "KNOWS", 1, false));
        assert!(!r.connects(1, "LIKES", 2, false));
    }

    #[test]
    fn connects_ignores_direction_for_singleton() {
        let edge = RelationshipInfo::new("EDGE").singleton(true);
        let r = record(1, 10, 2, &edge);
        assert!(r.connects(2, "EDGE", 1, true));
        assert!(!r.connects(2, "OTHER", 1, true));
    }

    #[test]
    fn swapped_records_equal_only_when_singleton() {
        let edge = RelationshipInfo::new("EDGE").singleton(true);
        let knows = RelationshipInfo::new("KNOWS");

        assert_eq!(record(1, 10, 2, &edge), record(2, 10, 1, &edge));
        assert_ne!(record(1, 10, 2, &knows), record(2, 10, 1, &knows));
        assert_ne!(record(1, 10, 2, &edge), record(1, 11, 2, &edge));

        let mut set = HashSet::new();
        set.insert(record(1, 10, 2, &edge));
        set.insert(record(2, 10, 1, &edge));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn duplicates_ignores_relationship_id() {
        let edge = RelationshipInfo::new("EDGE").singleton(true);
        let a = record(1, 10, 2, &edge);
        let b = record(2, 11, 1, &edge);
        assert!(a.duplicates(&b));

        let knows = RelationshipInfo::new("KNOWS");
        let c = record(1, 12, 2, &knows);
        let d = record(2, 13, 1, &knows);
        assert!(!c.duplicates(&d));
        assert!(c.duplicates(&record(1, 14, 2, &knows)));
        assert!(a.touches(2));
        assert!(!a.touches(3));
    }
}

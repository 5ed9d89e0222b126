//! Relationships written during an open change-set, before the store has
//! assigned identities to everything they reference.

use graphmodel_core::{EntityRef, PlaceholderMap, RelationshipInfo, RelationshipRecord, Result};

/// A relationship whose endpoints or own identity may still be placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRelationship {
    start: EntityRef,
    end: EntityRef,
    own: EntityRef,
    rel_type: String,
    start_type: String,
    end_type: String,
    singleton: bool,
}

impl PendingRelationship {
    /// Create a pending relationship of the given type.
    pub fn new(start: EntityRef, end: EntityRef, own: EntityRef, info: &RelationshipInfo) -> Self {
        Self {
            start,
            end,
            own,
            rel_type: info.rel_type.clone(),
            start_type: String::new(),
            end_type: String::new(),
            singleton: info.singleton,
        }
    }

    /// Set the endpoint labels (builder pattern).
    #[must_use]
    pub fn with_types(mut self, start_type: impl Into<String>, end_type: impl Into<String>) -> Self {
        self.start_type = start_type.into();
        self.end_type = end_type.into();
        self
    }

    pub fn start(&self) -> EntityRef {
        self.start
    }

    pub fn end(&self) -> EntityRef {
        self.end
    }

    /// The relationship's own reference.
    pub fn own(&self) -> EntityRef {
        self.own
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    pub fn start_type(&self) -> &str {
        &self.start_type
    }

    pub fn end_type(&self) -> &str {
        &self.end_type
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// Metadata this relationship was declared with.
    pub fn info(&self) -> RelationshipInfo {
        RelationshipInfo::new(self.rel_type.clone()).singleton(self.singleton)
    }

    /// Check if this relationship connects `start` to `end` with `info`'s type.
    ///
    /// Swapped endpoints match only when `info` is singleton.
    pub fn matches(&self, start: EntityRef, info: &RelationshipInfo, end: EntityRef) -> bool {
        if self.rel_type != info.rel_type {
            return false;
        }
        if self.start == start && self.end == end {
            return true;
        }
        info.singleton && self.start == end && self.end == start
    }

    /// Check if every reference is already permanent.
    pub fn is_resolved(&self) -> bool {
        self.start.is_permanent() && self.end.is_permanent() && self.own.is_permanent()
    }

    /// Resolve all three references and build the confirmed record.
    ///
    /// Each reference is resolved on its own; the first placeholder missing
    /// from `placeholders` fails with [`graphmodel_core::Error::UnresolvedReference`].
    pub fn convert(&self, placeholders: &PlaceholderMap) -> Result<RelationshipRecord> {
        let start_id = placeholders.resolve(&self.start)?;
        let rel_id = placeholders.resolve(&self.own)?;
        let end_id = placeholders.resolve(&self.end)?;
        Ok(RelationshipRecord::new(
            start_id,
            rel_id,
            end_id,
            &self.info(),
            self.start_type.clone(),
            self.end_type.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmodel_core::{Error, TempToken, TokenKind};

    fn n(seq: u64) -> EntityRef {
        TempToken::new(TokenKind::Node, seq).into()
    }

    fn r(seq: u64) -> EntityRef {
        TempToken::new(TokenKind::Relationship, seq).into()
    }

    #[test]
    fn matches_exact_and_singleton_swapped() {
        let edge = RelationshipInfo::new("EDGE").singleton(true);
        let knows = RelationshipInfo::new("KNOWS");

        let p = PendingRelationship::new(n(1), n(2), r(1), &edge);
        assert!(p.matches(n(1), &edge, n(2)));
        assert!(p.matches(n(2), &edge, n(1)));
        assert!(!p.matches(n(1), &knows, n(2)));

        let q = PendingRelationship::new(n(1), n(2), r(2), &knows);
        assert!(q.matches(n(1), &knows, n(2)));
        assert!(!q.matches(n(2), &knows, n(1)));
    }

    #[test]
    fn convert_resolves_every_reference() {
        let edge = RelationshipInfo::new("EDGE").singleton(true);
        let p = PendingRelationship::new(n(1), EntityRef::Permanent(7), r(1), &edge)
            .with_types("A", "B");
        assert!(!p.is_resolved());

        let map: PlaceholderMap = [
            (TempToken::new(TokenKind::Node, 1), 100),
            (TempToken::new(TokenKind::Relationship, 1), 55),
        ]
        .into_iter()
        .collect();

        let record = p.convert(&map).unwrap();
        assert_eq!(
            (record.start_id(), record.rel_id(), record.end_id()),
            (100, 55, 7)
        );
        assert_eq!(record.start_type(), "A");
        assert_eq!(record.end_type(), "B");
        assert!(record.is_singleton());
    }

    #[test]
    fn convert_names_the_missing_token() {
        let p = PendingRelationship::new(n(1), n(2), r(4), &RelationshipInfo::new("KNOWS"));
        let map: PlaceholderMap = [
            (TempToken::new(TokenKind::Node, 1), 1),
            (TempToken::new(TokenKind::Node, 2), 2),
        ]
        .into_iter()
        .collect();

        let err = p.convert(&map).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference(_)));
        assert_eq!(err.unresolved_token(), Some("_r4"));
    }

    #[test]
    fn fully_permanent_is_resolved() {
        let p = PendingRelationship::new(
            EntityRef::Permanent(1),
            EntityRef::Permanent(2),
            EntityRef::Permanent(3),
            &RelationshipInfo::new("KNOWS"),
        );
        assert!(p.is_resolved());
        assert_eq!(p.info(), RelationshipInfo::new("KNOWS"));
    }
}

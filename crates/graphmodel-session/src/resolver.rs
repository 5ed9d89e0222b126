//! Finalization of pending relationships once the store has answered.
//!
//! Resolution runs in two phases. [`RelationshipResolver::candidates`] turns
//! every pending relationship into a record and fails on the first placeholder
//! the store did not map; it touches no state. [`RelationshipResolver::merge`]
//! then drops duplicates and merges the rest into the context, and cannot
//! fail. A failed save therefore never leaves a partial merge behind.

use crate::context::MappingContext;
use crate::pending::PendingRelationship;
use graphmodel_core::{PlaceholderMap, RelationshipRecord, Result};

/// Converts pending relationships into confirmed records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipResolver;

impl RelationshipResolver {
    /// Resolve every reference of every pending relationship, in log order.
    #[tracing::instrument(level = "debug", skip_all, fields(pending = pending.len()))]
    pub fn candidates(
        pending: &[PendingRelationship],
        placeholders: &PlaceholderMap,
    ) -> Result<Vec<RelationshipRecord>> {
        pending.iter().map(|p| p.convert(placeholders)).collect()
    }

    /// Merge candidates into `ctx`, skipping duplicates.
    ///
    /// A candidate is a duplicate when a record already in the context, or a
    /// candidate accepted earlier in this call, connects the same endpoints
    /// with the same type (in either direction for singleton types). Returns
    /// the accepted records in input order.
    #[tracing::instrument(level = "debug", skip_all, fields(candidates = candidates.len()))]
    pub fn merge(
        ctx: &mut MappingContext,
        candidates: Vec<RelationshipRecord>,
    ) -> Vec<RelationshipRecord> {
        let mut accepted: Vec<RelationshipRecord> = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let known = ctx
                .records_touching(candidate.start_id())
                .any(|existing| existing.duplicates(&candidate));
            if known || accepted.iter().any(|a| a.duplicates(&candidate)) {
                tracing::debug!(
                    start = candidate.start_id(),
                    rel = candidate.rel_id(),
                    end = candidate.end_id(),
                    rel_type = candidate.rel_type(),
                    "Discarding duplicate relationship"
                );
                continue;
            }
            ctx.merge_record(candidate.clone());
            accepted.push(candidate);
        }

        tracing::debug!(merged = accepted.len(), "Merged relationship records");
        accepted
    }

    /// Resolve and merge in one step.
    ///
    /// Nothing is merged unless every reference resolves.
    pub fn resolve(
        ctx: &mut MappingContext,
        pending: &[PendingRelationship],
        placeholders: &PlaceholderMap,
    ) -> Result<Vec<RelationshipRecord>> {
        let candidates = Self::candidates(pending, placeholders)?;
        Ok(Self::merge(ctx, candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmodel_core::{EntityRef, Error, RelationshipInfo, TempToken, TokenKind};

    fn n(seq: u64) -> EntityRef {
        TempToken::new(TokenKind::Node, seq).into()
    }

    fn r(seq: u64) -> EntityRef {
        TempToken::new(TokenKind::Relationship, seq).into()
    }

    fn map(pairs: &[(&str, i64)]) -> PlaceholderMap {
        PlaceholderMap::parse(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn one_record_per_pending() {
        let knows = RelationshipInfo::new("KNOWS");
        let pending = vec![
            PendingRelationship::new(n(1), n(2), r(1), &knows),
            PendingRelationship::new(n(2), n(3), r(2), &knows),
        ];
        let placeholders = map(&[("_n1", 1), ("_n2", 2), ("_n3", 3), ("_r1", 10), ("_r2", 11)]);

        let mut ctx = MappingContext::new();
        let merged = RelationshipResolver::resolve(&mut ctx, &pending, &placeholders).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].rel_id(), 10);
        assert_eq!(merged[1].rel_id(), 11);
        assert_eq!(ctx.records().count(), 2);
    }

    #[test]
    fn singleton_swapped_pair_collapses() {
        let edge = RelationshipInfo::new("EDGE").singleton(true);
        let pending = vec![
            PendingRelationship::new(n(1), n(2), r(1), &edge),
            PendingRelationship::new(n(2), n(1), r(2), &edge),
        ];
        let placeholders = map(&[("_n1", 1), ("_n2", 2), ("_r1", 10), ("_r2", 11)]);

        let mut ctx = MappingContext::new();
        let merged = RelationshipResolver::resolve(&mut ctx, &pending, &placeholders).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(ctx.records().count(), 1);
    }

    #[test]
    fn non_singleton_keeps_both_directions() {
        let knows = RelationshipInfo::new("KNOWS");
        let pending = vec![
            PendingRelationship::new(n(1), n(2), r(1), &knows),
            PendingRelationship::new(n(2), n(1), r(2), &knows),
        ];
        let placeholders = map(&[("_n1", 1), ("_n2", 2), ("_r1", 10), ("_r2", 11)]);

        let mut ctx = MappingContext::new();
        let merged = RelationshipResolver::resolve(&mut ctx, &pending, &placeholders).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn different_types_on_same_pair_are_kept() {
        let pending = vec![
            PendingRelationship::new(n(1), n(2), r(1), &RelationshipInfo::new("A").singleton(true)),
            PendingRelationship::new(n(1), n(2), r(2), &RelationshipInfo::new("B").singleton(true)),
        ];
        let placeholders = map(&[("_n1", 1), ("_n2", 2), ("_r1", 10), ("_r2", 11)]);

        let mut ctx = MappingContext::new();
        let merged = RelationshipResolver::resolve(&mut ctx, &pending, &placeholders).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn existing_record_suppresses_duplicate() {
        let edge = RelationshipInfo::new("EDGE").singleton(true);
        let mut ctx = MappingContext::new();
        ctx.merge_record(RelationshipRecord::new(2, 9, 1, &edge, "N", "N"));

        let pending = vec![PendingRelationship::new(
            EntityRef::Permanent(1),
            EntityRef::Permanent(2),
            r(1),
            &edge,
        )];
        let merged =
            RelationshipResolver::resolve(&mut ctx, &pending, &map(&[("_r1", 10)])).unwrap();
        assert!(merged.is_empty());
        assert_eq!(ctx.records().count(), 1);
        assert!(ctx.record(9).is_some());
    }

    #[test]
    fn missing_mapping_merges_nothing() {
        let knows = RelationshipInfo::new("KNOWS");
        let pending = vec![
            PendingRelationship::new(n(1), n(2), r(1), &knows),
            PendingRelationship::new(n(2), n(3), r(2), &knows),
        ];
        let placeholders = map(&[("_n1", 1), ("_n2", 2), ("_n3", 3), ("_r1", 10)]);

        let mut ctx = MappingContext::new();
        let err = RelationshipResolver::resolve(&mut ctx, &pending, &placeholders).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference(_)));
        assert_eq!(err.unresolved_token(), Some("_r2"));
        assert_eq!(ctx.records().count(), 0);
    }

    #[test]
    fn resolution_is_deterministic() {
        let edge = RelationshipInfo::new("EDGE").singleton(true);
        let pending = vec![
            PendingRelationship::new(n(1), n(2), r(1), &edge),
            PendingRelationship::new(n(2), n(1), r(2), &edge),
            PendingRelationship::new(n(2), n(3), r(3), &edge),
        ];
        let placeholders = map(&[
            ("_n1", 1),
            ("_n2", 2),
            ("_n3", 3),
            ("_r1", 10),
            ("_r2", 11),
            ("_r3", 12),
        ]);

        let first = RelationshipResolver::candidates(&pending, &placeholders).unwrap();
        let second = RelationshipResolver::candidates(&pending, &placeholders).unwrap();
        assert_eq!(first, second);

        let mut a = MappingContext::new();
        let mut b = MappingContext::new();
        assert_eq!(
            RelationshipResolver::merge(&mut a, first),
            RelationshipResolver::merge(&mut b, second)
        );
    }
}

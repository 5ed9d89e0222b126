//! The mapping context: everything a session knows about persisted state,
//! plus the bookkeeping of the change-set currently being written.
//!
//! Persisted state:
//! - identity map (`(kind, id)` -> live object)
//! - change tracker (`(kind, id)` -> property snapshot)
//! - relationship records keyed by relationship id
//! - holders: the nodes whose objects were walked holding each relationship
//!
//! Open change-set state:
//! - arena of objects seen in the current traversal, by pointer identity
//! - handle -> placeholder token for objects without an identity
//! - handle -> existing relationship, for new relationship objects that
//!   describe a relationship already written
//! - pending relationship log
//! - claimed and released holds
//! - relationships and nodes scheduled for removal
//!
//! The open state is discarded by [`MappingContext::abandon_change_set`] or
//! folded into persisted state by [`MappingContext::complete_change_set`].

use crate::SessionConfig;
use crate::change_tracker::ChangeTracker;
use crate::identity_map::{EntityKey, Handle, IdentityMap, ObjectArena, TrackedObject};
use crate::pending::PendingRelationship;
use crate::resolver::RelationshipResolver;
use graphmodel_core::{
    Entity, EntityKind, EntityRef, Error, ObjectRef, PlaceholderMap, Properties,
    RelationshipInfo, RelationshipRecord, Result, TempToken, TokenKind, read_object, write_object,
};
use std::collections::{BTreeMap, BTreeSet};

/// Result of visiting an object during a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// First time this object was seen in the open change-set.
    First(EntityRef),
    /// The object was already visited; same reference as before.
    Seen(EntityRef),
}

impl Visit {
    pub fn reference(&self) -> EntityRef {
        match self {
            Visit::First(r) | Visit::Seen(r) => *r,
        }
    }

    pub fn is_first(&self) -> bool {
        matches!(self, Visit::First(_))
    }

    pub fn into_reference(self) -> EntityRef {
        self.reference()
    }
}

/// What a completed change-set changed in the context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSetOutcome {
    /// Records merged from the pending log, in log order, duplicates dropped.
    pub records: Vec<RelationshipRecord>,
    /// Permanent ids written back into objects, by token.
    pub assigned: Vec<(TempToken, i64)>,
    /// Relationship ids dropped from the context.
    pub removed_relationships: Vec<i64>,
    /// Node ids dropped from the context.
    pub removed_nodes: Vec<i64>,
}

/// Summary of the context's state, for debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextDebugInfo {
    pub tracked: usize,
    pub snapshots: usize,
    pub records: usize,
    pub arena: usize,
    pub temporaries: usize,
    pub pending: usize,
    pub scheduled_relationship_removals: usize,
    pub scheduled_node_removals: usize,
    pub open: bool,
}

/// Session-scoped identity and relationship state.
#[derive(Default)]
pub struct MappingContext {
    config: SessionConfig,
    identity_map: IdentityMap,
    change_tracker: ChangeTracker,
    records: BTreeMap<i64, RelationshipRecord>,
    arena: ObjectArena,
    temporaries: BTreeMap<Handle, TempToken>,
    holders: BTreeMap<i64, BTreeSet<i64>>,
    bound: BTreeMap<Handle, EntityRef>,
    pending: Vec<PendingRelationship>,
    claims: Vec<(EntityRef, EntityRef)>,
    releases: Vec<(i64, i64)>,
    record_removals: BTreeSet<i64>,
    node_removals: BTreeSet<i64>,
    open: bool,
    next_node_seq: u64,
    next_rel_seq: u64,
}

impl MappingContext {
    /// Create an empty context with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty context with the given configuration.
    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ==================== Identity ====================

    fn next_token(&mut self, kind: TokenKind) -> TempToken {
        let counter = match kind {
            TokenKind::Node => &mut self.next_node_seq,
            TokenKind::Relationship => &mut self.next_rel_seq,
        };
        *counter += 1;
        TempToken::new(kind, *counter)
    }

    fn token_kind(kind: EntityKind) -> TokenKind {
        match kind {
            EntityKind::Node => TokenKind::Node,
            EntityKind::Relationship => TokenKind::Relationship,
        }
    }

    /// Issue a placeholder for an object that has no permanent identity.
    ///
    /// The object joins the open change-set's arena. Registering the same
    /// object again before the change-set closes returns the same token; a
    /// different object always gets a fresh one, whatever its `PartialEq`
    /// says. The caller decides whether the object is new.
    pub fn register_temporary<T: Entity>(&mut self, obj: &ObjectRef<T>) -> EntityRef {
        let (handle, _) = self.arena.insert(TrackedObject::new(obj));
        if let Some(token) = self.temporaries.get(&handle) {
            return EntityRef::Temporary(*token);
        }
        let token = self.next_token(Self::token_kind(T::KIND));
        self.temporaries.insert(handle, token);
        tracing::trace!(label = T::LABEL, %token, "Issued placeholder");
        EntityRef::Temporary(token)
    }

    /// Issue a placeholder for a relationship that has no entity object.
    pub fn issue_relationship_token(&mut self) -> TempToken {
        let token = self.next_token(TokenKind::Relationship);
        tracing::trace!(%token, "Issued relationship placeholder");
        token
    }

    /// Add `obj` to the open change-set and return its reference.
    ///
    /// Persisted objects keep their permanent reference; new objects are
    /// registered as temporaries.
    pub fn visit<T: Entity>(&mut self, obj: &ObjectRef<T>) -> Visit {
        let (handle, first) = self.arena.insert(TrackedObject::new(obj));
        let reference = if let Some(reference) = self.open_reference(handle) {
            reference
        } else if let Some(id) = read_object(obj).entity_id() {
            EntityRef::Permanent(id)
        } else {
            self.register_temporary(obj)
        };
        if first {
            Visit::First(reference)
        } else {
            Visit::Seen(reference)
        }
    }

    /// Add a new relationship object to the open change-set as a view of the
    /// relationship `existing`, instead of issuing it a placeholder.
    ///
    /// The object receives `existing`'s id when the change-set completes. It
    /// only replaces the tracked object for that id when there is none.
    pub fn bind<T: Entity>(&mut self, obj: &ObjectRef<T>, existing: EntityRef) -> Visit {
        let (handle, first) = self.arena.insert(TrackedObject::new(obj));
        if !first {
            return Visit::Seen(self.open_reference(handle).unwrap_or(existing));
        }
        tracing::trace!(label = T::LABEL, %existing, "Bound relationship object");
        self.bound.insert(handle, existing);
        Visit::First(existing)
    }

    fn open_reference(&self, handle: Handle) -> Option<EntityRef> {
        self.temporaries
            .get(&handle)
            .map(|token| EntityRef::Temporary(*token))
            .or_else(|| self.bound.get(&handle).copied())
    }

    /// Record that `obj` has permanent identity `id`.
    ///
    /// Writes the id into the object, replaces whatever was tracked under the
    /// same key and takes a fresh snapshot.
    #[tracing::instrument(level = "trace", skip(self, obj), fields(label = T::LABEL))]
    pub fn track_persisted<T: Entity>(&mut self, id: i64, obj: &ObjectRef<T>) -> Result<()> {
        let properties = {
            let mut guard = write_object(obj);
            if guard.entity_id() != Some(id) {
                guard.set_entity_id(id);
            }
            guard.properties()?
        };
        let key = EntityKey::of::<T>(id);
        self.identity_map.insert(key, TrackedObject::new(obj));
        self.change_tracker.snapshot(key, properties);
        Ok(())
    }

    /// The live object tracked for `id`, if it is a `T`.
    pub fn get<T: Entity>(&self, id: i64) -> Option<ObjectRef<T>> {
        self.identity_map.get::<T>(id)
    }

    /// Check if `obj` is the object tracked under its own id.
    pub fn is_tracked<T: Entity>(&self, obj: &ObjectRef<T>) -> bool {
        self.identity_map.contains_object(obj)
    }

    /// Label of the tracked node `id`.
    pub fn node_label(&self, id: i64) -> Option<&'static str> {
        self.identity_map.label(&EntityKey::node(id))
    }

    /// Check if `obj` differs from its snapshot. New objects are always dirty.
    pub fn is_dirty<T: Entity>(&self, obj: &ObjectRef<T>) -> Result<bool> {
        let guard = read_object(obj);
        let Some(id) = guard.entity_id() else {
            return Ok(true);
        };
        let properties = guard.properties()?;
        Ok(self
            .change_tracker
            .is_dirty(&EntityKey::of::<T>(id), &properties))
    }

    /// Property names in `properties` that differ from the snapshot of `id`.
    pub fn changed_properties<T: Entity>(
        &self,
        id: i64,
        properties: &Properties,
    ) -> Vec<String> {
        self.change_tracker
            .changed_properties(&EntityKey::of::<T>(id), properties)
    }

    pub(crate) fn change_tracker(&self) -> &ChangeTracker {
        &self.change_tracker
    }

    // ==================== Relationships ====================

    /// The confirmed record connecting `start` to `end` with `info`'s type.
    pub fn find_record(
        &self,
        start_id: i64,
        info: &RelationshipInfo,
        end_id: i64,
    ) -> Option<&RelationshipRecord> {
        self.records_touching(start_id)
            .find(|r| r.connects(start_id, &info.rel_type, end_id, info.singleton))
    }

    /// The pending relationship of the open change-set connecting `start` to
    /// `end` with `info`'s type.
    pub fn find_pending(
        &self,
        start: EntityRef,
        info: &RelationshipInfo,
        end: EntityRef,
    ) -> Option<&PendingRelationship> {
        self.pending.iter().find(|p| p.matches(start, info, end))
    }

    /// Check if a confirmed or pending relationship connects `start` to `end`
    /// with `info`'s type. Direction is ignored for singleton types.
    pub fn relationship_exists(
        &self,
        start: EntityRef,
        info: &RelationshipInfo,
        end: EntityRef,
    ) -> bool {
        if let (EntityRef::Permanent(s), EntityRef::Permanent(e)) = (start, end) {
            if self.find_record(s, info, e).is_some() {
                return true;
            }
        }
        self.find_pending(start, info, end).is_some()
    }

    /// Append to the pending log. No de-duplication happens here.
    pub fn add_pending(&mut self, pending: PendingRelationship) {
        tracing::trace!(
            start = %pending.start(),
            own = %pending.own(),
            end = %pending.end(),
            rel_type = pending.rel_type(),
            "Pending relationship"
        );
        self.pending.push(pending);
    }

    /// The pending log of the open change-set.
    pub fn pending(&self) -> &[PendingRelationship] {
        &self.pending
    }

    /// Insert or replace a record by relationship id.
    ///
    /// Returns the record it replaced.
    pub fn merge_record(&mut self, record: RelationshipRecord) -> Option<RelationshipRecord> {
        self.records.insert(record.rel_id(), record)
    }

    /// All confirmed records, ordered by relationship id.
    pub fn records(&self) -> impl Iterator<Item = &RelationshipRecord> {
        self.records.values()
    }

    pub fn record(&self, rel_id: i64) -> Option<&RelationshipRecord> {
        self.records.get(&rel_id)
    }

    /// Confirmed records with `node_id` at either end.
    pub fn records_touching(&self, node_id: i64) -> impl Iterator<Item = &RelationshipRecord> {
        self.records.values().filter(move |r| r.touches(node_id))
    }

    /// Record that the node behind `holder` holds `relationship`.
    ///
    /// Takes effect when the open change-set completes, once both references
    /// have permanent ids.
    pub fn claim(&mut self, holder: EntityRef, relationship: EntityRef) {
        self.claims.push((holder, relationship));
    }

    /// Drop `node_id`'s hold on `rel_id` when the open change-set completes.
    pub fn release(&mut self, node_id: i64, rel_id: i64) {
        self.releases.push((node_id, rel_id));
    }

    /// Nodes whose objects hold confirmed relationship `rel_id`.
    ///
    /// Relationships merged by a load have no holders until a walk
    /// re-asserts them.
    pub fn holders(&self, rel_id: i64) -> impl Iterator<Item = i64> + '_ {
        self.holders.get(&rel_id).into_iter().flatten().copied()
    }

    pub fn is_held_by(&self, rel_id: i64, node_id: i64) -> bool {
        self.holders
            .get(&rel_id)
            .is_some_and(|nodes| nodes.contains(&node_id))
    }

    /// Drop a record and any relationship entity tracked under its id.
    pub fn forget_record(&mut self, rel_id: i64) -> Option<RelationshipRecord> {
        self.holders.remove(&rel_id);
        let key = EntityKey::relationship(rel_id);
        self.identity_map.remove(&key);
        self.change_tracker.clear(&key);
        self.records.remove(&rel_id)
    }

    /// Drop a node, its snapshot and every record touching it.
    ///
    /// Returns the dropped records.
    pub fn forget_node(&mut self, node_id: i64) -> Vec<RelationshipRecord> {
        let key = EntityKey::node(node_id);
        self.identity_map.remove(&key);
        self.change_tracker.clear(&key);

        let touching: Vec<i64> = self.records_touching(node_id).map(|r| r.rel_id()).collect();
        touching
            .into_iter()
            .filter_map(|rel_id| self.forget_record(rel_id))
            .collect()
    }

    /// Drop record `rel_id` when the open change-set completes.
    pub fn schedule_record_removal(&mut self, rel_id: i64) {
        self.record_removals.insert(rel_id);
    }

    /// Drop node `node_id` when the open change-set completes.
    pub fn schedule_node_removal(&mut self, node_id: i64) {
        self.node_removals.insert(node_id);
    }

    /// Check if record `rel_id` is scheduled for removal.
    pub fn is_removal_scheduled(&self, rel_id: i64) -> bool {
        self.record_removals.contains(&rel_id)
    }

    // ==================== Change-set lifecycle ====================

    /// Check if a change-set is open or has left state behind.
    pub fn has_open_change_set(&self) -> bool {
        self.open
            || !self.arena.is_empty()
            || !self.pending.is_empty()
            || !self.claims.is_empty()
            || !self.releases.is_empty()
            || !self.record_removals.is_empty()
            || !self.node_removals.is_empty()
    }

    /// Mark the start of a change-set.
    pub fn open_change_set(&mut self) -> Result<()> {
        if self.has_open_change_set() {
            return Err(Error::usage(
                "a change-set is already open; complete or abandon it first",
            ));
        }
        self.open = true;
        Ok(())
    }

    /// Discard everything the open change-set recorded.
    ///
    /// Persisted state is untouched. Token counters keep running, so a retry
    /// never reuses a token the store may have seen.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn abandon_change_set(&mut self) {
        tracing::debug!(
            arena = self.arena.len(),
            pending = self.pending.len(),
            "Abandoning change-set"
        );
        self.clear_open_state();
    }

    fn clear_open_state(&mut self) {
        self.arena.clear();
        self.temporaries.clear();
        self.bound.clear();
        self.pending.clear();
        self.claims.clear();
        self.releases.clear();
        self.record_removals.clear();
        self.node_removals.clear();
        self.open = false;
    }

    /// Fold the store's answer into persisted state and close the change-set.
    ///
    /// Every placeholder issued in the change-set must be in `placeholders`,
    /// and every pending relationship must resolve. If either check fails,
    /// or an object cannot be serialized for its snapshot, the context is left
    /// exactly as it was and the change-set stays open.
    #[tracing::instrument(level = "debug", skip_all, fields(placeholders = placeholders.len()))]
    pub fn complete_change_set(
        &mut self,
        placeholders: &PlaceholderMap,
    ) -> Result<ChangeSetOutcome> {
        let mut assigned = Vec::with_capacity(self.temporaries.len());
        for (handle, token) in &self.temporaries {
            let id = placeholders.get(token).ok_or_else(|| Error::unresolved(token))?;
            assigned.push((*handle, *token, id));
        }
        let mut ids: BTreeMap<Handle, i64> =
            assigned.iter().map(|(handle, _, id)| (*handle, *id)).collect();
        for (handle, existing) in &self.bound {
            ids.insert(*handle, placeholders.resolve(existing)?);
        }

        let mut tracked = Vec::with_capacity(self.arena.len());
        for (handle, obj) in self.arena.iter() {
            let entity = obj.entity();
            let Some(id) = ids.get(&handle).copied().or_else(|| entity.current_id()) else {
                tracing::warn!(label = entity.label(), "Visited object has no identity");
                continue;
            };
            let key = EntityKey::new(entity.kind(), id);
            if self.is_removed(&key) {
                continue;
            }
            tracked.push((handle, key, entity.properties()?));
        }

        let candidates = RelationshipResolver::candidates(&self.pending, placeholders)?;

        let mut claims = Vec::with_capacity(self.claims.len());
        for (holder, relationship) in &self.claims {
            claims.push((placeholders.resolve(holder)?, placeholders.resolve(relationship)?));
        }

        // Nothing below can fail.
        let mut removed_relationships: Vec<i64> = Vec::new();
        for rel_id in std::mem::take(&mut self.record_removals) {
            if self.forget_record(rel_id).is_some() {
                removed_relationships.push(rel_id);
            }
        }
        let removed_nodes: Vec<i64> = std::mem::take(&mut self.node_removals)
            .into_iter()
            .collect();
        for node_id in &removed_nodes {
            removed_relationships.extend(self.forget_node(*node_id).iter().map(|r| r.rel_id()));
        }

        let records = RelationshipResolver::merge(self, candidates);

        for (node_id, rel_id) in std::mem::take(&mut self.releases) {
            if let Some(nodes) = self.holders.get_mut(&rel_id) {
                nodes.remove(&node_id);
                if nodes.is_empty() {
                    self.holders.remove(&rel_id);
                }
            }
        }
        for (node_id, rel_id) in claims {
            if self.records.contains_key(&rel_id) {
                self.holders.entry(rel_id).or_default().insert(node_id);
            }
        }

        for (handle, id) in &ids {
            if let Some(obj) = self.arena.get(*handle) {
                obj.entity().assign_id(*id);
            }
        }
        for (handle, key, properties) in tracked {
            if self.bound.contains_key(&handle) && self.identity_map.contains(&key) {
                continue;
            }
            if let Some(obj) = self.arena.get(handle) {
                self.identity_map.insert(key, obj.clone());
                self.change_tracker.snapshot(key, properties);
            }
        }

        self.clear_open_state();

        let outcome = ChangeSetOutcome {
            records,
            assigned: assigned.into_iter().map(|(_, token, id)| (token, id)).collect(),
            removed_relationships,
            removed_nodes,
        };
        tracing::debug!(
            records = outcome.records.len(),
            assigned = outcome.assigned.len(),
            removed_relationships = outcome.removed_relationships.len(),
            removed_nodes = outcome.removed_nodes.len(),
            "Change-set completed"
        );
        Ok(outcome)
    }

    fn is_removed(&self, key: &EntityKey) -> bool {
        match key.kind() {
            EntityKind::Node => self.node_removals.contains(&key.id()),
            EntityKind::Relationship => self.record_removals.contains(&key.id()),
        }
    }

    /// Forget all persisted state and reset token counters.
    ///
    /// Fails with a usage error while a change-set is open.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn purge(&mut self) -> Result<()> {
        if self.has_open_change_set() {
            return Err(Error::usage(
                "cannot purge the mapping context while a change-set is open",
            ));
        }
        tracing::debug!(
            tracked = self.identity_map.len(),
            records = self.records.len(),
            "Purging mapping context"
        );
        self.identity_map.clear();
        self.change_tracker.clear_all();
        self.records.clear();
        self.holders.clear();
        self.next_node_seq = 0;
        self.next_rel_seq = 0;
        Ok(())
    }

    pub fn debug_state(&self) -> ContextDebugInfo {
        ContextDebugInfo {
            tracked: self.identity_map.len(),
            snapshots: self.change_tracker.len(),
            records: self.records.len(),
            arena: self.arena.len(),
            temporaries: self.temporaries.len(),
            pending: self.pending.len(),
            scheduled_relationship_removals: self.record_removals.len(),
            scheduled_node_removals: self.node_removals.len(),
            open: self.has_open_change_set(),
        }
    }
}

impl std::fmt::Debug for MappingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingContext")
            .field("config", &self.config)
            .field("state", &self.debug_state())
            .finish()
    }
}

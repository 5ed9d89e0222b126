//! Change-set construction: walking an object graph into a [`WriteRequest`].
//!
//! A [`ChangeSet`] borrows the [`MappingContext`] mutably for the whole walk.
//! Each visited object is classified as new (placeholder, `CreateNode`) or
//! known (permanent id, `UpdateNode` when dirty). Each relationship is either
//! re-asserted (already confirmed, nothing written), folded into a pending
//! relationship of the same walk, or written as a new `CreateRelationship`
//! with a pending relationship logged for the resolver.
//!
//! The start node of every asserted relationship becomes one of its holders.
//! Stale detection only ever considers relationships a declared node holds,
//! so relationships merged by a load are left alone until a walk re-asserts
//! them.
//!
//! # Example
//!
//! ```ignore
//! impl Persistable for Person {
//!     fn persist(this: &ObjectRef<Self>, cs: &mut ChangeSet<'_>) -> Result<EntityRef> {
//!         let visit = cs.node(this)?;
//!         let me = visit.reference();
//!         if !visit.is_first() {
//!             return Ok(me);
//!         }
//!         let friends = read_object(this).friends.clone();
//!         cs.declare(me, &knows());
//!         for friend in &friends {
//!             let other = Person::persist(friend, cs)?;
//!             cs.relate(me, &knows(), other);
//!         }
//!         Ok(me)
//!     }
//! }
//! ```

use crate::context::{MappingContext, Visit};
use crate::identity_map::EntityKey;
use crate::pending::PendingRelationship;
use crate::write_plan::{WriteOp, WriteRequest};
use graphmodel_core::{
    Entity, EntityKind, EntityRef, Error, ObjectRef, Properties, RelationshipInfo, Result,
    read_object,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A domain type that knows how to walk its own part of the object graph.
pub trait Persistable: Entity + Sized {
    /// Add `this` (and whatever it reaches) to the change-set.
    ///
    /// The default treats the type as a plain node with no relationships.
    /// Implementations should clone links out of the read guard before
    /// recursing, so no lock is held across the walk.
    fn persist(this: &ObjectRef<Self>, cs: &mut ChangeSet<'_>) -> Result<EntityRef> {
        cs.node(this).map(Visit::into_reference)
    }
}

/// One batch of changes being assembled against a [`MappingContext`].
#[derive(Debug)]
pub struct ChangeSet<'a> {
    ctx: &'a mut MappingContext,
    ops: Vec<WriteOp>,
    /// `(holder, rel_id)` pairs of confirmed relationships re-asserted by
    /// this walk.
    kept: HashSet<(i64, i64)>,
    /// Relationship types whose outgoing set is fully described by this walk.
    declared: Vec<(EntityRef, RelationshipInfo)>,
    /// Labels of the nodes visited so far.
    labels: HashMap<EntityRef, &'static str>,
    deleted_relationships: HashSet<i64>,
}

impl<'a> ChangeSet<'a> {
    /// Open a change-set on `ctx`.
    ///
    /// Fails with a usage error if `ctx` already has one open.
    #[tracing::instrument(level = "debug", skip(ctx))]
    pub fn begin(ctx: &'a mut MappingContext) -> Result<Self> {
        ctx.open_change_set()?;
        Ok(Self {
            ctx,
            ops: Vec::new(),
            kept: HashSet::new(),
            declared: Vec::new(),
            labels: HashMap::new(),
            deleted_relationships: HashSet::new(),
        })
    }

    /// The context this change-set writes into.
    pub fn context(&self) -> &MappingContext {
        self.ctx
    }

    /// Number of ops collected so far.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn label_of(&self, reference: EntityRef) -> &'static str {
        if let Some(label) = self.labels.get(&reference).copied() {
            return label;
        }
        reference
            .permanent_id()
            .and_then(|id| self.ctx.node_label(id))
            .unwrap_or_default()
    }

    /// Visit a node.
    ///
    /// The first visit of a new object writes a `CreateNode`; the first visit
    /// of a persisted object writes an `UpdateNode` if its properties changed
    /// (always, when dirty checking is off). Later visits write nothing.
    pub fn node<T: Entity>(&mut self, obj: &ObjectRef<T>) -> Result<Visit> {
        if T::KIND != EntityKind::Node {
            return Err(Error::usage(format!(
                "{} is a relationship entity; use relate_entity",
                T::LABEL
            )));
        }

        let visit = self.ctx.visit(obj);
        let Visit::First(reference) = visit else {
            return Ok(visit);
        };
        self.labels.insert(reference, T::LABEL);

        let properties = read_object(obj).properties()?;
        match reference {
            EntityRef::Temporary(_) => {
                tracing::trace!(label = T::LABEL, %reference, "New node");
                self.ops.push(WriteOp::CreateNode {
                    reference,
                    label: T::LABEL.to_string(),
                    properties,
                });
            }
            EntityRef::Permanent(id) => {
                if let Some(changed) = self.changes::<T>(id, &properties) {
                    self.ops.push(WriteOp::UpdateNode {
                        id,
                        label: T::LABEL.to_string(),
                        properties,
                        changed,
                    });
                }
            }
        }
        Ok(visit)
    }

    /// Changed property names when an update is due, `None` otherwise.
    fn changes<T: Entity>(&self, id: i64, properties: &Properties) -> Option<Vec<String>> {
        let key = EntityKey::of::<T>(id);
        let tracker = self.ctx.change_tracker();
        if self.ctx.config().dirty_checking && !tracker.is_dirty(&key, properties) {
            return None;
        }
        Some(tracker.changed_properties(&key, properties))
    }

    /// Assert a relationship with no entity object.
    ///
    /// Returns the relationship's reference: the confirmed id when it already
    /// exists, the pending relationship's reference when this walk already
    /// wrote it, or a fresh placeholder.
    pub fn relate(&mut self, start: EntityRef, info: &RelationshipInfo, end: EntityRef) -> EntityRef {
        let own = if let Some(existing) = self.existing(start, info, end) {
            existing
        } else {
            let own = EntityRef::Temporary(self.ctx.issue_relationship_token());
            self.create_relationship(start, info, end, own, Properties::new());
            own
        };
        self.hold(start, own);
        own
    }

    /// The confirmed or pending relationship this walk would duplicate.
    fn existing(
        &self,
        start: EntityRef,
        info: &RelationshipInfo,
        end: EntityRef,
    ) -> Option<EntityRef> {
        if let (EntityRef::Permanent(s), EntityRef::Permanent(e)) = (start, end) {
            if let Some(record) = self.ctx.find_record(s, info, e) {
                return Some(EntityRef::Permanent(record.rel_id()));
            }
        }
        self.ctx
            .find_pending(start, info, end)
            .map(PendingRelationship::own)
    }

    fn hold(&mut self, holder: EntityRef, relationship: EntityRef) {
        if let (EntityRef::Permanent(node_id), EntityRef::Permanent(rel_id)) =
            (holder, relationship)
        {
            self.kept.insert((node_id, rel_id));
        }
        self.ctx.claim(holder, relationship);
    }

    /// Assert a relationship backed by an entity object.
    ///
    /// A new entity that duplicates a confirmed or pending relationship is
    /// bound to it and nothing new is created; otherwise it is written. A
    /// persisted one is kept and updated when its properties changed.
    pub fn relate_entity<R: Entity>(
        &mut self,
        start: EntityRef,
        info: &RelationshipInfo,
        end: EntityRef,
        rel: &ObjectRef<R>,
    ) -> Result<EntityRef> {
        if R::KIND != EntityKind::Relationship {
            return Err(Error::usage(format!(
                "{} is a node entity; use node",
                R::LABEL
            )));
        }

        let existing = if read_object(rel).entity_id().is_none() {
            self.existing(start, info, end)
        } else {
            None
        };
        let visit = match existing {
            Some(existing) => self.ctx.bind(rel, existing),
            None => self.ctx.visit(rel),
        };
        let reference = visit.reference();
        self.hold(start, reference);
        if !visit.is_first() {
            return Ok(reference);
        }

        let properties = read_object(rel).properties()?;
        match reference {
            EntityRef::Temporary(_) if existing.is_some() => {
                tracing::debug!(
                    label = R::LABEL,
                    %reference,
                    "Relationship object joins a pending relationship"
                );
            }
            EntityRef::Temporary(_) => {
                self.create_relationship(start, info, end, reference, properties);
            }
            EntityRef::Permanent(id) => {
                if let Some(changed) = self.changes::<R>(id, &properties) {
                    self.ops.push(WriteOp::UpdateRelationship {
                        id,
                        rel_type: info.rel_type.clone(),
                        properties,
                        changed,
                    });
                }
            }
        }
        Ok(reference)
    }

    fn create_relationship(
        &mut self,
        start: EntityRef,
        info: &RelationshipInfo,
        end: EntityRef,
        own: EntityRef,
        properties: Properties,
    ) {
        self.ops.push(WriteOp::CreateRelationship {
            reference: own,
            rel_type: info.rel_type.clone(),
            start,
            end,
            properties,
        });
        let pending = PendingRelationship::new(start, end, own, info)
            .with_types(self.label_of(start), self.label_of(end));
        self.ctx.add_pending(pending);
    }

    /// Declare that this walk describes every `info` relationship `start`
    /// holds.
    ///
    /// On [`finish`](Self::finish), a confirmed relationship of that type
    /// held by `start` but not re-asserted from it loses `start` as a holder.
    /// It is deleted when no other node holds it.
    pub fn declare(&mut self, start: EntityRef, info: &RelationshipInfo) {
        self.declared.push((start, info.clone()));
    }

    /// Delete a persisted entity. Never-persisted objects are ignored.
    pub fn delete_node<T: Entity>(&mut self, obj: &ObjectRef<T>) -> Result<()> {
        let Some(id) = read_object(obj).entity_id() else {
            tracing::debug!(label = T::LABEL, "Skipping delete of unsaved entity");
            return Ok(());
        };
        match T::KIND {
            EntityKind::Relationship => self.delete_relationship(id),
            EntityKind::Node => {
                self.ops.push(WriteOp::DeleteNode {
                    id,
                    label: T::LABEL.to_string(),
                });
                self.ctx.schedule_node_removal(id);
            }
        }
        Ok(())
    }

    /// Delete a confirmed relationship by id.
    pub fn delete_relationship(&mut self, rel_id: i64) {
        if self.deleted_relationships.insert(rel_id) {
            self.ops.push(WriteOp::DeleteRelationship { id: rel_id });
            self.ctx.schedule_record_removal(rel_id);
        }
    }

    /// Close the walk and produce the ordered request.
    ///
    /// The context keeps the change-set open until it is completed with the
    /// store's answer or abandoned.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn finish(mut self) -> WriteRequest {
        if self.ctx.config().delete_stale_relationships {
            let mut dropped: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
            for (start, info) in &self.declared {
                let Some(start_id) = start.permanent_id() else {
                    continue;
                };
                for record in self.ctx.records() {
                    let rel_id = record.rel_id();
                    if record.rel_type() == info.rel_type
                        && self.ctx.is_held_by(rel_id, start_id)
                        && !self.kept.contains(&(start_id, rel_id))
                    {
                        dropped.entry(rel_id).or_default().push(start_id);
                    }
                }
            }
            for (rel_id, holders) in dropped {
                let still_held = self.ctx.holders(rel_id).any(|h| !holders.contains(&h))
                    || self.kept.iter().any(|(_, kept)| *kept == rel_id);
                if still_held {
                    for holder in holders {
                        tracing::debug!(rel_id, holder, "Releasing shared relationship");
                        self.ctx.release(holder, rel_id);
                    }
                } else {
                    tracing::debug!(rel_id, "Deleting stale relationship");
                    self.delete_relationship(rel_id);
                }
            }
        }

        let request = WriteRequest::from_ops(self.ops);
        tracing::debug!(ops = request.len(), "Change-set finished");
        request
    }

    /// Discard the walk and everything it recorded in the context.
    pub fn abandon(self) {
        self.ctx.abandon_change_set();
    }
}

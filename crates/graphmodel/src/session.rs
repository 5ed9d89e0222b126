//! Session: a mapping context bound to a graph store.
//!
//! # Example
//!
//! ```rust,ignore
//! use graphmodel::prelude::*;
//!
//! let mut session = Session::new(MemoryStore::new());
//! session.register(RelationshipInfo::new("EDGE").singleton(true));
//!
//! let summary = session.save(&alice)?;
//! session.clear()?;
//!
//! let alice = session.load::<Person>(summary.id.unwrap())?;
//! ```

use crate::store::GraphStore;
use graphmodel_core::{
    Entity, EntityKind, Error, ObjectRef, PlaceholderMap, RelationshipInfo, RelationshipRecord,
    Result, from_properties, read_object, shared,
};
use graphmodel_session::{
    ChangeSet, ChangeSetOutcome, MappingContext, Persistable, SessionConfig, WriteCounts,
    WriteRequest,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// What a successful save wrote and merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Permanent id of the saved root, when there was one.
    pub id: Option<i64>,
    /// Ops sent to the store.
    pub counts: WriteCounts,
    /// Changes folded into the mapping context.
    pub outcome: ChangeSetOutcome,
}

/// A mapping context, its store and the relationship metadata registry.
#[derive(Debug)]
pub struct Session<S: GraphStore> {
    store: S,
    context: MappingContext,
    registry: HashMap<String, RelationshipInfo>,
}

impl<S: GraphStore> Session<S> {
    /// Create a session with the default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, SessionConfig::default())
    }

    /// Create a session with a custom configuration.
    pub fn with_config(store: S, config: SessionConfig) -> Self {
        Self {
            store,
            context: MappingContext::with_config(config),
            registry: HashMap::new(),
        }
    }

    /// Register metadata for a relationship type.
    ///
    /// Loaded relationships of an unregistered type are treated as directed
    /// and multi-valued.
    pub fn register(&mut self, info: RelationshipInfo) {
        self.registry.insert(info.rel_type.clone(), info);
    }

    /// Metadata for `rel_type`.
    pub fn relationship_info(&self, rel_type: &str) -> RelationshipInfo {
        self.registry
            .get(rel_type)
            .cloned()
            .unwrap_or_else(|| RelationshipInfo::new(rel_type))
    }

    /// Save `obj` and everything its [`Persistable`] walk reaches.
    #[tracing::instrument(level = "info", skip(self, obj), fields(label = T::LABEL))]
    pub fn save<T: Persistable>(&mut self, obj: &ObjectRef<T>) -> Result<SaveSummary> {
        let mut summary = self.write(|cs| T::persist(obj, cs).map(|_| ()))?;
        summary.id = read_object(obj).entity_id();
        Ok(summary)
    }

    /// Delete a persisted entity. Deleting a node also drops every
    /// relationship touching it.
    #[tracing::instrument(level = "info", skip(self, obj), fields(label = T::LABEL))]
    pub fn delete<T: Entity>(&mut self, obj: &ObjectRef<T>) -> Result<SaveSummary> {
        self.write(|cs| cs.delete_node(obj))
    }

    /// Run an arbitrary walk as one change-set.
    ///
    /// On any failure (the walk, the store, a malformed or incomplete
    /// response) the change-set is abandoned and the error returned as is.
    pub fn write<F>(&mut self, walk: F) -> Result<SaveSummary>
    where
        F: FnOnce(&mut ChangeSet<'_>) -> Result<()>,
    {
        let request = {
            let mut cs = ChangeSet::begin(&mut self.context)?;
            if let Err(e) = walk(&mut cs) {
                cs.abandon();
                return Err(e);
            }
            cs.finish()
        };

        match self.flush(&request) {
            Ok(outcome) => {
                let counts = request.counts();
                tracing::info!(
                    ops = counts.total(),
                    records = outcome.records.len(),
                    assigned = outcome.assigned.len(),
                    "Saved change-set"
                );
                Ok(SaveSummary {
                    id: None,
                    counts,
                    outcome,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Save failed; abandoning change-set");
                self.context.abandon_change_set();
                Err(e)
            }
        }
    }

    fn flush(&mut self, request: &WriteRequest) -> Result<ChangeSetOutcome> {
        if request.is_empty() {
            tracing::debug!("Nothing to write");
            return self.context.complete_change_set(&PlaceholderMap::new());
        }
        let response = self.store.execute(request)?;
        let placeholders = response.placeholder_map()?;
        self.context.complete_change_set(&placeholders)
    }

    /// Load node `id` as a `T`.
    ///
    /// Returns the tracked object when the session already has one, so two
    /// loads of the same id yield the same `Arc`. Otherwise the node is
    /// fetched, tracked, and its relationships merged as records. A node
    /// without `T`'s label is reported as absent.
    ///
    /// Merged relationships have no holders, so saving the loaded object
    /// before its links are filled in never deletes them.
    #[tracing::instrument(level = "debug", skip(self), fields(label = T::LABEL))]
    pub fn load<T: Entity + DeserializeOwned>(&mut self, id: i64) -> Result<Option<ObjectRef<T>>> {
        if T::KIND != EntityKind::Node {
            return Err(Error::usage(format!(
                "{} is a relationship entity and cannot be loaded by node id",
                T::LABEL
            )));
        }
        if let Some(obj) = self.context.get::<T>(id) {
            tracing::trace!(id, "Identity map hit");
            return Ok(Some(obj));
        }

        let Some(row) = self.store.fetch_node(id)? else {
            return Ok(None);
        };
        if !row.has_label(T::LABEL) {
            tracing::debug!(id, labels = ?row.labels, "Node has a different label");
            return Ok(None);
        }

        let obj = shared(from_properties::<T>(id, row.properties)?);
        self.context.track_persisted(id, &obj)?;

        let rows = self.store.fetch_relationships(id)?;
        let count = rows.len();
        for row in rows {
            let info = self.relationship_info(&row.rel_type);
            self.context.merge_record(RelationshipRecord::new(
                row.start,
                row.id,
                row.end,
                &info,
                row.start_label,
                row.end_label,
            ));
        }

        tracing::info!(id, relationships = count, "Loaded node");
        Ok(Some(obj))
    }

    /// Forget everything the session tracks.
    pub fn clear(&mut self) -> Result<()> {
        self.context.purge()
    }

    pub fn context(&self) -> &MappingContext {
        &self.context
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consume the session and return the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Confirmed relationships touching `node_id`.
    pub fn relationships(&self, node_id: i64) -> Vec<RelationshipRecord> {
        self.context.records_touching(node_id).cloned().collect()
    }
}

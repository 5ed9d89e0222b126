//! Write requests shipped to a graph store.
//!
//! A request is an ordered list of [`WriteOp`]s. Ordering follows the
//! dependencies between graph elements:
//! - relationship deletes before node deletes (a node must be detached first)
//! - node creates before relationship creates (endpoints must exist)
//! - updates after the creates of the same element kind
//!
//! New elements carry a placeholder reference; the store answers with a
//! [`WriteResponse`] mapping every placeholder to the id it assigned.

use graphmodel_core::{EntityRef, PlaceholderMap, Properties, Result, TempToken};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single write against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    /// Create a node. `reference` is always a placeholder.
    CreateNode {
        reference: EntityRef,
        label: String,
        properties: Properties,
    },
    /// Overwrite the properties of an existing node.
    UpdateNode {
        id: i64,
        label: String,
        properties: Properties,
        /// Properties that differ from the last known state.
        changed: Vec<String>,
    },
    /// Delete a node together with every relationship touching it.
    DeleteNode { id: i64, label: String },
    /// Create a relationship. Endpoints may be placeholders created earlier in
    /// the same request.
    CreateRelationship {
        reference: EntityRef,
        rel_type: String,
        start: EntityRef,
        end: EntityRef,
        properties: Properties,
    },
    /// Overwrite the properties of an existing relationship.
    UpdateRelationship {
        id: i64,
        rel_type: String,
        properties: Properties,
        changed: Vec<String>,
    },
    /// Delete a relationship.
    DeleteRelationship { id: i64 },
}

impl WriteOp {
    /// Position of this op's kind in a request.
    fn phase(&self) -> u8 {
        match self {
            WriteOp::DeleteRelationship { .. } => 0,
            WriteOp::DeleteNode { .. } => 1,
            WriteOp::CreateNode { .. } => 2,
            WriteOp::UpdateNode { .. } => 3,
            WriteOp::CreateRelationship { .. } => 4,
            WriteOp::UpdateRelationship { .. } => 5,
        }
    }

    /// The placeholder this op introduces, if any.
    pub fn temporary(&self) -> Option<TempToken> {
        match self {
            WriteOp::CreateNode { reference, .. } | WriteOp::CreateRelationship { reference, .. } => {
                reference.token()
            }
            _ => None,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(
            self,
            WriteOp::CreateNode { .. } | WriteOp::CreateRelationship { .. }
        )
    }

    pub fn is_update(&self) -> bool {
        matches!(
            self,
            WriteOp::UpdateNode { .. } | WriteOp::UpdateRelationship { .. }
        )
    }

    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            WriteOp::DeleteNode { .. } | WriteOp::DeleteRelationship { .. }
        )
    }
}

/// Number of ops of each kind in a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteCounts {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_deleted: usize,
    pub relationships_created: usize,
    pub relationships_updated: usize,
    pub relationships_deleted: usize,
}

impl WriteCounts {
    /// Total number of ops.
    pub fn total(&self) -> usize {
        self.nodes_created
            + self.nodes_updated
            + self.nodes_deleted
            + self.relationships_created
            + self.relationships_updated
            + self.relationships_deleted
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// An ordered batch of writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    ops: Vec<WriteOp>,
}

impl WriteRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Order `ops` by phase. Ops of the same phase keep their relative order.
    #[tracing::instrument(level = "debug", skip(ops), fields(ops = ops.len()))]
    pub fn from_ops(mut ops: Vec<WriteOp>) -> Self {
        ops.sort_by_key(WriteOp::phase);
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Every placeholder introduced by this request, in op order.
    pub fn temporaries(&self) -> Vec<TempToken> {
        self.ops.iter().filter_map(WriteOp::temporary).collect()
    }

    pub fn counts(&self) -> WriteCounts {
        let mut counts = WriteCounts::default();
        for op in &self.ops {
            match op {
                WriteOp::CreateNode { .. } => counts.nodes_created += 1,
                WriteOp::UpdateNode { .. } => counts.nodes_updated += 1,
                WriteOp::DeleteNode { .. } => counts.nodes_deleted += 1,
                WriteOp::CreateRelationship { .. } => counts.relationships_created += 1,
                WriteOp::UpdateRelationship { .. } => counts.relationships_updated += 1,
                WriteOp::DeleteRelationship { .. } => counts.relationships_deleted += 1,
            }
        }
        counts
    }

    /// Serialize for shipping to a store.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The store's answer to a [`WriteRequest`]: placeholder text -> assigned id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub placeholders: HashMap<String, i64>,
}

impl WriteResponse {
    pub fn new(placeholders: HashMap<String, i64>) -> Self {
        Self { placeholders }
    }

    /// Parse the raw keys into a [`PlaceholderMap`].
    pub fn placeholder_map(&self) -> Result<PlaceholderMap> {
        PlaceholderMap::parse(self.placeholders.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

//! In-process graph store.
//!
//! `MemoryStore` keeps the whole graph in ordered maps and applies each
//! request to a copy, swapping it in only when every op succeeded. Node and
//! relationship ids come from one shared counter.
//!
//! It also carries a few hooks for exercising failure paths:
//! [`fail_next_write`](MemoryStore::fail_next_write) and
//! [`drop_placeholder`](MemoryStore::drop_placeholder).

use crate::store::{GraphStore, NodeRow, RelationshipRow};
use graphmodel_core::{
    EntityRef, Error, Properties, Result, StoreError, StoreErrorKind, TempToken,
};
use graphmodel_session::{WriteOp, WriteRequest, WriteResponse};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone)]
struct StoredNode {
    label: String,
    properties: Properties,
}

#[derive(Debug, Clone)]
struct StoredRelationship {
    rel_type: String,
    start: i64,
    end: i64,
    properties: Properties,
}

#[derive(Debug, Clone, Default)]
struct Graph {
    nodes: BTreeMap<i64, StoredNode>,
    relationships: BTreeMap<i64, StoredRelationship>,
    next_id: i64,
}

fn not_found(what: &str, id: i64) -> Error {
    Error::Store(StoreError::new(
        StoreErrorKind::NotFound,
        format!("{what} {id} does not exist"),
    ))
}

fn rejected(message: String) -> Error {
    Error::Store(StoreError::new(StoreErrorKind::Rejected, message))
}

impl Graph {
    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn node_id(&self, reference: EntityRef, assigned: &HashMap<TempToken, i64>) -> Result<i64> {
        let id = match reference {
            EntityRef::Permanent(id) => id,
            EntityRef::Temporary(token) => *assigned
                .get(&token)
                .ok_or_else(|| rejected(format!("{token} is used before it is created")))?,
        };
        if self.nodes.contains_key(&id) {
            Ok(id)
        } else {
            Err(not_found("node", id))
        }
    }

    fn introduce(
        assigned: &mut HashMap<TempToken, i64>,
        reference: EntityRef,
        id: i64,
    ) -> Result<()> {
        let EntityRef::Temporary(token) = reference else {
            return Err(rejected(format!("create with permanent reference {reference}")));
        };
        if assigned.insert(token, id).is_some() {
            return Err(rejected(format!("{token} is created twice")));
        }
        Ok(())
    }

    fn apply(&mut self, op: &WriteOp, assigned: &mut HashMap<TempToken, i64>) -> Result<()> {
        match op {
            WriteOp::CreateNode {
                reference,
                label,
                properties,
            } => {
                let id = self.allocate();
                Self::introduce(assigned, *reference, id)?;
                self.nodes.insert(
                    id,
                    StoredNode {
                        label: label.clone(),
                        properties: properties.clone(),
                    },
                );
            }
            WriteOp::UpdateNode { id, properties, .. } => {
                let node = self.nodes.get_mut(id).ok_or_else(|| not_found("node", *id))?;
                node.properties = properties.clone();
            }
            WriteOp::DeleteNode { id, .. } => {
                self.nodes.remove(id).ok_or_else(|| not_found("node", *id))?;
                self.relationships
                    .retain(|_, rel| rel.start != *id && rel.end != *id);
            }
            WriteOp::CreateRelationship {
                reference,
                rel_type,
                start,
                end,
                properties,
            } => {
                let start = self.node_id(*start, assigned)?;
                let end = self.node_id(*end, assigned)?;
                let id = self.allocate();
                Self::introduce(assigned, *reference, id)?;
                self.relationships.insert(
                    id,
                    StoredRelationship {
                        rel_type: rel_type.clone(),
                        start,
                        end,
                        properties: properties.clone(),
                    },
                );
            }
            WriteOp::UpdateRelationship { id, properties, .. } => {
                let rel = self
                    .relationships
                    .get_mut(id)
                    .ok_or_else(|| not_found("relationship", *id))?;
                rel.properties = properties.clone();
            }
            WriteOp::DeleteRelationship { id } => {
                self.relationships
                    .remove(id)
                    .ok_or_else(|| not_found("relationship", *id))?;
            }
        }
        Ok(())
    }

    fn label(&self, id: i64) -> String {
        self.nodes
            .get(&id)
            .map(|n| n.label.clone())
            .unwrap_or_default()
    }

    fn relationship_row(&self, id: i64, rel: &StoredRelationship) -> RelationshipRow {
        RelationshipRow {
            id,
            rel_type: rel.rel_type.clone(),
            start: rel.start,
            end: rel.end,
            start_label: self.label(rel.start),
            end_label: self.label(rel.end),
            properties: rel.properties.clone(),
        }
    }
}

/// A graph store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: Graph,
    received: Vec<WriteRequest>,
    fail_next: Option<StoreErrorKind>,
    dropped: HashSet<String>,
}

impl MemoryStore {
    /// Create an empty store whose first id is 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose first id is `first_id`.
    pub fn starting_at(first_id: i64) -> Self {
        let mut store = Self::default();
        store.graph.next_id = first_id;
        store
    }

    /// Make the next `execute` fail with `kind` without touching the graph.
    pub fn fail_next_write(&mut self, kind: StoreErrorKind) {
        self.fail_next = Some(kind);
    }

    /// Leave `token` out of every future response, as a misbehaving server
    /// would. The write itself still happens.
    pub fn drop_placeholder(&mut self, token: impl Into<String>) {
        self.dropped.insert(token.into());
    }

    /// Every request passed to `execute`, including failed ones.
    pub fn requests(&self) -> &[WriteRequest] {
        &self.received
    }

    pub fn node(&self, id: i64) -> Option<NodeRow> {
        self.graph.nodes.get(&id).map(|node| NodeRow {
            id,
            labels: vec![node.label.clone()],
            properties: node.properties.clone(),
        })
    }

    /// Every stored relationship, ordered by id.
    pub fn relationships(&self) -> Vec<RelationshipRow> {
        self.graph
            .relationships
            .iter()
            .map(|(id, rel)| self.graph.relationship_row(*id, rel))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.relationships.len()
    }
}

impl GraphStore for MemoryStore {
    #[tracing::instrument(level = "debug", skip_all, fields(ops = request.len()))]
    fn execute(&mut self, request: &WriteRequest) -> Result<WriteResponse> {
        self.received.push(request.clone());

        if let Some(kind) = self.fail_next.take() {
            tracing::debug!(?kind, "Injected write failure");
            return Err(Error::Store(StoreError::new(kind, "injected write failure")));
        }

        let mut graph = self.graph.clone();
        let mut assigned = HashMap::new();
        for op in request.ops() {
            graph.apply(op, &mut assigned)?;
        }
        self.graph = graph;

        let placeholders = assigned
            .into_iter()
            .map(|(token, id)| (token.to_string(), id))
            .filter(|(token, _)| !self.dropped.contains(token))
            .collect();
        Ok(WriteResponse::new(placeholders))
    }

    fn fetch_node(&self, id: i64) -> Result<Option<NodeRow>> {
        Ok(self.node(id))
    }

    fn fetch_relationships(&self, node_id: i64) -> Result<Vec<RelationshipRow>> {
        Ok(self
            .graph
            .relationships
            .iter()
            .filter(|(_, rel)| rel.start == node_id || rel.end == node_id)
            .map(|(id, rel)| self.graph.relationship_row(*id, rel))
            .collect())
    }
}

//! The transport seam between a session and a graph database.

use graphmodel_core::{Properties, Result};
use graphmodel_session::{WriteRequest, WriteResponse};
use serde::{Deserialize, Serialize};

/// A stored node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: Properties,
}

impl NodeRow {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// A stored relationship, with the labels of both endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRow {
    pub id: i64,
    pub rel_type: String,
    pub start: i64,
    pub end: i64,
    pub start_label: String,
    pub end_label: String,
    pub properties: Properties,
}

/// A graph database as seen by a [`Session`](crate::Session).
///
/// `execute` must apply a request atomically: either every op takes effect
/// and the response maps every placeholder the request introduced, or
/// nothing changes and an error is returned.
pub trait GraphStore {
    /// Apply a write request and report the ids assigned to its placeholders.
    fn execute(&mut self, request: &WriteRequest) -> Result<WriteResponse>;

    /// Fetch a node by id.
    fn fetch_node(&self, id: i64) -> Result<Option<NodeRow>>;

    /// Fetch every relationship with `node_id` at either end.
    fn fetch_relationships(&self, node_id: i64) -> Result<Vec<RelationshipRow>>;
}

impl<S: GraphStore + ?Sized> GraphStore for Box<S> {
    fn execute(&mut self, request: &WriteRequest) -> Result<WriteResponse> {
        (**self).execute(request)
    }

    fn fetch_node(&self, id: i64) -> Result<Option<NodeRow>> {
        (**self).fetch_node(id)
    }

    fn fetch_relationships(&self, node_id: i64) -> Result<Vec<RelationshipRow>> {
        (**self).fetch_relationships(node_id)
    }
}

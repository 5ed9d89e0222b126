//! Mapping context and change sets for GraphModel Rust.
//!
//! `graphmodel-session` is the **identity-resolution layer**. It decides which
//! objects and relationships are new, builds an ordered write request for a
//! batch of changes, and folds the store's placeholder answer back into the
//! live object graph.
//!
//! # Role In The Architecture
//!
//! - **Identity arena**: correlates objects by pointer identity during a walk.
//! - **Identity map**: one live object per persisted id.
//! - **Change tracking**: property snapshots for dirty detection.
//! - **Relationship resolution**: pending relationships become records once
//!   every placeholder has an id.
//!
//! # Example
//!
//! ```ignore
//! let mut ctx = MappingContext::new();
//!
//! let mut cs = ChangeSet::begin(&mut ctx)?;
//! Person::persist(&alice, &mut cs)?;
//! let request = cs.finish();
//!
//! let response = store.execute(&request)?;
//! let outcome = ctx.complete_change_set(&response.placeholder_map()?)?;
//! ```

pub mod change_set;
pub mod change_tracker;
pub mod context;
pub mod identity_map;
pub mod pending;
pub mod resolver;
pub mod write_plan;

pub use change_set::{ChangeSet, Persistable};
pub use change_tracker::ChangeTracker;
pub use context::{ChangeSetOutcome, ContextDebugInfo, MappingContext, Visit};
pub use identity_map::{EntityKey, Handle, IdentityMap, ObjectArena};
pub use pending::PendingRelationship;
pub use resolver::RelationshipResolver;
pub use write_plan::{WriteCounts, WriteOp, WriteRequest, WriteResponse};

/// Configuration for a mapping context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Only write `UpdateNode`/`UpdateRelationship` for persisted entities
    /// whose properties differ from their snapshot.
    pub dirty_checking: bool,
    /// Delete confirmed relationships that a declared walk no longer reaches.
    pub delete_stale_relationships: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dirty_checking: true,
            delete_stale_relationships: true,
        }
    }
}

impl SessionConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `dirty_checking` option (builder pattern).
    #[must_use]
    pub fn dirty_checking(mut self, value: bool) -> Self {
        self.dirty_checking = value;
        self
    }

    /// Set the `delete_stale_relationships` option (builder pattern).
    #[must_use]
    pub fn delete_stale_relationships(mut self, value: bool) -> Self {
        self.delete_stale_relationships = value;
        self
    }
}

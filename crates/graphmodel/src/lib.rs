//! GraphModel Rust - object-graph mapping for graph databases.
//!
//! GraphModel maps in-memory domain objects to graph nodes and relationships
//! and keeps their identity stable across save and load:
//!
//! - New objects are correlated by pointer identity, never by `PartialEq`
//! - Every save is one change-set: an ordered write request, then a single
//!   placeholder answer from the store
//! - Relationships are reconciled against what the session already knows,
//!   honoring direction-insensitive (singleton) types
//! - Loads go through an identity map, so one id means one live object
//!
//! # Quick Start
//!
//! ```ignore
//! use graphmodel::prelude::*;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Person {
//!     id: Option<i64>,
//!     name: String,
//!     #[serde(skip)]
//!     friends: Vec<ObjectRef<Person>>,
//! }
//!
//! impl Entity for Person {
//!     const LABEL: &'static str = "Person";
//!
//!     fn entity_id(&self) -> Option<i64> {
//!         self.id
//!     }
//!
//!     fn set_entity_id(&mut self, id: i64) {
//!         self.id = Some(id);
//!     }
//! }
//!
//! impl Persistable for Person {
//!     fn persist(this: &ObjectRef<Self>, cs: &mut ChangeSet<'_>) -> Result<EntityRef> {
//!         let visit = cs.node(this)?;
//!         let me = visit.reference();
//!         if visit.is_first() {
//!             let friends = read_object(this).friends.clone();
//!             for friend in &friends {
//!                 let other = Person::persist(friend, cs)?;
//!                 cs.relate(me, &RelationshipInfo::new("KNOWS"), other);
//!             }
//!         }
//!         Ok(me)
//!     }
//! }
//!
//! let mut session = Session::new(MemoryStore::new());
//! let alice = shared(Person { id: None, name: "Alice".into(), friends: vec![] });
//! session.save(&alice)?;
//! ```

pub mod memory;
pub mod session;
pub mod store;

pub use graphmodel_core::{
    Entity, EntityKind, EntityRef, Error, ObjectRef, PlaceholderMap, Properties,
    RelationshipInfo, RelationshipRecord, Result, StoreError, StoreErrorKind, TempToken,
    TokenKind, from_properties, read_object, same_object, shared, write_object,
};
pub use graphmodel_session::{
    ChangeSet, ChangeSetOutcome, MappingContext, PendingRelationship, Persistable,
    RelationshipResolver, SessionConfig, Visit, WriteCounts, WriteOp, WriteRequest,
    WriteResponse,
};
pub use memory::MemoryStore;
pub use session::{SaveSummary, Session};
pub use store::{GraphStore, NodeRow, RelationshipRow};

/// Everything needed to map a domain model.
pub mod prelude {
    pub use crate::{
        // Session
        ChangeSet,
        // Core traits and types
        Entity,
        EntityKind,
        EntityRef,
        Error,
        GraphStore,
        MemoryStore,
        ObjectRef,
        Persistable,
        RelationshipInfo,
        Result,
        Session,
        SessionConfig,
        Visit,
        // Helpers
        read_object,
        shared,
        write_object,
    };
    pub use serde::{Deserialize, Serialize};
}

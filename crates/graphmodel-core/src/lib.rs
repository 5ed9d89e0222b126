//! Core types and traits for GraphModel Rust.
//!
//! This crate provides the foundational abstractions shared by the mapping
//! layer:
//!
//! - `Entity` trait for mapping structs to nodes and relationship entities
//! - `EntityRef` for permanent ids and session-local placeholders
//! - `PlaceholderMap` for the store's placeholder-to-id answer
//! - `RelationshipInfo` / `RelationshipRecord` for relationship metadata and
//!   confirmed relationships
//! - `Error` / `Result` used by every GraphModel crate

pub mod entity;
pub mod error;
pub mod reference;
pub mod relationship;

pub use entity::{
    Entity, EntityKind, ObjectReadGuard, ObjectRef, ObjectWriteGuard, Properties, from_properties,
    read_object, same_object, shared, write_object,
};
pub use error::{
    Error, MalformedReferenceError, Result, StoreError, StoreErrorKind, UnresolvedReferenceError,
    UsageError,
};
pub use reference::{EntityRef, PlaceholderMap, TempToken, TokenKind};
pub use relationship::{RelationshipInfo, RelationshipRecord};

//! Entity trait for mapping domain structs to graph nodes and relationships.
//!
//! Entities are shared as [`ObjectRef`]s (`Arc<RwLock<T>>`). The mapping layer
//! correlates them by pointer identity, never by `PartialEq` or `Hash`, so a
//! type is free to define whatever equality its domain needs.
//!
//! # Example
//!
//! ```ignore
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
//! ```

use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Property map written to and read from the store.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Whether an entity maps to a node or to a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Node,
    Relationship,
}

/// Trait for types that map to graph nodes or relationship entities.
pub trait Entity: Serialize + Send + Sync + 'static {
    /// Node label, or relationship type for relationship entities.
    const LABEL: &'static str;

    /// Whether instances are nodes or relationships.
    const KIND: EntityKind = EntityKind::Node;

    /// Serialized field that holds the identity. It is never written as a
    /// property.
    const ID_FIELD: &'static str = "id";

    /// The permanent identity, if this instance has been persisted.
    fn entity_id(&self) -> Option<i64>;

    /// Record the identity the store assigned.
    fn set_entity_id(&mut self, id: i64);

    /// Check if this instance has never been persisted.
    fn is_new(&self) -> bool {
        self.entity_id().is_none()
    }

    /// Properties to write to the store.
    ///
    /// The default serializes `self` with serde and drops [`Self::ID_FIELD`].
    /// Fields holding other entities should be `#[serde(skip)]`.
    fn properties(&self) -> Result<Properties> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(mut map) => {
                map.remove(Self::ID_FIELD);
                Ok(map)
            }
            serde_json::Value::Null => Ok(Properties::new()),
            other => Err(Error::Serde(format!(
                "{} must serialize to a map, got {}",
                Self::LABEL,
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "a map",
    }
}

/// Rebuild an entity from stored properties and its permanent id.
pub fn from_properties<T: Entity + DeserializeOwned>(id: i64, properties: Properties) -> Result<T> {
    let mut entity: T = serde_json::from_value(serde_json::Value::Object(properties))?;
    entity.set_entity_id(id);
    Ok(entity)
}

/// A shared, identity-bearing handle to an entity.
pub type ObjectRef<T> = Arc<RwLock<T>>;

/// A guard for reading an entity.
pub type ObjectReadGuard<'a, T> = RwLockReadGuard<'a, T>;

/// A guard for writing to an entity.
pub type ObjectWriteGuard<'a, T> = RwLockWriteGuard<'a, T>;

/// Wrap a value in a new [`ObjectRef`].
pub fn shared<T: Entity>(value: T) -> ObjectRef<T> {
    Arc::new(RwLock::new(value))
}

/// Read-lock an entity. A poisoned lock still yields the data: entities are
/// plain values and carry no invariant a panicking writer could break.
pub fn read_object<T>(obj: &RwLock<T>) -> ObjectReadGuard<'_, T> {
    obj.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-lock an entity, recovering from poisoning like [`read_object`].
pub fn write_object<T>(obj: &RwLock<T>) -> ObjectWriteGuard<'_, T> {
    obj.write().unwrap_or_else(PoisonError::into_inner)
}

/// Check if two handles point at the same object.
pub fn same_object<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Movie {
        id: Option<i64>,
        title: String,
        year: u16,
    }

    impl Entity for Movie {
        const LABEL: &'static str = "Movie";

        fn entity_id(&self) -> Option<i64> {
            self.id
        }

        fn set_entity_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    #[derive(Debug, Serialize)]
    struct Tag(String);

    impl Entity for Tag {
        const LABEL: &'static str = "Tag";

        fn entity_id(&self) -> Option<i64> {
            None
        }

        fn set_entity_id(&mut self, _id: i64) {}
    }

    #[test]
    fn properties_drop_the_id_field() {
        let movie = Movie {
            id: Some(3),
            title: "Alien".to_string(),
            year: 1979,
        };
        let props = movie.properties().unwrap();
        assert!(!props.contains_key("id"));
        assert_eq!(props["title"], "Alien");
        assert_eq!(props["year"], 1979);
    }

    #[test]
    fn non_map_entities_are_rejected() {
        let err = Tag("x".to_string()).properties().unwrap_err();
        assert!(matches!(err, Error::Serde(_)));
    }

    #[test]
    fn rebuild_from_properties() {
        let mut props = Properties::new();
        props.insert("title".to_string(), "Heat".into());
        props.insert("year".to_string(), 1995.into());

        let movie: Movie = from_properties(12, props).unwrap();
        assert_eq!(movie.id, Some(12));
        assert_eq!(movie.title, "Heat");
        assert!(!movie.is_new());
    }

    #[test]
    fn identity_is_pointer_identity() {
        let a = shared(Movie {
            id: None,
            title: "Solaris".to_string(),
            year: 1972,
        });
        let b = shared(read_object(&a).clone());
        let a2 = Arc::clone(&a);

        assert!(same_object(&a, &a2));
        assert!(!same_object(&a, &b));

        write_object(&a).set_entity_id(1);
        assert_eq!(read_object(&a2).id, Some(1));
        assert_eq!(read_object(&b).id, None);
    }
}

//! Identity tracking for mapped entities.
//!
//! Two structures live here:
//!
//! - [`IdentityMap`]: permanent id -> the single live object for that id, so a
//!   load of an already tracked entity hands back the same `Arc`.
//! - [`ObjectArena`]: the objects seen during the current graph traversal,
//!   indexed by insertion-order [`Handle`]s and looked up by pointer identity.
//!
//! Neither structure ever calls `PartialEq` or `Hash` on a domain object. Two
//! objects that compare equal (or hash alike) are still two entities.

use graphmodel_core::{
    Entity, EntityKind, ObjectRef, Properties, Result, read_object, write_object,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Object-safe view of an `RwLock<T: Entity>`.
pub(crate) trait ErasedEntity: Send + Sync {
    fn label(&self) -> &'static str;
    fn kind(&self) -> EntityKind;
    fn current_id(&self) -> Option<i64>;
    fn assign_id(&self, id: i64);
    fn properties(&self) -> Result<Properties>;
}

impl<T: Entity> ErasedEntity for RwLock<T> {
    fn label(&self) -> &'static str {
        T::LABEL
    }

    fn kind(&self) -> EntityKind {
        T::KIND
    }

    fn current_id(&self) -> Option<i64> {
        read_object(self).entity_id()
    }

    fn assign_id(&self, id: i64) {
        write_object(self).set_entity_id(id);
    }

    fn properties(&self) -> Result<Properties> {
        read_object(self).properties()
    }
}

/// Key for a persisted entity. Node ids and relationship ids are separate
/// id spaces in the store, so the kind is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    kind: EntityKind,
    id: i64,
}

impl EntityKey {
    /// Key for a node.
    pub const fn node(id: i64) -> Self {
        Self {
            kind: EntityKind::Node,
            id,
        }
    }

    /// Key for a relationship entity.
    pub const fn relationship(id: i64) -> Self {
        Self {
            kind: EntityKind::Relationship,
            id,
        }
    }

    /// Key for an entity of the given kind.
    pub const fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Key for an entity type.
    pub const fn of<T: Entity>(id: i64) -> Self {
        Self { kind: T::KIND, id }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

/// A type-erased tracked object.
///
/// Holds the same `Arc` twice: once behind the object-safe [`ErasedEntity`]
/// view for id write-back and snapshots, once as `dyn Any` so it can be
/// downcast back to `ObjectRef<T>`.
#[derive(Clone)]
pub(crate) struct TrackedObject {
    erased: Arc<dyn ErasedEntity>,
    any: Arc<dyn Any + Send + Sync>,
}

impl TrackedObject {
    pub(crate) fn new<T: Entity>(obj: &ObjectRef<T>) -> Self {
        let erased: Arc<dyn ErasedEntity> = Arc::clone(obj) as Arc<dyn ErasedEntity>;
        let any: Arc<dyn Any + Send + Sync> = Arc::clone(obj) as Arc<dyn Any + Send + Sync>;
        Self { erased, any }
    }

    /// Address of the shared allocation; the identity of the object.
    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.any).cast::<()>() as usize
    }

    pub(crate) fn entity(&self) -> &dyn ErasedEntity {
        self.erased.as_ref()
    }

    pub(crate) fn downcast<T: Entity>(&self) -> Option<ObjectRef<T>> {
        Arc::clone(&self.any).downcast::<RwLock<T>>().ok()
    }
}

impl std::fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedObject")
            .field("label", &self.erased.label())
            .field("address", &format_args!("{:#x}", self.address()))
            .finish()
    }
}

/// Permanent identity -> live object.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<EntityKey, TrackedObject>,
}

impl IdentityMap {
    /// Create a new empty identity map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `obj` under `key`, replacing whatever was tracked there.
    pub(crate) fn insert(&mut self, key: EntityKey, obj: TrackedObject) {
        self.entries.insert(key, obj);
    }

    /// Get the tracked object for `id`, if it is a `T`.
    pub fn get<T: Entity>(&self, id: i64) -> Option<ObjectRef<T>> {
        self.entries.get(&EntityKey::of::<T>(id))?.downcast::<T>()
    }

    /// Check if anything is tracked under `key`.
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Check if `obj` is the object tracked under its own id.
    pub fn contains_object<T: Entity>(&self, obj: &ObjectRef<T>) -> bool {
        let Some(id) = read_object(obj).entity_id() else {
            return false;
        };
        self.entries
            .get(&EntityKey::of::<T>(id))
            .is_some_and(|tracked| tracked.address() == TrackedObject::new(obj).address())
    }

    /// Label of the entity tracked under `key`.
    pub fn label(&self, key: &EntityKey) -> Option<&'static str> {
        self.entries.get(key).map(|tracked| tracked.entity().label())
    }

    /// Stop tracking `key`.
    pub fn remove(&mut self, key: &EntityKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Clear all entries from the identity map.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys of all tracked entities.
    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.entries.keys()
    }
}

/// Insertion-order index of an object in the [`ObjectArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

impl Handle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Objects seen during the current traversal, correlated by pointer identity.
///
/// The arena keeps a strong reference to each object, so an address cannot be
/// reused by a new allocation while the arena is alive.
#[derive(Debug, Default)]
pub struct ObjectArena {
    entries: Vec<TrackedObject>,
    by_address: HashMap<usize, Handle>,
}

impl ObjectArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object, or find it if it is already present.
    ///
    /// Returns its handle and whether this call inserted it.
    pub(crate) fn insert(&mut self, obj: TrackedObject) -> (Handle, bool) {
        let address = obj.address();
        if let Some(handle) = self.by_address.get(&address) {
            return (*handle, false);
        }
        let handle = Handle(self.entries.len());
        self.entries.push(obj);
        self.by_address.insert(address, handle);
        (handle, true)
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<&TrackedObject> {
        self.entries.get(handle.0)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Handle, &TrackedObject)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, obj)| (Handle(index), obj))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_address.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

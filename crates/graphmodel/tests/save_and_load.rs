use graphmodel::prelude::*;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

fn edge() -> RelationshipInfo {
    RelationshipInfo::new("EDGE").singleton(true)
}

/// Every node equals every other node and they all hash alike, so only
/// pointer identity can tell two of them apart.
#[derive(Debug, Serialize, Deserialize)]
struct Node {
    id: Option<i64>,
    name: String,
    #[serde(skip)]
    links: Vec<ObjectRef<Node>>,
}

impl PartialEq for Node {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        0_u8.hash(state);
    }
}

impl Entity for Node {
    const LABEL: &'static str = "Node";

    fn entity_id(&self) -> Option<i64> {
        self.id
    }

    fn set_entity_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

impl Persistable for Node {
    fn persist(this: &ObjectRef<Self>, cs: &mut ChangeSet<'_>) -> Result<EntityRef> {
        let visit = cs.node(this)?;
        let me = visit.reference();
        if !visit.is_first() {
            return Ok(me);
        }
        cs.declare(me, &edge());
        let links = read_object(this).links.clone();
        for link in &links {
            let other = Node::persist(link, cs)?;
            cs.relate(me, &edge(), other);
        }
        Ok(me)
    }
}

fn node(name: &str) -> ObjectRef<Node> {
    shared(Node {
        id: None,
        name: name.to_string(),
        links: Vec::new(),
    })
}

fn link(from: &ObjectRef<Node>, to: &ObjectRef<Node>) {
    write_object(from).links.push(Arc::clone(to));
}

fn id_of(obj: &ObjectRef<Node>) -> i64 {
    read_object(obj).id.expect("node was saved")
}

fn session() -> Session<MemoryStore> {
    let mut session = Session::new(MemoryStore::starting_at(100));
    session.register(edge());
    session
}

#[test]
fn equal_nodes_stay_distinct_and_singleton_edge_is_written_once() {
    let mut session = session();
    let a = node("a");
    let b = node("b");
    link(&a, &b);
    link(&b, &a);
    assert_eq!(*read_object(&a), *read_object(&b));

    let summary = session.save(&a).unwrap();

    assert_eq!(summary.id, Some(100));
    assert_eq!(summary.counts.nodes_created, 2);
    assert_eq!(summary.counts.relationships_created, 1);
    assert_eq!(summary.outcome.records.len(), 1);
    assert_eq!((id_of(&a), id_of(&b)), (100, 101));

    let store = session.store();
    assert_eq!(store.node_count(), 2);
    assert_eq!(store.relationship_count(), 1);

    let ctx = session.context();
    assert!(ctx.relationship_exists(EntityRef::Permanent(100), &edge(), EntityRef::Permanent(101)));
    assert!(ctx.relationship_exists(EntityRef::Permanent(101), &edge(), EntityRef::Permanent(100)));
    assert!(!ctx.has_open_change_set());
}

#[test]
fn unchanged_graph_saves_nothing() {
    let mut session = session();
    let a = node("a");
    let b = node("b");
    link(&a, &b);

    session.save(&a).unwrap();
    let again = session.save(&a).unwrap();

    assert!(again.counts.is_empty());
    assert_eq!(session.store().requests().len(), 1);
    assert_eq!(session.context().records().count(), 1);
}

#[test]
fn round_trip_preserves_identity_after_clear() {
    let mut session = session();
    let a = node("a");
    let b = node("b");
    link(&a, &b);
    session.save(&a).unwrap();
    let (a_id, b_id) = (id_of(&a), id_of(&b));

    session.clear().unwrap();
    assert!(session.context().get::<Node>(a_id).is_none());
    assert_eq!(session.context().records().count(), 0);

    let loaded = session.load::<Node>(a_id).unwrap().expect("node exists");
    assert!(!Arc::ptr_eq(&loaded, &a));
    assert_eq!(read_object(&loaded).name, "a");
    assert_eq!(read_object(&loaded).id, Some(a_id));

    let again = session.load::<Node>(a_id).unwrap().expect("node exists");
    assert!(Arc::ptr_eq(&loaded, &again));

    let rels = session.relationships(a_id);
    assert_eq!(rels.len(), 1);
    assert!(rels[0].is_singleton());
    assert!(rels[0].touches(b_id));
    assert_eq!(rels[0].start_type(), "Node");

    session.load::<Node>(b_id).unwrap().expect("node exists");
    assert_eq!(session.context().records().count(), 1);

    assert!(session.load::<Node>(999).unwrap().is_none());
}

#[test]
fn dropped_link_deletes_stale_relationship() {
    let mut session = session();
    let a = node("a");
    let b = node("b");
    let c = node("c");
    link(&a, &b);
    link(&a, &c);
    session.save(&a).unwrap();
    assert_eq!(session.store().relationship_count(), 2);

    write_object(&a).links.truncate(1);
    let summary = session.save(&a).unwrap();

    assert_eq!(summary.counts.relationships_deleted, 1);
    assert_eq!(summary.outcome.removed_relationships.len(), 1);
    assert_eq!(session.store().relationship_count(), 1);
    assert_eq!(session.context().records().count(), 1);
    assert!(session.relationships(id_of(&c)).is_empty());
}

#[test]
fn modified_node_is_updated() {
    let mut session = session();
    let a = node("a");
    session.save(&a).unwrap();

    write_object(&a).name = "renamed".to_string();
    let summary = session.save(&a).unwrap();

    assert_eq!(summary.counts.nodes_updated, 1);
    let row = session.store().node(id_of(&a)).expect("stored");
    assert_eq!(row.properties["name"], "renamed");
}

#[test]
fn delete_node_drops_its_relationships() {
    let mut session = session();
    let a = node("a");
    let b = node("b");
    link(&a, &b);
    session.save(&a).unwrap();
    let b_id = id_of(&b);

    let summary = session.delete(&b).unwrap();

    assert_eq!(summary.counts.nodes_deleted, 1);
    assert_eq!(summary.outcome.removed_nodes, vec![b_id]);
    assert_eq!(session.store().node_count(), 1);
    assert_eq!(session.store().relationship_count(), 0);
    assert!(session.context().get::<Node>(b_id).is_none());
    assert!(session.relationships(id_of(&a)).is_empty());
}

#[test]
fn new_node_linked_to_persisted_node() {
    let mut session = session();
    let a = node("a");
    session.save(&a).unwrap();

    let d = node("d");
    link(&a, &d);
    let summary = session.save(&a).unwrap();

    assert_eq!(summary.counts.nodes_created, 1);
    assert_eq!(summary.counts.relationships_created, 1);
    let record = &summary.outcome.records[0];
    assert_eq!(record.start_id(), id_of(&a));
    assert_eq!(record.end_id(), id_of(&d));
    assert_eq!(record.end_type(), "Node");
}

#[test]
fn reloaded_node_keeps_relationships_it_was_not_given() {
    let mut session = session();
    let a = node("a");
    let b = node("b");
    link(&a, &b);
    session.save(&a).unwrap();
    let (a_id, b_id) = (id_of(&a), id_of(&b));
    session.clear().unwrap();

    let loaded = session.load::<Node>(a_id).unwrap().expect("node exists");
    assert!(read_object(&loaded).links.is_empty());
    write_object(&loaded).name = "renamed".to_string();
    let summary = session.save(&loaded).unwrap();

    assert_eq!(summary.counts.nodes_updated, 1);
    assert_eq!(summary.counts.relationships_deleted, 0);
    assert_eq!(session.store().relationship_count(), 1);
    assert_eq!(session.relationships(a_id).len(), 1);

    // Once the link is handed back and saved, dropping it is a real delete.
    let other = session.load::<Node>(b_id).unwrap().expect("node exists");
    link(&loaded, &other);
    assert!(session.save(&loaded).unwrap().counts.is_empty());
    write_object(&loaded).links.clear();
    let summary = session.save(&loaded).unwrap();
    assert_eq!(summary.counts.relationships_deleted, 1);
    assert_eq!(session.store().relationship_count(), 0);
}

#[test]
fn saving_the_unlinked_end_keeps_singleton_relationship() {
    let mut session = session();
    let a = node("a");
    let b = node("b");
    link(&a, &b);
    session.save(&a).unwrap();

    let summary = session.save(&b).unwrap();

    assert!(summary.counts.is_empty());
    assert_eq!(session.store().relationship_count(), 1);
    assert_eq!(session.relationships(id_of(&b)).len(), 1);
}

#[test]
fn singleton_held_by_both_ends_is_deleted_by_the_last() {
    let mut session = session();
    let a = node("a");
    let b = node("b");
    link(&a, &b);
    link(&b, &a);
    session.save(&a).unwrap();

    write_object(&b).links.clear();
    let summary = session.save(&b).unwrap();
    assert_eq!(summary.counts.relationships_deleted, 0);
    assert_eq!(session.store().relationship_count(), 1);

    write_object(&a).links.clear();
    let summary = session.save(&a).unwrap();
    assert_eq!(summary.counts.relationships_deleted, 1);
    assert_eq!(session.store().relationship_count(), 0);
    assert_eq!(session.context().records().count(), 0);
}

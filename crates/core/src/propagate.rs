//! Reference propagation: surface node conflicts through the composite
//! elements that contain them.
//!
//! A conflict on a node's position is really a conflict about the shape of
//! every way or relation built from it. For each conflicting node, the ways
//! and relations that reference it locally -- and were not themselves
//! touched -- are promoted to `referring` tracked elements, and the node is
//! linked back to one canonical parent (the first referring way in local
//! file order, else the first referring relation) for display.
//!
//! Conflicting composites never propagate further; only node conflicts
//! promote parents.

use alloc::vec::Vec;

use crate::element::ElementKind;
use crate::snapshot::{ParentElements, ReferenceGraph};
use crate::store::{ElementKey, ElementStore, LocalState, ResolutionStatus, TrackedElement};
use crate::tracker::ChangeTracker;

/// Failures during propagation; all are invariant violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The local snapshot never materialized a parent the reference graph
    /// points at.
    MissingParent { kind: ElementKind, id: i64 },
}

/// Promote untouched parents of conflicting nodes to `referring` and link
/// each conflicting node to its canonical parent.
///
/// # Errors
///
/// [`Error::MissingParent`] when the graph references a way or relation the
/// loader did not keep.
pub fn propagate_references(
    store: &mut ElementStore,
    graph: &ReferenceGraph,
    parents: &ParentElements,
    tracker: &ChangeTracker,
) -> Result<(), Error> {
    let conflicting_nodes: Vec<i64> = store
        .iter()
        .filter(|e| e.kind == ElementKind::Node && e.local_state == LocalState::Conflicting)
        .map(|e| e.element_id)
        .collect();

    for node_id in conflicting_nodes {
        let mut referred_by: Option<ElementKey> = None;

        for &way_id in graph.ways_for(node_id) {
            if !tracker.is_touched(ElementKind::Way, way_id) {
                ensure_referring(store, parents, ElementKind::Way, way_id)?;
            }
            if referred_by.is_none()
                && store.contains(ElementKey::new(ElementKind::Way, way_id))
            {
                referred_by = Some(ElementKey::new(ElementKind::Way, way_id));
            }
        }

        for &relation_id in graph.relations_for(node_id) {
            if !tracker.is_touched(ElementKind::Relation, relation_id) {
                ensure_referring(store, parents, ElementKind::Relation, relation_id)?;
            }
            if referred_by.is_none()
                && store.contains(ElementKey::new(ElementKind::Relation, relation_id))
            {
                referred_by = Some(ElementKey::new(ElementKind::Relation, relation_id));
            }
        }

        if let Some(node) = store.get_mut(ElementKey::new(ElementKind::Node, node_id)) {
            node.referred_by = referred_by;
        }
        tracing::debug!(node_id, parent = ?referred_by, "linked conflicting node");
    }

    Ok(())
}

fn ensure_referring(
    store: &mut ElementStore,
    parents: &ParentElements,
    kind: ElementKind,
    id: i64,
) -> Result<(), Error> {
    let key = ElementKey::new(kind, id);
    if store.contains(key) {
        return Ok(());
    }
    let snapshot = match kind {
        ElementKind::Way => parents.ways.get(&id),
        ElementKind::Relation => parents.relations.get(&id),
        ElementKind::Node => None,
    }
    .ok_or(Error::MissingParent { kind, id })?;

    let mut element = TrackedElement::new(kind, id, LocalState::Referring);
    element.local_snapshot = Some(snapshot.clone());
    element.status = ResolutionStatus::Unresolved;
    store.upsert(element);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, Location};
    use crate::tracker::ChangeRecord;

    fn conflicting_node(store: &mut ElementStore, id: i64) {
        let mut e = TrackedElement::new(ElementKind::Node, id, LocalState::Conflicting);
        e.local_snapshot = Some(Element::node(id, Location::new(1.0, 2.0)));
        e.upstream_snapshot = Some(Element::node(id, Location::new(1.5, 2.0)));
        store.upsert(e);
    }

    #[test]
    fn untouched_way_becomes_referring_parent() {
        let mut store = ElementStore::new();
        conflicting_node(&mut store, 50);

        let mut graph = ReferenceGraph::new();
        graph.record_way(200, &[50]);
        let mut parents = ParentElements::default();
        parents.ways.insert(200, Element::way(200, alloc::vec![50]));

        let tracker = ChangeTracker::new();
        propagate_references(&mut store, &graph, &parents, &tracker).unwrap();

        let way = store.get(ElementKey::new(ElementKind::Way, 200)).unwrap();
        assert_eq!(way.local_state, LocalState::Referring);
        assert_eq!(way.status, ResolutionStatus::Unresolved);

        let node = store.get(ElementKey::new(ElementKind::Node, 50)).unwrap();
        assert_eq!(
            node.referred_by,
            Some(ElementKey::new(ElementKind::Way, 200))
        );
    }

    #[test]
    fn first_way_wins_over_relations() {
        let mut store = ElementStore::new();
        conflicting_node(&mut store, 50);

        let mut graph = ReferenceGraph::new();
        graph.record_way(201, &[50]);
        graph.record_way(202, &[50]);
        let relation = Element::relation(
            300,
            alloc::vec![crate::element::Member::new(ElementKind::Node, 50, "")],
        );
        graph.record_relation(300, &relation);

        let mut parents = ParentElements::default();
        parents.ways.insert(201, Element::way(201, alloc::vec![50]));
        parents.ways.insert(202, Element::way(202, alloc::vec![50]));
        parents.relations.insert(300, relation);

        let tracker = ChangeTracker::new();
        propagate_references(&mut store, &graph, &parents, &tracker).unwrap();

        let node = store.get(ElementKey::new(ElementKind::Node, 50)).unwrap();
        assert_eq!(
            node.referred_by,
            Some(ElementKey::new(ElementKind::Way, 201))
        );
        // All untouched parents were promoted.
        assert!(store.contains(ElementKey::new(ElementKind::Way, 202)));
        assert!(store.contains(ElementKey::new(ElementKind::Relation, 300)));
    }

    #[test]
    fn relation_is_fallback_parent() {
        let mut store = ElementStore::new();
        conflicting_node(&mut store, 50);

        let relation = Element::relation(
            300,
            alloc::vec![crate::element::Member::new(ElementKind::Node, 50, "")],
        );
        let mut graph = ReferenceGraph::new();
        graph.record_relation(300, &relation);
        let mut parents = ParentElements::default();
        parents.relations.insert(300, relation);

        let tracker = ChangeTracker::new();
        propagate_references(&mut store, &graph, &parents, &tracker).unwrap();

        let node = store.get(ElementKey::new(ElementKind::Node, 50)).unwrap();
        assert_eq!(
            node.referred_by,
            Some(ElementKey::new(ElementKind::Relation, 300))
        );
    }

    #[test]
    fn touched_parent_is_not_promoted() {
        let mut store = ElementStore::new();
        conflicting_node(&mut store, 50);
        // Way 200 was modified locally; it is already tracked.
        let mut tracked_way = TrackedElement::new(ElementKind::Way, 200, LocalState::Modified);
        tracked_way.local_snapshot = Some(Element::way(200, alloc::vec![50]));
        store.upsert(tracked_way);

        let mut tracker = ChangeTracker::new();
        tracker.apply(ChangeRecord {
            kind: ElementKind::Way,
            id: 200,
            version: 3,
            visible: true,
        });

        let mut graph = ReferenceGraph::new();
        graph.record_way(200, &[50]);
        let parents = ParentElements::default();

        propagate_references(&mut store, &graph, &parents, &tracker).unwrap();

        let way = store.get(ElementKey::new(ElementKind::Way, 200)).unwrap();
        assert_eq!(way.local_state, LocalState::Modified);
        // The touched way still serves as the display parent.
        let node = store.get(ElementKey::new(ElementKind::Node, 50)).unwrap();
        assert_eq!(
            node.referred_by,
            Some(ElementKey::new(ElementKind::Way, 200))
        );
    }

    #[test]
    fn missing_parent_is_an_invariant_error() {
        let mut store = ElementStore::new();
        conflicting_node(&mut store, 50);
        let mut graph = ReferenceGraph::new();
        graph.record_way(200, &[50]);
        let parents = ParentElements::default();
        let tracker = ChangeTracker::new();

        let err = propagate_references(&mut store, &graph, &parents, &tracker).unwrap_err();
        assert_eq!(
            err,
            Error::MissingParent {
                kind: ElementKind::Way,
                id: 200
            }
        );
    }
}

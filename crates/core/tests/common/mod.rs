//! Fixture builders for scenario tests: elements, change records, and a
//! reconcile harness that wires the core stages together the way the
//! pipeline's detection stage does.

use replay_core::conflict::detect_conflicts;
use replay_core::element::{Element, ElementKind, Location, Member, Tag};
use replay_core::propagate::propagate_references;
use replay_core::snapshot::{AoiSnapshot, ParentElements, ReferenceGraph, VersionMap};
use replay_core::store::{
    ElementStore, LocalState, ResolutionStatus, TrackedElement,
};
use replay_core::tracker::{ChangeRecord, ChangeTracker};

pub fn node(id: i64, lat: f64, lon: f64) -> Element {
    Element::node(id, Location::new(lat, lon))
}

pub fn way(id: i64, nodes: &[i64]) -> Element {
    Element::way(id, nodes.to_vec())
}

pub fn relation(id: i64, node_members: &[i64]) -> Element {
    Element::relation(
        id,
        node_members
            .iter()
            .map(|&n| Member::new(ElementKind::Node, n, ""))
            .collect(),
    )
}

pub fn with_version(mut element: Element, version: u64) -> Element {
    element.version = version;
    element
}

pub fn with_tags(mut element: Element, tags: &[(&str, &str)]) -> Element {
    element.tags = tags.iter().map(|(k, v)| Tag::new(*k, *v)).collect();
    element
}

pub fn rec(kind: ElementKind, id: i64, version: u64, visible: bool) -> ChangeRecord {
    ChangeRecord {
        kind,
        id,
        version,
        visible,
    }
}

/// Everything the detection phase produces, for assertions.
pub struct Reconciled {
    pub tracker: ChangeTracker,
    pub store: ElementStore,
}

/// Run tracking, conflict detection, store population, and reference
/// propagation over in-memory snapshots.
pub fn reconcile(
    records: &[ChangeRecord],
    original: &[Element],
    local: &[Element],
    upstream: &[Element],
) -> Reconciled {
    let mut tracker = ChangeTracker::new();
    tracker.apply_all(records.iter().copied());

    let mut versions = VersionMap::new();
    for element in original {
        versions.record(element.kind(), element.id, element.version);
    }

    let build = |elements: &[Element]| {
        let mut snapshot = AoiSnapshot::new();
        for element in elements {
            snapshot.counts.bump(element.kind());
            if tracker.is_touched(element.kind(), element.id) {
                snapshot.insert(element.clone());
            }
        }
        snapshot.fill_tombstones(&tracker);
        snapshot
    };
    let original_snapshot = build(original);
    let local_snapshot = build(local);
    let upstream_snapshot = build(upstream);

    // Reference graph and candidate parents from the full local file.
    let mut graph = ReferenceGraph::new();
    let mut parents = ParentElements::default();
    for element in local {
        match element.kind() {
            ElementKind::Way => {
                graph.record_way(element.id, element.node_refs());
                let references_touched = element
                    .node_refs()
                    .iter()
                    .any(|&n| tracker.is_touched(ElementKind::Node, n));
                if references_touched && !tracker.is_touched(ElementKind::Way, element.id) {
                    parents.ways.insert(element.id, element.clone());
                }
            }
            ElementKind::Relation => {
                graph.record_relation(element.id, element);
                let references_touched = element.members().iter().any(|m| {
                    m.kind == ElementKind::Node
                        && tracker.is_touched(ElementKind::Node, m.ref_id)
                });
                if references_touched
                    && !tracker.is_touched(ElementKind::Relation, element.id)
                {
                    parents.relations.insert(element.id, element.clone());
                }
            }
            ElementKind::Node => {}
        }
    }

    // Populate the store the way the detection stage does.
    let mut store = ElementStore::new();
    for kind in ElementKind::ORDERED {
        for &id in tracker.added.for_kind(kind) {
            let mut e = TrackedElement::new(kind, id, LocalState::Added);
            e.local_snapshot = local_snapshot.get(kind, id).cloned();
            e.status = ResolutionStatus::Resolved;
            store.upsert(e);
        }
        for &id in tracker.modified.for_kind(kind) {
            let mut e = TrackedElement::new(kind, id, LocalState::Modified);
            e.original_snapshot = original_snapshot.get(kind, id).cloned();
            e.local_snapshot = local_snapshot.get(kind, id).cloned();
            e.upstream_snapshot = upstream_snapshot.get(kind, id).cloned();
            e.status = ResolutionStatus::Resolved;
            store.upsert(e);
        }
        for &id in tracker.deleted.for_kind(kind) {
            let mut e = TrackedElement::new(kind, id, LocalState::Deleted);
            e.original_snapshot = original_snapshot.get(kind, id).cloned();
            e.local_snapshot = local_snapshot.get(kind, id).cloned();
            e.upstream_snapshot = upstream_snapshot.get(kind, id).cloned();
            e.status = ResolutionStatus::Resolved;
            store.upsert(e);
        }
    }

    let conflicting =
        detect_conflicts(&local_snapshot, &upstream_snapshot, &versions, &tracker)
            .expect("detection");
    for kind in ElementKind::ORDERED {
        store.mark_conflicting(kind, conflicting.for_kind(kind));
    }

    propagate_references(&mut store, &graph, &parents, &tracker).expect("propagation");

    Reconciled { tracker, store }
}

//! End-to-end scenarios over the core stages: track, detect, propagate,
//! resolve, emit.

mod common;

use common::{node, rec, reconcile, relation, way, with_tags, with_version};
use replay_core::element::ElementKind;
use replay_core::emit::{plan_changeset, ChangeAction};
use replay_core::store::{ElementKey, LocalState, ResolutionStatus, ResolvedFrom};

// -- S1: clean no-op -------------------------------------------------------

#[test]
fn identical_snapshots_produce_empty_changeset() {
    let world = vec![
        with_tags(with_version(node(1, 1.0, 1.0), 2), &[("name", "A")]),
        with_version(way(10, &[1]), 3),
    ];
    let outcome = reconcile(&[], &world, &world, &world);

    assert!(outcome.store.is_empty());
    assert_eq!(outcome.store.conflicting_count(), 0);
    let plan = plan_changeset(&outcome.store, 1).unwrap();
    assert!(plan.is_empty());
}

// -- S2: local-only add ----------------------------------------------------

#[test]
fn local_add_is_created_with_negative_id() {
    let original = vec![];
    let local = vec![with_tags(node(1001, 10.0, 20.0), &[("name", "A")])];
    let upstream = vec![];

    let outcome = reconcile(
        &[rec(ElementKind::Node, 1001, 1, true)],
        &original,
        &local,
        &upstream,
    );
    assert_eq!(outcome.store.conflicting_count(), 0);

    let plan = plan_changeset(&outcome.store, 42).unwrap();
    assert_eq!(plan.changes.len(), 1);
    let change = &plan.changes[0];
    assert_eq!(change.action, ChangeAction::Create);
    assert_eq!(change.kind, ElementKind::Node);
    assert_eq!(change.id, -1);
    assert_eq!(change.version, 1);
    assert_eq!(change.lat, Some(10.0));
    assert_eq!(change.lon, Some(20.0));
    assert_eq!(change.tags[0].k, "name");
    assert_eq!(change.tags[0].v, "A");
}

// -- S3: true conflict on a tag --------------------------------------------

fn tag_conflict_world() -> common::Reconciled {
    let original = vec![with_tags(
        with_version(node(42, 10.0, 20.0), 7),
        &[("name", "Old")],
    )];
    let local = vec![with_tags(
        with_version(node(42, 10.0, 20.0), 7),
        &[("name", "Local")],
    )];
    let upstream = vec![with_tags(
        with_version(node(42, 10.0, 20.0), 8),
        &[("name", "Upstream")],
    )];
    reconcile(
        &[rec(ElementKind::Node, 42, 8, true)],
        &original,
        &local,
        &upstream,
    )
}

#[test]
fn divergent_tag_edits_conflict_and_resolve_theirs() {
    let mut outcome = tag_conflict_world();
    let key = ElementKey::new(ElementKind::Node, 42);
    assert_eq!(outcome.store.get(key).unwrap().local_state, LocalState::Conflicting);
    assert_eq!(outcome.store.conflicting_count(), 1);

    outcome
        .store
        .resolve_preset(key, ResolvedFrom::Theirs)
        .unwrap();
    let plan = plan_changeset(&outcome.store, 5).unwrap();
    assert_eq!(plan.changes.len(), 1);
    let change = &plan.changes[0];
    assert_eq!(change.action, ChangeAction::Modify);
    assert_eq!(change.id, 42);
    assert_eq!(change.version, 9);
    assert_eq!(change.tags.len(), 1);
    assert_eq!(change.tags[0].v, "Upstream");
}

#[test]
fn divergent_tag_edits_resolve_ours() {
    let mut outcome = tag_conflict_world();
    let key = ElementKey::new(ElementKind::Node, 42);
    outcome
        .store
        .resolve_preset(key, ResolvedFrom::Ours)
        .unwrap();

    let plan = plan_changeset(&outcome.store, 5).unwrap();
    let change = &plan.changes[0];
    assert_eq!(change.version, 9);
    assert_eq!(change.tags[0].v, "Local");
}

// -- S4: false conflict from meta drift ------------------------------------

#[test]
fn meta_drift_neither_conflicts_nor_emits() {
    let original = vec![with_tags(
        with_version(node(42, 10.0, 20.0), 7),
        &[("name", "Same")],
    )];
    let mut local_node = with_tags(with_version(node(42, 10.0, 20.0), 7), &[("name", "Same")]);
    local_node.timestamp = Some("2022-03-03T00:00:00Z".into());
    let local = vec![local_node];
    let mut upstream_node =
        with_tags(with_version(node(42, 10.0, 20.0), 8), &[("name", "Same")]);
    upstream_node.user = Some("somebody".into());
    let upstream = vec![upstream_node];

    let outcome = reconcile(
        &[rec(ElementKind::Node, 42, 8, true)],
        &original,
        &local,
        &upstream,
    );

    let key = ElementKey::new(ElementKind::Node, 42);
    assert_eq!(outcome.store.get(key).unwrap().local_state, LocalState::Modified);
    assert_eq!(outcome.store.conflicting_count(), 0);

    let plan = plan_changeset(&outcome.store, 5).unwrap();
    assert!(plan.is_empty());
}

// -- S5: way referring to a conflicting node -------------------------------

#[test]
fn position_conflict_surfaces_referring_way() {
    let original = vec![
        with_version(node(50, 10.0, 20.0), 3),
        with_version(way(200, &[50]), 2),
    ];
    let local = vec![
        with_version(node(50, 10.1, 20.0), 3),
        with_version(way(200, &[50]), 2),
    ];
    let upstream = vec![
        with_version(node(50, 10.2, 20.0), 4),
        with_version(way(200, &[50]), 2),
    ];

    let mut outcome = reconcile(
        &[rec(ElementKind::Node, 50, 4, true)],
        &original,
        &local,
        &upstream,
    );

    let node_key = ElementKey::new(ElementKind::Node, 50);
    let way_key = ElementKey::new(ElementKind::Way, 200);

    let tracked_way = outcome.store.get(way_key).unwrap();
    assert_eq!(tracked_way.local_state, LocalState::Referring);
    assert_eq!(tracked_way.status, ResolutionStatus::Unresolved);

    let tracked_node = outcome.store.get(node_key).unwrap();
    assert_eq!(tracked_node.referred_by, Some(way_key));

    // The untagged node hides behind its parent: one open conflict, the way.
    let conflicting = outcome.store.conflicting();
    assert_eq!(conflicting.len(), 1);
    assert_eq!(conflicting[0].key(), way_key);

    // Resolving the node clears the referring surfacing.
    outcome
        .store
        .resolve_preset(node_key, ResolvedFrom::Theirs)
        .unwrap();
    assert_eq!(outcome.store.conflicting_count(), 0);
    let resolved = outcome.store.resolved();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].key(), way_key);

    // The referring way itself is never emitted.
    let plan = plan_changeset(&outcome.store, 5).unwrap();
    assert!(plan.changes.iter().all(|c| c.kind != ElementKind::Way));
}

// -- S6: added-then-deleted cancels ----------------------------------------

#[test]
fn local_create_then_delete_is_a_no_op() {
    let outcome = reconcile(
        &[
            rec(ElementKind::Node, 9001, 1, true),
            rec(ElementKind::Node, 9001, 2, false),
        ],
        &[],
        &[],
        &[],
    );

    assert!(outcome.tracker.added.is_empty());
    assert!(outcome.tracker.deleted.is_empty());
    assert!(outcome.tracker.referenced.is_empty());
    assert!(outcome.store.is_empty());
    let plan = plan_changeset(&outcome.store, 1).unwrap();
    assert!(plan.is_empty());
}

// -- S7: new way with new nodes --------------------------------------------

#[test]
fn new_way_with_new_nodes_emits_ordered_creates() {
    let local = vec![
        node(5001, 1.0, 1.0),
        node(5002, 2.0, 2.0),
        way(6001, &[5001, 5002]),
    ];
    let outcome = reconcile(
        &[
            rec(ElementKind::Node, 5001, 1, true),
            rec(ElementKind::Node, 5002, 1, true),
            rec(ElementKind::Way, 6001, 1, true),
        ],
        &[],
        &local,
        &[],
    );

    let plan = plan_changeset(&outcome.store, 3).unwrap();
    let shapes: Vec<(ElementKind, i64, u64)> = plan
        .changes
        .iter()
        .map(|c| (c.kind, c.id, c.version))
        .collect();
    assert_eq!(
        shapes,
        vec![
            (ElementKind::Node, -1, 1),
            (ElementKind::Node, -2, 1),
            (ElementKind::Way, -1, 1),
        ]
    );
    assert_eq!(plan.changes[2].nodes, Some(vec![-1, -2]));
}

// -- Universal properties --------------------------------------------------

#[test]
fn no_positive_id_refers_to_an_added_element_after_rewrite() {
    let local = vec![
        node(5001, 1.0, 1.0),
        with_version(node(60, 3.0, 3.0), 2),
        way(6001, &[5001, 60]),
        relation(7001, &[5001]),
    ];
    let original = vec![with_version(node(60, 3.0, 3.0), 2)];
    let upstream = original.clone();

    let outcome = reconcile(
        &[
            rec(ElementKind::Node, 5001, 1, true),
            rec(ElementKind::Way, 6001, 1, true),
            rec(ElementKind::Relation, 7001, 1, true),
        ],
        &original,
        &local,
        &upstream,
    );

    let plan = plan_changeset(&outcome.store, 1).unwrap();
    for change in &plan.changes {
        if change.action == ChangeAction::Create {
            assert!(change.id < 0, "created {:?} kept positive id", change.kind);
        }
        if let Some(nodes) = &change.nodes {
            // 5001 was locally added: its refs must all be negative now.
            assert!(!nodes.contains(&5001));
        }
        if let Some(members) = &change.members {
            assert!(members.iter().all(|m| m.ref_id != 5001));
        }
    }
}

#[test]
fn created_nodes_precede_referring_ways_and_relations() {
    let local = vec![
        node(5001, 1.0, 1.0),
        node(5002, 2.0, 2.0),
        way(6001, &[5001, 5002]),
        relation(7001, &[5002]),
    ];
    let outcome = reconcile(
        &[
            rec(ElementKind::Node, 5001, 1, true),
            rec(ElementKind::Node, 5002, 1, true),
            rec(ElementKind::Way, 6001, 1, true),
            rec(ElementKind::Relation, 7001, 1, true),
        ],
        &[],
        &local,
        &[],
    );

    let plan = plan_changeset(&outcome.store, 1).unwrap();
    let kind_positions: Vec<ElementKind> = plan.changes.iter().map(|c| c.kind).collect();
    let last_node = kind_positions
        .iter()
        .rposition(|k| *k == ElementKind::Node)
        .unwrap();
    let first_way = kind_positions
        .iter()
        .position(|k| *k == ElementKind::Way)
        .unwrap();
    let first_relation = kind_positions
        .iter()
        .position(|k| *k == ElementKind::Relation)
        .unwrap();
    assert!(last_node < first_way);
    assert!(first_way < first_relation);
}

#[test]
fn version_gate_never_flags_unmoved_upstream() {
    let original = vec![with_tags(
        with_version(node(42, 10.0, 20.0), 7),
        &[("name", "Old")],
    )];
    let local = vec![with_tags(
        with_version(node(42, 10.0, 20.0), 7),
        &[("name", "Local")],
    )];
    // Upstream still at the original version, structurally different or not.
    let upstream = original.clone();

    let outcome = reconcile(
        &[rec(ElementKind::Node, 42, 8, true)],
        &original,
        &local,
        &upstream,
    );
    assert_eq!(outcome.store.conflicting_count(), 0);
}

#[test]
fn store_reset_empties_everything() {
    let mut outcome = tag_conflict_world();
    assert!(!outcome.store.is_empty());
    outcome.store.clear();
    assert!(outcome.store.is_empty());

    let mut status = replay_core::PipelineStatus::new();
    status
        .enter(replay_core::ReplayState::GatheringChangesets)
        .unwrap();
    status.reset();
    assert_eq!(status.state, replay_core::ReplayState::NotTriggered);
}

#[test]
fn deleted_element_conflicts_when_upstream_edited_it() {
    let original = vec![with_version(node(42, 10.0, 20.0), 7)];
    // Locally deleted: absent from the local snapshot.
    let local = vec![];
    let upstream = vec![with_tags(
        with_version(node(42, 10.0, 21.0), 8),
        &[("name", "Fresh")],
    )];

    let outcome = reconcile(
        &[rec(ElementKind::Node, 42, 8, false)],
        &original,
        &local,
        &upstream,
    );

    let tracked = outcome
        .store
        .get(ElementKey::new(ElementKind::Node, 42))
        .unwrap();
    assert_eq!(tracked.local_state, LocalState::Conflicting);
    assert!(tracked.local_snapshot.as_ref().unwrap().deleted);
}

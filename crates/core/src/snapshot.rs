//! Materialized views of one AOI snapshot.
//!
//! The streaming loader walks an OSM file once and fills these structures
//! for the ids the tracker cares about; everything else contributes only to
//! the per-kind totals. The reference graph and the candidate-parent maps
//! are built on the local snapshot only, where they drive the reference
//! propagation stage.

use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::element::{Element, ElementKind};
use crate::tracker::ChangeTracker;

/// Per-kind element totals, reported on the pipeline status record.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct KindCounts {
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
}

impl KindCounts {
    pub fn bump(&mut self, kind: ElementKind) {
        match kind {
            ElementKind::Node => self.nodes += 1,
            ElementKind::Way => self.ways += 1,
            ElementKind::Relation => self.relations += 1,
        }
    }
}

/// Elements of one snapshot, keyed by id, restricted to the touched set.
#[derive(Debug, Default, Clone)]
pub struct AoiSnapshot {
    pub nodes: HashMap<i64, Element>,
    pub ways: HashMap<i64, Element>,
    pub relations: HashMap<i64, Element>,
    pub counts: KindCounts,
}

impl AoiSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn for_kind(&self, kind: ElementKind) -> &HashMap<i64, Element> {
        match kind {
            ElementKind::Node => &self.nodes,
            ElementKind::Way => &self.ways,
            ElementKind::Relation => &self.relations,
        }
    }

    pub fn for_kind_mut(&mut self, kind: ElementKind) -> &mut HashMap<i64, Element> {
        match kind {
            ElementKind::Node => &mut self.nodes,
            ElementKind::Way => &mut self.ways,
            ElementKind::Relation => &mut self.relations,
        }
    }

    #[must_use]
    pub fn get(&self, kind: ElementKind, id: i64) -> Option<&Element> {
        self.for_kind(kind).get(&id)
    }

    pub fn insert(&mut self, element: Element) {
        self.for_kind_mut(element.kind()).insert(element.id, element);
    }

    /// Insert a tombstone for every touched id the file did not contain, so
    /// downstream stages can rely on every touched slot being present.
    pub fn fill_tombstones(&mut self, tracker: &ChangeTracker) {
        for kind in ElementKind::ORDERED {
            for id in tracker.touched(kind) {
                self.for_kind_mut(kind)
                    .entry(id)
                    .or_insert_with(|| Element::tombstone(kind, id));
            }
        }
    }
}

/// Versions of every element in the original snapshot, the baseline for the
/// upstream-changed filter.
#[derive(Debug, Default, Clone)]
pub struct VersionMap {
    pub nodes: HashMap<i64, u64>,
    pub ways: HashMap<i64, u64>,
    pub relations: HashMap<i64, u64>,
}

impl VersionMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: ElementKind, id: i64, version: u64) {
        let map = match kind {
            ElementKind::Node => &mut self.nodes,
            ElementKind::Way => &mut self.ways,
            ElementKind::Relation => &mut self.relations,
        };
        map.insert(id, version);
    }

    #[must_use]
    pub fn get(&self, kind: ElementKind, id: i64) -> Option<u64> {
        let map = match kind {
            ElementKind::Node => &self.nodes,
            ElementKind::Way => &self.ways,
            ElementKind::Relation => &self.relations,
        };
        map.get(&id).copied()
    }
}

/// Which ways and relations reference which nodes, in local-file order.
///
/// Consulted in reverse: given a conflicting node, which composite elements
/// must surface it. OSM data is acyclic by construction, so plain adjacency
/// lists suffice.
#[derive(Debug, Default, Clone)]
pub struct ReferenceGraph {
    pub nodes_referenced_by_ways: HashMap<i64, Vec<i64>>,
    pub nodes_referenced_by_relations: HashMap<i64, Vec<i64>>,
}

impl ReferenceGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_way(&mut self, way_id: i64, node_refs: &[i64]) {
        for node_id in node_refs {
            self.nodes_referenced_by_ways
                .entry(*node_id)
                .or_default()
                .push(way_id);
        }
    }

    /// Only node members contribute edges; way and relation members are
    /// outside the propagation contract.
    pub fn record_relation(&mut self, relation_id: i64, element: &Element) {
        for member in element.members() {
            if member.kind == ElementKind::Node {
                self.nodes_referenced_by_relations
                    .entry(member.ref_id)
                    .or_default()
                    .push(relation_id);
            }
        }
    }

    #[must_use]
    pub fn ways_for(&self, node_id: i64) -> &[i64] {
        self.nodes_referenced_by_ways
            .get(&node_id)
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn relations_for(&self, node_id: i64) -> &[i64] {
        self.nodes_referenced_by_relations
            .get(&node_id)
            .map_or(&[], Vec::as_slice)
    }
}

/// Ways and relations that reference a touched node without being touched
/// themselves: the pool the reference propagator promotes to "referring".
#[derive(Debug, Default, Clone)]
pub struct ParentElements {
    pub ways: HashMap<i64, Element>,
    pub relations: HashMap<i64, Element>,
}

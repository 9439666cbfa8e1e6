//! Single-pass classification of locally touched elements.
//!
//! The tracker consumes every element occurrence from the local changeset
//! payloads, in file order, and sorts ids into four sets per kind:
//!
//! - **added** -- first seen at version 1; the id is locally assigned and
//!   will be rewritten to a negative placeholder before upload.
//! - **modified** -- touched at a later version while still visible.
//! - **deleted** -- made invisible.
//! - **referenced** -- `modified ∪ deleted`; the ids whose pre-edit rows the
//!   later stages must pull from the original and upstream snapshots.
//!
//! A local create followed by a local delete cancels out entirely. An
//! already-added element that is touched again stays "added"; its final
//! attribute state is picked up from the local snapshot, not from the
//! changeset stream.

use hashbrown::HashSet;

use crate::element::ElementKind;

/// One element occurrence inside an osmChange payload, reduced to the
/// attributes classification needs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub kind: ElementKind,
    pub id: i64,
    pub version: u64,
    pub visible: bool,
}

/// Per-kind id sets.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KindSets {
    pub nodes: HashSet<i64>,
    pub ways: HashSet<i64>,
    pub relations: HashSet<i64>,
}

impl KindSets {
    #[must_use]
    pub const fn for_kind(&self, kind: ElementKind) -> &HashSet<i64> {
        match kind {
            ElementKind::Node => &self.nodes,
            ElementKind::Way => &self.ways,
            ElementKind::Relation => &self.relations,
        }
    }

    pub fn for_kind_mut(&mut self, kind: ElementKind) -> &mut HashSet<i64> {
        match kind {
            ElementKind::Node => &mut self.nodes,
            ElementKind::Way => &mut self.ways,
            ElementKind::Relation => &mut self.relations,
        }
    }

    #[must_use]
    pub fn contains(&self, kind: ElementKind, id: i64) -> bool {
        self.for_kind(kind).contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The tracker's output: four disjoint-by-construction classifications.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeTracker {
    pub added: KindSets,
    pub modified: KindSets,
    pub deleted: KindSets,
    pub referenced: KindSets,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one occurrence. Order matters within a payload: the
    /// added-then-deleted cancellation relies on seeing the create first.
    pub fn apply(&mut self, record: ChangeRecord) {
        let ChangeRecord {
            kind, id, version, ..
        } = record;
        if version == 1 {
            self.added.for_kind_mut(kind).insert(id);
        } else if !record.visible {
            if self.added.for_kind(kind).contains(&id) {
                // Locally created then deleted: a no-op upstream.
                self.added.for_kind_mut(kind).remove(&id);
            } else {
                self.deleted.for_kind_mut(kind).insert(id);
                self.referenced.for_kind_mut(kind).insert(id);
            }
        } else if !self.added.for_kind(kind).contains(&id) {
            self.modified.for_kind_mut(kind).insert(id);
            self.referenced.for_kind_mut(kind).insert(id);
        }
    }

    pub fn apply_all<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = ChangeRecord>,
    {
        for record in records {
            self.apply(record);
        }
    }

    /// `referenced ∪ added`: every id the AOI loader must materialize.
    #[must_use]
    pub fn is_touched(&self, kind: ElementKind, id: i64) -> bool {
        self.referenced.contains(kind, id) || self.added.contains(kind, id)
    }

    #[must_use]
    pub fn touched(&self, kind: ElementKind) -> HashSet<i64> {
        let mut ids = self.referenced.for_kind(kind).clone();
        ids.extend(self.added.for_kind(kind).iter().copied());
        ids
    }

    #[must_use]
    pub fn touched_count(&self) -> usize {
        ElementKind::ORDERED
            .into_iter()
            .map(|kind| self.touched(kind).len())
            .sum()
    }
}

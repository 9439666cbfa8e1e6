//! Changeset planning: select, order, rewrite ids, and shape each change.
//!
//! The plan is pure data; XML serialization lives at the parsing boundary.
//! Emit order is nodes, then ways, then relations (ascending id within a
//! kind), because upstream requires creations to appear before their
//! referrers. Locally created elements get per-kind negative placeholder
//! ids (-1, -2, ... in ascending-id order), and every reference to a
//! locally created element inside emitted ways and relations is rewritten
//! to the placeholder.

use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::conflict::diff::{diff_elements, ElementDelta};
use crate::element::{Element, ElementKind, Member, Tag};
use crate::store::{ElementKey, ElementStore, LocalState, ResolutionStatus, TrackedElement};

/// The three osmChange actions.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Modify,
    Delete,
}

/// One element change, ready for serialization. Node coordinates are
/// already promoted to top-level `lat`/`lon`.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub kind: ElementKind,
    pub action: ChangeAction,
    pub id: i64,
    pub version: u64,
    pub changeset: i64,
    pub visible: Option<bool>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub tags: Vec<Tag>,
    pub nodes: Option<Vec<i64>>,
    pub members: Option<Vec<Member>>,
}

/// An ordered changeset plan plus the keys it covers (for marking pushed
/// after a successful upload).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangesetPlan {
    pub changes: Vec<Change>,
    pub covered: Vec<ElementKey>,
}

impl ChangesetPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Planning failures; all are invariant violations in the store contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    MissingLocalSnapshot(ElementKey),
    MissingOriginalSnapshot(ElementKey),
    MissingUpstreamSnapshot(ElementKey),
    MissingResolvedSnapshot(ElementKey),
}

/// Negative placeholder assignments for locally created elements, one
/// numbering per kind.
#[derive(Debug, Default, Clone)]
struct PlaceholderIds {
    nodes: HashMap<i64, i64>,
    ways: HashMap<i64, i64>,
    relations: HashMap<i64, i64>,
}

impl PlaceholderIds {
    fn assign(store: &ElementStore) -> Self {
        let mut ids = Self::default();
        for kind in ElementKind::ORDERED {
            let map = ids.for_kind_mut(kind);
            // Ascending id order; the store iterates sorted.
            for (i, element) in store.added(Some(kind)).iter().enumerate() {
                #[allow(clippy::cast_possible_wrap)]
                map.insert(element.element_id, -(i as i64 + 1));
            }
        }
        ids
    }

    fn for_kind_mut(&mut self, kind: ElementKind) -> &mut HashMap<i64, i64> {
        match kind {
            ElementKind::Node => &mut self.nodes,
            ElementKind::Way => &mut self.ways,
            ElementKind::Relation => &mut self.relations,
        }
    }

    fn rewrite(&self, kind: ElementKind, id: i64) -> i64 {
        let map = match kind {
            ElementKind::Node => &self.nodes,
            ElementKind::Way => &self.ways,
            ElementKind::Relation => &self.relations,
        };
        map.get(&id).copied().unwrap_or(id)
    }
}

/// Walk the store and build the ordered, id-rewritten changeset plan.
///
/// Selected are all tracked elements that are neither `referring` nor
/// `unresolved` nor already `pushed`. A `modified` element whose structural
/// diff against original is empty, and a `deleted` element whose upstream
/// row is already gone, contribute nothing.
///
/// # Errors
///
/// One of the [`Error`] variants when a selected element is missing the
/// snapshot its change shape requires.
pub fn plan_changeset(store: &ElementStore, changeset_id: i64) -> Result<ChangesetPlan, Error> {
    let placeholders = PlaceholderIds::assign(store);
    let mut changes = Vec::new();
    let mut covered = Vec::new();

    // Store iteration is (kind, id)-ordered, which is exactly emit order.
    for element in store.iter() {
        if element.local_state == LocalState::Referring
            || matches!(
                element.status,
                ResolutionStatus::Unresolved | ResolutionStatus::Pushed
            )
        {
            continue;
        }
        if let Some(mut change) = build_change(element, changeset_id)? {
            rewrite_ids(&mut change, &placeholders);
            changes.push(change);
        }
        covered.push(element.key());
    }

    tracing::debug!(changes = changes.len(), "changeset plan built");
    Ok(ChangesetPlan { changes, covered })
}

fn build_change(element: &TrackedElement, changeset_id: i64) -> Result<Option<Change>, Error> {
    let key = element.key();
    let change = match element.local_state {
        LocalState::Added => {
            let local = element
                .local_snapshot
                .as_ref()
                .ok_or(Error::MissingLocalSnapshot(key))?;
            let mut change = full_payload(local, ChangeAction::Create, changeset_id);
            change.version = 1;
            Some(change)
        }
        LocalState::Deleted => {
            let upstream = element
                .upstream_snapshot
                .as_ref()
                .ok_or(Error::MissingUpstreamSnapshot(key))?;
            if upstream.deleted {
                // Already gone upstream; nothing to replay.
                None
            } else {
                Some(Change {
                    kind: key.kind,
                    action: ChangeAction::Delete,
                    id: key.id,
                    version: upstream.version + 1,
                    changeset: changeset_id,
                    visible: Some(false),
                    lat: None,
                    lon: None,
                    tags: Vec::new(),
                    nodes: None,
                    members: None,
                })
            }
        }
        LocalState::Modified => {
            let local = element
                .local_snapshot
                .as_ref()
                .ok_or(Error::MissingLocalSnapshot(key))?;
            let original = element
                .original_snapshot
                .as_ref()
                .ok_or(Error::MissingOriginalSnapshot(key))?;
            let delta = diff_elements(local, original);
            if delta.is_empty() {
                // Meta-only drift; replaying it would be a no-op edit.
                None
            } else {
                let version = upload_version(element, key)?;
                Some(delta_payload(
                    &delta,
                    key,
                    ChangeAction::Modify,
                    version,
                    changeset_id,
                ))
            }
        }
        LocalState::Conflicting => {
            let resolved = element
                .resolved_snapshot
                .as_ref()
                .ok_or(Error::MissingResolvedSnapshot(key))?;
            let original = element
                .original_snapshot
                .as_ref()
                .ok_or(Error::MissingOriginalSnapshot(key))?;
            let delta = diff_elements(resolved, original);
            let action = if delta.deleted {
                ChangeAction::Delete
            } else {
                ChangeAction::Modify
            };
            let version = upload_version(element, key)?;
            Some(delta_payload(&delta, key, action, version, changeset_id))
        }
        LocalState::Referring => None,
    };
    Ok(change)
}

/// One greater than the version upstream knows; falls back to the original
/// baseline when upstream holds only a tombstone.
fn upload_version(element: &TrackedElement, key: ElementKey) -> Result<u64, Error> {
    let upstream = element
        .upstream_snapshot
        .as_ref()
        .ok_or(Error::MissingUpstreamSnapshot(key))?;
    if upstream.deleted {
        let original = element
            .original_snapshot
            .as_ref()
            .ok_or(Error::MissingOriginalSnapshot(key))?;
        Ok(original.version + 1)
    } else {
        Ok(upstream.version + 1)
    }
}

/// The full element body, used for creations.
fn full_payload(element: &Element, action: ChangeAction, changeset_id: i64) -> Change {
    let location = element.location();
    Change {
        kind: element.kind(),
        action,
        id: element.id,
        version: element.version,
        changeset: changeset_id,
        visible: Some(element.visible),
        lat: location.map(|l| l.lat),
        lon: location.map(|l| l.lon),
        tags: element.tags.clone(),
        nodes: match element.kind() {
            ElementKind::Way => Some(element.node_refs().to_vec()),
            _ => None,
        },
        members: match element.kind() {
            ElementKind::Relation => Some(element.members().to_vec()),
            _ => None,
        },
    }
}

/// A diff body, used for modifications and resolved conflicts.
fn delta_payload(
    delta: &ElementDelta,
    key: ElementKey,
    action: ChangeAction,
    version: u64,
    changeset_id: i64,
) -> Change {
    Change {
        kind: key.kind,
        action,
        id: key.id,
        version,
        changeset: changeset_id,
        visible: delta.visible,
        lat: delta.location.as_ref().map(|l| l.lat),
        lon: delta.location.as_ref().map(|l| l.lon),
        tags: delta.tags.clone(),
        nodes: delta.nodes.clone(),
        members: delta.members.clone(),
    }
}

fn rewrite_ids(change: &mut Change, placeholders: &PlaceholderIds) {
    change.id = placeholders.rewrite(change.kind, change.id);
    if let Some(nodes) = &mut change.nodes {
        for node_ref in nodes {
            *node_ref = placeholders.rewrite(ElementKind::Node, *node_ref);
        }
    }
    if let Some(members) = &mut change.members {
        for member in members {
            member.ref_id = placeholders.rewrite(member.kind, member.ref_id);
        }
    }
}

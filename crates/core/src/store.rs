//! The keyed store of tracked elements and the resolution API.
//!
//! Every element touched locally (or pulled in as a referring parent) gets
//! exactly one [`TrackedElement`] keyed by `(kind, id)`. The pipeline stages
//! create and classify entries; only the resolution API mutates `status`,
//! `resolved_snapshot`, and `resolved_from` afterwards; only a pipeline
//! reset deletes them.
//!
//! Resolving or resetting a composite cascades to its conflicting child
//! nodes in the same call, so a caller always observes parent and children
//! moving together.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};

use crate::element::{Element, ElementKind, Geometry, Location};

/// How an element was touched locally, per the tracker and detector.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LocalState {
    Added,
    Modified,
    Deleted,
    Conflicting,
    /// Not itself touched locally, but references a conflicting node.
    Referring,
}

/// Resolution progress of a tracked element.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResolutionStatus {
    Resolved,
    PartiallyResolved,
    Unresolved,
    Pushed,
}

/// Provenance of a resolution.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResolvedFrom {
    Theirs,
    Ours,
    Custom,
}

/// Identity of a tracked element. Orders by kind (node < way < relation),
/// then id, which is exactly the upload order.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementKey {
    pub kind: ElementKind,
    pub id: i64,
}

impl ElementKey {
    #[must_use]
    pub const fn new(kind: ElementKind, id: i64) -> Self {
        Self { kind, id }
    }
}

/// One locally touched element with its three snapshots and resolution
/// state.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedElement {
    pub kind: ElementKind,
    pub element_id: i64,
    pub original_snapshot: Option<Element>,
    pub local_snapshot: Option<Element>,
    pub upstream_snapshot: Option<Element>,
    pub local_state: LocalState,
    pub status: ResolutionStatus,
    pub resolved_snapshot: Option<Element>,
    pub resolved_from: Option<ResolvedFrom>,
    /// The first referring way (else relation) that surfaces this node's
    /// conflict in the UI; set by the reference propagator.
    pub referred_by: Option<ElementKey>,
}

impl TrackedElement {
    #[must_use]
    pub fn new(kind: ElementKind, element_id: i64, local_state: LocalState) -> Self {
        Self {
            kind,
            element_id,
            original_snapshot: None,
            local_snapshot: None,
            upstream_snapshot: None,
            local_state,
            status: ResolutionStatus::Unresolved,
            resolved_snapshot: None,
            resolved_from: None,
            referred_by: None,
        }
    }

    #[must_use]
    pub const fn key(&self) -> ElementKey {
        ElementKey::new(self.kind, self.element_id)
    }

    /// An untagged node never surfaces its own conflict; it appears only
    /// through a referring parent.
    #[must_use]
    pub fn carries_tags(&self) -> bool {
        let tagged = |snapshot: &Option<Element>| {
            snapshot.as_ref().is_some_and(Element::is_tagged)
        };
        tagged(&self.local_snapshot) || tagged(&self.upstream_snapshot)
    }
}

/// A caller-supplied resolution for one element.
///
/// For composites, `conflicting_nodes` is a cascade instruction: the chosen
/// position of each conflicting child node, applied to the children inside
/// the same call.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionPayload {
    pub element: Element,
    #[cfg_attr(feature = "serde", serde(default))]
    pub conflicting_nodes: HashMap<i64, Location>,
}

/// Failures surfaced synchronously by the store; nothing is mutated when
/// one is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Duplicate(ElementKey),
    NotFound(ElementKey),
    KindMismatch {
        key: ElementKey,
        payload_kind: ElementKind,
    },
    /// A resolution source (local or upstream snapshot) is absent.
    MissingSnapshot {
        key: ElementKey,
        which: &'static str,
    },
}

/// The element store: `(kind, id)` → tracked element, iteration in upload
/// order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ElementStore {
    elements: BTreeMap<ElementKey, TrackedElement>,
}

impl ElementStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_elements(elements: Vec<TrackedElement>) -> Self {
        Self {
            elements: elements.into_iter().map(|e| (e.key(), e)).collect(),
        }
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<TrackedElement> {
        self.elements.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    #[must_use]
    pub fn get(&self, key: ElementKey) -> Option<&TrackedElement> {
        self.elements.get(&key)
    }

    #[must_use]
    pub fn contains(&self, key: ElementKey) -> bool {
        self.elements.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedElement> {
        self.elements.values()
    }

    /// Insert a newly tracked element.
    ///
    /// # Errors
    ///
    /// [`Error::Duplicate`] when the key is already tracked; use
    /// [`Self::upsert`] to replace.
    pub fn insert(&mut self, element: TrackedElement) -> Result<(), Error> {
        let key = element.key();
        if self.elements.contains_key(&key) {
            return Err(Error::Duplicate(key));
        }
        self.elements.insert(key, element);
        Ok(())
    }

    pub fn upsert(&mut self, element: TrackedElement) {
        self.elements.insert(element.key(), element);
    }

    pub fn get_mut(&mut self, key: ElementKey) -> Option<&mut TrackedElement> {
        self.elements.get_mut(&key)
    }

    /// Flip detected conflicts to `conflicting`/`unresolved`. Elements that
    /// already carry the conflicting state keep whatever resolution progress
    /// a previous run left on them.
    pub fn mark_conflicting(&mut self, kind: ElementKind, ids: &HashSet<i64>) {
        for &id in ids {
            if let Some(element) = self.elements.get_mut(&ElementKey::new(kind, id)) {
                if element.local_state != LocalState::Conflicting {
                    element.local_state = LocalState::Conflicting;
                    element.status = ResolutionStatus::Unresolved;
                }
            }
        }
    }

    // -- Resolution API ----------------------------------------------------

    /// Resolve with the upstream (`theirs`) or local (`ours`) snapshot, and
    /// cascade the same choice to conflicting child nodes.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown key, [`Error::MissingSnapshot`]
    /// when the chosen side has no snapshot to resolve from.
    pub fn resolve_preset(&mut self, key: ElementKey, from: ResolvedFrom) -> Result<(), Error> {
        let children = self.children_of(key);
        let element = self.elements.get_mut(&key).ok_or(Error::NotFound(key))?;
        element.resolved_snapshot = Some(preset_snapshot(element, from)?);
        element.status = ResolutionStatus::Resolved;
        element.resolved_from = Some(from);

        for child_key in children {
            if let Some(child) = self.elements.get_mut(&child_key) {
                child.resolved_snapshot = preset_snapshot(child, from).ok();
                child.status = ResolutionStatus::Resolved;
                child.resolved_from = Some(from);
            }
        }
        Ok(())
    }

    /// Store a caller-supplied resolution as partial progress.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::KindMismatch`].
    pub fn update_resolution(
        &mut self,
        key: ElementKey,
        payload: &ResolutionPayload,
    ) -> Result<(), Error> {
        self.apply_custom(key, payload, ResolutionStatus::PartiallyResolved, None)
    }

    /// Store a caller-supplied resolution as final.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::KindMismatch`].
    pub fn resolve_custom(
        &mut self,
        key: ElementKey,
        payload: &ResolutionPayload,
    ) -> Result<(), Error> {
        self.apply_custom(
            key,
            payload,
            ResolutionStatus::Resolved,
            Some(ResolvedFrom::Custom),
        )
    }

    fn apply_custom(
        &mut self,
        key: ElementKey,
        payload: &ResolutionPayload,
        status: ResolutionStatus,
        from: Option<ResolvedFrom>,
    ) -> Result<(), Error> {
        let element = self.elements.get_mut(&key).ok_or(Error::NotFound(key))?;
        if payload.element.kind() != key.kind {
            return Err(Error::KindMismatch {
                key,
                payload_kind: payload.element.kind(),
            });
        }
        element.resolved_snapshot = Some(normalized_resolution(&payload.element, key.id));
        element.status = status;
        if from.is_some() {
            element.resolved_from = from;
        }

        // Composites carry their children's chosen positions.
        if key.kind != ElementKind::Node {
            for (&node_id, &location) in &payload.conflicting_nodes {
                let child_key = ElementKey::new(ElementKind::Node, node_id);
                if let Some(child) = self.elements.get_mut(&child_key) {
                    let mut resolved = child
                        .resolved_snapshot
                        .clone()
                        .or_else(|| child.local_snapshot.clone())
                        .unwrap_or_else(|| Element::node(node_id, location));
                    if let Geometry::Node {
                        location: resolved_location,
                    } = &mut resolved.geometry
                    {
                        *resolved_location = location;
                    }
                    child.resolved_snapshot = Some(resolved);
                    child.status = status;
                    if from.is_some() {
                        child.resolved_from = from;
                    }
                }
            }
        }
        Ok(())
    }

    /// Undo resolution on an element and its cascaded children.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown key.
    pub fn reset_resolution(&mut self, key: ElementKey) -> Result<(), Error> {
        let children = self.children_of(key);
        let element = self.elements.get_mut(&key).ok_or(Error::NotFound(key))?;
        element.resolved_snapshot = None;
        element.status = ResolutionStatus::Unresolved;
        element.resolved_from = None;

        for child_key in children {
            if let Some(child) = self.elements.get_mut(&child_key) {
                child.resolved_snapshot = None;
                child.status = ResolutionStatus::Unresolved;
                child.resolved_from = None;
            }
        }
        Ok(())
    }

    /// Mark everything selected for upload as pushed.
    pub fn mark_pushed(&mut self, keys: &[ElementKey]) {
        for key in keys {
            if let Some(element) = self.elements.get_mut(key) {
                element.status = ResolutionStatus::Pushed;
            }
        }
    }

    // -- Queries -----------------------------------------------------------

    /// Conflicting child nodes cascaded from `key`.
    #[must_use]
    pub fn children_of(&self, key: ElementKey) -> Vec<ElementKey> {
        if key.kind == ElementKind::Node {
            return Vec::new();
        }
        self.elements
            .values()
            .filter(|e| {
                e.kind == ElementKind::Node
                    && e.local_state == LocalState::Conflicting
                    && e.referred_by == Some(key)
            })
            .map(TrackedElement::key)
            .collect()
    }

    /// Open conflicts: directly conflicting elements that are not resolved
    /// (untagged nodes hidden), plus referring parents with an unresolved
    /// hidden child.
    #[must_use]
    pub fn conflicting(&self) -> Vec<&TrackedElement> {
        self.elements
            .values()
            .filter(|e| match e.local_state {
                LocalState::Conflicting => {
                    e.status != ResolutionStatus::Resolved
                        && (e.kind != ElementKind::Node || e.carries_tags())
                }
                LocalState::Referring => self
                    .hidden_children(e.key())
                    .any(|child| child.status != ResolutionStatus::Resolved),
                _ => false,
            })
            .collect()
    }

    /// Fully resolved conflicts, including referring parents whose hidden
    /// children are all resolved.
    #[must_use]
    pub fn resolved(&self) -> Vec<&TrackedElement> {
        self.elements
            .values()
            .filter(|e| match e.local_state {
                LocalState::Conflicting => {
                    e.status == ResolutionStatus::Resolved
                        && (e.kind != ElementKind::Node || e.carries_tags())
                }
                LocalState::Referring => {
                    let mut hidden = self.hidden_children(e.key()).peekable();
                    hidden.peek().is_some()
                        && hidden.all(|child| child.status == ResolutionStatus::Resolved)
                }
                _ => false,
            })
            .collect()
    }

    #[must_use]
    pub fn partially_resolved(&self) -> Vec<&TrackedElement> {
        self.elements
            .values()
            .filter(|e| match e.local_state {
                LocalState::Conflicting => {
                    e.status == ResolutionStatus::PartiallyResolved
                        && (e.kind != ElementKind::Node || e.carries_tags())
                }
                LocalState::Referring => self
                    .hidden_children(e.key())
                    .any(|child| child.status == ResolutionStatus::PartiallyResolved),
                _ => false,
            })
            .collect()
    }

    #[must_use]
    pub fn referring(&self) -> Vec<&TrackedElement> {
        self.elements
            .values()
            .filter(|e| e.local_state == LocalState::Referring)
            .collect()
    }

    /// Locally added elements, in ascending id order, optionally one kind.
    #[must_use]
    pub fn added(&self, kind: Option<ElementKind>) -> Vec<&TrackedElement> {
        self.elements
            .values()
            .filter(|e| {
                e.local_state == LocalState::Added && kind.map_or(true, |k| e.kind == k)
            })
            .collect()
    }

    #[must_use]
    pub fn non_conflicting(&self) -> Vec<&TrackedElement> {
        self.elements
            .values()
            .filter(|e| e.local_state != LocalState::Conflicting)
            .collect()
    }

    #[must_use]
    pub fn conflicting_count(&self) -> usize {
        self.conflicting().len()
    }

    /// Untagged conflicting children of a referring parent: the conflicts it
    /// stands in for.
    fn hidden_children(
        &self,
        key: ElementKey,
    ) -> impl Iterator<Item = &TrackedElement> {
        self.elements.values().filter(move |e| {
            e.kind == ElementKind::Node
                && e.local_state == LocalState::Conflicting
                && e.referred_by == Some(key)
                && !e.carries_tags()
        })
    }
}

fn preset_snapshot(element: &TrackedElement, from: ResolvedFrom) -> Result<Element, Error> {
    let (snapshot, which) = match from {
        ResolvedFrom::Theirs => (&element.upstream_snapshot, "upstream"),
        ResolvedFrom::Ours | ResolvedFrom::Custom => (&element.local_snapshot, "local"),
    };
    snapshot.clone().ok_or(Error::MissingSnapshot {
        key: element.key(),
        which,
    })
}

/// Strip the fields a caller must not control: identity and meta. The
/// resolved shape keeps only structural content.
fn normalized_resolution(payload: &Element, id: i64) -> Element {
    let mut element = payload.clone();
    element.id = id;
    element.changeset = None;
    element.timestamp = None;
    element.uid = None;
    element.user = None;
    element
}

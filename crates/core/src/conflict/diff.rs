//! Structural diff between two snapshots of an element.
//!
//! The emitter ships `diff(edited, original)` rather than the full edited
//! row, so an upload only claims the fields the local edit actually changed.
//! Meta fields are never diffed; the emitted version is always computed from
//! the upstream version, not carried over.

use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::element::{Element, Geometry, Location, Member, Tag};

/// The fields of `a` that differ from `b`.
///
/// Tags are additive: a tag present in `b` but absent from `a` does not
/// appear in the delta, matching the osmChange modify semantics where
/// emitted tags are upserts.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ElementDelta {
    pub visible: Option<bool>,
    pub deleted: bool,
    pub location: Option<Location>,
    pub tags: Vec<Tag>,
    pub nodes: Option<Vec<i64>>,
    pub members: Option<Vec<Member>>,
}

impl ElementDelta {
    /// `true` when the delta carries no structural change at all; such
    /// elements are dropped from the emitted document (meta-only drift).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible.is_none()
            && !self.deleted
            && self.location.is_none()
            && self.tags.is_empty()
            && self.nodes.is_none()
            && self.members.is_none()
    }
}

/// Compute the structural delta of `a` against `b`.
#[must_use]
pub fn diff_elements(a: &Element, b: &Element) -> ElementDelta {
    let mut delta = ElementDelta {
        visible: (a.visible != b.visible).then_some(a.visible),
        deleted: a.deleted && !b.deleted,
        ..ElementDelta::default()
    };

    let b_tags: HashMap<&str, &str> = b
        .tags
        .iter()
        .map(|t| (t.k.as_str(), t.v.as_str()))
        .collect();
    delta.tags = a
        .tags
        .iter()
        .filter(|t| b_tags.get(t.k.as_str()) != Some(&t.v.as_str()))
        .cloned()
        .collect();

    match (&a.geometry, &b.geometry) {
        (Geometry::Node { location: la }, Geometry::Node { location: lb }) => {
            if la != lb {
                delta.location = Some(*la);
            }
        }
        (Geometry::Way { nodes: na }, Geometry::Way { nodes: nb }) => {
            if na != nb {
                delta.nodes = Some(na.clone());
            }
        }
        (Geometry::Relation { members: ma }, Geometry::Relation { members: mb }) => {
            if ma != mb {
                delta.members = Some(ma.clone());
            }
        }
        // Kind mismatch cannot happen for a well-keyed store; treat the
        // whole geometry of `a` as changed.
        (Geometry::Node { location }, _) => delta.location = Some(*location),
        (Geometry::Way { nodes }, _) => delta.nodes = Some(nodes.clone()),
        (Geometry::Relation { members }, _) => delta.members = Some(members.clone()),
    }

    delta
}

/// Re-apply a delta on top of a base element.
///
/// `apply_delta(&diff_elements(a, b), b)` is structurally equal to `a` for
/// any `a` that does not *remove* tags relative to `b` (tag removal is not
/// expressible in the additive delta).
#[must_use]
pub fn apply_delta(delta: &ElementDelta, base: &Element) -> Element {
    let mut out = base.clone();
    if let Some(visible) = delta.visible {
        out.visible = visible;
    }
    if delta.deleted {
        out.deleted = true;
    }
    for tag in &delta.tags {
        match out.tags.iter_mut().find(|t| t.k == tag.k) {
            Some(existing) => existing.v = tag.v.clone(),
            None => out.tags.push(tag.clone()),
        }
    }
    match (&mut out.geometry, delta) {
        (
            Geometry::Node { location },
            ElementDelta {
                location: Some(new_location),
                ..
            },
        ) => *location = *new_location,
        (
            Geometry::Way { nodes },
            ElementDelta {
                nodes: Some(new_nodes),
                ..
            },
        ) => nodes.clone_from(new_nodes),
        (
            Geometry::Relation { members },
            ElementDelta {
                members: Some(new_members),
                ..
            },
        ) => members.clone_from(new_members),
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::equality::elements_conflict;
    use crate::element::ElementKind;

    fn node(name: &str, lat: f64) -> Element {
        let mut n = Element::node(42, Location::new(lat, 20.0));
        n.version = 7;
        n.tags = alloc::vec![Tag::new("name", name), Tag::new("amenity", "cafe")];
        n
    }

    #[test]
    fn identical_elements_give_empty_delta() {
        let a = node("A", 10.0);
        let delta = diff_elements(&a, &a);
        assert!(delta.is_empty());
    }

    #[test]
    fn meta_only_drift_gives_empty_delta() {
        let a = node("A", 10.0);
        let mut b = a.clone();
        b.version = 9;
        b.timestamp = Some("2021-01-01T00:00:00Z".into());
        b.user = Some("someone".into());
        assert!(diff_elements(&a, &b).is_empty());
    }

    #[test]
    fn changed_tag_and_position_are_kept() {
        let a = node("New", 11.0);
        let b = node("Old", 10.0);
        let delta = diff_elements(&a, &b);
        assert_eq!(delta.tags, alloc::vec![Tag::new("name", "New")]);
        assert_eq!(delta.location, Some(Location::new(11.0, 20.0)));
        assert!(delta.nodes.is_none());
    }

    #[test]
    fn way_nodes_replaced_wholesale() {
        let a = Element::way(200, alloc::vec![1, 2, 3]);
        let b = Element::way(200, alloc::vec![1, 2]);
        let delta = diff_elements(&a, &b);
        assert_eq!(delta.nodes, Some(alloc::vec![1, 2, 3]));
    }

    #[test]
    fn deletion_marker_survives_diff() {
        let a = Element::tombstone(ElementKind::Node, 42);
        let b = node("A", 10.0);
        let delta = diff_elements(&a, &b);
        assert!(delta.deleted);
        assert_eq!(delta.visible, Some(false));
    }

    #[test]
    fn diff_round_trips_through_apply() {
        let original = node("Old", 10.0);
        let mut edited = node("New", 10.5);
        edited.tags.push(Tag::new("opening_hours", "24/7"));
        edited.version = 9;

        let delta = diff_elements(&edited, &original);
        let rebuilt = apply_delta(&delta, &original);
        assert!(!elements_conflict(&rebuilt, &edited));
    }

    #[test]
    fn way_diff_round_trips() {
        let original = Element::way(200, alloc::vec![1, 2, 3]);
        let mut edited = Element::way(200, alloc::vec![3, 1]);
        edited.tags = alloc::vec![Tag::new("highway", "path")];

        let delta = diff_elements(&edited, &original);
        let rebuilt = apply_delta(&delta, &original);
        assert!(!elements_conflict(&rebuilt, &edited));
    }
}

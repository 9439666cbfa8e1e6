//! Structural equality between two snapshots of the same element.
//!
//! Meta fields (`timestamp`, `uid`, `user`, `changeset`, `version`) change
//! on every upstream edit even when the semantic content is identical, so
//! they never participate in the comparison. Everything the element *means*
//! does: visibility, deletion, a node's position, tags as an unordered
//! key→value mapping, a way's node refs as an ordered sequence, and a
//! relation's members as an ordered sequence of (ref, role, kind).

use hashbrown::HashMap;

use crate::element::{Element, Geometry};

/// `true` when the two snapshots differ structurally, i.e. conflict.
///
/// Symmetric: `elements_conflict(a, b) == elements_conflict(b, a)`.
#[must_use]
pub fn elements_conflict(a: &Element, b: &Element) -> bool {
    if a.visible != b.visible || a.deleted != b.deleted {
        return true;
    }

    if !tags_equal(a, b) {
        return true;
    }

    match (&a.geometry, &b.geometry) {
        (Geometry::Node { location: la }, Geometry::Node { location: lb }) => la != lb,
        // Order matters for node refs: reversing a way changes it.
        (Geometry::Way { nodes: na }, Geometry::Way { nodes: nb }) => na != nb,
        (Geometry::Relation { members: ma }, Geometry::Relation { members: mb }) => ma != mb,
        _ => true,
    }
}

fn tags_equal(a: &Element, b: &Element) -> bool {
    if a.tags.len() != b.tags.len() {
        return false;
    }
    let a_map: HashMap<&str, &str> = a
        .tags
        .iter()
        .map(|t| (t.k.as_str(), t.v.as_str()))
        .collect();
    b.tags
        .iter()
        .all(|t| a_map.get(t.k.as_str()) == Some(&t.v.as_str()))
}

//! The three OSM primitives and their building blocks.
//!
//! An [`Element`] is the serialized form of a node, way, or relation as it
//! appeared in one snapshot (original, local, or upstream). Meta fields
//! (`version`, `changeset`, `timestamp`, `uid`, `user`) ride along for
//! reporting and version arithmetic but are excluded from structural
//! comparison, which lives in [`crate::conflict`].

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};

/// The three OSM primitive kinds. Also used as the member-kind discriminant
/// inside relations.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    /// All kinds in upload order: creations of nodes must precede the ways
    /// and relations that refer to them.
    pub const ORDERED: [Self; 3] = [Self::Node, Self::Way, Self::Relation];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }

    /// Parse a kind name. Accepts the long form only; member-kind strings,
    /// which may be abbreviated, go through [`Self::parse_member_kind`].
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "node" => Some(Self::Node),
            "way" => Some(Self::Way),
            "relation" => Some(Self::Relation),
            _ => None,
        }
    }

    /// Parse a relation member kind, normalizing the abbreviated forms
    /// (`n`, `w`, `r`) some producers emit to the long form.
    #[must_use]
    pub fn parse_member_kind(s: &str) -> Option<Self> {
        match s {
            "node" | "n" => Some(Self::Node),
            "way" | "w" => Some(Self::Way),
            "relation" | "r" => Some(Self::Relation),
            _ => None,
        }
    }
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node position. Stored nested on the element; promoted to top-level
/// `lat`/`lon` attributes only at emit time.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A single `k`/`v` tag.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub k: String,
    pub v: String,
}

impl Tag {
    #[must_use]
    pub fn new(k: impl Into<String>, v: impl Into<String>) -> Self {
        Self {
            k: k.into(),
            v: v.into(),
        }
    }
}

/// One entry of a relation's ordered member list.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub kind: ElementKind,
    #[cfg_attr(feature = "serde", serde(rename = "ref"))]
    pub ref_id: i64,
    pub role: String,
}

impl Member {
    #[must_use]
    pub fn new(kind: ElementKind, ref_id: i64, role: impl Into<String>) -> Self {
        Self {
            kind,
            ref_id,
            role: role.into(),
        }
    }
}

/// Kind-specific payload: a node's position, a way's ordered node refs, or a
/// relation's ordered members.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Node { location: Location },
    Way { nodes: Vec<i64> },
    Relation { members: Vec<Member> },
}

#[cfg(feature = "serde")]
const fn default_version() -> u64 {
    1
}

#[cfg(feature = "serde")]
const fn default_visible() -> bool {
    true
}

/// An element as it appeared in one OSM snapshot.
///
/// `deleted` marks a tombstone: a synthetic stub standing in for an id that
/// a snapshot was expected to contain but did not. Tombstones carry no real
/// meta data (`version` is zero).
///
/// Caller-supplied resolution payloads legitimately omit identity and meta
/// fields (the store overrides them), so those fields default on
/// deserialization.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    #[cfg_attr(feature = "serde", serde(default))]
    pub id: i64,
    #[cfg_attr(feature = "serde", serde(default = "default_version"))]
    pub version: u64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub changeset: Option<i64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub timestamp: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub uid: Option<i64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub user: Option<String>,
    #[cfg_attr(feature = "serde", serde(default = "default_visible"))]
    pub visible: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub deleted: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: Vec<Tag>,
    // Flattened so an element reads naturally: `location` on nodes, `nodes`
    // on ways, `members` on relations.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub geometry: Geometry,
}

impl Element {
    #[must_use]
    pub const fn node(id: i64, location: Location) -> Self {
        Self::bare(id, Geometry::Node { location })
    }

    #[must_use]
    pub const fn way(id: i64, nodes: Vec<i64>) -> Self {
        Self::bare(id, Geometry::Way { nodes })
    }

    #[must_use]
    pub const fn relation(id: i64, members: Vec<Member>) -> Self {
        Self::bare(id, Geometry::Relation { members })
    }

    const fn bare(id: i64, geometry: Geometry) -> Self {
        Self {
            id,
            version: 1,
            changeset: None,
            timestamp: None,
            uid: None,
            user: None,
            visible: true,
            deleted: false,
            tags: Vec::new(),
            geometry,
        }
    }

    /// Synthetic stub for an id missing from a snapshot.
    #[must_use]
    pub const fn tombstone(kind: ElementKind, id: i64) -> Self {
        let geometry = match kind {
            ElementKind::Node => Geometry::Node {
                location: Location::new(0.0, 0.0),
            },
            ElementKind::Way => Geometry::Way { nodes: Vec::new() },
            ElementKind::Relation => Geometry::Relation {
                members: Vec::new(),
            },
        };
        Self {
            id,
            version: 0,
            changeset: None,
            timestamp: None,
            uid: None,
            user: None,
            visible: false,
            deleted: true,
            tags: Vec::new(),
            geometry,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self.geometry {
            Geometry::Node { .. } => ElementKind::Node,
            Geometry::Way { .. } => ElementKind::Way,
            Geometry::Relation { .. } => ElementKind::Relation,
        }
    }

    #[must_use]
    pub const fn location(&self) -> Option<Location> {
        match self.geometry {
            Geometry::Node { location } => Some(location),
            _ => None,
        }
    }

    #[must_use]
    pub fn node_refs(&self) -> &[i64] {
        match &self.geometry {
            Geometry::Way { nodes } => nodes,
            _ => &[],
        }
    }

    #[must_use]
    pub fn members(&self) -> &[Member] {
        match &self.geometry {
            Geometry::Relation { members } => members,
            _ => &[],
        }
    }

    #[must_use]
    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }

    /// Tag value lookup, linear over the (short) tag list.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.k == key)
            .map(|t| t.v.as_str())
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} {} v{}", self.kind(), self.id, self.version)?;
        if self.deleted {
            write!(f, " (deleted)")?;
        }
        Ok(())
    }
}

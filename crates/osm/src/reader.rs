//! Streaming AOI loader.
//!
//! One pass over an OSM XML file with bounded memory per element: every
//! element contributes to the per-kind totals (and, for the original
//! snapshot, to the version map), but only ids in the tracker's touched set
//! are materialized. On the local snapshot the loader additionally builds
//! the node reference graph over *all* ways and relations and keeps the
//! untouched parents of touched nodes, which the reference propagator
//! later promotes to `referring`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use replay_core::element::{Element, ElementKind, Geometry, Location, Member, Tag};
use replay_core::snapshot::{AoiSnapshot, ParentElements, ReferenceGraph, VersionMap};
use replay_core::tracker::ChangeTracker;

use crate::error::Error;
use crate::writer;

/// What a single load should produce beyond the element maps.
#[derive(Debug, Default, Clone)]
pub struct LoadOptions {
    /// Record every element's version (original snapshot only).
    pub collect_versions: bool,
    /// Build the reference graph and candidate parents (local snapshot
    /// only).
    pub build_graph: bool,
    /// Where to write the reduced referenced-elements sub-OSM, if anywhere.
    pub sub_osm_path: Option<PathBuf>,
}

impl LoadOptions {
    #[must_use]
    pub fn original(sub_osm_path: Option<PathBuf>) -> Self {
        Self {
            collect_versions: true,
            sub_osm_path,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn local(sub_osm_path: Option<PathBuf>) -> Self {
        Self {
            build_graph: true,
            sub_osm_path,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn upstream(sub_osm_path: Option<PathBuf>) -> Self {
        Self {
            sub_osm_path,
            ..Self::default()
        }
    }
}

/// Everything one pass over a snapshot produces.
#[derive(Debug, Default, Clone)]
pub struct LoadedAoi {
    pub snapshot: AoiSnapshot,
    pub versions: VersionMap,
    pub graph: ReferenceGraph,
    pub parents: ParentElements,
}

/// Load an AOI snapshot file.
///
/// # Errors
///
/// I/O and XML errors, plus [`Error::MissingAttribute`] /
/// [`Error::InvalidAttribute`] for malformed elements.
pub fn load_aoi(
    path: &Path,
    tracker: &ChangeTracker,
    options: &LoadOptions,
) -> Result<LoadedAoi, Error> {
    let file = File::open(path)?;
    tracing::debug!(path = %path.display(), "loading aoi snapshot");
    load_aoi_from_reader(BufReader::new(file), tracker, options)
}

/// Like [`load_aoi`], from any buffered source.
///
/// # Errors
///
/// See [`load_aoi`].
pub fn load_aoi_from_reader<R: BufRead>(
    source: R,
    tracker: &ChangeTracker,
    options: &LoadOptions,
) -> Result<LoadedAoi, Error> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().expand_empty_elements = true;

    let mut loaded = LoadedAoi::default();
    let mut sub_osm: Vec<Element> = Vec::new();
    let mut current: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"node" => current = Some(element_from_attrs(ElementKind::Node, &e)?),
                b"way" => current = Some(element_from_attrs(ElementKind::Way, &e)?),
                b"relation" => {
                    current = Some(element_from_attrs(ElementKind::Relation, &e)?);
                }
                b"tag" => {
                    if let Some(element) = current.as_mut() {
                        element
                            .tags
                            .push(Tag::new(require_attr(&e, "k")?, require_attr(&e, "v")?));
                    }
                }
                b"nd" => {
                    if let Some(element) = current.as_mut() {
                        if let Geometry::Way { nodes } = &mut element.geometry {
                            nodes.push(parse_attr(&e, "ref")?);
                        }
                    }
                }
                b"member" => {
                    if let Some(element) = current.as_mut() {
                        if let Geometry::Relation { members } = &mut element.geometry {
                            members.push(member_from_attrs(&e)?);
                        }
                    }
                }
                _ => {}
            },
            Event::End(e) => {
                if matches!(e.name().as_ref(), b"node" | b"way" | b"relation") {
                    if let Some(element) = current.take() {
                        finish_element(&mut loaded, &mut sub_osm, tracker, options, element);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    loaded.snapshot.fill_tombstones(tracker);

    if let Some(path) = &options.sub_osm_path {
        writer::write_sub_osm(path, &sub_osm)?;
    }

    Ok(loaded)
}

fn finish_element(
    loaded: &mut LoadedAoi,
    sub_osm: &mut Vec<Element>,
    tracker: &ChangeTracker,
    options: &LoadOptions,
    element: Element,
) {
    let kind = element.kind();
    loaded.snapshot.counts.bump(kind);

    if options.collect_versions {
        loaded.versions.record(kind, element.id, element.version);
    }

    let touched = tracker.is_touched(kind, element.id);

    if options.build_graph {
        match kind {
            ElementKind::Way => {
                loaded.graph.record_way(element.id, element.node_refs());
                let references_touched = element
                    .node_refs()
                    .iter()
                    .any(|&n| tracker.is_touched(ElementKind::Node, n));
                if references_touched && !touched {
                    if options.sub_osm_path.is_some() {
                        sub_osm.push(element.clone());
                    }
                    loaded.parents.ways.insert(element.id, element.clone());
                }
            }
            ElementKind::Relation => {
                loaded.graph.record_relation(element.id, &element);
                let references_touched = element.members().iter().any(|m| {
                    m.kind == ElementKind::Node
                        && tracker.is_touched(ElementKind::Node, m.ref_id)
                });
                if references_touched && !touched {
                    if options.sub_osm_path.is_some() {
                        sub_osm.push(element.clone());
                    }
                    loaded
                        .parents
                        .relations
                        .insert(element.id, element.clone());
                }
            }
            ElementKind::Node => {}
        }
    }

    if touched {
        if options.sub_osm_path.is_some() {
            sub_osm.push(element.clone());
        }
        loaded.snapshot.insert(element);
    }
}

fn element_from_attrs(kind: ElementKind, e: &BytesStart) -> Result<Element, Error> {
    let id = parse_attr(e, "id")?;
    let visible = parse_opt_attr(e, "visible")?.unwrap_or(true);

    let geometry = match kind {
        ElementKind::Node => {
            // Invisible nodes legitimately carry no coordinates.
            let lat = parse_opt_attr(e, "lat")?;
            let lon = parse_opt_attr(e, "lon")?;
            let location = match (lat, lon) {
                (Some(lat), Some(lon)) => Location::new(lat, lon),
                _ if !visible => Location::new(0.0, 0.0),
                (None, _) => return Err(missing(e, "lat")),
                (_, None) => return Err(missing(e, "lon")),
            };
            Geometry::Node { location }
        }
        ElementKind::Way => Geometry::Way { nodes: Vec::new() },
        ElementKind::Relation => Geometry::Relation {
            members: Vec::new(),
        },
    };

    Ok(Element {
        id,
        version: parse_attr(e, "version")?,
        changeset: parse_opt_attr(e, "changeset")?,
        timestamp: attr_value(e, "timestamp")?,
        uid: parse_opt_attr(e, "uid")?,
        user: attr_value(e, "user")?,
        visible,
        deleted: false,
        tags: Vec::new(),
        geometry,
    })
}

fn member_from_attrs(e: &BytesStart) -> Result<Member, Error> {
    let raw_kind = require_attr(e, "type")?;
    let kind = ElementKind::parse_member_kind(&raw_kind)
        .ok_or(Error::UnknownMemberKind { value: raw_kind })?;
    Ok(Member {
        kind,
        ref_id: parse_attr(e, "ref")?,
        role: attr_value(e, "role")?.unwrap_or_default(),
    })
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn missing(e: &BytesStart, attribute: &'static str) -> Error {
    Error::MissingAttribute {
        element: element_name(e),
        attribute,
    }
}

pub(crate) fn attr_value(e: &BytesStart, name: &str) -> Result<Option<String>, Error> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

pub(crate) fn require_attr(e: &BytesStart, name: &'static str) -> Result<String, Error> {
    attr_value(e, name)?.ok_or_else(|| missing(e, name))
}

pub(crate) fn parse_attr<T: FromStr>(e: &BytesStart, name: &'static str) -> Result<T, Error> {
    let value = require_attr(e, name)?;
    value.parse().map_err(|_| Error::InvalidAttribute {
        element: element_name(e),
        attribute: name,
        value,
    })
}

pub(crate) fn parse_opt_attr<T: FromStr>(
    e: &BytesStart,
    name: &'static str,
) -> Result<Option<T>, Error> {
    match attr_value(e, name)? {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidAttribute {
                element: element_name(e),
                attribute: name,
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::tracker::ChangeRecord;

    const AOI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="test">
  <bounds minlat="9.0" minlon="19.0" maxlat="11.0" maxlon="21.0"/>
  <node id="50" lat="10.0" lon="20.0" version="3" timestamp="2019-01-01T00:00:00Z" uid="7" user="mapper" changeset="11"/>
  <node id="51" lat="10.5" lon="20.5" version="1">
    <tag k="amenity" v="well"/>
  </node>
  <way id="200" version="2">
    <nd ref="50"/>
    <nd ref="51"/>
    <tag k="highway" v="path"/>
  </way>
  <relation id="300" version="1">
    <member type="node" ref="50" role="stop"/>
    <member type="way" ref="200" role=""/>
  </relation>
</osm>
"#;

    fn touched_node(id: i64) -> ChangeTracker {
        let mut tracker = ChangeTracker::new();
        tracker.apply(ChangeRecord {
            kind: ElementKind::Node,
            id,
            version: 4,
            visible: true,
        });
        tracker
    }

    #[test]
    fn counts_cover_everything_but_only_touched_materialize() {
        let tracker = touched_node(50);
        let loaded =
            load_aoi_from_reader(AOI.as_bytes(), &tracker, &LoadOptions::upstream(None))
                .unwrap();

        assert_eq!(loaded.snapshot.counts.nodes, 2);
        assert_eq!(loaded.snapshot.counts.ways, 1);
        assert_eq!(loaded.snapshot.counts.relations, 1);

        assert!(loaded.snapshot.nodes.contains_key(&50));
        assert!(!loaded.snapshot.nodes.contains_key(&51));
        assert!(loaded.snapshot.ways.is_empty());

        let node = &loaded.snapshot.nodes[&50];
        assert_eq!(node.version, 3);
        assert_eq!(node.user.as_deref(), Some("mapper"));
        assert_eq!(node.location(), Some(Location::new(10.0, 20.0)));
    }

    #[test]
    fn original_load_collects_all_versions() {
        let tracker = touched_node(50);
        let loaded =
            load_aoi_from_reader(AOI.as_bytes(), &tracker, &LoadOptions::original(None))
                .unwrap();
        assert_eq!(loaded.versions.get(ElementKind::Node, 50), Some(3));
        assert_eq!(loaded.versions.get(ElementKind::Node, 51), Some(1));
        assert_eq!(loaded.versions.get(ElementKind::Way, 200), Some(2));
        assert_eq!(loaded.versions.get(ElementKind::Relation, 300), Some(1));
    }

    #[test]
    fn local_load_builds_graph_and_parents() {
        let tracker = touched_node(50);
        let loaded =
            load_aoi_from_reader(AOI.as_bytes(), &tracker, &LoadOptions::local(None)).unwrap();

        assert_eq!(loaded.graph.ways_for(50), &[200]);
        assert_eq!(loaded.graph.relations_for(50), &[300]);

        // Way 200 and relation 300 are untouched parents of node 50.
        assert!(loaded.parents.ways.contains_key(&200));
        assert!(loaded.parents.relations.contains_key(&300));
        let way = &loaded.parents.ways[&200];
        assert_eq!(way.node_refs(), &[50, 51]);
        assert_eq!(way.tag("highway"), Some("path"));
    }

    #[test]
    fn missing_touched_id_becomes_tombstone() {
        let tracker = touched_node(9999);
        let loaded =
            load_aoi_from_reader(AOI.as_bytes(), &tracker, &LoadOptions::upstream(None))
                .unwrap();
        let stub = &loaded.snapshot.nodes[&9999];
        assert!(stub.deleted);
        assert_eq!(stub.version, 0);
    }

    #[test]
    fn short_member_kinds_are_normalized() {
        let xml = r#"<osm>
  <relation id="300" version="1">
    <member type="n" ref="50" role=""/>
    <member type="w" ref="200" role="outer"/>
  </relation>
</osm>"#;
        let mut tracker = ChangeTracker::new();
        tracker.apply(ChangeRecord {
            kind: ElementKind::Relation,
            id: 300,
            version: 2,
            visible: true,
        });
        let loaded =
            load_aoi_from_reader(xml.as_bytes(), &tracker, &LoadOptions::upstream(None))
                .unwrap();
        let members = loaded.snapshot.relations[&300].members();
        assert_eq!(members[0].kind, ElementKind::Node);
        assert_eq!(members[1].kind, ElementKind::Way);
        assert_eq!(members[1].role, "outer");
    }

    #[test]
    fn unknown_member_kind_is_rejected() {
        let xml = r#"<osm>
  <relation id="300" version="1"><member type="z" ref="1" role=""/></relation>
</osm>"#;
        let mut tracker = ChangeTracker::new();
        tracker.apply(ChangeRecord {
            kind: ElementKind::Relation,
            id: 300,
            version: 2,
            visible: true,
        });
        let err = load_aoi_from_reader(xml.as_bytes(), &tracker, &LoadOptions::upstream(None))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownMemberKind { value } if value == "z"));
    }

    #[test]
    fn invisible_node_without_coordinates_is_accepted() {
        let xml = r#"<osm>
  <node id="77" version="4" visible="false"/>
</osm>"#;
        let mut tracker = ChangeTracker::new();
        tracker.apply(ChangeRecord {
            kind: ElementKind::Node,
            id: 77,
            version: 4,
            visible: false,
        });
        let loaded =
            load_aoi_from_reader(xml.as_bytes(), &tracker, &LoadOptions::upstream(None))
                .unwrap();
        assert!(!loaded.snapshot.nodes[&77].visible);
    }
}

//! osmChange and sub-OSM serialization.

use std::io::Cursor;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use replay_core::element::{Element, ElementKind, Geometry};
use replay_core::emit::{Change, ChangeAction, ChangesetPlan};

use crate::error::Error;

const GENERATOR: &str = "osm-replay";

/// Serialize a changeset plan into one `osmChange` document with `create`,
/// `modify`, and `delete` containers. Empty containers are omitted, so a
/// plan with no changes yields a childless root.
///
/// # Errors
///
/// Serialization failures only; the plan itself is taken as valid.
pub fn osm_change_to_xml(plan: &ChangesetPlan) -> Result<String, Error> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("osmChange");
    root.push_attribute(("version", "0.6"));
    root.push_attribute(("generator", GENERATOR));
    writer.write_event(Event::Start(root))?;

    for (action, container) in [
        (ChangeAction::Create, "create"),
        (ChangeAction::Modify, "modify"),
        (ChangeAction::Delete, "delete"),
    ] {
        let changes: Vec<&Change> =
            plan.changes.iter().filter(|c| c.action == action).collect();
        if changes.is_empty() {
            continue;
        }
        writer.write_event(Event::Start(BytesStart::new(container)))?;
        for change in changes {
            write_change(&mut writer, change)?;
        }
        writer.write_event(Event::End(BytesEnd::new(container)))?;
    }

    writer.write_event(Event::End(BytesEnd::new("osmChange")))?;
    into_string(writer)
}

fn write_change<W: std::io::Write>(
    writer: &mut Writer<W>,
    change: &Change,
) -> Result<(), Error> {
    let name = change.kind.as_str();
    let mut start = BytesStart::new(name);
    start.push_attribute(("id", change.id.to_string().as_str()));
    start.push_attribute(("version", change.version.to_string().as_str()));
    start.push_attribute(("changeset", change.changeset.to_string().as_str()));
    if let Some(visible) = change.visible {
        start.push_attribute(("visible", if visible { "true" } else { "false" }));
    }
    if let Some(lat) = change.lat {
        start.push_attribute(("lat", lat.to_string().as_str()));
    }
    if let Some(lon) = change.lon {
        start.push_attribute(("lon", lon.to_string().as_str()));
    }

    let has_children = !change.tags.is_empty()
        || change.nodes.as_ref().is_some_and(|n| !n.is_empty())
        || change.members.as_ref().is_some_and(|m| !m.is_empty());
    if !has_children {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if let Some(nodes) = &change.nodes {
        for node_ref in nodes {
            let mut nd = BytesStart::new("nd");
            nd.push_attribute(("ref", node_ref.to_string().as_str()));
            writer.write_event(Event::Empty(nd))?;
        }
    }
    if let Some(members) = &change.members {
        for member in members {
            let mut m = BytesStart::new("member");
            m.push_attribute(("type", member.kind.as_str()));
            m.push_attribute(("ref", member.ref_id.to_string().as_str()));
            m.push_attribute(("role", member.role.as_str()));
            writer.write_event(Event::Empty(m))?;
        }
    }
    write_tags(writer, &change.tags)?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Write the reduced referenced-elements document consumed by the external
/// GeoJSON converter.
///
/// # Errors
///
/// I/O and serialization failures.
pub fn write_sub_osm(path: &Path, elements: &[Element]) -> Result<(), Error> {
    let xml = sub_osm_to_xml(elements)?;
    std::fs::write(path, xml)?;
    tracing::debug!(path = %path.display(), elements = elements.len(), "wrote sub-osm");
    Ok(())
}

/// Serialize elements into a plain `<osm>` document with full meta.
///
/// # Errors
///
/// Serialization failures.
pub fn sub_osm_to_xml(elements: &[Element]) -> Result<String, Error> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("osm");
    root.push_attribute(("version", "0.6"));
    root.push_attribute(("generator", GENERATOR));
    writer.write_event(Event::Start(root))?;

    // Nodes first so consumers can resolve refs in one pass.
    for kind in ElementKind::ORDERED {
        for element in elements.iter().filter(|e| e.kind() == kind && !e.deleted) {
            write_element(&mut writer, element)?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("osm")))?;
    into_string(writer)
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    element: &Element,
) -> Result<(), Error> {
    let name = element.kind().as_str();
    let mut start = BytesStart::new(name);
    start.push_attribute(("id", element.id.to_string().as_str()));
    start.push_attribute(("version", element.version.to_string().as_str()));
    start.push_attribute(("visible", if element.visible { "true" } else { "false" }));
    if let Some(location) = element.location() {
        start.push_attribute(("lat", location.lat.to_string().as_str()));
        start.push_attribute(("lon", location.lon.to_string().as_str()));
    }
    if let Some(changeset) = element.changeset {
        start.push_attribute(("changeset", changeset.to_string().as_str()));
    }
    if let Some(timestamp) = &element.timestamp {
        start.push_attribute(("timestamp", timestamp.as_str()));
    }
    if let Some(uid) = element.uid {
        start.push_attribute(("uid", uid.to_string().as_str()));
    }
    if let Some(user) = &element.user {
        start.push_attribute(("user", user.as_str()));
    }

    let has_children = !element.tags.is_empty()
        || !element.node_refs().is_empty()
        || !element.members().is_empty();
    if !has_children {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    match &element.geometry {
        Geometry::Way { nodes } => {
            for node_ref in nodes {
                let mut nd = BytesStart::new("nd");
                nd.push_attribute(("ref", node_ref.to_string().as_str()));
                writer.write_event(Event::Empty(nd))?;
            }
        }
        Geometry::Relation { members } => {
            for member in members {
                let mut m = BytesStart::new("member");
                m.push_attribute(("type", member.kind.as_str()));
                m.push_attribute(("ref", member.ref_id.to_string().as_str()));
                m.push_attribute(("role", member.role.as_str()));
                writer.write_event(Event::Empty(m))?;
            }
        }
        Geometry::Node { .. } => {}
    }
    write_tags(writer, &element.tags)?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_tags<W: std::io::Write>(
    writer: &mut Writer<W>,
    tags: &[replay_core::element::Tag],
) -> Result<(), Error> {
    for tag in tags {
        let mut t = BytesStart::new("tag");
        t.push_attribute(("k", tag.k.as_str()));
        t.push_attribute(("v", tag.v.as_str()));
        writer.write_event(Event::Empty(t))?;
    }
    Ok(())
}

/// The body PUT to `changeset/create` upstream.
///
/// # Errors
///
/// Serialization failures.
pub fn changeset_creation_xml(comment: &str) -> Result<String, Error> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Start(BytesStart::new("osm")))?;
    writer.write_event(Event::Start(BytesStart::new("changeset")))?;
    for (k, v) in [("comment", comment), ("created_by", GENERATOR)] {
        let mut tag = BytesStart::new("tag");
        tag.push_attribute(("k", k));
        tag.push_attribute(("v", v));
        writer.write_event(Event::Empty(tag))?;
    }
    writer.write_event(Event::End(BytesEnd::new("changeset")))?;
    writer.write_event(Event::End(BytesEnd::new("osm")))?;
    into_string(writer)
}

fn into_string(writer: Writer<Cursor<Vec<u8>>>) -> Result<String, Error> {
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| Error::Io(std::io::Error::other(e)))
}

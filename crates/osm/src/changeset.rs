//! osmChange payload parsing.
//!
//! A changeset download wraps elements in `create` / `modify` / `delete`
//! sections. The tracker only needs the flat occurrence stream, in document
//! order: kind, id, version, and effective visibility. Elements inside a
//! `delete` section are invisible unless they say otherwise.

use quick_xml::events::Event;
use quick_xml::Reader;
use replay_core::element::ElementKind;
use replay_core::tracker::ChangeRecord;

use crate::error::Error;
use crate::reader::{parse_attr, parse_opt_attr};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Section {
    Create,
    Modify,
    Delete,
}

/// Parse one osmChange document into change records, preserving document
/// order.
///
/// # Errors
///
/// XML errors, [`Error::UnknownChangeSection`] for a section element other
/// than `create`/`modify`/`delete`, and attribute errors for malformed
/// elements.
pub fn parse_osm_change(xml: &str) -> Result<Vec<ChangeRecord>, Error> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().expand_empty_elements = true;

    let mut records = Vec::new();
    let mut section: Option<Section> = None;
    let mut inside_element = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"osmChange" => {}
                b"create" => section = Some(Section::Create),
                b"modify" => section = Some(Section::Modify),
                b"delete" => section = Some(Section::Delete),
                b"node" | b"way" | b"relation" if !inside_element => {
                    let kind = match e.name().as_ref() {
                        b"node" => ElementKind::Node,
                        b"way" => ElementKind::Way,
                        _ => ElementKind::Relation,
                    };
                    let default_visible = section != Some(Section::Delete);
                    records.push(ChangeRecord {
                        kind,
                        id: parse_attr(&e, "id")?,
                        version: parse_attr(&e, "version")?,
                        visible: parse_opt_attr(&e, "visible")?.unwrap_or(default_visible),
                    });
                    inside_element = true;
                }
                // tag / nd / member children of the current element.
                _ if inside_element => {}
                other => {
                    if section.is_none() {
                        return Err(Error::UnknownChangeSection {
                            name: String::from_utf8_lossy(other).into_owned(),
                        });
                    }
                }
            },
            Event::End(e) => match e.name().as_ref() {
                b"node" | b"way" | b"relation" => inside_element = false,
                b"create" | b"modify" | b"delete" => section = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    tracing::debug!(records = records.len(), "parsed osmChange payload");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_drive_default_visibility() {
        let xml = r#"<osmChange version="0.6" generator="local">
  <create>
    <node id="9001" version="1" lat="1.0" lon="2.0"/>
  </create>
  <modify>
    <node id="42" version="8" lat="1.0" lon="2.0">
      <tag k="name" v="Local"/>
    </node>
  </modify>
  <delete>
    <way id="200" version="3"/>
  </delete>
</osmChange>"#;
        let records = parse_osm_change(xml).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].kind, ElementKind::Node);
        assert_eq!(records[0].id, 9001);
        assert_eq!(records[0].version, 1);
        assert!(records[0].visible);

        assert_eq!(records[1].version, 8);
        assert!(records[1].visible);

        assert_eq!(records[2].kind, ElementKind::Way);
        assert!(!records[2].visible);
    }

    #[test]
    fn explicit_visible_attribute_wins() {
        let xml = r#"<osmChange>
  <delete><node id="5" version="2" visible="true"/></delete>
</osmChange>"#;
        let records = parse_osm_change(xml).unwrap();
        assert!(records[0].visible);
    }

    #[test]
    fn document_order_is_preserved_across_sections() {
        let xml = r#"<osmChange>
  <create><node id="1" version="1"/></create>
  <delete><node id="1" version="2"/></delete>
  <create><node id="2" version="1"/></create>
</osmChange>"#;
        let ids: Vec<i64> = parse_osm_change(xml)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![1, 1, 2]);
    }

    #[test]
    fn unknown_section_is_rejected() {
        let xml = "<osmChange><upsert><node id=\"1\" version=\"1\"/></upsert></osmChange>";
        let err = parse_osm_change(xml).unwrap_err();
        assert!(matches!(err, Error::UnknownChangeSection { name } if name == "upsert"));
    }

    #[test]
    fn empty_document_yields_no_records() {
        let records = parse_osm_change("<osmChange version=\"0.6\"/>").unwrap();
        assert!(records.is_empty());
    }
}

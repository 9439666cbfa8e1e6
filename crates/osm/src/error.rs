use std::fmt;

use ::derive_more::From;

/// Anything that can go wrong at the XML boundary.
#[derive(Debug, From)]
pub enum Error {
    #[from]
    Io(std::io::Error),
    #[from]
    Xml(quick_xml::Error),
    #[from]
    Attr(quick_xml::events::attributes::AttrError),
    #[from]
    Json(serde_json::Error),
    /// A required attribute is absent from an element.
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    /// An attribute is present but does not parse.
    InvalidAttribute {
        element: String,
        attribute: &'static str,
        value: String,
    },
    /// A relation member `type` outside `node`/`way`/`relation` (long or
    /// short form).
    UnknownMemberKind { value: String },
    /// A change section other than `create`/`modify`/`delete`.
    UnknownChangeSection { name: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::Xml(e) => write!(f, "malformed xml: {e}"),
            Self::Attr(e) => write!(f, "malformed attribute: {e}"),
            Self::Json(e) => write!(f, "malformed json: {e}"),
            Self::MissingAttribute { element, attribute } => {
                write!(f, "<{element}> is missing the '{attribute}' attribute")
            }
            Self::InvalidAttribute {
                element,
                attribute,
                value,
            } => write!(
                f,
                "<{element}> has invalid '{attribute}' value {value:?}"
            ),
            Self::UnknownMemberKind { value } => {
                write!(f, "unknown relation member kind {value:?}")
            }
            Self::UnknownChangeSection { name } => {
                write!(f, "unknown osmChange section <{name}>")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Xml(e) => Some(e),
            Self::Attr(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}


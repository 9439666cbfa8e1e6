pub mod types;

pub use types::{Element, ElementKind, Geometry, Location, Member, Tag};

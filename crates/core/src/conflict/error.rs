use crate::element::ElementKind;

/// Invariant failures during conflict detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A referenced id has no version in the original snapshot; the element
    /// was touched locally but the baseline never contained it.
    MissingOriginalVersion { kind: ElementKind, id: i64 },
}

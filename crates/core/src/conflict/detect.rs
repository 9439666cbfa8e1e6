//! The upstream-changed filter and per-kind conflict sets.

use super::equality::elements_conflict;
use super::error::Error;
use crate::element::ElementKind;
use crate::snapshot::{AoiSnapshot, VersionMap};
use crate::tracker::{ChangeTracker, KindSets};

/// Compare every locally referenced element against its upstream row and
/// collect the ids that conflict.
///
/// An element is a conflict candidate only when upstream actually moved past
/// the original baseline:
///
/// - upstream version strictly greater than the original version, or
/// - upstream row is a tombstone while the element still exists locally
///   (a delete has no version to gate on).
///
/// Candidates then conflict iff structural equality between the local and
/// upstream rows fails. Added elements are never candidates (they have no
/// upstream row), and an id whose local and upstream rows are both
/// tombstones is skipped.
///
/// # Errors
///
/// [`Error::MissingOriginalVersion`] when a referenced id has no baseline
/// version; the snapshots are inconsistent with the changeset sweep.
pub fn detect_conflicts(
    local: &AoiSnapshot,
    upstream: &AoiSnapshot,
    original_versions: &VersionMap,
    tracker: &ChangeTracker,
) -> Result<KindSets, Error> {
    let mut conflicting = KindSets::default();

    for kind in ElementKind::ORDERED {
        for &id in tracker.referenced.for_kind(kind) {
            let Some(local_element) = local.get(kind, id) else {
                continue;
            };
            let Some(upstream_element) = upstream.get(kind, id) else {
                continue;
            };

            if upstream_element.deleted {
                if !local_element.deleted {
                    conflicting.for_kind_mut(kind).insert(id);
                }
                continue;
            }

            let original_version = original_versions
                .get(kind, id)
                .ok_or(Error::MissingOriginalVersion { kind, id })?;
            if upstream_element.version <= original_version {
                continue;
            }

            if elements_conflict(local_element, upstream_element) {
                conflicting.for_kind_mut(kind).insert(id);
            }
        }
        tracing::debug!(
            kind = %kind,
            conflicting = conflicting.for_kind(kind).len(),
            "conflict detection pass"
        );
    }

    Ok(conflicting)
}

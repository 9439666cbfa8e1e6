//! The detection stage: track local changes, load the three snapshots,
//! detect conflicts, and populate the element store.

use replay_core::conflict::detect_conflicts;
use replay_core::element::ElementKind;
use replay_core::elements_conflict;
use replay_core::propagate::propagate_references;
use replay_core::state::ElementsData;
use replay_core::store::{
    ElementKey, ElementStore, LocalState, ResolutionStatus, TrackedElement,
};
use replay_core::tracker::ChangeTracker;
use replay_osm::reader::{load_aoi, LoadOptions, LoadedAoi};

use crate::config::ReplayConfig;
use crate::error::Error;
use crate::storage::Storage;

/// What the stage reports back to the status record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DetectionOutcome {
    pub elements_data: ElementsData,
    pub conflicting: usize,
}

/// Run the whole detection pass.
///
/// Re-running over a store that still holds elements (re-trigger from the
/// push stage keeps resolved ones) refreshes their snapshots, downgrades
/// resolutions whose upstream row moved again, and leaves `pushed` elements
/// untouched.
///
/// # Errors
///
/// Parse, storage, and invariant errors; on error the caller discards the
/// stage's partial products via the re-trigger path.
pub fn run_detection(storage: &dyn Storage, config: &ReplayConfig) -> Result<DetectionOutcome, Error> {
    config.validate()?;

    let changesets = storage.load_changesets()?;
    let mut tracker = ChangeTracker::new();
    for changeset in &changesets {
        let records = replay_osm::changeset::parse_osm_change(&changeset.payload)?;
        tracker.apply_all(records);
    }
    tracing::info!(
        changesets = changesets.len(),
        touched = tracker.touched_count(),
        "tracked local changes"
    );

    let original = load_aoi(
        &config.original_aoi_path(),
        &tracker,
        &LoadOptions::original(Some(config.referenced_osm_path("original"))),
    )?;
    let local = load_aoi(
        &config.local_aoi_path(),
        &tracker,
        &LoadOptions::local(Some(config.referenced_osm_path("local"))),
    )?;
    let upstream = load_aoi(
        &config.current_aoi_path(),
        &tracker,
        &LoadOptions::upstream(Some(config.referenced_osm_path("upstream"))),
    )?;

    let mut store = storage.load_elements()?;
    populate_store(&mut store, &tracker, &original, &local, &upstream);

    let conflicting =
        detect_conflicts(&local.snapshot, &upstream.snapshot, &original.versions, &tracker)?;
    for kind in ElementKind::ORDERED {
        store.mark_conflicting(kind, conflicting.for_kind(kind));
    }

    propagate_references(&mut store, &local.graph, &local.parents, &tracker)?;

    storage.save_elements(&store)?;
    storage.mark_changesets_processed()?;

    let outcome = DetectionOutcome {
        elements_data: ElementsData {
            local: local.snapshot.counts,
            upstream: upstream.snapshot.counts,
        },
        conflicting: store.conflicting_count(),
    };
    tracing::info!(conflicting = outcome.conflicting, "detection finished");
    Ok(outcome)
}

fn populate_store(
    store: &mut ElementStore,
    tracker: &ChangeTracker,
    original: &LoadedAoi,
    local: &LoadedAoi,
    upstream: &LoadedAoi,
) {
    for kind in ElementKind::ORDERED {
        for &id in tracker.added.for_kind(kind) {
            if is_pushed(store, kind, id) {
                continue;
            }
            let mut element = TrackedElement::new(kind, id, LocalState::Added);
            element.local_snapshot = local.snapshot.get(kind, id).cloned();
            element.status = ResolutionStatus::Resolved;
            store.upsert(element);
        }

        for &id in tracker.modified.for_kind(kind) {
            refresh_or_create(store, kind, id, LocalState::Modified, original, local, upstream);
        }

        for &id in tracker.deleted.for_kind(kind) {
            refresh_or_create(store, kind, id, LocalState::Deleted, original, local, upstream);
        }
    }
}

fn refresh_or_create(
    store: &mut ElementStore,
    kind: ElementKind,
    id: i64,
    local_state: LocalState,
    original: &LoadedAoi,
    local: &LoadedAoi,
    upstream: &LoadedAoi,
) {
    let key = ElementKey::new(kind, id);
    let fresh_upstream = upstream.snapshot.get(kind, id).cloned();

    let mut element = match store.get(key) {
        Some(existing) if existing.status == ResolutionStatus::Pushed => return,
        Some(existing) => {
            let mut element = existing.clone();
            // A resolution is stale once upstream moved again underneath it;
            // this also catches rows deleted upstream since the last run.
            if element.status == ResolutionStatus::Resolved {
                let stale = match (&element.upstream_snapshot, &fresh_upstream) {
                    (Some(old), Some(new)) => elements_conflict(old, new),
                    _ => false,
                };
                if stale {
                    element.status = ResolutionStatus::PartiallyResolved;
                }
            }
            element
        }
        None => {
            let mut element = TrackedElement::new(kind, id, local_state);
            element.status = ResolutionStatus::Resolved;
            element
        }
    };

    element.original_snapshot = original.snapshot.get(kind, id).cloned();
    element.local_snapshot = local.snapshot.get(kind, id).cloned();
    element.upstream_snapshot = fresh_upstream;
    store.upsert(element);
}

fn is_pushed(store: &ElementStore, kind: ElementKind, id: i64) -> bool {
    store
        .get(ElementKey::new(kind, id))
        .is_some_and(|e| e.status == ResolutionStatus::Pushed)
}

//! Resolution entry points: the operations the facade exposes while the
//! pipeline sits in `resolving_conflicts`.
//!
//! Each call loads the element store, applies one atomic mutation (cascades
//! included), persists it, and keeps the pipeline status in step: any edit
//! re-opens the resolving state, and the state is marked complete exactly
//! when no open conflict remains.

use replay_core::store::{
    ElementKey, ResolutionPayload, ResolvedFrom, TrackedElement,
};
use replay_core::ReplayState;

use crate::error::Error;
use crate::storage::Storage;

/// Fetch one tracked element.
///
/// # Errors
///
/// Storage failures; `Store(NotFound)` for an unknown key.
pub fn element(storage: &dyn Storage, key: ElementKey) -> Result<TrackedElement, Error> {
    let store = storage.load_elements()?;
    store
        .get(key)
        .cloned()
        .ok_or_else(|| replay_core::store::Error::NotFound(key).into())
}

/// Store a partial (work-in-progress) resolution.
///
/// # Errors
///
/// Storage failures and store validation errors.
pub fn update_element(
    storage: &dyn Storage,
    key: ElementKey,
    payload: &ResolutionPayload,
) -> Result<TrackedElement, Error> {
    let mut store = storage.load_elements()?;
    store.update_resolution(key, payload)?;
    storage.save_elements(&store)?;
    reopen_resolving(storage)?;
    element(storage, key)
}

/// Store a final custom resolution.
///
/// # Errors
///
/// Storage failures and store validation errors.
pub fn resolve_element(
    storage: &dyn Storage,
    key: ElementKey,
    payload: &ResolutionPayload,
) -> Result<TrackedElement, Error> {
    let mut store = storage.load_elements()?;
    store.resolve_custom(key, payload)?;
    storage.save_elements(&store)?;
    settle_resolving(storage, &store)?;
    element(storage, key)
}

/// Resolve with the upstream or local snapshot wholesale.
///
/// # Errors
///
/// Storage failures and store validation errors.
pub fn resolve_preset(
    storage: &dyn Storage,
    key: ElementKey,
    from: ResolvedFrom,
) -> Result<TrackedElement, Error> {
    let mut store = storage.load_elements()?;
    store.resolve_preset(key, from)?;
    storage.save_elements(&store)?;
    settle_resolving(storage, &store)?;
    element(storage, key)
}

/// Clear an element's resolution (and its cascade).
///
/// # Errors
///
/// Storage failures and store validation errors.
pub fn reset_element(storage: &dyn Storage, key: ElementKey) -> Result<TrackedElement, Error> {
    let mut store = storage.load_elements()?;
    store.reset_resolution(key)?;
    storage.save_elements(&store)?;
    reopen_resolving(storage)?;
    element(storage, key)
}

/// A resolution edit may have re-opened work; pull the state back to
/// resolving and mark it incomplete.
fn reopen_resolving(storage: &dyn Storage) -> Result<(), Error> {
    let mut status = storage.load_status()?;
    status.state = ReplayState::ResolvingConflicts;
    status.is_current_state_complete = false;
    storage.save_status(&status)
}

/// After a final resolution, the stage completes once nothing conflicting
/// remains.
fn settle_resolving(
    storage: &dyn Storage,
    store: &replay_core::ElementStore,
) -> Result<(), Error> {
    let mut status = storage.load_status()?;
    status.state = ReplayState::ResolvingConflicts;
    let open = store.conflicting_count();
    status.is_current_state_complete = open == 0;
    if open == 0 {
        tracing::info!("all conflicts resolved");
    }
    storage.save_status(&status)
}

// -- Read-only listings ------------------------------------------------------

/// # Errors
/// Storage failures.
pub fn conflicting(storage: &dyn Storage) -> Result<Vec<TrackedElement>, Error> {
    Ok(storage
        .load_elements()?
        .conflicting()
        .into_iter()
        .cloned()
        .collect())
}

/// # Errors
/// Storage failures.
pub fn resolved(storage: &dyn Storage) -> Result<Vec<TrackedElement>, Error> {
    Ok(storage
        .load_elements()?
        .resolved()
        .into_iter()
        .cloned()
        .collect())
}

/// # Errors
/// Storage failures.
pub fn partially_resolved(storage: &dyn Storage) -> Result<Vec<TrackedElement>, Error> {
    Ok(storage
        .load_elements()?
        .partially_resolved()
        .into_iter()
        .cloned()
        .collect())
}

/// All tracked changes; `without_conflicts` narrows to elements that never
/// conflicted.
///
/// # Errors
/// Storage failures.
pub fn all_changes(
    storage: &dyn Storage,
    without_conflicts: bool,
) -> Result<Vec<TrackedElement>, Error> {
    let store = storage.load_elements()?;
    let elements = if without_conflicts {
        store.non_conflicting()
    } else {
        store.iter().collect()
    };
    Ok(elements.into_iter().cloned().collect())
}

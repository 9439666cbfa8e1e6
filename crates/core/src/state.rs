//! The pipeline's persisted finite state machine.
//!
//! A single [`PipelineStatus`] record exists per deployment. Each stage may
//! only start when its predecessor completed cleanly; a failure parks the
//! machine where it happened with the error details attached, and the
//! operator re-triggers from the previous boundary.

use alloc::string::String;
use alloc::vec::Vec;

use crate::snapshot::KindCounts;

/// Pipeline stages in execution order.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReplayState {
    NotTriggered,
    GatheringChangesets,
    ExtractingUpstreamAoi,
    ExtractingLocalAoi,
    DetectingConflicts,
    CreatingGeojsons,
    ResolvingConflicts,
    PushConflicts,
    PushedUpstream,
}

impl ReplayState {
    pub const ORDER: [Self; 9] = [
        Self::NotTriggered,
        Self::GatheringChangesets,
        Self::ExtractingUpstreamAoi,
        Self::ExtractingLocalAoi,
        Self::DetectingConflicts,
        Self::CreatingGeojsons,
        Self::ResolvingConflicts,
        Self::PushConflicts,
        Self::PushedUpstream,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|s| *s == self).unwrap_or(0)
    }

    /// The stage that must have completed before this one may start.
    #[must_use]
    pub fn previous(self) -> Option<Self> {
        let index = self.index();
        (index > 0).then(|| Self::ORDER[index - 1])
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotTriggered => "not_triggered",
            Self::GatheringChangesets => "gathering_changesets",
            Self::ExtractingUpstreamAoi => "extracting_upstream_aoi",
            Self::ExtractingLocalAoi => "extracting_local_aoi",
            Self::DetectingConflicts => "detecting_conflicts",
            Self::CreatingGeojsons => "creating_geojsons",
            Self::ResolvingConflicts => "resolving_conflicts",
            Self::PushConflicts => "push_conflicts",
            Self::PushedUpstream => "pushed_upstream",
        }
    }
}

impl core::fmt::Display for ReplayState {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind element totals for the local and upstream snapshots.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ElementsData {
    pub local: KindCounts,
    pub upstream: KindCounts,
}

/// What a re-trigger must throw away before re-running the rolled-back
/// stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Rollback {
    None,
    DiscardChangesets,
    DiscardElements,
    /// Drop changesets but keep resolved elements for reuse (rolling back
    /// from the push stage).
    DiscardChangesetsKeepElements,
}

/// Guard violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A previous stage failed; the machine refuses to advance until a
    /// re-trigger clears the error.
    Errored { state: ReplayState },
    /// Attempted entry from a non-adjacent or incomplete state.
    StageOrder {
        attempted: ReplayState,
        current: ReplayState,
        current_complete: bool,
    },
}

/// The singleton pipeline record.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStatus {
    pub state: ReplayState,
    pub is_current_state_complete: bool,
    pub has_errored: bool,
    pub error_details: Option<String>,
    pub elements_data: Option<ElementsData>,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self {
            state: ReplayState::NotTriggered,
            is_current_state_complete: true,
            has_errored: false,
            error_details: None,
            elements_data: None,
        }
    }
}

impl PipelineStatus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_initiated(&self) -> bool {
        self.state != ReplayState::NotTriggered
    }

    /// Enter a stage: only legal from the completed predecessor with no
    /// standing error. On success the stage is marked in progress.
    ///
    /// # Errors
    ///
    /// [`Error::Errored`] or [`Error::StageOrder`]; the record is unchanged.
    pub fn enter(&mut self, next: ReplayState) -> Result<(), Error> {
        if self.has_errored {
            return Err(Error::Errored { state: self.state });
        }
        if next.previous() != Some(self.state) || !self.is_current_state_complete {
            return Err(Error::StageOrder {
                attempted: next,
                current: self.state,
                current_complete: self.is_current_state_complete,
            });
        }
        tracing::debug!(from = %self.state, to = %next, "entering stage");
        self.state = next;
        self.is_current_state_complete = false;
        Ok(())
    }

    pub fn complete(&mut self) {
        self.is_current_state_complete = true;
    }

    /// Record a stage failure. The state pointer stays on the failed stage.
    pub fn fail(&mut self, details: String) {
        self.has_errored = true;
        self.error_details = Some(details);
    }

    /// Roll back to the previous boundary, clearing errors, and report what
    /// the caller must discard.
    pub fn retrigger(&mut self) -> Rollback {
        let (state, rollback) = match self.state {
            ReplayState::NotTriggered => (ReplayState::NotTriggered, Rollback::None),
            ReplayState::GatheringChangesets => {
                (ReplayState::NotTriggered, Rollback::DiscardChangesets)
            }
            ReplayState::ExtractingUpstreamAoi => {
                (ReplayState::GatheringChangesets, Rollback::None)
            }
            ReplayState::ExtractingLocalAoi => {
                (ReplayState::ExtractingUpstreamAoi, Rollback::None)
            }
            ReplayState::DetectingConflicts => {
                (ReplayState::ExtractingLocalAoi, Rollback::DiscardElements)
            }
            ReplayState::CreatingGeojsons => (ReplayState::DetectingConflicts, Rollback::None),
            // Resolution state depends on a full re-detect.
            ReplayState::ResolvingConflicts => {
                (ReplayState::ExtractingUpstreamAoi, Rollback::DiscardElements)
            }
            ReplayState::PushConflicts | ReplayState::PushedUpstream => (
                ReplayState::NotTriggered,
                Rollback::DiscardChangesetsKeepElements,
            ),
        };
        tracing::info!(from = %self.state, to = %state, ?rollback, "re-trigger rollback");
        self.state = state;
        self.is_current_state_complete = true;
        self.has_errored = false;
        self.error_details = None;
        rollback
    }

    /// Back to the initial record. The caller is responsible for clearing
    /// the element store and collected changesets.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// States from which the runner still has work to do before resolution
    /// opens, in order.
    #[must_use]
    pub fn remaining_stages(&self) -> Vec<ReplayState> {
        ReplayState::ORDER
            .iter()
            .copied()
            .filter(|s| {
                s.index() > self.state.index() && *s <= ReplayState::ResolvingConflicts
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn ordered_walk_through_all_stages() {
        let mut status = PipelineStatus::new();
        for state in ReplayState::ORDER.into_iter().skip(1) {
            status.enter(state).unwrap();
            assert!(!status.is_current_state_complete);
            status.complete();
        }
        assert_eq!(status.state, ReplayState::PushedUpstream);
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let mut status = PipelineStatus::new();
        let err = status.enter(ReplayState::ExtractingUpstreamAoi).unwrap_err();
        assert!(matches!(err, Error::StageOrder { .. }));
        assert_eq!(status.state, ReplayState::NotTriggered);
    }

    #[test]
    fn incomplete_predecessor_blocks_entry() {
        let mut status = PipelineStatus::new();
        status.enter(ReplayState::GatheringChangesets).unwrap();
        let err = status.enter(ReplayState::ExtractingUpstreamAoi).unwrap_err();
        assert!(matches!(
            err,
            Error::StageOrder {
                current_complete: false,
                ..
            }
        ));
    }

    #[test]
    fn error_parks_the_machine() {
        let mut status = PipelineStatus::new();
        status.enter(ReplayState::GatheringChangesets).unwrap();
        status.fail("connection refused".to_string());
        assert_eq!(status.state, ReplayState::GatheringChangesets);

        let err = status.enter(ReplayState::ExtractingUpstreamAoi).unwrap_err();
        assert_eq!(
            err,
            Error::Errored {
                state: ReplayState::GatheringChangesets
            }
        );
    }

    #[test]
    fn retrigger_clears_error_and_rolls_back() {
        let mut status = PipelineStatus::new();
        status.enter(ReplayState::GatheringChangesets).unwrap();
        status.fail("boom".to_string());

        let rollback = status.retrigger();
        assert_eq!(rollback, Rollback::DiscardChangesets);
        assert_eq!(status.state, ReplayState::NotTriggered);
        assert!(!status.has_errored);
        assert!(status.error_details.is_none());
        assert!(status.is_current_state_complete);
    }

    #[test]
    fn retrigger_table_matches_stage_products() {
        let case = |state: ReplayState| {
            let mut status = PipelineStatus {
                state,
                is_current_state_complete: false,
                ..PipelineStatus::default()
            };
            (status.retrigger(), status.state)
        };
        assert_eq!(
            case(ReplayState::DetectingConflicts),
            (Rollback::DiscardElements, ReplayState::ExtractingLocalAoi)
        );
        assert_eq!(
            case(ReplayState::ResolvingConflicts),
            (
                Rollback::DiscardElements,
                ReplayState::ExtractingUpstreamAoi
            )
        );
        assert_eq!(
            case(ReplayState::PushConflicts),
            (
                Rollback::DiscardChangesetsKeepElements,
                ReplayState::NotTriggered
            )
        );
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut status = PipelineStatus::new();
        status.enter(ReplayState::GatheringChangesets).unwrap();
        status.fail("x".to_string());
        status.reset();
        assert_eq!(status, PipelineStatus::default());
        assert!(!status.is_initiated());
    }

    #[test]
    fn remaining_stages_from_midway() {
        let status = PipelineStatus {
            state: ReplayState::ExtractingUpstreamAoi,
            ..PipelineStatus::default()
        };
        assert_eq!(
            status.remaining_stages(),
            alloc::vec![
                ReplayState::ExtractingLocalAoi,
                ReplayState::DetectingConflicts,
                ReplayState::CreatingGeojsons,
                ReplayState::ResolvingConflicts,
            ]
        );
    }
}

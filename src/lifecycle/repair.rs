//! Planning for the single-open-version repair procedure.
//!
//! The planner only looks at a snapshot of the version history and names the
//! next corrective action. The engine applies it and plans again until the
//! planner answers [`RepairAction::None`].

use crate::model::Version;
use crate::types::VersionId;

/// Next step required to restore "only the latest version may be modifiable".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairAction {
    /// The project has no version at all; append a blank one.
    CreateInitial,
    /// The latest version is closed; fork a new open version from it.
    ForkLatest,
    /// An earlier version is still open; discard it.
    Discard(VersionId),
    /// The invariant holds.
    None,
}

pub fn plan_repair(versions: &[Version]) -> RepairAction {
    let Some((last, earlier)) = versions.split_last() else {
        return RepairAction::CreateInitial;
    };

    if !last.status.is_modifiable() {
        return RepairAction::ForkLatest;
    }

    // Nearest open predecessor first, so the usual case (the version right
    // before the latest) is repaired in one step.
    match earlier.iter().rev().find(|v| v.status.is_modifiable()) {
        Some(stale) => RepairAction::Discard(stale.id),
        None => RepairAction::None,
    }
}

/// True when at most one version is modifiable and, if so, it is the latest.
pub fn holds_single_open_version(versions: &[Version]) -> bool {
    match versions.split_last() {
        None => true,
        Some((_, earlier)) => earlier.iter().all(|v| !v.status.is_modifiable()),
    }
}

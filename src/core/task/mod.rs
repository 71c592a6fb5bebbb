pub mod types;

pub use types::{
    BuildRecord, BuildTarget, FileKind, RecordKind, SourceFile, Task, TaskStatus, TaskUpdate,
};

/// Task status only moves forward: `waiting -> building -> {success, failure}`.
/// A task may also fail straight from `waiting` when it is rejected before any
/// build work starts. Terminal states accept nothing.
pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    match from {
        TaskStatus::Waiting => matches!(to, TaskStatus::Building | TaskStatus::Failure),
        TaskStatus::Building => matches!(to, TaskStatus::Success | TaskStatus::Failure),
        TaskStatus::Success | TaskStatus::Failure => false,
    }
}

/// Statuses from which `to` is reachable in one step.
pub fn predecessors(to: TaskStatus) -> Vec<TaskStatus> {
    TaskStatus::ALL
        .iter()
        .copied()
        .filter(|from| can_transition(*from, to))
        .collect()
}

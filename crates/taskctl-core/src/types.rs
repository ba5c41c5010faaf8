use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// The kinds of rows the store holds. Used for error messages and
/// prefix lookup routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Project,
    Plan,
    Task,
    Slot,
    PullRequest,
}

impl Entity {
    pub fn as_str(self) -> &'static str {
        match self {
            Entity::Project => "project",
            Entity::Plan => "plan",
            Entity::Task => "task",
            Entity::Slot => "slot",
            Entity::PullRequest => "pull request",
        }
    }

    pub(crate) fn table(self) -> &'static str {
        match self {
            Entity::Project => "projects",
            Entity::Plan => "plans",
            Entity::Task => "tasks",
            Entity::Slot => "slots",
            Entity::PullRequest => "prs",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PlanStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Planning,
    Ready,
    InProgress,
    Completed,
    Archived,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Planning => "planning",
            PlanStatus::Ready => "ready",
            PlanStatus::InProgress => "in_progress",
            PlanStatus::Completed => "completed",
            PlanStatus::Archived => "archived",
        }
    }

    /// Archived and completed plans accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Archived)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanStatus {
    type Err = crate::error::TaskctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PlanStatus::Draft),
            "planning" => Ok(PlanStatus::Planning),
            "ready" => Ok(PlanStatus::Ready),
            "in_progress" => Ok(PlanStatus::InProgress),
            "completed" => Ok(PlanStatus::Completed),
            "archived" => Ok(PlanStatus::Archived),
            _ => Err(crate::error::TaskctlError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Assigned,
    InProgress,
    PrCreated,
    InReview,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::PrCreated => "pr_created",
            TaskStatus::InReview => "in_review",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }

    /// Statuses in which the task holds a branch and (in the pool model)
    /// a slot. A task's `branch_name` must be set exactly while active.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TaskStatus::Assigned
                | TaskStatus::InProgress
                | TaskStatus::PrCreated
                | TaskStatus::InReview
        )
    }

    /// Statuses from which the scheduler may pick the task up.
    pub fn is_schedulable(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Ready)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::error::TaskctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "ready" => Ok(TaskStatus::Ready),
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "pr_created" => Ok(TaskStatus::PrCreated),
            "in_review" => Ok(TaskStatus::InReview),
            "completed" => Ok(TaskStatus::Completed),
            "blocked" => Ok(TaskStatus::Blocked),
            _ => Err(crate::error::TaskctlError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// SlotStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Assigned,
    InProgress,
    PrPending,
    Completed,
    Error,
}

impl SlotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Assigned => "assigned",
            SlotStatus::InProgress => "in_progress",
            SlotStatus::PrPending => "pr_pending",
            SlotStatus::Completed => "completed",
            SlotStatus::Error => "error",
        }
    }

    pub fn is_active(self) -> bool {
        matches!(
            self,
            SlotStatus::Assigned
                | SlotStatus::InProgress
                | SlotStatus::PrPending
                | SlotStatus::Completed
        )
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SlotStatus {
    type Err = crate::error::TaskctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SlotStatus::Available),
            "assigned" => Ok(SlotStatus::Assigned),
            "in_progress" => Ok(SlotStatus::InProgress),
            "pr_pending" => Ok(SlotStatus::PrPending),
            "completed" => Ok(SlotStatus::Completed),
            "error" => Ok(SlotStatus::Error),
            _ => Err(crate::error::TaskctlError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// PrStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrStatus {
    Draft,
    Open,
    InReview,
    Approved,
    Merged,
    Closed,
}

impl PrStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PrStatus::Draft => "draft",
            PrStatus::Open => "open",
            PrStatus::InReview => "in_review",
            PrStatus::Approved => "approved",
            PrStatus::Merged => "merged",
            PrStatus::Closed => "closed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PrStatus::Merged | PrStatus::Closed)
    }
}

impl fmt::Display for PrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrStatus {
    type Err = crate::error::TaskctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PrStatus::Draft),
            "open" => Ok(PrStatus::Open),
            "in_review" => Ok(PrStatus::InReview),
            "approved" => Ok(PrStatus::Approved),
            "merged" => Ok(PrStatus::Merged),
            "closed" => Ok(PrStatus::Closed),
            _ => Err(crate::error::TaskctlError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn task_status_roundtrip() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::Ready,
            TaskStatus::Assigned,
            TaskStatus::InProgress,
            TaskStatus::PrCreated,
            TaskStatus::InReview,
            TaskStatus::Completed,
            TaskStatus::Blocked,
        ] {
            assert_eq!(TaskStatus::from_str(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn active_statuses_hold_a_branch() {
        assert!(TaskStatus::Assigned.is_active());
        assert!(TaskStatus::InReview.is_active());
        assert!(!TaskStatus::Ready.is_active());
        assert!(!TaskStatus::Completed.is_active());
    }

    #[test]
    fn unknown_status_rejected() {
        assert!(TaskStatus::from_str("done").is_err());
        assert!(PlanStatus::from_str("active").is_err());
        assert!(SlotStatus::from_str("busy").is_err());
        assert!(PrStatus::from_str("MERGED").is_err());
    }

    #[test]
    fn plan_terminal_states() {
        assert!(PlanStatus::Archived.is_terminal());
        assert!(PlanStatus::Completed.is_terminal());
        assert!(!PlanStatus::InProgress.is_terminal());
    }
}

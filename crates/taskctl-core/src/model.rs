//! Entity structs mirrored 1:1 by the store's tables.
//!
//! `Task::slot_id` is derived: the owning relation is `slots.task_id`, and
//! the store fills the task-side reference with a subquery on read. No row
//! ever persists both pointers.

use crate::types::{PlanStatus, PrStatus, SlotStatus, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One managed repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Absolute path to the repository root; unique across projects.
    pub repo_path: String,
    pub remote_url: Option<String>,
    pub main_branch: String,
    /// Upper bound on concurrently active tasks. `None` falls back to the
    /// global config default.
    pub max_concurrent: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cohesive unit of work owned by a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    /// The base branch task branches fork from and PRs merge into.
    pub source_branch: String,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The unit of scheduling; corresponds to one pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub plan_id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    /// Longest dependency-chain distance from a root.
    pub level: u32,
    pub estimated_lines: Option<u32>,
    /// Set exactly while the status is active (assigned through in_review).
    pub branch_name: Option<String>,
    /// Derived from `slots.task_id` on read; never written on this row.
    pub slot_id: Option<String>,
    /// Opaque implementer-session annotation; lookup only, never scheduled on.
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A directed edge: `task_id` depends on `depends_on_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: String,
    pub depends_on_id: String,
}

/// A reusable execution workspace (git worktree) bound to a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    pub project_id: String,
    pub name: String,
    /// Absolute worktree path on disk.
    pub path: String,
    pub branch: Option<String>,
    pub status: SlotStatus,
    /// The owning side of the task↔slot relation.
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Forge-side artefact bound 1:1 to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: String,
    pub task_id: String,
    pub number: i64,
    pub url: String,
    pub status: PrStatus,
    pub base_branch: String,
    pub head_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

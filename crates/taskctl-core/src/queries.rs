//! Read-only projections shared by the CLI and the MCP query server.
//!
//! Every function is a pure view over the current store snapshot. Identity
//! arguments accept unique prefixes; a colliding prefix surfaces as
//! `Ambiguous` and is never silently resolved.

use crate::error::Result;
use crate::model::{Plan, PullRequest, Task, TaskDependency};
use crate::store::Store;
use crate::types::{Entity, PlanStatus, TaskStatus};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub percent: f64,
}

#[derive(Debug, Serialize)]
pub struct PlanWithProgress {
    #[serde(flatten)]
    pub plan: Plan,
    pub tasks: Vec<Task>,
    pub edges: Vec<TaskDependency>,
    pub progress: Progress,
}

/// Compressed neighbour view used in task projections.
#[derive(Debug, Clone, Serialize)]
pub struct TaskNeighbour {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
}

#[derive(Debug, Serialize)]
pub struct PlanHeader {
    pub id: String,
    pub title: String,
    pub status: PlanStatus,
    pub source_branch: String,
}

#[derive(Debug, Serialize)]
pub struct TaskWithNeighbours {
    #[serde(flatten)]
    pub task: Task,
    pub dependencies: Vec<TaskNeighbour>,
    pub dependents: Vec<TaskNeighbour>,
    pub pull_request: Option<PullRequest>,
    pub plan: PlanHeader,
}

#[derive(Debug, Serialize)]
pub struct CurrentTask {
    #[serde(flatten)]
    pub task: Task,
    pub dependencies: Vec<TaskNeighbour>,
    pub pull_request: Option<PullRequest>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub plan: Option<String>,
    pub status: Option<TaskStatus>,
    pub level: Option<u32>,
}

fn neighbour(task: &Task) -> TaskNeighbour {
    TaskNeighbour {
        id: task.id.clone(),
        title: task.title.clone(),
        status: task.status,
    }
}

fn progress_of(tasks: &[Task]) -> Progress {
    let total = tasks.len();
    let completed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let in_progress = tasks.iter().filter(|t| t.status.is_active()).count();
    Progress {
        total,
        completed,
        in_progress,
        pending: total - completed - in_progress,
        percent: if total == 0 {
            0.0
        } else {
            completed as f64 * 100.0 / total as f64
        },
    }
}

/// Plan attributes, every task, every edge, and the progress tuple.
pub fn plan_with_progress(store: &Store, plan_ref: &str) -> Result<PlanWithProgress> {
    let plan_id = store.find_by_prefix(Entity::Plan, plan_ref)?;
    let plan = store.get_plan(&plan_id)?;
    let tasks = store.list_plan_tasks(&plan_id)?;
    let edges = store.list_plan_edges(&plan_id)?;
    let progress = progress_of(&tasks);
    Ok(PlanWithProgress {
        plan,
        tasks,
        edges,
        progress,
    })
}

/// A task with its dependencies, dependents, PR, and plan header.
pub fn task_with_neighbours(store: &Store, task_ref: &str) -> Result<TaskWithNeighbours> {
    let task_id = store.find_by_prefix(Entity::Task, task_ref)?;
    let task = store.get_task(&task_id)?;
    let dependencies = store
        .get_dependencies(&task_id)?
        .iter()
        .map(neighbour)
        .collect();
    let dependents = store
        .get_dependents(&task_id)?
        .iter()
        .map(neighbour)
        .collect();
    let pull_request = store.get_pr_by_task(&task_id)?;
    let plan = store.get_plan(&task.plan_id)?;
    Ok(TaskWithNeighbours {
        task,
        dependencies,
        dependents,
        pull_request,
        plan: PlanHeader {
            id: plan.id,
            title: plan.title,
            status: plan.status,
            source_branch: plan.source_branch,
        },
    })
}

/// Locate the task an implementer is working on: session id first, branch
/// name second. `None` when neither matches.
pub fn current_task(
    store: &Store,
    branch: Option<&str>,
    session: Option<&str>,
) -> Result<Option<CurrentTask>> {
    let task = match session.and_then(|sid| store.get_task_by_session_id(sid).transpose()) {
        Some(found) => Some(found?),
        None => match branch.and_then(|b| store.get_task_by_branch_name(b).transpose()) {
            Some(found) => Some(found?),
            None => None,
        },
    };
    let Some(task) = task else {
        return Ok(None);
    };
    let dependencies = store
        .get_dependencies(&task.id)?
        .iter()
        .map(neighbour)
        .collect();
    let pull_request = store.get_pr_by_task(&task.id)?;
    Ok(Some(CurrentTask {
        task,
        dependencies,
        pull_request,
    }))
}

pub fn list_tasks(store: &Store, filter: &TaskFilter) -> Result<Vec<Task>> {
    let plan_id = match &filter.plan {
        Some(plan_ref) => Some(store.find_by_prefix(Entity::Plan, plan_ref)?),
        None => None,
    };
    store.list_tasks(plan_id.as_deref(), filter.status, filter.level)
}

pub fn list_plans(store: &Store, status: Option<PlanStatus>) -> Result<Vec<Plan>> {
    store.list_plans(None, status)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

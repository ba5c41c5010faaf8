//! The scheduler: maps ready tasks onto available slots under the
//! concurrency cap and drives task/slot/plan transitions.
//!
//! All cached state is derivable from the store and lives for one
//! invocation. `next_batch` is pure; `assign` performs the git work first
//! and persists each pairing in a single store transaction, so a failure
//! surfaces with the store and in-memory state untouched for that pairing.

use crate::error::{Result, TaskctlError};
use crate::git::Git;
use crate::graph::{self, DepGraph};
use crate::id::short;
use crate::model::{Plan, Project, Slot, Task};
use crate::store::Store;
use crate::types::{PlanStatus, SlotStatus, TaskStatus};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

const SLUG_MAX: usize = 30;

pub struct Scheduler<'a> {
    pub store: &'a Store,
    pub git: &'a Git,
    pub project: &'a Project,
    pub plan: &'a Plan,
    /// Effective concurrency cap (project override or config default).
    pub max_concurrent: u32,
}

/// Per-invocation cache of the plan's coordination state.
#[derive(Debug)]
pub struct SchedulerState {
    graph: DepGraph,
    statuses: HashMap<String, TaskStatus>,
    completed: BTreeSet<String>,
    in_progress: BTreeSet<String>,
    assignment: BTreeMap<String, String>,
}

/// One ready-task / available-slot pairing produced by `next_batch`.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub task: Task,
    pub slot: Slot,
    pub branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub percent: f64,
}

/// `feature/<plan-short>/<task-short>-<slug>`. Slug collisions are fine;
/// the short ids disambiguate.
pub fn branch_name(plan_id: &str, task: &Task) -> String {
    format!(
        "feature/{}/{}-{}",
        short(plan_id),
        short(&task.id),
        slugify(&task.title)
    )
}

/// Lowercase, runs of non-alphanumerics collapsed to `-`, trimmed, capped.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(SLUG_MAX);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

impl<'a> Scheduler<'a> {
    pub fn new(
        store: &'a Store,
        git: &'a Git,
        project: &'a Project,
        plan: &'a Plan,
        default_max_concurrent: u32,
    ) -> Self {
        let max_concurrent = project.max_concurrent.unwrap_or(default_max_concurrent);
        Self {
            store,
            git,
            project,
            plan,
            max_concurrent,
        }
    }

    /// Read the plan's tasks and edges, build the graph, and partition the
    /// task statuses into the cached sets. Also repairs half-applied
    /// assignments left by an earlier crash.
    pub fn initialize(&self) -> Result<SchedulerState> {
        let repaired = self.store.reconcile_assignments(&self.project.id)?;
        for task_id in &repaired {
            warn!(task = short(task_id), "reconciled half-assigned task");
        }

        let tasks = self.store.list_plan_tasks(&self.plan.id)?;
        let edges = self.store.list_plan_edges(&self.plan.id)?;
        let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let graph = graph::build(&ids, &edges)?;

        let mut state = SchedulerState {
            graph,
            statuses: HashMap::new(),
            completed: BTreeSet::new(),
            in_progress: BTreeSet::new(),
            assignment: BTreeMap::new(),
        };
        for task in &tasks {
            state.statuses.insert(task.id.clone(), task.status);
            if task.status == TaskStatus::Completed {
                state.completed.insert(task.id.clone());
            } else if task.status.is_active() {
                state.in_progress.insert(task.id.clone());
                if let Some(slot_id) = &task.slot_id {
                    state.assignment.insert(task.id.clone(), slot_id.clone());
                }
            }
        }
        debug!(
            total = state.graph.len(),
            completed = state.completed.len(),
            in_progress = state.in_progress.len(),
            "scheduler initialized"
        );
        Ok(state)
    }

    /// Compute the next batch of pairings without applying anything.
    /// Ready tasks come ordered (level, id); slots by name; the batch is
    /// capped at `min(max_concurrent - in_progress, slots, ready)`.
    pub fn next_batch(&self, state: &SchedulerState) -> Result<Vec<ScheduledTask>> {
        let headroom = (self.max_concurrent as usize).saturating_sub(state.in_progress.len());
        if headroom == 0 {
            return Ok(Vec::new());
        }

        let ready: Vec<String> = state
            .graph
            .ready_set(&state.statuses, &state.completed)
            .into_iter()
            .filter(|id| !state.in_progress.contains(id))
            .collect();
        let slots = self
            .store
            .list_slots(&self.project.id, Some(SlotStatus::Available))?;

        let count = headroom.min(slots.len()).min(ready.len());
        let mut batch = Vec::with_capacity(count);
        for (task_id, slot) in ready.into_iter().zip(slots).take(count) {
            let task = self.store.get_task(&task_id)?;
            let branch = branch_name(&self.plan.id, &task);
            batch.push(ScheduledTask { task, slot, branch });
        }
        Ok(batch)
    }

    /// Apply pairings: per pairing, prepare the branch in the slot's
    /// worktree, then flip task and slot to `assigned` in one store
    /// transaction. The first failure aborts and surfaces; already-applied
    /// pairings stay persisted and consistent.
    pub fn assign(&self, state: &mut SchedulerState, batch: &[ScheduledTask]) -> Result<()> {
        for scheduled in batch {
            self.prepare_branch(scheduled)?;
            self.store
                .assign_task(&scheduled.task.id, &scheduled.slot.id, &scheduled.branch)?;

            let task_id = scheduled.task.id.clone();
            state.statuses.insert(task_id.clone(), TaskStatus::Assigned);
            state.in_progress.insert(task_id.clone());
            state.assignment.insert(task_id, scheduled.slot.id.clone());
            info!(
                task = short(&scheduled.task.id),
                slot = %scheduled.slot.name,
                branch = %scheduled.branch,
                "assigned"
            );
        }
        Ok(())
    }

    /// Put the slot on the plan's source branch (detached, since the main
    /// checkout owns the branch itself), then create the task branch from
    /// it. If creation fails the branch may survive from an earlier run:
    /// fall back to a plain checkout, but only when the store confirms no
    /// other task owns that branch name.
    fn prepare_branch(&self, scheduled: &ScheduledTask) -> Result<()> {
        let dir = Path::new(&scheduled.slot.path);
        self.git.checkout_detached(dir, &self.plan.source_branch)?;
        match self
            .git
            .create_branch(dir, &scheduled.branch, Some(&self.plan.source_branch))
        {
            Ok(()) => Ok(()),
            Err(create_err) => {
                if let Some(owner) = self.store.get_task_by_branch_name(&scheduled.branch)? {
                    if owner.id != scheduled.task.id {
                        return Err(TaskctlError::Conflict(format!(
                            "branch '{}' already belongs to task {}",
                            scheduled.branch,
                            short(&owner.id)
                        )));
                    }
                }
                match self.git.checkout_branch(dir, &scheduled.branch) {
                    Ok(()) => Ok(()),
                    Err(_) => Err(create_err),
                }
            }
        }
    }

    /// Explicit promotion `assigned → in_progress` (the CLI `task start`
    /// path; the scheduler never does this implicitly).
    pub fn start(&self, state: &mut SchedulerState, task_id: &str) -> Result<()> {
        self.store.start_task(task_id)?;
        state
            .statuses
            .insert(task_id.to_string(), TaskStatus::InProgress);
        Ok(())
    }

    pub fn mark_pr_created(
        &self,
        state: &mut SchedulerState,
        task_id: &str,
        pr: &crate::store::NewPullRequest,
    ) -> Result<()> {
        self.store.mark_task_pr_created(task_id, pr)?;
        state
            .statuses
            .insert(task_id.to_string(), TaskStatus::PrCreated);
        Ok(())
    }

    /// Finish a task: store transition (slot freed inside), cache update,
    /// and promotion of any dependent whose dependencies are now complete.
    pub fn complete(&self, state: &mut SchedulerState, task_id: &str) -> Result<()> {
        self.store.complete_task(task_id, false)?;
        self.apply_completion(state, task_id);
        Ok(())
    }

    fn apply_completion(&self, state: &mut SchedulerState, task_id: &str) {
        state
            .statuses
            .insert(task_id.to_string(), TaskStatus::Completed);
        state.in_progress.remove(task_id);
        state.assignment.remove(task_id);
        state.completed.insert(task_id.to_string());

        let dependents: Vec<String> = state.graph.dependents_of(task_id).to_vec();
        for dependent in dependents {
            let unmet = state
                .graph
                .dependencies_of(&dependent)
                .iter()
                .any(|dep| !state.completed.contains(dep));
            if !unmet && state.statuses.get(&dependent) == Some(&TaskStatus::Pending) {
                state
                    .statuses
                    .insert(dependent.clone(), TaskStatus::Ready);
            }
        }
    }

    /// Move the plan along with its tasks: `completed` once every task is
    /// done, `in_progress` as soon as any work has started.
    pub fn update_plan_progress(&self, state: &SchedulerState) -> Result<()> {
        let plan = self.store.get_plan(&self.plan.id)?;
        let total = state.graph.len();
        if total > 0 && state.completed.len() == total {
            if plan.status != PlanStatus::Completed {
                self.store
                    .set_plan_status(&self.plan.id, PlanStatus::Completed)?;
            }
        } else if !state.in_progress.is_empty() || !state.completed.is_empty() {
            if plan.status == PlanStatus::Ready {
                self.store
                    .set_plan_status(&self.plan.id, PlanStatus::InProgress)?;
            }
        }
        Ok(())
    }

    pub fn has_work_available(&self, state: &SchedulerState) -> bool {
        !state
            .graph
            .ready_set(&state.statuses, &state.completed)
            .iter()
            .all(|id| state.in_progress.contains(id))
    }

    pub fn is_complete(&self, state: &SchedulerState) -> bool {
        let total = state.graph.len();
        total > 0 && state.completed.len() == total
    }

    pub fn progress(&self, state: &SchedulerState) -> Progress {
        progress_of(state)
    }
}

fn progress_of(state: &SchedulerState) -> Progress {
    let total = state.graph.len();
    let completed = state.completed.len();
    let in_progress = state.in_progress.len();
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

impl SchedulerState {
    pub fn graph(&self) -> &DepGraph {
        &self.graph
    }

    pub fn completed(&self) -> &BTreeSet<String> {
        &self.completed
    }

    pub fn in_progress(&self) -> &BTreeSet<String> {
        &self.in_progress
    }

    pub fn slot_of(&self, task_id: &str) -> Option<&str> {
        self.assignment.get(task_id).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

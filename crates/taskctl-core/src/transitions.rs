//! Lifecycle edges for every entity, checked before any row changes.
//!
//! The store's transactional operations call these on the (from, to) pair
//! read inside the transaction; an out-of-band change surfaces as
//! `InvalidTransition` and the transaction never commits. Same-state
//! updates are the caller's no-op, not an edge.

use crate::error::{Result, TaskctlError};
use crate::types::{PlanStatus, PrStatus, SlotStatus, TaskStatus};

pub fn plan_transition(from: PlanStatus, to: PlanStatus) -> Result<()> {
    use PlanStatus::*;
    let ok = match (from, to) {
        (Draft, Planning) => true,
        // Restored after a failed planner run.
        (Planning, Draft) => true,
        (Planning, Ready) => true,
        (Ready, InProgress) => true,
        // Force-completing every task can finish a plan that never left ready.
        (Ready, Completed) => true,
        (InProgress, Completed) => true,
        // Archive is a sink from any non-terminal state.
        (f, Archived) if !f.is_terminal() => true,
        _ => false,
    };
    check(ok, "plan", from.as_str(), to.as_str())
}

pub fn task_transition(from: TaskStatus, to: TaskStatus) -> Result<()> {
    use TaskStatus::*;
    let ok = match (from, to) {
        (Pending, Ready) => true,
        (Pending | Ready, Blocked) => true,
        (Blocked, Pending) => true,
        (Ready, Assigned) => true,
        (Assigned, InProgress) => true,
        // Administrative release back to the ready pool.
        (Assigned | InProgress, Ready) => true,
        (InProgress, PrCreated) => true,
        (PrCreated, InReview) => true,
        // A PR may merge without a review decision ever being recorded.
        (PrCreated | InReview, Completed) => true,
        _ => false,
    };
    check(ok, "task", from.as_str(), to.as_str())
}

/// Edges additionally permitted when an administrator forces completion.
pub fn task_force_complete(from: TaskStatus) -> Result<()> {
    if from.is_active() || from == TaskStatus::Ready {
        Ok(())
    } else {
        check(false, "task", from.as_str(), TaskStatus::Completed.as_str())
    }
}

pub fn slot_transition(from: SlotStatus, to: SlotStatus) -> Result<()> {
    use SlotStatus::*;
    let ok = match (from, to) {
        (Available, Assigned) => true,
        (Assigned, InProgress) => true,
        (InProgress, PrPending) => true,
        (PrPending, Completed) => true,
        (Completed, Available) => true,
        // Releasing a task frees its slot without walking the whole cycle.
        (Assigned | InProgress, Available) => true,
        (f, Error) if f.is_active() => true,
        (Error, Available) => true,
        _ => false,
    };
    check(ok, "slot", from.as_str(), to.as_str())
}

pub fn pr_transition(from: PrStatus, to: PrStatus) -> Result<()> {
    use PrStatus::*;
    let ok = match (from, to) {
        (Draft, Open) => true,
        (Open, InReview | Approved | Merged | Closed) => true,
        (InReview, Approved | Merged | Closed) => true,
        // New commits can re-request changes on an approved PR.
        (Approved, InReview | Merged | Closed) => true,
        _ => false,
    };
    check(ok, "pull request", from.as_str(), to.as_str())
}

fn check(ok: bool, entity: &'static str, from: &str, to: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(TaskctlError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

use crate::context::Ctx;
use crate::output::{print_json, print_table};
use anyhow::Context as _;
use std::path::Path;
use taskctl_core::forge::{translate_status, Forge};
use taskctl_core::id::short;
use taskctl_core::scheduler::Scheduler;
use taskctl_core::types::Entity;

/// Poll the forge for every non-terminal PR of the plan, translate its state,
/// and apply the resulting transitions (merged PRs complete their tasks and
/// free dependents).
pub fn run(plan_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let plan_id = ctx.store.find_by_prefix(Entity::Plan, plan_ref)?;
    let plan = ctx.store.get_plan(&plan_id)?;
    let project = ctx.store.get_project(&plan.project_id)?;
    let repo = Path::new(&project.repo_path);

    let forge = Forge::new(ctx.cancel.clone());
    forge
        .availability_check(repo)
        .context("forge CLI unavailable")?;

    let mut changes: Vec<(String, String, String)> = Vec::new();
    for pr in ctx.store.list_plan_prs(&plan_id)? {
        if pr.status.is_terminal() {
            continue;
        }
        let view = forge.get_pr(repo, pr.number)?;
        let status = translate_status(&view);
        if status != pr.status {
            ctx.store.apply_pr_status(&pr.task_id, status)?;
            changes.push((pr.task_id.clone(), pr.status.to_string(), status.to_string()));
        }
    }

    let git = ctx.git();
    let scheduler = Scheduler::new(
        &ctx.store,
        &git,
        &project,
        &plan,
        ctx.config.default_max_concurrent,
    );
    let state = scheduler.initialize()?;
    scheduler.update_plan_progress(&state)?;

    if json {
        let items: Vec<serde_json::Value> = changes
            .iter()
            .map(|(task, from, to)| {
                serde_json::json!({ "task_id": task, "from": from, "to": to })
            })
            .collect();
        return print_json(&items);
    }
    if changes.is_empty() {
        println!("Everything already in sync.");
        return Ok(());
    }
    let rows = changes
        .into_iter()
        .map(|(task, from, to)| vec![short(&task).to_string(), from, to])
        .collect();
    print_table(&["TASK", "FROM", "TO"], rows);
    Ok(())
}

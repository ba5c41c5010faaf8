use crate::context::Ctx;
use crate::output::{print_json, print_table};
use taskctl_core::id::short;
use taskctl_core::scheduler::Scheduler;
use taskctl_core::types::Entity;

pub fn run(plan_ref: &str, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let plan_id = ctx.store.find_by_prefix(Entity::Plan, plan_ref)?;
    let plan = ctx.store.get_plan(&plan_id)?;
    let project = ctx.store.get_project(&plan.project_id)?;
    let git = ctx.git();

    let scheduler = Scheduler::new(
        &ctx.store,
        &git,
        &project,
        &plan,
        ctx.config.default_max_concurrent,
    );
    let mut state = scheduler.initialize()?;
    let batch = scheduler.next_batch(&state)?;

    if !dry_run {
        scheduler.assign(&mut state, &batch)?;
        scheduler.update_plan_progress(&state)?;
    }

    if json {
        let items: Vec<serde_json::Value> = batch
            .iter()
            .map(|s| {
                serde_json::json!({
                    "task_id": s.task.id,
                    "slot_id": s.slot.id,
                    "branch": s.branch,
                    "applied": !dry_run,
                })
            })
            .collect();
        return print_json(&items);
    }

    if batch.is_empty() {
        let progress = scheduler.progress(&state);
        println!(
            "Nothing to schedule ({}/{} completed, {} in progress).",
            progress.completed, progress.total, progress.in_progress
        );
        return Ok(());
    }

    let verb = if dry_run { "Would assign" } else { "Assigned" };
    println!("{verb} {} task(s):", batch.len());
    let rows = batch
        .iter()
        .map(|s| {
            vec![
                short(&s.task.id).to_string(),
                s.task.title.clone(),
                s.slot.name.clone(),
                s.branch.clone(),
            ]
        })
        .collect();
    print_table(&["TASK", "TITLE", "SLOT", "BRANCH"], rows);
    Ok(())
}

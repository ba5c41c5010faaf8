use crate::context::Ctx;
use crate::output::{print_json, print_table};
use taskctl_core::id::short;
use taskctl_core::queries;

pub fn run(plan_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let view = queries::plan_with_progress(&ctx.store, plan_ref)?;

    if json {
        return print_json(&view);
    }

    println!(
        "Plan: {} ({}) [{}]",
        view.plan.title,
        short(&view.plan.id),
        view.plan.status
    );
    println!(
        "Progress: {}/{} completed, {} in progress, {} pending ({:.0}%)",
        view.progress.completed,
        view.progress.total,
        view.progress.in_progress,
        view.progress.pending,
        view.progress.percent
    );
    if view.tasks.is_empty() {
        return Ok(());
    }
    println!();
    let rows = view
        .tasks
        .iter()
        .map(|t| {
            vec![
                short(&t.id).to_string(),
                t.level.to_string(),
                t.status.to_string(),
                t.branch_name.clone().unwrap_or_default(),
                t.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "LEVEL", "STATUS", "BRANCH", "TITLE"], rows);
    Ok(())
}

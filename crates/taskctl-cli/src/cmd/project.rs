use crate::context::Ctx;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use taskctl_core::id::short;
use taskctl_core::types::Entity;

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// List registered projects
    List,
    /// Remove a project and everything it owns (plans, tasks, slots, PRs)
    Remove { project: String },
}

pub fn run(subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ProjectSubcommand::List => list(json),
        ProjectSubcommand::Remove { project } => remove(&project, json),
    }
}

fn list(json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let projects = ctx.store.list_projects()?;

    if json {
        return print_json(&projects);
    }
    if projects.is_empty() {
        println!("No projects registered.");
        return Ok(());
    }
    let rows = projects
        .iter()
        .map(|p| {
            vec![
                short(&p.id).to_string(),
                p.name.clone(),
                p.repo_path.clone(),
                p.main_branch.clone(),
                p.max_concurrent
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "PATH", "MAIN", "CONCURRENCY"], rows);
    Ok(())
}

fn remove(project_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let id = ctx.store.find_by_prefix(Entity::Project, project_ref)?;
    ctx.store.delete_project(&id)?;

    if json {
        print_json(&serde_json::json!({ "removed": id }))?;
    } else {
        println!("Removed project {}", short(&id));
    }
    Ok(())
}

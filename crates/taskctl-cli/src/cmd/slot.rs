use crate::context::Ctx;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use taskctl_core::id::short;
use taskctl_core::types::Entity;

#[derive(Subcommand)]
pub enum SlotSubcommand {
    /// Create worktree slots for the current project
    Add {
        /// How many slots to create
        #[arg(long, default_value = "1")]
        count: u32,
    },
    /// List slots for the current project
    List,
    /// Remove an idle slot and its worktree
    Remove { slot: String },
    /// Return an errored slot to the available pool
    Reset { slot: String },
}

pub fn run(subcmd: SlotSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SlotSubcommand::Add { count } => add(count, json),
        SlotSubcommand::List => list(json),
        SlotSubcommand::Remove { slot } => remove(&slot, json),
        SlotSubcommand::Reset { slot } => reset(&slot, json),
    }
}

/// Worktrees live beside the repository: `<parent>/<repo-name>-slots/<name>`.
fn slots_dir(repo_path: &Path) -> PathBuf {
    let name = repo_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".into());
    repo_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{name}-slots"))
}

fn add(count: u32, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let project = ctx.current_project()?;
    let repo = Path::new(&project.repo_path);
    let git = ctx.git();

    let existing = ctx.store.list_slots(&project.id, None)?;
    let mut next_index = existing.len() as u32 + 1;
    let mut created = Vec::new();
    for _ in 0..count {
        let name = format!("slot-{next_index}");
        let path = slots_dir(repo).join(&name);
        git.add_worktree(repo, &path, None)?;
        let slot = ctx
            .store
            .create_slot(&project.id, &name, &path.to_string_lossy())?;
        created.push(slot);
        next_index += 1;
    }

    if json {
        print_json(&created)?;
    } else {
        for slot in &created {
            println!("Created slot {} at {}", slot.name, slot.path);
        }
    }
    Ok(())
}

fn list(json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let project = ctx.current_project()?;
    let slots = ctx.store.list_slots(&project.id, None)?;

    if json {
        return print_json(&slots);
    }
    if slots.is_empty() {
        println!("No slots. Create some with 'taskctl slot add'.");
        return Ok(());
    }
    let rows = slots
        .iter()
        .map(|s| {
            vec![
                short(&s.id).to_string(),
                s.name.clone(),
                s.status.to_string(),
                s.task_id.as_deref().map(short).unwrap_or("-").to_string(),
                s.branch.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "STATUS", "TASK", "BRANCH"], rows);
    Ok(())
}

fn remove(slot_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let project = ctx.current_project()?;
    let id = ctx.store.find_by_prefix(Entity::Slot, slot_ref)?;
    let slot = ctx.store.get_slot(&id)?;

    // Store first: an active slot refuses deletion before git runs.
    ctx.store.delete_slot(&id)?;
    let git = ctx.git();
    let repo = Path::new(&project.repo_path);
    if Path::new(&slot.path).exists() {
        git.remove_worktree(repo, Path::new(&slot.path))?;
    }
    git.prune_worktrees(repo)?;

    if json {
        print_json(&serde_json::json!({ "removed": id }))?;
    } else {
        println!("Removed slot {}", slot.name);
    }
    Ok(())
}

fn reset(slot_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let id = ctx.store.find_by_prefix(Entity::Slot, slot_ref)?;
    let slot = ctx.store.reset_slot(&id)?;

    if json {
        print_json(&slot)?;
    } else {
        println!("Slot {} is available again", slot.name);
    }
    Ok(())
}

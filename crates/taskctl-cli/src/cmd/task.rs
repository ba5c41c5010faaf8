use crate::context::Ctx;
use crate::output::{print_json, print_table};
use anyhow::Context as _;
use clap::Subcommand;
use std::path::Path;
use taskctl_core::forge::{CreatePr, Forge};
use taskctl_core::id::short;
use taskctl_core::queries::{self, TaskFilter};
use taskctl_core::store::NewPullRequest;
use taskctl_core::types::{Entity, TaskStatus};
use taskctl_core::TaskctlError;

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// List tasks, optionally filtered
    List {
        #[arg(long)]
        plan: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        level: Option<u32>,
    },
    /// Show one task with dependencies, dependents, and PR
    Show { task: String },
    /// Start an assigned task (it begins counting as in progress)
    Start { task: String },
    /// Attach or clear the implementer session id on a task
    Attach {
        task: String,
        /// Session identifier; omit to clear
        #[arg(long)]
        session: Option<String>,
    },
    /// Release an active task back to the ready pool, freeing its slot
    Release { task: String },
    /// Mark a schedulable task as blocked
    Block { task: String },
    /// Return a blocked task to pending
    Unblock { task: String },
    /// Push the task branch and open a PR on the forge
    Pr {
        task: String,
        /// PR title (default: task title)
        #[arg(long)]
        title: Option<String>,
        /// PR body (default: task description)
        #[arg(long)]
        body: Option<String>,
        /// Open as a draft PR
        #[arg(long)]
        draft: bool,
    },
    /// Complete a task (requires a merged PR unless forced)
    Complete {
        task: String,
        /// Administrative override: complete without a merged PR
        #[arg(long)]
        force: bool,
    },
    /// Delete a task and its dependency edges (active tasks must be released first)
    Remove { task: String },
}

pub fn run(subcmd: TaskSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TaskSubcommand::List {
            plan,
            status,
            level,
        } => list(plan, status.as_deref(), level, json),
        TaskSubcommand::Show { task } => show(&task, json),
        TaskSubcommand::Start { task } => start(&task, json),
        TaskSubcommand::Attach { task, session } => attach(&task, session.as_deref(), json),
        TaskSubcommand::Release { task } => release(&task, json),
        TaskSubcommand::Block { task } => block(&task, json),
        TaskSubcommand::Unblock { task } => unblock(&task, json),
        TaskSubcommand::Pr {
            task,
            title,
            body,
            draft,
        } => create_pr(&task, title.as_deref(), body.as_deref(), draft, json),
        TaskSubcommand::Complete { task, force } => complete(&task, force, json),
        TaskSubcommand::Remove { task } => remove(&task, json),
    }
}

fn list(
    plan: Option<String>,
    status: Option<&str>,
    level: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let filter = TaskFilter {
        plan,
        status: status.map(str::parse::<TaskStatus>).transpose()?,
        level,
    };
    let tasks = queries::list_tasks(&ctx.store, &filter)?;

    if json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    let rows = tasks
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

fn show(task_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let view = queries::task_with_neighbours(&ctx.store, task_ref)?;

    if json {
        return print_json(&view);
    }
    println!("Task: {} ({})", view.task.title, short(&view.task.id));
    println!("Plan:    {} ({})", view.plan.title, short(&view.plan.id));
    println!("Status:  {}", view.task.status);
    println!("Level:   {}", view.task.level);
    if let Some(branch) = &view.task.branch_name {
        println!("Branch:  {}", branch);
    }
    if let Some(session) = &view.task.session_id {
        println!("Session: {}", session);
    }
    if let Some(pr) = &view.pull_request {
        println!("PR:      #{} {} ({})", pr.number, pr.url, pr.status);
    }
    if !view.dependencies.is_empty() {
        println!("Depends on:");
        for dep in &view.dependencies {
            println!("  {} [{}] {}", short(&dep.id), dep.status, dep.title);
        }
    }
    if !view.dependents.is_empty() {
        println!("Unblocks:");
        for dep in &view.dependents {
            println!("  {} [{}] {}", short(&dep.id), dep.status, dep.title);
        }
    }
    Ok(())
}

fn start(task_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let id = ctx.store.find_by_prefix(Entity::Task, task_ref)?;
    ctx.store.start_task(&id)?;
    done(json, &id, "in_progress")
}

fn attach(task_ref: &str, session: Option<&str>, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let id = ctx.store.find_by_prefix(Entity::Task, task_ref)?;
    let task = ctx.store.set_task_session(&id, session)?;
    if json {
        print_json(&task)?;
    } else {
        match session {
            Some(sid) => println!("Attached session '{sid}' to task {}", short(&id)),
            None => println!("Cleared session on task {}", short(&id)),
        }
    }
    Ok(())
}

fn release(task_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let id = ctx.store.find_by_prefix(Entity::Task, task_ref)?;
    ctx.store.release_task(&id)?;
    done(json, &id, "ready")
}

fn block(task_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let id = ctx.store.find_by_prefix(Entity::Task, task_ref)?;
    ctx.store.block_task(&id)?;
    done(json, &id, "blocked")
}

fn unblock(task_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let id = ctx.store.find_by_prefix(Entity::Task, task_ref)?;
    ctx.store.unblock_task(&id)?;
    done(json, &id, "pending")
}

fn create_pr(
    task_ref: &str,
    title: Option<&str>,
    body: Option<&str>,
    draft: bool,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let id = ctx.store.find_by_prefix(Entity::Task, task_ref)?;
    let task = ctx.store.get_task(&id)?;
    let plan = ctx.store.get_plan(&task.plan_id)?;
    let project = ctx.store.get_project(&plan.project_id)?;

    let branch = task.branch_name.clone().ok_or_else(|| {
        TaskctlError::Invalid(format!("task {} has no branch yet", short(&id)))
    })?;
    let slot_id = task.slot_id.clone().ok_or_else(|| {
        TaskctlError::Invalid(format!("task {} holds no slot", short(&id)))
    })?;
    let slot = ctx.store.get_slot(&slot_id)?;

    let forge = Forge::new(ctx.cancel.clone());
    let repo = Path::new(&project.repo_path);
    forge
        .availability_check(repo)
        .context("forge CLI unavailable")?;

    ctx.git()
        .push(Path::new(&slot.path), "origin", Some(&branch), true)?;

    let view = forge.create_pr(
        repo,
        &CreatePr {
            title: title.unwrap_or(&task.title),
            body: body.unwrap_or(&task.description),
            base: &plan.source_branch,
            head: &branch,
            draft,
        },
    )?;
    let pr = ctx.store.mark_task_pr_created(
        &id,
        &NewPullRequest {
            number: view.number,
            url: view.url.clone(),
            status: taskctl_core::forge::translate_status(&view),
            base_branch: view.base_ref_name.clone(),
            head_branch: view.head_ref_name.clone(),
        },
    )?;

    if json {
        print_json(&pr)?;
    } else {
        println!("Opened PR #{} for task {}: {}", pr.number, short(&id), pr.url);
    }
    Ok(())
}

fn complete(task_ref: &str, force: bool, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let id = ctx.store.find_by_prefix(Entity::Task, task_ref)?;
    ctx.store.complete_task(&id, force)?;
    done(json, &id, "completed")
}

fn remove(task_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let id = ctx.store.find_by_prefix(Entity::Task, task_ref)?;
    ctx.store.delete_task(&id)?;

    if json {
        print_json(&serde_json::json!({ "removed": id }))?;
    } else {
        println!("Removed task {}", short(&id));
    }
    Ok(())
}

fn done(json: bool, id: &str, status: &str) -> anyhow::Result<()> {
    if json {
        print_json(&serde_json::json!({ "task_id": id, "status": status }))?;
    } else {
        println!("Task {} is now {}", short(id), status);
    }
    Ok(())
}

use crate::context::Ctx;
use crate::output::{print_json, print_table};
use anyhow::Context as _;
use clap::Subcommand;
use std::path::PathBuf;
use taskctl_core::id::short;
use taskctl_core::planner::{self, ClaudePlanner, PlanRequest, PlanResponse, Planner};
use taskctl_core::types::{Entity, PlanStatus};
use taskctl_core::Result as CoreResult;

#[derive(Subcommand)]
pub enum PlanSubcommand {
    /// Create an empty plan in draft state
    New {
        #[arg(required = true)]
        title: Vec<String>,

        /// Longer description of the change request
        #[arg(long)]
        description: Option<String>,

        /// Base branch task branches fork from (default: project main branch)
        #[arg(long)]
        branch: Option<String>,
    },
    /// Ask the planner to decompose a prompt into tasks for a draft plan
    Generate {
        plan: String,

        /// The change request; defaults to the plan description/title
        #[arg(long)]
        prompt: Option<String>,

        /// Target maximum changed lines per task
        #[arg(long)]
        max_lines: Option<u32>,

        /// Files whose content is passed to the planner as context
        #[arg(long = "context")]
        context_files: Vec<PathBuf>,

        /// Read the planner response from a JSON file instead of calling the LLM
        #[arg(long)]
        from_file: Option<PathBuf>,
    },
    /// List plans
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one plan with its tasks
    Show { plan: String },
    /// Archive a plan
    Archive { plan: String },
}

pub fn run(subcmd: PlanSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PlanSubcommand::New {
            title,
            description,
            branch,
        } => new(&title.join(" "), description.as_deref(), branch.as_deref(), json),
        PlanSubcommand::Generate {
            plan,
            prompt,
            max_lines,
            context_files,
            from_file,
        } => generate(
            &plan,
            prompt.as_deref(),
            max_lines,
            &context_files,
            from_file.as_deref(),
            json,
        ),
        PlanSubcommand::List { status } => list(status.as_deref(), json),
        PlanSubcommand::Show { plan } => crate::cmd::status::run(&plan, json),
        PlanSubcommand::Archive { plan } => archive(&plan, json),
    }
}

fn new(
    title: &str,
    description: Option<&str>,
    branch: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let project = ctx.current_project()?;
    let source_branch = branch.unwrap_or(&project.main_branch);
    let plan = ctx
        .store
        .create_plan(&project.id, title, description, source_branch)?;

    if json {
        print_json(&plan)?;
    } else {
        println!("Created plan {} '{}'", short(&plan.id), plan.title);
    }
    Ok(())
}

/// Planner fed from a JSON file; the validation and persistence path is
/// identical to the LLM one.
struct FilePlanner {
    path: PathBuf,
}

impl Planner for FilePlanner {
    fn plan(&self, _request: &PlanRequest) -> CoreResult<PlanResponse> {
        let raw = std::fs::read_to_string(&self.path)?;
        planner::parse_response(&raw)
    }
}

fn generate(
    plan_ref: &str,
    prompt: Option<&str>,
    max_lines: Option<u32>,
    context_files: &[PathBuf],
    from_file: Option<&std::path::Path>,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let plan_id = ctx.store.find_by_prefix(Entity::Plan, plan_ref)?;
    let plan = ctx.store.get_plan(&plan_id)?;

    let prompt = prompt
        .map(String::from)
        .or_else(|| plan.description.clone())
        .unwrap_or_else(|| plan.title.clone());
    let mut request = PlanRequest {
        prompt,
        max_lines_per_task: max_lines,
        ..Default::default()
    };
    for path in context_files {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read context file {}", path.display()))?;
        request
            .context_files
            .push((path.to_string_lossy().into_owned(), content));
    }

    let tasks = match from_file {
        Some(path) => {
            let file_planner = FilePlanner {
                path: path.to_path_buf(),
            };
            planner::generate(&ctx.store, &file_planner, &plan, &request)?
        }
        None => {
            let claude = ClaudePlanner::new(ctx.config.planner_model.clone(), ctx.cancel.clone());
            planner::generate(&ctx.store, &claude, &plan, &request)?
        }
    };

    if json {
        print_json(&tasks)?;
        return Ok(());
    }
    println!("Planned {} tasks for '{}':", tasks.len(), plan.title);
    let rows = tasks
        .iter()
        .map(|t| {
            vec![
                short(&t.id).to_string(),
                t.level.to_string(),
                t.status.to_string(),
                t.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "LEVEL", "STATUS", "TITLE"], rows);
    Ok(())
}

fn list(status: Option<&str>, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let status = status.map(str::parse::<PlanStatus>).transpose()?;
    let plans = taskctl_core::queries::list_plans(&ctx.store, status)?;

    if json {
        return print_json(&plans);
    }
    if plans.is_empty() {
        println!("No plans.");
        return Ok(());
    }
    let rows = plans
        .iter()
        .map(|p| {
            vec![
                short(&p.id).to_string(),
                p.status.to_string(),
                p.source_branch.clone(),
                p.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "BRANCH", "TITLE"], rows);
    Ok(())
}

fn archive(plan_ref: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let plan_id = ctx.store.find_by_prefix(Entity::Plan, plan_ref)?;
    let plan = ctx.store.set_plan_status(&plan_id, PlanStatus::Archived)?;

    if json {
        print_json(&plan)?;
    } else {
        println!("Archived plan {}", short(&plan.id));
    }
    Ok(())
}

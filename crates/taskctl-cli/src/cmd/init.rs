use crate::context::Ctx;
use crate::output::print_json;
use taskctl_core::id::short;
use taskctl_core::TaskctlError;

pub fn run(main_branch: Option<&str>, max_concurrent: Option<u32>, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open()?;
    let root = ctx.repo_root()?;
    let root_str = root.to_string_lossy().into_owned();

    if let Some(existing) = ctx.store.get_project_by_path(&root_str)? {
        if json {
            print_json(&existing)?;
        } else {
            println!(
                "Project '{}' already registered ({})",
                existing.name,
                short(&existing.id)
            );
        }
        return Ok(());
    }

    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| TaskctlError::Invalid(format!("cannot name project at {root_str}")))?;
    let remote = ctx.git().remote_url(&root)?;
    let main_branch = main_branch.unwrap_or(&ctx.config.default_main_branch);

    let project = ctx.store.create_project(
        &name,
        &root_str,
        remote.as_deref(),
        main_branch,
        max_concurrent,
    )?;

    if json {
        print_json(&project)?;
    } else {
        println!(
            "Registered project '{}' ({}) on branch '{}'",
            project.name,
            short(&project.id),
            project.main_branch
        );
    }
    Ok(())
}

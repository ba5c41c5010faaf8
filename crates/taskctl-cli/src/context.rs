//! Shared command context: the opened store, global config, and the
//! project resolved from the working directory.

use anyhow::Context as _;
use std::path::PathBuf;
use taskctl_core::TaskctlError;
use taskctl_core::config::Config;
use taskctl_core::exec::CancelToken;
use taskctl_core::git::Git;
use taskctl_core::model::Project;
use taskctl_core::paths;
use taskctl_core::store::Store;

pub struct Ctx {
    pub store: Store,
    pub config: Config,
    pub cancel: CancelToken,
}

impl Ctx {
    pub fn open() -> anyhow::Result<Self> {
        let db = paths::db_path()?;
        let store = Store::open(&db)
            .with_context(|| format!("failed to open store at {}", db.display()))?;
        let config = Config::load(&paths::config_path()?)?;
        Ok(Self {
            store,
            config,
            cancel: CancelToken::new(),
        })
    }

    pub fn git(&self) -> Git {
        Git::new(self.cancel.clone())
    }

    /// The project owning the repository the command runs inside.
    pub fn current_project(&self) -> anyhow::Result<Project> {
        let root = self.repo_root()?;
        self.store
            .get_project_by_path(&root.to_string_lossy())?
            .with_context(|| {
                format!(
                    "no project registered for {}: run 'taskctl init' first",
                    root.display()
                )
            })
    }

    pub fn repo_root(&self) -> anyhow::Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        let git = self.git();
        // Running outside a repository is the user's mistake, not git's.
        let root = git.repo_root(&cwd).map_err(|_| {
            TaskctlError::Invalid(format!(
                "{} is not inside a git repository",
                cwd.display()
            ))
        })?;
        // A worktree checkout still belongs to the main repository.
        Ok(git.main_repo_path(&root).unwrap_or(root))
    }
}

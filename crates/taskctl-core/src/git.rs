//! Side-effecting façade over the `git` binary.
//!
//! One explicit operation per function; every failure carries the command
//! line and stderr. Network operations (fetch/pull/push) get the long
//! deadline, everything else the short one.

use crate::error::{Result, TaskctlError};
use crate::exec::{render, run_command, CancelToken, CmdOutput};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const NETWORK_TIMEOUT: Duration = Duration::from_secs(300);

/// Ahead/behind counts relative to the upstream, when one is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AheadBehind {
    Counts { ahead: u32, behind: u32 },
    /// No upstream configured; not an error.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: Option<String>,
}

pub struct Git {
    cancel: CancelToken,
}

impl Git {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    fn run(&self, dir: &Path, args: &[&str], timeout: Duration) -> Result<CmdOutput> {
        run_command("git", args, Some(dir), timeout, &self.cancel)
    }

    /// Run and require success; a non-zero exit becomes `GitError`.
    fn run_ok(&self, dir: &Path, args: &[&str], timeout: Duration) -> Result<String> {
        let out = self.run(dir, args, timeout)?;
        if out.success() {
            Ok(out.stdout)
        } else {
            Err(TaskctlError::Git {
                command: render("git", args),
                stderr: if out.stderr.trim().is_empty() {
                    out.stdout.trim().to_string()
                } else {
                    out.stderr.trim().to_string()
                },
            })
        }
    }

    // ── Repository introspection ───────────────────────────────────────────

    pub fn is_repo(&self, path: &Path) -> bool {
        self.run(path, &["rev-parse", "--is-inside-work-tree"], DEFAULT_TIMEOUT)
            .map(|o| o.success() && o.stdout.trim() == "true")
            .unwrap_or(false)
    }

    pub fn repo_root(&self, path: &Path) -> Result<PathBuf> {
        let out = self.run_ok(path, &["rev-parse", "--show-toplevel"], DEFAULT_TIMEOUT)?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Resolve a worktree (or the main checkout) back to the main repository
    /// working directory.
    pub fn main_repo_path(&self, path: &Path) -> Result<PathBuf> {
        let out = self.run_ok(path, &["rev-parse", "--git-common-dir"], DEFAULT_TIMEOUT)?;
        let common = PathBuf::from(out.trim());
        let common = if common.is_absolute() {
            common
        } else {
            path.join(common)
        };
        // The common dir is `<main>/.git`; its parent is the main checkout.
        Ok(common
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| common.clone()))
    }

    pub fn remote_url(&self, path: &Path) -> Result<Option<String>> {
        let out = self.run(path, &["remote", "get-url", "origin"], DEFAULT_TIMEOUT)?;
        if out.success() {
            Ok(Some(out.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    pub fn current_branch(&self, path: &Path) -> Result<String> {
        let out = self.run_ok(path, &["rev-parse", "--abbrev-ref", "HEAD"], DEFAULT_TIMEOUT)?;
        Ok(out.trim().to_string())
    }

    pub fn dirty(&self, path: &Path) -> Result<bool> {
        let out = self.run_ok(path, &["status", "--porcelain"], DEFAULT_TIMEOUT)?;
        Ok(!out.trim().is_empty())
    }

    /// Best effort: `Unknown` when no upstream is configured.
    pub fn ahead_behind(&self, path: &Path) -> Result<AheadBehind> {
        let out = self.run(
            path,
            &["rev-list", "--left-right", "--count", "@{upstream}...HEAD"],
            DEFAULT_TIMEOUT,
        )?;
        if !out.success() {
            return Ok(AheadBehind::Unknown);
        }
        let mut fields = out.stdout.split_whitespace();
        match (
            fields.next().and_then(|s| s.parse().ok()),
            fields.next().and_then(|s| s.parse().ok()),
        ) {
            (Some(behind), Some(ahead)) => Ok(AheadBehind::Counts { ahead, behind }),
            _ => Ok(AheadBehind::Unknown),
        }
    }

    // ── Branches ───────────────────────────────────────────────────────────

    pub fn branch_exists(&self, path: &Path, name: &str) -> Result<bool> {
        let gitref = format!("refs/heads/{name}");
        let out = self.run(
            path,
            &["rev-parse", "--verify", "--quiet", &gitref],
            DEFAULT_TIMEOUT,
        )?;
        Ok(out.success())
    }

    pub fn create_branch(&self, path: &Path, name: &str, base: Option<&str>) -> Result<()> {
        let mut args = vec!["checkout", "-b", name];
        if let Some(base) = base {
            args.push(base);
        }
        self.run_ok(path, &args, DEFAULT_TIMEOUT)?;
        Ok(())
    }

    pub fn checkout_branch(&self, path: &Path, name: &str) -> Result<()> {
        self.run_ok(path, &["checkout", name], DEFAULT_TIMEOUT)?;
        Ok(())
    }

    /// Detached checkout. Worktrees use this to sit on the source branch's
    /// commit without claiming the branch, which git allows in only one
    /// checkout at a time.
    pub fn checkout_detached(&self, path: &Path, name: &str) -> Result<()> {
        self.run_ok(path, &["checkout", "--detach", name], DEFAULT_TIMEOUT)?;
        Ok(())
    }

    // ── Worktrees ──────────────────────────────────────────────────────────

    pub fn add_worktree(&self, repo: &Path, path: &Path, branch: Option<&str>) -> Result<()> {
        let path_str = path.to_string_lossy();
        let mut args = vec!["worktree", "add"];
        args.push(path_str.as_ref());
        if let Some(branch) = branch {
            args.push(branch);
        }
        self.run_ok(repo, &args, DEFAULT_TIMEOUT)?;
        Ok(())
    }

    pub fn remove_worktree(&self, repo: &Path, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run_ok(
            repo,
            &["worktree", "remove", "--force", path_str.as_ref()],
            DEFAULT_TIMEOUT,
        )?;
        Ok(())
    }

    pub fn list_worktrees(&self, repo: &Path) -> Result<Vec<WorktreeInfo>> {
        let out = self.run_ok(repo, &["worktree", "list", "--porcelain"], DEFAULT_TIMEOUT)?;
        let mut result = Vec::new();
        let mut current: Option<WorktreeInfo> = None;
        for line in out.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                if let Some(info) = current.take() {
                    result.push(info);
                }
                current = Some(WorktreeInfo {
                    path: PathBuf::from(path),
                    branch: None,
                });
            } else if let Some(branch) = line.strip_prefix("branch ") {
                if let Some(info) = current.as_mut() {
                    info.branch = Some(
                        branch
                            .strip_prefix("refs/heads/")
                            .unwrap_or(branch)
                            .to_string(),
                    );
                }
            }
        }
        if let Some(info) = current {
            result.push(info);
        }
        Ok(result)
    }

    pub fn prune_worktrees(&self, repo: &Path) -> Result<()> {
        self.run_ok(repo, &["worktree", "prune"], DEFAULT_TIMEOUT)?;
        Ok(())
    }

    // ── Remote operations ──────────────────────────────────────────────────

    pub fn fetch(&self, path: &Path) -> Result<()> {
        self.run_ok(path, &["fetch", "origin"], NETWORK_TIMEOUT)?;
        Ok(())
    }

    pub fn pull(&self, path: &Path) -> Result<()> {
        self.run_ok(path, &["pull", "--ff-only"], NETWORK_TIMEOUT)?;
        Ok(())
    }

    pub fn push(
        &self,
        path: &Path,
        remote: &str,
        branch: Option<&str>,
        set_upstream: bool,
    ) -> Result<()> {
        let mut args = vec!["push"];
        if set_upstream {
            args.push("-u");
        }
        args.push(remote);
        if let Some(branch) = branch {
            args.push(branch);
        }
        self.run_ok(path, &args, NETWORK_TIMEOUT)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests (require a git binary; all repos live in temp dirs)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_repo() -> (TempDir, Git) {
        let dir = TempDir::new().unwrap();
        let git = Git::new(CancelToken::new());
        let run = |args: &[&str]| {
            let out = run_command(
                "git",
                args,
                Some(dir.path()),
                DEFAULT_TIMEOUT,
                &CancelToken::new(),
            )
            .unwrap();
            assert!(out.success(), "git {args:?}: {}", out.stderr);
        };
        run(&["init", "-b", "main"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "Test"]);
        std::fs::write(dir.path().join("README.md"), "seed\n").unwrap();
        run(&["add", "-A"]);
        run(&["commit", "-m", "seed"]);
        (dir, git)
    }

    #[test]
    fn detects_repo_and_root() {
        let (dir, git) = init_repo();
        assert!(git.is_repo(dir.path()));
        let root = git.repo_root(dir.path()).unwrap();
        assert_eq!(
            root.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn non_repo_is_not_a_repo() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("empty");
        std::fs::create_dir(&scratch).unwrap();
        // An empty dir under a temp root may still sit inside an outer repo
        // on dev machines; only assert when fully detached.
        let git = Git::new(CancelToken::new());
        if git.repo_root(&scratch).is_err() {
            assert!(!git.is_repo(&scratch));
        }
    }

    #[test]
    fn branch_create_checkout_exists() {
        let (dir, git) = init_repo();
        assert!(!git.branch_exists(dir.path(), "feature/x").unwrap());
        git.create_branch(dir.path(), "feature/x", Some("main"))
            .unwrap();
        assert!(git.branch_exists(dir.path(), "feature/x").unwrap());
        assert_eq!(git.current_branch(dir.path()).unwrap(), "feature/x");

        git.checkout_branch(dir.path(), "main").unwrap();
        assert_eq!(git.current_branch(dir.path()).unwrap(), "main");
    }

    #[test]
    fn create_existing_branch_fails_with_stderr() {
        let (dir, git) = init_repo();
        git.create_branch(dir.path(), "dup", None).unwrap();
        git.checkout_branch(dir.path(), "main").unwrap();
        let err = git.create_branch(dir.path(), "dup", None).unwrap_err();
        match err {
            TaskctlError::Git { command, stderr } => {
                assert!(command.contains("checkout -b dup"));
                assert!(!stderr.is_empty());
            }
            other => panic!("expected GitError, got {other:?}"),
        }
    }

    #[test]
    fn dirty_reflects_working_tree() {
        let (dir, git) = init_repo();
        assert!(!git.dirty(dir.path()).unwrap());
        std::fs::write(dir.path().join("new.txt"), "x").unwrap();
        assert!(git.dirty(dir.path()).unwrap());
    }

    #[test]
    fn ahead_behind_unknown_without_upstream() {
        let (dir, git) = init_repo();
        assert_eq!(git.ahead_behind(dir.path()).unwrap(), AheadBehind::Unknown);
    }

    #[test]
    fn worktree_lifecycle() {
        let (dir, git) = init_repo();
        let wt = dir.path().join("wt-slot-1");
        git.add_worktree(dir.path(), &wt, None).unwrap();
        assert!(wt.join("README.md").exists());

        let listed = git.list_worktrees(dir.path()).unwrap();
        assert_eq!(listed.len(), 2);

        // A worktree resolves back to the main checkout.
        let main = git.main_repo_path(&wt).unwrap();
        assert_eq!(
            main.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );

        git.remove_worktree(dir.path(), &wt).unwrap();
        git.prune_worktrees(dir.path()).unwrap();
        assert_eq!(git.list_worktrees(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn remote_url_none_without_origin() {
        let (dir, git) = init_repo();
        assert_eq!(git.remote_url(dir.path()).unwrap(), None);
    }
}

//! Side-effecting façade over the forge CLI (`gh`).
//!
//! Creates, reads, merges, and closes pull requests, and translates the
//! forge's view of a PR into the internal [`PrStatus`].

use crate::error::{Result, TaskctlError};
use crate::exec::{render, run_command, CancelToken};
use crate::types::PrStatus;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const FORGE_TIMEOUT: Duration = Duration::from_secs(60);

const PR_JSON_FIELDS: &str = "number,title,url,state,headRefName,baseRefName,isDraft,reviewDecision";

/// A pull request as the forge reports it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrView {
    pub number: i64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub head_ref_name: String,
    pub base_ref_name: String,
    pub is_draft: bool,
    #[serde(default)]
    pub review_decision: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePr<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub base: &'a str,
    pub head: &'a str,
    pub draft: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    Squash,
    Rebase,
    Merge,
}

impl MergeMethod {
    fn flag(self) -> &'static str {
        match self {
            MergeMethod::Squash => "--squash",
            MergeMethod::Rebase => "--rebase",
            MergeMethod::Merge => "--merge",
        }
    }
}

/// Map the forge's (state, isDraft, reviewDecision) triple onto the internal
/// status. Merge/close win over everything, draft over review signals.
pub fn translate_status(view: &PrView) -> PrStatus {
    match view.state.as_str() {
        "MERGED" => PrStatus::Merged,
        "CLOSED" => PrStatus::Closed,
        "OPEN" => {
            if view.is_draft {
                PrStatus::Draft
            } else {
                match view.review_decision.as_deref() {
                    Some("APPROVED") => PrStatus::Approved,
                    Some("CHANGES_REQUESTED") => PrStatus::InReview,
                    _ => PrStatus::Open,
                }
            }
        }
        _ => PrStatus::Draft,
    }
}

pub struct Forge {
    cancel: CancelToken,
}

impl Forge {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    fn run_ok(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let out = run_command("gh", args, Some(dir), FORGE_TIMEOUT, &self.cancel)?;
        if out.success() {
            Ok(out.stdout)
        } else {
            Err(TaskctlError::Forge {
                command: render("gh", args),
                stderr: if out.stderr.trim().is_empty() {
                    out.stdout.trim().to_string()
                } else {
                    out.stderr.trim().to_string()
                },
            })
        }
    }

    /// Is the CLI installed and authenticated?
    pub fn availability_check(&self, dir: &Path) -> Result<()> {
        self.run_ok(dir, &["auth", "status"]).map(|_| ())
    }

    pub fn create_pr(&self, dir: &Path, req: &CreatePr<'_>) -> Result<PrView> {
        let mut args = vec![
            "pr", "create", "--title", req.title, "--body", req.body, "--base", req.base,
            "--head", req.head,
        ];
        if req.draft {
            args.push("--draft");
        }
        self.run_ok(dir, &args)?;
        // `pr create` prints a URL, not JSON; read the record back.
        self.view_pr(dir, req.head)
    }

    pub fn get_pr(&self, dir: &Path, number: i64) -> Result<PrView> {
        self.view_pr(dir, &number.to_string())
    }

    fn view_pr(&self, dir: &Path, selector: &str) -> Result<PrView> {
        let out = self.run_ok(dir, &["pr", "view", selector, "--json", PR_JSON_FIELDS])?;
        parse_pr(&out)
    }

    pub fn list_prs(&self, dir: &Path, state: &str) -> Result<Vec<PrView>> {
        let out = self.run_ok(
            dir,
            &["pr", "list", "--state", state, "--json", PR_JSON_FIELDS],
        )?;
        serde_json::from_str(&out).map_err(|e| TaskctlError::Forge {
            command: "gh pr list".to_string(),
            stderr: format!("unparseable JSON output: {e}"),
        })
    }

    pub fn merge_pr(
        &self,
        dir: &Path,
        number: i64,
        method: MergeMethod,
        delete_branch: bool,
    ) -> Result<()> {
        let num = number.to_string();
        let mut args = vec!["pr", "merge", num.as_str(), method.flag()];
        if delete_branch {
            args.push("--delete-branch");
        }
        self.run_ok(dir, &args).map(|_| ())
    }

    pub fn close_pr(&self, dir: &Path, number: i64) -> Result<()> {
        let num = number.to_string();
        self.run_ok(dir, &["pr", "close", num.as_str()]).map(|_| ())
    }

    pub fn mark_ready(&self, dir: &Path, number: i64) -> Result<()> {
        let num = number.to_string();
        self.run_ok(dir, &["pr", "ready", num.as_str()]).map(|_| ())
    }
}

fn parse_pr(raw: &str) -> Result<PrView> {
    serde_json::from_str(raw).map_err(|e| TaskctlError::Forge {
        command: "gh pr view".to_string(),
        stderr: format!("unparseable JSON output: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn view(state: &str, draft: bool, decision: Option<&str>) -> PrView {
        PrView {
            number: 42,
            title: "Add parser".into(),
            url: "https://example.com/pr/42".into(),
            state: state.into(),
            head_ref_name: "feature/x".into(),
            base_ref_name: "main".into(),
            is_draft: draft,
            review_decision: decision.map(String::from),
        }
    }

    #[test]
    fn translation_table() {
        assert_eq!(translate_status(&view("MERGED", false, None)), PrStatus::Merged);
        assert_eq!(translate_status(&view("CLOSED", false, None)), PrStatus::Closed);
        assert_eq!(translate_status(&view("OPEN", true, None)), PrStatus::Draft);
        assert_eq!(
            translate_status(&view("OPEN", false, Some("APPROVED"))),
            PrStatus::Approved
        );
        assert_eq!(
            translate_status(&view("OPEN", false, Some("CHANGES_REQUESTED"))),
            PrStatus::InReview
        );
        assert_eq!(translate_status(&view("OPEN", false, None)), PrStatus::Open);
        assert_eq!(
            translate_status(&view("OPEN", false, Some("REVIEW_REQUIRED"))),
            PrStatus::Open
        );
        assert_eq!(translate_status(&view("WEIRD", false, None)), PrStatus::Draft);
    }

    #[test]
    fn merged_wins_over_draft_flag() {
        assert_eq!(translate_status(&view("MERGED", true, None)), PrStatus::Merged);
    }

    #[test]
    fn parses_gh_json() {
        let raw = r#"{
            "number": 7,
            "title": "Wire up codec",
            "url": "https://github.com/acme/widgets/pull/7",
            "state": "OPEN",
            "headRefName": "feature/01ABCDEF/01HXYZAB-wire-up-codec",
            "baseRefName": "main",
            "isDraft": false,
            "reviewDecision": "APPROVED"
        }"#;
        let pr = parse_pr(raw).unwrap();
        assert_eq!(pr.number, 7);
        assert_eq!(pr.base_ref_name, "main");
        assert_eq!(translate_status(&pr), PrStatus::Approved);
    }

    #[test]
    fn missing_review_decision_defaults_none() {
        let raw = r#"{
            "number": 1, "title": "t", "url": "u", "state": "OPEN",
            "headRefName": "h", "baseRefName": "b", "isDraft": false
        }"#;
        let pr = parse_pr(raw).unwrap();
        assert_eq!(pr.review_decision, None);
        assert_eq!(translate_status(&pr), PrStatus::Open);
    }
}

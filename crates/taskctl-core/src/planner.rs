//! Contract with the external LLM planner, response validation, and the
//! persistence flow that turns a decomposition into stored tasks and edges.
//!
//! The planner itself is opaque: anything implementing [`Planner`] works.
//! The production implementation drives the `claude` CLI in print mode;
//! tests use an in-crate fake.

use crate::error::{Result, TaskctlError};
use crate::exec::{run_command, CancelToken};
use crate::graph;
use crate::model::{Plan, Task, TaskDependency};
use crate::store::{NewTask, Store};
use crate::types::PlanStatus;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const PLANNER_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_ESTIMATED_LINES: u32 = 50;
const CONTEXT_SNIPPET_LIMIT: usize = 4000;

// ── Contract types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub prompt: String,
    pub project_digest: Option<String>,
    /// (path, snippet) pairs; snippets are truncated before the call.
    pub context_files: Vec<(String, String)>,
    pub max_lines_per_task: Option<u32>,
}

/// One task as the planner proposes it. `id` is an opaque token local to the
/// response, used only to resolve `depends_on`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannedTask {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_lines: Option<u32>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanResponse {
    pub tasks: Vec<PlannedTask>,
    #[serde(default)]
    pub summary: String,
}

pub trait Planner {
    fn plan(&self, request: &PlanRequest) -> Result<PlanResponse>;
}

// ── Parsing & validation ──────────────────────────────────────────────────

/// Parse the raw planner text into a response. Malformed JSON is a
/// `PlannerParse`; a JSON document without a `tasks` array is a
/// `PlannerSchema`; an empty task list is a `PlannerSchema`.
pub fn parse_response(raw: &str) -> Result<PlanResponse> {
    let value: serde_json::Value = serde_json::from_str(strip_fences(raw))
        .map_err(|e| TaskctlError::PlannerParse(e.to_string()))?;
    if !value.get("tasks").is_some_and(|t| t.is_array()) {
        return Err(TaskctlError::PlannerSchema(
            "missing 'tasks' array".to_string(),
        ));
    }
    let response: PlanResponse = serde_json::from_value(value)
        .map_err(|e| TaskctlError::PlannerSchema(e.to_string()))?;
    if response.tasks.is_empty() {
        return Err(TaskctlError::PlannerSchema("empty task list".to_string()));
    }
    Ok(response)
}

/// Models often wrap JSON in a markdown code fence; accept that.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches('\n')
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// Normalise a parsed response: assign `task_NNN` ids where missing, default
/// description and estimate, drop self-references, collapse duplicate
/// dependencies, and reject dependencies on unknown ids.
pub fn validate_response(response: &PlanResponse) -> Result<Vec<PlannedTask>> {
    let mut tasks: Vec<PlannedTask> = Vec::with_capacity(response.tasks.len());
    for (i, planned) in response.tasks.iter().enumerate() {
        let mut task = planned.clone();
        if task.id.trim().is_empty() {
            task.id = format!("task_{:03}", i + 1);
        }
        if task.description.trim().is_empty() {
            task.description = task.title.clone();
        }
        if task.estimated_lines.is_none() {
            task.estimated_lines = Some(DEFAULT_ESTIMATED_LINES);
        }
        tasks.push(task);
    }

    let known: HashMap<String, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), i))
        .collect();
    if known.len() != tasks.len() {
        return Err(TaskctlError::PlannerSchema(
            "duplicate task ids in response".to_string(),
        ));
    }

    for i in 0..tasks.len() {
        let own_id = tasks[i].id.clone();
        let mut seen = Vec::new();
        let deps = std::mem::take(&mut tasks[i].depends_on);
        for dep in deps {
            if dep == own_id {
                continue;
            }
            if !known.contains_key(dep.as_str()) {
                return Err(TaskctlError::PlannerDependency(format!(
                    "task '{own_id}' depends on unknown task '{dep}'"
                )));
            }
            if !seen.contains(&dep) {
                seen.push(dep);
            }
        }
        tasks[i].depends_on = seen;
    }
    Ok(tasks)
}

// ── Persistence flow ──────────────────────────────────────────────────────

/// Drive one planner run for a plan: `draft → planning`, call, validate,
/// compute levels, persist tasks and edges in one store transaction, then
/// `planning → ready`. Any failure restores the plan to `draft` and leaves
/// no tasks behind.
pub fn generate(
    store: &Store,
    planner: &dyn Planner,
    plan: &Plan,
    request: &PlanRequest,
) -> Result<Vec<Task>> {
    store.set_plan_status(&plan.id, PlanStatus::Planning)?;
    match generate_inner(store, planner, plan, request) {
        Ok(tasks) => {
            store.set_plan_status(&plan.id, PlanStatus::Ready)?;
            Ok(tasks)
        }
        Err(e) => {
            store.set_plan_status(&plan.id, PlanStatus::Draft)?;
            Err(e)
        }
    }
}

fn generate_inner(
    store: &Store,
    planner: &dyn Planner,
    plan: &Plan,
    request: &PlanRequest,
) -> Result<Vec<Task>> {
    let response = planner.plan(request)?;
    debug!(tasks = response.tasks.len(), "planner response parsed");
    let tasks = validate_response(&response)?;

    // Levels are computed on the planner's ids; the store then assigns the
    // real identities and the index map carries the edges across.
    let planner_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
    let index_of: HashMap<&str, usize> = planner_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut edges = Vec::new();
    let mut edge_indices = Vec::new();
    for task in &tasks {
        for dep in &task.depends_on {
            edges.push(TaskDependency {
                task_id: task.id.clone(),
                depends_on_id: dep.clone(),
            });
            edge_indices.push((index_of[task.id.as_str()], index_of[dep.as_str()]));
        }
    }
    let dep_graph = graph::build(&planner_ids, &edges)
        .map_err(|e| TaskctlError::PlannerDependency(e.to_string()))?;

    let new_tasks: Vec<NewTask> = tasks
        .iter()
        .map(|t| NewTask {
            title: t.title.clone(),
            description: t.description.clone(),
            estimated_lines: t.estimated_lines,
            level: dep_graph.level(&t.id).unwrap_or(0),
        })
        .collect();

    store.insert_plan_tasks(&plan.id, &new_tasks, &edge_indices)
}

// ── Claude CLI planner ────────────────────────────────────────────────────

/// Production planner: one `claude --print` invocation, JSON out.
pub struct ClaudePlanner {
    pub model: Option<String>,
    pub cancel: CancelToken,
}

impl ClaudePlanner {
    pub fn new(model: Option<String>, cancel: CancelToken) -> Self {
        Self { model, cancel }
    }

    fn build_prompt(request: &PlanRequest) -> String {
        let mut prompt = String::new();
        prompt.push_str(
            "Decompose the following change request into small, independently \
             reviewable tasks forming a dependency DAG.\n\n",
        );
        prompt.push_str("Request:\n");
        prompt.push_str(&request.prompt);
        prompt.push('\n');
        if let Some(max) = request.max_lines_per_task {
            prompt.push_str(&format!("\nKeep each task under {max} changed lines.\n"));
        }
        if let Some(digest) = &request.project_digest {
            prompt.push_str("\nProject structure:\n");
            prompt.push_str(digest);
            prompt.push('\n');
        }
        for (path, snippet) in &request.context_files {
            let snippet = if snippet.len() > CONTEXT_SNIPPET_LIMIT {
                &snippet[..CONTEXT_SNIPPET_LIMIT]
            } else {
                snippet
            };
            prompt.push_str(&format!("\nContext file {path}:\n{snippet}\n"));
        }
        prompt.push_str(
            "\nRespond with only a JSON object: {\"tasks\": [{\"id\": string, \
             \"title\": string, \"description\": string, \"estimated_lines\": number, \
             \"depends_on\": [string]}], \"summary\": string}. No prose.\n",
        );
        prompt
    }
}

impl Planner for ClaudePlanner {
    fn plan(&self, request: &PlanRequest) -> Result<PlanResponse> {
        let prompt = Self::build_prompt(request);
        let mut args = vec!["--print", "--output-format", "json"];
        if let Some(model) = &self.model {
            args.push("--model");
            args.push(model);
        }
        args.push(&prompt);

        let out = run_command("claude", &args, None, PLANNER_TIMEOUT, &self.cancel)?;
        if !out.success() {
            return Err(TaskctlError::PlannerParse(format!(
                "claude exited with {}: {}",
                out.exit_code,
                out.stderr.trim()
            )));
        }
        // `--output-format json` wraps the answer in an envelope whose
        // `result` field holds the model text.
        let envelope: serde_json::Value = serde_json::from_str(&out.stdout)
            .map_err(|e| TaskctlError::PlannerParse(e.to_string()))?;
        let text = envelope
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| {
                TaskctlError::PlannerParse("missing 'result' field in CLI output".to_string())
            })?;
        parse_response(text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    struct FakePlanner {
        raw: &'static str,
    }

    impl Planner for FakePlanner {
        fn plan(&self, _request: &PlanRequest) -> Result<PlanResponse> {
            parse_response(self.raw)
        }
    }

    fn seeded_plan(store: &Store) -> Plan {
        let project = store
            .create_project("widgets", "/repos/widgets", None, "main", None)
            .unwrap();
        store
            .create_plan(&project.id, "Add codec", None, "main")
            .unwrap()
    }

    const THREE_TASKS: &str = r#"{
        "tasks": [
            {"id": "t1", "title": "Parse header", "depends_on": []},
            {"id": "t2", "title": "Parse body", "depends_on": []},
            {"id": "t3", "title": "Wire together", "depends_on": ["t1", "t2"]}
        ],
        "summary": "three tasks"
    }"#;

    #[test]
    fn parse_rejects_malformed_json() {
        assert!(matches!(
            parse_response("not json"),
            Err(TaskctlError::PlannerParse(_))
        ));
    }

    #[test]
    fn parse_rejects_missing_tasks_array() {
        assert!(matches!(
            parse_response(r#"{"summary": "nothing"}"#),
            Err(TaskctlError::PlannerSchema(_))
        ));
        assert!(matches!(
            parse_response(r#"{"tasks": {}, "summary": ""}"#),
            Err(TaskctlError::PlannerSchema(_))
        ));
    }

    #[test]
    fn parse_rejects_empty_task_list() {
        assert!(matches!(
            parse_response(r#"{"tasks": [], "summary": ""}"#),
            Err(TaskctlError::PlannerSchema(_))
        ));
    }

    #[test]
    fn parse_accepts_fenced_json() {
        let raw = "```json\n{\"tasks\": [{\"id\": \"a\", \"title\": \"T\"}]}\n```";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.tasks.len(), 1);
    }

    #[test]
    fn validation_fills_defaults() {
        let response = parse_response(
            r#"{"tasks": [{"id": "", "title": "Only title"}], "summary": ""}"#,
        )
        .unwrap();
        let tasks = validate_response(&response).unwrap();
        assert_eq!(tasks[0].id, "task_001");
        assert_eq!(tasks[0].description, "Only title");
        assert_eq!(tasks[0].estimated_lines, Some(DEFAULT_ESTIMATED_LINES));
    }

    #[test]
    fn validation_drops_self_refs_and_duplicates() {
        let response = parse_response(
            r#"{"tasks": [
                {"id": "a", "title": "A"},
                {"id": "b", "title": "B", "depends_on": ["a", "a", "b"]}
            ]}"#,
        )
        .unwrap();
        let tasks = validate_response(&response).unwrap();
        assert_eq!(tasks[1].depends_on, vec!["a".to_string()]);
    }

    #[test]
    fn validation_rejects_unknown_dependency() {
        let response = parse_response(
            r#"{"tasks": [{"id": "a", "title": "A", "depends_on": ["ghost"]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            validate_response(&response),
            Err(TaskctlError::PlannerDependency(_))
        ));
    }

    #[test]
    fn generate_persists_three_tasks_with_levels() {
        let store = Store::open_in_memory().unwrap();
        let plan = seeded_plan(&store);
        let planner = FakePlanner { raw: THREE_TASKS };

        let tasks = generate(&store, &planner, &plan, &PlanRequest::default()).unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].level, 0);
        assert_eq!(tasks[1].level, 0);
        assert_eq!(tasks[2].level, 1);
        assert_eq!(tasks[0].status, TaskStatus::Ready);
        assert_eq!(tasks[1].status, TaskStatus::Ready);
        assert_eq!(tasks[2].status, TaskStatus::Pending);

        let plan = store.get_plan(&plan.id).unwrap();
        assert_eq!(plan.status, PlanStatus::Ready);

        // Read-back matches the response modulo identity re-mapping.
        let edges = store.list_plan_edges(&plan.id).unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.task_id == tasks[2].id));
    }

    #[test]
    fn generate_failure_restores_draft_and_stores_nothing() {
        let store = Store::open_in_memory().unwrap();
        let plan = seeded_plan(&store);
        let planner = FakePlanner { raw: "not json" };

        let err = generate(&store, &planner, &plan, &PlanRequest::default()).unwrap_err();
        assert!(matches!(err, TaskctlError::PlannerParse(_)));
        let plan = store.get_plan(&plan.id).unwrap();
        assert_eq!(plan.status, PlanStatus::Draft);
        assert!(store.list_plan_tasks(&plan.id).unwrap().is_empty());
    }

    #[test]
    fn generate_rejects_cyclic_response() {
        let store = Store::open_in_memory().unwrap();
        let plan = seeded_plan(&store);
        let planner = FakePlanner {
            raw: r#"{"tasks": [
                {"id": "a", "title": "A", "depends_on": ["b"]},
                {"id": "b", "title": "B", "depends_on": ["a"]}
            ]}"#,
        };

        let err = generate(&store, &planner, &plan, &PlanRequest::default()).unwrap_err();
        assert!(matches!(err, TaskctlError::PlannerDependency(_)));
        assert!(store.list_plan_tasks(&plan.id).unwrap().is_empty());
        assert_eq!(
            store.get_plan(&plan.id).unwrap().status,
            PlanStatus::Draft
        );
    }

    #[test]
    fn prompt_includes_request_parts() {
        let request = PlanRequest {
            prompt: "Split the auth refactor".into(),
            project_digest: Some("src/, tests/".into()),
            context_files: vec![("src/lib.rs".into(), "pub mod auth;".into())],
            max_lines_per_task: Some(100),
        };
        let prompt = ClaudePlanner::build_prompt(&request);
        assert!(prompt.contains("Split the auth refactor"));
        assert!(prompt.contains("under 100 changed lines"));
        assert!(prompt.contains("src/lib.rs"));
    }
}

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Root layout per test: `<root>/repo` is a seeded git repository and
/// `<root>/taskctl.db` holds the store.
struct Env {
    root: TempDir,
}

impl Env {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let repo = root.path().join("repo");
        std::fs::create_dir(&repo).unwrap();
        let sh = |args: &[&str]| {
            let out = std::process::Command::new("git")
                .args(args)
                .current_dir(&repo)
                .output()
                .unwrap();
            assert!(
                out.status.success(),
                "git {args:?}: {}",
                String::from_utf8_lossy(&out.stderr)
            );
        };
        sh(&["init", "-b", "main"]);
        sh(&["config", "user.email", "test@example.com"]);
        sh(&["config", "user.name", "Test"]);
        std::fs::write(repo.join("README.md"), "seed\n").unwrap();
        sh(&["add", "-A"]);
        sh(&["commit", "-m", "seed"]);
        Self { root }
    }

    fn repo(&self) -> std::path::PathBuf {
        self.root.path().join("repo")
    }

    fn taskctl(&self) -> Command {
        let mut cmd = Command::cargo_bin("taskctl").unwrap();
        cmd.current_dir(self.repo())
            .env("TASKCTL_DB_PATH", self.root.path().join("taskctl.db"));
        cmd
    }

    fn init(&self) {
        self.taskctl().arg("init").assert().success();
    }

    /// Create a plan and return its id (from the JSON output).
    fn new_plan(&self, title: &str) -> String {
        let out = self
            .taskctl()
            .args(["plan", "new", title, "--json"])
            .assert()
            .success();
        let value: serde_json::Value =
            serde_json::from_slice(&out.get_output().stdout).unwrap();
        value["id"].as_str().unwrap().to_string()
    }

    fn write_plan_file(&self, content: &str) -> std::path::PathBuf {
        let path = self.root.path().join("plan.json");
        std::fs::write(&path, content).unwrap();
        path
    }
}

const THREE_TASKS: &str = r#"{
    "tasks": [
        {"id": "t1", "title": "Parse header", "estimated_lines": 40, "depends_on": []},
        {"id": "t2", "title": "Parse body", "estimated_lines": 60, "depends_on": []},
        {"id": "t3", "title": "Wire together", "estimated_lines": 30, "depends_on": ["t1", "t2"]}
    ],
    "summary": "codec in three steps"
}"#;

// ---------------------------------------------------------------------------
// taskctl init
// ---------------------------------------------------------------------------

#[test]
fn init_registers_the_repository() {
    let env = Env::new();
    env.taskctl()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Registered project 'repo'"));
}

#[test]
fn init_is_idempotent() {
    let env = Env::new();
    env.init();
    env.taskctl()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already registered"));
}

#[test]
fn init_outside_a_repo_fails_with_user_error() {
    let env = Env::new();
    let bare = env.root.path().join("bare");
    std::fs::create_dir(&bare).unwrap();
    let mut cmd = Command::cargo_bin("taskctl").unwrap();
    cmd.current_dir(&bare)
        .env("TASKCTL_DB_PATH", env.root.path().join("taskctl.db"))
        .arg("init")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("git repository"));
}

#[test]
fn project_list_shows_registered() {
    let env = Env::new();
    env.init();
    env.taskctl()
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("repo"));
}

// ---------------------------------------------------------------------------
// plan generate → persist (file-backed planner)
// ---------------------------------------------------------------------------

#[test]
fn generate_persists_tasks_with_levels_and_statuses() {
    let env = Env::new();
    env.init();
    let plan = env.new_plan("Add codec");
    let file = env.write_plan_file(THREE_TASKS);

    env.taskctl()
        .args(["plan", "generate", &plan, "--from-file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Planned 3 tasks"));

    // Two level-0 tasks ready, the dependent pending; plan is ready.
    let out = env
        .taskctl()
        .args(["status", &plan, "--json"])
        .assert()
        .success();
    let view: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(view["status"], "ready");
    assert_eq!(view["progress"]["total"], 3);
    let tasks = view["tasks"].as_array().unwrap();
    let ready = tasks.iter().filter(|t| t["status"] == "ready").count();
    let pending = tasks.iter().filter(|t| t["status"] == "pending").count();
    assert_eq!(ready, 2);
    assert_eq!(pending, 1);
    assert!(tasks
        .iter()
        .any(|t| t["title"] == "Wire together" && t["level"] == 1));
}

#[test]
fn generate_with_malformed_file_restores_draft() {
    let env = Env::new();
    env.init();
    let plan = env.new_plan("Broken");
    let file = env.write_plan_file("not json at all");

    env.taskctl()
        .args(["plan", "generate", &plan, "--from-file"])
        .arg(&file)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("malformed"));

    env.taskctl()
        .args(["plan", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("draft"));
}

// ---------------------------------------------------------------------------
// scheduling
// ---------------------------------------------------------------------------

#[test]
fn run_assigns_ready_tasks_to_slots() {
    let env = Env::new();
    env.init();
    let plan = env.new_plan("Add codec");
    let file = env.write_plan_file(THREE_TASKS);
    env.taskctl()
        .args(["plan", "generate", &plan, "--from-file"])
        .arg(&file)
        .assert()
        .success();
    env.taskctl()
        .args(["slot", "add", "--count", "2"])
        .assert()
        .success();

    // Dry run computes without applying.
    env.taskctl()
        .args(["run", &plan, "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would assign 2 task(s)"));
    env.taskctl()
        .args(["task", "list", "--plan", &plan, "--status", "assigned"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No tasks."));

    env.taskctl()
        .args(["run", &plan])
        .assert()
        .success()
        .stdout(predicate::str::contains("Assigned 2 task(s)"));

    let out = env
        .taskctl()
        .args(["task", "list", "--plan", &plan, "--status", "assigned", "--json"])
        .assert()
        .success();
    let tasks: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(tasks.as_array().unwrap().len(), 2);

    env.taskctl()
        .args(["slot", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("assigned"));
}

#[test]
fn force_complete_unlocks_dependent() {
    let env = Env::new();
    env.init();
    let plan = env.new_plan("Add codec");
    let file = env.write_plan_file(THREE_TASKS);
    env.taskctl()
        .args(["plan", "generate", &plan, "--from-file"])
        .arg(&file)
        .assert()
        .success();
    env.taskctl()
        .args(["slot", "add", "--count", "2"])
        .assert()
        .success();
    env.taskctl().args(["run", &plan]).assert().success();

    let out = env
        .taskctl()
        .args(["task", "list", "--plan", &plan, "--status", "assigned", "--json"])
        .assert()
        .success();
    let tasks: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    for task in tasks.as_array().unwrap() {
        let id = task["id"].as_str().unwrap();
        env.taskctl()
            .args(["task", "complete", id, "--force"])
            .assert()
            .success();
    }

    // Both roots done: the dependent is ready and schedulable.
    env.taskctl()
        .args(["task", "list", "--plan", &plan, "--status", "ready"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wire together"));
    env.taskctl()
        .args(["run", &plan, "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would assign 1 task(s)"));
}

#[test]
fn complete_without_pr_requires_force() {
    let env = Env::new();
    env.init();
    let plan = env.new_plan("Add codec");
    let file = env.write_plan_file(THREE_TASKS);
    env.taskctl()
        .args(["plan", "generate", &plan, "--from-file"])
        .arg(&file)
        .assert()
        .success();
    env.taskctl().args(["slot", "add"]).assert().success();
    env.taskctl().args(["run", &plan]).assert().success();

    let out = env
        .taskctl()
        .args(["task", "list", "--plan", &plan, "--status", "assigned", "--json"])
        .assert()
        .success();
    let tasks: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    let id = tasks[0]["id"].as_str().unwrap();

    env.taskctl()
        .args(["task", "complete", id])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no merged PR"));
}

// ---------------------------------------------------------------------------
// error surface
// ---------------------------------------------------------------------------

#[test]
fn unknown_plan_is_a_user_error() {
    let env = Env::new();
    env.init();
    env.taskctl()
        .args(["status", "ZZZZZZ"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn task_attach_and_lookup() {
    let env = Env::new();
    env.init();
    let plan = env.new_plan("Add codec");
    let file = env.write_plan_file(THREE_TASKS);
    env.taskctl()
        .args(["plan", "generate", &plan, "--from-file"])
        .arg(&file)
        .assert()
        .success();

    let out = env
        .taskctl()
        .args(["task", "list", "--plan", &plan, "--json"])
        .assert()
        .success();
    let tasks: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    let id = tasks[0]["id"].as_str().unwrap();

    env.taskctl()
        .args(["task", "attach", id, "--session", "ses_x"])
        .assert()
        .success();
    env.taskctl()
        .args(["task", "show", id])
        .assert()
        .success()
        .stdout(predicate::str::contains("ses_x"));
}

#[test]
fn task_remove_drops_task_and_its_edges() {
    let env = Env::new();
    env.init();
    let plan = env.new_plan("Add codec");
    let file = env.write_plan_file(THREE_TASKS);
    env.taskctl()
        .args(["plan", "generate", &plan, "--from-file"])
        .arg(&file)
        .assert()
        .success();

    let out = env
        .taskctl()
        .args(["task", "list", "--plan", &plan, "--status", "ready", "--json"])
        .assert()
        .success();
    let ready: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    let id = ready[0]["id"].as_str().unwrap();

    env.taskctl()
        .args(["task", "remove", id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed task"));

    // The dependent lost one edge but survived with the other.
    let out = env
        .taskctl()
        .args(["task", "list", "--plan", &plan, "--json"])
        .assert()
        .success();
    let tasks: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(tasks.as_array().unwrap().len(), 2);
    let wire = tasks
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["title"] == "Wire together")
        .unwrap();
    let wire_id = wire["id"].as_str().unwrap();
    let out = env
        .taskctl()
        .args(["task", "show", wire_id, "--json"])
        .assert()
        .success();
    let view: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(view["dependencies"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// MCP server
// ---------------------------------------------------------------------------

#[test]
fn mcp_serves_initialize_and_tools() {
    let env = Env::new();
    env.init();

    let requests = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        "\n",
    );
    env.taskctl()
        .arg("mcp")
        .write_stdin(requests)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"protocolVersion\":\"2024-11-05\""))
        .stdout(predicate::str::contains("get_current_task"));
}

#[test]
fn mcp_get_plan_roundtrip() {
    let env = Env::new();
    env.init();
    let plan = env.new_plan("Add codec");
    let file = env.write_plan_file(THREE_TASKS);
    env.taskctl()
        .args(["plan", "generate", &plan, "--from-file"])
        .arg(&file)
        .assert()
        .success();

    let request = format!(
        "{}\n",
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "get_plan", "arguments": {"plan": &plan[..8]}}
        })
    );
    env.taskctl()
        .arg("mcp")
        .write_stdin(request)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wire together"));
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskctlError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("ambiguous {entity} prefix '{prefix}': matches {}", matches.join(", "))]
    Ambiguous {
        entity: &'static str,
        prefix: String,
        matches: Vec<String>,
    },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("dependency cycle involving task {involving}")]
    Cycle { involving: String },

    #[error("task {task} has unmet dependency {dependency}")]
    DependencyUnmet { task: String, dependency: String },

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("{0}")]
    Invalid(String),

    #[error("platform data directory not found: set TASKCTL_DB_PATH")]
    DataDirNotFound,

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("forge {command} failed: {stderr}")]
    Forge { command: String, stderr: String },

    #[error("planner returned malformed JSON: {0}")]
    PlannerParse(String),

    #[error("planner response has an invalid shape: {0}")]
    PlannerSchema(String),

    #[error("planner dependency graph is invalid: {0}")]
    PlannerDependency(String),

    #[error("store conflict: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("'{command}' timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TaskctlError {
    /// Process exit code for this error class: 1 for user/domain errors,
    /// 2 for external collaborators (git, forge, planner, timeouts),
    /// 3 for store backend failures.
    pub fn exit_code(&self) -> i32 {
        use TaskctlError::*;
        match self {
            NotFound { .. }
            | Ambiguous { .. }
            | AlreadyExists { .. }
            | InvalidTransition { .. }
            | Cycle { .. }
            | DependencyUnmet { .. }
            | InvalidStatus(_)
            | Invalid(_)
            | DataDirNotFound
            | Conflict(_) => 1,
            Git { .. }
            | Forge { .. }
            | PlannerParse(_)
            | PlannerSchema(_)
            | PlannerDependency(_)
            | Timeout { .. }
            | Cancelled => 2,
            Backend(_) | Io(_) | Json(_) => 3,
        }
    }
}

impl From<rusqlite::Error> for TaskctlError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                TaskctlError::Conflict(e.to_string())
            }
            _ => TaskctlError::Backend(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskctlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_class() {
        assert_eq!(
            TaskctlError::NotFound {
                entity: "task",
                id: "x".into()
            }
            .exit_code(),
            1
        );
        assert_eq!(
            TaskctlError::Git {
                command: "git push".into(),
                stderr: "denied".into()
            }
            .exit_code(),
            2
        );
        assert_eq!(TaskctlError::Backend("disk full".into()).exit_code(), 3);
        assert_eq!(TaskctlError::Cancelled.exit_code(), 2);
    }

    #[test]
    fn ambiguous_lists_matches() {
        let e = TaskctlError::Ambiguous {
            entity: "plan",
            prefix: "01AR".into(),
            matches: vec!["01ARZ3ND".into(), "01ARZ4X2".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("01ARZ3ND"));
        assert!(msg.contains("01ARZ4X2"));
    }
}

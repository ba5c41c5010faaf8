use super::QueryTool;
use serde_json::{json, Value};
use taskctl_core::queries::{self, TaskFilter};
use taskctl_core::store::Store;
use taskctl_core::types::TaskStatus;

pub struct ListTasksTool;

impl QueryTool for ListTasksTool {
    fn name(&self) -> &str {
        "list_tasks"
    }

    fn description(&self) -> &str {
        "List tasks, optionally filtered by plan (id prefix accepted), status, and level."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan": {
                    "type": "string",
                    "description": "Plan id or unique prefix"
                },
                "status": {
                    "type": "string",
                    "enum": ["pending", "ready", "assigned", "in_progress",
                             "pr_created", "in_review", "completed", "blocked"]
                },
                "level": {
                    "type": "integer",
                    "minimum": 0
                }
            }
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let status = match args["status"].as_str() {
            Some(s) => Some(s.parse::<TaskStatus>().map_err(|e| e.to_string())?),
            None => None,
        };
        let filter = TaskFilter {
            plan: args["plan"].as_str().map(String::from),
            status,
            level: args["level"].as_u64().map(|l| l as u32),
        };
        let tasks = queries::list_tasks(store, &filter).map_err(|e| e.to_string())?;
        serde_json::to_value(&tasks).map_err(|e| e.to_string())
    }
}

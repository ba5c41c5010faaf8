use super::QueryTool;
use serde_json::{json, Value};
use taskctl_core::queries;
use taskctl_core::store::Store;

pub struct GetTaskTool;

impl QueryTool for GetTaskTool {
    fn name(&self) -> &str {
        "get_task"
    }

    fn description(&self) -> &str {
        "Get a task with its dependencies, dependents, pull request, and plan. \
         Accepts an id prefix."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "Task id or unique prefix"
                }
            },
            "required": ["task"]
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let task_ref = args["task"].as_str().ok_or("missing 'task' argument")?;
        let view = queries::task_with_neighbours(store, task_ref).map_err(|e| e.to_string())?;
        serde_json::to_value(&view).map_err(|e| e.to_string())
    }
}

use super::QueryTool;
use serde_json::{json, Value};
use taskctl_core::queries;
use taskctl_core::store::Store;

pub struct GetCurrentTaskTool;

impl QueryTool for GetCurrentTaskTool {
    fn name(&self) -> &str {
        "get_current_task"
    }

    fn description(&self) -> &str {
        "Locate the task an implementer is working on, by session id first and \
         branch name second. Returns null when neither matches."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "branch": {
                    "type": "string",
                    "description": "Current git branch name"
                },
                "session": {
                    "type": "string",
                    "description": "Implementer session id"
                }
            }
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let branch = args["branch"].as_str();
        let session = args["session"].as_str();
        let found = queries::current_task(store, branch, session).map_err(|e| e.to_string())?;
        serde_json::to_value(&found).map_err(|e| e.to_string())
    }
}

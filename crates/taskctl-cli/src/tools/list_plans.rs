use super::QueryTool;
use serde_json::{json, Value};
use taskctl_core::queries;
use taskctl_core::store::Store;
use taskctl_core::types::PlanStatus;

pub struct ListPlansTool;

impl QueryTool for ListPlansTool {
    fn name(&self) -> &str {
        "list_plans"
    }

    fn description(&self) -> &str {
        "List plans, optionally filtered by status."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["draft", "planning", "ready", "in_progress", "completed", "archived"]
                }
            }
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let status = match args["status"].as_str() {
            Some(s) => Some(s.parse::<PlanStatus>().map_err(|e| e.to_string())?),
            None => None,
        };
        let plans = queries::list_plans(store, status).map_err(|e| e.to_string())?;
        serde_json::to_value(&plans).map_err(|e| e.to_string())
    }
}

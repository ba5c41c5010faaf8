use super::QueryTool;
use serde_json::{json, Value};
use taskctl_core::queries;
use taskctl_core::store::Store;

pub struct GetPlanTool;

impl QueryTool for GetPlanTool {
    fn name(&self) -> &str {
        "get_plan"
    }

    fn description(&self) -> &str {
        "Get a plan with all its tasks, dependency edges, and progress. Accepts an id prefix."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan": {
                    "type": "string",
                    "description": "Plan id or unique prefix"
                }
            },
            "required": ["plan"]
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let plan_ref = args["plan"].as_str().ok_or("missing 'plan' argument")?;
        let view = queries::plan_with_progress(store, plan_ref).map_err(|e| e.to_string())?;
        serde_json::to_value(&view).map_err(|e| e.to_string())
    }
}

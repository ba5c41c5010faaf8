use taskctl_core::store::Store;

pub mod get_current_task;
pub mod get_plan;
pub mod get_task;
pub mod list_plans;
pub mod list_tasks;

/// A read-only query exposed over the MCP server. Tools never mutate the
/// store; failures come back as plain strings for inline rendering.
pub trait QueryTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> serde_json::Value;
    fn call(&self, args: serde_json::Value, store: &Store) -> Result<serde_json::Value, String>;
}

pub fn all_tools() -> Vec<Box<dyn QueryTool>> {
    vec![
        Box::new(get_plan::GetPlanTool),
        Box::new(list_plans::ListPlansTool),
        Box::new(get_task::GetTaskTool),
        Box::new(list_tasks::ListTasksTool),
        Box::new(get_current_task::GetCurrentTaskTool),
    ]
}

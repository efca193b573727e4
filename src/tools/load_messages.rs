use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LoadMessagesParams {
    #[schemars(description = "1-indexed line numbers to load")]
    pub lines: Vec<u64>,

    #[schemars(description = "Context lines before each requested line. Defaults to 1.")]
    pub context_before: Option<u64>,

    #[schemars(description = "Context lines after each requested line. Defaults to 1.")]
    pub context_after: Option<u64>,

    #[schemars(description = "Session id for budget tracking. Defaults to 'default'.")]
    pub session: Option<String>,
}

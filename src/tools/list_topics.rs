use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListTopicsParams {
    #[schemars(description = "Case-insensitive substring filter on topic labels")]
    pub pattern: Option<String>,

    #[schemars(description = "Maximum number of topics to return. Defaults to 50.")]
    pub limit: Option<usize>,
}

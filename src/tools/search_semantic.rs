use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchSemanticParams {
    #[schemars(description = "Natural language query")]
    pub query: String,

    #[schemars(description = "Maximum number of hits. Defaults to the configured top-k.")]
    pub top_k: Option<usize>,

    #[schemars(description = "Session id for budget tracking. Defaults to 'default'.")]
    pub session: Option<String>,
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LogStatsParams {
    #[schemars(description = "Include per-sender message counts (default: true)")]
    pub include_senders: Option<bool>,
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchKeywordsParams {
    #[schemars(
        description = "Keywords, each matched case-insensitively against message content"
    )]
    pub keywords: Vec<String>,

    #[schemars(description = "Restrict the scan to messages from this sender")]
    pub target_person: Option<String>,

    #[schemars(description = "Session id for budget tracking. Defaults to 'default'.")]
    pub session: Option<String>,
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExpandQueryParams {
    #[schemars(description = "Question to expand into keywords and a dimension plan")]
    pub question: String,

    #[schemars(description = "Person the question is about")]
    pub target_person: Option<String>,
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeEvidenceParams {
    #[schemars(description = "Handle returned by retrieve_evidence")]
    pub handle: String,
}

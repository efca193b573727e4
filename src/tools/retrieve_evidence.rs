//! MCP `retrieve_evidence` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::retrieval::Dimension;

/// Parameters for the `retrieve_evidence` MCP tool.
///
/// When `dimensions` is omitted, a plan is generated from the question by the
/// configured query-understanding strategy.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RetrieveEvidenceParams {
    #[schemars(description = "Natural language question to collect evidence for")]
    pub question: String,

    #[schemars(description = "Person the question is about, used for soft mention tagging")]
    pub target_person: Option<String>,

    #[schemars(description = "Session id for budget tracking. Defaults to 'default'.")]
    pub session: Option<String>,

    #[schemars(
        description = "Explicit retrieval dimensions. When omitted, a plan is derived from the question."
    )]
    pub dimensions: Option<Vec<Dimension>>,
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One facet of a question, retrieved independently of other facets.
///
/// Produced by query understanding (LLM-backed or rule-based) and treated as
/// an immutable input by the engine. A dimension with no seeds or queries
/// yields empty evidence deterministically; no keyword inference happens
/// downstream of the planner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Dimension {
    /// Short machine-friendly name, e.g. "income-stability".
    pub name: String,
    /// What this facet is trying to establish.
    #[serde(default)]
    pub intent: String,
    /// Exact topic labels to look up in the metadata index.
    #[serde(default)]
    pub topic_seeds: Vec<String>,
    /// Substrings for the keyword fallback scan.
    #[serde(default)]
    pub keyword_seeds: Vec<String>,
    /// Natural-language queries for semantic recall.
    #[serde(default)]
    pub semantic_queries: Vec<String>,
    /// Queries run separately to surface contradicting evidence.
    #[serde(default)]
    pub counter_queries: Vec<String>,
    /// Coverage target: how many evidence items this facet wants. A target,
    /// not a floor — retrieval may return fewer.
    #[serde(default = "default_min_evidence")]
    pub min_evidence: usize,
}

fn default_min_evidence() -> usize {
    2
}

impl Dimension {
    /// True when no recall path has any input to work with.
    pub fn is_unseeded(&self) -> bool {
        self.topic_seeds.is_empty()
            && self.keyword_seeds.is_empty()
            && self.semantic_queries.is_empty()
    }
}

/// The full per-question retrieval plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DimensionPlan {
    /// Keywords extracted from the question, for display and fallback.
    #[serde(default)]
    pub keywords: Vec<String>,
    pub dimensions: Vec<Dimension>,
}

pub mod analyze_evidence;
pub mod end_session;
pub mod expand_query;
pub mod list_topics;
pub mod load_messages;
pub mod log_stats;
pub mod retrieve_evidence;
pub mod search_keywords;
pub mod search_person;
pub mod search_semantic;
pub mod search_topics;

use analyze_evidence::AnalyzeEvidenceParams;
use end_session::EndSessionParams;
use expand_query::ExpandQueryParams;
use list_topics::ListTopicsParams;
use load_messages::LoadMessagesParams;
use log_stats::LogStatsParams;
use retrieve_evidence::RetrieveEvidenceParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search_keywords::SearchKeywordsParams;
use search_person::SearchPersonParams;
use search_semantic::SearchSemanticParams;
use search_topics::SearchTopicsParams;
use std::sync::Arc;

use crate::config::TestimonyConfig;
use crate::index::{MetadataIndex, SemanticIndex};
use crate::log::MessageStore;
use crate::retrieval::{
    analyze, BudgetRegistry, EvidenceHandle, EvidenceStore, RetrievalEngine, RetrievalOutcome,
};
use crate::understand::Understanding;

const DEFAULT_SESSION: &str = "default";

/// The testimony MCP tool handler. Holds the immutable log snapshot and its
/// indices, plus the per-session budget registry and evidence staging area,
/// and exposes all MCP tools via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct TestimonyTools {
    tool_router: ToolRouter<Self>,
    log: Arc<MessageStore>,
    metadata: Arc<MetadataIndex>,
    semantic: Option<Arc<SemanticIndex>>,
    engine: Arc<RetrievalEngine>,
    evidence: Arc<EvidenceStore>,
    budgets: Arc<BudgetRegistry>,
    understanding: Arc<Understanding>,
    config: Arc<TestimonyConfig>,
}

#[tool_router]
impl TestimonyTools {
    pub fn new(
        log: Arc<MessageStore>,
        metadata: Arc<MetadataIndex>,
        semantic: Option<Arc<SemanticIndex>>,
        evidence: Arc<EvidenceStore>,
        budgets: Arc<BudgetRegistry>,
        understanding: Arc<Understanding>,
        config: Arc<TestimonyConfig>,
    ) -> Self {
        let engine = Arc::new(RetrievalEngine::new(
            Arc::clone(&log),
            Arc::clone(&metadata),
            semantic.clone(),
            config.retrieval_options(),
        ));
        Self {
            tool_router: Self::tool_router(),
            log,
            metadata,
            semantic,
            engine,
            evidence,
            budgets,
            understanding,
            config,
        }
    }

    /// Collect ranked, context-expanded evidence for a question.
    #[tool(description = "Collect evidence for a question from the chatlog. Runs hybrid topic + semantic retrieval per dimension, with counter-evidence, under the session budget. Returns a handle for analyze_evidence.")]
    async fn retrieve_evidence(
        &self,
        Parameters(params): Parameters<RetrieveEvidenceParams>,
    ) -> Result<String, String> {
        if params.question.is_empty() {
            return Err("question must not be empty".into());
        }
        let session = params.session.as_deref().unwrap_or(DEFAULT_SESSION);
        let guard = self.budgets.guard_for(session);

        // An exhausted session is an outcome, not an error.
        if !guard.can_proceed() {
            let outcome = RetrievalOutcome::NoEvidence {
                dimensions: Vec::new(),
                gap_annotation: guard.gap_annotation(),
            };
            return serde_json::to_string(&outcome)
                .map_err(|e| format!("serialization failed: {e}"));
        }
        guard.record_tool_call();

        tracing::info!(
            question = %params.question,
            session,
            planned = params.dimensions.is_some(),
            "retrieve_evidence called"
        );

        let dimensions = match params.dimensions {
            Some(dims) => dims,
            None => {
                self.understanding
                    .expand(
                        &params.question,
                        params.target_person.as_deref(),
                        self.metadata.available_topics(),
                        self.config.retrieval.max_dimensions,
                    )
                    .await
                    .dimensions
            }
        };

        // CPU-bound ranking over the whole candidate set → spawn_blocking
        let engine = Arc::clone(&self.engine);
        let guard_for_task = Arc::clone(&guard);
        let question = params.question.clone();
        let target = params.target_person.clone();
        let bundle = tokio::task::spawn_blocking(move || {
            engine.retrieve(&question, target.as_deref(), &dimensions, &guard_for_task)
        })
        .await
        .map_err(|e| format!("retrieval task failed: {e}"))?;

        let handle = if bundle.is_empty() {
            None
        } else {
            Some(self.evidence.store(bundle.clone()))
        };
        let outcome = RetrievalOutcome::from_bundle(&bundle, handle);
        let json =
            serde_json::to_string(&outcome).map_err(|e| format!("serialization failed: {e}"))?;
        guard.record_result_chars(json.len() as u64);
        Ok(json)
    }

    /// Build the per-dimension conclusion scaffold for a stored bundle.
    #[tool(description = "Analyze a retrieved evidence bundle: per-dimension counts, coverage, confidence tiers, and gaps. Derived from counts only.")]
    async fn analyze_evidence(
        &self,
        Parameters(params): Parameters<AnalyzeEvidenceParams>,
    ) -> Result<String, String> {
        let handle = EvidenceHandle(params.handle);
        match self.evidence.get(&handle) {
            Some(bundle) => {
                let matrix = analyze(&bundle);
                serde_json::to_string(&matrix).map_err(|e| format!("serialization failed: {e}"))
            }
            None => Ok(serde_json::json!({
                "status": "not_found",
                "handle": handle.0,
                "message": "no evidence bundle with this handle; it may have been evicted"
            })
            .to_string()),
        }
    }

    /// Expand a question into keywords and a dimension plan, without retrieving.
    #[tool(description = "Expand a question into keywords and a dimension plan (topic seeds, semantic queries, counter queries). Does not retrieve anything.")]
    async fn expand_query(
        &self,
        Parameters(params): Parameters<ExpandQueryParams>,
    ) -> Result<String, String> {
        let plan = self
            .understanding
            .expand(
                &params.question,
                params.target_person.as_deref(),
                self.metadata.available_topics(),
                self.config.retrieval.max_dimensions,
            )
            .await;
        serde_json::to_string(&plan).map_err(|e| format!("serialization failed: {e}"))
    }

    /// List topic labels known to the metadata index.
    #[tool(description = "List available topic labels, optionally filtered by substring.")]
    async fn list_topics(
        &self,
        Parameters(params): Parameters<ListTopicsParams>,
    ) -> Result<String, String> {
        let limit = params.limit.unwrap_or(50).max(1);
        let topics = match params.pattern.as_deref() {
            Some(pattern) => self.metadata.find_matching_topics(pattern, limit),
            None => self
                .metadata
                .available_topics()
                .iter()
                .take(limit)
                .cloned()
                .collect(),
        };
        serde_json::to_string(&serde_json::json!({
            "topics": topics,
            "total_available": self.metadata.available_topics().len(),
        }))
        .map_err(|e| format!("serialization failed: {e}"))
    }

    /// Exact topic lookup returning matching line numbers.
    #[tool(description = "Look up exact topic labels and return the matching line numbers, sorted ascending.")]
    async fn search_topics(
        &self,
        Parameters(params): Parameters<SearchTopicsParams>,
    ) -> Result<String, String> {
        let session = params.session.as_deref().unwrap_or(DEFAULT_SESSION);
        let guard = self.budgets.guard_for(session);
        if !guard.can_proceed() {
            return Ok(serde_json::json!({
                "lines": [],
                "gap_annotation": guard.gap_annotation(),
            })
            .to_string());
        }
        guard.record_tool_call();

        let lines = self.metadata.search_by_topics(&params.topics);
        let json = serde_json::json!({ "lines": lines }).to_string();
        guard.record_result_chars(json.len() as u64);
        Ok(json)
    }

    /// Sender-index lookup for a person's messages.
    #[tool(description = "Find message lines sent by a person (case-insensitive substring match on sender names). Returns the matched senders and their line numbers, sorted ascending.")]
    async fn search_person(
        &self,
        Parameters(params): Parameters<SearchPersonParams>,
    ) -> Result<String, String> {
        let session = params.session.as_deref().unwrap_or(DEFAULT_SESSION);
        let guard = self.budgets.guard_for(session);
        if !guard.can_proceed() {
            return Ok(serde_json::json!({
                "matched_senders": [],
                "lines": [],
                "gap_annotation": guard.gap_annotation(),
            })
            .to_string());
        }
        guard.record_tool_call();

        let needle = params.person.to_lowercase();
        let matched_senders: Vec<String> = self
            .log
            .senders()
            .into_iter()
            .filter(|s| s.to_lowercase().contains(&needle))
            .collect();
        let lines = self.log.lines_by_sender(&params.person);
        let json = serde_json::json!({
            "matched_senders": matched_senders,
            "lines": lines,
        })
        .to_string();
        guard.record_result_chars(json.len() as u64);
        Ok(json)
    }

    /// Substring scan over message content, per keyword.
    #[tool(description = "Scan message content for keywords (case-insensitive substring), optionally restricted to one sender. Returns line numbers per keyword.")]
    async fn search_keywords(
        &self,
        Parameters(params): Parameters<SearchKeywordsParams>,
    ) -> Result<String, String> {
        let session = params.session.as_deref().unwrap_or(DEFAULT_SESSION);
        let guard = self.budgets.guard_for(session);
        if !guard.can_proceed() {
            return Ok(serde_json::json!({
                "results": [],
                "gap_annotation": guard.gap_annotation(),
            })
            .to_string());
        }
        guard.record_tool_call();

        let results: Vec<serde_json::Value> = params
            .keywords
            .iter()
            .map(|kw| {
                serde_json::json!({
                    "keyword": kw,
                    "lines": self.log.search_content(kw, params.target_person.as_deref()),
                })
            })
            .collect();
        let json = serde_json::json!({ "results": results }).to_string();
        guard.record_result_chars(json.len() as u64);
        Ok(json)
    }

    /// Semantic similarity search over the embedding index.
    #[tool(description = "Semantic similarity search over message embeddings. Returns (line, score) pairs; empty when the semantic index is unavailable.")]
    async fn search_semantic(
        &self,
        Parameters(params): Parameters<SearchSemanticParams>,
    ) -> Result<String, String> {
        let session = params.session.as_deref().unwrap_or(DEFAULT_SESSION);
        let guard = self.budgets.guard_for(session);
        if !guard.can_proceed() {
            return Ok(serde_json::json!({
                "results": [],
                "available": self.semantic.is_some(),
                "gap_annotation": guard.gap_annotation(),
            })
            .to_string());
        }
        guard.record_tool_call();

        let Some(semantic) = self.semantic.clone() else {
            return Ok(serde_json::json!({
                "results": [],
                "available": false,
            })
            .to_string());
        };

        let top_k = params.top_k.unwrap_or(self.config.retrieval.sem_top_k);
        let query = params.query.clone();
        // Query embedding is CPU-heavy → spawn_blocking
        let results = tokio::task::spawn_blocking(move || semantic.search(&query, top_k))
            .await
            .map_err(|e| format!("search task failed: {e}"))?;

        let json = serde_json::json!({
            "results": results
                .iter()
                .map(|(line, score)| serde_json::json!({"line": line, "score": score}))
                .collect::<Vec<_>>(),
            "available": true,
        })
        .to_string();
        guard.record_result_chars(json.len() as u64);
        Ok(json)
    }

    /// Load specific lines with surrounding context.
    #[tool(description = "Load messages by line number with a context window. Counts loaded lines against the session message budget.")]
    async fn load_messages(
        &self,
        Parameters(params): Parameters<LoadMessagesParams>,
    ) -> Result<String, String> {
        let session = params.session.as_deref().unwrap_or(DEFAULT_SESSION);
        let guard = self.budgets.guard_for(session);
        if !guard.can_proceed() {
            return Ok(serde_json::json!({
                "messages": [],
                "gap_annotation": guard.gap_annotation(),
            })
            .to_string());
        }
        guard.record_tool_call();

        let granted = guard.try_reserve_messages(params.lines.len() as u64) as usize;
        let lines: Vec<u64> = params.lines.iter().copied().take(granted).collect();
        let truncated = granted < params.lines.len();

        let before = params.context_before.unwrap_or(1);
        let after = params.context_after.unwrap_or(1);
        let entries = self.log.get_by_lines(&lines, before, after);

        let json = serde_json::json!({
            "messages": entries,
            "truncated": truncated,
            "gap_annotation": if truncated { guard.gap_annotation() } else { None::<String> },
        })
        .to_string();
        guard.record_result_chars(json.len() as u64);
        Ok(json)
    }

    /// Summary statistics for the loaded chatlog.
    #[tool(description = "Chatlog statistics: message counts, parse failures, senders, topic counts, index availability.")]
    async fn log_stats(
        &self,
        Parameters(params): Parameters<LogStatsParams>,
    ) -> Result<String, String> {
        let stats = self.log.stats();
        let mut value =
            serde_json::to_value(&stats).map_err(|e| format!("serialization failed: {e}"))?;
        if let Some(obj) = value.as_object_mut() {
            if !params.include_senders.unwrap_or(true) {
                obj.remove("sender_counts");
            }
            obj.insert(
                "topic_count".into(),
                self.metadata.available_topics().len().into(),
            );
            obj.insert(
                "semantic_available".into(),
                self.engine.semantic_available().into(),
            );
        }
        serde_json::to_string(&value).map_err(|e| format!("serialization failed: {e}"))
    }

    /// End a retrieval session, releasing its budget.
    #[tool(description = "End a session and clear its budget counters.")]
    async fn end_session(
        &self,
        Parameters(params): Parameters<EndSessionParams>,
    ) -> Result<String, String> {
        let session = params.session.as_deref().unwrap_or(DEFAULT_SESSION);
        self.budgets.end_session(session);
        tracing::info!(session, "session ended");
        Ok(serde_json::json!({"status": "ended", "session": session}).to_string())
    }
}


#[tool_handler]
impl ServerHandler for TestimonyTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Testimony is a chatlog evidence-retrieval server. Use retrieve_evidence to \
                 collect budgeted evidence for a question, analyze_evidence to get the \
                 per-dimension conclusion scaffold, and load_messages to read specific lines."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

//! MCP server initialization for stdio and Streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that load the log
//! snapshot, its indices, and the budget registry, and wire them into a
//! running server.

use crate::config::TestimonyConfig;
use crate::embedding;
use crate::index::{MetadataIndex, SemanticIndex};
use crate::log::MessageStore;
use crate::retrieval::{BudgetRegistry, EvidenceStore};
use crate::tools::TestimonyTools;
use crate::understand::Understanding;
use anyhow::{Context, Result};
use rmcp::ServiceExt;
use std::sync::Arc;

struct SharedState {
    log: Arc<MessageStore>,
    metadata: Arc<MetadataIndex>,
    semantic: Option<Arc<SemanticIndex>>,
    evidence: Arc<EvidenceStore>,
    budgets: Arc<BudgetRegistry>,
    understanding: Arc<Understanding>,
    config: Arc<TestimonyConfig>,
}

/// Shared setup: load the log, load or rebuild the metadata index, attach the
/// semantic index when its artifacts exist.
fn setup_shared_state(config: TestimonyConfig) -> Result<SharedState> {
    let log_path = config.resolved_log_path();
    let log = Arc::new(
        MessageStore::load(&log_path)
            .with_context(|| format!("failed to load chatlog {}", log_path.display()))?,
    );

    let metadata_path = config.resolved_metadata_index_path();
    let metadata = if metadata_path.exists() {
        let index = MetadataIndex::load(&metadata_path)?;
        tracing::info!(path = %metadata_path.display(), "metadata index loaded");
        Arc::new(index)
    } else {
        tracing::info!("no metadata index on disk, building from log");
        Arc::new(MetadataIndex::build(&log))
    };

    // Semantic artifacts are optional: without them retrieval degrades to
    // topic and keyword recall only.
    let semantic_paths = config.semantic_paths();
    let semantic = if semantic_paths.is_available() {
        let provider = embedding::create_provider(&config.embedding)?;
        let index = SemanticIndex::load(&semantic_paths, Arc::from(provider))?;
        Some(Arc::new(index))
    } else {
        tracing::warn!("semantic index artifacts not found — run `testimony embed` to build them");
        None
    };

    let evidence = Arc::new(EvidenceStore::new(config.retrieval.evidence_capacity));
    let budgets = Arc::new(BudgetRegistry::new(config.budget_limits()));
    let understanding = Arc::new(config.understanding());

    Ok(SharedState {
        log,
        metadata,
        semantic,
        evidence,
        budgets,
        understanding,
        config: Arc::new(config),
    })
}

fn build_tools(state: &SharedState) -> TestimonyTools {
    TestimonyTools::new(
        Arc::clone(&state.log),
        Arc::clone(&state.metadata),
        state.semantic.clone(),
        Arc::clone(&state.evidence),
        Arc::clone(&state.budgets),
        Arc::clone(&state.understanding),
        Arc::clone(&state.config),
    )
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: TestimonyConfig) -> Result<()> {
    tracing::info!("starting testimony MCP server on stdio");

    let state = setup_shared_state(config)?;
    let tools = build_tools(&state);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running — waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP transport.
pub async fn serve_http(config: TestimonyConfig) -> Result<()> {
    let bind_addr = config.server.http_addr.clone();
    tracing::info!(addr = %bind_addr, "starting testimony MCP server on HTTP");

    let state = setup_shared_state(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(build_tools(&state)),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}

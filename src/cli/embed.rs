use anyhow::Result;
use indicatif::ProgressBar;
use std::time::Duration;

use crate::config::TestimonyConfig;
use crate::index::SemanticIndex;
use crate::log::MessageStore;

/// Build the semantic index artifacts (embedding matrix + manifest).
pub async fn embed(config: &TestimonyConfig) -> Result<()> {
    let log_path = config.resolved_log_path();
    let store = MessageStore::load(&log_path)?;
    println!("Embedding {} messages...", store.len());

    let provider = crate::embedding::create_provider(&config.embedding)?;
    let paths = config.semantic_paths();
    let model = config.embedding.model.clone();

    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("running local inference");

    // ONNX inference is CPU-bound and synchronous
    let report = tokio::task::spawn_blocking(move || {
        SemanticIndex::build_from_log(&store, provider.as_ref(), &paths, &model)
    })
    .await??;

    pb.finish_and_clear();
    println!("Semantic index written:");
    println!("  Matrix:     {}", report.matrix_path);
    println!("  Manifest:   {}", report.manifest_path);
    println!("  Rows:       {}", report.rows);
    println!("  Dimensions: {}", report.dimensions);

    Ok(())
}

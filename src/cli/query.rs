use anyhow::Result;
use std::sync::Arc;

use crate::config::TestimonyConfig;
use crate::index::{MetadataIndex, SemanticIndex};
use crate::log::MessageStore;
use crate::retrieval::{analyze, BudgetGuard, RetrievalEngine};

/// One-shot retrieval from the terminal: plan, retrieve, analyze, print.
pub async fn query(
    config: &TestimonyConfig,
    question: &str,
    target_person: Option<&str>,
) -> Result<()> {
    let log = Arc::new(MessageStore::load(config.resolved_log_path())?);

    let metadata_path = config.resolved_metadata_index_path();
    let metadata = if metadata_path.exists() {
        Arc::new(MetadataIndex::load(&metadata_path)?)
    } else {
        Arc::new(MetadataIndex::build(&log))
    };

    let semantic_paths = config.semantic_paths();
    let semantic = if semantic_paths.is_available() {
        let provider = crate::embedding::create_provider(&config.embedding)?;
        Some(Arc::new(SemanticIndex::load(
            &semantic_paths,
            Arc::from(provider),
        )?))
    } else {
        println!("(semantic index unavailable, topic/keyword recall only)");
        None
    };

    let understanding = config.understanding();
    let plan = understanding
        .expand(
            question,
            target_person,
            metadata.available_topics(),
            config.retrieval.max_dimensions,
        )
        .await;
    println!("Keywords: {}", plan.keywords.join(", "));

    let engine = RetrievalEngine::new(
        Arc::clone(&log),
        Arc::clone(&metadata),
        semantic,
        config.retrieval_options(),
    );
    let budget = BudgetGuard::new(config.budget_limits());
    budget.record_tool_call();

    let engine_budget = &budget;
    let bundle = tokio::task::block_in_place(|| {
        engine.retrieve(question, target_person, &plan.dimensions, engine_budget)
    });

    for dim in &bundle.dimensions {
        println!("\n[{}] {}", dim.plan.name, dim.plan.intent);
        if !dim.retrieved {
            println!("  (skipped: budget exhausted)");
            continue;
        }
        if dim.evidence.is_empty() {
            println!("  no evidence found");
        }
        for item in &dim.evidence {
            println!(
                "  L{:>4} {:.3}  {}: {}",
                item.line, item.fusion_score, item.sender, item.snippet
            );
        }
        for item in &dim.counter_evidence {
            println!(
                "  L{:>4} {:.3}  [counter] {}: {}",
                item.line, item.fusion_score, item.sender, item.snippet
            );
        }
    }

    let matrix = analyze(&bundle);
    println!("\nAssessment:");
    for a in &matrix.assessments {
        println!(
            "  {:<22} {:?} ({} evidence, {} counter){}",
            a.name,
            a.confidence,
            a.evidence_count,
            a.counter_count,
            a.gap
                .as_deref()
                .map(|g| format!(" — {g}"))
                .unwrap_or_default()
        );
    }
    if let Some(gap) = &bundle.gap_annotation {
        println!("\nNote: {gap}");
    }

    Ok(())
}

mod helpers;

use std::sync::Arc;

use helpers::simple_log;
use testimony::index::MetadataIndex;
use testimony::log::MessageStore;
use testimony::retrieval::{
    analyze, BudgetLimits, BudgetRegistry, BudgetState, Confidence, Dimension, EvidenceStore,
    RetrievalEngine, RetrievalOptions, RetrievalOutcome,
};
use testimony::understand::RuleBased;

fn lending_engine() -> (tempfile::NamedTempFile, RetrievalEngine, Arc<MetadataIndex>) {
    let (file, store) = simple_log(&[
        ("priya: how is the new job going", &[], "low"),
        ("marco: got my first salary, 4200 a month", &["income"], "high"),
        ("marco: already spent half of it on the bike", &["spending"], "medium"),
        ("priya: did you pay dana back?", &["loan"], "low"),
        ("marco: yes, repaid dana the full 500 last week", &["loan"], "high"),
    ]);
    let store = Arc::new(store);
    let metadata = Arc::new(MetadataIndex::build(&store));
    let engine = RetrievalEngine::new(
        store,
        Arc::clone(&metadata),
        None,
        RetrievalOptions::default(),
    );
    (file, engine, metadata)
}

// The tool-layer contract: every retrieval call checks can_proceed first and
// records itself. With max_tool_calls = 1, the second call in a session must
// return empty evidence plus a gap annotation naming the tool-call ceiling.
#[test]
fn second_call_after_tool_ceiling_returns_gap_annotation() {
    let (_f, engine, _metadata) = lending_engine();
    let registry = BudgetRegistry::new(BudgetLimits {
        max_tool_calls: 1,
        max_loaded_messages: 40,
        max_result_chars: 12_000,
    });
    let dim = Dimension {
        name: "income".into(),
        topic_seeds: vec!["income".into()],
        ..Default::default()
    };

    // First call proceeds and finds evidence
    let guard = registry.guard_for("s1");
    assert!(guard.can_proceed());
    guard.record_tool_call();
    let bundle = engine.retrieve("income?", None, std::slice::from_ref(&dim), &guard);
    assert!(bundle.total_evidence() > 0);

    // Second call is refused before any work happens
    let guard = registry.guard_for("s1");
    assert!(!guard.can_proceed());
    assert_eq!(guard.state(), BudgetState::Exhausted);
    let note = guard.gap_annotation().unwrap();
    assert!(note.contains("tool call limit"));

    // Ending the session resets the guard
    registry.end_session("s1");
    assert!(registry.guard_for("s1").can_proceed());
}

// Sessions are independent: exhausting one leaves another untouched.
#[test]
fn sessions_do_not_share_budgets() {
    let registry = BudgetRegistry::new(BudgetLimits {
        max_tool_calls: 1,
        max_loaded_messages: 40,
        max_result_chars: 12_000,
    });
    registry.guard_for("a").record_tool_call();
    assert!(!registry.guard_for("a").can_proceed());
    assert!(registry.guard_for("b").can_proceed());
}

// A stored bundle round-trips through the staging area, and the outward
// outcome distinguishes "evidence" from "no evidence".
#[test]
fn outcome_and_staging_round_trip() {
    let (_f, engine, _metadata) = lending_engine();
    let evidence_store = EvidenceStore::new(8);
    let registry = BudgetRegistry::new(BudgetLimits::default());
    let guard = registry.guard_for("s1");

    let dim = Dimension {
        name: "repayment".into(),
        topic_seeds: vec!["loan".into()],
        min_evidence: 1,
        ..Default::default()
    };
    let bundle = engine.retrieve("did marco repay?", Some("marco"), &[dim], &guard);
    assert!(!bundle.is_empty());

    let handle = evidence_store.store(bundle.clone());
    let outcome = RetrievalOutcome::from_bundle(&bundle, Some(handle.clone()));
    assert!(matches!(outcome, RetrievalOutcome::Evidence { .. }));

    let fetched = evidence_store.get(&handle).unwrap();
    let matrix = analyze(&fetched);
    assert_eq!(matrix.assessments[0].name, "repayment");
    assert!(matrix.assessments[0].evidence_count >= 1);
    assert_eq!(matrix.assessments[0].confidence, Confidence::Strong);

    // An empty bundle maps to NoEvidence even if a handle exists
    let empty_dim = Dimension {
        name: "nothing".into(),
        topic_seeds: vec!["no-such-topic".into()],
        ..Default::default()
    };
    let empty = engine.retrieve("?", None, &[empty_dim], &guard);
    assert!(empty.is_empty());
    let outcome = RetrievalOutcome::from_bundle(&empty, None);
    assert!(matches!(outcome, RetrievalOutcome::NoEvidence { .. }));
}

// End-to-end with the rule-based planner: a lending question over a log with
// income/spending/loan topics produces evidence in every planned facet.
#[test]
fn rule_based_plan_drives_retrieval() {
    let (_f, engine, metadata) = lending_engine();
    let plan = RuleBased.expand(
        "should priya lend marco 2000?",
        Some("marco"),
        metadata.available_topics(),
        5,
    );
    assert_eq!(plan.dimensions.len(), 3);

    let registry = BudgetRegistry::new(BudgetLimits::default());
    let guard = registry.guard_for("s1");
    guard.record_tool_call();
    let bundle = engine.retrieve(
        "should priya lend marco 2000?",
        Some("marco"),
        &plan.dimensions,
        &guard,
    );

    let income = &bundle.dimensions[0];
    assert_eq!(income.plan.name, "income-stability");
    assert!(income.evidence.iter().any(|e| e.line == 2));

    let repayment = &bundle.dimensions[2];
    assert_eq!(repayment.plan.name, "repayment-history");
    assert!(repayment.evidence.iter().any(|e| e.line == 5));
    // Soft target tagging survives the pipeline
    assert!(repayment
        .evidence
        .iter()
        .filter(|e| e.line == 5)
        .all(|e| e.mentions_target));
}

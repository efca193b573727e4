use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::index::{MetadataIndex, SemanticIndex};
use crate::log::MessageStore;

use super::budget::BudgetGuard;
use super::evidence::{ContextLine, DimensionEvidence, EvidenceBundle, EvidenceItem};
use super::plan::Dimension;

/// Maximum characters of message body kept in an evidence snippet.
const SNIPPET_CHARS: usize = 160;

/// Ranking and windowing knobs, normally sourced from config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOptions {
    /// Weight for topic/keyword presence in score fusion.
    pub kw_weight: f32,
    /// Weight for normalized semantic similarity in score fusion.
    pub sem_weight: f32,
    /// Per-query top-k for semantic recall.
    pub sem_top_k: usize,
    /// Cap on evidence items per dimension, before budget capping.
    pub max_per_dimension: usize,
    pub context_before: u64,
    pub context_after: u64,
    /// Flat bonus for high/medium information-density lines.
    pub density_bonus: f32,
    /// Cap on dimensions processed per retrieve call.
    pub max_dimensions: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            kw_weight: 0.4,
            sem_weight: 0.6,
            sem_top_k: 15,
            max_per_dimension: 8,
            context_before: 1,
            context_after: 1,
            density_bonus: 0.15,
            max_dimensions: 5,
        }
    }
}

/// Hybrid retrieval over one immutable log snapshot.
///
/// All inputs are injected at construction and shared read-only; the only
/// mutable collaborator is the per-session [`BudgetGuard`] passed into each
/// call. One `retrieve` call is a synchronous, budget-gated function of its
/// arguments.
pub struct RetrievalEngine {
    log: Arc<MessageStore>,
    metadata: Arc<MetadataIndex>,
    semantic: Option<Arc<SemanticIndex>>,
    options: RetrievalOptions,
}

impl RetrievalEngine {
    pub fn new(
        log: Arc<MessageStore>,
        metadata: Arc<MetadataIndex>,
        semantic: Option<Arc<SemanticIndex>>,
        options: RetrievalOptions,
    ) -> Self {
        Self {
            log,
            metadata,
            semantic,
            options,
        }
    }

    pub fn semantic_available(&self) -> bool {
        self.semantic.is_some()
    }

    /// Collect evidence for every dimension of a plan, in order, until the
    /// budget runs out. Dimensions skipped for budget reasons still appear in
    /// the bundle with their plan intact, so the caller can see what went
    /// unretrieved.
    pub fn retrieve(
        &self,
        question: &str,
        target_person: Option<&str>,
        dimensions: &[Dimension],
        budget: &BudgetGuard,
    ) -> EvidenceBundle {
        let mut results = Vec::with_capacity(dimensions.len());
        for (i, dimension) in dimensions.iter().enumerate() {
            if i >= self.options.max_dimensions || !budget.can_proceed() {
                results.push(DimensionEvidence::skipped(dimension.clone()));
                continue;
            }
            results.push(self.retrieve_dimension(dimension, target_person, budget));
        }

        let bundle = EvidenceBundle {
            question: question.to_string(),
            target_person: target_person.map(str::to_string),
            dimensions: results,
            gap_annotation: budget.gap_annotation(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        tracing::info!(
            question,
            dimensions = dimensions.len(),
            evidence = bundle.total_evidence(),
            truncated = bundle.gap_annotation.is_some(),
            "retrieval complete"
        );
        bundle
    }

    /// Run the full recall / fusion / selection / expansion pipeline for one
    /// dimension. Infallible: every degraded input state maps to a smaller
    /// (possibly empty) evidence list.
    pub fn retrieve_dimension(
        &self,
        dimension: &Dimension,
        target_person: Option<&str>,
        budget: &BudgetGuard,
    ) -> DimensionEvidence {
        if dimension.is_unseeded() {
            tracing::debug!(dimension = %dimension.name, "dimension has no seeds, skipping recall");
            return DimensionEvidence {
                plan: dimension.clone(),
                retrieved: true,
                evidence: Vec::new(),
                counter_evidence: Vec::new(),
            };
        }

        // Topic recall. Seeds missing from the index are dropped silently;
        // an absent topic and a present-but-empty topic look identical here.
        let known_seeds: Vec<String> = dimension
            .topic_seeds
            .iter()
            .filter(|&s| self.metadata.available_topics().contains(s))
            .cloned()
            .collect();
        let topic_lines: HashSet<u64> = self
            .metadata
            .search_by_topics(&known_seeds)
            .into_iter()
            .collect();

        let semantic_scores = self.semantic_recall(&dimension.semantic_queries);

        // Keyword fallback fires only when both primary signals came back empty.
        let keyword_lines: HashSet<u64> = if topic_lines.is_empty() && semantic_scores.is_empty() {
            dimension
                .keyword_seeds
                .iter()
                .flat_map(|kw| self.log.search_content(kw, target_person))
                .collect()
        } else {
            HashSet::new()
        };

        let ranked = self.fuse_and_rank(&topic_lines, &keyword_lines, &semantic_scores);

        // Budget cap is applied to items actually emitted. Reservation is
        // atomic so parallel dimensions cannot jointly overshoot.
        let want = ranked.len().min(self.options.max_per_dimension);
        let granted = budget.try_reserve_messages(want as u64) as usize;
        let selected: Vec<(u64, f32)> = ranked.into_iter().take(granted).collect();
        let selected_lines: HashSet<u64> = selected.iter().map(|&(line, _)| line).collect();

        let evidence =
            self.expand_to_items(&selected, dimension, target_person, false);
        // Selected lines missing from the store (stale semantic manifest)
        // emit nothing; only emitted items stay charged.
        if evidence.len() < granted {
            budget.release_messages((granted - evidence.len()) as u64);
        }

        let counter_evidence =
            self.counter_recall(dimension, target_person, &selected_lines, budget);

        tracing::debug!(
            dimension = %dimension.name,
            evidence = evidence.len(),
            counter = counter_evidence.len(),
            "dimension retrieved"
        );

        DimensionEvidence {
            plan: dimension.clone(),
            retrieved: true,
            evidence,
            counter_evidence,
        }
    }

    /// Per-line semantic score across all queries, taking the maximum rather
    /// than the sum so near-duplicate phrasings do not inflate scores.
    /// Raw cosine is mapped to [0, 1] here.
    fn semantic_recall(&self, queries: &[String]) -> HashMap<u64, f32> {
        let Some(semantic) = &self.semantic else {
            return HashMap::new();
        };
        let mut scores: HashMap<u64, f32> = HashMap::new();
        for query in queries {
            for (line, cosine) in semantic.search(query, self.options.sem_top_k) {
                let normalized = ((cosine + 1.0) / 2.0).clamp(0.0, 1.0);
                scores
                    .entry(line)
                    .and_modify(|s| *s = s.max(normalized))
                    .or_insert(normalized);
            }
        }
        scores
    }

    /// Weighted fusion of keyword presence and semantic similarity, with a
    /// flat density bonus, sorted by (score desc, line desc).
    fn fuse_and_rank(
        &self,
        topic_lines: &HashSet<u64>,
        keyword_lines: &HashSet<u64>,
        semantic_scores: &HashMap<u64, f32>,
    ) -> Vec<(u64, f32)> {
        let weight_sum = self.options.kw_weight + self.options.sem_weight;
        let (kw_w, sem_w) = if weight_sum > 0.0 {
            (
                self.options.kw_weight / weight_sum,
                self.options.sem_weight / weight_sum,
            )
        } else {
            (0.5, 0.5)
        };

        let high_value: HashSet<u64> =
            self.metadata.get_high_value_messages().into_iter().collect();

        let mut candidates: HashSet<u64> = topic_lines
            .union(keyword_lines)
            .copied()
            .collect();
        candidates.extend(semantic_scores.keys().copied());

        let mut ranked: Vec<(u64, f32)> = candidates
            .into_iter()
            .map(|line| {
                let kw_hit = topic_lines.contains(&line) || keyword_lines.contains(&line);
                let mut score = kw_w * (kw_hit as u8 as f32)
                    + sem_w * semantic_scores.get(&line).copied().unwrap_or(0.0);
                if high_value.contains(&line) {
                    score += self.options.density_bonus;
                }
                (line, score)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });
        ranked
    }

    /// Independent semantic recall over counter queries, excluding lines
    /// already selected as evidence, capped at half the per-dimension limit.
    fn counter_recall(
        &self,
        dimension: &Dimension,
        target_person: Option<&str>,
        exclude: &HashSet<u64>,
        budget: &BudgetGuard,
    ) -> Vec<EvidenceItem> {
        if dimension.counter_queries.is_empty() {
            return Vec::new();
        }
        let scores = self.semantic_recall(&dimension.counter_queries);
        if scores.is_empty() {
            return Vec::new();
        }
        let mut ranked: Vec<(u64, f32)> = scores
            .into_iter()
            .filter(|(line, _)| !exclude.contains(line))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });

        let cap = (self.options.max_per_dimension / 2).max(1);
        let want = ranked.len().min(cap);
        let granted = budget.try_reserve_messages(want as u64) as usize;
        ranked.truncate(granted);

        let items = self.expand_to_items(&ranked, dimension, target_person, true);
        if items.len() < granted {
            budget.release_messages((granted - items.len()) as u64);
        }
        items
    }

    /// Turn selected lines into evidence items with a symmetric context
    /// window. Only requested lines become items; window filler lands in
    /// each item's `context`.
    fn expand_to_items(
        &self,
        selected: &[(u64, f32)],
        dimension: &Dimension,
        target_person: Option<&str>,
        is_counter: bool,
    ) -> Vec<EvidenceItem> {
        let target_lower = target_person.map(str::to_lowercase);
        selected
            .iter()
            .filter_map(|&(line, score)| {
                let message = self.log.get(line)?;
                let window = self.log.get_by_lines(
                    &[line],
                    self.options.context_before,
                    self.options.context_after,
                );
                let context: Vec<ContextLine> = window
                    .into_iter()
                    .filter(|entry| !entry.is_match)
                    .map(|entry| ContextLine {
                        line: entry.message.line,
                        sender: entry.message.sender,
                        content: entry.message.content,
                    })
                    .collect();

                let mentions_target = target_lower.as_deref().is_some_and(|t| {
                    message.sender.to_lowercase().contains(t)
                        || message.body.to_lowercase().contains(t)
                });

                Some(EvidenceItem {
                    line,
                    time: message.timestamp.clone(),
                    sender: message.sender.clone(),
                    content: message.content.clone(),
                    snippet: snippet(&message.body),
                    topics: message.topics.clone(),
                    fusion_score: score,
                    dimension_name: dimension.name.clone(),
                    mentions_target,
                    is_counter,
                    context,
                })
            })
            .collect()
    }
}

fn snippet(body: &str) -> String {
    if body.chars().count() <= SNIPPET_CHARS {
        return body.to_string();
    }
    let cut: String = body.chars().take(SNIPPET_CHARS).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::budget::{BudgetLimits, BudgetGuard};
    use std::io::Write;

    fn make_store(records: &[(&str, &[&str], &str)]) -> (tempfile::NamedTempFile, Arc<MessageStore>) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for (content, topics, density) in records {
            let rec = serde_json::json!({
                "content": content,
                "timestamp": "2026-01-02T10:00:00",
                "metadata": {
                    "topics": topics,
                    "sentiment": "neutral",
                    "facts": {},
                    "information_density": density
                }
            });
            writeln!(file, "{rec}").unwrap();
        }
        file.flush().unwrap();
        let store = Arc::new(MessageStore::load(file.path()).unwrap());
        (file, store)
    }

    fn engine_for(store: Arc<MessageStore>, options: RetrievalOptions) -> RetrievalEngine {
        let metadata = Arc::new(MetadataIndex::build(&store));
        RetrievalEngine::new(store, metadata, None, options)
    }

    fn fresh_budget() -> BudgetGuard {
        BudgetGuard::new(BudgetLimits::default())
    }

    #[test]
    fn topic_seed_selects_line_with_symmetric_context() {
        let (_f, store) = make_store(&[
            ("alice: hello there", &[], "low"),
            ("bob: I need a loan for the car", &["loan"], "low"),
            ("alice: how much do you need", &[], "low"),
        ]);
        let engine = engine_for(store, RetrievalOptions::default());
        let dim = Dimension {
            name: "borrowing".into(),
            topic_seeds: vec!["loan".into()],
            min_evidence: 1,
            ..Default::default()
        };
        let budget = fresh_budget();
        let result = engine.retrieve_dimension(&dim, None, &budget);
        assert!(result.retrieved);
        assert_eq!(result.evidence.len(), 1);
        let item = &result.evidence[0];
        assert_eq!(item.line, 2);
        let context_lines: Vec<u64> = item.context.iter().map(|c| c.line).collect();
        assert_eq!(context_lines, vec![1, 3]);
    }

    #[test]
    fn unknown_topic_seed_is_dropped_silently() {
        let (_f, store) = make_store(&[("alice: hi", &[], "low")]);
        let engine = engine_for(store, RetrievalOptions::default());
        let dim = Dimension {
            name: "missing".into(),
            topic_seeds: vec!["no-such-topic".into()],
            ..Default::default()
        };
        let result = engine.retrieve_dimension(&dim, None, &fresh_budget());
        assert!(result.retrieved);
        assert!(result.evidence.is_empty());
    }

    #[test]
    fn keyword_fallback_only_when_topic_recall_empty() {
        let (_f, store) = make_store(&[
            ("bob: the rent was late again", &[], "low"),
            ("bob: payment sent for the loan", &["loan"], "low"),
        ]);
        let engine = engine_for(store, RetrievalOptions::default());

        // Topic recall present: keyword seed must not add line 1
        let with_topic = Dimension {
            name: "with-topic".into(),
            topic_seeds: vec!["loan".into()],
            keyword_seeds: vec!["rent".into()],
            ..Default::default()
        };
        let result = engine.retrieve_dimension(&with_topic, None, &fresh_budget());
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.evidence[0].line, 2);

        // No topic signal at all: keyword scan kicks in
        let fallback = Dimension {
            name: "fallback".into(),
            topic_seeds: vec!["unknown".into()],
            keyword_seeds: vec!["rent".into()],
            ..Default::default()
        };
        let result = engine.retrieve_dimension(&fallback, None, &fresh_budget());
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.evidence[0].line, 1);
    }

    #[test]
    fn ties_break_toward_higher_line_numbers() {
        let (_f, store) = make_store(&[
            ("a: loan talk", &["loan"], "low"),
            ("b: more loan talk", &["loan"], "low"),
            ("c: final loan talk", &["loan"], "low"),
        ]);
        let engine = engine_for(store, RetrievalOptions::default());
        let dim = Dimension {
            name: "loans".into(),
            topic_seeds: vec!["loan".into()],
            ..Default::default()
        };
        let result = engine.retrieve_dimension(&dim, None, &fresh_budget());
        let lines: Vec<u64> = result.evidence.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 2, 1]);
    }

    #[test]
    fn density_bonus_outranks_equal_plain_hit() {
        let (_f, store) = make_store(&[
            ("a: salary is 4200 a month", &["income"], "high"),
            ("b: nice weather and income stuff", &["income"], "low"),
        ]);
        let engine = engine_for(store, RetrievalOptions::default());
        let dim = Dimension {
            name: "income".into(),
            topic_seeds: vec!["income".into()],
            ..Default::default()
        };
        let result = engine.retrieve_dimension(&dim, None, &fresh_budget());
        // Line 2 would win the tie-break; the density bonus flips it
        assert_eq!(result.evidence[0].line, 1);
        assert!(result.evidence[0].fusion_score > result.evidence[1].fusion_score);
    }

    #[test]
    fn unseeded_dimension_is_empty_and_deterministic() {
        let (_f, store) = make_store(&[("a: anything", &["x"], "low")]);
        let engine = engine_for(store, RetrievalOptions::default());
        let dim = Dimension {
            name: "empty".into(),
            ..Default::default()
        };
        let result = engine.retrieve_dimension(&dim, None, &fresh_budget());
        assert!(result.retrieved);
        assert!(result.evidence.is_empty());
        assert!(result.counter_evidence.is_empty());
    }

    #[test]
    fn exhausted_budget_skips_dimensions_with_plan_intact() {
        let (_f, store) = make_store(&[
            ("a: loan one", &["loan"], "low"),
            ("b: loan two", &["loan"], "low"),
        ]);
        let engine = engine_for(store, RetrievalOptions::default());
        let budget = BudgetGuard::new(BudgetLimits {
            max_tool_calls: 10,
            max_loaded_messages: 2,
            max_result_chars: 100_000,
        });
        let dims = vec![
            Dimension {
                name: "first".into(),
                topic_seeds: vec!["loan".into()],
                ..Default::default()
            },
            Dimension {
                name: "second".into(),
                topic_seeds: vec!["loan".into()],
                ..Default::default()
            },
        ];
        let bundle = engine.retrieve("any loans?", None, &dims, &budget);
        assert_eq!(bundle.dimensions[0].evidence.len(), 2);
        assert!(!bundle.dimensions[1].retrieved);
        assert!(bundle.dimensions[1].evidence.is_empty());
        assert_eq!(bundle.dimensions[1].plan.name, "second");
        assert!(bundle.gap_annotation.is_some());
    }

    #[test]
    fn total_emitted_never_exceeds_message_budget() {
        let (_f, store) = make_store(&[
            ("a: loan 1", &["loan"], "low"),
            ("b: loan 2", &["loan"], "low"),
            ("c: loan 3", &["loan"], "low"),
            ("d: loan 4", &["loan"], "low"),
            ("e: loan 5", &["loan"], "low"),
        ]);
        let engine = engine_for(store, RetrievalOptions::default());
        let budget = BudgetGuard::new(BudgetLimits {
            max_tool_calls: 10,
            max_loaded_messages: 3,
            max_result_chars: 100_000,
        });
        let dims: Vec<Dimension> = (0..3)
            .map(|i| Dimension {
                name: format!("d{i}"),
                topic_seeds: vec!["loan".into()],
                ..Default::default()
            })
            .collect();
        let bundle = engine.retrieve("loans", None, &dims, &budget);
        assert!(bundle.total_evidence() <= 3);
    }

    #[test]
    fn mentions_target_is_a_tag_not_a_filter() {
        let (_f, store) = make_store(&[
            ("dana: my loan is fine", &["loan"], "low"),
            ("erik: loans in general", &["loan"], "low"),
        ]);
        let engine = engine_for(store, RetrievalOptions::default());
        let dim = Dimension {
            name: "loans".into(),
            topic_seeds: vec!["loan".into()],
            ..Default::default()
        };
        let result = engine.retrieve_dimension(&dim, Some("dana"), &fresh_budget());
        assert_eq!(result.evidence.len(), 2);
        let by_line: HashMap<u64, bool> = result
            .evidence
            .iter()
            .map(|e| (e.line, e.mentions_target))
            .collect();
        assert!(by_line[&1]);
        assert!(!by_line[&2]);
    }
}

//! Query understanding: turn a natural-language question into keywords and a
//! dimension plan.
//!
//! Two interchangeable strategies behind one interface: a deterministic
//! rule-based planner, and an LLM-backed HTTP endpoint that falls back to the
//! rule-based output on any failure. Compression is cosmetic only and never
//! changes which evidence was selected.

use std::time::Duration;

use serde::Deserialize;

use crate::retrieval::{Dimension, DimensionPlan};

/// Words stripped during keyword extraction.
const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "been", "but", "can", "could", "did", "do", "does", "for",
    "from", "had", "has", "have", "how", "i", "is", "it", "its", "of", "on", "or", "should",
    "that", "the", "their", "them", "they", "this", "to", "was", "were", "what", "when", "where",
    "which", "who", "why", "will", "with", "would", "you",
];

/// Question markers that select the lending-assessment plan.
const LENDING_MARKERS: &[&str] = &["loan", "lend", "borrow", "repay", "owe", "credit", "debt"];

/// Upper bound for cosmetic truncation in the rule-based compressor.
const COMPRESS_CHARS: usize = 600;

/// Query-understanding strategy. Both variants produce the same output
/// shapes; only `LlmBacked` can fail, and it degrades to `RuleBased` when it
/// does.
pub enum Understanding {
    RuleBased(RuleBased),
    LlmBacked(LlmBacked),
}

impl Understanding {
    /// Expand a question into keywords plus a dimension plan, capped at
    /// `max_dimensions`.
    pub async fn expand(
        &self,
        question: &str,
        target_person: Option<&str>,
        available_topics: &[String],
        max_dimensions: usize,
    ) -> DimensionPlan {
        match self {
            Self::RuleBased(rb) => rb.expand(question, target_person, available_topics, max_dimensions),
            Self::LlmBacked(llm) => {
                llm.expand(question, target_person, available_topics, max_dimensions)
                    .await
            }
        }
    }

    /// Shorten evidence text for display. Never alters evidence selection.
    pub async fn compress(&self, text: &str, question: &str) -> String {
        match self {
            Self::RuleBased(rb) => rb.compress(text),
            Self::LlmBacked(llm) => llm.compress(text, question).await,
        }
    }
}

/// Deterministic planner: stop-word keyword extraction, fuzzy topic matching
/// against the index's topic labels, and canned dimension templates.
#[derive(Default)]
pub struct RuleBased;

impl RuleBased {
    pub fn expand(
        &self,
        question: &str,
        target_person: Option<&str>,
        available_topics: &[String],
        max_dimensions: usize,
    ) -> DimensionPlan {
        let keywords = extract_keywords(question);
        let mut dimensions = if is_lending_question(question) {
            self.lending_plan(&keywords, target_person, available_topics)
        } else {
            self.generic_plan(question, &keywords, available_topics)
        };
        dimensions.truncate(max_dimensions.max(1));
        DimensionPlan {
            keywords,
            dimensions,
        }
    }

    pub fn compress(&self, text: &str) -> String {
        if text.chars().count() <= COMPRESS_CHARS {
            return text.to_string();
        }
        let cut: String = text.chars().take(COMPRESS_CHARS).collect();
        format!("{}…", cut.trim_end())
    }

    /// Three-facet plan for "should X lend/borrow" style questions.
    fn lending_plan(
        &self,
        keywords: &[String],
        target_person: Option<&str>,
        available_topics: &[String],
    ) -> Vec<Dimension> {
        let target = target_person.unwrap_or("the person");
        vec![
            Dimension {
                name: "income-stability".into(),
                intent: format!("whether {target} has steady income"),
                topic_seeds: fuzzy_topics(&["income", "job", "salary", "work", "employment"], available_topics),
                keyword_seeds: vec!["salary".into(), "paycheck".into(), "job".into()],
                semantic_queries: vec![
                    "stable income and employment".into(),
                    "how much money they earn".into(),
                ],
                counter_queries: vec!["lost job or unstable income".into()],
                min_evidence: 2,
            },
            Dimension {
                name: "spending-and-assets".into(),
                intent: format!("how {target} spends and what they own"),
                topic_seeds: fuzzy_topics(&["spending", "purchase", "savings", "assets", "money"], available_topics),
                keyword_seeds: vec!["bought".into(), "spent".into(), "savings".into()],
                semantic_queries: vec![
                    "spending habits and big purchases".into(),
                    "savings or valuable assets".into(),
                ],
                counter_queries: vec!["reckless spending or gambling".into()],
                min_evidence: 2,
            },
            Dimension {
                name: "repayment-history".into(),
                intent: format!("whether {target} repays debts on time"),
                topic_seeds: fuzzy_topics(&["loan", "debt", "repayment", "borrowing"], available_topics),
                keyword_seeds: {
                    let mut seeds = vec!["paid back".into(), "owe".into(), "borrowed".into()];
                    seeds.extend(keywords.iter().cloned());
                    seeds
                },
                semantic_queries: vec![
                    "paying back borrowed money".into(),
                    "late or missed payments".into(),
                ],
                counter_queries: vec!["never paid back what they owed".into()],
                min_evidence: 2,
            },
        ]
    }

    /// General-purpose facets for any other question.
    fn generic_plan(
        &self,
        question: &str,
        keywords: &[String],
        available_topics: &[String],
    ) -> Vec<Dimension> {
        let seeds = fuzzy_topics(
            &keywords.iter().map(String::as_str).collect::<Vec<_>>(),
            available_topics,
        );
        vec![
            Dimension {
                name: "facts".into(),
                intent: "concrete statements relevant to the question".into(),
                topic_seeds: seeds.clone(),
                keyword_seeds: keywords.to_vec(),
                semantic_queries: vec![question.to_string()],
                counter_queries: Vec::new(),
                min_evidence: 2,
            },
            Dimension {
                name: "opinions".into(),
                intent: "expressed views and sentiment on the subject".into(),
                topic_seeds: seeds.clone(),
                keyword_seeds: keywords.to_vec(),
                semantic_queries: vec![format!("opinions and feelings about {question}")],
                counter_queries: vec![format!("disagreement about {question}")],
                min_evidence: 1,
            },
            Dimension {
                name: "behavior".into(),
                intent: "actions taken, as opposed to statements".into(),
                topic_seeds: seeds,
                keyword_seeds: keywords.to_vec(),
                semantic_queries: vec![format!("things someone actually did regarding {question}")],
                counter_queries: Vec::new(),
                min_evidence: 1,
            },
        ]
    }
}

/// LLM-backed planner over an HTTP JSON endpoint. Any failure, including
/// timeout and malformed responses, degrades to the rule-based output.
pub struct LlmBacked {
    client: reqwest::Client,
    endpoint: String,
    fallback: RuleBased,
}

#[derive(Deserialize)]
struct CompressResponse {
    compressed: String,
}

impl LlmBacked {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            fallback: RuleBased,
        }
    }

    pub async fn expand(
        &self,
        question: &str,
        target_person: Option<&str>,
        available_topics: &[String],
        max_dimensions: usize,
    ) -> DimensionPlan {
        let body = serde_json::json!({
            "question": question,
            "target_person": target_person,
            "available_topics": available_topics,
            "max_dimensions": max_dimensions,
        });
        let result = self
            .client
            .post(format!("{}/expand", self.endpoint))
            .json(&body)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<DimensionPlan>().await {
                    Ok(mut plan) => {
                        plan.dimensions.truncate(max_dimensions.max(1));
                        return plan;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "understanding service returned bad plan")
                    }
                }
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "understanding service error")
            }
            Err(err) => tracing::warn!(error = %err, "understanding service unreachable"),
        }
        self.fallback
            .expand(question, target_person, available_topics, max_dimensions)
    }

    pub async fn compress(&self, text: &str, question: &str) -> String {
        let body = serde_json::json!({"text": text, "question": question});
        let result = self
            .client
            .post(format!("{}/compress", self.endpoint))
            .json(&body)
            .send()
            .await;
        if let Ok(response) = result {
            if response.status().is_success() {
                if let Ok(parsed) = response.json::<CompressResponse>().await {
                    return parsed.compressed;
                }
            }
        }
        self.fallback.compress(text)
    }
}

/// Lowercased, stop-word-filtered tokens of at least 3 characters, in first
/// appearance order.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3 && !STOP_WORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

fn is_lending_question(question: &str) -> bool {
    let lower = question.to_lowercase();
    LENDING_MARKERS.iter().any(|m| lower.contains(m))
}

/// Topics whose label contains a term, or vice versa (case-insensitive).
/// Output order follows `available_topics`, which is already sorted.
fn fuzzy_topics(terms: &[&str], available_topics: &[String]) -> Vec<String> {
    available_topics
        .iter()
        .filter(|topic| {
            let t = topic.to_lowercase();
            terms.iter().any(|term| {
                let term = term.to_lowercase();
                t.contains(&term) || term.contains(&t)
            })
        })
        .cloned()
        .collect()
}

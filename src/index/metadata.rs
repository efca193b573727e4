use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::log::{Density, MessageStore};

const EMPTY: &[u64] = &[];

/// Inverted index over chatlog metadata labels.
///
/// Built once per log snapshot with [`MetadataIndex::build`] — always a full
/// rebuild, never an incremental merge — and queried read-only afterwards.
/// The serialized form is the artifact format: one JSON document whose field
/// names are part of the external interface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataIndex {
    topic_index: BTreeMap<String, Vec<u64>>,
    sentiment_index: BTreeMap<String, Vec<u64>>,
    fact_keys_index: BTreeMap<String, Vec<u64>>,
    info_density_index: BTreeMap<String, Vec<u64>>,
    available_topics: Vec<String>,
    line_count: u64,
}

impl MetadataIndex {
    /// Single full pass over the store. Every posting list comes out sorted
    /// and deduplicated; `available_topics` is sorted and deduplicated.
    pub fn build(store: &MessageStore) -> Self {
        let mut topic_index: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        let mut sentiment_index: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        let mut fact_keys_index: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        let mut info_density_index: BTreeMap<String, Vec<u64>> = BTreeMap::new();

        for message in store.iter() {
            for topic in &message.topics {
                topic_index.entry(topic.clone()).or_default().push(message.line);
            }
            if !message.sentiment.is_empty() {
                sentiment_index
                    .entry(message.sentiment.clone())
                    .or_default()
                    .push(message.line);
            }
            for key in message.facts.keys() {
                fact_keys_index.entry(key.clone()).or_default().push(message.line);
            }
            info_density_index
                .entry(message.density.as_str().to_string())
                .or_default()
                .push(message.line);
        }

        for lines in topic_index
            .values_mut()
            .chain(sentiment_index.values_mut())
            .chain(fact_keys_index.values_mut())
            .chain(info_density_index.values_mut())
        {
            lines.sort_unstable();
            lines.dedup();
        }

        let available_topics: Vec<String> = topic_index.keys().cloned().collect();

        tracing::info!(
            topics = available_topics.len(),
            line_count = store.last_line(),
            "metadata index built"
        );

        Self {
            topic_index,
            sentiment_index,
            fact_keys_index,
            info_density_index,
            available_topics,
            line_count: store.last_line(),
        }
    }

    /// Exact topic lookup. O(1) average; returns a sorted deduplicated slice,
    /// empty both for unknown topics and for known topics with no lines.
    pub fn search_by_topic_exact(&self, topic: &str) -> &[u64] {
        self.topic_index.get(topic).map(Vec::as_slice).unwrap_or(EMPTY)
    }

    /// Union of exact lookups, sorted and deduplicated.
    pub fn search_by_topics(&self, topics: &[String]) -> Vec<u64> {
        let mut out: Vec<u64> = topics
            .iter()
            .flat_map(|t| self.search_by_topic_exact(t).iter().copied())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn search_by_sentiment(&self, sentiment: &str) -> &[u64] {
        self.sentiment_index
            .get(sentiment)
            .map(Vec::as_slice)
            .unwrap_or(EMPTY)
    }

    pub fn search_by_fact_key(&self, key: &str) -> &[u64] {
        self.fact_keys_index.get(key).map(Vec::as_slice).unwrap_or(EMPTY)
    }

    pub fn search_by_density(&self, density: Density) -> &[u64] {
        self.info_density_index
            .get(density.as_str())
            .map(Vec::as_slice)
            .unwrap_or(EMPTY)
    }

    /// Lines tagged high or medium density — used as a ranking tie-break.
    pub fn get_high_value_messages(&self) -> Vec<u64> {
        let mut out: Vec<u64> = self
            .search_by_density(Density::High)
            .iter()
            .chain(self.search_by_density(Density::Medium))
            .copied()
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn available_topics(&self) -> &[String] {
        &self.available_topics
    }

    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    /// Topics whose name contains `query` (case-insensitive), up to `limit`.
    pub fn find_matching_topics(&self, query: &str, limit: usize) -> Vec<String> {
        let needle = query.to_lowercase();
        self.available_topics
            .iter()
            .filter(|t| t.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect()
    }

    /// The `n` topics with the most lines, descending by count.
    pub fn top_topics(&self, n: usize) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = self
            .topic_index
            .iter()
            .map(|(t, lines)| (t.clone(), lines.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(n);
        counts
    }

    /// Persist as a single JSON document (atomic tmp + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("failed to serialize index")?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to rename into {}", path.display()))?;
        tracing::info!(path = %path.display(), "metadata index saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read index {}", path.display()))?;
        let index: Self =
            serde_json::from_str(&contents).context("failed to parse index JSON")?;
        tracing::info!(
            path = %path.display(),
            topics = index.available_topics.len(),
            "metadata index loaded"
        );
        Ok(index)
    }
}

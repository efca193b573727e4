#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Write;

use anyhow::Result;
use tempfile::NamedTempFile;
use testimony::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use testimony::log::MessageStore;

/// Serialize one chatlog record in the expected JSONL shape.
pub fn record(content: &str, topics: &[&str], density: &str) -> String {
    serde_json::json!({
        "content": content,
        "timestamp": "2026-03-14T18:30:00",
        "metadata": {
            "topics": topics,
            "sentiment": "neutral",
            "facts": {},
            "information_density": density
        }
    })
    .to_string()
}

/// Write raw lines to a temp file, one per physical line.
pub fn write_log(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();
    file
}

/// Build a log and load it: `(content, topics, density)` per line.
pub fn simple_log(records: &[(&str, &[&str], &str)]) -> (NamedTempFile, MessageStore) {
    let lines: Vec<String> = records
        .iter()
        .map(|(content, topics, density)| record(content, topics, density))
        .collect();
    let file = write_log(&lines);
    let store = MessageStore::load(file.path()).unwrap();
    (file, store)
}

/// Deterministic bag-of-words embedder: each word hashes to one dimension,
/// the vector is L2-normalized. Cosine similarity then tracks word overlap,
/// which makes ranking assertions easy to reason about.
pub struct BagEmbedder;

impl EmbeddingProvider for BagEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        for word in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            v[(hasher.finish() as usize) % EMBEDDING_DIM] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

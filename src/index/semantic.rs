use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::embedding::{embed_batch_with_retry, EmbeddingProvider};
use crate::log::MessageStore;

/// Batch size for embedding calls during a build.
const BUILD_BATCH: usize = 32;
/// Bounded retry attempts per embedding batch.
const BUILD_ATTEMPTS: u32 = 3;

/// Locations of the two semantic-index artifacts: the raw f32 matrix and the
/// JSON manifest describing it.
#[derive(Debug, Clone)]
pub struct SemanticPaths {
    pub matrix: PathBuf,
    pub manifest: PathBuf,
}

impl SemanticPaths {
    pub fn new(matrix: impl Into<PathBuf>, manifest: impl Into<PathBuf>) -> Self {
        Self {
            matrix: matrix.into(),
            manifest: manifest.into(),
        }
    }

    /// Pure existence check on the artifact files — no content validation.
    pub fn is_available(&self) -> bool {
        self.matrix.exists() && self.manifest.exists()
    }
}

/// Manifest sidecar for the embedding matrix. Row `i` of the matrix embeds
/// the message at `line_numbers[i]`.
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    line_numbers: Vec<u64>,
    model: String,
    dimensions: usize,
    created_at: String,
}

/// Report from a semantic index build.
#[derive(Debug, Serialize)]
pub struct BuildReport {
    pub rows: usize,
    pub dimensions: usize,
    pub matrix_path: String,
    pub manifest_path: String,
}

/// Brute-force cosine-similarity index over per-message embeddings.
///
/// Built once via [`SemanticIndex::build_from_log`] and queried read-only.
/// Query embedding failures degrade to an empty result — "no semantic
/// signal" is a valid terminal state, never an error.
pub struct SemanticIndex {
    matrix: Array2<f32>,
    line_numbers: Vec<u64>,
    model: String,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SemanticIndex {
    /// Embed every message body and persist both artifacts (atomic tmp +
    /// rename). Batches are retried with exponential backoff; a batch that
    /// still fails aborts the build.
    pub fn build_from_log(
        store: &MessageStore,
        embedder: &dyn EmbeddingProvider,
        paths: &SemanticPaths,
        model: &str,
    ) -> Result<BuildReport> {
        let mut line_numbers = Vec::new();
        let mut texts: Vec<&str> = Vec::new();
        for message in store.iter() {
            if message.content.is_empty() {
                continue;
            }
            line_numbers.push(message.line);
            texts.push(message.content.as_str());
        }

        let dims = embedder.dimensions();
        let mut flat: Vec<f32> = Vec::with_capacity(texts.len() * dims);
        for batch in texts.chunks(BUILD_BATCH) {
            let vectors = embed_batch_with_retry(embedder, batch, BUILD_ATTEMPTS)
                .context("embedding batch failed after retries")?;
            for vector in vectors {
                anyhow::ensure!(
                    vector.len() == dims,
                    "embedding dimension mismatch: got {}, expected {dims}",
                    vector.len()
                );
                flat.extend_from_slice(&vector);
            }
        }

        write_matrix(&paths.matrix, &flat)?;
        let manifest = Manifest {
            line_numbers: line_numbers.clone(),
            model: model.to_string(),
            dimensions: dims,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        write_manifest(&paths.manifest, &manifest)?;

        tracing::info!(
            rows = line_numbers.len(),
            dims,
            matrix = %paths.matrix.display(),
            "semantic index built"
        );

        Ok(BuildReport {
            rows: line_numbers.len(),
            dimensions: dims,
            matrix_path: paths.matrix.display().to_string(),
            manifest_path: paths.manifest.display().to_string(),
        })
    }

    /// Load artifacts from disk, validating matrix/manifest consistency.
    pub fn load(paths: &SemanticPaths, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let contents = std::fs::read_to_string(&paths.manifest)
            .with_context(|| format!("failed to read manifest {}", paths.manifest.display()))?;
        let manifest: Manifest =
            serde_json::from_str(&contents).context("failed to parse manifest JSON")?;

        let bytes = std::fs::read(&paths.matrix)
            .with_context(|| format!("failed to read matrix {}", paths.matrix.display()))?;
        anyhow::ensure!(
            bytes.len() % 4 == 0,
            "matrix file length {} is not a multiple of 4",
            bytes.len()
        );
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let rows = manifest.line_numbers.len();
        let dims = manifest.dimensions;
        anyhow::ensure!(
            floats.len() == rows * dims,
            "matrix shape mismatch: {} floats for {rows}x{dims}",
            floats.len()
        );

        let matrix = Array2::from_shape_vec((rows, dims), floats)
            .context("failed to shape embedding matrix")?;

        tracing::info!(rows, dims, model = %manifest.model, "semantic index loaded");

        Ok(Self {
            matrix,
            line_numbers: manifest.line_numbers,
            model: manifest.model,
            embedder,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.line_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line_numbers.is_empty()
    }

    /// Rank the `top_k` most similar lines by raw cosine, descending, ties
    /// broken by higher line number. Returns raw cosine in `[-1, 1]` —
    /// normalization to `[0, 1]` is the caller's responsibility.
    ///
    /// Any embedding failure degrades to an empty result.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(u64, f32)> {
        if self.line_numbers.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let query_vec = match self.embedder.embed(query) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "query embedding failed, no semantic signal");
                return Vec::new();
            }
        };
        if query_vec.len() != self.matrix.ncols() {
            tracing::warn!(
                got = query_vec.len(),
                expected = self.matrix.ncols(),
                "query embedding dimension mismatch, no semantic signal"
            );
            return Vec::new();
        }

        let q = normalize(Array1::from_vec(query_vec));
        let mut scored: Vec<(u64, f32)> = self
            .matrix
            .rows()
            .into_iter()
            .zip(&self.line_numbers)
            .map(|(row, &line)| {
                let norm = row.dot(&row).sqrt();
                let score = if norm > 0.0 { row.dot(&q) / norm } else { 0.0 };
                (line, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });
        scored.truncate(top_k);
        scored
    }
}

fn normalize(v: Array1<f32>) -> Array1<f32> {
    let norm = v.dot(&v).sqrt();
    if norm > 0.0 {
        v / norm
    } else {
        v
    }
}

fn write_matrix(path: &Path, flat: &[f32]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut bytes = Vec::with_capacity(flat.len() * 4);
    for value in flat {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to rename into {}", path.display()))?;
    Ok(())
}

fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(manifest).context("failed to serialize manifest")?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to rename into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EMBEDDING_DIM;
    use std::io::Write;

    /// Deterministic fake embedder: a unit spike at a position derived from
    /// the text length. Texts of equal length embed identically.
    struct SpikeEmbedder;

    impl EmbeddingProvider for SpikeEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0f32; EMBEDDING_DIM];
            v[text.chars().count() % EMBEDDING_DIM] = 1.0;
            Ok(v)
        }
    }

    /// Embedder that always fails, for degradation tests.
    struct BrokenEmbedder;

    impl EmbeddingProvider for BrokenEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("service unavailable")
        }
    }

    fn store_from(bodies: &[&str]) -> (tempfile::NamedTempFile, MessageStore) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for body in bodies {
            let rec = serde_json::json!({
                "content": format!("alice: {body}"),
                "timestamp": "2026-01-01T09:00:00",
                "metadata": {"topics": [], "sentiment": "", "facts": {}, "information_density": "low"}
            });
            writeln!(file, "{rec}").unwrap();
        }
        file.flush().unwrap();
        let store = MessageStore::load(file.path()).unwrap();
        (file, store)
    }

    fn temp_paths(dir: &tempfile::TempDir) -> SemanticPaths {
        SemanticPaths::new(dir.path().join("emb.f32"), dir.path().join("emb.manifest.json"))
    }

    #[test]
    fn availability_is_a_pure_existence_check() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(&dir);
        assert!(!paths.is_available());
        std::fs::write(&paths.matrix, b"").unwrap();
        assert!(!paths.is_available());
        std::fs::write(&paths.manifest, b"").unwrap();
        assert!(paths.is_available());
    }

    #[test]
    fn build_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(&dir);
        let (_file, store) = store_from(&["short", "a much longer message body"]);

        let report =
            SemanticIndex::build_from_log(&store, &SpikeEmbedder, &paths, "spike-test").unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.dimensions, EMBEDDING_DIM);
        assert!(paths.is_available());

        let index = SemanticIndex::load(&paths, Arc::new(SpikeEmbedder)).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.model(), "spike-test");
    }

    #[test]
    fn search_ranks_identical_spike_first() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(&dir);
        // Contents: "alice: aa" (9 chars) and "alice: bbbb" (11 chars)
        let (_file, store) = store_from(&["aa", "bbbb"]);
        SemanticIndex::build_from_log(&store, &SpikeEmbedder, &paths, "spike-test").unwrap();
        let index = SemanticIndex::load(&paths, Arc::new(SpikeEmbedder)).unwrap();

        // A 9-char query collides with line 1's spike exactly
        let results = index.search("123456789", 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 1);
        assert!(results[0].1 > 0.99);
        assert!(results[1].1 < 0.01);
    }

    #[test]
    fn search_degrades_to_empty_on_embed_failure() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(&dir);
        let (_file, store) = store_from(&["aa"]);
        SemanticIndex::build_from_log(&store, &SpikeEmbedder, &paths, "spike-test").unwrap();
        let index = SemanticIndex::load(&paths, Arc::new(BrokenEmbedder)).unwrap();
        assert!(index.search("anything", 10).is_empty());
    }

    #[test]
    fn load_rejects_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(&dir);
        let (_file, store) = store_from(&["aa", "bb"]);
        SemanticIndex::build_from_log(&store, &SpikeEmbedder, &paths, "spike-test").unwrap();
        // Truncate the matrix file behind the manifest's back
        std::fs::write(&paths.matrix, [0u8; 16]).unwrap();
        assert!(SemanticIndex::load(&paths, Arc::new(SpikeEmbedder)).is_err());
    }
}

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::plan::Dimension;

/// A context-only line retained for display around an evidence item. Never
/// scored and never counted against the message budget on its own.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContextLine {
    pub line: u64,
    pub sender: String,
    pub content: String,
}

/// One selected message, with its fusion score and provenance.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceItem {
    pub line: u64,
    pub time: String,
    pub sender: String,
    pub content: String,
    /// Short display form, possibly compressed by the understanding service.
    pub snippet: String,
    pub topics: Vec<String>,
    pub fusion_score: f32,
    pub dimension_name: String,
    /// Soft tag: the target person appears in sender or body. Not a filter.
    pub mentions_target: bool,
    pub is_counter: bool,
    /// Surrounding window, match line excluded.
    #[serde(default)]
    pub context: Vec<ContextLine>,
}

/// Per-dimension retrieval result. When the budget ran out before this
/// dimension, `retrieved` is false and the plan echo shows what was skipped.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DimensionEvidence {
    pub plan: Dimension,
    pub retrieved: bool,
    pub evidence: Vec<EvidenceItem>,
    pub counter_evidence: Vec<EvidenceItem>,
}

impl DimensionEvidence {
    pub fn skipped(plan: Dimension) -> Self {
        Self {
            plan,
            retrieved: false,
            evidence: Vec::new(),
            counter_evidence: Vec::new(),
        }
    }
}

/// Everything collected for one question.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceBundle {
    pub question: String,
    pub target_person: Option<String>,
    pub dimensions: Vec<DimensionEvidence>,
    /// Present iff a resource ceiling truncated collection.
    pub gap_annotation: Option<String>,
    pub created_at: String,
}

impl EvidenceBundle {
    pub fn total_evidence(&self) -> usize {
        self.dimensions
            .iter()
            .map(|d| d.evidence.len() + d.counter_evidence.len())
            .sum()
    }

    /// True when every dimension came back empty.
    pub fn is_empty(&self) -> bool {
        self.total_evidence() == 0
    }
}

/// Compact per-dimension counts for outward-facing summaries.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DimensionSummary {
    pub name: String,
    pub retrieved: bool,
    pub evidence_count: usize,
    pub counter_count: usize,
}

/// Outward result of a retrieve call. "Nothing relevant" is a first-class
/// outcome, structurally distinct from any error.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetrievalOutcome {
    Evidence {
        handle: EvidenceHandle,
        total_evidence: usize,
        dimensions: Vec<DimensionSummary>,
        gap_annotation: Option<String>,
    },
    NoEvidence {
        dimensions: Vec<DimensionSummary>,
        gap_annotation: Option<String>,
    },
}

impl RetrievalOutcome {
    /// Summarize a bundle; `handle` should be `Some` iff the bundle was
    /// staged in an [`EvidenceStore`].
    pub fn from_bundle(bundle: &EvidenceBundle, handle: Option<EvidenceHandle>) -> Self {
        let dimensions = bundle
            .dimensions
            .iter()
            .map(|d| DimensionSummary {
                name: d.plan.name.clone(),
                retrieved: d.retrieved,
                evidence_count: d.evidence.len(),
                counter_count: d.counter_evidence.len(),
            })
            .collect();
        match handle {
            Some(handle) if !bundle.is_empty() => Self::Evidence {
                handle,
                total_evidence: bundle.total_evidence(),
                dimensions,
                gap_annotation: bundle.gap_annotation.clone(),
            },
            _ => Self::NoEvidence {
                dimensions,
                gap_annotation: bundle.gap_annotation.clone(),
            },
        }
    }
}

/// Opaque handle to a stored bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct EvidenceHandle(pub String);

impl std::fmt::Display for EvidenceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed-capacity in-memory staging area for evidence bundles.
///
/// Eviction is strictly FIFO by insertion order; reads do not refresh an
/// entry. Nothing here touches disk — evidence is cheap to recompute and
/// stale bundles would outlive their log snapshot.
pub struct EvidenceStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    order: VecDeque<EvidenceHandle>,
    bundles: HashMap<EvidenceHandle, EvidenceBundle>,
}

impl EvidenceStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: VecDeque::with_capacity(capacity),
                bundles: HashMap::with_capacity(capacity),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Store a bundle, evicting the oldest entry when full. Returns a
    /// collision-resistant handle.
    pub fn store(&self, bundle: EvidenceBundle) -> EvidenceHandle {
        let handle = EvidenceHandle(Uuid::now_v7().to_string());
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while inner.order.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.bundles.remove(&evicted);
                tracing::debug!(handle = %evicted, "evicted evidence bundle");
            }
        }
        inner.order.push_back(handle.clone());
        inner.bundles.insert(handle.clone(), bundle);
        handle
    }

    /// Unknown handles are `None`, never an error.
    pub fn get(&self, handle: &EvidenceHandle) -> Option<EvidenceBundle> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.bundles.get(handle).cloned()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

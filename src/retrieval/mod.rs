//! Budget-gated hybrid evidence retrieval.
//!
//! [`RetrievalEngine`] turns a [`Dimension`] into a ranked, context-expanded
//! evidence list, fusing inverted-index topic recall with semantic
//! similarity. [`BudgetGuard`] enforces per-session resource ceilings and
//! [`EvidenceStore`] stages results behind opaque handles.

pub mod analyze;
pub mod budget;
pub mod engine;
pub mod evidence;
pub mod plan;

pub use analyze::{analyze, Confidence, DimensionAssessment, EvidenceMatrix};
pub use budget::{BudgetGuard, BudgetLimits, BudgetRegistry, BudgetState, BudgetUsage};
pub use engine::{RetrievalEngine, RetrievalOptions};
pub use evidence::{
    ContextLine, DimensionEvidence, DimensionSummary, EvidenceBundle, EvidenceHandle,
    EvidenceItem, EvidenceStore, RetrievalOutcome,
};
pub use plan::{Dimension, DimensionPlan};

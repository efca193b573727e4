use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::evidence::EvidenceBundle;

/// Confidence tier for one dimension, derived purely from retrieved counts.
/// No text generation happens here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Strong,
    Moderate,
    Weak,
    None,
}

/// Conclusion scaffold for one dimension.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DimensionAssessment {
    pub name: String,
    pub intent: String,
    pub evidence_count: usize,
    pub counter_count: usize,
    /// Whether the dimension's coverage target (`min_evidence`) was met.
    pub coverage_met: bool,
    pub confidence: Confidence,
    /// Human-readable note when coverage fell short or retrieval was skipped.
    pub gap: Option<String>,
}

/// Per-dimension conclusion scaffold over a whole bundle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceMatrix {
    pub question: String,
    pub target_person: Option<String>,
    pub assessments: Vec<DimensionAssessment>,
    pub total_evidence: usize,
    pub gap_annotation: Option<String>,
}

/// Build the matrix from counts and coverage alone.
///
/// Tiers: Strong needs the coverage target met with no counter-evidence;
/// counter-evidence at or above parity caps a dimension at Weak.
pub fn analyze(bundle: &EvidenceBundle) -> EvidenceMatrix {
    let assessments = bundle
        .dimensions
        .iter()
        .map(|dim| {
            let evidence_count = dim.evidence.len();
            let counter_count = dim.counter_evidence.len();
            let coverage_met = evidence_count >= dim.plan.min_evidence;

            let confidence = if evidence_count == 0 {
                Confidence::None
            } else if counter_count >= evidence_count || !coverage_met {
                Confidence::Weak
            } else if counter_count > 0 {
                Confidence::Moderate
            } else {
                Confidence::Strong
            };

            let gap = if !dim.retrieved {
                Some("skipped: budget exhausted before this dimension".to_string())
            } else if !coverage_met {
                Some(format!(
                    "wanted {} items, found {evidence_count}",
                    dim.plan.min_evidence
                ))
            } else {
                None
            };

            DimensionAssessment {
                name: dim.plan.name.clone(),
                intent: dim.plan.intent.clone(),
                evidence_count,
                counter_count,
                coverage_met,
                confidence,
                gap,
            }
        })
        .collect();

    EvidenceMatrix {
        question: bundle.question.clone(),
        target_person: bundle.target_person.clone(),
        assessments,
        total_evidence: bundle.total_evidence(),
        gap_annotation: bundle.gap_annotation.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::evidence::{DimensionEvidence, EvidenceItem};
    use crate::retrieval::plan::Dimension;

    fn item(line: u64, is_counter: bool) -> EvidenceItem {
        EvidenceItem {
            line,
            time: String::new(),
            sender: "a".into(),
            content: "a: x".into(),
            snippet: "x".into(),
            topics: Vec::new(),
            fusion_score: 0.5,
            dimension_name: "d".into(),
            mentions_target: false,
            is_counter,
            context: Vec::new(),
        }
    }

    fn dim_result(min_evidence: usize, evidence: usize, counter: usize) -> DimensionEvidence {
        DimensionEvidence {
            plan: Dimension {
                name: "d".into(),
                min_evidence,
                ..Default::default()
            },
            retrieved: true,
            evidence: (0..evidence as u64).map(|i| item(i + 1, false)).collect(),
            counter_evidence: (0..counter as u64).map(|i| item(i + 100, true)).collect(),
        }
    }

    fn bundle_of(dims: Vec<DimensionEvidence>) -> EvidenceBundle {
        EvidenceBundle {
            question: "q".into(),
            target_person: None,
            dimensions: dims,
            gap_annotation: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn tiers_follow_counts() {
        let matrix = analyze(&bundle_of(vec![
            dim_result(2, 3, 0), // strong
            dim_result(2, 3, 1), // moderate
            dim_result(2, 1, 0), // weak, under target
            dim_result(2, 2, 2), // weak, counter parity
            dim_result(2, 0, 0), // none
        ]));
        let tiers: Vec<Confidence> = matrix.assessments.iter().map(|a| a.confidence).collect();
        assert_eq!(
            tiers,
            vec![
                Confidence::Strong,
                Confidence::Moderate,
                Confidence::Weak,
                Confidence::Weak,
                Confidence::None
            ]
        );
    }

    #[test]
    fn under_coverage_gets_a_gap_note() {
        let matrix = analyze(&bundle_of(vec![dim_result(3, 1, 0)]));
        let gap = matrix.assessments[0].gap.as_deref().unwrap();
        assert!(gap.contains("wanted 3"));
        assert!(!matrix.assessments[0].coverage_met);
    }

    #[test]
    fn skipped_dimension_is_called_out() {
        let mut skipped = dim_result(2, 0, 0);
        skipped.retrieved = false;
        let matrix = analyze(&bundle_of(vec![skipped]));
        assert!(matrix.assessments[0]
            .gap
            .as_deref()
            .unwrap()
            .contains("budget exhausted"));
    }
}

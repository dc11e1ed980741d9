//! Scoring processed documents against hand-annotated entities.
//!
//! Matching is by exact `(label, text)` pair, as sets per document.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::metrics::f1;
use super::TrainingError;
use crate::pipeline::extraction::DocumentResult;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TruthEntity {
    pub label: String,
    pub text: String,
}

/// Annotations for one document. Documents pair with predictions by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthDocument {
    pub id: String,
    pub entities: Vec<TruthEntity>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MatchCounts {
    pub correct: usize,
    pub incorrect: usize,
    pub missed: usize,
    pub total_gt: usize,
}

impl MatchCounts {
    pub fn precision(&self) -> f64 {
        let predicted = self.correct + self.incorrect;
        if predicted == 0 {
            0.0
        } else {
            self.correct as f64 / predicted as f64
        }
    }

    pub fn recall(&self) -> f64 {
        if self.total_gt == 0 {
            0.0
        } else {
            self.correct as f64 / self.total_gt as f64
        }
    }

    pub fn f1(&self) -> f64 {
        f1(self.precision(), self.recall())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroundTruthReport {
    pub overall: MatchCounts,
    pub by_entity: BTreeMap<String, MatchCounts>,
}

pub fn load_ground_truth(path: &Path) -> Result<Vec<TruthDocument>, TrainingError> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

pub fn load_predictions(path: &Path) -> Result<Vec<DocumentResult>, TrainingError> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

pub fn evaluate_against_ground_truth(
    predictions: &[DocumentResult],
    ground_truth: &[TruthDocument],
) -> GroundTruthReport {
    let mut report = GroundTruthReport::default();

    for (i, doc) in ground_truth.iter().enumerate() {
        let gold: BTreeSet<(&str, &str)> = doc
            .entities
            .iter()
            .map(|e| (e.label.as_str(), e.text.as_str()))
            .collect();
        let pred: BTreeSet<(&str, &str)> = predictions
            .get(i)
            .map(|p| {
                p.entities
                    .iter()
                    .map(|e| (e.label.as_str(), e.text.as_str()))
                    .collect()
            })
            .unwrap_or_default();
        if predictions.get(i).is_none() {
            tracing::warn!(document = %doc.id, "No prediction for annotated document");
        }

        for (label, _) in &gold {
            report.by_entity.entry(label.to_string()).or_default().total_gt += 1;
        }
        report.overall.total_gt += gold.len();

        for pair in gold.intersection(&pred) {
            report.by_entity.entry(pair.0.to_string()).or_default().correct += 1;
            report.overall.correct += 1;
        }
        for pair in pred.difference(&gold) {
            report.by_entity.entry(pair.0.to_string()).or_default().incorrect += 1;
            report.overall.incorrect += 1;
        }
        for pair in gold.difference(&pred) {
            report.by_entity.entry(pair.0.to_string()).or_default().missed += 1;
            report.overall.missed += 1;
        }
    }
    report
}

impl GroundTruthReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let o = &self.overall;
        let _ = writeln!(out, "Overall Metrics:");
        let _ = writeln!(out, "Precision: {:.4}", o.precision());
        let _ = writeln!(out, "Recall: {:.4}", o.recall());
        let _ = writeln!(out, "F1 Score: {:.4}", o.f1());
        let _ = writeln!(out, "Correct: {}", o.correct);
        let _ = writeln!(out, "Incorrect: {}", o.incorrect);
        let _ = writeln!(out, "Missed: {}", o.missed);
        let _ = writeln!(out, "\nPer-Entity Metrics:");
        for (entity, c) in self.by_entity.iter().filter(|(_, c)| c.total_gt > 0) {
            let _ = writeln!(out, "\n{entity}:");
            let _ = writeln!(out, "  Precision: {:.4}", c.precision());
            let _ = writeln!(out, "  Recall: {:.4}", c.recall());
            let _ = writeln!(out, "  F1 Score: {:.4}", c.f1());
            let _ = writeln!(out, "  Correct/Total: {}/{}", c.correct, c.total_gt);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::{ExtractedEntity, Provenance};

    fn truth(id: &str, pairs: &[(&str, &str)]) -> TruthDocument {
        TruthDocument {
            id: id.into(),
            entities: pairs
                .iter()
                .map(|(l, t)| TruthEntity {
                    label: l.to_string(),
                    text: t.to_string(),
                })
                .collect(),
        }
    }

    fn predicted(pairs: &[(&str, &str)]) -> DocumentResult {
        DocumentResult {
            entities: pairs
                .iter()
                .map(|(l, t)| ExtractedEntity::new(*l, *t, *t, Provenance::Pattern, 1.0))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn counts_correct_incorrect_missed() {
        let gt = vec![truth(
            "discharge_letter_2",
            &[("fim_score", "60/126"), ("fim_score", "88/126"), ("mobility", "הליכה עם הליכון")],
        )];
        let preds = vec![predicted(&[
            ("fim_score", "60/126"),
            ("fim_score", "88/126"),
            ("mobility", "עם הליכון"),
        ])];
        let report = evaluate_against_ground_truth(&preds, &gt);
        assert_eq!(report.overall.correct, 2);
        assert_eq!(report.overall.incorrect, 1);
        assert_eq!(report.overall.missed, 1);
        assert_eq!(report.by_entity["fim_score"].f1(), 1.0);
        assert_eq!(report.by_entity["mobility"].recall(), 0.0);
        assert!((report.overall.precision() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn duplicate_predictions_count_once() {
        let gt = vec![truth("a", &[("gender", "מר")])];
        let preds = vec![predicted(&[("gender", "מר"), ("gender", "מר")])];
        let report = evaluate_against_ground_truth(&preds, &gt);
        assert_eq!(report.overall.precision(), 1.0);
    }

    #[test]
    fn missing_prediction_means_all_missed() {
        let gt = vec![truth("a", &[("gender", "מר")]), truth("b", &[("floor_number", "2")])];
        let preds = vec![predicted(&[("gender", "מר")])];
        let report = evaluate_against_ground_truth(&preds, &gt);
        assert_eq!(report.overall.missed, 1);
        assert_eq!(report.overall.recall(), 0.5);
    }

    #[test]
    fn empty_inputs_score_zero() {
        let report = evaluate_against_ground_truth(&[], &[]);
        assert_eq!(report.overall.f1(), 0.0);
        assert!(report.render().contains("Precision: 0.0000"));
    }

    #[test]
    fn files_roundtrip_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let gt_path = dir.path().join("ground_truth.json");
        std::fs::write(
            &gt_path,
            r#"[{"id": "sample_form", "entities": [{"label": "floor_number", "text": "2"}]}]"#,
        )
        .unwrap();
        let pred_path = dir.path().join("results.json");
        std::fs::write(
            &pred_path,
            serde_json::to_string(&vec![predicted(&[("floor_number", "2")])]).unwrap(),
        )
        .unwrap();
        let report = evaluate_against_ground_truth(
            &load_predictions(&pred_path).unwrap(),
            &load_ground_truth(&gt_path).unwrap(),
        );
        assert_eq!(report.overall.correct, 1);
    }
}

//! Chunk-level sequence labeling metrics, compatible with seqeval's default
//! (lenient IOB2) mode: a stray `I-x` opens a chunk, a type change closes one.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::pipeline::extraction::bio::BioTag;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chunk {
    pub entity: String,
    pub start: usize,
    /// Exclusive
    pub end: usize,
}

/// Unparseable labels are read as `O`.
fn tag(label: &str) -> BioTag {
    label.parse().unwrap_or(BioTag::Outside)
}

pub fn get_entities<S: AsRef<str>>(seq: &[S]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut open: Option<(String, usize)> = None;

    for (i, label) in seq.iter().enumerate() {
        let current = tag(label.as_ref());
        let continues = match (&open, &current) {
            (Some((entity, _)), BioTag::Inside(e)) => entity == e,
            _ => false,
        };
        if continues {
            continue;
        }
        if let Some((entity, start)) = open.take() {
            chunks.push(Chunk { entity, start, end: i });
        }
        if let Some(entity) = current.entity() {
            open = Some((entity.to_string(), i));
        }
    }
    if let Some((entity, start)) = open {
        chunks.push(Chunk {
            entity,
            start,
            end: seq.len(),
        });
    }
    chunks
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Token-level accuracy over all sequences.
pub fn accuracy<S: AsRef<str>>(y_true: &[Vec<S>], y_pred: &[Vec<S>]) -> f64 {
    let mut total = 0;
    let mut correct = 0;
    for (t, p) in y_true.iter().zip(y_pred) {
        for (a, b) in t.iter().zip(p) {
            total += 1;
            if a.as_ref() == b.as_ref() {
                correct += 1;
            }
        }
    }
    ratio(correct, total)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Gold chunks of this type
    pub support: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub per_entity: BTreeMap<String, EntityScore>,
}

fn chunk_sets<S: AsRef<str>>(seqs: &[Vec<S>]) -> HashSet<(usize, Chunk)> {
    seqs.iter()
        .enumerate()
        .flat_map(|(i, seq)| get_entities(seq).into_iter().map(move |c| (i, c)))
        .collect()
}

/// Accuracy, micro-averaged chunk scores and per-type scores.
pub fn evaluate<S: AsRef<str>>(y_true: &[Vec<S>], y_pred: &[Vec<S>]) -> SequenceReport {
    let gold = chunk_sets(y_true);
    let pred = chunk_sets(y_pred);
    let correct: HashSet<_> = gold.intersection(&pred).collect();

    let precision = ratio(correct.len(), pred.len());
    let recall = ratio(correct.len(), gold.len());

    let mut counts: BTreeMap<String, (usize, usize, usize)> = BTreeMap::new();
    for (_, c) in &gold {
        counts.entry(c.entity.clone()).or_default().0 += 1;
    }
    for (_, c) in &pred {
        counts.entry(c.entity.clone()).or_default().1 += 1;
    }
    for (_, c) in &correct {
        counts.entry(c.entity.clone()).or_default().2 += 1;
    }
    let per_entity = counts
        .into_iter()
        .map(|(entity, (n_gold, n_pred, n_correct))| {
            let p = ratio(n_correct, n_pred);
            let r = ratio(n_correct, n_gold);
            let score = EntityScore {
                precision: p,
                recall: r,
                f1: f1(p, r),
                support: n_gold,
            };
            (entity, score)
        })
        .collect();

    SequenceReport {
        accuracy: accuracy(y_true, y_pred),
        precision,
        recall,
        f1: f1(precision, recall),
        per_entity,
    }
}

impl SequenceReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "accuracy {:.4}  precision {:.4}  recall {:.4}  f1 {:.4}",
            self.accuracy, self.precision, self.recall, self.f1
        );
        let _ = writeln!(
            out,
            "{:<28} {:>9} {:>9} {:>9} {:>8}",
            "entity", "precision", "recall", "f1", "support"
        );
        for (entity, s) in &self.per_entity {
            let _ = writeln!(
                out,
                "{:<28} {:>9.4} {:>9.4} {:>9.4} {:>8}",
                entity, s.precision, s.recall, s.f1, s.support
            );
        }
        out
    }
}

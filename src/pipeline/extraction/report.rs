//! Summary tables over a batch of processed documents.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use super::types::DocumentResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EntityStat {
    pub count: usize,
    pub mean_confidence: f32,
}

/// Count and mean confidence per entity label, sorted by label.
pub fn entity_stats(results: &[DocumentResult]) -> BTreeMap<String, EntityStat> {
    let mut sums: BTreeMap<String, (usize, f32)> = BTreeMap::new();
    for entity in results.iter().flat_map(|r| &r.entities) {
        let slot = sums.entry(entity.label.clone()).or_default();
        slot.0 += 1;
        slot.1 += entity.confidence;
    }
    sums.into_iter()
        .map(|(label, (count, total))| {
            let stat = EntityStat {
                count,
                mean_confidence: total / count as f32,
            };
            (label, stat)
        })
        .collect()
}

/// Number of documents each section was found in.
pub fn section_stats(results: &[DocumentResult]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for name in results.iter().flat_map(|r| r.sections.keys()) {
        *counts.entry(name.clone()).or_insert(0) += 1;
    }
    counts
}

pub fn render_entity_table(stats: &BTreeMap<String, EntityStat>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Entity Statistics:");
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "{:<25} {:<8} {:<15}", "Entity Type", "Count", "Avg Confidence");
    let _ = writeln!(out, "{}", "-".repeat(60));
    for (label, stat) in stats {
        let _ = writeln!(out, "{:<25} {:<8} {:.4}", label, stat.count, stat.mean_confidence);
    }
    out
}

pub fn render_section_table(stats: &BTreeMap<String, usize>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Section Statistics:");
    let _ = writeln!(out, "{}", "=".repeat(40));
    let _ = writeln!(out, "{:<25} {:<8}", "Section Type", "Count");
    let _ = writeln!(out, "{}", "-".repeat(40));
    for (name, count) in stats {
        let _ = writeln!(out, "{name:<25} {count:<8}");
    }
    out
}

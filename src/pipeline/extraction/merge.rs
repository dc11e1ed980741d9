use std::cmp::Ordering;
use std::collections::HashSet;

use super::types::{ExtractedEntity, FieldMap, Provenance};

/// Combine pattern and model entities, dropping repeated `(text, label)`
/// pairs. Higher confidence wins, then the longer text.
pub fn merge_entities(
    pattern: Vec<ExtractedEntity>,
    model: Vec<ExtractedEntity>,
) -> Vec<ExtractedEntity> {
    let mut all: Vec<ExtractedEntity> = pattern.into_iter().chain(model).collect();
    all.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.text.chars().count().cmp(&a.text.chars().count()))
    });

    let mut seen = HashSet::new();
    all.retain(|e| seen.insert((e.text.clone(), e.label.clone())));
    all
}

/// Write model values over a pattern field map. The most confident model
/// entity per field wins.
pub fn overlay_model_fields(fields: &mut FieldMap, model: &[ExtractedEntity]) -> usize {
    let mut best: Vec<&ExtractedEntity> = Vec::new();
    for entity in model.iter().filter(|e| e.provenance == Provenance::Model) {
        match best.iter().position(|b| b.label == entity.label) {
            Some(i) if entity.confidence > best[i].confidence => best[i] = entity,
            Some(_) => {}
            None => best.push(entity),
        }
    }
    for entity in &best {
        fields.insert(entity.label.clone(), entity.value.clone());
    }
    best.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(label: &str, text: &str, provenance: Provenance, confidence: f32) -> ExtractedEntity {
        ExtractedEntity::new(label, text, text, provenance, confidence)
    }

    #[test]
    fn duplicates_collapse_to_most_confident() {
        let pattern = vec![entity("mobility", "עם הליכון", Provenance::Pattern, 1.0)];
        let model = vec![
            entity("mobility", "עם הליכון", Provenance::Model, 0.9),
            entity("mood", "תקין", Provenance::Model, 0.8),
        ];
        let merged = merge_entities(pattern, model);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].provenance, Provenance::Pattern);
        assert_eq!(merged[1].label, "mood");
    }

    #[test]
    fn same_text_different_label_kept() {
        let merged = merge_entities(
            vec![entity("a", "x", Provenance::Pattern, 1.0)],
            vec![entity("b", "x", Provenance::Model, 0.9)],
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn longer_text_first_on_equal_confidence() {
        let merged = merge_entities(
            vec![
                entity("a", "קצר", Provenance::Pattern, 1.0),
                entity("b", "ארוך יותר", Provenance::Pattern, 1.0),
            ],
            Vec::new(),
        );
        assert_eq!(merged[0].label, "b");
    }

    #[test]
    fn model_values_override_patterns() {
        let mut fields = FieldMap::new();
        fields.insert("mobility".into(), "עצמאי".into());
        fields.insert("mood".into(), "תקין".into());
        let model = vec![
            entity("mobility", "עם הליכון", Provenance::Model, 0.8),
            entity("mobility", "כסא גלגלים", Provenance::Model, 0.95),
        ];
        assert_eq!(overlay_model_fields(&mut fields, &model), 1);
        assert_eq!(fields["mobility"], "כסא גלגלים");
        assert_eq!(fields["mood"], "תקין");
    }
}

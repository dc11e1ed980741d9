//! Turn classifier spans into field values.

use std::sync::LazyLock;

use regex::Regex;

use super::bio::{decode_spans, PredictedSpan};
use super::fuzzy::best_match;
use super::normalize::clean_entity_text;
use super::types::{ExtractedEntity, Provenance};
use super::validators::{field_kind, FieldKind};
use crate::config::ExtractionConfig;
use crate::pipeline::classifier::{ClassifierError, TokenClassifier};

static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

static HAS_WORD_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{0590}-\x{05FF}\w]").unwrap());

fn first_number_within(text: &str, max: u32) -> Option<String> {
    let n: u32 = FIRST_NUMBER.find(text)?.as_str().parse().ok()?;
    (n <= max).then(|| n.to_string())
}

/// Value for one span, `None` when it maps onto nothing.
fn span_value(field: &str, text: &str, options: &[String], fuzzy_threshold: u8) -> Option<String> {
    match field_kind(field) {
        FieldKind::FimScore => first_number_within(text, 126),
        FieldKind::MmseScore => first_number_within(text, 30),
        _ if options.is_empty() => None,
        _ => best_match(text, options, fuzzy_threshold).map(str::to_string),
    }
}

fn span_entity<'a, F>(
    text: &str,
    span: &PredictedSpan,
    options: &F,
    config: &ExtractionConfig,
) -> Option<ExtractedEntity>
where
    F: Fn(&str) -> &'a [String],
{
    if span.score < config.confidence_threshold {
        return None;
    }
    let cleaned = clean_entity_text(text.get(span.start..span.end)?);
    if cleaned.chars().count() < 2 || !HAS_WORD_CHAR.is_match(&cleaned) {
        return None;
    }
    let value = span_value(&span.label, &cleaned, options(&span.label), config.fuzzy_threshold)?;
    Some(
        ExtractedEntity::new(&span.label, cleaned, value, Provenance::Model, span.score)
            .with_span(span.start, span.end),
    )
}

/// Classify `text` and map each predicted span onto its field's value.
///
/// `options` resolves a field to its acceptable values.
pub fn extract_model_entities<'a, F>(
    text: &str,
    classifier: &dyn TokenClassifier,
    options: F,
    config: &ExtractionConfig,
) -> Result<Vec<ExtractedEntity>, ClassifierError>
where
    F: Fn(&str) -> &'a [String],
{
    let predictions = classifier.classify(text)?;
    let spans = decode_spans(&predictions);
    let entities: Vec<_> = spans
        .iter()
        .filter_map(|span| span_entity(text, span, &options, config))
        .collect();
    tracing::debug!(
        classifier = classifier.name(),
        spans = spans.len(),
        entities = entities.len(),
        "Model extraction"
    );
    Ok(entities)
}

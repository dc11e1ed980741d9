//! Document processing orchestrator.
//!
//! Single entry point for both extraction surfaces: the per-document
//! entity/section result used by batch validation, and the flat field map
//! answered by the query endpoint.
//!
//! The token classifier is injected as a trait object so the processor stays
//! testable with mock classifiers.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::catalogue::{FieldCatalogue, FieldOption};
use crate::config::{ExtractionConfig, NemoConfig};
use crate::pipeline::classifier::{load_classifier, TokenClassifier};
use crate::pipeline::extraction::annotate::MarkerAnnotator;
use crate::pipeline::extraction::merge::overlay_model_fields;
use crate::pipeline::extraction::model_entities::extract_model_entities;
use crate::pipeline::extraction::report::{
    entity_stats, render_entity_table, render_section_table, section_stats,
};
use crate::pipeline::extraction::validators::{apply_fallbacks, validate_field_value};
use crate::pipeline::extraction::{
    clean_document, extract_pattern_entities, extract_sections, match_patterns, merge_entities,
    normalize_text, DocumentResult, ExtractedEntity, ExtractionError, FieldMap, Provenance,
    NOT_FOUND,
};

/// Confidence given to keyword fallback entities.
const HEURISTIC_CONFIDENCE: f32 = 0.5;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Outcome of a batch run over many documents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub results: Vec<DocumentResult>,
    /// Label → text of the last entity seen for that label across the batch
    pub labels: FieldMap,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

pub struct DocumentProcessor {
    catalogue: FieldCatalogue,
    classifier: Option<Box<dyn TokenClassifier>>,
    config: ExtractionConfig,
    annotator: Option<MarkerAnnotator>,
}

impl DocumentProcessor {
    pub fn new(
        catalogue: FieldCatalogue,
        classifier: Option<Box<dyn TokenClassifier>>,
        config: ExtractionConfig,
    ) -> Self {
        let annotator = config.annotate_markers.then(MarkerAnnotator::default);
        Self {
            catalogue,
            classifier,
            config,
            annotator,
        }
    }

    /// Load the catalogue and whatever classifier the model directory holds.
    pub fn from_config(config: &NemoConfig) -> Result<Self, ExtractionError> {
        let catalogue = FieldCatalogue::load(&config.catalogue_path)?;
        let classifier = load_classifier(&config.model_dir)?;
        let processor = Self::new(catalogue, classifier, config.extraction.clone());
        tracing::info!(
            fields = processor.catalogue.len(),
            classifier = processor.classifier_name().unwrap_or("none"),
            annotate_markers = processor.config.annotate_markers,
            "Document processor ready"
        );
        Ok(processor)
    }

    pub fn catalogue(&self) -> &FieldCatalogue {
        &self.catalogue
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn classifier_name(&self) -> Option<&str> {
        self.classifier.as_ref().map(|c| c.name())
    }

    /// Request options when given, else the catalogue's.
    fn resolve_options<'a>(
        &'a self,
        requested: &BTreeMap<&str, &'a [String]>,
        field: &str,
    ) -> &'a [String] {
        match requested.get(field) {
            Some(opts) if !opts.is_empty() => *opts,
            _ => self.catalogue.options(field),
        }
    }

    /// Model entities over `text`; empty when no classifier is loaded.
    fn model_entities<'a, F>(
        &self,
        text: &str,
        options: F,
    ) -> Result<Vec<ExtractedEntity>, ExtractionError>
    where
        F: Fn(&str) -> &'a [String],
    {
        let Some(classifier) = self.classifier.as_deref() else {
            return Ok(Vec::new());
        };
        let entities = match &self.annotator {
            Some(annotator) => {
                let annotated = annotator.annotate(text);
                extract_model_entities(&annotated, classifier, options, &self.config)?
            }
            None => extract_model_entities(text, classifier, options, &self.config)?,
        };
        Ok(entities)
    }

    /// Entities and sections of one document.
    pub fn process_document(&self, text: &str) -> Result<DocumentResult, ExtractionError> {
        let cleaned = clean_document(text);
        if cleaned.is_empty() {
            return Ok(DocumentResult {
                original_text: text.to_string(),
                ..Default::default()
            });
        }

        let pattern = extract_pattern_entities(&cleaned, self.config.confidence_threshold);
        let model = self.model_entities(&cleaned, |field| self.catalogue.options(field))?;
        tracing::debug!(
            pattern = pattern.len(),
            model = model.len(),
            "Entities before merge"
        );

        let mut entities = merge_entities(pattern, model);
        let heuristic = heuristic_entities(&entities, &cleaned);
        entities.extend(heuristic);

        Ok(DocumentResult {
            entities,
            sections: extract_sections(&cleaned),
            original_text: text.to_string(),
        })
    }

    /// Flat field map for a query.
    ///
    /// Every value in the result passed its field validator; requested
    /// fields (or every catalogue field when none are requested) that did
    /// not are reported as `not_found`.
    pub fn extract_fields(
        &self,
        text: &str,
        parameters: &[FieldOption],
    ) -> Result<FieldMap, ExtractionError> {
        let requested: BTreeMap<&str, &[String]> = parameters
            .iter()
            .map(|p| (p.field.as_str(), p.options.as_slice()))
            .collect();
        let options = |field: &str| self.resolve_options(&requested, field);

        let text = normalize_text(text);
        let mut fields = match_patterns(&text);
        let model = self.model_entities(&text, &options)?;
        let overridden = overlay_model_fields(&mut fields, &model);
        let filled = apply_fallbacks(&mut fields, &text);

        let mut emitted = FieldMap::new();
        let mut rejected = 0usize;
        for (field, value) in fields {
            let field_options = options(field.as_str());
            match validate_field_value(&field, &value, field_options, self.config.fuzzy_threshold) {
                Some(valid) => {
                    emitted.insert(field, valid);
                }
                None => rejected += 1,
            }
        }

        let wanted: Vec<&str> = if parameters.is_empty() {
            self.catalogue.fields().collect()
        } else {
            requested.keys().copied().collect()
        };
        for field in wanted {
            emitted
                .entry(field.to_string())
                .or_insert_with(|| NOT_FOUND.to_string());
        }

        tracing::info!(
            fields = emitted.len(),
            model_fields = overridden,
            fallbacks = filled.len(),
            rejected,
            "Fields extracted"
        );
        Ok(emitted)
    }

    /// Process a batch, skipping documents that fail.
    pub fn validate_documents<S: AsRef<str>>(&self, texts: &[S]) -> ValidationReport {
        let texts: Vec<&str> = texts
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .collect();
        tracing::info!(count = texts.len(), "Validating documents");

        let mut report = ValidationReport::default();
        for (i, text) in texts.iter().enumerate() {
            tracing::info!("Processing text {}/{}", i + 1, texts.len());
            match self.process_document(text) {
                Ok(result) => {
                    for entity in &result.entities {
                        tracing::debug!(
                            label = %entity.label,
                            text = %entity.text,
                            confidence = entity.confidence,
                            "Entity"
                        );
                        report.labels.insert(entity.label.clone(), entity.text.clone());
                    }
                    report.results.push(result);
                }
                Err(e) => {
                    tracing::error!(document = i + 1, error = %e, "Document processing failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "\n{}",
            render_entity_table(&entity_stats(&report.results))
        );
        tracing::info!(
            "\n{}",
            render_section_table(&section_stats(&report.results))
        );
        report
    }
}

/// Fallback values for fields that no pattern or model entity covers.
fn heuristic_entities(found: &[ExtractedEntity], text: &str) -> Vec<ExtractedEntity> {
    let mut fields: FieldMap = found
        .iter()
        .map(|e| (e.label.clone(), e.value.clone()))
        .collect();
    apply_fallbacks(&mut fields, text)
        .into_iter()
        .filter_map(|field| {
            let value = fields.get(field)?;
            Some(ExtractedEntity::new(
                field,
                value.as_str(),
                value.as_str(),
                Provenance::Heuristic,
                HEURISTIC_CONFIDENCE,
            ))
        })
        .collect()
}

/// Non-empty lines of an input file.
pub fn read_documents(path: &Path) -> Result<Vec<String>, ExtractionError> {
    if !path.exists() {
        return Err(ExtractionError::InputNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Pretty JSON; serde_json keeps non-ASCII text as is.
pub fn save_results(results: &[DocumentResult], path: &Path) -> Result<(), ExtractionError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), documents = results.len(), "Results saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::pipeline::classifier::{ClassifierError, TokenPrediction};
    use crate::pipeline::extraction::Provenance;

    /// Tags every occurrence of fixed words.
    struct KeywordClassifier {
        words: Vec<(&'static str, &'static str)>,
        score: f32,
    }

    impl TokenClassifier for KeywordClassifier {
        fn name(&self) -> &str {
            "keyword"
        }

        fn classify(&self, text: &str) -> Result<Vec<TokenPrediction>, ClassifierError> {
            Ok(crate::pipeline::classifier::split_words(text)
                .into_iter()
                .map(|(start, token)| {
                    let label = self
                        .words
                        .iter()
                        .find(|(w, _)| *w == token)
                        .map_or("O", |(_, l)| *l);
                    TokenPrediction::word(token, label, self.score, start)
                })
                .collect())
        }
    }

    /// Records every text it is given and tags one fixed token.
    struct RecordingClassifier {
        seen: Arc<Mutex<Vec<String>>>,
        token: &'static str,
        label: &'static str,
    }

    impl TokenClassifier for RecordingClassifier {
        fn name(&self) -> &str {
            "recording"
        }

        fn classify(&self, text: &str) -> Result<Vec<TokenPrediction>, ClassifierError> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok(crate::pipeline::classifier::split_words(text)
                .into_iter()
                .map(|(start, token)| {
                    let label = if token == self.token { self.label } else { "O" };
                    TokenPrediction::word(token, label, 0.9, start)
                })
                .collect())
        }
    }

    struct BrokenClassifier;

    impl TokenClassifier for BrokenClassifier {
        fn name(&self) -> &str {
            "broken"
        }

        fn classify(&self, _text: &str) -> Result<Vec<TokenPrediction>, ClassifierError> {
            Err(ClassifierError::Inference("no session".into()))
        }
    }

    fn catalogue() -> FieldCatalogue {
        FieldCatalogue::from_entries(vec![
            FieldOption {
                field: "mobility".into(),
                options: vec!["עצמאי".into(), "עם הליכון".into(), "כסא גלגלים".into()],
            },
            FieldOption {
                field: "elevator".into(),
                options: vec!["עם מעלית".into(), "ללא מעלית".into()],
            },
            FieldOption {
                field: "fim_score".into(),
                options: vec![],
            },
        ])
    }

    fn processor(classifier: Option<Box<dyn TokenClassifier>>) -> DocumentProcessor {
        DocumentProcessor::new(catalogue(), classifier, ExtractionConfig::default())
    }

    #[test]
    fn empty_document_gives_empty_result() {
        let result = processor(None).process_document("  \"\"  ").unwrap();
        assert!(result.entities.is_empty());
        assert!(result.sections.is_empty());
        assert_eq!(result.original_text, "  \"\"  ");
    }

    #[test]
    fn document_entities_and_sections() {
        let text = "פרטי מטופל: מר בן 75 FIM: 60/126 אבחנות: CVA איסכמי המלצות: המשך טיפול";
        let result = processor(None).process_document(text).unwrap();
        let labels: Vec<_> = result.entities.iter().map(|e| e.label.as_str()).collect();
        assert!(labels.contains(&"gender"));
        assert!(labels.contains(&"fim_score"));
        assert_eq!(result.sections["diagnoses"], "CVA איסכמי");
        assert_eq!(result.sections["recommendations"], "המשך טיפול");
    }

    #[test]
    fn model_entities_merged_into_document() {
        let classifier = KeywordClassifier {
            words: vec![("כסא", "B-mobility"), ("גלגלים", "I-mobility")],
            score: 0.9,
        };
        let result = processor(Some(Box::new(classifier)))
            .process_document("מתנייד בכסא גלגלים או כסא גלגלים")
            .unwrap();
        let model: Vec<_> = result
            .entities
            .iter()
            .filter(|e| e.provenance == Provenance::Model)
            .collect();
        assert_eq!(model.len(), 1);
        assert_eq!(model[0].value, "כסא גלגלים");
    }

    #[test]
    fn annotated_text_feeds_classifier_and_spans() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let classifier = RecordingClassifier {
            seen: seen.clone(),
            token: "FIM_60/126",
            label: "B-fim_score",
        };
        let config = ExtractionConfig {
            annotate_markers: true,
            ..ExtractionConfig::default()
        };
        let processor = DocumentProcessor::new(catalogue(), Some(Box::new(classifier)), config);

        let result = processor.process_document("FIM: 60/126").unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["[SCORE] FIM_60/126 [/SCORE]"]);

        let model: Vec<_> = result
            .entities
            .iter()
            .filter(|e| e.provenance == Provenance::Model)
            .collect();
        assert_eq!(model.len(), 1);
        assert_eq!(model[0].label, "fim_score");
        assert_eq!(model[0].text, "FIM_60/126");
        assert_eq!(model[0].value, "60");
        assert_eq!((model[0].start, model[0].end), (Some(8), Some(18)));
    }

    #[test]
    fn markers_off_classifier_sees_normalized_text() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let classifier = RecordingClassifier {
            seen: seen.clone(),
            token: "FIM_60/126",
            label: "B-fim_score",
        };
        let fields = processor(Some(Box::new(classifier)))
            .extract_fields("FIM:\n 60/126", &[])
            .unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["FIM: 60/126"]);
        assert_eq!(fields["fim_score"], "60");
    }

    #[test]
    fn fallback_values_become_heuristic_entities() {
        let result = processor(None)
            .process_document("המטופל מתנייד בעזרת הליכון. FIM 60/126")
            .unwrap();
        let heuristic: Vec<_> = result
            .entities
            .iter()
            .filter(|e| e.provenance == Provenance::Heuristic)
            .collect();
        assert_eq!(heuristic.len(), 1);
        assert_eq!(heuristic[0].label, "mobility");
        assert_eq!(heuristic[0].value, "עם הליכון");
        assert_eq!(heuristic[0].confidence, HEURISTIC_CONFIDENCE);
        assert!(result
            .entities
            .iter()
            .any(|e| e.label == "fim_score" && e.provenance == Provenance::Pattern));
    }

    #[test]
    fn from_config_reports_loaded_classifier() {
        let dir = tempfile::tempdir().unwrap();
        let catalogue_path = dir.path().join("params.csv");
        std::fs::write(&catalogue_path, "Field,Value 1\nelevator,עם מעלית\n").unwrap();
        let config = NemoConfig {
            catalogue_path,
            model_dir: dir.path().join("missing-model"),
            ..NemoConfig::default()
        };
        let loaded = DocumentProcessor::from_config(&config).unwrap();
        assert_eq!(loaded.classifier_name(), None);
        assert_eq!(loaded.catalogue().len(), 1);

        let with_model = processor(Some(Box::new(BrokenClassifier)));
        assert_eq!(with_model.classifier_name(), Some("broken"));
    }

    #[test]
    fn classifier_failure_surfaces_as_error() {
        let result = processor(Some(Box::new(BrokenClassifier))).process_document("טקסט כלשהו");
        assert!(matches!(result, Err(ExtractionError::Classifier(_))));
    }

    #[test]
    fn requested_fields_missing_are_not_found() {
        let params = vec![
            FieldOption {
                field: "elevator".into(),
                options: vec![],
            },
            FieldOption {
                field: "mood".into(),
                options: vec![],
            },
        ];
        let fields = processor(None)
            .extract_fields("גר בקומה 2 ללא מעלית", &params)
            .unwrap();
        assert_eq!(fields["elevator"], "ללא מעלית");
        assert_eq!(fields["mood"], NOT_FOUND);
        assert_eq!(fields["floor_number"], "2");
    }

    #[test]
    fn no_parameters_fills_whole_catalogue() {
        let fields = processor(None).extract_fields("טקסט ללא נתונים", &[]).unwrap();
        for field in ["mobility", "elevator", "fim_score"] {
            assert_eq!(fields[field], NOT_FOUND);
        }
    }

    #[test]
    fn model_overrides_pattern_and_fallback() {
        let classifier = KeywordClassifier {
            words: vec![("כסא", "B-mobility"), ("גלגלים", "I-mobility")],
            score: 0.95,
        };
        let fields = processor(Some(Box::new(classifier)))
            .extract_fields("הגיע עם הליכון, כיום כסא גלגלים", &[])
            .unwrap();
        // keyword fallback would have said walker
        assert_eq!(fields["mobility"], "כסא גלגלים");
    }

    #[test]
    fn fallback_fills_when_model_silent() {
        let fields = processor(None)
            .extract_fields("הולך עם הליכון. FIM בשחרור 88/126", &[])
            .unwrap();
        assert_eq!(fields["mobility"], "עם הליכון");
        assert_eq!(fields["fim_score"], "88");
    }

    #[test]
    fn invalid_values_never_emitted() {
        let params = vec![FieldOption {
            field: "elevator".into(),
            options: vec!["יש".into(), "אין".into()],
        }];
        let fields = processor(None)
            .extract_fields("בניין עם מעלית", &params)
            .unwrap();
        assert_eq!(fields["elevator"], NOT_FOUND);
    }

    #[test]
    fn every_value_is_valid_or_not_found() {
        let text = "תאריך קבלה: 01.02.2025 MMSE: 29/30 בן 75 ת.ז. 123456789 עם מעלית";
        let p = processor(None);
        let fields = p.extract_fields(text, &[]).unwrap();
        for (field, value) in &fields {
            if value != NOT_FOUND {
                assert!(
                    validate_field_value(field, value, p.catalogue().options(field), 60).is_some(),
                    "{field}={value}"
                );
            }
        }
        assert_eq!(fields["admission_date"], "01/02/2025");
        assert_eq!(fields["mmse_score"], "29");
    }

    #[test]
    fn batch_skips_blank_lines_and_keeps_last_label() {
        let texts = vec!["קומה: 2", "", "קומה: 3"];
        let report = processor(None).validate_documents(&texts);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.labels["floor_number"], "3");
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn batch_counts_failures() {
        let report = processor(Some(Box::new(BrokenClassifier))).validate_documents(&["קומה: 2"]);
        assert!(report.results.is_empty());
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn results_file_keeps_hebrew() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("validation_results.json");
        let result = processor(None).process_document("קומה: 2").unwrap();
        save_results(&[result], &path).unwrap();
        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("קומה: 2"));
        assert!(json.contains("\n  "));
    }

    #[test]
    fn read_documents_trims_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("texts.txt");
        std::fs::write(&path, "  שורה א  \n\n שורה ב\n").unwrap();
        assert_eq!(read_documents(&path).unwrap(), vec!["שורה א", "שורה ב"]);
        assert!(matches!(
            read_documents(&dir.path().join("missing.txt")),
            Err(ExtractionError::InputNotFound(_))
        ));
    }
}

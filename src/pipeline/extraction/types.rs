use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Placeholder emitted for every requested field that produced no valid value.
pub const NOT_FOUND: &str = "not_found";

/// Field name → emitted value (`NOT_FOUND` or a validated value).
pub type FieldMap = BTreeMap<String, String>;

/// Named free-text spans of a document (diagnoses, recommendations, ...).
pub type SectionMap = BTreeMap<String, String>;

/// Where an extracted value came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Fixed regular-expression table
    Pattern,
    /// Token-classification model prediction
    Model,
    /// Keyword / fallback rule applied after the other two
    Heuristic,
}

/// A single field occurrence found in a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedEntity {
    /// Field name from the catalogue
    pub label: String,
    /// Raw matched text
    pub text: String,
    /// Normalized value (normalized date, bare score, matched option)
    pub value: String,
    pub provenance: Provenance,
    /// In [0, 1]; pattern matches are 1.0
    pub confidence: f32,
    /// Byte offsets into the normalized text, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

impl ExtractedEntity {
    pub fn new(
        label: impl Into<String>,
        text: impl Into<String>,
        value: impl Into<String>,
        provenance: Provenance,
        confidence: f32,
    ) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
            value: value.into(),
            provenance,
            confidence: confidence.clamp(0.0, 1.0),
            start: None,
            end: None,
        }
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }
}

/// Full result of processing one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentResult {
    pub entities: Vec<ExtractedEntity>,
    pub sections: SectionMap,
    pub original_text: String,
}

/// Which date a document-level date lookup targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    Admission,
    Discharge,
}

impl DateKind {
    pub fn field(&self) -> &'static str {
        match self {
            DateKind::Admission => "admission_date",
            DateKind::Discharge => "discharge_date",
        }
    }
}

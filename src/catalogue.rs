//! Field catalogue: the valid field names and, for categorical fields,
//! the small list of values each may take.
//!
//! Loaded once at startup from a CSV shaped like
//! `Field,Value 1,Value 2,...,Value 11`. Blank cells are ignored.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const FIELD_COLUMN: &str = "Field";
const VALUE_COLUMN_PREFIX: &str = "Value";

#[derive(Error, Debug)]
pub enum CatalogueError {
    #[error("Catalogue not found: {0}")]
    NotFound(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Catalogue has no 'Field' column")]
    MissingFieldColumn,
}

/// A field together with the values it may take. Empty `options` means
/// the field is free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub field: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCatalogue {
    entries: Vec<FieldOption>,
}

impl FieldCatalogue {
    pub fn load(path: &Path) -> Result<Self, CatalogueError> {
        if !path.exists() {
            return Err(CatalogueError::NotFound(path.to_path_buf()));
        }
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)?;
        let catalogue = Self::from_csv(reader)?;
        tracing::info!(
            path = %path.display(),
            fields = catalogue.len(),
            "Loaded field catalogue"
        );
        Ok(catalogue)
    }

    pub fn from_reader<R: Read>(rdr: R) -> Result<Self, CatalogueError> {
        let reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
        Self::from_csv(reader)
    }

    pub fn from_entries(entries: Vec<FieldOption>) -> Self {
        let mut catalogue = Self::default();
        for entry in entries {
            catalogue.push(entry);
        }
        catalogue
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, CatalogueError> {
        let headers = reader.headers()?.clone();
        let field_idx = headers
            .iter()
            .position(|h| h.trim() == FIELD_COLUMN)
            .ok_or(CatalogueError::MissingFieldColumn)?;
        let value_idx: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.trim().starts_with(VALUE_COLUMN_PREFIX))
            .map(|(i, _)| i)
            .collect();

        let mut catalogue = Self::default();
        for record in reader.records() {
            let record = record?;
            let field = record.get(field_idx).map(str::trim).unwrap_or_default();
            if field.is_empty() {
                continue;
            }
            let options = value_idx
                .iter()
                .filter_map(|&i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            catalogue.push(FieldOption {
                field: field.to_string(),
                options,
            });
        }
        Ok(catalogue)
    }

    /// First definition of a field wins, matching a row lookup by name.
    fn push(&mut self, entry: FieldOption) {
        if !self.contains(&entry.field) {
            self.entries.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.entries.iter().any(|e| e.field == field)
    }

    /// Field names in catalogue order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.field.as_str())
    }

    pub fn entries(&self) -> &[FieldOption] {
        &self.entries
    }

    /// Allowed values for a field; empty for free-text or unknown fields.
    pub fn options(&self, field: &str) -> &[String] {
        self.entries
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.options.as_slice())
            .unwrap_or(&[])
    }

    /// BIO label set: `O` at 0, then `B-`/`I-` pairs per field in order.
    pub fn bio_labels(&self) -> LabelMap {
        let mut id2label = BTreeMap::new();
        id2label.insert(0, "O".to_string());
        for (i, field) in self.fields().enumerate() {
            let id = 1 + 2 * i as u32;
            id2label.insert(id, format!("B-{field}"));
            id2label.insert(id + 1, format!("I-{field}"));
        }
        LabelMap::from_id2label(id2label)
    }
}

/// Bidirectional label ↔ id mapping used by training and inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMap {
    pub id2label: BTreeMap<u32, String>,
    pub label2id: BTreeMap<String, u32>,
}

impl LabelMap {
    pub fn from_id2label(id2label: BTreeMap<u32, String>) -> Self {
        let label2id = id2label.iter().map(|(id, l)| (l.clone(), *id)).collect();
        Self { id2label, label2id }
    }

    pub fn len(&self) -> usize {
        self.id2label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2label.is_empty()
    }

    /// Unknown labels collapse to `O` (id 0).
    pub fn id(&self, label: &str) -> u32 {
        self.label2id.get(label).copied().unwrap_or(0)
    }

    pub fn label(&self, id: u32) -> &str {
        self.id2label.get(&id).map(String::as_str).unwrap_or("O")
    }
}

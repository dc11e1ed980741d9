//! Token-classification backends.
//!
//! The extractor only sees [`TokenClassifier`]; which backend sits behind it
//! is decided by [`load_classifier`] from the files in the model directory.

pub mod perceptron;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use perceptron::{PerceptronTagger, PerceptronTrainer};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serialized perceptron weights inside a model directory.
pub const TAGGER_FILE: &str = "tagger.json";

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Model initialization failed: {0}")]
    ModelInit(String),

    #[error("Model format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// One classified token, with byte offsets into the classified text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrediction {
    pub token: String,
    pub label: String,
    pub score: f32,
    pub start: usize,
    pub end: usize,
    /// Subword piece continuing the previous token's word
    pub is_continuation: bool,
}

impl TokenPrediction {
    pub fn word(token: &str, label: &str, score: f32, start: usize) -> Self {
        Self {
            token: token.to_string(),
            label: label.to_string(),
            score,
            start,
            end: start + token.len(),
            is_continuation: false,
        }
    }
}

/// Token-classification model abstraction (allows mocking for tests)
pub trait TokenClassifier: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &str;

    fn classify(&self, text: &str) -> Result<Vec<TokenPrediction>, ClassifierError>;
}

pub(crate) fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![0.0; scores.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the highest score, first on ties.
pub(crate) fn argmax(values: &[f32]) -> (usize, f32) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best })
}

/// Split on whitespace keeping byte offsets.
pub fn split_words(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                words.push((s, &text[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push((s, &text[s..]));
    }
    words
}

/// Pick the classifier stored in `model_dir`.
///
/// An ONNX export (`model.onnx` + `tokenizer.json` + `config.json`) wins
/// when the `onnx` feature is built in; otherwise `tagger.json`. `None`
/// means extraction runs on patterns alone.
pub fn load_classifier(model_dir: &Path) -> Result<Option<Box<dyn TokenClassifier>>, ClassifierError> {
    #[cfg(feature = "onnx")]
    {
        if model_dir.join(onnx::MODEL_FILE).exists() {
            let classifier = onnx::OnnxTokenClassifier::load(model_dir)?;
            return Ok(Some(Box::new(classifier)));
        }
    }

    let tagger_path = model_dir.join(TAGGER_FILE);
    if tagger_path.exists() {
        let tagger = PerceptronTagger::load(&tagger_path)?;
        tracing::info!(
            path = %tagger_path.display(),
            labels = tagger.labels().len(),
            features = tagger.num_features(),
            "Perceptron tagger loaded"
        );
        return Ok(Some(Box::new(tagger)));
    }

    tracing::warn!(
        dir = %model_dir.display(),
        "No token classifier found, using pattern extraction only"
    );
    Ok(None)
}

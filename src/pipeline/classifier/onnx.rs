//! Transformer token classifier exported to ONNX.
//!
//! A model directory holds `model.onnx`, the HuggingFace `tokenizer.json`
//! and the `config.json` carrying `id2label`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use serde::Deserialize;
use tokenizers::{Tokenizer, TruncationParams};

use super::{argmax, softmax, ClassifierError, TokenClassifier, TokenPrediction};

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const CONFIG_FILE: &str = "config.json";

/// Longest sequence the encoder accepts.
pub const MAX_LENGTH: usize = 512;

#[derive(Deserialize)]
struct ModelConfig {
    id2label: BTreeMap<String, String>,
}

/// `config.json` keys are stringified ids.
fn parse_id2label(json: &str) -> Result<Vec<String>, ClassifierError> {
    let config: ModelConfig = serde_json::from_str(json)?;
    let mut pairs = Vec::with_capacity(config.id2label.len());
    for (id, label) in config.id2label {
        let id: usize = id
            .parse()
            .map_err(|_| ClassifierError::ModelInit(format!("non-numeric label id '{id}'")))?;
        pairs.push((id, label));
    }
    pairs.sort_by_key(|(id, _)| *id);
    if pairs.iter().enumerate().any(|(i, (id, _))| i != *id) {
        return Err(ClassifierError::ModelInit(
            "id2label ids are not contiguous from 0".to_string(),
        ));
    }
    Ok(pairs.into_iter().map(|(_, label)| label).collect())
}

/// Uses interior mutability (Mutex) because ort::Session::run requires `&mut self`
pub struct OnnxTokenClassifier {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    labels: Vec<String>,
}

impl OnnxTokenClassifier {
    pub fn load(model_dir: &Path) -> Result<Self, ClassifierError> {
        let model_path = model_dir.join(MODEL_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);
        let config_path = model_dir.join(CONFIG_FILE);
        for path in [&model_path, &tokenizer_path, &config_path] {
            if !path.exists() {
                return Err(ClassifierError::ModelNotFound(path.clone()));
            }
        }

        let labels = parse_id2label(&std::fs::read_to_string(&config_path)?)?;

        let session = Session::builder()
            .map_err(|e: ort::Error| ClassifierError::ModelInit(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e: ort::Error| ClassifierError::ModelInit(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| ClassifierError::ModelInit(format!("ONNX load failed: {e}")))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ClassifierError::ModelInit(format!("Tokenizer load failed: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| ClassifierError::ModelInit(e.to_string()))?;

        tracing::info!(
            dir = %model_dir.display(),
            labels = labels.len(),
            "ONNX token classifier loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            labels,
        })
    }
}

impl TokenClassifier for OnnxTokenClassifier {
    fn name(&self) -> &str {
        "onnx"
    }

    fn classify(&self, text: &str) -> Result<Vec<TokenPrediction>, ClassifierError> {
        use ort::value::TensorRef;

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ClassifierError::Tokenization(e.to_string()))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();
        let seq_len = input_ids.len();
        if seq_len == 0 {
            return Ok(Vec::new());
        }

        let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let mask_array = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let type_array = ndarray::Array2::from_shape_vec((1, seq_len), token_type_ids)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let ids_tensor = TensorRef::from_array_view(&ids_array)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let mask_tensor = TensorRef::from_array_view(&mask_array)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let type_tensor = TensorRef::from_array_view(&type_array)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifierError::Inference("Session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![ids_tensor, mask_tensor, type_tensor])
            .map_err(|e| ClassifierError::Inference(format!("ONNX inference failed: {e}")))?;

        // Logits: [1, seq_len, num_labels]
        let (shape, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("Output extraction: {e}")))?;
        let num_labels = self.labels.len();
        if shape.len() != 3 || shape[1] as usize != seq_len || shape[2] as usize != num_labels {
            return Err(ClassifierError::Inference(format!(
                "Unexpected output shape: {shape:?}, expected [1, {seq_len}, {num_labels}]"
            )));
        }

        let tokens = encoding.get_tokens();
        let offsets = encoding.get_offsets();
        let special = encoding.get_special_tokens_mask();
        let word_ids = encoding.get_word_ids();

        let mut predictions = Vec::with_capacity(seq_len);
        let mut prev_word = None;
        for idx in 0..seq_len {
            if special[idx] == 1 {
                prev_word = None;
                continue;
            }
            let row = &logits[idx * num_labels..(idx + 1) * num_labels];
            let (best, score) = argmax(&softmax(row));
            let word = word_ids[idx];
            let is_continuation = word.is_some() && word == prev_word;
            prev_word = word;
            let (start, end) = offsets[idx];
            predictions.push(TokenPrediction {
                token: tokens[idx].clone(),
                label: self.labels[best].clone(),
                score,
                start,
                end,
                is_continuation,
            });
        }
        Ok(predictions)
    }
}

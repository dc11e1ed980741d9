//! Averaged structured perceptron over word features.
//!
//! Decoding is greedy left to right; the previous predicted label is a
//! feature of the next token. Confidence is the softmax of the raw label
//! scores at the chosen label.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{argmax, softmax, split_words, ClassifierError, TokenClassifier, TokenPrediction};

const START: &str = "<s>";
const END: &str = "</s>";

/// Trained, averaged weights. Serializes to `tagger.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerceptronTagger {
    labels: Vec<String>,
    weights: HashMap<String, Vec<f32>>,
}

/// Collapsed character classes: `CVA-2` → `X-d`.
fn word_shape(word: &str) -> String {
    let mut shape = String::new();
    let mut last = None;
    for c in word.chars() {
        let class = if c.is_ascii_digit() {
            'd'
        } else if c.is_uppercase() {
            'X'
        } else if c.is_alphabetic() {
            'x'
        } else {
            c
        };
        if last != Some(class) {
            shape.push(class);
            last = Some(class);
        }
    }
    shape
}

fn prefix(word: &str, n: usize) -> String {
    word.chars().take(n).collect()
}

fn suffix(word: &str, n: usize) -> String {
    let count = word.chars().count();
    word.chars().skip(count.saturating_sub(n)).collect()
}

fn context_word(words: &[String], i: usize, offset: isize) -> &str {
    let j = i as isize + offset;
    if j < 0 {
        START
    } else {
        words.get(j as usize).map_or(END, String::as_str)
    }
}

fn features(words: &[String], i: usize, prev_label: &str) -> Vec<String> {
    let w = &words[i];
    vec![
        "bias".to_string(),
        format!("w={w}"),
        format!("p1={}", prefix(w, 1)),
        format!("p3={}", prefix(w, 3)),
        format!("s2={}", suffix(w, 2)),
        format!("s3={}", suffix(w, 3)),
        format!("shape={}", word_shape(w)),
        format!("w-1={}", context_word(words, i, -1)),
        format!("w-2={}", context_word(words, i, -2)),
        format!("w+1={}", context_word(words, i, 1)),
        format!("w+2={}", context_word(words, i, 2)),
        format!("t-1={prev_label}"),
        format!("t-1,w={prev_label},{w}"),
    ]
}

fn lowered(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_lowercase()).collect()
}

fn score(weights: &HashMap<String, Vec<f32>>, n_labels: usize, feats: &[String]) -> Vec<f32> {
    let mut scores = vec![0.0f32; n_labels];
    for f in feats {
        if let Some(w) = weights.get(f) {
            for (s, v) in scores.iter_mut().zip(w) {
                *s += v;
            }
        }
    }
    scores
}

impl PerceptronTagger {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn num_features(&self) -> usize {
        self.weights.len()
    }

    /// Label and confidence for each token.
    pub fn predict(&self, tokens: &[&str]) -> Vec<(String, f32)> {
        if self.labels.is_empty() {
            return Vec::new();
        }
        let words = lowered(tokens);
        let mut out = Vec::with_capacity(words.len());
        let mut prev = START.to_string();
        for i in 0..words.len() {
            let feats = features(&words, i, &prev);
            let probs = softmax(&score(&self.weights, self.labels.len(), &feats));
            let (best, confidence) = argmax(&probs);
            let label = self.labels[best].clone();
            prev = label.clone();
            out.push((label, confidence));
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<(), ClassifierError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        if !path.exists() {
            return Err(ClassifierError::ModelNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        let tagger: Self = serde_json::from_str(&json)?;
        if let Some((feature, _)) = tagger
            .weights
            .iter()
            .find(|(_, w)| w.len() != tagger.labels.len())
        {
            return Err(ClassifierError::ModelInit(format!(
                "weight vector for '{feature}' does not match {} labels",
                tagger.labels.len()
            )));
        }
        Ok(tagger)
    }
}

impl TokenClassifier for PerceptronTagger {
    fn name(&self) -> &str {
        "perceptron"
    }

    fn classify(&self, text: &str) -> Result<Vec<TokenPrediction>, ClassifierError> {
        let words = split_words(text);
        let tokens: Vec<&str> = words.iter().map(|(_, w)| *w).collect();
        let predictions = self
            .predict(&tokens)
            .into_iter()
            .zip(&words)
            .map(|((label, score), (start, token))| TokenPrediction::word(token, &label, score, *start))
            .collect();
        Ok(predictions)
    }
}

/// Online learner producing a [`PerceptronTagger`].
///
/// Keeps running totals so the averaged weights can be read at any point
/// without disturbing training.
pub struct PerceptronTrainer {
    labels: Vec<String>,
    label_index: HashMap<String, usize>,
    weights: HashMap<String, Vec<f32>>,
    totals: HashMap<String, Vec<f32>>,
    stamps: HashMap<String, Vec<u64>>,
    instances: u64,
}

impl PerceptronTrainer {
    /// `labels[0]` is the fallback for gold labels outside the set.
    pub fn new(labels: Vec<String>) -> Self {
        let label_index = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();
        Self {
            labels,
            label_index,
            weights: HashMap::new(),
            totals: HashMap::new(),
            stamps: HashMap::new(),
            instances: 0,
        }
    }

    fn update(&mut self, truth: usize, guess: usize, feats: &[String]) {
        let n = self.labels.len();
        for f in feats {
            let w = self.weights.entry(f.clone()).or_insert_with(|| vec![0.0; n]);
            let totals = self.totals.entry(f.clone()).or_insert_with(|| vec![0.0; n]);
            let stamps = self.stamps.entry(f.clone()).or_insert_with(|| vec![0; n]);
            for (class, delta) in [(truth, 1.0f32), (guess, -1.0)] {
                totals[class] += (self.instances - stamps[class]) as f32 * w[class];
                stamps[class] = self.instances;
                w[class] += delta;
            }
        }
    }

    /// One pass over a sentence. Returns the number of mistagged tokens.
    pub fn train_sentence(&mut self, tokens: &[String], gold: &[String]) -> usize {
        if self.labels.is_empty() {
            return 0;
        }
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let words = lowered(&refs);
        let mut prev = START.to_string();
        let mut errors = 0;
        for (i, gold_label) in gold.iter().enumerate().take(words.len()) {
            let feats = features(&words, i, &prev);
            let (guess, _) = argmax(&score(&self.weights, self.labels.len(), &feats));
            let truth = self.label_index.get(gold_label).copied().unwrap_or(0);
            self.instances += 1;
            if guess != truth {
                self.update(truth, guess, &feats);
                errors += 1;
            }
            prev = self.labels[guess].clone();
        }
        errors
    }

    /// Averaged weights so far. Features whose weights average to zero are pruned.
    pub fn averaged(&self) -> PerceptronTagger {
        let n = self.labels.len();
        let mut weights = HashMap::new();
        for (f, w) in &self.weights {
            let averaged: Vec<f32> = if self.instances == 0 {
                w.clone()
            } else {
                let totals = &self.totals[f];
                let stamps = &self.stamps[f];
                (0..n)
                    .map(|c| {
                        let total = totals[c] + (self.instances - stamps[c]) as f32 * w[c];
                        total / self.instances as f32
                    })
                    .collect()
            };
            if averaged.iter().any(|v| v.abs() > 1e-6) {
                weights.insert(f.clone(), averaged);
            }
        }
        PerceptronTagger {
            labels: self.labels.clone(),
            weights,
        }
    }
}

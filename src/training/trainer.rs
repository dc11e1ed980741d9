//! Perceptron training loop over synthetic discharge letters.
//!
//! Each epoch the averaged weights are scored on the held-out split and the
//! best epoch is kept. The final model lands in `<output_dir>/final` next to
//! a `training_config.json` describing its label set and scores.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use super::encode::{encode_dataset, train_test_split, write_jsonl, SubwordTokenizer};
use super::metrics::{evaluate, SequenceReport};
use super::synth::{
    create_training_examples, entity_length_stats, field_distribution, save_inspection,
    TrainingExample,
};
use super::TrainingError;
use crate::catalogue::{FieldCatalogue, LabelMap};
use crate::config::{self, BASE_MODEL, FINAL_DIR, MODEL_NAME};
use crate::pipeline::classifier::{PerceptronTagger, PerceptronTrainer, TAGGER_FILE};
use crate::pipeline::extraction::bio::OUTSIDE;

pub const TRAINING_CONFIG_FILE: &str = "training_config.json";
pub const TRAIN_FEATURES_FILE: &str = "train.jsonl";
pub const EVAL_FEATURES_FILE: &str = "eval.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingConfig {
    pub output_dir: PathBuf,
    pub epochs: usize,
    pub min_examples: usize,
    /// Cap on the generated dataset before splitting
    pub max_examples: usize,
    pub test_size: f32,
    pub seed: u64,
    /// Subword sequence length for the JSONL export
    pub max_length: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            output_dir: config::default_training_dir(),
            epochs: 5,
            min_examples: 1000,
            max_examples: 1000,
            test_size: 0.2,
            seed: 42,
            max_length: super::encode::MAX_LENGTH,
        }
    }
}

impl TrainingConfig {
    fn validate(&self) -> Result<(), TrainingError> {
        if self.epochs == 0 {
            return Err(TrainingError::InvalidConfig("epochs must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.test_size) {
            return Err(TrainingError::InvalidConfig(format!(
                "test_size must be in [0, 1), got {}",
                self.test_size
            )));
        }
        if self.max_examples == 0 {
            return Err(TrainingError::InvalidConfig("max_examples must be at least 1".into()));
        }
        Ok(())
    }

    pub fn final_dir(&self) -> PathBuf {
        self.output_dir.join(FINAL_DIR)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingOutcome {
    pub final_dir: PathBuf,
    /// 1-based
    pub best_epoch: usize,
    pub eval: SequenceReport,
    pub train_size: usize,
    pub eval_size: usize,
}

#[derive(Serialize)]
struct SavedTrainingConfig<'a> {
    model_name: &'a str,
    base_model: &'a str,
    classifier: &'a str,
    id2label: &'a std::collections::BTreeMap<u32, String>,
    label2id: &'a std::collections::BTreeMap<String, u32>,
    training_params: &'a TrainingConfig,
    best_epoch: usize,
    eval_results: &'a SequenceReport,
}

/// Gold labels outside the catalogue's label set score as `O`.
fn restrict_labels(labels: &[String], known: &LabelMap) -> Vec<String> {
    labels
        .iter()
        .map(|l| {
            if known.label2id.contains_key(l) {
                l.clone()
            } else {
                OUTSIDE.to_string()
            }
        })
        .collect()
}

fn score_tagger(
    tagger: &PerceptronTagger,
    examples: &[TrainingExample],
    known: &LabelMap,
) -> SequenceReport {
    let mut y_true = Vec::with_capacity(examples.len());
    let mut y_pred = Vec::with_capacity(examples.len());
    for example in examples {
        let tokens: Vec<&str> = example.tokens.iter().map(String::as_str).collect();
        y_pred.push(tagger.predict(&tokens).into_iter().map(|(l, _)| l).collect::<Vec<_>>());
        y_true.push(restrict_labels(&example.labels, known));
    }
    evaluate(&y_true, &y_pred)
}

fn log_dataset(examples: &[TrainingExample]) {
    tracing::info!(examples = examples.len(), "Generated training examples");
    for (field, count) in field_distribution(examples) {
        tracing::info!(field = %field, tokens = count, "Field distribution");
    }
    for (field, stats) in entity_length_stats(examples) {
        tracing::debug!(
            field = %field,
            mean = stats.mean,
            min = stats.min,
            max = stats.max,
            count = stats.count,
            "Entity length"
        );
    }
}

fn save_training_config(
    dir: &Path,
    labels: &LabelMap,
    config: &TrainingConfig,
    best_epoch: usize,
    eval: &SequenceReport,
) -> Result<(), TrainingError> {
    let saved = SavedTrainingConfig {
        model_name: MODEL_NAME,
        base_model: BASE_MODEL,
        classifier: "perceptron",
        id2label: &labels.id2label,
        label2id: &labels.label2id,
        training_params: config,
        best_epoch,
        eval_results: eval,
    };
    let json = serde_json::to_string_pretty(&saved)?;
    std::fs::write(dir.join(TRAINING_CONFIG_FILE), json)?;
    Ok(())
}

/// Generate data, train, evaluate and save. With a tokenizer, the subword
/// features of both splits are exported as JSONL next to the model.
pub fn train(
    catalogue: &FieldCatalogue,
    config: &TrainingConfig,
    tokenizer: Option<&dyn SubwordTokenizer>,
) -> Result<TrainingOutcome, TrainingError> {
    config.validate()?;
    let label_map = catalogue.bio_labels();
    let labels: Vec<String> = label_map.id2label.values().cloned().collect();
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut examples = create_training_examples(&mut rng, config.min_examples);
    examples.truncate(config.max_examples);
    if examples.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    log_dataset(&examples);
    save_inspection(&examples, &config.output_dir)?;

    let (mut train_set, eval_set) = train_test_split(examples, config.test_size, &mut rng);
    tracing::info!(train = train_set.len(), eval = eval_set.len(), "Split dataset");
    // With no held-out split, score on the training data itself.
    let scored = if eval_set.is_empty() { &train_set } else { &eval_set }.clone();

    let mut trainer = PerceptronTrainer::new(labels);
    let mut best: Option<(usize, PerceptronTagger, SequenceReport)> = None;

    for epoch in 1..=config.epochs {
        train_set.shuffle(&mut rng);
        let errors: usize = train_set
            .iter()
            .map(|e| trainer.train_sentence(&e.tokens, &e.labels))
            .sum();
        let tagger = trainer.averaged();
        let report = score_tagger(&tagger, &scored, &label_map);
        tracing::info!(
            epoch,
            errors,
            f1 = report.f1,
            precision = report.precision,
            recall = report.recall,
            "Epoch finished"
        );
        let improved = best.as_ref().map_or(true, |(_, _, b)| report.f1 > b.f1);
        if improved {
            best = Some((epoch, tagger, report));
        }
    }

    let (best_epoch, tagger, eval) = best.ok_or(TrainingError::EmptyDataset)?;
    tracing::info!(best_epoch, "Evaluation results:\n{}", eval.render());

    let final_dir = config.final_dir();
    std::fs::create_dir_all(&final_dir)?;
    tagger.save(&final_dir.join(TAGGER_FILE))?;
    save_training_config(&final_dir, &label_map, config, best_epoch, &eval)?;

    if let Some(tokenizer) = tokenizer {
        let train_rows = encode_dataset(&train_set, tokenizer, &label_map, config.max_length)?;
        let eval_rows = encode_dataset(&eval_set, tokenizer, &label_map, config.max_length)?;
        write_jsonl(&train_rows, &final_dir.join(TRAIN_FEATURES_FILE))?;
        write_jsonl(&eval_rows, &final_dir.join(EVAL_FEATURES_FILE))?;
        tracing::info!(
            train = train_rows.len(),
            eval = eval_rows.len(),
            "Exported subword features"
        );
    }

    tracing::info!(path = %final_dir.display(), "Model saved");
    Ok(TrainingOutcome {
        final_dir,
        best_epoch,
        eval,
        train_size: train_set.len(),
        eval_size: eval_set.len(),
    })
}

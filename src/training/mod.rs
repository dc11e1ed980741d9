//! Offline training: synthetic data, subword encoding, metrics and the
//! perceptron training loop.

pub mod synth;
pub mod encode;
pub mod metrics;
pub mod ground_truth;
pub mod trainer;

pub use synth::{create_training_examples, TrainingExample};
pub use trainer::{train, TrainingConfig, TrainingOutcome};

use thiserror::Error;

use crate::catalogue::CatalogueError;
use crate::pipeline::classifier::ClassifierError;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Catalogue error: {0}")]
    Catalogue(#[from] CatalogueError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Example has {tokens} tokens but {labels} labels")]
    LabelMismatch { tokens: usize, labels: usize },

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("No training examples")]
    EmptyDataset,

    #[error("Invalid training config: {0}")]
    InvalidConfig(String),
}

pub mod types;
pub mod normalize;
pub mod annotate;
pub mod dates;
pub mod fuzzy;
pub mod validators;
pub mod patterns;
pub mod sections;
pub mod bio;
pub mod model_entities;
pub mod merge;
pub mod report;

pub use types::*;
pub use normalize::*;
pub use dates::*;
pub use fuzzy::*;
pub use patterns::*;
pub use sections::*;
pub use merge::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::catalogue::CatalogueError;
use crate::pipeline::classifier::ClassifierError;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Catalogue error: {0}")]
    Catalogue(#[from] CatalogueError),

    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),
}

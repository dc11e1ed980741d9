//! Request/response types and shared state for the API.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalogue::FieldOption;
use crate::pipeline::extraction::FieldMap;
use crate::pipeline::processor::DocumentProcessor;

/// Shared state for all routes.
#[derive(Clone)]
pub struct ApiContext {
    pub processor: Arc<DocumentProcessor>,
}

impl ApiContext {
    pub fn new(processor: Arc<DocumentProcessor>) -> Self {
        Self { processor }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default)]
    pub parameters: Vec<FieldOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub response: FieldMap,
}

/// Either `healthy` with the sample's fields or `unhealthy` with the error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthResponse {
    Healthy { sample_entities: FieldMap },
    Unhealthy { error: String },
}

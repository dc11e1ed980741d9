//! Health check endpoint.

use axum::extract::State;
use axum::Json;

use crate::api::types::{ApiContext, HealthResponse};
use crate::catalogue::FieldOption;

pub const SAMPLE_TEXT: &str = "חולה עם CVA איסכמי בהמיספרה שמאלית";
pub const SAMPLE_FIELD: &str = "diagnoses";

/// `GET /healthcheck`: runs the extractor end to end on a fixed sample.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let processor = ctx.processor.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let params = [FieldOption {
            field: SAMPLE_FIELD.to_string(),
            options: processor.catalogue().options(SAMPLE_FIELD).to_vec(),
        }];
        processor.extract_fields(SAMPLE_TEXT, &params)
    })
    .await;

    let response = match outcome {
        Ok(Ok(fields)) => HealthResponse::Healthy {
            sample_entities: fields,
        },
        Ok(Err(e)) => HealthResponse::Unhealthy {
            error: e.to_string(),
        },
        Err(e) => HealthResponse::Unhealthy {
            error: e.to_string(),
        },
    };
    if let HealthResponse::Unhealthy { error } = &response {
        tracing::warn!(error = %error, "Health check failed");
    }
    Json(response)
}

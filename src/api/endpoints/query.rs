//! Field extraction endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, QueryRequest, QueryResponse};

/// `POST /query`: field map for `text`, restricted to `parameters` when given.
pub async fn query(
    State(ctx): State<ApiContext>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = body?;
    tracing::debug!(
        chars = request.text.chars().count(),
        parameters = request.parameters.len(),
        "Query received"
    );

    let processor = ctx.processor.clone();
    let fields = tokio::task::spawn_blocking(move || {
        processor.extract_fields(&request.text, &request.parameters)
    })
    .await??;

    Ok(Json(QueryResponse { response: fields }))
}
